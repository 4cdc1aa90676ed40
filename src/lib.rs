//! An HTTP gateway that races postal-code (CEP) lookups across providers.
//!
//! Every lookup is sent to all configured providers at once and the first
//! successful answer is returned; slower providers are cancelled. The race is
//! bounded by a single deadline shared by every provider call.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use hedged_cep_gateway::{
//!     provider::{http_client, BrasilApiClient, ViaCepClient, BRASILAPI_BASE_URL, VIACEP_BASE_URL},
//!     HedgedCepClient, LookupKey, Provider, RaceConfig,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let http = http_client()?;
//! let providers: Vec<Arc<dyn Provider>> = vec![
//!     Arc::new(ViaCepClient::new(http.clone(), VIACEP_BASE_URL)),
//!     Arc::new(BrasilApiClient::new(http, BRASILAPI_BASE_URL)),
//! ];
//!
//! let client = HedgedCepClient::new(providers, RaceConfig::default());
//!
//! let (provider, address) = client.lookup(&LookupKey::new("01001000")?).await?;
//! println!("{} answered first: {}, {}", provider, address.street(), address.locality());
//! # Ok(())
//! # }
//! ```
//!
//! # Race Strategy
//!
//! 1. Every selected provider is spawned at once, sharing one cancellation token
//! 2. The first successful response decides the race
//! 3. A failing provider only ends the race once every other provider has failed too
//! 4. Times out after `overall_timeout`, cancelling whatever is still running
//!
//! The [`server`] module exposes this as `GET /?cep=<value>`.

pub mod client;
pub mod config;
pub mod errors;
pub mod logging;
pub mod model;
pub mod provider;
pub mod server;

pub use client::{HedgedCepClient, ProviderStatsSnapshot};
pub use config::{ProviderConfig, ProviderId, RaceConfig};
pub use errors::{FailureStage, InvalidLookupKey, ProviderError, RaceError};
pub use model::{AddressFields, AddressRecord, BrasilApiAddress, LookupKey, ViaCepAddress};
pub use provider::{Provider, ProviderResult};
