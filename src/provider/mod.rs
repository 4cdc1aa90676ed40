//! Upstream postal-code lookup providers.
//!
//! Each provider performs exactly one outbound call per [`Provider::fetch`]
//! and reports every failure as a [`ProviderError`] value; nothing here
//! retries or panics.

mod brasilapi;
mod viacep;

pub use brasilapi::{BrasilApiClient, BRASILAPI, BRASILAPI_BASE_URL};
pub use viacep::{ViaCepClient, VIACEP, VIACEP_BASE_URL};

use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Url;
use serde::de::DeserializeOwned;

use crate::{
    config::ProviderId,
    errors::ProviderError,
    model::{AddressRecord, LookupKey},
};

/// Outcome of a single provider call.
pub type ProviderResult = Result<AddressRecord, ProviderError>;

/// A postal-code lookup service that can take part in a race.
///
/// `fetch` must be cancel-safe: the coordinator drops the returned future as
/// soon as the race is decided.
pub trait Provider: Send + Sync + 'static {
    fn id(&self) -> ProviderId;

    fn fetch<'a>(&'a self, key: &'a LookupKey) -> BoxFuture<'a, ProviderResult>;
}

/// Builds the shared outbound HTTP client.
///
/// Only connection setup is bounded here; the overall deadline belongs to the race.
pub fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Appends `segments` to the path of `base`, percent-encoding each one.
fn endpoint(base: &str, segments: &[&str]) -> Result<Url, ProviderError> {
    let mut url = Url::parse(base).map_err(|_| ProviderError::InvalidUrl(base.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| ProviderError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Performs one `GET` and decodes a JSON body, tagging each failure with its stage.
async fn get_json<T: DeserializeOwned>(
    http: &reqwest::Client,
    url: Url,
) -> Result<T, ProviderError> {
    let request = http.get(url).build().map_err(ProviderError::Request)?;
    let response = http
        .execute(request)
        .await
        .map_err(ProviderError::Transport)?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::Status(status));
    }

    let body = response.bytes().await.map_err(ProviderError::BodyRead)?;
    Ok(serde_json::from_slice(&body)?)
}
