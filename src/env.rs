//! Environment configuration for the gateway binary.

use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use color_eyre::{eyre::WrapErr, Result};
use hedged_cep_gateway::{
    provider::{
        http_client, BrasilApiClient, ViaCepClient, BRASILAPI, BRASILAPI_BASE_URL, VIACEP,
        VIACEP_BASE_URL,
    },
    HedgedCepClient, Provider, ProviderConfig, ProviderId, RaceConfig,
};

const DEFAULT_ADDR: &str = "0.0.0.0:8080";

/// Everything the binary needs to start serving.
pub struct GatewayConfig {
    pub addr: SocketAddr,
    pub race: RaceConfig,
    pub viacep: ProviderConfig,
    pub brasilapi: ProviderConfig,
}

/// Loads a provider configuration from `env_key`, falling back to the public endpoint.
pub fn provider_from_env(env_key: &str, id: ProviderId, default_url: &str) -> ProviderConfig {
    let base_url = env::var(env_key).unwrap_or_else(|_| default_url.to_string());
    ProviderConfig { id, base_url }
}

/// Reads the gateway configuration from environment variables.
///
/// Looks for the following environment variables:
/// - `CEP_GATEWAY_ADDR` (default `0.0.0.0:8080`)
/// - `VIACEP_BASE_URL`
/// - `BRASILAPI_BASE_URL`
/// - `CEP_RACE_TIMEOUT_MS` (default 1000)
pub fn config_from_env() -> Result<GatewayConfig> {
    let addr = env::var("CEP_GATEWAY_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let addr: SocketAddr = addr
        .parse()
        .wrap_err_with(|| format!("CEP_GATEWAY_ADDR is not a socket address: {addr:?}"))?;

    let mut race = RaceConfig::default();
    if let Ok(raw) = env::var("CEP_RACE_TIMEOUT_MS") {
        let ms: u64 = raw
            .parse()
            .wrap_err_with(|| format!("CEP_RACE_TIMEOUT_MS is not a number: {raw:?}"))?;
        if ms == 0 {
            color_eyre::eyre::bail!("CEP_RACE_TIMEOUT_MS must be greater than zero");
        }
        race.overall_timeout = Duration::from_millis(ms);
    }

    Ok(GatewayConfig {
        addr,
        race,
        viacep: provider_from_env("VIACEP_BASE_URL", VIACEP, VIACEP_BASE_URL),
        brasilapi: provider_from_env("BRASILAPI_BASE_URL", BRASILAPI, BRASILAPI_BASE_URL),
    })
}

/// Builds the hedged lookup client for both upstream providers.
pub fn build_client(cfg: &GatewayConfig) -> Result<HedgedCepClient> {
    let http = http_client().wrap_err("failed to build HTTP client")?;

    let providers: Vec<Arc<dyn Provider>> = vec![
        Arc::new(ViaCepClient::from_config(http.clone(), &cfg.viacep)),
        Arc::new(BrasilApiClient::from_config(http, &cfg.brasilapi)),
    ];

    Ok(HedgedCepClient::new(providers, cfg.race.clone()))
}
