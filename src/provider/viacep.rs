use futures::{future::BoxFuture, FutureExt};
use serde::Deserialize;

use super::{endpoint, get_json, Provider, ProviderResult};
use crate::{
    config::{ProviderConfig, ProviderId},
    errors::ProviderError,
    model::{AddressFields, AddressRecord, LookupKey, ViaCepAddress},
};

pub const VIACEP: ProviderId = ProviderId("ViaCEP");
pub const VIACEP_BASE_URL: &str = "https://viacep.com.br";

/// ViaCEP answers unknown codes with `200 {"erro": true}`.
#[derive(Deserialize)]
struct ViaCepResponse {
    #[serde(default)]
    erro: Option<serde_json::Value>,
    #[serde(flatten)]
    address: ViaCepAddress,
}

impl ViaCepResponse {
    /// Newer responses carry the flag as the string `"true"`.
    fn is_not_found(&self) -> bool {
        match &self.erro {
            Some(serde_json::Value::Bool(flag)) => *flag,
            Some(serde_json::Value::String(flag)) => flag == "true",
            _ => false,
        }
    }
}

/// Client for `GET {base}/ws/{cep}/json/`.
#[derive(Debug, Clone)]
pub struct ViaCepClient {
    id: ProviderId,
    base_url: String,
    http: reqwest::Client,
}

impl ViaCepClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            id: VIACEP,
            base_url: base_url.into(),
            http,
        }
    }

    pub fn from_config(http: reqwest::Client, cfg: &ProviderConfig) -> Self {
        Self {
            id: cfg.id,
            base_url: cfg.base_url.clone(),
            http,
        }
    }

    async fn lookup(&self, key: &LookupKey) -> ProviderResult {
        let url = endpoint(&self.base_url, &["ws", key.as_str(), "json", ""])?;
        let body: ViaCepResponse = get_json(&self.http, url).await?;

        if body.is_not_found() {
            return Err(ProviderError::NotFound);
        }

        Ok(AddressRecord::new(self.id, AddressFields::ViaCep(body.address)))
    }
}

impl Provider for ViaCepClient {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn fetch<'a>(&'a self, key: &'a LookupKey) -> BoxFuture<'a, ProviderResult> {
        self.lookup(key).boxed()
    }
}
