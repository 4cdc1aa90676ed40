use futures::{future::BoxFuture, FutureExt};

use super::{endpoint, get_json, Provider, ProviderResult};
use crate::{
    config::{ProviderConfig, ProviderId},
    model::{AddressFields, AddressRecord, BrasilApiAddress, LookupKey},
};

pub const BRASILAPI: ProviderId = ProviderId("BrasilAPI");
pub const BRASILAPI_BASE_URL: &str = "https://brasilapi.com.br";

/// Client for `GET {base}/api/cep/v1/{cep}`.
///
/// Unknown codes come back as 404 and surface as a status failure.
#[derive(Debug, Clone)]
pub struct BrasilApiClient {
    id: ProviderId,
    base_url: String,
    http: reqwest::Client,
}

impl BrasilApiClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            id: BRASILAPI,
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
        let url = endpoint(&self.base_url, &["api", "cep", "v1", key.as_str()])?;
        let address: BrasilApiAddress = get_json(&self.http, url).await?;

        Ok(AddressRecord::new(self.id, AddressFields::BrasilApi(address)))
    }
}

impl Provider for BrasilApiClient {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn fetch<'a>(&'a self, key: &'a LookupKey) -> BoxFuture<'a, ProviderResult> {
        self.lookup(key).boxed()
    }
}
