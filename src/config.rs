use std::{fmt, time::Duration};

use serde::Serialize;

/// Unique identifier for a lookup provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ProviderId(pub &'static str);

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.0)
    }
}

/// Configuration for a single upstream lookup provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Unique identifier for this provider.
    pub id: ProviderId,
    /// Scheme and host of the upstream, e.g. `https://viacep.com.br`.
    ///
    /// The provider appends its own path segments to this URL.
    pub base_url: String,
}

/// Race strategy configuration.
#[derive(Debug, Clone)]
pub struct RaceConfig {
    /// Maximum number of providers to involve in a single lookup.
    ///
    /// Providers are taken in registration order; the rest are never called.
    pub max_providers: usize,

    /// Maximum time to wait for any provider to respond.
    ///
    /// When it elapses before a success, the lookup resolves to a timeout and
    /// every provider still running is cancelled.
    pub overall_timeout: Duration,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            max_providers: usize::MAX,
            overall_timeout: Duration::from_secs(1),
        }
    }
}

impl RaceConfig {
    /// Races every registered provider with the given deadline.
    pub fn with_timeout(overall_timeout: Duration) -> Self {
        Self {
            overall_timeout,
            ..Self::default()
        }
    }

    /// Creates a patient configuration for slow networks:
    /// - Races every provider
    /// - 3 second timeout
    pub fn patient() -> Self {
        Self::with_timeout(Duration::from_secs(3))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_races_all_providers_for_one_second() {
        let cfg = RaceConfig::default();
        assert_eq!(cfg.max_providers, usize::MAX);
        assert_eq!(cfg.overall_timeout, Duration::from_secs(1));
    }

    #[test]
    fn provider_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&ProviderId("ViaCEP")).unwrap();
        assert_eq!(json, "\"ViaCEP\"");
        assert_eq!(ProviderId("BrasilAPI").to_string(), "BrasilAPI");
    }
}
