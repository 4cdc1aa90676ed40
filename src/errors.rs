use std::{fmt, time::Duration};

use reqwest::StatusCode;

use crate::config::ProviderId;

/// Errors that can occur while racing a lookup across providers.
#[derive(thiserror::Error, Debug)]
pub enum RaceError {
    /// No lookup providers were configured.
    #[error("no providers configured")]
    NoProviders,

    /// All raced providers returned errors.
    ///
    /// Contains the list of providers and their individual errors.
    #[error("all providers failed: {}", FailureList(.0))]
    AllFailed(Vec<(ProviderId, ProviderError)>),

    /// The race exceeded the configured timeout.
    ///
    /// None of the providers responded successfully within the time limit.
    #[error("lookup timed out after {0:?}")]
    Timeout(Duration),
}

struct FailureList<'a>(&'a [(ProviderId, ProviderError)]);

impl fmt::Display for FailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (id, err)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{id} [{}]: {err}", err.stage())?;
        }
        Ok(())
    }
}

/// Failure of a single provider call.
///
/// These never abort a race on their own; they are collected by the
/// coordinator and only surface when no provider succeeded.
#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    /// The configured base URL cannot carry path segments.
    #[error("invalid base url {0:?}")]
    InvalidUrl(String),

    /// The HTTP request could not be built.
    #[error("failed to build request: {0}")]
    Request(#[source] reqwest::Error),

    /// Connecting, sending or waiting for response headers failed.
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The upstream answered with a non-2xx status.
    #[error("upstream returned status {0}")]
    Status(StatusCode),

    /// The response body could not be read to completion.
    #[error("failed to read response body: {0}")]
    BodyRead(#[source] reqwest::Error),

    /// The response body was not the JSON the provider expects.
    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// The upstream reported that it does not know the postal code.
    #[error("postal code not found")]
    NotFound,

    /// The provider panicked instead of returning a result.
    #[error("provider panicked: {0}")]
    Panicked(String),
}

/// Point in a provider call where it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    RequestConstruction,
    Transport,
    Status,
    BodyRead,
    Decode,
    Task,
}

impl FailureStage {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureStage::RequestConstruction => "request-construction",
            FailureStage::Transport => "transport",
            FailureStage::Status => "status",
            FailureStage::BodyRead => "body-read",
            FailureStage::Decode => "decode",
            FailureStage::Task => "task",
        }
    }
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ProviderError {
    pub fn stage(&self) -> FailureStage {
        match self {
            ProviderError::InvalidUrl(_) | ProviderError::Request(_) => {
                FailureStage::RequestConstruction
            }
            ProviderError::Transport(_) => FailureStage::Transport,
            ProviderError::Status(_) => FailureStage::Status,
            ProviderError::BodyRead(_) => FailureStage::BodyRead,
            ProviderError::Decode(_) | ProviderError::NotFound => FailureStage::Decode,
            ProviderError::Panicked(_) => FailureStage::Task,
        }
    }
}

/// The lookup key was empty.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("lookup key must not be empty")]
pub struct InvalidLookupKey;
