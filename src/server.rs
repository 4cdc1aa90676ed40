//! HTTP surface: `GET /?cep=<value>`.
//!
//! Owns no concurrency of its own; it validates input, runs one race and
//! renders the outcome.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{client::HedgedCepClient, errors::RaceError, model::LookupKey};

#[derive(Debug, Deserialize)]
pub struct LookupParams {
    pub cep: Option<String>,
}

/// Builds the gateway router around `client`.
///
/// Only `/` is served; every other path is a bad request.
pub fn router(client: HedgedCepClient) -> Router {
    Router::new()
        .route("/", get(lookup))
        .fallback(unknown_path)
        .with_state(client)
}

async fn lookup(
    State(client): State<HedgedCepClient>,
    params: Result<Query<LookupParams>, QueryRejection>,
) -> Response {
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => {
            return json_error(StatusCode::BAD_REQUEST, "invalid_query", rejection.body_text())
        }
    };

    let key = match params.cep.map(LookupKey::new) {
        Some(Ok(key)) => key,
        Some(Err(e)) => return json_error(StatusCode::BAD_REQUEST, "invalid_cep", e.to_string()),
        None => {
            return json_error(
                StatusCode::BAD_REQUEST,
                "missing_cep",
                "query parameter `cep` is required",
            )
        }
    };

    match client.lookup(&key).await {
        Ok((_provider, record)) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => race_error_to_response(e),
    }
}

async fn unknown_path(uri: axum::http::Uri) -> Response {
    debug!(path = uri.path(), "rejecting unknown path");
    json_error(
        StatusCode::BAD_REQUEST,
        "invalid_path",
        format!("unsupported path {}", uri.path()),
    )
}

pub fn race_error_to_response(err: RaceError) -> Response {
    match err {
        RaceError::Timeout(_) => json_error(StatusCode::REQUEST_TIMEOUT, "timeout", err.to_string()),
        RaceError::NoProviders => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "no_providers", err.to_string())
        }
        RaceError::AllFailed(ref failures) => {
            let details: Vec<_> = failures
                .iter()
                .map(|(id, e)| {
                    json!({
                        "provider": id,
                        "stage": e.stage().as_str(),
                        "message": e.to_string(),
                    })
                })
                .collect();

            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "all_providers_failed",
                    "message": err.to_string(),
                    "failures": details,
                })),
            )
                .into_response()
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
