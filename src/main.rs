//! CEP lookup gateway.
//!
//! Serves `GET /?cep=<value>`, racing ViaCEP and BrasilAPI for every request
//! and answering with whichever responds first.

mod env;

use color_eyre::{eyre::WrapErr, Result};
use env::{build_client, config_from_env};
use hedged_cep_gateway::{logging, server};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    logging::init();

    let cfg = config_from_env()?;
    let client = build_client(&cfg)?;

    let listener = tokio::net::TcpListener::bind(cfg.addr)
        .await
        .wrap_err_with(|| format!("failed to bind {}", cfg.addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        timeout = ?client.config().overall_timeout,
        providers = ?client.provider_ids(),
        "listening"
    );

    axum::serve(listener, server::router(client.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for (provider, stats) in client.provider_stats() {
        tracing::info!(
            %provider,
            wins = stats.wins,
            errors = stats.errors,
            avg_latency_ms = stats.avg_latency_ms,
            "provider stats"
        );
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
