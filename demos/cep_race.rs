//! Repeated CEP lookups against the public providers.
//!
//! Races ViaCEP and BrasilAPI for a handful of postal codes, a few times each,
//! and prints which provider won how often. Base URLs can be overridden with
//! `VIACEP_BASE_URL` / `BRASILAPI_BASE_URL`.

use std::{
    env,
    sync::Arc,
    time::{Duration, Instant},
};

use hedged_cep_gateway::{
    provider::{http_client, BrasilApiClient, ViaCepClient, BRASILAPI_BASE_URL, VIACEP_BASE_URL},
    HedgedCepClient, LookupKey, Provider, ProviderId, RaceConfig,
};
use tokio::sync::{mpsc, Semaphore};

const CEPS: &[&str] = &["01001000", "20040020", "30130010", "40020000", "70040010"];
const ROUNDS: usize = 20;
const MAX_IN_FLIGHT: usize = 8;

#[derive(Debug)]
enum CallOutcome {
    Ok {
        provider: ProviderId,
        latency: Duration,
    },
    Err {
        error: String,
        latency: Duration,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let http = http_client()?;
    let viacep = env::var("VIACEP_BASE_URL").unwrap_or_else(|_| VIACEP_BASE_URL.to_string());
    let brasilapi =
        env::var("BRASILAPI_BASE_URL").unwrap_or_else(|_| BRASILAPI_BASE_URL.to_string());

    let providers: Vec<Arc<dyn Provider>> = vec![
        Arc::new(ViaCepClient::new(http.clone(), viacep)),
        Arc::new(BrasilApiClient::new(http, brasilapi)),
    ];
    let client = HedgedCepClient::new(providers, RaceConfig::patient());

    let total_calls = CEPS.len() * ROUNDS;
    let (tx, mut rx) = mpsc::channel::<(String, CallOutcome)>(MAX_IN_FLIGHT * 2);
    let semaphore = Arc::new(Semaphore::new(MAX_IN_FLIGHT));

    let consumer = tokio::spawn(async move {
        let mut outcomes = Vec::with_capacity(total_calls);
        while let Some((cep, outcome)) = rx.recv().await {
            match &outcome {
                CallOutcome::Ok { provider, latency } => {
                    println!("[{cep}] OK   provider={provider} latency={latency:?}");
                }
                CallOutcome::Err { error, latency } => {
                    println!("[{cep}] ERR  latency={latency:?} error={error}");
                }
            }
            outcomes.push(outcome);
        }
        outcomes
    });

    for _ in 0..ROUNDS {
        for cep in CEPS {
            let client = client.clone();
            let tx = tx.clone();
            let sem = semaphore.clone();
            let key = LookupKey::new(*cep)?;

            tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.expect("semaphore closed");

                let start = Instant::now();
                let res = client.lookup(&key).await;
                let latency = start.elapsed();

                let outcome = match res {
                    Ok((provider, _record)) => CallOutcome::Ok { provider, latency },
                    Err(e) => CallOutcome::Err {
                        error: e.to_string(),
                        latency,
                    },
                };
                let _ = tx.send((key.to_string(), outcome)).await;
            });
        }
    }

    drop(tx);
    let outcomes = consumer.await?;
    let errors = outcomes
        .iter()
        .filter(|o| matches!(o, CallOutcome::Err { .. }))
        .count();

    println!("\n=== summary ===");
    println!("total calls          : {}", total_calls);
    println!("successes            : {}", total_calls - errors);
    println!("errors (any kind)    : {}", errors);

    for (provider, stats) in client.provider_stats() {
        println!(
            "provider {:>10}: wins = {:4}, errors = {:4}, avg_latency = {:8.3} ms",
            provider, stats.wins, stats.errors, stats.avg_latency_ms,
        );
    }

    Ok(())
}
