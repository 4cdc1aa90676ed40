use std::{
    any::Any,
    collections::HashMap,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Instant,
};

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinSet, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::{
    config::{ProviderId, RaceConfig},
    errors::{ProviderError, RaceError},
    model::{AddressRecord, LookupKey},
    provider::{Provider, ProviderResult},
};

/// What a provider task hands to the coordinator.
type ProviderReport = (ProviderId, ProviderResult);

#[derive(Debug, Default)]
struct ProviderStats {
    wins: u64,
    total_latency_ms: f64,
    errors: u64,
}

/// Snapshot of provider performance statistics.
#[derive(Debug, Clone)]
pub struct ProviderStatsSnapshot {
    /// Number of times this provider won the race.
    pub wins: u64,
    /// Average latency in milliseconds for winning calls.
    pub avg_latency_ms: f64,
    /// Number of failed or timed out calls from this provider.
    pub errors: u64,
}

/// Counts a provider task as live until it is dropped, however it ends.
struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A postal-code lookup client that races every provider and keeps the first answer.
///
/// Each lookup spawns one task per provider. The tasks share a cancellation
/// token and a result channel; the first success decides the race, the
/// deadline bounds it, and whatever is still running afterwards is cancelled
/// and reaped in the background.
#[derive(Clone)]
pub struct HedgedCepClient {
    providers: Arc<Vec<Arc<dyn Provider>>>,
    cfg: RaceConfig,
    stats: Arc<Mutex<HashMap<ProviderId, ProviderStats>>>,
    in_flight: Arc<AtomicUsize>,
}

impl HedgedCepClient {
    /// Creates a new hedged lookup client over `providers`, raced in the given order.
    ///
    /// # Example
    /// ```no_run
    /// use std::sync::Arc;
    ///
    /// use hedged_cep_gateway::{
    ///     provider::{http_client, BrasilApiClient, ViaCepClient, BRASILAPI_BASE_URL, VIACEP_BASE_URL},
    ///     HedgedCepClient, Provider, RaceConfig,
    /// };
    ///
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let http = http_client()?;
    /// let providers: Vec<Arc<dyn Provider>> = vec![
    ///     Arc::new(ViaCepClient::new(http.clone(), VIACEP_BASE_URL)),
    ///     Arc::new(BrasilApiClient::new(http, BRASILAPI_BASE_URL)),
    /// ];
    ///
    /// let client = HedgedCepClient::new(providers, RaceConfig::default());
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(providers: Vec<Arc<dyn Provider>>, cfg: RaceConfig) -> Self {
        let mut stats_map = HashMap::new();
        for provider in &providers {
            stats_map.insert(provider.id(), ProviderStats::default());
        }

        Self {
            providers: Arc::new(providers),
            cfg,
            stats: Arc::new(Mutex::new(stats_map)),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the ids of the configured providers, in race order.
    pub fn provider_ids(&self) -> Vec<ProviderId> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    /// Returns the race strategy this client was built with.
    pub fn config(&self) -> &RaceConfig {
        &self.cfg
    }

    /// Number of provider tasks started by this client that have not yet finished.
    ///
    /// Drops back to zero shortly after every race, including cancelled losers.
    pub fn in_flight_clients(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Returns a snapshot of accumulated performance statistics for each provider.
    ///
    /// Statistics include wins (successful responses), average latency, and error counts.
    pub fn provider_stats(&self) -> HashMap<ProviderId, ProviderStatsSnapshot> {
        let stats = self.stats.lock().expect("provider stats mutex poisoned");

        stats
            .iter()
            .map(|(id, s)| {
                let avg = if s.wins > 0 {
                    s.total_latency_ms / (s.wins as f64)
                } else {
                    0.0
                };

                (
                    *id,
                    ProviderStatsSnapshot {
                        wins: s.wins,
                        avg_latency_ms: avg,
                        errors: s.errors,
                    },
                )
            })
            .collect()
    }

    /// Looks up `key` on every selected provider at once.
    ///
    /// Returns the first successful record along with the provider that produced it.
    /// A provider failure only ends the race once every provider has failed; the
    /// configured timeout ends it regardless.
    #[tracing::instrument(skip(self, key), fields(cep = %key))]
    pub async fn lookup(&self, key: &LookupKey) -> Result<(ProviderId, AddressRecord), RaceError> {
        let max_idx = self.cfg.max_providers.min(self.providers.len());
        if max_idx == 0 {
            return Err(RaceError::NoProviders);
        }
        let selected_providers = &self.providers[..max_idx];

        let start = Instant::now();
        let selected_ids: Vec<ProviderId> = selected_providers.iter().map(|p| p.id()).collect();

        let cancel = CancellationToken::new();
        // Cancels the race even if this future is dropped mid-flight.
        let race_over = cancel.clone().drop_guard();

        let (tx, mut rx) = mpsc::channel::<ProviderReport>(selected_providers.len());
        let mut clients = JoinSet::new();
        for provider in selected_providers {
            let task = run_provider(
                provider.clone(),
                key.clone(),
                tx.clone(),
                cancel.clone(),
                InFlightGuard::new(&self.in_flight),
            );
            clients.spawn(task.instrument(tracing::Span::current()));
        }
        // The channel now closes exactly when the last provider task is done.
        drop(tx);

        let deadline = time::sleep(self.cfg.overall_timeout);
        tokio::pin!(deadline);

        let mut failures = Vec::new();
        let outcome = loop {
            tokio::select! {
                biased;
                report = rx.recv() => match report {
                    Some((provider_id, Ok(record))) => break Ok((provider_id, record)),
                    Some((provider_id, Err(e))) => failures.push((provider_id, e)),
                    None => break Err(RaceError::AllFailed(std::mem::take(&mut failures))),
                },
                _ = &mut deadline => break Err(RaceError::Timeout(self.cfg.overall_timeout)),
            }
        };

        drop(race_over);
        drop(rx);
        tokio::spawn(drain(clients));

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Err(RaceError::Timeout(limit)) => {
                warn!(?limit, "no provider answered before the deadline");
                if let Ok(mut stats) = self.stats.lock() {
                    for id in selected_ids {
                        if let Some(entry) = stats.get_mut(&id) {
                            entry.errors += 1;
                        }
                    }
                }
                Err(RaceError::Timeout(limit))
            }
            Ok((winner_id, record)) => {
                info!(provider = %winner_id, elapsed_ms, "lookup answered");
                if let Ok(mut stats) = self.stats.lock() {
                    if let Some(entry) = stats.get_mut(&winner_id) {
                        entry.wins += 1;
                        entry.total_latency_ms += elapsed_ms;
                    }
                    for (id, _err) in failures.iter() {
                        if let Some(entry) = stats.get_mut(id) {
                            entry.errors += 1;
                        }
                    }
                }
                Ok((winner_id, record))
            }
            Err(RaceError::AllFailed(failures)) => {
                warn!(failed = failures.len(), "every provider failed");
                if let Ok(mut stats) = self.stats.lock() {
                    for (id, _err) in failures.iter() {
                        if let Some(entry) = stats.get_mut(id) {
                            entry.errors += 1;
                        }
                    }
                }
                Err(RaceError::AllFailed(failures))
            }
            Err(e) => Err(e),
        }
    }
}

/// Runs one provider call and offers its result to the race.
///
/// Gives up as soon as the race is decided, both while the upstream call is
/// pending and while handing the result over.
async fn run_provider(
    provider: Arc<dyn Provider>,
    key: LookupKey,
    tx: mpsc::Sender<ProviderReport>,
    cancel: CancellationToken,
    _in_flight: InFlightGuard,
) {
    let provider_id = provider.id();

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!(provider = %provider_id, "race decided before provider answered");
            return;
        }
        caught = AssertUnwindSafe(provider.fetch(&key)).catch_unwind() => {
            caught.unwrap_or_else(|payload| Err(ProviderError::Panicked(panic_message(&*payload))))
        }
    };

    if let Err(e) = &result {
        warn!(provider = %provider_id, stage = %e.stage(), error = %e, "provider lookup failed");
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!(provider = %provider_id, "discarding result of a decided race");
        }
        sent = tx.send((provider_id, result)) => {
            if sent.is_err() {
                debug!(provider = %provider_id, "race receiver gone, result discarded");
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Reaps provider tasks after the race is decided.
async fn drain(mut clients: JoinSet<()>) {
    while let Some(joined) = clients.join_next().await {
        if let Err(e) = joined {
            if e.is_panic() {
                warn!(error = %e, "provider task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::future::BoxFuture;
    use reqwest::StatusCode;

    use super::*;
    use crate::{
        errors::FailureStage,
        model::{AddressFields, BrasilApiAddress},
    };

    #[derive(Clone, Copy)]
    enum Behaviour {
        Succeed,
        Fail,
        Panic,
    }

    struct StubProvider {
        id: ProviderId,
        delay: Duration,
        behaviour: Behaviour,
        calls: Arc<AtomicUsize>,
    }

    impl StubProvider {
        fn new(id: &'static str, delay_ms: u64, behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                id: ProviderId(id),
                delay: Duration::from_millis(delay_ms),
                behaviour,
                calls: Arc::new(AtomicUsize::new(0)),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Provider for StubProvider {
        fn id(&self) -> ProviderId {
            self.id
        }

        fn fetch<'a>(&'a self, key: &'a LookupKey) -> BoxFuture<'a, ProviderResult> {
            async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                time::sleep(self.delay).await;
                match self.behaviour {
                    Behaviour::Succeed => Ok(AddressRecord::new(
                        self.id,
                        AddressFields::BrasilApi(BrasilApiAddress {
                            cep: key.to_string(),
                            city: "São Paulo".into(),
                            ..Default::default()
                        }),
                    )),
                    Behaviour::Fail => Err(ProviderError::Status(StatusCode::SERVICE_UNAVAILABLE)),
                    Behaviour::Panic => panic!("stub provider blew up"),
                }
            }
            .boxed()
        }
    }

    fn client(providers: Vec<Arc<StubProvider>>, timeout_ms: u64) -> HedgedCepClient {
        let providers = providers
            .into_iter()
            .map(|p| p as Arc<dyn Provider>)
            .collect();
        HedgedCepClient::new(
            providers,
            RaceConfig::with_timeout(Duration::from_millis(timeout_ms)),
        )
    }

    fn key() -> LookupKey {
        LookupKey::new("01001000").unwrap()
    }

    async fn wait_until_idle(client: &HedgedCepClient) {
        for _ in 0..200 {
            if client.in_flight_clients() == 0 {
                return;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "{} provider tasks still running",
            client.in_flight_clients()
        );
    }

    #[tokio::test]
    async fn fastest_success_wins_regardless_of_order() {
        let fast = StubProvider::new("fast", 10, Behaviour::Succeed);
        let slow = StubProvider::new("slow", 300, Behaviour::Succeed);

        let (winner, record) = client(vec![slow.clone(), fast.clone()], 1_000)
            .lookup(&key())
            .await
            .unwrap();

        assert_eq!(winner, ProviderId("fast"));
        assert_eq!(record.source, ProviderId("fast"));
        assert_eq!(record.postal_code(), "01001000");
        assert_eq!(fast.calls(), 1);
        assert_eq!(slow.calls(), 1);
    }

    #[tokio::test]
    async fn one_failure_does_not_decide_the_race() {
        let broken = StubProvider::new("broken", 0, Behaviour::Fail);
        let healthy = StubProvider::new("healthy", 50, Behaviour::Succeed);
        let client = client(vec![broken, healthy], 1_000);

        let (winner, _) = client.lookup(&key()).await.unwrap();
        assert_eq!(winner, ProviderId("healthy"));

        let stats = client.provider_stats();
        assert_eq!(stats[&ProviderId("healthy")].wins, 1);
        assert_eq!(stats[&ProviderId("broken")].errors, 1);
    }

    #[tokio::test]
    async fn all_failures_are_reported() {
        let a = StubProvider::new("a", 5, Behaviour::Fail);
        let b = StubProvider::new("b", 20, Behaviour::Fail);

        let err = client(vec![a, b], 1_000).lookup(&key()).await.unwrap_err();

        match err {
            RaceError::AllFailed(failures) => {
                let mut ids: Vec<_> = failures.iter().map(|(id, _)| id.0).collect();
                ids.sort_unstable();
                assert_eq!(ids, vec!["a", "b"]);
            }
            other => panic!("expected AllFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_providers_time_out_and_are_cancelled() {
        let a = StubProvider::new("a", 5_000, Behaviour::Succeed);
        let b = StubProvider::new("b", 5_000, Behaviour::Succeed);
        let client = client(vec![a, b], 100);

        let start = Instant::now();
        let err = client.lookup(&key()).await.unwrap_err();

        assert!(matches!(err, RaceError::Timeout(d) if d == Duration::from_millis(100)));
        assert!(start.elapsed() < Duration::from_secs(2));
        wait_until_idle(&client).await;

        let stats = client.provider_stats();
        assert_eq!(stats[&ProviderId("a")].errors, 1);
        assert_eq!(stats[&ProviderId("b")].errors, 1);
    }

    #[tokio::test]
    async fn late_losers_do_not_leak_tasks() {
        let winner = StubProvider::new("winner", 1, Behaviour::Succeed);
        let loser = StubProvider::new("loser", 10_000, Behaviour::Succeed);
        let client = client(vec![winner, loser.clone()], 1_000);

        for _ in 0..50 {
            let (id, _) = client.lookup(&key()).await.unwrap();
            assert_eq!(id, ProviderId("winner"));
        }

        wait_until_idle(&client).await;
        assert_eq!(loser.calls(), 50);
    }

    #[tokio::test]
    async fn panicking_provider_is_contained() {
        let boom = StubProvider::new("boom", 0, Behaviour::Panic);
        let ok = StubProvider::new("ok", 20, Behaviour::Succeed);
        let client = client(vec![boom, ok], 1_000);

        let (id, _) = client.lookup(&key()).await.unwrap();
        assert_eq!(id, ProviderId("ok"));
        wait_until_idle(&client).await;
    }

    #[tokio::test]
    async fn panics_are_reported_as_failures() {
        let a = StubProvider::new("a", 0, Behaviour::Panic);
        let b = StubProvider::new("b", 10, Behaviour::Panic);
        let client = client(vec![a, b], 1_000);

        let err = client.lookup(&key()).await.unwrap_err();
        match &err {
            RaceError::AllFailed(failures) => {
                let mut ids: Vec<_> = failures.iter().map(|(id, _)| id.0).collect();
                ids.sort_unstable();
                assert_eq!(ids, vec!["a", "b"]);
                for (_, e) in failures {
                    assert_eq!(e.stage(), FailureStage::Task);
                    assert_eq!(e.to_string(), "provider panicked: stub provider blew up");
                }
            }
            other => panic!("expected AllFailed, got {other:?}"),
        }
        assert!(err.to_string().contains("a [task]: provider panicked"));
        wait_until_idle(&client).await;
    }

    #[tokio::test]
    async fn max_providers_limits_fan_out() {
        let first = StubProvider::new("first", 5, Behaviour::Succeed);
        let second = StubProvider::new("second", 0, Behaviour::Succeed);
        let providers: Vec<Arc<dyn Provider>> = vec![first, second.clone()];
        let cfg = RaceConfig {
            max_providers: 1,
            ..RaceConfig::default()
        };

        let client = HedgedCepClient::new(providers, cfg);
        assert_eq!(client.config().max_providers, 1);

        let (id, _) = client.lookup(&key()).await.unwrap();

        assert_eq!(id, ProviderId("first"));
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn no_providers_is_an_error() {
        let err = HedgedCepClient::new(Vec::new(), RaceConfig::default())
            .lookup(&key())
            .await
            .unwrap_err();
        assert!(matches!(err, RaceError::NoProviders));
    }
}
