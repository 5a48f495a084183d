use crate::client::{BackendClient, ScanRequest};
use crate::dashboard::{Dashboard, DashboardSnapshot};
use crate::devices::ScanResult;
use crate::error::PollError;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, broadcast};
use tokio::time::{self, MissedTickBehavior};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PollState {
    Idle,
    Polling,
}

#[derive(Debug)]
pub enum TickOutcome {
    Rendered(u64),
    Failed(PollError),
    Skipped,
}

/// Holds the cycle lock; flips the poller back to idle however the fetch settles.
struct CycleGuard<'a> {
    _lock: MutexGuard<'a, ()>,
    polling: &'a AtomicBool,
}

impl<'a> CycleGuard<'a> {
    fn enter(lock: MutexGuard<'a, ()>, polling: &'a AtomicBool) -> Self {
        polling.store(true, Ordering::SeqCst);
        Self {
            _lock: lock,
            polling,
        }
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.polling.store(false, Ordering::SeqCst);
    }
}

pub struct ScanPoller {
    client: BackendClient,
    dashboard: RwLock<Dashboard>,
    cycle: Mutex<()>,
    polling: AtomicBool,
    rendered: broadcast::Sender<u64>,
}

impl ScanPoller {
    pub fn new(client: BackendClient, dashboard: Dashboard) -> Self {
        let (rendered, _) = broadcast::channel(16);
        Self {
            client,
            dashboard: RwLock::new(dashboard),
            cycle: Mutex::new(()),
            polling: AtomicBool::new(false),
            rendered,
        }
    }

    pub fn state(&self) -> PollState {
        if self.polling.load(Ordering::SeqCst) {
            PollState::Polling
        } else {
            PollState::Idle
        }
    }

    pub async fn dashboard(&self) -> RwLockReadGuard<'_, Dashboard> {
        self.dashboard.read().await
    }

    /// Fires with the dashboard generation after every settled cycle.
    pub fn subscribe(&self) -> broadcast::Receiver<u64> {
        self.rendered.subscribe()
    }

    /// Passive poll. Waits for any cycle already in flight.
    pub async fn poll(&self) -> Result<DashboardSnapshot, PollError> {
        let guard = CycleGuard::enter(self.cycle.lock().await, &self.polling);
        self.settle(guard, self.client.fetch_devices()).await
    }

    /// Timer-driven poll. Skipped when a cycle is still in flight.
    pub async fn tick(&self) -> TickOutcome {
        let Ok(lock) = self.cycle.try_lock() else {
            tracing::debug!("Previous poll still in flight, skipping tick");
            return TickOutcome::Skipped;
        };
        let guard = CycleGuard::enter(lock, &self.polling);
        match self.settle(guard, self.client.fetch_devices()).await {
            Ok(snapshot) => TickOutcome::Rendered(snapshot.generation),
            Err(err) => TickOutcome::Failed(err),
        }
    }

    /// Active scan from already validated coordinates. Queues behind a running cycle.
    pub async fn scan(&self, req: ScanRequest) -> Result<DashboardSnapshot, PollError> {
        let guard = CycleGuard::enter(self.cycle.lock().await, &self.polling);
        self.settle(guard, self.client.scan(req)).await
    }

    /// Active scan from raw user input; invalid input never reaches the backend.
    pub async fn scan_input(
        &self,
        latitude: &str,
        longitude: &str,
    ) -> Result<DashboardSnapshot, PollError> {
        match ScanRequest::parse(latitude, longitude) {
            Ok(req) => self.scan(req).await,
            Err(err) => {
                tracing::info!("Rejected scan input: {err}");
                self.fail(&err).await;
                Err(err)
            }
        }
    }

    pub async fn run(self: Arc<Self>, every: Duration) {
        let mut interval = time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(
            "Polling {}/api/devices every {}s",
            self.client.base_url(),
            every.as_secs_f32()
        );
        loop {
            // first tick completes immediately, giving the startup poll
            interval.tick().await;
            let poller = Arc::clone(&self);
            // the cycle runs detached so a slow backend cannot stall the timer
            tokio::spawn(async move {
                match poller.tick().await {
                    TickOutcome::Rendered(generation) => {
                        tracing::debug!("Tick rendered generation {generation}")
                    }
                    TickOutcome::Failed(err) => tracing::debug!("Tick failed ({:?})", err.kind()),
                    TickOutcome::Skipped => {}
                }
            });
        }
    }

    async fn settle<T, F>(&self, _guard: CycleGuard<'_>, fetch: F) -> Result<DashboardSnapshot, PollError>
    where
        F: Future<Output = Result<T, PollError>>,
        T: Into<ScanResult>,
    {
        match fetch.await {
            Ok(resp) => {
                let result: ScanResult = resp.into();
                let mut dash = self.dashboard.write().await;
                dash.render(&result);
                tracing::info!(
                    "Rendered {} devices ({} new), generation {}",
                    dash.table.len(),
                    result.new_devices().len(),
                    dash.generation
                );
                let _ = self.rendered.send(dash.generation);
                Ok(dash.snapshot())
            }
            Err(err) => {
                tracing::warn!("Poll cycle failed: {err}");
                self.fail(&err).await;
                Err(err)
            }
        }
    }

    async fn fail(&self, err: &PollError) {
        let mut dash = self.dashboard.write().await;
        dash.report(err);
        let _ = self.rendered.send(dash.generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::error::ErrorKind;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone, Default)]
    struct Backend {
        hits: Arc<AtomicUsize>,
    }

    async fn spawn_backend(router: Router) -> anyhow::Result<String> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        Ok(format!("http://{addr}"))
    }

    fn poller(base_url: &str) -> anyhow::Result<Arc<ScanPoller>> {
        poller_with_timeout(base_url, Duration::from_secs(2))
    }

    fn poller_with_timeout(base_url: &str, timeout: Duration) -> anyhow::Result<Arc<ScanPoller>> {
        let config = AppConfig::default();
        let client = BackendClient::new(base_url, timeout)?;
        Ok(Arc::new(ScanPoller::new(client, Dashboard::new(&config))))
    }

    async fn devices(State(backend): State<Backend>) -> Json<Value> {
        backend.hits.fetch_add(1, Ordering::SeqCst);
        Json(json!({
            "devices": [
                {"ip": "10.0.0.5", "mac": "AA:BB:CC:DD:EE:01", "name": "Phone", "zone": "Living Room", "distance": 3.2},
                {"ip": "10.0.0.8", "mac": "AA:BB:CC:DD:EE:08", "name": "", "zone": "Sur", "distance": 9.45}
            ],
            "new_devices": ["Phone"]
        }))
    }

    async fn scan(State(backend): State<Backend>, Json(body): Json<Value>) -> Json<Value> {
        backend.hits.fetch_add(1, Ordering::SeqCst);
        Json(json!({
            "base": {"lat": body["latitude"], "lon": body["longitude"]},
            "devices": []
        }))
    }

    #[tokio::test]
    async fn poll_renders_backend_devices_in_order() -> anyhow::Result<()> {
        let backend = Backend::default();
        let url = spawn_backend(
            Router::new()
                .route("/api/devices", get(devices))
                .with_state(backend.clone()),
        )
        .await?;
        let poller = poller(&url)?;

        let snap = poller.poll().await?;
        assert_eq!(snap.table.rows.len(), 2);
        assert_eq!(snap.table.rows[1][0], "10.0.0.8");
        let chart = snap.chart.expect("chart after render");
        assert_eq!(chart.labels(), vec!["Phone", "10.0.0.8"]);
        assert_eq!(snap.alert.as_deref(), Some("New device connected: Phone"));
        assert_eq!(poller.state(), PollState::Idle);
        Ok(())
    }

    #[tokio::test]
    async fn active_scan_posts_coordinates() -> anyhow::Result<()> {
        let backend = Backend::default();
        let url = spawn_backend(
            Router::new()
                .route("/api/scan", post(scan))
                .with_state(backend.clone()),
        )
        .await?;
        let poller = poller(&url)?;

        let snap = poller.scan_input("40.0", "-3.0").await?;
        assert!(snap.table.rows.is_empty());
        assert_eq!(snap.chart.map(|c| c.points.len()), Some(0));
        let map = snap.map.expect("map after geolocated scan");
        assert_eq!(map.markers.len(), 1);
        assert_eq!(map.markers[0].position.lat, 40.0);
        assert_eq!(backend.hits.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_the_backend() -> anyhow::Result<()> {
        let backend = Backend::default();
        let url = spawn_backend(
            Router::new()
                .route("/api/scan", post(scan))
                .with_state(backend.clone()),
        )
        .await?;
        let poller = poller(&url)?;

        let err = poller.scan_input("forty", "-3").await.expect_err("rejected");
        assert_eq!(err.kind(), ErrorKind::Input);
        assert_eq!(backend.hits.load(Ordering::SeqCst), 0);
        let dash = poller.dashboard().await;
        assert_eq!(dash.last_error.as_ref().map(|e| e.kind), Some(ErrorKind::Input));
        Ok(())
    }

    #[tokio::test]
    async fn malformed_body_keeps_previous_render() -> anyhow::Result<()> {
        let backend = Backend::default();
        let counter = backend.clone();
        let url = spawn_backend(Router::new().route(
            "/api/devices",
            get(move || {
                let counter = counter.clone();
                async move {
                    if counter.hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        devices(State(counter)).await.into_response()
                    } else {
                        (StatusCode::OK, "{\"devices\": 12}").into_response()
                    }
                }
            }),
        ))
        .await?;
        let poller = poller(&url)?;

        poller.poll().await?;
        let err = poller.poll().await.expect_err("second body is malformed");
        assert_eq!(err.kind(), ErrorKind::Decode);

        let dash = poller.dashboard().await;
        assert_eq!(dash.table.len(), 2);
        assert_eq!(dash.generation, 1);
        assert_eq!(dash.last_error.as_ref().map(|e| e.kind), Some(ErrorKind::Decode));
        Ok(())
    }

    #[tokio::test]
    async fn error_status_is_a_network_failure() -> anyhow::Result<()> {
        let url = spawn_backend(Router::new().route(
            "/api/devices",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        ))
        .await?;
        let poller = poller(&url)?;

        match poller.tick().await {
            TickOutcome::Failed(err) => assert_eq!(err.kind(), ErrorKind::Network),
            other => anyhow::bail!("Unexpected outcome: {other:?}"),
        }
        assert_eq!(poller.state(), PollState::Idle);
        Ok(())
    }

    #[tokio::test]
    async fn timed_out_poll_keeps_previous_render() -> anyhow::Result<()> {
        let backend = Backend::default();
        let stalling = backend.clone();
        let url = spawn_backend(Router::new().route(
            "/api/devices",
            get(move || {
                let stalling = stalling.clone();
                async move {
                    if stalling.hits.load(Ordering::SeqCst) > 0 {
                        tokio::time::sleep(Duration::from_millis(300)).await;
                    }
                    devices(State(stalling)).await
                }
            }),
        ))
        .await?;
        let poller = poller_with_timeout(&url, Duration::from_millis(100))?;

        poller.poll().await?;
        match poller.tick().await {
            TickOutcome::Failed(err) => assert_eq!(err.kind(), ErrorKind::Network),
            other => anyhow::bail!("Unexpected outcome: {other:?}"),
        }
        assert_eq!(poller.state(), PollState::Idle);

        let dash = poller.dashboard().await;
        assert_eq!(dash.generation, 1);
        assert_eq!(dash.table.len(), 2);
        assert_eq!(dash.chart().map(|c| c.series()), Some(vec![3.2, 9.45]));
        assert_eq!(dash.last_error.as_ref().map(|e| e.kind), Some(ErrorKind::Network));
        Ok(())
    }

    #[tokio::test]
    async fn ticks_are_skipped_while_a_cycle_is_in_flight() -> anyhow::Result<()> {
        let backend = Backend::default();
        let slow = backend.clone();
        let url = spawn_backend(Router::new().route(
            "/api/devices",
            get(move || {
                let slow = slow.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    devices(State(slow)).await
                }
            }),
        ))
        .await?;
        let poller = poller(&url)?;

        let first = tokio::spawn({
            let poller = Arc::clone(&poller);
            async move { poller.poll().await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(poller.state(), PollState::Polling);
        assert!(matches!(poller.tick().await, TickOutcome::Skipped));

        first.await??;
        assert_eq!(poller.state(), PollState::Idle);
        assert_eq!(backend.hits.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn run_loop_survives_failing_cycles() -> anyhow::Result<()> {
        let backend = Backend::default();
        let flaky = backend.clone();
        let url = spawn_backend(Router::new().route(
            "/api/devices",
            get(move || {
                let flaky = flaky.clone();
                async move {
                    if flaky.hits.load(Ordering::SeqCst) < 2 {
                        flaky.hits.fetch_add(1, Ordering::SeqCst);
                        StatusCode::SERVICE_UNAVAILABLE.into_response()
                    } else {
                        devices(State(flaky)).await.into_response()
                    }
                }
            }),
        ))
        .await?;
        let poller = poller(&url)?;
        let mut rendered = poller.subscribe();

        let task = tokio::spawn(Arc::clone(&poller).run(Duration::from_millis(50)));
        let generation = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match rendered.recv().await {
                    Ok(generation) if generation > 0 => return generation,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return 0,
                }
            }
        })
        .await?;
        task.abort();

        assert_eq!(generation, 1);
        assert!(backend.hits.load(Ordering::SeqCst) >= 3);
        Ok(())
    }
}
