//! Decides when the sync engine runs.
//!
//! Triggers are connectivity transitions, a periodic sync timer and an hourly
//! cache sweep. The platform background task gets its own push-only entry
//! point that opens the store cold.

mod connectivity;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

pub use connectivity::{ConnectivityEvent, ConnectivityMonitor};

use crate::auth::AuthProvider;
use crate::config::ClientConfig;
use crate::realtime::{RealtimeStatus, ReconnectMachine, ReconnectPolicy};
use crate::remote::RemoteApi;
use crate::services::StoreHandle;
use crate::sync::{SyncEngine, SyncOutcome};
use crate::Result;

/// Identifier the platform background scheduler registers the push task under.
pub const BACKGROUND_TASK_ID: &str = "sync-operations";

struct Timers {
    sync: JoinHandle<()>,
    sweep: JoinHandle<()>,
}

impl Timers {
    fn abort(self) {
        self.sync.abort();
        self.sweep.abort();
    }
}

pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    sync_interval: Duration,
    sweep_interval: Duration,
    realtime: Mutex<ReconnectMachine>,
    timers: Mutex<Option<Timers>>,
}

impl SyncScheduler {
    pub fn new(engine: Arc<SyncEngine>, config: &ClientConfig) -> Self {
        Self {
            engine,
            sync_interval: config.sync_interval(),
            sweep_interval: config.sweep_interval(),
            realtime: Mutex::new(ReconnectMachine::new(ReconnectPolicy::from_config(config))),
            timers: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_intervals(mut self, sync: Duration, sweep: Duration) -> Self {
        self.sync_interval = sync;
        self.sweep_interval = sweep;
        self
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn realtime_status(&self) -> RealtimeStatus {
        self.realtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status()
    }

    /// React to a connectivity transition.
    ///
    /// Going online runs a cycle right away and revives the realtime channel;
    /// going offline only parks the channel.
    pub async fn handle_event(&self, event: ConnectivityEvent) -> Result<Option<SyncOutcome>> {
        match event {
            ConnectivityEvent::WentOnline => {
                tracing::info!("Back online; starting sync");
                self.realtime
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .reset();
                self.engine.sync().await.map(Some)
            }
            ConnectivityEvent::WentOffline => {
                tracing::info!("Offline; queued operations will wait for connectivity");
                self.realtime
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .disconnect();
                Ok(None)
            }
        }
    }

    /// Start the periodic sync and sweep timers, replacing any running ones.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_periodic(&self) {
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = timers.take() {
            tracing::debug!("Restarting periodic sync timers");
            previous.abort();
        }

        let engine = Arc::clone(&self.engine);
        let sync_interval = self.sync_interval;
        let sync = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sync_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(error) = engine.sync().await {
                    tracing::warn!("Periodic sync failed: {}", error);
                }
            }
        });

        let engine = Arc::clone(&self.engine);
        let sweep_interval = self.sweep_interval;
        let sweep = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(Instant::now() + sweep_interval, sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(error) = engine.cache().sweep_expired().await {
                    tracing::warn!("Cache sweep failed: {}", error);
                }
            }
        });

        *timers = Some(Timers { sync, sweep });
        tracing::info!(
            "Periodic sync every {}s, cache sweep every {}s",
            sync_interval.as_secs(),
            sweep_interval.as_secs()
        );
    }

    /// Stop the timers. Safe to call when nothing is running.
    pub fn stop_periodic(&self) {
        if let Some(timers) = self
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            timers.abort();
            tracing::info!("Periodic sync stopped");
        }
    }

    pub fn is_periodic_running(&self) -> bool {
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Consume connectivity events until every sender is dropped.
    pub async fn run(&self, mut events: mpsc::Receiver<ConnectivityEvent>) {
        while let Some(event) = events.recv().await {
            if let Err(error) = self.handle_event(event).await {
                tracing::error!("Sync after {:?} failed: {}", event, error);
            }
        }
        tracing::debug!("Connectivity channel closed");
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.stop_periodic();
    }
}

/// Entry point for the platform background task.
///
/// Opens the store through `handle` (the app process may or may not have it
/// open) and replays the queue without pulling.
pub async fn run_background_push(
    handle: &StoreHandle,
    remote: Arc<dyn RemoteApi>,
    auth: Arc<dyn AuthProvider>,
) -> Result<SyncOutcome> {
    tracing::info!("Background task {} starting", BACKGROUND_TASK_ID);
    let store = handle.open().await?;
    let engine = SyncEngine::new(store, remote, auth);
    let outcome = engine.push_only().await?;
    if let Some(report) = outcome.report() {
        tracing::info!(
            "Background task {} pushed {} operations",
            BACKGROUND_TASK_ID,
            report.pushed.len()
        );
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenAuth;
    use crate::models::{CachedContent, HttpMethod, NewOperation, QueuedOperation};
    use crate::realtime::RealtimeState;
    use crate::remote::{RemoteError, RemoteResult};
    use crate::services::Store;
    use crate::state::SyncState;
    use crate::util::now_millis;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct SwitchRemote {
        offline: AtomicBool,
        replays: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl RemoteApi for SwitchRemote {
        async fn health_check(&self, _token: Option<&str>) -> RemoteResult<()> {
            if self.offline.load(Ordering::SeqCst) {
                Err(RemoteError::Unreachable("offline".into()))
            } else {
                Ok(())
            }
        }

        async fn replay(&self, _operation: &QueuedOperation, _token: &str) -> RemoteResult<()> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(RemoteError::Unreachable("offline".into()));
            }
            self.replays.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn fetch_collection(
            &self,
            _collection: &str,
            _token: &str,
        ) -> RemoteResult<Vec<serde_json::Value>> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(RemoteError::Unreachable("offline".into()));
            }
            Ok(Vec::new())
        }
    }

    async fn scheduler(remote: Arc<SwitchRemote>) -> SyncScheduler {
        let store = Store::open_in_memory().await.unwrap();
        let engine = Arc::new(SyncEngine::new(
            store,
            remote,
            Arc::new(StaticTokenAuth::new("token")),
        ));
        SyncScheduler::new(engine, &ClientConfig::default())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn going_online_syncs_and_resets_realtime() {
        let remote = Arc::new(SwitchRemote::default());
        let scheduler = scheduler(remote.clone()).await;
        {
            let mut realtime = scheduler.realtime.lock().unwrap();
            realtime.begin_connect();
            realtime.connection_lost();
        }

        let outcome = scheduler
            .handle_event(ConnectivityEvent::WentOnline)
            .await
            .unwrap();
        assert!(matches!(outcome, Some(SyncOutcome::Completed(_))));
        assert_eq!(scheduler.engine().snapshot().state, SyncState::Idle);
        assert_eq!(scheduler.realtime_status().attempts, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn going_offline_does_not_sync() {
        let remote = Arc::new(SwitchRemote::default());
        let scheduler = scheduler(remote.clone()).await;
        scheduler
            .engine()
            .queue()
            .enqueue(&NewOperation::new(HttpMethod::Post, "/projects"))
            .await
            .unwrap();

        let outcome = scheduler
            .handle_event(ConnectivityEvent::WentOffline)
            .await
            .unwrap();
        assert!(outcome.is_none());
        assert_eq!(remote.replays.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.realtime_status().state, RealtimeState::Disconnected);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn start_periodic_is_idempotent() {
        let remote = Arc::new(SwitchRemote::default());
        let scheduler = scheduler(remote)
            .await
            .with_intervals(Duration::from_secs(60), Duration::from_secs(60));

        scheduler.start_periodic();
        scheduler.start_periodic();
        assert!(scheduler.is_periodic_running());

        // the first tick fires immediately
        let mut rx = scheduler.engine().subscribe();
        tokio::time::timeout(Duration::from_secs(5), async {
            while rx.borrow_and_update().last_sync_time.is_none() {
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        scheduler.stop_periodic();
        scheduler.stop_periodic();
        assert!(!scheduler.is_periodic_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sweep_timer_evicts_expired_entries() {
        let remote = Arc::new(SwitchRemote::default());
        let scheduler = scheduler(remote)
            .await
            .with_intervals(Duration::from_secs(3600), Duration::from_millis(20));
        let now = now_millis();
        scheduler
            .engine()
            .cache()
            .put(&CachedContent {
                id: "stale".to_string(),
                content_type: "countries".to_string(),
                data: serde_json::json!([]),
                timestamp: now - 2_000,
                expires_at: now - 1_000,
            })
            .await
            .unwrap();

        scheduler.start_periodic();
        tokio::time::sleep(Duration::from_millis(200)).await;
        scheduler.stop_periodic();

        assert!(scheduler
            .engine()
            .store()
            .get_content("stale")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_drains_events_until_closed() {
        let remote = Arc::new(SwitchRemote::default());
        let scheduler = scheduler(remote.clone()).await;
        scheduler
            .engine()
            .queue()
            .enqueue(&NewOperation::new(HttpMethod::Post, "/projects"))
            .await
            .unwrap();

        let (tx, rx) = mpsc::channel(4);
        tx.send(ConnectivityEvent::WentOffline).await.unwrap();
        tx.send(ConnectivityEvent::WentOnline).await.unwrap();
        drop(tx);

        scheduler.run(rx).await;
        assert_eq!(remote.replays.load(Ordering::SeqCst), 1);
        assert!(scheduler
            .engine()
            .queue()
            .list_pending()
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn monitor_reports_only_transitions() {
        let remote = Arc::new(SwitchRemote::default());
        let mut monitor = ConnectivityMonitor::new(remote.clone(), Duration::from_secs(1));

        assert_eq!(monitor.probe().await, Some(ConnectivityEvent::WentOnline));
        assert_eq!(monitor.probe().await, None);

        remote.offline.store(true, Ordering::SeqCst);
        assert_eq!(monitor.probe().await, Some(ConnectivityEvent::WentOffline));
        assert_eq!(monitor.probe().await, None);
        assert_eq!(monitor.is_online(), Some(false));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn spawned_monitor_feeds_scheduler() {
        let remote = Arc::new(SwitchRemote::default());
        let monitor = ConnectivityMonitor::new(remote.clone(), Duration::from_millis(10));
        let (tx, mut rx) = mpsc::channel(4);
        let task = monitor.spawn(tx);

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(event, Some(ConnectivityEvent::WentOnline));

        drop(rx);
        tokio::time::timeout(Duration::from_secs(5), async {
            remote.offline.store(true, Ordering::SeqCst);
            task.await.unwrap();
        })
        .await
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn background_push_opens_cold_store() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sovereign.db");

        let foreground = Store::open(path.clone()).await.unwrap();
        foreground
            .add_operation(&NewOperation::new(HttpMethod::Delete, "/projects/9"))
            .await
            .unwrap();

        let remote = Arc::new(SwitchRemote::default());
        let handle = StoreHandle::file(path);
        let outcome = run_background_push(
            &handle,
            remote.clone(),
            Arc::new(StaticTokenAuth::new("token")),
        )
        .await
        .unwrap();

        assert_eq!(outcome.report().map(|r| r.pushed.len()), Some(1));
        assert!(handle.is_open());
        assert_eq!(foreground.stats().await.unwrap().pending_operations, 0);
    }
}
