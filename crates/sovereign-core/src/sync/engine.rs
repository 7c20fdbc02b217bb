use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::watch;

use super::{collection_cache_id, CycleReport, SyncOutcome, COUNTRIES, LAST_SYNC_KEY, PROJECTS};
use crate::auth::AuthProvider;
use crate::config::DEFAULT_CACHE_TTL_SECS;
use crate::models::{MirrorStats, RemoteCountry, RemoteProject, UpsertOutcome};
use crate::remote::{RemoteApi, RemoteError};
use crate::services::{CacheManager, OperationQueue, Store};
use crate::state::{SyncSnapshot, SyncState};
use crate::util::now_millis;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleMode {
    Full,
    PushOnly,
}

/// Clears the in-flight flag when the cycle ends, even on error.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drains the operation queue and refreshes local mirrors.
///
/// At most one cycle runs per engine; a trigger that arrives mid-cycle gets
/// [`SyncOutcome::Coalesced`] and the caller relies on the running cycle.
pub struct SyncEngine {
    store: Store,
    queue: OperationQueue,
    cache: CacheManager,
    remote: Arc<dyn RemoteApi>,
    auth: Arc<dyn AuthProvider>,
    cache_ttl: Duration,
    in_flight: AtomicBool,
    snapshot: watch::Sender<SyncSnapshot>,
}

impl SyncEngine {
    pub fn new(store: Store, remote: Arc<dyn RemoteApi>, auth: Arc<dyn AuthProvider>) -> Self {
        let (snapshot, _) = watch::channel(SyncSnapshot::default());
        Self {
            queue: OperationQueue::new(store.clone()),
            cache: CacheManager::new(store.clone()),
            store,
            remote,
            auth,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            in_flight: AtomicBool::new(false),
            snapshot,
        }
    }

    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub const fn store(&self) -> &Store {
        &self.store
    }

    pub const fn queue(&self) -> &OperationQueue {
        &self.queue
    }

    pub const fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn remote(&self) -> Arc<dyn RemoteApi> {
        Arc::clone(&self.remote)
    }

    pub fn auth(&self) -> Arc<dyn AuthProvider> {
        Arc::clone(&self.auth)
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> SyncSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receive every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Re-read the queue counts into the snapshot.
    pub async fn refresh_counts(&self) -> Result<()> {
        let stats = self.store.stats().await?;
        self.snapshot.send_modify(|snapshot| {
            snapshot.pending = stats.pending_operations;
            snapshot.failed = stats.failed_operations;
        });
        Ok(())
    }

    /// One full cycle: push the queue, then pull remote state.
    pub async fn sync(&self) -> Result<SyncOutcome> {
        self.run(CycleMode::Full).await
    }

    /// Push phase only, for the background task.
    pub async fn push_only(&self) -> Result<SyncOutcome> {
        self.run(CycleMode::PushOnly).await
    }

    async fn run(&self, mode: CycleMode) -> Result<SyncOutcome> {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            tracing::debug!("Sync already in progress; coalescing trigger");
            return Ok(SyncOutcome::Coalesced);
        };

        self.snapshot.send_modify(|snapshot| {
            snapshot.state = SyncState::Syncing;
            snapshot.progress = 0;
        });

        match self.cycle(mode).await {
            Ok(report) => Ok(SyncOutcome::Completed(report)),
            Err(error) => {
                tracing::error!("Sync cycle aborted: {}", error);
                self.snapshot.send_modify(|snapshot| {
                    snapshot.state = SyncState::Error;
                    snapshot.sync_error = Some(error.to_string());
                });
                Err(error)
            }
        }
    }

    async fn cycle(&self, mode: CycleMode) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        match self.auth.access_token().await {
            Ok(token) => {
                let all_unreachable = self.push(&token, &mut report).await?;
                match mode {
                    // pull decides reachability for a full cycle
                    CycleMode::Full if !report.unauthorized => {
                        self.pull(&token, &mut report).await?;
                    }
                    CycleMode::PushOnly if all_unreachable => {
                        let error = Error::NetworkUnreachable(
                            "no queued operation reached the server".to_string(),
                        );
                        report.cycle_error = Some(error.to_string());
                    }
                    _ => {}
                }
            }
            Err(error) => {
                self.auth.on_unauthorized().await;
                report.unauthorized = true;
                report.cycle_error = Some(Error::Unauthorized(error.to_string()).to_string());
            }
        }

        self.finish(&report).await?;
        Ok(report)
    }

    /// Replay pending operations in FIFO order.
    ///
    /// Returns true when at least one replay was attempted and every attempt
    /// failed because the server could not be reached.
    async fn push(&self, token: &str, report: &mut CycleReport) -> Result<bool> {
        let pending = self.queue.list_pending().await?;
        let total = pending.len();
        let mut unreachable = 0;

        if total > 0 {
            tracing::info!("Pushing {} queued operations", total);
        }

        for (index, operation) in pending.iter().enumerate() {
            match self.remote.replay(operation, token).await {
                Ok(()) => {
                    self.queue.remove(operation.id).await?;
                    report.pushed.push(operation.id);
                }
                Err(RemoteError::Unauthorized(message)) => {
                    tracing::warn!(
                        "Operation {} rejected as unauthorized; stopping cycle",
                        operation.id
                    );
                    self.auth.on_unauthorized().await;
                    report.unauthorized = true;
                    report.cycle_error = Some(Error::Unauthorized(message).to_string());
                    return Ok(false);
                }
                Err(error) => {
                    if error.is_unreachable() {
                        unreachable += 1;
                    }
                    let failure = Error::ItemReplayFailed {
                        id: operation.id,
                        reason: error.to_string(),
                    };
                    tracing::warn!("{}", failure);

                    match self
                        .queue
                        .record_failure(operation.id, &error.to_string())
                        .await?
                    {
                        Some(record) if record.became_terminal() => {
                            tracing::warn!(
                                "Operation {} failed {} times; marked as failed",
                                operation.id,
                                record.retries
                            );
                            report.newly_failed.push(operation.id);
                        }
                        Some(_) => report.still_pending.push(operation.id),
                        None => tracing::debug!(
                            "Operation {} was removed before its failure was recorded",
                            operation.id
                        ),
                    }
                }
            }

            self.publish_progress(index + 1, total);
        }

        Ok(total > 0 && unreachable == total)
    }

    async fn pull(&self, token: &str, report: &mut CycleReport) -> Result<()> {
        let now = now_millis();

        for collection in [COUNTRIES, PROJECTS] {
            let records = match self.remote.fetch_collection(collection, token).await {
                Ok(records) => records,
                Err(RemoteError::Unauthorized(message)) => {
                    self.auth.on_unauthorized().await;
                    report.unauthorized = true;
                    report.cycle_error = Some(Error::Unauthorized(message).to_string());
                    return Ok(());
                }
                Err(error) => {
                    tracing::warn!("Pull of {} failed: {}", collection, error);
                    let reason = format!("pull of {collection} failed: {error}");
                    let error = if error.is_unreachable() {
                        Error::NetworkUnreachable(reason)
                    } else {
                        Error::Remote(reason)
                    };
                    report.cycle_error = Some(error.to_string());
                    return Ok(());
                }
            };

            let stats = if collection == COUNTRIES {
                let stats = self.mirror::<RemoteCountry>(&records, collection, now).await?;
                report.countries = stats;
                stats
            } else {
                let stats = self.mirror::<RemoteProject>(&records, collection, now).await?;
                report.projects = stats;
                stats
            };

            self.cache
                .put_with_ttl(
                    &collection_cache_id(collection),
                    collection,
                    serde_json::Value::Array(records),
                    self.cache_ttl,
                )
                .await?;
            self.store
                .set_sync_status(
                    collection,
                    &serde_json::json!({ "synced_at": now, "count": stats.total() }),
                )
                .await?;

            tracing::info!(
                "Pulled {}: {} inserted, {} updated, {} skipped",
                collection,
                stats.inserted,
                stats.updated,
                stats.skipped
            );
        }

        report.pulled = true;
        Ok(())
    }

    async fn mirror<T>(
        &self,
        records: &[serde_json::Value],
        collection: &str,
        now: i64,
    ) -> Result<MirrorStats>
    where
        T: DeserializeOwned + MirrorRecord,
    {
        let mut stats = MirrorStats::default();
        for value in records {
            let record = match serde_json::from_value::<T>(value.clone()) {
                Ok(record) if !record.natural_key().trim().is_empty() => record,
                Ok(_) => {
                    tracing::warn!("Skipping {} record without a key", collection);
                    stats.skipped += 1;
                    continue;
                }
                Err(error) => {
                    tracing::warn!("Skipping malformed {} record: {}", collection, error);
                    stats.skipped += 1;
                    continue;
                }
            };
            stats.record(record.upsert(&self.store, now).await?);
        }
        Ok(stats)
    }

    async fn finish(&self, report: &CycleReport) -> Result<()> {
        let stats = self.store.stats().await?;

        if let Some(error) = &report.cycle_error {
            tracing::error!("Sync cycle failed: {}", error);
            self.snapshot.send_modify(|snapshot| {
                snapshot.state = SyncState::Error;
                snapshot.sync_error = Some(error.clone());
                snapshot.pending = stats.pending_operations;
                snapshot.failed = stats.failed_operations;
            });
            return Ok(());
        }

        let now = now_millis();
        self.store
            .set_sync_status(LAST_SYNC_KEY, &serde_json::json!(now))
            .await?;
        tracing::info!(
            "Sync cycle finished: {} pushed, {} pending, {} failed",
            report.pushed.len(),
            stats.pending_operations,
            stats.failed_operations
        );
        self.snapshot.send_modify(|snapshot| {
            snapshot.state = SyncState::Idle;
            snapshot.sync_error = None;
            snapshot.last_sync_time = Some(now);
            snapshot.progress = 100;
            snapshot.pending = stats.pending_operations;
            snapshot.failed = stats.failed_operations;
        });
        Ok(())
    }

    fn publish_progress(&self, done: usize, total: usize) {
        let percent = if total == 0 { 100 } else { done * 100 / total };
        let progress = u8::try_from(percent).unwrap_or(100);
        self.snapshot.send_modify(|snapshot| snapshot.progress = progress);
    }
}

/// Remote record that can be upserted into its local mirror.
#[async_trait::async_trait]
trait MirrorRecord: Send + Sync {
    fn natural_key(&self) -> &str;

    async fn upsert(&self, store: &Store, synced_at: i64) -> Result<UpsertOutcome>;
}

#[async_trait::async_trait]
impl MirrorRecord for RemoteCountry {
    fn natural_key(&self) -> &str {
        &self.country_code
    }

    async fn upsert(&self, store: &Store, synced_at: i64) -> Result<UpsertOutcome> {
        store.upsert_country(self, synced_at).await
    }
}

#[async_trait::async_trait]
impl MirrorRecord for RemoteProject {
    fn natural_key(&self) -> &str {
        &self.id
    }

    async fn upsert(&self, store: &Store, synced_at: i64) -> Result<UpsertOutcome> {
        store.upsert_project(self, synced_at).await
    }
}
