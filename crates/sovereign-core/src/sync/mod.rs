//! Push-then-pull reconciliation against the remote API.

mod engine;

use serde::Serialize;

use crate::models::MirrorStats;

pub use engine::SyncEngine;

/// Remote collections mirrored on every full cycle.
pub const COUNTRIES: &str = "countries";
pub const PROJECTS: &str = "projects";

/// SyncStatus key holding the time of the last successful cycle.
pub const LAST_SYNC_KEY: &str = "last_sync";

/// Cache id under which a whole remote collection is kept.
pub fn collection_cache_id(collection: &str) -> String {
    format!("{collection}:all")
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Replayed and removed from the queue
    pub pushed: Vec<i64>,
    /// Failed this cycle but still under the retry ceiling
    pub still_pending: Vec<i64>,
    /// Reached the retry ceiling this cycle
    pub newly_failed: Vec<i64>,
    pub countries: MirrorStats,
    pub projects: MirrorStats,
    pub pulled: bool,
    /// The server rejected the credential; the cycle stopped early
    pub unauthorized: bool,
    /// Set when the cycle as a whole failed
    pub cycle_error: Option<String>,
}

impl CycleReport {
    pub const fn is_success(&self) -> bool {
        self.cycle_error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(CycleReport),
    /// Another cycle was already running in this process
    Coalesced,
}

impl SyncOutcome {
    pub const fn report(&self) -> Option<&CycleReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Coalesced => None,
        }
    }
}
