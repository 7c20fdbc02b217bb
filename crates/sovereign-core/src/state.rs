//! Observable sync state shared with UI and CLI consumers.

use serde::Serialize;

/// Engine state machine: `Idle -> Syncing -> {Idle, Error}`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
    Error,
}

impl SyncState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Projection of the store published after every state change.
///
/// Never authoritative: the store is re-read to refresh the counts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SyncSnapshot {
    pub state: SyncState,
    /// Unix ms of the last cycle that finished without a cycle-level error
    pub last_sync_time: Option<i64>,
    pub sync_error: Option<String>,
    /// 0-100 through the push phase of the current cycle
    pub progress: u8,
    pub pending: usize,
    pub failed: usize,
}

impl SyncSnapshot {
    pub const fn is_syncing(&self) -> bool {
        matches!(self.state, SyncState::Syncing)
    }
}
