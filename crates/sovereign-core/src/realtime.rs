//! Reconnect state machine for the realtime push channel.
//!
//! Only the bookkeeping lives here: the transport reports what happened and
//! gets back how long to wait before the next attempt.

use std::time::Duration;

use serde::Serialize;

use crate::config::ClientConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RealtimeState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    pub const fn from_config(config: &ClientConfig) -> Self {
        Self {
            base_delay: config.realtime_base_delay(),
            max_attempts: config.realtime_max_attempts,
        }
    }

    /// `base * 2^attempt`, saturating.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Observable view of the reconnect machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RealtimeStatus {
    pub state: RealtimeState,
    pub attempts: u32,
    pub abandoned: bool,
}

#[derive(Debug, Clone)]
pub struct ReconnectMachine {
    policy: ReconnectPolicy,
    state: RealtimeState,
    attempts: u32,
    abandoned: bool,
}

impl ReconnectMachine {
    pub const fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: RealtimeState::Disconnected,
            attempts: 0,
            abandoned: false,
        }
    }

    pub const fn status(&self) -> RealtimeStatus {
        RealtimeStatus {
            state: self.state,
            attempts: self.attempts,
            abandoned: self.abandoned,
        }
    }

    pub const fn state(&self) -> RealtimeState {
        self.state
    }

    /// Begin a connection attempt. Returns `false` once retries are abandoned.
    pub fn begin_connect(&mut self) -> bool {
        if self.abandoned {
            return false;
        }
        if self.state == RealtimeState::Disconnected {
            self.state = RealtimeState::Connecting;
        }
        true
    }

    /// The transport is up; the attempt counter starts over.
    pub fn connected(&mut self) {
        self.state = RealtimeState::Connected;
        self.attempts = 0;
        self.abandoned = false;
    }

    /// The transport dropped or failed to connect.
    ///
    /// Returns the delay before the next attempt, or `None` when the attempt
    /// budget is exhausted and the machine gives up until [`Self::reset`].
    pub fn connection_lost(&mut self) -> Option<Duration> {
        self.state = RealtimeState::Disconnected;
        if self.abandoned || self.attempts >= self.policy.max_attempts {
            if !self.abandoned {
                tracing::warn!(
                    "Realtime reconnect abandoned after {} attempts",
                    self.attempts
                );
            }
            self.abandoned = true;
            return None;
        }

        let delay = self.policy.delay_for(self.attempts);
        self.attempts += 1;
        tracing::debug!(
            "Realtime reconnect in {}ms (attempt {})",
            delay.as_millis(),
            self.attempts
        );
        Some(delay)
    }

    /// Deliberate disconnect (going offline); no reconnect is scheduled.
    pub fn disconnect(&mut self) {
        self.state = RealtimeState::Disconnected;
    }

    /// Connectivity came back: forget past failures.
    pub fn reset(&mut self) {
        self.state = RealtimeState::Disconnected;
        self.attempts = 0;
        self.abandoned = false;
    }
}

impl Default for ReconnectMachine {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}
