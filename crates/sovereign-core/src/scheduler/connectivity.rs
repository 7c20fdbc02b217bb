//! Health-probe based connectivity detection.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::remote::RemoteApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    WentOnline,
    WentOffline,
}

/// Probes `GET /health` and reports only transitions.
///
/// The first probe always reports, so consumers start from a known state.
pub struct ConnectivityMonitor {
    remote: Arc<dyn RemoteApi>,
    interval: Duration,
    online: Option<bool>,
}

impl ConnectivityMonitor {
    pub fn new(remote: Arc<dyn RemoteApi>, interval: Duration) -> Self {
        Self {
            remote,
            interval,
            online: None,
        }
    }

    pub const fn is_online(&self) -> Option<bool> {
        self.online
    }

    /// Probe once; `Some` when the state changed.
    pub async fn probe(&mut self) -> Option<ConnectivityEvent> {
        let online = match self.remote.health_check(None).await {
            Ok(()) => true,
            Err(error) => {
                tracing::debug!("Health probe failed: {}", error);
                false
            }
        };

        if self.online == Some(online) {
            return None;
        }
        self.online = Some(online);

        let event = if online {
            ConnectivityEvent::WentOnline
        } else {
            ConnectivityEvent::WentOffline
        };
        tracing::info!("Connectivity changed: {:?}", event);
        Some(event)
    }

    /// Probe on every tick and forward transitions until the receiver goes away.
    pub fn spawn(mut self, events: mpsc::Sender<ConnectivityEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Some(event) = self.probe().await {
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
            }
        })
    }
}
