use crate::queue::{OfflineQueue, SyncReport};
use crate::transport::Transport;
use reqwest::{Client, Url};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Replays the offline queue once per offline -> online transition.
pub struct ReplayTrigger {
    queue: Arc<OfflineQueue>,
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl ReplayTrigger {
    pub fn new(queue: Arc<OfflineQueue>, transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self { queue, transport, timeout }
    }

    /// Runs until the online sender is dropped; returns the reports of the
    /// replay passes it started.
    pub async fn run(&self, mut online: watch::Receiver<bool>) -> Vec<SyncReport> {
        let mut was_online = *online.borrow_and_update();
        let mut reports = Vec::new();
        let mut open = true;
        while open && online.changed().await.is_ok() {
            let now = *online.borrow_and_update();
            let mut restored = now && !was_online;
            was_online = now;
            while restored {
                info!(queued = self.queue.len(), "network restored; replaying offline queue");
                let pass = self.replay(&mut online).await;
                reports.push(pass.report);
                open = pass.open;
                was_online = *online.borrow();
                // a drop and return during the pass collapses into one watch value
                restored = pass.went_offline && was_online;
            }
        }
        reports
    }

    async fn replay(&self, online: &mut watch::Receiver<bool>) -> Pass {
        let sync = self.queue.sync_queue(self.transport.as_ref(), self.timeout);
        tokio::pin!(sync);
        let mut went_offline = false;
        let mut open = true;
        loop {
            tokio::select! {
                report = &mut sync => return Pass { report, went_offline, open },
                changed = online.changed(), if open => match changed {
                    Ok(()) => went_offline |= !*online.borrow_and_update(),
                    Err(_) => open = false,
                },
            }
        }
    }
}

struct Pass {
    report: SyncReport,
    went_offline: bool,
    open: bool,
}

/// Derives an online flag from periodic reachability checks.
#[derive(Clone, Debug)]
pub struct ProbeMonitor {
    http: Client,
    probe: Url,
    interval: Duration,
    timeout: Duration,
}

impl ProbeMonitor {
    pub fn new(http: Client, probe: Url, interval: Duration, timeout: Duration) -> Self {
        Self { http, probe, interval, timeout }
    }

    /// Any HTTP response counts as reachable, whatever its status.
    pub async fn probe(&self) -> bool {
        match self.http.head(self.probe.clone()).timeout(self.timeout).send().await {
            Ok(resp) => {
                debug!(status = %resp.status(), "probe reachable");
                true
            }
            Err(e) => {
                debug!(error = %e, "probe unreachable");
                false
            }
        }
    }

    /// Publishes changes of reachability until every receiver is gone.
    pub async fn run(&self, online: watch::Sender<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if online.is_closed() {
                break;
            }
            let up = self.probe().await;
            online.send_if_modified(|cur| {
                if *cur == up {
                    return false;
                }
                info!(online = up, "connectivity changed");
                *cur = up;
                true
            });
        }
    }
}
