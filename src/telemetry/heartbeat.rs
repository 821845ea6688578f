//! Component heartbeat.
//!
//! Reports `~component.heartbeat = 1` on a fixed interval so the backend can
//! tell a live but idle service from a dead one.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::lifecycle::ShutdownListener;
use crate::observability::metrics::Reporter;
use crate::telemetry::sink_result;
use crate::telemetry::tags::TagSet;

pub const HEARTBEAT: &str = "~component.heartbeat";

/// Periodic heartbeat reporter.
pub struct Heartbeat {
    reporter: Arc<dyn Reporter>,
    tags: TagSet,
    interval: Duration,
}

impl Heartbeat {
    pub fn new(reporter: Arc<dyn Reporter>, tags: TagSet, interval: Duration) -> Self {
        Self {
            reporter,
            tags,
            interval,
        }
    }

    /// Report one beat.
    pub fn beat(&self) {
        sink_result("gauge", HEARTBEAT, self.reporter.set_gauge(HEARTBEAT, &self.tags, 1.0));
    }

    /// Spawn the heartbeat loop on the current runtime. The first beat is
    /// sent immediately.
    pub fn spawn(self, mut shutdown: ShutdownListener) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            tracing::debug!(interval = ?self.interval, "Heartbeat started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.beat(),
                    _ = shutdown.recv() => break,
                }
            }

            tracing::debug!("Heartbeat stopped");
        })
    }
}
