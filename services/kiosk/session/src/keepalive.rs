//! Heartbeat timer for connected sessions.
//!
//! The monitor only paces heartbeats. Liveness is inferred from the
//! transport's own close and error reports, so a missing `heartbeat_ack` is
//! never treated as a failure.

use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::trace;

/// Fixed-interval heartbeat timer; at most one ticker exists at a time
#[derive(Debug)]
pub struct HeartbeatMonitor {
    period: Duration,
    ticker: Option<Interval>,
}

impl HeartbeatMonitor {
    /// Create a stopped monitor
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            ticker: None,
        }
    }

    /// Start ticking; the first tick is one period from now.
    ///
    /// Restarting replaces the previous ticker.
    pub fn start(&mut self) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
        trace!("Heartbeat started every {:?}", self.period);
    }

    /// Stop ticking
    pub fn stop(&mut self) {
        if self.ticker.take().is_some() {
            trace!("Heartbeat stopped");
        }
    }

    /// Whether the ticker is running
    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Interval between heartbeats
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Wait for the next tick; pending forever while stopped
    pub async fn tick(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
