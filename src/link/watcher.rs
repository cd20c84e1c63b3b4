use tokio::time::Duration;
use tracing::debug;

use crate::scheduler::{Scheduler, TimerId};

/// Polls for bridge readiness while requests are waiting on it.
///
/// At most one interval timer exists; `watch` while watching and `stop`
/// while idle are both no-ops.
#[derive(Debug)]
pub struct AvailabilityWatcher {
    interval: Duration,
    timer: Option<TimerId>,
}

impl AvailabilityWatcher {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            timer: None,
        }
    }

    /// Start polling. Returns `true` if a new timer was created.
    pub fn watch<T>(&mut self, scheduler: &mut Scheduler<T>, tick: T) -> bool
    where
        T: Clone + Send + 'static,
    {
        if self.timer.is_some() {
            return false;
        }
        let timer = scheduler.set_interval(self.interval, tick);
        debug!(%timer, interval_ms = self.interval.as_millis() as u64, "watching for bridge");
        self.timer = Some(timer);
        true
    }

    pub fn stop<T>(&mut self, scheduler: &mut Scheduler<T>)
    where
        T: Clone + Send + 'static,
    {
        if let Some(timer) = self.timer.take() {
            scheduler.clear(timer);
            debug!(%timer, "stopped watching for bridge");
        }
    }

    pub fn is_watching(&self) -> bool {
        self.timer.is_some()
    }

    pub fn owns(&self, timer: TimerId) -> bool {
        self.timer == Some(timer)
    }
}
