use std::collections::HashMap;
use std::fmt;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, Duration, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// A timer that elapsed, carrying the task it was scheduled with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fired<T> {
    pub id: TimerId,
    pub task: T,
}

#[derive(Debug)]
struct TimerEntry {
    repeating: bool,
    cancel_tx: oneshot::Sender<()>,
}

/// Owns cancellable delayed tasks. Each timer runs as a tokio task that
/// sends [`Fired`] into the channel returned by [`Scheduler::new`]; the owner
/// passes every received fire through [`Scheduler::accept`] so fires that
/// raced a `clear` are discarded.
///
/// All delays go through tokio's clock, so tests can run on a paused runtime.
#[derive(Debug)]
pub struct Scheduler<T> {
    tokio_handle: Handle,
    timers: HashMap<TimerId, TimerEntry>,
    fired_tx: mpsc::UnboundedSender<Fired<T>>,
    next_id: u64,
}

impl<T> Scheduler<T>
where
    T: Clone + Send + 'static,
{
    /// Must be called from within a tokio runtime.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Fired<T>>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            tokio_handle: Handle::current(),
            timers: HashMap::new(),
            fired_tx,
            next_id: 1,
        };
        (scheduler, fired_rx)
    }

    pub fn set_timeout(&mut self, delay: Duration, task: T) -> TimerId {
        let timer_id = self.allocate_id();
        let fired_tx = self.fired_tx.clone();
        let (cancel_tx, cancel_rx) = oneshot::channel();

        self.tokio_handle.spawn(async move {
            tokio::select! {
                _ = sleep(delay) => {
                    let _ = fired_tx.send(Fired { id: timer_id, task });
                }
                _ = cancel_rx => {}
            }
        });

        self.timers.insert(
            timer_id,
            TimerEntry {
                repeating: false,
                cancel_tx,
            },
        );
        timer_id
    }

    pub fn set_interval(&mut self, period: Duration, task: T) -> TimerId {
        let timer_id = self.allocate_id();
        let fired_tx = self.fired_tx.clone();
        let (cancel_tx, mut cancel_rx) = oneshot::channel();

        self.tokio_handle.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await; // first tick completes immediately
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if fired_tx.send(Fired { id: timer_id, task: task.clone() }).is_err() {
                            break;
                        }
                    }
                    _ = &mut cancel_rx => break,
                }
            }
        });

        self.timers.insert(
            timer_id,
            TimerEntry {
                repeating: true,
                cancel_tx,
            },
        );
        timer_id
    }

    /// Cancel a timer. Returns `false` if it already fired or was cleared.
    pub fn clear(&mut self, timer_id: TimerId) -> bool {
        match self.timers.remove(&timer_id) {
            Some(entry) => {
                let _ = entry.cancel_tx.send(());
                true
            }
            None => false,
        }
    }

    /// Decide whether a received fire is still live. One-shot timers are
    /// retired here; interval timers stay registered until cleared.
    pub fn accept(&mut self, fired: &Fired<T>) -> bool {
        match self.timers.get(&fired.id) {
            Some(entry) if entry.repeating => true,
            Some(_) => {
                self.timers.remove(&fired.id);
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, timer_id: TimerId) -> bool {
        self.timers.contains_key(&timer_id)
    }

    /// Number of timers that are scheduled and not yet retired.
    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    pub fn clear_all(&mut self) {
        for (_, entry) in self.timers.drain() {
            let _ = entry.cancel_tx.send(());
        }
    }

    fn allocate_id(&mut self) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        id
    }
}

impl<T> Drop for Scheduler<T> {
    fn drop(&mut self) {
        for (_, entry) in self.timers.drain() {
            let _ = entry.cancel_tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn timeout_fires_once() {
        let (mut scheduler, mut fired_rx) = Scheduler::new();
        let id = scheduler.set_timeout(Duration::from_millis(100), "ping");

        let fired = fired_rx.recv().await.unwrap();
        assert_eq!(fired.id, id);
        assert_eq!(fired.task, "ping");
        assert!(scheduler.accept(&fired));
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cleared_timeout_never_fires() {
        let (mut scheduler, mut fired_rx) = Scheduler::new();
        let id = scheduler.set_timeout(Duration::from_millis(100), "ping");
        assert!(scheduler.clear(id));
        assert!(!scheduler.clear(id));

        sleep(Duration::from_millis(500)).await;
        assert!(fired_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn interval_repeats_until_cleared() {
        let (mut scheduler, mut fired_rx) = Scheduler::new();
        let id = scheduler.set_interval(Duration::from_millis(50), 7u8);

        for _ in 0..3 {
            let fired = fired_rx.recv().await.unwrap();
            assert!(scheduler.accept(&fired));
        }
        assert!(scheduler.is_active(id));

        scheduler.clear(id);
        sleep(Duration::from_millis(200)).await;
        while let Ok(late) = fired_rx.try_recv() {
            assert!(!scheduler.accept(&late));
        }
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fire_racing_clear_is_rejected() {
        let (mut scheduler, mut fired_rx) = Scheduler::new();
        let id = scheduler.set_timeout(Duration::from_millis(10), ());
        sleep(Duration::from_millis(20)).await;
        scheduler.clear(id);

        let fired = fired_rx.recv().await.unwrap();
        assert!(!scheduler.accept(&fired));
    }
}
