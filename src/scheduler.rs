//! One-shot delayed-task scheduling used for ticket expiry
//!
//! The registry never sleeps or spawns on its own; it hands expiry actions to
//! a [`Scheduler`] and keeps the returned [`TaskId`] so the action can be
//! cancelled when the ticket is consumed or superseded first. Cancellation
//! and firing race against the same id: whichever side claims it first wins,
//! the other becomes a no-op, so a task runs at most once.

use log::debug;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Identifies a scheduled task for later cancellation.
pub type TaskId = u64;

/// A boxed deferred action.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// One-shot, cancellable delayed execution.
pub trait Scheduler: Send + Sync {
    /// Runs `task` once after `delay`, unless cancelled first.
    fn schedule_once(&self, delay: Duration, task: Task) -> TaskId;

    /// Cancels a pending task.
    ///
    /// Returns false if the task already fired or was cancelled before.
    fn cancel(&self, task: TaskId) -> bool;
}

/// Production scheduler backed by a tokio runtime.
///
/// Each scheduled task is a spawned sleep-then-run future. The pending set is
/// the single source of truth for whether a task is still armed: both
/// `cancel` and the firing future remove the id, and only the side that
/// actually removed it proceeds.
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
    next_id: AtomicU64,
    pending: Arc<Mutex<HashSet<TaskId>>>,
}

impl TokioScheduler {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle,
            next_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Builds a scheduler on the current tokio runtime.
    ///
    /// Fails outside a runtime; callers should treat that as a startup
    /// configuration error rather than retrying per call.
    pub fn from_current() -> Result<Self, tokio::runtime::TryCurrentError> {
        Ok(Self::new(tokio::runtime::Handle::try_current()?))
    }

    /// Number of tasks scheduled but not yet fired or cancelled.
    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, delay: Duration, task: Task) -> TaskId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.pending.lock().unwrap().insert(id);

        let pending = Arc::clone(&self.pending);
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            // Claim the id; a concurrent cancel may have taken it already.
            let armed = pending.lock().unwrap().remove(&id);
            if armed {
                task();
            }
        });

        id
    }

    fn cancel(&self, task: TaskId) -> bool {
        let cancelled = self.pending.lock().unwrap().remove(&task);
        if cancelled {
            debug!("Cancelled scheduled task {}", task);
        }
        cancelled
    }
}

/// Scheduler that only fires when told to.
///
/// Used by tests and by hosts that drive time themselves: tasks accumulate
/// until [`ManualScheduler::fire_all`] runs them, so "the TTL elapsed" is an
/// explicit, deterministic step instead of a real-time race.
#[derive(Default)]
pub struct ManualScheduler {
    inner: Mutex<ManualInner>,
}

#[derive(Default)]
struct ManualInner {
    next_id: TaskId,
    queued: Vec<(TaskId, Duration, Task)>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting to fire.
    pub fn pending(&self) -> usize {
        self.inner.lock().unwrap().queued.len()
    }

    /// The delay a still-pending task was scheduled with.
    pub fn delay_of(&self, task: TaskId) -> Option<Duration> {
        self.inner
            .lock()
            .unwrap()
            .queued
            .iter()
            .find(|(id, _, _)| *id == task)
            .map(|(_, delay, _)| *delay)
    }

    /// Runs every pending task in scheduling order.
    ///
    /// The queue is drained before anything runs, so tasks scheduled while
    /// firing stay pending for the next call and tasks that cancel each other
    /// go through the normal claim path.
    pub fn fire_all(&self) {
        let drained = {
            let mut inner = self.inner.lock().unwrap();
            std::mem::take(&mut inner.queued)
        };
        for (_, _, task) in drained {
            task();
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_once(&self, delay: Duration, task: Task) -> TaskId {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.queued.push((id, delay, task));
        id
    }

    fn cancel(&self, task: TaskId) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.queued.len();
        inner.queued.retain(|(id, _, _)| *id != task);
        inner.queued.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_manual_scheduler_fires_in_order() {
        let scheduler = ManualScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            scheduler.schedule_once(
                Duration::from_secs(1),
                Box::new(move || order.lock().unwrap().push(label)),
            );
        }

        assert_eq!(scheduler.pending(), 3);
        scheduler.fire_all();
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_manual_scheduler_cancel() {
        let scheduler = ManualScheduler::new();
        let fired = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&fired);
        let id = scheduler.schedule_once(
            Duration::from_secs(1),
            Box::new(move || flag.store(true, Ordering::SeqCst)),
        );

        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));
        scheduler.fire_all();
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_manual_scheduler_records_delay() {
        let scheduler = ManualScheduler::new();
        let id = scheduler.schedule_once(Duration::from_secs(30), Box::new(|| {}));

        assert_eq!(scheduler.delay_of(id), Some(Duration::from_secs(30)));
        scheduler.fire_all();
        assert_eq!(scheduler.delay_of(id), None);
    }

    #[test]
    fn test_tokio_scheduler_fires_after_delay() {
        tokio_test::block_on(async {
            let scheduler = TokioScheduler::from_current().unwrap();
            let fired = Arc::new(AtomicBool::new(false));

            let flag = Arc::clone(&fired);
            scheduler.schedule_once(
                Duration::from_millis(10),
                Box::new(move || flag.store(true, Ordering::SeqCst)),
            );

            tokio::time::sleep(Duration::from_millis(100)).await;
            assert!(fired.load(Ordering::SeqCst));
            assert_eq!(scheduler.pending(), 0);
        });
    }

    #[test]
    fn test_tokio_scheduler_cancel_prevents_firing() {
        tokio_test::block_on(async {
            let scheduler = TokioScheduler::from_current().unwrap();
            let fired = Arc::new(AtomicBool::new(false));

            let flag = Arc::clone(&fired);
            let id = scheduler.schedule_once(
                Duration::from_millis(10),
                Box::new(move || flag.store(true, Ordering::SeqCst)),
            );

            assert!(scheduler.cancel(id));
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert!(!fired.load(Ordering::SeqCst));
            // The fired-or-cancelled id is spent.
            assert!(!scheduler.cancel(id));
        });
    }

    #[test]
    fn test_tokio_scheduler_requires_runtime() {
        assert!(TokioScheduler::from_current().is_err());
    }
}
