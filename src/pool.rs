//! Worker pool for encode tasks and the per-slot completion barrier.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{ShotError, ShotResult};

/// Counts outstanding tasks registered against one ring slot.
///
/// Cloning yields another handle to the same counter. `wait` returning means
/// every task registered before the call has dropped its [`TaskTicket`].
#[derive(Clone, Debug, Default)]
pub struct TaskGroup {
    inner: Arc<TaskGroupInner>,
}

#[derive(Debug, Default)]
struct TaskGroupInner {
    pending: Mutex<usize>,
    idle: Condvar,
}

impl TaskGroupInner {
    fn lock(&self) -> MutexGuard<'_, usize> {
        // Tickets release even when a task panicked, so the count stays
        // meaningful across poisoning.
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registration of one task in a [`TaskGroup`]; dropping it marks the task
/// complete.
#[derive(Debug)]
pub struct TaskTicket {
    group: Arc<TaskGroupInner>,
}

impl Drop for TaskTicket {
    fn drop(&mut self) {
        let mut pending = self.group.lock();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.group.idle.notify_all();
        }
    }
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task that is about to start.
    pub fn ticket(&self) -> TaskTicket {
        *self.inner.lock() += 1;
        TaskTicket {
            group: Arc::clone(&self.inner),
        }
    }

    pub fn pending(&self) -> usize {
        *self.inner.lock()
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Block until no task is outstanding.
    pub fn wait(&self) {
        let mut pending = self.inner.lock();
        while *pending > 0 {
            pending = self
                .inner
                .idle
                .wait(pending)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until no task is outstanding or `timeout` elapses. Returns
    /// `true` when the group went idle in time. A timeout too large to form
    /// a deadline waits without one.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait();
            return true;
        };
        let mut pending = self.inner.lock();
        while *pending > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .inner
                .idle
                .wait_timeout(pending, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            pending = guard;
        }
        true
    }
}

/// Bounded pool of encode worker threads.
pub struct EncodePool {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl EncodePool {
    pub fn new(workers: usize) -> ShotResult<Self> {
        if workers == 0 {
            return Err(ShotError::InvalidConfig(
                "encode pool needs at least one worker".into(),
            ));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("deferred-shot-encode-{i}"))
            .panic_handler(|_| log::error!("screenshot encode task panicked"))
            .build()
            .map_err(|e| {
                ShotError::Platform(anyhow::anyhow!("failed to build encode pool: {e}"))
            })?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `job` on a pool thread, registered in `group`. The ticket is
    /// released only after `job` and everything it captured are dropped.
    pub fn run<F>(&self, group: &TaskGroup, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let ticket = group.ticket();
        self.pool.spawn(move || {
            let _ticket = ticket;
            job();
        });
    }
}

impl std::fmt::Debug for EncodePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodePool")
            .field("workers", &self.workers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    #[test]
    fn zero_workers_is_a_config_error() {
        assert!(matches!(
            EncodePool::new(0),
            Err(ShotError::InvalidConfig(_))
        ));
    }

    #[test]
    fn wait_returns_after_every_task_finished() -> ShotResult<()> {
        let pool = EncodePool::new(3)?;
        let group = TaskGroup::new();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..16 {
            let done = Arc::clone(&done);
            pool.run(&group, move || {
                std::thread::sleep(Duration::from_millis(2));
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        group.wait();
        assert_eq!(done.load(Ordering::SeqCst), 16);
        assert!(group.is_idle());
        Ok(())
    }

    #[test]
    fn tasks_run_off_the_calling_thread() -> ShotResult<()> {
        let pool = EncodePool::new(1)?;
        let group = TaskGroup::new();
        let (tx, rx) = mpsc::channel();
        pool.run(&group, move || {
            let _ = tx.send(std::thread::current().id());
        });
        group.wait();
        let worker = rx.recv().map_err(|e| ShotError::Platform(e.into()))?;
        assert_ne!(worker, std::thread::current().id());
        Ok(())
    }

    #[test]
    fn wait_timeout_reports_outstanding_tasks() -> ShotResult<()> {
        let pool = EncodePool::new(1)?;
        let group = TaskGroup::new();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        pool.run(&group, move || {
            let _ = release_rx.recv();
        });
        assert!(!group.wait_timeout(Duration::from_millis(20)));
        assert_eq!(group.pending(), 1);
        drop(release_tx);
        assert!(group.wait_timeout(Duration::from_secs(5)));
        Ok(())
    }

    #[test]
    fn unbounded_timeouts_wait_for_completion() -> ShotResult<()> {
        let pool = EncodePool::new(1)?;
        let group = TaskGroup::new();
        pool.run(&group, || std::thread::sleep(Duration::from_millis(20)));
        assert!(group.wait_timeout(Duration::MAX));
        assert!(group.is_idle());
        Ok(())
    }

    #[test]
    fn groups_are_independent() -> ShotResult<()> {
        let pool = EncodePool::new(2)?;
        let busy = TaskGroup::new();
        let other = TaskGroup::new();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        pool.run(&busy, move || {
            let _ = release_rx.recv();
        });
        pool.run(&other, || {});
        other.wait();
        assert_eq!(busy.pending(), 1);
        drop(release_tx);
        busy.wait();
        Ok(())
    }

    #[test]
    fn panicking_task_still_releases_its_ticket() -> ShotResult<()> {
        let pool = EncodePool::new(1)?;
        let group = TaskGroup::new();
        pool.run(&group, || panic!("encoder exploded"));
        assert!(group.wait_timeout(Duration::from_secs(5)));
        Ok(())
    }
}
