//! Debounced deferred tasks
//!
//! "Run T after D; if another request arrives before D elapses, cancel the
//! pending T and start waiting again." Used for trailing-edge work such as
//! saving reading progress once navigation has been quiet for a while.
//!
//! Tasks are spawned on the current thread's [`tokio::task::LocalSet`], so
//! they may hold `Rc` state. Scheduling outside a `LocalSet` panics.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use tokio::task::JoinHandle;

struct Scheduled {
    handle: JoinHandle<()>,
    fired: Rc<Cell<bool>>,
}

/// A cancel-and-replace deferred task slot
pub struct DebouncedTask {
    delay: Duration,
    scheduled: RefCell<Option<Scheduled>>,
}

impl DebouncedTask {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            scheduled: RefCell::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `task` once the delay elapses without another `schedule` call
    ///
    /// A previously scheduled task that is still waiting is cancelled. One
    /// whose delay already elapsed keeps running to completion.
    pub fn schedule<F>(&self, task: F)
    where
        F: Future<Output = ()> + 'static,
    {
        self.cancel();

        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        let deadline = tokio::time::Instant::now() + self.delay;
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep_until(deadline).await;
            flag.set(true);
            task.await;
        });

        *self.scheduled.borrow_mut() = Some(Scheduled { handle, fired });
    }

    /// Cancel the waiting task, if any
    ///
    /// Returns `true` if a task was cancelled before it started.
    pub fn cancel(&self) -> bool {
        match self.scheduled.borrow_mut().take() {
            Some(scheduled) if !scheduled.fired.get() => {
                scheduled.handle.abort();
                true
            }
            _ => false,
        }
    }

    /// Whether a task is waiting for its delay to elapse
    pub fn is_pending(&self) -> bool {
        self.scheduled
            .borrow()
            .as_ref()
            .is_some_and(|s| !s.fired.get() && !s.handle.is_finished())
    }
}

impl Drop for DebouncedTask {
    fn drop(&mut self) {
        if self.cancel() {
            log::trace!("dropped debounced task before it ran");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::task::LocalSet;

    const DELAY: Duration = Duration::from_millis(2000);

    #[tokio::test(start_paused = true)]
    async fn runs_after_delay() {
        LocalSet::new()
            .run_until(async {
                let ran = Rc::new(Cell::new(false));
                let task = DebouncedTask::new(DELAY);
                let flag = Rc::clone(&ran);
                task.schedule(async move { flag.set(true) });

                assert!(task.is_pending());
                tokio::time::advance(Duration::from_millis(1999)).await;
                assert!(!ran.get());

                tokio::time::sleep(Duration::from_millis(10)).await;
                assert!(ran.get());
                assert!(!task.is_pending());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_replaces_pending_task() {
        LocalSet::new()
            .run_until(async {
                let runs = Rc::new(RefCell::new(Vec::new()));
                let task = DebouncedTask::new(DELAY);

                for value in [1, 2, 3] {
                    let runs = Rc::clone(&runs);
                    task.schedule(async move { runs.borrow_mut().push(value) });
                    tokio::time::advance(Duration::from_millis(500)).await;
                }
                assert!(runs.borrow().is_empty());

                tokio::time::sleep(DELAY).await;
                assert_eq!(*runs.borrow(), vec![3]);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn started_task_is_not_aborted_by_reschedule() {
        LocalSet::new()
            .run_until(async {
                let finished = Rc::new(Cell::new(false));
                let task = DebouncedTask::new(DELAY);
                let flag = Rc::clone(&finished);
                task.schedule(async move {
                    tokio::time::sleep(Duration::from_millis(1000)).await;
                    flag.set(true);
                });

                tokio::time::sleep(DELAY + Duration::from_millis(100)).await;
                task.schedule(async {});
                tokio::time::sleep(Duration::from_millis(1000)).await;

                assert!(finished.get());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_and_drop_prevent_the_run() {
        LocalSet::new()
            .run_until(async {
                let ran = Rc::new(Cell::new(false));

                let task = DebouncedTask::new(DELAY);
                let flag = Rc::clone(&ran);
                task.schedule(async move { flag.set(true) });
                assert!(task.cancel());
                assert!(!task.cancel());

                let dropped = DebouncedTask::new(DELAY);
                let flag = Rc::clone(&ran);
                dropped.schedule(async move { flag.set(true) });
                drop(dropped);

                tokio::time::sleep(DELAY * 2).await;
                assert!(!ran.get());
            })
            .await;
    }
}
