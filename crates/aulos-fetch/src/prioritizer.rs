use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::trace;

/// Priority cutoffs. Lower integers are higher priority.
#[derive(Clone, Copy, Debug)]
pub struct PrioritizerOptions {
    /// Tasks at or below this priority always run, concurrently.
    pub high_cutoff: i32,
    /// Tasks above this priority are interruptible: they get paused while
    /// any strictly-higher-priority task is active.
    pub low_cutoff: i32,
}

impl Default for PrioritizerOptions {
    fn default() -> Self {
        Self {
            high_cutoff: 4,
            low_cutoff: 16,
        }
    }
}

/// What the scheduler currently wants a task to do.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskCommand {
    Run,
    Pause,
}

struct TaskRecord {
    priority: i32,
    cmd_tx: watch::Sender<TaskCommand>,
}

impl TaskRecord {
    fn is_running(&self) -> bool {
        *self.cmd_tx.borrow() == TaskCommand::Run
    }
}

struct Inner {
    options: PrioritizerOptions,
    tasks: HashMap<u64, TaskRecord>,
    next_id: u64,
}

impl Inner {
    /// Recompute every task's command.
    ///
    /// Grants run in priority order so that a newly-eligible high-priority
    /// task is visible when deciding whether to pause interruptible ones.
    fn reschedule(&mut self) {
        let mut order: Vec<(i32, u64)> = self
            .tasks
            .iter()
            .map(|(&id, t)| (t.priority, id))
            .collect();
        order.sort_unstable();

        for &(priority, id) in &order {
            let eligible = priority <= self.options.high_cutoff
                || !self
                    .tasks
                    .values()
                    .any(|t| t.is_running() && t.priority < priority);
            if eligible {
                let _ = self.tasks[&id].cmd_tx.send(TaskCommand::Run);
            }
        }

        for &(priority, id) in &order {
            if priority <= self.options.low_cutoff {
                continue;
            }
            let task = &self.tasks[&id];
            if !task.is_running() {
                continue;
            }
            let outranked = self
                .tasks
                .values()
                .any(|t| t.is_running() && t.priority < priority);
            if outranked {
                trace!(id, priority, "pausing interruptible task");
                let _ = task.cmd_tx.send(TaskCommand::Pause);
            }
        }
    }
}

/// Multi-level scheduler over in-flight work.
///
/// Generic over the work itself: tasks register, await permission, and
/// watch for pause commands; the prioritizer only decides who may run.
#[derive(Clone)]
pub struct TaskPrioritizer {
    inner: Arc<Mutex<Inner>>,
}

impl TaskPrioritizer {
    #[must_use]
    pub fn new(options: PrioritizerOptions) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                options,
                tasks: HashMap::new(),
                next_id: 0,
            })),
        }
    }

    /// Register a task at `priority`. The returned handle releases the slot
    /// on drop.
    #[must_use]
    pub fn register(&self, priority: i32) -> TaskHandle {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;

        let (cmd_tx, cmd_rx) = watch::channel(TaskCommand::Pause);
        inner.tasks.insert(id, TaskRecord { priority, cmd_tx });
        inner.reschedule();

        TaskHandle {
            id,
            inner: self.inner.clone(),
            cmd_rx,
        }
    }

    /// Number of registered (running or waiting) tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().tasks.is_empty()
    }
}

impl Default for TaskPrioritizer {
    fn default() -> Self {
        Self::new(PrioritizerOptions::default())
    }
}

/// One registered task's view of the scheduler.
pub struct TaskHandle {
    id: u64,
    inner: Arc<Mutex<Inner>>,
    cmd_rx: watch::Receiver<TaskCommand>,
}

impl TaskHandle {
    /// Whether the scheduler currently allows this task to run.
    #[must_use]
    pub fn is_runnable(&self) -> bool {
        *self.cmd_rx.borrow() == TaskCommand::Run
    }

    /// Current priority.
    #[must_use]
    pub fn priority(&self) -> i32 {
        self.inner
            .lock()
            .tasks
            .get(&self.id)
            .map_or(i32::MAX, |t| t.priority)
    }

    /// Wait until the scheduler grants execution.
    pub async fn wait_until_runnable(&mut self) {
        loop {
            if *self.cmd_rx.borrow_and_update() == TaskCommand::Run {
                return;
            }
            if self.cmd_rx.changed().await.is_err() {
                // Prioritizer gone: run unconstrained.
                return;
            }
        }
    }

    /// Resolves when the scheduler pauses this task. Never resolves while
    /// the task stays runnable; intended for `select!` against the work.
    pub async fn interrupted(&mut self) {
        loop {
            if *self.cmd_rx.borrow_and_update() == TaskCommand::Pause {
                return;
            }
            if self.cmd_rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Re-prioritize: may resume a paused task or pause a running one.
    pub fn update_priority(&self, priority: i32) {
        let mut inner = self.inner.lock();
        if let Some(task) = inner.tasks.get_mut(&self.id) {
            if task.priority == priority {
                return;
            }
            task.priority = priority;
        }
        inner.reschedule();
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        inner.tasks.remove(&self.id);
        inner.reschedule();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prioritizer() -> TaskPrioritizer {
        TaskPrioritizer::default()
    }

    #[test]
    fn high_priority_tasks_all_run_concurrently() {
        let p = prioritizer();
        let a = p.register(0);
        let b = p.register(2);
        let c = p.register(4);
        assert!(a.is_runnable());
        assert!(b.is_runnable());
        assert!(c.is_runnable());
    }

    #[test]
    fn mid_priority_waits_behind_higher_and_resumes() {
        let p = prioritizer();
        let high = p.register(6);
        assert!(high.is_runnable());

        let mid = p.register(10);
        assert!(!mid.is_runnable(), "must wait behind running priority 6");

        drop(high);
        assert!(mid.is_runnable(), "released slot unblocks the queue");
    }

    #[test]
    fn running_mid_task_is_not_preempted() {
        let p = prioritizer();
        let mid = p.register(10);
        assert!(mid.is_runnable());

        // A higher (but not high-cutoff) task arrives: the running mid task
        // keeps its slot, the newcomer runs too only if nothing outranks it.
        let higher = p.register(6);
        assert!(mid.is_runnable(), "mid tasks are not interruptible");
        assert!(higher.is_runnable());
    }

    #[test]
    fn interruptible_task_pauses_and_resumes() {
        let p = prioritizer();
        let low = p.register(20);
        assert!(low.is_runnable(), "alone, even interruptible tasks run");

        let high = p.register(2);
        assert!(high.is_runnable());
        assert!(!low.is_runnable(), "outranked interruptible task pauses");

        drop(high);
        assert!(low.is_runnable(), "pause is re-runnable, not terminal");
    }

    #[test]
    fn promote_resumes_paused_task() {
        let p = prioritizer();
        let _running = p.register(6);
        let parked = p.register(20);
        assert!(!parked.is_runnable());

        parked.update_priority(3);
        assert!(parked.is_runnable(), "promotion into high band runs");
    }

    #[test]
    fn demote_pauses_running_task() {
        let p = prioritizer();
        let task = p.register(18);
        let waiting = p.register(30);
        assert!(task.is_runnable());
        assert!(!waiting.is_runnable());

        task.update_priority(35);
        assert!(waiting.is_runnable());
        assert!(!task.is_runnable(), "demoted below an active task: paused");
    }

    #[tokio::test]
    async fn wait_until_runnable_unblocks_on_release() {
        let p = prioritizer();
        let gate = p.register(6);
        let mut waiting = p.register(10);
        assert!(!waiting.is_runnable());

        let waiter = tokio::spawn(async move {
            waiting.wait_until_runnable().await;
            waiting
        });

        drop(gate);
        let waiting = tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("wait must unblock")
            .unwrap();
        assert!(waiting.is_runnable());
    }

    #[tokio::test]
    async fn interrupted_resolves_on_preemption() {
        let p = prioritizer();
        let mut low = p.register(20);
        assert!(low.is_runnable());

        let interrupted = tokio::spawn(async move {
            low.interrupted().await;
            low
        });

        let _high = p.register(0);
        tokio::time::timeout(std::time::Duration::from_secs(1), interrupted)
            .await
            .expect("interruption must resolve")
            .unwrap();
    }
}
