use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks on the single affinity thread. Every call that must touch UI
/// state is submitted as a task; callers never check which thread they are
/// on.
pub trait UiDispatcher: Send + Sync {
    /// Returns false when the affinity loop is gone and the task was dropped.
    fn dispatch(&self, task: Task) -> bool;
}

#[derive(Clone)]
struct TaskSender {
    tx: mpsc::Sender<Task>,
}

impl UiDispatcher for TaskSender {
    fn dispatch(&self, task: Task) -> bool {
        self.tx.send(task).is_ok()
    }
}

/// Channel backed task queue owned by the affinity thread. Dropping it tears
/// the UI side down: outstanding dispatchers start refusing tasks.
pub struct TaskQueue {
    tx: mpsc::Sender<Task>,
    rx: mpsc::Receiver<Task>,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }

    pub fn dispatcher(&self) -> Arc<dyn UiDispatcher> {
        Arc::new(TaskSender {
            tx: self.tx.clone(),
        })
    }

    /// Runs every task queued so far without blocking.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// Runs tasks as they arrive until `done` holds or `timeout` elapses.
    /// Returns the final value of `done`.
    pub fn run_until(&self, done: impl Fn() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if done() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let wait = (deadline - now).min(Duration::from_millis(50));
            match self.rx.recv_timeout(wait) {
                Ok(task) => task(),
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => return done(),
            }
        }
    }
}
