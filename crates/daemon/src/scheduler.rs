//! Single-flight FIFO scheduler.
//!
//! Each scheduled file gets a strictly monotonic numeric id. At most one
//! task runs at any instant; queued tasks can be cancelled by file
//! identity until they start. A settling delay separates consecutive
//! tasks so freshly written outputs stop moving before the watcher sees
//! them again.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Error type a task may surface; converted to a logged failure, never a
/// crash.
pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

type BoxFuture = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send>>;

/// The work run for each scheduled file.
pub type TaskRunner = Arc<dyn Fn(u64, PathBuf) -> BoxFuture + Send + Sync>;

/// Delay between consecutive tasks, letting the filesystem settle.
pub const DEFAULT_INTER_TASK_DELAY: Duration = Duration::from_secs(10);

#[derive(Default)]
struct SchedulerState {
    queue: VecDeque<(u64, PathBuf)>,
    ids: HashMap<PathBuf, u64>,
    next_id: u64,
    /// Highest id that has started running.
    last_started: u64,
    running: bool,
    shutdown: bool,
}

/// FIFO single-flight queue with per-file deduplication and pre-run
/// cancellation.
pub struct Scheduler {
    state: Arc<Mutex<SchedulerState>>,
    notify: Arc<Notify>,
    worker: JoinHandle<()>,
}

impl Scheduler {
    /// Start the queue processor with the given runner and inter-task
    /// delay.
    pub fn new(runner: TaskRunner, inter_task_delay: Duration) -> Self {
        let state = Arc::new(Mutex::new(SchedulerState::default()));
        let notify = Arc::new(Notify::new());

        let worker = tokio::spawn(Self::process_loop(
            Arc::clone(&state),
            Arc::clone(&notify),
            runner,
            inter_task_delay,
        ));

        Self { state, notify, worker }
    }

    async fn process_loop(
        state: Arc<Mutex<SchedulerState>>,
        notify: Arc<Notify>,
        runner: TaskRunner,
        inter_task_delay: Duration,
    ) {
        loop {
            let task = {
                let mut state = state.lock().await;
                if state.shutdown {
                    break;
                }
                match state.queue.pop_front() {
                    Some((id, file)) => {
                        state.last_started = id;
                        state.running = true;
                        Some((id, file))
                    }
                    None => None,
                }
            };

            let Some((id, file)) = task else {
                notify.notified().await;
                continue;
            };

            info!(task = id, file = %file.display(), "task started");
            match runner(id, file.clone()).await {
                Ok(()) => info!(task = id, "task finished"),
                // A failed task must not take the queue down with it.
                Err(e) => error!(task = id, "task failed: {}", e),
            }

            let more_queued = {
                let mut state = state.lock().await;
                state.running = false;
                state.ids.remove(&file);
                !state.queue.is_empty() && !state.shutdown
            };

            if more_queued {
                tokio::time::sleep(inter_task_delay).await;
            }
        }
    }

    /// Enqueue a file, returning its task id.
    ///
    /// Scheduling a file that is already queued or running is a no-op
    /// returning the existing id.
    pub async fn schedule(&self, file: PathBuf) -> u64 {
        let id = {
            let mut state = self.state.lock().await;
            if let Some(&existing) = state.ids.get(&file) {
                debug!(task = existing, file = %file.display(), "already scheduled");
                return existing;
            }
            state.next_id += 1;
            let id = state.next_id;
            state.ids.insert(file.clone(), id);
            state.queue.push_back((id, file));
            id
        };
        self.notify.notify_one();
        id
    }

    /// Cancel a queued file.
    ///
    /// Only tasks that have not started can be cancelled; cancelling a
    /// running or unknown file is a no-op.
    pub async fn cancel(&self, file: &Path) {
        let mut state = self.state.lock().await;
        let Some(&id) = state.ids.get(file) else {
            return;
        };
        if id <= state.last_started {
            debug!(task = id, file = %file.display(), "cancel ignored; task already started");
            return;
        }
        state.queue.retain(|(qid, _)| *qid != id);
        state.ids.remove(file);
        debug!(task = id, file = %file.display(), "task cancelled");
    }

    /// True when nothing is queued or running.
    pub async fn is_idle(&self) -> bool {
        let state = self.state.lock().await;
        state.queue.is_empty() && !state.running
    }

    /// Wait until the queue has fully drained.
    pub async fn wait_idle(&self) {
        loop {
            if self.is_idle().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    /// Drain and destroy the queue; pending tasks are not executed.
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.lock().await;
            state.shutdown = true;
            state.queue.clear();
            state.ids.clear();
        }
        self.notify.notify_one();
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.worker.abort();
    }
}
