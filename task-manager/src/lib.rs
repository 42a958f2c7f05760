use log::info;
use std::time::Duration;
use tokio::{select, signal};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Outcome of one tick of a periodic task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Continue,
    Break,
}

/// A unit of periodic work, such as an announcement round, a replication
/// rebalance sweep or an integrity check. `run` is invoked once per
/// interval; the loop exits when it returns `Break` or shutdown is
/// requested.
#[async_trait::async_trait]
pub trait Task {
    fn task_name(&self) -> String;

    async fn run(&self) -> TaskState;
}

/// Drives the overlay's background tick loops. Each loop sleeps out its
/// interval while watching for SIGINT and the shared shutdown token, so
/// cancellation is only ever observed at a tick boundary and a tick that
/// has started always runs to completion. All loops are tracked, letting
/// `wait` join every one of them before teardown.
#[derive(Debug, Clone)]
pub struct TaskManager {
    shutdown: CancellationToken,
    loops: TaskTracker,
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            loops: TaskTracker::new(),
        }
    }

    /// Runs `task` every `interval` until it reports `Break` or shutdown
    /// is requested. The first tick fires after one full interval so
    /// startup work never races initialization. Shutdown signals are
    /// polled ahead of the timer, which keeps a cancelled daemon from
    /// starting one more tick it would have to abandon.
    pub fn spawn_interval_task<T>(&self, task: T, interval: Duration)
    where
        T: Task + Send + Sync + 'static,
    {
        let shutdown = self.shutdown.clone();
        let task_name = task.task_name();
        log::debug!("Spawning [{task_name}] tick loop every {interval:?}");
        self.loops.spawn(async move {
            loop {
                select! {
                    biased;

                    _ = signal::ctrl_c() => {
                        info!("Ctrl-C received, stopping [{task_name}] ticks");
                        break;
                    }
                    _ = shutdown.cancelled() => {
                        info!("Shutdown requested, stopping [{task_name}] ticks");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if let TaskState::Break = task.run().await {
                            info!("[{task_name}] finished its work, leaving the loop");
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Requests shutdown; every tick loop breaks at its next boundary.
    pub fn cancel_all(&self) {
        self.shutdown.cancel()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Joins every tick loop. Call after `cancel_all` (or rely on
    /// SIGINT) or this parks until all tasks report `Break` themselves.
    pub async fn wait(&self) {
        self.loops.close();
        self.loops.wait().await
    }

    pub fn task_count(&self) -> usize {
        self.loops.len()
    }
}
