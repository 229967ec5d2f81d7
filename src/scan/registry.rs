use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Background scan tasks keyed by job id.
///
/// Handles live only in memory: after a restart the registry is empty and any
/// job still marked running has no worker (the store fails those on open).
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<Mutex<HashMap<Uuid, JoinHandle<()>>>>,
}

static GLOBAL: OnceLock<TaskRegistry> = OnceLock::new();

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry, created on first use.
    pub fn global() -> &'static TaskRegistry {
        GLOBAL.get_or_init(TaskRegistry::new)
    }

    /// Spawn `task` for `job_id`, dropping handles of tasks that already ended.
    pub fn spawn<F>(&self, job_id: Uuid, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        let mut tasks = self.tasks.lock();
        tasks.retain(|_, h| !h.is_finished());
        tasks.insert(job_id, handle);
    }

    /// Wait for a job's task to end. Returns false if no task was registered.
    pub async fn wait(&self, job_id: Uuid) -> bool {
        let handle = self.tasks.lock().remove(&job_id);
        match handle {
            Some(handle) => {
                if let Err(e) = handle.await {
                    tracing::error!("Scan task {job_id} ended abnormally: {e}");
                }
                true
            }
            None => false,
        }
    }

    /// Abort every task still running and return how many were aborted.
    /// Called on shutdown.
    pub fn abort_all(&self) -> usize {
        let mut tasks = self.tasks.lock();
        let mut aborted = 0;
        for (job_id, handle) in tasks.drain() {
            if !handle.is_finished() {
                tracing::info!("Aborting scan task {job_id}");
                handle.abort();
                aborted += 1;
            }
        }
        aborted
    }
}
