// ── External program dispatch ──
//
// Program actions hand one job per torrent to the host's runner. Jobs run
// in the background, bounded by a semaphore, and never hold up the run
// that queued them.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::client::{ProgramJob, ProgramRunner};

#[derive(Clone)]
pub struct ProgramPool {
    runner: Arc<dyn ProgramRunner>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl ProgramPool {
    pub fn new(runner: Arc<dyn ProgramRunner>, concurrency: usize) -> Self {
        Self {
            runner,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            tracker: TaskTracker::new(),
        }
    }

    /// Queue a job. Returns immediately.
    pub fn dispatch(&self, job: ProgramJob) {
        let runner = Arc::clone(&self.runner);
        let permits = Arc::clone(&self.permits);
        self.tracker.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            debug!(program = job.program_id, hash = %job.hash, "running program");
            runner.run(job).await;
        });
    }

    /// Wait for every job queued so far to finish.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

impl std::fmt::Debug for ProgramPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramPool")
            .field("available", &self.permits.available_permits())
            .field("pending", &self.tracker.len())
            .finish_non_exhaustive()
    }
}
