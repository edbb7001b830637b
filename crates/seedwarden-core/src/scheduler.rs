// ── Scheduler ──
//
// Periodic driver. Every poll interval it runs all active collections
// concurrently, then prunes bookkeeping and the audit store. Manual runs
// go through the engine's per-collection lock, so they queue behind a
// scheduled run of the same collection instead of racing it.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::CollectionId;
use crate::reconcile::{Engine, RunOptions, RunSummary};

/// Outcome of one scheduled pass.
#[derive(Debug, Default)]
pub struct PassReport {
    pub summaries: Vec<RunSummary>,
    pub failures: Vec<(CollectionId, String)>,
}

pub struct Scheduler {
    engine: Engine,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(engine: Engine) -> Self {
        let cancel = engine.cancel_token().clone();
        Self {
            engine,
            cancel,
            task_handles: Mutex::new(Vec::new()),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Spawn the periodic pass task.
    pub async fn start(&self) {
        let interval = self.engine.config().poll_interval;
        let handle = tokio::spawn(pass_task(self.engine.clone(), interval, self.cancel.clone()));
        self.task_handles.lock().await.push(handle);
        info!(interval_secs = interval.as_secs(), "scheduler started");
    }

    /// Stop the periodic task and wait for it, then for queued programs.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let mut handles = self.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        self.engine.programs_idle().await;
        debug!("scheduler stopped");
    }

    /// Run one collection now, outside the periodic cadence.
    pub async fn run_now(
        &self,
        collection: CollectionId,
        options: RunOptions,
    ) -> Result<RunSummary, CoreError> {
        self.engine.run_collection(collection, options).await
    }

    /// One full pass over every active collection, then maintenance.
    pub async fn run_pass(&self) -> Result<PassReport, CoreError> {
        run_pass(&self.engine).await
    }
}

async fn run_pass(engine: &Engine) -> Result<PassReport, CoreError> {
    let collections = engine.clients().active_collections().await?;
    debug!(collections = collections.len(), "scheduled pass");

    let mut set = JoinSet::new();
    for collection in collections {
        let engine = engine.clone();
        set.spawn(async move {
            let result = engine
                .run_collection(collection, RunOptions::default())
                .await;
            (collection, result)
        });
    }

    let mut report = PassReport::default();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((_, Ok(summary))) => report.summaries.push(summary),
            Ok((collection, Err(e))) => report.failures.push((collection, e.to_string())),
            Err(e) => warn!(error = %e, "collection run task panicked"),
        }
    }
    report.summaries.sort_by_key(|s| s.collection);

    if let Err(e) = engine.prune().await {
        warn!(error = %e, "pruning failed");
    }
    Ok(report)
}

async fn pass_task(engine: Engine, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = run_pass(&engine).await {
                    warn!(error = %e, "scheduled pass failed");
                }
            }
        }
    }
}
