// ── Batch execution ──
//
// Applying -> Recording. Batches run one at a time against the client
// under a single run deadline. A failed batch is recorded and the run
// moves on; hitting the deadline abandons every batch not yet started.
// Audit writes are best effort and never fail a run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::plan::{Batch, BatchParams};
use crate::bookkeeping::Bookkeeping;
use crate::client::{AuditStore, BulkAction, ProgramJob, TorrentClient};
use crate::error::CoreError;
use crate::model::{
    ActionKind, ActivityDetail, ActivityRecord, CollectionId, Outcome, RuleId, ShareLimits,
};
use crate::programs::ProgramPool;

/// What happened to one batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub kind: ActionKind,
    pub rule_id: RuleId,
    pub rule_name: String,
    pub outcome: Outcome,
    pub torrents: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub batches: Vec<BatchOutcome>,
    /// Batches never started because the run timed out or was cancelled.
    pub aborted: usize,
}

/// Everything one run's execution phase needs.
pub(crate) struct Executor<'a> {
    pub collection: CollectionId,
    pub run_id: Uuid,
    pub now: DateTime<Utc>,
    pub client: &'a dyn TorrentClient,
    pub audit: &'a dyn AuditStore,
    pub programs: Option<&'a ProgramPool>,
    pub bookkeeping: &'a Bookkeeping,
    pub deadline: Instant,
    pub cancel: &'a CancellationToken,
}

impl Executor<'_> {
    pub async fn run(&self, batches: &[Batch]) -> ExecutionReport {
        let mut report = ExecutionReport::default();

        for (i, batch) in batches.iter().enumerate() {
            if self.cancel.is_cancelled() {
                report.aborted = batches.len() - i;
                warn!(collection = %self.collection, aborted = report.aborted, "run cancelled");
                break;
            }

            let (outcome, error) = if batch.dry_run {
                (Outcome::DryRun, None)
            } else {
                let remaining = self.deadline.saturating_duration_since(Instant::now());
                match tokio::time::timeout(remaining, self.apply(batch)).await {
                    Ok(Ok(())) => (Outcome::Success, None),
                    Ok(Err(e)) => {
                        warn!(
                            collection = %self.collection,
                            action = %batch.kind,
                            rule = %batch.rule_name,
                            torrents = batch.entries.len(),
                            error = %e,
                            "batch failed"
                        );
                        (Outcome::Failed, Some(e.to_string()))
                    }
                    Err(_) => {
                        report.aborted = batches.len() - i;
                        warn!(
                            collection = %self.collection,
                            aborted = report.aborted,
                            "run deadline reached, abandoning remaining batches"
                        );
                        break;
                    }
                }
            };

            if outcome == Outcome::Success {
                self.bookkeeping
                    .mark_processed(self.collection, batch.hashes(), self.now);
                if batch.kind == ActionKind::Delete && batch.free_space {
                    self.bookkeeping.start_cooldown(self.collection, self.now);
                }
            }

            self.record(batch, outcome, error.as_deref()).await;
            report.batches.push(BatchOutcome {
                kind: batch.kind,
                rule_id: batch.rule_id,
                rule_name: batch.rule_name.clone(),
                outcome,
                torrents: batch.entries.len(),
                error,
            });
        }

        info!(
            collection = %self.collection,
            batches = report.batches.len(),
            aborted = report.aborted,
            "execution complete"
        );
        report
    }

    /// One external call (or one program dispatch per torrent).
    async fn apply(&self, batch: &Batch) -> Result<(), CoreError> {
        let hashes = batch.hashes();
        debug!(action = %batch.kind, torrents = hashes.len(), "applying batch");

        let client = self.client;
        match (batch.kind, &batch.params) {
            (ActionKind::UploadLimit, BatchParams::Limit(limit)) => {
                client.set_upload_limit(&hashes, *limit).await?;
            }
            (ActionKind::DownloadLimit, BatchParams::Limit(limit)) => {
                client.set_download_limit(&hashes, *limit).await?;
            }
            (
                ActionKind::ShareLimits,
                BatchParams::ShareLimits {
                    ratio_limit,
                    seeding_time_limit,
                    inactive_seeding_time_limit,
                },
            ) => {
                let limits = ShareLimits {
                    ratio_limit: ratio_limit.get(),
                    seeding_time_limit: *seeding_time_limit,
                    inactive_seeding_time_limit: *inactive_seeding_time_limit,
                };
                client.set_share_limits(&hashes, limits).await?;
            }
            (ActionKind::Pause, BatchParams::None) => {
                client.bulk_action(&hashes, BulkAction::Pause).await?;
            }
            (ActionKind::Resume, BatchParams::None) => {
                client.bulk_action(&hashes, BulkAction::Resume).await?;
            }
            (ActionKind::Recheck, BatchParams::None) => {
                client.bulk_action(&hashes, BulkAction::Recheck).await?;
            }
            (ActionKind::Reannounce, BatchParams::None) => {
                client.bulk_action(&hashes, BulkAction::Reannounce).await?;
            }
            (ActionKind::AddTags, BatchParams::Tag(tag)) => {
                client.add_tags(&hashes, std::slice::from_ref(tag)).await?;
            }
            (ActionKind::RemoveTags, BatchParams::Tag(tag)) => {
                client.remove_tags(&hashes, std::slice::from_ref(tag)).await?;
            }
            (ActionKind::Category, BatchParams::Category(category)) => {
                client.set_category(&hashes, category).await?;
            }
            (ActionKind::Move, BatchParams::Path(path)) => {
                client.set_location(&hashes, path).await?;
            }
            (ActionKind::Delete, BatchParams::DeleteFiles(delete_files)) => {
                client
                    .bulk_action(
                        &hashes,
                        BulkAction::Delete {
                            delete_files: *delete_files,
                        },
                    )
                    .await?;
            }
            (ActionKind::Program, BatchParams::Program(program_id)) => {
                let pool = self.programs.ok_or_else(|| CoreError::Configuration {
                    message: "no program runner configured".into(),
                })?;
                for entry in &batch.entries {
                    pool.dispatch(ProgramJob {
                        collection: self.collection,
                        program_id: *program_id,
                        hash: entry.hash.clone(),
                        name: entry.name.clone(),
                        rule_id: batch.rule_id,
                        rule_name: batch.rule_name.clone(),
                    });
                }
            }
            (kind, params) => {
                return Err(CoreError::Configuration {
                    message: format!("action {kind} cannot take parameters {params:?}"),
                });
            }
        }
        Ok(())
    }

    async fn record(&self, batch: &Batch, outcome: Outcome, error: Option<&str>) {
        let reason = match (error, batch.entries.as_slice()) {
            (Some(e), _) => e.to_owned(),
            (None, [only]) => only.reason.clone(),
            (None, entries) => format!(
                "{} torrents matched rule '{}'",
                entries.len(),
                batch.rule_name
            ),
        };
        let bytes: i64 = batch.entries.iter().map(|e| e.size.max(0)).sum();
        let record = ActivityRecord {
            collection: self.collection,
            run_id: self.run_id,
            outcome,
            action: batch.kind,
            rule_id: Some(batch.rule_id),
            rule_name: Some(batch.rule_name.clone()),
            reason,
            details: json!({
                "params": batch.params,
                "torrents": batch.entries.len(),
                "bytes": bytes,
                "free_space": batch.free_space,
            }),
            created_at: self.now,
        };

        let id = match self.audit.record(&record).await {
            Ok(id) => id,
            Err(e) => {
                warn!(collection = %self.collection, error = %e, "failed to write activity record");
                return;
            }
        };
        let details = batch
            .entries
            .iter()
            .map(|e| ActivityDetail {
                hash: e.hash.clone(),
                name: e.name.clone(),
                reason: e.reason.clone(),
            })
            .collect();
        if let Err(e) = self.audit.attach_details(id, details).await {
            warn!(collection = %self.collection, record = id, error = %e, "failed to attach activity details");
        }
    }
}

/// Synthetic record for a forced dry run that selected nothing.
pub(crate) async fn record_no_match(
    audit: &dyn AuditStore,
    collection: CollectionId,
    run_id: Uuid,
    now: DateTime<Utc>,
    rule: Option<(RuleId, &str)>,
    evaluated: usize,
) {
    let record = ActivityRecord {
        collection,
        run_id,
        outcome: Outcome::DryRun,
        action: ActionKind::NoMatch,
        rule_id: rule.map(|(id, _)| id),
        rule_name: rule.map(|(_, name)| name.to_owned()),
        reason: format!("no rule matched any of {evaluated} torrents"),
        details: json!({ "evaluated": evaluated }),
        created_at: now,
    };
    if let Err(e) = audit.record(&record).await {
        warn!(collection = %collection, error = %e, "failed to write activity record");
    }
}
