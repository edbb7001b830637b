// ── Preview ──
//
// "What would happen" for one collection. Goes through the same loading,
// context building, planning and batching as a live run and stops before
// anything is applied or recorded.

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;
use tokio::time::Instant;
use tracing::info;

use crate::error::CoreError;
use crate::eval::EvalContext;
use crate::freespace::{CountedData, ProjectionMode};
use crate::model::{ActionKind, CollectionId, Rule, RuleId, TorrentHash};
use crate::reconcile::{Batch, BatchParams, Engine, PlanSkip, PlannedAction, Planner, build_batches};

/// How free-space rules are projected in a preview.
pub type PreviewMode = ProjectionMode;

#[derive(Debug, Clone, Default)]
pub struct PreviewRequest {
    /// Restrict the preview to one stored rule.
    pub rule_id: Option<RuleId>,
    /// Preview an unsaved rule on its own instead of the stored rules.
    pub draft: Option<Rule>,
    pub mode: PreviewMode,
}

#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub collection: CollectionId,
    pub mode: PreviewMode,
    pub evaluated: usize,
    pub batches: Vec<Batch>,
    /// One row per planned action.
    pub rows: Vec<PlannedAction>,
    /// Bytes the planned deletions would free, counting shared data once.
    pub freed_bytes: u64,
    pub skips: Vec<PlanSkip>,
}

impl Preview {
    /// Torrents the preview would delete.
    pub fn deleted(&self) -> BTreeSet<&TorrentHash> {
        self.rows
            .iter()
            .filter(|r| r.kind == ActionKind::Delete)
            .map(|r| &r.hash)
            .collect()
    }
}

fn freed_bytes(rows: &[PlannedAction], ctx: &EvalContext) -> u64 {
    let mut counted = CountedData::default();
    rows.iter()
        .filter(|r| r.kind == ActionKind::Delete && r.params == BatchParams::DeleteFiles(true))
        .filter_map(|r| ctx.torrent(&r.hash))
        .filter(|t| {
            let siblings = ctx
                .cross_seed_index()
                .expand(&t.hash, ctx.manifests(), ctx.min_overlap_percent())
                .unwrap_or_default();
            counted.insert(t, siblings.iter().filter_map(|h| ctx.torrent(h)))
        })
        .map(|t| u64::try_from(t.size).unwrap_or(0))
        .sum()
}

impl Engine {
    pub async fn preview(
        &self,
        collection: CollectionId,
        request: PreviewRequest,
    ) -> Result<Preview, CoreError> {
        let now = self.now();
        let deadline = Instant::now() + self.config().run_timeout;
        let (client, stored) = self.bounded(deadline, self.load(collection)).await?;
        let rules: Vec<Rule> = match request.draft {
            Some(draft) => vec![draft],
            None => stored
                .into_iter()
                .filter(|r| r.enabled)
                .filter(|r| request.rule_id.is_none_or(|id| id == r.id))
                .collect(),
        };

        let mut ctx = self
            .bounded(deadline, async {
                let torrents = self.snapshot(collection, client.as_ref()).await?;
                Ok(self
                    .build_context(client.as_ref(), torrents, &rules, now, request.mode)
                    .await)
            })
            .await?;
        let recent = HashSet::new();
        let plan = Planner::new(&rules, &recent).plan(&mut ctx);
        let batches = build_batches(&plan.actions, &rules, true, self.config().batch_size());
        let freed = freed_bytes(&plan.actions, &ctx);

        info!(
            collection = %collection,
            actions = plan.actions.len(),
            freed_bytes = freed,
            "preview built"
        );
        Ok(Preview {
            collection,
            mode: request.mode,
            evaluated: plan.evaluated,
            batches,
            rows: plan.actions,
            freed_bytes: freed,
            skips: plan.skips,
        })
    }
}
