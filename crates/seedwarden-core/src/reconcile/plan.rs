// ── Run planning ──
//
// Evaluating -> Diffing -> Batching. Walks the snapshot in a fixed order,
// folds every selected rule into each torrent's desired state, widens
// deletes and placements to cross-seed siblings, diffs the result against
// the snapshot and groups the surviving actions into bounded batches.
//
// Planning never performs IO. The live run and the preview both call
// `Planner::plan` and `build_batches`, so they reach the same decisions.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Serialize, Serializer};

use super::desired::{Attributed, DeleteIntent, DesiredState, Lifecycle, Placement, RuleIntent};
use super::selector::TrackerSelector;
use crate::eval::{EvalContext, matches_optional};
use crate::freespace::FreeSpaceKey;
use crate::grouping::key::normalize_path;
use crate::model::{
    ActionKind, ConditionNode, DeleteMode, Field, Rule, RuleId, TagMode, Torrent, TorrentHash,
};

// ── Plan types ──────────────────────────────────────────────────────

/// Share-limit ratio usable as an ordered map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RatioKey(u64);

impl RatioKey {
    pub fn new(ratio: f64) -> Self {
        Self(ratio.to_bits())
    }

    pub fn get(self) -> f64 {
        f64::from_bits(self.0)
    }
}

impl Serialize for RatioKey {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(self.get())
    }
}

/// Parameters that must be equal for two actions to share one call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum BatchParams {
    None,
    Limit(i64),
    ShareLimits {
        ratio_limit: RatioKey,
        seeding_time_limit: i64,
        inactive_seeding_time_limit: i64,
    },
    Tag(String),
    Category(String),
    Path(String),
    DeleteFiles(bool),
    Program(i64),
}

/// One mutation for one torrent, after diffing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedAction {
    pub hash: TorrentHash,
    pub name: String,
    pub size: i64,
    pub kind: ActionKind,
    pub params: BatchParams,
    pub rule_id: RuleId,
    pub rule_name: String,
    pub reason: String,
    /// Deletion driven by a free-space rule.
    pub free_space: bool,
}

/// An action that was wanted but not planned because a check failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanSkip {
    pub hash: TorrentHash,
    pub name: String,
    pub rule_id: RuleId,
    pub rule_name: String,
    pub action: ActionKind,
    pub reason: String,
}

impl PlanSkip {
    fn new(torrent: &Torrent, rule_id: RuleId, rule_name: &str, action: ActionKind, reason: String) -> Self {
        tracing::debug!(
            hash = %torrent.hash,
            rule = %rule_name,
            action = %action,
            reason = %reason,
            "action skipped"
        );
        Self {
            hash: torrent.hash.clone(),
            name: torrent.name.clone(),
            rule_id,
            rule_name: rule_name.to_owned(),
            action,
            reason,
        }
    }
}

/// Everything a run decided, before execution.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub desired: BTreeMap<TorrentHash, DesiredState>,
    pub actions: Vec<PlannedAction>,
    pub skips: Vec<PlanSkip>,
    /// Rules that matched at least one evaluated torrent.
    pub matched_rules: BTreeSet<RuleId>,
    pub evaluated: usize,
    pub skipped_recent: usize,
}

// ── Rule evaluation ─────────────────────────────────────────────────

struct RuleOutcome {
    intent: RuleIntent,
    matched: bool,
}

/// Group-scoped actions need every member of the torrent's group to match
/// the same condition. An unresolved group cancels the action.
fn group_gate(
    rule: &Rule,
    group_id: Option<&str>,
    condition: Option<&ConditionNode>,
    torrent: &Torrent,
    ctx: &EvalContext,
) -> Result<(), String> {
    let Some(group_id) = group_id else {
        return Ok(());
    };
    let index = ctx
        .group_index(rule.id, group_id)
        .ok_or_else(|| format!("unknown group '{group_id}'"))?;
    let members = index
        .expand(&torrent.hash, ctx.manifests(), ctx.min_overlap_percent())
        .map_err(|e| e.to_string())?;

    for hash in &members {
        let member = ctx
            .torrent(hash)
            .ok_or_else(|| format!("group member {hash} missing from snapshot"))?;
        if !matches_optional(condition, member, ctx) {
            return Err(format!("group member '{}' does not match", member.name));
        }
    }
    Ok(())
}

#[allow(clippy::too_many_lines)]
fn evaluate_rule(
    rule: &Rule,
    torrent: &Torrent,
    ctx: &EvalContext,
    skips: &mut Vec<PlanSkip>,
) -> RuleOutcome {
    let actions = &rule.actions;
    let hit = |condition: Option<&ConditionNode>| matches_optional(condition, torrent, ctx);
    let mut intent = RuleIntent::default();
    let mut matched = false;

    if let Some(act) = &actions.speed_limits {
        if hit(act.condition.as_ref()) {
            intent.upload_limit = act.upload_limit;
            intent.download_limit = act.download_limit;
            matched = true;
        }
    }
    if let Some(act) = &actions.share_limits {
        if hit(act.condition.as_ref()) {
            intent.share_limits = Some(act.limits);
            matched = true;
        }
    }
    if let Some(act) = &actions.pause {
        if hit(act.condition.as_ref()) {
            intent.lifecycle = Some(Lifecycle::Pause);
            matched = true;
        }
    }
    if let Some(act) = &actions.resume {
        if hit(act.condition.as_ref()) {
            intent.lifecycle = Some(Lifecycle::Resume);
            matched = true;
        }
    }
    if let Some(act) = &actions.recheck {
        if hit(act.condition.as_ref()) {
            intent.recheck = true;
            matched = true;
        }
    }
    if let Some(act) = &actions.reannounce {
        if hit(act.condition.as_ref()) {
            intent.reannounce = true;
            matched = true;
        }
    }
    if let Some(act) = &actions.tag {
        let tag_hit = hit(act.condition.as_ref());
        let present = match (act.mode, tag_hit) {
            (TagMode::Full, present) => Some(present),
            (TagMode::Add, true) => Some(true),
            (TagMode::Remove, true) => Some(false),
            (TagMode::Add | TagMode::Remove, false) => None,
        };
        if let Some(present) = present {
            intent.tags = act
                .tags
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .map(|t| (t.to_owned(), present))
                .collect();
        }
        matched |= tag_hit;
    }
    if let Some(act) = &actions.category {
        if hit(act.condition.as_ref()) {
            match group_gate(rule, act.group_id.as_deref(), act.condition.as_ref(), torrent, ctx) {
                Ok(()) => {
                    intent.category = Some(Placement::new(&act.category, act.include_cross_seeds));
                    matched = true;
                }
                Err(reason) => {
                    skips.push(PlanSkip::new(torrent, rule.id, &rule.name, ActionKind::Category, reason));
                }
            }
        }
    }
    if let Some(act) = &actions.move_to {
        if hit(act.condition.as_ref()) {
            match group_gate(rule, act.group_id.as_deref(), act.condition.as_ref(), torrent, ctx) {
                Ok(()) => {
                    intent.location = Some(Placement::new(&act.path, act.include_cross_seeds));
                    matched = true;
                }
                Err(reason) => {
                    skips.push(PlanSkip::new(torrent, rule.id, &rule.name, ActionKind::Move, reason));
                }
            }
        }
    }
    if let Some(act) = &actions.delete {
        if hit(act.condition.as_ref()) {
            match group_gate(rule, act.group_id.as_deref(), act.condition.as_ref(), torrent, ctx) {
                Ok(()) => {
                    intent.delete = Some(DeleteIntent {
                        mode: act.mode,
                        free_space: rule.deletes_on_free_space(),
                        via: None,
                    });
                    matched = true;
                }
                Err(reason) => {
                    skips.push(PlanSkip::new(torrent, rule.id, &rule.name, ActionKind::Delete, reason));
                }
            }
        }
    }
    if let Some(act) = &actions.program {
        if hit(act.condition.as_ref()) {
            intent.program = Some(act.program_id);
            matched = true;
        }
    }

    RuleOutcome { intent, matched }
}

fn free_space_key(rule: &Rule) -> Option<FreeSpaceKey> {
    rule.references(Field::FreeSpace)
        .then(|| FreeSpaceKey::new(rule.id, rule.free_space_source.clone()))
}

// ── Planner ─────────────────────────────────────────────────────────

/// Decides what a run would do for one collection.
pub struct Planner<'a> {
    rules: &'a [Rule],
    selectors: Vec<TrackerSelector>,
    recent: &'a HashSet<TorrentHash>,
}

impl<'a> Planner<'a> {
    /// `rules` in priority order; `recent` holds torrents inside the skip
    /// window.
    pub fn new(rules: &'a [Rule], recent: &'a HashSet<TorrentHash>) -> Self {
        Self {
            rules,
            selectors: rules
                .iter()
                .map(|r| TrackerSelector::parse(&r.tracker_pattern))
                .collect(),
            recent,
        }
    }

    fn rule(&self, id: RuleId) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn plan(&self, ctx: &mut EvalContext) -> Plan {
        let mut plan = Plan::default();
        let hashes: Vec<TorrentHash> = ctx.torrents().iter().map(|t| t.hash.clone()).collect();

        for hash in &hashes {
            if self.recent.contains(hash) {
                plan.skipped_recent += 1;
                continue;
            }
            // Already claimed by a sibling's cross-seed deletion.
            if plan.desired.get(hash).is_some_and(DesiredState::is_deleted) {
                continue;
            }
            let Some(torrent) = ctx.torrent(hash).cloned() else {
                continue;
            };
            plan.evaluated += 1;

            let mut state = plan.desired.remove(hash).unwrap_or_default();
            for (rule, selector) in self.rules.iter().zip(&self.selectors) {
                if !selector.matches(ctx.tracker_domain(hash), ctx.tracker_display_name(hash)) {
                    continue;
                }
                ctx.set_free_space_scope(free_space_key(rule));
                let outcome = evaluate_rule(rule, &torrent, ctx, &mut plan.skips);
                if outcome.matched {
                    plan.matched_rules.insert(rule.id);
                }
                state = state.apply(rule, &outcome.intent);
            }
            ctx.set_free_space_scope(None);

            self.resolve_delete(&torrent, &mut state, ctx, &mut plan);
            let mut state = state.settle();
            if !state.is_deleted() {
                self.widen_placement(&mut state, Slot::Category, &torrent, ctx, &mut plan);
                self.widen_placement(&mut state, Slot::Location, &torrent, ctx, &mut plan);
            }
            if !state.is_empty() {
                plan.desired.insert(hash.clone(), state);
            }
        }

        plan.actions = diff_all(&plan.desired, ctx);
        tracing::debug!(
            evaluated = plan.evaluated,
            skipped_recent = plan.skipped_recent,
            actions = plan.actions.len(),
            skips = plan.skips.len(),
            "plan complete"
        );
        plan
    }

    /// Widen a cross-seed delete to its siblings and count the bytes it
    /// frees. An unresolved group, or a sibling inside the skip window,
    /// cancels a cross-seed delete.
    fn resolve_delete(
        &self,
        torrent: &Torrent,
        state: &mut DesiredState,
        ctx: &mut EvalContext,
        plan: &mut Plan,
    ) {
        let Some(delete) = state.delete.clone() else {
            return;
        };
        let mode = delete.value.mode;
        let expansion = ctx
            .cross_seed_index()
            .expand(&torrent.hash, ctx.manifests(), ctx.min_overlap_percent());

        let siblings = if mode == DeleteMode::WithFilesIncludeCrossSeeds {
            let checked = expansion.clone().map_err(|e| e.to_string()).and_then(|siblings| {
                let busy = siblings.iter().find(|s| self.recent.contains(*s)).cloned();
                match busy {
                    Some(busy) => Err(format!("cross-seed {busy} was acted on too recently")),
                    None => Ok(siblings),
                }
            });
            match checked {
                Ok(siblings) => siblings,
                Err(reason) => {
                    plan.skips.push(PlanSkip::new(
                        torrent,
                        delete.rule_id,
                        &delete.rule_name,
                        ActionKind::Delete,
                        reason,
                    ));
                    state.delete = None;
                    return;
                }
            }
        } else {
            Vec::new()
        };

        // Preserve mode takes the data only once every verified sibling is
        // going too, which is what `diff` decides for the same torrent.
        let frees_data = match mode {
            DeleteMode::KeepFiles => false,
            DeleteMode::WithFiles | DeleteMode::WithFilesIncludeCrossSeeds => true,
            DeleteMode::WithFilesPreserveCrossSeeds => expansion.as_ref().is_ok_and(|verified| {
                verified
                    .iter()
                    .all(|h| plan.desired.get(h).is_some_and(DesiredState::is_deleted))
            }),
        };

        if delete.value.free_space && frees_data {
            if let Some(key) = self.rule(delete.rule_id).and_then(free_space_key) {
                let sharing: Vec<Torrent> = expansion
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|h| ctx.torrent(h).cloned())
                    .collect();
                ctx.free_space_mut().record_shared(&key, torrent, &sharing);
            }
        }

        for sibling in siblings {
            if plan.desired.get(&sibling).is_some_and(DesiredState::is_deleted) {
                continue;
            }
            let claimed = DesiredState {
                delete: Some(Attributed {
                    value: DeleteIntent {
                        mode: DeleteMode::WithFiles,
                        free_space: delete.value.free_space,
                        via: Some(torrent.name.clone()),
                    },
                    rule_id: delete.rule_id,
                    rule_name: delete.rule_name.clone(),
                }),
                ..DesiredState::default()
            };
            plan.desired.insert(sibling, claimed);
        }
    }

    /// Copy a category or location to every verified cross-seed sibling
    /// outside the skip window. An unresolved group cancels the action for
    /// the trigger as well.
    fn widen_placement(
        &self,
        state: &mut DesiredState,
        slot: Slot,
        torrent: &Torrent,
        ctx: &EvalContext,
        plan: &mut Plan,
    ) {
        let Some(placement) = slot.get(state).clone() else {
            return;
        };
        if !placement.value.include_cross_seeds || placement.value.via.is_some() {
            return;
        }

        let siblings = match ctx
            .cross_seed_index()
            .expand(&torrent.hash, ctx.manifests(), ctx.min_overlap_percent())
        {
            Ok(siblings) => siblings,
            Err(e) => {
                plan.skips.push(PlanSkip::new(
                    torrent,
                    placement.rule_id,
                    &placement.rule_name,
                    slot.kind(),
                    e.to_string(),
                ));
                *slot.get(state) = None;
                return;
            }
        };

        for sibling in siblings {
            if self.recent.contains(&sibling) {
                continue;
            }
            let entry = plan.desired.entry(sibling).or_default();
            if entry.is_deleted() {
                continue;
            }
            *slot.get(entry) = Some(Attributed {
                value: Placement {
                    value: placement.value.value.clone(),
                    include_cross_seeds: false,
                    via: Some(torrent.name.clone()),
                },
                rule_id: placement.rule_id,
                rule_name: placement.rule_name.clone(),
            });
        }
    }
}

#[derive(Clone, Copy)]
enum Slot {
    Category,
    Location,
}

impl Slot {
    fn get(self, state: &mut DesiredState) -> &mut Option<Attributed<Placement>> {
        match self {
            Self::Category => &mut state.category,
            Self::Location => &mut state.location,
        }
    }

    fn kind(self) -> ActionKind {
        match self {
            Self::Category => ActionKind::Category,
            Self::Location => ActionKind::Move,
        }
    }
}

// ── Diffing ─────────────────────────────────────────────────────────

/// Limits at or below zero all mean "unlimited".
fn normalize_limit(limit: i64) -> i64 {
    if limit <= 0 { -1 } else { limit }
}

fn reason_for(rule_name: &str, via: Option<&str>) -> String {
    match via {
        Some(trigger) => format!("cross-seed of '{trigger}' (rule '{rule_name}')"),
        None => format!("matched rule '{rule_name}'"),
    }
}

/// Whether a preserve-mode delete may take the data with it: every
/// verified sibling is being deleted too.
fn preserve_allows_files(
    torrent: &Torrent,
    ctx: &EvalContext,
    deleted: &HashSet<&TorrentHash>,
) -> bool {
    match ctx
        .cross_seed_index()
        .expand(&torrent.hash, ctx.manifests(), ctx.min_overlap_percent())
    {
        Ok(siblings) => siblings.iter().all(|s| deleted.contains(s)),
        Err(_) => false,
    }
}

fn diff_all(desired: &BTreeMap<TorrentHash, DesiredState>, ctx: &EvalContext) -> Vec<PlannedAction> {
    let deleted: HashSet<&TorrentHash> = desired
        .iter()
        .filter(|(_, s)| s.is_deleted())
        .map(|(h, _)| h)
        .collect();

    ctx.torrents()
        .iter()
        .filter_map(|t| desired.get(&t.hash).map(|s| (t, s)))
        .flat_map(|(t, s)| diff(t, s, ctx, &deleted))
        .collect()
}

/// Turn a settled desired state into the calls that would change anything.
fn diff(
    torrent: &Torrent,
    state: &DesiredState,
    ctx: &EvalContext,
    deleted: &HashSet<&TorrentHash>,
) -> Vec<PlannedAction> {
    let action = |kind: ActionKind, params: BatchParams, rule_id: RuleId, rule_name: &str, reason: String| {
        PlannedAction {
            hash: torrent.hash.clone(),
            name: torrent.name.clone(),
            size: torrent.size,
            kind,
            params,
            rule_id,
            rule_name: rule_name.to_owned(),
            reason,
            free_space: false,
        }
    };
    let matched = |rule_name: &str| reason_for(rule_name, None);
    let mut out = Vec::new();

    if let Some(delete) = &state.delete {
        let (files, reason) = match delete.value.mode {
            DeleteMode::KeepFiles => (false, reason_for(&delete.rule_name, delete.value.via.as_deref())),
            DeleteMode::WithFiles | DeleteMode::WithFilesIncludeCrossSeeds => {
                (true, reason_for(&delete.rule_name, delete.value.via.as_deref()))
            }
            DeleteMode::WithFilesPreserveCrossSeeds => {
                if preserve_allows_files(torrent, ctx, deleted) {
                    (true, matched(&delete.rule_name))
                } else {
                    (
                        false,
                        format!(
                            "matched rule '{}'; files kept for cross-seeds",
                            delete.rule_name
                        ),
                    )
                }
            }
        };
        let mut planned = action(
            ActionKind::Delete,
            BatchParams::DeleteFiles(files),
            delete.rule_id,
            &delete.rule_name,
            reason,
        );
        planned.free_space = delete.value.free_space;
        out.push(planned);
        return out;
    }

    if let Some(up) = &state.upload_limit {
        if normalize_limit(up.value) != normalize_limit(torrent.up_limit) {
            out.push(action(
                ActionKind::UploadLimit,
                BatchParams::Limit(up.value),
                up.rule_id,
                &up.rule_name,
                matched(&up.rule_name),
            ));
        }
    }
    if let Some(down) = &state.download_limit {
        if normalize_limit(down.value) != normalize_limit(torrent.dl_limit) {
            out.push(action(
                ActionKind::DownloadLimit,
                BatchParams::Limit(down.value),
                down.rule_id,
                &down.rule_name,
                matched(&down.rule_name),
            ));
        }
    }
    if let Some(share) = &state.share_limits {
        let l = share.value;
        let differs = (l.ratio_limit - torrent.ratio_limit).abs() > 1e-3
            || l.seeding_time_limit != torrent.seeding_time_limit
            || l.inactive_seeding_time_limit != torrent.inactive_seeding_time_limit;
        if differs {
            out.push(action(
                ActionKind::ShareLimits,
                BatchParams::ShareLimits {
                    ratio_limit: RatioKey::new(l.ratio_limit),
                    seeding_time_limit: l.seeding_time_limit,
                    inactive_seeding_time_limit: l.inactive_seeding_time_limit,
                },
                share.rule_id,
                &share.rule_name,
                matched(&share.rule_name),
            ));
        }
    }
    if let Some(life) = &state.lifecycle {
        let paused = torrent.state.is_paused();
        let kind = match life.value {
            Lifecycle::Pause if !paused => Some(ActionKind::Pause),
            Lifecycle::Resume if paused => Some(ActionKind::Resume),
            Lifecycle::Pause | Lifecycle::Resume => None,
        };
        if let Some(kind) = kind {
            out.push(action(kind, BatchParams::None, life.rule_id, &life.rule_name, matched(&life.rule_name)));
        }
    }
    if let Some(recheck) = &state.recheck {
        if !torrent.state.is_checking() {
            out.push(action(
                ActionKind::Recheck,
                BatchParams::None,
                recheck.rule_id,
                &recheck.rule_name,
                matched(&recheck.rule_name),
            ));
        }
    }
    if let Some(reannounce) = &state.reannounce {
        if !torrent.state.is_paused() {
            out.push(action(
                ActionKind::Reannounce,
                BatchParams::None,
                reannounce.rule_id,
                &reannounce.rule_name,
                matched(&reannounce.rule_name),
            ));
        }
    }
    for (tag, want) in &state.tags {
        let has = torrent.has_tag(tag);
        let kind = match (want.value, has) {
            (true, false) => ActionKind::AddTags,
            (false, true) => ActionKind::RemoveTags,
            _ => continue,
        };
        out.push(action(
            kind,
            BatchParams::Tag(tag.clone()),
            want.rule_id,
            &want.rule_name,
            matched(&want.rule_name),
        ));
    }
    if let Some(category) = &state.category {
        if torrent.category != category.value.value {
            out.push(action(
                ActionKind::Category,
                BatchParams::Category(category.value.value.clone()),
                category.rule_id,
                &category.rule_name,
                reason_for(&category.rule_name, category.value.via.as_deref()),
            ));
        }
    }
    if let Some(location) = &state.location {
        if normalize_path(&torrent.save_path) != normalize_path(&location.value.value) {
            out.push(action(
                ActionKind::Move,
                BatchParams::Path(location.value.value.clone()),
                location.rule_id,
                &location.rule_name,
                reason_for(&location.rule_name, location.value.via.as_deref()),
            ));
        }
    }
    if let Some(program) = &state.program {
        out.push(action(
            ActionKind::Program,
            BatchParams::Program(program.value),
            program.rule_id,
            &program.rule_name,
            matched(&program.rule_name),
        ));
    }

    out
}

// ── Batching ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEntry {
    pub hash: TorrentHash,
    pub name: String,
    pub size: i64,
    pub reason: String,
}

/// Torrents sharing one external call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Batch {
    pub kind: ActionKind,
    pub params: BatchParams,
    pub rule_id: RuleId,
    pub rule_name: String,
    pub dry_run: bool,
    pub free_space: bool,
    pub entries: Vec<BatchEntry>,
}

impl Batch {
    pub fn hashes(&self) -> Vec<TorrentHash> {
        self.entries.iter().map(|e| e.hash.clone()).collect()
    }
}

type BatchKey = (bool, ActionKind, BatchParams, RuleId);

/// Group planned actions by (kind, parameters, rule) and chunk each group
/// to `max_batch_size`. Deletions come last.
pub fn build_batches(
    actions: &[PlannedAction],
    rules: &[Rule],
    force_dry_run: bool,
    max_batch_size: usize,
) -> Vec<Batch> {
    let dry_rules: HashSet<RuleId> = rules.iter().filter(|r| r.dry_run).map(|r| r.id).collect();
    let mut grouped: BTreeMap<BatchKey, (String, bool, Vec<BatchEntry>)> = BTreeMap::new();

    for a in actions {
        let key = (a.kind == ActionKind::Delete, a.kind, a.params.clone(), a.rule_id);
        let slot = grouped
            .entry(key)
            .or_insert_with(|| (a.rule_name.clone(), false, Vec::new()));
        slot.1 |= a.free_space;
        slot.2.push(BatchEntry {
            hash: a.hash.clone(),
            name: a.name.clone(),
            size: a.size,
            reason: a.reason.clone(),
        });
    }

    let chunk = max_batch_size.max(1);
    let mut batches = Vec::new();
    for ((_, kind, params, rule_id), (rule_name, free_space, entries)) in grouped {
        for part in entries.chunks(chunk) {
            batches.push(Batch {
                kind,
                params: params.clone(),
                rule_id,
                rule_name: rule_name.clone(),
                dry_run: force_dry_run || dry_rules.contains(&rule_id),
                free_space,
                entries: part.to_vec(),
            });
        }
    }
    batches
}
