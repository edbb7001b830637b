// ── Reconciliation engine ──
//
// One run of one collection: Loading -> Evaluating -> Diffing -> Batching
// -> Applying -> Recording. Runs of the same collection are serialized by
// a per-collection lock; different collections run fully in parallel and
// share nothing but the engine's `Arc`ed collaborators.

pub mod desired;
pub mod execute;
pub mod plan;
pub mod selector;

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bookkeeping::Bookkeeping;
use crate::client::{
    AuditStore, ClientProvider, DisplayNameStore, NotificationSink, ProgramRunner, RuleStore,
    TorrentClient,
};
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::eval::EvalContext;
use crate::freespace::ProjectionMode;
use crate::model::{
    ActionKind, AmbiguityPolicy, CollectionId, Field, FreeSpaceSource, Outcome, Rule, RuleId,
    Torrent, TorrentHash,
};
use crate::programs::ProgramPool;

pub use desired::{Attributed, DeleteIntent, DesiredState, Lifecycle, Placement, RuleIntent};
pub use execute::{BatchOutcome, ExecutionReport};
pub use plan::{Batch, BatchEntry, BatchParams, Plan, PlanSkip, PlannedAction, Planner, build_batches};
pub use selector::TrackerSelector;

use execute::{Executor, record_no_match};

// ── Run options and results ─────────────────────────────────────────

/// How a run was requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Ignore per-rule cadence.
    pub force: bool,
    /// Record what would happen instead of calling the client.
    pub dry_run: bool,
    /// Restrict the run to one rule.
    pub rule_id: Option<RuleId>,
}

/// Torrents affected per (rule, action, outcome).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionCount {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub action: ActionKind,
    pub outcome: Outcome,
    pub torrents: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub collection: CollectionId,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub evaluated: usize,
    pub skipped_recent: usize,
    /// Actions cancelled by a failed safety check.
    pub skipped_unsafe: usize,
    pub counts: Vec<ActionCount>,
    pub applied: usize,
    pub failed: usize,
    pub dry_run_count: usize,
    pub aborted_batches: usize,
}

impl RunSummary {
    fn empty(collection: CollectionId, run_id: Uuid, now: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            collection,
            run_id,
            started_at: now,
            finished_at: now,
            dry_run,
            evaluated: 0,
            skipped_recent: 0,
            skipped_unsafe: 0,
            counts: Vec::new(),
            applied: 0,
            failed: 0,
            dry_run_count: 0,
            aborted_batches: 0,
        }
    }

    /// Whether anything was applied, attempted or simulated.
    pub fn has_activity(&self) -> bool {
        !self.counts.is_empty() || self.aborted_batches > 0
    }
}

/// Payload handed to the notification sink after a run with activity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunNotification {
    pub collection: CollectionId,
    pub message: String,
    pub summary: RunSummary,
}

impl RunNotification {
    fn from_summary(summary: &RunSummary) -> Self {
        let mut message = format!(
            "{} applied, {} failed, {} simulated",
            summary.applied, summary.failed, summary.dry_run_count
        );
        if summary.aborted_batches > 0 {
            message.push_str(&format!(", {} batches aborted", summary.aborted_batches));
        }
        Self {
            collection: summary.collection,
            message,
            summary: summary.clone(),
        }
    }
}

// ── Engine ──────────────────────────────────────────────────────────

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Reconciliation engine shared by the scheduler, manual runs and
/// previews. Cheaply cloneable.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    clients: Arc<dyn ClientProvider>,
    rules: Arc<dyn RuleStore>,
    audit: Arc<dyn AuditStore>,
    display_names: Option<Arc<dyn DisplayNameStore>>,
    notifier: Option<Arc<dyn NotificationSink>>,
    programs: Option<ProgramPool>,
    bookkeeping: Bookkeeping,
    locks: DashMap<CollectionId, Arc<Mutex<()>>>,
    summaries: DashMap<CollectionId, watch::Sender<Option<RunSummary>>>,
    clock: Clock,
    cancel: CancellationToken,
}

/// Assembles an [`Engine`] from its collaborators.
pub struct EngineBuilder {
    config: EngineConfig,
    clients: Arc<dyn ClientProvider>,
    rules: Arc<dyn RuleStore>,
    audit: Arc<dyn AuditStore>,
    display_names: Option<Arc<dyn DisplayNameStore>>,
    notifier: Option<Arc<dyn NotificationSink>>,
    program_runner: Option<Arc<dyn ProgramRunner>>,
    clock: Clock,
}

impl EngineBuilder {
    pub fn display_names(mut self, store: Arc<dyn DisplayNameStore>) -> Self {
        self.display_names = Some(store);
        self
    }

    pub fn notifier(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(sink);
        self
    }

    pub fn program_runner(mut self, runner: Arc<dyn ProgramRunner>) -> Self {
        self.program_runner = Some(runner);
        self
    }

    /// Replace the wall clock used for cadence, cooldown and age fields.
    pub fn clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn build(self) -> Engine {
        let programs = self
            .program_runner
            .map(|runner| ProgramPool::new(runner, self.config.program_concurrency));
        Engine {
            inner: Arc::new(EngineInner {
                config: self.config,
                clients: self.clients,
                rules: self.rules,
                audit: self.audit,
                display_names: self.display_names,
                notifier: self.notifier,
                programs,
                bookkeeping: Bookkeeping::new(),
                locks: DashMap::new(),
                summaries: DashMap::new(),
                clock: self.clock,
                cancel: CancellationToken::new(),
            }),
        }
    }
}

/// Group ids referenced by a rule's group-scoped actions.
fn action_group_ids(rule: &Rule) -> impl Iterator<Item = &str> {
    let a = &rule.actions;
    [
        a.category.as_ref().and_then(|x| x.group_id.as_deref()),
        a.move_to.as_ref().and_then(|x| x.group_id.as_deref()),
        a.delete.as_ref().and_then(|x| x.group_id.as_deref()),
    ]
    .into_iter()
    .flatten()
}

fn needs_display_names(rule: &Rule) -> bool {
    rule.references(Field::TrackerDisplayName)
        || !matches!(TrackerSelector::parse(&rule.tracker_pattern), TrackerSelector::All)
}

fn tally(report: &ExecutionReport) -> Vec<ActionCount> {
    let mut counts: Vec<ActionCount> = Vec::new();
    for b in &report.batches {
        match counts
            .iter_mut()
            .find(|c| c.rule_id == b.rule_id && c.action == b.kind && c.outcome == b.outcome)
        {
            Some(count) => count.torrents += b.torrents,
            None => counts.push(ActionCount {
                rule_id: b.rule_id,
                rule_name: b.rule_name.clone(),
                action: b.kind,
                outcome: b.outcome,
                torrents: b.torrents,
            }),
        }
    }
    counts
}

impl Engine {
    pub fn builder(
        config: EngineConfig,
        clients: Arc<dyn ClientProvider>,
        rules: Arc<dyn RuleStore>,
        audit: Arc<dyn AuditStore>,
    ) -> EngineBuilder {
        EngineBuilder {
            config,
            clients,
            rules,
            audit,
            display_names: None,
            notifier: None,
            program_runner: None,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn bookkeeping(&self) -> &Bookkeeping {
        &self.inner.bookkeeping
    }

    pub(crate) fn clients(&self) -> &Arc<dyn ClientProvider> {
        &self.inner.clients
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        (self.inner.clock)()
    }

    /// Wait for every queued program job.
    pub async fn programs_idle(&self) {
        if let Some(pool) = &self.inner.programs {
            pool.wait_idle().await;
        }
    }

    /// Latest summary for a collection, updated after every run.
    pub fn subscribe(&self, collection: CollectionId) -> watch::Receiver<Option<RunSummary>> {
        self.inner
            .summaries
            .entry(collection)
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }

    fn publish(&self, summary: &RunSummary) {
        self.inner
            .summaries
            .entry(summary.collection)
            .or_insert_with(|| watch::channel(None).0)
            .send_replace(Some(summary.clone()));
    }

    fn collection_lock(&self, collection: CollectionId) -> Arc<Mutex<()>> {
        Arc::clone(
            &self
                .inner
                .locks
                .entry(collection)
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    // ── Runs ─────────────────────────────────────────────────────────

    /// Reconcile one collection. Concurrent calls for the same collection
    /// queue behind each other.
    pub async fn run_collection(
        &self,
        collection: CollectionId,
        options: RunOptions,
    ) -> Result<RunSummary, CoreError> {
        let lock = self.collection_lock(collection);
        let _guard = lock.lock().await;

        match self.run_locked(collection, options).await {
            Ok(summary) => {
                self.publish(&summary);
                if summary.has_activity() {
                    if let Some(notifier) = &self.inner.notifier {
                        notifier
                            .run_completed(&RunNotification::from_summary(&summary))
                            .await;
                    }
                }
                Ok(summary)
            }
            Err(e) => {
                warn!(collection = %collection, error = %e, "run failed");
                if let Some(notifier) = &self.inner.notifier {
                    notifier.run_failed(collection, &e.to_string()).await;
                }
                Err(e)
            }
        }
    }

    /// Bound one preparation step by the run deadline and the engine's
    /// cancellation token.
    pub(crate) async fn bounded<T>(
        &self,
        deadline: Instant,
        step: impl Future<Output = Result<T, CoreError>>,
    ) -> Result<T, CoreError> {
        tokio::select! {
            biased;
            () = self.inner.cancel.cancelled() => Err(CoreError::Cancelled),
            res = tokio::time::timeout_at(deadline, step) => res.unwrap_or_else(|_| {
                Err(CoreError::Timeout {
                    timeout_secs: self.inner.config.run_timeout.as_secs(),
                })
            }),
        }
    }

    #[allow(clippy::too_many_lines)]
    async fn run_locked(
        &self,
        collection: CollectionId,
        options: RunOptions,
    ) -> Result<RunSummary, CoreError> {
        let config = &self.inner.config;
        let started_at = self.now();
        let deadline = Instant::now() + config.run_timeout;
        let run_id = Uuid::new_v4();
        info!(collection = %collection, run = %run_id, force = options.force, dry_run = options.dry_run, "run started");

        let (client, rules) = self.bounded(deadline, self.load(collection)).await?;
        let rules = self.select_rules(collection, rules, options, started_at);
        let forced_dry = options.force
            && (options.dry_run || (!rules.is_empty() && rules.iter().all(|r| r.dry_run)));
        if rules.is_empty() && !forced_dry {
            debug!(collection = %collection, "no rules due");
            return Ok(RunSummary::empty(collection, run_id, started_at, options.dry_run));
        }

        let mut ctx = self
            .bounded(deadline, async {
                let torrents = self.snapshot(collection, client.as_ref()).await?;
                Ok(self
                    .build_context(client.as_ref(), torrents, &rules, started_at, ProjectionMode::Needed)
                    .await)
            })
            .await?;
        let recent = self.inner.bookkeeping.recently_processed(
            collection,
            started_at,
            config.skip_window,
        );
        let plan = Planner::new(&rules, &recent).plan(&mut ctx);
        let batches = build_batches(&plan.actions, &rules, options.dry_run, config.batch_size());

        let executor = Executor {
            collection,
            run_id,
            now: started_at,
            client: client.as_ref(),
            audit: self.inner.audit.as_ref(),
            programs: self.inner.programs.as_ref(),
            bookkeeping: &self.inner.bookkeeping,
            deadline,
            cancel: &self.inner.cancel,
        };
        let report = executor.run(&batches).await;

        if forced_dry && batches.is_empty() {
            let rule = options
                .rule_id
                .and_then(|id| rules.iter().find(|r| r.id == id))
                .map(|r| (r.id, r.name.as_str()));
            record_no_match(
                self.inner.audit.as_ref(),
                collection,
                run_id,
                started_at,
                rule,
                plan.evaluated,
            )
            .await;
        }
        if !options.dry_run {
            self.inner.bookkeeping.stamp_rules(
                collection,
                plan.matched_rules.iter().copied(),
                started_at,
            );
        }

        let counts = tally(&report);
        let sum = |outcome: Outcome| -> usize {
            counts
                .iter()
                .filter(|c| c.outcome == outcome)
                .map(|c| c.torrents)
                .sum()
        };
        let summary = RunSummary {
            collection,
            run_id,
            started_at,
            finished_at: self.now(),
            dry_run: options.dry_run,
            evaluated: plan.evaluated,
            skipped_recent: plan.skipped_recent,
            skipped_unsafe: plan.skips.len(),
            applied: sum(Outcome::Success),
            failed: sum(Outcome::Failed),
            dry_run_count: sum(Outcome::DryRun),
            aborted_batches: report.aborted,
            counts,
        };
        info!(
            collection = %collection,
            run = %run_id,
            evaluated = summary.evaluated,
            applied = summary.applied,
            failed = summary.failed,
            dry_run = summary.dry_run_count,
            "run finished"
        );
        Ok(summary)
    }

    /// Resolve the client and the collection's rules in priority order.
    pub(crate) async fn load(
        &self,
        collection: CollectionId,
    ) -> Result<(Arc<dyn TorrentClient>, Vec<Rule>), CoreError> {
        let client = self
            .inner
            .clients
            .client(collection)
            .await
            .map_err(|e| CoreError::fatal(collection, e))?;
        let rules = self
            .inner
            .rules
            .enabled_rules(collection)
            .await
            .map_err(|e| CoreError::fatal(collection, e))?;
        Ok((client, rules))
    }

    fn select_rules(
        &self,
        collection: CollectionId,
        rules: Vec<Rule>,
        options: RunOptions,
        now: DateTime<Utc>,
    ) -> Vec<Rule> {
        let book = &self.inner.bookkeeping;
        let cooldown = self.inner.config.free_space_cooldown;
        rules
            .into_iter()
            .filter(|r| r.enabled)
            .filter(|r| options.rule_id.is_none_or(|id| id == r.id))
            .filter(|r| {
                if !options.force && !book.rule_due(collection, r, now) {
                    debug!(collection = %collection, rule = %r.name, "rule not due");
                    return false;
                }
                if r.deletes_on_free_space() && book.in_cooldown(collection, now, cooldown) {
                    debug!(collection = %collection, rule = %r.name, "free-space rule cooling down");
                    return false;
                }
                true
            })
            .collect()
    }

    /// Enumerate the collection in evaluation order.
    pub(crate) async fn snapshot(
        &self,
        collection: CollectionId,
        client: &dyn TorrentClient,
    ) -> Result<Vec<Torrent>, CoreError> {
        let mut torrents = client
            .list_torrents()
            .await
            .map_err(|e| CoreError::fatal(collection, e))?;
        torrents.sort_by(|a, b| a.added_on.cmp(&b.added_on).then_with(|| a.hash.cmp(&b.hash)));
        Ok(torrents)
    }

    /// Build the per-run context: display names, group indices, manifests
    /// for ambiguous groups and free-space readings. Collaborator failures
    /// here leave the affected data absent so dependent checks fail closed.
    pub(crate) async fn build_context(
        &self,
        client: &dyn TorrentClient,
        torrents: Vec<Torrent>,
        rules: &[Rule],
        now: DateTime<Utc>,
        mode: ProjectionMode,
    ) -> EvalContext {
        let mut ctx = EvalContext::new(torrents, now, |url| client.tracker_domain(url))
            .with_min_overlap_percent(self.inner.config.min_overlap_percent)
            .with_projection_mode(mode);

        if let Some(store) = &self.inner.display_names {
            if rules.iter().any(needs_display_names) {
                match store.display_names().await {
                    Ok(names) => ctx = ctx.with_display_names(names),
                    Err(e) => warn!(error = %e, "failed to load tracker display names"),
                }
            }
        }

        for rule in rules {
            for group_id in action_group_ids(rule) {
                match rule.group_definition(group_id) {
                    Some(definition) => ctx.index_group(rule.id, &definition),
                    None => warn!(rule = %rule.name, group = %group_id, "unknown group id"),
                }
            }
        }

        let wanted: BTreeSet<TorrentHash> = ctx
            .group_indices()
            .filter(|idx| idx.definition().ambiguity == AmbiguityPolicy::VerifyOverlap)
            .flat_map(|idx| idx.ambiguous_members())
            .collect();
        if !wanted.is_empty() {
            let hashes: Vec<TorrentHash> = wanted.into_iter().collect();
            debug!(torrents = hashes.len(), "fetching file manifests for ambiguous groups");
            match client.file_manifests(&hashes).await {
                Ok(manifests) => ctx.insert_manifests(manifests),
                Err(e) => warn!(error = %e, "failed to fetch file manifests"),
            }
        }

        let sources: BTreeSet<FreeSpaceSource> = rules
            .iter()
            .filter(|r| r.references(Field::FreeSpace))
            .map(|r| r.free_space_source.clone())
            .collect();
        for source in sources {
            match client.free_space(&source).await {
                Ok(bytes) => ctx.free_space_mut().set_reading(source, bytes),
                Err(e) => warn!(source = ?source, error = %e, "failed to read free space"),
            }
        }

        ctx
    }

    // ── Maintenance ──────────────────────────────────────────────────

    /// Prune bookkeeping and the audit store.
    pub async fn prune(&self) -> Result<(), CoreError> {
        let now = self.now();
        let config = &self.inner.config;
        let removed = self.inner.bookkeeping.prune(now, config);
        let max_age = chrono::Duration::from_std(config.audit_max_age)
            .unwrap_or_else(|_| chrono::Duration::days(36_500));
        let pruned = self
            .inner
            .audit
            .prune(now - max_age, config.audit_max_records)
            .await?;
        debug!(bookkeeping = removed, audit = pruned, "pruned");
        Ok(())
    }

    /// Torrents the given collection acted on inside the skip window.
    pub fn recently_processed(&self, collection: CollectionId) -> HashSet<TorrentHash> {
        self.inner.bookkeeping.recently_processed(
            collection,
            self.now(),
            self.inner.config.skip_window,
        )
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.inner.config)
            .field("programs", &self.inner.programs)
            .finish_non_exhaustive()
    }
}
