// ── Evaluation context ──
//
// Cross-torrent facts a single torrent cannot answer alone: tracker health
// sets, resolved tracker domains, category lookups, group indices, file
// manifests and the free-space projection. Rebuilt for every run, owned by
// that run, never shared between collections.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use super::lookup::CategoryIndex;
use crate::freespace::{FreeSpaceKey, FreeSpaceProjector, ProjectionMode};
use crate::grouping::GroupIndex;
use crate::model::{
    GroupDefinition, RuleId, Torrent, TorrentFile, TorrentHash, TrackerStatus,
};

/// Tracker messages meaning the tracker no longer knows the torrent.
const UNREGISTERED_PHRASES: &[&str] = &[
    "unregistered",
    "not registered",
    "torrent not found",
    "torrent does not exist",
    "unknown torrent",
    "infohash not found",
    "torrent has been deleted",
    "torrent has been nuked",
    "trumped",
    "dupe",
    "retitled",
    "season pack",
    "complete season uploaded",
    "specifically banned",
    "content removed",
];

pub fn is_unregistered_message(message: &str) -> bool {
    let message = message.to_lowercase();
    UNREGISTERED_PHRASES.iter().any(|p| message.contains(p))
}

/// Per-run evaluation context.
#[derive(Debug)]
pub struct EvalContext {
    now: DateTime<Utc>,
    torrents: Vec<Torrent>,
    positions: HashMap<TorrentHash, usize>,
    tracker_domains: HashMap<TorrentHash, String>,
    display_names: HashMap<String, String>,
    unregistered: HashSet<TorrentHash>,
    tracker_down: HashSet<TorrentHash>,
    categories: CategoryIndex,
    cross_seeds: GroupIndex,
    groups: HashMap<(RuleId, String), GroupIndex>,
    manifests: HashMap<TorrentHash, Vec<TorrentFile>>,
    min_overlap_percent: f64,
    free_space: FreeSpaceProjector,
    scope: Option<FreeSpaceKey>,
}

impl EvalContext {
    /// Build the snapshot-derived parts of the context. `resolve_domain`
    /// maps a tracker URL to the domain rules match against.
    pub fn new(
        torrents: Vec<Torrent>,
        now: DateTime<Utc>,
        resolve_domain: impl Fn(&str) -> String,
    ) -> Self {
        let positions = torrents
            .iter()
            .enumerate()
            .map(|(i, t)| (t.hash.clone(), i))
            .collect();

        let tracker_domains: HashMap<TorrentHash, String> = torrents
            .iter()
            .map(|t| (t.hash.clone(), resolve_domain(&t.tracker)))
            .collect();

        let mut unregistered = HashSet::new();
        let mut tracker_down = HashSet::new();
        for t in &torrents {
            if is_unregistered_message(&t.tracker_message) {
                unregistered.insert(t.hash.clone());
            } else if t.tracker_status == TrackerStatus::NotWorking {
                tracker_down.insert(t.hash.clone());
            }
        }

        let categories = CategoryIndex::build(&torrents);
        let cross_seeds = GroupIndex::build(&GroupDefinition::cross_seed(), &torrents, &tracker_domains);

        Self {
            now,
            torrents,
            positions,
            tracker_domains,
            display_names: HashMap::new(),
            unregistered,
            tracker_down,
            categories,
            cross_seeds,
            groups: HashMap::new(),
            manifests: HashMap::new(),
            min_overlap_percent: 90.0,
            free_space: FreeSpaceProjector::new(ProjectionMode::Needed),
            scope: None,
        }
    }

    // ── Builder-style setters ────────────────────────────────────────

    pub fn with_display_names(mut self, names: HashMap<String, String>) -> Self {
        self.display_names = names
            .into_iter()
            .map(|(domain, name)| (domain.to_lowercase(), name))
            .collect();
        self
    }

    pub fn with_min_overlap_percent(mut self, percent: f64) -> Self {
        self.min_overlap_percent = percent;
        self
    }

    pub fn with_projection_mode(mut self, mode: ProjectionMode) -> Self {
        self.free_space = FreeSpaceProjector::new(mode);
        self
    }

    /// Build and cache the index for a rule's group definition.
    pub fn index_group(&mut self, rule: RuleId, definition: &GroupDefinition) {
        let key = (rule, definition.id.clone());
        if self.groups.contains_key(&key) {
            return;
        }
        let index = GroupIndex::build(definition, &self.torrents, &self.tracker_domains);
        self.groups.insert(key, index);
    }

    pub fn insert_manifests(&mut self, manifests: HashMap<TorrentHash, Vec<TorrentFile>>) {
        self.manifests.extend(manifests);
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Torrents in evaluation order.
    pub fn torrents(&self) -> &[Torrent] {
        &self.torrents
    }

    pub fn torrent(&self, hash: &TorrentHash) -> Option<&Torrent> {
        self.positions.get(hash).and_then(|&i| self.torrents.get(i))
    }

    pub fn tracker_domain(&self, hash: &TorrentHash) -> &str {
        self.tracker_domains.get(hash).map_or("", String::as_str)
    }

    /// Operator-chosen tracker name, falling back to the domain.
    pub fn tracker_display_name(&self, hash: &TorrentHash) -> &str {
        let domain = self.tracker_domain(hash);
        self.display_names.get(domain).map_or(domain, String::as_str)
    }

    pub fn is_unregistered(&self, hash: &TorrentHash) -> bool {
        self.unregistered.contains(hash)
    }

    pub fn is_tracker_down(&self, hash: &TorrentHash) -> bool {
        self.tracker_down.contains(hash)
    }

    pub fn categories(&self) -> &CategoryIndex {
        &self.categories
    }

    // ── Grouping ─────────────────────────────────────────────────────

    pub fn cross_seed_index(&self) -> &GroupIndex {
        &self.cross_seeds
    }

    pub fn group_index(&self, rule: RuleId, group_id: &str) -> Option<&GroupIndex> {
        self.groups.get(&(rule, group_id.to_owned()))
    }

    pub fn group_indices(&self) -> impl Iterator<Item = &GroupIndex> {
        std::iter::once(&self.cross_seeds).chain(self.groups.values())
    }

    pub fn manifests(&self) -> &HashMap<TorrentHash, Vec<TorrentFile>> {
        &self.manifests
    }

    pub fn min_overlap_percent(&self) -> f64 {
        self.min_overlap_percent
    }

    /// Cross-seed siblings that passed the ambiguity policy. An unresolved
    /// group has no usable siblings.
    pub fn cross_seed_siblings(&self, hash: &TorrentHash) -> Vec<&Torrent> {
        match self
            .cross_seeds
            .expand(hash, &self.manifests, self.min_overlap_percent)
        {
            Ok(siblings) => siblings.iter().filter_map(|h| self.torrent(h)).collect(),
            Err(e) => {
                tracing::debug!(hash = %hash, error = %e, "cross-seed siblings unresolved");
                Vec::new()
            }
        }
    }

    // ── Free space ───────────────────────────────────────────────────

    pub fn free_space(&self) -> &FreeSpaceProjector {
        &self.free_space
    }

    pub fn free_space_mut(&mut self) -> &mut FreeSpaceProjector {
        &mut self.free_space
    }

    /// Scope `free_space` lookups to one rule's disk source.
    pub fn set_free_space_scope(&mut self, scope: Option<FreeSpaceKey>) {
        self.scope = scope;
    }

    /// Value of the `free_space` field for the active rule.
    pub fn current_free_space(&self) -> Option<u64> {
        self.scope
            .as_ref()
            .and_then(|key| self.free_space.effective_free_space(key))
    }
}
