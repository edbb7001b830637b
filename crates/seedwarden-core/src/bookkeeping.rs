// ── Run bookkeeping ──
//
// In-memory timing state shared by every collection's runs: torrents
// recently acted on, per-rule cadence stamps and free-space cooldowns.
// Everything is keyed by collection so runs never see each other's state.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::config::EngineConfig;
use crate::model::{CollectionId, Rule, RuleId, TorrentHash};

fn within(since: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    let Ok(window) = chrono::Duration::from_std(window) else {
        return false;
    };
    now.signed_duration_since(since) < window
}

#[derive(Debug, Default)]
pub struct Bookkeeping {
    processed: DashMap<(CollectionId, TorrentHash), DateTime<Utc>>,
    rule_runs: DashMap<(CollectionId, RuleId), DateTime<Utc>>,
    cooldowns: DashMap<CollectionId, DateTime<Utc>>,
}

impl Bookkeeping {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Processed torrents ───────────────────────────────────────────

    /// Torrents of `collection` acted on within `window` of `now`.
    pub fn recently_processed(
        &self,
        collection: CollectionId,
        now: DateTime<Utc>,
        window: Duration,
    ) -> HashSet<TorrentHash> {
        self.processed
            .iter()
            .filter(|e| e.key().0 == collection && within(*e.value(), now, window))
            .map(|e| e.key().1.clone())
            .collect()
    }

    pub fn mark_processed(
        &self,
        collection: CollectionId,
        hashes: impl IntoIterator<Item = TorrentHash>,
        now: DateTime<Utc>,
    ) {
        for hash in hashes {
            self.processed.insert((collection, hash), now);
        }
    }

    // ── Rule cadence ─────────────────────────────────────────────────

    /// A rule without an interval is always due; otherwise it is due once
    /// the interval has elapsed since its last stamp.
    pub fn rule_due(&self, collection: CollectionId, rule: &Rule, now: DateTime<Utc>) -> bool {
        let Some(interval) = rule.interval else {
            return true;
        };
        self.rule_runs
            .get(&(collection, rule.id))
            .is_none_or(|last| !within(*last, now, interval))
    }

    pub fn stamp_rules(
        &self,
        collection: CollectionId,
        rules: impl IntoIterator<Item = RuleId>,
        now: DateTime<Utc>,
    ) {
        for rule in rules {
            self.rule_runs.insert((collection, rule), now);
        }
    }

    // ── Free-space cooldown ──────────────────────────────────────────

    /// Whether free-space delete rules of `collection` are held back.
    pub fn in_cooldown(&self, collection: CollectionId, now: DateTime<Utc>, cooldown: Duration) -> bool {
        self.cooldowns
            .get(&collection)
            .is_some_and(|started| within(*started, now, cooldown))
    }

    pub fn start_cooldown(&self, collection: CollectionId, now: DateTime<Utc>) {
        self.cooldowns.insert(collection, now);
    }

    // ── Retention ────────────────────────────────────────────────────

    /// Drop entries past their retention. Returns how many were removed.
    pub fn prune(&self, now: DateTime<Utc>, config: &EngineConfig) -> usize {
        let before = self.processed.len() + self.rule_runs.len() + self.cooldowns.len();

        self.processed
            .retain(|_, at| within(*at, now, config.processed_retention));
        self.rule_runs
            .retain(|_, at| within(*at, now, config.rule_run_retention));
        let cooldown_keep = config.free_space_cooldown.max(config.cooldown_retention);
        self.cooldowns.retain(|_, at| within(*at, now, cooldown_keep));

        let after = self.processed.len() + self.rule_runs.len() + self.cooldowns.len();
        before.saturating_sub(after)
    }
}
