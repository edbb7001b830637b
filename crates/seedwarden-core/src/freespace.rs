// ── Free-space projection ──
//
// Tracks, per (rule, disk source), how many bytes the deletions selected so
// far in this run would free. The `free_space` field reads the client's
// reported value plus that projection, so a "free space below X" rule stops
// matching once enough deletions are queued.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::grouping::key::{is_shared_directory, normalize_path};
use crate::model::{FreeSpaceSource, RuleId, Torrent};

/// How the `free_space` field is resolved while a projection is running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionMode {
    /// Reported free space plus bytes already queued for deletion. Rules
    /// stop matching once their target is met.
    #[default]
    Needed,
    /// Reported free space only. Every torrent that would ever qualify
    /// matches.
    Eligible,
}

/// Key of one projection: a rule reading one disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FreeSpaceKey {
    pub rule: RuleId,
    pub source: FreeSpaceSource,
}

impl FreeSpaceKey {
    pub fn new(rule: RuleId, source: FreeSpaceSource) -> Self {
        Self { rule, source }
    }
}

/// Identity under which a torrent's bytes are counted. Hardlinked copies
/// share a signature and cross-seeds share a content path. An empty or
/// shared-directory content path says nothing about the data, so those
/// torrents count on their own.
pub fn dedup_identity(torrent: &Torrent) -> String {
    match torrent.hardlink_signature.as_deref() {
        Some(sig) if !sig.is_empty() => format!("hl:{sig}"),
        _ if torrent.content_path.trim().is_empty() || is_shared_directory(torrent) => {
            format!("id:{}", torrent.hash)
        }
        _ => format!("cp:{}", normalize_path(&torrent.content_path)),
    }
}

/// Data identities already counted once.
#[derive(Debug, Default)]
pub struct CountedData {
    identities: HashSet<String>,
}

impl CountedData {
    /// Count `torrent` together with the verified `siblings` sharing its
    /// data. Returns `false` when any of them was already counted; the
    /// whole set is marked either way.
    pub fn insert<'a>(
        &mut self,
        torrent: &Torrent,
        siblings: impl IntoIterator<Item = &'a Torrent>,
    ) -> bool {
        let mut set: HashSet<String> = siblings.into_iter().map(dedup_identity).collect();
        set.insert(dedup_identity(torrent));
        let fresh = set.is_disjoint(&self.identities);
        self.identities.extend(set);
        fresh
    }
}

#[derive(Debug, Default)]
struct SourceState {
    projected: u64,
    counted: CountedData,
}

/// Cumulative would-free accounting for one run.
#[derive(Debug, Default)]
pub struct FreeSpaceProjector {
    mode: ProjectionMode,
    readings: HashMap<FreeSpaceSource, u64>,
    states: HashMap<FreeSpaceKey, SourceState>,
}

impl FreeSpaceProjector {
    pub fn new(mode: ProjectionMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> ProjectionMode {
        self.mode
    }

    /// Store the client's reported free bytes for a source.
    pub fn set_reading(&mut self, source: FreeSpaceSource, bytes: u64) {
        self.readings.insert(source, bytes);
    }

    pub fn reading(&self, source: &FreeSpaceSource) -> Option<u64> {
        self.readings.get(source).copied()
    }

    /// Bytes queued for deletion under `key` so far.
    pub fn projected(&self, key: &FreeSpaceKey) -> u64 {
        self.states.get(key).map_or(0, |s| s.projected)
    }

    /// Value the `free_space` field resolves to. `None` when the source was
    /// never read, which makes free-space leaves fail closed.
    pub fn effective_free_space(&self, key: &FreeSpaceKey) -> Option<u64> {
        let reported = self.reading(&key.source)?;
        Some(match self.mode {
            ProjectionMode::Needed => reported.saturating_add(self.projected(key)),
            ProjectionMode::Eligible => reported,
        })
    }

    /// Count a torrent selected for deletion. Returns `false` when its data
    /// was already counted under this key.
    pub fn record(&mut self, key: &FreeSpaceKey, torrent: &Torrent) -> bool {
        self.record_shared(key, torrent, [])
    }

    /// Count a torrent whose data is shared with verified `siblings`. The
    /// bytes are added once for the whole set.
    #[allow(clippy::cast_sign_loss, clippy::as_conversions)]
    pub fn record_shared<'a>(
        &mut self,
        key: &FreeSpaceKey,
        torrent: &Torrent,
        siblings: impl IntoIterator<Item = &'a Torrent>,
    ) -> bool {
        let state = self.states.entry(key.clone()).or_default();
        if !state.counted.insert(torrent, siblings) {
            tracing::debug!(
                rule = %key.rule,
                hash = %torrent.hash,
                "free-space contribution already counted"
            );
            return false;
        }
        state.projected = state.projected.saturating_add(torrent.size.max(0) as u64);
        true
    }
}
