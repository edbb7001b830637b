// ── Grouping index ──
//
// Equivalence classes of torrents sharing a group key: torrent -> key,
// key -> members, plus the set of keys whose members cannot be told apart
// by path alone. Expansion from a trigger torrent to its siblings goes
// through `GroupIndex::expand`, which applies the definition's ambiguity
// policy and never returns a partial group.

pub mod key;
pub mod overlap;

use std::collections::{BTreeSet, HashMap, HashSet};

use thiserror::Error;

use crate::model::{AmbiguityPolicy, GroupDefinition, GroupKeyComponent, Torrent, TorrentFile, TorrentHash};

pub use key::{ReleaseMeta, group_key, is_shared_directory, normalize_name, normalized_title};
pub use overlap::{OverlapError, overlap_percent};

/// Why a group could not be expanded. Every variant means "do not act on
/// this group".
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpansionError {
    #[error("group '{group}' is ambiguous and its policy forbids expansion")]
    AmbiguousSkipped { group: String },

    #[error("no file manifest for {hash}")]
    ManifestMissing { hash: TorrentHash },

    #[error("overlap check against {hash} failed: {source}")]
    Overlap {
        hash: TorrentHash,
        #[source]
        source: OverlapError,
    },

    #[error("overlap with {hash} is {percent:.1}%, below the {min:.1}% minimum")]
    BelowThreshold {
        hash: TorrentHash,
        percent: f64,
        min: f64,
    },
}

/// Equivalence index for one group definition over one snapshot.
#[derive(Debug, Clone)]
pub struct GroupIndex {
    definition: GroupDefinition,
    by_torrent: HashMap<TorrentHash, String>,
    members: HashMap<String, BTreeSet<TorrentHash>>,
    ambiguous: HashSet<String>,
}

impl GroupIndex {
    /// Build the index. `domains` maps each torrent to its resolved tracker
    /// domain.
    pub fn build(
        definition: &GroupDefinition,
        torrents: &[Torrent],
        domains: &HashMap<TorrentHash, String>,
    ) -> Self {
        let mut index = Self {
            definition: definition.clone(),
            by_torrent: HashMap::new(),
            members: HashMap::new(),
            ambiguous: HashSet::new(),
        };
        let path_keyed = definition.uses(GroupKeyComponent::ContentPath);

        for torrent in torrents {
            let Some(key) = group_key(definition, torrent, domains) else {
                continue;
            };
            if path_keyed && is_shared_directory(torrent) {
                index.ambiguous.insert(key.clone());
            }
            index
                .members
                .entry(key.clone())
                .or_default()
                .insert(torrent.hash.clone());
            index.by_torrent.insert(torrent.hash.clone(), key);
        }

        tracing::debug!(
            group = %definition.id,
            keys = index.members.len(),
            ambiguous = index.ambiguous.len(),
            "group index built"
        );
        index
    }

    pub fn definition(&self) -> &GroupDefinition {
        &self.definition
    }

    pub fn key_of(&self, hash: &TorrentHash) -> Option<&str> {
        self.by_torrent.get(hash).map(String::as_str)
    }

    /// Every member sharing `hash`'s key, including `hash` itself.
    pub fn members_of(&self, hash: &TorrentHash) -> Vec<TorrentHash> {
        self.key_of(hash)
            .and_then(|k| self.members.get(k))
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Members sharing `hash`'s key, excluding `hash`, without any
    /// ambiguity check.
    pub fn siblings(&self, hash: &TorrentHash) -> Vec<TorrentHash> {
        self.members_of(hash)
            .into_iter()
            .filter(|m| m != hash)
            .collect()
    }

    pub fn is_ambiguous(&self, hash: &TorrentHash) -> bool {
        self.key_of(hash).is_some_and(|k| self.ambiguous.contains(k))
    }

    /// Hashes of every member of an ambiguous key.
    pub fn ambiguous_members(&self) -> BTreeSet<TorrentHash> {
        self.ambiguous
            .iter()
            .filter_map(|k| self.members.get(k))
            .flatten()
            .cloned()
            .collect()
    }

    /// Resolve `trigger`'s siblings, honouring the ambiguity policy.
    ///
    /// Non-ambiguous keys expand unconditionally. Ambiguous keys expand only
    /// under `VerifyOverlap`, and only when every sibling's manifest
    /// overlaps the trigger's by at least the configured minimum; one
    /// failure rejects the whole group.
    pub fn expand(
        &self,
        trigger: &TorrentHash,
        manifests: &HashMap<TorrentHash, Vec<TorrentFile>>,
        default_min_overlap: f64,
    ) -> Result<Vec<TorrentHash>, ExpansionError> {
        let siblings = self.siblings(trigger);
        if siblings.is_empty() || !self.is_ambiguous(trigger) {
            return Ok(siblings);
        }

        if self.definition.ambiguity == AmbiguityPolicy::Skip {
            return Err(ExpansionError::AmbiguousSkipped {
                group: self.definition.id.clone(),
            });
        }

        let min = self
            .definition
            .min_overlap_percent
            .unwrap_or(default_min_overlap);
        let trigger_files = manifests
            .get(trigger)
            .ok_or_else(|| ExpansionError::ManifestMissing {
                hash: trigger.clone(),
            })?;

        for sibling in &siblings {
            let files = manifests
                .get(sibling)
                .ok_or_else(|| ExpansionError::ManifestMissing {
                    hash: sibling.clone(),
                })?;
            let percent =
                overlap_percent(trigger_files, files).map_err(|source| ExpansionError::Overlap {
                    hash: sibling.clone(),
                    source,
                })?;
            if percent < min {
                return Err(ExpansionError::BelowThreshold {
                    hash: sibling.clone(),
                    percent,
                    min,
                });
            }
        }

        Ok(siblings)
    }
}
