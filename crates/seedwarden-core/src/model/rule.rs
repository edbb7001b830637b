// ── Rule definitions ──
//
// A rule is an ordered policy: a tracker selector, one optional condition
// per action, custom group definitions and a cadence. Rule order is
// priority order; later rules win ties.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::condition::{ConditionNode, Field};
use super::identity::RuleId;

// ── Group definitions ───────────────────────────────────────────────

/// One component of a group key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKeyComponent {
    ContentPath,
    SavePath,
    NormalizedTitle,
    TrackerDomain,
    ReleaseMeta,
    HardlinkSignature,
}

/// What to do with a group whose key cannot reliably distinguish members.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// Never expand an ambiguous group.
    Skip,
    /// Expand only when every member's file manifest overlaps the trigger's.
    #[default]
    VerifyOverlap,
}

pub const CROSS_SEED_GROUP: &str = "cross_seed";
pub const HARDLINK_GROUP: &str = "hardlink";
pub const RELEASE_GROUP: &str = "release";

/// Named recipe for building an equivalence index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDefinition {
    pub id: String,
    pub components: Vec<GroupKeyComponent>,
    #[serde(default)]
    pub ambiguity: AmbiguityPolicy,
    /// Minimum byte-weighted overlap (percent). Falls back to the engine
    /// default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_overlap_percent: Option<f64>,
}

impl GroupDefinition {
    /// Torrents sharing on-disk content under different client entries.
    pub fn cross_seed() -> Self {
        Self {
            id: CROSS_SEED_GROUP.into(),
            components: vec![GroupKeyComponent::ContentPath],
            ambiguity: AmbiguityPolicy::VerifyOverlap,
            min_overlap_percent: None,
        }
    }

    /// Hardlinked copies of the same files.
    pub fn hardlink() -> Self {
        Self {
            id: HARDLINK_GROUP.into(),
            components: vec![GroupKeyComponent::HardlinkSignature],
            ambiguity: AmbiguityPolicy::Skip,
            min_overlap_percent: None,
        }
    }

    /// Same release seeded from different trackers.
    pub fn release() -> Self {
        Self {
            id: RELEASE_GROUP.into(),
            components: vec![
                GroupKeyComponent::NormalizedTitle,
                GroupKeyComponent::ReleaseMeta,
            ],
            ambiguity: AmbiguityPolicy::VerifyOverlap,
            min_overlap_percent: None,
        }
    }

    pub fn builtin(id: &str) -> Option<Self> {
        match id {
            CROSS_SEED_GROUP => Some(Self::cross_seed()),
            HARDLINK_GROUP => Some(Self::hardlink()),
            RELEASE_GROUP => Some(Self::release()),
            _ => None,
        }
    }

    pub fn uses(&self, component: GroupKeyComponent) -> bool {
        self.components.contains(&component)
    }
}

// ── Actions ─────────────────────────────────────────────────────────

/// Action with nothing but a condition (pause, resume, recheck, reannounce).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimpleAction {
    #[serde(default)]
    pub condition: Option<ConditionNode>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeedLimitAction {
    /// Bytes per second; `-1` or `0` means unlimited.
    #[serde(default)]
    pub upload_limit: Option<i64>,
    #[serde(default)]
    pub download_limit: Option<i64>,
    #[serde(default)]
    pub condition: Option<ConditionNode>,
}

/// Share limits as the client understands them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShareLimits {
    pub ratio_limit: f64,
    /// Minutes.
    pub seeding_time_limit: i64,
    /// Minutes.
    pub inactive_seeding_time_limit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareLimitAction {
    pub limits: ShareLimits,
    #[serde(default)]
    pub condition: Option<ConditionNode>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagMode {
    /// Add to matching torrents, remove from non-matching ones.
    #[default]
    Full,
    Add,
    Remove,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagAction {
    pub tags: Vec<String>,
    #[serde(default)]
    pub mode: TagMode,
    #[serde(default)]
    pub condition: Option<ConditionNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryAction {
    pub category: String,
    #[serde(default)]
    pub include_cross_seeds: bool,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub condition: Option<ConditionNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveAction {
    pub path: String,
    #[serde(default)]
    pub include_cross_seeds: bool,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub condition: Option<ConditionNode>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMode {
    /// Remove the client entry, keep data on disk.
    #[default]
    KeepFiles,
    WithFiles,
    /// Remove with files, widening to every cross-seed sibling.
    WithFilesIncludeCrossSeeds,
    /// Remove with files unless cross-seed siblings still need the data.
    WithFilesPreserveCrossSeeds,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteAction {
    #[serde(default)]
    pub mode: DeleteMode,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub condition: Option<ConditionNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramAction {
    pub program_id: i64,
    #[serde(default)]
    pub condition: Option<ConditionNode>,
}

/// Per-action condition trees. An absent action is disabled; an action
/// without a condition applies to every selected torrent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleActions {
    pub speed_limits: Option<SpeedLimitAction>,
    pub share_limits: Option<ShareLimitAction>,
    pub pause: Option<SimpleAction>,
    pub resume: Option<SimpleAction>,
    pub recheck: Option<SimpleAction>,
    pub reannounce: Option<SimpleAction>,
    pub tag: Option<TagAction>,
    pub category: Option<CategoryAction>,
    pub move_to: Option<MoveAction>,
    pub delete: Option<DeleteAction>,
    pub program: Option<ProgramAction>,
}

impl RuleActions {
    /// Every condition tree configured on this rule.
    pub fn conditions(&self) -> impl Iterator<Item = &ConditionNode> {
        [
            self.speed_limits.as_ref().and_then(|a| a.condition.as_ref()),
            self.share_limits.as_ref().and_then(|a| a.condition.as_ref()),
            self.pause.as_ref().and_then(|a| a.condition.as_ref()),
            self.resume.as_ref().and_then(|a| a.condition.as_ref()),
            self.recheck.as_ref().and_then(|a| a.condition.as_ref()),
            self.reannounce.as_ref().and_then(|a| a.condition.as_ref()),
            self.tag.as_ref().and_then(|a| a.condition.as_ref()),
            self.category.as_ref().and_then(|a| a.condition.as_ref()),
            self.move_to.as_ref().and_then(|a| a.condition.as_ref()),
            self.delete.as_ref().and_then(|a| a.condition.as_ref()),
            self.program.as_ref().and_then(|a| a.condition.as_ref()),
        ]
        .into_iter()
        .flatten()
    }
}

// ── Rule ────────────────────────────────────────────────────────────

/// Where free-space readings for a rule come from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreeSpaceSource {
    /// The client's default save location.
    #[default]
    ClientDefault,
    /// A specific directory on the client host.
    Path(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// `*` or empty for every tracker, otherwise comma/newline separated
    /// domain globs.
    #[serde(default)]
    pub tracker_pattern: String,
    #[serde(default)]
    pub actions: RuleActions,
    #[serde(default)]
    pub groups: Vec<GroupDefinition>,
    #[serde(default)]
    pub free_space_source: FreeSpaceSource,
    #[serde(default)]
    pub dry_run: bool,
    /// Minimum time between firings; `None` fires every cycle.
    #[serde(default, with = "opt_secs", skip_serializing_if = "Option::is_none")]
    pub interval: Option<Duration>,
}

fn default_enabled() -> bool {
    true
}

impl Rule {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id: RuleId(id),
            name: name.into(),
            enabled: true,
            tracker_pattern: String::new(),
            actions: RuleActions::default(),
            groups: Vec::new(),
            free_space_source: FreeSpaceSource::default(),
            dry_run: false,
            interval: None,
        }
    }

    /// Resolve a group id against this rule's custom definitions first,
    /// then the built-ins.
    pub fn group_definition(&self, id: &str) -> Option<GroupDefinition> {
        self.groups
            .iter()
            .find(|g| g.id == id)
            .cloned()
            .or_else(|| GroupDefinition::builtin(id))
    }

    /// Whether any action condition references `field`.
    pub fn references(&self, field: Field) -> bool {
        self.actions.conditions().any(|c| c.references(field))
    }

    /// Whether the delete action is driven by free-space readings.
    pub fn deletes_on_free_space(&self) -> bool {
        self.actions
            .delete
            .as_ref()
            .and_then(|d| d.condition.as_ref())
            .is_some_and(|c| c.references(Field::FreeSpace))
    }
}

mod opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rule_deserializes_with_defaults() {
        let rule: Rule = serde_json::from_value(json!({
            "id": 4,
            "name": "cleanup",
            "interval": 3600,
            "actions": {
                "delete": {
                    "mode": "with_files_include_cross_seeds",
                    "condition": {
                        "type": "leaf", "field": "free_space",
                        "operator": "less_than", "value": "1000"
                    }
                }
            }
        }))
        .unwrap();

        assert!(rule.enabled);
        assert!(!rule.dry_run);
        assert_eq!(rule.interval, Some(Duration::from_secs(3600)));
        assert_eq!(rule.free_space_source, FreeSpaceSource::ClientDefault);
        assert!(rule.deletes_on_free_space());
        assert_eq!(
            rule.actions.delete.as_ref().unwrap().mode,
            DeleteMode::WithFilesIncludeCrossSeeds
        );
    }

    #[test]
    fn zero_interval_means_every_cycle() {
        let rule: Rule =
            serde_json::from_value(json!({ "id": 1, "name": "r", "interval": 0 })).unwrap();
        assert!(rule.interval.is_none());
    }

    #[test]
    fn group_lookup_prefers_custom_definitions() {
        let mut rule = Rule::new(1, "r");
        rule.groups.push(GroupDefinition {
            id: CROSS_SEED_GROUP.into(),
            components: vec![GroupKeyComponent::SavePath],
            ambiguity: AmbiguityPolicy::Skip,
            min_overlap_percent: Some(50.0),
        });

        let custom = rule.group_definition(CROSS_SEED_GROUP).unwrap();
        assert_eq!(custom.components, vec![GroupKeyComponent::SavePath]);
        assert_eq!(
            rule.group_definition(HARDLINK_GROUP).unwrap(),
            GroupDefinition::hardlink()
        );
        assert!(rule.group_definition("nope").is_none());
    }

    #[test]
    fn conditions_iterates_configured_actions() {
        let mut rule = Rule::new(1, "r");
        rule.actions.pause = Some(SimpleAction {
            condition: Some(ConditionNode::leaf(
                Field::Ratio,
                super::super::condition::Operator::GreaterThan,
                "1",
            )),
        });
        rule.actions.resume = Some(SimpleAction::default());
        assert_eq!(rule.actions.conditions().count(), 1);
        assert!(rule.references(Field::Ratio));
        assert!(!rule.deletes_on_free_space());
    }
}
