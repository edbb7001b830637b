// ── Domain model ──
//
// Canonical types shared by the evaluator, grouping, projection and
// reconciliation layers.

pub mod activity;
pub mod condition;
pub mod identity;
pub mod rule;
pub mod torrent;

pub use activity::{ActionKind, ActivityDetail, ActivityRecord, Outcome};
pub use condition::{
    ConditionGroup, ConditionLeaf, ConditionNode, Field, FieldKind, GroupOp, MAX_CONDITION_DEPTH,
    Operator,
};
pub use identity::{CollectionId, RuleId, TorrentHash};
pub use rule::{
    AmbiguityPolicy, CategoryAction, DeleteAction, DeleteMode, FreeSpaceSource, GroupDefinition,
    GroupKeyComponent, MoveAction, ProgramAction, Rule, RuleActions, ShareLimitAction, ShareLimits,
    SimpleAction, SpeedLimitAction, TagAction, TagMode,
};
pub use torrent::{Torrent, TorrentFile, TorrentState, TrackerStatus};
