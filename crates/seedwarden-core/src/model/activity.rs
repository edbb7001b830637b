// ── Audit / activity records ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use uuid::Uuid;

use super::identity::{CollectionId, RuleId, TorrentHash};

/// Kind of mutation an action performs. Also the batching discriminant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, AsRefStr, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActionKind {
    UploadLimit,
    DownloadLimit,
    ShareLimits,
    Pause,
    Resume,
    Recheck,
    Reannounce,
    AddTags,
    RemoveTags,
    Category,
    Move,
    Delete,
    Program,
    /// Synthetic record for a forced dry-run that matched nothing.
    NoMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Outcome {
    Success,
    Failed,
    DryRun,
}

/// Append-only outcome of one batch (or one synthetic event).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub collection: CollectionId,
    /// Run this record belongs to.
    pub run_id: Uuid,
    pub outcome: Outcome,
    pub action: ActionKind,
    pub rule_id: Option<RuleId>,
    pub rule_name: Option<String>,
    pub reason: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// One affected torrent attached to an activity record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityDetail {
    pub hash: TorrentHash,
    pub name: String,
    pub reason: String,
}
