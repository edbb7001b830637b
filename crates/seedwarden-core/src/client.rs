// ── External collaborators ──
//
// The engine never talks to a torrent client, database, or notifier
// directly. Hosts implement these traits; the engine only sees trait
// objects so per-collection runs can share nothing but `Arc`s.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{
    ActivityDetail, ActivityRecord, CollectionId, FreeSpaceSource, Rule, RuleId, ShareLimits,
    Torrent, TorrentFile, TorrentHash,
};
use crate::reconcile::RunNotification;

// ── Errors ──────────────────────────────────────────────────────────

/// Failure reported by a torrent client implementation.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Connection refused, DNS failure, broken pipe, etc.
    #[error("Client transport error: {message}")]
    Transport { message: String },

    /// The client answered but refused the request.
    #[error("Client rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Client request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Requested data does not exist (e.g. file manifest for a removed torrent).
    #[error("Missing data: {message}")]
    MissingData { message: String },

    /// No client is registered for the collection.
    #[error("Unknown collection {0}")]
    UnknownCollection(CollectionId),
}

impl ClientError {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } => true,
            Self::Rejected { status, .. } => *status == 429 || *status >= 500,
            Self::MissingData { .. } | Self::UnknownCollection(_) => false,
        }
    }
}

/// Failure reported by a rule, audit, or display-name store.
#[derive(Debug, Clone, Error)]
#[error("Store error: {message}")]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ── Torrent client ──────────────────────────────────────────────────

/// Bulk lifecycle action applied to a set of torrents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    Pause,
    Resume,
    Recheck,
    Reannounce,
    Delete { delete_files: bool },
}

/// One remote client instance (a collection).
#[async_trait]
pub trait TorrentClient: Send + Sync {
    /// Enumerate every torrent in the collection.
    async fn list_torrents(&self) -> Result<Vec<Torrent>, ClientError>;

    /// Batch-fetch file manifests. Torrents the client no longer knows are
    /// simply absent from the result.
    async fn file_manifests(
        &self,
        hashes: &[TorrentHash],
    ) -> Result<HashMap<TorrentHash, Vec<TorrentFile>>, ClientError>;

    async fn set_upload_limit(&self, hashes: &[TorrentHash], limit: i64)
    -> Result<(), ClientError>;

    async fn set_download_limit(
        &self,
        hashes: &[TorrentHash],
        limit: i64,
    ) -> Result<(), ClientError>;

    async fn set_share_limits(
        &self,
        hashes: &[TorrentHash],
        limits: ShareLimits,
    ) -> Result<(), ClientError>;

    async fn bulk_action(&self, hashes: &[TorrentHash], action: BulkAction)
    -> Result<(), ClientError>;

    async fn set_category(&self, hashes: &[TorrentHash], category: &str)
    -> Result<(), ClientError>;

    async fn set_location(&self, hashes: &[TorrentHash], path: &str) -> Result<(), ClientError>;

    async fn add_tags(&self, hashes: &[TorrentHash], tags: &[String]) -> Result<(), ClientError>;

    async fn remove_tags(&self, hashes: &[TorrentHash], tags: &[String])
    -> Result<(), ClientError>;

    /// Free bytes on the disk backing `source`.
    async fn free_space(&self, source: &FreeSpaceSource) -> Result<u64, ClientError>;

    /// Resolve a tracker URL to the domain rules match against.
    fn tracker_domain(&self, tracker_url: &str) -> String {
        domain_from_url(tracker_url)
    }
}

/// Extract the lowercase host part of a tracker URL. Bare hosts pass
/// through unchanged; anything unparseable yields an empty string.
pub fn domain_from_url(url: &str) -> String {
    let rest = url.split_once("://").map_or(url, |(_, r)| r);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
    let host = authority.rsplit('@').next().unwrap_or("");
    let host = if host.starts_with('[') {
        host.split(']').next().map_or("", |h| h.trim_start_matches('['))
    } else {
        host.split(':').next().unwrap_or("")
    };
    host.trim().to_lowercase()
}

/// Resolves collections to client handles.
#[async_trait]
pub trait ClientProvider: Send + Sync {
    /// Collections the scheduler should reconcile on every pass.
    async fn active_collections(&self) -> Result<Vec<CollectionId>, ClientError>;

    async fn client(&self, collection: CollectionId) -> Result<Arc<dyn TorrentClient>, ClientError>;
}

// ── Stores ──────────────────────────────────────────────────────────

#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Enabled rules for a collection, in priority order.
    async fn enabled_rules(&self, collection: CollectionId) -> Result<Vec<Rule>, StoreError>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append a record, returning its id.
    async fn record(&self, record: &ActivityRecord) -> Result<i64, StoreError>;

    /// Associate per-torrent detail rows with a record.
    async fn attach_details(
        &self,
        record_id: i64,
        details: Vec<ActivityDetail>,
    ) -> Result<(), StoreError>;

    /// Drop records older than `older_than`, then trim to `max_records`.
    /// Returns the number removed.
    async fn prune(&self, older_than: DateTime<Utc>, max_records: usize) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait DisplayNameStore: Send + Sync {
    /// Tracker domain -> operator-chosen display name.
    async fn display_names(&self) -> Result<HashMap<String, String>, StoreError>;
}

// ── Side channels ───────────────────────────────────────────────────

/// An external program invocation for one torrent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramJob {
    pub collection: CollectionId,
    pub program_id: i64,
    pub hash: TorrentHash,
    pub name: String,
    pub rule_id: RuleId,
    pub rule_name: String,
}

#[async_trait]
pub trait ProgramRunner: Send + Sync {
    /// Run a program to completion. Implementations log their own outcome.
    async fn run(&self, job: ProgramJob);
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn run_completed(&self, notification: &RunNotification);

    async fn run_failed(&self, collection: CollectionId, error: &str);
}
