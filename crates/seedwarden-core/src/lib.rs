//! Rule evaluation and reconciliation engine for torrent collections.
//!
//! Hosts plug in a torrent client, stores and side channels through the
//! traits in [`client`]; the engine turns an ordered list of rules into a
//! minimal set of batched client calls:
//!
//! - **[`eval`]**: Recursive condition evaluator over a per-run
//!   [`EvalContext`] (tracker domains, category lookups, cross-seed
//!   siblings, projected free space). Never errors: bad input fails closed.
//!
//! - **[`grouping`]**: Equivalence indices (cross-seed, hardlink, release)
//!   with ambiguity detection and file-overlap verification.
//!
//! - **[`freespace`]**: Cumulative "would free" projection so a free-space
//!   rule stops once its target is met, counting shared data once.
//!
//! - **[`Engine`]**: Loads, evaluates, diffs, batches, applies and records
//!   one collection's run. [`Engine::preview`] shares every step up to
//!   applying.
//!
//! - **[`Scheduler`]**: Periodic passes over all active collections plus
//!   manual runs and maintenance.

pub mod bookkeeping;
pub mod client;
pub mod config;
pub mod error;
pub mod eval;
pub mod freespace;
pub mod grouping;
pub mod model;
pub mod preview;
pub mod programs;
pub mod reconcile;
pub mod scheduler;

// ── Primary re-exports ──────────────────────────────────────────────
pub use client::{
    AuditStore, BulkAction, ClientError, ClientProvider, DisplayNameStore, NotificationSink,
    ProgramJob, ProgramRunner, RuleStore, StoreError, TorrentClient,
};
pub use config::EngineConfig;
pub use error::CoreError;
pub use eval::EvalContext;
pub use freespace::{FreeSpaceProjector, ProjectionMode};
pub use grouping::{ExpansionError, GroupIndex};
pub use preview::{Preview, PreviewMode, PreviewRequest};
pub use reconcile::{
    ActionCount, Batch, BatchParams, Engine, EngineBuilder, RunNotification, RunOptions,
    RunSummary,
};
pub use scheduler::{PassReport, Scheduler};

// ── Model re-exports ────────────────────────────────────────────────
pub use model::{
    ActionKind, ActivityDetail, ActivityRecord, CollectionId, ConditionNode, DeleteMode, Field,
    GroupDefinition, Operator, Outcome, Rule, RuleId, Torrent, TorrentFile, TorrentHash,
    TorrentState,
};
