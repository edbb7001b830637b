// ── Runtime engine configuration ──
//
// Tunables for the reconciliation engine and scheduler. The core never
// reads config files; hosts (or `seedwarden-config`) build an
// `EngineConfig` and hand it in.

use std::time::Duration;

/// Configuration shared by the engine and the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// How often the scheduler runs a full pass over all collections.
    pub poll_interval: Duration,
    /// Torrents acted on within this window are skipped.
    pub skip_window: Duration,
    /// Maximum number of torrents per external call.
    pub max_batch_size: usize,
    /// Upper bound on the execution phase of one collection's run.
    pub run_timeout: Duration,
    /// Free-space delete rules pause for this long after a successful
    /// free-space deletion so the client's reading can settle.
    pub free_space_cooldown: Duration,
    /// Default minimum file overlap (percent) for ambiguous-group expansion.
    pub min_overlap_percent: f64,
    /// Maximum number of external programs running at once.
    pub program_concurrency: usize,
    /// Retention of "recently processed" markers.
    pub processed_retention: Duration,
    /// Retention of per-rule last-run stamps.
    pub rule_run_retention: Duration,
    /// Retention of expired free-space cooldown stamps.
    pub cooldown_retention: Duration,
    /// Audit records older than this are pruned.
    pub audit_max_age: Duration,
    /// Audit store is trimmed to this many records.
    pub audit_max_records: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            skip_window: Duration::from_secs(120),
            max_batch_size: 50,
            run_timeout: Duration::from_secs(300),
            free_space_cooldown: Duration::from_secs(300),
            min_overlap_percent: 90.0,
            program_concurrency: 4,
            processed_retention: Duration::from_secs(600),
            rule_run_retention: Duration::from_secs(86_400),
            cooldown_retention: Duration::from_secs(600),
            audit_max_age: Duration::from_secs(30 * 86_400),
            audit_max_records: 10_000,
        }
    }
}

impl EngineConfig {
    /// Batch size with a floor of one so chunking never panics.
    pub(crate) fn batch_size(&self) -> usize {
        self.max_batch_size.max(1)
    }
}
