// ── Torrent domain types ──
//
// A `Torrent` is an immutable snapshot of one client entry for the
// duration of a run. Field names and units follow what the client
// reports: sizes in bytes, speeds in bytes/s, timestamps in unix seconds.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use super::identity::TorrentHash;

/// Lifecycle state as reported by the client, using its wire names.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum TorrentState {
    #[serde(rename = "error")]
    #[strum(serialize = "error")]
    Error,
    #[serde(rename = "missingFiles")]
    #[strum(serialize = "missingFiles")]
    MissingFiles,
    #[serde(rename = "uploading")]
    #[strum(serialize = "uploading")]
    Uploading,
    #[serde(rename = "pausedUP")]
    #[strum(serialize = "pausedUP")]
    PausedUp,
    #[serde(rename = "stoppedUP")]
    #[strum(serialize = "stoppedUP")]
    StoppedUp,
    #[serde(rename = "queuedUP")]
    #[strum(serialize = "queuedUP")]
    QueuedUp,
    #[serde(rename = "stalledUP")]
    #[strum(serialize = "stalledUP")]
    StalledUp,
    #[serde(rename = "checkingUP")]
    #[strum(serialize = "checkingUP")]
    CheckingUp,
    #[serde(rename = "forcedUP")]
    #[strum(serialize = "forcedUP")]
    ForcedUp,
    #[serde(rename = "allocating")]
    #[strum(serialize = "allocating")]
    Allocating,
    #[serde(rename = "downloading")]
    #[strum(serialize = "downloading")]
    Downloading,
    #[serde(rename = "metaDL")]
    #[strum(serialize = "metaDL")]
    MetaDl,
    #[serde(rename = "pausedDL")]
    #[strum(serialize = "pausedDL")]
    PausedDl,
    #[serde(rename = "stoppedDL")]
    #[strum(serialize = "stoppedDL")]
    StoppedDl,
    #[serde(rename = "queuedDL")]
    #[strum(serialize = "queuedDL")]
    QueuedDl,
    #[serde(rename = "stalledDL")]
    #[strum(serialize = "stalledDL")]
    StalledDl,
    #[serde(rename = "checkingDL")]
    #[strum(serialize = "checkingDL")]
    CheckingDl,
    #[serde(rename = "forcedDL")]
    #[strum(serialize = "forcedDL")]
    ForcedDl,
    #[serde(rename = "checkingResumeData")]
    #[strum(serialize = "checkingResumeData")]
    CheckingResumeData,
    #[serde(rename = "moving")]
    #[strum(serialize = "moving")]
    Moving,
    #[default]
    #[serde(rename = "unknown", other)]
    #[strum(serialize = "unknown")]
    Unknown,
}

impl TorrentState {
    /// Parse a client state string, falling back to `Unknown`.
    pub fn from_client(raw: &str) -> Self {
        raw.parse().unwrap_or(Self::Unknown)
    }

    pub fn is_paused(self) -> bool {
        matches!(
            self,
            Self::PausedUp | Self::PausedDl | Self::StoppedUp | Self::StoppedDl
        )
    }

    pub fn is_checking(self) -> bool {
        matches!(
            self,
            Self::CheckingUp | Self::CheckingDl | Self::CheckingResumeData
        )
    }
}

/// Status of the torrent's primary tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerStatus {
    Disabled,
    #[default]
    NotContacted,
    Working,
    Updating,
    NotWorking,
}

/// One entry of a torrent's file manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentFile {
    /// Path relative to the torrent's save path, as reported by the client.
    pub name: String,
    pub size: i64,
}

/// Immutable torrent snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Torrent {
    pub hash: TorrentHash,
    pub name: String,
    pub category: String,
    /// Comma-separated tag list as reported by the client.
    pub tags: String,
    pub save_path: String,
    pub content_path: String,
    /// Primary tracker URL.
    pub tracker: String,
    pub tracker_status: TrackerStatus,
    pub tracker_message: String,
    pub comment: String,
    pub state: TorrentState,
    pub private: bool,

    // Sizes (bytes)
    pub size: i64,
    pub total_size: i64,
    pub downloaded: i64,
    pub uploaded: i64,
    pub amount_left: i64,

    // Share metrics
    pub progress: f64,
    pub ratio: f64,
    pub ratio_limit: f64,
    /// Minutes; negative values mean "global" or "unlimited".
    pub seeding_time_limit: i64,
    pub inactive_seeding_time_limit: i64,
    pub availability: f64,

    // Transfer (bytes/s)
    pub dl_speed: i64,
    pub up_speed: i64,
    pub dl_limit: i64,
    pub up_limit: i64,

    // Swarm
    pub num_seeds: i64,
    pub num_leechs: i64,
    pub num_complete: i64,
    pub num_incomplete: i64,

    // Durations (seconds)
    pub seeding_time: i64,
    pub time_active: i64,

    // Timestamps (unix seconds; 0 or negative = never)
    pub added_on: i64,
    pub completion_on: i64,
    pub last_activity: i64,

    /// Identity derived from the on-disk file identifiers of this torrent's
    /// files. Equal signatures mean hardlinked copies of the same data.
    pub hardlink_signature: Option<String>,
}

impl Torrent {
    /// Individual tags, trimmed, empty entries dropped.
    pub fn tag_list(&self) -> Vec<&str> {
        self.tags
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tag_list().iter().any(|t| *t == tag)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn state_parses_wire_names() {
        assert_eq!(TorrentState::from_client("pausedUP"), TorrentState::PausedUp);
        assert_eq!(TorrentState::from_client("stalleddl"), TorrentState::StalledDl);
        assert_eq!(TorrentState::from_client("bogus"), TorrentState::Unknown);
    }

    #[test]
    fn state_round_trips_through_display() {
        assert_eq!(TorrentState::MissingFiles.to_string(), "missingFiles");
        assert_eq!(TorrentState::ForcedUp.as_ref(), "forcedUP");
    }

    #[test]
    fn state_deserializes_unknown_values() {
        let state: TorrentState = serde_json::from_str("\"somethingNew\"").unwrap();
        assert_eq!(state, TorrentState::Unknown);
    }

    #[test]
    fn state_predicates() {
        assert!(TorrentState::StoppedUp.is_paused());
        assert!(!TorrentState::Uploading.is_paused());
        assert!(TorrentState::CheckingResumeData.is_checking());
    }

    #[test]
    fn tag_list_splits_and_trims() {
        let t = Torrent {
            tags: "movies, hd ,,keep".into(),
            ..Torrent::default()
        };
        assert_eq!(t.tag_list(), vec!["movies", "hd", "keep"]);
        assert!(t.has_tag("hd"));
        assert!(!t.has_tag("HD"));
    }

    #[test]
    fn snapshot_deserializes_with_defaults() {
        let t: Torrent = serde_json::from_str(
            r#"{"hash":"ABC","name":"Movie","state":"uploading","ratio":2.5}"#,
        )
        .unwrap();
        assert_eq!(t.hash.as_str(), "abc");
        assert_eq!(t.state, TorrentState::Uploading);
        assert!((t.ratio - 2.5).abs() < f64::EPSILON);
        assert_eq!(t.size, 0);
        assert!(t.hardlink_signature.is_none());
    }
}
