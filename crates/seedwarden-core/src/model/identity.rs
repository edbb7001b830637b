// ── Core identity types ──
//
// TorrentHash, RuleId and CollectionId are the keys every other type
// hangs off. Hashes are normalized so lookups never depend on the casing
// the client happened to report.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ── TorrentHash ─────────────────────────────────────────────────────

/// Content hash identifying a torrent, normalized to lowercase hex.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TorrentHash(String);

impl TorrentHash {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TorrentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TorrentHash {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<String> for TorrentHash {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for TorrentHash {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<TorrentHash> for String {
    fn from(h: TorrentHash) -> Self {
        h.0
    }
}

// ── RuleId ──────────────────────────────────────────────────────────

/// Identifier assigned to a rule by the rule store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub i64);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── CollectionId ────────────────────────────────────────────────────

/// Identifier of one external client instance and the torrents it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(pub i64);

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn torrent_hash_normalizes_case() {
        let hash = TorrentHash::new("ABCDEF0123");
        assert_eq!(hash.as_str(), "abcdef0123");
    }

    #[test]
    fn torrent_hash_trims_whitespace() {
        let hash: TorrentHash = "  AbC \n".parse().unwrap();
        assert_eq!(hash.to_string(), "abc");
    }

    #[test]
    fn torrent_hash_deserializes_normalized() {
        let hash: TorrentHash = serde_json::from_str("\"DEADBEEF\"").unwrap();
        assert_eq!(hash, TorrentHash::new("deadbeef"));
    }

    #[test]
    fn ids_serialize_transparently() {
        assert_eq!(serde_json::to_string(&RuleId(7)).unwrap(), "7");
        assert_eq!(serde_json::to_string(&CollectionId(3)).unwrap(), "3");
    }
}
