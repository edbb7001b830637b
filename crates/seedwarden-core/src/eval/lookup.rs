// ── Cross-category lookups ──
//
// Backs the `exists_in` and `contains_in` operators: does a torrent with
// the same (or a similar) name live in another category?

use std::collections::HashMap;

use crate::grouping::normalize_name;
use crate::model::{Torrent, TorrentHash};

/// Both sides of a `contains_in` comparison must be at least this long
/// after normalization.
pub const MIN_CONTAINS_LEN: usize = 10;

#[derive(Debug, Clone)]
struct Entry {
    hash: TorrentHash,
    name: String,
    normalized: String,
}

/// Category -> torrent names, keyed case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct CategoryIndex {
    by_category: HashMap<String, Vec<Entry>>,
}

impl CategoryIndex {
    pub fn build(torrents: &[Torrent]) -> Self {
        let mut by_category: HashMap<String, Vec<Entry>> = HashMap::new();
        for t in torrents {
            if t.category.trim().is_empty() {
                continue;
            }
            by_category
                .entry(t.category.trim().to_lowercase())
                .or_default()
                .push(Entry {
                    hash: t.hash.clone(),
                    name: t.name.to_lowercase(),
                    normalized: normalize_name(&t.name),
                });
        }
        Self { by_category }
    }

    fn others<'a>(
        &'a self,
        category: &str,
        torrent: &'a Torrent,
    ) -> impl Iterator<Item = &'a Entry> + 'a {
        self.by_category
            .get(&category.trim().to_lowercase())
            .into_iter()
            .flatten()
            .filter(move |e| e.hash != torrent.hash)
    }

    /// Another torrent in `category` has exactly this name, ignoring case.
    pub fn exists_in(&self, category: &str, torrent: &Torrent) -> bool {
        let name = torrent.name.to_lowercase();
        self.others(category, torrent).any(|e| e.name == name)
    }

    /// Another torrent in `category` has a name containing, or contained
    /// in, this one after normalization.
    pub fn contains_in(&self, category: &str, torrent: &Torrent) -> bool {
        let needle = normalize_name(&torrent.name);
        if needle.chars().count() < MIN_CONTAINS_LEN {
            return false;
        }
        self.others(category, torrent).any(|e| {
            e.normalized.chars().count() >= MIN_CONTAINS_LEN
                && (e.normalized.contains(&needle) || needle.contains(&e.normalized))
        })
    }
}
