// ── Group key components ──
//
// Extracts the individual components a group key is assembled from.
// Release titles are parsed with a handful of cached patterns; anything
// not recognised simply yields an empty component, which excludes the
// torrent from groups that need it.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::model::{GroupDefinition, GroupKeyComponent, Torrent, TorrentHash};

const KEY_SEPARATOR: char = '\u{1f}';

#[allow(clippy::unwrap_used)]
static RESOLUTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(2160p|1080p|720p|576p|480p|4k)\b").unwrap());

#[allow(clippy::unwrap_used)]
static SOURCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(blu-?ray|remux|web-?dl|web-?rip|web|hdtv|dvdrip|bdrip|hdrip)\b").unwrap()
});

#[allow(clippy::unwrap_used)]
static RELEASE_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-([A-Za-z0-9]+)(?:\.[A-Za-z0-9]{2,4})?$").unwrap());

/// First token that ends the title part of a release name: a year, an
/// episode marker, or a resolution.
#[allow(clippy::unwrap_used)]
static TITLE_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b((?:19|20)\d{2}|s\d{1,2}(?:e\d{1,3})?|2160p|1080p|720p|576p|480p)\b")
        .unwrap()
});

/// Release metadata recovered from a torrent name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseMeta {
    pub resolution: Option<String>,
    pub source: Option<String>,
    pub group: Option<String>,
}

impl ReleaseMeta {
    pub fn parse(name: &str) -> Self {
        let capture = |re: &Regex| {
            re.captures(name)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_lowercase().replace('-', ""))
        };
        Self {
            resolution: capture(&RESOLUTION),
            source: capture(&SOURCE),
            group: capture(&RELEASE_GROUP),
        }
    }

    /// Stable `resolution|source|group` form; empty when nothing was found.
    pub fn key(&self) -> String {
        if self.resolution.is_none() && self.source.is_none() && self.group.is_none() {
            return String::new();
        }
        [&self.resolution, &self.source, &self.group]
            .iter()
            .map(|part| part.as_deref().unwrap_or("-"))
            .collect::<Vec<_>>()
            .join("|")
    }
}

/// Lowercase, separators to spaces, whitespace collapsed.
pub fn normalize_name(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '.' | '_' | '-' => ' ',
            other => other,
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// The title part of a release name, normalized.
pub fn normalized_title(name: &str) -> String {
    let title = TITLE_END
        .find(name)
        .map_or(name, |m| name.get(..m.start()).unwrap_or(name));
    normalize_name(title)
}

/// Path form used for grouping and equality checks.
pub fn normalize_path(path: &str) -> String {
    path.trim()
        .replace('\\', "/")
        .trim_end_matches('/')
        .to_lowercase()
}

/// Whether path identity cannot tell this torrent apart from others in the
/// same download directory.
pub fn is_shared_directory(torrent: &Torrent) -> bool {
    let content = normalize_path(&torrent.content_path);
    !content.is_empty() && content == normalize_path(&torrent.save_path)
}

fn component(
    component: GroupKeyComponent,
    torrent: &Torrent,
    domains: &HashMap<TorrentHash, String>,
) -> String {
    match component {
        GroupKeyComponent::ContentPath => normalize_path(&torrent.content_path),
        GroupKeyComponent::SavePath => normalize_path(&torrent.save_path),
        GroupKeyComponent::NormalizedTitle => normalized_title(&torrent.name),
        GroupKeyComponent::TrackerDomain => {
            domains.get(&torrent.hash).cloned().unwrap_or_default()
        }
        GroupKeyComponent::ReleaseMeta => ReleaseMeta::parse(&torrent.name).key(),
        GroupKeyComponent::HardlinkSignature => torrent
            .hardlink_signature
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_owned(),
    }
}

/// Assemble a torrent's key for `definition`. `None` when any component is
/// empty.
pub fn group_key(
    definition: &GroupDefinition,
    torrent: &Torrent,
    domains: &HashMap<TorrentHash, String>,
) -> Option<String> {
    if definition.components.is_empty() {
        return None;
    }
    let mut key = String::new();
    for (i, c) in definition.components.iter().enumerate() {
        let part = component(*c, torrent, domains);
        if part.is_empty() {
            return None;
        }
        if i > 0 {
            key.push(KEY_SEPARATOR);
        }
        key.push_str(&part);
    }
    Some(key)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn release_meta_parses_common_names() {
        let meta = ReleaseMeta::parse("Some.Movie.2021.1080p.BluRay.x264-GRP.mkv");
        assert_eq!(meta.resolution.as_deref(), Some("1080p"));
        assert_eq!(meta.source.as_deref(), Some("bluray"));
        assert_eq!(meta.group.as_deref(), Some("grp"));
        assert_eq!(meta.key(), "1080p|bluray|grp");
    }

    #[test]
    fn release_meta_handles_web_dl() {
        let meta = ReleaseMeta::parse("Show.S01E02.720p.WEB-DL.DDP5.1-TEAM");
        assert_eq!(meta.source.as_deref(), Some("webdl"));
        assert_eq!(meta.group.as_deref(), Some("team"));
    }

    #[test]
    fn release_meta_empty_for_plain_names() {
        assert_eq!(ReleaseMeta::parse("holiday photos").key(), "");
    }

    #[test]
    fn title_stops_at_year_or_episode() {
        assert_eq!(
            normalized_title("Some.Movie.2021.1080p.BluRay-GRP"),
            "some movie"
        );
        assert_eq!(normalized_title("The_Show-S02E05.720p"), "the show");
        assert_eq!(normalized_title("ubuntu-24.04-desktop"), "ubuntu 24 04 desktop");
    }

    #[test]
    fn normalize_name_collapses_separators() {
        assert_eq!(normalize_name("A..B__C - D"), "a b c d");
    }

    #[test]
    fn key_requires_every_component() {
        let def = GroupDefinition {
            id: "t".into(),
            components: vec![GroupKeyComponent::ContentPath, GroupKeyComponent::TrackerDomain],
            ambiguity: crate::model::AmbiguityPolicy::Skip,
            min_overlap_percent: None,
        };
        let t = Torrent {
            hash: "a".into(),
            content_path: "/data/x".into(),
            ..Torrent::default()
        };
        let mut domains = HashMap::new();
        assert_eq!(group_key(&def, &t, &domains), None);

        domains.insert(t.hash.clone(), "tracker.org".into());
        assert_eq!(
            group_key(&def, &t, &domains).unwrap(),
            format!("/data/x{KEY_SEPARATOR}tracker.org")
        );
    }

    #[test]
    fn shared_directory_detection() {
        let t = Torrent {
            content_path: "/downloads/".into(),
            save_path: "/Downloads".into(),
            ..Torrent::default()
        };
        assert!(is_shared_directory(&t));

        let t = Torrent {
            content_path: "/downloads/movie".into(),
            save_path: "/downloads".into(),
            ..Torrent::default()
        };
        assert!(!is_shared_directory(&t));
    }
}
