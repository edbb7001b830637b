// ── File overlap ──
//
// Byte-weighted overlap between two file manifests. Files are matched on
// lowercase base name plus size, each file matching at most once.

use std::collections::HashMap;

use thiserror::Error;

use crate::model::TorrentFile;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OverlapError {
    #[error("manifest is empty")]
    EmptyManifest,

    #[error("manifest has zero total size")]
    ZeroSize,
}

fn base_name(path: &str) -> String {
    path.rsplit(['/', '\\'])
        .next()
        .unwrap_or(path)
        .trim()
        .to_lowercase()
}

fn total_bytes(files: &[TorrentFile]) -> Result<i64, OverlapError> {
    if files.is_empty() {
        return Err(OverlapError::EmptyManifest);
    }
    let total: i64 = files.iter().map(|f| f.size.max(0)).sum();
    if total == 0 {
        return Err(OverlapError::ZeroSize);
    }
    Ok(total)
}

/// `shared_bytes / min(total_a, total_b) * 100`.
#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
pub fn overlap_percent(a: &[TorrentFile], b: &[TorrentFile]) -> Result<f64, OverlapError> {
    let total_a = total_bytes(a)?;
    let total_b = total_bytes(b)?;

    let mut remaining: HashMap<(String, i64), usize> = HashMap::new();
    for file in b {
        *remaining.entry((base_name(&file.name), file.size)).or_default() += 1;
    }

    let mut shared: i64 = 0;
    for file in a {
        if let Some(count) = remaining.get_mut(&(base_name(&file.name), file.size)) {
            if *count > 0 {
                *count -= 1;
                shared += file.size.max(0);
            }
        }
    }

    Ok(shared as f64 / total_a.min(total_b) as f64 * 100.0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn file(name: &str, size: i64) -> TorrentFile {
        TorrentFile {
            name: name.into(),
            size,
        }
    }

    #[test]
    fn identical_manifests_fully_overlap() {
        let a = vec![file("Movie/movie.mkv", 900), file("Movie/movie.nfo", 100)];
        let b = vec![file("movie.MKV", 900), file("other/movie.nfo", 100)];
        assert!((overlap_percent(&a, &b).unwrap() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn overlap_is_relative_to_smaller_side() {
        let a = vec![file("movie.mkv", 950), file("extras.mkv", 50)];
        let b = vec![file("movie.mkv", 950)];
        assert!((overlap_percent(&a, &b).unwrap() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn size_mismatch_does_not_match() {
        let a = vec![file("movie.mkv", 950), file("sample.mkv", 50)];
        let b = vec![file("movie.mkv", 951), file("sample.mkv", 50)];
        let pct = overlap_percent(&a, &b).unwrap();
        assert!((pct - 5.0).abs() < 1e-9);
    }

    #[test]
    fn duplicates_match_once_each() {
        let a = vec![file("a.bin", 10), file("b/a.bin", 10)];
        let b = vec![file("a.bin", 10), file("c.bin", 10)];
        assert!((overlap_percent(&a, &b).unwrap() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn empty_or_zero_size_fails() {
        assert_eq!(
            overlap_percent(&[], &[file("a", 1)]),
            Err(OverlapError::EmptyManifest)
        );
        assert_eq!(
            overlap_percent(&[file("a", 0)], &[file("a", 0)]),
            Err(OverlapError::ZeroSize)
        );
    }
}
