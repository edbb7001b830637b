// ── Tracker selector ──
//
// A rule's tracker pattern: `*` or empty selects everything, otherwise a
// comma/newline separated list of globs matched case-insensitively against
// the tracker domain or its display name.

use regex::{Regex, RegexBuilder};

#[derive(Debug, Clone)]
pub enum TrackerSelector {
    All,
    Globs(Vec<Regex>),
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() + 8);
    out.push('^');
    for c in glob.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    out.push('$');
    out
}

impl TrackerSelector {
    pub fn parse(pattern: &str) -> Self {
        let globs: Vec<&str> = pattern
            .split([',', '\n'])
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .collect();
        if globs.is_empty() || globs.contains(&"*") {
            return Self::All;
        }

        let compiled = globs
            .iter()
            .filter_map(|g| {
                RegexBuilder::new(&glob_to_regex(g))
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| tracing::warn!(glob = %g, error = %e, "invalid tracker glob"))
                    .ok()
            })
            .collect();
        Self::Globs(compiled)
    }

    pub fn matches(&self, domain: &str, display_name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Globs(globs) => globs
                .iter()
                .any(|g| g.is_match(domain) || (!display_name.is_empty() && g.is_match(display_name))),
        }
    }
}
