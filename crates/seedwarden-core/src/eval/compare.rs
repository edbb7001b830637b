// ── Comparison primitives ──
//
// Pure helpers the evaluator dispatches to once a field's value has been
// resolved. None of these fail: anything that cannot be compared is a
// non-match.

use chrono::{DateTime, Utc};

use crate::model::Operator;

/// Comparison target of a numeric leaf: a single value or a bound pair.
#[derive(Debug, Clone, Copy)]
pub struct NumericTarget<'a> {
    pub value: &'a str,
    pub min: Option<&'a str>,
    pub max: Option<&'a str>,
}

impl<'a> NumericTarget<'a> {
    pub fn value(value: &'a str) -> Self {
        Self {
            value,
            min: None,
            max: None,
        }
    }

    pub fn range(min: &'a str, max: &'a str) -> Self {
        Self {
            value: "",
            min: Some(min),
            max: Some(max),
        }
    }
}

/// Parse a comparison value. Blank parses as zero; anything else that is
/// not a number is rejected.
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_bound(raw: Option<&str>) -> Option<f64> {
    let raw = raw?;
    if raw.trim().is_empty() {
        return None;
    }
    parse_number(raw)
}

/// Case-insensitive string comparison.
pub fn compare_string(actual: &str, op: Operator, expected: &str) -> bool {
    let actual = actual.to_lowercase();
    let expected = expected.to_lowercase();
    match op {
        Operator::Equal => actual == expected,
        Operator::NotEqual => actual != expected,
        Operator::Contains => actual.contains(&expected),
        Operator::NotContains => !actual.contains(&expected),
        Operator::StartsWith => actual.starts_with(&expected),
        Operator::EndsWith => actual.ends_with(&expected),
        _ => false,
    }
}

/// String operators applied per element of a comma-separated set.
///
/// Positive operators match when any element matches; negative operators
/// match when no element matches the positive form.
pub fn compare_multi(raw: &str, op: Operator, expected: &str) -> bool {
    let mut elements = raw.split(',').map(str::trim).filter(|e| !e.is_empty());
    match op {
        Operator::Equal | Operator::Contains | Operator::StartsWith | Operator::EndsWith => {
            elements.any(|e| compare_string(e, op, expected))
        }
        Operator::NotEqual => !elements.any(|e| compare_string(e, Operator::Equal, expected)),
        Operator::NotContains => {
            !elements.any(|e| compare_string(e, Operator::Contains, expected))
        }
        _ => false,
    }
}

/// Regex outcome for a leaf. Negative string operators invert the match.
pub fn regex_outcome(is_match: bool, op: Operator) -> bool {
    match op {
        Operator::NotEqual | Operator::NotContains => !is_match,
        _ => is_match,
    }
}

/// Numeric comparison. `Between` is inclusive at both ends and needs both
/// bounds.
pub fn compare_numeric(actual: f64, op: Operator, target: NumericTarget<'_>) -> bool {
    if op == Operator::Between {
        let (Some(min), Some(max)) = (parse_bound(target.min), parse_bound(target.max)) else {
            return false;
        };
        return actual >= min && actual <= max;
    }

    let Some(expected) = parse_number(target.value) else {
        return false;
    };

    match op {
        Operator::Equal => (actual - expected).abs() < f64::EPSILON,
        Operator::NotEqual => (actual - expected).abs() >= f64::EPSILON,
        Operator::GreaterThan => actual > expected,
        Operator::GreaterThanOrEqual => actual >= expected,
        Operator::LessThan => actual < expected,
        Operator::LessThanOrEqual => actual <= expected,
        _ => false,
    }
}

/// Compare `(count / total) * 100` against a 0–100 target.
#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
pub fn compare_percent(count: i64, total: i64, op: Operator, target: NumericTarget<'_>) -> bool {
    if total <= 0 {
        return false;
    }
    let pct = (count as f64 / total as f64) * 100.0;
    compare_numeric(pct, op, target)
}

/// Seconds since `timestamp`, clamped at zero. `None` when the timestamp
/// was never set.
pub fn age_seconds(now: DateTime<Utc>, timestamp: i64) -> Option<i64> {
    if timestamp <= 0 {
        return None;
    }
    Some((now.timestamp() - timestamp).max(0))
}

/// `"true"` and `"1"` are true; everything else is false.
pub fn parse_bool(raw: &str) -> bool {
    let raw = raw.trim();
    raw.eq_ignore_ascii_case("true") || raw == "1"
}

pub fn compare_bool(actual: bool, op: Operator, expected: &str) -> bool {
    let expected = parse_bool(expected);
    match op {
        Operator::Equal => actual == expected,
        Operator::NotEqual => actual != expected,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn string_ops_ignore_case() {
        assert!(compare_string("Movies", Operator::Equal, "movies"));
        assert!(compare_string("Linux.ISO.2024", Operator::Contains, "iso"));
        assert!(compare_string("Linux.ISO", Operator::StartsWith, "LINUX"));
        assert!(compare_string("Linux.ISO", Operator::EndsWith, ".iso"));
        assert!(compare_string("tv", Operator::NotEqual, "movies"));
        assert!(!compare_string("tv", Operator::NotContains, "T"));
        assert!(!compare_string("10", Operator::GreaterThan, "5"));
    }

    #[test]
    fn multi_ops_apply_per_element() {
        let tags = "keep, cross-seed ,HD";
        assert!(compare_multi(tags, Operator::Equal, "hd"));
        assert!(!compare_multi(tags, Operator::Equal, "keep, cross-seed"));
        assert!(compare_multi(tags, Operator::Contains, "cross"));
        assert!(compare_multi(tags, Operator::StartsWith, "cro"));
        assert!(compare_multi(tags, Operator::NotEqual, "movies"));
        assert!(!compare_multi(tags, Operator::NotEqual, "KEEP"));
        assert!(!compare_multi(tags, Operator::NotContains, "seed"));
        assert!(compare_multi("", Operator::NotContains, "seed"));
        assert!(!compare_multi("", Operator::Equal, ""));
    }

    #[test]
    fn numeric_comparisons() {
        let t = NumericTarget::value("2.0");
        assert!(compare_numeric(2.5, Operator::GreaterThan, t));
        assert!(compare_numeric(2.0, Operator::GreaterThanOrEqual, t));
        assert!(compare_numeric(2.0, Operator::Equal, t));
        assert!(compare_numeric(1.0, Operator::LessThan, t));
        assert!(compare_numeric(2.0, Operator::LessThanOrEqual, t));
        assert!(compare_numeric(3.0, Operator::NotEqual, t));
    }

    #[test]
    fn non_numeric_value_never_matches() {
        let t = NumericTarget::value("lots");
        assert!(!compare_numeric(1.0, Operator::GreaterThan, t));
        assert!(!compare_numeric(1.0, Operator::NotEqual, t));
    }

    #[test]
    fn empty_value_parses_as_zero() {
        assert!(compare_numeric(0.0, Operator::Equal, NumericTarget::value("")));
        assert!(compare_numeric(1.0, Operator::GreaterThan, NumericTarget::value("  ")));
    }

    #[test]
    fn between_is_inclusive_and_needs_both_bounds() {
        let range = NumericTarget::range("1", "3");
        assert!(compare_numeric(1.0, Operator::Between, range));
        assert!(compare_numeric(3.0, Operator::Between, range));
        assert!(!compare_numeric(3.01, Operator::Between, range));

        let open = NumericTarget {
            value: "",
            min: Some("1"),
            max: None,
        };
        assert!(!compare_numeric(2.0, Operator::Between, open));
        let blank = NumericTarget::range("", "3");
        assert!(!compare_numeric(2.0, Operator::Between, blank));
    }

    #[test]
    fn percent_comparison() {
        assert!(compare_percent(3, 4, Operator::GreaterThanOrEqual, NumericTarget::value("75")));
        assert!(!compare_percent(3, 4, Operator::GreaterThan, NumericTarget::value("75")));
        assert!(!compare_percent(0, 0, Operator::GreaterThanOrEqual, NumericTarget::value("0")));
        assert!(!compare_percent(0, 0, Operator::LessThan, NumericTarget::value("100")));
    }

    #[test]
    fn age_clamps_and_ignores_unset() {
        let now = Utc.timestamp_opt(1_000, 0).unwrap();
        assert_eq!(age_seconds(now, 400), Some(600));
        assert_eq!(age_seconds(now, 5_000), Some(0));
        assert_eq!(age_seconds(now, 0), None);
        assert_eq!(age_seconds(now, -1), None);
    }

    #[test]
    fn bool_parsing() {
        assert!(parse_bool("true"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("1"));
        assert!(!parse_bool("yes"));
        assert!(compare_bool(false, Operator::Equal, "0"));
        assert!(compare_bool(true, Operator::NotEqual, "false"));
        assert!(!compare_bool(true, Operator::Contains, "true"));
    }

    #[test]
    fn regex_outcome_inverts_negative_ops() {
        assert!(regex_outcome(true, Operator::Matches));
        assert!(!regex_outcome(true, Operator::NotContains));
        assert!(regex_outcome(false, Operator::NotEqual));
    }
}
