// ── Condition evaluator ──
//
// Recursive, depth-bounded interpreter of condition trees over one torrent.
// Evaluation only reads the context and never fails: a leaf that cannot
// be evaluated (bad regex, non-numeric value, missing reading) is `false`.

pub mod compare;
pub mod context;
pub mod lookup;

use std::borrow::Cow;

use crate::model::{
    ConditionGroup, ConditionLeaf, ConditionNode, Field, FieldKind, GroupOp, MAX_CONDITION_DEPTH,
    Operator, Torrent,
};

pub use compare::{NumericTarget, compare_percent};
pub use context::EvalContext;
pub use lookup::CategoryIndex;

/// Evaluate a whole tree against `torrent`.
pub fn matches(node: &ConditionNode, torrent: &Torrent, ctx: &EvalContext) -> bool {
    evaluate(node, torrent, ctx, 0)
}

/// Evaluate an optional action condition. An action without a condition
/// applies to every selected torrent.
pub fn matches_optional(node: Option<&ConditionNode>, torrent: &Torrent, ctx: &EvalContext) -> bool {
    node.is_none_or(|n| matches(n, torrent, ctx))
}

/// Evaluate `node` at `depth`. Anything deeper than
/// [`MAX_CONDITION_DEPTH`] is `false`.
pub fn evaluate(node: &ConditionNode, torrent: &Torrent, ctx: &EvalContext, depth: usize) -> bool {
    if depth > MAX_CONDITION_DEPTH {
        tracing::warn!(hash = %torrent.hash, depth, "condition tree too deep");
        return false;
    }
    match node {
        ConditionNode::Group(group) => evaluate_group(group, torrent, ctx, depth),
        ConditionNode::Leaf(leaf) => evaluate_leaf(leaf, torrent, ctx),
    }
}

fn evaluate_group(group: &ConditionGroup, torrent: &Torrent, ctx: &EvalContext, depth: usize) -> bool {
    // An empty group is a malformed condition, not a vacuous truth.
    if group.children.is_empty() {
        return false;
    }
    let result = match group.op {
        GroupOp::And => group
            .children
            .iter()
            .all(|c| evaluate(c, torrent, ctx, depth + 1)),
        GroupOp::Or => group
            .children
            .iter()
            .any(|c| evaluate(c, torrent, ctx, depth + 1)),
    };
    result != group.negate
}

fn evaluate_leaf(leaf: &ConditionLeaf, torrent: &Torrent, ctx: &EvalContext) -> bool {
    let mut result = compare_leaf(leaf, torrent, ctx);
    if !result && leaf.include_cross_seeds {
        result = ctx
            .cross_seed_siblings(&torrent.hash)
            .into_iter()
            .any(|sibling| compare_leaf(leaf, sibling, ctx));
    }
    result != leaf.negate
}

// ── Field resolution ────────────────────────────────────────────────

enum Value<'a> {
    Text(Cow<'a, str>),
    Set(&'a str),
    Number(f64),
    Ratio { count: i64, total: i64 },
    Timestamp(i64),
    Flag(bool),
    Missing,
}

#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
fn resolve<'a>(field: Field, torrent: &'a Torrent, ctx: &'a EvalContext) -> Value<'a> {
    let int = |v: i64| Value::Number(v as f64);
    match field {
        Field::Name => Value::Text(Cow::Borrowed(&torrent.name)),
        Field::Hash => Value::Text(Cow::Borrowed(torrent.hash.as_str())),
        Field::Category => Value::Text(Cow::Borrowed(&torrent.category)),
        Field::SavePath => Value::Text(Cow::Borrowed(&torrent.save_path)),
        Field::ContentPath => Value::Text(Cow::Borrowed(&torrent.content_path)),
        Field::Tracker => Value::Text(Cow::Borrowed(ctx.tracker_domain(&torrent.hash))),
        Field::TrackerDisplayName => {
            Value::Text(Cow::Borrowed(ctx.tracker_display_name(&torrent.hash)))
        }
        Field::State => Value::Text(Cow::Owned(torrent.state.to_string())),
        Field::Comment => Value::Text(Cow::Borrowed(&torrent.comment)),
        Field::Tags => Value::Set(&torrent.tags),
        Field::Size => int(torrent.size),
        Field::TotalSize => int(torrent.total_size),
        Field::Downloaded => int(torrent.downloaded),
        Field::Uploaded => int(torrent.uploaded),
        Field::AmountLeft => int(torrent.amount_left),
        Field::DlSpeed => int(torrent.dl_speed),
        Field::UpSpeed => int(torrent.up_speed),
        Field::DlLimit => int(torrent.dl_limit),
        Field::UpLimit => int(torrent.up_limit),
        Field::NumSeeds => int(torrent.num_seeds),
        Field::NumLeechs => int(torrent.num_leechs),
        Field::NumComplete => int(torrent.num_complete),
        Field::NumIncomplete => int(torrent.num_incomplete),
        Field::SeedingTime => int(torrent.seeding_time),
        Field::TimeActive => int(torrent.time_active),
        Field::CrossSeedCount => Value::Number(ctx.cross_seed_siblings(&torrent.hash).len() as f64),
        Field::FreeSpace => ctx
            .current_free_space()
            .map_or(Value::Missing, |bytes| Value::Number(bytes as f64)),
        Field::Ratio => Value::Number(torrent.ratio),
        Field::Progress => Value::Number(torrent.progress),
        Field::Availability => Value::Number(torrent.availability),
        Field::RatioLimit => Value::Number(torrent.ratio_limit),
        Field::SwarmSeedPercent => Value::Ratio {
            count: torrent.num_complete,
            total: torrent.num_complete + torrent.num_incomplete,
        },
        Field::ConnectedSeedPercent => Value::Ratio {
            count: torrent.num_seeds,
            total: torrent.num_seeds + torrent.num_leechs,
        },
        Field::AddedAge => Value::Timestamp(torrent.added_on),
        Field::CompletionAge => Value::Timestamp(torrent.completion_on),
        Field::LastActivityAge => Value::Timestamp(torrent.last_activity),
        Field::Private => Value::Flag(torrent.private),
        Field::IsUnregistered => Value::Flag(ctx.is_unregistered(&torrent.hash)),
        Field::TrackerDown => Value::Flag(ctx.is_tracker_down(&torrent.hash)),
        Field::HasCrossSeeds => Value::Flag(!ctx.cross_seed_siblings(&torrent.hash).is_empty()),
    }
}

fn numeric_target(leaf: &ConditionLeaf) -> NumericTarget<'_> {
    NumericTarget {
        value: &leaf.value,
        min: leaf.min.as_deref(),
        max: leaf.max.as_deref(),
    }
}

/// The leaf's comparison for one torrent, before negation.
#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
fn compare_leaf(leaf: &ConditionLeaf, torrent: &Torrent, ctx: &EvalContext) -> bool {
    if matches!(leaf.operator, Operator::ExistsIn | Operator::ContainsIn) {
        if leaf.field != Field::Name {
            return false;
        }
        return if leaf.operator == Operator::ExistsIn {
            ctx.categories().exists_in(&leaf.value, torrent)
        } else {
            ctx.categories().contains_in(&leaf.value, torrent)
        };
    }

    let value = resolve(leaf.field, torrent, ctx);

    if leaf.uses_regex() && matches!(leaf.field.kind(), FieldKind::String | FieldKind::Multi) {
        let Some(pattern) = leaf.pattern() else {
            return false;
        };
        let haystack = match &value {
            Value::Text(s) => s.as_ref(),
            Value::Set(s) => *s,
            _ => return false,
        };
        return compare::regex_outcome(pattern.is_match(haystack), leaf.operator);
    }

    match value {
        Value::Text(actual) => compare::compare_string(&actual, leaf.operator, &leaf.value),
        Value::Set(raw) => compare::compare_multi(raw, leaf.operator, &leaf.value),
        Value::Number(actual) => compare::compare_numeric(actual, leaf.operator, numeric_target(leaf)),
        Value::Ratio { count, total } => {
            compare_percent(count, total, leaf.operator, numeric_target(leaf))
        }
        Value::Timestamp(ts) => compare::age_seconds(ctx.now(), ts).is_some_and(|age| {
            compare::compare_numeric(age as f64, leaf.operator, numeric_target(leaf))
        }),
        Value::Flag(actual) => compare::compare_bool(actual, leaf.operator, &leaf.value),
        Value::Missing => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::client::domain_from_url;
    use crate::freespace::FreeSpaceKey;
    use crate::model::{FreeSpaceSource, RuleId, TorrentState};
    use chrono::{TimeZone, Utc};

    fn movie() -> Torrent {
        Torrent {
            hash: "aa".into(),
            name: "Some.Movie.2021.1080p".into(),
            category: "movies".into(),
            tags: "keep,Cross-Seed".into(),
            ratio: 2.5,
            size: 1000,
            state: TorrentState::StalledUp,
            num_complete: 3,
            num_incomplete: 1,
            added_on: 1_000,
            private: true,
            ..Torrent::default()
        }
    }

    fn ctx(torrents: Vec<Torrent>) -> EvalContext {
        EvalContext::new(torrents, Utc.timestamp_opt(2_000, 0).unwrap(), domain_from_url)
    }

    fn leaf(field: Field, op: Operator, value: &str) -> ConditionNode {
        ConditionNode::leaf(field, op, value)
    }

    fn nested(depth: usize) -> ConditionNode {
        let mut node = leaf(Field::Category, Operator::Equal, "movies");
        for _ in 0..depth {
            node = ConditionNode::and(vec![node]);
        }
        node
    }

    #[test]
    fn category_and_ratio_scenario() {
        let t = movie();
        let c = ctx(vec![t.clone()]);
        let hit = ConditionNode::and(vec![
            leaf(Field::Category, Operator::Equal, "movies"),
            leaf(Field::Ratio, Operator::GreaterThan, "2.0"),
        ]);
        let miss = ConditionNode::and(vec![
            leaf(Field::Category, Operator::Equal, "movies"),
            leaf(Field::Ratio, Operator::GreaterThan, "5.0"),
        ]);
        assert!(matches(&hit, &t, &c));
        assert!(!matches(&miss, &t, &c));
    }

    #[test]
    fn depth_limit_fails_closed() {
        let t = movie();
        let c = ctx(vec![t.clone()]);
        assert!(matches(&nested(MAX_CONDITION_DEPTH), &t, &c));
        assert!(!matches(&nested(MAX_CONDITION_DEPTH + 1), &t, &c));
        assert!(!evaluate(&leaf(Field::Category, Operator::Equal, "movies"), &t, &c, 21));
        // Negation does not rescue an over-deep tree.
        assert!(!evaluate(&nested(0).negated(), &t, &c, 21));
    }

    #[test]
    fn double_negation_is_identity() {
        let t = movie();
        let c = ctx(vec![t.clone()]);
        for cond in [
            leaf(Field::Category, Operator::Equal, "movies"),
            leaf(Field::Ratio, Operator::LessThan, "1"),
        ] {
            let expected = matches(&cond, &t, &c);
            assert_eq!(matches(&cond.clone().negated().negated(), &t, &c), expected);
            let wrapped = ConditionNode::and(vec![cond.clone().negated()]).negated();
            assert_eq!(matches(&wrapped, &t, &c), expected);
        }
    }

    #[test]
    fn empty_group_is_false_even_when_negated() {
        let t = movie();
        let c = ctx(vec![t.clone()]);
        assert!(!matches(&ConditionNode::and(vec![]), &t, &c));
        assert!(!matches(&ConditionNode::or(vec![]), &t, &c));
        assert!(!matches(&ConditionNode::and(vec![]).negated(), &t, &c));
    }

    #[test]
    fn or_short_circuits_on_first_true() {
        let t = movie();
        let c = ctx(vec![t.clone()]);
        let cond = ConditionNode::or(vec![
            leaf(Field::Ratio, Operator::GreaterThan, "100"),
            leaf(Field::Name, Operator::Contains, "MOVIE"),
        ]);
        assert!(matches(&cond, &t, &c));
    }

    #[test]
    fn string_fields_ignore_case() {
        let t = movie();
        let c = ctx(vec![t.clone()]);
        assert!(matches(&leaf(Field::Category, Operator::Equal, "MOVIES"), &t, &c));
        assert!(matches(&leaf(Field::Name, Operator::StartsWith, "some.movie"), &t, &c));
        assert!(matches(&leaf(Field::State, Operator::Equal, "stalledup"), &t, &c));
    }

    #[test]
    fn tags_match_per_element_and_regex_on_raw() {
        let t = movie();
        let c = ctx(vec![t.clone()]);
        assert!(matches(&leaf(Field::Tags, Operator::Equal, "cross-seed"), &t, &c));
        assert!(!matches(&leaf(Field::Tags, Operator::Equal, "keep,cross-seed"), &t, &c));
        assert!(matches(&leaf(Field::Tags, Operator::Matches, "keep,cross"), &t, &c));
    }

    #[test]
    fn invalid_regex_fails_closed() {
        let t = movie();
        let c = ctx(vec![t.clone()]);
        assert!(!matches(&leaf(Field::Name, Operator::Matches, "(unclosed"), &t, &c));
    }

    #[test]
    fn between_is_inclusive() {
        let t = movie();
        let c = ctx(vec![t.clone()]);
        let at_edge = ConditionNode::Leaf(ConditionLeaf::between(Field::Ratio, "1", "2.5"));
        assert!(matches(&at_edge, &t, &c));
        let above = ConditionNode::Leaf(ConditionLeaf::between(Field::Ratio, "0", "2.4"));
        assert!(!matches(&above, &t, &c));
    }

    #[test]
    fn percent_and_age_fields() {
        let t = movie();
        let c = ctx(vec![t.clone()]);
        assert!(matches(
            &leaf(Field::SwarmSeedPercent, Operator::GreaterThanOrEqual, "75"),
            &t,
            &c
        ));
        assert!(!matches(
            &leaf(Field::ConnectedSeedPercent, Operator::GreaterThanOrEqual, "0"),
            &t,
            &c
        ));
        assert!(matches(&leaf(Field::AddedAge, Operator::Equal, "1000"), &t, &c));
        // Completion time was never set.
        assert!(!matches(&leaf(Field::CompletionAge, Operator::GreaterThanOrEqual, "0"), &t, &c));
    }

    #[test]
    fn future_timestamps_clamp_to_zero_age() {
        let mut t = movie();
        t.added_on = 5_000;
        let c = ctx(vec![t.clone()]);
        assert!(matches(&leaf(Field::AddedAge, Operator::Equal, "0"), &t, &c));
    }

    #[test]
    fn bool_fields() {
        let t = movie();
        let c = ctx(vec![t.clone()]);
        assert!(matches(&leaf(Field::Private, Operator::Equal, "1"), &t, &c));
        assert!(matches(&leaf(Field::IsUnregistered, Operator::Equal, "false"), &t, &c));
    }

    #[test]
    fn exists_in_excludes_the_torrent_itself() {
        let mut t = movie();
        t.category = "archive".into();
        let c = ctx(vec![t.clone()]);
        assert!(!matches(&leaf(Field::Name, Operator::ExistsIn, "archive"), &t, &c));

        let mut copy = movie();
        copy.hash = "bb".into();
        copy.category = "archive".into();
        let c = ctx(vec![movie(), copy]);
        assert!(matches(&leaf(Field::Name, Operator::ExistsIn, "archive"), &movie(), &c));
        assert!(!matches(&leaf(Field::Category, Operator::ExistsIn, "archive"), &movie(), &c));
    }

    #[test]
    fn free_space_reads_scoped_projection() {
        let t = movie();
        let mut c = ctx(vec![t.clone()]);
        let cond = leaf(Field::FreeSpace, Operator::LessThan, "1500");
        assert!(!matches(&cond, &t, &c));

        let key = FreeSpaceKey::new(RuleId(1), FreeSpaceSource::ClientDefault);
        c.set_free_space_scope(Some(key.clone()));
        c.free_space_mut()
            .set_reading(FreeSpaceSource::ClientDefault, 1000);
        assert!(matches(&cond, &t, &c));

        c.free_space_mut().record(&key, &t);
        assert!(!matches(&cond, &t, &c));
    }

    #[test]
    fn include_cross_seeds_checks_siblings() {
        let mut a = movie();
        a.save_path = "/data".into();
        a.content_path = "/data/Some.Movie".into();
        let mut b = a.clone();
        b.hash = "bb".into();
        b.category = "tv".into();
        let c = ctx(vec![a.clone(), b.clone()]);

        let mut tv = ConditionLeaf::new(Field::Category, Operator::Equal, "tv");
        assert!(!matches(&ConditionNode::Leaf(tv.clone()), &a, &c));
        tv.include_cross_seeds = true;
        assert!(matches(&ConditionNode::Leaf(tv), &a, &c));
        assert!(matches(&leaf(Field::HasCrossSeeds, Operator::Equal, "true"), &a, &c));
        assert!(matches(&leaf(Field::CrossSeedCount, Operator::Equal, "1"), &a, &c));
    }
}
