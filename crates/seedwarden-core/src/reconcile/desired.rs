// ── Desired state ──
//
// Per-torrent fold of every matching rule's intents. Each field remembers
// the rule that set it; a later rule overwrites an earlier one field by
// field. A delete suppresses everything else once the fold settles.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{DeleteMode, Rule, RuleId, ShareLimits};

/// A desired value plus the rule that asked for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attributed<T> {
    pub value: T,
    pub rule_id: RuleId,
    pub rule_name: String,
}

impl<T> Attributed<T> {
    pub fn new(value: T, rule: &Rule) -> Self {
        Self {
            value,
            rule_id: rule.id,
            rule_name: rule.name.clone(),
        }
    }
}

/// Pause and resume share one field: the last rule decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Pause,
    Resume,
}

/// Target category or save path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub value: String,
    pub include_cross_seeds: bool,
    /// Name of the torrent whose rule widened this action to us.
    pub via: Option<String>,
}

impl Placement {
    pub fn new(value: impl Into<String>, include_cross_seeds: bool) -> Self {
        Self {
            value: value.into(),
            include_cross_seeds,
            via: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteIntent {
    pub mode: DeleteMode,
    /// Set by a rule whose delete condition reads free space.
    pub free_space: bool,
    pub via: Option<String>,
}

/// What one rule wants for one torrent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleIntent {
    pub upload_limit: Option<i64>,
    pub download_limit: Option<i64>,
    pub share_limits: Option<ShareLimits>,
    pub lifecycle: Option<Lifecycle>,
    pub recheck: bool,
    pub reannounce: bool,
    /// Tag name -> present.
    pub tags: Vec<(String, bool)>,
    pub category: Option<Placement>,
    pub location: Option<Placement>,
    pub delete: Option<DeleteIntent>,
    pub program: Option<i64>,
}

impl RuleIntent {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Accumulated desired state of one torrent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DesiredState {
    pub upload_limit: Option<Attributed<i64>>,
    pub download_limit: Option<Attributed<i64>>,
    pub share_limits: Option<Attributed<ShareLimits>>,
    pub lifecycle: Option<Attributed<Lifecycle>>,
    pub recheck: Option<Attributed<()>>,
    pub reannounce: Option<Attributed<()>>,
    pub tags: BTreeMap<String, Attributed<bool>>,
    pub category: Option<Attributed<Placement>>,
    pub location: Option<Attributed<Placement>>,
    pub delete: Option<Attributed<DeleteIntent>>,
    pub program: Option<Attributed<i64>>,
}

impl DesiredState {
    /// Fold one rule's intent in. Fields the rule does not set are kept.
    #[must_use]
    pub fn apply(mut self, rule: &Rule, intent: &RuleIntent) -> Self {
        fn set<T>(slot: &mut Option<Attributed<T>>, value: Option<T>, rule: &Rule) {
            if let Some(v) = value {
                *slot = Some(Attributed::new(v, rule));
            }
        }
        set(&mut self.upload_limit, intent.upload_limit, rule);
        set(&mut self.download_limit, intent.download_limit, rule);
        set(&mut self.share_limits, intent.share_limits, rule);
        set(&mut self.lifecycle, intent.lifecycle, rule);
        set(&mut self.recheck, intent.recheck.then_some(()), rule);
        set(&mut self.reannounce, intent.reannounce.then_some(()), rule);
        set(&mut self.category, intent.category.clone(), rule);
        set(&mut self.location, intent.location.clone(), rule);
        set(&mut self.delete, intent.delete.clone(), rule);
        set(&mut self.program, intent.program, rule);
        for (tag, present) in &intent.tags {
            self.tags.insert(tag.clone(), Attributed::new(*present, rule));
        }
        self
    }

    /// Drop every other field when a delete was selected.
    #[must_use]
    pub fn settle(self) -> Self {
        match self.delete {
            Some(delete) => Self {
                delete: Some(delete),
                ..Self::default()
            },
            None => self,
        }
    }

    /// Fold an ordered list of rule intents and settle the result.
    pub fn fold<'a>(intents: impl IntoIterator<Item = (&'a Rule, &'a RuleIntent)>) -> Self {
        intents
            .into_iter()
            .fold(Self::default(), |state, (rule, intent)| state.apply(rule, intent))
            .settle()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn is_deleted(&self) -> bool {
        self.delete.is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn rule(id: i64) -> Rule {
        Rule::new(id, format!("rule-{id}"))
    }

    #[test]
    fn later_rule_wins_per_field() {
        let (r1, r2) = (rule(1), rule(2));
        let i1 = RuleIntent {
            upload_limit: Some(100),
            download_limit: Some(5),
            ..RuleIntent::default()
        };
        let i2 = RuleIntent {
            upload_limit: Some(200),
            ..RuleIntent::default()
        };

        let state = DesiredState::fold([(&r1, &i1), (&r2, &i2)]);
        let up = state.upload_limit.unwrap();
        assert_eq!(up.value, 200);
        assert_eq!(up.rule_id, RuleId(2));
        assert_eq!(state.download_limit.unwrap().rule_id, RuleId(1));
    }

    #[test]
    fn pause_and_resume_share_a_field() {
        let (r1, r2) = (rule(1), rule(2));
        let pause = RuleIntent {
            lifecycle: Some(Lifecycle::Pause),
            ..RuleIntent::default()
        };
        let resume = RuleIntent {
            lifecycle: Some(Lifecycle::Resume),
            ..RuleIntent::default()
        };
        let state = DesiredState::fold([(&r1, &pause), (&r2, &resume)]);
        assert_eq!(state.lifecycle.unwrap().value, Lifecycle::Resume);
    }

    #[test]
    fn tags_are_tracked_per_name() {
        let (r1, r2) = (rule(1), rule(2));
        let add = RuleIntent {
            tags: vec![("old".into(), true), ("keep".into(), true)],
            ..RuleIntent::default()
        };
        let remove = RuleIntent {
            tags: vec![("old".into(), false)],
            ..RuleIntent::default()
        };
        let state = DesiredState::fold([(&r1, &add), (&r2, &remove)]);
        assert!(!state.tags["old"].value);
        assert!(state.tags["keep"].value);
        assert_eq!(state.tags["keep"].rule_id, RuleId(1));
    }

    #[test]
    fn delete_suppresses_other_fields_regardless_of_order() {
        let (r1, r2) = (rule(1), rule(2));
        let delete = RuleIntent {
            delete: Some(DeleteIntent {
                mode: DeleteMode::KeepFiles,
                free_space: false,
                via: None,
            }),
            ..RuleIntent::default()
        };
        let tag = RuleIntent {
            tags: vec![("x".into(), true)],
            lifecycle: Some(Lifecycle::Pause),
            ..RuleIntent::default()
        };

        let state = DesiredState::fold([(&r1, &delete), (&r2, &tag)]);
        assert!(state.is_deleted());
        assert!(state.tags.is_empty());
        assert!(state.lifecycle.is_none());
    }

    #[test]
    fn empty_intents_leave_state_empty() {
        let r = rule(1);
        let state = DesiredState::fold([(&r, &RuleIntent::default())]);
        assert!(state.is_empty());
        assert!(RuleIntent::default().is_empty());
    }
}
