// ── Condition trees ──
//
// A condition is a tagged union: a group (AND/OR over ordered children)
// or a leaf comparing one torrent field against a value. Leaves cache
// their compiled regex so a pattern is compiled at most once per node.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Maximum nesting depth the evaluator will descend into.
pub const MAX_CONDITION_DEPTH: usize = 20;

/// Boolean connective of a group node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupOp {
    And,
    Or,
}

/// How a field's value is interpreted when compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    /// Comma-separated set; operators apply per element.
    Multi,
    Integer,
    Float,
    /// `(count / total) * 100` against a 0–100 target.
    Percent,
    /// Seconds elapsed since a timestamp.
    Age,
    Bool,
}

/// Every torrent attribute a condition can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    // String
    Name,
    Hash,
    Category,
    SavePath,
    ContentPath,
    Tracker,
    TrackerDisplayName,
    State,
    Comment,
    // Multi-valued
    Tags,
    // Integer
    Size,
    TotalSize,
    Downloaded,
    Uploaded,
    AmountLeft,
    DlSpeed,
    UpSpeed,
    DlLimit,
    UpLimit,
    NumSeeds,
    NumLeechs,
    NumComplete,
    NumIncomplete,
    SeedingTime,
    TimeActive,
    CrossSeedCount,
    FreeSpace,
    // Float
    Ratio,
    Progress,
    Availability,
    RatioLimit,
    // Percentage
    SwarmSeedPercent,
    ConnectedSeedPercent,
    // Age
    AddedAge,
    CompletionAge,
    LastActivityAge,
    // Bool
    Private,
    IsUnregistered,
    TrackerDown,
    HasCrossSeeds,
}

impl Field {
    pub fn kind(self) -> FieldKind {
        match self {
            Self::Name
            | Self::Hash
            | Self::Category
            | Self::SavePath
            | Self::ContentPath
            | Self::Tracker
            | Self::TrackerDisplayName
            | Self::State
            | Self::Comment => FieldKind::String,
            Self::Tags => FieldKind::Multi,
            Self::Size
            | Self::TotalSize
            | Self::Downloaded
            | Self::Uploaded
            | Self::AmountLeft
            | Self::DlSpeed
            | Self::UpSpeed
            | Self::DlLimit
            | Self::UpLimit
            | Self::NumSeeds
            | Self::NumLeechs
            | Self::NumComplete
            | Self::NumIncomplete
            | Self::SeedingTime
            | Self::TimeActive
            | Self::CrossSeedCount
            | Self::FreeSpace => FieldKind::Integer,
            Self::Ratio | Self::Progress | Self::Availability | Self::RatioLimit => {
                FieldKind::Float
            }
            Self::SwarmSeedPercent | Self::ConnectedSeedPercent => FieldKind::Percent,
            Self::AddedAge | Self::CompletionAge | Self::LastActivityAge => FieldKind::Age,
            Self::Private | Self::IsUnregistered | Self::TrackerDown | Self::HasCrossSeeds => {
                FieldKind::Bool
            }
        }
    }
}

/// Comparison operator of a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equal,
    NotEqual,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Matches,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Between,
    /// Exact (case-insensitive) name match inside another category.
    ExistsIn,
    /// Normalized bidirectional substring match inside another category.
    ContainsIn,
}

/// An AND/OR node over ordered children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionGroup {
    pub op: GroupOp,
    #[serde(default)]
    pub children: Vec<ConditionNode>,
    #[serde(default)]
    pub negate: bool,
}

/// A single field comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionLeaf {
    pub field: Field,
    pub operator: Operator,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<String>,
    #[serde(default)]
    pub negate: bool,
    /// Treat `value` as a regular expression.
    #[serde(default)]
    pub regex: bool,
    /// Also match when any cross-seed sibling satisfies the leaf.
    #[serde(default)]
    pub include_cross_seeds: bool,
    #[serde(skip)]
    compiled: OnceLock<Option<Regex>>,
}

impl ConditionLeaf {
    pub fn new(field: Field, operator: Operator, value: impl Into<String>) -> Self {
        Self {
            field,
            operator,
            value: value.into(),
            min: None,
            max: None,
            negate: false,
            regex: false,
            include_cross_seeds: false,
            compiled: OnceLock::new(),
        }
    }

    pub fn between(field: Field, min: impl Into<String>, max: impl Into<String>) -> Self {
        Self {
            min: Some(min.into()),
            max: Some(max.into()),
            ..Self::new(field, Operator::Between, "")
        }
    }

    /// Whether this leaf compares with a regular expression.
    pub fn uses_regex(&self) -> bool {
        self.regex || self.operator == Operator::Matches
    }

    /// The compiled, case-insensitive pattern. `None` when compilation
    /// failed; the failure is logged on first use only.
    pub fn pattern(&self) -> Option<&Regex> {
        self.compiled
            .get_or_init(|| {
                match regex::RegexBuilder::new(&self.value)
                    .case_insensitive(true)
                    .build()
                {
                    Ok(re) => Some(re),
                    Err(e) => {
                        tracing::warn!(
                            field = ?self.field,
                            pattern = %self.value,
                            error = %e,
                            "invalid condition regex; leaf will never match"
                        );
                        None
                    }
                }
            })
            .as_ref()
    }
}

/// A condition tree node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionNode {
    Group(ConditionGroup),
    Leaf(ConditionLeaf),
}

impl ConditionNode {
    pub fn leaf(field: Field, operator: Operator, value: impl Into<String>) -> Self {
        Self::Leaf(ConditionLeaf::new(field, operator, value))
    }

    pub fn and(children: Vec<ConditionNode>) -> Self {
        Self::Group(ConditionGroup {
            op: GroupOp::And,
            children,
            negate: false,
        })
    }

    pub fn or(children: Vec<ConditionNode>) -> Self {
        Self::Group(ConditionGroup {
            op: GroupOp::Or,
            children,
            negate: false,
        })
    }

    /// Flip this node's negate flag.
    #[must_use]
    pub fn negated(mut self) -> Self {
        match &mut self {
            Self::Group(g) => g.negate = !g.negate,
            Self::Leaf(l) => l.negate = !l.negate,
        }
        self
    }

    /// Whether any leaf in the tree references `field`.
    pub fn references(&self, field: Field) -> bool {
        match self {
            Self::Group(g) => g.children.iter().any(|c| c.references(field)),
            Self::Leaf(l) => l.field == field,
        }
    }
}
