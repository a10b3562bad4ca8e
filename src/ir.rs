//! Intermediate representation of a parsed report request.
//!
//! The parser turns a raw sentence into a `QueryIR`; the planner consumes it
//! together with a `ReportTemplate` to produce a `SqlPlan`. Everything here is
//! plain data: no behavior beyond a few accessors, immutable once parsing
//! completes, safe to move across threads.

use serde::{Deserialize, Serialize};

/// Reporting domain a sentence was recognized as targeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Context {
    Contracts,
    Claims,
    Unknown,
}

/// Comparison operator of a filter predicate.
///
/// `Between` is the only operator carrying two values; everything else binds a
/// single scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Equals,
    Like,
    Between,
    GreaterOrEqual,
    LessOrEqual,
}

/// Value side of a predicate, shaped by the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredicateValue {
    Single(String),
    Range(String, String),
}

/// One filter condition extracted from the sentence.
///
/// `field` is a canonical field name from ontology resolution. It is not
/// guaranteed to exist in every template's column library; the planner reports
/// and drops predicates it cannot resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    pub field: String,
    pub op: Operator,
    pub value: PredicateValue,
}

impl Predicate {
    pub fn single(field: impl Into<String>, op: Operator, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op,
            value: PredicateValue::Single(value.into()),
        }
    }

    pub fn between(field: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op: Operator::Between,
            value: PredicateValue::Range(from.into(), to.into()),
        }
    }
}

/// Ordered predicates combined with logical AND.
///
/// The IR carries a list of groups to leave room for OR-of-AND composition;
/// the parser currently populates exactly one group per sentence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterGroup {
    pub predicates: Vec<Predicate>,
}

/// One requested column, additive or subtractive.
///
/// `order == Some(0)` pins the column to the front of the result ("zuerst");
/// `exclude == true` removes it from the full set ("außer"). A non-empty
/// projection list is interpreted globally in blacklist mode as soon as any
/// entry is an exclusion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    pub field: String,
    pub exclude: bool,
    pub order: Option<u32>,
}

impl Projection {
    pub fn plain(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            exclude: false,
            order: None,
        }
    }

    pub fn pinned(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            exclude: false,
            order: Some(0),
        }
    }

    pub fn excluded(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            exclude: true,
            order: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// One ORDER BY entry. `field` is either a canonical name or a literal token
/// the planner resolves through the template's sort-alias table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

/// Aggregate root of a parsed sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryIR {
    pub context: Context,
    pub filters: Vec<FilterGroup>,
    pub projections: Vec<Projection>,
    pub sort_orders: Vec<SortSpec>,
    pub limit: Option<u32>,
}

impl QueryIR {
    /// Zero-valued IR: unknown context, nothing extracted.
    pub fn empty() -> Self {
        Self {
            context: Context::Unknown,
            filters: Vec::new(),
            projections: Vec::new(),
            sort_orders: Vec::new(),
            limit: None,
        }
    }

    /// All predicates across filter groups, in declaration order.
    pub fn predicates(&self) -> impl Iterator<Item = &Predicate> {
        self.filters.iter().flat_map(|g| g.predicates.iter())
    }

    pub fn has_predicates(&self) -> bool {
        self.filters.iter().any(|g| !g.predicates.is_empty())
    }
}

impl Default for QueryIR {
    fn default() -> Self {
        Self::empty()
    }
}
