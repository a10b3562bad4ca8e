//! klartext - free-form German report requests compiled to SQL plans.
//!
//! Pipeline: raw text -> `QueryParser::parse` -> `QueryIR` ->
//! `UnderstandingEngine::understand` -> (if actionable) `Planner::plan`
//! against a `ReportTemplate` -> `SqlPlan` for the external query executor.
//!
//! Everything is synchronous and read-only after construction; parser,
//! understanding engine and planner instances can be shared across threads.

pub mod error;
pub mod ir;
pub mod knowledge;
pub mod ontology;
pub mod parser;
pub mod planner;
pub mod understanding;

pub use error::{KlartextError, Result};
pub use ir::{Context, Operator, Predicate, PredicateValue, Projection, QueryIR, SortSpec};
pub use knowledge::{ColumnSpec, FieldKind, KnowledgeBase, ReportTemplate};
pub use ontology::Ontology;
pub use parser::QueryParser;
pub use planner::{Planner, SqlPlan};
pub use understanding::{ParseStatus, Understanding, UnderstandingEngine};
