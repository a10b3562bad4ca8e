//! Compiles a `QueryIR` against a `ReportTemplate` into a `SqlPlan`.
//!
//! A planner is a pure function of `(ir, template)`: construction pre-builds
//! an immutable keyword index once, after which `plan` is side-effect-free and
//! safe to call from any number of threads.
//!
//! Predicates the template cannot express are not silently dropped; every
//! dropped predicate or projection leaves an entry in `SqlPlan::warnings`.

use crate::error::{KlartextError, Result};
use crate::ir::{Operator, Predicate, PredicateValue, Projection, QueryIR};
use crate::knowledge::{ColumnSpec, FieldKind, ReportTemplate};
use chrono::NaiveDate;
use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Storage format of date columns.
const DATE_STORAGE_FORMAT: &str = "%Y%m%d";

/// Output of planning: parameterized SQL, positionally aligned parameters and
/// display headers matching the SELECT list. `warnings` reports every filter
/// or projection the template could not express.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SqlPlan {
    pub sql: String,
    pub params: Vec<String>,
    pub headers: Vec<String>,
    pub warnings: Vec<String>,
}

pub struct Planner {
    template: ReportTemplate,
    /// Lowercased keyword and canonical key to column index, built once.
    index: HashMap<String, usize>,
}

impl Planner {
    pub fn new(template: &ReportTemplate) -> Self {
        let mut index = HashMap::new();
        for (position, column) in template.columns.iter().enumerate() {
            index.insert(column.canonical_key.to_lowercase(), position);
            for keyword in &column.keywords {
                index.insert(keyword.to_lowercase(), position);
            }
        }
        Self {
            template: template.clone(),
            index,
        }
    }

    fn resolve(&self, field: &str) -> Option<&ColumnSpec> {
        self.index
            .get(&field.to_lowercase())
            .map(|&position| &self.template.columns[position])
    }

    pub fn plan(&self, ir: &QueryIR) -> Result<SqlPlan> {
        let mut warnings = Vec::new();

        // 1. Column resolution.
        let columns = self.final_columns(&ir.projections);
        if columns.is_empty() {
            return Err(KlartextError::Plan(format!(
                "template '{}': requested fields resolve to zero columns",
                self.template.name
            )));
        }
        for projection in &ir.projections {
            if self.resolve(&projection.field).is_none() {
                warnings.push(format!("unknown field '{}' ignored", projection.field));
            }
        }
        let column_sql = columns
            .iter()
            .map(|c| format!("{} AS \"{}\"", c.sql_expression, c.display_alias))
            .join(",\n");
        let headers: Vec<String> = columns.iter().map(|c| c.display_alias.clone()).collect();

        // 2. Condition compilation, in predicate declaration order.
        let mut fragments = Vec::new();
        let mut params: Vec<String> = Vec::new();
        for predicate in ir.predicates() {
            match self.compile_predicate(predicate) {
                Ok((fragment, mut bound)) => {
                    fragments.push(fragment);
                    params.append(&mut bound);
                }
                Err(reason) => {
                    warn!("Dropping predicate on '{}': {}", predicate.field, reason);
                    warnings.push(reason);
                }
            }
        }
        let conditions = if fragments.is_empty() {
            "1=1".to_string()
        } else {
            fragments.join(" AND ")
        };

        // 3. Skeleton assembly.
        let mut sql = self
            .template
            .sql_skeleton
            .replace("{COLUMNS}", &column_sql)
            .replace("{CONDITIONS}", &conditions);

        // 4. Sort.
        if !ir.sort_orders.is_empty() {
            let order_by = ir
                .sort_orders
                .iter()
                .map(|s| format!("{} {}", self.resolve_sort_field(&s.field), s.direction.as_sql()))
                .join(", ");
            sql.push_str("\nORDER BY ");
            sql.push_str(&order_by);
        }

        // 5. Limit, bound last.
        if let Some(limit) = ir.limit.filter(|&l| l > 0) {
            sql.push_str("\nLIMIT ?");
            params.push(limit.to_string());
        }

        debug!(
            "Planned query over '{}': {} column(s), {} parameter(s)",
            self.template.name,
            headers.len(),
            params.len()
        );
        Ok(SqlPlan {
            sql,
            params,
            headers,
            warnings,
        })
    }

    /// Apply the projection semantics to the template's column library.
    ///
    /// Empty list: the full library in declared order. Any exclusion present:
    /// blacklist mode, full library minus the excluded columns; non-excluded
    /// entries in the same list do not constrain selection. Otherwise
    /// whitelist mode: the distinct resolved columns, pin-to-front entries
    /// first, the rest in first-encounter order.
    pub fn final_columns(&self, projections: &[Projection]) -> Vec<&ColumnSpec> {
        if projections.is_empty() {
            return self.template.columns.iter().collect();
        }

        let blacklist = projections.iter().any(|p| p.exclude);
        if blacklist {
            let excluded: HashSet<&str> = projections
                .iter()
                .filter(|p| p.exclude)
                .filter_map(|p| self.resolve(&p.field))
                .map(|c| c.canonical_key.as_str())
                .collect();
            return self
                .template
                .columns
                .iter()
                .filter(|c| !excluded.contains(c.canonical_key.as_str()))
                .collect();
        }

        let mut seen: HashSet<&str> = HashSet::new();
        let mut pinned = Vec::new();
        let mut rest = Vec::new();
        for projection in projections {
            let Some(column) = self.resolve(&projection.field) else {
                debug!("Whitelist entry '{}' has no column", projection.field);
                continue;
            };
            if !seen.insert(column.canonical_key.as_str()) {
                continue;
            }
            if projection.order == Some(0) {
                pinned.push(column);
            } else {
                rest.push(column);
            }
        }
        pinned.into_iter().chain(rest).collect()
    }

    /// Dispatch one predicate to a SQL fragment plus bound parameters.
    ///
    /// The match over `(kind, operator, value shape)` is the complete set of
    /// supported combinations; anything else is reported back as the reason
    /// the predicate was dropped.
    fn compile_predicate(&self, predicate: &Predicate) -> std::result::Result<(String, Vec<String>), String> {
        let column = self
            .resolve(&predicate.field)
            .ok_or_else(|| format!("no column for filter field '{}'", predicate.field))?;
        let expr = &column.sql_expression;

        match (column.kind, predicate.op, &predicate.value) {
            (
                FieldKind::Identifier | FieldKind::Code | FieldKind::Number | FieldKind::Text,
                Operator::Equals,
                PredicateValue::Single(value),
            ) => Ok((format!("{} = ?", expr), vec![value.clone()])),

            (FieldKind::Name | FieldKind::Text, Operator::Like, PredicateValue::Single(value)) => {
                let pattern = if value.contains('%') {
                    value.clone()
                } else {
                    format!("%{}%", value)
                };
                Ok((format!("LOWER({}) LIKE ?", expr), vec![pattern]))
            }

            (FieldKind::Date, Operator::GreaterOrEqual, PredicateValue::Single(value)) => {
                let date = normalize_date(value)
                    .ok_or_else(|| format!("unparseable date '{}' for '{}'", value, predicate.field))?;
                Ok((format!("{} >= ?", expr), vec![date]))
            }

            (FieldKind::Date, Operator::LessOrEqual, PredicateValue::Single(value)) => {
                let date = normalize_date(value)
                    .ok_or_else(|| format!("unparseable date '{}' for '{}'", value, predicate.field))?;
                Ok((format!("{} <= ?", expr), vec![date]))
            }

            (FieldKind::Date, Operator::Between, PredicateValue::Range(from, to)) => {
                let from = normalize_date(from)
                    .ok_or_else(|| format!("unparseable date '{}' for '{}'", from, predicate.field))?;
                let to = normalize_date(to)
                    .ok_or_else(|| format!("unparseable date '{}' for '{}'", to, predicate.field))?;
                Ok((format!("{} BETWEEN ? AND ?", expr), vec![from, to]))
            }

            (kind, op, _) => Err(format!(
                "unsupported filter {:?} on {:?} field '{}'",
                op, kind, predicate.field
            )),
        }
    }

    /// ORDER BY field resolution: the template's sort-alias table overrides a
    /// few well-known display names; after that the column library maps
    /// canonical keys (the shape ontology-resolved sort tokens arrive in) to
    /// their SQL expressions; anything else passes through verbatim.
    fn resolve_sort_field<'a>(&'a self, field: &'a str) -> &'a str {
        if let Some(alias) = self.template.sort_aliases.get(field) {
            return alias;
        }
        if let Some(column) = self.resolve(field) {
            return &column.sql_expression;
        }
        field
    }
}

/// Normalize an accepted date literal to the yyyyMMdd storage string.
fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    // %d.%m.%y must run before %d.%m.%Y: %Y also accepts two-digit years
    // and would turn "1.2.24" into year 24.
    for format in ["%d.%m.%y", "%d.%m.%Y", "%Y-%m-%d", "%Y%m%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date.format(DATE_STORAGE_FORMAT).to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FilterGroup, SortDirection, SortSpec};
    use crate::knowledge::KnowledgeBase;

    fn contracts_planner() -> Planner {
        let kb = KnowledgeBase::builtin();
        Planner::new(kb.template("vertraege").unwrap())
    }

    fn ir_with(predicates: Vec<Predicate>) -> QueryIR {
        let mut ir = QueryIR::empty();
        if !predicates.is_empty() {
            ir.filters.push(FilterGroup { predicates });
        }
        ir
    }

    #[test]
    fn test_empty_projection_selects_all_columns_in_order() {
        let planner = contracts_planner();
        let columns = planner.final_columns(&[]);
        let kb = KnowledgeBase::builtin();
        let template = kb.template("vertraege").unwrap();
        assert_eq!(columns.len(), template.columns.len());
        assert_eq!(columns[0].canonical_key, "vsn");
    }

    #[test]
    fn test_blacklist_mode_removes_only_excluded() {
        let planner = contracts_planner();
        // one exclude and one plain entry: blacklist mode, the plain entry
        // must not constrain selection
        let projections = vec![
            Projection::excluded("land_code"),
            Projection::plain("vsn"),
        ];
        let columns = planner.final_columns(&projections);
        let keys: Vec<&str> = columns.iter().map(|c| c.canonical_key.as_str()).collect();
        assert!(!keys.contains(&"land_code"));
        assert!(keys.contains(&"vsn"));
        assert!(keys.contains(&"firma"));
        assert_eq!(keys.len(), 10);
    }

    #[test]
    fn test_whitelist_mode_pins_and_dedupes() {
        let planner = contracts_planner();
        let projections = vec![
            Projection::plain("land_code"),
            Projection::pinned("vsn"),
            Projection::plain("police"), // same column as vsn
            Projection::plain("firma"),
        ];
        let columns = planner.final_columns(&projections);
        let keys: Vec<&str> = columns.iter().map(|c| c.canonical_key.as_str()).collect();
        assert_eq!(keys, vec!["vsn", "land_code", "firma"]);
    }

    #[test]
    fn test_whitelist_of_unknown_fields_fails_plan() {
        let planner = contracts_planner();
        let mut ir = QueryIR::empty();
        ir.projections.push(Projection::plain("unbekannt"));
        assert!(planner.plan(&ir).is_err());
    }

    #[test]
    fn test_no_predicates_yields_tautology() {
        let planner = contracts_planner();
        let plan = planner.plan(&QueryIR::empty()).unwrap();
        assert!(plan.sql.contains("1=1"));
        assert!(plan.params.is_empty());
        assert_eq!(plan.headers.len(), 11);
    }

    #[test]
    fn test_equals_predicate_binds_value() {
        let planner = contracts_planner();
        let ir = ir_with(vec![Predicate::single("makler_nr", Operator::Equals, "100120")]);
        let plan = planner.plan(&ir).unwrap();
        assert!(plan.sql.contains("m.partner_nr = ?"));
        assert_eq!(plan.params, vec!["100120"]);
    }

    #[test]
    fn test_like_predicate_wraps_wildcards() {
        let planner = contracts_planner();
        let ir = ir_with(vec![Predicate::single("makler_name", Operator::Like, "gründemann")]);
        let plan = planner.plan(&ir).unwrap();
        assert!(plan.sql.contains("LOWER(m.name) LIKE ?"));
        assert_eq!(plan.params, vec!["%gründemann%"]);
    }

    #[test]
    fn test_like_predicate_keeps_explicit_wildcard() {
        let planner = contracts_planner();
        let ir = ir_with(vec![Predicate::single("makler_name", Operator::Like, "smith%")]);
        let plan = planner.plan(&ir).unwrap();
        assert_eq!(plan.params, vec!["smith%"]);
    }

    #[test]
    fn test_between_binds_normalized_dates_in_order() {
        let planner = contracts_planner();
        let ir = ir_with(vec![Predicate::between("beginn", "01.01.2024", "31.12.2024")]);
        let plan = planner.plan(&ir).unwrap();
        assert!(plan.sql.contains("v.beginn BETWEEN ? AND ?"));
        assert_eq!(plan.params, vec!["20240101", "20241231"]);
    }

    #[test]
    fn test_limit_parameter_is_last() {
        let planner = contracts_planner();
        let mut ir = ir_with(vec![Predicate::between("beginn", "01.01.2024", "31.12.2024")]);
        ir.limit = Some(100);
        let plan = planner.plan(&ir).unwrap();
        assert!(plan.sql.ends_with("LIMIT ?"));
        assert_eq!(plan.params.len(), 3);
        assert_eq!(plan.params[2], "100");
    }

    #[test]
    fn test_zero_limit_is_ignored() {
        let planner = contracts_planner();
        let mut ir = QueryIR::empty();
        ir.limit = Some(0);
        let plan = planner.plan(&ir).unwrap();
        assert!(!plan.sql.contains("LIMIT"));
        assert!(plan.params.is_empty());
    }

    #[test]
    fn test_unknown_filter_field_is_reported_not_fatal() {
        let planner = contracts_planner();
        let ir = ir_with(vec![
            Predicate::single("erfunden", Operator::Equals, "x"),
            Predicate::single("makler_nr", Operator::Equals, "100120"),
        ]);
        let plan = planner.plan(&ir).unwrap();
        assert_eq!(plan.params, vec!["100120"]);
        assert_eq!(plan.warnings.len(), 1);
        assert!(plan.warnings[0].contains("erfunden"));
    }

    #[test]
    fn test_unsupported_combination_is_reported() {
        let planner = contracts_planner();
        // LIKE against a date column has no dispatch rule
        let ir = ir_with(vec![Predicate::single("beginn", Operator::Like, "2024")]);
        let plan = planner.plan(&ir).unwrap();
        assert!(plan.sql.contains("1=1"));
        assert_eq!(plan.warnings.len(), 1);
    }

    #[test]
    fn test_unparseable_date_drops_predicate_with_warning() {
        let planner = contracts_planner();
        let ir = ir_with(vec![Predicate::single(
            "beginn",
            Operator::GreaterOrEqual,
            "99.99.2024",
        )]);
        let plan = planner.plan(&ir).unwrap();
        assert!(plan.sql.contains("1=1"));
        assert!(plan.params.is_empty());
        assert!(plan.warnings[0].contains("99.99.2024"));
    }

    #[test]
    fn test_sort_alias_resolution() {
        let planner = contracts_planner();
        let mut ir = QueryIR::empty();
        ir.sort_orders.push(SortSpec {
            field: "firma".to_string(),
            direction: SortDirection::Desc,
        });
        ir.sort_orders.push(SortSpec {
            field: "custom_col".to_string(),
            direction: SortDirection::Asc,
        });
        let plan = planner.plan(&ir).unwrap();
        assert!(plan.sql.contains("ORDER BY v.firma DESC, custom_col ASC"));
    }

    #[test]
    fn test_sort_falls_back_to_column_library() {
        // sort tokens arrive ontology-resolved as canonical keys, which the
        // alias table does not carry; the column library must map them
        let planner = contracts_planner();
        let mut ir = QueryIR::empty();
        ir.sort_orders.push(SortSpec {
            field: "makler_name".to_string(),
            direction: SortDirection::Desc,
        });
        let plan = planner.plan(&ir).unwrap();
        assert!(plan.sql.contains("ORDER BY m.name DESC"));
    }

    #[test]
    fn test_headers_match_selected_columns() {
        let planner = contracts_planner();
        let mut ir = QueryIR::empty();
        ir.projections.push(Projection::plain("vsn"));
        ir.projections.push(Projection::plain("firma"));
        let plan = planner.plan(&ir).unwrap();
        assert_eq!(plan.headers, vec!["VSN", "Firma"]);
        assert!(plan.sql.contains("v.vsn AS \"VSN\""));
        assert!(plan.sql.contains("v.firma AS \"Firma\""));
    }

    #[test]
    fn test_normalize_date_shapes() {
        assert_eq!(normalize_date("01.01.2024").unwrap(), "20240101");
        assert_eq!(normalize_date("1.2.24").unwrap(), "20240201");
        assert_eq!(normalize_date("2024-12-31").unwrap(), "20241231");
        assert_eq!(normalize_date("20240615").unwrap(), "20240615");
        assert!(normalize_date("kein datum").is_none());
        assert!(normalize_date("32.01.2024").is_none());
    }
}
