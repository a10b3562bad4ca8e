//! Declarative knowledge base: column libraries and SQL skeletons per domain.
//!
//! A `ReportTemplate` is static configuration — loaded (or compiled in) once at
//! process start and read-only afterwards. All schema knowledge lives here:
//! which canonical fields exist, how each maps to a SQL expression, which
//! keywords select it, and how sort tokens resolve. The planner carries no
//! schema knowledge of its own.

use crate::error::{KlartextError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Semantic kind of a column; drives predicate dispatch in the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Identifier,
    Code,
    Name,
    Date,
    Number,
    Text,
}

/// One selectable column of a reporting domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Canonical field name, the key the ontology resolves to.
    pub canonical_key: String,

    /// SQL expression selecting the column, table-qualified.
    pub sql_expression: String,

    /// Human-readable header emitted for this column.
    pub display_alias: String,

    /// Alias of the owning table in the skeleton's FROM/JOIN clauses.
    pub table_alias: String,

    /// Keyword synonyms selecting this column (canonical key is implicit).
    #[serde(default)]
    pub keywords: Vec<String>,

    pub kind: FieldKind,
}

impl ColumnSpec {
    fn new(
        canonical_key: &str,
        sql_expression: &str,
        display_alias: &str,
        table_alias: &str,
        keywords: &[&str],
        kind: FieldKind,
    ) -> Self {
        Self {
            canonical_key: canonical_key.to_string(),
            sql_expression: sql_expression.to_string(),
            display_alias: display_alias.to_string(),
            table_alias: table_alias.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            kind,
        }
    }
}

/// Column library plus SQL skeleton of one reporting domain.
///
/// The skeleton must contain exactly one `{COLUMNS}` and one `{CONDITIONS}`
/// placeholder; fixed JOIN and WHERE-prefix clauses are part of the skeleton
/// text. Column order here is the display order of an unconstrained report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportTemplate {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
    pub sql_skeleton: String,

    /// ORDER-BY alias table: well-known display names to qualified columns.
    /// Sort tokens not listed here pass through to the SQL verbatim.
    #[serde(default)]
    pub sort_aliases: HashMap<String, String>,
}

impl ReportTemplate {
    pub fn column(&self, canonical_key: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.canonical_key == canonical_key)
    }

    /// Check the skeleton carries both substitution points.
    pub fn validate(&self) -> Result<()> {
        for placeholder in ["{COLUMNS}", "{CONDITIONS}"] {
            if self.sql_skeleton.matches(placeholder).count() != 1 {
                return Err(KlartextError::Knowledge(format!(
                    "template '{}': skeleton must contain exactly one {}",
                    self.name, placeholder
                )));
            }
        }
        if self.columns.is_empty() {
            return Err(KlartextError::Knowledge(format!(
                "template '{}': column library is empty",
                self.name
            )));
        }
        Ok(())
    }
}

/// The set of report templates available to the compiler.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    templates: Vec<ReportTemplate>,
}

impl KnowledgeBase {
    pub fn new(templates: Vec<ReportTemplate>) -> Result<Self> {
        for template in &templates {
            template.validate()?;
        }
        Ok(Self { templates })
    }

    pub fn templates(&self) -> &[ReportTemplate] {
        &self.templates
    }

    pub fn template(&self, name: &str) -> Option<&ReportTemplate> {
        self.templates.iter().find(|t| t.name == name)
    }

    /// Load all `*.json` template files from a directory.
    ///
    /// Files are read in lexicographic order so template order is stable.
    pub fn load(dir: &Path) -> Result<Self> {
        info!("Loading report templates from {:?}", dir);
        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().map(|e| e == "json").unwrap_or(false))
            .collect();
        paths.sort();

        let mut templates = Vec::new();
        for path in paths {
            let raw = fs::read_to_string(&path)?;
            let template: ReportTemplate = serde_json::from_str(&raw).map_err(|e| {
                KlartextError::Knowledge(format!("{}: {}", path.display(), e))
            })?;
            debug!(
                "Loaded template '{}' with {} columns",
                template.name,
                template.columns.len()
            );
            templates.push(template);
        }
        if templates.is_empty() {
            return Err(KlartextError::Knowledge(format!(
                "no template files found in {}",
                dir.display()
            )));
        }
        Self::new(templates)
    }

    /// Compiled-in knowledge base for the COVER contract and claims domains.
    pub fn builtin() -> Self {
        let contracts = ReportTemplate {
            name: "vertraege".to_string(),
            columns: vec![
                ColumnSpec::new(
                    "vsn",
                    "v.vsn",
                    "VSN",
                    "v",
                    &["police", "policennummer", "versicherungsschein", "versicherungsscheinnummer"],
                    FieldKind::Identifier,
                ),
                ColumnSpec::new("sparte", "v.sparte", "Sparte", "v", &[], FieldKind::Code),
                ColumnSpec::new(
                    "makler_nr",
                    "m.partner_nr",
                    "Makler-Nr",
                    "m",
                    &["makler", "maklernummer", "vermittler", "vermittlernummer"],
                    FieldKind::Identifier,
                ),
                ColumnSpec::new(
                    "makler_name",
                    "m.name",
                    "Maklername",
                    "m",
                    &["maklername", "makler name"],
                    FieldKind::Name,
                ),
                ColumnSpec::new(
                    "firma",
                    "v.firma",
                    "Firma",
                    "v",
                    &["firmenname", "kunde", "versicherungsnehmer"],
                    FieldKind::Name,
                ),
                ColumnSpec::new(
                    "land_code",
                    "v.land_code",
                    "Land",
                    "v",
                    &["land", "landcode", "land code", "staat"],
                    FieldKind::Code,
                ),
                ColumnSpec::new(
                    "beginn",
                    "v.beginn",
                    "Beginn",
                    "v",
                    &["anfang", "vertragsbeginn"],
                    FieldKind::Date,
                ),
                ColumnSpec::new(
                    "ablauf",
                    "v.ablauf",
                    "Ablauf",
                    "v",
                    &["ende", "vertragsende"],
                    FieldKind::Date,
                ),
                ColumnSpec::new(
                    "bearbeitungsstand",
                    "v.bearb_stand",
                    "Bearbeitungsstand",
                    "v",
                    &["status"],
                    FieldKind::Code,
                ),
                ColumnSpec::new(
                    "vertragsstand",
                    "v.vertrags_stand",
                    "Vertragsstand",
                    "v",
                    &[],
                    FieldKind::Code,
                ),
                ColumnSpec::new(
                    "praemie",
                    "v.praemie",
                    "Prämie",
                    "v",
                    &["prämie", "beitrag"],
                    FieldKind::Number,
                ),
            ],
            sql_skeleton: "SELECT\n{COLUMNS}\nFROM vertrag v\nJOIN partner m ON m.partner_nr = v.makler_nr\nWHERE v.sparte = 'COVER'\n  AND {CONDITIONS}".to_string(),
            sort_aliases: [
                ("firma", "v.firma"),
                ("makler", "m.name"),
                ("maklername", "m.name"),
                ("vsn", "v.vsn"),
                ("beginn", "v.beginn"),
                ("ablauf", "v.ablauf"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        };

        let claims = ReportTemplate {
            name: "schaeden".to_string(),
            columns: vec![
                ColumnSpec::new(
                    "schaden_nr",
                    "s.schaden_nr",
                    "Schaden-Nr",
                    "s",
                    &["schadennummer", "schadennr"],
                    FieldKind::Identifier,
                ),
                ColumnSpec::new(
                    "vsn",
                    "s.vsn",
                    "VSN",
                    "s",
                    &["police", "versicherungsschein"],
                    FieldKind::Identifier,
                ),
                ColumnSpec::new(
                    "schaden_datum",
                    "s.schaden_datum",
                    "Schadendatum",
                    "s",
                    &["schadendatum", "schadentag"],
                    FieldKind::Date,
                ),
                ColumnSpec::new(
                    "bearbeitungsstand",
                    "s.bearb_stand",
                    "Bearbeitungsstand",
                    "s",
                    &["status"],
                    FieldKind::Code,
                ),
                ColumnSpec::new(
                    "firma",
                    "v.firma",
                    "Firma",
                    "v",
                    &["firmenname", "kunde"],
                    FieldKind::Name,
                ),
                ColumnSpec::new("reserve", "s.reserve", "Reserve", "s", &[], FieldKind::Number),
                ColumnSpec::new("zahlung", "s.zahlung", "Zahlung", "s", &[], FieldKind::Number),
            ],
            sql_skeleton: "SELECT\n{COLUMNS}\nFROM schaden s\nJOIN vertrag v ON v.vsn = s.vsn\nWHERE {CONDITIONS}".to_string(),
            sort_aliases: [
                ("firma", "v.firma"),
                ("schadendatum", "s.schaden_datum"),
                ("vsn", "s.vsn"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        };

        Self {
            templates: vec![contracts, claims],
        }
    }

    /// All keyword synonyms plus canonical keys across templates, lowercased.
    /// Used for "did you mean" hints in the understanding layer.
    pub fn vocabulary(&self) -> Vec<String> {
        let mut vocab: Vec<String> = Vec::new();
        for template in &self.templates {
            for column in &template.columns {
                vocab.push(column.canonical_key.to_lowercase());
                for keyword in &column.keywords {
                    vocab.push(keyword.to_lowercase());
                }
            }
        }
        vocab.sort();
        vocab.dedup();
        vocab
    }
}
