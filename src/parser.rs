//! Clause extraction: raw German report sentences into `QueryIR`.
//!
//! The parser is a fixed pipeline over a shrinking working string. Each stage
//! extracts structured data AND strips the matched substring, so later, more
//! liberal patterns cannot re-match text an earlier stage already consumed.
//! The stage order is load-bearing:
//!
//! 1. context detection (substring heuristics, does not consume)
//! 2. sort clause ("sortiert nach ...")
//! 3. limit ("limit 100")
//! 4. global projection clauses ("zuerst ...", "außer ...")
//! 5. scoped fields block ("mit den feldern ...")
//! 6. filter predicate battery over the remainder
//!
//! No stage raises an error; a sentence that matches nothing yields an empty
//! IR. Whether that is actionable is the understanding layer's call.

use crate::ir::{
    Context, FilterGroup, Operator, Predicate, Projection, QueryIR, SortDirection, SortSpec,
};
use crate::ontology::Ontology;
use lazy_static::lazy_static;
use regex::Regex;
use std::ops::Range;
use tracing::debug;

/// Accepted date literal shapes: 01.01.2024, 1.1.24, 2024-01-01, 20240101.
const DATE_LITERAL: &str = r"(\d{1,2}\.\d{1,2}\.\d{2,4}|\d{4}-\d{2}-\d{2}|\d{8})";

lazy_static! {
    static ref RE_SORT: Regex =
        Regex::new(r"(?i)\b(?:sortiert nach|sortiere nach|order by)\b(.*)$").unwrap();
    static ref RE_LIMIT: Regex =
        Regex::new(r"(?i)\b(?:limit|maximal|höchstens)\s+(\d+)\b").unwrap();
    static ref RE_FIELDS_INTRO: Regex = Regex::new(
        r"(?i)\b(?:mit den feldern|mit feldern|mit den spalten|zeige mir die felder|zeig mir die felder)\s+"
    )
    .unwrap();
    static ref RE_PIN_INTRO: Regex = Regex::new(r"(?i)\bzuerst\s+").unwrap();
    static ref RE_EXCLUDE_INTRO: Regex =
        Regex::new(r"(?i)\b(?:außer|ausser|ohne)\s+").unwrap();
    /// A field list runs until the next projection clause keyword or a
    /// preposition that introduces a filter clause ("außer land für makler
    /// 100120" must not swallow the broker filter). None of these words can
    /// occur inside a field phrase.
    static ref RE_CLAUSE_STOP: Regex = Regex::new(
        r"(?i)\b(?:zuerst|außer|ausser|ohne|für|fuer|mit|von|bei|aus|zwischen|nach|vor|seit|ab|bis)\b"
    )
    .unwrap();
    static ref RE_FIELD_SEP: Regex = Regex::new(r"(?i)\s*(?:,|\bund\b)\s*").unwrap();

    // Filter battery. Each pattern is applied repeatedly; every hit becomes
    // one predicate and is stripped from the working text.
    static ref RE_MAKLER_NAME: Regex =
        Regex::new(r"(?i)\bmakler\s*-?\s*name\s+([\w*%.\-]+)").unwrap();
    static ref RE_FIRMA: Regex = Regex::new(r"(?i)\bfirma\s+([\w*%.\-]+)").unwrap();
    static ref RE_MAKLER_NR: Regex =
        Regex::new(r"(?i)\bmakler(?:nummer)?\s+(\d+)\b").unwrap();
    static ref RE_VSN: Regex = Regex::new(r"(?i)\bvsn\s+([\w/\-]+)").unwrap();
    static ref RE_SCHADEN_NR: Regex =
        Regex::new(r"(?i)\bschaden(?:nummer|nr)?\s+(\d+)\b").unwrap();
    static ref RE_STATUS: Regex =
        Regex::new(r"(?i)\b(?:status|bearbeitungsstand)\s+([a-z0-9]{1,3})\b").unwrap();
    static ref RE_VERTRAGSSTAND: Regex =
        Regex::new(r"(?i)\bvertragsstand\s+([a-z0-9]{1,3})\b").unwrap();
    static ref RE_LAND: Regex = Regex::new(r"(?i)\bland\s+([a-z]{2,3})\b").unwrap();

    /// Per date-bearing field: (canonical name, between, after, before).
    static ref DATE_FILTERS: Vec<(&'static str, Regex, Regex, Regex)> = [
        ("beginn", r"(?:vertragsbeginn|beginn|anfang)"),
        ("ablauf", r"(?:vertragsende|ablauf|ende)"),
        ("schaden_datum", r"(?:schaden\s*datum|schadentag)"),
    ]
    .into_iter()
    .map(|(field, kw)| {
        let between = Regex::new(&format!(
            r"(?i)\b{kw}\s+zwischen\s+{DATE_LITERAL}\s+und\s+{DATE_LITERAL}"
        ))
        .unwrap();
        let after = Regex::new(&format!(
            r"(?i)\b{kw}\s+(?:nach|ab|seit)(?:\s+dem)?\s+{DATE_LITERAL}"
        ))
        .unwrap();
        let before = Regex::new(&format!(
            r"(?i)\b{kw}\s+(?:vor|bis)(?:\s+dem|\s+zum)?\s+{DATE_LITERAL}"
        ))
        .unwrap();
        (field, between, after, before)
    })
    .collect();
}

type Stage = fn(&QueryParser, &str, &mut QueryIR) -> String;

/// Turns one sentence into one `QueryIR`. Stateless apart from the ontology;
/// a single instance may serve any number of threads.
pub struct QueryParser {
    ontology: Ontology,
}

impl QueryParser {
    pub fn new(ontology: Ontology) -> Self {
        Self { ontology }
    }

    pub fn parse(&self, text: &str) -> QueryIR {
        let mut ir = QueryIR::empty();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return ir;
        }

        let mut working = trimmed.to_lowercase();
        ir.context = detect_context(&working);
        debug!("Context {:?} for input '{}'", ir.context, trimmed);

        let stages: [Stage; 5] = [
            Self::extract_sort,
            Self::extract_limit,
            Self::extract_global_projections,
            Self::extract_scoped_projections,
            Self::extract_filters,
        ];
        for stage in stages {
            working = stage(self, &working, &mut ir);
        }
        ir
    }

    /// Stage 2: "sortiert nach a, b desc" — everything after the separator is
    /// the sort tail, split on commas into `field [direction]` pairs.
    fn extract_sort(&self, text: &str, ir: &mut QueryIR) -> String {
        let Some(caps) = RE_SORT.captures(text) else {
            return text.to_string();
        };
        let tail = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        for part in tail.split(',') {
            let mut tokens: Vec<&str> = part.split_whitespace().collect();
            if tokens.is_empty() {
                continue;
            }
            let direction = match tokens.last().map(|t| t.to_lowercase()).as_deref() {
                Some("desc") | Some("absteigend") => {
                    tokens.pop();
                    SortDirection::Desc
                }
                Some("asc") | Some("aufsteigend") => {
                    tokens.pop();
                    SortDirection::Asc
                }
                _ => SortDirection::Asc,
            };
            if tokens.is_empty() {
                continue;
            }
            ir.sort_orders.push(SortSpec {
                field: self.ontology.resolve(&tokens.join(" ")),
                direction,
            });
        }
        let matched = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
        text[..matched.start].to_string()
    }

    /// Stage 3: first "limit <n>" anywhere in the remaining text.
    fn extract_limit(&self, text: &str, ir: &mut QueryIR) -> String {
        let Some(caps) = RE_LIMIT.captures(text) else {
            return text.to_string();
        };
        ir.limit = caps.get(1).and_then(|m| m.as_str().parse().ok());
        remove_span(text, caps.get(0).map(|m| m.range()).unwrap_or(0..0))
    }

    /// Stage 4: "zuerst ..."/"außer ..." clauses outside any scoped fields
    /// block. The part after a "mit den feldern" separator is left untouched
    /// for stage 5.
    fn extract_global_projections(&self, text: &str, ir: &mut QueryIR) -> String {
        let split = RE_FIELDS_INTRO
            .find(text)
            .map(|m| m.start())
            .unwrap_or(text.len());
        let (head, tail) = text.split_at(split);
        let head = self.extract_projection_clauses(head, ir);
        format!("{}{}", head, tail)
    }

    /// Stage 5: scoped fields block, separator to end of string. Nested
    /// zuerst/außer sub-clauses first, remaining tokens as plain projections.
    fn extract_scoped_projections(&self, text: &str, ir: &mut QueryIR) -> String {
        let Some(m) = RE_FIELDS_INTRO.find(text) else {
            return text.to_string();
        };
        let block = self.extract_projection_clauses(&text[m.end()..], ir);
        for phrase in split_field_list(&block) {
            ir.projections
                .push(Projection::plain(self.ontology.resolve(&phrase)));
        }
        text[..m.start()].to_string()
    }

    /// Shared by stages 4 and 5: strip every "zuerst <list>" and
    /// "außer|ohne <list>" clause from `text`, pushing pin/exclude
    /// projections. Returns the text with the clauses removed.
    fn extract_projection_clauses(&self, text: &str, ir: &mut QueryIR) -> String {
        let mut working = text.to_string();
        loop {
            if let Some(m) = RE_PIN_INTRO.find(&working) {
                let (list, end) = take_field_list(&working[m.end()..]);
                for phrase in split_field_list(&list) {
                    ir.projections
                        .push(Projection::pinned(self.ontology.resolve(&phrase)));
                }
                working = remove_span(&working, m.start()..m.end() + end);
                continue;
            }
            if let Some(m) = RE_EXCLUDE_INTRO.find(&working) {
                let (list, end) = take_field_list(&working[m.end()..]);
                for phrase in split_field_list(&list) {
                    ir.projections
                        .push(Projection::excluded(self.ontology.resolve(&phrase)));
                }
                working = remove_span(&working, m.start()..m.end() + end);
                continue;
            }
            return working;
        }
    }

    /// Stage 6: unordered battery of single-purpose filter extractors, each
    /// applied until it no longer matches. Name patterns run before the
    /// broker-number pattern so "makler name x" is never half-consumed.
    fn extract_filters(&self, text: &str, ir: &mut QueryIR) -> String {
        let mut working = text.to_string();
        let mut predicates = Vec::new();

        // LIKE filters; `*` is the user-facing wildcard.
        for (re, field) in [(&*RE_MAKLER_NAME, "makler_name"), (&*RE_FIRMA, "firma")] {
            while let Some(caps) = re.captures(&working) {
                let value = caps[1].replace('*', "%");
                predicates.push(Predicate::single(field, Operator::Like, value));
                working = remove_span(&working, caps.get(0).unwrap().range());
            }
        }

        // Identifier filters.
        for (re, field) in [
            (&*RE_MAKLER_NR, "makler_nr"),
            (&*RE_VSN, "vsn"),
            (&*RE_SCHADEN_NR, "schaden_nr"),
        ] {
            while let Some(caps) = re.captures(&working) {
                predicates.push(Predicate::single(field, Operator::Equals, &caps[1]));
                working = remove_span(&working, caps.get(0).unwrap().range());
            }
        }

        // Enumerated code filters; storage codes are uppercase.
        for (re, field) in [
            (&*RE_STATUS, "bearbeitungsstand"),
            (&*RE_VERTRAGSSTAND, "vertragsstand"),
            (&*RE_LAND, "land_code"),
        ] {
            while let Some(caps) = re.captures(&working) {
                let value = caps[1].to_uppercase();
                predicates.push(Predicate::single(field, Operator::Equals, value));
                working = remove_span(&working, caps.get(0).unwrap().range());
            }
        }

        // Date range filters, three shapes per date-bearing field. Values
        // stay raw here; normalization to the storage format is the
        // planner's concern.
        for (field, between, after, before) in DATE_FILTERS.iter() {
            while let Some(caps) = between.captures(&working) {
                predicates.push(Predicate::between(*field, &caps[1], &caps[2]));
                working = remove_span(&working, caps.get(0).unwrap().range());
            }
            while let Some(caps) = after.captures(&working) {
                predicates.push(Predicate::single(
                    *field,
                    Operator::GreaterOrEqual,
                    &caps[1],
                ));
                working = remove_span(&working, caps.get(0).unwrap().range());
            }
            while let Some(caps) = before.captures(&working) {
                predicates.push(Predicate::single(*field, Operator::LessOrEqual, &caps[1]));
                working = remove_span(&working, caps.get(0).unwrap().range());
            }
        }

        if !predicates.is_empty() {
            debug!("Extracted {} filter predicate(s)", predicates.len());
            ir.filters.push(FilterGroup { predicates });
        }
        working
    }
}

impl Default for QueryParser {
    fn default() -> Self {
        Self::new(Ontology::default())
    }
}

fn detect_context(lowercased: &str) -> Context {
    const CONTRACT_MARKERS: &[&str] = &["vertrag", "verträge", "vertraege", "cover", "police"];
    const CLAIM_MARKERS: &[&str] = &["schaden", "schäden", "schaeden"];
    if CONTRACT_MARKERS.iter().any(|k| lowercased.contains(k)) {
        return Context::Contracts;
    }
    if CLAIM_MARKERS.iter().any(|k| lowercased.contains(k)) {
        return Context::Claims;
    }
    Context::Unknown
}

/// A field list runs from the current position to the next clause keyword or
/// end of text. Returns the list and its byte length.
fn take_field_list(text: &str) -> (String, usize) {
    let end = RE_CLAUSE_STOP.find(text).map(|m| m.start()).unwrap_or(text.len());
    (text[..end].to_string(), end)
}

/// Split a field list on commas and "und"; items may be multi-word phrases.
fn split_field_list(list: &str) -> Vec<String> {
    RE_FIELD_SEP
        .split(list)
        .map(|s| s.trim_matches(|c: char| !c.is_alphanumeric() && c != '_').trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn remove_span(text: &str, range: Range<usize>) -> String {
    format!("{}{}", &text[..range.start], &text[range.end..])
}
