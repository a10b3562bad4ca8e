//! Decides whether a parse is confident enough to execute.
//!
//! The parser never fails; this layer turns its output into an actionable or
//! non-actionable verdict with a confidence score, unknown-token hints for
//! autocomplete and canned example suggestions for re-prompting. Executing an
//! `Invalid` result is the caller's decision, not an error.

use crate::ir::QueryIR;
use crate::parser::QueryParser;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

const CONFIDENCE_UNKNOWN_CONTEXT: f64 = 0.2;
const CONFIDENCE_WEAK_PARSE: f64 = 0.5;
const CONFIDENCE_ACTIONABLE: f64 = 0.8;

/// Minimum Jaro-Winkler similarity for a "did you mean" hint.
const SUGGESTION_THRESHOLD: f64 = 0.85;

/// Phrases answered with the canned capabilities listing instead of a parse.
const CAPABILITY_PHRASES: &[&str] = &[
    "was kannst du",
    "was geht",
    "hilfe",
    "help",
    "fähigkeiten",
];

const STOPWORDS: &[&str] = &[
    "der", "die", "das", "den", "dem", "des", "ein", "eine", "einen", "und", "oder", "für",
    "fuer", "mit", "von", "aus", "bei", "auf", "alle", "aller", "bitte", "mir", "uns", "nach",
    "vor", "zwischen", "bis", "seit", "zum", "zur", "als", "auch", "über", "unter",
    "zeige", "zeig", "liste", "feldern", "felder", "spalten", "außer", "ausser", "ohne",
    "zuerst", "sortiert", "sortiere", "limit", "maximal", "höchstens", "name",
];

const EXAMPLE_SUGGESTIONS: &[&str] = &[
    "Verträge für Makler 100120",
    "COVER für Makler Name Gründemann",
    "Verträge mit Beginn zwischen 01.01.2024 und 31.12.2024",
    "Verträge für Makler 100120 außer land, firma",
    "Verträge mit den Feldern vsn, firma, land sortiert nach firma desc",
    "Schäden für VSN 4711-08 limit 100",
];

const CAPABILITIES: &[&str] = &[
    "Berichte über Verträge und Schäden in freier Eingabe",
    "Filter: Makler-Nummer, Makler-Name, Firma, VSN, Status, Land, Datumsbereiche",
    "Spaltenauswahl: 'mit den Feldern ...', 'außer ...', 'zuerst ...'",
    "Sortierung ('sortiert nach ... desc') und Begrenzung ('limit 100')",
];

lazy_static! {
    /// A recognizable date-range phrase counts as a strong signal even when
    /// no extractor produced a predicate from it.
    static ref RE_DATE_PHRASE: Regex = Regex::new(
        r"(?i)\b(?:zwischen|nach|vor|ab|seit|bis)\b.*\d{1,2}\.\d{1,2}\.\d{2,4}"
    )
    .unwrap();
    static ref RE_TOKEN: Regex = Regex::new(r"[\w][\w\-]*").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParseStatus {
    Ok,
    Invalid,
}

/// Verdict over one sentence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Understanding {
    pub ir: QueryIR,
    pub status: ParseStatus,
    pub confidence: f64,
    pub unknown_tokens: Vec<String>,
    pub suggestions: Vec<String>,
}

impl Understanding {
    pub fn is_actionable(&self) -> bool {
        self.status == ParseStatus::Ok
    }
}

/// Wraps the parser with the strength heuristic and suggestion generation.
pub struct UnderstandingEngine {
    parser: QueryParser,
    /// Known field keywords, used for fuzzy "did you mean" hints.
    vocabulary: Vec<String>,
}

impl UnderstandingEngine {
    pub fn new(parser: QueryParser) -> Self {
        Self {
            parser,
            vocabulary: Vec::new(),
        }
    }

    /// Attach the field vocabulary of the loaded knowledge base.
    pub fn with_vocabulary(mut self, vocabulary: Vec<String>) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    pub fn understand(&self, text: &str) -> Understanding {
        let lowered = text.trim().to_lowercase();

        if CAPABILITY_PHRASES.iter().any(|p| lowered.contains(p)) {
            return Understanding {
                ir: QueryIR::empty(),
                status: ParseStatus::Ok,
                confidence: 1.0,
                unknown_tokens: Vec::new(),
                suggestions: CAPABILITIES.iter().map(|s| s.to_string()).collect(),
            };
        }

        let ir = self.parser.parse(text);
        let unknown_tokens = self.unknown_tokens(&lowered);

        let strong = ir.has_predicates()
            || lowered.contains("vsn")
            || RE_DATE_PHRASE.is_match(&lowered);

        let (status, confidence) = if ir.context == crate::ir::Context::Unknown {
            (ParseStatus::Invalid, CONFIDENCE_UNKNOWN_CONTEXT)
        } else if !strong {
            // Known domain without a single filter would be a full table
            // scan; force the user to narrow it down.
            (ParseStatus::Invalid, CONFIDENCE_WEAK_PARSE)
        } else {
            (ParseStatus::Ok, CONFIDENCE_ACTIONABLE)
        };
        debug!(
            "Understanding: status {:?}, confidence {}, {} unknown token(s)",
            status,
            confidence,
            unknown_tokens.len()
        );

        let mut suggestions = Vec::new();
        for token in &unknown_tokens {
            if let Some(hint) = self.closest_keyword(token) {
                suggestions.push(format!("Meinten Sie '{}' statt '{}'?", hint, token));
            }
        }
        if status != ParseStatus::Ok {
            suggestions.extend(EXAMPLE_SUGGESTIONS.iter().map(|s| s.to_string()));
        }

        Understanding {
            ir,
            status,
            confidence,
            unknown_tokens,
            suggestions,
        }
    }

    /// Tokens left over after dropping stopwords, short tokens and numbers.
    fn unknown_tokens(&self, lowered: &str) -> Vec<String> {
        RE_TOKEN
            .find_iter(lowered)
            .map(|m| m.as_str().trim_matches('-').to_string())
            .filter(|t| t.chars().count() >= 3)
            .filter(|t| !t.chars().all(|c| c.is_ascii_digit()))
            .filter(|t| !STOPWORDS.contains(&t.as_str()))
            .collect()
    }

    fn closest_keyword(&self, token: &str) -> Option<&str> {
        let mut best: Option<(&str, f64)> = None;
        for keyword in &self.vocabulary {
            if keyword == token {
                return None;
            }
            let score = strsim::jaro_winkler(token, keyword);
            if score >= SUGGESTION_THRESHOLD
                && best.map(|(_, s)| score > s).unwrap_or(true)
            {
                best = Some((keyword, score));
            }
        }
        best.map(|(keyword, _)| keyword)
    }
}

impl Default for UnderstandingEngine {
    fn default() -> Self {
        Self::new(QueryParser::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Context;
    use crate::knowledge::KnowledgeBase;

    fn engine() -> UnderstandingEngine {
        UnderstandingEngine::default().with_vocabulary(KnowledgeBase::builtin().vocabulary())
    }

    #[test]
    fn test_empty_input_is_invalid_with_low_confidence() {
        let result = engine().understand("");
        assert_eq!(result.status, ParseStatus::Invalid);
        assert_eq!(result.confidence, 0.2);
        assert_eq!(result.ir.context, Context::Unknown);
        assert!(!result.suggestions.is_empty());
    }

    #[test]
    fn test_unknown_context_is_invalid() {
        let result = engine().understand("zeig mir irgendwas");
        assert_eq!(result.status, ParseStatus::Invalid);
        assert_eq!(result.confidence, 0.2);
    }

    #[test]
    fn test_known_context_without_filter_is_weak() {
        let result = engine().understand("alle cover");
        assert_eq!(result.status, ParseStatus::Invalid);
        assert_eq!(result.confidence, 0.5);
        assert!(!result.suggestions.is_empty());
    }

    #[test]
    fn test_filtered_query_is_actionable() {
        let result = engine().understand("Verträge für Makler 100120");
        assert_eq!(result.status, ParseStatus::Ok);
        assert_eq!(result.confidence, 0.8);
        assert!(result.is_actionable());
    }

    #[test]
    fn test_vsn_marker_counts_as_strong() {
        // no extractor may fire on this shape, the literal marker is enough
        let result = engine().understand("Verträge zur VSN bitte");
        assert_eq!(result.status, ParseStatus::Ok);
        assert_eq!(result.confidence, 0.8);
    }

    #[test]
    fn test_date_phrase_counts_as_strong() {
        let result = engine().understand("Verträge mit Beginn zwischen 01.01.2024 und 31.12.2024");
        assert_eq!(result.status, ParseStatus::Ok);
        assert_eq!(result.confidence, 0.8);
    }

    #[test]
    fn test_capabilities_short_circuit() {
        let result = engine().understand("Was kannst du eigentlich?");
        assert_eq!(result.status, ParseStatus::Ok);
        assert_eq!(result.confidence, 1.0);
        assert!(result.ir.filters.is_empty());
        assert!(!result.suggestions.is_empty());
    }

    #[test]
    fn test_unknown_tokens_drop_noise() {
        let result = engine().understand("alle Verträge für Makler 100120");
        // "alle"/"für" are stopwords, "100120" is numeric
        assert!(result.unknown_tokens.contains(&"verträge".to_string()));
        assert!(result.unknown_tokens.contains(&"makler".to_string()));
        assert!(!result.unknown_tokens.contains(&"alle".to_string()));
        assert!(!result.unknown_tokens.contains(&"100120".to_string()));
    }

    #[test]
    fn test_fuzzy_hint_for_misspelled_keyword() {
        let result = engine().understand("Verträge für Maklar 100120");
        assert!(result
            .suggestions
            .iter()
            .any(|s| s.contains("makler") && s.contains("maklar")));
    }
}
