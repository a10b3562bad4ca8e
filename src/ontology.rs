//! Synonym resolution: free-text tokens and phrases to canonical field names.
//!
//! Resolution is total. A miss returns the lowercased input unchanged; whether
//! the resulting name means anything for a given template is decided by the
//! planner, not here.

use std::collections::HashMap;

/// Case-insensitive synonym table.
#[derive(Debug, Clone)]
pub struct Ontology {
    synonyms: HashMap<String, String>,
}

impl Ontology {
    pub fn new() -> Self {
        Self {
            synonyms: HashMap::new(),
        }
    }

    /// Register one synonym phrase. Keys are stored lowercased.
    pub fn with_synonym(mut self, phrase: &str, canonical: &str) -> Self {
        self.synonyms
            .insert(phrase.to_lowercase(), canonical.to_string());
        self
    }

    /// Resolve a token or phrase to its canonical field name.
    ///
    /// Unknown input passes through lowercased; there is no failure mode.
    pub fn resolve(&self, token: &str) -> String {
        let key = token.trim().to_lowercase();
        match self.synonyms.get(&key) {
            Some(canonical) => canonical.clone(),
            None => key,
        }
    }
}

impl Default for Ontology {
    /// German insurance reporting vocabulary.
    fn default() -> Self {
        let pairs = [
            // contract certificate number
            ("vsn", "vsn"),
            ("police", "vsn"),
            ("policennummer", "vsn"),
            ("versicherungsschein", "vsn"),
            ("versicherungsscheinnummer", "vsn"),
            // broker
            ("makler", "makler_nr"),
            ("maklernummer", "makler_nr"),
            ("makler nummer", "makler_nr"),
            ("vermittler", "makler_nr"),
            ("vermittlernummer", "makler_nr"),
            ("maklername", "makler_name"),
            ("makler name", "makler_name"),
            // policyholder company
            ("firma", "firma"),
            ("firmenname", "firma"),
            ("kunde", "firma"),
            ("versicherungsnehmer", "firma"),
            // country
            ("land", "land_code"),
            ("land code", "land_code"),
            ("landcode", "land_code"),
            ("staat", "land_code"),
            // contract dates
            ("beginn", "beginn"),
            ("anfang", "beginn"),
            ("vertragsbeginn", "beginn"),
            ("ablauf", "ablauf"),
            ("ende", "ablauf"),
            ("vertragsende", "ablauf"),
            // state codes
            ("status", "bearbeitungsstand"),
            ("bearbeitungsstand", "bearbeitungsstand"),
            ("vertragsstand", "vertragsstand"),
            // line of business, premium
            ("sparte", "sparte"),
            ("praemie", "praemie"),
            ("prämie", "praemie"),
            ("beitrag", "praemie"),
            // claims
            ("schaden", "schaden_nr"),
            ("schadennummer", "schaden_nr"),
            ("schadennr", "schaden_nr"),
            ("schadendatum", "schaden_datum"),
            ("schaden datum", "schaden_datum"),
            ("schadentag", "schaden_datum"),
            ("reserve", "reserve"),
            ("zahlung", "zahlung"),
        ];
        let mut ontology = Self::new();
        for (phrase, canonical) in pairs {
            ontology = ontology.with_synonym(phrase, canonical);
        }
        ontology
    }
}
