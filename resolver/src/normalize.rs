//! Cleaning and connective splitting of raw diagnosis strings.

use regex::Regex;
use std::sync::LazyLock;

static CONNECTIVES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\s*(?:\band\b|\bwith\b|,)\s*)+").expect("connective pattern compiles")
});

/// A diagnosis string as recorded in the source data, cleaned and split into sub-terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticTerm {
    normalized: String,
    sub_terms: Vec<String>,
}

impl DiagnosticTerm {
    pub fn parse(raw: &str) -> Self {
        let normalized = clean_leading(raw);
        let sub_terms = split_connectives(&normalized);
        Self {
            normalized,
            sub_terms,
        }
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn sub_terms(&self) -> &[String] {
        &self.sub_terms
    }

    /// True when connectives split the string into more than one sub-term.
    pub fn is_composite(&self) -> bool {
        self.sub_terms.len() > 1
    }
}

/// Trims the input and drops leading characters that are neither alphanumeric nor a comma.
pub fn clean_leading(raw: &str) -> String {
    raw.trim()
        .trim_start_matches(|c: char| !(c.is_alphanumeric() || c == ','))
        .trim_end()
        .to_string()
}

/// Splits on "and", "with" and commas. Empty pieces are dropped.
pub fn split_connectives(text: &str) -> Vec<String> {
    CONNECTIVES
        .split(text)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

pub fn collapse_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_and() {
        let term = DiagnosticTerm::parse("diabetis mellitus and hypertension");
        assert_eq!(term.sub_terms(), ["diabetis mellitus", "hypertension"]);
        assert!(term.is_composite());
    }

    #[test]
    fn splits_case_insensitively_on_with_and_commas() {
        assert_eq!(
            split_connectives("Anaemia WITH fever, Cough"),
            ["Anaemia", "fever", "Cough"]
        );
        assert_eq!(split_connectives("a and, with b"), ["a", "b"]);
    }

    #[test]
    fn connectives_inside_words_are_not_split() {
        assert_eq!(split_connectives("band keratopathy"), ["band keratopathy"]);
        assert_eq!(split_connectives("withdrawal"), ["withdrawal"]);
    }

    #[test]
    fn single_term_without_connectives() {
        let term = DiagnosticTerm::parse("  asthma ");
        assert_eq!(term.sub_terms(), ["asthma"]);
        assert!(!term.is_composite());
    }

    #[test]
    fn strips_leading_punctuation_but_keeps_commas() {
        assert_eq!(clean_leading("-- * Fever"), "Fever");
        assert_eq!(clean_leading(", fever"), ", fever");
        assert_eq!(clean_leading("...12 hour fever"), "12 hour fever");
    }

    #[test]
    fn leading_connective_leaves_no_empty_sub_term() {
        let term = DiagnosticTerm::parse(", fever");
        assert_eq!(term.normalized(), ", fever");
        assert_eq!(term.sub_terms(), ["fever"]);
        assert!(!term.is_composite());
    }

    #[test]
    fn empty_input_has_no_sub_terms() {
        let term = DiagnosticTerm::parse(" ?? ");
        assert_eq!(term.normalized(), "");
        assert!(term.sub_terms().is_empty());
    }

    #[test]
    fn collapses_all_whitespace() {
        assert_eq!(collapse_whitespace(" heart \t fail ure "), "heartfailure");
    }
}
