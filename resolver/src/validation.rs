//! Compares a legacy code supplied with the source row against the resolved primary concept.

use std::fmt;

use crate::{
    engine::split_concept_ids,
    terminology::{TerminologyService, semantic_tag},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MismatchReason {
    InactiveConcept,
    WrongSemanticType { semantic_tag: Option<String> },
    Other,
}

impl MismatchReason {
    pub fn tag(&self) -> &'static str {
        match self {
            MismatchReason::InactiveConcept => "inactive-concept",
            MismatchReason::WrongSemanticType { .. } => "wrong-semantic-type",
            MismatchReason::Other => "other",
        }
    }

    pub fn message(&self) -> String {
        match self {
            MismatchReason::InactiveConcept => "code points to an inactive concept".to_string(),
            MismatchReason::WrongSemanticType {
                semantic_tag: Some(tag),
            } => format!("code points to a {tag} concept"),
            MismatchReason::WrongSemanticType { semantic_tag: None } => {
                "code does not point to a disorder or finding concept".to_string()
            }
            MismatchReason::Other => "resolved concept differs from the supplied code".to_string(),
        }
    }
}

impl fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.tag(), self.message())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRecord {
    pub supplied_code: String,
    pub resolved_code: Option<String>,
    pub matched: bool,
    pub reason: Option<MismatchReason>,
}

impl ValidationRecord {
    pub fn match_flag(&self) -> &'static str {
        if self.matched { "YES" } else { "NO" }
    }
}

/// Trims the code and drops a trailing `.0` left by numeric spreadsheet columns.
pub fn normalize_code(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed.strip_suffix(".0").unwrap_or(trimmed).to_string()
}

/// Only non-zero, all-digit codes are compared.
pub fn is_checkable(code: &str) -> bool {
    !code.is_empty()
        && code.chars().all(|c| c.is_ascii_digit())
        && !code.chars().all(|c| c == '0')
}

/// `None` when the supplied code is not checkable. On a mismatch the supplied code is looked
/// up once and the first applicable reason is recorded: inactive, then non-clinical type.
pub async fn validate<S>(
    service: &S,
    supplied: &str,
    resolved_primary: Option<&str>,
) -> Option<ValidationRecord>
where
    S: TerminologyService + ?Sized,
{
    let code = normalize_code(supplied);
    if !is_checkable(&code) {
        return None;
    }

    let matched = resolved_primary
        .map(split_concept_ids)
        .is_some_and(|ids| ids.contains(&code.as_str()));
    let reason = if matched {
        None
    } else {
        Some(classify_mismatch(service, &code).await)
    };

    Some(ValidationRecord {
        supplied_code: code,
        resolved_code: resolved_primary.map(str::to_string),
        matched,
        reason,
    })
}

pub async fn classify_mismatch<S>(service: &S, code: &str) -> MismatchReason
where
    S: TerminologyService + ?Sized,
{
    let Some(concept) = service.fetch_concept(code).await else {
        tracing::debug!(code, "supplied code could not be looked up");
        return MismatchReason::Other;
    };
    if !concept.active {
        return MismatchReason::InactiveConcept;
    }
    if !concept.is_clinically_typed() {
        return MismatchReason::WrongSemanticType {
            semantic_tag: concept
                .fsn
                .as_deref()
                .and_then(semantic_tag)
                .map(str::to_string),
        };
    }
    MismatchReason::Other
}
