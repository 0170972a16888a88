//! Terminology service seam and the free-text search protocol built on it.
//!
//! Implementations only provide the three primitive lookups. Failures inside an implementation
//! are logged there and surface as `None` / empty results, never as errors.

use regex::Regex;
use std::{collections::HashSet, future::Future, sync::LazyLock};

use crate::constants::CLINICAL_SEMANTIC_TAGS;

static PARENTHETICAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(.*?\)").expect("parenthetical pattern compiles"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticType {
    Disorder,
    Finding,
    Other,
}

impl SemanticType {
    pub fn from_fsn(fsn: &str) -> Self {
        match semantic_tag(fsn) {
            Some("disorder") => SemanticType::Disorder,
            Some("finding") => SemanticType::Finding,
            _ => SemanticType::Other,
        }
    }
}

/// Concept details as returned by a concept lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConceptCandidate {
    pub concept_id: String,
    pub fsn: Option<String>,
    pub active: bool,
    pub semantic_type: SemanticType,
    /// Active description terms, the FSN included.
    pub synonyms: Vec<String>,
}

impl ConceptCandidate {
    pub fn is_clinically_typed(&self) -> bool {
        self.fsn.as_deref().is_some_and(is_clinical_fsn)
    }
}

/// One hit from a free-text search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchItem {
    pub concept_id: String,
    pub active: bool,
    pub fsn: Option<String>,
}

impl SearchItem {
    /// Active and typed as a disorder or finding.
    pub fn is_usable(&self) -> bool {
        self.active && self.fsn.as_deref().is_some_and(is_clinical_fsn)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crossmap {
    pub map_target: String,
    pub map_advice: Option<String>,
}

pub trait TerminologyService: Send + Sync {
    fn fetch_concept(
        &self,
        concept_id: &str,
    ) -> impl Future<Output = Option<ConceptCandidate>> + Send;

    fn search(&self, text: &str) -> impl Future<Output = Vec<SearchItem>> + Send;

    fn crossmap(&self, concept_id: &str) -> impl Future<Output = Option<Crossmap>> + Send;

    /// `None` when the concept could not be looked up.
    fn is_active(&self, concept_id: &str) -> impl Future<Output = Option<bool>> + Send {
        async move { self.fetch_concept(concept_id).await.map(|c| c.active) }
    }

    fn synonyms(&self, concept_id: &str) -> impl Future<Output = Vec<String>> + Send {
        async move {
            self.fetch_concept(concept_id)
                .await
                .map(|c| c.synonyms)
                .unwrap_or_default()
        }
    }

    /// `None` when the concept could not be looked up.
    fn is_clinically_typed(&self, concept_id: &str) -> impl Future<Output = Option<bool>> + Send {
        async move {
            self.fetch_concept(concept_id)
                .await
                .map(|c| c.is_clinically_typed())
        }
    }

    fn fully_specified_name(&self, concept_id: &str) -> impl Future<Output = Option<String>> + Send {
        async move { self.fetch_concept(concept_id).await.and_then(|c| c.fsn) }
    }
}

pub fn is_clinical_fsn(fsn: &str) -> bool {
    CLINICAL_SEMANTIC_TAGS.iter().any(|tag| fsn.contains(tag))
}

/// The trailing parenthesised qualifier of an FSN, e.g. `procedure`.
pub fn semantic_tag(fsn: &str) -> Option<&str> {
    let trimmed = fsn.trim_end();
    let body = trimmed.strip_suffix(')')?;
    let open = body.rfind('(')?;
    let tag = body[open + 1..].trim();
    (!tag.is_empty()).then_some(tag)
}

/// FSN with every parenthetical removed, lowercased and whitespace-normalised.
pub fn fsn_without_qualifier(fsn: &str) -> String {
    PARENTHETICAL
        .replace_all(fsn, "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPass {
    FullySpecifiedName,
    Synonym,
    Substring,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynonymCandidate {
    pub term: String,
    pub concept_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Matched { concept_id: String, pass: MatchPass },
    /// No pass matched. `candidates` holds the synonyms collected from usable hits, in
    /// collection order, each term mapped to the first concept it was seen on.
    Unmatched { candidates: Vec<SynonymCandidate> },
}

impl SearchOutcome {
    pub fn concept_id(&self) -> Option<&str> {
        match self {
            SearchOutcome::Matched { concept_id, .. } => Some(concept_id),
            SearchOutcome::Unmatched { .. } => None,
        }
    }
}

/// Searches `text` and picks a concept in three passes: exact FSN (qualifier stripped),
/// exact synonym, then `text` as a substring of a synonym. Only active disorder/finding hits
/// take part.
pub async fn search_by_text<S>(service: &S, text: &str) -> SearchOutcome
where
    S: TerminologyService + ?Sized,
{
    let query = text.trim().to_lowercase();
    if query.is_empty() {
        return SearchOutcome::Unmatched {
            candidates: Vec::new(),
        };
    }

    let items = service.search(text.trim()).await;
    let usable: Vec<&SearchItem> = items.iter().filter(|item| item.is_usable()).collect();
    tracing::debug!(
        query = %query,
        hits = items.len(),
        usable = usable.len(),
        "terminology search"
    );

    for item in &usable {
        let fsn_matches = item
            .fsn
            .as_deref()
            .is_some_and(|fsn| fsn_without_qualifier(fsn) == query);
        if fsn_matches {
            return SearchOutcome::Matched {
                concept_id: item.concept_id.clone(),
                pass: MatchPass::FullySpecifiedName,
            };
        }
    }

    let mut candidates = Vec::new();
    let mut seen = HashSet::new();
    for item in &usable {
        for synonym in service.synonyms(&item.concept_id).await {
            let term = synonym.trim().to_lowercase();
            if term == query {
                return SearchOutcome::Matched {
                    concept_id: item.concept_id.clone(),
                    pass: MatchPass::Synonym,
                };
            }
            if !term.is_empty() && seen.insert(term.clone()) {
                candidates.push(SynonymCandidate {
                    term,
                    concept_id: item.concept_id.clone(),
                });
            }
        }
    }

    if let Some(candidate) = candidates.iter().find(|c| c.term.contains(&query)) {
        return SearchOutcome::Matched {
            concept_id: candidate.concept_id.clone(),
            pass: MatchPass::Substring,
        };
    }

    SearchOutcome::Unmatched { candidates }
}
