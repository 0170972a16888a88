//! The resolution cascade.
//!
//! Each sub-term walks the steps below in order and stops at the first one that yields an id:
//!
//! 1. exact cache lookup
//! 2. terminology search on the term
//! 3. search on the term with all whitespace removed
//! 4. search on the compound-segmented form of step 3
//! 5. partial cache lookup
//! 6. language-model normalisation, each suggestion re-searched
//!
//! With candidate choice enabled, the model is first asked to pick among the synonyms that
//! steps 2-4 collected, after step 5 and before step 6.
//!
//! Successful searches write the term and every synonym of the resolved concept into the
//! cache, so later sub-terms and later requests can stop at step 1.

use serde::Serialize;
use std::fmt;

use crate::{
    cache::{ConceptCache, cache_key},
    disambiguator::{Disambiguator, ParsedAnswer, choice_prompt, normalization_prompt, parse_answer},
    normalize::{DiagnosticTerm, collapse_whitespace},
    segment::Segmenter,
    terminology::{SearchOutcome, SynonymCandidate, TerminologyService, search_by_text},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetrievalMethod {
    Cache,
    SnomedExact,
    SnomedNormalized,
    SnomedSegmented,
    CachePartial,
    LlmAssisted,
    NotFound,
}

impl RetrievalMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            RetrievalMethod::Cache => "cache",
            RetrievalMethod::SnomedExact => "snomed-exact",
            RetrievalMethod::SnomedNormalized => "snomed-normalized",
            RetrievalMethod::SnomedSegmented => "snomed-segmented",
            RetrievalMethod::CachePartial => "cache-partial",
            RetrievalMethod::LlmAssisted => "llm-assisted",
            RetrievalMethod::NotFound => "not-found",
        }
    }
}

impl fmt::Display for RetrievalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome for one sub-term. `concept_id` may be a `", "`-joined list after the language
/// model step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermResolution {
    pub term: String,
    pub concept_id: Option<String>,
    pub method: RetrievalMethod,
}

impl TermResolution {
    fn found(term: &str, concept_id: impl Into<String>, method: RetrievalMethod) -> Self {
        Self {
            term: term.to_string(),
            concept_id: Some(concept_id.into()),
            method,
        }
    }

    fn not_found(term: &str) -> Self {
        Self {
            term: term.to_string(),
            concept_id: None,
            method: RetrievalMethod::NotFound,
        }
    }

    pub fn is_found(&self) -> bool {
        self.concept_id.is_some()
    }

    pub fn concept_ids(&self) -> Vec<&str> {
        self.concept_id
            .as_deref()
            .map(split_concept_ids)
            .unwrap_or_default()
    }
}

pub fn split_concept_ids(joined: &str) -> Vec<&str> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .collect()
}

/// Result for a whole diagnosis string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// First sub-term, or the whole input when it resolved without splitting.
    /// `None` only when nothing was left to resolve.
    pub primary: Option<TermResolution>,
    pub secondary: Vec<TermResolution>,
    /// The composite input resolved as a single concept.
    pub whole_composite: bool,
}

impl Resolution {
    pub fn primary_concept_id(&self) -> Option<&str> {
        self.primary.as_ref()?.concept_id.as_deref()
    }

    /// Ids of the resolved secondary sub-terms joined with `", "`.
    pub fn secondary_concept_ids(&self) -> String {
        self.secondary
            .iter()
            .filter_map(|r| r.concept_id.as_deref())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn terms(&self) -> impl Iterator<Item = &TermResolution> {
        self.primary.iter().chain(self.secondary.iter())
    }
}

pub struct ResolutionEngine<T, D> {
    terminology: T,
    disambiguator: D,
    segmenter: Segmenter,
    cache: ConceptCache,
    rank_candidates: bool,
}

impl<T, D> ResolutionEngine<T, D>
where
    T: TerminologyService,
    D: Disambiguator,
{
    pub fn new(terminology: T, disambiguator: D, segmenter: Segmenter) -> Self {
        Self {
            terminology,
            disambiguator,
            segmenter,
            cache: ConceptCache::new(),
            rank_candidates: false,
        }
    }

    pub fn with_cache(mut self, cache: ConceptCache) -> Self {
        self.cache = cache;
        self
    }

    /// Let the language model pick among search synonyms when no pass matched.
    pub fn with_candidate_choice(mut self, enabled: bool) -> Self {
        self.rank_candidates = enabled;
        self
    }

    pub fn cache(&self) -> &ConceptCache {
        &self.cache
    }

    pub fn terminology(&self) -> &T {
        &self.terminology
    }

    /// Resolves a raw diagnosis string. A composite string is first tried whole; when that
    /// fails each sub-term is resolved on its own, the first as primary.
    pub async fn resolve(&mut self, raw: &str) -> Resolution {
        let term = DiagnosticTerm::parse(raw);

        if term.is_composite() {
            if let Some(whole) = self.resolve_whole(term.normalized()).await {
                return Resolution {
                    primary: Some(whole),
                    secondary: Vec::new(),
                    whole_composite: true,
                };
            }
        }

        let mut resolved = Vec::with_capacity(term.sub_terms().len());
        for sub_term in term.sub_terms() {
            resolved.push(self.resolve_term(sub_term).await);
        }
        let mut resolved = resolved.into_iter();
        Resolution {
            primary: resolved.next(),
            secondary: resolved.collect(),
            whole_composite: false,
        }
    }

    /// Cache, then a single search on the whole string. Misses are not remembered, so the
    /// next request searches the whole string again.
    async fn resolve_whole(&mut self, input: &str) -> Option<TermResolution> {
        if let Some(concept_id) = self.cache.get(input) {
            return Some(TermResolution::found(
                input,
                concept_id,
                RetrievalMethod::Cache,
            ));
        }
        let concept_id = self.search_step(input, input, &mut Vec::new()).await?;
        Some(TermResolution::found(
            input,
            concept_id,
            RetrievalMethod::SnomedExact,
        ))
    }

    /// Runs the cascade for one sub-term.
    pub async fn resolve_term(&mut self, term: &str) -> TermResolution {
        let term = term.trim();
        if term.is_empty() {
            return TermResolution::not_found(term);
        }

        if let Some(concept_id) = self.cache.get(term) {
            tracing::debug!(term, concept_id, "cache hit");
            return TermResolution::found(term, concept_id, RetrievalMethod::Cache);
        }

        let mut candidates = Vec::new();
        if let Some(concept_id) = self.search_step(term, term, &mut candidates).await {
            return TermResolution::found(term, concept_id, RetrievalMethod::SnomedExact);
        }

        let lowered = term.to_lowercase();
        let collapsed = collapse_whitespace(&lowered);
        if collapsed != lowered {
            if let Some(concept_id) = self.search_step(term, &collapsed, &mut candidates).await {
                return TermResolution::found(term, concept_id, RetrievalMethod::SnomedNormalized);
            }
        }

        let segmented = self.segmenter.segment_compound(&collapsed);
        if segmented != collapsed && segmented != lowered {
            if let Some(concept_id) = self.search_step(term, &segmented, &mut candidates).await {
                return TermResolution::found(term, concept_id, RetrievalMethod::SnomedSegmented);
            }
        }

        if let Some(concept_id) = self.cache.find_partial(term) {
            tracing::debug!(term, concept_id, "partial cache hit");
            return TermResolution::found(term, concept_id, RetrievalMethod::CachePartial);
        }

        if let Some(concept_id) = self.choose_candidate(term, &candidates).await {
            self.record(term, &concept_id).await;
            return TermResolution::found(term, concept_id, RetrievalMethod::LlmAssisted);
        }

        if let Some(concept_ids) = self.normalize_with_model(term).await {
            return TermResolution::found(term, concept_ids, RetrievalMethod::LlmAssisted);
        }

        tracing::debug!(term, "no concept found");
        TermResolution::not_found(term)
    }

    /// Searches `query` and, on a hit, caches `key` plus the concept's synonyms. On a miss the
    /// synonyms seen in pass 2 are added to `candidates`, first occurrence kept.
    async fn search_step(
        &mut self,
        key: &str,
        query: &str,
        candidates: &mut Vec<SynonymCandidate>,
    ) -> Option<String> {
        match search_by_text(&self.terminology, query).await {
            SearchOutcome::Matched { concept_id, pass } => {
                tracing::debug!(query, concept_id, ?pass, "search matched");
                self.record(key, &concept_id).await;
                Some(concept_id)
            }
            SearchOutcome::Unmatched { candidates: seen } => {
                for candidate in seen {
                    if !candidates.iter().any(|c| c.term == candidate.term) {
                        candidates.push(candidate);
                    }
                }
                None
            }
        }
    }

    /// Lets the model pick one of the collected synonyms. Off unless candidate choice is enabled.
    async fn choose_candidate(
        &self,
        term: &str,
        candidates: &[SynonymCandidate],
    ) -> Option<String> {
        if !self.rank_candidates || candidates.is_empty() {
            return None;
        }
        let options: Vec<&str> = candidates.iter().map(|c| c.term.as_str()).collect();
        let reply = self
            .disambiguator
            .ask(&choice_prompt(term, &options))
            .await?;
        parse_answer(&reply).into_terms().into_iter().find_map(|answer| {
            let answer = answer.trim().to_lowercase();
            candidates
                .iter()
                .find(|c| c.term == answer)
                .map(|c| c.concept_id.clone())
        })
    }

    async fn record(&mut self, key: &str, concept_id: &str) {
        let synonyms = self.terminology.synonyms(concept_id).await;
        self.cache.record(key, concept_id, &synonyms);
    }

    /// Asks the model for the underlying condition terms, re-searches each, and caches the
    /// joined list of every id found.
    async fn normalize_with_model(&mut self, term: &str) -> Option<String> {
        let reply = self.disambiguator.ask(&normalization_prompt(term)).await?;
        let answers = match parse_answer(&reply) {
            ParsedAnswer::Terms(answers) => answers,
            ParsedAnswer::NoAnswer => {
                tracing::debug!(term, "language model had no answer");
                return None;
            }
            ParsedAnswer::Unparseable => {
                tracing::debug!(term, "language model reply could not be parsed");
                return None;
            }
        };

        let mut concept_ids: Vec<String> = Vec::new();
        for answer in &answers {
            let outcome = search_by_text(&self.terminology, answer).await;
            if let Some(concept_id) = outcome.concept_id() {
                if !concept_ids.iter().any(|id| id == concept_id) {
                    concept_ids.push(concept_id.to_string());
                }
            }
        }
        if concept_ids.is_empty() {
            tracing::debug!(term, ?answers, "no suggestion resolved");
            return None;
        }

        let joined = concept_ids.join(", ");
        let term_key = cache_key(term);
        self.cache.insert(term, &joined);
        for concept_id in &concept_ids {
            for synonym in self.terminology.synonyms(concept_id).await {
                if cache_key(&synonym) != term_key {
                    self.cache.insert(&synonym, concept_id);
                }
            }
        }
        Some(joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeDisambiguator, FakeTerminology};

    fn terminology() -> FakeTerminology {
        FakeTerminology::new()
            .with_concept(
                "73211009",
                "Diabetes mellitus (disorder)",
                true,
                &["Diabetes mellitus", "DM - Diabetes mellitus"],
            )
            .with_concept(
                "38341003",
                "Hypertensive disorder, systemic arterial (disorder)",
                true,
                &["Hypertensive disorder", "Hypertension", "High blood pressure"],
            )
            .with_concept(
                "95570007",
                "Kidney stone (disorder)",
                true,
                &["Kidney stone", "Renal calculus"],
            )
            .with_concept(
                "16932000",
                "Nausea and vomiting (disorder)",
                true,
                &["Nausea and vomiting"],
            )
            .with_search("diabetes mellitus", &["73211009"])
            .with_search("hypertension", &["38341003"])
            .with_search("kidney stone", &["95570007"])
            .with_search("sugar", &["73211009"])
            .with_search("nausea and vomiting", &["16932000"])
    }

    fn engine(
        terminology: FakeTerminology,
        disambiguator: FakeDisambiguator,
    ) -> ResolutionEngine<FakeTerminology, FakeDisambiguator> {
        ResolutionEngine::new(terminology, disambiguator, Segmenter::embedded())
    }

    #[test]
    fn method_tags() {
        assert_eq!(RetrievalMethod::SnomedSegmented.as_str(), "snomed-segmented");
        assert_eq!(RetrievalMethod::LlmAssisted.to_string(), "llm-assisted");
        assert_eq!(
            serde_json::to_string(&RetrievalMethod::NotFound).unwrap(),
            "\"not-found\""
        );
    }

    #[tokio::test]
    async fn cache_hit_makes_no_external_calls() {
        let mut cache = ConceptCache::new();
        cache.insert("asthma", "195967001");
        let mut engine = engine(terminology(), FakeDisambiguator::silent()).with_cache(cache);

        let result = engine.resolve_term("Asthma").await;

        assert_eq!(result.concept_id.as_deref(), Some("195967001"));
        assert_eq!(result.method, RetrievalMethod::Cache);
        assert!(engine.terminology().calls().is_empty());
    }

    #[tokio::test]
    async fn second_resolution_is_served_from_cache() {
        let mut engine = engine(terminology(), FakeDisambiguator::silent());

        let first = engine.resolve_term("Diabetes mellitus").await;
        let second = engine.resolve_term("diabetes mellitus").await;

        assert_eq!(first.method, RetrievalMethod::SnomedExact);
        assert_eq!(second.method, RetrievalMethod::Cache);
        assert_eq!(first.concept_id, second.concept_id);
        assert_eq!(engine.terminology().count("search:"), 1);
    }

    #[tokio::test]
    async fn exact_match_stops_the_cascade_and_caches_synonyms() {
        let disambiguator = FakeDisambiguator::always("['Hypertension']");
        let terminology = terminology().with_search("high blood pressure", &["38341003"]);
        let mut engine = engine(terminology, disambiguator);

        let result = engine.resolve_term("High blood pressure ").await;

        assert_eq!(result.concept_id.as_deref(), Some("38341003"));
        assert_eq!(result.method, RetrievalMethod::SnomedExact);
        assert_eq!(engine.terminology().count("search:"), 1);
        assert!(engine.disambiguator.prompts().is_empty());
        for synonym in ["high blood pressure", "hypertensive disorder", "hypertension"] {
            assert_eq!(engine.cache().get(synonym), result.concept_id.as_deref());
        }
    }

    #[tokio::test]
    async fn whitespace_collapsed_retry() {
        let mut engine = engine(terminology(), FakeDisambiguator::silent());

        let result = engine.resolve_term("Hyper tension").await;

        assert_eq!(result.concept_id.as_deref(), Some("38341003"));
        assert_eq!(result.method, RetrievalMethod::SnomedNormalized);
        assert_eq!(
            engine.terminology().calls()[..2],
            ["search:Hyper tension", "search:hypertension"]
        );
        assert_eq!(engine.terminology().count("search:"), 2);
        assert_eq!(engine.cache().get("hyper tension"), Some("38341003"));
    }

    #[tokio::test]
    async fn segmented_retry_keeps_original_term_as_cache_key() {
        let mut engine = engine(terminology(), FakeDisambiguator::silent());

        let result = engine.resolve_term("kidneystones").await;

        assert_eq!(result.concept_id.as_deref(), Some("95570007"));
        assert_eq!(result.method, RetrievalMethod::SnomedSegmented);
        assert_eq!(engine.terminology().count("search:"), 2);
        assert_eq!(engine.cache().get("kidneystones"), Some("95570007"));
        assert_eq!(engine.cache().get("renal calculus"), Some("95570007"));
    }

    #[tokio::test]
    async fn partial_cache_match_before_language_model() {
        let mut cache = ConceptCache::new();
        cache.insert("chronic heart failure", "48447003");
        let disambiguator = FakeDisambiguator::always("['Heart failure']");
        let mut engine = engine(terminology(), disambiguator).with_cache(cache);

        let result = engine.resolve_term("failure").await;

        assert_eq!(result.concept_id.as_deref(), Some("48447003"));
        assert_eq!(result.method, RetrievalMethod::CachePartial);
        assert!(engine.disambiguator.prompts().is_empty());
        assert!(!engine.cache().contains("failure"));
    }

    #[tokio::test]
    async fn language_model_suggestions_are_searched_and_joined() {
        let disambiguator = FakeDisambiguator::replying(&["['Diabetes mellitus', 'Hypertension']"]);
        let mut engine = engine(terminology(), disambiguator);

        let result = engine.resolve_term("DM2 HTN").await;

        assert_eq!(result.method, RetrievalMethod::LlmAssisted);
        assert_eq!(result.concept_id.as_deref(), Some("73211009, 38341003"));
        assert_eq!(result.concept_ids(), ["73211009", "38341003"]);
        assert_eq!(engine.cache().get("dm2 htn"), Some("73211009, 38341003"));
        assert_eq!(engine.cache().get("hypertension"), Some("38341003"));
        assert_eq!(engine.cache().get("dm - diabetes mellitus"), Some("73211009"));

        let prompts = engine.disambiguator.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].ends_with("Diagnosis: 'DM2 HTN'"));
    }

    #[tokio::test]
    async fn model_answering_none_leaves_term_unresolved() {
        let mut engine = engine(terminology(), FakeDisambiguator::always("[None]"));

        let resolution = engine.resolve("zebra fever").await;

        let primary = resolution.primary.as_ref().unwrap();
        assert_eq!(primary.concept_id, None);
        assert_eq!(primary.method, RetrievalMethod::NotFound);
        assert_eq!(resolution.primary_concept_id(), None);
        assert!(engine.cache().is_empty());
    }

    #[tokio::test]
    async fn composite_input_splits_into_primary_and_secondary() {
        let disambiguator = FakeDisambiguator::replying(&["['Diabetes mellitus']"]);
        let mut engine = engine(terminology(), disambiguator);

        let resolution = engine.resolve("diabetis mellitus and hypertension").await;

        assert!(!resolution.whole_composite);
        let primary = resolution.primary.as_ref().unwrap();
        assert_eq!(primary.term, "diabetis mellitus");
        assert_eq!(primary.method, RetrievalMethod::LlmAssisted);
        assert_eq!(resolution.primary_concept_id(), Some("73211009"));
        assert_eq!(resolution.secondary.len(), 1);
        assert_eq!(resolution.secondary[0].term, "hypertension");
        assert_eq!(resolution.secondary[0].method, RetrievalMethod::SnomedExact);
        assert_eq!(resolution.secondary_concept_ids(), "38341003");
        assert_eq!(
            engine.terminology().calls()[0],
            "search:diabetis mellitus and hypertension"
        );
    }

    #[tokio::test]
    async fn composite_that_resolves_whole_is_not_split() {
        let mut engine = engine(terminology(), FakeDisambiguator::silent());

        let resolution = engine.resolve("Nausea and vomiting").await;

        assert!(resolution.whole_composite);
        assert_eq!(resolution.primary_concept_id(), Some("16932000"));
        assert!(resolution.secondary.is_empty());
        assert_eq!(engine.terminology().count("search:"), 1);
    }

    #[tokio::test]
    async fn failed_composite_is_searched_whole_again_on_the_next_request() {
        let mut engine = engine(terminology(), FakeDisambiguator::silent());

        let first = engine.resolve("Nausea and vomiting sickness").await;
        assert!(!first.whole_composite);

        engine.terminology().clear_calls();
        engine.resolve("Nausea and vomiting sickness").await;

        assert_eq!(
            engine.terminology().calls()[0],
            "search:Nausea and vomiting sickness"
        );
    }

    #[tokio::test]
    async fn composite_missed_during_an_outage_resolves_whole_once_the_server_answers() {
        let terminology = terminology().failing_searches(1);
        let mut engine = engine(terminology, FakeDisambiguator::silent());

        let first = engine.resolve("Nausea and vomiting").await;
        assert!(!first.whole_composite);

        let second = engine.resolve("Nausea and vomiting").await;
        assert!(second.whole_composite);
        assert_eq!(second.primary_concept_id(), Some("16932000"));
    }

    #[tokio::test]
    async fn candidate_choice_maps_answer_onto_collected_synonyms() {
        let disambiguator = FakeDisambiguator::replying(&["['Diabetes mellitus']"]);
        let mut engine = engine(terminology(), disambiguator).with_candidate_choice(true);

        let result = engine.resolve_term("sugar").await;

        assert_eq!(result.concept_id.as_deref(), Some("73211009"));
        assert_eq!(result.method, RetrievalMethod::LlmAssisted);
        assert_eq!(engine.cache().get("sugar"), Some("73211009"));
        let prompts = engine.disambiguator.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].starts_with("Which of these terms is the closest in meaning to 'sugar'"));
    }

    #[tokio::test]
    async fn candidate_choice_waits_for_the_partial_cache_lookup() {
        let disambiguator = FakeDisambiguator::always("['Diabetes mellitus']");
        let mut cache = ConceptCache::new();
        cache.insert("sugar", "73211009");
        let terminology = terminology().with_search("cane sugar", &["73211009"]);
        let mut engine = engine(terminology, disambiguator)
            .with_cache(cache)
            .with_candidate_choice(true);

        let result = engine.resolve_term("cane sugar").await;

        assert_eq!(result.method, RetrievalMethod::CachePartial);
        assert!(engine.disambiguator.prompts().is_empty());
    }

    #[tokio::test]
    async fn candidate_choice_is_off_by_default() {
        let mut engine = engine(terminology(), FakeDisambiguator::silent());

        let result = engine.resolve_term("sugar").await;

        assert_eq!(result.method, RetrievalMethod::NotFound);
        let prompts = engine.disambiguator.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].starts_with("Only provide me the primary disease"));
    }

    #[tokio::test]
    async fn blank_input_has_no_primary() {
        let mut engine = engine(terminology(), FakeDisambiguator::silent());
        let resolution = engine.resolve(" -- ").await;
        assert!(resolution.primary.is_none());
        assert_eq!(resolution.secondary_concept_ids(), "");
        assert!(engine.terminology().calls().is_empty());
    }
}
