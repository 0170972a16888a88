//! In-memory terminology and language model stand-ins for unit tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};

use crate::{
    disambiguator::Disambiguator,
    terminology::{ConceptCandidate, Crossmap, SearchItem, SemanticType, TerminologyService},
};

#[derive(Debug, Default)]
pub struct FakeTerminology {
    concepts: HashMap<String, ConceptCandidate>,
    searches: HashMap<String, Vec<String>>,
    failing_searches: Mutex<usize>,
    calls: Mutex<Vec<String>>,
}

impl FakeTerminology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concept(mut self, id: &str, fsn: &str, active: bool, synonyms: &[&str]) -> Self {
        self.concepts.insert(
            id.to_string(),
            ConceptCandidate {
                concept_id: id.to_string(),
                fsn: Some(fsn.to_string()),
                active,
                semantic_type: SemanticType::from_fsn(fsn),
                synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }

    /// Search hits for `query`, compared case-insensitively after trimming.
    pub fn with_search(mut self, query: &str, ids: &[&str]) -> Self {
        self.searches.insert(
            query.trim().to_lowercase(),
            ids.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    /// The next `count` searches return nothing, as during a server outage.
    pub fn failing_searches(self, count: usize) -> Self {
        *self.failing_searches.lock().unwrap() = count;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl TerminologyService for FakeTerminology {
    async fn fetch_concept(&self, concept_id: &str) -> Option<ConceptCandidate> {
        self.log(format!("concept:{concept_id}"));
        self.concepts.get(concept_id).cloned()
    }

    async fn search(&self, text: &str) -> Vec<SearchItem> {
        self.log(format!("search:{text}"));
        {
            let mut failing = self.failing_searches.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Vec::new();
            }
        }
        let Some(ids) = self.searches.get(&text.trim().to_lowercase()) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| self.concepts.get(id))
            .map(|concept| SearchItem {
                concept_id: concept.concept_id.clone(),
                active: concept.active,
                fsn: concept.fsn.clone(),
            })
            .collect()
    }

    async fn crossmap(&self, concept_id: &str) -> Option<Crossmap> {
        self.log(format!("crossmap:{concept_id}"));
        None
    }
}

/// Replies from a queue, then falls back to a fixed reply (or no answer).
#[derive(Debug, Default)]
pub struct FakeDisambiguator {
    replies: Mutex<VecDeque<String>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl FakeDisambiguator {
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn replying(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            ..Self::default()
        }
    }

    pub fn always(reply: &str) -> Self {
        Self {
            fallback: Some(reply.to_string()),
            ..Self::default()
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Disambiguator for FakeDisambiguator {
    async fn ask(&self, prompt: &str) -> Option<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let queued = self.replies.lock().unwrap().pop_front();
        queued.or_else(|| self.fallback.clone())
    }
}
