//! Term to concept id cache shared by every resolution in a process.
//!
//! Keys are trimmed, lowercased terms. Values are a single concept id, or a `", "`-joined
//! list when the language model step accepted several concepts for one term. Entries are
//! never removed. Re-inserting a key replaces its value but keeps its original position,
//! and every scan walks entries in that insertion order, so ties go to the oldest key.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct ConceptCache {
    entries: Vec<(String, String)>,
    positions: HashMap<String, usize>,
}

pub fn cache_key(term: &str) -> String {
    term.trim().to_lowercase()
}

impl ConceptCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a cache from entries in their original insertion order.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut cache = Self::new();
        for (term, concept_id) in entries {
            cache.insert(&term, &concept_id);
        }
        cache
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, term: &str) -> Option<&str> {
        let idx = *self.positions.get(&cache_key(term))?;
        Some(self.entries[idx].1.as_str())
    }

    pub fn contains(&self, term: &str) -> bool {
        self.positions.contains_key(&cache_key(term))
    }

    pub fn insert(&mut self, term: &str, concept_id: &str) {
        let key = cache_key(term);
        if key.is_empty() || concept_id.trim().is_empty() {
            return;
        }
        match self.positions.get(&key) {
            Some(&idx) => self.entries[idx].1 = concept_id.to_string(),
            None => {
                self.positions.insert(key.clone(), self.entries.len());
                self.entries.push((key, concept_id.to_string()));
            }
        }
    }

    /// Maps `term` and every synonym of the concept to `concept_id`.
    pub fn record(&mut self, term: &str, concept_id: &str, synonyms: &[String]) {
        self.insert(term, concept_id);
        for synonym in synonyms {
            self.insert(synonym, concept_id);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(term, concept_id)| (term.as_str(), concept_id.as_str()))
    }

    /// First entry whose key contains `term` as one of its whitespace-separated words.
    pub fn find_by_word(&self, term: &str) -> Option<&str> {
        let needle = cache_key(term);
        if needle.is_empty() {
            return None;
        }
        self.iter()
            .find(|(key, _)| key.split_whitespace().any(|word| word == needle))
            .map(|(_, concept_id)| concept_id)
    }

    /// First entry whose key equals `term` once whitespace is removed from both sides.
    pub fn find_by_collapsed(&self, term: &str) -> Option<&str> {
        let needle = collapse(&cache_key(term));
        if needle.is_empty() {
            return None;
        }
        self.iter()
            .find(|(key, _)| collapse(key) == needle)
            .map(|(_, concept_id)| concept_id)
    }

    /// Exact lookup of each word of `term`, in word order.
    pub fn find_by_any_word(&self, term: &str) -> Option<&str> {
        term.split_whitespace().find_map(|word| self.get(word))
    }

    pub fn find_partial(&self, term: &str) -> Option<&str> {
        self.find_by_word(term)
            .or_else(|| self.find_by_collapsed(term))
            .or_else(|| self.find_by_any_word(term))
    }
}

fn collapse(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}
