//! Dictionary-based compound word segmentation.
//!
//! Picks the most probable split of a run-together token under a unigram model: known words
//! score `count / total`, unknown words `10 / (total * 10^len)`, so long unknown fragments are
//! heavily penalised.

use anyhow::{Context, Result, bail};
use std::{collections::HashMap, fs, path::Path};

const EMBEDDED_LEXICON: &str = include_str!("../data/unigrams.txt");
const MAX_WORD_LEN: usize = 24;

#[derive(Debug, Clone)]
pub struct Segmenter {
    unigrams: HashMap<String, f64>,
    total: f64,
}

impl Segmenter {
    pub fn embedded() -> Self {
        Self::parse_lexicon(EMBEDDED_LEXICON)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed reading lexicon {}", path.display()))?;
        let segmenter = Self::parse_lexicon(&text);
        if segmenter.is_empty() {
            bail!("Lexicon {} has no `word<TAB>count` entries", path.display());
        }
        Ok(segmenter)
    }

    pub fn from_counts<I, S>(counts: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: AsRef<str>,
    {
        let mut unigrams: HashMap<String, f64> = HashMap::new();
        for (word, count) in counts {
            let word = word.as_ref().trim().to_lowercase();
            if word.is_empty() || count == 0 {
                continue;
            }
            *unigrams.entry(word).or_default() += count as f64;
        }
        let total = unigrams.values().sum::<f64>().max(1.0);
        Self { unigrams, total }
    }

    fn parse_lexicon(text: &str) -> Self {
        let counts = text.lines().filter_map(|line| {
            let mut fields = line.split_whitespace();
            let word = fields.next()?;
            let count = fields.next()?.parse::<u64>().ok()?;
            Some((word, count))
        });
        Self::from_counts(counts)
    }

    pub fn len(&self) -> usize {
        self.unigrams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unigrams.is_empty()
    }

    fn log_score(&self, word: &str, char_len: usize) -> f64 {
        match self.unigrams.get(word) {
            Some(count) => (count / self.total).log10(),
            None => 1.0 - self.total.log10() - char_len as f64,
        }
    }

    /// Most probable word sequence for `text` after lowercasing and dropping
    /// non-alphanumeric characters. Empty when nothing is left to segment.
    pub fn segment(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        let n = chars.len();
        if n == 0 {
            return Vec::new();
        }

        let mut best = vec![f64::NEG_INFINITY; n + 1];
        let mut back = vec![0usize; n + 1];
        best[0] = 0.0;

        for end in 1..=n {
            for start in end.saturating_sub(MAX_WORD_LEN)..end {
                let word: String = chars[start..end].iter().collect();
                let score = best[start] + self.log_score(&word, end - start);
                if score > best[end] {
                    best[end] = score;
                    back[end] = start;
                }
            }
        }

        let mut words: Vec<String> = Vec::new();
        let mut end = n;
        while end > 0 {
            let start = back[end];
            words.push(chars[start..end].iter().collect());
            end = start;
        }
        words.reverse();
        words
    }

    /// Splits a run-together token into words joined by single spaces, dropping a trailing
    /// bare "s" left over from plurals. Returns `token` unchanged when it does not split.
    pub fn segment_compound(&self, token: &str) -> String {
        let mut words = self.segment(token);
        if words.len() <= 1 {
            return token.to_string();
        }
        if words.last().is_some_and(|w| w == "s") {
            words.pop();
        }
        words.join(" ")
    }
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::embedded()
    }
}
