//! Language-model fallback used once deterministic search is exhausted.
//!
//! The model only ever returns text. Whatever it answers is fed back through terminology
//! search before it can become a concept id.

use regex::Regex;
use std::{future::Future, process::Stdio, sync::LazyLock, time::Duration};
use tokio::process::Command;

use crate::{
    common::{next_backoff, truncate_for_log},
    config::DisambiguatorConfig,
};

static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]\n]*)\]").expect("bracket pattern compiles"));

pub trait Disambiguator: Send + Sync {
    /// Raw reply text, or `None` when the model could not be asked or said nothing.
    fn ask(&self, prompt: &str) -> impl Future<Output = Option<String>> + Send;
}

pub fn normalization_prompt(term: &str) -> String {
    format!(
        "Only provide me the primary disease or condition terms/expand medical abbreviations \
         without any conjunctions or descriptive qualifiers. If no corrections are needed, \
         return the input as a single term. Provide the corrected term in the format \
         ['corrected_term']. Diagnosis: '{term}'"
    )
}

pub fn choice_prompt<S: AsRef<str>>(term: &str, options: &[S]) -> String {
    let listed = options
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Which of these terms is the closest in meaning to '{term}': {listed}? \
         Provide the answer in the format ['closest term'] or ['None']."
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedAnswer {
    Terms(Vec<String>),
    /// The model explicitly answered none.
    NoAnswer,
    /// Neither a bracketed list nor bullet lines were found.
    Unparseable,
}

impl ParsedAnswer {
    pub fn into_terms(self) -> Vec<String> {
        match self {
            ParsedAnswer::Terms(terms) => terms,
            ParsedAnswer::NoAnswer | ParsedAnswer::Unparseable => Vec::new(),
        }
    }
}

fn strip_item(item: &str) -> &str {
    item.trim().trim_matches(|c| c == '\'' || c == '"').trim()
}

/// Reads the first `[...]` in `reply` as a comma-separated, quote-trimmed list. Falls back to
/// lines starting with `*` or `•` when no brackets are present.
pub fn parse_answer(reply: &str) -> ParsedAnswer {
    if let Some(caps) = BRACKETED.captures(reply) {
        let inner = caps.get(1).map_or("", |m| m.as_str());
        if strip_item(inner).eq_ignore_ascii_case("none") {
            return ParsedAnswer::NoAnswer;
        }
        let terms: Vec<String> = inner
            .split(',')
            .map(strip_item)
            .filter(|t| !t.is_empty())
            .map(ToOwned::to_owned)
            .collect();
        return if terms.is_empty() {
            ParsedAnswer::NoAnswer
        } else {
            ParsedAnswer::Terms(terms)
        };
    }

    let bullets: Vec<String> = reply
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('*') || line.starts_with('•'))
        .map(|line| line.trim_start_matches(['*', '•']).trim())
        .filter(|t| !t.is_empty())
        .map(ToOwned::to_owned)
        .collect();
    if bullets.is_empty() {
        ParsedAnswer::Unparseable
    } else {
        ParsedAnswer::Terms(bullets)
    }
}

/// Runs `<command> run <model> -- <prompt>` and captures stdout.
#[derive(Debug, Clone)]
pub struct CommandDisambiguator {
    config: DisambiguatorConfig,
}

impl CommandDisambiguator {
    pub fn new(config: DisambiguatorConfig) -> Self {
        Self { config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}

impl Disambiguator for CommandDisambiguator {
    async fn ask(&self, prompt: &str) -> Option<String> {
        if !self.config.enabled {
            return None;
        }

        let attempts = self.config.max_attempts.max(1);
        let mut backoff = Duration::from_secs(1);

        for attempt in 1..=attempts {
            let mut command = Command::new(&self.config.command);
            command
                .args(["run", self.config.model.as_str(), "--", prompt])
                .stdin(Stdio::null())
                .kill_on_drop(true);

            match tokio::time::timeout(self.config.timeout, command.output()).await {
                Ok(Ok(output)) if output.status.success() => {
                    let reply = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    tracing::debug!(reply = %truncate_for_log(&reply), "language model replied");
                    return (!reply.is_empty()).then_some(reply);
                }
                Ok(Ok(output)) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    tracing::warn!(
                        status = %output.status,
                        "Language model exited with failure: {}",
                        truncate_for_log(&stderr)
                    );
                    return None;
                }
                Ok(Err(err)) => {
                    tracing::warn!(
                        command = %self.config.command,
                        attempt,
                        "Failed starting language model: {err}"
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        attempt,
                        timeout_secs = self.config.timeout.as_secs(),
                        "Language model timed out"
                    );
                }
            }

            if attempt < attempts {
                tokio::time::sleep(backoff).await;
                backoff = next_backoff(backoff);
            }
        }

        None
    }
}
