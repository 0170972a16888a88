//! Runtime configuration for the resolver.
//!
//! Both binaries flatten [`ResolverArgs`] into their own clap parsers and turn it into a
//! [`ResolverConfig`] once at startup. The config is then passed into constructors explicitly.

use std::{path::PathBuf, time::Duration};

use crate::constants::{
    DEFAULT_BRANCH, DEFAULT_CROSSMAP_REFSET, DEFAULT_LLM_COMMAND, DEFAULT_LLM_MODEL,
    DEFAULT_SNOWSTORM_URL,
};

#[derive(Debug, Clone, clap::Args)]
pub struct ResolverArgs {
    /// Snowstorm terminology server base URL.
    #[arg(long, env = "SNOWSTORM_URL", default_value = DEFAULT_SNOWSTORM_URL)]
    pub snowstorm_url: String,

    /// Terminology branch used for concept, search and reference set lookups.
    #[arg(long, default_value = DEFAULT_BRANCH)]
    pub branch: String,

    /// Per-request timeout for terminology calls.
    #[arg(long, default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Max attempts per terminology request. Only transport errors and retryable
    /// statuses are retried; malformed responses never are.
    #[arg(long, default_value_t = 2)]
    pub max_retries: u32,

    /// Reference set used for the ICD-10 cross-map.
    #[arg(long, default_value = DEFAULT_CROSSMAP_REFSET)]
    pub crossmap_refset: String,

    /// Language model runner executable.
    #[arg(long, env = "RESOLVER_LLM_COMMAND", default_value = DEFAULT_LLM_COMMAND)]
    pub llm_command: String,

    /// Model name passed to the runner (`<command> run <model> -- <prompt>`).
    #[arg(long, env = "RESOLVER_LLM_MODEL", default_value = DEFAULT_LLM_MODEL)]
    pub llm_model: String,

    /// Timeout for a single language model invocation.
    #[arg(long, default_value_t = 120)]
    pub llm_timeout_secs: u64,

    /// Max attempts per language model invocation (spawn failures and timeouts only).
    #[arg(long, default_value_t = 2)]
    pub llm_max_retries: u32,

    /// Disable the language model fallback entirely.
    #[arg(long, default_value_t = false)]
    pub no_llm: bool,

    /// Ask the language model to choose among search candidates when no synonym matches.
    #[arg(long, default_value_t = false)]
    pub rank_candidates: bool,

    /// Unigram count file (`word<TAB>count`) for compound-word segmentation.
    /// Defaults to the embedded lexicon.
    #[arg(long)]
    pub lexicon_path: Option<PathBuf>,
}

impl ResolverArgs {
    pub fn into_config(self) -> ResolverConfig {
        ResolverConfig {
            terminology: TerminologyConfig {
                base_url: self.snowstorm_url,
                branch: self.branch,
                timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
                max_attempts: self.max_retries.max(1),
                crossmap_refset: self.crossmap_refset,
            },
            disambiguator: DisambiguatorConfig {
                enabled: !self.no_llm,
                command: self.llm_command,
                model: self.llm_model,
                timeout: Duration::from_secs(self.llm_timeout_secs.max(1)),
                max_attempts: self.llm_max_retries.max(1),
            },
            rank_candidates: self.rank_candidates,
            lexicon_path: self.lexicon_path,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TerminologyConfig {
    pub base_url: String,
    pub branch: String,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub crossmap_refset: String,
}

impl Default for TerminologyConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SNOWSTORM_URL.to_string(),
            branch: DEFAULT_BRANCH.to_string(),
            timeout: Duration::from_secs(30),
            max_attempts: 2,
            crossmap_refset: DEFAULT_CROSSMAP_REFSET.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DisambiguatorConfig {
    pub enabled: bool,
    pub command: String,
    pub model: String,
    pub timeout: Duration,
    pub max_attempts: u32,
}

impl Default for DisambiguatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: DEFAULT_LLM_COMMAND.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            timeout: Duration::from_secs(120),
            max_attempts: 2,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResolverConfig {
    pub terminology: TerminologyConfig,
    pub disambiguator: DisambiguatorConfig,
    pub rank_candidates: bool,
    pub lexicon_path: Option<PathBuf>,
}
