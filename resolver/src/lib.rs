//! Resolves free-text diagnosis strings to SNOMED CT concepts.
//!
//! [`ResolutionEngine`] owns the concept cache and drives the cascade over a
//! [`TerminologyService`] and a [`Disambiguator`]. The batch enricher and the web backend both
//! build one through [`build_engine`] and only ever call [`ResolutionEngine::resolve`].

pub mod cache;
mod common;
pub mod config;
pub mod constants;
pub mod disambiguator;
pub mod engine;
pub mod normalize;
pub mod segment;
pub mod snowstorm;
pub mod terminology;
pub mod validation;

#[cfg(test)]
mod fakes;

use anyhow::{Context, Result};

pub use cache::ConceptCache;
pub use config::{ResolverArgs, ResolverConfig};
pub use disambiguator::{CommandDisambiguator, Disambiguator};
pub use engine::{Resolution, ResolutionEngine, RetrievalMethod, TermResolution};
pub use segment::Segmenter;
pub use snowstorm::SnowstormClient;
pub use terminology::TerminologyService;
pub use validation::{MismatchReason, ValidationRecord};

pub type DefaultEngine = ResolutionEngine<SnowstormClient, CommandDisambiguator>;

pub fn build_engine(config: &ResolverConfig) -> Result<DefaultEngine> {
    let terminology = SnowstormClient::new(config.terminology.clone())?;
    let disambiguator = CommandDisambiguator::new(config.disambiguator.clone());
    let segmenter = match &config.lexicon_path {
        Some(path) => Segmenter::from_path(path)
            .with_context(|| format!("Failed loading segmentation lexicon {}", path.display()))?,
        None => Segmenter::embedded(),
    };

    tracing::info!(
        snowstorm = %config.terminology.base_url,
        branch = %config.terminology.branch,
        llm = disambiguator.is_enabled(),
        rank_candidates = config.rank_candidates,
        lexicon_words = segmenter.len(),
        "resolution engine ready"
    );

    Ok(ResolutionEngine::new(terminology, disambiguator, segmenter)
        .with_candidate_choice(config.rank_candidates))
}
