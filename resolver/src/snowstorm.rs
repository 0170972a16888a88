//! HTTP implementation of [`TerminologyService`] against a Snowstorm server.

use anyhow::{Context, Result, anyhow};
use reqwest::{Client, StatusCode, header::RETRY_AFTER};
use serde::{Deserialize, de::DeserializeOwned};
use std::time::Duration;

use crate::{
    common::{is_retryable_status, next_backoff, parse_retry_after, truncate_for_log},
    config::TerminologyConfig,
    constants::{BROWSER_BASE_URL, SNOWSTORM_API_DOC_URL, USER_AGENT},
    terminology::{ConceptCandidate, Crossmap, SearchItem, SemanticType, TerminologyService},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrowserConcept {
    #[serde(default)]
    active: bool,
    fsn: Option<TermField>,
    #[serde(default)]
    descriptions: Vec<Description>,
}

#[derive(Debug, Deserialize)]
struct TermField {
    #[serde(default)]
    term: String,
}

#[derive(Debug, Deserialize)]
struct Description {
    #[serde(default)]
    active: bool,
    #[serde(default)]
    term: String,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    items: Vec<SearchEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchEntry {
    concept_id: String,
    #[serde(default)]
    active: bool,
    fsn: Option<TermField>,
}

#[derive(Debug, Deserialize)]
struct MemberPage {
    #[serde(default)]
    items: Vec<Member>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Member {
    referenced_component_id: Option<String>,
    #[serde(default)]
    additional_fields: AdditionalFields,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdditionalFields {
    map_target: Option<String>,
    map_advice: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SnowstormClient {
    client: Client,
    config: TerminologyConfig,
}

impl SnowstormClient {
    pub fn new(config: TerminologyConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .context("Failed building Snowstorm HTTP client")?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &TerminologyConfig {
        &self.config
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn concept_url(&self, concept_id: &str) -> String {
        format!(
            "{}/browser/{}/concepts/{}",
            self.base_url(),
            self.config.branch,
            concept_id.trim()
        )
    }

    fn search_url(&self) -> String {
        format!("{}/{}/concepts", self.base_url(), self.config.branch)
    }

    fn members_url(&self) -> String {
        format!("{}/{}/members", self.base_url(), self.config.branch)
    }

    /// GETs `url` and decodes the JSON body. A 404 is `Ok(None)`. Transport errors and
    /// retryable statuses are retried with backoff; an undecodable body is not.
    async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>> {
        let attempts = self.config.max_attempts.max(1);
        let mut backoff = Duration::from_secs(1);

        for attempt in 1..=attempts {
            let response = self.client.get(url).query(query).send().await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let body = resp
                            .json::<T>()
                            .await
                            .with_context(|| format!("Invalid Snowstorm JSON from {url}"))?;
                        return Ok(Some(body));
                    }
                    if status == StatusCode::NOT_FOUND {
                        return Ok(None);
                    }

                    let retry_after = parse_retry_after(resp.headers().get(RETRY_AFTER));
                    let body = resp.text().await.unwrap_or_default();
                    if is_retryable_status(status) {
                        if attempt == attempts {
                            return Err(anyhow!(
                                "Snowstorm retryable status {} for {} after {} attempts. Body: {}",
                                status,
                                url,
                                attempts,
                                truncate_for_log(&body)
                            ));
                        }
                        tokio::time::sleep(retry_after.unwrap_or(backoff)).await;
                        backoff = next_backoff(backoff);
                        continue;
                    }

                    return Err(anyhow!(
                        "Snowstorm non-retryable status {} for {}. Body: {}",
                        status,
                        url,
                        truncate_for_log(&body)
                    ));
                }
                Err(err) => {
                    if attempt == attempts {
                        return Err(anyhow!(
                            "Snowstorm request failed for {url}: {err} (is the server running? see {SNOWSTORM_API_DOC_URL})"
                        ));
                    }
                    tracing::debug!(url, attempt, "Snowstorm request failed, retrying: {err}");
                    tokio::time::sleep(backoff).await;
                    backoff = next_backoff(backoff);
                }
            }
        }

        Err(anyhow!("Unexpected Snowstorm request flow for {url}"))
    }
}

impl TerminologyService for SnowstormClient {
    async fn fetch_concept(&self, concept_id: &str) -> Option<ConceptCandidate> {
        let url = self.concept_url(concept_id);
        match self.fetch_json::<BrowserConcept>(&url, &[]).await {
            Ok(Some(concept)) => Some(concept_from_browser(concept_id, concept)),
            Ok(None) => {
                tracing::debug!(concept_id, "concept not found");
                None
            }
            Err(err) => {
                tracing::warn!(concept_id, "Concept lookup failed: {err:#}");
                None
            }
        }
    }

    async fn search(&self, text: &str) -> Vec<SearchItem> {
        let url = self.search_url();
        match self.fetch_json::<SearchPage>(&url, &[("term", text)]).await {
            Ok(Some(page)) => search_items(page),
            Ok(None) => Vec::new(),
            Err(err) => {
                tracing::warn!(term = text, "Concept search failed: {err:#}");
                Vec::new()
            }
        }
    }

    async fn crossmap(&self, concept_id: &str) -> Option<Crossmap> {
        let url = self.members_url();
        let query = [
            ("referenceSet", self.config.crossmap_refset.as_str()),
            ("referencedComponentId", concept_id),
        ];
        match self.fetch_json::<MemberPage>(&url, &query).await {
            Ok(Some(page)) => crossmap_from_members(concept_id, page),
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(concept_id, "Cross-map lookup failed: {err:#}");
                None
            }
        }
    }
}

fn concept_from_browser(concept_id: &str, concept: BrowserConcept) -> ConceptCandidate {
    let fsn = concept
        .fsn
        .map(|f| f.term.trim().to_string())
        .filter(|term| !term.is_empty());
    let synonyms = concept
        .descriptions
        .into_iter()
        .filter(|d| d.active)
        .map(|d| d.term)
        .filter(|term| !term.trim().is_empty())
        .collect();
    ConceptCandidate {
        concept_id: concept_id.trim().to_string(),
        semantic_type: fsn
            .as_deref()
            .map(SemanticType::from_fsn)
            .unwrap_or(SemanticType::Other),
        fsn,
        active: concept.active,
        synonyms,
    }
}

fn search_items(page: SearchPage) -> Vec<SearchItem> {
    if page.total == 0 {
        return Vec::new();
    }
    page.items
        .into_iter()
        .map(|entry| SearchItem {
            concept_id: entry.concept_id,
            active: entry.active,
            fsn: entry.fsn.map(|f| f.term),
        })
        .collect()
}

/// First member row for `concept_id` that carries a map target.
fn crossmap_from_members(concept_id: &str, page: MemberPage) -> Option<Crossmap> {
    page.items
        .into_iter()
        .filter(|m| m.referenced_component_id.as_deref() == Some(concept_id))
        .find_map(|m| {
            let target = m
                .additional_fields
                .map_target
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())?;
            Some(Crossmap {
                map_target: target,
                map_advice: m
                    .additional_fields
                    .map_advice
                    .filter(|a| !a.trim().is_empty()),
            })
        })
}

/// Public SNOMED CT browser link for a concept.
pub fn browser_url(concept_id: &str, edition: &str) -> String {
    format!(
        "{BROWSER_BASE_URL}?perspective=full&conceptId1={}&edition={edition}&release=&languages=en",
        concept_id.trim()
    )
}
