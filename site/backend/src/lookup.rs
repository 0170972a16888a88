use concept_resolver::{
    Disambiguator, ResolutionEngine, RetrievalMethod, TerminologyService,
    constants::SNOMED_SYSTEM_NAME, snowstorm::browser_url,
};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRecord {
    pub term: String,
    pub system: &'static str,
    pub code: Option<String>,
    /// Fully specified name.
    pub display: Option<String>,
    pub retrieval_method: RetrievalMethod,
    pub url: Option<String>,
    pub icd10_code: Option<String>,
    pub map_advice: Option<String>,
}

impl ResultRecord {
    fn not_found(term: &str) -> Self {
        Self {
            term: term.to_string(),
            system: SNOMED_SYSTEM_NAME,
            code: None,
            display: None,
            retrieval_method: RetrievalMethod::NotFound,
            url: None,
            icd10_code: None,
            map_advice: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupResponse {
    pub results: Vec<ResultRecord>,
}

/// Resolves `term` and expands every resolved id into a record with its FSN, browser link and
/// ICD-10 cross-map.
pub async fn lookup<T, D>(
    engine: &mut ResolutionEngine<T, D>,
    term: &str,
    browser_edition: &str,
) -> LookupResponse
where
    T: TerminologyService,
    D: Disambiguator,
{
    let resolution = engine.resolve(term).await;
    let terminology = engine.terminology();

    let mut results = Vec::new();
    for resolved in resolution.terms() {
        let ids = resolved.concept_ids();
        if ids.is_empty() {
            results.push(ResultRecord::not_found(&resolved.term));
            continue;
        }
        for concept_id in ids {
            let display = terminology.fully_specified_name(concept_id).await;
            let crossmap = terminology.crossmap(concept_id).await;
            let (icd10_code, map_advice) = match crossmap {
                Some(map) => (Some(map.map_target), map.map_advice),
                None => (None, None),
            };
            results.push(ResultRecord {
                term: resolved.term.clone(),
                system: SNOMED_SYSTEM_NAME,
                code: Some(concept_id.to_string()),
                display,
                retrieval_method: resolved.method,
                url: Some(browser_url(concept_id, browser_edition)),
                icd10_code,
                map_advice,
            });
        }
    }

    LookupResponse { results }
}


#[cfg(test)]
mod tests {
    use super::*;

    const EDITION: &str = "MAIN/2024-08-01";

    #[tokio::test]
    async fn resolved_term_carries_display_link_and_crossmap() {
        let mut engine = stub::engine();

        let response = lookup(&mut engine, "Diabetes mellitus", EDITION).await;

        assert_eq!(response.results.len(), 1);
        let record = &response.results[0];
        assert_eq!(record.code.as_deref(), Some("73211009"));
        assert_eq!(record.display.as_deref(), Some("Diabetes mellitus (disorder)"));
        assert_eq!(record.retrieval_method, RetrievalMethod::SnomedExact);
        assert_eq!(record.icd10_code.as_deref(), Some("E14.9"));
        assert!(record.url.as_deref().unwrap().contains("conceptId1=73211009"));
    }

    #[tokio::test]
    async fn joined_ids_expand_to_one_record_each() {
        let mut engine = stub::engine();

        let response = lookup(&mut engine, "dm htn", EDITION).await;

        let codes: Vec<_> = response
            .results
            .iter()
            .map(|r| r.code.as_deref().unwrap())
            .collect();
        assert_eq!(codes, ["73211009", "38341003"]);
        assert!(
            response
                .results
                .iter()
                .all(|r| r.retrieval_method == RetrievalMethod::LlmAssisted && r.term == "dm htn")
        );
        assert_eq!(response.results[1].icd10_code, None);
    }

    #[tokio::test]
    async fn unresolved_sub_term_gets_an_empty_record() {
        let mut engine = stub::engine();

        let response = lookup(&mut engine, "hypertension and zzqx", EDITION).await;

        assert_eq!(response.results.len(), 2);
        assert_eq!(response.results[0].code.as_deref(), Some("38341003"));
        let missing = &response.results[1];
        assert_eq!(missing.term, "zzqx");
        assert_eq!(missing.code, None);
        assert_eq!(missing.url, None);
        assert_eq!(missing.retrieval_method, RetrievalMethod::NotFound);

        let json = serde_json::to_value(missing).unwrap();
        assert_eq!(json["system"], "SNOMED CT");
        assert_eq!(json["retrieval_method"], "not-found");
        assert!(json["icd10_code"].is_null());
    }
}
