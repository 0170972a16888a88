pub const DEFAULT_SNOWSTORM_URL: &str = "http://localhost:8080";
pub const DEFAULT_BRANCH: &str = "MAIN";
/// SNOMED CT to ICD-10 extended map reference set.
pub const DEFAULT_CROSSMAP_REFSET: &str = "447562003";

pub const DEFAULT_LLM_COMMAND: &str = "ollama";
pub const DEFAULT_LLM_MODEL: &str = "llama3";

pub const SNOMED_SYSTEM_NAME: &str = "SNOMED CT";
pub const BROWSER_BASE_URL: &str = "https://browser.ihtsdotools.org/";
pub const DEFAULT_BROWSER_EDITION: &str = "MAIN/2024-08-01";

pub const USER_AGENT: &str = "snomed-concept-resolver/0.1";

pub const SNOWSTORM_API_DOC_URL: &str = "https://github.com/IHTSDO/snowstorm/blob/master/docs/using-the-api.md";

/// Semantic tags accepted as clinical diagnoses.
pub const CLINICAL_SEMANTIC_TAGS: [&str; 2] = ["(disorder)", "(finding)"];
