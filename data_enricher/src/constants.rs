pub const DEFAULT_CACHE_DB: &str = "cache/concept_cache.sqlite";
pub const DEFAULT_MAPPING_CSV: &str = "mappings/mapping_dictionary.csv";
pub const DEFAULT_MAX_ROWS: usize = 100;
pub const OUTPUT_SUFFIX: &str = "snomed";

pub const CODE_COLUMN: &str = "hrgnum_diagnostic_code";
pub const DATE_COLUMN: &str = "gdt_entry_date";
pub const NAME_COLUMN: &str = "hrgstr_diagnostic_name";

pub const MAPPING_HEADER: [&str; 2] = ["corrected_name", "snomed_concept_id"];

pub const PRIMARY_NOT_FOUND: &str = "primary-not-found";
pub const SECONDARY_NOT_FOUND: &str = "secondary-not-found";
