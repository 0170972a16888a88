use clap::Parser;
use concept_resolver::ResolverArgs;
use std::path::PathBuf;

use crate::constants::DEFAULT_MAX_ROWS;

#[derive(Debug, Parser)]
#[command(name = "data_enricher")]
#[command(about = "Resolve diagnosis names to SNOMED CT concepts and check the codes recorded with them")]
pub struct Args {
    /// Diagnosis table (.csv or .parquet) with hrgnum_diagnostic_code, gdt_entry_date and
    /// hrgstr_diagnostic_name columns.
    #[arg(long)]
    pub input_path: PathBuf,

    /// Enriched CSV output path. Defaults to <input-stem>-snomed.csv next to the input.
    #[arg(long)]
    pub output_path: Option<PathBuf>,

    /// SQLite database holding the term -> concept cache between runs.
    /// Defaults to data/cache/concept_cache.sqlite.
    #[arg(long)]
    pub cache_db: Option<PathBuf>,

    /// Cache dump CSV (corrected_name, snomed_concept_id).
    /// Defaults to data/mappings/mapping_dictionary.csv.
    #[arg(long)]
    pub mapping_csv: Option<PathBuf>,

    /// Number of input rows to process, in input order.
    #[arg(long, default_value_t = DEFAULT_MAX_ROWS)]
    pub max_rows: usize,

    /// Start from an empty cache by deleting the cache database first.
    #[arg(long, default_value_t = false)]
    pub reset_cache: bool,

    #[command(flatten)]
    pub resolver: ResolverArgs,
}
