mod args;
mod batch;
mod cache_store;
mod common;
mod constants;
mod input;

use anyhow::{Context, Result, bail};
use clap::Parser;
use concept_resolver::{build_engine, constants::SNOWSTORM_API_DOC_URL};
use std::sync::{Arc, atomic::AtomicBool};

use args::Args;
use batch::{enrich_rows, write_output_csv};
use cache_store::CacheStore;
use common::{default_output_path, install_ctrlc_handler, project_root};
use constants::{DEFAULT_CACHE_DB, DEFAULT_MAPPING_CSV};
use input::read_diagnosis_rows;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    println!("Terminology server: {}", args.resolver.snowstorm_url);
    println!("  - {}", SNOWSTORM_API_DOC_URL);

    let data_dir = project_root().join("data");
    let input_path = args.input_path.clone();
    if !input_path.exists() {
        bail!("Input file not found at {}", input_path.display());
    }
    let output_path = args
        .output_path
        .clone()
        .unwrap_or_else(|| default_output_path(&input_path));
    let cache_db = args
        .cache_db
        .clone()
        .unwrap_or_else(|| data_dir.join(DEFAULT_CACHE_DB));
    let mapping_csv = args
        .mapping_csv
        .clone()
        .unwrap_or_else(|| data_dir.join(DEFAULT_MAPPING_CSV));

    if args.reset_cache {
        CacheStore::reset(&cache_db)?;
        println!("Reset concept cache (deleted {}).", cache_db.display());
    }

    let mut store = CacheStore::open(&cache_db)?;
    let cache = store.load()?;
    println!(
        "Loaded {} cached terms from {}",
        cache.len(),
        cache_db.display()
    );

    let config = args.resolver.clone().into_config();
    let mut engine = build_engine(&config)
        .context("Failed building resolution engine")?
        .with_cache(cache);

    println!("Reading up to {} rows from {}", args.max_rows, input_path.display());
    let rows = read_diagnosis_rows(&input_path, args.max_rows)?;

    let shutdown_requested = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(Arc::clone(&shutdown_requested));

    let outcome = enrich_rows(&mut engine, &rows, &shutdown_requested).await;

    write_output_csv(&output_path, &outcome.rows)?;
    println!(
        "Wrote {} enriched rows to {}",
        outcome.rows.len(),
        output_path.display()
    );

    store.save(engine.cache())?;
    let exported = store.export_mapping_csv(&mapping_csv)?;
    println!(
        "Saved {} cached terms to {} and {}",
        exported,
        cache_db.display(),
        mapping_csv.display()
    );

    let summary = &outcome.summary;
    println!(
        "Summary: processed={} skipped={} primary_not_found={} secondary_not_found={} match={} mismatch={}",
        summary.processed,
        summary.skipped,
        summary.primary_not_found,
        summary.secondary_not_found,
        summary.matched,
        summary.mismatched
    );
    if summary.interrupted {
        println!("Stopped early after Ctrl-C; rerun to continue with the saved cache.");
    }
    Ok(())
}
