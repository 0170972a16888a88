use anyhow::{Context, Result, bail};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::constants::OUTPUT_SUFFIX;

pub fn delete_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).with_context(|| format!("Failed deleting {}", path.display()))?;
    }
    Ok(())
}

pub fn project_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or(manifest_dir)
}

pub fn default_output_path(input_path: &Path) -> PathBuf {
    let stem = input_path
        .file_stem()
        .and_then(|x| x.to_str())
        .unwrap_or("diagnoses");
    input_path.with_file_name(format!("{stem}-{OUTPUT_SUFFIX}.csv"))
}

pub fn sql_escape_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', "''")
}

pub fn source_expr(input_path: &Path) -> Result<String> {
    let escaped = sql_escape_path(input_path);
    let extension = input_path
        .extension()
        .and_then(|x| x.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match extension.as_str() {
        "parquet" => Ok(format!("read_parquet('{escaped}')")),
        "csv" => Ok(format!("read_csv_auto('{escaped}', header=true, all_varchar=true)")),
        _ => bail!(
            "Unsupported input extension for {}. Use .csv or .parquet",
            input_path.display()
        ),
    }
}

pub fn install_ctrlc_handler(shutdown_requested: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let was_set = shutdown_requested.swap(true, Ordering::SeqCst);
            if !was_set {
                eprintln!(
                    "\nReceived Ctrl-C. Finishing the current row, saving output and cache, then exiting..."
                );
            }
        }
    });
}
