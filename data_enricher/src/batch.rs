use anyhow::{Context, Result};
use concept_resolver::{
    Disambiguator, Resolution, ResolutionEngine, TerminologyService, validation::validate,
};
use csv::WriterBuilder;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::{
    fs,
    path::Path,
    sync::atomic::{AtomicBool, Ordering},
};

use crate::{
    constants::{PRIMARY_NOT_FOUND, SECONDARY_NOT_FOUND},
    input::DiagnosisRow,
};

const OUTPUT_HEADER: [&str; 8] = [
    "hrgnum_diagnostic_code",
    "gdt_entry_date",
    "hrgstr_diagnostic_name",
    "correction_status",
    "concept_id_primary",
    "concept_id_secondary",
    "snomed_match",
    "mismatch_reason",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputRow {
    pub hrgnum_diagnostic_code: String,
    pub gdt_entry_date: String,
    pub hrgstr_diagnostic_name: String,
    pub correction_status: String,
    pub concept_id_primary: String,
    pub concept_id_secondary: String,
    pub snomed_match: String,
    pub mismatch_reason: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub skipped: usize,
    pub primary_not_found: usize,
    pub secondary_not_found: usize,
    pub matched: usize,
    pub mismatched: usize,
    pub interrupted: bool,
}

impl BatchSummary {
    fn message(&self) -> String {
        format!(
            "ok={} primary_not_found={} secondary_not_found={} match={} mismatch={}",
            self.processed - self.primary_not_found - self.secondary_not_found,
            self.primary_not_found,
            self.secondary_not_found,
            self.matched,
            self.mismatched
        )
    }
}

pub struct BatchOutcome {
    pub rows: Vec<OutputRow>,
    pub summary: BatchSummary,
}

/// `primary-not-found`, else `secondary-not-found`, else the primary's retrieval method.
pub fn correction_status(resolution: &Resolution) -> &'static str {
    match &resolution.primary {
        Some(primary) if primary.is_found() => {
            if resolution.secondary.iter().any(|s| !s.is_found()) {
                SECONDARY_NOT_FOUND
            } else {
                primary.method.as_str()
            }
        }
        _ => PRIMARY_NOT_FOUND,
    }
}

/// Resolves and validates one row. `None` when the row has no diagnosis name.
pub async fn enrich_row<T, D>(
    engine: &mut ResolutionEngine<T, D>,
    row: &DiagnosisRow,
) -> Option<OutputRow>
where
    T: TerminologyService,
    D: Disambiguator,
{
    if row.name.trim().is_empty() {
        return None;
    }

    let resolution = engine.resolve(&row.name).await;
    let validation = validate(
        engine.terminology(),
        &row.code,
        resolution.primary_concept_id(),
    )
    .await;

    Some(OutputRow {
        hrgnum_diagnostic_code: row.code.clone(),
        gdt_entry_date: row.entry_date.clone(),
        hrgstr_diagnostic_name: row.name.clone(),
        correction_status: correction_status(&resolution).to_string(),
        concept_id_primary: resolution.primary_concept_id().unwrap_or_default().to_string(),
        concept_id_secondary: resolution.secondary_concept_ids(),
        snomed_match: validation
            .as_ref()
            .map(|v| v.match_flag().to_string())
            .unwrap_or_default(),
        mismatch_reason: validation
            .and_then(|v| v.reason)
            .map(|reason| reason.to_string())
            .unwrap_or_default(),
    })
}

/// Processes rows strictly in order, one at a time. Stops before the next row once
/// `shutdown_requested` is set.
pub async fn enrich_rows<T, D>(
    engine: &mut ResolutionEngine<T, D>,
    rows: &[DiagnosisRow],
    shutdown_requested: &AtomicBool,
) -> BatchOutcome
where
    T: TerminologyService,
    D: Disambiguator,
{
    let progress = ProgressBar::new(rows.len() as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [rows {elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    ) {
        progress.set_style(style.progress_chars("=> "));
    }
    progress.set_message("starting");

    let mut summary = BatchSummary::default();
    let mut out = Vec::with_capacity(rows.len());

    for row in rows {
        if shutdown_requested.load(Ordering::SeqCst) {
            summary.interrupted = true;
            break;
        }
        progress.inc(1);

        let Some(enriched) = enrich_row(engine, row).await else {
            summary.skipped += 1;
            continue;
        };

        summary.processed += 1;
        match enriched.correction_status.as_str() {
            PRIMARY_NOT_FOUND => summary.primary_not_found += 1,
            SECONDARY_NOT_FOUND => summary.secondary_not_found += 1,
            _ => {}
        }
        match enriched.snomed_match.as_str() {
            "YES" => summary.matched += 1,
            "NO" => summary.mismatched += 1,
            _ => {}
        }
        tracing::debug!(
            name = %row.name,
            status = %enriched.correction_status,
            primary = %enriched.concept_id_primary,
            "row enriched"
        );
        out.push(enriched);
        progress.set_message(summary.message());
    }

    let prefix = if summary.interrupted { "interrupted" } else { "done" };
    progress.finish_with_message(format!("{prefix}: {}", summary.message()));
    BatchOutcome { rows: out, summary }
}

pub fn write_output_csv(output_path: &Path, rows: &[OutputRow]) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed creating output directory {}", parent.display()))?;
    }

    let file_name = output_path
        .file_name()
        .and_then(|x| x.to_str())
        .unwrap_or("diagnoses-snomed.csv");
    let tmp_path = output_path.with_file_name(format!("{file_name}.tmp"));

    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_path(&tmp_path)
        .with_context(|| format!("Failed creating temp output CSV {}", tmp_path.display()))?;
    writer
        .write_record(OUTPUT_HEADER)
        .context("Failed writing output CSV header")?;
    for row in rows {
        writer
            .serialize(row)
            .context("Failed writing output CSV row")?;
    }
    writer.flush().context("Failed flushing output CSV writer")?;

    fs::rename(&tmp_path, output_path).with_context(|| {
        format!(
            "Failed moving temp output {} to {}",
            tmp_path.display(),
            output_path.display()
        )
    })?;
    Ok(())
}
