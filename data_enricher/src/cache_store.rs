use anyhow::{Context, Result};
use concept_resolver::ConceptCache;
use csv::Writer;
use rusqlite::{Connection, params};
use std::{fs, path::Path};

use crate::{common::delete_if_exists, constants::MAPPING_HEADER};

/// SQLite copy of the concept cache. Rows keep the in-memory insertion position so a reload
/// reproduces the same lookup order.
pub struct CacheStore {
    conn: Connection,
}

impl CacheStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed creating cache dir {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed opening cache DB {}", path.display()))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS concept_cache (
                term TEXT PRIMARY KEY,
                concept_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                updated_at_unix INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_concept_cache_position ON concept_cache(position);
            ",
        )
        .context("Failed initializing concept cache schema")?;
        Ok(Self { conn })
    }

    /// Deletes the database along with its WAL side files.
    pub fn reset(path: &Path) -> Result<()> {
        delete_if_exists(path)?;
        for suffix in ["-wal", "-shm"] {
            let mut side = path.as_os_str().to_owned();
            side.push(suffix);
            delete_if_exists(Path::new(&side))?;
        }
        Ok(())
    }

    pub fn load(&self) -> Result<ConceptCache> {
        let mut stmt = self
            .conn
            .prepare("SELECT term, concept_id FROM concept_cache ORDER BY position, term")
            .context("Failed preparing cache load query")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<usize, String>(0)?, row.get::<usize, String>(1)?)))
            .context("Failed querying cached concepts")?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.context("Failed reading cached concept row")?);
        }
        Ok(ConceptCache::from_entries(entries))
    }

    pub fn save(&mut self, cache: &ConceptCache) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .context("Failed starting cache save transaction")?;
        {
            let mut stmt = tx
                .prepare(
                    "
                    INSERT INTO concept_cache (term, concept_id, position, updated_at_unix)
                    VALUES (?1, ?2, ?3, strftime('%s', 'now'))
                    ON CONFLICT(term) DO UPDATE SET
                        position = excluded.position,
                        updated_at_unix = CASE
                            WHEN concept_cache.concept_id = excluded.concept_id
                                THEN concept_cache.updated_at_unix
                            ELSE excluded.updated_at_unix
                        END,
                        concept_id = excluded.concept_id
                    ",
                )
                .context("Failed preparing cache upsert statement")?;
            for (position, (term, concept_id)) in cache.iter().enumerate() {
                stmt.execute(params![term, concept_id, position as i64])
                    .with_context(|| format!("Failed saving cache entry for {term}"))?;
            }
        }
        tx.commit().context("Failed committing cache save")?;
        Ok(())
    }

    pub fn export_mapping_csv(&self, output_path: &Path) -> Result<usize> {
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!(
                    "Failed creating mapping parent directory {}",
                    parent.display()
                )
            })?;
        }

        let file_name = output_path
            .file_name()
            .and_then(|x| x.to_str())
            .unwrap_or("mapping_dictionary.csv");
        let tmp_path = output_path.with_file_name(format!("{file_name}.tmp"));

        let mut writer = Writer::from_path(&tmp_path).with_context(|| {
            format!("Failed creating temp mapping CSV {}", tmp_path.display())
        })?;
        writer
            .write_record(MAPPING_HEADER)
            .context("Failed writing mapping CSV header")?;

        let mut stmt = self
            .conn
            .prepare("SELECT term, concept_id FROM concept_cache ORDER BY position, term")
            .context("Failed preparing mapping export query")?;
        let mut rows = stmt.query([]).context("Failed querying mapping rows")?;

        let mut written = 0usize;
        while let Some(row) = rows.next().context("Failed iterating mapping rows")? {
            let term: String = row.get(0).context("Failed reading term")?;
            let concept_id: String = row.get(1).context("Failed reading concept_id")?;
            writer
                .write_record([term, concept_id])
                .context("Failed writing mapping row")?;
            written += 1;
        }
        writer.flush().context("Failed flushing mapping CSV writer")?;

        fs::rename(&tmp_path, output_path).with_context(|| {
            format!(
                "Failed moving temp mapping {} to {}",
                tmp_path.display(),
                output_path.display()
            )
        })?;
        Ok(written)
    }
}
