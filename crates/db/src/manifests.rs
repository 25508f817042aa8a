use billing_core::Manifest;
use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params};

use crate::Db;
use crate::error::Result;
use crate::types::ManifestRecord;

const MANIFEST_COLUMNS: &str =
    "id, provider_id, assembly_id, billing_period_start, num_total_files, num_processed_files";

impl Db {
    /// Records a resolved manifest, or returns the row already stored for the
    /// same (provider, assembly). Re-delivery refreshes the file total.
    pub fn get_or_create_manifest(
        &mut self,
        provider_id: &str,
        manifest: &Manifest,
    ) -> Result<ManifestRecord> {
        let now = Utc::now().to_rfc3339();
        let total = manifest.report_keys.len() as i64;
        let tx = self.conn.transaction()?;
        let inserted = tx.execute(
            r#"
            INSERT OR IGNORE INTO report_manifest (
              provider_id, assembly_id, billing_period_start, num_total_files,
              num_processed_files, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)
            "#,
            params![
                provider_id,
                manifest.assembly_id,
                manifest.billing_period_start,
                total,
                now
            ],
        )?;
        if inserted == 0 {
            tx.execute(
                r#"
                UPDATE report_manifest
                SET num_total_files = ?3, updated_at = ?4
                WHERE provider_id = ?1 AND assembly_id = ?2 AND num_total_files <> ?3
                "#,
                params![provider_id, manifest.assembly_id, total, now],
            )?;
        }
        let record = tx.query_row(
            &format!(
                "SELECT {MANIFEST_COLUMNS} FROM report_manifest WHERE provider_id = ?1 AND assembly_id = ?2"
            ),
            params![provider_id, manifest.assembly_id],
            map_manifest,
        )?;
        tx.commit()?;
        Ok(record)
    }

    pub fn get_manifest(
        &self,
        provider_id: &str,
        assembly_id: &str,
    ) -> Result<Option<ManifestRecord>> {
        let record = self
            .conn
            .query_row(
                &format!(
                    "SELECT {MANIFEST_COLUMNS} FROM report_manifest WHERE provider_id = ?1 AND assembly_id = ?2"
                ),
                params![provider_id, assembly_id],
                map_manifest,
            )
            .optional()?;
        Ok(record)
    }

    /// Counts `file_name` as processed for the manifest. A file already
    /// counted leaves the counter alone, and it never passes the total.
    pub fn mark_manifest_file_processed(
        &mut self,
        manifest_id: i64,
        file_name: &str,
    ) -> Result<Option<ManifestRecord>> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        let first_time = tx.execute(
            r#"
            INSERT OR IGNORE INTO report_manifest_file (manifest_id, file_name, processed_at)
            SELECT id, ?2, ?3 FROM report_manifest WHERE id = ?1
            "#,
            params![manifest_id, file_name, now],
        )?;
        if first_time > 0 {
            tx.execute(
                r#"
                UPDATE report_manifest
                SET num_processed_files = MIN(num_processed_files + 1, num_total_files),
                    updated_at = ?2
                WHERE id = ?1
                "#,
                params![manifest_id, now],
            )?;
        }
        let record = tx
            .query_row(
                &format!("SELECT {MANIFEST_COLUMNS} FROM report_manifest WHERE id = ?1"),
                params![manifest_id],
                map_manifest,
            )
            .optional()?;
        tx.commit()?;
        Ok(record)
    }
}

fn map_manifest(row: &Row<'_>) -> rusqlite::Result<ManifestRecord> {
    let total: i64 = row.get(4)?;
    let processed: i64 = row.get(5)?;
    Ok(ManifestRecord {
        id: row.get(0)?,
        provider_id: row.get(1)?,
        assembly_id: row.get(2)?,
        billing_period_start: row.get(3)?,
        num_total_files: total.max(0) as u32,
        num_processed_files: processed.max(0) as u32,
    })
}
