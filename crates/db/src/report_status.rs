use billing_core::ReportFileState;
use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use crate::Db;
use crate::error::Result;

impl Db {
    pub fn get_report_status(
        &self,
        file_name: &str,
        provider_id: &str,
    ) -> Result<Option<ReportFileState>> {
        let state = self
            .conn
            .query_row(
                r#"
                SELECT file_name, provider_id, fingerprint, manifest_id,
                       last_started_at, last_completed_at
                FROM report_status
                WHERE provider_id = ?1 AND file_name = ?2
                "#,
                params![provider_id, file_name],
                |row| {
                    Ok(ReportFileState {
                        file_name: row.get(0)?,
                        provider_id: row.get(1)?,
                        fingerprint: row.get(2)?,
                        manifest_id: row.get(3)?,
                        last_started_at: row.get(4)?,
                        last_completed_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(state)
    }

    pub fn get_fingerprint(&self, file_name: &str, provider_id: &str) -> Result<Option<String>> {
        let fingerprint: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT fingerprint FROM report_status WHERE provider_id = ?1 AND file_name = ?2",
                params![provider_id, file_name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(fingerprint.flatten())
    }

    /// Stores the fetched fingerprint and stamps the start of processing. A
    /// changed fingerprint clears the completion stamp.
    pub fn set_fingerprint(
        &mut self,
        file_name: &str,
        provider_id: &str,
        fingerprint: &str,
        manifest_id: Option<i64>,
    ) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO report_status (
              file_name, provider_id, fingerprint, manifest_id, last_started_at
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (provider_id, file_name) DO UPDATE SET
              fingerprint = excluded.fingerprint,
              manifest_id = COALESCE(excluded.manifest_id, report_status.manifest_id),
              last_started_at = excluded.last_started_at,
              last_completed_at = CASE
                WHEN report_status.fingerprint IS excluded.fingerprint
                THEN report_status.last_completed_at
              END
            "#,
            params![
                file_name,
                provider_id,
                fingerprint,
                manifest_id,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn mark_report_completed(&mut self, file_name: &str, provider_id: &str) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE report_status SET last_completed_at = ?3 WHERE provider_id = ?1 AND file_name = ?2",
            params![provider_id, file_name, Utc::now().to_rfc3339()],
        )?;
        Ok(updated > 0)
    }

    pub fn clear_report_status(&mut self, file_name: &str, provider_id: &str) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM report_status WHERE provider_id = ?1 AND file_name = ?2",
            params![provider_id, file_name],
        )?;
        Ok(removed > 0)
    }
}
