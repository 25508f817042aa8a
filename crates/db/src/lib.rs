use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::Connection;

mod error;
mod line_items;
mod manifests;
mod migrations;
mod parents;
mod report_status;
mod rollups;
mod types;

pub use error::{DbError, Result};
pub use types::{
    BillKey, CostEntryKey, ManifestRecord, PricingKey, ProductKey, ReportKey, ReportPeriodKey,
    ReportTable, ReservationKey,
};

pub const DEFAULT_SCHEMA: &str = "public";

pub struct Db {
    conn: Connection,
    schema: String,
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_schema(path, DEFAULT_SCHEMA)
    }

    /// Opens and migrates the database that holds one tenant's rows.
    pub fn open_tenant(root: impl AsRef<Path>, schema: &str) -> Result<Self> {
        let path = tenant_path(root, schema)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut db = Self::open_with_schema(&path, schema)?;
        db.migrate()?;
        Ok(db)
    }

    fn open_with_schema(path: impl AsRef<Path>, schema: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        conn.pragma_update(None, "cache_size", -20_000)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(30))?;
        Ok(Self {
            conn,
            schema: schema.to_string(),
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn count_rows(&self, table: ReportTable) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table.table_name()),
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

pub fn tenant_path(root: impl AsRef<Path>, schema: &str) -> Result<PathBuf> {
    if !is_valid_schema(schema) {
        return Err(DbError::InvalidSchema(schema.to_string()));
    }
    Ok(root.as_ref().join(format!("{schema}.sqlite")))
}

fn is_valid_schema(schema: &str) -> bool {
    !schema.is_empty()
        && schema
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}
