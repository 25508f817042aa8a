use std::io;
use std::path::PathBuf;

use billing_core::Compression;
use serde::Serialize;

/// Rows written by one processor run, per logical table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessedCounts {
    pub records_read: usize,
    pub duplicates_skipped: usize,
    pub bills: usize,
    pub cost_entries: usize,
    pub products: usize,
    pub pricing: usize,
    pub reservations: usize,
    pub aws_line_items: usize,
    pub report_periods: usize,
    pub reports: usize,
    pub ocp_usage_line_items: usize,
    pub ocp_storage_line_items: usize,
}

impl ProcessedCounts {
    pub fn line_items(&self) -> usize {
        self.aws_line_items + self.ocp_usage_line_items + self.ocp_storage_line_items
    }

    pub fn merge(&mut self, other: &ProcessedCounts) {
        self.records_read += other.records_read;
        self.duplicates_skipped += other.duplicates_skipped;
        self.bills += other.bills;
        self.cost_entries += other.cost_entries;
        self.products += other.products;
        self.pricing += other.pricing;
        self.reservations += other.reservations;
        self.aws_line_items += other.aws_line_items;
        self.report_periods += other.report_periods;
        self.reports += other.reports;
        self.ocp_usage_line_items += other.ocp_usage_line_items;
        self.ocp_storage_line_items += other.ocp_storage_line_items;
    }
}

/// A report file materialized in the staging area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedReport {
    pub key: String,
    pub file_name: String,
    pub local_path: PathBuf,
    pub compression: Compression,
    pub fingerprint: String,
    pub transferred: bool,
}

/// A month's manifest and report files staged side by side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketDownload {
    pub manifest_path: PathBuf,
    pub reports: Vec<DownloadedReport>,
}

/// Ingest summary returned after a source run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestStats {
    pub manifests_resolved: usize,
    pub files_fetched: usize,
    pub files_reused: usize,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub rows: ProcessedCounts,
    pub daily_rows: usize,
    pub summary_rows: usize,
    pub cancelled: bool,
    pub issues: Vec<IngestIssue>,
}

/// Non-fatal issues encountered during ingest.
#[derive(Debug, Clone, Serialize)]
pub struct IngestIssue {
    pub file_path: String,
    pub message: String,
}

/// Errors emitted by the ingest pipeline.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("malformed manifest {key}: {message}")]
    ManifestParse { key: String, message: String },
    #[error("source unavailable: {location}: {message}")]
    SourceUnavailable { location: String, message: String },
    #[error("Unable to find {key} in {location}")]
    FileNotFound { key: String, location: String },
    #[error("unrecognized report type: {path}")]
    UnrecognizedReportType { path: String },
    #[error("unsupported compression: {0}")]
    UnsupportedCompression(String),
    #[error("no report manifest published under {prefix:?} in {location}")]
    ReportNotFound { location: String, prefix: String },
    #[error("schema {requested} does not match tenant database {tenant}")]
    TenantMismatch { requested: String, tenant: String },
    #[error("{path}:{line}: column {column}: {message}")]
    Parse {
        path: String,
        line: u64,
        column: String,
        message: String,
    },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("db error: {0}")]
    Db(#[from] billing_db::DbError),
}

impl IngestError {
    /// Errors that only affect the file being processed.
    pub fn is_file_scoped(&self) -> bool {
        matches!(
            self,
            Self::FileNotFound { .. }
                | Self::UnrecognizedReportType { .. }
                | Self::UnsupportedCompression(_)
                | Self::Parse { .. }
                | Self::Io(_)
                | Self::Csv(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
