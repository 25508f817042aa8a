mod archive;
mod cache;
mod downloader;
mod manifest;
mod parser;
mod pipeline;
mod processor;
mod rollup;
#[cfg(feature = "s3")]
mod s3;
mod store;
mod types;

pub use archive::{extract_archive, is_archive};
pub use cache::ExistingRowCache;
pub use downloader::{ReportDownloader, detect_compression, staging_dir_for};
pub use manifest::{
    ManifestResolver, assembly_id_from_key, billing_range, manifest_key, parse_manifest,
};
pub use parser::{
    AwsCurRecord, OcpStorageRecord, OcpUsageRecord, RawRecord, ReportInterval, ReportReader,
    ReportRecord, detect_report_type, open_report, parse_timestamp,
};
pub use pipeline::{RunOptions, SourceOutcome, run_source, run_sources, store_for_source};
pub use processor::{DEFAULT_BATCH_SIZE, ProcessorOptions, ReportProcessor, aws_line_item_key};
pub use rollup::{
    RollupCounts, aws_daily, aws_summary, ocp_storage_daily, ocp_storage_summary,
    ocp_usage_daily, ocp_usage_summary, update_aws_rollups, update_ocp_rollups,
};
#[cfg(feature = "s3")]
pub use s3::S3ObjectStore;
pub use store::{FsObjectStore, ObjectData, ObjectStore, StoreError};
pub use types::{
    BucketDownload, DownloadedReport, IngestError, IngestIssue, IngestStats, ProcessedCounts, Result,
};
