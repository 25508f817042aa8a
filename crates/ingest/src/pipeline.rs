use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use billing_core::{ProviderKind, Source};
use billing_db::Db;
use chrono::NaiveDate;
use rayon::prelude::*;

use crate::archive::{extract_archive, is_archive};
use crate::downloader::{ReportDownloader, staging_dir_for};
use crate::manifest::{ManifestResolver, billing_range};
use crate::processor::{DEFAULT_BATCH_SIZE, ProcessorOptions, ReportProcessor};
use crate::rollup::{RollupCounts, update_aws_rollups, update_ocp_rollups};
use crate::store::{FsObjectStore, ObjectStore};
use crate::types::{DownloadedReport, IngestError, IngestIssue, IngestStats, ProcessedCounts, Result};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub staging_root: PathBuf,
    /// Billing months to ingest, any day within the month.
    pub months: Vec<NaiveDate>,
    /// Rollups never extend past this day.
    pub today: NaiveDate,
    pub batch_size: usize,
    pub cancel: Arc<AtomicBool>,
}

impl RunOptions {
    /// The current and previous billing month.
    pub fn new(staging_root: impl Into<PathBuf>, today: NaiveDate) -> Self {
        Self {
            staging_root: staging_root.into(),
            months: ManifestResolver::recent_months(today, 2),
            today,
            batch_size: DEFAULT_BATCH_SIZE,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether an interrupt asked the run to stop between files.
    pub fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

/// Opens the delivery location of a source. Local archives are unpacked into
/// the source's staging directory first.
pub fn store_for_source(source: &Source, staging_root: &Path) -> Result<Box<dyn ObjectStore>> {
    match source.provider_kind {
        ProviderKind::Local => {
            let location = PathBuf::from(&source.billing_source);
            if is_archive(&location) {
                let dest = staging_dir_for(staging_root, source).join("source");
                extract_archive(&location, &dest)?;
                Ok(Box::new(FsObjectStore::with_location(
                    dest,
                    source.billing_source.clone(),
                )))
            } else {
                Ok(Box::new(FsObjectStore::new(location)))
            }
        }
        ProviderKind::Ocp => Ok(Box::new(FsObjectStore::new(&source.billing_source))),
        ProviderKind::Aws => open_bucket(source),
    }
}

#[cfg(feature = "s3")]
fn open_bucket(source: &Source) -> Result<Box<dyn ObjectStore>> {
    let store = crate::s3::S3ObjectStore::from_env(&source.billing_source).map_err(|err| {
        IngestError::SourceUnavailable {
            location: source.billing_source.clone(),
            message: err.to_string(),
        }
    })?;
    Ok(Box::new(store))
}

#[cfg(not(feature = "s3"))]
fn open_bucket(source: &Source) -> Result<Box<dyn ObjectStore>> {
    Err(IngestError::SourceUnavailable {
        location: source.billing_source.clone(),
        message: "object storage support not enabled (build with the s3 feature)".to_string(),
    })
}

fn process_report(
    db: &mut Db,
    source: &Source,
    report: &DownloadedReport,
    batch_size: usize,
) -> Result<ProcessedCounts> {
    let mut options = ProcessorOptions::new(
        source.schema(),
        &report.local_path,
        report.compression,
        &source.provider_id,
    );
    options.batch_size = batch_size;
    if source.provider_kind.is_cluster_usage() {
        options.cluster_id = Some(source.cluster_id().to_string());
    }
    let mut processor = ReportProcessor::new(db, options)?;
    processor.process()
}

fn update_rollups(
    db: &mut Db,
    source: &Source,
    period_start: NaiveDate,
    today: NaiveDate,
) -> Result<RollupCounts> {
    let (start, next) = billing_range(period_start);
    let end = next.pred_opt().unwrap_or(start).min(today);
    if end < start {
        return Ok(RollupCounts::default());
    }
    match source.provider_kind {
        ProviderKind::Ocp => update_ocp_rollups(db, &source.provider_id, start, end),
        ProviderKind::Aws | ProviderKind::Local => {
            update_aws_rollups(db, &source.provider_id, start, end)
        }
    }
}

fn already_completed(db: &Db, report: &DownloadedReport, provider_id: &str) -> Result<bool> {
    if report.transferred {
        return Ok(false);
    }
    Ok(db
        .get_report_status(&report.file_name, provider_id)?
        .and_then(|state| state.last_completed_at)
        .is_some())
}

/// Runs fetch, ingest and rollups for one source over the configured months.
/// Per-file failures become issues; manifest and source failures abort.
pub fn run_source(
    db: &mut Db,
    store: &dyn ObjectStore,
    source: &Source,
    options: &RunOptions,
) -> Result<IngestStats> {
    let mut stats = IngestStats::default();
    let resolver = ManifestResolver::new(store, source);
    let downloader = ReportDownloader::new(store, &options.staging_root, source);

    'months: for month in &options.months {
        if options.cancelled() {
            stats.cancelled = true;
            break;
        }
        let Some(manifest) = resolver.resolve(*month)? else {
            continue;
        };
        stats.manifests_resolved += 1;
        let record = db.get_or_create_manifest(&source.provider_id, &manifest)?;
        downloader.download_manifest(&manifest)?;
        log::info!(
            "{} {}: manifest {} with {} files ({} processed)",
            source.provider_id,
            manifest.billing_period_start.format("%Y-%m"),
            manifest.assembly_id,
            record.num_total_files,
            record.num_processed_files
        );

        for key in &manifest.report_keys {
            if options.cancelled() {
                stats.cancelled = true;
                break 'months;
            }
            let report =
                match downloader.download_report(db, key, &manifest.assembly_id, Some(record.id)) {
                    Ok(report) => report,
                    Err(err @ IngestError::FileNotFound { .. }) => {
                        log::warn!("{err}");
                        stats.files_skipped += 1;
                        stats.issues.push(IngestIssue {
                            file_path: key.clone(),
                            message: err.to_string(),
                        });
                        continue;
                    }
                    Err(err) => return Err(err),
                };
            if report.transferred {
                stats.files_fetched += 1;
            } else {
                stats.files_reused += 1;
            }

            if already_completed(db, &report, &source.provider_id)? {
                log::debug!("{} already processed", report.file_name);
                stats.files_skipped += 1;
                continue;
            }

            match process_report(db, source, &report, options.batch_size) {
                Ok(counts) => {
                    stats.rows.merge(&counts);
                    stats.files_processed += 1;
                    db.mark_report_completed(&report.file_name, &source.provider_id)?;
                    db.mark_manifest_file_processed(record.id, &report.file_name)?;
                }
                Err(err) if err.is_file_scoped() => {
                    log::warn!("skipping {}: {}", report.local_path.display(), err);
                    stats.files_skipped += 1;
                    stats.issues.push(IngestIssue {
                        file_path: report.local_path.to_string_lossy().to_string(),
                        message: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        let removed = ReportProcessor::remove_temp_files(
            downloader.staging_dir(),
            &manifest.assembly_id,
        )?;
        if !removed.is_empty() {
            log::info!("removed {} stale staged files", removed.len());
        }

        let rollups = update_rollups(db, source, manifest.billing_period_start, options.today)?;
        stats.daily_rows += rollups.daily_rows;
        stats.summary_rows += rollups.summary_rows;
    }

    Ok(stats)
}

/// Result of one source in a multi-source run.
#[derive(Debug)]
pub struct SourceOutcome {
    pub provider_id: String,
    pub schema: String,
    pub result: Result<IngestStats>,
}

/// Runs every source in parallel, each against its own tenant database under
/// `data_dir`.
pub fn run_sources<F>(
    data_dir: &Path,
    sources: &[Source],
    options: &RunOptions,
    open_store: F,
) -> Vec<SourceOutcome>
where
    F: Fn(&Source, &Path) -> Result<Box<dyn ObjectStore>> + Sync,
{
    sources
        .par_iter()
        .map(|source| {
            let schema = source.schema();
            let result = Db::open_tenant(data_dir, &schema)
                .map_err(IngestError::from)
                .and_then(|mut db| {
                    let store = open_store(source, &options.staging_root)?;
                    run_source(&mut db, store.as_ref(), source, options)
                });
            if let Err(err) = &result {
                log::error!("source {} ({}) failed: {}", source.provider_id, schema, err);
            }
            SourceOutcome {
                provider_id: source.provider_id.clone(),
                schema,
                result,
            }
        })
        .collect()
}
