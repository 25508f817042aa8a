use std::collections::HashSet;
use std::fs;
use std::hash::Hash;
use std::path::{Path, PathBuf};

use billing_core::{
    AwsLineItem, Compression, OcpStorageLineItem, OcpUsageLineItem, ReportType,
};
use billing_db::{
    BillKey, CostEntryKey, Db, PricingKey, ProductKey, ReportKey, ReportPeriodKey, ReservationKey,
};

use crate::cache::ExistingRowCache;
use crate::parser::{
    AwsCurRecord, OcpStorageRecord, OcpUsageRecord, ReportReader, ReportRecord,
};
use crate::store::sha256_hex;
use crate::types::{IngestError, ProcessedCounts, Result};

pub const DEFAULT_BATCH_SIZE: usize = 2_000;

const KEY_SEPARATOR: char = '\u{1f}';

#[derive(Debug, Clone)]
pub struct ProcessorOptions {
    pub schema_name: String,
    pub report_path: PathBuf,
    pub compression: String,
    pub provider_id: String,
    pub cluster_id: Option<String>,
    pub batch_size: usize,
}

impl ProcessorOptions {
    pub fn new(
        schema_name: impl Into<String>,
        report_path: impl Into<PathBuf>,
        compression: Compression,
        provider_id: impl Into<String>,
    ) -> Self {
        Self {
            schema_name: schema_name.into(),
            report_path: report_path.into(),
            compression: compression.as_str().to_string(),
            provider_id: provider_id.into(),
            cluster_id: None,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Stable natural key for a CUR line item: a digest of the lowercased
/// provider-assigned identifiers, or of the usage tuple for reports that
/// predate line item ids.
pub fn aws_line_item_key(record: &AwsCurRecord) -> String {
    let raw = if record.line_item_id.is_empty() {
        [
            record.usage_start.format("%Y-%m-%dT%H:%M:%S").to_string(),
            record.usage_end.format("%Y-%m-%dT%H:%M:%S").to_string(),
            record.usage_account_id.clone(),
            record.line_item_type.clone(),
            record.product_code.clone(),
            record.usage_type.clone(),
            record.operation.clone(),
            record.availability_zone.clone(),
            record.resource_id.clone(),
        ]
        .join(&KEY_SEPARATOR.to_string())
    } else {
        format!(
            "{}{KEY_SEPARATOR}{}",
            record.line_item_id, record.time_interval
        )
    };
    sha256_hex(raw.to_lowercase().as_bytes())
}

#[derive(Default)]
struct ParentCaches {
    bills: ExistingRowCache<BillKey>,
    cost_entries: ExistingRowCache<CostEntryKey>,
    products: ExistingRowCache<ProductKey>,
    pricing: ExistingRowCache<PricingKey>,
    reservations: ExistingRowCache<ReservationKey>,
    report_periods: ExistingRowCache<ReportPeriodKey>,
    reports: ExistingRowCache<ReportKey>,
}

impl ParentCaches {
    fn load(db: &Db, provider_id: &str, report_type: ReportType) -> Result<Self> {
        let mut caches = Self::default();
        caches.refresh(db, provider_id, report_type)?;
        Ok(caches)
    }

    fn refresh(&mut self, db: &Db, provider_id: &str, report_type: ReportType) -> Result<()> {
        match report_type {
            ReportType::AwsCostUsage => {
                self.bills.refresh(db.existing_bills(provider_id)?);
                self.cost_entries
                    .refresh(db.existing_cost_entries(provider_id)?);
                self.products.refresh(db.existing_products()?);
                self.pricing.refresh(db.existing_pricing()?);
                self.reservations.refresh(db.existing_reservations()?);
            }
            ReportType::OcpCpuMemUsage | ReportType::OcpStorage => {
                self.report_periods
                    .refresh(db.existing_report_periods(provider_id)?);
                self.reports.refresh(db.existing_reports(provider_id)?);
            }
        }
        Ok(())
    }

    fn promote(&mut self) {
        self.bills.promote();
        self.cost_entries.promote();
        self.products.promote();
        self.pricing.promote();
        self.reservations.promote();
        self.report_periods.promote();
        self.reports.promote();
    }

    fn discard_pending(&mut self) -> usize {
        self.bills.discard_pending()
            + self.cost_entries.discard_pending()
            + self.products.discard_pending()
            + self.pricing.discard_pending()
            + self.reservations.discard_pending()
            + self.report_periods.discard_pending()
            + self.reports.discard_pending()
    }
}

#[derive(Default)]
struct StagedRows {
    aws: Vec<AwsLineItem>,
    ocp_usage: Vec<OcpUsageLineItem>,
    ocp_storage: Vec<OcpStorageLineItem>,
}

impl StagedRows {
    fn len(&self) -> usize {
        self.aws.len() + self.ocp_usage.len() + self.ocp_storage.len()
    }

    fn clear(&mut self) {
        self.aws.clear();
        self.ocp_usage.clear();
        self.ocp_storage.clear();
    }
}

fn resolve<K: Hash + Eq>(
    db: &mut Db,
    cache: &mut ExistingRowCache<K>,
    key: K,
    insert: fn(&mut Db, &K) -> billing_db::Result<(i64, bool)>,
    created: &mut usize,
) -> Result<i64> {
    if let Some(id) = cache.get(&key) {
        return Ok(id);
    }
    let (id, inserted) = insert(db, &key)?;
    if inserted {
        *created += 1;
    }
    cache.record_pending(key, id);
    Ok(id)
}

/// Loads one report file into the tenant database.
pub struct ReportProcessor<'a> {
    db: &'a mut Db,
    options: ProcessorOptions,
    compression: Compression,
    reader: ReportReader,
    cluster_id: String,
    caches: ParentCaches,
    staged: StagedRows,
    batch_keys: HashSet<String>,
    counts: ProcessedCounts,
}

impl<'a> ReportProcessor<'a> {
    pub fn new(db: &'a mut Db, options: ProcessorOptions) -> Result<Self> {
        let compression = Compression::parse(&options.compression)
            .ok_or_else(|| IngestError::UnsupportedCompression(options.compression.clone()))?;
        if options.schema_name != db.schema() {
            return Err(IngestError::TenantMismatch {
                requested: options.schema_name.clone(),
                tenant: db.schema().to_string(),
            });
        }
        let reader = ReportReader::open(&options.report_path, compression)?;
        let report_type = reader.report_type();
        let caches = ParentCaches::load(db, &options.provider_id, report_type)?;
        let cluster_id = options
            .cluster_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| options.provider_id.clone());
        Ok(Self {
            db,
            options,
            compression,
            reader,
            cluster_id,
            caches,
            staged: StagedRows::default(),
            batch_keys: HashSet::new(),
            counts: ProcessedCounts::default(),
        })
    }

    pub fn report_type(&self) -> ReportType {
        self.reader.report_type()
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Streams the remaining records into the database. Returns the rows
    /// written by this call.
    pub fn process(&mut self) -> Result<ProcessedCounts> {
        log::info!(
            "processing {} ({}, {}) for {}",
            self.options.report_path.display(),
            self.report_type(),
            self.compression,
            self.options.provider_id
        );
        let result = self.process_records();
        if let Err(err) = &result {
            let dropped = self.caches.discard_pending();
            log::warn!(
                "processing {} failed, dropped {} unconfirmed cache entries: {}",
                self.options.report_path.display(),
                dropped,
                err
            );
        }
        self.remove_processed_rows();
        result?;
        let counts = std::mem::take(&mut self.counts);
        log::info!(
            "processed {}: {} records, {} new line items, {} duplicates",
            self.options.report_path.display(),
            counts.records_read,
            counts.line_items(),
            counts.duplicates_skipped
        );
        Ok(counts)
    }

    fn process_records(&mut self) -> Result<()> {
        let batch_size = self.options.batch_size.max(1);
        while let Some(record) = self.reader.next_record()? {
            self.counts.records_read += 1;
            match record {
                ReportRecord::Aws(record) => self.stage_aws(record)?,
                ReportRecord::OcpUsage(record) => self.stage_ocp_usage(record)?,
                ReportRecord::OcpStorage(record) => self.stage_ocp_storage(record)?,
            }
            if self.staged.len() >= batch_size {
                self.flush()?;
            }
        }
        self.flush()
    }

    /// Drops buffered rows and in-batch keys.
    pub fn remove_processed_rows(&mut self) {
        self.staged.clear();
        self.batch_keys.clear();
    }

    pub fn buffered_rows(&self) -> usize {
        self.staged.len()
    }

    fn first_in_batch(&mut self, key: String) -> bool {
        if self.batch_keys.insert(key) {
            true
        } else {
            self.counts.duplicates_skipped += 1;
            false
        }
    }

    fn stage_aws(&mut self, record: AwsCurRecord) -> Result<()> {
        let bill_id = resolve(
            &mut *self.db,
            &mut self.caches.bills,
            BillKey {
                bill_type: record.bill_type.clone(),
                payer_account_id: record.payer_account_id.clone(),
                billing_period_start: record.billing_period_start,
                billing_period_end: record.billing_period_end,
                provider_id: self.options.provider_id.clone(),
            },
            Db::insert_or_get_bill,
            &mut self.counts.bills,
        )?;
        let cost_entry_id = resolve(
            &mut *self.db,
            &mut self.caches.cost_entries,
            CostEntryKey {
                bill_id,
                interval_start: record.usage_start,
                interval_end: record.usage_end,
            },
            Db::insert_or_get_cost_entry,
            &mut self.counts.cost_entries,
        )?;
        let product_id = if record.sku.is_empty() && record.product_name.is_empty() {
            None
        } else {
            Some(resolve(
                &mut *self.db,
                &mut self.caches.products,
                ProductKey {
                    sku: record.sku.clone(),
                    product_name: record.product_name.clone(),
                    product_family: record.product_family.clone(),
                    service_code: record.service_code.clone(),
                    region: record.region.clone(),
                    instance_type: record.instance_type.clone(),
                },
                Db::insert_or_get_product,
                &mut self.counts.products,
            )?)
        };
        let pricing_id = if record.pricing_term.is_empty() && record.pricing_unit.is_empty() {
            None
        } else {
            Some(resolve(
                &mut *self.db,
                &mut self.caches.pricing,
                PricingKey {
                    term: record.pricing_term.clone(),
                    unit: record.pricing_unit.clone(),
                },
                Db::insert_or_get_pricing,
                &mut self.counts.pricing,
            )?)
        };
        let reservation_id = if record.reservation_arn.is_empty() {
            None
        } else {
            Some(resolve(
                &mut *self.db,
                &mut self.caches.reservations,
                ReservationKey {
                    reservation_arn: record.reservation_arn.clone(),
                },
                Db::insert_or_get_reservation,
                &mut self.counts.reservations,
            )?)
        };

        let line_item_key = aws_line_item_key(&record);
        if !self.first_in_batch(format!("{bill_id}{KEY_SEPARATOR}{line_item_key}")) {
            return Ok(());
        }
        self.staged.aws.push(AwsLineItem {
            cost_entry_bill_id: bill_id,
            cost_entry_id,
            cost_entry_product_id: product_id,
            cost_entry_pricing_id: pricing_id,
            cost_entry_reservation_id: reservation_id,
            line_item_key,
            usage_start: record.usage_start,
            usage_end: record.usage_end,
            usage_account_id: record.usage_account_id,
            line_item_type: record.line_item_type,
            product_code: record.product_code,
            usage_type: record.usage_type,
            operation: record.operation,
            availability_zone: record.availability_zone,
            resource_id: record.resource_id,
            usage_amount: record.usage_amount,
            normalization_factor: record.normalization_factor,
            normalized_usage_amount: record.normalized_usage_amount,
            currency_code: record.currency_code,
            unblended_rate: record.unblended_rate,
            unblended_cost: record.unblended_cost,
            blended_rate: record.blended_rate,
            blended_cost: record.blended_cost,
            public_on_demand_cost: record.public_on_demand_cost,
            public_on_demand_rate: record.public_on_demand_rate,
            tax_type: record.tax_type,
            tags: record.tags,
        });
        Ok(())
    }

    fn resolve_report(&mut self, interval: &crate::parser::ReportInterval) -> Result<(i64, i64)> {
        let period_id = resolve(
            &mut *self.db,
            &mut self.caches.report_periods,
            ReportPeriodKey {
                cluster_id: self.cluster_id.clone(),
                report_period_start: interval.report_period_start,
                report_period_end: interval.report_period_end,
                provider_id: self.options.provider_id.clone(),
            },
            Db::insert_or_get_report_period,
            &mut self.counts.report_periods,
        )?;
        let report_id = resolve(
            &mut *self.db,
            &mut self.caches.reports,
            ReportKey {
                report_period_id: period_id,
                interval_start: interval.interval_start,
                interval_end: interval.interval_end,
            },
            Db::insert_or_get_report,
            &mut self.counts.reports,
        )?;
        Ok((period_id, report_id))
    }

    fn stage_ocp_usage(&mut self, record: OcpUsageRecord) -> Result<()> {
        let (period_id, report_id) = self.resolve_report(&record.interval)?;
        let key = [
            report_id.to_string(),
            record.namespace.clone(),
            record.pod.clone(),
            record.node.clone(),
        ]
        .join(&KEY_SEPARATOR.to_string());
        if !self.first_in_batch(key) {
            return Ok(());
        }
        self.staged.ocp_usage.push(OcpUsageLineItem {
            report_period_id: period_id,
            report_id,
            namespace: record.namespace,
            pod: record.pod,
            node: record.node,
            resource_id: record.resource_id,
            pod_usage_cpu_core_seconds: record.pod_usage_cpu_core_seconds,
            pod_request_cpu_core_seconds: record.pod_request_cpu_core_seconds,
            pod_limit_cpu_core_seconds: record.pod_limit_cpu_core_seconds,
            pod_usage_memory_byte_seconds: record.pod_usage_memory_byte_seconds,
            pod_request_memory_byte_seconds: record.pod_request_memory_byte_seconds,
            pod_limit_memory_byte_seconds: record.pod_limit_memory_byte_seconds,
            node_capacity_cpu_cores: record.node_capacity_cpu_cores,
            node_capacity_cpu_core_seconds: record.node_capacity_cpu_core_seconds,
            node_capacity_memory_bytes: record.node_capacity_memory_bytes,
            node_capacity_memory_byte_seconds: record.node_capacity_memory_byte_seconds,
            pod_labels: record.pod_labels,
        });
        Ok(())
    }

    fn stage_ocp_storage(&mut self, record: OcpStorageRecord) -> Result<()> {
        let (period_id, report_id) = self.resolve_report(&record.interval)?;
        let key = [
            report_id.to_string(),
            record.namespace.clone(),
            record.persistentvolumeclaim.clone(),
        ]
        .join(&KEY_SEPARATOR.to_string());
        if !self.first_in_batch(key) {
            return Ok(());
        }
        self.staged.ocp_storage.push(OcpStorageLineItem {
            report_period_id: period_id,
            report_id,
            namespace: record.namespace,
            pod: record.pod,
            persistentvolumeclaim: record.persistentvolumeclaim,
            persistentvolume: record.persistentvolume,
            storageclass: record.storageclass,
            persistentvolumeclaim_capacity_bytes: record.persistentvolumeclaim_capacity_bytes,
            persistentvolumeclaim_capacity_byte_seconds: record
                .persistentvolumeclaim_capacity_byte_seconds,
            volume_request_storage_byte_seconds: record.volume_request_storage_byte_seconds,
            persistentvolumeclaim_usage_byte_seconds: record
                .persistentvolumeclaim_usage_byte_seconds,
            persistentvolume_labels: record.persistentvolume_labels,
            persistentvolumeclaim_labels: record.persistentvolumeclaim_labels,
        });
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let staged = self.staged.len();
        if staged > 0 {
            self.counts.aws_line_items += self.db.bulk_insert_aws_line_items(&self.staged.aws)?;
            self.counts.ocp_usage_line_items += self
                .db
                .bulk_insert_ocp_usage_line_items(&self.staged.ocp_usage)?;
            self.counts.ocp_storage_line_items += self
                .db
                .bulk_insert_ocp_storage_line_items(&self.staged.ocp_storage)?;
        }
        self.caches.promote();
        self.caches
            .refresh(&*self.db, &self.options.provider_id, self.reader.report_type())?;
        self.remove_processed_rows();
        log::debug!("flushed {} staged rows", staged);
        Ok(())
    }

    /// Deletes staged files in `dir` that belong to other assemblies.
    pub fn remove_temp_files(dir: &Path, assembly_id: &str) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        if !dir.is_dir() {
            return Ok(removed);
        }
        let current = format!("{assembly_id}-");
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(&current) && !name.ends_with(".part") {
                continue;
            }
            fs::remove_file(entry.path())?;
            log::debug!("removed stale staged file {}", entry.path().display());
            removed.push(entry.path());
        }
        removed.sort();
        Ok(removed)
    }
}
