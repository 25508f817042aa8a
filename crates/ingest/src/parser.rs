use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use billing_core::{Compression, LabelMap, ReportType, parse_label_string};
use chrono::{DateTime, NaiveDateTime};
use csv::StringRecord;
use flate2::read::GzDecoder;

use crate::types::{IngestError, Result};

const TAG_PREFIX: &str = "resourceTags/user:";

const AWS_REQUIRED: &[&str] = &[
    "bill/BillingPeriodStartDate",
    "bill/BillingPeriodEndDate",
    "lineItem/UsageStartDate",
    "lineItem/UsageEndDate",
    "lineItem/ProductCode",
];

const OCP_USAGE_REQUIRED: &[&str] = &[
    "report_period_start",
    "report_period_end",
    "interval_start",
    "interval_end",
    "namespace",
    "pod",
    "node",
    "pod_usage_cpu_core_seconds",
    "pod_usage_memory_byte_seconds",
];

const OCP_STORAGE_REQUIRED: &[&str] = &[
    "report_period_start",
    "report_period_end",
    "interval_start",
    "interval_end",
    "namespace",
    "pod",
    "persistentvolumeclaim",
    "persistentvolume",
    "persistentvolumeclaim_capacity_bytes",
];

pub fn open_report(path: &Path, compression: Compression) -> Result<Box<dyn Read + Send>> {
    let file = BufReader::new(File::open(path)?);
    Ok(match compression {
        Compression::Gzip => Box::new(BufReader::new(GzDecoder::new(file))),
        Compression::None => Box::new(file),
    })
}

pub fn detect_report_type<'a, I>(headers: I) -> Option<ReportType>
where
    I: IntoIterator<Item = &'a str>,
{
    let headers = headers.into_iter().collect::<Vec<_>>();
    let has_all = |required: &[&str]| required.iter().all(|col| headers.contains(col));
    if has_all(AWS_REQUIRED) {
        Some(ReportType::AwsCostUsage)
    } else if has_all(OCP_STORAGE_REQUIRED) {
        Some(ReportType::OcpStorage)
    } else if has_all(OCP_USAGE_REQUIRED) {
        Some(ReportType::OcpCpuMemUsage)
    } else {
        None
    }
}

/// Accepts the timestamp shapes seen in delivered reports: RFC 3339, CUR's
/// minute-precision `2018-09-01T00:00Z` and the cluster operator's
/// `2018-09-01 00:00:00 +0000 UTC`.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(value) = DateTime::parse_from_rfc3339(raw) {
        return Some(value.naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%MZ", "%Y-%m-%dT%H:%M:%SZ", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(value) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(value);
        }
    }
    let without_zone = raw.strip_suffix(" UTC").unwrap_or(raw);
    DateTime::parse_from_str(without_zone, "%Y-%m-%d %H:%M:%S %z")
        .ok()
        .map(|value| value.naive_utc())
}

struct HeaderIndex {
    path: String,
    columns: HashMap<String, usize>,
    tag_columns: Vec<(String, usize)>,
}

/// One record with access to its columns by header name.
pub struct RawRecord {
    index: Arc<HeaderIndex>,
    line: u64,
    values: StringRecord,
}

impl RawRecord {
    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn get(&self, column: &str) -> &str {
        self.index
            .columns
            .get(column)
            .and_then(|idx| self.values.get(*idx))
            .map(str::trim)
            .unwrap_or("")
    }

    fn error(&self, column: &str, message: String) -> IngestError {
        IngestError::Parse {
            path: self.index.path.clone(),
            line: self.line,
            column: column.to_string(),
            message,
        }
    }

    /// Blank cells read as zero; NaN and infinities are rejected.
    pub fn number(&self, column: &str) -> Result<f64> {
        let raw = self.get(column);
        if raw.is_empty() {
            return Ok(0.0);
        }
        let value = raw
            .parse::<f64>()
            .map_err(|err| self.error(column, format!("{raw:?}: {err}")))?;
        if !value.is_finite() {
            return Err(self.error(column, format!("{raw:?} is not a finite number")));
        }
        Ok(value)
    }

    pub fn timestamp(&self, column: &str) -> Result<NaiveDateTime> {
        let raw = self.get(column);
        parse_timestamp(raw).ok_or_else(|| self.error(column, format!("invalid timestamp {raw:?}")))
    }

    pub fn labels(&self, column: &str) -> LabelMap {
        parse_label_string(self.get(column))
    }

    pub fn tags(&self) -> LabelMap {
        let mut tags = LabelMap::new();
        for (name, idx) in &self.index.tag_columns {
            let value = self.values.get(*idx).map(str::trim).unwrap_or("");
            if !value.is_empty() {
                tags.insert(name.clone(), value.to_string());
            }
        }
        tags
    }

    fn text(&self, column: &str) -> String {
        self.get(column).to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AwsCurRecord {
    pub line_item_id: String,
    pub time_interval: String,
    pub bill_type: String,
    pub payer_account_id: String,
    pub billing_period_start: NaiveDateTime,
    pub billing_period_end: NaiveDateTime,
    pub usage_start: NaiveDateTime,
    pub usage_end: NaiveDateTime,
    pub usage_account_id: String,
    pub line_item_type: String,
    pub product_code: String,
    pub usage_type: String,
    pub operation: String,
    pub availability_zone: String,
    pub resource_id: String,
    pub usage_amount: f64,
    pub normalization_factor: f64,
    pub normalized_usage_amount: f64,
    pub currency_code: String,
    pub unblended_rate: f64,
    pub unblended_cost: f64,
    pub blended_rate: f64,
    pub blended_cost: f64,
    pub public_on_demand_cost: f64,
    pub public_on_demand_rate: f64,
    pub tax_type: String,
    pub sku: String,
    pub product_name: String,
    pub product_family: String,
    pub service_code: String,
    pub region: String,
    pub instance_type: String,
    pub pricing_term: String,
    pub pricing_unit: String,
    pub reservation_arn: String,
    pub tags: LabelMap,
}

impl AwsCurRecord {
    fn from_raw(raw: &RawRecord) -> Result<Self> {
        Ok(Self {
            line_item_id: raw.text("identity/LineItemId"),
            time_interval: raw.text("identity/TimeInterval"),
            bill_type: raw.text("bill/BillType"),
            payer_account_id: raw.text("bill/PayerAccountId"),
            billing_period_start: raw.timestamp("bill/BillingPeriodStartDate")?,
            billing_period_end: raw.timestamp("bill/BillingPeriodEndDate")?,
            usage_start: raw.timestamp("lineItem/UsageStartDate")?,
            usage_end: raw.timestamp("lineItem/UsageEndDate")?,
            usage_account_id: raw.text("lineItem/UsageAccountId"),
            line_item_type: raw.text("lineItem/LineItemType"),
            product_code: raw.text("lineItem/ProductCode"),
            usage_type: raw.text("lineItem/UsageType"),
            operation: raw.text("lineItem/Operation"),
            availability_zone: raw.text("lineItem/AvailabilityZone"),
            resource_id: raw.text("lineItem/ResourceId"),
            usage_amount: raw.number("lineItem/UsageAmount")?,
            normalization_factor: raw.number("lineItem/NormalizationFactor")?,
            normalized_usage_amount: raw.number("lineItem/NormalizedUsageAmount")?,
            currency_code: raw.text("lineItem/CurrencyCode"),
            unblended_rate: raw.number("lineItem/UnblendedRate")?,
            unblended_cost: raw.number("lineItem/UnblendedCost")?,
            blended_rate: raw.number("lineItem/BlendedRate")?,
            blended_cost: raw.number("lineItem/BlendedCost")?,
            public_on_demand_cost: raw.number("pricing/publicOnDemandCost")?,
            public_on_demand_rate: raw.number("pricing/publicOnDemandRate")?,
            tax_type: raw.text("lineItem/TaxType"),
            sku: raw.text("product/sku"),
            product_name: raw.text("product/ProductName"),
            product_family: raw.text("product/productFamily"),
            service_code: raw.text("product/servicecode"),
            region: raw.text("product/region"),
            instance_type: raw.text("product/instanceType"),
            pricing_term: raw.text("pricing/term"),
            pricing_unit: raw.text("pricing/unit"),
            reservation_arn: raw.text("reservation/ReservationARN"),
            tags: raw.tags(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportInterval {
    pub report_period_start: NaiveDateTime,
    pub report_period_end: NaiveDateTime,
    pub interval_start: NaiveDateTime,
    pub interval_end: NaiveDateTime,
}

impl ReportInterval {
    fn from_raw(raw: &RawRecord) -> Result<Self> {
        Ok(Self {
            report_period_start: raw.timestamp("report_period_start")?,
            report_period_end: raw.timestamp("report_period_end")?,
            interval_start: raw.timestamp("interval_start")?,
            interval_end: raw.timestamp("interval_end")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OcpUsageRecord {
    pub interval: ReportInterval,
    pub namespace: String,
    pub pod: String,
    pub node: String,
    pub resource_id: String,
    pub pod_usage_cpu_core_seconds: f64,
    pub pod_request_cpu_core_seconds: f64,
    pub pod_limit_cpu_core_seconds: f64,
    pub pod_usage_memory_byte_seconds: f64,
    pub pod_request_memory_byte_seconds: f64,
    pub pod_limit_memory_byte_seconds: f64,
    pub node_capacity_cpu_cores: f64,
    pub node_capacity_cpu_core_seconds: f64,
    pub node_capacity_memory_bytes: f64,
    pub node_capacity_memory_byte_seconds: f64,
    pub pod_labels: LabelMap,
}

impl OcpUsageRecord {
    fn from_raw(raw: &RawRecord) -> Result<Self> {
        Ok(Self {
            interval: ReportInterval::from_raw(raw)?,
            namespace: raw.text("namespace"),
            pod: raw.text("pod"),
            node: raw.text("node"),
            resource_id: raw.text("resource_id"),
            pod_usage_cpu_core_seconds: raw.number("pod_usage_cpu_core_seconds")?,
            pod_request_cpu_core_seconds: raw.number("pod_request_cpu_core_seconds")?,
            pod_limit_cpu_core_seconds: raw.number("pod_limit_cpu_core_seconds")?,
            pod_usage_memory_byte_seconds: raw.number("pod_usage_memory_byte_seconds")?,
            pod_request_memory_byte_seconds: raw.number("pod_request_memory_byte_seconds")?,
            pod_limit_memory_byte_seconds: raw.number("pod_limit_memory_byte_seconds")?,
            node_capacity_cpu_cores: raw.number("node_capacity_cpu_cores")?,
            node_capacity_cpu_core_seconds: raw.number("node_capacity_cpu_core_seconds")?,
            node_capacity_memory_bytes: raw.number("node_capacity_memory_bytes")?,
            node_capacity_memory_byte_seconds: raw.number("node_capacity_memory_byte_seconds")?,
            pod_labels: raw.labels("pod_labels"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OcpStorageRecord {
    pub interval: ReportInterval,
    pub namespace: String,
    pub pod: String,
    pub persistentvolumeclaim: String,
    pub persistentvolume: String,
    pub storageclass: String,
    pub persistentvolumeclaim_capacity_bytes: f64,
    pub persistentvolumeclaim_capacity_byte_seconds: f64,
    pub volume_request_storage_byte_seconds: f64,
    pub persistentvolumeclaim_usage_byte_seconds: f64,
    pub persistentvolume_labels: LabelMap,
    pub persistentvolumeclaim_labels: LabelMap,
}

impl OcpStorageRecord {
    fn from_raw(raw: &RawRecord) -> Result<Self> {
        Ok(Self {
            interval: ReportInterval::from_raw(raw)?,
            namespace: raw.text("namespace"),
            pod: raw.text("pod"),
            persistentvolumeclaim: raw.text("persistentvolumeclaim"),
            persistentvolume: raw.text("persistentvolume"),
            storageclass: raw.text("storageclass"),
            persistentvolumeclaim_capacity_bytes: raw
                .number("persistentvolumeclaim_capacity_bytes")?,
            persistentvolumeclaim_capacity_byte_seconds: raw
                .number("persistentvolumeclaim_capacity_byte_seconds")?,
            volume_request_storage_byte_seconds: raw
                .number("volume_request_storage_byte_seconds")?,
            persistentvolumeclaim_usage_byte_seconds: raw
                .number("persistentvolumeclaim_usage_byte_seconds")?,
            persistentvolume_labels: raw.labels("persistentvolume_labels"),
            persistentvolumeclaim_labels: raw.labels("persistentvolumeclaim_labels"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReportRecord {
    Aws(AwsCurRecord),
    OcpUsage(OcpUsageRecord),
    OcpStorage(OcpStorageRecord),
}

/// Streams typed records out of a report file. The report type is fixed by
/// the header when the reader is opened.
pub struct ReportReader {
    reader: csv::Reader<Box<dyn Read + Send>>,
    index: Arc<HeaderIndex>,
    report_type: ReportType,
    record: StringRecord,
}

impl ReportReader {
    pub fn open(path: &Path, compression: Compression) -> Result<Self> {
        let input = open_report(path, compression)?;
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(input);
        let headers = reader.headers()?.clone();
        let path_str = path.to_string_lossy().to_string();
        let report_type = detect_report_type(headers.iter().map(str::trim)).ok_or_else(|| {
            IngestError::UnrecognizedReportType {
                path: path_str.clone(),
            }
        })?;

        let mut columns = HashMap::new();
        let mut tag_columns = Vec::new();
        for (idx, name) in headers.iter().enumerate() {
            let name = name.trim();
            if let Some(tag) = name.strip_prefix(TAG_PREFIX)
                && !tag.is_empty()
            {
                tag_columns.push((tag.to_string(), idx));
            }
            columns.entry(name.to_string()).or_insert(idx);
        }

        Ok(Self {
            reader,
            index: Arc::new(HeaderIndex {
                path: path_str,
                columns,
                tag_columns,
            }),
            report_type,
            record: StringRecord::new(),
        })
    }

    pub fn report_type(&self) -> ReportType {
        self.report_type
    }

    pub fn next_raw(&mut self) -> Result<Option<RawRecord>> {
        if !self.reader.read_record(&mut self.record)? {
            return Ok(None);
        }
        let line = self
            .record
            .position()
            .map(|position| position.line())
            .unwrap_or(0);
        Ok(Some(RawRecord {
            index: Arc::clone(&self.index),
            line,
            values: self.record.clone(),
        }))
    }

    pub fn next_record(&mut self) -> Result<Option<ReportRecord>> {
        loop {
            let Some(raw) = self.next_raw()? else {
                return Ok(None);
            };
            if raw.values.iter().all(|value| value.trim().is_empty()) {
                continue;
            }
            let record = match self.report_type {
                ReportType::AwsCostUsage => ReportRecord::Aws(AwsCurRecord::from_raw(&raw)?),
                ReportType::OcpCpuMemUsage => {
                    ReportRecord::OcpUsage(OcpUsageRecord::from_raw(&raw)?)
                }
                ReportType::OcpStorage => {
                    ReportRecord::OcpStorage(OcpStorageRecord::from_raw(&raw)?)
                }
            };
            return Ok(Some(record));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::fs;

    fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_opt(hour, minute, 0))
            .expect("datetime")
    }

    #[test]
    fn parses_report_timestamp_shapes() {
        assert_eq!(parse_timestamp("2018-09-01T00:00:00Z"), Some(at(2018, 9, 1, 0, 0)));
        assert_eq!(parse_timestamp("2018-09-01T10:30Z"), Some(at(2018, 9, 1, 10, 30)));
        assert_eq!(
            parse_timestamp("2018-09-01 10:00:00 +0000 UTC"),
            Some(at(2018, 9, 1, 10, 0))
        );
        assert_eq!(parse_timestamp("2018-09-01 10:00:00"), Some(at(2018, 9, 1, 10, 0)));
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn detects_report_types_from_headers() {
        let cur = "identity/LineItemId,bill/BillingPeriodStartDate,bill/BillingPeriodEndDate,lineItem/UsageStartDate,lineItem/UsageEndDate,lineItem/ProductCode";
        assert_eq!(detect_report_type(cur.split(',')), Some(ReportType::AwsCostUsage));

        let usage = "report_period_start,report_period_end,interval_start,interval_end,namespace,pod,node,pod_usage_cpu_core_seconds,pod_usage_memory_byte_seconds";
        assert_eq!(detect_report_type(usage.split(',')), Some(ReportType::OcpCpuMemUsage));

        let storage = "report_period_start,report_period_end,interval_start,interval_end,namespace,pod,persistentvolumeclaim,persistentvolume,persistentvolumeclaim_capacity_bytes";
        assert_eq!(detect_report_type(storage.split(',')), Some(ReportType::OcpStorage));

        assert_eq!(detect_report_type("a,b,c".split(',')), None);
    }

    #[test]
    fn reads_typed_records_and_reports_bad_numbers() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("usage.csv");
        fs::write(
            &path,
            "report_period_start,report_period_end,interval_start,interval_end,namespace,pod,node,resource_id,pod_usage_cpu_core_seconds,pod_usage_memory_byte_seconds,pod_labels\n\
             2018-09-01 00:00:00 +0000 UTC,2018-10-01 00:00:00 +0000 UTC,2018-09-03 10:00:00 +0000 UTC,2018-09-03 10:59:59 +0000 UTC,ns,pod-a,node-1,i-1,3600,,label_app:web|bad\n\
             2018-09-01 00:00:00 +0000 UTC,2018-10-01 00:00:00 +0000 UTC,2018-09-03 10:00:00 +0000 UTC,2018-09-03 10:59:59 +0000 UTC,ns,pod-b,node-1,i-1,lots,0,\n",
        )
        .expect("write");

        let mut reader = ReportReader::open(&path, Compression::None).expect("open");
        assert_eq!(reader.report_type(), ReportType::OcpCpuMemUsage);
        let Some(ReportRecord::OcpUsage(first)) = reader.next_record().expect("first") else {
            panic!("expected usage record");
        };
        assert_eq!(first.pod, "pod-a");
        assert_eq!(first.pod_usage_cpu_core_seconds, 3600.0);
        assert_eq!(first.pod_usage_memory_byte_seconds, 0.0);
        assert_eq!(first.pod_labels.get("app").map(String::as_str), Some("web"));

        match reader.next_record() {
            Err(IngestError::Parse { column, line, .. }) => {
                assert_eq!(column, "pod_usage_cpu_core_seconds");
                assert_eq!(line, 3);
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn non_finite_numbers_are_parse_errors() {
        let dir = tempfile::tempdir().expect("temp dir");
        let header = "report_period_start,report_period_end,interval_start,interval_end,namespace,pod,node,resource_id,pod_usage_cpu_core_seconds,pod_usage_memory_byte_seconds,pod_labels";
        for raw in ["NaN", "inf", "-infinity"] {
            let path = dir.path().join("usage.csv");
            fs::write(
                &path,
                format!(
                    "{header}\n2018-09-01 00:00:00 +0000 UTC,2018-10-01 00:00:00 +0000 UTC,2018-09-03 10:00:00 +0000 UTC,2018-09-03 10:59:59 +0000 UTC,ns,pod-a,node-1,i-1,{raw},0,\n"
                ),
            )
            .expect("write");
            let mut reader = ReportReader::open(&path, Compression::None).expect("open");
            match reader.next_record() {
                Err(IngestError::Parse { column, line, message, .. }) => {
                    assert_eq!(column, "pod_usage_cpu_core_seconds");
                    assert_eq!(line, 2);
                    assert!(message.contains("not a finite number"), "{message}");
                }
                other => panic!("expected parse error for {raw}, got {other:?}"),
            }
        }
    }

    #[test]
    fn cur_tags_come_from_resource_tag_columns() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("cur.csv");
        fs::write(
            &path,
            "identity/LineItemId,bill/BillingPeriodStartDate,bill/BillingPeriodEndDate,lineItem/UsageStartDate,lineItem/UsageEndDate,lineItem/ProductCode,resourceTags/user:environment,resourceTags/user:app\n\
             abc,2018-09-01T00:00:00Z,2018-10-01T00:00:00Z,2018-09-03T10:00:00Z,2018-09-03T11:00:00Z,AmazonEC2,prod,\n",
        )
        .expect("write");
        let mut reader = ReportReader::open(&path, Compression::None).expect("open");
        let Some(ReportRecord::Aws(record)) = reader.next_record().expect("record") else {
            panic!("expected cur record");
        };
        assert_eq!(record.tags.len(), 1);
        assert_eq!(record.tags.get("environment").map(String::as_str), Some("prod"));
        assert_eq!(record.usage_start, at(2018, 9, 3, 10, 0));
        assert!(reader.next_record().expect("eof").is_none());
    }

    #[test]
    fn unknown_header_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("other.csv");
        fs::write(&path, "a,b\n1,2\n").expect("write");
        assert!(matches!(
            ReportReader::open(&path, Compression::None),
            Err(IngestError::UnrecognizedReportType { .. })
        ));
    }
}
