mod labels;
mod units;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub use labels::{LABEL_PREFIX, LABEL_SEPARATOR, LabelMap, merge_volume_labels, parse_label_string};
pub use units::{
    BYTES_PER_GIGABYTE, SECONDS_PER_DAY, SECONDS_PER_HOUR, byte_seconds_to_gigabyte_hours,
    byte_seconds_to_gigabyte_months, bytes_to_gigabytes, core_seconds_to_hours, days_in_month,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// AWS Cost and Usage Reports fetched from object storage.
    Aws,
    /// OpenShift usage and storage reports.
    Ocp,
    /// Cost and Usage Reports delivered from a local directory or archive.
    Local,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Ocp => "ocp",
            Self::Local => "local",
        }
    }

    pub fn is_cluster_usage(&self) -> bool {
        matches!(self, Self::Ocp)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "aws" => Ok(Self::Aws),
            "ocp" => Ok(Self::Ocp),
            "local" | "aws-local" => Ok(Self::Local),
            other => Err(format!("unknown provider type: {other}")),
        }
    }
}

/// A billing or usage origin as handed over by account discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub provider_id: String,
    pub provider_kind: ProviderKind,
    pub customer_name: String,
    pub credential: String,
    pub billing_source: String,
    #[serde(default)]
    pub report_prefix: Option<String>,
    #[serde(default)]
    pub report_name: Option<String>,
    #[serde(default)]
    pub schema_name: Option<String>,
}

impl Source {
    /// Tenant schema the source's rows are written to.
    pub fn schema(&self) -> String {
        if let Some(schema) = self.schema_name.as_deref()
            && !schema.trim().is_empty()
        {
            return schema.trim().to_string();
        }
        sanitize_schema_name(&self.customer_name)
    }

    /// Cluster id for cluster-usage sources; the credential names the cluster.
    pub fn cluster_id(&self) -> &str {
        if self.credential.trim().is_empty() {
            &self.provider_id
        } else {
            self.credential.trim()
        }
    }
}

pub fn sanitize_schema_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "public".to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    Gzip,
}

impl Compression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
        }
    }

    /// Accepts the two supported kinds; anything else is rejected.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" | "plain" | "uncompressed" => Some(Self::None),
            "gzip" | "gz" => Some(Self::Gzip),
            _ => None,
        }
    }

    pub fn from_file_name(path: &Path) -> Self {
        match path.extension().and_then(|value| value.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("gz") => Self::Gzip,
            _ => Self::None,
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One billing-period delivery for a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub manifest_key: String,
    pub assembly_id: String,
    pub billing_period_start: NaiveDate,
    pub report_keys: Vec<String>,
}

/// Fetch provenance for one staged report file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFileState {
    pub file_name: String,
    pub provider_id: String,
    pub fingerprint: Option<String>,
    pub manifest_id: Option<i64>,
    pub last_started_at: Option<String>,
    pub last_completed_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportType {
    AwsCostUsage,
    OcpCpuMemUsage,
    OcpStorage,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwsCostUsage => "aws_cost_usage",
            Self::OcpCpuMemUsage => "ocp_cpu_mem_usage",
            Self::OcpStorage => "ocp_storage",
        }
    }

    pub fn is_cluster_usage(&self) -> bool {
        !matches!(self, Self::AwsCostUsage)
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwsLineItem {
    pub cost_entry_bill_id: i64,
    pub cost_entry_id: i64,
    pub cost_entry_product_id: Option<i64>,
    pub cost_entry_pricing_id: Option<i64>,
    pub cost_entry_reservation_id: Option<i64>,
    /// Digest of the lowercased provider-assigned identifiers.
    pub line_item_key: String,
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
    pub tags: LabelMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcpUsageLineItem {
    pub report_period_id: i64,
    pub report_id: i64,
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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcpStorageLineItem {
    pub report_period_id: i64,
    pub report_id: i64,
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

/// An ingested AWS line item joined with the product and pricing attributes
/// the summary groups on.
#[derive(Debug, Clone, PartialEq)]
pub struct AwsUsageRow {
    pub item: AwsLineItem,
    pub region: String,
    pub instance_type: String,
    pub unit: String,
}

/// An ingested cluster line item joined with its report interval.
#[derive(Debug, Clone, PartialEq)]
pub struct OcpIntervalRow<T> {
    pub cluster_id: String,
    pub interval_start: NaiveDateTime,
    pub item: T,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwsDailyRow {
    pub cost_entry_bill_id: i64,
    pub usage_date: NaiveDate,
    pub product_code: String,
    pub usage_account_id: String,
    pub line_item_type: String,
    pub usage_type: String,
    pub operation: String,
    pub availability_zone: String,
    pub tax_type: String,
    pub resource_id: String,
    pub cost_entry_product_id: Option<i64>,
    pub cost_entry_pricing_id: Option<i64>,
    pub cost_entry_reservation_id: Option<i64>,
    pub currency_code: String,
    pub region: String,
    pub instance_type: String,
    pub unit: String,
    pub tags: LabelMap,
    pub usage_amount: f64,
    pub normalized_usage_amount: f64,
    pub unblended_rate: f64,
    pub unblended_cost: f64,
    pub blended_rate: f64,
    pub blended_cost: f64,
    pub public_on_demand_cost: f64,
    pub public_on_demand_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwsDailySummaryRow {
    pub cost_entry_bill_id: i64,
    pub usage_date: NaiveDate,
    pub product_code: String,
    pub usage_account_id: String,
    pub availability_zone: String,
    pub region: String,
    pub instance_type: String,
    pub unit: String,
    pub currency_code: String,
    pub resource_count: u64,
    pub usage_amount: f64,
    pub normalized_usage_amount: f64,
    pub unblended_rate: f64,
    pub unblended_cost: f64,
    pub blended_rate: f64,
    pub blended_cost: f64,
    pub public_on_demand_cost: f64,
    pub public_on_demand_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcpUsageDailyRow {
    pub report_period_id: i64,
    pub cluster_id: String,
    pub usage_date: NaiveDate,
    pub namespace: String,
    pub pod: String,
    pub node: String,
    pub resource_id: String,
    pub pod_labels: LabelMap,
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
    pub cluster_capacity_cpu_core_seconds: f64,
    pub cluster_capacity_memory_byte_seconds: f64,
    pub total_capacity_cpu_core_seconds: f64,
    pub total_capacity_memory_byte_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcpUsageSummaryRow {
    pub report_period_id: i64,
    pub cluster_id: String,
    pub usage_date: NaiveDate,
    pub namespace: String,
    pub pod: String,
    pub node: String,
    pub pod_labels: LabelMap,
    pub resource_count: u64,
    pub pod_usage_cpu_core_hours: f64,
    pub pod_request_cpu_core_hours: f64,
    pub pod_limit_cpu_core_hours: f64,
    pub pod_usage_memory_gigabyte_hours: f64,
    pub pod_request_memory_gigabyte_hours: f64,
    pub pod_limit_memory_gigabyte_hours: f64,
    pub node_capacity_cpu_cores: f64,
    pub node_capacity_cpu_core_hours: f64,
    pub node_capacity_memory_gigabytes: f64,
    pub node_capacity_memory_gigabyte_hours: f64,
    pub cluster_capacity_cpu_core_hours: f64,
    pub cluster_capacity_memory_gigabyte_hours: f64,
    pub total_capacity_cpu_core_hours: f64,
    pub total_capacity_memory_gigabyte_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcpStorageDailyRow {
    pub report_period_id: i64,
    pub cluster_id: String,
    pub usage_date: NaiveDate,
    pub namespace: String,
    pub pod: String,
    pub persistentvolumeclaim: String,
    pub persistentvolume: String,
    pub storageclass: String,
    pub persistentvolume_labels: LabelMap,
    pub persistentvolumeclaim_labels: LabelMap,
    pub persistentvolumeclaim_capacity_bytes: f64,
    pub persistentvolumeclaim_capacity_byte_seconds: f64,
    pub volume_request_storage_byte_seconds: f64,
    pub persistentvolumeclaim_usage_byte_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcpStorageSummaryRow {
    pub report_period_id: i64,
    pub cluster_id: String,
    pub usage_date: NaiveDate,
    pub namespace: String,
    pub pod: String,
    pub persistentvolumeclaim: String,
    pub storageclass: String,
    pub volume_labels: LabelMap,
    pub resource_count: u64,
    pub persistentvolumeclaim_capacity_gigabyte: f64,
    pub persistentvolumeclaim_capacity_gigabyte_months: f64,
    pub volume_request_storage_gigabyte_months: f64,
    pub persistentvolumeclaim_usage_gigabyte_months: f64,
}
