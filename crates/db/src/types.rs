use chrono::{NaiveDate, NaiveDateTime};

/// Persisted manifest row for one (provider, assembly) delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRecord {
    pub id: i64,
    pub provider_id: String,
    pub assembly_id: String,
    pub billing_period_start: NaiveDate,
    pub num_total_files: u32,
    pub num_processed_files: u32,
}

impl ManifestRecord {
    pub fn is_complete(&self) -> bool {
        self.num_processed_files >= self.num_total_files
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BillKey {
    pub bill_type: String,
    pub payer_account_id: String,
    pub billing_period_start: NaiveDateTime,
    pub billing_period_end: NaiveDateTime,
    pub provider_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CostEntryKey {
    pub bill_id: i64,
    pub interval_start: NaiveDateTime,
    pub interval_end: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProductKey {
    pub sku: String,
    pub product_name: String,
    pub product_family: String,
    pub service_code: String,
    pub region: String,
    pub instance_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PricingKey {
    pub term: String,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReservationKey {
    pub reservation_arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReportPeriodKey {
    pub cluster_id: String,
    pub report_period_start: NaiveDateTime,
    pub report_period_end: NaiveDateTime,
    pub provider_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReportKey {
    pub report_period_id: i64,
    pub interval_start: NaiveDateTime,
    pub interval_end: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportTable {
    Manifest,
    ReportStatus,
    AwsBill,
    AwsCostEntry,
    AwsProduct,
    AwsPricing,
    AwsReservation,
    AwsLineItem,
    AwsDaily,
    AwsDailySummary,
    OcpReportPeriod,
    OcpReport,
    OcpUsageLineItem,
    OcpStorageLineItem,
    OcpUsageDaily,
    OcpUsageDailySummary,
    OcpStorageDaily,
    OcpStorageDailySummary,
}

impl ReportTable {
    pub const ALL: [ReportTable; 18] = [
        Self::Manifest,
        Self::ReportStatus,
        Self::AwsBill,
        Self::AwsCostEntry,
        Self::AwsProduct,
        Self::AwsPricing,
        Self::AwsReservation,
        Self::AwsLineItem,
        Self::AwsDaily,
        Self::AwsDailySummary,
        Self::OcpReportPeriod,
        Self::OcpReport,
        Self::OcpUsageLineItem,
        Self::OcpStorageLineItem,
        Self::OcpUsageDaily,
        Self::OcpUsageDailySummary,
        Self::OcpStorageDaily,
        Self::OcpStorageDailySummary,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            Self::Manifest => "report_manifest",
            Self::ReportStatus => "report_status",
            Self::AwsBill => "aws_cost_entry_bill",
            Self::AwsCostEntry => "aws_cost_entry",
            Self::AwsProduct => "aws_cost_entry_product",
            Self::AwsPricing => "aws_cost_entry_pricing",
            Self::AwsReservation => "aws_cost_entry_reservation",
            Self::AwsLineItem => "aws_cost_entry_line_item",
            Self::AwsDaily => "aws_cost_entry_line_item_daily",
            Self::AwsDailySummary => "aws_cost_entry_line_item_daily_summary",
            Self::OcpReportPeriod => "ocp_usage_report_period",
            Self::OcpReport => "ocp_usage_report",
            Self::OcpUsageLineItem => "ocp_usage_line_item",
            Self::OcpStorageLineItem => "ocp_storage_line_item",
            Self::OcpUsageDaily => "ocp_usage_line_item_daily",
            Self::OcpUsageDailySummary => "ocp_usage_line_item_daily_summary",
            Self::OcpStorageDaily => "ocp_storage_line_item_daily",
            Self::OcpStorageDailySummary => "ocp_storage_line_item_daily_summary",
        }
    }
}
