#![allow(dead_code)]

use std::path::PathBuf;

use billing_core::{AwsLineItem, LabelMap, Manifest, OcpUsageLineItem};
use billing_db::{BillKey, CostEntryKey, Db, ReportKey, ReportPeriodKey};
use chrono::{NaiveDate, NaiveDateTime};
use tempfile::TempDir;

pub const PROVIDER_ID: &str = "6e212746-484a-40cd-bba0-09a19d132d64";

pub struct TestDb {
    pub _dir: TempDir,
    pub db: Db,
    pub path: PathBuf,
}

pub fn setup_db() -> TestDb {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("test.sqlite");
    let mut db = Db::open(&path).expect("open db");
    db.migrate().expect("migrate db");
    TestDb {
        _dir: dir,
        db,
        path,
    }
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("date")
}

pub fn datetime(year: i32, month: u32, day: u32, hour: u32) -> NaiveDateTime {
    date(year, month, day).and_hms_opt(hour, 0, 0).expect("time")
}

pub fn make_manifest(assembly_id: &str, files: usize) -> Manifest {
    Manifest {
        manifest_key: "/koku/20180901-20181001/koku-Manifest.json".to_string(),
        assembly_id: assembly_id.to_string(),
        billing_period_start: date(2018, 9, 1),
        report_keys: (0..files)
            .map(|idx| format!("/koku/20180901-20181001/{assembly_id}/koku-{idx}.csv.gz"))
            .collect(),
    }
}

pub fn setup_bill(db: &mut Db) -> (i64, i64) {
    let (bill_id, _) = db
        .insert_or_get_bill(&BillKey {
            bill_type: "Anniversary".to_string(),
            payer_account_id: "111111111111".to_string(),
            billing_period_start: datetime(2018, 9, 1, 0),
            billing_period_end: datetime(2018, 10, 1, 0),
            provider_id: PROVIDER_ID.to_string(),
        })
        .expect("bill");
    let (cost_entry_id, _) = db
        .insert_or_get_cost_entry(&CostEntryKey {
            bill_id,
            interval_start: datetime(2018, 9, 3, 10),
            interval_end: datetime(2018, 9, 3, 11),
        })
        .expect("cost entry");
    (bill_id, cost_entry_id)
}

pub fn make_aws_item(bill_id: i64, cost_entry_id: i64, key: &str, hour: u32) -> AwsLineItem {
    AwsLineItem {
        cost_entry_bill_id: bill_id,
        cost_entry_id,
        cost_entry_product_id: None,
        cost_entry_pricing_id: None,
        cost_entry_reservation_id: None,
        line_item_key: key.to_string(),
        usage_start: datetime(2018, 9, 3, hour),
        usage_end: datetime(2018, 9, 3, hour + 1),
        usage_account_id: "111111111111".to_string(),
        line_item_type: "Usage".to_string(),
        product_code: "AmazonEC2".to_string(),
        usage_type: "BoxUsage:t2.micro".to_string(),
        operation: "RunInstances".to_string(),
        availability_zone: "us-east-1a".to_string(),
        resource_id: "i-0123456789".to_string(),
        usage_amount: 1.0,
        normalization_factor: 0.5,
        normalized_usage_amount: 0.5,
        currency_code: "USD".to_string(),
        unblended_rate: 0.0116,
        unblended_cost: 0.0116,
        blended_rate: 0.0116,
        blended_cost: 0.0116,
        public_on_demand_cost: 0.0116,
        public_on_demand_rate: 0.0116,
        tax_type: String::new(),
        tags: LabelMap::new(),
    }
}

pub fn setup_report(db: &mut Db) -> (i64, i64) {
    let (period_id, _) = db
        .insert_or_get_report_period(&ReportPeriodKey {
            cluster_id: "my-ocp-cluster-1".to_string(),
            report_period_start: datetime(2018, 9, 1, 0),
            report_period_end: datetime(2018, 10, 1, 0),
            provider_id: PROVIDER_ID.to_string(),
        })
        .expect("report period");
    let (report_id, _) = db
        .insert_or_get_report(&ReportKey {
            report_period_id: period_id,
            interval_start: datetime(2018, 9, 3, 10),
            interval_end: datetime(2018, 9, 3, 11),
        })
        .expect("report");
    (period_id, report_id)
}

pub fn make_usage_item(period_id: i64, report_id: i64, pod: &str) -> OcpUsageLineItem {
    OcpUsageLineItem {
        report_period_id: period_id,
        report_id,
        namespace: "kube-system".to_string(),
        pod: pod.to_string(),
        node: "node-1".to_string(),
        resource_id: "i-node-1".to_string(),
        pod_usage_cpu_core_seconds: 1800.0,
        pod_request_cpu_core_seconds: 3600.0,
        pod_limit_cpu_core_seconds: 7200.0,
        pod_usage_memory_byte_seconds: 1_000_000.0,
        pod_request_memory_byte_seconds: 2_000_000.0,
        pod_limit_memory_byte_seconds: 4_000_000.0,
        node_capacity_cpu_cores: 4.0,
        node_capacity_cpu_core_seconds: 14_400.0,
        node_capacity_memory_bytes: 8_000_000_000.0,
        node_capacity_memory_byte_seconds: 28_800_000_000_000.0,
        pod_labels: billing_core::parse_label_string("label_app:web"),
    }
}
