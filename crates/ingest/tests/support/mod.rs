#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use billing_core::{ProviderKind, Source};
use billing_db::{Db, ReportTable};
use chrono::NaiveDate;
use flate2::Compression as GzLevel;
use flate2::write::GzEncoder;
use ingest::{ObjectData, ObjectStore, RunOptions, StoreError};
use sha2::{Digest, Sha256};

pub const PROVIDER_ID: &str = "6e212746-484a-40cd-bba0-09a19d132d64";
pub const SCHEMA: &str = "acct10001";
pub const REPORT_DIR: &str = "koku/20180901-20181001";
pub const MANIFEST_KEY: &str = "koku/20180901-20181001/koku-Manifest.json";

pub const CUR_HEADER: &str = "identity/LineItemId,identity/TimeInterval,bill/BillType,\
bill/PayerAccountId,bill/BillingPeriodStartDate,bill/BillingPeriodEndDate,\
lineItem/UsageAccountId,lineItem/LineItemType,lineItem/UsageStartDate,lineItem/UsageEndDate,\
lineItem/ProductCode,lineItem/UsageType,lineItem/Operation,lineItem/AvailabilityZone,\
lineItem/ResourceId,lineItem/UsageAmount,lineItem/CurrencyCode,lineItem/UnblendedRate,\
lineItem/UnblendedCost,lineItem/BlendedRate,lineItem/BlendedCost,product/ProductName,\
product/sku,product/region,product/instanceType,pricing/term,pricing/unit,\
resourceTags/user:environment";

pub const OCP_USAGE_HEADER: &str = "report_period_start,report_period_end,pod,namespace,node,\
resource_id,interval_start,interval_end,pod_usage_cpu_core_seconds,\
pod_request_cpu_core_seconds,pod_limit_cpu_core_seconds,pod_usage_memory_byte_seconds,\
pod_request_memory_byte_seconds,pod_limit_memory_byte_seconds,node_capacity_cpu_cores,\
node_capacity_cpu_core_seconds,node_capacity_memory_bytes,node_capacity_memory_byte_seconds,\
pod_labels";

pub const OCP_STORAGE_HEADER: &str = "report_period_start,report_period_end,interval_start,\
interval_end,namespace,pod,persistentvolumeclaim,persistentvolume,storageclass,\
persistentvolumeclaim_capacity_bytes,persistentvolumeclaim_capacity_byte_seconds,\
volume_request_storage_byte_seconds,persistentvolumeclaim_usage_byte_seconds,\
persistentvolume_labels,persistentvolumeclaim_labels";

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("date")
}

pub fn cur_line(id: &str, day: u32, hour: u32, resource_id: &str, usage: f64, rate: f64) -> String {
    let start = format!("2018-09-{day:02}T{hour:02}:00:00Z");
    let end = format!("2018-09-{day:02}T{hour:02}:59:59Z");
    let cost = usage * rate;
    format!(
        "{id},{start}/{end},Anniversary,111111111111,2018-09-01T00:00:00Z,2018-10-01T00:00:00Z,\
111111111111,Usage,{start},{end},AmazonEC2,BoxUsage:t2.micro,RunInstances,us-east-1a,\
{resource_id},{usage},USD,{rate},{cost},{rate},{cost},Amazon Elastic Compute Cloud,\
SKU123,us-east-1,t2.micro,OnDemand,Hrs,prod"
    )
}

pub fn usage_line(pod: &str, node: &str, day: u32, hour: u32, cpu_seconds: f64) -> String {
    format!(
        "2018-09-01 00:00:00 +0000 UTC,2018-10-01 00:00:00 +0000 UTC,{pod},kube-system,{node},\
i-{node},2018-09-{day:02} {hour:02}:00:00 +0000 UTC,2018-09-{day:02} {hour:02}:59:59 +0000 UTC,\
{cpu_seconds},3600,7200,3865470566400,7730941132800,7730941132800,2,7200,\
2147483648,7730941132800,label_app:web|label_tier:front"
    )
}

pub fn storage_line(claim: &str, volume: &str, day: u32, hour: u32) -> String {
    format!(
        "2018-09-01 00:00:00 +0000 UTC,2018-10-01 00:00:00 +0000 UTC,\
2018-09-{day:02} {hour:02}:00:00 +0000 UTC,2018-09-{day:02} {hour:02}:59:59 +0000 UTC,\
kube-system,db-0,{claim},{volume},gp2,2147483648,7730941132800,3865470566400,\
1932735283200,label_app:db|label_tier:gold,label_app:cache"
    )
}

pub fn csv_body(header: &str, lines: &[String]) -> Vec<u8> {
    let mut body = String::from(header);
    body.push('\n');
    for line in lines {
        body.push_str(line);
        body.push('\n');
    }
    body.into_bytes()
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), GzLevel::default());
    encoder.write_all(bytes).expect("gzip write");
    encoder.finish().expect("gzip finish")
}

pub fn write_file(path: &Path, bytes: &[u8]) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create dir");
    }
    fs::write(path, bytes).expect("write file");
    path.to_path_buf()
}

pub fn manifest_json(assembly_id: &str, keys: &[String]) -> String {
    let keys = keys
        .iter()
        .map(|key| format!("\"{key}\""))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        r#"{{"assemblyId":"{assembly_id}","billingPeriod":{{"start":"20180901T000000.000Z"}},"reportKeys":[{keys}]}}"#
    )
}

pub fn report_key(assembly_id: &str, file_name: &str) -> String {
    format!("{REPORT_DIR}/{assembly_id}/{file_name}")
}

/// Lays out a manifest and its report files under `root` the way a bucket
/// delivery looks. Returns the report keys.
pub fn publish_local(root: &Path, assembly_id: &str, files: &[(&str, Vec<u8>)]) -> Vec<String> {
    let keys = files
        .iter()
        .map(|(name, _)| report_key(assembly_id, name))
        .collect::<Vec<_>>();
    write_file(
        &root.join(MANIFEST_KEY),
        manifest_json(assembly_id, &keys).as_bytes(),
    );
    for ((_, bytes), key) in files.iter().zip(&keys) {
        write_file(&root.join(key), bytes);
    }
    keys
}

pub fn source(kind: ProviderKind, location: &str) -> Source {
    Source {
        provider_id: PROVIDER_ID.to_string(),
        provider_kind: kind,
        customer_name: "Test Customer".to_string(),
        credential: "my-ocp-cluster-1".to_string(),
        billing_source: location.to_string(),
        report_prefix: None,
        report_name: Some("koku".to_string()),
        schema_name: Some(SCHEMA.to_string()),
    }
}

pub fn open_tenant(root: &Path) -> Db {
    Db::open_tenant(root.join("data"), SCHEMA).expect("open tenant")
}

pub fn run_options(staging_root: &Path) -> RunOptions {
    RunOptions {
        staging_root: staging_root.to_path_buf(),
        months: vec![date(2018, 9, 1)],
        today: date(2018, 9, 30),
        batch_size: 2,
        cancel: Arc::new(AtomicBool::new(false)),
    }
}

pub fn count(db: &Db, table: ReportTable) -> u64 {
    db.count_rows(table).expect("count rows")
}

fn fingerprint(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// In-process bucket; counts body transfers so tests can observe reuse.
pub struct MemoryObjectStore {
    location: String,
    available: bool,
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    transfers: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new(location: &str) -> Self {
        Self {
            location: location.to_string(),
            available: true,
            objects: Mutex::new(BTreeMap::new()),
            transfers: AtomicUsize::new(0),
        }
    }

    /// A bucket that does not exist; every call fails.
    pub fn unavailable(location: &str) -> Self {
        Self {
            available: false,
            ..Self::new(location)
        }
    }

    pub fn put(&self, key: &str, bytes: impl Into<Vec<u8>>) {
        self.objects
            .lock()
            .expect("objects")
            .insert(key.trim_start_matches('/').to_string(), bytes.into());
    }

    pub fn remove(&self, key: &str) -> bool {
        self.objects
            .lock()
            .expect("objects")
            .remove(key.trim_start_matches('/'))
            .is_some()
    }

    pub fn transfer_count(&self) -> usize {
        self.transfers.load(Ordering::SeqCst)
    }

    fn object(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        if !self.available {
            return Err(StoreError::Unavailable {
                message: format!("bucket {} does not exist", self.location),
            });
        }
        self.objects
            .lock()
            .expect("objects")
            .get(key.trim_start_matches('/'))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }
}

impl ObjectStore for MemoryObjectStore {
    fn location(&self) -> &str {
        &self.location
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        if !self.available {
            return Err(StoreError::Unavailable {
                message: format!("bucket {} does not exist", self.location),
            });
        }
        let prefix = prefix.trim_start_matches('/');
        Ok(self
            .objects
            .lock()
            .expect("objects")
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn head(&self, key: &str) -> Result<String, StoreError> {
        Ok(fingerprint(&self.object(key)?))
    }

    fn get(&self, key: &str) -> Result<ObjectData, StoreError> {
        let bytes = self.object(key)?;
        self.transfers.fetch_add(1, Ordering::SeqCst);
        Ok(ObjectData {
            fingerprint: fingerprint(&bytes),
            bytes,
        })
    }
}
