use billing_core::{Manifest, Source};
use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveDateTime};
use serde::Deserialize;

use crate::store::{ObjectStore, StoreError, sha256_hex};
use crate::types::{IngestError, Result};

const MANIFEST_SUFFIX: &str = "-Manifest.json";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestBody {
    #[serde(default)]
    assembly_id: Option<String>,
    #[serde(default)]
    billing_period: Option<BillingPeriod>,
    report_keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BillingPeriod {
    start: String,
}

/// First day of the month containing `month` and first day of the next one.
pub fn billing_range(month: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = month.with_day(1).unwrap_or(month);
    let end = start
        .checked_add_months(Months::new(1))
        .unwrap_or(start);
    (start, end)
}

pub fn manifest_key(prefix: Option<&str>, report_name: &str, month: NaiveDate) -> String {
    let (start, end) = billing_range(month);
    let range = format!("{}-{}", start.format("%Y%m%d"), end.format("%Y%m%d"));
    let mut parts = Vec::new();
    if let Some(prefix) = prefix.map(|value| value.trim_matches('/'))
        && !prefix.is_empty()
    {
        parts.push(prefix.to_string());
    }
    parts.push(report_name.to_string());
    parts.push(range);
    parts.push(format!("{report_name}{MANIFEST_SUFFIX}"));
    parts.join("/")
}

/// The directory segment directly above the file: `.../<assembly>/<file>`.
pub fn assembly_id_from_key(key: &str) -> Option<String> {
    let segments = key
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>();
    if segments.len() < 2 {
        return None;
    }
    Some(segments[segments.len() - 2].to_string())
}

fn parse_period_start(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(value) = NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M%S%.fZ") {
        return Some(value.date());
    }
    if let Ok(value) = DateTime::parse_from_rfc3339(raw) {
        return Some(value.naive_utc().date());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

fn manifest_dir(key: &str) -> &str {
    key.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

pub fn parse_manifest(key: &str, body: &[u8], month: NaiveDate) -> Result<Manifest> {
    let parsed: ManifestBody =
        serde_json::from_slice(body).map_err(|err| IngestError::ManifestParse {
            key: key.to_string(),
            message: err.to_string(),
        })?;

    let billing_period_start = match parsed.billing_period {
        Some(period) => {
            parse_period_start(&period.start).ok_or_else(|| IngestError::ManifestParse {
                key: key.to_string(),
                message: format!("invalid billingPeriod.start {:?}", period.start),
            })?
        }
        None => billing_range(month).0,
    };

    let assembly_id = match parsed.assembly_id.filter(|id| !id.trim().is_empty()) {
        Some(id) => id,
        None => parsed
            .report_keys
            .first()
            .and_then(|first| assembly_id_from_key(first))
            .unwrap_or_else(|| sha256_hex(key.as_bytes())),
    };

    let dir = manifest_dir(key);
    let report_keys = parsed
        .report_keys
        .into_iter()
        .map(|report_key| {
            if report_key.contains('/') || dir.is_empty() {
                report_key
            } else {
                format!("{dir}/{report_key}")
            }
        })
        .collect();

    Ok(Manifest {
        manifest_key: key.to_string(),
        assembly_id,
        billing_period_start,
        report_keys,
    })
}

fn unavailable(store: &dyn ObjectStore, err: StoreError) -> IngestError {
    IngestError::SourceUnavailable {
        location: store.location().to_string(),
        message: err.to_string(),
    }
}

pub struct ManifestResolver<'a> {
    store: &'a dyn ObjectStore,
    source: &'a Source,
}

impl<'a> ManifestResolver<'a> {
    pub fn new(store: &'a dyn ObjectStore, source: &'a Source) -> Self {
        Self { store, source }
    }

    fn prefix(&self) -> Option<&str> {
        self.source.report_prefix.as_deref()
    }

    /// The configured report name, or the first one published under the
    /// prefix.
    pub fn report_name(&self) -> Result<String> {
        if let Some(name) = self.source.report_name.as_deref()
            && !name.trim().is_empty()
        {
            return Ok(name.trim().to_string());
        }
        let prefix = self.prefix().unwrap_or("").trim_matches('/').to_string();
        let keys = self
            .store
            .list(&prefix)
            .map_err(|err| unavailable(self.store, err))?;
        keys.iter()
            .filter_map(|key| key.rsplit('/').next())
            .filter_map(|file| file.strip_suffix(MANIFEST_SUFFIX))
            .find(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| IngestError::ReportNotFound {
                location: self.store.location().to_string(),
                prefix,
            })
    }

    pub fn resolve(&self, month: NaiveDate) -> Result<Option<Manifest>> {
        let report_name = self.report_name()?;
        let key = manifest_key(self.prefix(), &report_name, month);
        let data = match self.store.get(&key) {
            Ok(data) => data,
            Err(StoreError::NotFound { .. }) => {
                log::info!(
                    "no manifest at {} for {} ({})",
                    key,
                    self.source.provider_id,
                    month.format("%Y-%m")
                );
                return Ok(None);
            }
            Err(err) => return Err(unavailable(self.store, err)),
        };
        let manifest = parse_manifest(&key, &data.bytes, month)?;
        log::debug!(
            "manifest {} assembly={} files={}",
            key,
            manifest.assembly_id,
            manifest.report_keys.len()
        );
        Ok(Some(manifest))
    }

    /// Report keys for the month; empty when nothing was published.
    pub fn report_keys(&self, month: NaiveDate) -> Result<Vec<String>> {
        Ok(self
            .resolve(month)?
            .map(|manifest| manifest.report_keys)
            .unwrap_or_default())
    }

    /// Months from `count - 1` months before `today` up to today's month.
    pub fn recent_months(today: NaiveDate, count: u32) -> Vec<NaiveDate> {
        let current = billing_range(today).0;
        (0..count.max(1))
            .rev()
            .filter_map(|back| current.checked_sub_months(Months::new(back)))
            .collect()
    }
}
