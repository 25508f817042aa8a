use std::collections::{BTreeMap, BTreeSet};

use billing_core::{
    AwsDailyRow, AwsDailySummaryRow, AwsUsageRow, LabelMap, OcpIntervalRow, OcpStorageDailyRow,
    OcpStorageLineItem, OcpStorageSummaryRow, OcpUsageDailyRow, OcpUsageLineItem,
    OcpUsageSummaryRow, byte_seconds_to_gigabyte_hours, byte_seconds_to_gigabyte_months,
    bytes_to_gigabytes, core_seconds_to_hours, merge_volume_labels,
};
use billing_db::Db;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::types::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RollupCounts {
    pub daily_rows: usize,
    pub summary_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct AwsDailyKey {
    bill_id: i64,
    usage_date: NaiveDate,
    product_code: String,
    usage_account_id: String,
    line_item_type: String,
    usage_type: String,
    operation: String,
    availability_zone: String,
    tax_type: String,
    resource_id: String,
    product_id: Option<i64>,
    pricing_id: Option<i64>,
    reservation_id: Option<i64>,
    currency_code: String,
    tags: LabelMap,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct AwsSummaryKey {
    bill_id: i64,
    usage_date: NaiveDate,
    product_code: String,
    usage_account_id: String,
    availability_zone: String,
    region: String,
    instance_type: String,
    unit: String,
    currency_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct OcpUsageKey {
    report_period_id: i64,
    cluster_id: String,
    usage_date: NaiveDate,
    namespace: String,
    pod: String,
    node: String,
    resource_id: Option<String>,
    pod_labels: LabelMap,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct OcpStorageKey {
    report_period_id: i64,
    cluster_id: String,
    usage_date: NaiveDate,
    namespace: String,
    pod: String,
    persistentvolumeclaim: String,
    persistentvolume: Option<String>,
    storageclass: String,
    labels: Vec<LabelMap>,
}

/// (report period, cluster, day)
type ClusterDay = (i64, String, NaiveDate);

fn max(a: f64, b: f64) -> f64 {
    if b > a { b } else { a }
}

fn add_aws_measures(daily: &mut AwsDailyRow, row: &AwsUsageRow) {
    let item = &row.item;
    daily.usage_amount += item.usage_amount;
    daily.normalized_usage_amount += item.normalized_usage_amount;
    daily.unblended_cost += item.unblended_cost;
    daily.blended_cost += item.blended_cost;
    daily.public_on_demand_cost += item.public_on_demand_cost;
    daily.unblended_rate = max(daily.unblended_rate, item.unblended_rate);
    daily.blended_rate = max(daily.blended_rate, item.blended_rate);
    daily.public_on_demand_rate = max(daily.public_on_demand_rate, item.public_on_demand_rate);
}

/// Rolls cloud-billing line items up to one row per resource and day.
pub fn aws_daily(rows: &[AwsUsageRow]) -> Vec<AwsDailyRow> {
    let mut groups: BTreeMap<AwsDailyKey, AwsDailyRow> = BTreeMap::new();
    for row in rows {
        let item = &row.item;
        let usage_date = item.usage_start.date();
        let key = AwsDailyKey {
            bill_id: item.cost_entry_bill_id,
            usage_date,
            product_code: item.product_code.clone(),
            usage_account_id: item.usage_account_id.clone(),
            line_item_type: item.line_item_type.clone(),
            usage_type: item.usage_type.clone(),
            operation: item.operation.clone(),
            availability_zone: item.availability_zone.clone(),
            tax_type: item.tax_type.clone(),
            resource_id: item.resource_id.clone(),
            product_id: item.cost_entry_product_id,
            pricing_id: item.cost_entry_pricing_id,
            reservation_id: item.cost_entry_reservation_id,
            currency_code: item.currency_code.clone(),
            tags: item.tags.clone(),
        };
        groups
            .entry(key)
            .and_modify(|daily| add_aws_measures(daily, row))
            .or_insert_with(|| AwsDailyRow {
                cost_entry_bill_id: item.cost_entry_bill_id,
                usage_date,
                product_code: item.product_code.clone(),
                usage_account_id: item.usage_account_id.clone(),
                line_item_type: item.line_item_type.clone(),
                usage_type: item.usage_type.clone(),
                operation: item.operation.clone(),
                availability_zone: item.availability_zone.clone(),
                tax_type: item.tax_type.clone(),
                resource_id: item.resource_id.clone(),
                cost_entry_product_id: item.cost_entry_product_id,
                cost_entry_pricing_id: item.cost_entry_pricing_id,
                cost_entry_reservation_id: item.cost_entry_reservation_id,
                currency_code: item.currency_code.clone(),
                region: row.region.clone(),
                instance_type: row.instance_type.clone(),
                unit: row.unit.clone(),
                tags: item.tags.clone(),
                usage_amount: item.usage_amount,
                normalized_usage_amount: item.normalized_usage_amount,
                unblended_rate: item.unblended_rate,
                unblended_cost: item.unblended_cost,
                blended_rate: item.blended_rate,
                blended_cost: item.blended_cost,
                public_on_demand_cost: item.public_on_demand_cost,
                public_on_demand_rate: item.public_on_demand_rate,
            });
    }
    groups.into_values().collect()
}

/// Collapses daily rows across resources into one row per product, account
/// and day.
pub fn aws_summary(daily: &[AwsDailyRow]) -> Vec<AwsDailySummaryRow> {
    let mut groups: BTreeMap<AwsSummaryKey, (AwsDailySummaryRow, BTreeSet<&str>)> =
        BTreeMap::new();
    for row in daily {
        let key = AwsSummaryKey {
            bill_id: row.cost_entry_bill_id,
            usage_date: row.usage_date,
            product_code: row.product_code.clone(),
            usage_account_id: row.usage_account_id.clone(),
            availability_zone: row.availability_zone.clone(),
            region: row.region.clone(),
            instance_type: row.instance_type.clone(),
            unit: row.unit.clone(),
            currency_code: row.currency_code.clone(),
        };
        let (summary, resources) = groups.entry(key).or_insert_with(|| {
            (
                AwsDailySummaryRow {
                    cost_entry_bill_id: row.cost_entry_bill_id,
                    usage_date: row.usage_date,
                    product_code: row.product_code.clone(),
                    usage_account_id: row.usage_account_id.clone(),
                    availability_zone: row.availability_zone.clone(),
                    region: row.region.clone(),
                    instance_type: row.instance_type.clone(),
                    unit: row.unit.clone(),
                    currency_code: row.currency_code.clone(),
                    resource_count: 0,
                    usage_amount: 0.0,
                    normalized_usage_amount: 0.0,
                    unblended_rate: 0.0,
                    unblended_cost: 0.0,
                    blended_rate: 0.0,
                    blended_cost: 0.0,
                    public_on_demand_cost: 0.0,
                    public_on_demand_rate: 0.0,
                },
                BTreeSet::new(),
            )
        });
        summary.usage_amount += row.usage_amount;
        summary.normalized_usage_amount += row.normalized_usage_amount;
        summary.unblended_cost += row.unblended_cost;
        summary.blended_cost += row.blended_cost;
        summary.public_on_demand_cost += row.public_on_demand_cost;
        summary.unblended_rate = max(summary.unblended_rate, row.unblended_rate);
        summary.blended_rate = max(summary.blended_rate, row.blended_rate);
        summary.public_on_demand_rate = max(summary.public_on_demand_rate, row.public_on_demand_rate);
        if !row.resource_id.is_empty() {
            resources.insert(row.resource_id.as_str());
        }
    }
    groups
        .into_values()
        .map(|(mut summary, resources)| {
            summary.resource_count = resources.len() as u64;
            summary
        })
        .collect()
}

/// Cluster capacity per (period, cluster, day): each node's capacity is
/// counted once per interval, summed over the day, then summed over nodes.
fn cluster_capacity(rows: &[OcpIntervalRow<OcpUsageLineItem>]) -> BTreeMap<ClusterDay, (f64, f64)> {
    let mut per_interval: BTreeMap<(ClusterDay, &str, NaiveDateTime), (f64, f64)> =
        BTreeMap::new();
    for row in rows {
        let day = (
            row.item.report_period_id,
            row.cluster_id.clone(),
            row.interval_start.date(),
        );
        let slot = per_interval
            .entry((day, row.item.node.as_str(), row.interval_start))
            .or_insert((0.0, 0.0));
        slot.0 = max(slot.0, row.item.node_capacity_cpu_core_seconds);
        slot.1 = max(slot.1, row.item.node_capacity_memory_byte_seconds);
    }

    let mut capacity: BTreeMap<ClusterDay, (f64, f64)> = BTreeMap::new();
    for ((day, _node, _interval), (cpu, memory)) in per_interval {
        let total = capacity.entry(day).or_insert((0.0, 0.0));
        total.0 += cpu;
        total.1 += memory;
    }
    capacity
}

/// Total capacity per usage day: cluster capacity summed over every cluster
/// and report period the rows cover.
fn total_capacity(
    capacity: &BTreeMap<ClusterDay, (f64, f64)>,
) -> BTreeMap<NaiveDate, (f64, f64)> {
    let mut totals: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();
    for ((_period, _cluster, day), (cpu, memory)) in capacity {
        let total = totals.entry(*day).or_insert((0.0, 0.0));
        total.0 += cpu;
        total.1 += memory;
    }
    totals
}

/// Rolls cluster CPU and memory usage up to one row per pod, node, resource
/// and day. No unit conversion happens here.
pub fn ocp_usage_daily(rows: &[OcpIntervalRow<OcpUsageLineItem>]) -> Vec<OcpUsageDailyRow> {
    let mut groups: BTreeMap<OcpUsageKey, OcpUsageDailyRow> = BTreeMap::new();
    for row in rows {
        let item = &row.item;
        let usage_date = row.interval_start.date();
        let key = OcpUsageKey {
            report_period_id: item.report_period_id,
            cluster_id: row.cluster_id.clone(),
            usage_date,
            namespace: item.namespace.clone(),
            pod: item.pod.clone(),
            node: item.node.clone(),
            resource_id: Some(item.resource_id.clone()),
            pod_labels: item.pod_labels.clone(),
        };
        let daily = groups.entry(key).or_insert_with(|| OcpUsageDailyRow {
            report_period_id: item.report_period_id,
            cluster_id: row.cluster_id.clone(),
            usage_date,
            namespace: item.namespace.clone(),
            pod: item.pod.clone(),
            node: item.node.clone(),
            resource_id: item.resource_id.clone(),
            pod_labels: item.pod_labels.clone(),
            pod_usage_cpu_core_seconds: 0.0,
            pod_request_cpu_core_seconds: 0.0,
            pod_limit_cpu_core_seconds: 0.0,
            pod_usage_memory_byte_seconds: 0.0,
            pod_request_memory_byte_seconds: 0.0,
            pod_limit_memory_byte_seconds: 0.0,
            node_capacity_cpu_cores: 0.0,
            node_capacity_cpu_core_seconds: 0.0,
            node_capacity_memory_bytes: 0.0,
            node_capacity_memory_byte_seconds: 0.0,
            cluster_capacity_cpu_core_seconds: 0.0,
            cluster_capacity_memory_byte_seconds: 0.0,
            total_capacity_cpu_core_seconds: 0.0,
            total_capacity_memory_byte_seconds: 0.0,
        });
        daily.pod_usage_cpu_core_seconds += item.pod_usage_cpu_core_seconds;
        daily.pod_request_cpu_core_seconds += item.pod_request_cpu_core_seconds;
        daily.pod_limit_cpu_core_seconds += item.pod_limit_cpu_core_seconds;
        daily.pod_usage_memory_byte_seconds += item.pod_usage_memory_byte_seconds;
        daily.pod_request_memory_byte_seconds += item.pod_request_memory_byte_seconds;
        daily.pod_limit_memory_byte_seconds += item.pod_limit_memory_byte_seconds;
        daily.node_capacity_cpu_core_seconds += item.node_capacity_cpu_core_seconds;
        daily.node_capacity_memory_byte_seconds += item.node_capacity_memory_byte_seconds;
        daily.node_capacity_cpu_cores = max(daily.node_capacity_cpu_cores, item.node_capacity_cpu_cores);
        daily.node_capacity_memory_bytes =
            max(daily.node_capacity_memory_bytes, item.node_capacity_memory_bytes);
    }

    let capacity = cluster_capacity(rows);
    let totals = total_capacity(&capacity);
    groups
        .into_values()
        .map(|mut daily| {
            let day = (daily.report_period_id, daily.cluster_id.clone(), daily.usage_date);
            if let Some((cpu, memory)) = capacity.get(&day) {
                daily.cluster_capacity_cpu_core_seconds = *cpu;
                daily.cluster_capacity_memory_byte_seconds = *memory;
            }
            if let Some((cpu, memory)) = totals.get(&daily.usage_date) {
                daily.total_capacity_cpu_core_seconds = *cpu;
                daily.total_capacity_memory_byte_seconds = *memory;
            }
            daily
        })
        .collect()
}

#[derive(Default)]
struct UsageSums<'a> {
    usage_cpu: f64,
    request_cpu: f64,
    limit_cpu: f64,
    usage_memory: f64,
    request_memory: f64,
    limit_memory: f64,
    node_cores: f64,
    node_core_seconds: f64,
    node_memory_bytes: f64,
    node_memory_byte_seconds: f64,
    cluster_cpu: f64,
    cluster_memory: f64,
    total_cpu: f64,
    total_memory: f64,
    resources: BTreeSet<&'a str>,
}

/// Collapses daily usage across resource ids and converts to hours and GiB.
pub fn ocp_usage_summary(daily: &[OcpUsageDailyRow]) -> Vec<OcpUsageSummaryRow> {
    let mut groups: BTreeMap<OcpUsageKey, UsageSums<'_>> = BTreeMap::new();
    for row in daily {
        let key = OcpUsageKey {
            report_period_id: row.report_period_id,
            cluster_id: row.cluster_id.clone(),
            usage_date: row.usage_date,
            namespace: row.namespace.clone(),
            pod: row.pod.clone(),
            node: row.node.clone(),
            resource_id: None,
            pod_labels: row.pod_labels.clone(),
        };
        let sums = groups.entry(key).or_default();
        sums.usage_cpu += row.pod_usage_cpu_core_seconds;
        sums.request_cpu += row.pod_request_cpu_core_seconds;
        sums.limit_cpu += row.pod_limit_cpu_core_seconds;
        sums.usage_memory += row.pod_usage_memory_byte_seconds;
        sums.request_memory += row.pod_request_memory_byte_seconds;
        sums.limit_memory += row.pod_limit_memory_byte_seconds;
        sums.node_core_seconds += row.node_capacity_cpu_core_seconds;
        sums.node_memory_byte_seconds += row.node_capacity_memory_byte_seconds;
        sums.node_cores = max(sums.node_cores, row.node_capacity_cpu_cores);
        sums.node_memory_bytes = max(sums.node_memory_bytes, row.node_capacity_memory_bytes);
        sums.cluster_cpu = max(sums.cluster_cpu, row.cluster_capacity_cpu_core_seconds);
        sums.cluster_memory = max(sums.cluster_memory, row.cluster_capacity_memory_byte_seconds);
        sums.total_cpu = max(sums.total_cpu, row.total_capacity_cpu_core_seconds);
        sums.total_memory = max(sums.total_memory, row.total_capacity_memory_byte_seconds);
        if !row.resource_id.is_empty() {
            sums.resources.insert(row.resource_id.as_str());
        }
    }
    groups
        .into_iter()
        .map(|(key, sums)| OcpUsageSummaryRow {
            report_period_id: key.report_period_id,
            cluster_id: key.cluster_id,
            usage_date: key.usage_date,
            namespace: key.namespace,
            pod: key.pod,
            node: key.node,
            pod_labels: key.pod_labels,
            resource_count: sums.resources.len() as u64,
            pod_usage_cpu_core_hours: core_seconds_to_hours(sums.usage_cpu),
            pod_request_cpu_core_hours: core_seconds_to_hours(sums.request_cpu),
            pod_limit_cpu_core_hours: core_seconds_to_hours(sums.limit_cpu),
            pod_usage_memory_gigabyte_hours: byte_seconds_to_gigabyte_hours(sums.usage_memory),
            pod_request_memory_gigabyte_hours: byte_seconds_to_gigabyte_hours(sums.request_memory),
            pod_limit_memory_gigabyte_hours: byte_seconds_to_gigabyte_hours(sums.limit_memory),
            node_capacity_cpu_cores: sums.node_cores,
            node_capacity_cpu_core_hours: core_seconds_to_hours(sums.node_core_seconds),
            node_capacity_memory_gigabytes: bytes_to_gigabytes(sums.node_memory_bytes),
            node_capacity_memory_gigabyte_hours: byte_seconds_to_gigabyte_hours(
                sums.node_memory_byte_seconds,
            ),
            cluster_capacity_cpu_core_hours: core_seconds_to_hours(sums.cluster_cpu),
            cluster_capacity_memory_gigabyte_hours: byte_seconds_to_gigabyte_hours(
                sums.cluster_memory,
            ),
            total_capacity_cpu_core_hours: core_seconds_to_hours(sums.total_cpu),
            total_capacity_memory_gigabyte_hours: byte_seconds_to_gigabyte_hours(
                sums.total_memory,
            ),
        })
        .collect()
}

pub fn ocp_storage_daily(rows: &[OcpIntervalRow<OcpStorageLineItem>]) -> Vec<OcpStorageDailyRow> {
    let mut groups: BTreeMap<OcpStorageKey, OcpStorageDailyRow> = BTreeMap::new();
    for row in rows {
        let item = &row.item;
        let usage_date = row.interval_start.date();
        let key = OcpStorageKey {
            report_period_id: item.report_period_id,
            cluster_id: row.cluster_id.clone(),
            usage_date,
            namespace: item.namespace.clone(),
            pod: item.pod.clone(),
            persistentvolumeclaim: item.persistentvolumeclaim.clone(),
            persistentvolume: Some(item.persistentvolume.clone()),
            storageclass: item.storageclass.clone(),
            labels: vec![
                item.persistentvolume_labels.clone(),
                item.persistentvolumeclaim_labels.clone(),
            ],
        };
        let daily = groups.entry(key).or_insert_with(|| OcpStorageDailyRow {
            report_period_id: item.report_period_id,
            cluster_id: row.cluster_id.clone(),
            usage_date,
            namespace: item.namespace.clone(),
            pod: item.pod.clone(),
            persistentvolumeclaim: item.persistentvolumeclaim.clone(),
            persistentvolume: item.persistentvolume.clone(),
            storageclass: item.storageclass.clone(),
            persistentvolume_labels: item.persistentvolume_labels.clone(),
            persistentvolumeclaim_labels: item.persistentvolumeclaim_labels.clone(),
            persistentvolumeclaim_capacity_bytes: 0.0,
            persistentvolumeclaim_capacity_byte_seconds: 0.0,
            volume_request_storage_byte_seconds: 0.0,
            persistentvolumeclaim_usage_byte_seconds: 0.0,
        });
        daily.persistentvolumeclaim_capacity_bytes = max(
            daily.persistentvolumeclaim_capacity_bytes,
            item.persistentvolumeclaim_capacity_bytes,
        );
        daily.persistentvolumeclaim_capacity_byte_seconds +=
            item.persistentvolumeclaim_capacity_byte_seconds;
        daily.volume_request_storage_byte_seconds += item.volume_request_storage_byte_seconds;
        daily.persistentvolumeclaim_usage_byte_seconds +=
            item.persistentvolumeclaim_usage_byte_seconds;
    }
    groups.into_values().collect()
}

/// Collapses daily storage across volumes; byte-seconds become GiB-months
/// for the month the day falls in.
pub fn ocp_storage_summary(daily: &[OcpStorageDailyRow]) -> Vec<OcpStorageSummaryRow> {
    let mut groups: BTreeMap<OcpStorageKey, (OcpStorageSummaryRow, BTreeSet<&str>)> =
        BTreeMap::new();
    for row in daily {
        let volume_labels =
            merge_volume_labels(&row.persistentvolume_labels, &row.persistentvolumeclaim_labels);
        let key = OcpStorageKey {
            report_period_id: row.report_period_id,
            cluster_id: row.cluster_id.clone(),
            usage_date: row.usage_date,
            namespace: row.namespace.clone(),
            pod: row.pod.clone(),
            persistentvolumeclaim: row.persistentvolumeclaim.clone(),
            persistentvolume: None,
            storageclass: row.storageclass.clone(),
            labels: vec![volume_labels.clone()],
        };
        let (summary, volumes) = groups.entry(key).or_insert_with(|| {
            (
                OcpStorageSummaryRow {
                    report_period_id: row.report_period_id,
                    cluster_id: row.cluster_id.clone(),
                    usage_date: row.usage_date,
                    namespace: row.namespace.clone(),
                    pod: row.pod.clone(),
                    persistentvolumeclaim: row.persistentvolumeclaim.clone(),
                    storageclass: row.storageclass.clone(),
                    volume_labels,
                    resource_count: 0,
                    persistentvolumeclaim_capacity_gigabyte: 0.0,
                    persistentvolumeclaim_capacity_gigabyte_months: 0.0,
                    volume_request_storage_gigabyte_months: 0.0,
                    persistentvolumeclaim_usage_gigabyte_months: 0.0,
                },
                BTreeSet::new(),
            )
        });
        summary.persistentvolumeclaim_capacity_gigabyte = max(
            summary.persistentvolumeclaim_capacity_gigabyte,
            bytes_to_gigabytes(row.persistentvolumeclaim_capacity_bytes),
        );
        summary.persistentvolumeclaim_capacity_gigabyte_months += byte_seconds_to_gigabyte_months(
            row.persistentvolumeclaim_capacity_byte_seconds,
            row.usage_date,
        );
        summary.volume_request_storage_gigabyte_months +=
            byte_seconds_to_gigabyte_months(row.volume_request_storage_byte_seconds, row.usage_date);
        summary.persistentvolumeclaim_usage_gigabyte_months += byte_seconds_to_gigabyte_months(
            row.persistentvolumeclaim_usage_byte_seconds,
            row.usage_date,
        );
        if !row.persistentvolume.is_empty() {
            volumes.insert(row.persistentvolume.as_str());
        }
    }
    groups
        .into_values()
        .map(|(mut summary, volumes)| {
            summary.resource_count = volumes.len() as u64;
            summary
        })
        .collect()
}

/// Rebuilds the cloud-billing daily and summary rows for `start..=end`.
pub fn update_aws_rollups(
    db: &mut Db,
    provider_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<RollupCounts> {
    let rows = db.aws_usage_rows(provider_id, start, end)?;
    let daily_rows = db.replace_aws_daily(provider_id, start, end, &aws_daily(&rows))?;
    let daily = db.aws_daily_rows(provider_id, start, end)?;
    let summary_rows = db.replace_aws_summary(provider_id, start, end, &aws_summary(&daily))?;
    log::info!(
        "aws rollups for {} {}..={}: {} line items, {} daily, {} summary",
        provider_id,
        start,
        end,
        rows.len(),
        daily_rows,
        summary_rows
    );
    Ok(RollupCounts {
        daily_rows,
        summary_rows,
    })
}

/// Rebuilds the cluster usage and storage daily and summary rows for
/// `start..=end`.
pub fn update_ocp_rollups(
    db: &mut Db,
    provider_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<RollupCounts> {
    let usage = db.ocp_usage_rows(provider_id, start, end)?;
    let mut daily_rows =
        db.replace_ocp_usage_daily(provider_id, start, end, &ocp_usage_daily(&usage))?;
    let usage_daily = db.ocp_usage_daily_rows(provider_id, start, end)?;
    let mut summary_rows = db.replace_ocp_usage_summary(
        provider_id,
        start,
        end,
        &ocp_usage_summary(&usage_daily),
    )?;

    let storage = db.ocp_storage_rows(provider_id, start, end)?;
    daily_rows += db.replace_ocp_storage_daily(provider_id, start, end, &ocp_storage_daily(&storage))?;
    let storage_daily = db.ocp_storage_daily_rows(provider_id, start, end)?;
    summary_rows += db.replace_ocp_storage_summary(
        provider_id,
        start,
        end,
        &ocp_storage_summary(&storage_daily),
    )?;

    log::info!(
        "ocp rollups for {} {}..={}: {} usage items, {} storage items, {} daily, {} summary",
        provider_id,
        start,
        end,
        usage.len(),
        storage.len(),
        daily_rows,
        summary_rows
    );
    Ok(RollupCounts {
        daily_rows,
        summary_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use billing_core::AwsLineItem;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2018, 9, day)
            .and_then(|date| date.and_hms_opt(hour, 0, 0))
            .expect("datetime")
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn aws_row(resource_id: &str, hour: u32, usage: f64, rate: f64) -> AwsUsageRow {
        AwsUsageRow {
            item: AwsLineItem {
                cost_entry_bill_id: 1,
                cost_entry_id: 1,
                cost_entry_product_id: Some(1),
                cost_entry_pricing_id: Some(1),
                cost_entry_reservation_id: None,
                line_item_key: format!("{resource_id}-{hour}"),
                usage_start: at(3, hour),
                usage_end: at(3, hour + 1),
                usage_account_id: "111111111111".to_string(),
                line_item_type: "Usage".to_string(),
                product_code: "AmazonEC2".to_string(),
                usage_type: "BoxUsage:t2.micro".to_string(),
                operation: "RunInstances".to_string(),
                availability_zone: "us-east-1a".to_string(),
                resource_id: resource_id.to_string(),
                usage_amount: usage,
                normalization_factor: 0.5,
                normalized_usage_amount: usage / 2.0,
                currency_code: "USD".to_string(),
                unblended_rate: rate,
                unblended_cost: usage * rate,
                blended_rate: rate,
                blended_cost: usage * rate,
                public_on_demand_cost: usage * rate,
                public_on_demand_rate: rate,
                tax_type: String::new(),
                tags: LabelMap::new(),
            },
            region: "us-east-1".to_string(),
            instance_type: "t2.micro".to_string(),
            unit: "Hrs".to_string(),
        }
    }

    #[test]
    fn aws_daily_sums_usage_and_keeps_max_rate() {
        let rows = vec![
            aws_row("i-1", 1, 1.0, 0.5),
            aws_row("i-1", 2, 2.0, 0.75),
            aws_row("i-2", 2, 4.0, 0.25),
        ];
        let daily = aws_daily(&rows);
        assert_eq!(daily.len(), 2);
        let first = daily.iter().find(|row| row.resource_id == "i-1").expect("i-1");
        assert!(close(first.usage_amount, 3.0));
        assert!(close(first.unblended_rate, 0.75));
        assert!(close(first.unblended_cost, 2.0));

        let summary = aws_summary(&daily);
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].resource_count, 2);
        assert!(close(summary[0].usage_amount, 7.0));
        assert!(close(summary[0].unblended_rate, 0.75));
    }

    fn usage_row(node: &str, pod: &str, hour: u32, cpu: f64) -> OcpIntervalRow<OcpUsageLineItem> {
        OcpIntervalRow {
            cluster_id: "cluster".to_string(),
            interval_start: at(3, hour),
            item: OcpUsageLineItem {
                report_period_id: 1,
                report_id: i64::from(hour),
                namespace: "ns".to_string(),
                pod: pod.to_string(),
                node: node.to_string(),
                resource_id: format!("{node}-id"),
                pod_usage_cpu_core_seconds: cpu,
                pod_request_cpu_core_seconds: cpu,
                pod_limit_cpu_core_seconds: cpu,
                pod_usage_memory_byte_seconds: 3600.0 * 1_073_741_824.0,
                pod_request_memory_byte_seconds: 0.0,
                pod_limit_memory_byte_seconds: 0.0,
                node_capacity_cpu_cores: 2.0,
                node_capacity_cpu_core_seconds: 7200.0,
                node_capacity_memory_bytes: 1_073_741_824.0,
                node_capacity_memory_byte_seconds: 3600.0 * 1_073_741_824.0,
                pod_labels: LabelMap::new(),
            },
        }
    }

    #[test]
    fn cluster_capacity_counts_each_node_interval_once() {
        let rows = vec![
            usage_row("node-1", "pod-a", 1, 3600.0),
            usage_row("node-1", "pod-b", 1, 3600.0),
            usage_row("node-2", "pod-c", 1, 3600.0),
            usage_row("node-1", "pod-a", 2, 3600.0),
        ];
        let daily = ocp_usage_daily(&rows);
        assert_eq!(daily.len(), 3);
        for row in &daily {
            assert!(close(row.cluster_capacity_cpu_core_seconds, 3.0 * 7200.0));
        }

        let summary = ocp_usage_summary(&daily);
        let pod_a = summary.iter().find(|row| row.pod == "pod-a").expect("pod-a");
        assert!(close(pod_a.pod_usage_cpu_core_hours, 2.0));
        assert!(close(pod_a.pod_usage_memory_gigabyte_hours, 2.0));
        assert!(close(pod_a.node_capacity_memory_gigabytes, 1.0));
        assert!(close(pod_a.cluster_capacity_cpu_core_hours, 6.0));
        assert_eq!(pod_a.resource_count, 1);
    }

    #[test]
    fn total_capacity_spans_every_cluster_of_the_day() {
        let mut other = usage_row("node-9", "pod-z", 1, 3600.0);
        other.cluster_id = "other".to_string();
        let rows = vec![
            usage_row("node-1", "pod-a", 1, 3600.0),
            usage_row("node-2", "pod-c", 1, 3600.0),
            other,
        ];
        let daily = ocp_usage_daily(&rows);
        assert_eq!(daily.len(), 3);
        for row in &daily {
            assert!(close(row.total_capacity_cpu_core_seconds, 3.0 * 7200.0));
            assert!(close(
                row.total_capacity_memory_byte_seconds,
                3.0 * 3600.0 * 1_073_741_824.0
            ));
        }
        let own = daily.iter().find(|row| row.cluster_id == "cluster").expect("cluster");
        assert!(close(own.cluster_capacity_cpu_core_seconds, 2.0 * 7200.0));
        let other = daily.iter().find(|row| row.cluster_id == "other").expect("other");
        assert!(close(other.cluster_capacity_cpu_core_seconds, 7200.0));

        let summary = ocp_usage_summary(&daily);
        for row in &summary {
            assert!(close(row.total_capacity_cpu_core_hours, 6.0));
            assert!(close(row.total_capacity_memory_gigabyte_hours, 3.0));
        }
    }

    #[test]
    fn storage_summary_merges_labels_and_counts_volumes() {
        let mut pv_labels = LabelMap::new();
        pv_labels.insert("app".to_string(), "db".to_string());
        pv_labels.insert("tier".to_string(), "gold".to_string());
        let mut pvc_labels = LabelMap::new();
        pvc_labels.insert("app".to_string(), "cache".to_string());

        let rows = vec![OcpIntervalRow {
            cluster_id: "cluster".to_string(),
            interval_start: at(3, 1),
            item: OcpStorageLineItem {
                report_period_id: 1,
                report_id: 1,
                namespace: "ns".to_string(),
                pod: "pod-a".to_string(),
                persistentvolumeclaim: "claim".to_string(),
                persistentvolume: "pv-1".to_string(),
                storageclass: "gp2".to_string(),
                persistentvolumeclaim_capacity_bytes: 2.0 * 1_073_741_824.0,
                persistentvolumeclaim_capacity_byte_seconds: 86400.0 * 1_073_741_824.0,
                volume_request_storage_byte_seconds: 0.0,
                persistentvolumeclaim_usage_byte_seconds: 0.0,
                persistentvolume_labels: pv_labels,
                persistentvolumeclaim_labels: pvc_labels,
            },
        }];
        let daily = ocp_storage_daily(&rows);
        let summary = ocp_storage_summary(&daily);
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].resource_count, 1);
        assert!(close(summary[0].persistentvolumeclaim_capacity_gigabyte, 2.0));
        assert!(close(summary[0].persistentvolumeclaim_capacity_gigabyte_months, 30.0));
        assert_eq!(summary[0].volume_labels.get("app").map(String::as_str), Some("cache"));
        assert_eq!(summary[0].volume_labels.get("tier").map(String::as_str), Some("gold"));
    }
}
