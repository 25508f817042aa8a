use billing_core::{AwsLineItem, OcpStorageLineItem, OcpUsageLineItem};
use rusqlite::{Statement, Transaction, params};

use crate::Db;
use crate::error::Result;

pub(crate) const AWS_LINE_ITEM_COLUMNS: &str = "cost_entry_bill_id, cost_entry_id, \
    cost_entry_product_id, cost_entry_pricing_id, cost_entry_reservation_id, line_item_key, \
    usage_start, usage_end, usage_account_id, line_item_type, product_code, usage_type, \
    operation, availability_zone, resource_id, usage_amount, normalization_factor, \
    normalized_usage_amount, currency_code, unblended_rate, unblended_cost, blended_rate, \
    blended_cost, public_on_demand_cost, public_on_demand_rate, tax_type, tags";

pub(crate) const OCP_USAGE_COLUMNS: &str = "report_period_id, report_id, namespace, pod, node, \
    resource_id, pod_usage_cpu_core_seconds, pod_request_cpu_core_seconds, \
    pod_limit_cpu_core_seconds, pod_usage_memory_byte_seconds, pod_request_memory_byte_seconds, \
    pod_limit_memory_byte_seconds, node_capacity_cpu_cores, node_capacity_cpu_core_seconds, \
    node_capacity_memory_bytes, node_capacity_memory_byte_seconds, pod_labels";

pub(crate) const OCP_STORAGE_COLUMNS: &str = "report_period_id, report_id, namespace, pod, \
    persistentvolumeclaim, persistentvolume, storageclass, persistentvolumeclaim_capacity_bytes, \
    persistentvolumeclaim_capacity_byte_seconds, volume_request_storage_byte_seconds, \
    persistentvolumeclaim_usage_byte_seconds, persistentvolume_labels, persistentvolumeclaim_labels";

struct StagedLoad<'a> {
    table: &'a str,
    staging: &'a str,
    columns: &'a str,
}

impl Db {
    /// Loads a batch through a temp staging table; rows whose natural key is
    /// already present are ignored. Returns the number of new rows.
    pub fn bulk_insert_aws_line_items(&mut self, items: &[AwsLineItem]) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }
        let load = StagedLoad {
            table: "aws_cost_entry_line_item",
            staging: "aws_line_item_staging",
            columns: AWS_LINE_ITEM_COLUMNS,
        };
        let tx = self.conn.transaction()?;
        let inserted = load_through_staging(&tx, &load, items, |stmt, item| {
            let tags = serde_json::to_string(&item.tags)?;
            stmt.execute(params![
                item.cost_entry_bill_id,
                item.cost_entry_id,
                item.cost_entry_product_id,
                item.cost_entry_pricing_id,
                item.cost_entry_reservation_id,
                item.line_item_key,
                item.usage_start,
                item.usage_end,
                item.usage_account_id,
                item.line_item_type,
                item.product_code,
                item.usage_type,
                item.operation,
                item.availability_zone,
                item.resource_id,
                item.usage_amount,
                item.normalization_factor,
                item.normalized_usage_amount,
                item.currency_code,
                item.unblended_rate,
                item.unblended_cost,
                item.blended_rate,
                item.blended_cost,
                item.public_on_demand_cost,
                item.public_on_demand_rate,
                item.tax_type,
                tags,
            ])?;
            Ok(())
        })?;
        tx.commit()?;
        Ok(inserted)
    }

    pub fn bulk_insert_ocp_usage_line_items(&mut self, items: &[OcpUsageLineItem]) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }
        let load = StagedLoad {
            table: "ocp_usage_line_item",
            staging: "ocp_usage_line_item_staging",
            columns: OCP_USAGE_COLUMNS,
        };
        let tx = self.conn.transaction()?;
        let inserted = load_through_staging(&tx, &load, items, |stmt, item| {
            let labels = serde_json::to_string(&item.pod_labels)?;
            stmt.execute(params![
                item.report_period_id,
                item.report_id,
                item.namespace,
                item.pod,
                item.node,
                item.resource_id,
                item.pod_usage_cpu_core_seconds,
                item.pod_request_cpu_core_seconds,
                item.pod_limit_cpu_core_seconds,
                item.pod_usage_memory_byte_seconds,
                item.pod_request_memory_byte_seconds,
                item.pod_limit_memory_byte_seconds,
                item.node_capacity_cpu_cores,
                item.node_capacity_cpu_core_seconds,
                item.node_capacity_memory_bytes,
                item.node_capacity_memory_byte_seconds,
                labels,
            ])?;
            Ok(())
        })?;
        tx.commit()?;
        Ok(inserted)
    }

    pub fn bulk_insert_ocp_storage_line_items(
        &mut self,
        items: &[OcpStorageLineItem],
    ) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }
        let load = StagedLoad {
            table: "ocp_storage_line_item",
            staging: "ocp_storage_line_item_staging",
            columns: OCP_STORAGE_COLUMNS,
        };
        let tx = self.conn.transaction()?;
        let inserted = load_through_staging(&tx, &load, items, |stmt, item| {
            let volume_labels = serde_json::to_string(&item.persistentvolume_labels)?;
            let claim_labels = serde_json::to_string(&item.persistentvolumeclaim_labels)?;
            stmt.execute(params![
                item.report_period_id,
                item.report_id,
                item.namespace,
                item.pod,
                item.persistentvolumeclaim,
                item.persistentvolume,
                item.storageclass,
                item.persistentvolumeclaim_capacity_bytes,
                item.persistentvolumeclaim_capacity_byte_seconds,
                item.volume_request_storage_byte_seconds,
                item.persistentvolumeclaim_usage_byte_seconds,
                volume_labels,
                claim_labels,
            ])?;
            Ok(())
        })?;
        tx.commit()?;
        Ok(inserted)
    }
}

fn load_through_staging<T, F>(
    tx: &Transaction<'_>,
    load: &StagedLoad<'_>,
    rows: &[T],
    mut bind: F,
) -> Result<usize>
where
    F: FnMut(&mut Statement<'_>, &T) -> Result<()>,
{
    tx.execute_batch(&format!(
        "CREATE TEMP TABLE IF NOT EXISTS {staging} AS SELECT {columns} FROM {table} WHERE 0; \
         DELETE FROM {staging};",
        staging = load.staging,
        columns = load.columns,
        table = load.table,
    ))?;
    {
        let column_count = load.columns.split(',').count();
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {} ({}) VALUES ({})",
            load.staging,
            load.columns,
            placeholders(column_count)
        ))?;
        for row in rows {
            bind(&mut stmt, row)?;
        }
    }
    let inserted = tx.execute(
        &format!(
            "INSERT OR IGNORE INTO {table} ({columns}) SELECT {columns} FROM {staging}",
            table = load.table,
            columns = load.columns,
            staging = load.staging,
        ),
        [],
    )?;
    tx.execute(&format!("DELETE FROM {}", load.staging), [])?;
    Ok(inserted)
}

fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|idx| format!("?{idx}"))
        .collect::<Vec<_>>()
        .join(", ")
}
