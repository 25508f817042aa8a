use billing_core::{
    AwsDailyRow, AwsDailySummaryRow, AwsLineItem, AwsUsageRow, LabelMap, OcpIntervalRow,
    OcpStorageDailyRow, OcpStorageLineItem, OcpStorageSummaryRow, OcpUsageDailyRow,
    OcpUsageLineItem, OcpUsageSummaryRow,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::Type;
use rusqlite::{Row, Transaction, params};

use crate::Db;
use crate::error::Result;

const AWS_DAILY_COLUMNS: &str = "cost_entry_bill_id, usage_date, product_code, usage_account_id, \
    line_item_type, usage_type, operation, availability_zone, tax_type, resource_id, \
    cost_entry_product_id, cost_entry_pricing_id, cost_entry_reservation_id, currency_code, \
    region, instance_type, unit, tags, usage_amount, normalized_usage_amount, unblended_rate, \
    unblended_cost, blended_rate, blended_cost, public_on_demand_cost, public_on_demand_rate";

const AWS_SUMMARY_COLUMNS: &str = "cost_entry_bill_id, usage_date, product_code, \
    usage_account_id, availability_zone, region, instance_type, unit, currency_code, \
    resource_count, usage_amount, normalized_usage_amount, unblended_rate, unblended_cost, \
    blended_rate, blended_cost, public_on_demand_cost, public_on_demand_rate";

const OCP_USAGE_DAILY_COLUMNS: &str = "report_period_id, cluster_id, usage_date, namespace, pod, \
    node, resource_id, pod_labels, pod_usage_cpu_core_seconds, pod_request_cpu_core_seconds, \
    pod_limit_cpu_core_seconds, pod_usage_memory_byte_seconds, pod_request_memory_byte_seconds, \
    pod_limit_memory_byte_seconds, node_capacity_cpu_cores, node_capacity_cpu_core_seconds, \
    node_capacity_memory_bytes, node_capacity_memory_byte_seconds, \
    cluster_capacity_cpu_core_seconds, cluster_capacity_memory_byte_seconds, \
    total_capacity_cpu_core_seconds, total_capacity_memory_byte_seconds";

const OCP_USAGE_SUMMARY_COLUMNS: &str = "report_period_id, cluster_id, usage_date, namespace, \
    pod, node, pod_labels, resource_count, pod_usage_cpu_core_hours, pod_request_cpu_core_hours, \
    pod_limit_cpu_core_hours, pod_usage_memory_gigabyte_hours, pod_request_memory_gigabyte_hours, \
    pod_limit_memory_gigabyte_hours, node_capacity_cpu_cores, node_capacity_cpu_core_hours, \
    node_capacity_memory_gigabytes, node_capacity_memory_gigabyte_hours, \
    cluster_capacity_cpu_core_hours, cluster_capacity_memory_gigabyte_hours, \
    total_capacity_cpu_core_hours, total_capacity_memory_gigabyte_hours";

const OCP_STORAGE_DAILY_COLUMNS: &str = "report_period_id, cluster_id, usage_date, namespace, \
    pod, persistentvolumeclaim, persistentvolume, storageclass, persistentvolume_labels, \
    persistentvolumeclaim_labels, persistentvolumeclaim_capacity_bytes, \
    persistentvolumeclaim_capacity_byte_seconds, volume_request_storage_byte_seconds, \
    persistentvolumeclaim_usage_byte_seconds";

const OCP_STORAGE_SUMMARY_COLUMNS: &str = "report_period_id, cluster_id, usage_date, namespace, \
    pod, persistentvolumeclaim, storageclass, volume_labels, resource_count, \
    persistentvolumeclaim_capacity_gigabyte, persistentvolumeclaim_capacity_gigabyte_months, \
    volume_request_storage_gigabyte_months, persistentvolumeclaim_usage_gigabyte_months";

const AWS_SCOPE: &str =
    "cost_entry_bill_id IN (SELECT id FROM aws_cost_entry_bill WHERE provider_id = ?1)";
const OCP_SCOPE: &str =
    "report_period_id IN (SELECT id FROM ocp_usage_report_period WHERE provider_id = ?1)";

impl Db {
    /// Ingested cloud-billing line items whose usage starts within the days
    /// `start..=end`, joined with product and pricing attributes.
    pub fn aws_usage_rows(
        &self,
        provider_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AwsUsageRow>> {
        let (from, until) = day_bounds(start, end);
        let columns = prefixed("li", crate::line_items::AWS_LINE_ITEM_COLUMNS);
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {columns},
                   COALESCE(p.region, ''), COALESCE(p.instance_type, ''), COALESCE(pr.unit, '')
            FROM aws_cost_entry_line_item li
            JOIN aws_cost_entry_bill b ON b.id = li.cost_entry_bill_id
            LEFT JOIN aws_cost_entry_product p ON p.id = li.cost_entry_product_id
            LEFT JOIN aws_cost_entry_pricing pr ON pr.id = li.cost_entry_pricing_id
            WHERE b.provider_id = ?1 AND li.usage_start >= ?2 AND li.usage_start < ?3
            ORDER BY li.id ASC
            "#
        ))?;
        let rows = stmt.query_map(params![provider_id, from, until], |row| {
            Ok(AwsUsageRow {
                item: map_aws_line_item(row)?,
                region: row.get(27)?,
                instance_type: row.get(28)?,
                unit: row.get(29)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn ocp_usage_rows(
        &self,
        provider_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OcpIntervalRow<OcpUsageLineItem>>> {
        let (from, until) = day_bounds(start, end);
        let columns = prefixed("li", crate::line_items::OCP_USAGE_COLUMNS);
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {columns}, p.cluster_id, r.interval_start
            FROM ocp_usage_line_item li
            JOIN ocp_usage_report r ON r.id = li.report_id
            JOIN ocp_usage_report_period p ON p.id = li.report_period_id
            WHERE p.provider_id = ?1 AND r.interval_start >= ?2 AND r.interval_start < ?3
            ORDER BY li.id ASC
            "#
        ))?;
        let rows = stmt.query_map(params![provider_id, from, until], |row| {
            Ok(OcpIntervalRow {
                item: OcpUsageLineItem {
                    report_period_id: row.get(0)?,
                    report_id: row.get(1)?,
                    namespace: row.get(2)?,
                    pod: row.get(3)?,
                    node: row.get(4)?,
                    resource_id: row.get(5)?,
                    pod_usage_cpu_core_seconds: row.get(6)?,
                    pod_request_cpu_core_seconds: row.get(7)?,
                    pod_limit_cpu_core_seconds: row.get(8)?,
                    pod_usage_memory_byte_seconds: row.get(9)?,
                    pod_request_memory_byte_seconds: row.get(10)?,
                    pod_limit_memory_byte_seconds: row.get(11)?,
                    node_capacity_cpu_cores: row.get(12)?,
                    node_capacity_cpu_core_seconds: row.get(13)?,
                    node_capacity_memory_bytes: row.get(14)?,
                    node_capacity_memory_byte_seconds: row.get(15)?,
                    pod_labels: labels_at(row, 16)?,
                },
                cluster_id: row.get(17)?,
                interval_start: row.get(18)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn ocp_storage_rows(
        &self,
        provider_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OcpIntervalRow<OcpStorageLineItem>>> {
        let (from, until) = day_bounds(start, end);
        let columns = prefixed("li", crate::line_items::OCP_STORAGE_COLUMNS);
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {columns}, p.cluster_id, r.interval_start
            FROM ocp_storage_line_item li
            JOIN ocp_usage_report r ON r.id = li.report_id
            JOIN ocp_usage_report_period p ON p.id = li.report_period_id
            WHERE p.provider_id = ?1 AND r.interval_start >= ?2 AND r.interval_start < ?3
            ORDER BY li.id ASC
            "#
        ))?;
        let rows = stmt.query_map(params![provider_id, from, until], |row| {
            Ok(OcpIntervalRow {
                item: OcpStorageLineItem {
                    report_period_id: row.get(0)?,
                    report_id: row.get(1)?,
                    namespace: row.get(2)?,
                    pod: row.get(3)?,
                    persistentvolumeclaim: row.get(4)?,
                    persistentvolume: row.get(5)?,
                    storageclass: row.get(6)?,
                    persistentvolumeclaim_capacity_bytes: row.get(7)?,
                    persistentvolumeclaim_capacity_byte_seconds: row.get(8)?,
                    volume_request_storage_byte_seconds: row.get(9)?,
                    persistentvolumeclaim_usage_byte_seconds: row.get(10)?,
                    persistentvolume_labels: labels_at(row, 11)?,
                    persistentvolumeclaim_labels: labels_at(row, 12)?,
                },
                cluster_id: row.get(13)?,
                interval_start: row.get(14)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Swaps the provider's daily rows for `start..=end` in one transaction.
    pub fn replace_aws_daily(
        &mut self,
        provider_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        rows: &[AwsDailyRow],
    ) -> Result<usize> {
        let tx = self.conn.transaction()?;
        clear_range(&tx, "aws_cost_entry_line_item_daily", AWS_SCOPE, provider_id, start, end)?;
        {
            let mut stmt = tx.prepare(&insert_sql(
                "aws_cost_entry_line_item_daily",
                AWS_DAILY_COLUMNS,
            ))?;
            for row in rows {
                stmt.execute(params![
                    row.cost_entry_bill_id,
                    row.usage_date,
                    row.product_code,
                    row.usage_account_id,
                    row.line_item_type,
                    row.usage_type,
                    row.operation,
                    row.availability_zone,
                    row.tax_type,
                    row.resource_id,
                    row.cost_entry_product_id,
                    row.cost_entry_pricing_id,
                    row.cost_entry_reservation_id,
                    row.currency_code,
                    row.region,
                    row.instance_type,
                    row.unit,
                    serde_json::to_string(&row.tags)?,
                    row.usage_amount,
                    row.normalized_usage_amount,
                    row.unblended_rate,
                    row.unblended_cost,
                    row.blended_rate,
                    row.blended_cost,
                    row.public_on_demand_cost,
                    row.public_on_demand_rate,
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    pub fn aws_daily_rows(
        &self,
        provider_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AwsDailyRow>> {
        let mut stmt = self.conn.prepare(&select_range_sql(
            "aws_cost_entry_line_item_daily",
            AWS_DAILY_COLUMNS,
            AWS_SCOPE,
        ))?;
        let rows = stmt.query_map(params![provider_id, start, end], |row| {
            Ok(AwsDailyRow {
                cost_entry_bill_id: row.get(0)?,
                usage_date: row.get(1)?,
                product_code: row.get(2)?,
                usage_account_id: row.get(3)?,
                line_item_type: row.get(4)?,
                usage_type: row.get(5)?,
                operation: row.get(6)?,
                availability_zone: row.get(7)?,
                tax_type: row.get(8)?,
                resource_id: row.get(9)?,
                cost_entry_product_id: row.get(10)?,
                cost_entry_pricing_id: row.get(11)?,
                cost_entry_reservation_id: row.get(12)?,
                currency_code: row.get(13)?,
                region: row.get(14)?,
                instance_type: row.get(15)?,
                unit: row.get(16)?,
                tags: labels_at(row, 17)?,
                usage_amount: row.get(18)?,
                normalized_usage_amount: row.get(19)?,
                unblended_rate: row.get(20)?,
                unblended_cost: row.get(21)?,
                blended_rate: row.get(22)?,
                blended_cost: row.get(23)?,
                public_on_demand_cost: row.get(24)?,
                public_on_demand_rate: row.get(25)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn replace_aws_summary(
        &mut self,
        provider_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        rows: &[AwsDailySummaryRow],
    ) -> Result<usize> {
        let tx = self.conn.transaction()?;
        clear_range(
            &tx,
            "aws_cost_entry_line_item_daily_summary",
            AWS_SCOPE,
            provider_id,
            start,
            end,
        )?;
        {
            let mut stmt = tx.prepare(&insert_sql(
                "aws_cost_entry_line_item_daily_summary",
                AWS_SUMMARY_COLUMNS,
            ))?;
            for row in rows {
                stmt.execute(params![
                    row.cost_entry_bill_id,
                    row.usage_date,
                    row.product_code,
                    row.usage_account_id,
                    row.availability_zone,
                    row.region,
                    row.instance_type,
                    row.unit,
                    row.currency_code,
                    row.resource_count as i64,
                    row.usage_amount,
                    row.normalized_usage_amount,
                    row.unblended_rate,
                    row.unblended_cost,
                    row.blended_rate,
                    row.blended_cost,
                    row.public_on_demand_cost,
                    row.public_on_demand_rate,
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    pub fn aws_summary_rows(
        &self,
        provider_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AwsDailySummaryRow>> {
        let mut stmt = self.conn.prepare(&select_range_sql(
            "aws_cost_entry_line_item_daily_summary",
            AWS_SUMMARY_COLUMNS,
            AWS_SCOPE,
        ))?;
        let rows = stmt.query_map(params![provider_id, start, end], |row| {
            let resource_count: i64 = row.get(9)?;
            Ok(AwsDailySummaryRow {
                cost_entry_bill_id: row.get(0)?,
                usage_date: row.get(1)?,
                product_code: row.get(2)?,
                usage_account_id: row.get(3)?,
                availability_zone: row.get(4)?,
                region: row.get(5)?,
                instance_type: row.get(6)?,
                unit: row.get(7)?,
                currency_code: row.get(8)?,
                resource_count: resource_count.max(0) as u64,
                usage_amount: row.get(10)?,
                normalized_usage_amount: row.get(11)?,
                unblended_rate: row.get(12)?,
                unblended_cost: row.get(13)?,
                blended_rate: row.get(14)?,
                blended_cost: row.get(15)?,
                public_on_demand_cost: row.get(16)?,
                public_on_demand_rate: row.get(17)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn replace_ocp_usage_daily(
        &mut self,
        provider_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        rows: &[OcpUsageDailyRow],
    ) -> Result<usize> {
        let tx = self.conn.transaction()?;
        clear_range(&tx, "ocp_usage_line_item_daily", OCP_SCOPE, provider_id, start, end)?;
        {
            let mut stmt = tx.prepare(&insert_sql(
                "ocp_usage_line_item_daily",
                OCP_USAGE_DAILY_COLUMNS,
            ))?;
            for row in rows {
                stmt.execute(params![
                    row.report_period_id,
                    row.cluster_id,
                    row.usage_date,
                    row.namespace,
                    row.pod,
                    row.node,
                    row.resource_id,
                    serde_json::to_string(&row.pod_labels)?,
                    row.pod_usage_cpu_core_seconds,
                    row.pod_request_cpu_core_seconds,
                    row.pod_limit_cpu_core_seconds,
                    row.pod_usage_memory_byte_seconds,
                    row.pod_request_memory_byte_seconds,
                    row.pod_limit_memory_byte_seconds,
                    row.node_capacity_cpu_cores,
                    row.node_capacity_cpu_core_seconds,
                    row.node_capacity_memory_bytes,
                    row.node_capacity_memory_byte_seconds,
                    row.cluster_capacity_cpu_core_seconds,
                    row.cluster_capacity_memory_byte_seconds,
                    row.total_capacity_cpu_core_seconds,
                    row.total_capacity_memory_byte_seconds,
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    pub fn ocp_usage_daily_rows(
        &self,
        provider_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OcpUsageDailyRow>> {
        let mut stmt = self.conn.prepare(&select_range_sql(
            "ocp_usage_line_item_daily",
            OCP_USAGE_DAILY_COLUMNS,
            OCP_SCOPE,
        ))?;
        let rows = stmt.query_map(params![provider_id, start, end], |row| {
            Ok(OcpUsageDailyRow {
                report_period_id: row.get(0)?,
                cluster_id: row.get(1)?,
                usage_date: row.get(2)?,
                namespace: row.get(3)?,
                pod: row.get(4)?,
                node: row.get(5)?,
                resource_id: row.get(6)?,
                pod_labels: labels_at(row, 7)?,
                pod_usage_cpu_core_seconds: row.get(8)?,
                pod_request_cpu_core_seconds: row.get(9)?,
                pod_limit_cpu_core_seconds: row.get(10)?,
                pod_usage_memory_byte_seconds: row.get(11)?,
                pod_request_memory_byte_seconds: row.get(12)?,
                pod_limit_memory_byte_seconds: row.get(13)?,
                node_capacity_cpu_cores: row.get(14)?,
                node_capacity_cpu_core_seconds: row.get(15)?,
                node_capacity_memory_bytes: row.get(16)?,
                node_capacity_memory_byte_seconds: row.get(17)?,
                cluster_capacity_cpu_core_seconds: row.get(18)?,
                cluster_capacity_memory_byte_seconds: row.get(19)?,
                total_capacity_cpu_core_seconds: row.get(20)?,
                total_capacity_memory_byte_seconds: row.get(21)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn replace_ocp_usage_summary(
        &mut self,
        provider_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        rows: &[OcpUsageSummaryRow],
    ) -> Result<usize> {
        let tx = self.conn.transaction()?;
        clear_range(
            &tx,
            "ocp_usage_line_item_daily_summary",
            OCP_SCOPE,
            provider_id,
            start,
            end,
        )?;
        {
            let mut stmt = tx.prepare(&insert_sql(
                "ocp_usage_line_item_daily_summary",
                OCP_USAGE_SUMMARY_COLUMNS,
            ))?;
            for row in rows {
                stmt.execute(params![
                    row.report_period_id,
                    row.cluster_id,
                    row.usage_date,
                    row.namespace,
                    row.pod,
                    row.node,
                    serde_json::to_string(&row.pod_labels)?,
                    row.resource_count as i64,
                    row.pod_usage_cpu_core_hours,
                    row.pod_request_cpu_core_hours,
                    row.pod_limit_cpu_core_hours,
                    row.pod_usage_memory_gigabyte_hours,
                    row.pod_request_memory_gigabyte_hours,
                    row.pod_limit_memory_gigabyte_hours,
                    row.node_capacity_cpu_cores,
                    row.node_capacity_cpu_core_hours,
                    row.node_capacity_memory_gigabytes,
                    row.node_capacity_memory_gigabyte_hours,
                    row.cluster_capacity_cpu_core_hours,
                    row.cluster_capacity_memory_gigabyte_hours,
                    row.total_capacity_cpu_core_hours,
                    row.total_capacity_memory_gigabyte_hours,
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    pub fn ocp_usage_summary_rows(
        &self,
        provider_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OcpUsageSummaryRow>> {
        let mut stmt = self.conn.prepare(&select_range_sql(
            "ocp_usage_line_item_daily_summary",
            OCP_USAGE_SUMMARY_COLUMNS,
            OCP_SCOPE,
        ))?;
        let rows = stmt.query_map(params![provider_id, start, end], |row| {
            let resource_count: i64 = row.get(7)?;
            Ok(OcpUsageSummaryRow {
                report_period_id: row.get(0)?,
                cluster_id: row.get(1)?,
                usage_date: row.get(2)?,
                namespace: row.get(3)?,
                pod: row.get(4)?,
                node: row.get(5)?,
                pod_labels: labels_at(row, 6)?,
                resource_count: resource_count.max(0) as u64,
                pod_usage_cpu_core_hours: row.get(8)?,
                pod_request_cpu_core_hours: row.get(9)?,
                pod_limit_cpu_core_hours: row.get(10)?,
                pod_usage_memory_gigabyte_hours: row.get(11)?,
                pod_request_memory_gigabyte_hours: row.get(12)?,
                pod_limit_memory_gigabyte_hours: row.get(13)?,
                node_capacity_cpu_cores: row.get(14)?,
                node_capacity_cpu_core_hours: row.get(15)?,
                node_capacity_memory_gigabytes: row.get(16)?,
                node_capacity_memory_gigabyte_hours: row.get(17)?,
                cluster_capacity_cpu_core_hours: row.get(18)?,
                cluster_capacity_memory_gigabyte_hours: row.get(19)?,
                total_capacity_cpu_core_hours: row.get(20)?,
                total_capacity_memory_gigabyte_hours: row.get(21)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn replace_ocp_storage_daily(
        &mut self,
        provider_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        rows: &[OcpStorageDailyRow],
    ) -> Result<usize> {
        let tx = self.conn.transaction()?;
        clear_range(&tx, "ocp_storage_line_item_daily", OCP_SCOPE, provider_id, start, end)?;
        {
            let mut stmt = tx.prepare(&insert_sql(
                "ocp_storage_line_item_daily",
                OCP_STORAGE_DAILY_COLUMNS,
            ))?;
            for row in rows {
                stmt.execute(params![
                    row.report_period_id,
                    row.cluster_id,
                    row.usage_date,
                    row.namespace,
                    row.pod,
                    row.persistentvolumeclaim,
                    row.persistentvolume,
                    row.storageclass,
                    serde_json::to_string(&row.persistentvolume_labels)?,
                    serde_json::to_string(&row.persistentvolumeclaim_labels)?,
                    row.persistentvolumeclaim_capacity_bytes,
                    row.persistentvolumeclaim_capacity_byte_seconds,
                    row.volume_request_storage_byte_seconds,
                    row.persistentvolumeclaim_usage_byte_seconds,
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    pub fn ocp_storage_daily_rows(
        &self,
        provider_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OcpStorageDailyRow>> {
        let mut stmt = self.conn.prepare(&select_range_sql(
            "ocp_storage_line_item_daily",
            OCP_STORAGE_DAILY_COLUMNS,
            OCP_SCOPE,
        ))?;
        let rows = stmt.query_map(params![provider_id, start, end], |row| {
            Ok(OcpStorageDailyRow {
                report_period_id: row.get(0)?,
                cluster_id: row.get(1)?,
                usage_date: row.get(2)?,
                namespace: row.get(3)?,
                pod: row.get(4)?,
                persistentvolumeclaim: row.get(5)?,
                persistentvolume: row.get(6)?,
                storageclass: row.get(7)?,
                persistentvolume_labels: labels_at(row, 8)?,
                persistentvolumeclaim_labels: labels_at(row, 9)?,
                persistentvolumeclaim_capacity_bytes: row.get(10)?,
                persistentvolumeclaim_capacity_byte_seconds: row.get(11)?,
                volume_request_storage_byte_seconds: row.get(12)?,
                persistentvolumeclaim_usage_byte_seconds: row.get(13)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn replace_ocp_storage_summary(
        &mut self,
        provider_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        rows: &[OcpStorageSummaryRow],
    ) -> Result<usize> {
        let tx = self.conn.transaction()?;
        clear_range(
            &tx,
            "ocp_storage_line_item_daily_summary",
            OCP_SCOPE,
            provider_id,
            start,
            end,
        )?;
        {
            let mut stmt = tx.prepare(&insert_sql(
                "ocp_storage_line_item_daily_summary",
                OCP_STORAGE_SUMMARY_COLUMNS,
            ))?;
            for row in rows {
                stmt.execute(params![
                    row.report_period_id,
                    row.cluster_id,
                    row.usage_date,
                    row.namespace,
                    row.pod,
                    row.persistentvolumeclaim,
                    row.storageclass,
                    serde_json::to_string(&row.volume_labels)?,
                    row.resource_count as i64,
                    row.persistentvolumeclaim_capacity_gigabyte,
                    row.persistentvolumeclaim_capacity_gigabyte_months,
                    row.volume_request_storage_gigabyte_months,
                    row.persistentvolumeclaim_usage_gigabyte_months,
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    pub fn ocp_storage_summary_rows(
        &self,
        provider_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OcpStorageSummaryRow>> {
        let mut stmt = self.conn.prepare(&select_range_sql(
            "ocp_storage_line_item_daily_summary",
            OCP_STORAGE_SUMMARY_COLUMNS,
            OCP_SCOPE,
        ))?;
        let rows = stmt.query_map(params![provider_id, start, end], |row| {
            let resource_count: i64 = row.get(8)?;
            Ok(OcpStorageSummaryRow {
                report_period_id: row.get(0)?,
                cluster_id: row.get(1)?,
                usage_date: row.get(2)?,
                namespace: row.get(3)?,
                pod: row.get(4)?,
                persistentvolumeclaim: row.get(5)?,
                storageclass: row.get(6)?,
                volume_labels: labels_at(row, 7)?,
                resource_count: resource_count.max(0) as u64,
                persistentvolumeclaim_capacity_gigabyte: row.get(9)?,
                persistentvolumeclaim_capacity_gigabyte_months: row.get(10)?,
                volume_request_storage_gigabyte_months: row.get(11)?,
                persistentvolumeclaim_usage_gigabyte_months: row.get(12)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

fn map_aws_line_item(row: &Row<'_>) -> rusqlite::Result<AwsLineItem> {
    Ok(AwsLineItem {
        cost_entry_bill_id: row.get(0)?,
        cost_entry_id: row.get(1)?,
        cost_entry_product_id: row.get(2)?,
        cost_entry_pricing_id: row.get(3)?,
        cost_entry_reservation_id: row.get(4)?,
        line_item_key: row.get(5)?,
        usage_start: row.get(6)?,
        usage_end: row.get(7)?,
        usage_account_id: row.get(8)?,
        line_item_type: row.get(9)?,
        product_code: row.get(10)?,
        usage_type: row.get(11)?,
        operation: row.get(12)?,
        availability_zone: row.get(13)?,
        resource_id: row.get(14)?,
        usage_amount: row.get(15)?,
        normalization_factor: row.get(16)?,
        normalized_usage_amount: row.get(17)?,
        currency_code: row.get(18)?,
        unblended_rate: row.get(19)?,
        unblended_cost: row.get(20)?,
        blended_rate: row.get(21)?,
        blended_cost: row.get(22)?,
        public_on_demand_cost: row.get(23)?,
        public_on_demand_rate: row.get(24)?,
        tax_type: row.get(25)?,
        tags: labels_at(row, 26)?,
    })
}

fn labels_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<LabelMap> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

fn day_bounds(start: NaiveDate, end: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let until = end.succ_opt().unwrap_or(end);
    (start.and_time(NaiveTime::MIN), until.and_time(NaiveTime::MIN))
}

fn prefixed(alias: &str, columns: &str) -> String {
    columns
        .split(',')
        .map(|column| format!("{alias}.{}", column.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn insert_sql(table: &str, columns: &str) -> String {
    let count = columns.split(',').count();
    let values = (1..=count)
        .map(|idx| format!("?{idx}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {table} ({columns}) VALUES ({values})")
}

fn select_range_sql(table: &str, columns: &str, scope: &str) -> String {
    format!(
        "SELECT {columns} FROM {table} WHERE {scope} AND usage_date >= ?2 AND usage_date <= ?3 ORDER BY id ASC"
    )
}

fn clear_range(
    tx: &Transaction<'_>,
    table: &str,
    scope: &str,
    provider_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<usize> {
    let removed = tx.execute(
        &format!("DELETE FROM {table} WHERE {scope} AND usage_date >= ?2 AND usage_date <= ?3"),
        params![provider_id, start, end],
    )?;
    Ok(removed)
}
