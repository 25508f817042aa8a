use std::collections::HashMap;

use rusqlite::params;

use crate::Db;
use crate::error::Result;
use crate::types::{
    BillKey, CostEntryKey, PricingKey, ProductKey, ReportKey, ReportPeriodKey, ReservationKey,
};

// Parents are looked up by natural key. Inserts use INSERT OR IGNORE so a
// concurrent writer that got there first hands back its id instead of failing.
impl Db {
    pub fn existing_bills(&self, provider_id: &str) -> Result<HashMap<BillKey, i64>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, bill_type, payer_account_id, billing_period_start, billing_period_end, provider_id
            FROM aws_cost_entry_bill
            WHERE provider_id = ?1
            "#,
        )?;
        let rows = stmt.query_map(params![provider_id], |row| {
            Ok((
                BillKey {
                    bill_type: row.get(1)?,
                    payer_account_id: row.get(2)?,
                    billing_period_start: row.get(3)?,
                    billing_period_end: row.get(4)?,
                    provider_id: row.get(5)?,
                },
                row.get(0)?,
            ))
        })?;
        collect_keys(rows)
    }

    pub fn insert_or_get_bill(&mut self, key: &BillKey) -> Result<(i64, bool)> {
        let inserted = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO aws_cost_entry_bill (
              bill_type, payer_account_id, billing_period_start, billing_period_end, provider_id
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                key.bill_type,
                key.payer_account_id,
                key.billing_period_start,
                key.billing_period_end,
                key.provider_id
            ],
        )?;
        let id = self.conn.query_row(
            r#"
            SELECT id FROM aws_cost_entry_bill
            WHERE bill_type = ?1 AND payer_account_id = ?2 AND billing_period_start = ?3
              AND provider_id = ?4
            "#,
            params![
                key.bill_type,
                key.payer_account_id,
                key.billing_period_start,
                key.provider_id
            ],
            |row| row.get(0),
        )?;
        Ok((id, inserted > 0))
    }

    pub fn existing_cost_entries(&self, provider_id: &str) -> Result<HashMap<CostEntryKey, i64>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT e.id, e.bill_id, e.interval_start, e.interval_end
            FROM aws_cost_entry e
            JOIN aws_cost_entry_bill b ON b.id = e.bill_id
            WHERE b.provider_id = ?1
            "#,
        )?;
        let rows = stmt.query_map(params![provider_id], |row| {
            Ok((
                CostEntryKey {
                    bill_id: row.get(1)?,
                    interval_start: row.get(2)?,
                    interval_end: row.get(3)?,
                },
                row.get(0)?,
            ))
        })?;
        collect_keys(rows)
    }

    pub fn insert_or_get_cost_entry(&mut self, key: &CostEntryKey) -> Result<(i64, bool)> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO aws_cost_entry (bill_id, interval_start, interval_end) VALUES (?1, ?2, ?3)",
            params![key.bill_id, key.interval_start, key.interval_end],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM aws_cost_entry WHERE bill_id = ?1 AND interval_start = ?2",
            params![key.bill_id, key.interval_start],
            |row| row.get(0),
        )?;
        Ok((id, inserted > 0))
    }

    pub fn existing_products(&self) -> Result<HashMap<ProductKey, i64>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, sku, product_name, product_family, service_code, region, instance_type
            FROM aws_cost_entry_product
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                ProductKey {
                    sku: row.get(1)?,
                    product_name: row.get(2)?,
                    product_family: row.get(3)?,
                    service_code: row.get(4)?,
                    region: row.get(5)?,
                    instance_type: row.get(6)?,
                },
                row.get(0)?,
            ))
        })?;
        collect_keys(rows)
    }

    pub fn insert_or_get_product(&mut self, key: &ProductKey) -> Result<(i64, bool)> {
        let inserted = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO aws_cost_entry_product (
              sku, product_name, product_family, service_code, region, instance_type
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                key.sku,
                key.product_name,
                key.product_family,
                key.service_code,
                key.region,
                key.instance_type
            ],
        )?;
        let id = self.conn.query_row(
            r#"
            SELECT id FROM aws_cost_entry_product
            WHERE sku = ?1 AND product_name = ?2 AND product_family = ?3
              AND service_code = ?4 AND region = ?5 AND instance_type = ?6
            "#,
            params![
                key.sku,
                key.product_name,
                key.product_family,
                key.service_code,
                key.region,
                key.instance_type
            ],
            |row| row.get(0),
        )?;
        Ok((id, inserted > 0))
    }

    pub fn existing_pricing(&self) -> Result<HashMap<PricingKey, i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, term, unit FROM aws_cost_entry_pricing")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                PricingKey {
                    term: row.get(1)?,
                    unit: row.get(2)?,
                },
                row.get(0)?,
            ))
        })?;
        collect_keys(rows)
    }

    pub fn insert_or_get_pricing(&mut self, key: &PricingKey) -> Result<(i64, bool)> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO aws_cost_entry_pricing (term, unit) VALUES (?1, ?2)",
            params![key.term, key.unit],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM aws_cost_entry_pricing WHERE term = ?1 AND unit = ?2",
            params![key.term, key.unit],
            |row| row.get(0),
        )?;
        Ok((id, inserted > 0))
    }

    pub fn existing_reservations(&self) -> Result<HashMap<ReservationKey, i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, reservation_arn FROM aws_cost_entry_reservation")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                ReservationKey {
                    reservation_arn: row.get(1)?,
                },
                row.get(0)?,
            ))
        })?;
        collect_keys(rows)
    }

    pub fn insert_or_get_reservation(&mut self, key: &ReservationKey) -> Result<(i64, bool)> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO aws_cost_entry_reservation (reservation_arn) VALUES (?1)",
            params![key.reservation_arn],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM aws_cost_entry_reservation WHERE reservation_arn = ?1",
            params![key.reservation_arn],
            |row| row.get(0),
        )?;
        Ok((id, inserted > 0))
    }

    pub fn existing_report_periods(
        &self,
        provider_id: &str,
    ) -> Result<HashMap<ReportPeriodKey, i64>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, cluster_id, report_period_start, report_period_end, provider_id
            FROM ocp_usage_report_period
            WHERE provider_id = ?1
            "#,
        )?;
        let rows = stmt.query_map(params![provider_id], |row| {
            Ok((
                ReportPeriodKey {
                    cluster_id: row.get(1)?,
                    report_period_start: row.get(2)?,
                    report_period_end: row.get(3)?,
                    provider_id: row.get(4)?,
                },
                row.get(0)?,
            ))
        })?;
        collect_keys(rows)
    }

    pub fn insert_or_get_report_period(&mut self, key: &ReportPeriodKey) -> Result<(i64, bool)> {
        let inserted = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO ocp_usage_report_period (
              cluster_id, report_period_start, report_period_end, provider_id
            ) VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                key.cluster_id,
                key.report_period_start,
                key.report_period_end,
                key.provider_id
            ],
        )?;
        let id = self.conn.query_row(
            r#"
            SELECT id FROM ocp_usage_report_period
            WHERE cluster_id = ?1 AND report_period_start = ?2 AND provider_id = ?3
            "#,
            params![key.cluster_id, key.report_period_start, key.provider_id],
            |row| row.get(0),
        )?;
        Ok((id, inserted > 0))
    }

    pub fn existing_reports(&self, provider_id: &str) -> Result<HashMap<ReportKey, i64>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT r.id, r.report_period_id, r.interval_start, r.interval_end
            FROM ocp_usage_report r
            JOIN ocp_usage_report_period p ON p.id = r.report_period_id
            WHERE p.provider_id = ?1
            "#,
        )?;
        let rows = stmt.query_map(params![provider_id], |row| {
            Ok((
                ReportKey {
                    report_period_id: row.get(1)?,
                    interval_start: row.get(2)?,
                    interval_end: row.get(3)?,
                },
                row.get(0)?,
            ))
        })?;
        collect_keys(rows)
    }

    pub fn insert_or_get_report(&mut self, key: &ReportKey) -> Result<(i64, bool)> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO ocp_usage_report (report_period_id, interval_start, interval_end) VALUES (?1, ?2, ?3)",
            params![key.report_period_id, key.interval_start, key.interval_end],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM ocp_usage_report WHERE report_period_id = ?1 AND interval_start = ?2",
            params![key.report_period_id, key.interval_start],
            |row| row.get(0),
        )?;
        Ok((id, inserted > 0))
    }
}

fn collect_keys<K, I>(rows: I) -> Result<HashMap<K, i64>>
where
    K: std::hash::Hash + Eq,
    I: Iterator<Item = rusqlite::Result<(K, i64)>>,
{
    let mut out = HashMap::new();
    for row in rows {
        let (key, id) = row?;
        out.insert(key, id);
    }
    Ok(out)
}
