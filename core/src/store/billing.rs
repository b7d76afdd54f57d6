use super::{date_from_sql, SimStore};
use crate::{
    billing::Bill,
    error::SimResult,
    payment::{PaymentRecord, PaymentStatus},
    tariff::TariffCode,
};
use rusqlite::params;

impl SimStore {
    // ── Bill ──────────────────────────────────────────────────

    pub fn insert_bill(&self, run_id: &str, b: &Bill) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO bill (
                bill_id, run_id, meter_number, consumer_id, tariff, billing_month,
                issue_date, due_date, consumption_kwh, variable_charge, fixed_charge,
                gst, duty, tv_fee, late_surcharge, total_amount, amount_after_due
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                      ?14, ?15, ?16, ?17)",
            params![
                &b.bill_id,
                run_id,
                &b.meter_number,
                &b.consumer_id,
                b.tariff.as_str(),
                b.billing_month.to_string(),
                b.issue_date.to_string(),
                b.due_date.to_string(),
                b.units_billed,
                b.variable_charge,
                b.fixed_charge,
                b.gst,
                b.duty,
                b.tv_fee,
                b.late_surcharge,
                b.total,
                b.after_due_total,
            ],
        )?;
        Ok(())
    }

    pub fn bills_for_run(&self, run_id: &str) -> SimResult<Vec<Bill>> {
        let mut stmt = self.conn.prepare(
            "SELECT bill_id, meter_number, consumer_id, tariff, billing_month,
                    issue_date, due_date, consumption_kwh, variable_charge, fixed_charge,
                    gst, duty, tv_fee, late_surcharge, total_amount, amount_after_due
             FROM bill WHERE run_id = ?1 ORDER BY bill_id",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            let tariff_raw: String = row.get(3)?;
            Ok(Bill {
                bill_id: row.get(0)?,
                meter_number: row.get(1)?,
                consumer_id: row.get(2)?,
                tariff: TariffCode::parse(&tariff_raw).ok_or_else(|| {
                    rusqlite::Error::FromSqlConversionFailure(
                        3,
                        rusqlite::types::Type::Text,
                        format!("bad tariff '{tariff_raw}'").into(),
                    )
                })?,
                billing_month: date_from_sql(4, row.get(4)?)?,
                issue_date: date_from_sql(5, row.get(5)?)?,
                due_date: date_from_sql(6, row.get(6)?)?,
                units_billed: row.get(7)?,
                variable_charge: row.get(8)?,
                fixed_charge: row.get(9)?,
                gst: row.get(10)?,
                duty: row.get(11)?,
                tv_fee: row.get(12)?,
                late_surcharge: row.get(13)?,
                total: row.get(14)?,
                after_due_total: row.get(15)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn bill_count(&self, run_id: &str) -> SimResult<i64> {
        self.count_for_run("bill", run_id)
    }

    // ── Payment ───────────────────────────────────────────────

    pub fn insert_payment(&self, run_id: &str, p: &PaymentRecord) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO payment (
                payment_id, run_id, bill_id, meter_number, status, payment_date,
                amount_due, amount_paid, method, transaction_id, outstanding
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                &p.payment_id,
                run_id,
                &p.bill_id,
                &p.meter_number,
                p.status.as_str(),
                p.payment_date.map(|d| d.to_string()),
                p.amount_due,
                p.amount_paid,
                &p.method,
                &p.transaction_id,
                p.outstanding,
            ],
        )?;
        Ok(())
    }

    pub fn payments_for_run(&self, run_id: &str) -> SimResult<Vec<PaymentRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT payment_id, bill_id, meter_number, status, payment_date,
                    amount_due, amount_paid, method, transaction_id, outstanding
             FROM payment WHERE run_id = ?1 ORDER BY payment_id",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            let status_raw: String = row.get(3)?;
            let date_raw: Option<String> = row.get(4)?;
            Ok(PaymentRecord {
                payment_id: row.get(0)?,
                bill_id: row.get(1)?,
                meter_number: row.get(2)?,
                status: payment_status_from_sql(3, status_raw)?,
                payment_date: date_raw.map(|d| date_from_sql(4, d)).transpose()?,
                amount_due: row.get(5)?,
                amount_paid: row.get(6)?,
                method: row.get(7)?,
                transaction_id: row.get(8)?,
                outstanding: row.get(9)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn payment_count(&self, run_id: &str) -> SimResult<i64> {
        self.count_for_run("payment", run_id)
    }
}

fn payment_status_from_sql(idx: usize, raw: String) -> rusqlite::Result<PaymentStatus> {
    match raw.as_str() {
        "paid" => Ok(PaymentStatus::Paid),
        "partial" => Ok(PaymentStatus::Partial),
        "unpaid" => Ok(PaymentStatus::Unpaid),
        _ => Err(rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("bad payment status '{raw}'").into(),
        )),
    }
}
