//! Monthly billing: consumption reconciliation, progressive slab
//! charges, taxes and surcharges, and the bill calendar.
//!
//! RULES:
//!   - One bill per meter per calendar month with at least one reading.
//!   - A month with zero readings produces no bill, never a zero bill.
//!   - Every money amount is rounded to 2 decimals at the component
//!     level; the total is the rounded sum of rounded components, so
//!     total == variable + fixed + gst + duty + tv + surcharge holds
//!     to the paisa.

use crate::{
    config::{ReconciliationPolicy, SimConfig},
    entity::{MeterRecord, QualityFlag},
    error::SimResult,
    reading::MeterReading,
    rng::StreamRng,
    tariff::variable_charge,
    types::{ConsumerId, Kwh, MeterId, Rupees},
};
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bill {
    pub bill_id: String,
    pub meter_number: MeterId,
    pub consumer_id: ConsumerId,
    pub tariff: crate::tariff::TariffCode,
    /// First day of the consumption month.
    pub billing_month: NaiveDate,
    pub units_billed: Kwh,
    pub variable_charge: Rupees,
    pub fixed_charge: Rupees,
    pub gst: Rupees,
    pub duty: Rupees,
    pub tv_fee: Rupees,
    pub late_surcharge: Rupees,
    pub total: Rupees,
    /// Amount owed if settled after the due date.
    pub after_due_total: Rupees,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
}

pub struct BillingEngine;

impl BillingEngine {
    /// Compute one month's bill from that month's reading stream.
    /// `readings` must already be filtered to `billing_month` and
    /// ordered by timestamp.
    pub fn calculate_bill(
        config: &SimConfig,
        meter: &MeterRecord,
        billing_month: NaiveDate,
        readings: &[MeterReading],
        rng: &mut StreamRng,
    ) -> SimResult<Option<Bill>> {
        if readings.is_empty() {
            log::debug!(
                "meter {}: no readings in {billing_month}, skipping bill",
                meter.meter_number
            );
            return Ok(None);
        }
        let tariff = config.tariff(meter.tariff)?;
        let billing = &config.billing;

        let units_billed = round2(reconcile(billing.reconciliation, readings));
        let variable = round2(variable_charge(&tariff.slabs, units_billed));
        let fixed = round2(tariff.fixed_charge.charge_for(meter.connected_load_kw));
        let gst = round2((variable + fixed) * billing.gst_rate);
        let duty = round2(variable * billing.duty_rate);

        // Both rolls are always consumed so the stream stays aligned
        // across bills. The TV fee applies to every tariff class.
        let tv_fee = if rng.chance(billing.tv_fee_probability) {
            billing.tv_fee
        } else {
            0.0
        };
        let late_surcharge = if rng.chance(billing.late_surcharge_probability) {
            round2((variable + fixed) * billing.late_surcharge_rate)
        } else {
            0.0
        };

        let total = round2(variable + fixed + gst + duty + tv_fee + late_surcharge);
        let after_due_total = round2(total * billing.after_due_multiplier);

        let issue_date = issue_date_for(billing_month, billing.issue_day);
        let due_date = issue_date + Duration::days(billing.due_days);

        Ok(Some(Bill {
            bill_id: format!(
                "BILL-{}-{:04}{:02}",
                meter.meter_number,
                billing_month.year(),
                billing_month.month()
            ),
            meter_number: meter.meter_number.clone(),
            consumer_id: meter.consumer_id.clone(),
            tariff: meter.tariff,
            billing_month,
            units_billed,
            variable_charge: variable,
            fixed_charge: fixed,
            gst,
            duty,
            tv_fee,
            late_surcharge,
            total,
            after_due_total,
            issue_date,
            due_date,
        }))
    }
}

/// Recover the month's billable units from the reading stream.
fn reconcile(policy: ReconciliationPolicy, readings: &[MeterReading]) -> f64 {
    match policy {
        ReconciliationPolicy::RegisterDelta => {
            let first = &readings[0];
            let last = &readings[readings.len() - 1];
            let opening = first.register_kwh - first.consumption_kwh;
            let delta = last.register_kwh - opening;
            if delta >= 0.0 {
                delta
            } else {
                // Register went backward (negative/reverse defects);
                // fall back to the trusted interval sum.
                normal_interval_sum(readings)
            }
        }
        ReconciliationPolicy::NormalIntervalSum => normal_interval_sum(readings),
    }
}

fn normal_interval_sum(readings: &[MeterReading]) -> f64 {
    readings
        .iter()
        .filter(|r| r.quality == QualityFlag::Normal)
        .map(|r| r.consumption_kwh)
        .sum::<f64>()
        .max(0.0)
}

/// Bills for month M are issued on `issue_day` of month M+1.
fn issue_date_for(billing_month: NaiveDate, issue_day: u32) -> NaiveDate {
    let (year, month) = if billing_month.month() == 12 {
        (billing_month.year() + 1, 1)
    } else {
        (billing_month.year(), billing_month.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, issue_day)
        .unwrap_or(billing_month + Duration::days(40))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
