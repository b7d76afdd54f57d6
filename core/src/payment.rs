//! Payment simulation: settlement probability, timing buckets, partial
//! payments, and channel assignment.
//!
//! Every bill gets exactly one payment record, unpaid ones included —
//! downstream consumers reconcile receivables against the full bill
//! set, so absence of payment is data, not a missing row.

use crate::{
    billing::Bill,
    config::{ChannelKind, PaymentConfig},
    rng::StreamRng,
    tariff::TariffConfig,
    types::{MeterId, Rupees},
};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Partial,
    Unpaid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paid => "paid",
            Self::Partial => "partial",
            Self::Unpaid => "unpaid",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub payment_id: String,
    pub bill_id: String,
    pub meter_number: MeterId,
    pub amount_due: Rupees,
    pub amount_paid: Rupees,
    /// total - paid; negative when late penalties push the settled
    /// amount above the original bill total.
    pub outstanding: Rupees,
    pub status: PaymentStatus,
    pub payment_date: Option<NaiveDate>,
    pub method: Option<String>,
    pub transaction_id: Option<String>,
}

pub struct PaymentSimulator;

impl PaymentSimulator {
    pub fn generate_payment(
        payment: &PaymentConfig,
        bill: &Bill,
        tariff: &TariffConfig,
        rng: &mut StreamRng,
    ) -> PaymentRecord {
        let paid_probability = if tariff.reliable_payer {
            payment.reliable_paid_probability
        } else if bill.total > payment.very_large_bill_threshold {
            payment.very_large_bill_probability
        } else if bill.total > payment.large_bill_threshold {
            payment.large_bill_probability
        } else {
            payment.base_paid_probability
        };

        if !rng.chance(paid_probability) {
            return PaymentRecord {
                payment_id: format!("PAY-{}", bill.bill_id),
                bill_id: bill.bill_id.clone(),
                meter_number: bill.meter_number.clone(),
                amount_due: bill.total,
                amount_paid: 0.0,
                outstanding: bill.total,
                status: PaymentStatus::Unpaid,
                payment_date: None,
                method: None,
                transaction_id: None,
            };
        }

        let (mut payment_date, mut amount) = pick_timing(payment, bill, rng);
        // Payments never predate the bill issue.
        if payment_date <= bill.issue_date {
            payment_date = bill.issue_date + Duration::days(1 + rng.next_u64_below(5) as i64);
        }

        let status = if rng.chance(payment.partial_probability) {
            amount *= rng.uniform(0.5, 0.95);
            PaymentStatus::Partial
        } else {
            PaymentStatus::Paid
        };
        let amount_paid = round2(amount);
        let outstanding = round2(bill.total - amount_paid);

        let channel = pick_channel(payment, rng);
        let (method, transaction_id) = match channel {
            Some(channel) => {
                let txn = transaction_id(channel.kind, rng);
                (Some(channel.name.clone()), Some(txn))
            }
            None => (None, None),
        };

        PaymentRecord {
            payment_id: format!("PAY-{}", bill.bill_id),
            bill_id: bill.bill_id.clone(),
            meter_number: bill.meter_number.clone(),
            amount_due: bill.total,
            amount_paid,
            outstanding,
            status,
            payment_date: Some(payment_date),
            method,
            transaction_id,
        }
    }
}

/// Three timing buckets: settled before due at face value, shortly
/// late at the after-due amount, long late with a creeping penalty.
fn pick_timing(payment: &PaymentConfig, bill: &Bill, rng: &mut StreamRng) -> (NaiveDate, f64) {
    let total_weight = payment.early_weight + payment.late_short_weight + payment.late_long_weight;
    let roll = rng.next_f64() * total_weight;
    if roll < payment.early_weight {
        let days_before = 1 + rng.next_u64_below(14) as i64;
        (bill.due_date - Duration::days(days_before), bill.total)
    } else if roll < payment.early_weight + payment.late_short_weight {
        let days_late = 1 + rng.next_u64_below(7) as i64;
        (bill.due_date + Duration::days(days_late), bill.after_due_total)
    } else {
        let days_late = 8 + rng.next_u64_below(23) as i64;
        (
            bill.due_date + Duration::days(days_late),
            bill.after_due_total * rng.uniform(1.0, 1.1),
        )
    }
}

fn pick_channel<'a>(
    payment: &'a PaymentConfig,
    rng: &mut StreamRng,
) -> Option<&'a crate::config::PaymentChannel> {
    if payment.channels.is_empty() {
        return None;
    }
    let total: f64 = payment.channels.iter().map(|c| c.weight).sum();
    let roll = rng.next_f64() * total;
    let mut cumulative = 0.0;
    for channel in &payment.channels {
        cumulative += channel.weight;
        if roll < cumulative {
            return Some(channel);
        }
    }
    payment.channels.last()
}

fn transaction_id(kind: ChannelKind, rng: &mut StreamRng) -> String {
    let (prefix, digits) = match kind {
        ChannelKind::Wallet => ("EP", 10),
        ChannelKind::Bank => ("BNK", 9),
        ChannelKind::Cash => ("CSH", 8),
    };
    let mut id = String::with_capacity(prefix.len() + digits);
    id.push_str(prefix);
    for _ in 0..digits {
        let digit = rng.next_u64_below(10) as u8;
        id.push((b'0' + digit) as char);
    }
    id
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
