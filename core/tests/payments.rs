//! Payment simulation tests.

use chrono::NaiveDate;
use gridsynth_core::billing::Bill;
use gridsynth_core::config::{ChannelKind, PaymentChannel, PaymentConfig, SimConfig};
use gridsynth_core::payment::{PaymentSimulator, PaymentStatus};
use gridsynth_core::pipeline::GenerationPipeline;
use gridsynth_core::rng::{RngBank, StreamSlot};
use gridsynth_core::tariff::TariffCode;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn sample_bill() -> Bill {
    Bill {
        bill_id: "BILL-MTR-ISL-0000001-202402".into(),
        meter_number: "MTR-ISL-0000001".into(),
        consumer_id: "CON-ISL-0000001".into(),
        tariff: TariffCode::A1,
        billing_month: date(2024, 2, 1),
        units_billed: 250.0,
        variable_charge: 1900.0,
        fixed_charge: 50.0,
        gst: 351.0,
        duty: 28.5,
        tv_fee: 0.0,
        late_surcharge: 0.0,
        total: 2329.5,
        after_due_total: 2445.98,
        issue_date: date(2024, 3, 20),
        due_date: date(2024, 4, 3),
    }
}

fn single_channel_config(paid_probability: f64) -> PaymentConfig {
    PaymentConfig {
        base_paid_probability: paid_probability,
        reliable_paid_probability: paid_probability,
        large_bill_threshold: 5_000.0,
        large_bill_probability: paid_probability,
        very_large_bill_threshold: 10_000.0,
        very_large_bill_probability: paid_probability,
        early_weight: 1.0,
        late_short_weight: 0.0,
        late_long_weight: 0.0,
        partial_probability: 0.0,
        channels: vec![PaymentChannel {
            name: "Online Banking".into(),
            weight: 1.0,
            kind: ChannelKind::Bank,
        }],
    }
}

#[test]
fn settled_bill_pays_face_value_before_due() {
    let config = SimConfig::default_test();
    let bill = sample_bill();
    let tariff = &config.tariffs[&TariffCode::A1];
    let mut rng = RngBank::new(5).for_meter(StreamSlot::Payment, &bill.meter_number);

    let record =
        PaymentSimulator::generate_payment(&single_channel_config(1.0), &bill, tariff, &mut rng);

    assert_eq!(record.status, PaymentStatus::Paid);
    assert_eq!(record.amount_paid, bill.total);
    assert!((record.outstanding).abs() < 1e-9);
    let paid_on = record.payment_date.expect("paid bill has a date");
    assert!(
        paid_on > bill.issue_date && paid_on < bill.due_date,
        "Early bucket settles between issue and due, got {paid_on}"
    );
    assert_eq!(record.method.as_deref(), Some("Online Banking"));
    let txn = record.transaction_id.expect("paid bill has a transaction id");
    assert!(txn.starts_with("BNK"), "Bank transactions use the BNK prefix");
    assert_eq!(txn.len(), 12, "BNK + 9 digits");
}

#[test]
fn unsettled_bill_has_no_payment_details() {
    let config = SimConfig::default_test();
    let bill = sample_bill();
    let tariff = &config.tariffs[&TariffCode::A1];
    let mut rng = RngBank::new(5).for_meter(StreamSlot::Payment, &bill.meter_number);

    let record =
        PaymentSimulator::generate_payment(&single_channel_config(0.0), &bill, tariff, &mut rng);

    assert_eq!(record.status, PaymentStatus::Unpaid);
    assert_eq!(record.amount_paid, 0.0);
    assert_eq!(record.outstanding, bill.total);
    assert!(record.payment_date.is_none());
    assert!(record.method.is_none());
    assert!(record.transaction_id.is_none());
}

#[test]
fn outstanding_always_reconciles_with_amounts() {
    let mut pipeline = GenerationPipeline::build_test("pay-reconcile-test", 23).unwrap();
    pipeline.run().unwrap();

    let payments = pipeline.store.payments_for_run("pay-reconcile-test").unwrap();
    assert!(!payments.is_empty(), "A full run must produce payment records");
    for payment in &payments {
        let expected = ((payment.amount_due - payment.amount_paid) * 100.0).round() / 100.0;
        assert!(
            (payment.outstanding - expected).abs() < 1e-6,
            "Payment {} outstanding {} != due - paid = {}",
            payment.payment_id,
            payment.outstanding,
            expected
        );
        match payment.status {
            PaymentStatus::Unpaid => {
                assert_eq!(payment.amount_paid, 0.0);
                assert!(payment.payment_date.is_none());
                assert!(payment.method.is_none());
            }
            PaymentStatus::Paid | PaymentStatus::Partial => {
                assert!(payment.amount_paid > 0.0);
                assert!(payment.payment_date.is_some());
                assert!(payment.method.is_some());
                assert!(payment.transaction_id.is_some());
            }
        }
    }
}

#[test]
fn every_bill_gets_exactly_one_payment_record() {
    let mut pipeline = GenerationPipeline::build_test("pay-coverage-test", 31).unwrap();
    pipeline.run().unwrap();

    let bills = pipeline.store.bills_for_run("pay-coverage-test").unwrap();
    let payments = pipeline.store.payments_for_run("pay-coverage-test").unwrap();
    assert_eq!(
        bills.len(),
        payments.len(),
        "Bills and payment records must pair 1:1"
    );
    for (bill, payment) in bills.iter().zip(payments.iter()) {
        assert_eq!(payment.bill_id, bill.bill_id);
        assert_eq!(payment.amount_due, bill.total);
    }
}
