//! Bill calculation tests: slab arithmetic, component rounding, and
//! the billing calendar.

use chrono::NaiveDate;
use gridsynth_core::billing::BillingEngine;
use gridsynth_core::config::{ReconciliationPolicy, SimConfig};
use gridsynth_core::entity::{Location, MeterClass, MeterRecord, MeterStatus, QualityFlag};
use gridsynth_core::pipeline::GenerationPipeline;
use gridsynth_core::reading::MeterReading;
use gridsynth_core::rng::{RngBank, StreamSlot};
use gridsynth_core::tariff::{variable_charge, PhaseType, TariffCode};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn residential_meter() -> MeterRecord {
    MeterRecord {
        meter_number: "MTR-ISL-0000001".into(),
        consumer_id: "CON-ISL-0000001".into(),
        reference_no: "REF-0000000001".into(),
        previous_meter: None,
        generation: 1,
        tariff: TariffCode::A1,
        location: Location {
            district: "ISLAMABAD".into(),
            division: "Islamabad Division 1".into(),
            sub_division: "F-8 Sub-Division".into(),
        },
        transformer_id: "TR-D-00001".into(),
        phase: PhaseType::Single,
        connected_load_kw: 3.0,
        sanctioned_load_kw: 3.6,
        installation_date: date(2023, 1, 1),
        deactivation_date: None,
        status: MeterStatus::Active,
        has_solar: false,
        solar_capacity_kw: 0.0,
        meter_class: MeterClass::Smart,
        last_register_kwh: 1250.0,
        tariff_history: Vec::new(),
    }
}

fn register_reading(ts: chrono::NaiveDateTime, register: f64, consumption: f64) -> MeterReading {
    MeterReading {
        meter_number: "MTR-ISL-0000001".into(),
        ts,
        register_kwh: register,
        consumption_kwh: consumption,
        voltage: 230.0,
        current_a: 1.5,
        frequency_hz: 50.0,
        power_factor: 0.92,
        temperature_c: 20.0,
        signal_dbm: -70.0,
        battery_v: 3.7,
        quality: QualityFlag::Normal,
    }
}

fn flagged_reading(
    ts: chrono::NaiveDateTime,
    register: f64,
    consumption: f64,
    quality: QualityFlag,
) -> MeterReading {
    MeterReading {
        quality,
        ..register_reading(ts, register, consumption)
    }
}

#[test]
fn slab_charge_accumulates_progressively() {
    let config = SimConfig::default_test();
    let slabs = &config.tariffs[&TariffCode::A1].slabs;

    // 250 units: 100 @ 5.79 + 100 @ 8.11 + 50 @ 10.20
    let charge = variable_charge(slabs, 250.0);
    assert!(
        (charge - 1900.0).abs() < 1e-9,
        "Expected 1900.00 for 250 units, got {charge}"
    );

    assert_eq!(variable_charge(slabs, 0.0), 0.0);
    assert_eq!(variable_charge(slabs, -10.0), 0.0);
}

#[test]
fn residential_bill_components() {
    let mut config = SimConfig::default_test();
    // Pin down the stochastic fees for exact component checks.
    config.billing.tv_fee_probability = 0.0;
    config.billing.late_surcharge_probability = 0.0;

    let meter = residential_meter();
    let readings = vec![
        register_reading(date(2024, 2, 1).and_hms_opt(0, 0, 0).unwrap(), 1000.0, 0.0),
        register_reading(date(2024, 2, 28).and_hms_opt(23, 0, 0).unwrap(), 1250.0, 1.2),
    ];
    let mut rng = RngBank::new(1).for_meter(StreamSlot::Billing, &meter.meter_number);

    let bill = BillingEngine::calculate_bill(&config, &meter, date(2024, 2, 1), &readings, &mut rng)
        .unwrap()
        .expect("month with readings must bill");

    assert_eq!(bill.bill_id, "BILL-MTR-ISL-0000001-202402");
    assert!((bill.units_billed - 250.0).abs() < 1e-9);
    assert!((bill.variable_charge - 1900.0).abs() < 1e-9);
    assert!((bill.fixed_charge - 50.0).abs() < 1e-9, "3 kW is below the 5 kW threshold");
    assert!((bill.gst - 351.0).abs() < 1e-9, "GST is 18% of variable+fixed");
    assert!((bill.duty - 28.5).abs() < 1e-9, "Duty is 1.5% of variable");
    assert_eq!(bill.tv_fee, 0.0);
    assert_eq!(bill.late_surcharge, 0.0);
    assert!((bill.total - 2329.5).abs() < 1e-9);
    assert!((bill.after_due_total - 2445.98).abs() < 1e-9);
    assert_eq!(bill.issue_date, date(2024, 3, 20), "Issued on the 20th of the next month");
    assert_eq!(bill.due_date, date(2024, 4, 3), "Due 14 days after issue");
}

#[test]
fn tv_fee_applies_to_every_tariff_class() {
    let mut config = SimConfig::default_test();
    config.billing.tv_fee_probability = 1.0;
    config.billing.late_surcharge_probability = 0.0;

    let mut meter = residential_meter();
    meter.tariff = TariffCode::A2;
    meter.connected_load_kw = 10.0;
    let readings = vec![
        register_reading(date(2024, 2, 1).and_hms_opt(0, 0, 0).unwrap(), 1000.0, 0.0),
        register_reading(date(2024, 2, 28).and_hms_opt(23, 0, 0).unwrap(), 1250.0, 1.2),
    ];
    let mut rng = RngBank::new(1).for_meter(StreamSlot::Billing, &meter.meter_number);

    let bill = BillingEngine::calculate_bill(&config, &meter, date(2024, 2, 1), &readings, &mut rng)
        .unwrap()
        .expect("month with readings must bill");

    assert_eq!(
        bill.tv_fee, 35.0,
        "The TV fee is charged on commercial bills too"
    );
}

#[test]
fn backward_register_bills_the_normal_interval_sum() {
    let mut config = SimConfig::default_test();
    config.billing.tv_fee_probability = 0.0;
    config.billing.late_surcharge_probability = 0.0;

    let meter = residential_meter();
    // A negative-reading defect drags the register from 1010 to 510,
    // so the month's net delta is -470.
    let readings = vec![
        register_reading(date(2024, 2, 1).and_hms_opt(0, 0, 0).unwrap(), 1010.0, 10.0),
        flagged_reading(
            date(2024, 2, 10).and_hms_opt(0, 0, 0).unwrap(),
            510.0,
            -500.0,
            QualityFlag::NegativeReading,
        ),
        register_reading(date(2024, 2, 20).and_hms_opt(0, 0, 0).unwrap(), 530.0, 20.0),
    ];
    let mut rng = RngBank::new(1).for_meter(StreamSlot::Billing, &meter.meter_number);

    let bill = BillingEngine::calculate_bill(&config, &meter, date(2024, 2, 1), &readings, &mut rng)
        .unwrap()
        .expect("month with readings must bill");

    assert!(
        (bill.units_billed - 30.0).abs() < 1e-9,
        "A backward register must bill the sum of normal intervals, got {}",
        bill.units_billed
    );
}

#[test]
fn interval_sum_policy_skips_flagged_intervals() {
    let mut config = SimConfig::default_test();
    config.billing.reconciliation = ReconciliationPolicy::NormalIntervalSum;
    config.billing.tv_fee_probability = 0.0;
    config.billing.late_surcharge_probability = 0.0;

    let meter = residential_meter();
    // Register advances 230 units, but 200 of them are a flagged spike.
    let readings = vec![
        register_reading(date(2024, 2, 1).and_hms_opt(0, 0, 0).unwrap(), 1010.0, 10.0),
        flagged_reading(
            date(2024, 2, 10).and_hms_opt(0, 0, 0).unwrap(),
            1210.0,
            200.0,
            QualityFlag::AbnormalSpike,
        ),
        register_reading(date(2024, 2, 20).and_hms_opt(0, 0, 0).unwrap(), 1230.0, 20.0),
    ];
    let mut rng = RngBank::new(1).for_meter(StreamSlot::Billing, &meter.meter_number);

    let bill = BillingEngine::calculate_bill(&config, &meter, date(2024, 2, 1), &readings, &mut rng)
        .unwrap()
        .expect("month with readings must bill");

    assert!(
        (bill.units_billed - 30.0).abs() < 1e-9,
        "Interval-sum policy must bill only normal intervals, got {}",
        bill.units_billed
    );
}

#[test]
fn empty_month_produces_no_bill() {
    let config = SimConfig::default_test();
    let meter = residential_meter();
    let mut rng = RngBank::new(1).for_meter(StreamSlot::Billing, &meter.meter_number);

    let bill =
        BillingEngine::calculate_bill(&config, &meter, date(2024, 2, 1), &[], &mut rng).unwrap();
    assert!(bill.is_none(), "A month without readings must not bill");
}

#[test]
fn bill_totals_conserve_components() {
    let mut pipeline = GenerationPipeline::build_test("bill-conserve-test", 11).unwrap();
    pipeline.run().unwrap();

    let bills = pipeline.store.bills_for_run("bill-conserve-test").unwrap();
    assert!(!bills.is_empty(), "A full run must produce bills");
    for bill in &bills {
        let component_sum = bill.variable_charge
            + bill.fixed_charge
            + bill.gst
            + bill.duty
            + bill.tv_fee
            + bill.late_surcharge;
        assert!(
            (bill.total - component_sum).abs() < 1e-6,
            "Bill {} total {} != component sum {}",
            bill.bill_id,
            bill.total,
            component_sum
        );
        let after_due = (bill.total * 1.05 * 100.0).round() / 100.0;
        assert!(
            (bill.after_due_total - after_due).abs() < 1e-6,
            "Bill {} after-due amount mismatch",
            bill.bill_id
        );
        assert!(bill.units_billed >= 0.0, "Billed units are never negative");
    }
}
