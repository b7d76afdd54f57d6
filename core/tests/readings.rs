//! Interval reading generation and defect taxonomy tests.

use chrono::NaiveDate;
use gridsynth_core::config::{DefectBand, DefectConfig, SimConfig};
use gridsynth_core::entity::{Location, MeterRecord, MeterStatus, QualityFlag};
use gridsynth_core::factory::EntityFactory;
use gridsynth_core::pipeline::GenerationPipeline;
use gridsynth_core::reading::ReadingGenerator;
use gridsynth_core::rng::{RngBank, StreamSlot};
use gridsynth_core::tariff::TariffCode;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn test_meter(config: &SimConfig, install: NaiveDate) -> MeterRecord {
    let mut factory = EntityFactory::new();
    let mut rng = RngBank::new(7).for_stream(StreamSlot::Seeding);
    let location = Location {
        district: "ISLAMABAD".into(),
        division: "Islamabad Division 1".into(),
        sub_division: "F-8 Sub-Division".into(),
    };
    factory
        .create_meter(
            config,
            &location,
            &[(TariffCode::A1, 1.0)],
            "TR-D-00001",
            None,
            install,
            &mut rng,
        )
        .unwrap()
}

fn reading_rng(meter: &MeterRecord) -> gridsynth_core::rng::StreamRng {
    RngBank::new(42).for_meter(StreamSlot::Readings, &meter.meter_number)
}

#[test]
fn readings_start_at_installation_date() {
    let config = SimConfig::default_test();
    let install = date(2024, 2, 15);
    let mut meter = test_meter(&config, install);
    let mut rng = reading_rng(&meter);

    let readings = ReadingGenerator::generate(&config, &mut meter, &[], &mut rng).unwrap();

    assert!(!readings.is_empty(), "Mid-window meter must produce readings");
    assert_eq!(
        readings[0].ts.date(),
        install,
        "First reading must land on the installation date"
    );
    assert!(
        readings.iter().all(|r| r.ts.date() >= install),
        "No reading may predate installation"
    );
}

#[test]
fn no_readings_after_deactivation() {
    let config = SimConfig::default_test();
    let mut meter = test_meter(&config, date(2023, 6, 1));
    let deactivated = date(2024, 2, 10);
    meter.deactivate(MeterStatus::Replaced, deactivated);
    let mut rng = reading_rng(&meter);

    let readings = ReadingGenerator::generate(&config, &mut meter, &[], &mut rng).unwrap();

    assert!(!readings.is_empty());
    assert!(
        readings.iter().all(|r| r.ts.date() < deactivated),
        "Readings must stop at deactivation"
    );
}

#[test]
fn outage_windows_suppress_readings() {
    let config = SimConfig::default_test();
    let mut meter = test_meter(&config, date(2023, 6, 1));
    let outage = (date(2024, 2, 5), date(2024, 2, 12));
    let mut rng = reading_rng(&meter);

    let readings =
        ReadingGenerator::generate(&config, &mut meter, &[outage], &mut rng).unwrap();

    assert!(
        readings
            .iter()
            .all(|r| r.ts.date() < outage.0 || r.ts.date() > outage.1),
        "No readings may fall inside an outage window"
    );
}

#[test]
fn register_is_monotonic_without_negative_defects() {
    let mut config = SimConfig::default_test();
    // Only missing-row defects: every emitted consumption is >= 0.
    config.defects = DefectConfig {
        bands: vec![DefectBand {
            flag: QualityFlag::MissingReading,
            probability: 0.05,
        }],
    };
    let mut meter = test_meter(&config, date(2023, 6, 1));
    let opening = meter.last_register_kwh;
    let mut rng = reading_rng(&meter);

    let readings = ReadingGenerator::generate(&config, &mut meter, &[], &mut rng).unwrap();

    let mut previous = opening;
    for reading in &readings {
        assert!(
            reading.register_kwh >= previous,
            "Register went backward: {} -> {}",
            previous,
            reading.register_kwh
        );
        assert!(
            (reading.register_kwh - (previous + reading.consumption_kwh)).abs() < 1e-3,
            "Register must advance by the interval consumption"
        );
        previous = reading.register_kwh;
    }
    assert_eq!(
        meter.last_register_kwh, previous,
        "Meter register must be left at the final reading"
    );
}

#[test]
fn persisted_stream_keeps_register_continuity() {
    let mut pipeline = GenerationPipeline::build_test("read-store-test", 21).unwrap();
    pipeline.run().unwrap();

    let meters = pipeline.store.meters_for_run("read-store-test").unwrap();
    assert!(!meters.is_empty());
    for meter in &meters {
        let readings = pipeline
            .store
            .readings_for_meter("read-store-test", &meter.meter_number)
            .unwrap();
        for pair in readings.windows(2) {
            assert!(
                pair[0].ts < pair[1].ts,
                "Meter {} stream must be strictly time-ordered",
                meter.meter_number
            );
            let expected = pair[0].register_kwh + pair[1].consumption_kwh;
            assert!(
                (pair[1].register_kwh - expected).abs() < 1e-6,
                "Meter {}: register must advance by the reported consumption",
                meter.meter_number
            );
        }
    }
}

#[test]
fn missing_readings_leave_gaps_not_rows() {
    let config = SimConfig::default_test();
    let mut meter = test_meter(&config, date(2024, 1, 1));
    let mut rng = reading_rng(&meter);

    let readings = ReadingGenerator::generate(&config, &mut meter, &[], &mut rng).unwrap();

    // 91 days of hourly intervals; the 2% missing rate leaves gaps.
    let expected_intervals = 91 * 24;
    assert!(
        readings.len() < expected_intervals,
        "Missing defects should suppress some of the {expected_intervals} intervals"
    );
    assert!(
        readings
            .iter()
            .all(|r| r.quality != QualityFlag::MissingReading),
        "A missing reading must never be emitted as a row"
    );
    assert!(
        readings.iter().any(|r| r.quality == QualityFlag::Normal),
        "Most readings should be normal"
    );
}
