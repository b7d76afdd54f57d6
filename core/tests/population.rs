//! Population seeding and monthly event-rule tests.

use gridsynth_core::config::SimConfig;
use gridsynth_core::entity::{Location, TransformerKind};
use gridsynth_core::event::GridEvent;
use gridsynth_core::factory::EntityFactory;
use gridsynth_core::pipeline::GenerationPipeline;
use gridsynth_core::store::SimStore;
use std::collections::HashSet;

#[test]
fn seeding_creates_configured_population() {
    let mut pipeline = GenerationPipeline::build_test("pop-seed-test", 42).unwrap();
    let summary = pipeline.run().unwrap();

    // Test catalog: 1 grid station + 2 sub-divisions x 2 distribution.
    assert_eq!(
        summary.transformers, 5,
        "Expected 5 transformers, got {}",
        summary.transformers
    );
    assert!(
        summary.meters >= 12,
        "Expected at least the 12 seeded meters, got {}",
        summary.meters
    );
    assert_eq!(summary.months, 3, "Jan..Mar window should span 3 months");

    let transformers = pipeline.store.transformers_for_run("pop-seed-test").unwrap();
    assert_eq!(transformers.len(), 5);
    assert_eq!(
        transformers
            .iter()
            .filter(|t| t.kind == TransformerKind::Distribution)
            .count(),
        4,
        "2 sub-divisions x 2 distribution transformers"
    );
    assert!(
        transformers
            .iter()
            .all(|t| (0.0..=100.0).contains(&t.utilization_pct)),
        "Utilization must stay within [0, 100]"
    );
}

#[test]
fn meter_and_consumer_ids_are_unique() {
    let mut pipeline = GenerationPipeline::build_test("pop-ids-test", 7).unwrap();
    pipeline.run().unwrap();

    let meters = pipeline.store.meters_for_run("pop-ids-test").unwrap();
    let mut meter_numbers = HashSet::new();
    let mut consumer_ids = HashSet::new();
    for meter in &meters {
        assert!(
            meter_numbers.insert(meter.meter_number.clone()),
            "Duplicate meter number {}",
            meter.meter_number
        );
        assert!(
            consumer_ids.insert(meter.consumer_id.clone()),
            "Duplicate consumer id {}",
            meter.consumer_id
        );
    }
}

#[test]
fn replacement_chains_are_consistent() {
    let mut pipeline = GenerationPipeline::build_test("pop-replace-test", 99).unwrap();
    pipeline.run().unwrap();

    let meters = pipeline.store.meters_for_run("pop-replace-test").unwrap();
    for meter in meters.iter().filter(|m| m.previous_meter.is_some()) {
        let prev_number = meter.previous_meter.as_ref().unwrap();
        let predecessor = meters
            .iter()
            .find(|m| &m.meter_number == prev_number)
            .unwrap_or_else(|| panic!("Predecessor {prev_number} missing from meter table"));
        assert_eq!(
            meter.generation,
            predecessor.generation + 1,
            "Generation must increase along the replacement chain"
        );
        assert!(
            !predecessor.is_active(),
            "Replaced meter {prev_number} must be deactivated"
        );
        assert_eq!(
            meter.tariff, predecessor.tariff,
            "Successor keeps the predecessor's tariff"
        );
    }

    let replacements = pipeline
        .store
        .events_of_type("pop-replace-test", "meter_replacement")
        .unwrap();
    let successors = meters.iter().filter(|m| m.previous_meter.is_some()).count();
    assert_eq!(
        replacements.len(),
        successors,
        "One replacement event per successor meter"
    );
}

#[test]
fn month_completed_event_per_month() {
    let mut pipeline = GenerationPipeline::build_test("pop-months-test", 3).unwrap();
    pipeline.run().unwrap();

    let count = pipeline
        .store
        .event_count("pop-months-test", "month_completed")
        .unwrap();
    assert_eq!(count, 3, "Expected one month_completed event per month");
}

#[test]
fn feeder_outage_silences_attached_meters() {
    let mut config = SimConfig::default_test();
    config.run.seed = 5;
    // Trip feeders aggressively so every seed sees outages.
    config.event_rates.transformer_outage = 2.0;
    let store = SimStore::in_memory().unwrap();
    store.migrate().unwrap();
    store.insert_run("pop-outage-test", 5, "test").unwrap();
    let mut pipeline = GenerationPipeline::new("pop-outage-test", config, store);
    pipeline.run().unwrap();

    let outages = pipeline
        .store
        .events_of_type("pop-outage-test", "transformer_outage")
        .unwrap();
    assert!(
        !outages.is_empty(),
        "The inflated outage rate must trip at least one feeder"
    );

    let meters = pipeline.store.meters_for_run("pop-outage-test").unwrap();
    for entry in &outages {
        let event: GridEvent = serde_json::from_str(&entry.payload).unwrap();
        let (transformer, outage_start, outage_end) = match event {
            GridEvent::TransformerOutage {
                transformer,
                outage_start,
                outage_end,
                ..
            } => (transformer, outage_start, outage_end),
            other => panic!("Expected a transformer outage payload, got {other:?}"),
        };
        for meter in meters.iter().filter(|m| m.transformer_id == transformer) {
            let readings = pipeline
                .store
                .readings_for_meter("pop-outage-test", &meter.meter_number)
                .unwrap();
            assert!(
                readings
                    .iter()
                    .all(|r| r.ts.date() < outage_start || r.ts.date() > outage_end),
                "Meter {} must be silent during its feeder outage",
                meter.meter_number
            );
        }
    }
}

#[test]
fn transformer_upgrade_rescales_utilization() {
    let mut factory = EntityFactory::new();
    let location = Location {
        district: "ISLAMABAD".into(),
        division: "Islamabad Division 1".into(),
        sub_division: "F-8 Sub-Division".into(),
    };
    let mut transformer = factory.create_transformer(
        TransformerKind::Distribution,
        500.0,
        &location,
        "Grid Station F-8",
        chrono::NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(),
        90.0,
    );

    transformer.apply_upgrade(chrono::NaiveDate::from_ymd_opt(2024, 2, 10).unwrap(), 750.0);

    assert_eq!(transformer.rating_kva, 750.0);
    let expected = 90.0 * 500.0 / 750.0;
    assert!(
        (transformer.utilization_pct - expected).abs() < 1e-9,
        "Utilization must rescale by old/new rating, got {}",
        transformer.utilization_pct
    );
    assert_eq!(transformer.upgrade_history.len(), 1);
    assert_eq!(transformer.upgrade_history[0].old_rating_kva, 500.0);

    // Downgrade attempts are ignored.
    transformer.apply_upgrade(chrono::NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(), 400.0);
    assert_eq!(transformer.rating_kva, 750.0);
    assert_eq!(transformer.upgrade_history.len(), 1);
}
