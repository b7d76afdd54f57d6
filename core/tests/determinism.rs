//! THE MOST IMPORTANT TESTS IN THE PROJECT.
//!
//! Same seed, same catalog: byte-identical output, whether the
//! per-meter stage runs sequentially or on a worker pool.
//! Any divergence is a blocker — do not merge until fixed.

use gridsynth_core::pipeline::GenerationPipeline;

#[test]
fn same_seed_produces_identical_runs() {
    const SEED: u64 = 0xDEAD_BEEF_CAFE_1234;

    let mut pipeline_a = GenerationPipeline::build_test("det-a", SEED).unwrap();
    let mut pipeline_b = GenerationPipeline::build_test("det-b", SEED).unwrap();
    let summary_a = pipeline_a.run().unwrap();
    let summary_b = pipeline_b.run().unwrap();

    assert_eq!(summary_a.meters, summary_b.meters);
    assert_eq!(summary_a.transformers, summary_b.transformers);
    assert_eq!(summary_a.readings, summary_b.readings);
    assert_eq!(summary_a.bills, summary_b.bills);
    assert_eq!(summary_a.payments, summary_b.payments);
    assert_eq!(summary_a.events, summary_b.events);

    let bills_a = pipeline_a.store.bills_for_run("det-a").unwrap();
    let bills_b = pipeline_b.store.bills_for_run("det-b").unwrap();
    assert_eq!(bills_a.len(), bills_b.len());
    for (a, b) in bills_a.iter().zip(bills_b.iter()) {
        assert_eq!(a.bill_id, b.bill_id, "Bill id diverged");
        assert_eq!(a.units_billed, b.units_billed, "Units diverged on {}", a.bill_id);
        assert_eq!(a.total, b.total, "Total diverged on {}", a.bill_id);
    }
}

#[test]
fn different_seeds_diverge() {
    let mut pipeline_a = GenerationPipeline::build_test("div-a", 1).unwrap();
    let mut pipeline_b = GenerationPipeline::build_test("div-b", 2).unwrap();
    let summary_a = pipeline_a.run().unwrap();
    let summary_b = pipeline_b.run().unwrap();

    // Reading volume depends on install dates and defect draws; two
    // seeds agreeing exactly would point at a seeding bug.
    assert_ne!(
        summary_a.readings, summary_b.readings,
        "Different seeds must not produce identical reading volumes"
    );
}

#[test]
fn parallel_matches_sequential() {
    const SEED: u64 = 777;

    let mut sequential = GenerationPipeline::build_test("par-seq", SEED).unwrap();
    let mut parallel = GenerationPipeline::build_test("par-par", SEED).unwrap();
    let summary_seq = sequential.run().unwrap();
    let summary_par = parallel.run_parallel(4).unwrap();

    assert_eq!(summary_seq.readings, summary_par.readings);
    assert_eq!(summary_seq.bills, summary_par.bills);
    assert_eq!(summary_seq.payments, summary_par.payments);
    assert_eq!(summary_seq.failures, 0);
    assert_eq!(summary_par.failures, 0);

    let bills_seq = sequential.store.bills_for_run("par-seq").unwrap();
    let bills_par = parallel.store.bills_for_run("par-par").unwrap();
    for (a, b) in bills_seq.iter().zip(bills_par.iter()) {
        assert_eq!(a.bill_id, b.bill_id, "Bill id diverged across pipelines");
        assert_eq!(a.total, b.total, "Total diverged on {}", a.bill_id);
        assert_eq!(a.units_billed, b.units_billed, "Units diverged on {}", a.bill_id);
    }

    let payments_seq = sequential.store.payments_for_run("par-seq").unwrap();
    let payments_par = parallel.store.payments_for_run("par-par").unwrap();
    for (a, b) in payments_seq.iter().zip(payments_par.iter()) {
        assert_eq!(a.payment_id, b.payment_id);
        assert_eq!(a.amount_paid, b.amount_paid);
        assert_eq!(a.status, b.status);
    }
}
