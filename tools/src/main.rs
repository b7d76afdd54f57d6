//! grid-runner: headless dataset generation runner.
//!
//! Usage:
//!   grid-runner --seed 12345 --meters 1000 --db run.db
//!   grid-runner --seed 12345 --start 2024-01-01 --end 2024-06-30 --workers 8

use anyhow::Result;
use gridsynth_core::{
    config::SimConfig,
    pipeline::{GenerationPipeline, RunSummary},
    store::SimStore,
};
use std::env;
use uuid::Uuid;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let data_dir = args
        .windows(2)
        .find(|w| w[0] == "--data-dir")
        .map(|w| w[1].as_str());
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or(":memory:");
    let workers = parse_arg(&args, "--workers", 0usize);

    let mut config = match data_dir {
        Some(dir) => SimConfig::load(dir)?,
        None => SimConfig::builtin(),
    };
    config.run.seed = parse_arg(&args, "--seed", config.run.seed);
    config.run.start_date = parse_arg(&args, "--start", config.run.start_date);
    config.run.end_date = parse_arg(&args, "--end", config.run.end_date);
    config.run.initial_meters = parse_arg(&args, "--meters", config.run.initial_meters);
    config.run.reading_interval_min =
        parse_arg(&args, "--interval", config.run.reading_interval_min);

    println!("gridsynth — grid-runner");
    println!("  seed:     {}", config.run.seed);
    println!(
        "  window:   {} .. {}",
        config.run.start_date, config.run.end_date
    );
    println!("  meters:   {}", config.run.initial_meters);
    println!("  interval: {} min", config.run.reading_interval_min);
    println!("  db:       {db}");
    println!("  workers:  {}", workers.max(1));
    println!();

    // For :memory: use a SQLite shared-memory URI so a reopened
    // connection sees the same database.
    let db_effective: String = if db == ":memory:" {
        format!("file:gridrun_{}?mode=memory&cache=shared", epoch_secs())
    } else {
        db.to_string()
    };
    let store = SimStore::open(&db_effective)?;
    store.migrate()?;

    let run_id = format!("run-{}-{}", config.run.seed, Uuid::new_v4().simple());
    store.insert_run(&run_id, config.run.seed, env!("CARGO_PKG_VERSION"))?;

    let mut pipeline = GenerationPipeline::new(&run_id, config, store);
    let summary = if workers > 1 {
        pipeline.run_parallel(workers)?
    } else {
        pipeline.run()?
    };
    if summary.failures > 0 {
        log::warn!("{} meter pipelines failed and were skipped", summary.failures);
    }
    print_summary(&pipeline, &summary)?;

    Ok(())
}

fn print_summary(pipeline: &GenerationPipeline, summary: &RunSummary) -> Result<()> {
    println!("=== RUN SUMMARY ===");
    println!("  run_id:       {}", summary.run_id);
    println!("  months:       {}", summary.months);
    println!("  meters:       {}", summary.meters);
    println!("  transformers: {}", summary.transformers);
    println!("  readings:     {}", summary.readings);
    println!("  bills:        {}", summary.bills);
    println!("  payments:     {}", summary.payments);
    println!("  events:       {}", summary.events);
    println!("  failures:     {}", summary.failures);

    println!();
    println!("=== DATA QUALITY ===");
    let breakdown = pipeline.store.quality_breakdown(&summary.run_id)?;
    if breakdown.is_empty() {
        println!("  (no readings)");
    } else {
        let total: i64 = breakdown.iter().map(|(_, n)| n).sum();
        for (flag, count) in &breakdown {
            let pct = 100.0 * *count as f64 / total.max(1) as f64;
            println!("  {flag:<20} {count:>10}  ({pct:.2}%)");
        }
    }
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn epoch_secs() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
