//! Run orchestration: seeding, the monthly population loop, and the
//! per-meter reading/billing/payment stage, in sequential and
//! worker-pool form.
//!
//! The per-meter stage draws from streams keyed on the meter number,
//! never on scheduling order, so the sequential and parallel pipelines
//! produce identical data for the same seed. One meter failing its
//! stage is recorded as a pipeline_failure event and never aborts the
//! run.

use crate::{
    billing::{Bill, BillingEngine},
    config::SimConfig,
    entity::MeterRecord,
    error::{SimError, SimResult},
    event::GridEvent,
    payment::{PaymentRecord, PaymentSimulator},
    population::PopulationSimulator,
    reading::{MeterReading, ReadingGenerator},
    rng::{RngBank, StreamSlot},
    store::SimStore,
    types::RunId,
};
use chrono::{Datelike, Duration, NaiveDate};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: RunId,
    pub months: usize,
    pub meters: i64,
    pub transformers: i64,
    pub readings: i64,
    pub bills: i64,
    pub payments: i64,
    pub events: i64,
    /// Meters whose per-meter stage failed and was skipped.
    pub failures: usize,
}

/// One meter's full pipeline output, buffered before persistence.
pub struct MeterOutput {
    pub meter_number: String,
    pub readings: Vec<MeterReading>,
    pub bills: Vec<Bill>,
    pub payments: Vec<PaymentRecord>,
}

pub struct GenerationPipeline {
    run_id: RunId,
    config: SimConfig,
    bank: RngBank,
    pub store: SimStore,
    population: PopulationSimulator,
}

impl GenerationPipeline {
    pub fn new(run_id: &str, config: SimConfig, store: SimStore) -> Self {
        let bank = RngBank::new(config.run.seed);
        Self {
            run_id: run_id.to_string(),
            config,
            bank,
            store,
            population: PopulationSimulator::new(),
        }
    }

    /// In-memory pipeline over the compact test catalog.
    pub fn build_test(run_id: &str, seed: u64) -> SimResult<Self> {
        let mut config = SimConfig::default_test();
        config.run.seed = seed;
        let store = SimStore::in_memory()?;
        store.migrate()?;
        store.insert_run(run_id, seed, env!("CARGO_PKG_VERSION"))?;
        Ok(Self::new(run_id, config, store))
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn population(&self) -> &PopulationSimulator {
        &self.population
    }

    pub fn run(&mut self) -> SimResult<RunSummary> {
        let months = self.advance_population()?;
        let windows = self.population.failure_windows();

        let mut failures = 0usize;
        let config = &self.config;
        let bank = &self.bank;
        let store = &self.store;
        let run_id = self.run_id.clone();
        let end_date = config.run.end_date;
        for meter in self.population.meters_mut() {
            let outages = outages_for(&windows, &meter.meter_number);
            match run_meter_pipeline(config, bank, meter, outages) {
                Ok(output) => persist_output(store, &run_id, &output)?,
                Err(err) => {
                    record_meter_failure(store, &run_id, end_date, &meter.meter_number, &err)?;
                    failures += 1;
                }
            }
        }

        self.persist_population()?;
        self.summarize(months, failures)
    }

    /// Same semantics as `run`, with the per-meter stage spread over a
    /// scoped worker pool.
    pub fn run_parallel(&mut self, workers: usize) -> SimResult<RunSummary> {
        let months = self.advance_population()?;
        let windows = self.population.failure_windows();

        let config = &self.config;
        let bank = &self.bank;
        let meters = self.population.meters_mut();
        let chunk_size = meters.len().div_ceil(workers.max(1)).max(1);

        let outputs: Mutex<Vec<MeterOutput>> = Mutex::new(Vec::new());
        let failed: Mutex<Vec<(String, String)>> = Mutex::new(Vec::new());
        std::thread::scope(|scope| {
            for chunk in meters.chunks_mut(chunk_size) {
                let outputs = &outputs;
                let failed = &failed;
                let windows = &windows;
                scope.spawn(move || {
                    let mut local_outputs = Vec::with_capacity(chunk.len());
                    let mut local_failed = Vec::new();
                    for meter in chunk.iter_mut() {
                        let outages = outages_for(windows, &meter.meter_number);
                        match run_meter_pipeline(config, bank, meter, outages) {
                            Ok(output) => local_outputs.push(output),
                            Err(err) => {
                                local_failed.push((meter.meter_number.clone(), err.to_string()))
                            }
                        }
                    }
                    lock_or_recover(outputs).extend(local_outputs);
                    lock_or_recover(failed).extend(local_failed);
                });
            }
        });

        let mut outputs = lock_or_recover(&outputs);
        // Deterministic persistence order regardless of worker timing.
        outputs.sort_by(|a, b| a.meter_number.cmp(&b.meter_number));
        for output in outputs.iter() {
            persist_output(&self.store, &self.run_id, output)?;
        }

        let mut failed = lock_or_recover(&failed);
        failed.sort();
        let failures = failed.len();
        let end_date = self.config.run.end_date;
        for (meter_number, message) in failed.iter() {
            self.store.append_event(
                &self.run_id,
                &GridEvent::PipelineFailure {
                    date: end_date,
                    meter: meter_number.clone(),
                    message: message.clone(),
                },
            )?;
            log::warn!("meter {meter_number}: pipeline stage failed: {message}");
        }
        drop(outputs);
        drop(failed);

        self.persist_population()?;
        self.summarize(months, failures)
    }

    /// Seed the population and replay the monthly event rules over the
    /// run window, persisting every event.
    fn advance_population(&mut self) -> SimResult<usize> {
        self.config.validate()?;
        let start = self.config.run.start_date;

        self.store.append_event(
            &self.run_id,
            &GridEvent::RunInitialized {
                date: start,
                run_id: self.run_id.clone(),
                seed: self.config.run.seed,
            },
        )?;

        let mut seeding_rng = self.bank.for_stream(StreamSlot::Seeding);
        let events = self.population.seed(&self.config, &mut seeding_rng)?;
        for event in &events {
            self.store.append_event(&self.run_id, event)?;
        }

        let months = months_in(start, self.config.run.end_date);
        for (ordinal, month_start) in months.iter().enumerate() {
            let events = self.population.advance_month(
                &self.config,
                *month_start,
                &self.bank,
                ordinal as u64,
            )?;
            for event in &events {
                self.store.append_event(&self.run_id, event)?;
            }
        }
        Ok(months.len())
    }

    fn persist_population(&self) -> SimResult<()> {
        for meter in self.population.meters() {
            self.store.insert_meter(&self.run_id, meter)?;
        }
        for transformer in self.population.transformers() {
            self.store.insert_transformer(&self.run_id, transformer)?;
        }
        Ok(())
    }

    fn summarize(&self, months: usize, failures: usize) -> SimResult<RunSummary> {
        let summary = RunSummary {
            run_id: self.run_id.clone(),
            months,
            meters: self.store.meter_count(&self.run_id)?,
            transformers: self.store.transformer_count(&self.run_id)?,
            readings: self.store.reading_count(&self.run_id)?,
            bills: self.store.bill_count(&self.run_id)?,
            payments: self.store.payment_count(&self.run_id)?,
            events: self.store.event_total(&self.run_id)?,
            failures,
        };
        log::info!(
            "run {}: {} months, {} meters, {} readings, {} bills, {} payments",
            summary.run_id,
            summary.months,
            summary.meters,
            summary.readings,
            summary.bills,
            summary.payments
        );
        Ok(summary)
    }
}

/// One meter's whole timeline: readings, then a bill and a payment per
/// month with data. Stream seeds depend only on the meter number.
pub fn run_meter_pipeline(
    config: &SimConfig,
    bank: &RngBank,
    meter: &mut MeterRecord,
    outages: &[(NaiveDate, NaiveDate)],
) -> SimResult<MeterOutput> {
    let mut reading_rng = bank.for_meter(StreamSlot::Readings, &meter.meter_number);
    let readings = ReadingGenerator::generate(config, meter, outages, &mut reading_rng)?;

    let mut billing_rng = bank.for_meter(StreamSlot::Billing, &meter.meter_number);
    let mut payment_rng = bank.for_meter(StreamSlot::Payment, &meter.meter_number);
    let mut bills = Vec::new();
    let mut payments = Vec::new();
    let mut cursor = 0usize;
    for month_start in months_in(config.run.start_date, config.run.end_date) {
        let month_end = next_month(month_start);
        let begin = cursor;
        while cursor < readings.len() && readings[cursor].ts.date() < month_end {
            cursor += 1;
        }
        let month_readings = &readings[begin..cursor];
        if let Some(bill) =
            BillingEngine::calculate_bill(config, meter, month_start, month_readings, &mut billing_rng)?
        {
            let tariff = config.tariff(bill.tariff)?;
            let payment =
                PaymentSimulator::generate_payment(&config.payment, &bill, tariff, &mut payment_rng);
            bills.push(bill);
            payments.push(payment);
        }
    }

    Ok(MeterOutput {
        meter_number: meter.meter_number.clone(),
        readings,
        bills,
        payments,
    })
}

/// First days of every calendar month touching [start, end].
pub fn months_in(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut months = Vec::new();
    let mut cursor = match NaiveDate::from_ymd_opt(start.year(), start.month(), 1) {
        Some(first) => first,
        None => return months,
    };
    while cursor <= end {
        months.push(cursor);
        cursor = next_month(cursor);
    }
    months
}

fn next_month(month_start: NaiveDate) -> NaiveDate {
    let (year, month) = if month_start.month() == 12 {
        (month_start.year() + 1, 1)
    } else {
        (month_start.year(), month_start.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(month_start + Duration::days(31))
}

fn outages_for<'a>(
    windows: &'a HashMap<String, Vec<(NaiveDate, NaiveDate)>>,
    meter_number: &str,
) -> &'a [(NaiveDate, NaiveDate)] {
    windows.get(meter_number).map(Vec::as_slice).unwrap_or(&[])
}

fn persist_output(store: &SimStore, run_id: &str, output: &MeterOutput) -> SimResult<()> {
    store.insert_readings(run_id, &output.readings)?;
    for bill in &output.bills {
        store.insert_bill(run_id, bill)?;
    }
    for payment in &output.payments {
        store.insert_payment(run_id, payment)?;
    }
    Ok(())
}

fn record_meter_failure(
    store: &SimStore,
    run_id: &str,
    date: NaiveDate,
    meter_number: &str,
    err: &SimError,
) -> SimResult<()> {
    log::warn!("meter {meter_number}: pipeline stage failed: {err}");
    store.append_event(
        run_id,
        &GridEvent::PipelineFailure {
            date,
            meter: meter_number.to_string(),
            message: err.to_string(),
        },
    )
}

/// A panicked worker poisons the buffer lock; the data it protects is
/// still consistent (extend is the only write), so recover it.
fn lock_or_recover<'a, T>(mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
