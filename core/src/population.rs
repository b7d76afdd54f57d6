//! The population simulator — the heart of the generation pipeline.
//!
//! MONTHLY RULE ORDER (fixed, documented, never reordered):
//!   1. New connections
//!   2. Meter replacement
//!   3. Meter failure (transient, readings suppressed later)
//!   4. Transformer upgrade
//!   5. Consumer churn
//!   6. Tariff change
//!   7. Feeder outage (transformer trips, readings suppressed later)
//!
//! RULES:
//!   - Order matters: later rules read utilization and counts mutated
//!     by earlier ones.
//!   - A rule with no eligible candidates silently no-ops for the month.
//!   - Every mutation is recorded in the event log.
//!   - All randomness flows through the RngBank.

use crate::{
    config::SimConfig,
    entity::{
        Location, MeterRecord, MeterStatus, TariffChangeEntry, TransformerKind,
        TransformerRecord, TransformerStatus,
    },
    error::SimResult,
    event::GridEvent,
    factory::EntityFactory,
    rng::{RngBank, StreamRng, StreamSlot},
    tariff::TariffCode,
    types::{MeterId, TransformerId},
};
use chrono::{Duration, NaiveDate};
use std::collections::HashMap;

const FAILURE_CAUSES: [&str; 3] = ["Communication loss", "Hardware fault", "Battery dead"];
const OUTAGE_CAUSES: [&str; 3] = ["Overload trip", "Feeder fault", "Scheduled maintenance"];
const CHURN_STATUSES: [MeterStatus; 3] = [
    MeterStatus::Disconnected,
    MeterStatus::Suspended,
    MeterStatus::Closed,
];
const CHURN_REASONS: [&str; 4] = ["Non-payment", "Relocated", "Deceased", "Business closed"];
const CHURN_UTILIZATION_FLOOR: f64 = 10.0;

/// Seeded meters get an installation date up to this far in the past.
const SEED_HISTORY_DAYS: u64 = 3_650;

pub struct PopulationSimulator {
    meters: Vec<MeterRecord>,
    transformers: Vec<TransformerRecord>,
    events: Vec<GridEvent>,
    factory: EntityFactory,
}

impl Default for PopulationSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl PopulationSimulator {
    pub fn new() -> Self {
        Self {
            meters: Vec::new(),
            transformers: Vec::new(),
            events: Vec::new(),
            factory: EntityFactory::new(),
        }
    }

    pub fn meters(&self) -> &[MeterRecord] {
        &self.meters
    }

    pub fn meters_mut(&mut self) -> &mut [MeterRecord] {
        &mut self.meters
    }

    pub fn transformers(&self) -> &[TransformerRecord] {
        &self.transformers
    }

    pub fn events(&self) -> &[GridEvent] {
        &self.events
    }

    pub fn active_meter_count(&self) -> usize {
        self.meters.iter().filter(|m| m.is_active()).count()
    }

    /// Outage windows per meter, from the logged failure and feeder
    /// outage events. A transformer outage covers every meter on that
    /// transformer. Consulted by the reading pipeline to suppress
    /// readings.
    pub fn failure_windows(&self) -> HashMap<MeterId, Vec<(NaiveDate, NaiveDate)>> {
        let mut windows: HashMap<MeterId, Vec<(NaiveDate, NaiveDate)>> = HashMap::new();
        let mut feeder: HashMap<&TransformerId, Vec<(NaiveDate, NaiveDate)>> = HashMap::new();
        for event in &self.events {
            match event {
                GridEvent::MeterFailure {
                    meter,
                    outage_start,
                    outage_end,
                    ..
                } => {
                    windows
                        .entry(meter.clone())
                        .or_default()
                        .push((*outage_start, *outage_end));
                }
                GridEvent::TransformerOutage {
                    transformer,
                    outage_start,
                    outage_end,
                    ..
                } => {
                    feeder
                        .entry(transformer)
                        .or_default()
                        .push((*outage_start, *outage_end));
                }
                _ => {}
            }
        }
        for meter in &self.meters {
            if let Some(spans) = feeder.get(&meter.transformer_id) {
                windows
                    .entry(meter.meter_number.clone())
                    .or_default()
                    .extend(spans.iter().copied());
            }
        }
        windows
    }

    /// Seed the infrastructure and the initial meter population.
    pub fn seed(&mut self, config: &SimConfig, rng: &mut StreamRng) -> SimResult<Vec<GridEvent>> {
        let start = config.run.start_date;

        for district in &config.districts {
            for division in &district.divisions {
                for grid_station in &division.grid_stations {
                    let rating = rng
                        .pick(&config.grid_tiers)
                        .copied()
                        .unwrap_or(100_000.0);
                    let location = Location {
                        district: district.name.clone(),
                        division: division.name.clone(),
                        sub_division: division.name.clone(),
                    };
                    let transformer = self.factory.create_transformer(
                        TransformerKind::Grid,
                        rating,
                        &location,
                        grid_station,
                        start - Duration::days(rng.next_u64_below(SEED_HISTORY_DAYS) as i64),
                        rng.uniform(40.0, 80.0),
                    );
                    self.transformers.push(transformer);
                }
                for sub in &division.sub_divisions {
                    for _ in 0..config.distribution_per_sub_division {
                        let seed_tiers: Vec<f64> = config
                            .distribution_tiers
                            .iter()
                            .copied()
                            .filter(|t| (250.0..=1000.0).contains(t))
                            .collect();
                        let rating = rng.pick(&seed_tiers).copied().unwrap_or(500.0);
                        let grid_station = rng
                            .pick(&division.grid_stations)
                            .cloned()
                            .unwrap_or_default();
                        let location = Location {
                            district: district.name.clone(),
                            division: division.name.clone(),
                            sub_division: sub.name.clone(),
                        };
                        let transformer = self.factory.create_transformer(
                            TransformerKind::Distribution,
                            rating,
                            &location,
                            &grid_station,
                            start - Duration::days(rng.next_u64_below(SEED_HISTORY_DAYS) as i64),
                            rng.uniform(30.0, 70.0),
                        );
                        self.transformers.push(transformer);
                    }
                }
            }
        }

        // Flatten the geography so each seeded meter picks a uniform
        // sub-division, then binds to its least-loaded transformer.
        let mut zones: Vec<(Location, Vec<(TariffCode, f64)>)> = Vec::new();
        for district in &config.districts {
            for division in &district.divisions {
                for sub in &division.sub_divisions {
                    zones.push((
                        Location {
                            district: district.name.clone(),
                            division: division.name.clone(),
                            sub_division: sub.name.clone(),
                        },
                        sub.consumer_mix.clone(),
                    ));
                }
            }
        }

        for _ in 0..config.run.initial_meters {
            let zone_idx = rng.next_u64_below(zones.len() as u64) as usize;
            let (location, mix) = &zones[zone_idx];
            let transformer_idx = match self
                .least_utilized_transformer(location, config.event_rates.utilization_cap_pct)
                .or_else(|| self.least_utilized_transformer(location, f64::INFINITY))
            {
                Some(idx) => idx,
                None => continue,
            };
            let install =
                start - Duration::days(rng.next_u64_below(SEED_HISTORY_DAYS) as i64);
            let transformer_id = self.transformers[transformer_idx].transformer_id.clone();
            let mut meter =
                self.factory
                    .create_meter(config, location, mix, &transformer_id, None, install, rng)?;
            meter.last_register_kwh = (rng.uniform(500.0, 20_000.0) * 100.0).round() / 100.0;
            self.meters.push(meter);

            let bump = rng.uniform(0.2, 1.0);
            let transformer = &mut self.transformers[transformer_idx];
            transformer.utilization_pct = (transformer.utilization_pct + bump)
                .min(config.event_rates.utilization_cap_pct);
        }

        log::info!(
            "seeded {} meters across {} transformers",
            self.meters.len(),
            self.transformers.len()
        );

        let events = vec![GridEvent::PopulationSeeded {
            date: start,
            meters: self.meters.len(),
            transformers: self.transformers.len(),
        }];
        self.events.extend(events.iter().cloned());
        Ok(events)
    }

    /// Advance the population by one calendar month, applying the
    /// rules in their fixed order.
    pub fn advance_month(
        &mut self,
        config: &SimConfig,
        month_start: NaiveDate,
        bank: &RngBank,
        month_ordinal: u64,
    ) -> SimResult<Vec<GridEvent>> {
        let mut out = Vec::new();

        // Feeder trips last days, not months; anything that failed last
        // month is back in service before this month's rules run.
        for transformer in &mut self.transformers {
            if transformer.status == TransformerStatus::Failed {
                transformer.status = TransformerStatus::Active;
            }
        }

        self.run_new_connections(config, month_start, bank, month_ordinal, &mut out)?;
        self.run_replacements(config, month_start, bank, month_ordinal, &mut out)?;
        self.run_failures(config, month_start, bank, month_ordinal, &mut out);
        self.run_upgrades(config, month_start, bank, month_ordinal, &mut out);
        self.run_churn(config, month_start, bank, month_ordinal, &mut out);
        self.run_tariff_changes(config, month_start, bank, month_ordinal, &mut out);
        self.run_transformer_outages(config, month_start, bank, month_ordinal, &mut out);

        let active = self.active_meter_count();
        out.push(GridEvent::MonthCompleted {
            date: month_start,
            active_meters: active,
        });
        log::debug!(
            "month {month_start}: {} events, {active} active meters",
            out.len() - 1
        );

        self.events.extend(out.iter().cloned());
        Ok(out)
    }

    // ── Rule 1: new connections ───────────────────────────────

    fn run_new_connections(
        &mut self,
        config: &SimConfig,
        month_start: NaiveDate,
        bank: &RngBank,
        month_ordinal: u64,
        out: &mut Vec<GridEvent>,
    ) -> SimResult<()> {
        let mut rng = bank.for_month(StreamSlot::Connections, month_ordinal);
        let cap = config.event_rates.utilization_cap_pct;

        for district in &config.districts {
            let active_in_district = self
                .meters
                .iter()
                .filter(|m| m.is_active() && m.location.district == district.name)
                .count();
            let lambda = active_in_district as f64 * district.annual_growth_rate / 12.0;
            let count = rng.poisson(lambda);

            for _ in 0..count {
                let division_idx =
                    rng.next_u64_below(district.divisions.len() as u64) as usize;
                let division = &district.divisions[division_idx];
                let sub_idx =
                    rng.next_u64_below(division.sub_divisions.len() as u64) as usize;
                let sub = &division.sub_divisions[sub_idx];
                let location = Location {
                    district: district.name.clone(),
                    division: division.name.clone(),
                    sub_division: sub.name.clone(),
                };

                let transformer_idx = match self.least_utilized_transformer(&location, cap) {
                    Some(idx) => idx,
                    None => continue, // zone saturated this month
                };
                let day = day_in_month(month_start, &mut rng);
                let transformer_id =
                    self.transformers[transformer_idx].transformer_id.clone();
                let meter = self.factory.create_meter(
                    config,
                    &location,
                    &sub.consumer_mix,
                    &transformer_id,
                    None,
                    day,
                    &mut rng,
                )?;

                let bump = rng.uniform(0.5, 2.0);
                let transformer = &mut self.transformers[transformer_idx];
                transformer.utilization_pct = (transformer.utilization_pct + bump).min(cap);

                out.push(GridEvent::NewConnection {
                    date: day,
                    meter: meter.meter_number.clone(),
                    transformer: transformer_id,
                    district: district.name.clone(),
                    tariff: meter.tariff,
                });
                self.meters.push(meter);
            }
        }
        Ok(())
    }

    // ── Rule 2: meter replacement ─────────────────────────────

    fn run_replacements(
        &mut self,
        config: &SimConfig,
        month_start: NaiveDate,
        bank: &RngBank,
        month_ordinal: u64,
        out: &mut Vec<GridEvent>,
    ) -> SimResult<()> {
        let mut rng = bank.for_month(StreamSlot::Replacement, month_ordinal);
        let base = config.event_rates.replacement_base;

        let mut selected = Vec::new();
        for (idx, meter) in self.meters.iter().enumerate() {
            if !meter.is_active() {
                continue;
            }
            let age_days = (month_start - meter.installation_date).num_days().max(0);
            let age_years = age_days as f64 / 365.25;
            let hazard = (age_years / 10.0 * base).min(0.95);
            if rng.chance(hazard) {
                selected.push(idx);
            }
        }

        let mut successors = Vec::new();
        for idx in selected {
            let day = day_in_month(month_start, &mut rng);
            let (location, transformer_id, tariff, old_number, old_generation) = {
                let old = &self.meters[idx];
                (
                    old.location.clone(),
                    old.transformer_id.clone(),
                    old.tariff,
                    old.meter_number.clone(),
                    old.generation,
                )
            };
            self.meters[idx].deactivate(MeterStatus::Replaced, day);

            let mut successor = self.factory.create_meter(
                config,
                &location,
                &[],
                &transformer_id,
                Some(tariff),
                day,
                &mut rng,
            )?;
            successor.generation = old_generation + 1;
            successor.previous_meter = Some(old_number.clone());

            out.push(GridEvent::MeterReplacement {
                date: day,
                old_meter: old_number,
                new_meter: successor.meter_number.clone(),
                generation: successor.generation,
            });
            successors.push(successor);
        }
        self.meters.extend(successors);
        Ok(())
    }

    // ── Rule 3: transient meter failure ───────────────────────

    fn run_failures(
        &mut self,
        config: &SimConfig,
        month_start: NaiveDate,
        bank: &RngBank,
        month_ordinal: u64,
        out: &mut Vec<GridEvent>,
    ) {
        let mut rng = bank.for_month(StreamSlot::Failure, month_ordinal);
        let active = self.active_indices();
        if active.is_empty() {
            return;
        }
        let count = rng.poisson(active.len() as f64 * config.event_rates.failure);
        for _ in 0..count {
            let pick = active[rng.next_u64_below(active.len() as u64) as usize];
            let meter = &self.meters[pick];
            let outage_start = day_in_month(month_start, &mut rng);
            let duration = 1 + rng.next_u64_below(7) as i64;
            let cause = rng
                .pick(&FAILURE_CAUSES)
                .copied()
                .unwrap_or("Communication loss");
            out.push(GridEvent::MeterFailure {
                date: outage_start,
                meter: meter.meter_number.clone(),
                outage_start,
                outage_end: outage_start + Duration::days(duration),
                cause: cause.to_string(),
            });
        }
    }

    // ── Rule 4: transformer upgrade ───────────────────────────

    fn run_upgrades(
        &mut self,
        config: &SimConfig,
        month_start: NaiveDate,
        bank: &RngBank,
        month_ordinal: u64,
        out: &mut Vec<GridEvent>,
    ) {
        let mut rng = bank.for_month(StreamSlot::Upgrade, month_ordinal);
        let threshold = config.event_rates.upgrade_threshold_pct;

        let mut candidates: Vec<usize> = self
            .transformers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.status == TransformerStatus::Active && t.utilization_pct > threshold)
            .map(|(idx, _)| idx)
            .collect();
        if candidates.is_empty() {
            return;
        }
        // Most loaded first; the capped Poisson draw upgrades from the top.
        candidates.sort_by(|a, b| {
            self.transformers[*b]
                .utilization_pct
                .partial_cmp(&self.transformers[*a].utilization_pct)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let count = rng
            .poisson(candidates.len() as f64 * config.event_rates.upgrade)
            .min(candidates.len() as u64) as usize;

        for &idx in candidates.iter().take(count) {
            let day = day_in_month(month_start, &mut rng);
            let transformer = &mut self.transformers[idx];
            let old_rating = transformer.rating_kva;
            let tiers = match transformer.kind {
                TransformerKind::Grid => &config.grid_tiers,
                TransformerKind::Distribution => &config.distribution_tiers,
            };
            let new_rating = tiers
                .iter()
                .copied()
                .find(|t| *t > old_rating)
                .unwrap_or(old_rating * 1.5);
            transformer.apply_upgrade(day, new_rating);
            out.push(GridEvent::TransformerUpgrade {
                date: day,
                transformer: transformer.transformer_id.clone(),
                old_rating_kva: old_rating,
                new_rating_kva: new_rating,
            });
        }
    }

    // ── Rule 5: consumer churn ────────────────────────────────

    fn run_churn(
        &mut self,
        config: &SimConfig,
        month_start: NaiveDate,
        bank: &RngBank,
        month_ordinal: u64,
        out: &mut Vec<GridEvent>,
    ) {
        let mut rng = bank.for_month(StreamSlot::Churn, month_ordinal);
        let count = rng.poisson(self.active_meter_count() as f64 * config.event_rates.churn);

        for _ in 0..count {
            let active = self.active_indices();
            if active.is_empty() {
                break;
            }
            let idx = active[rng.next_u64_below(active.len() as u64) as usize];
            let day = day_in_month(month_start, &mut rng);
            let status = rng
                .pick(&CHURN_STATUSES)
                .copied()
                .unwrap_or(MeterStatus::Disconnected);
            let reason = rng.pick(&CHURN_REASONS).copied().unwrap_or("Non-payment");

            let meter_number = self.meters[idx].meter_number.clone();
            let transformer_id = self.meters[idx].transformer_id.clone();
            self.meters[idx].deactivate(status, day);

            if let Some(transformer) = self
                .transformers
                .iter_mut()
                .find(|t| t.transformer_id == transformer_id)
            {
                let drop = rng.uniform(1.0, 3.0);
                transformer.shift_utilization(-drop, CHURN_UTILIZATION_FLOOR);
            }

            out.push(GridEvent::ConsumerChurn {
                date: day,
                meter: meter_number,
                status,
                reason: reason.to_string(),
                transformer: transformer_id,
            });
        }
    }

    // ── Rule 6: tariff change ─────────────────────────────────

    fn run_tariff_changes(
        &mut self,
        config: &SimConfig,
        month_start: NaiveDate,
        bank: &RngBank,
        month_ordinal: u64,
        out: &mut Vec<GridEvent>,
    ) {
        let mut rng = bank.for_month(StreamSlot::TariffChange, month_ordinal);
        let count =
            rng.poisson(self.active_meter_count() as f64 * config.event_rates.tariff_change);

        for _ in 0..count {
            let active = self.active_indices();
            if active.is_empty() {
                break;
            }
            let idx = active[rng.next_u64_below(active.len() as u64) as usize];
            let current = self.meters[idx].tariff;
            // Reassignment stays within the same broad consumer category.
            let candidates: Vec<TariffCode> = TariffCode::ALL
                .iter()
                .copied()
                .filter(|c| {
                    *c != current
                        && c.category() == current.category()
                        && config.tariffs.contains_key(c)
                })
                .collect();
            let new_code = match rng.pick(&candidates) {
                Some(code) => *code,
                None => continue, // single-tariff category
            };
            let day = day_in_month(month_start, &mut rng);
            let meter = &mut self.meters[idx];
            meter.tariff_history.push(TariffChangeEntry {
                date: day,
                old_code: current,
                new_code,
            });
            meter.tariff = new_code;
            out.push(GridEvent::TariffChange {
                date: day,
                meter: meter.meter_number.clone(),
                old_code: current,
                new_code,
            });
        }
    }

    // ── Rule 7: feeder outage ─────────────────────────────────

    fn run_transformer_outages(
        &mut self,
        config: &SimConfig,
        month_start: NaiveDate,
        bank: &RngBank,
        month_ordinal: u64,
        out: &mut Vec<GridEvent>,
    ) {
        let mut rng = bank.for_month(StreamSlot::TransformerOutage, month_ordinal);
        let candidates: Vec<usize> = self
            .transformers
            .iter()
            .enumerate()
            .filter(|(_, t)| {
                t.kind == TransformerKind::Distribution && t.status == TransformerStatus::Active
            })
            .map(|(idx, _)| idx)
            .collect();
        if candidates.is_empty() {
            return;
        }
        let count = rng.poisson(candidates.len() as f64 * config.event_rates.transformer_outage);
        for _ in 0..count {
            let idx = candidates[rng.next_u64_below(candidates.len() as u64) as usize];
            let transformer = &mut self.transformers[idx];
            if transformer.status == TransformerStatus::Failed {
                continue; // already tripped this month
            }
            let outage_start = day_in_month(month_start, &mut rng);
            let duration = 1 + rng.next_u64_below(3) as i64;
            let cause = rng.pick(&OUTAGE_CAUSES).copied().unwrap_or("Feeder fault");
            transformer.status = TransformerStatus::Failed;
            out.push(GridEvent::TransformerOutage {
                date: outage_start,
                transformer: transformer.transformer_id.clone(),
                outage_start,
                outage_end: outage_start + Duration::days(duration),
                cause: cause.to_string(),
            });
        }
    }

    // ── Helpers ───────────────────────────────────────────────

    fn active_indices(&self) -> Vec<usize> {
        self.meters
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_active())
            .map(|(idx, _)| idx)
            .collect()
    }

    fn least_utilized_transformer(&self, location: &Location, cap: f64) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, t) in self.transformers.iter().enumerate() {
            if t.kind != TransformerKind::Distribution
                || t.status != TransformerStatus::Active
                || t.location != *location
                || t.utilization_pct >= cap
            {
                continue;
            }
            if best.map_or(true, |(_, util)| t.utilization_pct < util) {
                best = Some((idx, t.utilization_pct));
            }
        }
        best.map(|(idx, _)| idx)
    }
}

/// Uniform day within the first 28 days of the month, so the draw is
/// valid for every calendar month.
fn day_in_month(month_start: NaiveDate, rng: &mut StreamRng) -> NaiveDate {
    month_start + Duration::days(rng.next_u64_below(28) as i64)
}
