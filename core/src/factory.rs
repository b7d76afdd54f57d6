//! Entity factory: creates meter and transformer master records.
//!
//! Pure function of config + randomness apart from the identifier
//! registry: the factory owns the set of issued ids so a freshly
//! created record never collides with the existing population.

use crate::{
    config::SimConfig,
    entity::{
        Location, MeterClass, MeterRecord, MeterStatus, TransformerKind, TransformerRecord,
        TransformerStatus,
    },
    error::{SimError, SimResult},
    rng::StreamRng,
    tariff::TariffCode,
};
use chrono::NaiveDate;
use std::collections::HashSet;

/// Retry bound for unique synthetic ids. Practically unreachable given
/// the id space, but a collision storm must abort a single creation
/// rather than loop forever.
const MAX_ID_ATTEMPTS: u32 = 64;

#[derive(Default)]
pub struct EntityFactory {
    used_meter_numbers: HashSet<String>,
    used_consumer_ids: HashSet<String>,
    grid_seq: u64,
    dist_seq: u64,
}

impl EntityFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a meter bound to `transformer_id`, drawing the tariff
    /// from the sub-division's consumer mix unless one is forced
    /// (replacement successors keep their predecessor's tariff).
    #[allow(clippy::too_many_arguments)]
    pub fn create_meter(
        &mut self,
        config: &SimConfig,
        location: &Location,
        consumer_mix: &[(TariffCode, f64)],
        transformer_id: &str,
        forced_tariff: Option<TariffCode>,
        connection_date: NaiveDate,
        rng: &mut StreamRng,
    ) -> SimResult<MeterRecord> {
        let tariff_code = match forced_tariff {
            Some(code) => code,
            None => pick_tariff(consumer_mix, rng).ok_or_else(|| {
                SimError::config(format!(
                    "sub-division '{}' has no consumer-type distribution",
                    location.sub_division
                ))
            })?,
        };
        let tariff = config.tariff(tariff_code)?;

        let district_code = district_code(&location.district);
        let meter_number = self.unique_id(&district_code, "MTR", IdSet::Meter, rng)?;
        let consumer_id = self.unique_id(&district_code, "CON", IdSet::Consumer, rng)?;
        let reference_no = format!("REF-{:010}", rng.next_u64_below(10_000_000_000));

        let connected_load_kw = rng.uniform(tariff.min_load_kw, tariff.max_load_kw);
        let sanctioned_load_kw = connected_load_kw * rng.uniform(1.1, 1.3);

        let has_solar = rng.chance(tariff.solar_adoption);
        let solar_capacity_kw = if has_solar {
            rng.uniform(1.0, connected_load_kw.min(10.0).max(1.5))
        } else {
            0.0
        };
        let meter_class = pick_meter_class(has_solar, rng);

        Ok(MeterRecord {
            meter_number,
            consumer_id,
            reference_no,
            previous_meter: None,
            generation: 1,
            tariff: tariff_code,
            location: location.clone(),
            transformer_id: transformer_id.to_string(),
            phase: tariff.phase,
            connected_load_kw,
            sanctioned_load_kw,
            installation_date: connection_date,
            deactivation_date: None,
            status: MeterStatus::Active,
            has_solar,
            solar_capacity_kw,
            meter_class,
            last_register_kwh: 0.0,
            tariff_history: Vec::new(),
        })
    }

    pub fn create_transformer(
        &mut self,
        kind: TransformerKind,
        rating_kva: f64,
        location: &Location,
        grid_station: &str,
        commission_date: NaiveDate,
        initial_utilization_pct: f64,
    ) -> TransformerRecord {
        let transformer_id = match kind {
            TransformerKind::Grid => {
                self.grid_seq += 1;
                format!("TR-G-{:04}", self.grid_seq)
            }
            TransformerKind::Distribution => {
                self.dist_seq += 1;
                format!("TR-D-{:05}", self.dist_seq)
            }
        };
        TransformerRecord {
            transformer_id,
            kind,
            rating_kva,
            utilization_pct: initial_utilization_pct.clamp(0.0, 100.0),
            location: location.clone(),
            grid_station: grid_station.to_string(),
            status: TransformerStatus::Active,
            commission_date,
            upgrade_history: Vec::new(),
        }
    }

    fn unique_id(
        &mut self,
        district_code: &str,
        prefix: &str,
        set: IdSet,
        rng: &mut StreamRng,
    ) -> SimResult<String> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let candidate = format!(
                "{prefix}-{district_code}-{:07}",
                rng.next_u64_below(10_000_000)
            );
            let used = match set {
                IdSet::Meter => &mut self.used_meter_numbers,
                IdSet::Consumer => &mut self.used_consumer_ids,
            };
            if used.insert(candidate.clone()) {
                return Ok(candidate);
            }
        }
        Err(SimError::IdCollisionExhausted {
            attempts: MAX_ID_ATTEMPTS,
        })
    }
}

enum IdSet {
    Meter,
    Consumer,
}

fn district_code(district: &str) -> String {
    district
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(3)
        .collect::<String>()
        .to_uppercase()
}

fn pick_tariff(mix: &[(TariffCode, f64)], rng: &mut StreamRng) -> Option<TariffCode> {
    if mix.is_empty() {
        return None;
    }
    let total: f64 = mix.iter().map(|(_, w)| w).sum();
    let roll = rng.next_f64() * total;
    let mut cumulative = 0.0;
    for (code, weight) in mix {
        cumulative += weight;
        if roll < cumulative {
            return Some(*code);
        }
    }
    mix.last().map(|(code, _)| *code)
}

fn pick_meter_class(has_solar: bool, rng: &mut StreamRng) -> MeterClass {
    if has_solar {
        return MeterClass::Bidirectional;
    }
    let roll = rng.next_f64();
    if roll < 0.55 {
        MeterClass::Smart
    } else if roll < 0.80 {
        MeterClass::SmartTou
    } else {
        MeterClass::Conventional
    }
}
