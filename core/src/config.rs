//! Run configuration: geography catalog, tariff catalog, event rates,
//! defect table, billing and payment models.
//!
//! There is no ambient global state. One SimConfig is built up front
//! (from JSON catalogs or the builtin defaults), validated once, and
//! passed by reference into every pipeline stage.

use crate::{
    entity::QualityFlag,
    error::{SimError, SimResult},
    tariff::{ConsumptionBands, FixedChargeRule, PhaseType, Slab, TariffCode, TariffConfig},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Density {
    Urban,
    Rural,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubDivisionConfig {
    pub name: String,
    /// Weighted tariff distribution for new connections here.
    pub consumer_mix: Vec<(TariffCode, f64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DivisionConfig {
    pub name: String,
    pub sub_divisions: Vec<SubDivisionConfig>,
    pub grid_stations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistrictConfig {
    pub name: String,
    pub annual_growth_rate: f64,
    pub density: Density,
    /// Relative consumption level vs. the national baseline.
    pub consumption_multiplier: f64,
    pub summer_temp_c: f64,
    pub winter_temp_c: f64,
    pub divisions: Vec<DivisionConfig>,
}

/// Monthly population-event rates. Ad hoc constants in origin, tunable
/// here — none of these are physical truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRates {
    /// Replacement hazard base; scaled by min(0.95, age_years/10 * base).
    pub replacement_base: f64,
    /// Transient failure rate over the active population.
    pub failure: f64,
    /// Feeder outage rate over active distribution transformers.
    /// An outage suppresses readings for every meter on the feeder.
    pub transformer_outage: f64,
    /// Upgrade draw rate over transformers above the threshold.
    pub upgrade: f64,
    pub churn: f64,
    pub tariff_change: f64,
    /// New-connection utilization bump is clamped to this ceiling.
    pub utilization_cap_pct: f64,
    /// Transformers above this utilization are upgrade candidates.
    pub upgrade_threshold_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefectBand {
    pub flag: QualityFlag,
    pub probability: f64,
}

/// Ordered cumulative-probability defect table. One roll per reading;
/// first matching band wins; probabilities must sum to < 1 so Normal
/// keeps positive probability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefectConfig {
    pub bands: Vec<DefectBand>,
}

impl DefectConfig {
    /// Classify one uniform roll against the cumulative band boundaries.
    /// None means the reading is Normal.
    pub fn classify(&self, roll: f64) -> Option<QualityFlag> {
        let mut cumulative = 0.0;
        for band in &self.bands {
            cumulative += band.probability;
            if roll < cumulative {
                return Some(band.flag);
            }
        }
        None
    }

    pub fn probability_sum(&self) -> f64 {
        self.bands.iter().map(|b| b.probability).sum()
    }
}

/// How monthly consumption is recovered from a possibly-defective
/// reading stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationPolicy {
    /// last - first register over the month; falls back to the
    /// Normal-flagged interval sum when the register went backward.
    RegisterDelta,
    /// Always sum Normal-flagged interval consumption.
    NormalIntervalSum,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    pub gst_rate: f64,
    pub duty_rate: f64,
    pub tv_fee: f64,
    pub tv_fee_probability: f64,
    pub late_surcharge_rate: f64,
    pub late_surcharge_probability: f64,
    pub after_due_multiplier: f64,
    pub due_days: i64,
    /// Day-of-month the bill for the prior month is issued.
    pub issue_day: u32,
    pub reconciliation: ReconciliationPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Bank,
    Wallet,
    Cash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentChannel {
    pub name: String,
    pub weight: f64,
    pub kind: ChannelKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    pub base_paid_probability: f64,
    pub reliable_paid_probability: f64,
    pub large_bill_threshold: f64,
    pub large_bill_probability: f64,
    pub very_large_bill_threshold: f64,
    pub very_large_bill_probability: f64,
    /// Timing bucket weights: before due / 1-7 days late / 8-30 days late.
    pub early_weight: f64,
    pub late_short_weight: f64,
    pub late_long_weight: f64,
    pub partial_probability: f64,
    pub channels: Vec<PaymentChannel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunParams {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reading_interval_min: u32,
    pub initial_meters: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct GeographyFile {
    districts: Vec<DistrictConfig>,
}

#[derive(Debug, Clone, Deserialize)]
struct TariffFile {
    tariffs: Vec<TariffConfig>,
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub run: RunParams,
    pub districts: Vec<DistrictConfig>,
    pub tariffs: HashMap<TariffCode, TariffConfig>,
    pub event_rates: EventRates,
    pub defects: DefectConfig,
    pub billing: BillingConfig,
    pub payment: PaymentConfig,
    /// January..December consumption coefficients, summer highest.
    pub seasonal_multipliers: [f64; 12],
    pub weekend_multiplier: f64,
    /// Daylight solar self-consumption reduction range.
    pub solar_reduction: (f64, f64),
    pub distribution_per_sub_division: usize,
    /// Rating tiers for transformer upgrades, ascending kVA.
    pub distribution_tiers: Vec<f64>,
    pub grid_tiers: Vec<f64>,
}

impl SimConfig {
    /// Load geography and tariff catalogs from the data/ directory,
    /// layered over builtin defaults for everything else.
    /// In tests, use SimConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let geo_path = format!("{data_dir}/geography.json");
        let geo_content = std::fs::read_to_string(&geo_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {geo_path}: {e}"))?;
        let geo_file: GeographyFile = serde_json::from_str(&geo_content)?;

        let tariff_path = format!("{data_dir}/tariffs.json");
        let tariff_content = std::fs::read_to_string(&tariff_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {tariff_path}: {e}"))?;
        let tariff_file: TariffFile = serde_json::from_str(&tariff_content)?;

        let mut config = Self::builtin();
        config.districts = geo_file.districts;
        config.tariffs = tariff_file
            .tariffs
            .into_iter()
            .map(|t| (t.code, t))
            .collect();
        Ok(config)
    }

    /// Full default catalog: five districts, six tariff classes, the
    /// stock defect table and payment model.
    pub fn builtin() -> Self {
        let districts = vec![
            district(
                "ISLAMABAD",
                0.18,
                Density::Urban,
                1.3,
                38.0,
                10.0,
                &[
                    (
                        "Islamabad Division 1",
                        &["F-8 Sub-Division", "G-9 Sub-Division", "I-10 Sub-Division"],
                        &["Grid Station F-8", "Grid Station I-9"],
                        urban_mix(),
                    ),
                    (
                        "Islamabad Division 2",
                        &["Bara Kahu Sub-Division", "Nilore Sub-Division"],
                        &["Grid Station Bara Kahu"],
                        mixed_mix(),
                    ),
                ],
            ),
            district(
                "RAWALPINDI",
                0.15,
                Density::Urban,
                1.2,
                37.0,
                8.0,
                &[
                    (
                        "Rawalpindi City Division",
                        &["Satellite Town Sub-Division", "Westridge Sub-Division"],
                        &["Grid Station Satellite Town"],
                        urban_mix(),
                    ),
                    (
                        "Rawalpindi Cantt Division",
                        &["Chaklala Sub-Division", "Morgah Sub-Division"],
                        &["Grid Station Chaklala"],
                        mixed_mix(),
                    ),
                ],
            ),
            district(
                "ATTOCK",
                0.10,
                Density::Rural,
                1.0,
                36.0,
                7.0,
                &[(
                    "Attock Division",
                    &["Attock City Sub-Division", "Hazro Sub-Division"],
                    &["Grid Station Attock"],
                    rural_mix(),
                )],
            ),
            district(
                "JHELUM",
                0.10,
                Density::Rural,
                0.9,
                37.0,
                9.0,
                &[(
                    "Jhelum Division",
                    &["Jhelum City Sub-Division", "Dina Sub-Division"],
                    &["Grid Station Jhelum"],
                    rural_mix(),
                )],
            ),
            district(
                "CHAKWAL",
                0.08,
                Density::Rural,
                0.8,
                35.0,
                6.0,
                &[(
                    "Chakwal Division",
                    &["Chakwal City Sub-Division", "Talagang Sub-Division"],
                    &["Grid Station Chakwal"],
                    rural_mix(),
                )],
            ),
        ];

        let start_date =
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or(NaiveDate::MIN);
        let end_date =
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or(NaiveDate::MAX);

        Self {
            run: RunParams {
                start_date,
                end_date,
                reading_interval_min: 15,
                initial_meters: 1_000,
                seed: 42,
            },
            districts,
            tariffs: builtin_tariffs(),
            event_rates: EventRates {
                replacement_base: 0.005,
                failure: 0.003,
                transformer_outage: 0.001,
                upgrade: 0.02,
                churn: 0.002,
                tariff_change: 0.001,
                utilization_cap_pct: 95.0,
                upgrade_threshold_pct: 85.0,
            },
            defects: default_defects(),
            billing: default_billing(),
            payment: default_payment(),
            seasonal_multipliers: [
                0.9, 0.9, 1.0, 1.1, 1.3, 1.5, 1.5, 1.5, 1.3, 1.1, 1.0, 0.9,
            ],
            weekend_multiplier: 1.3,
            solar_reduction: (0.3, 0.7),
            distribution_per_sub_division: 4,
            distribution_tiers: vec![100.0, 200.0, 250.0, 400.0, 500.0, 750.0, 1000.0, 1500.0, 2000.0],
            grid_tiers: vec![100_000.0, 160_000.0, 250_000.0, 400_000.0],
        }
    }

    /// Compact deterministic catalog for unit tests: one district,
    /// hourly readings, three months.
    pub fn default_test() -> Self {
        let mut config = Self::builtin();
        config.districts = vec![district(
            "ISLAMABAD",
            0.40,
            Density::Urban,
            1.3,
            38.0,
            10.0,
            &[(
                "Islamabad Division 1",
                &["F-8 Sub-Division", "G-9 Sub-Division"],
                &["Grid Station F-8"],
                urban_mix(),
            )],
        )];
        config.run = RunParams {
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or(NaiveDate::MIN),
            end_date: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap_or(NaiveDate::MAX),
            reading_interval_min: 60,
            initial_meters: 12,
            seed: 42,
        };
        config.distribution_per_sub_division = 2;
        config
    }

    pub fn tariff(&self, code: TariffCode) -> SimResult<&TariffConfig> {
        self.tariffs.get(&code).ok_or_else(|| {
            SimError::config(format!("unknown tariff code '{}'", code.as_str()))
        })
    }

    pub fn district(&self, name: &str) -> SimResult<&DistrictConfig> {
        self.districts
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| SimError::config(format!("unknown district '{name}'")))
    }

    /// Fatal catalog checks, run before any record is produced.
    pub fn validate(&self) -> SimResult<()> {
        if self.run.end_date < self.run.start_date {
            return Err(SimError::config("end_date precedes start_date"));
        }
        if self.run.reading_interval_min == 0 {
            return Err(SimError::config("reading_interval_min must be > 0"));
        }
        if self.run.initial_meters == 0 {
            return Err(SimError::config("initial_meters must be > 0"));
        }
        if self.districts.is_empty() {
            return Err(SimError::config("no districts configured"));
        }
        for district in &self.districts {
            if district.divisions.is_empty() {
                return Err(SimError::config(format!(
                    "district '{}' has no divisions",
                    district.name
                )));
            }
            for division in &district.divisions {
                if division.sub_divisions.is_empty() {
                    return Err(SimError::config(format!(
                        "division '{}' has no sub-divisions",
                        division.name
                    )));
                }
                for sub in &division.sub_divisions {
                    if sub.consumer_mix.is_empty() {
                        return Err(SimError::config(format!(
                            "sub-division '{}' has no consumer-type distribution",
                            sub.name
                        )));
                    }
                    for (code, weight) in &sub.consumer_mix {
                        if *weight <= 0.0 {
                            return Err(SimError::config(format!(
                                "sub-division '{}' has non-positive weight for '{}'",
                                sub.name,
                                code.as_str()
                            )));
                        }
                        if !self.tariffs.contains_key(code) {
                            return Err(SimError::config(format!(
                                "sub-division '{}' references unknown tariff '{}'",
                                sub.name,
                                code.as_str()
                            )));
                        }
                    }
                }
            }
        }
        let defect_sum = self.defects.probability_sum();
        if defect_sum >= 1.0 {
            return Err(SimError::config(format!(
                "defect probabilities sum to {defect_sum:.3}, must be < 1"
            )));
        }
        for band in &self.defects.bands {
            if band.flag == QualityFlag::Normal {
                return Err(SimError::config("defect table may not contain 'normal'"));
            }
            if !(0.0..1.0).contains(&band.probability) {
                return Err(SimError::config(format!(
                    "defect band '{}' probability out of range",
                    band.flag.as_str()
                )));
            }
        }
        Ok(())
    }
}

fn district(
    name: &str,
    growth: f64,
    density: Density,
    multiplier: f64,
    summer: f64,
    winter: f64,
    divisions: &[(&str, &[&str], &[&str], Vec<(TariffCode, f64)>)],
) -> DistrictConfig {
    DistrictConfig {
        name: name.into(),
        annual_growth_rate: growth,
        density,
        consumption_multiplier: multiplier,
        summer_temp_c: summer,
        winter_temp_c: winter,
        divisions: divisions
            .iter()
            .map(|(div_name, subs, stations, mix)| DivisionConfig {
                name: (*div_name).into(),
                sub_divisions: subs
                    .iter()
                    .map(|s| SubDivisionConfig {
                        name: (*s).into(),
                        consumer_mix: mix.clone(),
                    })
                    .collect(),
                grid_stations: stations.iter().map(|s| (*s).into()).collect(),
            })
            .collect(),
    }
}

fn urban_mix() -> Vec<(TariffCode, f64)> {
    vec![
        (TariffCode::A1, 0.60),
        (TariffCode::A2, 0.25),
        (TariffCode::B1, 0.10),
        (TariffCode::D1, 0.05),
    ]
}

fn mixed_mix() -> Vec<(TariffCode, f64)> {
    vec![
        (TariffCode::A1, 0.35),
        (TariffCode::A2, 0.20),
        (TariffCode::B1, 0.25),
        (TariffCode::B2, 0.15),
        (TariffCode::D1, 0.05),
    ]
}

fn rural_mix() -> Vec<(TariffCode, f64)> {
    vec![
        (TariffCode::A1, 0.55),
        (TariffCode::A2, 0.15),
        (TariffCode::B1, 0.05),
        (TariffCode::C1, 0.20),
        (TariffCode::D1, 0.05),
    ]
}

fn builtin_tariffs() -> HashMap<TariffCode, TariffConfig> {
    [
        TariffConfig {
            code: TariffCode::A1,
            name: "Residential".into(),
            min_load_kw: 1.0,
            max_load_kw: 5.0,
            phase: PhaseType::Single,
            slabs: vec![
                Slab::bounded(100.0, 5.79),
                Slab::bounded(100.0, 8.11),
                Slab::bounded(100.0, 10.20),
                Slab::bounded(100.0, 16.00),
                Slab::bounded(100.0, 18.00),
                Slab::open(21.00),
            ],
            fixed_charge: FixedChargeRule::LoadThreshold {
                threshold_kw: 5.0,
                below: 50.0,
                at_or_above: 100.0,
            },
            bands: ConsumptionBands {
                off_peak_low: 0.1,
                off_peak_high: 0.5,
                peak_low: 0.5,
                peak_high: 0.8,
            },
            solar_adoption: 0.15,
            reliable_payer: false,
        },
        TariffConfig {
            code: TariffCode::A2,
            name: "Commercial".into(),
            min_load_kw: 2.0,
            max_load_kw: 20.0,
            phase: PhaseType::Single,
            slabs: vec![
                Slab::bounded(100.0, 16.00),
                Slab::bounded(200.0, 18.00),
                Slab::open(21.00),
            ],
            fixed_charge: FixedChargeRule::PerKw { rate: 250.0 },
            bands: ConsumptionBands {
                off_peak_low: 0.3,
                off_peak_high: 1.0,
                peak_low: 1.0,
                peak_high: 1.8,
            },
            solar_adoption: 0.10,
            reliable_payer: false,
        },
        TariffConfig {
            code: TariffCode::B1,
            name: "Small Industrial".into(),
            min_load_kw: 5.0,
            max_load_kw: 25.0,
            phase: PhaseType::Three,
            slabs: vec![Slab::open(14.00)],
            fixed_charge: FixedChargeRule::PerKw { rate: 200.0 },
            bands: ConsumptionBands {
                off_peak_low: 1.0,
                off_peak_high: 3.0,
                peak_low: 3.0,
                peak_high: 5.0,
            },
            solar_adoption: 0.05,
            reliable_payer: false,
        },
        TariffConfig {
            code: TariffCode::B2,
            name: "Large Industrial".into(),
            min_load_kw: 25.0,
            max_load_kw: 500.0,
            phase: PhaseType::Three,
            slabs: vec![Slab::open(16.00)],
            fixed_charge: FixedChargeRule::PerKw { rate: 300.0 },
            bands: ConsumptionBands {
                off_peak_low: 3.0,
                off_peak_high: 8.0,
                peak_low: 8.0,
                peak_high: 15.0,
            },
            solar_adoption: 0.05,
            reliable_payer: false,
        },
        TariffConfig {
            code: TariffCode::C1,
            name: "Agricultural".into(),
            min_load_kw: 5.0,
            max_load_kw: 50.0,
            phase: PhaseType::Three,
            slabs: vec![Slab::open(12.00)],
            fixed_charge: FixedChargeRule::PerKw { rate: 100.0 },
            bands: ConsumptionBands {
                off_peak_low: 0.5,
                off_peak_high: 2.0,
                peak_low: 2.0,
                peak_high: 4.0,
            },
            solar_adoption: 0.08,
            reliable_payer: false,
        },
        TariffConfig {
            code: TariffCode::D1,
            name: "Bulk Supply".into(),
            min_load_kw: 50.0,
            max_load_kw: 1000.0,
            phase: PhaseType::Three,
            slabs: vec![Slab::open(18.00)],
            fixed_charge: FixedChargeRule::PerKw { rate: 400.0 },
            bands: ConsumptionBands {
                off_peak_low: 5.0,
                off_peak_high: 15.0,
                peak_low: 15.0,
                peak_high: 25.0,
            },
            solar_adoption: 0.02,
            reliable_payer: true,
        },
    ]
    .into_iter()
    .map(|t| (t.code, t))
    .collect()
}

fn default_defects() -> DefectConfig {
    DefectConfig {
        bands: vec![
            DefectBand {
                flag: QualityFlag::MissingReading,
                probability: 0.020,
            },
            DefectBand {
                flag: QualityFlag::NegativeReading,
                probability: 0.005,
            },
            DefectBand {
                flag: QualityFlag::ZeroReading,
                probability: 0.010,
            },
            DefectBand {
                flag: QualityFlag::AbnormalSpike,
                probability: 0.010,
            },
            DefectBand {
                flag: QualityFlag::VoltageSag,
                probability: 0.015,
            },
            DefectBand {
                flag: QualityFlag::FrequencyVariation,
                probability: 0.010,
            },
            DefectBand {
                flag: QualityFlag::SignalDrop,
                probability: 0.020,
            },
            DefectBand {
                flag: QualityFlag::BatteryFault,
                probability: 0.005,
            },
            DefectBand {
                flag: QualityFlag::MeterTamper,
                probability: 0.003,
            },
            DefectBand {
                flag: QualityFlag::ReverseEnergy,
                probability: 0.002,
            },
        ],
    }
}

fn default_billing() -> BillingConfig {
    BillingConfig {
        gst_rate: 0.18,
        duty_rate: 0.015,
        tv_fee: 35.0,
        tv_fee_probability: 0.3,
        late_surcharge_rate: 0.05,
        late_surcharge_probability: 0.1,
        after_due_multiplier: 1.05,
        due_days: 14,
        issue_day: 20,
        reconciliation: ReconciliationPolicy::RegisterDelta,
    }
}

fn default_payment() -> PaymentConfig {
    PaymentConfig {
        base_paid_probability: 0.85,
        reliable_paid_probability: 0.98,
        large_bill_threshold: 5_000.0,
        large_bill_probability: 0.85,
        very_large_bill_threshold: 10_000.0,
        very_large_bill_probability: 0.75,
        early_weight: 0.60,
        late_short_weight: 0.25,
        late_long_weight: 0.15,
        partial_probability: 0.05,
        channels: vec![
            channel("Bank Branch", 0.15, ChannelKind::Bank),
            channel("Bank ATM", 0.10, ChannelKind::Bank),
            channel("Bank Mobile App", 0.20, ChannelKind::Bank),
            channel("EasyPaisa", 0.15, ChannelKind::Wallet),
            channel("JazzCash", 0.12, ChannelKind::Wallet),
            channel("1Bill", 0.08, ChannelKind::Wallet),
            channel("Online Banking", 0.10, ChannelKind::Bank),
            channel("Utility Office", 0.05, ChannelKind::Cash),
            channel("Franchise", 0.05, ChannelKind::Cash),
        ],
    }
}

fn channel(name: &str, weight: f64, kind: ChannelKind) -> PaymentChannel {
    PaymentChannel {
        name: name.into(),
        weight,
        kind,
    }
}
