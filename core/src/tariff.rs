//! Tariff catalog types: billing classes, slab tables, fixed-charge
//! rules, and per-interval consumption bands.

use serde::{Deserialize, Serialize};

/// Closed set of tariff codes. Free-text tariff strings drift; every
/// lookup goes through this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TariffCode {
    #[serde(rename = "A-1")]
    A1,
    #[serde(rename = "A-2")]
    A2,
    #[serde(rename = "B-1")]
    B1,
    #[serde(rename = "B-2")]
    B2,
    #[serde(rename = "C-1")]
    C1,
    #[serde(rename = "D-1")]
    D1,
}

impl TariffCode {
    pub const ALL: [TariffCode; 6] = [
        TariffCode::A1,
        TariffCode::A2,
        TariffCode::B1,
        TariffCode::B2,
        TariffCode::C1,
        TariffCode::D1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A1 => "A-1",
            Self::A2 => "A-2",
            Self::B1 => "B-1",
            Self::B2 => "B-2",
            Self::C1 => "C-1",
            Self::D1 => "D-1",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == s)
    }

    pub fn category(&self) -> ConsumerCategory {
        match self {
            Self::A1 => ConsumerCategory::Residential,
            Self::A2 => ConsumerCategory::Commercial,
            Self::B1 | Self::B2 => ConsumerCategory::Industrial,
            Self::C1 => ConsumerCategory::Agricultural,
            Self::D1 => ConsumerCategory::Bulk,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerCategory {
    Residential,
    Commercial,
    Industrial,
    Agricultural,
    Bulk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseType {
    Single,
    Three,
}

/// One progressive tier: up to `width_units` billed at `rate`.
/// `width_units = None` marks the open-ended final tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slab {
    pub width_units: Option<f64>,
    pub rate: f64,
}

impl Slab {
    pub fn bounded(width_units: f64, rate: f64) -> Self {
        Self {
            width_units: Some(width_units),
            rate,
        }
    }

    pub fn open(rate: f64) -> Self {
        Self {
            width_units: None,
            rate,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixedChargeRule {
    /// Flat amount keyed on connected load vs. a threshold (residential).
    LoadThreshold {
        threshold_kw: f64,
        below: f64,
        at_or_above: f64,
    },
    /// Connected load times a per-kW rate (commercial/industrial/bulk).
    PerKw { rate: f64 },
}

impl FixedChargeRule {
    pub fn charge_for(&self, connected_load_kw: f64) -> f64 {
        match self {
            Self::LoadThreshold {
                threshold_kw,
                below,
                at_or_above,
            } => {
                if connected_load_kw < *threshold_kw {
                    *below
                } else {
                    *at_or_above
                }
            }
            Self::PerKw { rate } => rate * connected_load_kw,
        }
    }
}

/// Per-reading-interval kWh draw bands, split by peak window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConsumptionBands {
    pub off_peak_low: f64,
    pub off_peak_high: f64,
    pub peak_low: f64,
    pub peak_high: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TariffConfig {
    pub code: TariffCode,
    pub name: String,
    pub min_load_kw: f64,
    pub max_load_kw: f64,
    pub phase: PhaseType,
    pub slabs: Vec<Slab>,
    pub fixed_charge: FixedChargeRule,
    pub bands: ConsumptionBands,
    /// Fraction of new connections fitted with rooftop solar.
    pub solar_adoption: f64,
    /// Government/protected supply classes settle bills near-certainly.
    pub reliable_payer: bool,
}

/// Progressive slab accumulation: each tier consumes up to its width
/// from the remaining units at its rate, remainder carries forward.
pub fn variable_charge(slabs: &[Slab], units: f64) -> f64 {
    let mut remaining = units.max(0.0);
    let mut charge = 0.0;
    for slab in slabs {
        if remaining <= 0.0 {
            break;
        }
        let take = match slab.width_units {
            Some(width) => remaining.min(width),
            None => remaining,
        };
        charge += take * slab.rate;
        remaining -= take;
    }
    charge
}
