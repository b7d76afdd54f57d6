//! Master records: meters and transformers.
//!
//! Records are tagged types with explicit optional fields — never
//! loose maps. Meters are never deleted, only marked inactive, so a
//! run's full replacement/churn history stays queryable.

use crate::{
    tariff::{PhaseType, TariffCode},
    types::{ConsumerId, MeterId, TransformerId},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterStatus {
    Active,
    Replaced,
    Disconnected,
    Suspended,
    Closed,
}

impl MeterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Replaced => "replaced",
            Self::Disconnected => "disconnected",
            Self::Suspended => "suspended",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterClass {
    Conventional,
    Smart,
    SmartTou,
    Bidirectional,
}

impl MeterClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conventional => "conventional",
            Self::Smart => "smart",
            Self::SmartTou => "smart_tou",
            Self::Bidirectional => "bidirectional",
        }
    }
}

/// Data-quality flag on a reading. Exactly one flag per reading;
/// "Normal" means no defect band was hit for that draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    Normal,
    MissingReading,
    NegativeReading,
    ZeroReading,
    AbnormalSpike,
    VoltageSag,
    FrequencyVariation,
    SignalDrop,
    BatteryFault,
    MeterTamper,
    ReverseEnergy,
}

impl QualityFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::MissingReading => "missing_reading",
            Self::NegativeReading => "negative_reading",
            Self::ZeroReading => "zero_reading",
            Self::AbnormalSpike => "abnormal_spike",
            Self::VoltageSag => "voltage_sag",
            Self::FrequencyVariation => "frequency_variation",
            Self::SignalDrop => "signal_drop",
            Self::BatteryFault => "battery_fault",
            Self::MeterTamper => "meter_tamper",
            Self::ReverseEnergy => "reverse_energy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub district: String,
    pub division: String,
    pub sub_division: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TariffChangeEntry {
    pub date: NaiveDate,
    pub old_code: TariffCode,
    pub new_code: TariffCode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterRecord {
    pub meter_number: MeterId,
    pub consumer_id: ConsumerId,
    pub reference_no: String,
    /// Set on replacement successors; links the chain backwards.
    pub previous_meter: Option<MeterId>,
    /// Strictly increases along a replacement chain.
    pub generation: u32,
    pub tariff: TariffCode,
    pub location: Location,
    pub transformer_id: TransformerId,
    pub phase: PhaseType,
    pub connected_load_kw: f64,
    pub sanctioned_load_kw: f64,
    pub installation_date: NaiveDate,
    pub deactivation_date: Option<NaiveDate>,
    pub status: MeterStatus,
    pub has_solar: bool,
    pub solar_capacity_kw: f64,
    pub meter_class: MeterClass,
    /// Running cumulative register. Owned exclusively by the reading
    /// pipeline for the duration of this meter's timeline.
    pub last_register_kwh: f64,
    pub tariff_history: Vec<TariffChangeEntry>,
}

impl MeterRecord {
    pub fn is_active(&self) -> bool {
        self.status == MeterStatus::Active
    }

    /// Whether this meter produces readings on `date`.
    pub fn is_live_on(&self, date: NaiveDate) -> bool {
        if date < self.installation_date {
            return false;
        }
        match self.deactivation_date {
            Some(deact) => date < deact,
            None => true,
        }
    }

    pub fn deactivate(&mut self, status: MeterStatus, date: NaiveDate) {
        self.status = status;
        self.deactivation_date = Some(date);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformerKind {
    Grid,
    Distribution,
}

impl TransformerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grid => "grid",
            Self::Distribution => "distribution",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformerStatus {
    Active,
    /// Tripped by a feeder outage; back in service the following month.
    Failed,
}

impl TransformerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeEntry {
    pub date: NaiveDate,
    pub old_rating_kva: f64,
    pub new_rating_kva: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformerRecord {
    pub transformer_id: TransformerId,
    pub kind: TransformerKind,
    pub rating_kva: f64,
    /// Clamped to [0, 100] after every mutation.
    pub utilization_pct: f64,
    pub location: Location,
    pub grid_station: String,
    pub status: TransformerStatus,
    pub commission_date: NaiveDate,
    pub upgrade_history: Vec<UpgradeEntry>,
}

impl TransformerRecord {
    /// Ratings only increase, via recorded upgrades. Utilization is
    /// rescaled by old/new so served load is preserved.
    pub fn apply_upgrade(&mut self, date: NaiveDate, new_rating_kva: f64) {
        if new_rating_kva <= self.rating_kva {
            return;
        }
        let old = self.rating_kva;
        self.utilization_pct =
            (self.utilization_pct * old / new_rating_kva).clamp(0.0, 100.0);
        self.rating_kva = new_rating_kva;
        self.upgrade_history.push(UpgradeEntry {
            date,
            old_rating_kva: old,
            new_rating_kva,
        });
    }

    pub fn shift_utilization(&mut self, delta: f64, floor: f64) {
        self.utilization_pct = (self.utilization_pct + delta).clamp(floor, 100.0);
    }
}
