//! The grid event log — the audit trail of every population mutation.
//!
//! RULE: events are append-only. The reading pipeline consults the
//! ordered failure events to suppress readings inside outage windows;
//! nothing ever rewrites a logged event.

use crate::{
    entity::MeterStatus,
    tariff::TariffCode,
    types::{MeterId, RunId, TransformerId},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Every event emitted during a generation run.
/// Variants are appended over time — never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GridEvent {
    RunInitialized {
        date: NaiveDate,
        run_id: RunId,
        seed: u64,
    },
    PopulationSeeded {
        date: NaiveDate,
        meters: usize,
        transformers: usize,
    },
    NewConnection {
        date: NaiveDate,
        meter: MeterId,
        transformer: TransformerId,
        district: String,
        tariff: TariffCode,
    },
    MeterReplacement {
        date: NaiveDate,
        old_meter: MeterId,
        new_meter: MeterId,
        generation: u32,
    },
    MeterFailure {
        date: NaiveDate,
        meter: MeterId,
        outage_start: NaiveDate,
        outage_end: NaiveDate,
        cause: String,
    },
    TransformerUpgrade {
        date: NaiveDate,
        transformer: TransformerId,
        old_rating_kva: f64,
        new_rating_kva: f64,
    },
    ConsumerChurn {
        date: NaiveDate,
        meter: MeterId,
        status: MeterStatus,
        reason: String,
        transformer: TransformerId,
    },
    TariffChange {
        date: NaiveDate,
        meter: MeterId,
        old_code: TariffCode,
        new_code: TariffCode,
    },
    MonthCompleted {
        date: NaiveDate,
        active_meters: usize,
    },
    PipelineFailure {
        date: NaiveDate,
        meter: MeterId,
        message: String,
    },
    TransformerOutage {
        date: NaiveDate,
        transformer: TransformerId,
        outage_start: NaiveDate,
        outage_end: NaiveDate,
        cause: String,
    },
}

impl GridEvent {
    /// Stable string name for the event_type column in event_log.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::RunInitialized { .. } => "run_initialized",
            Self::PopulationSeeded { .. } => "population_seeded",
            Self::NewConnection { .. } => "new_connection",
            Self::MeterReplacement { .. } => "meter_replacement",
            Self::MeterFailure { .. } => "meter_failure",
            Self::TransformerUpgrade { .. } => "transformer_upgrade",
            Self::ConsumerChurn { .. } => "consumer_churn",
            Self::TariffChange { .. } => "tariff_change",
            Self::MonthCompleted { .. } => "month_completed",
            Self::PipelineFailure { .. } => "pipeline_failure",
            Self::TransformerOutage { .. } => "transformer_outage",
        }
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            Self::RunInitialized { date, .. }
            | Self::PopulationSeeded { date, .. }
            | Self::NewConnection { date, .. }
            | Self::MeterReplacement { date, .. }
            | Self::MeterFailure { date, .. }
            | Self::TransformerUpgrade { date, .. }
            | Self::ConsumerChurn { date, .. }
            | Self::TariffChange { date, .. }
            | Self::MonthCompleted { date, .. }
            | Self::PipelineFailure { date, .. }
            | Self::TransformerOutage { date, .. } => *date,
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub run_id: RunId,
    pub event_date: NaiveDate,
    pub event_type: String,
    pub payload: String, // JSON-serialized GridEvent
}
