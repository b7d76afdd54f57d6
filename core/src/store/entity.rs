use super::{date_from_sql, SimStore};
use crate::{
    entity::{
        Location, MeterClass, MeterRecord, MeterStatus, TransformerKind, TransformerRecord,
        TransformerStatus,
    },
    error::SimResult,
    tariff::{PhaseType, TariffCode},
};
use rusqlite::params;

impl SimStore {
    // ── Meter ─────────────────────────────────────────────────

    pub fn insert_meter(&self, run_id: &str, m: &MeterRecord) -> SimResult<()> {
        let tariff_history = serde_json::to_string(&m.tariff_history)?;
        self.conn.execute(
            "INSERT INTO meter (
                meter_number, run_id, consumer_id, reference_no, previous_meter,
                generation, tariff, district, division, sub_division, transformer_id,
                phase, connected_load_kw, sanctioned_load_kw, installation_date,
                deactivation_date, status, has_solar, solar_capacity_kw, meter_class,
                last_register_kwh, tariff_history
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                      ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
            params![
                &m.meter_number,
                run_id,
                &m.consumer_id,
                &m.reference_no,
                &m.previous_meter,
                m.generation,
                m.tariff.as_str(),
                &m.location.district,
                &m.location.division,
                &m.location.sub_division,
                &m.transformer_id,
                phase_str(m.phase),
                m.connected_load_kw,
                m.sanctioned_load_kw,
                m.installation_date.to_string(),
                m.deactivation_date.map(|d| d.to_string()),
                m.status.as_str(),
                if m.has_solar { 1 } else { 0 },
                m.solar_capacity_kw,
                m.meter_class.as_str(),
                m.last_register_kwh,
                tariff_history,
            ],
        )?;
        Ok(())
    }

    pub fn meters_for_run(&self, run_id: &str) -> SimResult<Vec<MeterRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT meter_number, consumer_id, reference_no, previous_meter, generation,
                    tariff, district, division, sub_division, transformer_id, phase,
                    connected_load_kw, sanctioned_load_kw, installation_date,
                    deactivation_date, status, has_solar, solar_capacity_kw, meter_class,
                    last_register_kwh, tariff_history
             FROM meter WHERE run_id = ?1 ORDER BY meter_number",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            let install_raw: String = row.get(13)?;
            let deact_raw: Option<String> = row.get(14)?;
            let history_raw: String = row.get(20)?;
            Ok(MeterRecord {
                meter_number: row.get(0)?,
                consumer_id: row.get(1)?,
                reference_no: row.get(2)?,
                previous_meter: row.get(3)?,
                generation: row.get(4)?,
                tariff: tariff_from_sql(5, row.get(5)?)?,
                location: Location {
                    district: row.get(6)?,
                    division: row.get(7)?,
                    sub_division: row.get(8)?,
                },
                transformer_id: row.get(9)?,
                phase: phase_from_sql(10, row.get(10)?)?,
                connected_load_kw: row.get(11)?,
                sanctioned_load_kw: row.get(12)?,
                installation_date: date_from_sql(13, install_raw)?,
                deactivation_date: deact_raw.map(|d| date_from_sql(14, d)).transpose()?,
                status: meter_status_from_sql(15, row.get(15)?)?,
                has_solar: row.get::<_, i32>(16)? != 0,
                solar_capacity_kw: row.get(17)?,
                meter_class: meter_class_from_sql(18, row.get(18)?)?,
                last_register_kwh: row.get(19)?,
                tariff_history: serde_json::from_str(&history_raw).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        20,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn meter_count(&self, run_id: &str) -> SimResult<i64> {
        self.count_for_run("meter", run_id)
    }

    // ── Transformer ───────────────────────────────────────────

    pub fn insert_transformer(&self, run_id: &str, t: &TransformerRecord) -> SimResult<()> {
        let upgrade_history = serde_json::to_string(&t.upgrade_history)?;
        self.conn.execute(
            "INSERT INTO transformer (
                transformer_id, run_id, kind, rating_kva, utilization_pct,
                district, division, sub_division, grid_station, status,
                commission_date, upgrade_history
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                &t.transformer_id,
                run_id,
                t.kind.as_str(),
                t.rating_kva,
                t.utilization_pct,
                &t.location.district,
                &t.location.division,
                &t.location.sub_division,
                &t.grid_station,
                t.status.as_str(),
                t.commission_date.to_string(),
                upgrade_history,
            ],
        )?;
        Ok(())
    }

    pub fn transformers_for_run(&self, run_id: &str) -> SimResult<Vec<TransformerRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT transformer_id, kind, rating_kva, utilization_pct, district,
                    division, sub_division, grid_station, status, commission_date,
                    upgrade_history
             FROM transformer WHERE run_id = ?1 ORDER BY transformer_id",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            let commission_raw: String = row.get(9)?;
            let history_raw: String = row.get(10)?;
            Ok(TransformerRecord {
                transformer_id: row.get(0)?,
                kind: transformer_kind_from_sql(1, row.get(1)?)?,
                rating_kva: row.get(2)?,
                utilization_pct: row.get(3)?,
                location: Location {
                    district: row.get(4)?,
                    division: row.get(5)?,
                    sub_division: row.get(6)?,
                },
                grid_station: row.get(7)?,
                status: transformer_status_from_sql(8, row.get(8)?)?,
                commission_date: date_from_sql(9, commission_raw)?,
                upgrade_history: serde_json::from_str(&history_raw).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        10,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn transformer_count(&self, run_id: &str) -> SimResult<i64> {
        self.count_for_run("transformer", run_id)
    }
}

fn phase_str(phase: PhaseType) -> &'static str {
    match phase {
        PhaseType::Single => "single",
        PhaseType::Three => "three",
    }
}

fn conversion_failure(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

fn tariff_from_sql(idx: usize, raw: String) -> rusqlite::Result<TariffCode> {
    TariffCode::parse(&raw).ok_or_else(|| conversion_failure(idx, format!("bad tariff '{raw}'")))
}

fn phase_from_sql(idx: usize, raw: String) -> rusqlite::Result<PhaseType> {
    match raw.as_str() {
        "single" => Ok(PhaseType::Single),
        "three" => Ok(PhaseType::Three),
        _ => Err(conversion_failure(idx, format!("bad phase '{raw}'"))),
    }
}

fn meter_status_from_sql(idx: usize, raw: String) -> rusqlite::Result<MeterStatus> {
    match raw.as_str() {
        "active" => Ok(MeterStatus::Active),
        "replaced" => Ok(MeterStatus::Replaced),
        "disconnected" => Ok(MeterStatus::Disconnected),
        "suspended" => Ok(MeterStatus::Suspended),
        "closed" => Ok(MeterStatus::Closed),
        _ => Err(conversion_failure(idx, format!("bad meter status '{raw}'"))),
    }
}

fn meter_class_from_sql(idx: usize, raw: String) -> rusqlite::Result<MeterClass> {
    match raw.as_str() {
        "conventional" => Ok(MeterClass::Conventional),
        "smart" => Ok(MeterClass::Smart),
        "smart_tou" => Ok(MeterClass::SmartTou),
        "bidirectional" => Ok(MeterClass::Bidirectional),
        _ => Err(conversion_failure(idx, format!("bad meter class '{raw}'"))),
    }
}

fn transformer_kind_from_sql(idx: usize, raw: String) -> rusqlite::Result<TransformerKind> {
    match raw.as_str() {
        "grid" => Ok(TransformerKind::Grid),
        "distribution" => Ok(TransformerKind::Distribution),
        _ => Err(conversion_failure(idx, format!("bad transformer kind '{raw}'"))),
    }
}

fn transformer_status_from_sql(idx: usize, raw: String) -> rusqlite::Result<TransformerStatus> {
    match raw.as_str() {
        "active" => Ok(TransformerStatus::Active),
        "failed" => Ok(TransformerStatus::Failed),
        _ => Err(conversion_failure(idx, format!("bad transformer status '{raw}'"))),
    }
}
