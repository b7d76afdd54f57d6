use super::SimStore;
use crate::{entity::QualityFlag, error::SimResult, reading::MeterReading};
use chrono::DateTime;
use rusqlite::params;

impl SimStore {
    /// Bulk-insert one meter's interval stream inside a single
    /// transaction. Reading volume dominates the run, so per-row
    /// commits are not an option.
    pub fn insert_readings(&self, run_id: &str, readings: &[MeterReading]) -> SimResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO reading (
                    run_id, meter_number, ts, register_kwh, consumption_kwh, voltage,
                    current_a, frequency_hz, power_factor, temperature_c, signal_dbm,
                    battery_v, quality
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for r in readings {
                stmt.execute(params![
                    run_id,
                    &r.meter_number,
                    r.ts.and_utc().timestamp(),
                    r.register_kwh,
                    r.consumption_kwh,
                    r.voltage,
                    r.current_a,
                    r.frequency_hz,
                    r.power_factor,
                    r.temperature_c,
                    r.signal_dbm,
                    r.battery_v,
                    r.quality.as_str(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn readings_for_meter(
        &self,
        run_id: &str,
        meter_number: &str,
    ) -> SimResult<Vec<MeterReading>> {
        let mut stmt = self.conn.prepare(
            "SELECT meter_number, ts, register_kwh, consumption_kwh, voltage, current_a,
                    frequency_hz, power_factor, temperature_c, signal_dbm, battery_v, quality
             FROM reading WHERE run_id = ?1 AND meter_number = ?2
             ORDER BY ts ASC",
        )?;
        let rows = stmt.query_map(params![run_id, meter_number], |row| {
            let secs: i64 = row.get(1)?;
            let ts = DateTime::from_timestamp(secs, 0)
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| {
                    rusqlite::Error::FromSqlConversionFailure(
                        1,
                        rusqlite::types::Type::Integer,
                        format!("bad timestamp {secs}").into(),
                    )
                })?;
            Ok(MeterReading {
                meter_number: row.get(0)?,
                ts,
                register_kwh: row.get(2)?,
                consumption_kwh: row.get(3)?,
                voltage: row.get(4)?,
                current_a: row.get(5)?,
                frequency_hz: row.get(6)?,
                power_factor: row.get(7)?,
                temperature_c: row.get(8)?,
                signal_dbm: row.get(9)?,
                battery_v: row.get(10)?,
                quality: quality_from_sql(11, row.get(11)?)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn reading_count(&self, run_id: &str) -> SimResult<i64> {
        self.count_for_run("reading", run_id)
    }

    /// Reading counts per quality flag, for run summaries.
    pub fn quality_breakdown(&self, run_id: &str) -> SimResult<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT quality, COUNT(*) FROM reading WHERE run_id = ?1
             GROUP BY quality ORDER BY COUNT(*) DESC",
        )?;
        let rows = stmt.query_map(params![run_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

fn quality_from_sql(idx: usize, raw: String) -> rusqlite::Result<QualityFlag> {
    let flag = match raw.as_str() {
        "normal" => QualityFlag::Normal,
        "missing_reading" => QualityFlag::MissingReading,
        "negative_reading" => QualityFlag::NegativeReading,
        "zero_reading" => QualityFlag::ZeroReading,
        "abnormal_spike" => QualityFlag::AbnormalSpike,
        "voltage_sag" => QualityFlag::VoltageSag,
        "frequency_variation" => QualityFlag::FrequencyVariation,
        "signal_drop" => QualityFlag::SignalDrop,
        "battery_fault" => QualityFlag::BatteryFault,
        "meter_tamper" => QualityFlag::MeterTamper,
        "reverse_energy" => QualityFlag::ReverseEnergy,
        _ => {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                format!("bad quality flag '{raw}'").into(),
            ))
        }
    };
    Ok(flag)
}
