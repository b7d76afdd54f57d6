//! Interval reading generation with the data-quality defect taxonomy.
//!
//! One reading per interval over the meter's live window, suppressed
//! inside outage windows. Exactly one defect roll per interval; the
//! defect mutates the affected fields and nothing else, so every
//! reading carries exactly one quality flag.
//!
//! The cumulative register is the only cross-interval state. It is
//! owned by this generator for the meter's whole timeline: nothing
//! else writes `last_register_kwh` once generation starts.

use crate::{
    config::{Density, SimConfig},
    entity::{MeterRecord, QualityFlag},
    error::SimResult,
    rng::StreamRng,
    types::{Kwh, MeterId},
};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Weekday};

/// Months treated as summer for ambient-temperature synthesis.
const SUMMER_MONTHS: std::ops::RangeInclusive<u32> = 5..=9;

/// Daylight window where solar self-consumption depresses the draw.
const SOLAR_HOURS: std::ops::Range<u32> = 8..17;

#[derive(Debug, Clone)]
pub struct MeterReading {
    pub meter_number: MeterId,
    pub ts: NaiveDateTime,
    /// Cumulative register after this interval.
    pub register_kwh: Kwh,
    /// Interval consumption as the meter reported it (defects included).
    pub consumption_kwh: Kwh,
    pub voltage: f64,
    pub current_a: f64,
    pub frequency_hz: f64,
    pub power_factor: f64,
    pub temperature_c: f64,
    pub signal_dbm: f64,
    pub battery_v: f64,
    pub quality: QualityFlag,
}

pub struct ReadingGenerator;

impl ReadingGenerator {
    /// Generate the meter's full interval stream for the run window.
    /// Advances `meter.last_register_kwh` as a side effect.
    pub fn generate(
        config: &SimConfig,
        meter: &mut MeterRecord,
        outages: &[(NaiveDate, NaiveDate)],
        rng: &mut StreamRng,
    ) -> SimResult<Vec<MeterReading>> {
        let district = config.district(&meter.location.district)?;
        let tariff = config.tariff(meter.tariff)?;
        let interval_min = config.run.reading_interval_min as i64;
        let interval_hours = interval_min as f64 / 60.0;

        let first_day = meter.installation_date.max(config.run.start_date);
        let last_day = config.run.end_date;
        let mut readings = Vec::new();
        if first_day > last_day {
            return Ok(readings);
        }

        let (nominal_voltage, voltage_sigma) = match district.density {
            Density::Urban => (230.0, 3.0),
            Density::Rural => (225.0, 5.0),
        };

        let mut register = meter.last_register_kwh;
        let mut ts = match first_day.and_hms_opt(0, 0, 0) {
            Some(start) => start,
            None => return Ok(readings),
        };

        while ts.date() <= last_day {
            let date = ts.date();
            if !meter.is_live_on(date) {
                if date >= meter.installation_date {
                    break; // deactivated, timeline over
                }
                ts += Duration::minutes(interval_min);
                continue;
            }
            if outages.iter().any(|(from, to)| date >= *from && date <= *to) {
                ts += Duration::minutes(interval_min);
                continue;
            }

            let hour = ts.hour();
            let peak = is_peak_hour(district.density, hour);
            let band = &tariff.bands;
            let per_hour = if peak {
                rng.uniform(band.peak_low, band.peak_high)
            } else {
                rng.uniform(band.off_peak_low, band.off_peak_high)
            };

            let mut consumption = per_hour * interval_hours;
            consumption *= config.seasonal_multipliers[date.month0() as usize];
            if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                consumption *= config.weekend_multiplier;
            }
            consumption *= district.consumption_multiplier;
            if meter.has_solar && SOLAR_HOURS.contains(&hour) {
                consumption *= rng.uniform(config.solar_reduction.0, config.solar_reduction.1);
            }
            consumption *= rng.uniform(0.9, 1.1);

            let mut voltage = rng.gauss(nominal_voltage, voltage_sigma);
            if peak {
                voltage *= 0.97;
            }
            let mut frequency_hz = rng.gauss(50.0, 0.1);
            let power_factor = (0.92 + rng.gauss(0.0, 0.02)).clamp(0.5, 1.0);
            let season_temp = if SUMMER_MONTHS.contains(&date.month()) {
                district.summer_temp_c
            } else {
                district.winter_temp_c
            };
            let temperature_c = rng.gauss(season_temp, 3.0);
            let mut signal_dbm = -70.0 + rng.gauss(0.0, 5.0);
            let mut battery_v = 3.7 + rng.gauss(0.0, 0.1);

            // One defect roll per interval. Missing consumes the
            // interval without emitting a row.
            let quality = match config.defects.classify(rng.next_f64()) {
                Some(QualityFlag::MissingReading) => {
                    ts += Duration::minutes(interval_min);
                    continue;
                }
                Some(flag) => flag,
                None => QualityFlag::Normal,
            };

            match quality {
                QualityFlag::NegativeReading | QualityFlag::ReverseEnergy => {
                    consumption = -consumption;
                }
                QualityFlag::ZeroReading => consumption = 0.0,
                QualityFlag::AbnormalSpike => consumption *= rng.uniform(5.0, 10.0),
                QualityFlag::VoltageSag => voltage *= 0.7,
                QualityFlag::FrequencyVariation => {
                    frequency_hz = if rng.chance(0.5) {
                        rng.uniform(47.0, 48.5)
                    } else {
                        rng.uniform(51.5, 53.0)
                    };
                }
                QualityFlag::SignalDrop => signal_dbm = rng.uniform(-110.0, -90.0),
                QualityFlag::BatteryFault => battery_v = rng.uniform(2.5, 3.0),
                QualityFlag::MeterTamper => consumption *= 0.3,
                QualityFlag::Normal | QualityFlag::MissingReading => {}
            }

            consumption = round3(consumption);
            register = round3(register + consumption);
            let current_a = if voltage > 0.0 {
                (consumption / interval_hours) * 1_000.0 / voltage
            } else {
                0.0
            };

            readings.push(MeterReading {
                meter_number: meter.meter_number.clone(),
                ts,
                register_kwh: register,
                consumption_kwh: consumption,
                voltage: round2(voltage),
                current_a: round2(current_a.abs()),
                frequency_hz: round2(frequency_hz),
                power_factor: round2(power_factor),
                temperature_c: round2(temperature_c),
                signal_dbm: round2(signal_dbm),
                battery_v: round2(battery_v),
                quality,
            });

            ts += Duration::minutes(interval_min);
        }

        meter.last_register_kwh = register;
        log::trace!(
            "meter {}: {} readings, register {register:.3}",
            meter.meter_number,
            readings.len()
        );
        Ok(readings)
    }
}

fn is_peak_hour(density: Density, hour: u32) -> bool {
    match density {
        Density::Urban => (5..10).contains(&hour) || (17..23).contains(&hour),
        Density::Rural => (5..9).contains(&hour) || (18..22).contains(&hour),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round3(value: f64) -> f64 {
    (value * 1_000.0).round() / 1_000.0
}
