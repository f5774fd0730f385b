use chrono::{DateTime, Local};

use crate::error::WireError;
use crate::reading::{Reading, SensorKey, TempUnit};
use crate::Result;

/// Current notification record: little-endian packed
/// `i16 temperature_tenths, u8 sensor_id, u8 channel, u8 humidity,
/// u8 unit_flag, u8 low_power_flag`.
pub const RECORD_LEN: usize = 7;

/// Legacy record revision without the low-power flag.
pub const LEGACY_RECORD_LEN: usize = 6;

/// Decode one binary notification record, stamping it with the arrival
/// time. Both record revisions are accepted; a legacy record decodes with
/// `low_power = false`.
pub fn decode_record(payload: &[u8], timestamp: DateTime<Local>) -> Result<(SensorKey, Reading)> {
    let low_power = match payload.len() {
        RECORD_LEN => payload[6] != 0,
        LEGACY_RECORD_LEN => false,
        len => return Err(WireError::MalformedPayload { len }),
    };

    let temperature_tenths = i16::from_le_bytes([payload[0], payload[1]]);
    let unit = match payload[5] {
        0 => TempUnit::Celsius,
        1 => TempUnit::Fahrenheit,
        flag => return Err(WireError::BadUnitFlag { flag }),
    };

    let key = SensorKey::new(payload[2], payload[3], unit);
    let reading = Reading {
        temperature_tenths,
        humidity: payload[4],
        timestamp,
        low_power,
    };
    Ok((key, reading))
}
