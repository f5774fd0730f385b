use chrono::{Local, NaiveDateTime, TimeZone};

use crate::error::WireError;
use crate::reading::{Reading, SensorKey, TempUnit};
use crate::Result;

/// Timestamp format shared by the rollup log and the snapshot socket.
pub const DATE_FMT: &str = "%Y-%m-%d %H:%M";

/// Marker appended to a line when the sensor reported low battery.
const LOW_POWER_MARKER: &str = "Low Power";

/// Lines starting with `#` are metadata/comments. They are skipped by
/// parsers and must never reach the line grammar.
pub fn is_comment(line: &str) -> bool {
    line.starts_with('#')
}

/// Encode one table entry as a log/snapshot line (no trailing newline).
/// Field widths are fixed for tabular alignment.
pub fn encode_line(key: &SensorKey, reading: &Reading) -> String {
    let mut line = format!(
        "{}{:>4} {} {:>8.1}{} {}%",
        reading.timestamp.format(DATE_FMT),
        key.sensor_id,
        key.channel,
        reading.temperature(),
        key.unit.letter(),
        reading.humidity,
    );
    if reading.low_power {
        line.push(' ');
        line.push_str(LOW_POWER_MARKER);
    }
    line
}

fn unparsed(line: &str) -> WireError {
    WireError::UnparsedLine {
        line: line.to_string(),
    }
}

/// Parse one log/snapshot line. Whitespace between fields is elastic;
/// the timestamp prefix is fixed-width. Comment lines are the caller's
/// responsibility to filter (see [`is_comment`]).
pub fn parse_line(line: &str) -> Result<(SensorKey, Reading)> {
    let date_part = line.get(0..16).ok_or_else(|| unparsed(line))?;
    let naive = NaiveDateTime::parse_from_str(date_part, DATE_FMT)
        .map_err(|_| unparsed(line))?;
    let timestamp = Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| unparsed(line))?;

    let mut fields = line[16..].split_whitespace();
    let sensor_id: u8 = fields
        .next()
        .and_then(|f| f.parse().ok())
        .ok_or_else(|| unparsed(line))?;
    let channel: u8 = fields
        .next()
        .and_then(|f| f.parse().ok())
        .ok_or_else(|| unparsed(line))?;

    // Temperature with the unit letter appended, e.g. "21.3C" or "-5.2F".
    let temp_field = fields.next().ok_or_else(|| unparsed(line))?;
    let (number, unit) = if let Some(n) = temp_field.strip_suffix('C') {
        (n, TempUnit::Celsius)
    } else if let Some(n) = temp_field.strip_suffix('F') {
        (n, TempUnit::Fahrenheit)
    } else {
        return Err(unparsed(line));
    };
    let (_, frac) = number.split_once('.').ok_or_else(|| unparsed(line))?;
    if frac.len() != 1 || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(unparsed(line));
    }
    let value: f64 = number.parse().map_err(|_| unparsed(line))?;
    let temperature_tenths = (value * 10.0).round() as i16;

    let humidity: u8 = fields
        .next()
        .and_then(|f| f.strip_suffix('%'))
        .and_then(|f| f.parse().ok())
        .ok_or_else(|| unparsed(line))?;

    // Anything after the humidity is the low-power marker.
    let low_power = fields.next().is_some();

    let key = SensorKey::new(sensor_id, channel, unit);
    let reading = Reading {
        temperature_tenths,
        humidity,
        timestamp,
        low_power,
    };
    Ok((key, reading))
}

/// Parse a batch of lines, as read from a rollup log or a snapshot
/// dump. Comment and blank lines are skipped before the grammar ever
/// sees them; a line that fails the grammar is reported and skipped,
/// never aborting the batch.
pub fn parse_lines(content: &str) -> Vec<(SensorKey, Reading)> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty() && !is_comment(line))
        .filter_map(|line| match parse_line(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unparsed line");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Local};

    fn stamp() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 2, 13, 30, 0).unwrap()
    }

    fn reading(tenths: i16, low_power: bool) -> Reading {
        Reading {
            temperature_tenths: tenths,
            humidity: 44,
            timestamp: stamp(),
            low_power,
        }
    }

    #[test]
    fn test_encode_fixed_widths() {
        let key = SensorKey::new(5, 1, TempUnit::Celsius);
        let line = encode_line(&key, &reading(213, false));
        assert_eq!(line, "2024-01-02 13:30   5 1     21.3C 44%");
    }

    #[test]
    fn test_encode_low_power_marker() {
        let key = SensorKey::new(12, 2, TempUnit::Fahrenheit);
        let line = encode_line(&key, &reading(700, true));
        assert_eq!(line, "2024-01-02 13:30  12 2     70.0F 44% Low Power");
    }

    #[test]
    fn test_encode_negative_temperature() {
        let key = SensorKey::new(5, 1, TempUnit::Celsius);
        let line = encode_line(&key, &reading(-52, false));
        assert_eq!(line, "2024-01-02 13:30   5 1     -5.2C 44%");
    }

    #[test]
    fn test_parse_round_trip() {
        let key = SensorKey::new(5, 1, TempUnit::Celsius);
        let original = reading(213, false);
        let (parsed_key, parsed) = parse_line(&encode_line(&key, &original)).unwrap();

        assert_eq!(parsed_key, key);
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_parse_low_power_round_trip() {
        let key = SensorKey::new(5, 1, TempUnit::Fahrenheit);
        let original = reading(700, true);
        let (parsed_key, parsed) = parse_line(&encode_line(&key, &original)).unwrap();

        assert_eq!(parsed_key.unit, TempUnit::Fahrenheit);
        assert!(parsed.low_power);
    }

    #[test]
    fn test_parse_elastic_whitespace() {
        let (key, reading) = parse_line("2024-01-02 13:30 5 1 21.3C 44%").unwrap();
        assert_eq!(key, SensorKey::new(5, 1, TempUnit::Celsius));
        assert_eq!(reading.temperature_tenths, 213);
        assert_eq!(reading.humidity, 44);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for line in [
            "",
            "not a line at all",
            "2024-01-02 13:30   5 1     21.3X 44%",
            "2024-01-02 13:30   5 1     21.3C",
            "2024-01-02 13:30   5 1     21C 44%",
            "2024-13-99 13:30   5 1     21.3C 44%",
        ] {
            let err = parse_line(line).unwrap_err();
            assert!(matches!(err, WireError::UnparsedLine { .. }), "{:?}", line);
        }
    }

    #[test]
    fn test_parse_lines_skips_comments_and_garbage() {
        let content = "\
# Meteodata: 2024-01-02 13:30
2024-01-02 13:30   5 1     21.3C 44%
this line is broken

2024-01-02 13:30  12 2     70.0F 61% Low Power
";
        let entries = parse_lines(content);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0.sensor_id, 5);
        assert_eq!(entries[1].0.sensor_id, 12);
        assert!(entries[1].1.low_power);
    }

    #[test]
    fn test_comment_lines_detected() {
        assert!(is_comment("# Meteodata: 2024-01-02 13:30"));
        assert!(is_comment("#"));
        assert!(!is_comment("2024-01-02 13:30   5 1     21.3C 44%"));
    }
}
