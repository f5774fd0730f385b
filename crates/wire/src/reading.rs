use chrono::{DateTime, Local};

/// Temperature unit a sensor reports in. The transport may deliver the
/// same physical sensor in both units; they are kept as distinct entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TempUnit {
    Celsius,
    Fahrenheit,
}

impl TempUnit {
    /// Single letter appended to the temperature in the text formats.
    pub fn letter(&self) -> char {
        match self {
            TempUnit::Celsius => 'C',
            TempUnit::Fahrenheit => 'F',
        }
    }

    pub fn from_letter(c: char) -> Option<Self> {
        match c {
            'C' => Some(TempUnit::Celsius),
            'F' => Some(TempUnit::Fahrenheit),
            _ => None,
        }
    }
}

/// Identity of one physical sensor + channel + reporting unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SensorKey {
    pub sensor_id: u8,
    pub channel: u8,
    pub unit: TempUnit,
}

impl SensorKey {
    pub fn new(sensor_id: u8, channel: u8, unit: TempUnit) -> Self {
        Self {
            sensor_id,
            channel,
            unit,
        }
    }

    /// The same sensor reported in the other unit.
    pub fn counterpart(&self) -> Self {
        let unit = match self.unit {
            TempUnit::Celsius => TempUnit::Fahrenheit,
            TempUnit::Fahrenheit => TempUnit::Celsius,
        };
        Self { unit, ..*self }
    }
}

/// One decoded temperature/humidity sample. Immutable: a newer Reading
/// replaces an older table entry wholesale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Temperature in tenths of a degree, in the unit named by the key.
    pub temperature_tenths: i16,
    pub humidity: u8,
    pub timestamp: DateTime<Local>,
    pub low_power: bool,
}

impl Reading {
    /// Temperature as a display value (one implied decimal).
    pub fn temperature(&self) -> f64 {
        f64::from(self.temperature_tenths) / 10.0
    }
}

/// `C = round((F - 32) / 1.8)`, carried out on tenths of a degree.
pub fn fahrenheit_to_celsius_tenths(tenths: i16) -> i16 {
    ((f64::from(tenths) - 320.0) / 1.8).round() as i16
}

/// `F = round(C * 1.8 + 32)`, carried out on tenths of a degree.
pub fn celsius_to_fahrenheit_tenths(tenths: i16) -> i16 {
    (f64::from(tenths) * 1.8 + 320.0).round() as i16
}
