use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Local};

use meteo_wire::{fahrenheit_to_celsius_tenths, Reading, SensorKey, TempUnit};

/// Shared keyed store of the latest reading per sensor identity.
///
/// A physical sensor may be present under both its Celsius and
/// Fahrenheit keys at once; unit preference is a read-time judgment, so
/// ingestion never coerces units. Entries are never deleted by age.
/// Whole-table reads copy under the lock, so ingestion is only ever
/// blocked for the O(sensor count) clone.
#[derive(Debug, Default)]
pub struct SensorTable {
    inner: Mutex<HashMap<SensorKey, Reading>>,
}

fn to_celsius(reading: Reading, unit: TempUnit) -> Reading {
    match unit {
        TempUnit::Celsius => reading,
        TempUnit::Fahrenheit => Reading {
            temperature_tenths: fahrenheit_to_celsius_tenths(reading.temperature_tenths),
            ..reading
        },
    }
}

/// Newest-then-Celsius selection between a sensor's two unit variants:
/// the strictly newest reading wins, Celsius wins equal timestamps, and
/// a Fahrenheit winner is converted at read time.
fn pick(celsius: Option<Reading>, fahrenheit: Option<Reading>) -> Option<Reading> {
    match (celsius, fahrenheit) {
        (Some(c), Some(f)) if f.timestamp > c.timestamp => {
            Some(to_celsius(f, TempUnit::Fahrenheit))
        }
        (Some(c), _) => Some(c),
        (None, Some(f)) => Some(to_celsius(f, TempUnit::Fahrenheit)),
        (None, None) => None,
    }
}

impl SensorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one decoded reading. Latest timestamp wins per key; an
    /// equal or older reading is discarded. Returns whether the reading
    /// was stored.
    pub fn merge(&self, key: SensorKey, reading: Reading) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.get(&key) {
            Some(existing) if reading.timestamp <= existing.timestamp => false,
            _ => {
                inner.insert(key, reading);
                true
            }
        }
    }

    /// Best known value for a physical sensor regardless of unit,
    /// reported in Celsius. `None` when the sensor has never been seen.
    pub fn select(&self, sensor_id: u8, channel: u8) -> Option<Reading> {
        let key = SensorKey::new(sensor_id, channel, TempUnit::Celsius);
        let inner = self.inner.lock().unwrap();
        let celsius = inner.get(&key).copied();
        let fahrenheit = inner.get(&key.counterpart()).copied();
        drop(inner);

        pick(celsius, fahrenheit)
    }

    /// Rollup projection: for every physical sensor, the newest reading
    /// strictly younger than `window`, selected newest-then-Celsius and
    /// reported in Celsius. Sensors with nothing inside the window are
    /// skipped. Sorted by (sensor id, channel) for stable log output.
    pub fn fresh(&self, now: DateTime<Local>, window: Duration) -> Vec<((u8, u8), Reading)> {
        let window =
            chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());

        let mut per_sensor: BTreeMap<(u8, u8), (Option<Reading>, Option<Reading>)> =
            BTreeMap::new();
        for (key, reading) in self.snapshot() {
            if now.signed_duration_since(reading.timestamp) >= window {
                continue;
            }
            let slot = per_sensor
                .entry((key.sensor_id, key.channel))
                .or_default();
            match key.unit {
                TempUnit::Celsius => slot.0 = Some(reading),
                TempUnit::Fahrenheit => slot.1 = Some(reading),
            }
        }

        per_sensor
            .into_iter()
            .filter_map(|(id, (c, f))| pick(c, f).map(|reading| (id, reading)))
            .collect()
    }

    /// Point-in-time copy of the whole table, sorted by key.
    pub fn snapshot(&self) -> Vec<(SensorKey, Reading)> {
        let inner = self.inner.lock().unwrap();
        let mut entries: Vec<_> = inner.iter().map(|(k, v)| (*k, *v)).collect();
        drop(inner);

        entries.sort_by_key(|(key, _)| *key);
        entries
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}
