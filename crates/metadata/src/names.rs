use std::collections::HashMap;
use std::path::Path;

use crate::error::MetadataError;

/// Display names for known sensors, keyed by (sensor id, channel).
/// Loaded once at startup and immutable afterwards.
#[derive(Debug, Default, Clone)]
pub struct SensorNames {
    names: HashMap<(u8, u8), String>,
}

/// Split the next whitespace-delimited token off the front of `s`.
fn split_token(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    let end = s.find(char::is_whitespace).unwrap_or(s.len());
    Some((&s[..end], &s[end..]))
}

impl SensorNames {
    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Parse the `sensorId channel displayName` line format. Blank lines
    /// and `#` comments are ignored; a malformed line is reported and
    /// skipped, so a partially broken file still yields a usable mapping.
    pub fn parse(content: &str) -> Self {
        let mut names = HashMap::new();

        for (lineno, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let entry = split_token(trimmed).and_then(|(id, rest)| {
                let (channel, name) = split_token(rest)?;
                let sensor_id: u8 = id.parse().ok()?;
                let channel: u8 = channel.parse().ok()?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some(((sensor_id, channel), name.to_string()))
            });

            match entry {
                Some((key, name)) => {
                    names.insert(key, name);
                }
                None => {
                    tracing::warn!(line = lineno + 1, content = %trimmed, "Skipping malformed sensor name line");
                }
            }
        }

        Self { names }
    }

    pub fn resolve(&self, sensor_id: u8, channel: u8) -> Option<&str> {
        self.names.get(&(sensor_id, channel)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
