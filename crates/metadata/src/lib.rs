//! meteo-metadata: Sensor name configuration
//!
//! Loads the external `sensorId channel displayName` mapping used to
//! annotate readings with human-readable names.

pub mod error;
pub mod names;

pub use error::MetadataError;
pub use names::SensorNames;
