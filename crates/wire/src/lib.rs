//! meteo-wire: Sensor payload codec
//!
//! Decodes the fixed-size binary notification record the radio bridge
//! delivers, and encodes/decodes the text line format shared by the
//! rollup log and the snapshot socket.

pub mod error;
pub mod line;
pub mod payload;
pub mod reading;

pub use error::WireError;
pub use line::{encode_line, is_comment, parse_line, parse_lines, DATE_FMT};
pub use payload::{decode_record, LEGACY_RECORD_LEN, RECORD_LEN};
pub use reading::{
    celsius_to_fahrenheit_tenths, fahrenheit_to_celsius_tenths, Reading, SensorKey, TempUnit,
};

pub type Result<T> = std::result::Result<T, WireError>;
