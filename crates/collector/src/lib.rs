//! meteo-collector: Sensor telemetry aggregation runtime
//!
//! This crate provides the components for discovering a sensor-data
//! source, ingesting its notifications into a shared table, appending a
//! periodic rollup log, and serving table snapshots over a local socket.

pub mod config;
pub mod discovery;
pub mod error;
pub mod rollup;
pub mod server;
pub mod snapshot;
pub mod source;
pub mod table;

pub use config::CollectorConfig;
pub use discovery::{Discovery, DiscoveryState};
pub use error::SourceError;
pub use rollup::Rollup;
pub use server::{create_router, run_server, ServerState};
pub use snapshot::SnapshotServer;
pub use source::{SensorSource, TcpSensorSource};
pub use table::SensorTable;
