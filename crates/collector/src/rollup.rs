use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::select;
use tokio::sync::watch;
use tracing::{debug, error, info};

use meteo_wire::{encode_line, SensorKey, TempUnit, DATE_FMT};

use crate::config::CollectorConfig;
use crate::table::SensorTable;

/// Seconds until the next wall-clock-aligned tick boundary. Computed
/// fresh before every sleep, so a process restart never drifts the
/// schedule. A call exactly on a boundary waits a full period.
pub fn secs_until_next_tick(epoch_secs: i64, period_secs: i64) -> u64 {
    let rem = epoch_secs.rem_euclid(period_secs);
    (period_secs - rem) as u64
}

/// Periodic rollup of fresh readings to an append-only log.
///
/// The sink is opened once at startup and never rotated here; rotation
/// belongs to the external archiver, which must not touch the open
/// period. Table snapshots are taken before any write, so the table
/// lock is never held across disk I/O.
pub struct Rollup {
    table: Arc<SensorTable>,
    sink: Box<dyn Write + Send>,
    window: Duration,
    period_secs: i64,
}

impl Rollup {
    /// Open the log sink in append mode (stdout when no path is given)
    /// and write the startup header comment. Failure here is fatal at
    /// startup.
    pub fn open(
        table: Arc<SensorTable>,
        path: Option<&Path>,
        config: &CollectorConfig,
    ) -> std::io::Result<Self> {
        let sink: Box<dyn Write + Send> = match path {
            Some(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                Box::new(BufWriter::new(file))
            }
            None => Box::new(std::io::stdout()),
        };

        let mut rollup = Self {
            table,
            sink,
            window: config.freshness_window,
            period_secs: i64::from(config.rollup_period_mins) * 60,
        };
        writeln!(
            rollup.sink,
            "# {}: {}",
            config.device_name,
            Local::now().format(DATE_FMT)
        )?;
        rollup.sink.flush()?;
        Ok(rollup)
    }

    /// Tick on wall-clock boundaries until shutdown. Append failures
    /// after startup are logged and the schedule continues.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(period_secs = self.period_secs, "Rollup schedule started");
        loop {
            let wait = secs_until_next_tick(Local::now().timestamp(), self.period_secs);
            select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        self.sink.flush().ok();
                        return;
                    }
                }
                _ = tokio::time::sleep(Duration::from_secs(wait)) => {
                    if let Err(e) = self.write_rollup(Local::now()) {
                        error!(error = %e, "Rollup append failed");
                    }
                }
            }
        }
    }

    /// Append one line per sensor with a reading inside the freshness
    /// window, reported in Celsius.
    pub fn write_rollup(&mut self, now: DateTime<Local>) -> std::io::Result<()> {
        let entries = self.table.fresh(now, self.window);
        debug!(sensors = entries.len(), "Rollup tick");

        for ((sensor_id, channel), reading) in entries {
            let key = SensorKey::new(sensor_id, channel, TempUnit::Celsius);
            writeln!(self.sink, "{}", encode_line(&key, &reading))?;
        }
        self.sink.flush()
    }
}
