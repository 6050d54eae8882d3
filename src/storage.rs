//! Append-only sensor log files.
//!
//! Every successful cycle appends one record per scanned channel to a
//! plain-text file named after the sensor (`<dir>/<prefix>_<sensor>.txt`).
//! Years of existing logs are in this exact shape, so the line format is
//! frozen: tab-separated epoch seconds, ctime-style timestamp, resistance
//! (2 decimals, width 10), temperature (5 decimals, width 10) and a status
//! label, with a trailing tab before the newline. The trailing empty
//! column is historical and must stay.
//!
//! Files are only ever appended to; nothing here rewrites or deletes.
//! Plotting and fridge-watch tooling tails these files directly.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, TimeZone};

use crate::error::MonitorResult;

/// Timestamp layout matching C `ctime()`, day-of-month space padded.
const CTIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Status label written while no control program is driving the fridge.
const DEFAULT_STATUS: &str = "Idle";

/// The moment a cycle started, shared by all of its records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleStamp {
    /// Whole seconds since the Unix epoch.
    pub epoch_secs: i64,
    /// The same instant as a local-time ctime string.
    pub ctime: String,
}

impl CycleStamp {
    /// Stamp for the current wall-clock second.
    pub fn now() -> Self {
        Self::from_epoch(Local::now().timestamp())
    }

    /// Stamp for an explicit epoch second.
    pub fn from_epoch(epoch_secs: i64) -> Self {
        // An epoch outside chrono's representable range only arises from a
        // broken clock; the raw number is still a usable timestamp column.
        let ctime = Local
            .timestamp_opt(epoch_secs, 0)
            .single()
            .map(|t| t.format(CTIME_FORMAT).to_string())
            .unwrap_or_else(|| epoch_secs.to_string());
        Self { epoch_secs, ctime }
    }
}

/// One line of a sensor log.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedRecord {
    /// Sensor name; selects the log file.
    pub sensor: String,
    /// Cycle timestamp, epoch seconds.
    pub epoch_secs: i64,
    /// Cycle timestamp, human readable.
    pub ctime: String,
    /// Averaged resistance for the cycle, in ohms.
    pub resistance_ohms: f64,
    /// Calibrated temperature in kelvin; 0 when out of calibration range.
    pub temperature_kelvin: f64,
    /// Status label column.
    pub status: String,
}

impl PersistedRecord {
    /// Record for one sensor under the shared cycle stamp.
    pub fn new(
        sensor: impl Into<String>,
        stamp: &CycleStamp,
        resistance_ohms: f64,
        temperature_kelvin: f64,
    ) -> Self {
        Self {
            sensor: sensor.into(),
            epoch_secs: stamp.epoch_secs,
            ctime: stamp.ctime.clone(),
            resistance_ohms,
            temperature_kelvin,
            status: DEFAULT_STATUS.to_string(),
        }
    }

    /// The exact log line, trailing tab and newline included.
    pub fn line(&self) -> String {
        format!(
            "{}\t{}\t{:>10.2}\t{:>10.5}\t{}\t\n",
            self.epoch_secs, self.ctime, self.resistance_ohms, self.temperature_kelvin, self.status,
        )
    }
}

/// Appends records to per-sensor log files under one directory.
#[derive(Debug, Clone)]
pub struct LogStore {
    dir: PathBuf,
    prefix: String,
}

impl LogStore {
    /// Store rooted at `dir`, with log files named `<prefix>_<sensor>.txt`.
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    /// Directory the logs live in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of the log file for `sensor`.
    pub fn path_for(&self, sensor: &str) -> PathBuf {
        self.dir.join(format!("{}_{}.txt", self.prefix, sensor))
    }

    /// Append one record to its sensor's log, creating directory and file
    /// on first use.
    pub fn append(&self, record: &PersistedRecord) -> MonitorResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(self.path_for(&record.sensor))?;
        file.write_all(record.line().as_bytes())?;
        Ok(())
    }

    /// Append a batch of records, stopping at the first failure.
    pub fn append_all(&self, records: &[PersistedRecord]) -> MonitorResult<()> {
        for record in records {
            self.append(record)?;
        }
        Ok(())
    }
}
