//! Monitor configuration.
//!
//! Loaded from a TOML file merged with environment variables:
//! 1. `config/cryomon.toml` (or the path given on the command line)
//! 2. environment variables prefixed `CRYOMON_`, with `__` separating
//!    nesting levels, e.g. `CRYOMON_ACQUISITION__RIG=probe1` or
//!    `CRYOMON_STORAGE__DIR=/var/log/cryo`
//!
//! Every key has a default, so a missing file yields a usable
//! configuration (fridge rig, all six channels, simulated instrument off).
//! Validation happens separately after loading so that a bad value is
//! reported as a configuration error before any instrument traffic.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, MonitorResult};
use crate::registry::{CalibrationRegistry, Rig};
use crate::scan::SweepSettings;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/cryomon.toml";

/// Top-level configuration tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// What to scan and how often.
    pub acquisition: AcquisitionConfig,
    /// How to reach the bridge.
    pub instrument: InstrumentConfig,
    /// Protocol pacing and sweep parameters.
    pub scan: ScanConfig,
    /// Where records are appended.
    pub storage: StorageConfig,
    /// Diagnostic logging.
    pub log: LogConfig,
}

/// Rig selection and cycle cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Which insert is being monitored.
    pub rig: Rig,
    /// Channels to scan each cycle.
    pub channels: Vec<u8>,
    /// Seconds to sleep between successful cycles.
    pub delay_secs: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            rig: Rig::Fridge,
            channels: vec![0, 1, 2, 3, 4, 5],
            delay_secs: 120,
        }
    }
}

/// Bridge connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// VISA resource string of the AVS-47.
    pub resource: String,
    /// Use the simulated bridge instead of real hardware.
    pub simulate: bool,
    /// Uniform noise amplitude for simulated sweep averages, in ohms.
    pub sim_noise_ohms: f64,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            resource: "GPIB0::21::INSTR".to_string(),
            simulate: false,
            sim_noise_ohms: 0.0,
        }
    }
}

/// Scan protocol settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Ceiling in seconds on each readiness/completion wait.
    pub poll_timeout_secs: u64,
    /// Sweep parameters passed to the scanner firmware.
    pub sweep: SweepSettings,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            poll_timeout_secs: crate::scan::DEFAULT_POLL_TIMEOUT.as_secs(),
            sweep: SweepSettings::default(),
        }
    }
}

/// Record persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory the sensor logs are appended under.
    pub dir: PathBuf,
    /// Log file prefix; empty means "use the rig's historical prefix".
    pub prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
            prefix: String::new(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default tracing filter; `RUST_LOG` overrides it.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl MonitorConfig {
    /// Load from the default file location plus the environment.
    pub fn load() -> MonitorResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from an explicit file path plus the environment.
    ///
    /// A missing file is not an error; defaults and environment variables
    /// still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> MonitorResult<Self> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("CRYOMON_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Reject configurations that could not drive a cycle.
    pub fn validate(&self) -> MonitorResult<()> {
        if self.acquisition.channels.is_empty() {
            return Err(MonitorError::Configuration(
                "acquisition.channels must list at least one channel".into(),
            ));
        }
        let registry = CalibrationRegistry::for_rig(self.acquisition.rig);
        for &channel in &self.acquisition.channels {
            if usize::from(channel) >= registry.channel_count() {
                return Err(MonitorError::ChannelOutOfRange {
                    rig: self.acquisition.rig,
                    channel,
                    count: registry.channel_count(),
                });
            }
        }
        if self.instrument.resource.trim().is_empty() {
            return Err(MonitorError::Configuration(
                "instrument.resource must not be empty".into(),
            ));
        }
        if self.scan.poll_timeout_secs == 0 {
            return Err(MonitorError::Configuration(
                "scan.poll_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Log file prefix, falling back to the rig's historical one.
    pub fn storage_prefix(&self) -> &str {
        let prefix = self.storage.prefix.trim();
        if prefix.is_empty() {
            self.acquisition.rig.file_prefix()
        } else {
            prefix
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_describe_the_fridge() {
        let config = MonitorConfig::load_from("/nonexistent/cryomon.toml").expect("defaults");
        assert_eq!(config.acquisition.rig, Rig::Fridge);
        assert_eq!(config.acquisition.channels, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(config.acquisition.delay_secs, 120);
        assert_eq!(config.instrument.resource, "GPIB0::21::INSTR");
        assert_eq!(config.scan.poll_timeout_secs, 900);
        assert_eq!(config.storage_prefix(), "Fridge");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp config");
        writeln!(
            file,
            r#"
            [acquisition]
            rig = "probe2"
            channels = [3, 4]
            delay_secs = 30

            [scan]
            poll_timeout_secs = 60

            [scan.sweep]
            samples = 25

            [storage]
            dir = "/tmp/cryo-logs"
            "#
        )
        .expect("write config");

        let config = MonitorConfig::load_from(file.path()).expect("load");
        assert_eq!(config.acquisition.rig, Rig::Probe2);
        assert_eq!(config.acquisition.channels, vec![3, 4]);
        assert_eq!(config.acquisition.delay_secs, 30);
        assert_eq!(config.scan.poll_timeout_secs, 60);
        assert_eq!(config.scan.sweep.samples, 25);
        // Unlisted sweep keys keep their defaults.
        assert_eq!(config.scan.sweep.scan_interval, 600);
        assert_eq!(config.storage.dir, PathBuf::from("/tmp/cryo-logs"));
        assert_eq!(config.storage_prefix(), "Probe2");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn environment_overrides_the_file() {
        // No other test reads this key, so parallel runs stay independent.
        std::env::set_var("CRYOMON_INSTRUMENT__SIM_NOISE_OHMS", "2.5");
        let config = MonitorConfig::load_from("/nonexistent/cryomon.toml").expect("load");
        std::env::remove_var("CRYOMON_INSTRUMENT__SIM_NOISE_OHMS");
        assert_eq!(config.instrument.sim_noise_ohms, 2.5);
    }

    #[test]
    fn validation_rejects_empty_channel_list() {
        let mut config = MonitorConfig::default();
        config.acquisition.channels.clear();
        assert!(matches!(
            config.validate(),
            Err(MonitorError::Configuration(_))
        ));
    }

    #[test]
    fn validation_rejects_unknown_channels() {
        let mut config = MonitorConfig::default();
        config.acquisition.channels = vec![0, 9];
        assert!(matches!(
            config.validate(),
            Err(MonitorError::ChannelOutOfRange { channel: 9, count: 6, .. })
        ));
    }

    #[test]
    fn explicit_prefix_wins_over_rig_default() {
        let mut config = MonitorConfig::default();
        config.storage.prefix = "Bench".to_string();
        assert_eq!(config.storage_prefix(), "Bench");
    }
}
