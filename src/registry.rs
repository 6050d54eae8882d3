//! Rig variants and their channel→sensor calibration tables.
//!
//! Each refrigerator insert ("rig") wires the same six bridge channels to
//! the same physical locations, but the thermometer mounted at the mixing
//! chamber differs between inserts, so each rig gets its own table. The
//! table is the single source of truth for which sensor name and which
//! calibration curve belong to a channel; nothing else in the crate maps
//! channels to sensors.
//!
//! Channel indices are assigned by position, so they are unique and
//! contiguous from 0 by construction.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationCurve;
use crate::error::{MonitorError, MonitorResult};

/// The monitored insert variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rig {
    /// The dilution fridge itself (TT1305 at the mixing chamber).
    Fridge,
    /// Straight measurement probe (TT1304).
    Probe1,
    /// Rotator probe (TT1308).
    Probe2,
    /// Spare probe insert (S0927).
    Probe3,
}

impl Rig {
    /// Default log-file prefix for this rig's persisted records.
    pub fn file_prefix(self) -> &'static str {
        match self {
            Rig::Fridge => "Fridge",
            Rig::Probe1 => "Probe1",
            Rig::Probe2 => "Probe2",
            Rig::Probe3 => "Probe3",
        }
    }

    /// All known rigs, for help text and exhaustiveness in tests.
    pub fn all() -> [Rig; 4] {
        [Rig::Fridge, Rig::Probe1, Rig::Probe2, Rig::Probe3]
    }
}

impl fmt::Display for Rig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Rig::Fridge => "fridge",
            Rig::Probe1 => "probe1",
            Rig::Probe2 => "probe2",
            Rig::Probe3 => "probe3",
        };
        f.write_str(name)
    }
}

impl FromStr for Rig {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fridge" => Ok(Rig::Fridge),
            "probe1" => Ok(Rig::Probe1),
            "probe2" => Ok(Rig::Probe2),
            "probe3" => Ok(Rig::Probe3),
            _ => Err(MonitorError::UnknownRig(s.trim().to_string())),
        }
    }
}

/// One channel's sensor identity and conversion.
#[derive(Debug, Clone)]
pub struct SensorBinding {
    /// Bridge multiplexer channel, 0-based.
    pub channel: u8,
    /// Sensor name; identifies the persisted log file.
    pub name: &'static str,
    /// Resistance→temperature curve fitted for this sensor.
    pub curve: CalibrationCurve,
}

/// Ordered channel→sensor table for one rig.
#[derive(Debug, Clone)]
pub struct CalibrationRegistry {
    rig: Rig,
    bindings: Vec<SensorBinding>,
}

impl CalibrationRegistry {
    /// Build the table for `rig`.
    ///
    /// All rigs share the channel layout; only the mixing-chamber "low"
    /// thermometer (channel 3) differs between inserts.
    pub fn for_rig(rig: Rig) -> Self {
        let mixing_low = match rig {
            Rig::Fridge => CalibrationCurve::tt1305(),
            Rig::Probe1 => CalibrationCurve::tt1304(),
            Rig::Probe2 => CalibrationCurve::tt1308(),
            Rig::Probe3 => CalibrationCurve::s0927(),
        };
        let table = [
            ("3K_low", CalibrationCurve::ruo2_10k()),
            ("Still", CalibrationCurve::ruo2_10k()),
            ("50mK", CalibrationCurve::ruo2_1k5()),
            ("MixingCh_low", mixing_low),
            ("MixingCh_high", CalibrationCurve::pt1000()),
            ("Magnet", CalibrationCurve::ruo2_10k()),
        ];
        let bindings = table
            .into_iter()
            .enumerate()
            .map(|(i, (name, curve))| SensorBinding {
                channel: i as u8,
                name,
                curve,
            })
            .collect();
        Self { rig, bindings }
    }

    /// Rig this table belongs to.
    pub fn rig(&self) -> Rig {
        self.rig
    }

    /// Number of channels in the table.
    pub fn channel_count(&self) -> usize {
        self.bindings.len()
    }

    /// All bindings in channel order.
    pub fn bindings(&self) -> &[SensorBinding] {
        &self.bindings
    }

    /// Look up the sensor bound to `channel`.
    ///
    /// Out-of-range channels are a configuration mistake, not an
    /// instrument fault, and come back as `ChannelOutOfRange`.
    pub fn lookup(&self, channel: u8) -> MonitorResult<&SensorBinding> {
        self.bindings
            .get(usize::from(channel))
            .ok_or(MonitorError::ChannelOutOfRange {
                rig: self.rig,
                channel,
                count: self.bindings.len(),
            })
    }
}
