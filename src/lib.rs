//! # Cryomon Core Library
//!
//! Unattended temperature monitoring for the lab's dilution fridge and its
//! measurement probes. An AVS-47 resistance bridge multiplexes the rig's
//! thermometers; this crate sweeps the bridge on a fixed cadence, converts
//! each channel's resistance to kelvin through per-sensor calibration
//! curves and appends the results to plain-text sensor logs that the
//! plotting tools tail.
//!
//! ## Crate Structure
//!
//! - **`calibration`**: per-sensor polynomial fits and their validity
//!   domains; resistance in, kelvin out.
//! - **`registry`**: rig variants and the channel→sensor tables that bind
//!   a calibration curve to each bridge channel.
//! - **`bridge`**: the transport abstraction over the instrument link,
//!   with a simulated AVS-47 in the default build and a VISA-backed
//!   implementation behind the `instrument_visa` feature.
//! - **`scan`**: the sweep protocol state machine (configure, sweep, poll,
//!   read back) and the single-point readback path.
//! - **`acquisition`**: one full scan-convert-persist cycle, and the
//!   unattended loop that repeats it with retry and cancellation.
//! - **`storage`**: the frozen append-only log-line format and the
//!   per-sensor log files.
//! - **`config`**: TOML + environment configuration with validation.
//! - **`error`**: the [`MonitorError`] taxonomy separating instrument
//!   faults (retried) from configuration mistakes (fatal).
//! - **`logging`**: tracing subscriber setup.

pub mod acquisition;
pub mod bridge;
pub mod calibration;
pub mod config;
pub mod error;
pub mod logging;
pub mod registry;
pub mod scan;
pub mod storage;

pub use error::{MonitorError, MonitorResult};
