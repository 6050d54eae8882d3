//! Simulated AVS-47 bridge.
//!
//! Emulates the instrument's command surface closely enough to drive the
//! whole acquisition stack without hardware:
//!
//! - `*OPC?` busy/idle sequencing (a configurable number of busy polls
//!   after a sweep start or an `ADC` conversion);
//! - `*IDN?`, `MUX?`, `RES?`, `OVL?` spot queries;
//! - `REM`-bracketed sweep configuration, sweep start and per-channel
//!   `AVE?`/`STD?` readback against canned resistances;
//! - scripted fault injection (fail the Nth transport operation) and a
//!   command transcript for assertions.
//!
//! State lives behind an `Arc`, so clones of one simulator share the same
//! instrument: the connector hands out connections that all talk to the
//! same simulated hardware, and tests keep a handle for inspection after
//! the code under test has dropped its connection.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::Mutex;

use crate::bridge::{BridgeConnector, BridgeTransport};
use crate::error::{MonitorError, MonitorResult};

#[derive(Debug)]
struct SimState {
    idn: String,
    resistances: BTreeMap<u8, f64>,
    std_devs: BTreeMap<u8, f64>,
    noise_ohms: f64,
    mux_channel: u8,
    overload: bool,
    busy_remaining: u32,
    sweep_busy_polls: u32,
    adc_busy_polls: u32,
    always_busy: bool,
    fail_at_op: Option<u32>,
    ops: u32,
    connects: u32,
    transcript: Vec<String>,
    configured_channels: Vec<u8>,
    sweep_bounds: Option<(u8, u8)>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            idn: "AVS47B-AL SIM,rev 1.0".to_string(),
            resistances: BTreeMap::new(),
            std_devs: BTreeMap::new(),
            noise_ohms: 0.0,
            mux_channel: 0,
            overload: false,
            busy_remaining: 0,
            sweep_busy_polls: 1,
            adc_busy_polls: 1,
            always_busy: false,
            fail_at_op: None,
            ops: 0,
            connects: 0,
            transcript: Vec::new(),
            configured_channels: Vec::new(),
            sweep_bounds: None,
        }
    }
}

/// In-memory stand-in for the AVS-47.
///
/// Cloning shares state; see the module docs. Construct with canned
/// channel resistances, then adjust behavior through the async setters.
///
/// ```rust,ignore
/// let sim = SimulatedBridge::with_resistances([(0, 15_000.0), (1, 400.0)]);
/// sim.fail_at_op(3).await; // third write/query/clear errors
/// let connector = sim.connector();
/// ```
#[derive(Debug, Clone)]
pub struct SimulatedBridge {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedBridge {
    /// Simulator with no canned resistances (every channel reads 0 Ω).
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    /// Simulator with canned per-channel resistances in ohms.
    pub fn with_resistances(resistances: impl IntoIterator<Item = (u8, f64)>) -> Self {
        let state = SimState {
            resistances: resistances.into_iter().collect(),
            ..SimState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Connector that opens connections onto this simulator.
    pub fn connector(&self) -> SimulatedConnector {
        SimulatedConnector {
            bridge: self.clone(),
        }
    }

    /// Set the canned resistance for one channel.
    pub async fn set_resistance(&self, channel: u8, ohms: f64) {
        self.state.lock().await.resistances.insert(channel, ohms);
    }

    /// Set the canned sweep standard deviation for one channel.
    pub async fn set_std_dev(&self, channel: u8, ohms: f64) {
        self.state.lock().await.std_devs.insert(channel, ohms);
    }

    /// Uniform noise amplitude added to sweep averages (0 disables).
    pub async fn set_noise_ohms(&self, ohms: f64) {
        self.state.lock().await.noise_ohms = ohms;
    }

    /// Channel the multiplexer currently points at (`MUX?`).
    pub async fn set_mux_channel(&self, channel: u8) {
        self.state.lock().await.mux_channel = channel;
    }

    /// Raise or clear the overload flag reported by `OVL?`.
    pub async fn set_overload(&self, overload: bool) {
        self.state.lock().await.overload = overload;
    }

    /// Report busy for `polls` `*OPC?` queries before the next ready.
    pub async fn set_busy_polls(&self, polls: u32) {
        self.state.lock().await.busy_remaining = polls;
    }

    /// Busy polls consumed by each sweep (default 1).
    pub async fn set_sweep_busy_polls(&self, polls: u32) {
        self.state.lock().await.sweep_busy_polls = polls;
    }

    /// Never report ready; pair with a bounded wait in the code under test.
    pub async fn set_always_busy(&self, always: bool) {
        self.state.lock().await.always_busy = always;
    }

    /// Fail the Nth transport operation (1-based, counted across
    /// connections) with a link fault. One-shot: later operations succeed.
    pub async fn fail_at_op(&self, op: u32) {
        self.state.lock().await.fail_at_op = Some(op);
    }

    /// Every command and query issued so far, oldest first.
    pub async fn transcript(&self) -> Vec<String> {
        self.state.lock().await.transcript.clone()
    }

    /// Channels that received a per-channel `SCP` configuration.
    pub async fn configured_channels(&self) -> Vec<u8> {
        self.state.lock().await.configured_channels.clone()
    }

    /// `FCH`/`LCH` bounds from the last global sweep configuration.
    pub async fn sweep_bounds(&self) -> Option<(u8, u8)> {
        self.state.lock().await.sweep_bounds
    }

    /// Connections opened through [`SimulatedConnector`] so far.
    pub async fn connection_count(&self) -> u32 {
        self.state.lock().await.connects
    }
}

impl Default for SimulatedBridge {
    fn default() -> Self {
        Self::new()
    }
}

/// First integer following `key` in `command`, e.g. `number_after("REM 1;SCP 4;…", "SCP")`.
fn number_after(command: &str, key: &str) -> Option<u32> {
    let start = command.find(key)? + key.len();
    let rest = command[start..].trim_start();
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

impl SimState {
    /// Count the operation and apply scripted fault injection.
    fn begin_op(&mut self, description: &str) -> MonitorResult<()> {
        self.ops += 1;
        if self.fail_at_op == Some(self.ops) {
            self.fail_at_op = None;
            return Err(MonitorError::Bridge(format!(
                "simulated link fault during '{description}' (op {})",
                self.ops
            )));
        }
        Ok(())
    }

    fn opc_response(&mut self) -> String {
        if self.always_busy {
            return "0\n".to_string();
        }
        if self.busy_remaining > 0 {
            self.busy_remaining -= 1;
            "0\n".to_string()
        } else {
            "1\n".to_string()
        }
    }

    fn readback_response(&mut self, command: &str) -> MonitorResult<String> {
        let channel = number_after(command, "SCR").ok_or_else(|| {
            MonitorError::Bridge(format!("simulated readback without SCR channel: '{command}'"))
        })? as u8;
        let mut avg = self.resistances.get(&channel).copied().unwrap_or(0.0);
        if self.noise_ohms > 0.0 {
            avg += rand::thread_rng().gen_range(-self.noise_ohms..=self.noise_ohms);
        }
        let std = self.std_devs.get(&channel).copied().unwrap_or(0.0);
        Ok(format!("AVE {avg};STD {std}\n"))
    }
}

#[async_trait]
impl BridgeTransport for SimulatedBridge {
    async fn write(&mut self, command: &str) -> MonitorResult<()> {
        let mut state = self.state.lock().await;
        state.begin_op(command)?;
        state.transcript.push(command.to_string());

        let trimmed = command.trim();
        if trimmed == "ADC" {
            state.busy_remaining = state.adc_busy_polls;
        } else if trimmed.contains("SCN") {
            state.busy_remaining = state.sweep_busy_polls;
        } else if trimmed.contains("SCP") {
            let channel = number_after(trimmed, "SCP").ok_or_else(|| {
                MonitorError::Bridge(format!("simulated SCP without channel: '{command}'"))
            })? as u8;
            state.configured_channels.push(channel);
        } else if trimmed.contains("FCH") {
            let first = number_after(trimmed, "FCH");
            let last = number_after(trimmed, "LCH");
            match (first, last) {
                (Some(first), Some(last)) => {
                    state.sweep_bounds = Some((first as u8, last as u8));
                }
                _ => {
                    return Err(MonitorError::Bridge(format!(
                        "simulated sweep configuration missing FCH/LCH: '{command}'"
                    )));
                }
            }
        } else {
            return Err(MonitorError::Bridge(format!(
                "simulator does not understand write '{command}'"
            )));
        }
        Ok(())
    }

    async fn query(&mut self, command: &str) -> MonitorResult<String> {
        let mut state = self.state.lock().await;
        state.begin_op(command)?;
        state.transcript.push(command.to_string());

        let trimmed = command.trim();
        match trimmed {
            "*OPC?" => Ok(state.opc_response()),
            "*IDN?" => Ok(format!("{}\n", state.idn)),
            "MUX?" => Ok(format!("MUX {}\n", state.mux_channel)),
            "RES?" => {
                let ohms = state
                    .resistances
                    .get(&state.mux_channel)
                    .copied()
                    .unwrap_or(0.0);
                Ok(format!("RES 0 {ohms}\n"))
            }
            "OVL?" => Ok(format!("OVL {}\n", u8::from(state.overload))),
            other if other.contains("AVE?") => state.readback_response(other),
            other => Err(MonitorError::Bridge(format!(
                "simulator does not understand query '{other}'"
            ))),
        }
    }

    async fn clear(&mut self) -> MonitorResult<()> {
        let mut state = self.state.lock().await;
        state.begin_op("<clear>")?;
        state.transcript.push("<clear>".to_string());
        state.busy_remaining = 0;
        Ok(())
    }
}

/// Opens connections onto one shared [`SimulatedBridge`].
#[derive(Debug, Clone)]
pub struct SimulatedConnector {
    bridge: SimulatedBridge,
}

#[async_trait]
impl BridgeConnector for SimulatedConnector {
    async fn connect(&self) -> MonitorResult<Box<dyn BridgeTransport>> {
        self.bridge.state.lock().await.connects += 1;
        Ok(Box::new(self.bridge.clone()))
    }
}
