//! AVS-47 scan protocol.
//!
//! The bridge's scanner firmware is driven over a small ASCII command set.
//! Configuration and control commands are wrapped in a remote-mode bracket
//! (`REM 1;…;REM 0`); readiness is polled with bare `*OPC?` queries.
//!
//! A full sweep is one pass through this fixed sequence:
//!
//! | Phase              | Wire traffic                                               |
//! |--------------------|------------------------------------------------------------|
//! | awaiting-ready     | `*OPC?` until `1`, 1 s between polls                       |
//! | configuring        | `REM 1;FCH f;LCH l;SCI …;ETC …;TCP …;ARN …;REM 0`, then one `REM 1;SCP ch;EXC …;SDY …;CNT …;REM 0` per channel |
//! | sweeping           | `REM 1;SCN 0;REM 0`                                        |
//! | awaiting-sweep-done| `*OPC?` until `1`                                          |
//! | reading            | `REM 1;SCR ch;AVE?;STD?;REM 0` per channel, ascending      |
//!
//! Each readback response carries two `;`-separated `NAME value` segments
//! (`AVE 15000.1;STD 2.3`); the value is the last whitespace-separated
//! token of its segment.
//!
//! The protocol performs no retries: any fault aborts the sweep and is
//! reported upward, tagged with the phase it occurred in. Both polling
//! loops are bounded by a configurable deadline so a wedged instrument
//! surfaces as a [`MonitorError::Timeout`] instead of hanging the rig
//! forever.
//!
//! There is also a single-point path ([`ScanProtocol::read_active_channel`])
//! that reads whatever channel the multiplexer currently selects, used for
//! quick manual checks without a full sweep.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::bridge::BridgeTransport;
use crate::error::{MonitorError, MonitorResult};

/// Seconds between `*OPC?` polls while waiting on a sweep.
const SWEEP_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Faster pacing for single-point ADC conversions.
const SPOT_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Default ceiling on each polling wait.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(900);

/// Where in the sweep sequence the protocol currently is.
///
/// The error state of the machine is not a variant: faults abort the
/// sweep as `Err` values tagged with the phase they occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    /// Waiting for the instrument to finish whatever it was doing.
    AwaitingReady,
    /// Sending global and per-channel sweep configuration.
    Configuring,
    /// Starting the sweep.
    Sweeping,
    /// Waiting for the sweep to complete.
    AwaitingSweepDone,
    /// Reading averaged results back, channel by channel.
    Reading,
    /// Waiting for a single-point ADC conversion.
    AwaitingConversion,
    /// All requested channels read; results returned to the caller.
    Complete,
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanPhase::AwaitingReady => "awaiting-ready",
            ScanPhase::Configuring => "configuring",
            ScanPhase::Sweeping => "sweeping",
            ScanPhase::AwaitingSweepDone => "awaiting-sweep-done",
            ScanPhase::Reading => "reading",
            ScanPhase::AwaitingConversion => "awaiting-conversion",
            ScanPhase::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Sweep parameters sent to the scanner firmware.
///
/// Defaults are the values the rigs have always run with. The timing
/// fields are passed through to the instrument verbatim; only `autorange`
/// is translated (to `ARN 1`/`ARN 0`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSettings {
    /// `SCI`: sweep timing, scan interval setting.
    pub scan_interval: u32,
    /// `ETC`: sweep timing, extra settle time on channel change.
    pub extra_time: u32,
    /// `TCP`: sweep timing, time-constant parameter.
    pub time_constant: u32,
    /// `ARN`: let the bridge autorange during the sweep.
    pub autorange: bool,
    /// `EXC`: per-channel excitation setting.
    pub excitation: u32,
    /// `SDY`: per-channel settling delay.
    pub settle_delay: u32,
    /// `CNT`: per-channel sample count for the average.
    pub samples: u32,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            scan_interval: 600,
            extra_time: 0,
            time_constant: 30,
            autorange: true,
            excitation: 3,
            settle_delay: 5,
            samples: 10,
        }
    }
}

/// One channel's averaged sweep result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanResult {
    /// Multiplexer channel the values belong to.
    pub channel: u8,
    /// Mean resistance over the sweep's samples.
    pub average_ohms: f64,
    /// Standard deviation over the same samples.
    pub std_dev_ohms: f64,
}

/// Result of a single-point readback of the active channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotReading {
    /// Channel the multiplexer was pointing at.
    pub channel: u8,
    /// One converted resistance value.
    pub resistance_ohms: f64,
}

/// Drives one sweep (or spot read) over an open bridge connection.
///
/// Borrows the transport exclusively for its lifetime; the strict
/// command/response sequencing of the instrument falls out of that.
pub struct ScanProtocol<'a> {
    transport: &'a mut dyn BridgeTransport,
    sweep: SweepSettings,
    poll_timeout: Duration,
}

impl<'a> ScanProtocol<'a> {
    /// Protocol with default sweep settings and poll timeout.
    pub fn new(transport: &'a mut dyn BridgeTransport) -> Self {
        Self::with_settings(transport, SweepSettings::default(), DEFAULT_POLL_TIMEOUT)
    }

    /// Protocol with explicit sweep settings and poll deadline.
    pub fn with_settings(
        transport: &'a mut dyn BridgeTransport,
        sweep: SweepSettings,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            sweep,
            poll_timeout,
        }
    }

    /// Run one full sweep over `channels` and return their results.
    ///
    /// The channel list is sorted and deduplicated; results come back in
    /// ascending channel order. An empty list is a configuration error.
    pub async fn run(&mut self, channels: &[u8]) -> MonitorResult<Vec<ScanResult>> {
        let mut channels = channels.to_vec();
        channels.sort_unstable();
        channels.dedup();
        let (Some(&first), Some(&last)) = (channels.first(), channels.last()) else {
            return Err(MonitorError::Configuration(
                "sweep requested with an empty channel list".into(),
            ));
        };

        self.await_idle(ScanPhase::AwaitingReady, SWEEP_POLL_INTERVAL)
            .await?;

        debug!(first, last, ?channels, "configuring sweep");
        let s = &self.sweep;
        let global = format!(
            "REM 1;FCH {first};LCH {last};SCI {};ETC {};TCP {};ARN {};REM 0",
            s.scan_interval,
            s.extra_time,
            s.time_constant,
            u8::from(s.autorange),
        );
        self.transport.write(&global).await?;
        for &channel in &channels {
            let per_channel = format!(
                "REM 1;SCP {channel};EXC {};SDY {};CNT {};REM 0",
                self.sweep.excitation, self.sweep.settle_delay, self.sweep.samples,
            );
            self.transport.write(&per_channel).await?;
        }

        debug!("starting sweep");
        self.transport.write("REM 1;SCN 0;REM 0").await?;
        self.await_idle(ScanPhase::AwaitingSweepDone, SWEEP_POLL_INTERVAL)
            .await?;

        debug!("reading sweep results");
        let mut results = Vec::with_capacity(channels.len());
        for &channel in &channels {
            results.push(self.read_channel(channel).await?);
        }
        Ok(results)
    }

    /// Read back one channel's averaged result after a completed sweep.
    async fn read_channel(&mut self, channel: u8) -> MonitorResult<ScanResult> {
        let query = format!("REM 1;SCR {channel};AVE?;STD?;REM 0");
        let response = self.transport.query(&query).await?;
        let (average_ohms, std_dev_ohms) =
            parse_readback(response.trim()).ok_or_else(|| MonitorError::MalformedResponse {
                query,
                response: response.trim().to_string(),
            })?;
        Ok(ScanResult {
            channel,
            average_ohms,
            std_dev_ohms,
        })
    }

    /// Single-point readback of whatever channel the multiplexer selects.
    ///
    /// Triggers one ADC conversion, waits for it at a 100 ms cadence and
    /// checks the overload flag afterwards: an overloaded reading is
    /// reported as [`MonitorError::Overload`] and must be discarded.
    pub async fn read_active_channel(&mut self) -> MonitorResult<SpotReading> {
        let channel = self
            .parsed_query("MUX?", 1, |token| token.parse::<u8>().ok())
            .await?;

        self.transport.write("ADC").await?;
        self.await_idle(ScanPhase::AwaitingConversion, SPOT_POLL_INTERVAL)
            .await?;

        let resistance_ohms = self
            .parsed_query("RES?", 2, |token| token.parse::<f64>().ok())
            .await?;
        let overload = self
            .parsed_query("OVL?", 1, |token| token.parse::<u32>().ok())
            .await?;
        if overload != 0 {
            return Err(MonitorError::Overload { channel });
        }
        Ok(SpotReading {
            channel,
            resistance_ohms,
        })
    }

    /// Query and parse one whitespace-separated response token.
    async fn parsed_query<T>(
        &mut self,
        query: &str,
        token_index: usize,
        parse: impl Fn(&str) -> Option<T>,
    ) -> MonitorResult<T> {
        let response = self.transport.query(query).await?;
        response
            .split_whitespace()
            .nth(token_index)
            .and_then(parse)
            .ok_or_else(|| MonitorError::MalformedResponse {
                query: query.to_string(),
                response: response.trim().to_string(),
            })
    }

    /// Poll `*OPC?` until the instrument reports idle.
    ///
    /// `1` is idle, `0` is busy; anything else is a malformed response.
    /// Gives up with a phase-tagged `Timeout` once the deadline passes.
    async fn await_idle(&mut self, phase: ScanPhase, interval: Duration) -> MonitorResult<()> {
        let deadline = Instant::now() + self.poll_timeout;
        loop {
            let response = self.transport.query("*OPC?").await?;
            match response.trim() {
                "1" => return Ok(()),
                "0" => {}
                other => {
                    return Err(MonitorError::MalformedResponse {
                        query: "*OPC?".to_string(),
                        response: other.to_string(),
                    });
                }
            }
            if Instant::now() + interval > deadline {
                return Err(MonitorError::Timeout {
                    phase,
                    waited_secs: self.poll_timeout.as_secs(),
                });
            }
            debug!(%phase, "bridge busy, polling again");
            sleep(interval).await;
        }
    }
}

/// Split an `AVE …;STD …` readback into its two values.
///
/// Exactly two segments are required; each value is the last whitespace
/// token of its segment.
fn parse_readback(response: &str) -> Option<(f64, f64)> {
    let mut segments = response.split(';');
    let average = segments.next()?;
    let std_dev = segments.next()?;
    if segments.next().is_some() {
        return None;
    }
    let average = average.split_whitespace().last()?.parse::<f64>().ok()?;
    let std_dev = std_dev.split_whitespace().last()?.parse::<f64>().ok()?;
    Some((average, std_dev))
}
