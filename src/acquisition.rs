//! Acquisition cycle and the unattended monitoring loop.
//!
//! One **cycle** is the unit of work: take the timestamp, connect to the
//! bridge, clear it, log its identity, run a full sweep, drop the
//! connection, convert resistances to temperatures through the rig's
//! calibration table and append one record per channel. The instrument is
//! released *before* any file is touched, and a failure anywhere before
//! persistence writes nothing at all: a cycle either lands completely in
//! the logs or leaves no trace.
//!
//! The **loop** repeats cycles forever. After a successful cycle it
//! sleeps the configured delay (two minutes historically); after a
//! recoverable fault (bridge hiccup, timeout, full disk) it logs the
//! error, sleeps a short fixed backoff and tries again, with no retry
//! cap. A monitoring rig must outlive transient trouble unattended.
//! Configuration mistakes are not retried; they propagate immediately.
//!
//! Cancellation is cooperative through a `watch` channel: the flag is
//! checked between cycles and raced against both sleeps, so a Ctrl-C
//! stops the process promptly but never kills a sweep mid-flight.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::bridge::BridgeConnector;
use crate::error::MonitorResult;
use crate::registry::CalibrationRegistry;
use crate::scan::{ScanProtocol, SweepSettings};
use crate::storage::{CycleStamp, LogStore, PersistedRecord};

/// Backoff after a recoverable cycle failure.
const RETRY_BACKOFF: Duration = Duration::from_secs(10);

/// One channel's fully converted result.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelReading {
    /// Multiplexer channel the values came from.
    pub channel: u8,
    /// Sensor bound to the channel on this rig.
    pub sensor: &'static str,
    /// Averaged resistance over the sweep.
    pub resistance_ohms: f64,
    /// Standard deviation over the sweep.
    pub std_dev_ohms: f64,
    /// Calibrated temperature, or the 0.0 sentinel when out of range.
    pub temperature_kelvin: f64,
    /// Whether the resistance fell inside the curve's fitted domain.
    pub calibrated: bool,
}

/// Everything one successful cycle produced.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Timestamp shared by all of the cycle's records.
    pub stamp: CycleStamp,
    /// Converted readings in ascending channel order.
    pub readings: Vec<ChannelReading>,
    /// Wall time the cycle took, connection to last append.
    pub elapsed: Duration,
}

/// Scans the configured channels once and persists the results.
pub struct AcquisitionCycle<'a> {
    connector: &'a dyn BridgeConnector,
    registry: &'a CalibrationRegistry,
    store: &'a LogStore,
    channels: Vec<u8>,
    sweep: SweepSettings,
    poll_timeout: Duration,
}

impl<'a> AcquisitionCycle<'a> {
    /// Cycle over `channels` against one rig's calibration table.
    pub fn new(
        connector: &'a dyn BridgeConnector,
        registry: &'a CalibrationRegistry,
        store: &'a LogStore,
        channels: &[u8],
        sweep: SweepSettings,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            connector,
            registry,
            store,
            channels: channels.to_vec(),
            sweep,
            poll_timeout,
        }
    }

    /// Run one full cycle.
    pub async fn run(&self) -> MonitorResult<CycleReport> {
        // The stamp is taken before any instrument traffic so that all of
        // the cycle's records share the moment the cycle began.
        let stamp = CycleStamp::now();
        let started = Instant::now();

        let mut transport = self.connector.connect().await?;
        transport.clear().await?;
        let idn = transport.query("*IDN?").await?;
        info!(rig = %self.registry.rig(), idn = %idn.trim(), "bridge identified");

        let results = {
            let mut protocol =
                ScanProtocol::with_settings(&mut *transport, self.sweep.clone(), self.poll_timeout);
            protocol.run(&self.channels).await?
        };
        // Release the instrument before touching the filesystem.
        drop(transport);

        let mut readings = Vec::with_capacity(results.len());
        let mut records = Vec::with_capacity(results.len());
        for result in results {
            let binding = self.registry.lookup(result.channel)?;
            let temperature = binding.curve.try_evaluate(result.average_ohms);
            let reading = ChannelReading {
                channel: result.channel,
                sensor: binding.name,
                resistance_ohms: result.average_ohms,
                std_dev_ohms: result.std_dev_ohms,
                temperature_kelvin: temperature.unwrap_or(0.0),
                calibrated: temperature.is_some(),
            };
            info!(
                channel = reading.channel,
                sensor = reading.sensor,
                ohms = reading.resistance_ohms,
                kelvin = reading.temperature_kelvin,
                calibrated = reading.calibrated,
                "channel read"
            );
            records.push(PersistedRecord::new(
                reading.sensor,
                &stamp,
                reading.resistance_ohms,
                reading.temperature_kelvin,
            ));
            readings.push(reading);
        }
        self.store.append_all(&records)?;

        let elapsed = started.elapsed();
        info!(
            channels = readings.len(),
            secs = elapsed.as_secs_f64(),
            "cycle complete"
        );
        Ok(CycleReport {
            stamp,
            readings,
            elapsed,
        })
    }
}

/// Repeats acquisition cycles until cancelled.
pub struct AcquisitionLoop<'a> {
    cycle: AcquisitionCycle<'a>,
    delay: Duration,
    cancel: watch::Receiver<bool>,
}

impl<'a> AcquisitionLoop<'a> {
    /// Loop running `cycle` every `delay`, stopping when `cancel` turns
    /// true.
    pub fn new(
        cycle: AcquisitionCycle<'a>,
        delay: Duration,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            cycle,
            delay,
            cancel,
        }
    }

    /// Run until cancelled or a non-recoverable error occurs.
    pub async fn run(mut self) -> MonitorResult<()> {
        loop {
            if *self.cancel.borrow() {
                info!("monitoring stopped");
                return Ok(());
            }
            match self.cycle.run().await {
                Ok(_) => {
                    debug!(secs = self.delay.as_secs(), "sleeping until next cycle");
                    if self.pause(self.delay).await {
                        info!("monitoring stopped");
                        return Ok(());
                    }
                }
                Err(err) if err.is_recoverable() => {
                    warn!(error = %err, backoff_secs = RETRY_BACKOFF.as_secs(), "cycle failed, will retry");
                    if self.pause(RETRY_BACKOFF).await {
                        info!("monitoring stopped");
                        return Ok(());
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Sleep for `duration`, waking early on cancellation.
    ///
    /// Returns true when cancelled. A dropped sender also counts as
    /// cancellation: with nobody able to stop the loop it must stop
    /// itself.
    async fn pause(&mut self, duration: Duration) -> bool {
        let timer = sleep(duration);
        tokio::pin!(timer);
        loop {
            tokio::select! {
                _ = &mut timer => return false,
                changed = self.cancel.changed() => match changed {
                    Ok(()) if *self.cancel.borrow() => return true,
                    Ok(()) => continue,
                    Err(_) => return true,
                },
            }
        }
    }
}
