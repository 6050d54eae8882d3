//! Real AVS-47 connection over the installed VISA stack.
//!
//! Only compiled with the `instrument_visa` feature; the default build
//! talks to [`crate::bridge::SimulatedBridge`] instead. The bridge lives
//! on GPIB (typically `GPIB0::21::INSTR`), where reads are message-based:
//! one `read` returns one instrument response.
//!
//! VISA calls are synchronous and block the calling thread for the few
//! milliseconds a GPIB transaction takes. The acquisition stack runs one
//! transaction at a time on a single task, so they are issued inline
//! rather than shuttled through a blocking-thread pool.

use std::ffi::CString;
use std::io::{Read, Write};

use async_trait::async_trait;
use tracing::{debug, trace};
use visa_rs::prelude::*;

use crate::bridge::{BridgeConnector, BridgeTransport};
use crate::error::{MonitorError, MonitorResult};

fn link_err(context: &str, err: impl std::fmt::Display) -> MonitorError {
    MonitorError::Bridge(format!("{context}: {err}"))
}

/// Opens a fresh VISA session to the configured resource each cycle.
#[derive(Debug, Clone)]
pub struct VisaConnector {
    resource: String,
}

impl VisaConnector {
    /// Connector for a VISA resource string such as `GPIB0::21::INSTR`.
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
        }
    }
}

#[async_trait]
impl BridgeConnector for VisaConnector {
    async fn connect(&self) -> MonitorResult<Box<dyn BridgeTransport>> {
        let rm = DefaultRM::new().map_err(|e| link_err("opening VISA resource manager", e))?;
        let name = CString::new(self.resource.as_str())
            .map_err(|_| {
                MonitorError::Configuration(format!(
                    "VISA resource string contains a NUL byte: '{}'",
                    self.resource
                ))
            })?
            .into();
        let instrument = rm
            .open(&name, AccessMode::NO_LOCK, TIMEOUT_IMMEDIATE)
            .map_err(|e| link_err("opening VISA session", e))?;
        debug!(resource = %self.resource, "bridge session opened");
        Ok(Box::new(VisaBridge {
            instrument,
            _rm: rm,
            resource: self.resource.clone(),
        }))
    }
}

/// One open VISA session; dropping it releases the instrument.
pub struct VisaBridge {
    instrument: Instrument,
    // Closing the resource manager closes every session opened through it,
    // so the session handle must drop first.
    _rm: DefaultRM,
    resource: String,
}

impl VisaBridge {
    fn read_response(&mut self, command: &str) -> MonitorResult<String> {
        let mut buf = [0u8; 256];
        let n = (&self.instrument)
            .read(&mut buf)
            .map_err(|e| link_err("reading from bridge", e))?;
        let response = String::from_utf8_lossy(&buf[..n]).into_owned();
        trace!(%command, %response, "bridge query");
        Ok(response)
    }
}

#[async_trait]
impl BridgeTransport for VisaBridge {
    async fn write(&mut self, command: &str) -> MonitorResult<()> {
        trace!(%command, "bridge write");
        (&self.instrument)
            .write_all(format!("{command}\n").as_bytes())
            .map_err(|e| link_err("writing to bridge", e))
    }

    async fn query(&mut self, command: &str) -> MonitorResult<String> {
        (&self.instrument)
            .write_all(format!("{command}\n").as_bytes())
            .map_err(|e| link_err("writing query to bridge", e))?;
        self.read_response(command)
    }

    async fn clear(&mut self) -> MonitorResult<()> {
        trace!(resource = %self.resource, "device clear");
        self.instrument
            .clear()
            .map_err(|e| link_err("device clear", e))
    }
}
