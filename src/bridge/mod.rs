//! Transport abstraction over the AVS-47 resistance bridge.
//!
//! The scan protocol only needs three primitives from the instrument link:
//! write a command, query a response, device-clear. [`BridgeTransport`]
//! captures exactly that, so the protocol and everything above it is
//! hardware-agnostic:
//!
//! - [`sim::SimulatedBridge`] emulates the AVS-47 command surface in the
//!   default build, for development and tests;
//! - `visa::VisaBridge` (behind the `instrument_visa` feature) talks to the
//!   real instrument over GPIB through the installed VISA stack.
//!
//! A transport is an owned, exclusive connection: methods take `&mut self`
//! and there is no sharing. Connections are made fresh each acquisition
//! cycle through a [`BridgeConnector`] and released by dropping the boxed
//! transport, on every exit path.

use async_trait::async_trait;

use crate::error::MonitorResult;

pub mod sim;
#[cfg(feature = "instrument_visa")]
pub mod visa;

pub use sim::{SimulatedBridge, SimulatedConnector};
#[cfg(feature = "instrument_visa")]
pub use visa::VisaConnector;

/// One open, exclusive connection to the bridge.
///
/// Responses are returned as received (untrimmed); parsing and trimming
/// belong to the protocol layer. Implementations map their link-level
/// failures onto `MonitorError::Bridge` so the caller can tell a flaky
/// cable from a configuration mistake.
#[async_trait]
pub trait BridgeTransport: Send {
    /// Send a command that produces no response.
    async fn write(&mut self, command: &str) -> MonitorResult<()>;

    /// Send a command and read back one response line.
    async fn query(&mut self, command: &str) -> MonitorResult<String>;

    /// Issue a device clear, flushing the instrument's I/O buffers.
    async fn clear(&mut self) -> MonitorResult<()>;
}

/// Opens bridge connections, one per acquisition cycle.
///
/// The returned transport owns the underlying session; dropping it
/// releases the instrument.
#[async_trait]
pub trait BridgeConnector: Send + Sync {
    /// Open a fresh connection.
    async fn connect(&self) -> MonitorResult<Box<dyn BridgeTransport>>;
}
