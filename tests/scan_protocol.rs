//! Integration tests for the sweep protocol against the simulated bridge.
//!
//! These pin down the exact wire traffic of a sweep (the instrument
//! firmware is unforgiving about command shape), the polling behavior and
//! the fault paths: timeouts, malformed responses and overloads.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;

use cryomon::bridge::{BridgeTransport, SimulatedBridge};
use cryomon::error::{MonitorError, MonitorResult};
use cryomon::scan::{ScanPhase, ScanProtocol, SweepSettings};

/// Transport that replays canned query responses, for fault shapes the
/// simulator never produces.
struct ScriptedBridge {
    responses: VecDeque<&'static str>,
}

impl ScriptedBridge {
    fn new(responses: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            responses: responses.into_iter().collect(),
        }
    }
}

#[async_trait]
impl BridgeTransport for ScriptedBridge {
    async fn write(&mut self, _command: &str) -> MonitorResult<()> {
        Ok(())
    }

    async fn query(&mut self, command: &str) -> MonitorResult<String> {
        self.responses
            .pop_front()
            .map(str::to_string)
            .ok_or_else(|| MonitorError::Bridge(format!("no scripted response for '{command}'")))
    }

    async fn clear(&mut self) -> MonitorResult<()> {
        Ok(())
    }
}

// =============================================================================
// Full sweep
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_full_sweep_wire_sequence() {
    let sim = SimulatedBridge::with_resistances([(0, 15_000.0), (1, 400.0)]);
    sim.set_std_dev(0, 2.5).await;
    let mut transport = sim.clone();

    let results = ScanProtocol::new(&mut transport)
        // Unsorted with a duplicate; the protocol normalizes.
        .run(&[1, 0, 1])
        .await
        .expect("sweep");

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].channel, 0);
    assert_eq!(results[0].average_ohms, 15_000.0);
    assert_eq!(results[0].std_dev_ohms, 2.5);
    assert_eq!(results[1].channel, 1);
    assert_eq!(results[1].average_ohms, 400.0);

    assert_eq!(
        sim.transcript().await,
        vec![
            "*OPC?".to_string(),
            "REM 1;FCH 0;LCH 1;SCI 600;ETC 0;TCP 30;ARN 1;REM 0".to_string(),
            "REM 1;SCP 0;EXC 3;SDY 5;CNT 10;REM 0".to_string(),
            "REM 1;SCP 1;EXC 3;SDY 5;CNT 10;REM 0".to_string(),
            "REM 1;SCN 0;REM 0".to_string(),
            "*OPC?".to_string(),
            "*OPC?".to_string(),
            "REM 1;SCR 0;AVE?;STD?;REM 0".to_string(),
            "REM 1;SCR 1;AVE?;STD?;REM 0".to_string(),
        ]
    );
    assert_eq!(sim.sweep_bounds().await, Some((0, 1)));
    assert_eq!(sim.configured_channels().await, vec![0, 1]);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_polls_until_the_bridge_is_ready() {
    let sim = SimulatedBridge::with_resistances([(3, 9_000.0)]);
    sim.set_busy_polls(3).await;
    let mut transport = sim.clone();

    ScanProtocol::new(&mut transport)
        .run(&[3])
        .await
        .expect("sweep");

    let transcript = sim.transcript().await;
    let leading_polls = transcript
        .iter()
        .take_while(|command| command.as_str() == "*OPC?")
        .count();
    // Three busy responses plus the ready one.
    assert_eq!(leading_polls, 4);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_times_out_when_never_ready() {
    let sim = SimulatedBridge::new();
    sim.set_always_busy(true).await;
    let mut transport = sim.clone();

    let err = ScanProtocol::with_settings(
        &mut transport,
        SweepSettings::default(),
        Duration::from_secs(5),
    )
    .run(&[0])
    .await
    .expect_err("sweep must time out");

    match err {
        MonitorError::Timeout { phase, waited_secs } => {
            assert_eq!(phase, ScanPhase::AwaitingReady);
            assert_eq!(waited_secs, 5);
        }
        other => panic!("expected timeout, got {other}"),
    }
    // The sweep never started, so nothing was configured on the instrument.
    assert_eq!(sim.sweep_bounds().await, None);
    assert!(sim.configured_channels().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_sweep_rejects_empty_channel_list() {
    let sim = SimulatedBridge::new();
    let mut transport = sim.clone();

    let err = ScanProtocol::new(&mut transport)
        .run(&[])
        .await
        .expect_err("empty channel list");

    assert!(matches!(err, MonitorError::Configuration(_)), "got {err}");
    assert!(!err.is_recoverable());
    // Rejected before any instrument traffic.
    assert!(sim.transcript().await.is_empty());
}

// =============================================================================
// Malformed responses
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_malformed_readback_is_reported() {
    // Ready poll, sweep-done poll, then a readback with a stray segment.
    let mut transport = ScriptedBridge::new(["1\n", "1\n", "AVE 1.0;STD 2.0;OVL 0\n"]);

    let err = ScanProtocol::new(&mut transport)
        .run(&[0])
        .await
        .expect_err("readback must fail");

    match err {
        MonitorError::MalformedResponse { query, response } => {
            assert_eq!(query, "REM 1;SCR 0;AVE?;STD?;REM 0");
            assert_eq!(response, "AVE 1.0;STD 2.0;OVL 0");
        }
        other => panic!("expected malformed response, got {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_garbage_ready_poll_is_malformed_not_a_hang() {
    let mut transport = ScriptedBridge::new(["ERR -113\n"]);

    let err = ScanProtocol::new(&mut transport)
        .run(&[0])
        .await
        .expect_err("garbage poll must fail");

    match err {
        MonitorError::MalformedResponse { query, response } => {
            assert_eq!(query, "*OPC?");
            assert_eq!(response, "ERR -113");
        }
        other => panic!("expected malformed response, got {other}"),
    }
}

// =============================================================================
// Single-point readback
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_spot_read_reports_the_active_channel() {
    let sim = SimulatedBridge::with_resistances([(2, 980.0)]);
    sim.set_mux_channel(2).await;
    let mut transport = sim.clone();

    let reading = ScanProtocol::new(&mut transport)
        .read_active_channel()
        .await
        .expect("spot read");

    assert_eq!(reading.channel, 2);
    assert_eq!(reading.resistance_ohms, 980.0);

    let transcript = sim.transcript().await;
    assert_eq!(transcript.first().map(String::as_str), Some("MUX?"));
    assert!(transcript.contains(&"ADC".to_string()));
    assert_eq!(transcript.last().map(String::as_str), Some("OVL?"));
}

#[tokio::test(start_paused = true)]
async fn test_spot_read_discards_overloaded_readings() {
    let sim = SimulatedBridge::with_resistances([(2, 980.0)]);
    sim.set_mux_channel(2).await;
    sim.set_overload(true).await;
    let mut transport = sim.clone();

    let err = ScanProtocol::new(&mut transport)
        .read_active_channel()
        .await
        .expect_err("overload must be reported");

    assert!(matches!(err, MonitorError::Overload { channel: 2 }), "got {err}");
    assert!(err.is_recoverable());
}

#[tokio::test(start_paused = true)]
async fn test_spot_read_times_out_waiting_for_conversion() {
    let sim = SimulatedBridge::new();
    sim.set_always_busy(true).await;
    let mut transport = sim.clone();

    let err = ScanProtocol::with_settings(
        &mut transport,
        SweepSettings::default(),
        Duration::from_secs(2),
    )
    .read_active_channel()
    .await
    .expect_err("conversion must time out");

    match err {
        MonitorError::Timeout { phase, .. } => {
            assert_eq!(phase, ScanPhase::AwaitingConversion);
        }
        other => panic!("expected timeout, got {other}"),
    }
}
