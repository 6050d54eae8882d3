//! End-to-end acquisition scenarios against the simulated bridge.
//!
//! These drive a whole cycle — sweep, calibration, persistence — and then
//! read the log files back, byte for byte. The log-line shape is load
//! bearing: years of fridge history are in this format and the plotting
//! tools parse it positionally.

use std::time::Duration;

use cryomon::acquisition::AcquisitionCycle;
use cryomon::bridge::SimulatedBridge;
use cryomon::registry::{CalibrationRegistry, Rig};
use cryomon::scan::SweepSettings;
use cryomon::storage::LogStore;

fn read_line(store: &LogStore, sensor: &str) -> String {
    let path = store.path_for(sensor);
    let contents = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("reading {}: {e}", path.display()));
    assert_eq!(contents.lines().count(), 1, "expected one record in {contents:?}");
    contents
}

#[tokio::test(start_paused = true)]
async fn test_mixed_in_and_out_of_range_cycle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = LogStore::new(dir.path(), "Fridge");
    let registry = CalibrationRegistry::for_rig(Rig::Fridge);
    // Channel 0 (3K_low, RuO2-10k) reads 15 kΩ, inside the fit's
    // 10.8–320 kΩ domain; channel 1 (Still, same family) reads 400 Ω,
    // far below it.
    let sim = SimulatedBridge::with_resistances([(0, 15_000.0), (1, 400.0)]);
    let connector = sim.connector();

    let cycle = AcquisitionCycle::new(
        &connector,
        &registry,
        &store,
        &[0, 1],
        SweepSettings::default(),
        Duration::from_secs(900),
    );
    let report = cycle.run().await.expect("cycle");

    assert_eq!(report.readings.len(), 2);
    let in_range = &report.readings[0];
    assert_eq!((in_range.channel, in_range.sensor), (0, "3K_low"));
    assert!(in_range.calibrated);
    assert!((in_range.temperature_kelvin - 6.27499).abs() < 1e-4);
    let out_of_range = &report.readings[1];
    assert_eq!((out_of_range.channel, out_of_range.sensor), (1, "Still"));
    assert!(!out_of_range.calibrated);
    assert_eq!(out_of_range.temperature_kelvin, 0.0);

    let low_line = read_line(&store, "3K_low");
    let still_line = read_line(&store, "Still");

    // Both records carry the cycle's single timestamp.
    let low_fields: Vec<&str> = low_line.split('\t').collect();
    let still_fields: Vec<&str> = still_line.split('\t').collect();
    assert_eq!(low_fields[0], report.stamp.epoch_secs.to_string());
    assert_eq!(still_fields[0], low_fields[0]);
    assert_eq!(still_fields[1], low_fields[1]);

    // Exact column bytes: width 10, two then five decimals, Idle status,
    // trailing tab.
    assert_eq!(
        low_line,
        format!(
            "{}\t{}\t  15000.00\t   6.27499\tIdle\t\n",
            report.stamp.epoch_secs, report.stamp.ctime
        )
    );
    assert_eq!(
        still_line,
        format!(
            "{}\t{}\t    400.00\t   0.00000\tIdle\t\n",
            report.stamp.epoch_secs, report.stamp.ctime
        )
    );
}

#[tokio::test(start_paused = true)]
async fn test_full_six_channel_fridge_cycle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = LogStore::new(dir.path(), "Fridge");
    let registry = CalibrationRegistry::for_rig(Rig::Fridge);
    // A plausible mid-cooldown snapshot; every channel lands inside its
    // curve's domain.
    let sim = SimulatedBridge::with_resistances([
        (0, 15_000.0),
        (1, 100_000.0),
        (2, 5_000.0),
        (3, 10_000.0),
        (4, 100.0),
        (5, 16_000.0),
    ]);
    let connector = sim.connector();

    let cycle = AcquisitionCycle::new(
        &connector,
        &registry,
        &store,
        &[0, 1, 2, 3, 4, 5],
        SweepSettings::default(),
        Duration::from_secs(900),
    );
    let report = cycle.run().await.expect("cycle");

    assert_eq!(report.readings.len(), 6);
    assert!(report.readings.iter().all(|r| r.calibrated));
    for (reading, kelvin) in report.readings.iter().zip([
        6.274992429860066,   // 3K_low, RuO2-10k
        0.5510140481912248,  // Still, RuO2-10k
        0.2058202121392007,  // 50mK, RuO2-1k5
        0.12409180304715149, // MixingCh_low, TT1305
        52.92294666414829,   // MixingCh_high, Pt1000
        5.171321646026882,   // Magnet, RuO2-10k
    ]) {
        assert!(
            ((reading.temperature_kelvin - kelvin) / kelvin).abs() < 1e-6,
            "{}: expected {kelvin}, got {}",
            reading.sensor,
            reading.temperature_kelvin
        );
    }

    for sensor in ["3K_low", "Still", "50mK", "MixingCh_low", "MixingCh_high", "Magnet"] {
        let line = read_line(&store, sensor);
        assert!(line.starts_with(&report.stamp.epoch_secs.to_string()), "{sensor}: {line:?}");
        assert!(line.ends_with("\tIdle\t\n"), "{sensor}: {line:?}");
    }

    // One connection for the whole cycle, released before persistence.
    assert_eq!(sim.connection_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_probe_rig_selects_its_own_mixing_chamber_curve() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = LogStore::new(dir.path(), "Probe2");
    let registry = CalibrationRegistry::for_rig(Rig::Probe2);
    let sim = SimulatedBridge::with_resistances([(3, 10_000.0)]);
    let connector = sim.connector();

    let cycle = AcquisitionCycle::new(
        &connector,
        &registry,
        &store,
        &[3],
        SweepSettings::default(),
        Duration::from_secs(900),
    );
    let report = cycle.run().await.expect("cycle");

    // 10 kΩ on the rotator probe's TT1308 is a different temperature than
    // the same resistance on the fridge's TT1305.
    let kelvin = report.readings[0].temperature_kelvin;
    assert!((kelvin - 0.12436574405091333).abs() / kelvin < 1e-6, "got {kelvin}");
    assert!(store.path_for("MixingCh_low").exists());
    assert_eq!(
        store.path_for("MixingCh_low"),
        dir.path().join("Probe2_MixingCh_low.txt")
    );
}
