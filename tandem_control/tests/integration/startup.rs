//! Lifecycle: SDO configuration journal, init retries, OP-entry seeding.

use tandem_common::command::Command;
use tandem_common::consts::{
    FOLLOWING_ERROR_WINDOW_PULSES, MODE_CSP, OD_FOLLOWING_ERROR_WINDOW, OD_MODES_OF_OPERATION,
    OD_POSITION_WINDOW, OD_PROFILE_VELOCITY, OD_RXPDO_MAP, OD_SM2_ASSIGN, OD_SM3_ASSIGN,
    OD_TXPDO_MAP, PDO_ENTRY_CONTROLWORD, PDO_ENTRY_POSITION_ACTUAL, PDO_ENTRY_STATUSWORD,
    PDO_ENTRY_TARGET_POSITION, POSITION_WINDOW_PULSES,
};
use tandem_common::units::{rpm_to_motor_pulses_per_s, AxisKind};
use tandem_control::sim::SdoWrite;
use tandem_control::BusError;

use super::Harness;

fn find(log: &[SdoWrite], slave: usize, index: u16, sub: u8) -> Option<(usize, &SdoWrite)> {
    log.iter()
        .enumerate()
        .find(|(_, w)| w.slave == slave && w.index == index && w.sub == sub)
}

#[test]
fn init_writes_the_csp_object_dictionary() {
    let mut h = Harness::new(2);
    h.runner.initialize().expect("init");

    let log: Vec<SdoWrite> = h.runner.master().sdo_log().to_vec();
    for slave in 0..2 {
        // RxPDO mapping: controlword + target position.
        let (_, cw_entry) = find(&log, slave, OD_RXPDO_MAP, 1).expect("0x1600:1");
        assert_eq!(cw_entry.data, PDO_ENTRY_CONTROLWORD.to_le_bytes());
        let (_, tgt_entry) = find(&log, slave, OD_RXPDO_MAP, 2).expect("0x1600:2");
        assert_eq!(tgt_entry.data, PDO_ENTRY_TARGET_POSITION.to_le_bytes());

        // TxPDO mapping: statusword + actual position.
        let (_, sw_entry) = find(&log, slave, OD_TXPDO_MAP, 1).expect("0x1A00:1");
        assert_eq!(sw_entry.data, PDO_ENTRY_STATUSWORD.to_le_bytes());
        let (_, pos_entry) = find(&log, slave, OD_TXPDO_MAP, 2).expect("0x1A00:2");
        assert_eq!(pos_entry.data, PDO_ENTRY_POSITION_ACTUAL.to_le_bytes());

        // Assignments point the sync managers at the maps.
        let (_, sm2) = find(&log, slave, OD_SM2_ASSIGN, 1).expect("0x1C12:1");
        assert_eq!(sm2.data, OD_RXPDO_MAP.to_le_bytes());
        let (_, sm3) = find(&log, slave, OD_SM3_ASSIGN, 1).expect("0x1C13:1");
        assert_eq!(sm3.data, OD_TXPDO_MAP.to_le_bytes());

        // CSP mode, after the mapping is in place.
        let (mode_pos, mode) = find(&log, slave, OD_MODES_OF_OPERATION, 0).expect("0x6060");
        assert_eq!(mode.data, [MODE_CSP as u8]);
        let (map_pos, _) = find(&log, slave, OD_RXPDO_MAP, 1).unwrap();
        assert!(map_pos < mode_pos, "PDO mapping must precede mode write");

        // Wide windows.
        let (_, few) = find(&log, slave, OD_FOLLOWING_ERROR_WINDOW, 0).expect("0x6065");
        assert_eq!(few.data, FOLLOWING_ERROR_WINDOW_PULSES.to_le_bytes());
        let (_, pw) = find(&log, slave, OD_POSITION_WINDOW, 0).expect("0x6067");
        assert_eq!(pw.data, POSITION_WINDOW_PULSES.to_le_bytes());

        // Profile velocity at encoder scale: 50 RPM.
        let (_, vel) = find(&log, slave, OD_PROFILE_VELOCITY, 0).expect("0x6081");
        assert_eq!(vel.data, rpm_to_motor_pulses_per_s(50).to_le_bytes());
    }

    // DC sync at the cycle period for every slave.
    let dc = h.runner.master().dc_log();
    assert_eq!(dc.len(), 2);
    for setting in dc {
        assert!(setting.enabled);
        assert_eq!(setting.period_ns, 10_000_000);
    }
}

#[test]
fn op_entry_seeds_target_from_actual() {
    let mut h = Harness::with_positions(&[777_000, -42_000]);
    h.runner.initialize().expect("init");

    assert_eq!(h.runner.axes()[0].target_pulse, 777_000);
    assert_eq!(h.runner.axes()[1].target_pulse, -42_000);

    // The first published snapshot reflects OP entry.
    assert_eq!(h.shared.snapshot(0).unwrap().actual_pulse, 777_000);
    assert_eq!(h.shared.snapshot(1).unwrap().actual_pulse, -42_000);
}

#[test]
fn discovery_failure_is_retried() {
    let mut h = Harness::new(1);
    h.runner.master_mut().fail_discoveries(1);
    h.runner.initialize().expect("init should survive one failure");
    assert!(h.runner.master().is_open());
}

#[test]
fn init_gives_up_after_budget() {
    let mut h = Harness::new(1);
    h.runner.master_mut().fail_discoveries(3);
    match h.runner.initialize() {
        Err(BusError::Init(_)) => {}
        other => panic!("expected Init error, got {other:?}"),
    }
    assert!(!h.runner.master().is_open());
}

#[test]
fn prestart_config_commands_apply_before_sdo_setup() {
    let mut h = Harness::new(1);
    h.send(Command::SetAxisKind { axis: 0, kind: AxisKind::X });
    h.send(Command::SetVelocity { axis: 0, rpm: 120 });
    // A motion command before start is dropped, not queued.
    h.send(Command::MoveToMm { axis: 0, mm: -10.0 });

    h.runner.initialize().expect("init");

    assert_eq!(h.runner.axes()[0].kind, AxisKind::X);
    assert_eq!(h.runner.axes()[0].velocity_rpm, 120);

    let log: Vec<SdoWrite> = h.runner.master().sdo_log().to_vec();
    let (_, vel) = find(&log, 0, OD_PROFILE_VELOCITY, 0).expect("0x6081");
    assert_eq!(vel.data, rpm_to_motor_pulses_per_s(120).to_le_bytes());

    h.step();
    assert!(h.runner.axes()[0].trajectory.is_none());
}
