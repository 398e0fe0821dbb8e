//! Shutdown sequence: hold frames, controlword ladder, bus teardown.

use tandem_common::command::Command;
use tandem_common::consts::{
    CW_DISABLE_VOLTAGE, CW_ENABLE_OPERATION, CW_SHUTDOWN, CW_SWITCH_ON,
};
use tandem_control::cycle::CycleOutcome;
use tandem_control::BusState;

use super::Harness;

#[test]
fn stop_during_motion_walks_the_ladder_down() {
    let mut h = Harness::new(1);
    h.start();

    h.send(Command::MoveToMm { axis: 0, mm: -50.0 });
    h.step();
    h.step_secs(2.0);
    assert!(h.runner.axes()[0].is_moving());
    // Ground truth at the drive, not the loop's one-cycle-old copy.
    let held_position = h.runner.master().actual_pulse(0);

    h.send(Command::StopAll);
    assert_eq!(h.step(), CycleOutcome::StopRequested);
    h.runner.shutdown();

    let master = h.runner.master();
    assert_eq!(master.requested_state(), BusState::Init);
    assert!(!master.is_open());

    // 5 hold frames at Enable Operation, then 5 frames per ladder step.
    let log = master.controlword_log(0);
    assert!(log.len() >= 20);
    let tail = &log[log.len() - 20..];
    for (i, expected) in [
        (0..5, CW_ENABLE_OPERATION),
        (5..10, CW_SWITCH_ON),
        (10..15, CW_SHUTDOWN),
        (15..20, CW_DISABLE_VOLTAGE),
    ] {
        for idx in i {
            assert_eq!(tail[idx], expected, "ladder position {idx}");
        }
    }

    // The axis was pinned where it stood; the drive never moved after.
    assert!((master.actual_pulse(0) - held_position).abs() <= 1);

    // Terminal snapshot is published.
    let snap = h.shared.snapshot(0).unwrap();
    assert!(!snap.moving);
}

#[test]
fn stop_while_idle_is_clean() {
    let mut h = Harness::new(2);
    h.start();
    h.step_secs(0.1);

    h.send(Command::StopAll);
    assert_eq!(h.step(), CycleOutcome::StopRequested);
    h.runner.shutdown();

    assert_eq!(h.runner.master().requested_state(), BusState::Init);
    assert!(!h.runner.master().is_open());
}
