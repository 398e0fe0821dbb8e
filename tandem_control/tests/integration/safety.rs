//! Fault fan-out and sync-deviation guard scenarios.

use tandem_common::command::Command;
use tandem_common::consts::CW_FAULT_RESET;

use super::Harness;

#[test]
fn fault_on_one_axis_freezes_both() {
    let mut h = Harness::new(2);
    h.start();

    h.send(Command::MoveToMm { axis: 0, mm: -50.0 });
    h.send(Command::MoveToMm { axis: 1, mm: -30.0 });
    h.step();
    h.step_secs(3.0);
    assert!(h.runner.axes().iter().all(|a| a.is_moving()));

    // Latch the fault; it reaches the statusword at this exchange and is
    // observed by the next cycle.
    h.runner.master_mut().inject_fault(1);
    h.step();
    h.step();

    for axis in h.runner.axes() {
        assert!(axis.trajectory.is_none(), "all trajectories cancelled");
        assert_eq!(axis.target_pulse, axis.actual_pulse);
    }
    assert_eq!(h.runner.axes()[1].last_controlword, CW_FAULT_RESET);

    // Fault Reset walks the drive back up to Operation Enabled.
    h.step_secs(0.1);
    assert_eq!(h.runner.axes()[1].statusword & 0x006F, 0x0027);

    let snap = h.shared.snapshot(0).unwrap();
    assert!(!snap.moving);
}

#[test]
fn moves_refused_while_fault_active() {
    let mut h = Harness::new(2);
    h.start();

    h.runner.master_mut().inject_fault(0);
    h.step();
    h.step();

    // The fault is still latched (no reset exchange yet when the command
    // arrives), so the batch must be dropped.
    h.send(Command::MoveToMm { axis: 1, mm: -10.0 });
    h.step();
    assert!(h.runner.axes()[1].trajectory.is_none());
}

#[test]
fn sync_deviation_trips_and_latches() {
    let config = super::guarded_config(2, 0.5, 1);
    let mut h = Harness::with_config(config, &[0, 0]);
    h.start();

    // Only axis 0 moves: the pair diverges past 0.5 mm within a second.
    h.send(Command::MoveToMm { axis: 0, mm: -50.0 });
    h.step();
    h.step_secs(1.5);

    assert!(h.shared.sync_error());
    for axis in h.runner.axes() {
        assert!(axis.trajectory.is_none());
        assert_eq!(axis.target_pulse, axis.actual_pulse);
    }

    // Latched: new moves are refused.
    h.send(Command::MoveToMm { axis: 0, mm: 0.0 });
    h.step();
    assert!(h.runner.axes()[0].trajectory.is_none());
    assert!(h.shared.sync_error());
}

#[test]
fn origin_reset_recovers_from_sync_trip() {
    let config = super::guarded_config(2, 0.5, 1);
    let mut h = Harness::with_config(config, &[0, 0]);
    h.start();

    h.send(Command::MoveToMm { axis: 0, mm: -50.0 });
    h.step();
    h.step_secs(1.5);
    assert!(h.shared.sync_error());

    // Re-establish the datum on both axes; this clears the latch and
    // zeroes the relative deviation.
    h.send(Command::SetOrigin { axis: 0 });
    h.send(Command::SetOrigin { axis: 1 });
    h.step();
    assert!(!h.shared.sync_error());

    h.send(Command::MoveToMm { axis: 0, mm: -1.0 });
    h.send(Command::MoveToMm { axis: 1, mm: -1.0 });
    h.step();
    assert!(h.runner.axes().iter().all(|a| a.is_moving()));

    h.step_secs(1.5);
    assert!(!h.shared.sync_error());
    assert!(h.runner.axes().iter().all(|a| !a.is_moving()));
}

#[test]
fn explicit_reset_clears_latch() {
    let config = super::guarded_config(2, 0.5, 1);
    let mut h = Harness::with_config(config, &[0, 0]);
    h.start();

    h.send(Command::MoveToMm { axis: 0, mm: -50.0 });
    h.step();
    h.step_secs(1.5);
    assert!(h.shared.sync_error());

    h.send(Command::ResetSyncError);
    h.step();
    assert!(!h.shared.sync_error());
}

#[test]
fn trip_cycles_delays_the_trip() {
    // With a 200-cycle persistence requirement a 1.5 s divergence is
    // still under observation, not tripped.
    let config = super::guarded_config(2, 0.1, 200);
    let mut h = Harness::with_config(config, &[0, 0]);
    h.start();

    h.send(Command::MoveToMm { axis: 0, mm: -50.0 });
    h.step();
    h.step_secs(1.0);
    assert!(!h.shared.sync_error());

    // Two more seconds of divergence exhausts the allowance.
    h.step_secs(2.5);
    assert!(h.shared.sync_error());
}
