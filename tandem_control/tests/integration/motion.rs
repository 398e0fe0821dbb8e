//! Coordinated motion scenarios: single and synchronized moves,
//! cancellation, origin handling, the hold invariant and cross coupling.

use tandem_common::command::Command;
use tandem_common::consts::{COMPLETION_WINDOW_PULSES, CW_ENABLE_OPERATION};
use tandem_common::units::{mm_to_pulses, pulses_to_mm, AxisKind};

use super::Harness;

#[test]
fn single_z_move_completes_at_target() {
    let mut h = Harness::new(1);
    h.start();

    h.send(Command::MoveToMm { axis: 0, mm: -50.0 });
    h.step();

    let segment = h.runner.axes()[0].trajectory.expect("segment installed");
    assert_eq!(segment.end_pulse, -139_818_136);
    assert!((segment.duration_s - 10.0).abs() < 0.01, "duration {}", segment.duration_s);

    let snap = h.shared.snapshot(0).unwrap();
    assert!(snap.moving);

    h.step_secs(10.5);

    let axis = &h.runner.axes()[0];
    assert!(axis.trajectory.is_none(), "segment should be complete");
    assert!((axis.actual_pulse - -139_818_136).abs() < COMPLETION_WINDOW_PULSES);

    let snap = h.shared.snapshot(0).unwrap();
    assert!(!snap.moving);
    let position_mm = pulses_to_mm(snap.actual_pulse - snap.offset_pulse, AxisKind::Z);
    assert!((position_mm + 50.0).abs() < 0.02, "position {position_mm} mm");
}

#[test]
fn synchronized_pair_shares_duration_and_finish() {
    let mut h = Harness::new(2);
    h.start();

    h.send(Command::MoveToMm { axis: 0, mm: -50.0 });
    h.send(Command::MoveToMm { axis: 1, mm: -30.0 });
    h.step();

    let a = h.runner.axes()[0].trajectory.expect("axis 0 segment");
    let b = h.runner.axes()[1].trajectory.expect("axis 1 segment");
    assert_eq!(a.start_time, b.start_time);
    assert!((a.duration_s - b.duration_s).abs() < 1e-12);
    // The −50 mm leg dominates: 10 s, not axis 1's individual 6 s.
    assert!((a.duration_s - 10.0).abs() < 0.01);

    // Track per-axis completion ticks.
    let mut done = [None::<u64>; 2];
    for tick in 0..1_200u64 {
        h.step();
        for axis in 0..2 {
            if done[axis].is_none() && h.runner.axes()[axis].trajectory.is_none() {
                done[axis] = Some(tick);
            }
        }
        if done.iter().all(Option::is_some) {
            break;
        }
    }
    let (d0, d1) = (done[0].expect("axis 0 finished"), done[1].expect("axis 1 finished"));
    // The lag-free simulated drives enter the completion window a little
    // early, spreading the finishes by a few cycles.
    assert!(d0.abs_diff(d1) <= 10, "finish ticks {d0} vs {d1}");

    assert_eq!(h.runner.axes()[0].target_pulse, mm_to_pulses(-50.0, AxisKind::Z));
    assert_eq!(h.runner.axes()[1].target_pulse, mm_to_pulses(-30.0, AxisKind::Z));
}

#[test]
fn new_move_replaces_active_segment() {
    let mut h = Harness::new(1);
    h.start();

    h.send(Command::MoveToMm { axis: 0, mm: -50.0 });
    h.step();
    h.step_secs(2.0);

    let mid_flight = h.runner.axes()[0].actual_pulse;
    assert!(mid_flight < -1_000_000, "axis should be well underway");

    h.send(Command::MoveToMm { axis: 0, mm: 10.0 });
    h.step();

    let segment = h.runner.axes()[0].trajectory.expect("replacement segment");
    // The replacement departs from where the axis actually is.
    assert!((segment.start_pulse - mid_flight).abs() < COMPLETION_WINDOW_PULSES);
    assert_eq!(segment.end_pulse, mm_to_pulses(10.0, AxisKind::Z));
}

#[test]
fn idle_axis_holds_measured_position() {
    let mut h = Harness::new(2);
    h.start();
    h.step_secs(0.1);

    for axis in h.runner.axes() {
        assert_eq!(axis.last_controlword, CW_ENABLE_OPERATION);
        assert!((axis.target_pulse - axis.actual_pulse).abs() <= 1);
        assert!(axis.trajectory.is_none());
    }
}

#[test]
fn origin_then_move_to_zero_stays_put() {
    let mut h = Harness::with_positions(&[12_345_678]);
    h.start();

    h.send(Command::SetOrigin { axis: 0 });
    h.step();
    assert_eq!(h.runner.axes()[0].offset_pulse, 12_345_678);

    h.send(Command::MoveToMm { axis: 0, mm: 0.0 });
    h.step();

    // Target 0 mm is the origin itself: already inside the completion
    // window, so the segment resolves on the spot.
    let axis = &h.runner.axes()[0];
    assert_eq!(axis.target_pulse, 12_345_678);
    assert!(axis.trajectory.is_none());

    let snap = h.shared.snapshot(0).unwrap();
    assert_eq!(snap.offset_pulse, 12_345_678);
    let position_mm = pulses_to_mm(snap.actual_pulse - snap.offset_pulse, AxisKind::Z);
    assert!(position_mm.abs() < 0.001);
}

#[test]
fn coupling_pulls_leader_back_toward_pack() {
    let mut config = super::test_config(2);
    config.coupling.enabled = true;
    config.coupling.gain = 0.1;
    // Axis 1 starts a revolution's worth ahead of axis 0.
    let mut h = Harness::with_config(config, &[0, 1_000_000]);
    h.start();

    let end_mm = -5.0;
    h.send(Command::MoveToMm { axis: 0, mm: end_mm });
    h.send(Command::MoveToMm { axis: 1, mm: end_mm });
    h.step();
    h.step_secs(0.2);

    let now = h.now();
    h.step();

    let axes = h.runner.axes();
    let uncorrected_0 = axes[0].trajectory.unwrap().target_at(now);
    let uncorrected_1 = axes[1].trajectory.unwrap().target_at(now);
    // Axis 1 runs ahead of the mean and is pulled back; axis 0 trails
    // and is nudged forward.
    assert!(axes[1].target_pulse < uncorrected_1);
    assert!(axes[0].target_pulse > uncorrected_0);
}
