//! Full-stack bus API: thread fork, handshake, motor handles, join.

use std::time::Duration;

use tandem_control::{Bus, BusError, SimMaster};

#[test]
fn bus_round_trip_on_simulated_hardware() {
    let config = super::test_config(2);
    let mut bus = Bus::new(config).expect("bus");
    let master = SimMaster::new(2);

    bus.start(master).expect("start");

    let motors = bus.motors();
    assert_eq!(motors.len(), 2);
    for motor in &motors {
        motor
            .wait_operation_enabled(Duration::from_secs(5))
            .expect("operation enabled");
        motor.set_origin().expect("origin");
    }

    // A move inside the completion window resolves within a cycle.
    for motor in &motors {
        motor.move_to_mm(-0.01).expect("move");
    }
    for motor in &motors {
        motor.wait_idle(Duration::from_secs(5)).expect("idle");
        let position = motor.current_position_mm();
        assert!((position + 0.01).abs() < 0.02, "position {position} mm");
    }

    bus.stop().expect("stop");
}

#[test]
fn start_surfaces_init_failure() {
    let config = super::test_config(1);
    let mut bus = Bus::new(config).expect("bus");
    let mut master = SimMaster::new(1);
    master.fail_discoveries(3);

    match bus.start(master) {
        Err(BusError::Init(_)) => {}
        other => panic!("expected Init error, got {other:?}"),
    }
}

#[test]
fn double_start_is_rejected() {
    let config = super::test_config(1);
    let mut bus = Bus::new(config).expect("bus");
    bus.start(SimMaster::new(1)).expect("first start");
    match bus.start(SimMaster::new(1)) {
        Err(BusError::AlreadyRunning) => {}
        other => panic!("expected AlreadyRunning, got {other:?}"),
    }
    bus.stop().expect("stop");
}
