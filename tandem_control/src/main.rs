//! # Tandem Control Unit
//!
//! Loads the bus configuration, starts the control loop against the
//! simulation master and runs a short coordinated move. Swap in a
//! hardware `EcatMaster` implementation for a real bus.

use std::path::Path;
use std::process;
use std::time::Duration;

use tracing::{error, info};

use tandem_common::config::BusConfig;
use tandem_control::{Bus, SimMaster};

fn main() {
    tracing_subscriber::fmt().compact().init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/tandem.toml".to_string());

    let config = match BusConfig::load(Path::new(&config_path)) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %config_path, error = %e, "cannot load configuration");
            process::exit(1);
        }
    };
    info!(
        adapter = %config.adapter,
        cycle_time_ms = config.cycle_time_ms,
        axes = config.slave_count(),
        "configuration loaded"
    );

    let master = SimMaster::new(config.slave_count());
    let mut bus = match Bus::new(config) {
        Ok(bus) => bus,
        Err(e) => {
            error!(error = %e, "cannot create bus");
            process::exit(1);
        }
    };

    if let Err(e) = bus.start(master) {
        error!(error = %e, "bus start failed");
        process::exit(1);
    }

    let motors = bus.motors();
    for motor in &motors {
        if let Err(e) = motor.wait_operation_enabled(Duration::from_secs(5)) {
            error!(axis = motor.index(), error = %e, "drive not ready");
            let _ = bus.stop();
            process::exit(1);
        }
        let _ = motor.set_origin();
    }
    info!("all drives operational, running demo move");

    for motor in &motors {
        let _ = motor.move_to_mm(-5.0);
    }
    for motor in &motors {
        if let Err(e) = motor.wait_idle(Duration::from_secs(30)) {
            error!(axis = motor.index(), error = %e, "move did not finish");
        }
        info!(
            axis = motor.index(),
            position_mm = motor.current_position_mm(),
            "move finished"
        );
    }

    match bus.stop() {
        Ok(()) => info!("bus stopped"),
        Err(e) => {
            error!(error = %e, "bus stop failed");
            process::exit(1);
        }
    }
}
