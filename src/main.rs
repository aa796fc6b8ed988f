//! Simulation entry point.
//!
//! Runs the breathing-cycle controller against the lumped pneumatic model
//! for a handful of cycles and logs the per-cycle results. Useful for
//! eyeballing convergence of the peak/blower trims without hardware:
//!
//! ```text
//! RUST_LOG=info cargo run
//! ```

use anyhow::{Context, Result};
use log::info;

use openvent::app::commands::ControlCommand;
use openvent::app::service::CycleDriver;
use openvent::config::VentilationConfig;
use openvent::sim::{LogSink, SimAlarms, SimClock, SimHarness, SimSwitch, SimWatchdog};

const SIM_CYCLES: u32 = 8;

fn main() -> Result<()> {
    env_logger::init();

    let config = VentilationConfig::default();
    config.validate().context("invalid ventilation config")?;

    info!(
        "openvent v{}: simulating {} cycles at {} cycles/min",
        env!("CARGO_PKG_VERSION"),
        SIM_CYCLES,
        config.initial_cycles_per_minute,
    );

    let mut hw = SimHarness::new(&config);
    let mut alarms = SimAlarms::default();
    let mut sink = LogSink;
    let mut clock = SimClock::default();
    let mut watchdog = SimWatchdog::default();
    // One extra poll of the switch happens for the trailing stopped cycle.
    let mut switch = SimSwitch::on_for(SIM_CYCLES);

    let mut driver = CycleDriver::new(config);
    driver.setup(&mut hw, &mut clock);

    for cycle in 0..SIM_CYCLES {
        // Nudge the operator settings mid-run to show the latch behaviour.
        if cycle == 3 {
            driver.handle_command(ControlCommand::PlateauPressureIncrease);
            info!(
                "operator raised plateau command to {}",
                driver.controller().max_plateau_pressure_command()
            );
        }
        driver.run_cycle(
            &mut hw,
            &mut alarms,
            &mut sink,
            &mut clock,
            &mut watchdog,
            &mut switch,
        );
    }

    // One stopped cycle: the switch is off, the machine holds safe state.
    driver.run_cycle(
        &mut hw,
        &mut alarms,
        &mut sink,
        &mut clock,
        &mut watchdog,
        &mut switch,
    );

    info!(
        "simulation done: {} watchdog reloads, final peak command {}",
        watchdog.reloads,
        driver.controller().max_peak_pressure_command(),
    );
    Ok(())
}
