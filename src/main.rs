//! SprintIR command-line utility
//!
//! Copyright 2026 sensor-sprintir contributors

use std::time::Duration;

extern crate structopt;
use structopt::StructOpt;

extern crate humantime;
use humantime::Duration as HumanDuration;

#[macro_use]
extern crate log;
extern crate simplelog;
use simplelog::{LevelFilter, TermLogger};

extern crate sensor_sprintir;
use sensor_sprintir::serial::SerialTransport;
use sensor_sprintir::{Mode, SprintIr};

#[derive(StructOpt)]
#[structopt(name = "sprintir-util")]
/// A Command Line Interface (CLI) for interacting with a local SprintIR-R CO2 sensor over a serial port
pub struct Options {
    /// Specify the serial port connected to the SprintIR device
    #[structopt(short = "p", long = "port", default_value = "/dev/ttyUSB0", env = "SPRINTIR_PORT")]
    port: String,

    /// Specify period for taking measurements
    #[structopt(short = "s", long = "sample-period", default_value = "10s")]
    pub period: HumanDuration,

    /// Maximum wait for each command reply
    #[structopt(long = "timeout", default_value = "1s")]
    pub timeout: HumanDuration,

    /// Report the sensor's filtered measurement output instead of the raw one
    #[structopt(long = "filtered")]
    pub filtered: bool,

    /// Number of allowed sensor errors (per measurement attempt) prior to exiting
    #[structopt(long = "allowed-errors", default_value = "3")]
    pub allowed_errors: usize,

    /// Enable verbose logging
    #[structopt(long = "log-level", default_value = "info")]
    level: LevelFilter,
}

fn main() {
    // Load options
    let opts = Options::from_args();

    // Setup logging
    TermLogger::init(opts.level, simplelog::Config::default()).unwrap();

    debug!("Opening serial port");
    let port = match SerialTransport::open(&opts.port) {
        Ok(v) => v,
        Err(e) => {
            error!("Error opening serial port '{}': {:?}", &opts.port, e);
            std::process::exit(-1);
        }
    };

    // The sensor needs a moment after power-up before it answers commands
    debug!("Waiting for sensor start-up");
    std::thread::sleep(Duration::from_secs(1));

    debug!("Connecting to SprintIR");
    let mut sensor = match SprintIr::new(port) {
        Ok(v) => v,
        Err(e) => {
            error!("Error connecting to SprintIR: {:?}", e);
            std::process::exit(-2);
        }
    };
    sensor.set_timeout(Some(*opts.timeout));

    info!("Scaling multiplier factor: {}", sensor.scaling_factor());
    info!(
        "Compensation value: {} ({} mbar)",
        sensor.compensation_value(),
        sensor.pressure()
    );
    info!("Digital filter: {}", sensor.digital_filter());
    match sensor.firmware_and_serial() {
        Ok((firmware, serial)) => {
            info!("Firmware: {}", firmware.trim());
            info!("Serial number: {}", serial.trim());
        }
        Err(e) => warn!("Error reading firmware and serial: {:?}", e),
    }

    debug!("Switching to polling mode");
    if let Err(e) = sensor.set_mode(Mode::Polling) {
        error!("Error switching to polling mode: {:?}", e);
        std::process::exit(-3);
    }

    debug!("Starting measurement loop");
    let mut errors = 0;

    loop {
        match sensor.co2(opts.filtered, true) {
            Ok(-1) => {
                warn!("Sensor reported an invalid reading");
            }
            Ok(ppm) => {
                info!("CO2: {} ppm", ppm);
                errors = 0;
            }
            Err(e) => {
                warn!("Error reading sensor data: {:?}", e);
                errors += 1;
            }
        }

        if errors > opts.allowed_errors {
            error!("Exceeded maximum allowed sensor errors");
            std::process::exit(-4);
        }

        // Wait for enough time for another sensor reading
        std::thread::sleep(*opts.period);
    }
}
