//! SprintIR-R NDIR CO2 sensor driver
//!
//! The sensor speaks a line-oriented ASCII command/response protocol over a
//! 38400 8N1 serial link. [`SprintIr`] is generic over a line
//! [`Transport`](base::Transport); the `util` feature provides a
//! `serialport`-backed implementation and the `sprintir-util` binary.
//!
//! A session holds the calibration state established at start-up (scaling
//! factor, pressure compensation, digital filter) and uses it to turn raw
//! measurement codes into pressure-corrected ppm values.

use std::time::Duration;

use log::debug;

pub mod base;
pub mod correction;
pub mod device;
pub mod helpers;
#[cfg(feature = "util")]
pub mod serial;

#[cfg(test)]
mod mock;

use crate::base::{Response, Transport};
use crate::device::Command;

/// Default per-command reply window.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Digital filter strength the sensor ships with.
pub const DEFAULT_DIGITAL_FILTER: u16 = 16;

/// SprintIr error object
#[derive(Debug, PartialEq)]
pub enum Error<ConnErr> {
    /// The transport reported a hard failure. Distinct from [`Error::Timeout`],
    /// which is the engine's own reply accounting.
    ConnectionLost(ConnErr),
    /// No complete reply line arrived within the poll-attempt budget.
    Timeout,
    /// A reply arrived but failed echo validation or numeric parsing.
    UnexpectedReply,
    /// A caller-supplied value failed a local precondition. No I/O was
    /// performed; sensor and cached state are untouched.
    InvalidArgument,
}

impl<ConnErr> From<ConnErr> for Error<ConnErr> {
    fn from(conn_err: ConnErr) -> Self {
        Error::ConnectionLost(conn_err)
    }
}

/// Sensor operating mode (`K` command).
///
/// The sensor enforces mode legality itself: measurement and zero-point
/// commands are disabled in command mode.
#[derive(PartialEq, Clone, Copy, Debug)]
pub enum Mode {
    /// Sleep state, waiting for commands. No measurements are made and
    /// command responses have no latency. Not retained over a power cycle.
    Command = 0,
    /// Factory default. Measurements are reported continuously at the
    /// line rate.
    Streaming = 1,
    /// Measurements continue in the background but are only reported on
    /// request.
    Polling = 2,
}

/// One CO2 reading
/// Lives for the duration of a single measurement call.
#[derive(PartialEq, Clone, Debug)]
pub struct Measurement {
    /// Raw sensor code from the measurement field; negative codes mark an
    /// invalid reading.
    pub raw: i32,
    /// Concentration in parts-per-million (raw times the scaling factor),
    /// or -1 for an invalid reading.
    pub ppm: i32,
    /// Concentration in percent by volume (10000 ppm = 1.0).
    pub percentage: f64,
    /// Pressure-corrected ppm, present when the correction was applied.
    pub corrected: Option<i32>,
}

/// SprintIr sensor session
/// Owns the transport exclusively; one command round trip at a time.
pub struct SprintIr<T: Transport> {
    conn: T,
    timeout: Option<Duration>,
    scaling_factor: u32,
    compensation_value: u16,
    pressure: i32,
    digital_filter: u16,
    mode: Mode,
}

impl<T: Transport> SprintIr<T> {
    /// Connect to the sensor and establish the session calibration state:
    /// scaling factor, compensation value (and the pressure it encodes),
    /// and digital filter.
    pub fn new(conn: T) -> Result<Self, Error<T::Error>> {
        Self::open(conn, None)
    }

    /// As [`SprintIr::new`], but trust the caller's scaling factor instead
    /// of querying the sensor for it.
    pub fn with_scaling_factor(conn: T, scaling_factor: u32) -> Result<Self, Error<T::Error>> {
        if scaling_factor == 0 {
            return Err(Error::InvalidArgument);
        }
        Self::open(conn, Some(scaling_factor))
    }

    fn open(conn: T, scaling_factor: Option<u32>) -> Result<Self, Error<T::Error>> {
        let mut s = SprintIr {
            conn,
            timeout: Some(DEFAULT_TIMEOUT),
            scaling_factor: scaling_factor.unwrap_or(1),
            compensation_value: correction::REFERENCE_COMPENSATION,
            pressure: correction::REFERENCE_PRESSURE,
            digital_filter: DEFAULT_DIGITAL_FILTER,
            mode: Mode::Streaming,
        };

        if scaling_factor.is_none() {
            s.read_scaling_factor()?;
        }
        s.read_compensation()?;
        s.read_digital_filter()?;

        debug!(
            "session established: scaling x{}, compensation {} ({} mbar), filter {}",
            s.scaling_factor, s.compensation_value, s.pressure, s.digital_filter
        );

        Ok(s)
    }

    /// Replace the per-command reply window. `None` (or a zero duration)
    /// disables the bound and receive loops block until a line arrives;
    /// not recommended outside bench debugging.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Cached scaling factor multiplier.
    pub fn scaling_factor(&self) -> u32 {
        self.scaling_factor
    }

    /// Cached compensation value.
    pub fn compensation_value(&self) -> u16 {
        self.compensation_value
    }

    /// Operating pressure in mbar encoded by the cached compensation value.
    pub fn pressure(&self) -> i32 {
        self.pressure
    }

    /// Cached digital filter strength.
    pub fn digital_filter(&self) -> u16 {
        self.digital_filter
    }

    /// Last mode this driver switched the sensor to. The sensor powers up
    /// in streaming or polling mode (whichever was last used) and cannot
    /// be asked, so this starts at the factory default.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// CO2 concentration in ppm, scaled and (optionally) pressure-corrected.
    ///
    /// Returns -1 when the sensor reports an invalid (negative) raw code;
    /// transient invalid readings are operational noise rather than
    /// protocol failures.
    pub fn co2(&mut self, filtered: bool, check_correction: bool) -> Result<i32, Error<T::Error>> {
        let m = self.read_co2(filtered, check_correction)?;
        if m.raw < 0 {
            return Ok(-1);
        }
        Ok(m.corrected.unwrap_or(m.ppm))
    }

    /// Take one CO2 reading and return the full measurement record.
    ///
    /// The nonlinear correction is applied when requested and the
    /// concentration exceeds 1% by volume.
    pub fn read_co2(
        &mut self,
        filtered: bool,
        check_correction: bool,
    ) -> Result<Measurement, Error<T::Error>> {
        let raw = self.raw_co2(filtered)?;
        if raw < 0 {
            return Ok(Measurement {
                raw,
                ppm: -1,
                percentage: -1.0,
                corrected: None,
            });
        }

        let ppm = raw * self.scaling_factor as i32;
        let percentage = correction::ppm_to_percentage(ppm as i64);

        let corrected = if check_correction && percentage > 1.0 {
            Some(correction::correct_measurement(ppm as i64, self.pressure) as i32)
        } else {
            None
        };

        Ok(Measurement {
            raw,
            ppm,
            percentage,
            corrected,
        })
    }

    /// Most recent raw measurement code, unscaled.
    pub fn raw_co2(&mut self, filtered: bool) -> Result<i32, Error<T::Error>> {
        let command = if filtered {
            Command::FilteredCo2
        } else {
            Command::UnfilteredCo2
        };
        Ok(self.command_value(command, &[])? as i32)
    }

    /// Set the digital filter strength, in [1, 65535].
    ///
    /// Low values respond fastest to concentration transients, high values
    /// trade response time for noise. The sensor retains the setting over
    /// a power cycle.
    pub fn set_digital_filter(&mut self, value: u16) -> Result<(), Error<T::Error>> {
        if value == 0 {
            return Err(Error::InvalidArgument);
        }

        let arg = helpers::format_argument(value as u32);
        self.command_line(Command::SetDigitalFilter, &[&arg])?;
        self.digital_filter = value;
        Ok(())
    }

    /// Query the digital filter strength and refresh the cache.
    pub fn read_digital_filter(&mut self) -> Result<u16, Error<T::Error>> {
        let value = self.command_value(Command::GetDigitalFilter, &[])?;
        self.digital_filter = u16::try_from(value).map_err(|_| Error::UnexpectedReply)?;
        Ok(self.digital_filter)
    }

    /// Set the pressure and concentration compensation value.
    /// The cached pressure is recomputed once the sensor confirms.
    pub fn set_compensation(&mut self, value: u16) -> Result<(), Error<T::Error>> {
        if value == 0 {
            return Err(Error::InvalidArgument);
        }

        let arg = helpers::format_argument(value as u32);
        self.command_line(Command::SetCompensation, &[&arg])?;
        self.compensation_value = value;
        self.pressure = correction::compensation_to_pressure(value);
        Ok(())
    }

    /// Set the compensation from an operating pressure in mbar.
    pub fn set_pressure(&mut self, mbar: i32) -> Result<(), Error<T::Error>> {
        if mbar <= 0 {
            return Err(Error::InvalidArgument);
        }
        self.set_compensation(correction::pressure_to_compensation(mbar))
    }

    /// Set the compensation from an altitude in metres above sea level.
    pub fn set_altitude(&mut self, metres: f64) -> Result<(), Error<T::Error>> {
        let pressure = correction::altitude_to_pressure(metres).ok_or(Error::InvalidArgument)?;
        self.set_pressure(pressure.round() as i32)
    }

    /// Query the stored compensation value and refresh the cached
    /// compensation and pressure.
    pub fn read_compensation(&mut self) -> Result<u16, Error<T::Error>> {
        let value = self.command_value(Command::GetCompensation, &[])?;
        self.compensation_value = u16::try_from(value).map_err(|_| Error::UnexpectedReply)?;
        self.pressure = correction::compensation_to_pressure(self.compensation_value);
        Ok(self.compensation_value)
    }

    /// Query the scaling factor multiplier and refresh the cache.
    /// Fetched once at session start; this is the explicit re-fetch.
    pub fn read_scaling_factor(&mut self) -> Result<u32, Error<T::Error>> {
        let value = self.command_value(Command::ScalingFactor, &[])?;
        if value <= 0 {
            return Err(Error::UnexpectedReply);
        }
        self.scaling_factor = value as u32;
        Ok(self.scaling_factor)
    }

    /// Switch the sensor operating mode.
    pub fn set_mode(&mut self, mode: Mode) -> Result<(), Error<T::Error>> {
        let arg = helpers::format_argument(mode as u32);
        self.command_line(Command::SwitchMode, &[&arg])?;
        self.mode = mode;
        Ok(())
    }

    /// Zero-point setting in fresh air, using the sensor's stored fresh-air
    /// background concentration.
    ///
    /// Zero-point settings are not cumulative: the sensor keeps only the
    /// most recent one, whichever variant set it.
    pub fn zero_fresh_air(&mut self) -> Result<(), Error<T::Error>> {
        self.command_line(Command::ZeroFreshAir, &[])?;
        Ok(())
    }

    /// Zero-point setting in nitrogen, assuming a zero-CO2 environment.
    pub fn zero_nitrogen(&mut self) -> Result<(), Error<T::Error>> {
        self.command_line(Command::ZeroNitrogen, &[])?;
        Ok(())
    }

    /// Force a specific zero set-point. The value is in ppm and is
    /// rescaled to sensor units before sending.
    pub fn zero_manual(&mut self, ppm: u32) -> Result<(), Error<T::Error>> {
        if ppm == 0 {
            return Err(Error::InvalidArgument);
        }

        let arg = helpers::format_argument(ppm / self.scaling_factor);
        self.command_line(Command::ZeroManual, &[&arg])?;
        Ok(())
    }

    /// Zero-point setting with the sensor in a known CO2 concentration
    /// (ppm). The recommended zeroing method.
    pub fn zero_known_gas(&mut self, ppm: u32) -> Result<(), Error<T::Error>> {
        if ppm == 0 {
            return Err(Error::InvalidArgument);
        }

        let arg = helpers::format_argument(ppm / self.scaling_factor);
        self.command_line(Command::ZeroKnownGas, &[&arg])?;
        Ok(())
    }

    /// Fine-tune the zero point from a reading reported by the sensor and
    /// the concentration known to be correct at that time (both ppm).
    /// Typically used to implement automated zeroing routines.
    pub fn fine_tune_zero(
        &mut self,
        known_reading: u32,
        known_concentration: u32,
    ) -> Result<(), Error<T::Error>> {
        if known_reading == 0 || known_concentration == 0 {
            return Err(Error::InvalidArgument);
        }

        let reading = helpers::format_argument(known_reading / self.scaling_factor);
        let concentration = helpers::format_argument(known_concentration / self.scaling_factor);
        self.command_line(Command::FineTuneZero, &[&reading, &concentration])?;
        Ok(())
    }

    /// Set the background CO2 concentration (ppm) used by auto-zeroing.
    pub fn set_auto_zero_background(&mut self, ppm: u32) -> Result<(), Error<T::Error>> {
        self.write_background(device::AUTO_ZERO_BACKGROUND, ppm)
    }

    /// Set the background CO2 concentration (ppm) used for zero-point
    /// setting in fresh air.
    pub fn set_fresh_air_background(&mut self, ppm: u32) -> Result<(), Error<T::Error>> {
        self.write_background(device::FRESH_AIR_BACKGROUND, ppm)
    }

    /// Background concentrations are written as a 16-bit MSB/LSB register
    /// pair. Both halves must individually echo-match; if the second write
    /// fails the sensor is left with only the first half applied, and no
    /// rollback is attempted.
    fn write_background(&mut self, registers: (u32, u32), ppm: u32) -> Result<(), Error<T::Error>> {
        if ppm == 0 {
            return Err(Error::InvalidArgument);
        }

        let (msb_register, lsb_register) = registers;
        let (msb, lsb) = helpers::split_word(ppm / self.scaling_factor);

        let register = helpers::format_argument(msb_register);
        let value = helpers::format_argument(msb);
        self.command_line(Command::SetBackground, &[&register, &value])?;

        let register = helpers::format_argument(lsb_register);
        let value = helpers::format_argument(lsb);
        self.command_line(Command::SetBackground, &[&register, &value])?;

        Ok(())
    }

    /// Enable or disable the sensor's periodic auto-zero function.
    /// Disabled by default, and reset to defaults by a power cycle.
    pub fn set_auto_zero(&mut self, enabled: bool) -> Result<(), Error<T::Error>> {
        let arg = if enabled { "1" } else { "0" };
        self.command_line(Command::AutoZero, &[arg])?;
        Ok(())
    }

    /// Configure auto-zero timing: days until the first auto-zero, then the
    /// regular interval. Each must be a single decimal digit of days.
    pub fn set_auto_zero_interval(&mut self, initial: u8, regular: u8) -> Result<(), Error<T::Error>> {
        if initial == 0 || initial > 9 || regular == 0 || regular > 9 {
            return Err(Error::InvalidArgument);
        }

        let initial = format!("{}.0", initial);
        let regular = format!("{}.0", regular);
        self.command_line(Command::AutoZero, &[&initial, &regular])?;
        Ok(())
    }

    /// Query the auto-zero configuration. The sensor answers `@ 0` when
    /// auto-zeroing is disabled; the reply line is returned with its
    /// terminator stripped.
    pub fn auto_zero_configuration(&mut self) -> Result<String, Error<T::Error>> {
        let line = self.command_line(Command::AutoZeroStatus, &[""])?;
        decode_line(line)
    }

    /// Firmware build description and sensor serial number.
    /// The sensor answers the `Y` command with two consecutive lines.
    pub fn firmware_and_serial(&mut self) -> Result<(String, String), Error<T::Error>> {
        let firmware = self.command_line(Command::FirmwareSerial, &[])?;
        let serial = base::read_reply(&mut self.conn, self.timeout)?;
        Ok((decode_line(firmware)?, decode_line(serial)?))
    }

    fn command_value(&mut self, command: Command, args: &[&str]) -> Result<i64, Error<T::Error>> {
        match base::transact(&mut self.conn, self.timeout, command, args)? {
            Response::Value(v) => Ok(v),
            Response::Line(_) => Err(Error::UnexpectedReply),
        }
    }

    fn command_line(&mut self, command: Command, args: &[&str]) -> Result<Vec<u8>, Error<T::Error>> {
        match base::transact(&mut self.conn, self.timeout, command, args)? {
            Response::Line(line) => Ok(line),
            Response::Value(_) => Err(Error::UnexpectedReply),
        }
    }
}

fn decode_line<ConnErr>(line: Vec<u8>) -> Result<String, Error<ConnErr>> {
    match String::from_utf8(line) {
        Ok(s) => Ok(s.trim_end().to_string()),
        Err(_) => Err(Error::UnexpectedReply),
    }
}
