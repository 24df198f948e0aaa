//! Line transport and command dispatch for the SprintIR-R sensor
//!
//! Copyright 2026 sensor-sprintir contributors

use core::fmt::Debug;
use std::time::Duration;

use log::trace;

use crate::device::{self, Command, Reply, LINE_RATE_HZ};
use crate::Error;

/// Blocking line-oriented transport to the sensor.
///
/// This should not be required by consumers, but is exposed to support
/// alternate links (the `util` feature provides a serial-port
/// implementation, tests provide a mock).
pub trait Transport {
    /// Hard transport failure, e.g. the port going away.
    type Error: Debug;

    /// Write one complete command line (including CRLF) to the sensor.
    fn write_line(&mut self, line: &[u8]) -> Result<(), Self::Error>;

    /// Try to read one complete reply line, waiting at most `max_wait`.
    ///
    /// `Ok(None)` means nothing complete arrived in time and is not a
    /// failure; the dispatch loop accounts for it as one spent attempt.
    fn read_line(&mut self, max_wait: Duration) -> Result<Option<Vec<u8>>, Self::Error>;
}

/// Wait handed to the transport for each poll attempt: one line period.
pub const POLL_WAIT: Duration = Duration::from_micros(1_000_000 / LINE_RATE_HZ as u64);

/// Parsed payload of a completed command round trip.
#[derive(PartialEq, Clone, Debug)]
pub enum Response {
    /// Integer parsed from a field-slice reply.
    Value(i64),
    /// Raw reply line from an echo or ack reply.
    Line(Vec<u8>),
}

/// Read one reply line, polling the transport once per line period.
///
/// The attempt budget is `ceil(LINE_RATE_HZ * timeout)`; exhausting it
/// raises [`Error::Timeout`]. A `None` timeout (or a zero duration)
/// disables the budget and the loop blocks until a line arrives.
pub fn read_reply<T: Transport>(
    conn: &mut T,
    timeout: Option<Duration>,
) -> Result<Vec<u8>, Error<T::Error>> {
    match timeout {
        Some(window) if !window.is_zero() => {
            let attempts = (f64::from(LINE_RATE_HZ) * window.as_secs_f64()).ceil() as u32;
            for _ in 0..attempts {
                if let Some(line) = conn.read_line(POLL_WAIT)? {
                    return Ok(line);
                }
            }
            Err(Error::Timeout)
        }
        _ => loop {
            if let Some(line) = conn.read_line(POLL_WAIT)? {
                return Ok(line);
            }
        },
    }
}

/// Perform one command round trip: encode and write the line, wait for the
/// reply, then validate it against the command's reply contract.
pub fn transact<T: Transport>(
    conn: &mut T,
    timeout: Option<Duration>,
    command: Command,
    args: &[&str],
) -> Result<Response, Error<T::Error>> {
    let line = device::encode_line(command.code(), args);

    trace!("sending: {:?}", String::from_utf8_lossy(&line));
    conn.write_line(&line)?;

    let reply = read_reply(conn, timeout)?;
    trace!("reply: {:?}", String::from_utf8_lossy(&reply));

    match command.reply() {
        Reply::Echo => {
            // The echo is the sent line behind a one-byte type marker.
            if reply.is_empty() || reply[1..] != line[..] {
                return Err(Error::UnexpectedReply);
            }
            Ok(Response::Line(reply))
        }
        Reply::Field { start, end } => {
            let field = reply.get(start..end).ok_or(Error::UnexpectedReply)?;
            let text = core::str::from_utf8(field).map_err(|_| Error::UnexpectedReply)?;
            // Tolerates the occasional fractional rendering of a field.
            let value = text.trim().parse::<f64>().map_err(|_| Error::UnexpectedReply)?;
            if !value.is_finite() {
                return Err(Error::UnexpectedReply);
            }
            Ok(Response::Value(value as i64))
        }
        Reply::Ack => Ok(Response::Line(reply)),
    }
}
