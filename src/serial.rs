//! Serial-port line transport for host use

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::SerialPort;

use crate::base::Transport;
use crate::device::BAUD_RATE;

/// Line-buffered serial connection to the sensor.
///
/// Bytes are accumulated across read attempts until a LF terminator is
/// seen, so a line split over several polls still comes out whole.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    buffer: Vec<u8>,
}

impl SerialTransport {
    /// Open a serial port at the sensor's fixed rate (38400 8N1).
    pub fn open(path: &str) -> serialport::Result<Self> {
        let port = serialport::new(path, BAUD_RATE)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(Duration::from_millis(10))
            .open()?;

        Ok(SerialTransport {
            port,
            buffer: Vec::new(),
        })
    }
}

/// Detach the first complete line from the buffer, terminator included.
fn take_line(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let end = buffer.iter().position(|&b| b == b'\n')?;
    let mut line = buffer.split_off(end + 1);
    // split_off leaves the line behind and returns the tail; swap them.
    core::mem::swap(buffer, &mut line);
    Some(line)
}

impl Transport for SerialTransport {
    type Error = io::Error;

    fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        self.port.write_all(line)?;
        self.port.flush()
    }

    fn read_line(&mut self, max_wait: Duration) -> io::Result<Option<Vec<u8>>> {
        if let Some(line) = take_line(&mut self.buffer) {
            return Ok(Some(line));
        }

        self.port.set_timeout(max_wait).map_err(io::Error::from)?;

        let mut chunk = [0u8; 64];
        match self.port.read(&mut chunk) {
            Ok(0) => Ok(None),
            Ok(n) => {
                self.buffer.extend_from_slice(&chunk[..n]);
                Ok(take_line(&mut self.buffer))
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }
}
