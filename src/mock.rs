//! Expectation-based mock transport for driver tests

use std::collections::VecDeque;
use std::time::Duration;

use crate::base::Transport;

/// Error type produced by [`Transaction::ReadError`] expectations.
#[derive(PartialEq, Clone, Copy, Debug)]
pub struct MockError;

/// One expected interaction with the transport.
#[derive(PartialEq, Clone, Debug)]
pub enum Transaction {
    /// Expect a written command line with exactly these bytes.
    Write(Vec<u8>),
    /// Produce this reply line on the next read attempt.
    Read(Vec<u8>),
    /// Produce nothing on the next read attempt (consumes one poll).
    ReadNone,
    /// Fail the next read attempt with a hard transport error.
    ReadError(MockError),
}

/// Mock transport driven by an ordered expectation list.
///
/// Deviations from the expectations panic, and [`Mock::done`] asserts that
/// every expectation was consumed.
pub struct Mock {
    expectations: VecDeque<Transaction>,
    reads: usize,
    silent: bool,
}

impl Mock {
    pub fn new(expectations: &[Transaction]) -> Self {
        Mock {
            expectations: expectations.iter().cloned().collect(),
            reads: 0,
            silent: false,
        }
    }

    /// A transport that accepts writes and never produces a line, for
    /// timeout accounting tests.
    pub fn silent() -> Self {
        Mock {
            expectations: VecDeque::new(),
            reads: 0,
            silent: true,
        }
    }

    /// Number of read attempts performed so far.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Assert that every expectation was consumed.
    pub fn done(&mut self) {
        assert!(
            self.expectations.is_empty(),
            "unconsumed expectations: {:?}",
            self.expectations
        );
    }
}

impl Transport for Mock {
    type Error = MockError;

    fn write_line(&mut self, line: &[u8]) -> Result<(), MockError> {
        if self.silent {
            return Ok(());
        }

        match self.expectations.pop_front() {
            Some(Transaction::Write(expected)) => {
                assert_eq!(
                    line,
                    &expected[..],
                    "wrote {:?}, expected {:?}",
                    String::from_utf8_lossy(line),
                    String::from_utf8_lossy(&expected)
                );
                Ok(())
            }
            other => panic!("unexpected write, next expectation is {:?}", other),
        }
    }

    fn read_line(&mut self, _max_wait: Duration) -> Result<Option<Vec<u8>>, MockError> {
        self.reads += 1;

        if self.silent {
            return Ok(None);
        }

        match self.expectations.pop_front() {
            Some(Transaction::Read(line)) => Ok(Some(line)),
            Some(Transaction::ReadNone) => Ok(None),
            Some(Transaction::ReadError(e)) => Err(e),
            other => panic!("unexpected read, next expectation is {:?}", other),
        }
    }
}
