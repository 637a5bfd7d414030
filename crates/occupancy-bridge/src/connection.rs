// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Serial connection lifecycle.
//!
//! # State Machine
//!
//! ```text
//!      +--------------+
//!      | Disconnected |<------------------------+
//!      +------+-------+                         |
//!             | connect()                       |
//!             v                                 |
//!      +--------------+   open error    +-------+--+
//!      |  (opening)   |---------------->|  Failed  |--(delay)--> connect()
//!      +------+-------+                 +----------+
//!             | opened
//!             v
//!      +--------------+
//!      |  Connected   |--(read error / EOF / close())--> Disconnected
//!      +--------------+
//! ```
//!
//! There is no terminal state; only a shutdown request stops the retries.
//! Retries use a fixed delay with no backoff and no attempt limit.

use crate::shutdown::StopHandle;
use std::fmt;
use std::io::{self, BufRead, BufReader, Read};
use std::time::Duration;
use thiserror::Error;

/// Line delimiter sent by the device.
pub const LINE_DELIMITER: u8 = b'\n';

/// Default serial baud rate of the counter's Bluetooth module.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default delay between a failure and the next connection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default read poll interval. Bounds how long a shutdown request can wait
/// for a blocked read.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Something that can open a byte stream to the device.
///
/// [`SerialSource`] opens a host serial port; tests provide scripted
/// in-memory streams.
pub trait StreamSource {
    /// Stream produced by a successful open.
    type Stream: Read;

    /// Open a fresh stream.
    ///
    /// Reads on the returned stream may fail with `TimedOut` or
    /// `WouldBlock` when no data arrived within the poll interval; those
    /// are not treated as connection failures.
    fn open(&mut self) -> io::Result<Self::Stream>;

    /// Human-readable endpoint name for logs.
    fn endpoint(&self) -> &str;
}

/// Host serial port (USB-serial adapter, Bluetooth SPP `COMx` / `rfcomm`).
#[derive(Debug, Clone)]
pub struct SerialSource {
    port: String,
    baud_rate: u32,
    poll_interval: Duration,
}

impl SerialSource {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

impl StreamSource for SerialSource {
    type Stream = Box<dyn serialport::SerialPort>;

    fn open(&mut self) -> io::Result<Self::Stream> {
        serialport::new(self.port.as_str(), self.baud_rate)
            .timeout(self.poll_interval)
            .open()
            .map_err(io::Error::from)
    }

    fn endpoint(&self) -> &str {
        &self.port
    }
}

/// Connection state, owned by the [`ConnectionManager`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No stream open. Initial state, and the state after a read failure.
    #[default]
    Disconnected,
    /// Stream open and readable.
    Connected,
    /// The last connection attempt failed; waiting to retry.
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connected => "Connected",
            ConnectionState::Failed => "Failed",
        };
        write!(f, "{}", s)
    }
}

/// Connection failures. Both trigger the reconnect delay.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("error connecting to serial port {endpoint}: {source}")]
    OpenFailed {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("error reading from serial port {endpoint}: {source}")]
    ReadFailed {
        endpoint: String,
        #[source]
        source: io::Error,
    },
}

/// Connection statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Calls to `open()` on the source.
    pub connect_attempts: u64,
    /// Successful opens.
    pub connects: u64,
    /// Reads that failed and dropped the connection.
    pub read_failures: u64,
}

/// Owns the device stream and its reconnect policy.
///
/// Single reader: the stream is never shared, and is closed on error,
/// on [`close`](Self::close), and on drop.
pub struct ConnectionManager<S: StreamSource> {
    source: S,
    reader: Option<BufReader<S::Stream>>,
    /// Bytes of a line received so far across poll timeouts.
    pending: Vec<u8>,
    state: ConnectionState,
    reconnect_delay: Duration,
    stats: ConnectionStats,
}

impl<S: StreamSource> ConnectionManager<S> {
    pub fn new(source: S, reconnect_delay: Duration) -> Self {
        Self {
            source,
            reader: None,
            pending: Vec::new(),
            state: ConnectionState::Disconnected,
            reconnect_delay,
            stats: ConnectionStats::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn endpoint(&self) -> &str {
        self.source.endpoint()
    }

    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Make one attempt to open the stream.
    pub fn connect(&mut self) -> Result<(), ConnectionError> {
        self.close();
        self.stats.connect_attempts += 1;

        match self.source.open() {
            Ok(stream) => {
                self.reader = Some(BufReader::new(stream));
                self.state = ConnectionState::Connected;
                self.stats.connects += 1;
                tracing::info!(endpoint = %self.source.endpoint(), "Connected to serial port");
                Ok(())
            }
            Err(source) => {
                self.state = ConnectionState::Failed;
                Err(ConnectionError::OpenFailed {
                    endpoint: self.source.endpoint().to_string(),
                    source,
                })
            }
        }
    }

    /// Attempt to connect until it works, waiting the fixed delay between
    /// attempts.
    ///
    /// Returns `false` if `stop` was triggered before a connection was made.
    pub fn connect_with_retry(&mut self, stop: &StopHandle) -> bool {
        loop {
            if stop.is_stopped() {
                return false;
            }
            match self.connect() {
                Ok(()) => return true,
                Err(e) => {
                    tracing::warn!("{}", e);
                    tracing::info!(
                        "Retrying connection in {} seconds...",
                        self.reconnect_delay.as_secs_f32()
                    );
                    if !stop.sleep(self.reconnect_delay) {
                        return false;
                    }
                }
            }
        }
    }

    /// Read the next complete line, delimiter included.
    ///
    /// `Ok(None)` means the poll interval expired without completing a
    /// line; the partial line is kept for the next call. Any other I/O
    /// error, or end of stream, closes the connection.
    pub fn read_line(&mut self) -> Result<Option<Vec<u8>>, ConnectionError> {
        let reader = match self.reader.as_mut() {
            Some(reader) => reader,
            None => {
                return Err(ConnectionError::ReadFailed {
                    endpoint: self.source.endpoint().to_string(),
                    source: io::Error::new(io::ErrorKind::NotConnected, "serial port not open"),
                })
            }
        };

        match reader.read_until(LINE_DELIMITER, &mut self.pending) {
            Ok(0) => self.fail(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "device closed the stream",
            )),
            // A partial line without delimiter means EOF is next.
            Ok(_) if self.pending.last() != Some(&LINE_DELIMITER) => Ok(None),
            Ok(_) => Ok(Some(std::mem::take(&mut self.pending))),
            Err(e) if is_poll_timeout(&e) => Ok(None),
            Err(e) => self.fail(e),
        }
    }

    /// Close the stream if one is open.
    pub fn close(&mut self) {
        if self.reader.take().is_some() {
            tracing::debug!(endpoint = %self.source.endpoint(), "Serial port closed");
        }
        self.pending.clear();
        self.state = ConnectionState::Disconnected;
    }

    fn fail(&mut self, source: io::Error) -> Result<Option<Vec<u8>>, ConnectionError> {
        self.stats.read_failures += 1;
        self.close();
        Err(ConnectionError::ReadFailed {
            endpoint: self.source.endpoint().to_string(),
            source,
        })
    }
}

impl<S: StreamSource> Drop for ConnectionManager<S> {
    fn drop(&mut self) {
        self.close();
    }
}

fn is_poll_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
