// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ingestion loop - reads device lines, parses them and writes readings.

use crate::connection::{ConnectionManager, StreamSource};
use crate::parser::{self, LineKind, ParseError};
use crate::shutdown::StopHandle;
use crate::sink::{DocumentStore, SinkError, SinkWriter, WriteAck};

/// Ingestion statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Complete lines received from the device.
    pub lines_received: u64,
    /// Non-telemetry lines (logged only).
    pub diagnostic_lines: u64,
    /// Lines dropped because they were not valid UTF-8.
    pub invalid_utf8_lines: u64,
    /// Telemetry lines that produced a reading.
    pub readings_parsed: u64,
    /// Telemetry lines rejected by the parser.
    pub parse_errors: u64,
    /// Successful live record writes.
    pub live_writes: u64,
    /// Successful history appends.
    pub history_writes: u64,
    /// Readings lost because the live write failed.
    pub live_write_failures: u64,
    /// History entries lost after a successful live write.
    pub history_write_failures: u64,
    /// Connection losses while reading.
    pub read_failures: u64,
    /// Successful connects after a connection loss.
    pub reconnects: u64,
}

/// What happened to a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// Empty line.
    Ignored,
    /// Device chatter, logged at debug level.
    Diagnostic,
    /// Telemetry line rejected by the parser; nothing was written.
    Rejected(ParseError),
    /// Reading written (completely or partially).
    Written(WriteAck),
    /// Live write failed; the reading is lost.
    WriteFailed(SinkError),
}

/// Serial-to-store bridge.
///
/// Runs a single sequential loop: connect, read a line, parse, write.
/// Per-line problems drop the line; connection problems close the stream
/// and reconnect after the fixed delay. Only a stop request ends [`run`].
///
/// [`run`]: Bridge::run
pub struct Bridge<S: StreamSource, D: DocumentStore> {
    connection: ConnectionManager<S>,
    writer: SinkWriter<D>,
    stop: StopHandle,
    stats: BridgeStats,
}

impl<S: StreamSource, D: DocumentStore> Bridge<S, D> {
    pub fn new(connection: ConnectionManager<S>, writer: SinkWriter<D>) -> Self {
        Self {
            connection,
            writer,
            stop: StopHandle::new(),
            stats: BridgeStats::default(),
        }
    }

    /// Use an existing stop handle instead of a fresh one.
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    /// Get a handle to stop the bridge from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stats(&self) -> &BridgeStats {
        &self.stats
    }

    pub fn connection(&self) -> &ConnectionManager<S> {
        &self.connection
    }

    pub fn writer(&self) -> &SinkWriter<D> {
        &self.writer
    }

    /// Run until stopped (blocking).
    ///
    /// The stream is closed before returning.
    pub fn run(&mut self) {
        tracing::info!(
            endpoint = %self.connection.endpoint(),
            live = %self.writer.paths().live_document,
            "Starting serial bridge"
        );

        let mut lost = false;
        while !self.stop.is_stopped() {
            if !self.connection.is_connected() {
                if !self.connection.connect_with_retry(&self.stop) {
                    break;
                }
                if lost {
                    self.stats.reconnects += 1;
                    lost = false;
                }
            }

            match self.connection.read_line() {
                Ok(Some(raw)) => {
                    self.handle_raw(&raw);
                }
                Ok(None) => {}
                Err(e) => {
                    self.stats.read_failures += 1;
                    lost = true;
                    tracing::error!("{}", e);
                    tracing::info!(
                        "Retrying connection in {} seconds...",
                        self.connection.reconnect_delay().as_secs_f32()
                    );
                    if !self.stop.sleep(self.connection.reconnect_delay()) {
                        break;
                    }
                }
            }
        }

        self.connection.close();

        tracing::info!(
            lines_received = self.stats.lines_received,
            readings_parsed = self.stats.readings_parsed,
            live_writes = self.stats.live_writes,
            history_writes = self.stats.history_writes,
            read_failures = self.stats.read_failures,
            reconnects = self.stats.reconnects,
            "Serial bridge stopped"
        );
    }

    /// Decode and process one raw line as received from the device.
    pub fn handle_raw(&mut self, raw: &[u8]) -> Option<LineOutcome> {
        self.stats.lines_received += 1;
        match std::str::from_utf8(raw) {
            Ok(text) => Some(self.handle_line(text.trim())),
            Err(e) => {
                self.stats.invalid_utf8_lines += 1;
                tracing::warn!("Dropping line that is not UTF-8 ({}): {:?}", e, raw);
                None
            }
        }
    }

    /// Route, parse and write one trimmed line.
    pub fn handle_line(&mut self, line: &str) -> LineOutcome {
        match parser::classify(line) {
            LineKind::Empty => LineOutcome::Ignored,
            LineKind::Diagnostic => {
                self.stats.diagnostic_lines += 1;
                tracing::debug!("DEBUG: {}", line);
                LineOutcome::Diagnostic
            }
            LineKind::Data => match parser::parse(line) {
                Ok(reading) => {
                    self.stats.readings_parsed += 1;
                    self.write(&reading)
                }
                Err(e) => {
                    self.stats.parse_errors += 1;
                    tracing::warn!("{}", e);
                    LineOutcome::Rejected(e)
                }
            },
        }
    }

    fn write(&mut self, reading: &crate::reading::Reading) -> LineOutcome {
        match self.writer.write(reading) {
            Ok(ack) => {
                self.stats.live_writes += 1;
                if ack.is_complete() {
                    self.stats.history_writes += 1;
                } else {
                    self.stats.history_write_failures += 1;
                }
                let payload = ack.payload();
                tracing::info!(
                    count = payload.count,
                    usage_s = payload.usage_s,
                    light = %payload.light,
                    event = %payload.event,
                    at = %payload.timestamp.format("%H:%M:%S"),
                    "Data received and saved"
                );
                LineOutcome::Written(ack)
            }
            Err(e) => {
                self.stats.live_write_failures += 1;
                tracing::error!("{}", e);
                LineOutcome::WriteFailed(e)
            }
        }
    }
}
