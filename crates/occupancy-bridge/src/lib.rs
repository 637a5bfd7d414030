// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Occupancy Bridge
//!
//! Bridges a line-oriented serial occupancy counter to a remote document
//! store, keeping a single "latest" record and an append-only history log.
//!
//! This crate provides:
//! - Line parsing and validation (`COUNT:<n>,USAGE_S:<n>,LIGHT:<token>`)
//! - Dual write: overwrite the live record, append to the history log
//! - Serial connection management with fixed-delay reconnection
//! - A sequential ingestion loop that survives per-line and per-connection
//!   failures, stoppable from another thread
//! - YAML configuration
//!
//! # Overview
//!
//! ```text
//! serial port --> ConnectionManager --> parser --> SinkWriter --> DocumentStore
//!                                                        (live set + history append)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use occupancy_bridge::{Bridge, ConnectionManager, DocumentPaths, MemoryStore,
//!                        SerialSource, SinkWriter};
//! use std::time::Duration;
//!
//! let connection = ConnectionManager::new(
//!     SerialSource::new("/dev/rfcomm0", 9600),
//!     Duration::from_secs(5),
//! );
//! let writer = SinkWriter::new(MemoryStore::new(), DocumentPaths::default());
//!
//! let mut bridge = Bridge::new(connection, writer);
//! let stop = bridge.stop_handle();
//! bridge.run();
//! ```

pub mod config;
pub mod connection;
pub mod ingest;
pub mod parser;
pub mod reading;
pub mod shutdown;
pub mod sink;

pub use config::{BridgeConfig, ConfigError};
pub use connection::{
    ConnectionError, ConnectionManager, ConnectionState, ConnectionStats, SerialSource,
    StreamSource,
};
pub use ingest::{Bridge, BridgeStats, LineOutcome};
pub use parser::{classify, parse, LineKind, ParseError};
pub use reading::{Event, Payload, Reading};
pub use shutdown::StopHandle;
pub use sink::{
    DocumentPaths, DocumentStore, FirestoreConfig, FirestoreStore, MemoryStore, SinkError,
    SinkWriter, StoreError, WriteAck,
};
