// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Occupancy readings and the record shape persisted to the store.
//!
//! A [`Reading`] is what the parser produces from one device line. A
//! [`Payload`] is what actually lands in the store: the reading plus the
//! write-time timestamp and the derived event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Occupancy state derived from the people count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    /// At least one person in the room.
    Occupied,
    /// Nobody in the room.
    Empty,
}

impl Event {
    /// `Occupied` iff `count > 0`.
    pub fn from_count(count: u64) -> Self {
        if count > 0 {
            Event::Occupied
        } else {
            Event::Empty
        }
    }

    /// Wire token (`"OCCUPIED"` / `"EMPTY"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::Occupied => "OCCUPIED",
            Event::Empty => "EMPTY",
        }
    }

    /// Parse a wire token. Case-sensitive.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "OCCUPIED" => Some(Event::Occupied),
            "EMPTY" => Some(Event::Empty),
            _ => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated telemetry record from one device line.
///
/// Only the parser builds these, and only when `COUNT`, `USAGE_S` and
/// `LIGHT` were all present and well-typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    /// People currently counted in the room.
    pub count: u64,
    /// Accumulated usage time reported by the device, in seconds.
    pub usage_seconds: u64,
    /// Light state token as sent by the device (e.g. `ON`, `OFF`).
    pub light: String,
}

impl Reading {
    pub fn new(count: u64, usage_seconds: u64, light: impl Into<String>) -> Self {
        Self {
            count,
            usage_seconds,
            light: light.into(),
        }
    }

    pub fn event(&self) -> Event {
        Event::from_count(self.count)
    }
}

/// Record shape written to both the live document and the history log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub count: u64,
    pub usage_s: u64,
    pub light: String,
    pub timestamp: DateTime<Utc>,
    pub event: Event,
}

impl Payload {
    /// Stamp a reading with the write time. The event is derived here, not
    /// at parse time.
    pub fn stamp(reading: &Reading, now: DateTime<Utc>) -> Self {
        Self {
            count: reading.count,
            usage_s: reading.usage_seconds,
            light: reading.light.clone(),
            timestamp: now,
            event: reading.event(),
        }
    }
}
