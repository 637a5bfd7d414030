// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device line parsing.
//!
//! The counter sends one ASCII line per update:
//!
//! ```text
//! COUNT:<int>,USAGE_S:<int>,LIGHT:<token>[,<key>:<value>...]
//! ```
//!
//! Fields may appear in any order and carry arbitrary whitespace. Unknown
//! keys are ignored. Lines that do not start with `COUNT:` are device
//! chatter (boot banners, debug prints) and never reach [`parse`].

use crate::reading::Reading;
use thiserror::Error;

/// Prefix that marks a telemetry line.
pub const DATA_SENTINEL: &str = "COUNT:";

const FIELD_DELIMITER: char = ',';
const KEY_VALUE_DELIMITER: char = ':';

const KEY_COUNT: &str = "COUNT";
const KEY_USAGE: &str = "USAGE_S";
const KEY_LIGHT: &str = "LIGHT";

/// How a trimmed line should be routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Nothing to do.
    Empty,
    /// Telemetry, goes to the parser.
    Data,
    /// Anything else the device prints; logged only.
    Diagnostic,
}

/// Route a trimmed line.
pub fn classify(line: &str) -> LineKind {
    if line.is_empty() {
        LineKind::Empty
    } else if line.starts_with(DATA_SENTINEL) {
        LineKind::Data
    } else {
        LineKind::Diagnostic
    }
}

/// Rejection reasons for a telemetry line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// One or more of `COUNT`, `USAGE_S`, `LIGHT` never appeared.
    #[error("data packet missing {}: {line}", .missing.join(", "))]
    MissingFields {
        line: String,
        missing: Vec<&'static str>,
    },
    /// A numeric field held something that is not a non-negative integer.
    #[error("{key} value {value:?} is not a non-negative integer: {line}")]
    TypeMismatch {
        key: &'static str,
        value: String,
        line: String,
    },
}

impl ParseError {
    /// The offending line, for diagnostics.
    pub fn line(&self) -> &str {
        match self {
            ParseError::MissingFields { line, .. } | ParseError::TypeMismatch { line, .. } => line,
        }
    }
}

/// Parse one telemetry line into a [`Reading`].
///
/// Pure: the result depends only on `line`. A token only counts when it
/// splits into exactly one key and one value; later duplicates win.
pub fn parse(line: &str) -> Result<Reading, ParseError> {
    let mut count = None;
    let mut usage = None;
    let mut light = None;

    for token in line.split(FIELD_DELIMITER) {
        let mut parts = token.split(KEY_VALUE_DELIMITER);
        let (key, value) = match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(value), None) => (key.trim(), value.trim()),
            _ => continue,
        };

        match key {
            KEY_COUNT => count = Some(parse_integer(KEY_COUNT, value, line)?),
            KEY_USAGE => usage = Some(parse_integer(KEY_USAGE, value, line)?),
            KEY_LIGHT => light = Some(value.to_string()),
            _ => {}
        }
    }

    match (count, usage, light) {
        (Some(count), Some(usage_seconds), Some(light)) => Ok(Reading {
            count,
            usage_seconds,
            light,
        }),
        (count, usage, light) => {
            let missing = [
                (KEY_COUNT, count.is_none()),
                (KEY_USAGE, usage.is_none()),
                (KEY_LIGHT, light.is_none()),
            ]
            .into_iter()
            .filter_map(|(key, absent)| absent.then_some(key))
            .collect();

            Err(ParseError::MissingFields {
                line: line.to_string(),
                missing,
            })
        }
    }
}

fn parse_integer(key: &'static str, value: &str, line: &str) -> Result<u64, ParseError> {
    value.parse::<u64>().map_err(|_| ParseError::TypeMismatch {
        key,
        value: value.to_string(),
        line: line.to_string(),
    })
}
