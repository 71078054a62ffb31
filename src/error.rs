/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Structured error kinds for persistent artefacts and the build pipeline.
//!
//! Everything is propagated as [`anyhow::Error`]; these kinds sit at the
//! bottom of the chain so callers can downcast when they need to
//! distinguish, say, a stale index from a truncated one.

use std::fmt;

/// The error kinds raised by the core structures.
#[derive(Debug)]
pub enum Error {
    /// A persisted artefact carries a version tag we do not understand.
    VersionMismatch { expected: u64, found: u64 },
    /// An internal consistency check failed during a lookup.
    CorruptIndex(String),
    /// An index exceeded a tier capacity.
    RangeError {
        what: String,
        max: u64,
        value: u64,
    },
    /// A read file could not be parsed.
    Parse(String),
    /// A builder invariant was violated.
    General(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::VersionMismatch { expected, found } => write!(
                f,
                "version mismatch: expected {}, found {}",
                expected, found
            ),
            Error::CorruptIndex(what) => write!(f, "corrupt index: {}", what),
            Error::RangeError { what, max, value } => {
                write!(f, "range error in {}: {} exceeds {}", what, value, max)
            }
            Error::Parse(msg) => write!(f, "parse error: {}", msg),
            Error::General(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Shorthand used by the lookup paths.
    pub fn range(what: &str, max: u64, value: u64) -> Self {
        Error::RangeError {
            what: what.to_owned(),
            max,
            value,
        }
    }
}
