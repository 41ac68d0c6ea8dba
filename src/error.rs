// RailCheck - Error types
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for RailCheck
//!
//! Three kinds reach callers: invalid simulator configuration, an analyzer
//! operation run over zero records, and a persisted record that cannot be
//! parsed. I/O failures of the persistence adapter are carried separately.

use thiserror::Error;

/// Result type alias for RailCheck operations
pub type Result<T> = std::result::Result<T, RailError>;

/// Main error type for RailCheck operations
#[derive(Error, Debug)]
pub enum RailError {
    /// Simulator parameters rejected before any record was produced
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Analyzer operation invoked on zero usable records
    #[error("Empty series: {operation} needs at least one record")]
    EmptySeries { operation: &'static str },

    /// Record in the input stream failed required-field parsing
    #[error("Malformed record: {0}")]
    MalformedRecord(#[from] RecordError),

    /// Underlying file could not be opened, read or written
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RailError {
    /// True for [`RailError::Configuration`].
    pub fn is_configuration(&self) -> bool {
        matches!(self, RailError::Configuration(_))
    }

    /// True for [`RailError::EmptySeries`].
    pub fn is_empty_series(&self) -> bool {
        matches!(self, RailError::EmptySeries { .. })
    }

    /// True for [`RailError::MalformedRecord`].
    pub fn is_malformed(&self) -> bool {
        matches!(self, RailError::MalformedRecord(_))
    }
}

/// Invalid simulator configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Speed must be finite and > 0
    #[error("Speed must be positive, got {0} km/h")]
    NonPositiveSpeed(f64),

    /// Sampling interval must be finite and > 0
    #[error("Sampling interval must be positive, got {0} s")]
    NonPositiveInterval(f64),

    /// Duration must be finite and >= 0
    #[error("Duration must not be negative, got {0} h")]
    NegativeDuration(f64),

    /// Anomaly rate is a probability
    #[error("Anomaly rate must be within [0, 1], got {0}")]
    RateOutOfRange(f64),

    /// Last sample timestamp does not fit the calendar
    #[error("Run end time overflows from start {start}")]
    TimeOverflow { start: String },

    /// Height jitter distribution could not be built
    #[error("Invalid height distribution: {0}")]
    Distribution(String),
}

/// Persisted record that could not be turned into a measurement
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    /// Header lacks a required column
    #[error("Missing column: {0}")]
    MissingColumn(&'static str),

    /// Field present but not parseable
    #[error("Invalid {column} at line {line}: {value:?}")]
    InvalidField {
        line: u64,
        column: &'static str,
        value: String,
    },

    /// Field parsed but outside the range a recording car can produce
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },

    /// CSV framing error (unequal row lengths, invalid UTF-8, ...)
    #[error("CSV error at line {line}: {message}")]
    Csv { line: u64, message: String },
}
