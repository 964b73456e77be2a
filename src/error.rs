//! Error types for probe-file parsing and service scanning
//!
//! Provides structured error types with contextual information for:
//! - Probe file parse failures (structural errors abort, rule errors do not)
//! - Catalogue persistence (export/load) failures
//! - Network errors during a probe exchange (dial, handshake, write, read)
//! - Scan outcomes where no probe or no service could be determined

use std::io;
use thiserror::Error;

/// Main result type used throughout the crate
pub type Result<T> = std::result::Result<T, VscanError>;

/// Error enum covering all failure modes of the parser, the catalogue
/// store, and the probing engine
#[derive(Error, Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum VscanError {
    /// Structural probe-file errors; parsing aborts
    #[error("parse error on service probe file: {message}")]
    Parse { message: String },

    /// A serialized catalogue document that cannot be reconstructed
    #[error("catalogue format error: {message}")]
    Format { message: String },

    /// File I/O failures, surfaced verbatim
    #[error("IO error: {operation} - {message}")]
    Io { operation: String, message: String },

    /// Exporting a catalogue over an existing file is refused
    #[error("file already exists")]
    FileExists { path: String },

    /// Configuration loading or validation errors
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Invalid caller-supplied values
    #[error("validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Network connectivity and protocol errors during a probe attempt
    #[error("network error: {message}")]
    Network { message: String },

    /// Deadline expiry on dial, handshake, write or read
    #[error("timeout: {operation} after {duration_secs}s")]
    Timeout {
        operation: String,
        duration_secs: u64,
    },

    /// The selection filter left nothing to send
    #[error("no probes used")]
    NoProbes,

    /// Every selected probe completed without producing response bytes
    #[error("no valid service is identified")]
    NoIdentification,
}

impl VscanError {
    /// Create a parse error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create a catalogue format error
    pub fn format<S: Into<String>>(message: S) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    /// Create an IO error
    pub fn io<O: Into<String>, M: Into<String>>(operation: O, message: M) -> Self {
        Self::Io {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<O: Into<String>>(operation: O, duration_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration_secs,
        }
    }

    /// Check if the error is recoverable from the probe loop's point of
    /// view: the current attempt aborts but iteration continues
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. })
    }

    /// Check if the error is a structural parse or format issue
    pub fn is_format_error(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::Format { .. })
    }
}

// Implement conversions from common error types
impl From<io::Error> for VscanError {
    fn from(error: io::Error) -> Self {
        Self::io("IO operation", error.to_string())
    }
}

impl From<serde_json::Error> for VscanError {
    fn from(error: serde_json::Error) -> Self {
        Self::format(error.to_string())
    }
}

impl From<config::ConfigError> for VscanError {
    fn from(error: config::ConfigError) -> Self {
        Self::config(error.to_string())
    }
}
