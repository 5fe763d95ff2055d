// src/io/error.rs
//
// Error types for the serial I/O layer.
//
// IoError describes what went wrong inside a transport; StreamError is what the
// Stream contract hands back to callers (the failing operation plus its cause).

use thiserror::Error;

/// Broad failure class, used to decide what state the transport is left in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rejected before any OS resource was acquired; nothing changed.
    Configuration,
    /// Failed while acquiring the device; the transport is closed again.
    Acquisition,
    /// Failed while open; the transport stays open and usable.
    Operational,
    /// Failed while closing; the transport is closed anyway.
    Teardown,
}

/// Transport-level error
#[derive(Debug, Error)]
pub enum IoError {
    #[error("Invalid device path: path is empty")]
    InvalidPath,

    #[error("Unsupported baud rate {rate}. Valid rates: {valid}")]
    UnsupportedBaudRate { rate: u32, valid: String },

    #[error("Unrecognized serial configuration {0:#06x}")]
    UnrecognizedConfig(u32),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{device}: already open")]
    AlreadyOpen { device: String },

    #[error("{device}: failed to open: {source}")]
    Open {
        device: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{device}: file descriptor is not a TTY device")]
    NotATerminal { device: String },

    #[error("{device}: {op} failed: {source}")]
    Termios {
        device: String,
        op: &'static str,
        teardown: bool,
        #[source]
        source: std::io::Error,
    },

    #[error("{device}: {op} failed: {source}")]
    Io {
        device: String,
        op: &'static str,
        teardown: bool,
        #[source]
        source: std::io::Error,
    },

    #[error("{device}: not open")]
    NotOpen { device: String },

    #[error("{device}: an event callback is already registered")]
    CallbackAlreadyRegistered { device: String },

    #[error("{device}: failed to spawn polling worker: {source}")]
    WorkerSpawn {
        device: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{device}: polling worker panicked")]
    WorkerPanicked { device: String },

    #[error("Failed to enumerate ports: {0}")]
    Enumeration(String),
}

impl IoError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        IoError::Configuration(message.into())
    }

    /// Termios failure while bringing the device up, captured from errno
    pub fn termios(device: &str, op: &'static str) -> Self {
        IoError::Termios {
            device: device.to_string(),
            op,
            teardown: false,
            source: std::io::Error::last_os_error(),
        }
    }

    /// Termios failure while shutting the device down, captured from errno
    pub fn termios_teardown(device: &str, op: &'static str) -> Self {
        IoError::Termios {
            device: device.to_string(),
            op,
            teardown: true,
            source: std::io::Error::last_os_error(),
        }
    }

    /// I/O failure on an open device, captured from errno
    pub fn os(device: &str, op: &'static str) -> Self {
        IoError::Io {
            device: device.to_string(),
            op,
            teardown: false,
            source: std::io::Error::last_os_error(),
        }
    }

    /// I/O failure while closing, captured from errno
    pub fn os_teardown(device: &str, op: &'static str) -> Self {
        IoError::Io {
            device: device.to_string(),
            op,
            teardown: true,
            source: std::io::Error::last_os_error(),
        }
    }

    pub fn not_open(device: &str) -> Self {
        IoError::NotOpen {
            device: device.to_string(),
        }
    }

    /// Which failure class this error belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            IoError::InvalidPath
            | IoError::UnsupportedBaudRate { .. }
            | IoError::UnrecognizedConfig(_)
            | IoError::Configuration(_) => ErrorCategory::Configuration,
            IoError::AlreadyOpen { .. } | IoError::Open { .. } | IoError::NotATerminal { .. } => {
                ErrorCategory::Acquisition
            }
            IoError::Termios { teardown, .. } => {
                if *teardown {
                    ErrorCategory::Teardown
                } else {
                    ErrorCategory::Acquisition
                }
            }
            IoError::Io { teardown, .. } => {
                if *teardown {
                    ErrorCategory::Teardown
                } else {
                    ErrorCategory::Operational
                }
            }
            IoError::NotOpen { .. }
            | IoError::CallbackAlreadyRegistered { .. }
            | IoError::WorkerSpawn { .. }
            | IoError::Enumeration(_) => ErrorCategory::Operational,
            IoError::WorkerPanicked { .. } => ErrorCategory::Teardown,
        }
    }

    /// The OS errno behind this error, if there is one
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            IoError::Open { source, .. }
            | IoError::Termios { source, .. }
            | IoError::Io { source, .. }
            | IoError::WorkerSpawn { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}

/// Error returned by the `Stream` contract: which operation failed, and why.
#[derive(Debug, Error)]
#[error("Stream::{operation} - {source}")]
pub struct StreamError {
    pub operation: &'static str,
    #[source]
    pub source: IoError,
}

impl StreamError {
    pub fn new(operation: &'static str, source: IoError) -> Self {
        Self { operation, source }
    }

    pub fn category(&self) -> ErrorCategory {
        self.source.category()
    }

    pub fn raw_os_error(&self) -> Option<i32> {
        self.source.raw_os_error()
    }
}
