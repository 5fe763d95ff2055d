// src/io/mod.rs
//
// Byte-stream I/O layer: the Stream contract, its error types, and the
// transports implementing it (a POSIX UART and an in-memory loopback).

pub mod error;
pub mod loopback;
pub mod serial;
pub mod stream;

pub use error::{ErrorCategory, IoError, StreamError};
pub use loopback::LoopbackStream;
pub use stream::{EventSource, SerialEvent, Stream, DEFAULT_BAUD_RATE, DEFAULT_CONFIG};
