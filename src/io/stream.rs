// src/io/stream.rs
//
// The Stream contract every transport implements (Arduino's Serial/Stream API).
//
// Transports provide the `*_impl` hooks; callers use the provided methods, which
// funnel every result through one reporting layer: failures come back as a
// StreamError naming the operation and are echoed to the diagnostics stream
// when the `log-errors` feature is on. Callers stay generic over `S: Stream`,
// so every call resolves to the concrete transport at compile time.

use crate::io::error::{IoError, StreamError};
use crate::io::serial::config::{SerialConfig, SERIAL_8N1};

// ============================================================================
// Constants
// ============================================================================

/// Baud rate used by `Stream::begin()`
pub const DEFAULT_BAUD_RATE: u32 = 57_600;

/// Line configuration used by `Stream::begin()`
pub const DEFAULT_CONFIG: SerialConfig = SERIAL_8N1;

// ============================================================================
// Event Callbacks
// ============================================================================

/// What an event callback can do with the transport while it runs.
///
/// Handed to the callback by reference, valid only for the duration of the call.
pub trait EventSource {
    /// Bytes readable right now; 0 on failure
    fn available(&mut self) -> usize;

    /// Next byte, or `None` when nothing is buffered
    fn read(&mut self) -> Option<u8>;

    fn write(&mut self, byte: u8) -> Result<(), IoError>;
}

/// Callback invoked whenever bytes become available.
///
/// The closure carries its own context. It runs on the transport's worker
/// thread, concurrently with the code that registered it.
pub type SerialEvent = Box<dyn FnMut(&mut dyn EventSource) + Send + 'static>;

// ============================================================================
// Stream Trait
// ============================================================================

pub trait Stream {
    fn available_impl(&mut self) -> Result<usize, IoError>;

    fn begin_impl(&mut self, speed: u32, config: SerialConfig) -> Result<(), IoError>;

    fn end_impl(&mut self) -> Result<(), IoError>;

    fn flush_impl(&mut self) -> Result<(), IoError>;

    fn read_impl(&mut self) -> Result<Option<u8>, IoError>;

    fn write_impl(&mut self, byte: u8) -> Result<(), IoError>;

    fn register_event_callback_impl(&mut self, callback: SerialEvent) -> Result<(), IoError>;

    fn is_connected_impl(&self) -> bool;

    /// Number of bytes that can be read without blocking. Failures are
    /// reported and read as 0.
    fn available(&mut self) -> usize {
        self.try_available().unwrap_or(0)
    }

    /// Like `available`, but hands the failure back
    fn try_available(&mut self) -> Result<usize, StreamError> {
        report("available", self.available_impl())
    }

    /// Open the transport at 57600 baud, 8N1
    fn begin(&mut self) -> Result<(), StreamError> {
        self.begin_with(DEFAULT_BAUD_RATE, DEFAULT_CONFIG)
    }

    /// Open the transport with an explicit baud rate and line configuration
    fn begin_with(&mut self, speed: u32, config: SerialConfig) -> Result<(), StreamError> {
        report("begin", self.begin_impl(speed, config))
    }

    /// Close the transport. Safe to call when already closed.
    fn end(&mut self) -> Result<(), StreamError> {
        report("end", self.end_impl())
    }

    /// Block until all outgoing bytes have been transmitted
    fn flush(&mut self) -> Result<(), StreamError> {
        report("flush", self.flush_impl())
    }

    /// Next incoming byte, or `None` if nothing is available.
    /// Check `available()` first to avoid the `None` case.
    fn read(&mut self) -> Result<Option<u8>, StreamError> {
        report("read", self.read_impl())
    }

    fn write(&mut self, byte: u8) -> Result<(), StreamError> {
        report("write", self.write_impl(byte))
    }

    /// Register the data-available callback. `None` registers nothing.
    /// Only one callback may be registered; later registrations are rejected.
    fn register_event_callback(&mut self, callback: Option<SerialEvent>) -> Result<(), StreamError> {
        match callback {
            Some(callback) => report(
                "registerSerialEventCallback",
                self.register_event_callback_impl(callback),
            ),
            None => Ok(()),
        }
    }

    /// Register a plain function plus the context it is called with.
    ///
    /// With `None` the context is dropped on the spot and nothing is registered.
    fn register_event_callback_with<C>(
        &mut self,
        callback: Option<fn(&mut C, &mut dyn EventSource)>,
        context: C,
    ) -> Result<(), StreamError>
    where
        Self: Sized,
        C: Send + 'static,
    {
        let Some(callback) = callback else {
            drop(context);
            return Ok(());
        };
        let mut context = context;
        self.register_event_callback(Some(Box::new(move |source: &mut dyn EventSource| {
            callback(&mut context, source)
        })))
    }

    fn is_connected(&self) -> bool {
        self.is_connected_impl()
    }
}

/// Uniform result reporting for every Stream operation
fn report<T>(operation: &'static str, result: Result<T, IoError>) -> Result<T, StreamError> {
    result.map_err(|source| {
        let err = StreamError::new(operation, source);
        #[cfg(feature = "log-errors")]
        tlog!("[stream] ERROR: {}", err);
        err
    })
}

// ============================================================================
// Tests
// ============================================================================
