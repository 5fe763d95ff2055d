// src/io/loopback.rs
//
// In-memory transport: every byte written becomes readable again, and the
// registered event callback fires as bytes arrive. Handy for exercising code
// written against the Stream contract without a serial device.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::io::error::IoError;
use crate::io::serial::config::SerialConfig;
use crate::io::stream::{EventSource, SerialEvent, Stream};

/// Device name used in errors and log lines
const DEVICE: &str = "loopback";

/// Loopback transport. Clones share the same buffer, so a clone can play the
/// far end of the link.
#[derive(Clone, Default)]
pub struct LoopbackStream {
    inner: Arc<Mutex<LoopbackInner>>,
}

#[derive(Default)]
struct LoopbackInner {
    buffer: VecDeque<u8>,
    line: Option<(u32, SerialConfig)>,
    callback: Option<SerialEvent>,
    callback_registered: bool,
}

impl LoopbackInner {
    fn is_open(&self) -> bool {
        self.line.is_some()
    }
}

/// Lock the shared state. No lock is held while a callback runs, so poisoning
/// only follows a panic inside this module; the buffer stays consistent either way.
fn lock_inner(inner: &Mutex<LoopbackInner>) -> MutexGuard<'_, LoopbackInner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

impl LoopbackStream {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LoopbackInner> {
        lock_inner(&self.inner)
    }

    /// Bytes arriving from the far end. Ignored while closed.
    pub fn inject(&self, data: &[u8]) {
        self.deliver(data);
    }

    /// Baud rate and line configuration given to the last successful begin
    pub fn line_settings(&self) -> Option<(u32, SerialConfig)> {
        self.lock().line
    }

    /// Queue bytes, then run the callback with the lock released so it may use
    /// any clone of this stream. Returns false when closed.
    ///
    /// While the callback runs it is checked out of the shared state: bytes
    /// delivered meanwhile (from the callback itself or another thread) are
    /// queued without a second invocation.
    fn deliver(&self, data: &[u8]) -> bool {
        let callback = {
            let mut inner = self.lock();
            if !inner.is_open() {
                return false;
            }
            inner.buffer.extend(data);
            inner.callback.take()
        };

        if let Some(mut callback) = callback {
            callback(&mut LoopbackPort { inner: &self.inner });

            // end() during the callback drops it
            let mut inner = self.lock();
            if inner.is_open() && inner.callback.is_none() {
                inner.callback = Some(callback);
            }
        }
        true
    }
}

impl Stream for LoopbackStream {
    fn available_impl(&mut self) -> Result<usize, IoError> {
        Ok(self.lock().buffer.len())
    }

    fn begin_impl(&mut self, speed: u32, config: SerialConfig) -> Result<(), IoError> {
        let mut inner = self.lock();
        if inner.is_open() {
            return Err(IoError::AlreadyOpen {
                device: DEVICE.to_string(),
            });
        }
        if speed == 0 {
            return Err(IoError::configuration("baud rate must be non-zero"));
        }
        config.settings()?;

        inner.buffer.clear();
        inner.line = Some((speed, config));
        tlog!("[{}] Opened at {} baud ({})", DEVICE, speed, config);
        Ok(())
    }

    fn end_impl(&mut self) -> Result<(), IoError> {
        let mut inner = self.lock();
        if inner.line.take().is_some() {
            inner.buffer.clear();
            inner.callback = None;
            tlog!("[{}] Closed", DEVICE);
        }
        Ok(())
    }

    fn flush_impl(&mut self) -> Result<(), IoError> {
        Ok(())
    }

    fn read_impl(&mut self) -> Result<Option<u8>, IoError> {
        Ok(self.lock().buffer.pop_front())
    }

    fn write_impl(&mut self, byte: u8) -> Result<(), IoError> {
        if !self.deliver(&[byte]) {
            return Err(IoError::not_open(DEVICE));
        }
        Ok(())
    }

    fn register_event_callback_impl(&mut self, callback: SerialEvent) -> Result<(), IoError> {
        let mut inner = self.lock();
        if inner.callback_registered {
            return Err(IoError::CallbackAlreadyRegistered {
                device: DEVICE.to_string(),
            });
        }
        if !inner.is_open() {
            return Err(IoError::not_open(DEVICE));
        }
        inner.callback = Some(callback);
        inner.callback_registered = true;
        Ok(())
    }

    fn is_connected_impl(&self) -> bool {
        self.lock().is_open()
    }
}

/// Shared-state view handed to the callback
struct LoopbackPort<'a> {
    inner: &'a Mutex<LoopbackInner>,
}

impl EventSource for LoopbackPort<'_> {
    fn available(&mut self) -> usize {
        lock_inner(self.inner).buffer.len()
    }

    fn read(&mut self) -> Option<u8> {
        lock_inner(self.inner).buffer.pop_front()
    }

    /// Echoed bytes are queued but do not re-enter the callback
    fn write(&mut self, byte: u8) -> Result<(), IoError> {
        let mut inner = lock_inner(self.inner);
        if !inner.is_open() {
            return Err(IoError::not_open(DEVICE));
        }
        inner.buffer.push_back(byte);
        Ok(())
    }
}
