// src/io/serial/poller.rs
//
// Background worker that watches a UART descriptor for readable data and runs
// the registered event callback on its own thread.
//
// The worker only ever reads the descriptor value it was given. The owning
// UartSerial keeps the descriptor open until stop() has joined the thread.

use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::uart::DevicePort;
use crate::io::error::IoError;
use crate::io::stream::SerialEvent;

/// poll() timeout for each loop iteration
pub const POLL_TIMEOUT_MS: libc::c_int = 5;

const POLL_INTERVAL: Duration = Duration::from_millis(POLL_TIMEOUT_MS as u64);

/// Owned, joinable polling thread
pub struct PollingWorker {
    polling: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PollingWorker {
    /// Start polling `fd`. The caller must keep `fd` open until `stop` returns.
    pub(crate) fn spawn(device: &str, fd: RawFd, callback: SerialEvent) -> Result<Self, IoError> {
        let polling = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&polling);
        let device_name = device.to_string();

        let handle = thread::Builder::new()
            .name("uart-poll".to_string())
            .spawn(move || poll_for_serial_data(device_name, fd, flag, callback))
            .map_err(|source| IoError::WorkerSpawn {
                device: device.to_string(),
                source,
            })?;

        Ok(Self {
            polling,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the worker and wait for it to exit
    pub(crate) fn stop(&mut self, device: &str) -> Result<(), IoError> {
        self.polling.store(false, Ordering::Release);
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| IoError::WorkerPanicked {
                device: device.to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl Drop for PollingWorker {
    fn drop(&mut self) {
        self.polling.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn poll_for_serial_data(
    device: String,
    raw_fd: RawFd,
    polling: Arc<AtomicBool>,
    mut callback: SerialEvent,
) {
    // SAFETY: the owning UartSerial closes the descriptor only after joining this thread
    let fd = unsafe { BorrowedFd::borrow_raw(raw_fd) };
    let mut pollfd = libc::pollfd {
        fd: fd.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };

    // Set once the device reports hangup or error; cleared if it recovers
    let mut hung_up = false;

    while polling.load(Ordering::Acquire) {
        pollfd.revents = 0;
        let rc = unsafe { libc::poll(&mut pollfd, 1, POLL_TIMEOUT_MS) };

        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() != std::io::ErrorKind::Interrupted {
                tlog!("[uart:{}] poll() failed: {}", device, err);
                thread::sleep(POLL_INTERVAL);
            }
            continue;
        }

        let readable = rc > 0 && pollfd.revents & libc::POLLIN != 0;

        // A hung-up descriptor polls ready forever. Hand any final bytes to
        // the callback once, then idle at the poll interval.
        if rc > 0 && pollfd.revents & (libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) != 0 {
            if !hung_up {
                hung_up = true;
                tlog!(
                    "[uart:{}] Device hung up (revents {:#x}), callback suspended",
                    device,
                    pollfd.revents
                );
                if readable {
                    let mut port = DevicePort::new(&device, fd);
                    callback(&mut port);
                }
            }
            thread::sleep(POLL_INTERVAL);
            continue;
        }
        if hung_up {
            hung_up = false;
            tlog!("[uart:{}] Device recovered, callback resumed", device);
        }

        if readable {
            let mut port = DevicePort::new(&device, fd);
            callback(&mut port);
        } else {
            // Release control back to the scheduler
            thread::yield_now();
        }
    }
}
