// src/io/serial/uart.rs
//
// UART transport: the Stream contract over a POSIX tty device.
//
// begin() walks a fixed sequence (validate, open, check tty, save termios,
// flush, configure, apply) and bails out at the first failure. The descriptor
// is an OwnedFd local until the very end, so an early return closes it and
// never leaves a half-configured device open. end() always runs to completion:
// drain, stop the poller, restore the saved termios, close.

use std::fs::OpenOptions;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, IntoRawFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;

use super::config::SerialConfig;
use super::poller::PollingWorker;
use crate::io::error::IoError;
use crate::io::stream::{EventSource, SerialEvent, Stream};

// ============================================================================
// Constants
// ============================================================================

/// Baud rates accepted by begin(), with their termios speed constants
const BAUD_RATES: [(u32, libc::speed_t); 11] = [
    (300, libc::B300),
    (600, libc::B600),
    (1_200, libc::B1200),
    (2_400, libc::B2400),
    (4_800, libc::B4800),
    (9_600, libc::B9600),
    (19_200, libc::B19200),
    (38_400, libc::B38400),
    (57_600, libc::B57600),
    (115_200, libc::B115200),
    (230_400, libc::B230400),
];

/// Find the termios speed constant for a baud rate
pub fn find_baud_rate(rate: u32) -> Result<libc::speed_t, IoError> {
    BAUD_RATES
        .iter()
        .find(|(r, _)| *r == rate)
        .map(|(_, speed)| *speed)
        .ok_or_else(|| {
            let valid: Vec<String> = BAUD_RATES.iter().map(|(r, _)| r.to_string()).collect();
            IoError::UnsupportedBaudRate {
                rate,
                valid: valid.join(", "),
            }
        })
}

/// Baud rates begin() accepts
pub fn supported_baud_rates() -> impl Iterator<Item = u32> {
    BAUD_RATES.iter().map(|(r, _)| *r)
}

// ============================================================================
// UART Transport
// ============================================================================

/// Serial transport over a tty device such as `/dev/ttyUSB0`
pub struct UartSerial {
    device_path: String,
    file_descriptor: Option<OwnedFd>,
    active_config: Option<libc::termios>,
    original_config: Option<libc::termios>,
    /// Baud rate and line configuration applied by the last successful begin
    line: Option<(u32, SerialConfig)>,
    poller: Option<PollingWorker>,
    /// Set by the first successful registration and never cleared
    callback_registered: bool,
}

impl std::fmt::Debug for UartSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UartSerial")
            .field("device_path", &self.device_path)
            .field("file_descriptor", &self.file_descriptor)
            .field("line", &self.line)
            .field("callback_registered", &self.callback_registered)
            .finish_non_exhaustive()
    }
}

impl UartSerial {
    /// Create a transport for `device`. The path is not checked until `begin`.
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device_path: device.into(),
            file_descriptor: None,
            active_config: None,
            original_config: None,
            line: None,
            poller: None,
            callback_registered: false,
        }
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    pub fn is_open(&self) -> bool {
        self.file_descriptor.is_some()
    }

    /// Whether the polling worker is alive
    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(PollingWorker::is_running)
    }

    /// Baud rate and line configuration currently applied, if open
    pub fn line_settings(&self) -> Option<(u32, SerialConfig)> {
        self.line
    }

    /// The termios applied by begin, if open
    pub fn active_termios(&self) -> Option<&libc::termios> {
        self.active_config.as_ref()
    }

    fn fd(&self) -> Option<BorrowedFd<'_>> {
        self.file_descriptor.as_ref().map(|fd| fd.as_fd())
    }

    fn open_device(&self, speed: u32, config: SerialConfig) -> Result<OpenDevice, IoError> {
        let device = self.device_path.as_str();

        if device.is_empty() {
            return Err(IoError::InvalidPath);
        }
        let baud = find_baud_rate(speed)?;
        let control_flags = config.control_flags()?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(device)
            .map_err(|source| IoError::Open {
                device: device.to_string(),
                source,
            })?;
        let fd = OwnedFd::from(file);
        let raw = fd.as_raw_fd();

        // From here on every early return drops `fd`, closing the device

        if unsafe { libc::isatty(raw) } != 1 {
            return Err(IoError::NotATerminal {
                device: device.to_string(),
            });
        }

        let mut original: libc::termios = unsafe { std::mem::zeroed() };
        if unsafe { libc::tcgetattr(raw, &mut original) } < 0 {
            return Err(IoError::termios(device, "tcgetattr"));
        }

        if unsafe { libc::tcflush(raw, libc::TCIOFLUSH) } < 0 {
            return Err(IoError::termios(device, "tcflush"));
        }

        let mut active = original;
        apply_line_config(&mut active, control_flags);

        if unsafe { libc::cfsetispeed(&mut active, baud) } < 0
            || unsafe { libc::cfsetospeed(&mut active, baud) } < 0
        {
            return Err(IoError::termios(device, "cfsetspeed"));
        }

        if unsafe { libc::tcsetattr(raw, libc::TCSANOW, &active) } < 0 {
            return Err(IoError::termios(device, "tcsetattr"));
        }

        Ok(OpenDevice {
            fd,
            original,
            active,
        })
    }
}

/// A fully configured device handed back by open_device
struct OpenDevice {
    fd: OwnedFd,
    original: libc::termios,
    active: libc::termios,
}

/// Raw, non-canonical byte stream with the given character/parity/stop bits.
///
/// Receiver on, modem lines ignored, hang up on close. VMIN = VTIME = 0 makes
/// read() return at once with whatever is buffered, possibly nothing.
fn apply_line_config(tio: &mut libc::termios, control_flags: libc::tcflag_t) {
    tio.c_iflag = 0;
    tio.c_oflag = 0;
    tio.c_lflag = 0;

    tio.c_cflag &= !(libc::CSIZE | libc::CSTOPB | libc::PARENB | libc::PARODD);
    tio.c_cflag |= control_flags;
    tio.c_cflag |= libc::CREAD | libc::CLOCAL | libc::HUPCL;

    tio.c_cc[libc::VMIN] = 0;
    tio.c_cc[libc::VTIME] = 0;
}

impl Stream for UartSerial {
    fn available_impl(&mut self) -> Result<usize, IoError> {
        match self.fd() {
            Some(fd) => bytes_available(&self.device_path, fd),
            None => Ok(0),
        }
    }

    fn begin_impl(&mut self, speed: u32, config: SerialConfig) -> Result<(), IoError> {
        if self.is_open() {
            return Err(IoError::AlreadyOpen {
                device: self.device_path.clone(),
            });
        }

        let opened = self.open_device(speed, config)?;

        self.file_descriptor = Some(opened.fd);
        self.original_config = Some(opened.original);
        self.active_config = Some(opened.active);
        self.line = Some((speed, config));

        tlog!(
            "[uart:{}] Opened at {} baud ({})",
            self.device_path,
            speed,
            config
        );
        Ok(())
    }

    fn end_impl(&mut self) -> Result<(), IoError> {
        let Some(fd) = self.file_descriptor.take() else {
            return Ok(());
        };
        let device = self.device_path.clone();
        let raw = fd.as_raw_fd();

        // Every step runs; the first failure is returned, later ones are logged
        let mut first_error: Option<IoError> = None;
        let mut record = |err: IoError| {
            if first_error.is_none() {
                first_error = Some(err);
            } else {
                tlog!("[uart:{}] {}", device, err);
            }
        };

        if unsafe { libc::tcdrain(raw) } < 0 {
            record(IoError::os_teardown(&device, "tcdrain"));
        }

        if let Some(mut poller) = self.poller.take() {
            if let Err(e) = poller.stop(&device) {
                record(e);
            }
        }

        if let Some(original) = self.original_config.take() {
            if unsafe { libc::tcsetattr(raw, libc::TCSANOW, &original) } < 0 {
                record(IoError::termios_teardown(&device, "tcsetattr"));
            }
        }
        self.active_config = None;
        self.line = None;

        if unsafe { libc::close(fd.into_raw_fd()) } < 0 {
            record(IoError::os_teardown(&device, "close"));
        }

        tlog!("[uart:{}] Closed", device);
        first_error.map_or(Ok(()), Err)
    }

    fn flush_impl(&mut self) -> Result<(), IoError> {
        let Some(fd) = self.fd() else {
            return Ok(());
        };
        if unsafe { libc::tcdrain(fd.as_raw_fd()) } < 0 {
            return Err(IoError::os(&self.device_path, "tcdrain"));
        }
        Ok(())
    }

    fn read_impl(&mut self) -> Result<Option<u8>, IoError> {
        match self.fd() {
            Some(fd) => read_byte(&self.device_path, fd),
            None => Ok(None),
        }
    }

    fn write_impl(&mut self, byte: u8) -> Result<(), IoError> {
        match self.fd() {
            Some(fd) => write_byte(&self.device_path, fd, byte),
            None => Err(IoError::not_open(&self.device_path)),
        }
    }

    fn register_event_callback_impl(&mut self, callback: SerialEvent) -> Result<(), IoError> {
        if self.callback_registered {
            return Err(IoError::CallbackAlreadyRegistered {
                device: self.device_path.clone(),
            });
        }
        let fd = self
            .fd()
            .ok_or_else(|| IoError::not_open(&self.device_path))?
            .as_raw_fd();

        let worker = PollingWorker::spawn(&self.device_path, fd, callback)?;
        self.poller = Some(worker);
        self.callback_registered = true;

        tlog!("[uart:{}] Event callback registered", self.device_path);
        Ok(())
    }

    fn is_connected_impl(&self) -> bool {
        self.is_open()
    }
}

impl Drop for UartSerial {
    fn drop(&mut self) {
        if let Err(e) = self.end_impl() {
            tlog!("[uart:{}] Error closing on drop: {}", self.device_path, e);
        }
    }
}

// ============================================================================
// Descriptor I/O
// ============================================================================

fn bytes_available(device: &str, fd: BorrowedFd<'_>) -> Result<usize, IoError> {
    let mut count: libc::c_int = 0;
    if unsafe { libc::ioctl(fd.as_raw_fd(), libc::FIONREAD, &mut count) } < 0 {
        return Err(IoError::os(device, "ioctl(FIONREAD)"));
    }
    Ok(usize::try_from(count).unwrap_or(0))
}

fn read_byte(device: &str, fd: BorrowedFd<'_>) -> Result<Option<u8>, IoError> {
    let mut byte = 0u8;
    let n = unsafe { libc::read(fd.as_raw_fd(), &mut byte as *mut u8 as *mut libc::c_void, 1) };
    match n {
        1 => Ok(Some(byte)),
        0 => Ok(None),
        _ => {
            let source = std::io::Error::last_os_error();
            if source.kind() == std::io::ErrorKind::WouldBlock {
                return Ok(None);
            }
            Err(IoError::Io {
                device: device.to_string(),
                op: "read",
                teardown: false,
                source,
            })
        }
    }
}

fn write_byte(device: &str, fd: BorrowedFd<'_>, byte: u8) -> Result<(), IoError> {
    let n = unsafe { libc::write(fd.as_raw_fd(), &byte as *const u8 as *const libc::c_void, 1) };
    match n {
        1 => Ok(()),
        0 => Err(IoError::Io {
            device: device.to_string(),
            op: "write",
            teardown: false,
            source: std::io::ErrorKind::WriteZero.into(),
        }),
        _ => Err(IoError::os(device, "write")),
    }
}

/// The device as seen from inside an event callback
pub struct DevicePort<'a> {
    device: &'a str,
    fd: BorrowedFd<'a>,
}

impl<'a> DevicePort<'a> {
    pub(crate) fn new(device: &'a str, fd: BorrowedFd<'a>) -> Self {
        Self { device, fd }
    }
}

impl EventSource for DevicePort<'_> {
    fn available(&mut self) -> usize {
        bytes_available(self.device, self.fd).unwrap_or_else(|e| {
            tlog!("[uart:{}] {}", self.device, e);
            0
        })
    }

    fn read(&mut self) -> Option<u8> {
        read_byte(self.device, self.fd).unwrap_or_else(|e| {
            tlog!("[uart:{}] {}", self.device, e);
            None
        })
    }

    fn write(&mut self, byte: u8) -> Result<(), IoError> {
        write_byte(self.device, self.fd, byte)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::error::ErrorCategory;
    use crate::io::serial::config::{SERIAL_7E2, SERIAL_8N1};

    fn temp_file(name: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("serial-wiring-{}-{}", name, std::process::id()));
        std::fs::write(&path, b"not a tty").unwrap();
        path
    }

    #[test]
    fn test_find_baud_rate() {
        assert_eq!(find_baud_rate(9_600).unwrap(), libc::B9600);
        assert_eq!(find_baud_rate(230_400).unwrap(), libc::B230400);
        let err = find_baud_rate(12_345).unwrap_err();
        assert!(err.to_string().contains("12345"));
        assert!(err.to_string().contains("115200"));
        assert_eq!(supported_baud_rates().count(), BAUD_RATES.len());
    }

    #[test]
    fn test_new_does_not_touch_device() {
        let uart = UartSerial::new("");
        assert_eq!(uart.device_path(), "");
        assert!(!uart.is_open());
        assert!(!uart.is_polling());
        assert!(uart.line_settings().is_none());
    }

    #[test]
    fn test_begin_rejects_empty_path() {
        let mut uart = UartSerial::new("");
        let err = uart.begin().unwrap_err();
        assert!(matches!(err.source, IoError::InvalidPath));
        assert!(!uart.is_open());
    }

    #[test]
    fn test_begin_nonexistent_device() {
        let mut uart = UartSerial::new("/dev/serial-wiring-does-not-exist");
        let err = uart.begin_with(9_600, SERIAL_8N1).unwrap_err();
        assert!(matches!(err.source, IoError::Open { .. }));
        assert_eq!(err.category(), ErrorCategory::Acquisition);
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));

        assert!(!uart.is_open());
        assert_eq!(uart.available(), 0);
        assert!(uart.end().is_ok());
        assert!(!uart.is_open());
    }

    #[test]
    fn test_bad_baud_rate_fails_before_open() {
        // A regular file would fail the tty check if it were ever opened
        let path = temp_file("baud");
        let mut uart = UartSerial::new(path.to_string_lossy());

        let err = uart.begin_with(12_345, SERIAL_8N1).unwrap_err();
        assert!(matches!(err.source, IoError::UnsupportedBaudRate { rate: 12_345, .. }));
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert!(!uart.is_open());

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_bad_config_fails_before_open() {
        let path = temp_file("config");
        let mut uart = UartSerial::new(path.to_string_lossy());

        let err = uart
            .begin_with(9_600, SerialConfig::from_raw(0x2300))
            .unwrap_err();
        assert!(matches!(err.source, IoError::UnrecognizedConfig(0x2300)));
        assert!(!uart.is_open());

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_begin_rejects_non_tty() {
        let path = temp_file("notty");
        let mut uart = UartSerial::new(path.to_string_lossy());

        let err = uart.begin().unwrap_err();
        assert!(matches!(err.source, IoError::NotATerminal { .. }));
        assert!(!uart.is_open());

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_closed_transport_operations() {
        let mut uart = UartSerial::new("/dev/null");
        assert_eq!(uart.available(), 0);
        assert_eq!(uart.read().unwrap(), None);
        assert!(uart.flush().is_ok());
        assert!(matches!(
            uart.write(0x41).unwrap_err().source,
            IoError::NotOpen { .. }
        ));
        assert!(!uart.is_connected());
    }

    #[test]
    fn test_end_twice_is_noop() {
        let mut uart = UartSerial::new("/dev/serial-wiring-does-not-exist");
        assert!(uart.end().is_ok());
        assert!(uart.end().is_ok());
    }

    #[test]
    fn test_register_requires_open_device() {
        let mut uart = UartSerial::new("/dev/serial-wiring-does-not-exist");
        let err = uart
            .register_event_callback(Some(Box::new(|_: &mut dyn EventSource| {})))
            .unwrap_err();
        assert!(matches!(err.source, IoError::NotOpen { .. }));
        assert!(!uart.is_polling());
    }

    #[test]
    fn test_apply_line_config() {
        let mut tio: libc::termios = unsafe { std::mem::zeroed() };
        tio.c_lflag = libc::ICANON | libc::ECHO;
        tio.c_iflag = libc::ICRNL;
        tio.c_cflag = libc::CS8 | libc::PARENB | libc::PARODD;
        tio.c_cc[libc::VMIN] = 1;
        tio.c_cc[libc::VTIME] = 10;

        apply_line_config(&mut tio, SERIAL_7E2.control_flags().unwrap());

        assert_eq!(tio.c_lflag, 0);
        assert_eq!(tio.c_iflag, 0);
        assert_eq!(tio.c_oflag, 0);
        assert_eq!(tio.c_cflag & libc::CSIZE, libc::CS7);
        assert_ne!(tio.c_cflag & libc::CSTOPB, 0);
        assert_ne!(tio.c_cflag & libc::PARENB, 0);
        assert_eq!(tio.c_cflag & libc::PARODD, 0);
        let required = libc::CREAD | libc::CLOCAL | libc::HUPCL;
        assert_eq!(tio.c_cflag & required, required);
        assert_eq!(tio.c_cc[libc::VMIN], 0);
        assert_eq!(tio.c_cc[libc::VTIME], 0);
    }
}
