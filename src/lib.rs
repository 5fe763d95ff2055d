// src/lib.rs
//
// Arduino-style serial streams for POSIX hosts.
//
//     use serial_wiring::{Stream, UartSerial, SERIAL_8N1};
//
//     let mut uart = UartSerial::new("/dev/ttyUSB0");
//     uart.begin_with(115_200, SERIAL_8N1)?;
//     uart.write(0x41)?;
//     while uart.available() > 0 {
//         let byte = uart.read()?;
//     }
//     uart.end()?;

#[macro_use]
pub mod logging;

pub mod io;
pub mod settings;

pub use io::serial::config::*;
#[cfg(unix)]
pub use io::serial::{list_serial_ports, SerialPortInfo, UartSerial};
pub use io::{
    ErrorCategory, EventSource, IoError, LoopbackStream, SerialEvent, Stream, StreamError,
};
pub use settings::{load_settings, save_settings, UartSettings};
