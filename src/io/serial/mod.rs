// src/io/serial/mod.rs
//
// UART transport for POSIX hosts.
//
// - config: line configuration codec (the SERIAL_xyz constants)
// - uart: Stream implementation over a tty device
// - poller: background worker driving the event callback
// - ports: enumeration of the host's serial devices

pub mod config;
#[cfg(unix)]
mod poller;
#[cfg(unix)]
pub mod ports;
#[cfg(unix)]
pub mod uart;

pub use config::{decode, encode, LineSettings, Parity, SerialConfig, SerialFlags};
pub use config::{
    SERIAL_5E1, SERIAL_5E2, SERIAL_5N1, SERIAL_5N2, SERIAL_5O1, SERIAL_5O2, SERIAL_6E1,
    SERIAL_6E2, SERIAL_6N1, SERIAL_6N2, SERIAL_6O1, SERIAL_6O2, SERIAL_7E1, SERIAL_7E2,
    SERIAL_7N1, SERIAL_7N2, SERIAL_7O1, SERIAL_7O2, SERIAL_8E1, SERIAL_8E2, SERIAL_8N1,
    SERIAL_8N2, SERIAL_8O1, SERIAL_8O2,
};

#[cfg(unix)]
pub use poller::POLL_TIMEOUT_MS;
#[cfg(unix)]
pub use ports::{list_serial_ports, SerialPortInfo};
#[cfg(unix)]
pub use uart::{find_baud_rate, supported_baud_rates, DevicePort, UartSerial};
