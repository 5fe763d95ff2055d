// src/io/serial/ports.rs
//
// Enumeration of the serial devices present on the host, for picking a path
// to hand to UartSerial::new.

use serde::Serialize;

use crate::io::error::IoError;

/// Information about an available serial port
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub port_type: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

impl From<serialport::SerialPortInfo> for SerialPortInfo {
    fn from(p: serialport::SerialPortInfo) -> Self {
        let (port_type, manufacturer, product, serial_number, vid, pid) = match p.port_type {
            serialport::SerialPortType::UsbPort(info) => (
                "USB",
                info.manufacturer,
                info.product,
                info.serial_number,
                Some(info.vid),
                Some(info.pid),
            ),
            serialport::SerialPortType::BluetoothPort => ("Bluetooth", None, None, None, None, None),
            serialport::SerialPortType::PciPort => ("PCI", None, None, None, None, None),
            serialport::SerialPortType::Unknown => ("Unknown", None, None, None, None, None),
        };
        SerialPortInfo {
            port_name: p.port_name,
            port_type: port_type.to_string(),
            manufacturer,
            product,
            serial_number,
            vid,
            pid,
        }
    }
}

/// Whether a device node should be offered to callers.
///
/// On macOS only the `/dev/cu.*` (calling unit) nodes are listed; the
/// `/dev/tty.*` twins block on open until carrier detect.
fn is_listed(port_name: &str) -> bool {
    if cfg!(target_os = "macos") {
        !port_name.starts_with("/dev/tty.")
    } else {
        true
    }
}

/// List serial ports present on the host
pub fn list_serial_ports() -> Result<Vec<SerialPortInfo>, IoError> {
    let ports =
        serialport::available_ports().map_err(|e| IoError::Enumeration(e.to_string()))?;

    Ok(ports
        .into_iter()
        .filter(|p| is_listed(&p.port_name))
        .map(SerialPortInfo::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::error::ErrorCategory;

    #[test]
    fn test_non_usb_ports_have_no_usb_details() {
        let info = SerialPortInfo::from(serialport::SerialPortInfo {
            port_name: "/dev/ttyS0".to_string(),
            port_type: serialport::SerialPortType::PciPort,
        });
        assert_eq!(info.port_name, "/dev/ttyS0");
        assert_eq!(info.port_type, "PCI");
        assert_eq!(info.vid, None);
        assert_eq!(info.manufacturer, None);

        let info = SerialPortInfo::from(serialport::SerialPortInfo {
            port_name: "/dev/rfcomm0".to_string(),
            port_type: serialport::SerialPortType::BluetoothPort,
        });
        assert_eq!(info.port_type, "Bluetooth");
    }

    #[test]
    fn test_port_info_json() {
        let info = SerialPortInfo::from(serialport::SerialPortInfo {
            port_name: "/dev/ttyS1".to_string(),
            port_type: serialport::SerialPortType::Unknown,
        });
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["port_name"], "/dev/ttyS1");
        assert_eq!(json["port_type"], "Unknown");
        assert!(json["vid"].is_null());
    }

    #[test]
    fn test_calling_unit_filter() {
        assert!(is_listed("/dev/ttyUSB0") || cfg!(target_os = "macos"));
        assert!(is_listed("/dev/cu.usbserial-1420"));
        assert_eq!(
            is_listed("/dev/tty.usbserial-1420"),
            !cfg!(target_os = "macos")
        );
    }

    #[test]
    fn test_list_serial_ports_does_not_panic() {
        // Hosts without serial hardware return an empty list or an enumeration error
        match list_serial_ports() {
            Ok(ports) => assert!(ports.iter().all(|p| !p.port_name.is_empty())),
            Err(e) => assert_eq!(e.category(), ErrorCategory::Operational),
        }
    }
}
