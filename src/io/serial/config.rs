// src/io/serial/config.rs
//
// Serial line configuration constants (SERIAL_8N1 and friends) and the codec
// between them and (data bits, parity, stop bits).
//
// Packed layout, least-significant bit first:
//   bits 0-7   reserved
//   bits 8-9   character size - 5
//   bit  10    two stop bits
//   bit  11    reserved
//   bit  12    parity enable
//   bit  13    parity odd
//   bits 14-15 reserved
//
// This matches the BSD/Darwin termios c_cflag layout (CS5..CS8, CSTOPB, PARENB,
// PARODD), so on those hosts a constant is handed to tcsetattr unchanged. Other
// hosts get the same fields translated onto their own bits by control_flags().

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::io::error::IoError;

// ============================================================================
// Bit Layout
// ============================================================================

const CHAR_COUNT_SHIFT: u32 = 8;
const CHAR_COUNT_MASK: u32 = 0b11 << CHAR_COUNT_SHIFT;
const STOP_BIT_2: u32 = 1 << 10;
const PARITY_ENABLE: u32 = 1 << 12;
const PARITY_ODD: u32 = 1 << 13;
const DEFINED_BITS: u32 = CHAR_COUNT_MASK | STOP_BIT_2 | PARITY_ENABLE | PARITY_ODD;

// ============================================================================
// Types
// ============================================================================

/// Parity setting for serial port configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl Parity {
    fn letter(self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        }
    }
}

/// Decoded line settings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineSettings {
    /// Character size, 5-8
    pub data_bits: u8,
    pub parity: Parity,
    /// 1 or 2
    pub stop_bits: u8,
}

/// Raw bit-field view of a configuration value. Reserved bits are ignored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SerialFlags {
    /// Character size minus 5
    pub char_count: u8,
    pub stop_bit_2: bool,
    pub parity_enable: bool,
    pub parity_odd: bool,
}

impl SerialFlags {
    pub fn from_bits(value: u32) -> Self {
        SerialFlags {
            char_count: ((value & CHAR_COUNT_MASK) >> CHAR_COUNT_SHIFT) as u8,
            stop_bit_2: value & STOP_BIT_2 != 0,
            parity_enable: value & PARITY_ENABLE != 0,
            parity_odd: value & PARITY_ODD != 0,
        }
    }

    pub fn to_bits(self) -> u32 {
        let mut value = (u32::from(self.char_count) << CHAR_COUNT_SHIFT) & CHAR_COUNT_MASK;
        if self.stop_bit_2 {
            value |= STOP_BIT_2;
        }
        if self.parity_enable {
            value |= PARITY_ENABLE;
        }
        if self.parity_odd {
            value |= PARITY_ODD;
        }
        value
    }
}

/// A serial line configuration value (one of the `SERIAL_xyz` constants)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SerialConfig(u32);

impl SerialConfig {
    /// Wrap a raw value. It is not validated here; `begin` rejects values that
    /// are not one of the 24 constants.
    pub const fn from_raw(value: u32) -> Self {
        SerialConfig(value)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub fn flags(self) -> SerialFlags {
        SerialFlags::from_bits(self.0)
    }

    pub fn settings(self) -> Result<LineSettings, IoError> {
        decode(self.0)
    }

    /// Host termios `c_cflag` bits (CSIZE | CSTOPB | PARENB | PARODD subset)
    /// for this configuration.
    #[cfg(unix)]
    pub fn control_flags(self) -> Result<libc::tcflag_t, IoError> {
        let settings = self.settings()?;

        let mut cflag = match settings.data_bits {
            5 => libc::CS5,
            6 => libc::CS6,
            7 => libc::CS7,
            _ => libc::CS8,
        };
        if settings.stop_bits == 2 {
            cflag |= libc::CSTOPB;
        }
        match settings.parity {
            Parity::None => {}
            Parity::Even => cflag |= libc::PARENB,
            Parity::Odd => cflag |= libc::PARENB | libc::PARODD,
        }
        Ok(cflag)
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        SERIAL_8N1
    }
}

impl fmt::Display for SerialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.settings() {
            Ok(s) => write!(f, "{}{}{}", s.data_bits, s.parity.letter(), s.stop_bits),
            Err(_) => write!(f, "{:#06x}", self.0),
        }
    }
}

impl FromStr for SerialConfig {
    type Err = IoError;

    /// Parses "8N1", "7e2", "8-N-1" and the like
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: Vec<char> = s
            .trim()
            .chars()
            .filter(|c| *c != '-')
            .map(|c| c.to_ascii_uppercase())
            .collect();

        let invalid = || IoError::configuration(format!("Invalid serial configuration '{}'", s));

        let [bits, parity, stop] = compact.as_slice() else {
            return Err(invalid());
        };
        let data_bits = bits.to_digit(10).ok_or_else(invalid)? as u8;
        let stop_bits = stop.to_digit(10).ok_or_else(invalid)? as u8;
        let parity = match *parity {
            'N' => Parity::None,
            'E' => Parity::Even,
            'O' => Parity::Odd,
            _ => return Err(invalid()),
        };
        encode(data_bits, parity, stop_bits)
    }
}

// ============================================================================
// Constants
// ============================================================================

pub const SERIAL_5N1: SerialConfig = SerialConfig(0x0000);
pub const SERIAL_5N2: SerialConfig = SerialConfig(0x0400);
pub const SERIAL_5E1: SerialConfig = SerialConfig(0x1000);
pub const SERIAL_5E2: SerialConfig = SerialConfig(0x1400);
pub const SERIAL_5O1: SerialConfig = SerialConfig(0x3000);
pub const SERIAL_5O2: SerialConfig = SerialConfig(0x3400);
pub const SERIAL_6N1: SerialConfig = SerialConfig(0x0100);
pub const SERIAL_6N2: SerialConfig = SerialConfig(0x0500);
pub const SERIAL_6E1: SerialConfig = SerialConfig(0x1100);
pub const SERIAL_6E2: SerialConfig = SerialConfig(0x1500);
pub const SERIAL_6O1: SerialConfig = SerialConfig(0x3100);
pub const SERIAL_6O2: SerialConfig = SerialConfig(0x3500);
pub const SERIAL_7N1: SerialConfig = SerialConfig(0x0200);
pub const SERIAL_7N2: SerialConfig = SerialConfig(0x0600);
pub const SERIAL_7E1: SerialConfig = SerialConfig(0x1200);
pub const SERIAL_7E2: SerialConfig = SerialConfig(0x1600);
pub const SERIAL_7O1: SerialConfig = SerialConfig(0x3200);
pub const SERIAL_7O2: SerialConfig = SerialConfig(0x3600);
pub const SERIAL_8N1: SerialConfig = SerialConfig(0x0300);
pub const SERIAL_8N2: SerialConfig = SerialConfig(0x0700);
pub const SERIAL_8E1: SerialConfig = SerialConfig(0x1300);
pub const SERIAL_8E2: SerialConfig = SerialConfig(0x1700);
pub const SERIAL_8O1: SerialConfig = SerialConfig(0x3300);
pub const SERIAL_8O2: SerialConfig = SerialConfig(0x3700);

// ============================================================================
// Codec
// ============================================================================

/// Build the configuration constant for the given line settings
pub fn encode(data_bits: u8, parity: Parity, stop_bits: u8) -> Result<SerialConfig, IoError> {
    if !(5..=8).contains(&data_bits) {
        return Err(IoError::configuration(format!(
            "Invalid data bits {}. Valid: 5, 6, 7, 8",
            data_bits
        )));
    }
    if !(1..=2).contains(&stop_bits) {
        return Err(IoError::configuration(format!(
            "Invalid stop bits {}. Valid: 1, 2",
            stop_bits
        )));
    }

    let flags = SerialFlags {
        char_count: data_bits - 5,
        stop_bit_2: stop_bits == 2,
        parity_enable: parity != Parity::None,
        parity_odd: parity == Parity::Odd,
    };
    Ok(SerialConfig(flags.to_bits()))
}

/// Decode a configuration value. Anything that is not exactly one of the 24
/// `SERIAL_xyz` constants is rejected.
pub fn decode(value: u32) -> Result<LineSettings, IoError> {
    if value & !DEFINED_BITS != 0 {
        return Err(IoError::UnrecognizedConfig(value));
    }

    let flags = SerialFlags::from_bits(value);
    let parity = match (flags.parity_enable, flags.parity_odd) {
        (false, false) => Parity::None,
        (true, false) => Parity::Even,
        (true, true) => Parity::Odd,
        // Odd without enable has no meaning
        (false, true) => return Err(IoError::UnrecognizedConfig(value)),
    };

    Ok(LineSettings {
        data_bits: flags.char_count + 5,
        parity,
        stop_bits: if flags.stop_bit_2 { 2 } else { 1 },
    })
}

// ============================================================================
// Tests
// ============================================================================
