//! Type definitions for BriteBlox chip communication.
//!
//! These types model the chip variants, bitbang modes, port interfaces and
//! the lifecycle of a [`BriteBlox`](crate::BriteBlox) context.

use crate::error::{Error, Result};

/// Supported FTDI-class chip types.
///
/// The chip type is auto-detected when a device is opened, based on the
/// USB `bcdDevice` descriptor field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChipType {
    /// Original chip (FT8U232AM).
    Am,
    /// B-type chip (FT232BM, FT245BM).
    Bm,
    /// Dual-port chip (FT2232C/D/L).
    Ft2232C,
    /// FT232R / FT245R.
    Ft232R,
    /// Dual hi-speed chip (FT2232H).
    Ft2232H,
    /// Quad-port chip (FT4232H).
    Ft4232H,
    /// Single hi-speed chip (FT232H).
    Ft232H,
    /// FT230X / FT231X / FT234XD.
    Ft230X,
}

impl ChipType {
    /// Guess the chip type from the device's `bcdDevice` value.
    ///
    /// B-type chips report 0x0200 when no serial number is programmed,
    /// so `has_serial` is needed to tell them from AM parts. Unknown
    /// release numbers fall back to [`ChipType::Bm`].
    pub fn from_release_number(bcd: u16, has_serial: bool) -> Self {
        match bcd {
            0x0400 => Self::Bm,
            0x0200 if !has_serial => Self::Bm,
            0x0200 => Self::Am,
            0x0500 => Self::Ft2232C,
            0x0600 => Self::Ft232R,
            0x0700 => Self::Ft2232H,
            0x0800 => Self::Ft4232H,
            0x0900 => Self::Ft232H,
            0x1000 => Self::Ft230X,
            _ => Self::Bm,
        }
    }

    /// Whether this is an H-type (hi-speed) chip.
    #[inline]
    pub fn is_h_type(self) -> bool {
        matches!(self, Self::Ft2232H | Self::Ft4232H | Self::Ft232H)
    }

    /// Default bulk packet size when the descriptor cannot be read.
    pub(crate) fn default_packet_size(self) -> usize {
        if self.is_h_type() {
            512
        } else {
            64
        }
    }

    /// Size in bytes of the EEPROM this chip can address.
    ///
    /// R-type parts carry a 128-byte internal EEPROM; every other chip can
    /// be wired to a 93x66 part of up to 256 bytes.
    pub fn eeprom_size(self) -> usize {
        match self {
            Self::Ft232R => 0x80,
            _ => crate::constants::MAX_EEPROM_SIZE,
        }
    }

    /// Whether this chip can run the given bit mode.
    pub fn supports(self, mode: BitMode) -> bool {
        use BitMode::*;
        match mode {
            Reset => true,
            BitBang => self != Self::Am,
            SyncBB => !matches!(self, Self::Am | Self::Bm),
            Mpsse => matches!(
                self,
                Self::Ft2232C | Self::Ft2232H | Self::Ft4232H | Self::Ft232H
            ),
            Mcu | Opto => matches!(self, Self::Ft2232C | Self::Ft2232H | Self::Ft232H),
            Cbus => matches!(self, Self::Ft232R | Self::Ft232H | Self::Ft230X),
            SyncFf => matches!(self, Self::Ft2232H | Self::Ft232H),
            Ft1284 => self == Self::Ft232H,
        }
    }
}

/// Bitbang / MPSSE mode selection.
///
/// Used with [`BriteBlox::set_bitmode`](crate::BriteBlox::set_bitmode).
/// New modes may be added without breaking callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum BitMode {
    /// Normal serial/FIFO mode (bitbang disabled).
    #[default]
    Reset,
    /// Asynchronous 8-bit bitbang mode.
    BitBang,
    /// MPSSE mode (FT2232x and later).
    Mpsse,
    /// Synchronous bitbang mode (FT2232x, FT232R and later).
    SyncBB,
    /// MCU host bus emulation mode.
    Mcu,
    /// Fast opto-isolated serial mode.
    Opto,
    /// CBUS bitbang mode (configure in EEPROM first).
    Cbus,
    /// Synchronous FIFO mode.
    SyncFf,
    /// FT1284 mode (FT232H).
    Ft1284,
}

impl BitMode {
    /// Wire value for the SIO_SET_BITMODE request.
    pub fn wire_value(self) -> u8 {
        match self {
            Self::Reset => 0x00,
            Self::BitBang => 0x01,
            Self::Mpsse => 0x02,
            Self::SyncBB => 0x04,
            Self::Mcu => 0x08,
            Self::Opto => 0x10,
            Self::Cbus => 0x20,
            Self::SyncFf => 0x40,
            Self::Ft1284 => 0x80,
        }
    }
}

impl TryFrom<u8> for BitMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0x00 => Self::Reset,
            0x01 => Self::BitBang,
            0x02 => Self::Mpsse,
            0x04 => Self::SyncBB,
            0x08 => Self::Mcu,
            0x10 => Self::Opto,
            0x20 => Self::Cbus,
            0x40 => Self::SyncFf,
            0x80 => Self::Ft1284,
            other => return Err(Error::InvalidModeValue(other)),
        })
    }
}

/// Operating mode of an open device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// UART / FIFO operation.
    #[default]
    Normal,
    /// Pins are driven and sampled directly in the given bit mode.
    Bitbang(BitMode),
}

/// Lifecycle state of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceState {
    /// Created, never opened.
    Uninitialized,
    /// A device is open.
    Open,
    /// The device was closed; device operations fail until reopened.
    Closed,
}

/// Port interface selection for multi-interface chips.
///
/// Chips like the FT2232H (dual) and FT4232H (quad) expose multiple
/// independent interfaces. Select which one to use before opening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Interface {
    /// Use the first available interface (same as `A`).
    #[default]
    Any,
    /// Interface A (port 0).
    A,
    /// Interface B (port 1).
    B,
    /// Interface C (port 2, FT4232H only).
    C,
    /// Interface D (port 3, FT4232H only).
    D,
}

/// Interface configuration resolved to concrete USB endpoint values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceConfig {
    /// The USB interface number (0-based).
    pub interface_num: u8,
    /// The USB index value used in control transfers (1-based).
    pub usb_index: u16,
    /// The bulk OUT endpoint address (host-to-device).
    pub write_ep: u8,
    /// The bulk IN endpoint address (device-to-host).
    pub read_ep: u8,
}

impl Interface {
    /// Resolve to concrete USB endpoint configuration.
    pub fn config(self) -> InterfaceConfig {
        let (interface_num, write_ep, read_ep) = match self {
            Self::Any | Self::A => (0, 0x02, 0x81),
            Self::B => (1, 0x04, 0x83),
            Self::C => (2, 0x06, 0x85),
            Self::D => (3, 0x08, 0x87),
        };
        InterfaceConfig {
            interface_num,
            usb_index: interface_num as u16 + 1,
            write_ep,
            read_ep,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmode_raw_round_trips() {
        for mode in [
            BitMode::Reset,
            BitMode::BitBang,
            BitMode::Mpsse,
            BitMode::SyncBB,
            BitMode::Mcu,
            BitMode::Opto,
            BitMode::Cbus,
            BitMode::SyncFf,
            BitMode::Ft1284,
        ] {
            assert_eq!(BitMode::try_from(mode.wire_value()).unwrap(), mode);
        }
    }

    #[test]
    fn bitmode_rejects_unknown_values() {
        for raw in [0x03u8, 0x05, 0x11, 0xFF] {
            assert!(matches!(
                BitMode::try_from(raw),
                Err(Error::InvalidModeValue(v)) if v == raw
            ));
        }
    }

    #[test]
    fn chip_detection_bm_quirk() {
        assert_eq!(ChipType::from_release_number(0x0200, false), ChipType::Bm);
        assert_eq!(ChipType::from_release_number(0x0200, true), ChipType::Am);
        assert_eq!(ChipType::from_release_number(0x0600, true), ChipType::Ft232R);
        assert_eq!(ChipType::from_release_number(0x1234, true), ChipType::Bm);
    }

    #[test]
    fn interface_endpoints() {
        let b = Interface::B.config();
        assert_eq!(b.interface_num, 1);
        assert_eq!(b.usb_index, 2);
        assert_eq!((b.write_ep, b.read_ep), (0x04, 0x83));
        assert_eq!(Interface::Any.config(), Interface::A.config());
    }

    #[test]
    fn am_cannot_bitbang() {
        assert!(!ChipType::Am.supports(BitMode::BitBang));
        assert!(ChipType::Am.supports(BitMode::Reset));
        assert!(ChipType::Ft232R.supports(BitMode::BitBang));
        assert!(!ChipType::Ft232R.supports(BitMode::Mpsse));
    }
}
