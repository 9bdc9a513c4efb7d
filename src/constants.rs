//! Protocol constants for BriteBlox chip communication.
//!
//! These constants define the USB IDs, vendor request codes and other
//! wire-level details of the FTDI-class protocol the board speaks. Most
//! users only need [`BRITEBLOX_VID`], [`pid::BRITEBLOX`] and
//! [`BITMODE_BITBANG`].

use crate::types::BitMode;

// ---- Vendor ID and known Product IDs ----

/// Vendor ID used by BriteBlox boards (FTDI's).
pub const BRITEBLOX_VID: u16 = 0x0403;

/// Known product IDs.
pub mod pid {
    /// BriteBlox board.
    pub const BRITEBLOX: u16 = 0x7AD0;
    /// FT232AM, FT232BM, FT232R.
    pub const FT232: u16 = 0x6001;
    /// FT2232C/D/H.
    pub const FT2232: u16 = 0x6010;
    /// FT4232H.
    pub const FT4232: u16 = 0x6011;
    /// FT232H.
    pub const FT232H: u16 = 0x6014;
}

/// Product IDs matched when enumerating with a `0:0` vendor/product pair.
pub const DEFAULT_PRODUCT_IDS: [u16; 5] = [
    pid::FT232,
    pid::FT2232,
    pid::FT4232,
    pid::FT232H,
    pid::BRITEBLOX,
];

/// Standard 8-bit asynchronous bitbang.
pub const BITMODE_BITBANG: BitMode = BitMode::BitBang;

// ---- SIO vendor request codes ----

/// Reset the port.
pub(crate) const SIO_RESET_REQUEST: u8 = 0x00;
/// Set baud rate.
pub(crate) const SIO_SET_BAUDRATE_REQUEST: u8 = 0x03;
/// Set latency timer.
pub(crate) const SIO_SET_LATENCY_TIMER_REQUEST: u8 = 0x09;
/// Get latency timer.
pub(crate) const SIO_GET_LATENCY_TIMER_REQUEST: u8 = 0x0A;
/// Set bitbang mode.
pub(crate) const SIO_SET_BITMODE_REQUEST: u8 = 0x0B;
/// Read pin states directly.
pub(crate) const SIO_READ_PINS_REQUEST: u8 = 0x0C;
/// Read one EEPROM word.
pub(crate) const SIO_READ_EEPROM_REQUEST: u8 = 0x90;

// ---- Reset sub-commands ----

/// SIO reset (device reset).
pub(crate) const SIO_RESET_SIO: u16 = 0;
/// Purge RX FIFO (chip -> host direction).
pub(crate) const SIO_RESET_PURGE_RX: u16 = 1;
/// Purge TX FIFO (host -> chip direction).
pub(crate) const SIO_RESET_PURGE_TX: u16 = 2;

// ---- Clock constants for baud rate calculation ----

/// H-type clock: 120 MHz.
pub(crate) const H_CLK: u32 = 120_000_000;
/// Standard clock: 48 MHz.
pub(crate) const C_CLK: u32 = 48_000_000;
/// AM clock: 24 MHz.
pub(crate) const AM_CLK: u32 = 24_000_000;

// ---- EEPROM ----

/// Largest EEPROM any supported chip can carry (93x66), in bytes.
pub const MAX_EEPROM_SIZE: usize = 256;

/// Word addresses holding the FTDIChip-ID on R-type parts.
pub(crate) const CHIPID_WORDS: [u16; 2] = [0x43, 0x44];

/// US English, used for string descriptor reads.
pub(crate) const LANGUAGE_ID: u16 = 0x0409;
