//! FTDIChip-ID readout for R-type parts.

use crate::constants::{CHIPID_WORDS, SIO_READ_EEPROM_REQUEST};
use crate::context::BriteBlox;
use crate::error::{Error, Result};
use crate::transport::UsbBackend;
use crate::types::ChipType;

const CHIPID_XOR: u32 = 0xA5F0_F7D1;

impl<B: UsbBackend> BriteBlox<B> {
    /// Read the 32-bit chip identifier burned into the silicon.
    ///
    /// Works in any mode but needs an open device. Only the FT232R family
    /// carries an ID; other chips fail with [`Error::UnsupportedChip`].
    pub fn read_chipid(&self) -> Result<u32> {
        let dev = self.device()?;
        if dev.chip_type != ChipType::Ft232R {
            return Err(Error::UnsupportedChip(dev.chip_type));
        }

        let [hi, lo] = CHIPID_WORDS;
        let a = self.control_in_exact(SIO_READ_EEPROM_REQUEST, hi, 2)?;
        let b = self.control_in_exact(SIO_READ_EEPROM_REQUEST, lo, 2)?;
        let id = decode_chipid([a[0], a[1]], [b[0], b[1]]);
        log::debug!("chip id {id:#010x}");
        Ok(id)
    }
}

/// Turn the two raw words into the chip ID.
fn decode_chipid(a: [u8; 2], b: [u8; 2]) -> u32 {
    // Each word is byte-swapped relative to the usual little-endian read.
    let raw = (u16::from_be_bytes(a) as u32) << 16 | u16::from_be_bytes(b) as u32;
    let permuted = u32::from_le_bytes(raw.to_le_bytes().map(chipid_shift));
    permuted ^ CHIPID_XOR
}

/// Bit permutation applied to each byte of the raw ID.
fn chipid_shift(v: u8) -> u8 {
    ((v & 1) << 1)
        | ((v & 2) << 5)
        | ((v & 4) >> 2)
        | ((v & 8) << 4)
        | ((v & 16) >> 1)
        | ((v & 32) >> 1)
        | ((v & 64) >> 4)
        | ((v & 128) >> 2)
}
