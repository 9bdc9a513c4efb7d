//! EEPROM USB I/O: full reads into the staging area and single-word reads.

use crate::constants::*;
use crate::context::BriteBlox;
use crate::error::{Error, Result};
use crate::transport::UsbBackend;

use super::EepromImage;

impl<B: UsbBackend> BriteBlox<B> {
    /// Read the whole EEPROM into the staging area.
    ///
    /// Performs 128 two-byte control transfers, then detects the EEPROM
    /// size. The staging area is only replaced once every word has been
    /// read; a failed read leaves the previous contents in place.
    pub fn read_eeprom(&mut self) -> Result<()> {
        let chip_type = self.device()?.chip_type;

        let mut raw = [0u8; MAX_EEPROM_SIZE];
        for (addr, word) in raw.chunks_exact_mut(2).enumerate() {
            let data = self.control_in_exact(SIO_READ_EEPROM_REQUEST, addr as u16, 2)?;
            word.copy_from_slice(&data[..2]);
        }

        self.eeprom.stage(&raw, chip_type);
        Ok(())
    }

    /// Copy the first `size` staged EEPROM bytes.
    ///
    /// Fails with [`Error::SizeMismatch`] if `size` exceeds what the last
    /// [`read_eeprom`](Self::read_eeprom) staged. The staging area is
    /// never modified.
    pub fn get_eeprom_buf(&self, size: usize) -> Result<Vec<u8>> {
        let staged = self.eeprom.as_bytes();
        if size > staged.len() {
            return Err(Error::SizeMismatch {
                requested: size,
                available: staged.len(),
            });
        }
        Ok(staged[..size].to_vec())
    }

    /// Read one 16-bit word directly from the device, bypassing the
    /// staging area.
    ///
    /// `addr` is a word address. Addresses past the chip's EEPROM fail with
    /// [`Error::OutOfRange`] without touching the bus.
    pub fn read_eeprom_location(&self, addr: u16) -> Result<u16> {
        let words = (self.device()?.chip_type.eeprom_size() / 2) as u16;
        if addr >= words {
            return Err(Error::OutOfRange { addr, words });
        }
        let data = self.control_in_exact(SIO_READ_EEPROM_REQUEST, addr, 2)?;
        Ok(u16::from_le_bytes([data[0], data[1]]))
    }

    /// The EEPROM staging area.
    pub fn eeprom(&self) -> &EepromImage {
        &self.eeprom
    }
}
