//! Bitbang GPIO: drive and sample the data pins directly.
//!
//! In bitbang mode each byte written to the device is latched onto the
//! pins selected as outputs by the mode mask, and [`BriteBlox::read_pins`]
//! samples the pins on demand.
//!
//! ```no_run
//! use briteblox::{BriteBlox, constants::{pid, BITMODE_BITBANG, BRITEBLOX_VID}};
//! use std::{thread, time::Duration};
//!
//! let mut ctx = BriteBlox::new()?;
//! ctx.open(BRITEBLOX_VID, pid::BRITEBLOX)?;
//! ctx.set_bitmode(0xFF, BITMODE_BITBANG)?;
//! for value in [0xFF, 0x00] {
//!     ctx.write_data(value)?;
//!     // Pacing is up to the caller.
//!     thread::sleep(Duration::from_secs(1));
//! }
//! ctx.disable_bitbang()?;
//! # Ok::<(), briteblox::Error>(())
//! ```

use crate::constants::{SIO_READ_PINS_REQUEST, SIO_SET_BITMODE_REQUEST};
use crate::context::BriteBlox;
use crate::error::{Error, Result};
use crate::transport::UsbBackend;
use crate::types::{BitMode, Mode};

impl<B: UsbBackend> BriteBlox<B> {
    /// Switch the pins into `mode`, with `mask` selecting outputs (1) and
    /// inputs (0).
    ///
    /// `BitMode::Reset` returns to normal operation. Fails with
    /// [`Error::InvalidMode`] if the detected chip cannot run `mode`.
    pub fn set_bitmode(&mut self, mask: u8, mode: BitMode) -> Result<()> {
        let chip = self.device()?.chip_type;
        if !chip.supports(mode) {
            return Err(Error::InvalidMode { mode, chip });
        }

        let value = mask as u16 | (mode.wire_value() as u16) << 8;
        self.control_out(SIO_SET_BITMODE_REQUEST, value)?;

        let dev = self.device_mut()?;
        dev.mode = match mode {
            BitMode::Reset => Mode::Normal,
            other => Mode::Bitbang(other),
        };
        log::debug!("bit mode {mode:?}, mask {mask:#04x}");
        Ok(())
    }

    /// Like [`set_bitmode`](Self::set_bitmode) with a raw mode byte.
    ///
    /// Unknown values fail with [`Error::InvalidModeValue`] before anything
    /// is sent to the device.
    pub fn set_bitmode_raw(&mut self, mask: u8, mode: u8) -> Result<()> {
        self.device()?;
        self.set_bitmode(mask, BitMode::try_from(mode)?)
    }

    /// Leave bitbang mode and return to normal operation.
    pub fn disable_bitbang(&mut self) -> Result<()> {
        self.set_bitmode(0, BitMode::Reset)
    }

    /// Drive the output pins to `value`.
    ///
    /// Fails with [`Error::BitbangDisabled`] unless a bitbang mode is
    /// active. The byte is sent immediately; no pacing is applied.
    pub fn write_data(&mut self, value: u8) -> Result<()> {
        self.write_pattern(&[value]).map(|_| ())
    }

    /// Send a sequence of pin states, clocked out at the current baud rate.
    ///
    /// Returns the number of bytes sent. Large patterns are split into
    /// transfers of the configured write chunk size.
    pub fn write_pattern(&mut self, pattern: &[u8]) -> Result<usize> {
        self.require_bitbang()?;
        self.bulk_write_all(pattern)
    }

    /// Sample the pins.
    ///
    /// Fails with [`Error::BitbangDisabled`] unless a bitbang mode is active.
    pub fn read_pins(&self) -> Result<u8> {
        self.require_bitbang()?;
        let index = self.device()?.usb_index;
        let data = self.control_in_exact(SIO_READ_PINS_REQUEST, index, 1)?;
        Ok(data[0])
    }

    fn require_bitbang(&self) -> Result<()> {
        match self.device()?.mode {
            Mode::Bitbang(_) => Ok(()),
            Mode::Normal => Err(Error::BitbangDisabled),
        }
    }
}
