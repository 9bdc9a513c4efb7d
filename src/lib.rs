//! Pure Rust control library for BriteBlox USB boards.
//!
//! BriteBlox boards are built around FTDI-class USB-serial chips. This
//! crate opens them over [nusb](https://crates.io/crates/nusb), with no C
//! dependencies or `libusb`, and drives their pins in bitbang mode, reads
//! their configuration EEPROM and chip ID, and sets up the serial port.
//!
//! # Quick Start
//!
//! ```no_run
//! use briteblox::{BriteBlox, constants::{pid, BITMODE_BITBANG, BRITEBLOX_VID}};
//!
//! let mut ctx = BriteBlox::new()?;
//! for dev in &ctx.find_all(BRITEBLOX_VID, pid::BRITEBLOX)? {
//!     println!("{:?}", ctx.get_strings(dev)?);
//! }
//!
//! ctx.open(BRITEBLOX_VID, pid::BRITEBLOX)?;
//! ctx.set_bitmode(0xFF, BITMODE_BITBANG)?;
//! ctx.write_data(0xAA)?;
//! println!("pins: {:#04x}", ctx.read_pins()?);
//! ctx.disable_bitbang()?;
//! ctx.close()?;
//! ctx.release();
//! # Ok::<(), briteblox::Error>(())
//! ```
//!
//! # Features
//!
//! - **Device discovery**: enumerate boards, read their strings, filter by
//!   serial number or description.
//! - **Bitbang**: drive and sample the eight data pins.
//! - **EEPROM**: stage the full EEPROM, verify its checksum, decode its
//!   header, or read single words.
//! - **Chip ID**: read the FTDIChip-ID of FT232R parts.
//! - **Port setup**: reset, purge, baud rate and latency timer.
//!
//! Nothing is retried internally. Every failure is returned to the caller
//! as an [`Error`], which can be classified with [`Error::kind`].
//!
//! The USB stack sits behind the [`transport::UsbBackend`] trait. The
//! `mock` feature adds `transport::mock`, a simulated chip for testing
//! without hardware.

mod baudrate;
mod bitbang;
mod chipid;
pub mod constants;
pub mod context;
pub mod device_info;
pub mod eeprom;
pub mod error;
pub mod transport;
pub mod types;
pub mod version;

// ---- Convenience re-exports ----

pub use constants::BRITEBLOX_VID;
pub use context::{BriteBlox, Options};
pub use device_info::{DeviceDescriptor, DeviceFilter, DeviceList, DeviceStrings};
pub use eeprom::{EepromHeader, EepromImage};
pub use error::{Error, ErrorKind, Result};
pub use types::*;
pub use version::{library_version, LibraryVersion, LIBRARY_VERSION};
