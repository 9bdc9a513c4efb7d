//! EEPROM access.
//!
//! The configuration EEPROM holds the device's USB identity (vendor and
//! product ID, strings, power budget) plus chip-specific pin settings.
//! This module provides:
//!
//! - [`EepromImage`]: the context's staging area, filled by
//!   [`BriteBlox::read_eeprom`](crate::BriteBlox::read_eeprom), with size
//!   detection, checksum verification and header decoding.
//! - [`checksum`]: the EEPROM checksum over a raw image.
//! - I/O operations on [`BriteBlox`](crate::BriteBlox): full reads into
//!   the staging area and single-word reads straight from the device.

mod image;
mod io;

pub use image::{checksum, EepromHeader, EepromImage};
