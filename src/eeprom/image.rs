//! EEPROM staging area, size detection and header decoding.

use crate::constants::MAX_EEPROM_SIZE;
use crate::error::Result;
use crate::types::ChipType;

/// Compute the EEPROM checksum over the first `size` bytes of `buf`.
///
/// Every 16-bit little-endian word except the last (which stores the
/// checksum itself) is XORed into an accumulator seeded with `0xAAAA`,
/// which is then rotated left by one. FT230X parts keep a user area at
/// words `0x12..0x40` that is left out.
///
/// ```
/// let mut image = [0u8; 128];
/// let csum = briteblox::eeprom::checksum(&image, 128, false);
/// image[126..].copy_from_slice(&csum.to_le_bytes());
/// assert_eq!(briteblox::eeprom::checksum(&image, 128, false), csum);
/// ```
pub fn checksum(buf: &[u8], size: usize, is_230x: bool) -> u16 {
    let words = (size.min(buf.len()) / 2).saturating_sub(1);
    (0..words)
        .filter(|&i| !(is_230x && (0x12..0x40).contains(&i)))
        .fold(0xAAAAu16, |csum, i| {
            let word = u16::from_le_bytes([buf[i * 2], buf[i * 2 + 1]]);
            (csum ^ word).rotate_left(1)
        })
}

/// Size detection result for a raw 256-byte read.
fn detect_size(buf: &[u8], chip_type: ChipType) -> (usize, bool) {
    if chip_type == ChipType::Ft232R {
        return (0x80, false);
    }
    // Smaller parts wrap around, so their contents repeat across the
    // 256-byte address space.
    if buf.iter().all(|&b| b == 0xFF) {
        (MAX_EEPROM_SIZE, true)
    } else if buf[..0x80] == buf[0x80..0x100] {
        (0x80, false)
    } else if buf[..0x40] == buf[0x40..0x80] {
        (0x40, false)
    } else {
        (0x100, false)
    }
}

/// Fields decoded from the common EEPROM header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EepromHeader {
    /// USB vendor ID the device enumerates with.
    pub vendor_id: u16,
    /// USB product ID the device enumerates with.
    pub product_id: u16,
    /// `bcdDevice` release number.
    pub release_number: u16,
    /// Device is self powered.
    pub self_powered: bool,
    /// Device supports remote wakeup.
    pub remote_wakeup: bool,
    /// Maximum bus power draw in mA.
    pub max_power: u16,
    /// A serial number string is reported.
    pub use_serial: bool,
    /// Manufacturer string.
    pub manufacturer: Option<String>,
    /// Product description string.
    pub product: Option<String>,
    /// Serial number string.
    pub serial: Option<String>,
}

/// The context's EEPROM staging area.
///
/// Holds a fixed 256-byte buffer, reserved when the context is created.
/// After [`BriteBlox::read_eeprom`](crate::BriteBlox::read_eeprom) the
/// detected EEPROM size defines how many bytes are staged. A blank
/// (all `0xFF`) EEPROM stages the full raw read and reports
/// [`is_blank`](Self::is_blank).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EepromImage {
    buf: Vec<u8>,
    size: Option<usize>,
    blank: bool,
    chip_type: Option<ChipType>,
}

impl EepromImage {
    /// Reserve the staging buffer without aborting on allocation failure.
    pub(crate) fn try_new() -> Result<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(MAX_EEPROM_SIZE)?;
        buf.resize(MAX_EEPROM_SIZE, 0);
        Ok(Self {
            buf,
            size: None,
            blank: false,
            chip_type: None,
        })
    }

    /// Replace the staged contents with a complete raw read.
    pub(crate) fn stage(&mut self, raw: &[u8; MAX_EEPROM_SIZE], chip_type: ChipType) {
        let (size, blank) = detect_size(raw, chip_type);
        self.buf.copy_from_slice(raw);
        self.size = Some(size);
        self.blank = blank;
        self.chip_type = Some(chip_type);
        log::debug!("staged EEPROM: {size} bytes, blank={blank}");
    }

    /// Drop the staged contents. The reserved buffer is kept.
    pub(crate) fn clear(&mut self) {
        self.buf.fill(0);
        self.size = None;
        self.blank = false;
        self.chip_type = None;
    }

    /// Detected EEPROM size in bytes, or `None` before the first read.
    pub fn size(&self) -> Option<usize> {
        self.size
    }

    /// Whether the last read found an unprogrammed EEPROM.
    pub fn is_blank(&self) -> bool {
        self.blank
    }

    /// The staged bytes. Empty before the first read.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.size.unwrap_or(0)]
    }

    /// Checksum stored in the last word of the staged image.
    pub fn stored_checksum(&self) -> Option<u16> {
        let size = self.size?;
        Some(u16::from_le_bytes([self.buf[size - 2], self.buf[size - 1]]))
    }

    /// Whether the stored checksum matches the staged contents.
    ///
    /// Always `false` for a blank or never-read EEPROM.
    pub fn verify_checksum(&self) -> bool {
        let (Some(size), Some(chip)) = (self.size, self.chip_type) else {
            return false;
        };
        if self.blank {
            return false;
        }
        self.stored_checksum() == Some(checksum(&self.buf, size, chip == ChipType::Ft230X))
    }

    /// Decode the common header of a programmed EEPROM.
    pub fn header(&self) -> Option<EepromHeader> {
        let size = self.size?;
        if self.blank {
            return None;
        }
        let buf = &self.buf;
        let word = |at: usize| u16::from_le_bytes([buf[at], buf[at + 1]]);

        Some(EepromHeader {
            vendor_id: word(0x02),
            product_id: word(0x04),
            release_number: word(0x06),
            self_powered: buf[0x08] & 0x40 != 0,
            remote_wakeup: buf[0x08] & 0x20 != 0,
            max_power: buf[0x09] as u16 * 2,
            use_serial: buf[0x0A] & 0x08 != 0,
            manufacturer: decode_string(buf, size, 0x0E),
            product: decode_string(buf, size, 0x10),
            serial: decode_string(buf, size, 0x12),
        })
    }
}

/// Decode a USB string descriptor referenced by the offset/length byte
/// pair at `pointer`. Only the low byte of each UTF-16 unit is kept.
fn decode_string(buf: &[u8], size: usize, pointer: usize) -> Option<String> {
    let char_count = buf[pointer + 1] as usize / 2;
    if char_count <= 1 {
        return None;
    }

    let mask = size - 1;
    let start = buf[pointer] as usize & mask;
    let s = (0..char_count - 1)
        .map(|j| buf[(start + 2 + j * 2) & mask] as char)
        .collect();
    Some(s)
}
