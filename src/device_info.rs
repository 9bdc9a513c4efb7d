//! Device discovery and enumeration.
//!
//! [`BriteBlox::find_all`] lists matching devices as an owned
//! [`DeviceList`]; [`BriteBlox::get_strings`] resolves the string
//! descriptors of one entry. Use [`DeviceFilter`] to pick a device by
//! description, serial number or position.
//!
//! Enumeration never retries. A caller that wants to ride out a bus that
//! is still settling retries on its own:
//!
//! ```no_run
//! use briteblox::{BriteBlox, constants::{pid, BRITEBLOX_VID}};
//!
//! let ctx = BriteBlox::new()?;
//! let mut devices = ctx.find_all(BRITEBLOX_VID, pid::BRITEBLOX)?;
//! if devices.is_empty() {
//!     devices = ctx.find_all(BRITEBLOX_VID, pid::BRITEBLOX)?;
//! }
//! for (i, dev) in devices.iter().enumerate() {
//!     let strings = ctx.get_strings(dev)?;
//!     println!("#{i}: {:?}", strings.description);
//! }
//! # Ok::<(), briteblox::Error>(())
//! ```

use std::ops::Index;
use std::time::Duration;

use crate::constants::{BRITEBLOX_VID, DEFAULT_PRODUCT_IDS};
use crate::context::BriteBlox;
use crate::error::{Error, Result};
use crate::transport::UsbBackend;

/// USB string descriptor read timeout.
const STRING_TIMEOUT: Duration = Duration::from_secs(1);

/// One enumerated device: an immutable snapshot taken at scan time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceDescriptor {
    /// USB vendor ID.
    pub vendor_id: u16,
    /// USB product ID.
    pub product_id: u16,
    /// Platform-specific bus identifier.
    pub bus_id: String,
    /// Device address on its bus.
    pub address: u8,
    /// `bcdDevice` release number.
    pub release_number: u16,
    /// Manufacturer string cached by the OS, if any.
    pub manufacturer: Option<String>,
    /// Product description cached by the OS, if any.
    pub description: Option<String>,
    /// Serial number cached by the OS, if any.
    pub serial: Option<String>,
}

impl DeviceDescriptor {
    /// Whether this device matches a vendor/product pair.
    ///
    /// `0:0` selects the default product set under [`BRITEBLOX_VID`].
    pub fn matches(&self, vendor: u16, product: u16) -> bool {
        if vendor == 0 && product == 0 {
            self.vendor_id == BRITEBLOX_VID && DEFAULT_PRODUCT_IDS.contains(&self.product_id)
        } else {
            self.vendor_id == vendor && self.product_id == product
        }
    }
}

/// String descriptors read live from a device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceStrings {
    /// Manufacturer name.
    pub manufacturer: Option<String>,
    /// Product description.
    pub description: Option<String>,
    /// Serial number.
    pub serial: Option<String>,
}

/// Devices found by [`BriteBlox::find_all`], in bus order.
///
/// The list is fully materialized before it is returned and owns its
/// entries, so it can be indexed and iterated freely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceList {
    devices: Vec<DeviceDescriptor>,
}

impl DeviceList {
    /// Number of devices found.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no device matched.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// The `index`-th device, if present.
    pub fn get(&self, index: usize) -> Option<&DeviceDescriptor> {
        self.devices.get(index)
    }

    /// Iterate in bus order.
    pub fn iter(&self) -> std::slice::Iter<'_, DeviceDescriptor> {
        self.devices.iter()
    }

    /// Take the entries out of the list.
    pub fn into_vec(self) -> Vec<DeviceDescriptor> {
        self.devices
    }
}

impl Index<usize> for DeviceList {
    type Output = DeviceDescriptor;

    fn index(&self, index: usize) -> &DeviceDescriptor {
        &self.devices[index]
    }
}

impl<'a> IntoIterator for &'a DeviceList {
    type Item = &'a DeviceDescriptor;
    type IntoIter = std::slice::Iter<'a, DeviceDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.devices.iter()
    }
}

impl IntoIterator for DeviceList {
    type Item = DeviceDescriptor;
    type IntoIter = std::vec::IntoIter<DeviceDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.devices.into_iter()
    }
}

/// Filtering criteria for finding a device.
///
/// All fields beyond `vendor_id` and `product_id` are optional. When set,
/// they further restrict which devices match.
///
/// # Example
///
/// ```no_run
/// use briteblox::{BriteBlox, DeviceFilter};
///
/// let filter = DeviceFilter::new(0x0403, 0x7AD0)
///     .serial("BB000123")
///     .index(0);
/// let mut ctx = BriteBlox::new()?;
/// ctx.open_with_filter(&filter)?;
/// # Ok::<(), briteblox::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct DeviceFilter {
    /// USB vendor ID to match.
    pub vendor_id: u16,
    /// USB product ID to match.
    pub product_id: u16,
    /// If set, match against the USB product description string.
    pub description: Option<String>,
    /// If set, match against the USB serial number string.
    pub serial: Option<String>,
    /// Select the Nth matching device (0-based). Defaults to 0.
    pub index: usize,
}

impl DeviceFilter {
    /// Create a new filter matching the given vendor and product IDs.
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
            description: None,
            serial: None,
            index: 0,
        }
    }

    /// Require the product description to match.
    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Require the serial number to match.
    pub fn serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    /// Select the Nth matching device (0-based).
    pub fn index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    fn needs_strings(&self) -> bool {
        self.description.is_some() || self.serial.is_some()
    }

    fn matches_strings(&self, strings: &DeviceStrings) -> bool {
        let same = |want: &Option<String>, got: &Option<String>| match want {
            Some(w) => got.as_deref() == Some(w.as_str()),
            None => true,
        };
        same(&self.description, &strings.description) && same(&self.serial, &strings.serial)
    }
}

impl<B: UsbBackend> BriteBlox<B> {
    /// List all devices matching the given vendor and product IDs.
    ///
    /// Returns an empty list (not an error) when nothing matches. With
    /// `0:0`, the default BriteBlox/FTDI product set is matched.
    pub fn find_all(&self, vendor: u16, product: u16) -> Result<DeviceList> {
        let devices: Vec<DeviceDescriptor> = self
            .backend
            .list_devices()?
            .into_iter()
            .filter(|d| d.matches(vendor, product))
            .collect();
        log::debug!(
            "find_all {vendor:04x}:{product:04x}: {} device(s)",
            devices.len()
        );
        Ok(DeviceList { devices })
    }

    /// Read the manufacturer, description and serial strings of one
    /// enumerated device.
    ///
    /// The device is opened only for this call; the context's own open
    /// device, if any, is not touched.
    pub fn get_strings(&self, device: &DeviceDescriptor) -> Result<DeviceStrings> {
        self.backend.read_strings(device, STRING_TIMEOUT)
    }

    /// Find a single device matching the filter.
    ///
    /// Candidates are opened temporarily to compare strings only when the
    /// filter asks for a description or serial number.
    pub fn find_device(&self, filter: &DeviceFilter) -> Result<DeviceDescriptor> {
        let mut match_count = 0usize;

        for candidate in self.find_all(filter.vendor_id, filter.product_id)? {
            if filter.needs_strings() {
                let strings = self.get_strings(&candidate)?;
                if !filter.matches_strings(&strings) {
                    continue;
                }
            }

            if match_count == filter.index {
                return Ok(candidate);
            }
            match_count += 1;
        }

        Err(Error::DeviceNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(vendor_id: u16, product_id: u16) -> DeviceDescriptor {
        DeviceDescriptor {
            vendor_id,
            product_id,
            bus_id: "1".into(),
            address: 4,
            release_number: 0x0600,
            manufacturer: None,
            description: None,
            serial: None,
        }
    }

    #[test]
    fn wildcard_matches_default_products() {
        assert!(descriptor(0x0403, 0x7AD0).matches(0, 0));
        assert!(descriptor(0x0403, 0x6001).matches(0, 0));
        assert!(!descriptor(0x0403, 0x6015).matches(0, 0));
        assert!(!descriptor(0x1234, 0x7AD0).matches(0, 0));
    }

    #[test]
    fn explicit_ids_match_exactly() {
        assert!(descriptor(0x1209, 0x0001).matches(0x1209, 0x0001));
        assert!(!descriptor(0x1209, 0x0001).matches(0x1209, 0x0002));
    }

    #[test]
    fn filter_string_matching() {
        let filter = DeviceFilter::new(0x0403, 0x7AD0).serial("A1");
        let mut strings = DeviceStrings {
            serial: Some("A1".into()),
            ..Default::default()
        };
        assert!(filter.matches_strings(&strings));
        strings.serial = Some("B2".into());
        assert!(!filter.matches_strings(&strings));
        strings.serial = None;
        assert!(!filter.matches_strings(&strings));
    }
}
