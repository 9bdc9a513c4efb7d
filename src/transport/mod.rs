//! USB transport abstraction.
//!
//! The context never talks to a USB stack directly. It goes through two
//! traits:
//!
//! - [`UsbBackend`] enumerates the bus, reads string descriptors and opens
//!   devices.
//! - [`UsbDevice`] is one opened, claimed device that performs synchronous
//!   control and bulk transfers, each bounded by a timeout.
//!
//! [`NusbBackend`] is the production implementation on top of `nusb`.
//! With the `mock` feature, `mock::MockBackend` simulates a chip in memory
//! so the full context can be driven without hardware.
//!
//! No transport method retries on failure. A timed-out transfer surfaces
//! as [`Error::Timeout`](crate::Error::Timeout).

#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod nusb_backend;

use std::time::Duration;

use crate::device_info::{DeviceDescriptor, DeviceStrings};
use crate::error::Result;
use crate::types::Interface;

pub use nusb_backend::{NusbBackend, NusbDevice};

/// Access to a host USB stack.
pub trait UsbBackend {
    /// Handle type for an opened device.
    type Device: UsbDevice;

    /// Snapshot every device currently on the bus, in bus order.
    fn list_devices(&self) -> Result<Vec<DeviceDescriptor>>;

    /// Read the manufacturer, product and serial strings of a device.
    ///
    /// The device is opened only for the duration of the call.
    fn read_strings(&self, device: &DeviceDescriptor, timeout: Duration)
        -> Result<DeviceStrings>;

    /// Open a device and claim the given interface.
    fn open(&self, device: &DeviceDescriptor, interface: Interface) -> Result<Self::Device>;
}

/// An opened device with a claimed interface.
///
/// Dropping the handle releases the interface and closes the device.
pub trait UsbDevice {
    /// The `bcdDevice` field of the device descriptor.
    fn release_number(&self) -> u16;

    /// Whether the device descriptor references a serial number string.
    fn has_serial_number(&self) -> bool;

    /// Max packet size of the claimed interface's bulk endpoints, if the
    /// configuration descriptor could be read.
    fn max_packet_size(&self) -> Option<usize>;

    /// Vendor OUT control transfer without a data stage.
    fn control_out(&self, request: u8, value: u16, index: u16, timeout: Duration) -> Result<()>;

    /// Vendor IN control transfer returning up to `length` bytes.
    fn control_in(
        &self,
        request: u8,
        value: u16,
        index: u16,
        length: u16,
        timeout: Duration,
    ) -> Result<Vec<u8>>;

    /// Bulk OUT transfer. Returns the number of bytes the device accepted.
    fn bulk_write(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize>;

    /// Bulk IN transfer of up to `len` bytes.
    fn bulk_read(&mut self, endpoint: u8, len: usize, timeout: Duration) -> Result<Vec<u8>>;
}
