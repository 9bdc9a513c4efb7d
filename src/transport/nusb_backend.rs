//! [`UsbBackend`] implementation on top of `nusb`.

use std::time::Duration;

use nusb::transfer::{Buffer, Bulk, ControlIn, ControlOut, ControlType, In, Out, Recipient};
use nusb::{DeviceInfo, MaybeFuture};

use super::{UsbBackend, UsbDevice};
use crate::device_info::{DeviceDescriptor, DeviceStrings};
use crate::error::{Error, Result};
use crate::types::Interface;

/// The host USB stack, accessed through `nusb`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NusbBackend;

impl NusbBackend {
    /// Create a backend. No USB resources are held until a device is opened.
    pub fn new() -> Self {
        Self
    }

    /// Find the live `DeviceInfo` for a previously enumerated descriptor.
    fn lookup(device: &DeviceDescriptor) -> Result<DeviceInfo> {
        nusb::list_devices()
            .wait()?
            .find(|d| {
                d.bus_id() == device.bus_id
                    && d.device_address() == device.address
                    && d.vendor_id() == device.vendor_id
                    && d.product_id() == device.product_id
            })
            .ok_or(Error::DeviceNotFound)
    }
}

impl UsbBackend for NusbBackend {
    type Device = NusbDevice;

    fn list_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        let devices = nusb::list_devices()
            .wait()?
            .map(|d| DeviceDescriptor {
                vendor_id: d.vendor_id(),
                product_id: d.product_id(),
                bus_id: d.bus_id().to_owned(),
                address: d.device_address(),
                release_number: d.device_version(),
                manufacturer: d.manufacturer_string().map(str::to_owned),
                description: d.product_string().map(str::to_owned),
                serial: d.serial_number().map(str::to_owned),
            })
            .collect();
        Ok(devices)
    }

    fn read_strings(
        &self,
        device: &DeviceDescriptor,
        timeout: Duration,
    ) -> Result<DeviceStrings> {
        let info = Self::lookup(device)?;
        let handle = info.open().wait()?;
        let desc = handle.device_descriptor();

        let mut strings = DeviceStrings::default();
        if let Some(idx) = desc.manufacturer_string_index() {
            strings.manufacturer = Some(
                handle
                    .get_string_descriptor(idx, crate::constants::LANGUAGE_ID, timeout)
                    .wait()?,
            );
        }
        if let Some(idx) = desc.product_string_index() {
            strings.description = Some(
                handle
                    .get_string_descriptor(idx, crate::constants::LANGUAGE_ID, timeout)
                    .wait()?,
            );
        }
        if let Some(idx) = desc.serial_number_string_index() {
            strings.serial = Some(
                handle
                    .get_string_descriptor(idx, crate::constants::LANGUAGE_ID, timeout)
                    .wait()?,
            );
        }
        Ok(strings)
    }

    fn open(&self, device: &DeviceDescriptor, interface: Interface) -> Result<NusbDevice> {
        let info = Self::lookup(device)?;
        let config = interface.config();

        let handle = info.open().wait()?;
        let claimed = handle
            .detach_and_claim_interface(config.interface_num)
            .wait()
            .map_err(|e| {
                log::debug!("claiming interface {} failed: {e}", config.interface_num);
                Error::ClaimFailed
            })?;

        let desc = handle.device_descriptor();
        let max_packet_size = determine_max_packet_size(&handle, config.interface_num);

        log::debug!(
            "opened {:04x}:{:04x} at bus {} addr {} (bcdDevice {:#06x})",
            device.vendor_id,
            device.product_id,
            device.bus_id,
            device.address,
            desc.device_version()
        );

        Ok(NusbDevice {
            release_number: desc.device_version(),
            has_serial: desc.serial_number_string_index().is_some(),
            max_packet_size,
            interface: claimed,
            _device: handle,
        })
    }
}

/// A device opened through [`NusbBackend`].
pub struct NusbDevice {
    release_number: u16,
    has_serial: bool,
    max_packet_size: Option<usize>,
    interface: nusb::Interface,
    // Keeps the device open for as long as the interface is claimed.
    _device: nusb::Device,
}

impl std::fmt::Debug for NusbDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NusbDevice")
            .field("release_number", &self.release_number)
            .field("max_packet_size", &self.max_packet_size)
            .finish_non_exhaustive()
    }
}

impl UsbDevice for NusbDevice {
    fn release_number(&self) -> u16 {
        self.release_number
    }

    fn has_serial_number(&self) -> bool {
        self.has_serial
    }

    fn max_packet_size(&self) -> Option<usize> {
        self.max_packet_size
    }

    fn control_out(&self, request: u8, value: u16, index: u16, timeout: Duration) -> Result<()> {
        log::trace!("control out: req={request:#04x} value={value:#06x} index={index:#06x}");
        self.interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request,
                    value,
                    index,
                    data: &[],
                },
                timeout,
            )
            .wait()?;
        Ok(())
    }

    fn control_in(
        &self,
        request: u8,
        value: u16,
        index: u16,
        length: u16,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        let data = self
            .interface
            .control_in(
                ControlIn {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request,
                    value,
                    index,
                    length,
                },
                timeout,
            )
            .wait()?;
        log::trace!(
            "control in: req={request:#04x} value={value:#06x} index={index:#06x} -> {} bytes",
            data.len()
        );
        Ok(data)
    }

    fn bulk_write(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize> {
        let mut ep = self.interface.endpoint::<Bulk, Out>(endpoint)?;

        let mut buf = Buffer::new(data.len());
        buf.extend_from_slice(data);

        let completion = ep.transfer_blocking(buf, timeout);
        completion.status?;
        log::trace!("bulk out {endpoint:#04x}: {} bytes", completion.actual_len);
        Ok(completion.actual_len)
    }

    fn bulk_read(&mut self, endpoint: u8, len: usize, timeout: Duration) -> Result<Vec<u8>> {
        let mut ep = self.interface.endpoint::<Bulk, In>(endpoint)?;

        let completion = ep.transfer_blocking(Buffer::new(len), timeout);
        completion.status?;

        let actual = completion.actual_len;
        let mut data = completion.buffer.into_vec();
        data.truncate(actual);
        log::trace!("bulk in {endpoint:#04x}: {actual} bytes");
        Ok(data)
    }
}

/// Read the bulk max packet size for an interface from the active
/// configuration descriptor.
fn determine_max_packet_size(device: &nusb::Device, interface_num: u8) -> Option<usize> {
    let config = device.active_configuration().ok()?;

    for iface_group in config.interfaces() {
        if iface_group.interface_number() != interface_num {
            continue;
        }
        for alt in iface_group.alt_settings() {
            if let Some(ep) = alt.endpoints().next() {
                return Some(ep.max_packet_size());
            }
        }
    }

    None
}
