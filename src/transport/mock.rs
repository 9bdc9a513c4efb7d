//! In-memory chip simulator implementing [`UsbBackend`].
//!
//! [`MockBackend`] holds a bus of [`MockChip`]s. Opened devices answer the
//! vendor requests the context issues: bit mode and pin state, latency
//! timer, EEPROM words and bulk data. Output pins are looped back to the
//! inputs, so a byte written in bitbang mode reads back from
//! [`BriteBlox::read_pins`](crate::BriteBlox::read_pins).
//!
//! Failures can be injected (failed opens, failed enumerations, timed out
//! or stalled transfers) and every call is counted, which makes it easy to
//! check that nothing is retried behind the caller's back.
//!
//! ```
//! use briteblox::transport::mock::{MockBackend, MockChip};
//! use briteblox::BriteBlox;
//!
//! let backend = MockBackend::with_chip(MockChip::ft232r());
//! backend.fail_next_opens(1);
//!
//! let mut ctx = BriteBlox::with_backend(backend.clone())?;
//! assert!(ctx.open(0x0403, 0x7AD0).is_err());
//! ctx.open(0x0403, 0x7AD0)?;
//! assert_eq!(backend.calls().open, 2);
//! # Ok::<(), briteblox::Error>(())
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use nusb::transfer::TransferError;

use super::{UsbBackend, UsbDevice};
use crate::constants::*;
use crate::device_info::{DeviceDescriptor, DeviceStrings};
use crate::error::{Error, Result};
use crate::types::Interface;

/// Modem status bytes prefixed to every bulk IN packet.
const MODEM_STATUS: [u8; 2] = [0x01, 0x60];

/// A transfer failure to inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// The transfer times out.
    Timeout,
    /// The endpoint stalls.
    Stall,
}

/// Number of calls the backend and its devices have served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// Bus enumerations.
    pub list: usize,
    /// String descriptor reads.
    pub strings: usize,
    /// Open attempts, failed ones included.
    pub open: usize,
    /// Vendor OUT requests.
    pub control_out: usize,
    /// Vendor IN requests.
    pub control_in: usize,
    /// Bulk OUT transfers.
    pub bulk_write: usize,
    /// Bulk IN transfers.
    pub bulk_read: usize,
}

/// A vendor OUT request seen by a simulated chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRecord {
    /// Request code.
    pub request: u8,
    /// `wValue`.
    pub value: u16,
    /// `wIndex`.
    pub index: u16,
}

/// One simulated chip and its live state.
#[derive(Debug, Clone)]
pub struct MockChip {
    /// How the chip enumerates. The bus position is filled in when the
    /// chip is added to a backend.
    pub descriptor: DeviceDescriptor,
    /// Strings returned by string descriptor reads.
    pub strings: DeviceStrings,
    /// Whether the device descriptor references a serial number.
    pub has_serial: bool,
    /// Bulk max packet size reported on open.
    pub max_packet_size: Option<usize>,
    /// Raw EEPROM contents, addressed in 16-bit words.
    pub eeprom: [u8; MAX_EEPROM_SIZE],
    /// Level of pins configured as inputs.
    pub input_pins: u8,
    /// Current pin levels.
    pub pins: u8,
    /// Output mask of the active bit mode.
    pub bitmask: u8,
    /// Raw value of the active bit mode.
    pub bitmode: u8,
    /// Latency timer in ms.
    pub latency: u8,
    /// Every byte received over bulk OUT.
    pub written: Vec<u8>,
    /// Vendor OUT requests, oldest first.
    pub requests: Vec<ControlRecord>,
    rx: VecDeque<Vec<u8>>,
}

impl MockChip {
    /// A chip with the given IDs and `bcdDevice`, an erased EEPROM and no
    /// strings.
    pub fn new(vendor_id: u16, product_id: u16, release_number: u16) -> Self {
        Self {
            descriptor: DeviceDescriptor {
                vendor_id,
                product_id,
                bus_id: "1".into(),
                address: 0,
                release_number,
                manufacturer: None,
                description: None,
                serial: None,
            },
            strings: DeviceStrings::default(),
            has_serial: false,
            max_packet_size: Some(64),
            eeprom: [0xFF; MAX_EEPROM_SIZE],
            input_pins: 0,
            pins: 0,
            bitmask: 0,
            bitmode: 0,
            latency: 16,
            written: Vec::new(),
            requests: Vec::new(),
            rx: VecDeque::new(),
        }
    }

    /// A BriteBlox board built around an FT232R.
    pub fn ft232r() -> Self {
        Self::new(BRITEBLOX_VID, pid::BRITEBLOX, 0x0600)
    }

    /// Set the manufacturer, description and serial strings.
    pub fn strings(mut self, manufacturer: &str, description: &str, serial: &str) -> Self {
        self.strings = DeviceStrings {
            manufacturer: Some(manufacturer.into()),
            description: Some(description.into()),
            serial: Some(serial.into()),
        };
        self.has_serial = true;
        self
    }

    /// Load EEPROM contents starting at byte 0.
    pub fn eeprom(mut self, image: &[u8]) -> Self {
        let n = image.len().min(MAX_EEPROM_SIZE);
        self.eeprom[..n].copy_from_slice(&image[..n]);
        self
    }

    /// Set the level seen on input pins.
    pub fn input_pins(mut self, level: u8) -> Self {
        self.input_pins = level;
        self
    }

    fn control_out(&mut self, request: u8, value: u16, index: u16) -> Result<()> {
        self.requests.push(ControlRecord {
            request,
            value,
            index,
        });
        match (request, value) {
            (SIO_RESET_REQUEST, SIO_RESET_SIO) | (SIO_RESET_REQUEST, SIO_RESET_PURGE_RX) => {
                self.rx.clear()
            }
            (SIO_RESET_REQUEST, _) | (SIO_SET_BAUDRATE_REQUEST, _) => {}
            (SIO_SET_LATENCY_TIMER_REQUEST, _) => self.latency = value as u8,
            (SIO_SET_BITMODE_REQUEST, _) => {
                self.bitmask = value as u8;
                self.bitmode = (value >> 8) as u8;
                self.settle_pins();
            }
            _ => return Err(Error::Transfer(TransferError::Stall)),
        }
        Ok(())
    }

    fn control_in(&mut self, request: u8, index: u16) -> Result<Vec<u8>> {
        match request {
            SIO_GET_LATENCY_TIMER_REQUEST => Ok(vec![self.latency]),
            SIO_READ_PINS_REQUEST => Ok(vec![self.pins]),
            SIO_READ_EEPROM_REQUEST => {
                let at = (index as usize * 2) % MAX_EEPROM_SIZE;
                Ok(self.eeprom[at..at + 2].to_vec())
            }
            _ => Err(Error::Transfer(TransferError::Stall)),
        }
    }

    fn bulk_write(&mut self, data: &[u8]) -> usize {
        self.written.extend_from_slice(data);
        if self.bitmode != 0 {
            if let Some(&last) = data.last() {
                self.pins = (last & self.bitmask) | (self.input_pins & !self.bitmask);
            }
        }
        data.len()
    }

    fn bulk_read(&mut self, len: usize) -> Vec<u8> {
        let mut packet = MODEM_STATUS.to_vec();
        if let Some(payload) = self.rx.pop_front() {
            packet.extend_from_slice(&payload);
        }
        packet.truncate(len);
        packet
    }

    fn settle_pins(&mut self) {
        self.pins = (self.pins & self.bitmask) | (self.input_pins & !self.bitmask);
    }
}

#[derive(Debug, Default)]
struct Bus {
    chips: Vec<MockChip>,
    fail_opens: usize,
    fail_enumerations: usize,
    fail_strings: bool,
    next_failure: Option<MockFailure>,
    calls: CallCounts,
}

impl Bus {
    fn position(&self, device: &DeviceDescriptor) -> Result<usize> {
        self.chips
            .iter()
            .position(|c| {
                c.descriptor.bus_id == device.bus_id && c.descriptor.address == device.address
            })
            .ok_or(Error::DeviceNotFound)
    }

    fn take_failure(&mut self) -> Result<()> {
        match self.next_failure.take() {
            Some(MockFailure::Timeout) => Err(Error::Timeout),
            Some(MockFailure::Stall) => Err(Error::Transfer(TransferError::Stall)),
            None => Ok(()),
        }
    }
}

/// Simulated USB bus. Clones share the same bus.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    bus: Rc<RefCell<Bus>>,
}

impl MockBackend {
    /// An empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus with one chip on it.
    pub fn with_chip(chip: MockChip) -> Self {
        let backend = Self::new();
        backend.add_chip(chip);
        backend
    }

    /// Plug in a chip. Returns its position in bus order.
    pub fn add_chip(&self, mut chip: MockChip) -> usize {
        let mut bus = self.bus.borrow_mut();
        let index = bus.chips.len();
        chip.descriptor.address = index as u8 + 1;
        bus.chips.push(chip);
        index
    }

    /// Snapshot of the chip at `index`.
    pub fn chip(&self, index: usize) -> Option<MockChip> {
        self.bus.borrow().chips.get(index).cloned()
    }

    /// Queue one bulk IN packet payload for the chip at `index`.
    pub fn queue_rx(&self, index: usize, payload: &[u8]) {
        if let Some(chip) = self.bus.borrow_mut().chips.get_mut(index) {
            chip.rx.push_back(payload.to_vec());
        }
    }

    /// Make the next `n` open attempts fail to claim the interface.
    pub fn fail_next_opens(&self, n: usize) {
        self.bus.borrow_mut().fail_opens = n;
    }

    /// Make the next `n` enumerations fail.
    pub fn fail_next_enumerations(&self, n: usize) {
        self.bus.borrow_mut().fail_enumerations = n;
    }

    /// Make string descriptor reads fail.
    pub fn fail_strings(&self, fail: bool) {
        self.bus.borrow_mut().fail_strings = fail;
    }

    /// Fail the next transfer on any open device.
    pub fn fail_next_transfer(&self, failure: MockFailure) {
        self.bus.borrow_mut().next_failure = Some(failure);
    }

    /// Calls served so far.
    pub fn calls(&self) -> CallCounts {
        self.bus.borrow().calls
    }
}

impl UsbBackend for MockBackend {
    type Device = MockDevice;

    fn list_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        let mut bus = self.bus.borrow_mut();
        bus.calls.list += 1;
        if bus.fail_enumerations > 0 {
            bus.fail_enumerations -= 1;
            return Err(Error::Transfer(TransferError::Disconnected));
        }
        Ok(bus.chips.iter().map(|c| c.descriptor.clone()).collect())
    }

    fn read_strings(&self, device: &DeviceDescriptor, _timeout: Duration) -> Result<DeviceStrings> {
        let mut bus = self.bus.borrow_mut();
        bus.calls.strings += 1;
        let index = bus.position(device)?;
        if bus.fail_strings {
            return Err(Error::Transfer(TransferError::Stall));
        }
        Ok(bus.chips[index].strings.clone())
    }

    fn open(&self, device: &DeviceDescriptor, _interface: Interface) -> Result<MockDevice> {
        let mut bus = self.bus.borrow_mut();
        bus.calls.open += 1;
        let index = bus.position(device)?;
        if bus.fail_opens > 0 {
            bus.fail_opens -= 1;
            return Err(Error::ClaimFailed);
        }
        let chip = &bus.chips[index];
        Ok(MockDevice {
            bus: Rc::clone(&self.bus),
            index,
            release_number: chip.descriptor.release_number,
            has_serial: chip.has_serial,
            max_packet_size: chip.max_packet_size,
        })
    }
}

/// A chip opened through [`MockBackend`].
#[derive(Debug)]
pub struct MockDevice {
    bus: Rc<RefCell<Bus>>,
    index: usize,
    release_number: u16,
    has_serial: bool,
    max_packet_size: Option<usize>,
}

impl MockDevice {
    fn serve<T>(
        &self,
        count: impl FnOnce(&mut CallCounts),
        op: impl FnOnce(&mut MockChip) -> Result<T>,
    ) -> Result<T> {
        let mut bus = self.bus.borrow_mut();
        count(&mut bus.calls);
        bus.take_failure()?;
        op(&mut bus.chips[self.index])
    }
}

impl UsbDevice for MockDevice {
    fn release_number(&self) -> u16 {
        self.release_number
    }

    fn has_serial_number(&self) -> bool {
        self.has_serial
    }

    fn max_packet_size(&self) -> Option<usize> {
        self.max_packet_size
    }

    fn control_out(&self, request: u8, value: u16, index: u16, _timeout: Duration) -> Result<()> {
        self.serve(
            |c| c.control_out += 1,
            |chip| chip.control_out(request, value, index),
        )
    }

    fn control_in(
        &self,
        request: u8,
        _value: u16,
        index: u16,
        length: u16,
        _timeout: Duration,
    ) -> Result<Vec<u8>> {
        self.serve(
            |c| c.control_in += 1,
            |chip| {
                let mut data = chip.control_in(request, index)?;
                data.truncate(length as usize);
                Ok(data)
            },
        )
    }

    fn bulk_write(&mut self, _endpoint: u8, data: &[u8], _timeout: Duration) -> Result<usize> {
        self.serve(|c| c.bulk_write += 1, |chip| Ok(chip.bulk_write(data)))
    }

    fn bulk_read(&mut self, _endpoint: u8, len: usize, _timeout: Duration) -> Result<Vec<u8>> {
        let packet = self.max_packet_size.unwrap_or(64);
        self.serve(
            |c| c.bulk_read += 1,
            |chip| {
                // IN lengths must be whole packets, as on a real host stack.
                if len == 0 || len % packet != 0 {
                    return Err(Error::Transfer(TransferError::InvalidArgument));
                }
                Ok(chip.bulk_read(len))
            },
        )
    }
}
