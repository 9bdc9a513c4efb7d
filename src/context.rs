//! Core BriteBlox context and device lifecycle.
//!
//! [`BriteBlox`] is the main type in this crate. It owns a USB backend,
//! tracks whether a device is open and in which mode, and carries the
//! EEPROM staging area. Bitbang, EEPROM and chip-id operations live in
//! their own modules as further `impl` blocks on this type.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized --open--> Open (Normal <-> Bitbang) --close--> Closed
//!                           ^                                    |
//!                           +---------------open-----------------+
//! ```
//!
//! Device operations on a context that is not open fail with
//! [`Error::NotOpen`]. [`BriteBlox::release`] consumes the context, so it
//! cannot be used or released again:
//!
//! ```compile_fail
//! let ctx = briteblox::BriteBlox::new().unwrap();
//! ctx.release();
//! ctx.release();
//! ```

use std::time::Duration;

use crate::baudrate;
use crate::constants::*;
use crate::device_info::{DeviceDescriptor, DeviceFilter};
use crate::eeprom::EepromImage;
use crate::error::{Error, Result};
use crate::transport::{NusbBackend, UsbBackend, UsbDevice};
use crate::types::*;

/// Default read/write timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default read/write buffer chunk size.
const DEFAULT_CHUNKSIZE: usize = 4096;

/// Baud rate programmed right after opening.
const DEFAULT_BAUDRATE: u32 = 9600;

/// Context configuration.
///
/// ```
/// use std::time::Duration;
/// use briteblox::{Interface, Options};
///
/// let options = Options::default()
///     .interface(Interface::B)
///     .read_timeout(Duration::from_millis(500));
/// assert_eq!(options.interface, Interface::B);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Interface claimed on open.
    pub interface: Interface,
    /// Timeout for IN transfers.
    pub read_timeout: Duration,
    /// Timeout for OUT transfers.
    pub write_timeout: Duration,
    /// Bytes requested per bulk read.
    pub read_chunksize: usize,
    /// Largest bulk write issued in one transfer.
    pub write_chunksize: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interface: Interface::Any,
            read_timeout: DEFAULT_TIMEOUT,
            write_timeout: DEFAULT_TIMEOUT,
            read_chunksize: DEFAULT_CHUNKSIZE,
            write_chunksize: DEFAULT_CHUNKSIZE,
        }
    }
}

impl Options {
    /// Select the interface to claim.
    pub fn interface(mut self, interface: Interface) -> Self {
        self.interface = interface;
        self
    }

    /// Set the IN transfer timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the OUT transfer timeout.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the bulk read size.
    ///
    /// Reads are rounded up to whole packets. Zero is rejected when the
    /// context is created.
    pub fn read_chunksize(mut self, chunksize: usize) -> Self {
        self.read_chunksize = chunksize;
        self
    }

    /// Set the bulk write size. Zero is rejected when the context is
    /// created.
    pub fn write_chunksize(mut self, chunksize: usize) -> Self {
        self.write_chunksize = chunksize;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.read_chunksize == 0 || self.write_chunksize == 0 {
            return Err(Error::InvalidArgument("chunk size must be > 0"));
        }
        Ok(())
    }
}

/// State kept for an open device.
pub(crate) struct OpenDevice<D> {
    pub(crate) handle: D,
    pub(crate) chip_type: ChipType,
    pub(crate) vendor_id: u16,
    pub(crate) product_id: u16,
    pub(crate) usb_index: u16,
    pub(crate) write_ep: u8,
    pub(crate) read_ep: u8,
    pub(crate) max_packet_size: usize,
    pub(crate) mode: Mode,
    pub(crate) baudrate: u32,
    // Payload received but not yet handed to the caller.
    pub(crate) rx_pending: Vec<u8>,
}

enum State<D> {
    Uninitialized,
    Open(OpenDevice<D>),
    Closed,
}

/// A BriteBlox device context.
///
/// Create one with [`BriteBlox::new`], enumerate with
/// [`find_all`](Self::find_all), open a device, issue bitbang / EEPROM /
/// chip-id operations, then [`close`](Self::close) and
/// [`release`](Self::release). Dropping the context also closes the device.
///
/// A context is meant for one owner: every state-changing call takes
/// `&mut self`.
///
/// ```no_run
/// use briteblox::{BriteBlox, BitMode, constants::{pid, BRITEBLOX_VID}};
///
/// let mut ctx = BriteBlox::new()?;
/// ctx.open(BRITEBLOX_VID, pid::BRITEBLOX)?;
/// ctx.set_bitmode(0xFF, BitMode::BitBang)?;
/// ctx.write_data(0x55)?;
/// ctx.disable_bitbang()?;
/// ctx.close()?;
/// ctx.release();
/// # Ok::<(), briteblox::Error>(())
/// ```
pub struct BriteBlox<B: UsbBackend = NusbBackend> {
    pub(crate) backend: B,
    pub(crate) options: Options,
    state: State<B::Device>,
    pub(crate) eeprom: EepromImage,
}

impl<B: UsbBackend> std::fmt::Debug for BriteBlox<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("BriteBlox");
        s.field("state", &self.state());
        if let State::Open(dev) = &self.state {
            s.field("chip_type", &dev.chip_type)
                .field("mode", &dev.mode)
                .field("baudrate", &dev.baudrate);
        }
        s.field("options", &self.options).finish_non_exhaustive()
    }
}

// ---- Construction / Release ----

impl BriteBlox<NusbBackend> {
    /// Create a closed context on the host USB stack.
    pub fn new() -> Result<Self> {
        Self::with_backend(NusbBackend::new())
    }
}

impl<B: UsbBackend> BriteBlox<B> {
    /// Create a closed context on a specific backend.
    pub fn with_backend(backend: B) -> Result<Self> {
        Self::with_options(backend, Options::default())
    }

    /// Create a closed context with explicit options.
    ///
    /// Fails with [`Error::InvalidArgument`] if a chunk size is zero and
    /// with [`Error::Allocation`] if the EEPROM staging area cannot be
    /// reserved.
    pub fn with_options(backend: B, options: Options) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            backend,
            options,
            state: State::Uninitialized,
            eeprom: EepromImage::try_new()?,
        })
    }

    /// Close the device if it is open and destroy the context.
    pub fn release(mut self) {
        if self.is_open() {
            self.close_internal();
        }
    }

    /// The backend this context talks through.
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: UsbBackend> Drop for BriteBlox<B> {
    fn drop(&mut self) {
        if self.is_open() {
            self.close_internal();
        }
    }
}

// ---- State queries / configuration ----

impl<B: UsbBackend> BriteBlox<B> {
    /// Current lifecycle state.
    pub fn state(&self) -> DeviceState {
        match self.state {
            State::Uninitialized => DeviceState::Uninitialized,
            State::Open(_) => DeviceState::Open,
            State::Closed => DeviceState::Closed,
        }
    }

    /// Whether a device is open.
    pub fn is_open(&self) -> bool {
        matches!(self.state, State::Open(_))
    }

    /// Operating mode of the open device.
    pub fn mode(&self) -> Result<Mode> {
        Ok(self.device()?.mode)
    }

    /// The detected chip type of the open device.
    pub fn chip_type(&self) -> Result<ChipType> {
        Ok(self.device()?.chip_type)
    }

    /// Vendor and product ID of the open device.
    pub fn device_ids(&self) -> Result<(u16, u16)> {
        let dev = self.device()?;
        Ok((dev.vendor_id, dev.product_id))
    }

    /// The last baud rate programmed on the open device.
    pub fn baudrate(&self) -> Result<u32> {
        Ok(self.device()?.baudrate)
    }

    /// Bulk max packet size of the open device.
    pub fn max_packet_size(&self) -> Result<usize> {
        Ok(self.device()?.max_packet_size)
    }

    /// Current options.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Select the interface used by the next `open`.
    ///
    /// Fails with [`Error::AlreadyOpen`] while a device is open.
    pub fn set_interface(&mut self, interface: Interface) -> Result<()> {
        if self.is_open() {
            return Err(Error::AlreadyOpen);
        }
        self.options.interface = interface;
        Ok(())
    }

    /// Set the timeout for IN transfers.
    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.options.read_timeout = timeout;
    }

    /// Set the timeout for OUT transfers.
    pub fn set_write_timeout(&mut self, timeout: Duration) {
        self.options.write_timeout = timeout;
    }

    /// Set the bulk read size. Reads are rounded up to whole packets.
    pub fn set_read_chunksize(&mut self, chunksize: usize) -> Result<()> {
        if chunksize == 0 {
            return Err(Error::InvalidArgument("chunk size must be > 0"));
        }
        self.options.read_chunksize = chunksize;
        Ok(())
    }

    /// Set the bulk write size.
    pub fn set_write_chunksize(&mut self, chunksize: usize) -> Result<()> {
        if chunksize == 0 {
            return Err(Error::InvalidArgument("chunk size must be > 0"));
        }
        self.options.write_chunksize = chunksize;
        Ok(())
    }
}

// ---- Open / Close ----

impl<B: UsbBackend> BriteBlox<B> {
    /// Open the first device matching the given vendor and product IDs.
    ///
    /// Ties are broken by bus enumeration order. Nothing is retried: a
    /// failed open leaves the context as it was, and the caller decides
    /// whether to try again.
    pub fn open(&mut self, vendor: u16, product: u16) -> Result<()> {
        if self.is_open() {
            return Err(Error::AlreadyOpen);
        }
        let device = self
            .find_all(vendor, product)?
            .into_iter()
            .next()
            .ok_or(Error::DeviceNotFound)?;
        self.open_device(&device)
    }

    /// Open the device selected by a [`DeviceFilter`].
    pub fn open_with_filter(&mut self, filter: &DeviceFilter) -> Result<()> {
        if self.is_open() {
            return Err(Error::AlreadyOpen);
        }
        let device = self.find_device(filter)?;
        self.open_device(&device)
    }

    /// Open a device from an enumerated [`DeviceDescriptor`].
    ///
    /// Claims the configured interface, detects the chip type, resets the
    /// port and programs the default baud rate. If any step fails the USB
    /// handle is released before the error is returned.
    pub fn open_device(&mut self, device: &DeviceDescriptor) -> Result<()> {
        if self.is_open() {
            return Err(Error::AlreadyOpen);
        }

        let config = self.options.interface.config();
        let handle = self.backend.open(device, self.options.interface)?;

        let chip_type =
            ChipType::from_release_number(handle.release_number(), handle.has_serial_number());
        let max_packet_size = handle
            .max_packet_size()
            .unwrap_or_else(|| chip_type.default_packet_size());

        let opened = OpenDevice {
            handle,
            chip_type,
            vendor_id: device.vendor_id,
            product_id: device.product_id,
            usb_index: config.usb_index,
            write_ep: config.write_ep,
            read_ep: config.read_ep,
            max_packet_size,
            mode: Mode::Normal,
            baudrate: 0,
            rx_pending: Vec::new(),
        };

        let previous = std::mem::replace(&mut self.state, State::Open(opened));
        if let Err(e) = self
            .usb_reset()
            .and_then(|()| self.set_baudrate(DEFAULT_BAUDRATE))
        {
            log::debug!("open of {:04x}:{:04x} failed: {e}", device.vendor_id, device.product_id);
            self.state = previous;
            return Err(e);
        }

        self.eeprom.clear();
        log::debug!(
            "opened {:04x}:{:04x} as {chip_type:?}, max packet {max_packet_size}",
            device.vendor_id,
            device.product_id
        );
        Ok(())
    }

    /// Close the open device and release its USB handle.
    ///
    /// After closing, device operations fail with [`Error::NotOpen`] until
    /// a device is opened again. The EEPROM staging area is emptied.
    pub fn close(&mut self) -> Result<()> {
        if !self.is_open() {
            return Err(Error::NotOpen);
        }
        self.close_internal();
        Ok(())
    }

    fn close_internal(&mut self) {
        self.eeprom.clear();
        if let State::Open(dev) = std::mem::replace(&mut self.state, State::Closed) {
            // Leave the pins released for the next user of the device.
            if dev.mode != Mode::Normal {
                if let Err(e) = dev.handle.control_out(
                    SIO_SET_BITMODE_REQUEST,
                    0,
                    dev.usb_index,
                    self.options.write_timeout,
                ) {
                    log::warn!("failed to reset bit mode on close: {e}");
                }
            }
            log::debug!("closing {:04x}:{:04x}", dev.vendor_id, dev.product_id);
        }
    }
}

// ---- Internal USB helpers ----

impl<B: UsbBackend> BriteBlox<B> {
    pub(crate) fn device(&self) -> Result<&OpenDevice<B::Device>> {
        match &self.state {
            State::Open(dev) => Ok(dev),
            _ => Err(Error::NotOpen),
        }
    }

    pub(crate) fn device_mut(&mut self) -> Result<&mut OpenDevice<B::Device>> {
        match &mut self.state {
            State::Open(dev) => Ok(dev),
            _ => Err(Error::NotOpen),
        }
    }

    /// Vendor OUT request addressed to the open interface.
    pub(crate) fn control_out(&self, request: u8, value: u16) -> Result<()> {
        let dev = self.device()?;
        dev.handle
            .control_out(request, value, dev.usb_index, self.options.write_timeout)
    }

    /// Vendor IN request with an explicit index, checked for a full reply.
    pub(crate) fn control_in_exact(&self, request: u8, index: u16, length: u16) -> Result<Vec<u8>> {
        let dev = self.device()?;
        let data = dev
            .handle
            .control_in(request, 0, index, length, self.options.read_timeout)?;
        if data.len() < length as usize {
            return Err(Error::ShortTransfer {
                expected: length as usize,
                actual: data.len(),
            });
        }
        Ok(data)
    }

    /// Write `buf` in chunks of the configured write size.
    pub(crate) fn bulk_write_all(&mut self, buf: &[u8]) -> Result<usize> {
        let chunksize = self.options.write_chunksize;
        let timeout = self.options.write_timeout;
        let dev = self.device_mut()?;

        let mut offset = 0;
        while offset < buf.len() {
            let end = (offset + chunksize).min(buf.len());
            let n = dev.handle.bulk_write(dev.write_ep, &buf[offset..end], timeout)?;
            if n == 0 {
                return Err(Error::ShortTransfer {
                    expected: end - offset,
                    actual: 0,
                });
            }
            offset += n;
        }
        Ok(offset)
    }
}

// ---- Reset / Purge ----

impl<B: UsbBackend> BriteBlox<B> {
    /// Reset the port to its power-on state.
    pub fn usb_reset(&mut self) -> Result<()> {
        self.control_out(SIO_RESET_REQUEST, SIO_RESET_SIO)?;
        self.device_mut()?.rx_pending.clear();
        Ok(())
    }

    /// Discard data in the chip's receive FIFO and in the local buffer.
    pub fn purge_rx_buffer(&mut self) -> Result<()> {
        self.control_out(SIO_RESET_REQUEST, SIO_RESET_PURGE_RX)?;
        self.device_mut()?.rx_pending.clear();
        Ok(())
    }

    /// Discard data in the chip's transmit FIFO.
    pub fn purge_tx_buffer(&mut self) -> Result<()> {
        self.control_out(SIO_RESET_REQUEST, SIO_RESET_PURGE_TX)
    }

    /// Purge both directions.
    pub fn purge_buffers(&mut self) -> Result<()> {
        self.purge_rx_buffer()?;
        self.purge_tx_buffer()
    }
}

// ---- Port configuration ----

impl<B: UsbBackend> BriteBlox<B> {
    /// Set the baud rate.
    ///
    /// The achieved rate depends on the chip's clock divider and must lie
    /// within ~5% of the request. While a bitbang mode is active the chip
    /// clocks pins at four times the programmed rate, so the request is
    /// scaled accordingly.
    pub fn set_baudrate(&mut self, baudrate: u32) -> Result<()> {
        let dev = self.device()?;
        let effective = if dev.mode == Mode::Normal {
            baudrate
        } else {
            baudrate.saturating_mul(4)
        };

        let divisor = baudrate::convert_baudrate(effective, dev.chip_type, dev.usb_index)
            .ok_or(Error::InvalidArgument("baud rate must be > 0"))?;
        if !baudrate::within_tolerance(effective, divisor.actual) {
            return Err(Error::UnsupportedBaudRate {
                requested: baudrate,
                actual: divisor.actual,
            });
        }

        dev.handle.control_out(
            SIO_SET_BAUDRATE_REQUEST,
            divisor.value,
            divisor.index,
            self.options.write_timeout,
        )?;
        self.device_mut()?.baudrate = baudrate;
        Ok(())
    }

    /// Set the latency timer (1-255 ms).
    pub fn set_latency_timer(&mut self, latency_ms: u8) -> Result<()> {
        if latency_ms == 0 {
            return Err(Error::InvalidArgument("latency must be between 1 and 255"));
        }
        self.control_out(SIO_SET_LATENCY_TIMER_REQUEST, latency_ms as u16)
    }

    /// Read the latency timer in milliseconds.
    pub fn latency_timer(&self) -> Result<u8> {
        let index = self.device()?.usb_index;
        let data = self.control_in_exact(SIO_GET_LATENCY_TIMER_REQUEST, index, 1)?;
        Ok(data[0])
    }
}

// ---- Data transfer ----

impl<B: UsbBackend> BriteBlox<B> {
    /// Read received data with one bulk transfer.
    ///
    /// The chip prefixes each packet with two modem status bytes; these are
    /// stripped. Returns the number of payload bytes copied into `buf`,
    /// which is 0 if the chip only sent status. Payload that does not fit
    /// is kept for the next call.
    pub fn read_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let chunksize = self.options.read_chunksize;
        let timeout = self.options.read_timeout;
        let dev = self.device_mut()?;

        if dev.rx_pending.is_empty() {
            let packet = dev.max_packet_size.max(1);
            let len = chunksize.div_ceil(packet) * packet;
            let mut raw = dev.handle.bulk_read(dev.read_ep, len, timeout)?;
            let payload = strip_modem_status(&mut raw, dev.max_packet_size);
            raw.truncate(payload);
            dev.rx_pending = raw;
        }

        let n = dev.rx_pending.len().min(buf.len());
        buf[..n].copy_from_slice(&dev.rx_pending[..n]);
        dev.rx_pending.drain(..n);
        Ok(n)
    }
}

/// Strip the 2-byte modem status header from each packet in a raw bulk
/// read result. Returns the number of payload bytes, compacted in place at
/// the start of `data`.
fn strip_modem_status(data: &mut [u8], packet_size: usize) -> usize {
    let total = data.len();
    if packet_size <= 2 || total <= 2 {
        return 0;
    }

    let mut write_pos = 0;
    let mut pkt_start = 0;
    while pkt_start < total {
        let pkt_end = (pkt_start + packet_size).min(total);
        let payload_start = pkt_start + 2;
        if payload_start < pkt_end {
            data.copy_within(payload_start..pkt_end, write_pos);
            write_pos += pkt_end - payload_start;
        }
        pkt_start = pkt_end;
    }

    write_pos
}
