//! Context lifecycle, port setup and failure handling against the
//! simulated bus.

use std::time::Duration;

use briteblox::constants::{pid, BRITEBLOX_VID};
use briteblox::transport::mock::{MockBackend, MockChip, MockFailure};
use briteblox::{BriteBlox, DeviceState, Error, ErrorKind, Interface, Mode, Options};

const SIO_SET_BAUDRATE_REQUEST: u8 = 0x03;

fn board() -> (MockBackend, BriteBlox<MockBackend>) {
    let backend = MockBackend::with_chip(MockChip::ft232r());
    let ctx = BriteBlox::with_backend(backend.clone()).unwrap();
    (backend, ctx)
}

fn opened() -> (MockBackend, BriteBlox<MockBackend>) {
    let (backend, mut ctx) = board();
    ctx.open(BRITEBLOX_VID, pid::BRITEBLOX).unwrap();
    (backend, ctx)
}

fn last_baud_value(backend: &MockBackend) -> u16 {
    backend
        .chip(0)
        .unwrap()
        .requests
        .iter()
        .rev()
        .find(|r| r.request == SIO_SET_BAUDRATE_REQUEST)
        .map(|r| r.value)
        .unwrap()
}

#[test]
fn new_context_is_uninitialized() {
    let (_, ctx) = board();
    assert_eq!(ctx.state(), DeviceState::Uninitialized);
    assert!(!ctx.is_open());
    assert!(matches!(ctx.mode(), Err(Error::NotOpen)));
}

#[test]
fn open_close_reopen() {
    let (backend, mut ctx) = opened();
    assert_eq!(ctx.state(), DeviceState::Open);
    assert_eq!(ctx.mode().unwrap(), Mode::Normal);
    assert_eq!(ctx.chip_type().unwrap(), briteblox::ChipType::Ft232R);
    assert_eq!(ctx.device_ids().unwrap(), (BRITEBLOX_VID, pid::BRITEBLOX));
    assert_eq!(ctx.baudrate().unwrap(), 9600);

    ctx.close().unwrap();
    assert_eq!(ctx.state(), DeviceState::Closed);
    assert!(matches!(ctx.set_baudrate(9600), Err(Error::NotOpen)));
    assert!(matches!(ctx.close(), Err(Error::NotOpen)));

    ctx.open(BRITEBLOX_VID, pid::BRITEBLOX).unwrap();
    assert_eq!(ctx.state(), DeviceState::Open);
    assert_eq!(backend.calls().open, 2);
}

#[test]
fn open_while_open_is_rejected() {
    let (backend, mut ctx) = opened();
    let err = ctx.open(BRITEBLOX_VID, pid::BRITEBLOX).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyOpen);
    assert_eq!(backend.calls().open, 1);
    assert_eq!(backend.calls().list, 1);
}

#[test]
fn open_missing_device() {
    let (backend, mut ctx) = board();
    let err = ctx.open(BRITEBLOX_VID, pid::FT232H).unwrap_err();
    assert!(matches!(err, Error::DeviceNotFound));
    assert_eq!(err.kind(), ErrorKind::Usb);
    assert_eq!(ctx.state(), DeviceState::Uninitialized);
    assert_eq!(backend.calls().open, 0);
}

#[test]
fn transient_open_failure_is_visible_and_retry_succeeds() {
    let (backend, mut ctx) = board();
    backend.fail_next_opens(1);

    let err = ctx.open(BRITEBLOX_VID, pid::BRITEBLOX).unwrap_err();
    assert!(matches!(err, Error::ClaimFailed));
    assert!(err.code() < 0);
    assert_eq!(backend.calls().open, 1);
    assert_eq!(ctx.state(), DeviceState::Uninitialized);

    ctx.open(BRITEBLOX_VID, pid::BRITEBLOX).unwrap();
    ctx.set_baudrate(115_200).unwrap();
    assert_eq!(backend.calls().open, 2);
}

#[test]
fn failure_during_open_setup_releases_handle() {
    let (backend, mut ctx) = board();
    backend.fail_next_transfer(MockFailure::Timeout);

    let err = ctx.open(BRITEBLOX_VID, pid::BRITEBLOX).unwrap_err();
    assert!(matches!(err, Error::Timeout));
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(ctx.state(), DeviceState::Uninitialized);

    ctx.open(BRITEBLOX_VID, pid::BRITEBLOX).unwrap();
    assert!(ctx.is_open());
}

#[test]
fn failed_reopen_keeps_closed_state() {
    let (backend, mut ctx) = opened();
    ctx.close().unwrap();
    backend.fail_next_opens(1);
    assert!(ctx.open(BRITEBLOX_VID, pid::BRITEBLOX).is_err());
    assert_eq!(ctx.state(), DeviceState::Closed);
}

#[test]
fn timeouts_are_not_retried() {
    let (backend, mut ctx) = opened();
    let before = backend.calls().control_out;
    backend.fail_next_transfer(MockFailure::Timeout);
    assert!(matches!(ctx.usb_reset(), Err(Error::Timeout)));
    assert_eq!(backend.calls().control_out, before + 1);

    backend.fail_next_transfer(MockFailure::Stall);
    let err = ctx.purge_tx_buffer().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usb);
    assert!(ctx.is_open());
}

#[test]
fn interface_can_only_change_while_closed() {
    let (_, mut ctx) = board();
    ctx.set_interface(Interface::B).unwrap();
    assert_eq!(ctx.options().interface, Interface::B);

    ctx.open(BRITEBLOX_VID, pid::BRITEBLOX).unwrap();
    assert!(matches!(ctx.set_interface(Interface::A), Err(Error::AlreadyOpen)));
}

#[test]
fn options_are_applied() {
    let backend = MockBackend::with_chip(MockChip::ft232r());
    let options = Options::default()
        .read_timeout(Duration::from_millis(250))
        .write_chunksize(2);
    let mut ctx = BriteBlox::with_options(backend, options).unwrap();
    assert_eq!(ctx.options().read_timeout, Duration::from_millis(250));

    ctx.set_write_timeout(Duration::from_secs(1));
    assert_eq!(ctx.options().write_timeout, Duration::from_secs(1));
    assert!(matches!(ctx.set_read_chunksize(0), Err(Error::InvalidArgument(_))));
}

#[test]
fn latency_timer() {
    let (_, mut ctx) = opened();
    assert_eq!(ctx.latency_timer().unwrap(), 16);
    ctx.set_latency_timer(2).unwrap();
    assert_eq!(ctx.latency_timer().unwrap(), 2);
    assert_eq!(
        ctx.set_latency_timer(0).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
}

#[test]
fn baudrate_is_scaled_in_bitbang_mode() {
    let (backend, mut ctx) = opened();
    ctx.set_baudrate(38_400).unwrap();
    let normal = last_baud_value(&backend);

    ctx.set_bitmode(0xFF, briteblox::BitMode::BitBang).unwrap();
    ctx.set_baudrate(9600).unwrap();
    assert_eq!(last_baud_value(&backend), normal);
    assert_eq!(ctx.baudrate().unwrap(), 9600);
}

#[test]
fn unreachable_baudrate_is_rejected() {
    let (_, mut ctx) = opened();
    let err = ctx.set_baudrate(10_000_000).unwrap_err();
    assert!(matches!(err, Error::UnsupportedBaudRate { .. }));
    assert!(matches!(ctx.set_baudrate(0), Err(Error::InvalidArgument(_))));
    assert_eq!(ctx.baudrate().unwrap(), 9600);
}

#[test]
fn read_data_strips_status_and_keeps_remainder() {
    let (backend, mut ctx) = opened();
    backend.queue_rx(0, b"hello");

    let mut buf = [0u8; 3];
    assert_eq!(ctx.read_data(&mut buf).unwrap(), 3);
    assert_eq!(&buf, b"hel");
    assert_eq!(ctx.read_data(&mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], b"lo");
    assert_eq!(backend.calls().bulk_read, 1);

    // Only modem status on the wire.
    assert_eq!(ctx.read_data(&mut buf).unwrap(), 0);
}

#[test]
fn read_size_is_rounded_to_whole_packets() {
    let (backend, mut ctx) = opened();
    ctx.set_read_chunksize(100).unwrap();
    backend.queue_rx(0, b"abc");

    let mut buf = [0u8; 8];
    assert_eq!(ctx.read_data(&mut buf).unwrap(), 3);
    assert_eq!(&buf[..3], b"abc");
    assert_eq!(backend.calls().bulk_read, 1);
}

#[test]
fn zero_chunk_sizes_are_rejected_at_creation() {
    for options in [
        Options::default().read_chunksize(0),
        Options::default().write_chunksize(0),
    ] {
        let backend = MockBackend::with_chip(MockChip::ft232r());
        let err = BriteBlox::with_options(backend, options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}

#[test]
fn purge_drops_pending_data() {
    let (backend, mut ctx) = opened();
    backend.queue_rx(0, b"abcdef");
    let mut buf = [0u8; 2];
    ctx.read_data(&mut buf).unwrap();

    backend.queue_rx(0, b"xyz");
    ctx.purge_buffers().unwrap();
    assert_eq!(ctx.read_data(&mut buf).unwrap(), 0);
}

#[test]
fn release_closes_and_resets_pins() {
    let (backend, mut ctx) = opened();
    ctx.set_bitmode(0x0F, briteblox::BitMode::BitBang).unwrap();
    ctx.release();
    assert_eq!(backend.chip(0).unwrap().bitmode, 0);
}

#[test]
fn release_without_open_is_fine() {
    let (backend, ctx) = board();
    ctx.release();
    assert_eq!(backend.calls().open, 0);
}
