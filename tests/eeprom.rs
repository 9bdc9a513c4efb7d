//! EEPROM and chip ID access against the simulated bus.

use briteblox::constants::{pid, BRITEBLOX_VID, MAX_EEPROM_SIZE};
use briteblox::eeprom::checksum;
use briteblox::transport::mock::{MockBackend, MockChip, MockFailure};
use briteblox::{BriteBlox, ChipType, Error, ErrorKind};

fn opened_with(chip: MockChip) -> (MockBackend, BriteBlox<MockBackend>) {
    let vendor = chip.descriptor.vendor_id;
    let product = chip.descriptor.product_id;
    let backend = MockBackend::with_chip(chip);
    let mut ctx = BriteBlox::with_backend(backend.clone()).unwrap();
    ctx.open(vendor, product).unwrap();
    (backend, ctx)
}

/// A programmed 128-byte FT232R image, mirrored to fill the address space.
fn ft232r_image() -> [u8; MAX_EEPROM_SIZE] {
    let mut image = [0u8; MAX_EEPROM_SIZE];
    image[0x02..0x04].copy_from_slice(&BRITEBLOX_VID.to_le_bytes());
    image[0x04..0x06].copy_from_slice(&pid::BRITEBLOX.to_le_bytes());
    image[0x06..0x08].copy_from_slice(&0x0600u16.to_le_bytes());
    image[0x09] = 50;
    // Manufacturer "BB" at 0x20.
    image[0x0E] = 0x20;
    image[0x0F] = 6;
    image[0x20..0x26].copy_from_slice(&[6, 3, b'B', 0, b'B', 0]);
    let csum = checksum(&image, 0x80, false);
    image[0x7E..0x80].copy_from_slice(&csum.to_le_bytes());
    image.copy_within(0..0x80, 0x80);
    image
}

#[test]
fn ft232r_stages_128_bytes() {
    let (_, mut ctx) = opened_with(MockChip::ft232r().eeprom(&ft232r_image()));
    assert_eq!(ctx.eeprom().size(), None);

    ctx.read_eeprom().unwrap();
    let eeprom = ctx.eeprom();
    assert_eq!(eeprom.size(), Some(128));
    assert!(!eeprom.is_blank());
    assert!(eeprom.verify_checksum());

    let header = eeprom.header().unwrap();
    assert_eq!(header.vendor_id, BRITEBLOX_VID);
    assert_eq!(header.product_id, pid::BRITEBLOX);
    assert_eq!(header.max_power, 100);
    assert_eq!(header.manufacturer.as_deref(), Some("BB"));

    let buf = ctx.get_eeprom_buf(128).unwrap();
    assert_eq!(buf, ft232r_image()[..128]);
}

#[test]
fn oversized_copy_is_rejected_without_touching_staging() {
    let (_, mut ctx) = opened_with(MockChip::ft232r().eeprom(&ft232r_image()));
    ctx.read_eeprom().unwrap();
    let before = ctx.eeprom().clone();

    let err = ctx.get_eeprom_buf(256).unwrap_err();
    assert!(matches!(
        err,
        Error::SizeMismatch {
            requested: 256,
            available: 128
        }
    ));
    assert_eq!(err.kind(), ErrorKind::SizeMismatch);
    assert_eq!(ctx.eeprom(), &before);
    assert_eq!(ctx.get_eeprom_buf(16).unwrap().len(), 16);
}

#[test]
fn copy_before_read_is_a_size_mismatch() {
    let backend = MockBackend::with_chip(MockChip::ft232r());
    let ctx = BriteBlox::with_backend(backend).unwrap();
    assert!(ctx.get_eeprom_buf(0).unwrap().is_empty());
    assert_eq!(ctx.get_eeprom_buf(1).unwrap_err().kind(), ErrorKind::SizeMismatch);
}

#[test]
fn blank_eeprom_is_reported() {
    let (_, mut ctx) = opened_with(MockChip::new(BRITEBLOX_VID, pid::FT2232, 0x0700));
    ctx.read_eeprom().unwrap();
    assert!(ctx.eeprom().is_blank());
    assert_eq!(ctx.get_eeprom_buf(256).unwrap(), vec![0xFF; 256]);
    assert!(!ctx.eeprom().verify_checksum());
}

#[test]
fn close_empties_staging() {
    let (_, mut ctx) = opened_with(MockChip::ft232r().eeprom(&ft232r_image()));
    ctx.read_eeprom().unwrap();
    assert_eq!(ctx.get_eeprom_buf(4).unwrap().len(), 4);

    ctx.close().unwrap();
    assert_eq!(ctx.eeprom().size(), None);
    assert!(!ctx.eeprom().is_blank());
    assert_eq!(ctx.get_eeprom_buf(4).unwrap_err().kind(), ErrorKind::SizeMismatch);
}

#[test]
fn next_device_does_not_see_previous_eeprom() {
    let mut first = [0x11u8; MAX_EEPROM_SIZE];
    first[0] = 0xAB;
    let backend = MockBackend::new();
    backend.add_chip(MockChip::ft232r().eeprom(&first));
    backend.add_chip(MockChip::new(BRITEBLOX_VID, pid::FT2232, 0x0700));
    let mut ctx = BriteBlox::with_backend(backend).unwrap();

    ctx.open(BRITEBLOX_VID, pid::BRITEBLOX).unwrap();
    ctx.read_eeprom().unwrap();
    assert_eq!(ctx.get_eeprom_buf(4).unwrap(), [0xAB, 0x11, 0x11, 0x11]);
    ctx.close().unwrap();

    ctx.open(BRITEBLOX_VID, pid::FT2232).unwrap();
    assert_eq!(ctx.eeprom().size(), None);
    assert!(matches!(
        ctx.get_eeprom_buf(4),
        Err(Error::SizeMismatch {
            requested: 4,
            available: 0
        })
    ));
}

#[test]
fn failed_read_keeps_previous_staging() {
    let (backend, mut ctx) = opened_with(MockChip::ft232r().eeprom(&ft232r_image()));
    ctx.read_eeprom().unwrap();
    let before = ctx.eeprom().clone();

    backend.fail_next_transfer(MockFailure::Timeout);
    assert!(matches!(ctx.read_eeprom(), Err(Error::Timeout)));
    assert_eq!(ctx.eeprom(), &before);
}

#[test]
fn read_eeprom_needs_open_device() {
    let backend = MockBackend::with_chip(MockChip::ft232r());
    let mut ctx = BriteBlox::with_backend(backend.clone()).unwrap();
    assert!(matches!(ctx.read_eeprom(), Err(Error::NotOpen)));
    assert!(matches!(ctx.read_eeprom_location(0), Err(Error::NotOpen)));
    assert_eq!(backend.calls().control_in, 0);
}

#[test]
fn single_word_reads() {
    let (backend, ctx) = opened_with(MockChip::ft232r().eeprom(&ft232r_image()));
    assert_eq!(ctx.read_eeprom_location(1).unwrap(), BRITEBLOX_VID);
    assert_eq!(ctx.read_eeprom_location(2).unwrap(), pid::BRITEBLOX);
    assert_eq!(backend.calls().control_in, 2);
    // Staging is not involved.
    assert_eq!(ctx.eeprom().size(), None);
}

#[test]
fn word_address_range_depends_on_chip() {
    let (backend, ctx) = opened_with(MockChip::ft232r());
    ctx.read_eeprom_location(63).unwrap();
    let calls = backend.calls().control_in;

    let err = ctx.read_eeprom_location(64).unwrap_err();
    assert!(matches!(err, Error::OutOfRange { addr: 64, words: 64 }));
    assert_eq!(err.kind(), ErrorKind::OutOfRange);
    assert_ne!(err.kind(), ErrorKind::Usb);
    assert_eq!(backend.calls().control_in, calls);

    let (_, ctx) = opened_with(MockChip::new(BRITEBLOX_VID, pid::FT232H, 0x0900));
    ctx.read_eeprom_location(127).unwrap();
    assert!(matches!(
        ctx.read_eeprom_location(128),
        Err(Error::OutOfRange { .. })
    ));
}

#[test]
fn chip_id_on_ft232r() {
    let mut image = [0u8; MAX_EEPROM_SIZE];
    // Words 0x43/0x44 as stored by the chip.
    image[0x86..0x8A].copy_from_slice(&[0x00, 0x00, 0x01, 0x00]);
    let (_, mut ctx) = opened_with(MockChip::ft232r().eeprom(&image));

    assert_eq!(ctx.read_chipid().unwrap(), 0xA5F0_F5D1);

    // Mode independent.
    ctx.set_bitmode(0xFF, briteblox::BitMode::BitBang).unwrap();
    assert_eq!(ctx.read_chipid().unwrap(), 0xA5F0_F5D1);
}

#[test]
fn chip_id_needs_ft232r() {
    let (_, ctx) = opened_with(MockChip::new(BRITEBLOX_VID, pid::FT2232, 0x0700));
    let err = ctx.read_chipid().unwrap_err();
    assert!(matches!(err, Error::UnsupportedChip(ChipType::Ft2232H)));
    assert_eq!(err.kind(), ErrorKind::Unsupported);

    let backend = MockBackend::with_chip(MockChip::ft232r());
    let ctx = BriteBlox::with_backend(backend).unwrap();
    assert!(matches!(ctx.read_chipid(), Err(Error::NotOpen)));
}
