//! Full tour of a BriteBlox board.
//!
//! Lists boards, opens the first one, walks a bit across the eight pins,
//! then dumps the chip ID and the EEPROM.
//!
//! Usage: cargo run --example complete

use std::thread;
use std::time::Duration;

use briteblox::constants::{pid, BITMODE_BITBANG, BRITEBLOX_VID};
use briteblox::{library_version, BriteBlox};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let version = library_version();
    println!("version: {} ({})", version.version_str, version.snapshot_str);

    let mut ctx = BriteBlox::new()?;

    // A freshly plugged board may not show up on the first scan.
    let mut devices = ctx.find_all(BRITEBLOX_VID, pid::BRITEBLOX)?;
    if devices.is_empty() {
        thread::sleep(Duration::from_millis(100));
        devices = ctx.find_all(BRITEBLOX_VID, pid::BRITEBLOX)?;
    }
    println!("devices: {}", devices.len());
    for (i, dev) in devices.iter().enumerate() {
        let strings = ctx.get_strings(dev)?;
        println!(
            "#{i}: manufacturer={:?} description={:?} serial={:?}",
            strings.manufacturer.unwrap_or_default(),
            strings.description.unwrap_or_default(),
            strings.serial.unwrap_or_default()
        );
    }

    ctx.open(BRITEBLOX_VID, pid::BRITEBLOX)?;
    println!("chip type: {:?}", ctx.chip_type()?);

    ctx.set_bitmode(0xFF, BITMODE_BITBANG)?;
    println!("turning everything on");
    ctx.write_data(0xFF)?;
    thread::sleep(Duration::from_secs(1));
    println!("turning everything off");
    ctx.write_data(0x00)?;
    thread::sleep(Duration::from_secs(1));
    for bit in 0..8 {
        let value = 1u8 << bit;
        println!("enabling bit #{bit} ({value:#04x})");
        ctx.write_data(value)?;
        thread::sleep(Duration::from_secs(1));
    }
    println!("pins: {:#04x}", ctx.read_pins()?);
    ctx.disable_bitbang()?;

    match ctx.read_chipid() {
        Ok(id) => println!("chip id: {id:08x}"),
        Err(e) => println!("chip id unavailable: {e}"),
    }

    let addr = 1;
    println!("eeprom @ {addr}: {:#06x}", ctx.read_eeprom_location(addr)?);

    ctx.read_eeprom()?;
    let size = ctx.eeprom().size().unwrap_or(0).min(128);
    println!("eeprom ({size} bytes, checksum ok: {}):", ctx.eeprom().verify_checksum());
    for row in ctx.get_eeprom_buf(size)?.chunks(8) {
        let line: Vec<String> = row.iter().map(|b| format!("{b:02x}")).collect();
        println!("{}", line.join(" "));
    }

    ctx.close()?;
    println!("device closed");
    ctx.release();

    Ok(())
}
