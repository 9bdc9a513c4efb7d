//! Baud rate divisor calculation.
//!
//! The chips derive their bit clock from a base clock through a divisor
//! with three fractional bits. How the divisor is encoded depends on the
//! chip generation:
//!
//! - **AM**: 24 MHz base, only some fractions are usable.
//! - **BM, 2232C, R, 230X**: 48 MHz base with a 16x predivisor.
//! - **H-type**: 120 MHz with a 10x predivisor for fast rates, or the 48 MHz
//!   path for slow ones.

use crate::constants::{AM_CLK, C_CLK, H_CLK};
use crate::types::ChipType;

/// Register values for a `SIO_SET_BAUDRATE_REQUEST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Divisor {
    /// Rate the chip will actually run at.
    pub actual: u32,
    /// `wValue` of the request.
    pub value: u16,
    /// `wIndex` of the request.
    pub index: u16,
}

/// Encoding of the 3-bit sub-divisor.
const FRAC_CODE: [u32; 8] = [0, 3, 2, 4, 1, 5, 6, 7];

/// AM parts: step down to a usable fraction.
const AM_ROUND_DOWN: [u32; 8] = [0, 0, 0, 1, 0, 3, 2, 1];
/// AM parts: step up to a usable fraction.
const AM_ROUND_UP: [u32; 8] = [0, 0, 0, 1, 0, 1, 2, 3];

fn encode(divisor: u32) -> u32 {
    (divisor >> 3) | FRAC_CODE[(divisor & 7) as usize] << 14
}

/// Divisor search for AM parts. Returns `(actual, encoded)`.
fn am_divisor(baudrate: u32) -> (u32, u32) {
    let mut divisor = AM_CLK / baudrate;
    divisor -= AM_ROUND_DOWN[(divisor & 7) as usize];

    let mut best: Option<(u32, u32, u32)> = None;
    for step in 0..2 {
        let candidate = match divisor + step {
            d if d <= 8 => 8,
            // 9 through 15 are not usable on AM.
            _ if divisor < 16 => 16,
            d => (d + AM_ROUND_UP[(d & 7) as usize]).min(0x1FFF8),
        };

        let estimate = (AM_CLK + candidate / 2) / candidate;
        let diff = estimate.abs_diff(baudrate);
        if best.map_or(true, |(_, _, best_diff)| diff < best_diff) {
            best = Some((candidate, estimate, diff));
            if diff == 0 {
                break;
            }
        }
    }

    let (divisor, actual, _) = best.unwrap_or((8, AM_CLK / 8, 0));
    let encoded = match encode(divisor) {
        // 3 Mbaud
        1 => 0,
        // 2 Mbaud
        0x4001 => 1,
        other => other,
    };
    (actual, encoded)
}

/// Divisor search for a base clock and predivisor. Returns
/// `(actual, encoded)`.
fn clk_divisor(baudrate: u32, clk: u32, prediv: u32) -> (u32, u32) {
    // The three fastest rates have dedicated encodings.
    let fastest = [
        (clk / prediv, 0),
        (clk / (prediv + prediv / 2), 1),
        (clk / (2 * prediv), 2),
    ];
    if let Some(&hit) = fastest.iter().find(|(rate, _)| baudrate >= *rate) {
        return hit;
    }

    // One extra bit below the three fractional bits is used for rounding.
    let doubled = clk * 16 / prediv / baudrate;
    let mut divisor = doubled / 2 + (doubled & 1);
    // 0x20000 itself is still encodable.
    if divisor > 0x20000 {
        divisor = 0x1FFFF;
    }

    let doubled_rate = clk * 16 / prediv / divisor;
    let actual = doubled_rate / 2 + (doubled_rate & 1);
    (actual, encode(divisor))
}

/// Compute the divisor registers for `baudrate`.
///
/// `usb_index` is the 1-based interface index, which H-type chips expect
/// in the low byte of `wIndex`. Returns `None` for a zero rate.
pub(crate) fn convert_baudrate(baudrate: u32, chip: ChipType, usb_index: u16) -> Option<Divisor> {
    if baudrate == 0 {
        return None;
    }

    let (actual, encoded) = if chip.is_h_type() {
        if baudrate as u64 * 10 > H_CLK as u64 / 0x3FFF {
            let (actual, encoded) = clk_divisor(baudrate, H_CLK, 10);
            // Select the 120 MHz / 10 clock.
            (actual, encoded | 0x20000)
        } else {
            clk_divisor(baudrate, C_CLK, 16)
        }
    } else if chip == ChipType::Am {
        am_divisor(baudrate)
    } else {
        clk_divisor(baudrate, C_CLK, 16)
    };

    if actual == 0 {
        return None;
    }

    let index = if chip.is_h_type() {
        ((encoded >> 8) as u16 & 0xFF00) | usb_index
    } else {
        (encoded >> 16) as u16
    };

    Some(Divisor {
        actual,
        value: encoded as u16,
        index,
    })
}

/// Whether `actual` is within ~5% of `requested`.
pub(crate) fn within_tolerance(requested: u32, actual: u32) -> bool {
    let (requested, actual) = (requested as u64, actual as u64);
    if actual * 2 < requested {
        return false;
    }
    if actual < requested {
        actual * 21 >= requested * 20
    } else {
        requested * 21 >= actual * 20
    }
}
