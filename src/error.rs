//! Error types for the briteblox crate.

use std::collections::TryReserveError;

use nusb::transfer::TransferError;
use nusb::GetDescriptorError;

use crate::types::{BitMode, ChipType};

/// The error type for BriteBlox operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The context could not reserve its EEPROM staging area.
    #[error("out of memory: {0}")]
    Allocation(#[from] TryReserveError),

    /// An error from the nusb USB layer (enumeration, open, permissions).
    #[error("USB error: {0}")]
    Usb(#[from] nusb::Error),

    /// A USB transfer failed for a reason other than a timeout.
    #[error("USB transfer error: {0}")]
    Transfer(TransferError),

    /// A string descriptor could not be read.
    #[error("descriptor error: {0}")]
    Descriptor(GetDescriptorError),

    /// No matching device was found on the bus.
    #[error("device not found")]
    DeviceNotFound,

    /// The USB interface could not be claimed.
    #[error("unable to claim USB device; make sure the default FTDI driver is not in use")]
    ClaimFailed,

    /// The device answered with fewer bytes than requested.
    #[error("short transfer: expected {expected} bytes, got {actual}")]
    ShortTransfer {
        /// Bytes requested.
        expected: usize,
        /// Bytes received.
        actual: usize,
    },

    /// A transfer did not complete within its timeout.
    #[error("USB transfer timed out")]
    Timeout,

    /// `open` was called on a context that already holds an open device.
    #[error("device already open")]
    AlreadyOpen,

    /// The operation needs an open device.
    #[error("USB device unavailable (context not open)")]
    NotOpen,

    /// The operation needs a bitbang mode to be active.
    #[error("bitbang mode is not enabled")]
    BitbangDisabled,

    /// A raw mode value does not name any known bit mode.
    #[error("invalid bit mode value {0:#04x}")]
    InvalidModeValue(u8),

    /// The connected chip cannot run the requested bit mode.
    #[error("bit mode {mode:?} is not supported by chip type {chip:?}")]
    InvalidMode {
        /// The requested mode.
        mode: BitMode,
        /// The detected chip.
        chip: ChipType,
    },

    /// An EEPROM word address lies outside the chip's EEPROM.
    #[error("EEPROM address {addr:#x} out of range (chip has {words} words)")]
    OutOfRange {
        /// The requested word address.
        addr: u16,
        /// Number of addressable words.
        words: u16,
    },

    /// More EEPROM bytes were requested than are staged.
    #[error("requested {requested} EEPROM bytes but only {available} are staged")]
    SizeMismatch {
        /// Bytes requested by the caller.
        requested: usize,
        /// Bytes held in the staging area.
        available: usize,
    },

    /// Invalid argument(s) were provided.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The requested baud rate cannot be achieved within tolerance.
    #[error("unsupported baud rate: requested {requested}, nearest achievable {actual}")]
    UnsupportedBaudRate {
        /// The requested baud rate.
        requested: u32,
        /// The nearest achievable baud rate.
        actual: u32,
    },

    /// The operation is not supported for this chip type.
    #[error("unsupported operation for chip type {0:?}")]
    UnsupportedChip(ChipType),
}

/// A specialized `Result` type for BriteBlox operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
///
/// Callers that only need to decide *what kind* of failure happened
/// (for example to tell a transport failure from a bad argument) should
/// match on this instead of the full error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Context creation could not allocate.
    Allocation,
    /// Transport-level failure: not found, permission denied, transfer failed.
    Usb,
    /// The context is already open.
    AlreadyOpen,
    /// The context is not open, or not in the mode the call needs.
    NotOpen,
    /// Unknown or unsupported bit mode.
    InvalidMode,
    /// EEPROM address out of range.
    OutOfRange,
    /// Requested size exceeds the staged EEPROM data.
    SizeMismatch,
    /// A transfer timed out.
    Timeout,
    /// A caller-supplied argument was rejected.
    InvalidArgument,
    /// The chip does not support the operation.
    Unsupported,
}

impl Error {
    /// The class this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Allocation(_) => ErrorKind::Allocation,
            Self::Usb(_)
            | Self::Transfer(_)
            | Self::Descriptor(_)
            | Self::DeviceNotFound
            | Self::ClaimFailed
            | Self::ShortTransfer { .. } => ErrorKind::Usb,
            Self::Timeout => ErrorKind::Timeout,
            Self::AlreadyOpen => ErrorKind::AlreadyOpen,
            Self::NotOpen | Self::BitbangDisabled => ErrorKind::NotOpen,
            Self::InvalidModeValue(_) | Self::InvalidMode { .. } => ErrorKind::InvalidMode,
            Self::OutOfRange { .. } => ErrorKind::OutOfRange,
            Self::SizeMismatch { .. } => ErrorKind::SizeMismatch,
            Self::InvalidArgument(_) | Self::UnsupportedBaudRate { .. } => {
                ErrorKind::InvalidArgument
            }
            Self::UnsupportedChip(_) => ErrorKind::Unsupported,
        }
    }

    /// Negative status code for callers that report integer statuses.
    ///
    /// Every class maps to a distinct value; success is never represented.
    pub fn code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Usb => -1,
            ErrorKind::NotOpen => -2,
            ErrorKind::Allocation => -3,
            ErrorKind::AlreadyOpen => -4,
            ErrorKind::InvalidMode => -5,
            ErrorKind::OutOfRange => -6,
            ErrorKind::SizeMismatch => -7,
            ErrorKind::Timeout => -8,
            ErrorKind::InvalidArgument => -9,
            ErrorKind::Unsupported => -10,
        }
    }
}

impl From<TransferError> for Error {
    /// Blocking transfers that hit their timeout complete as cancelled.
    fn from(e: TransferError) -> Self {
        match e {
            TransferError::Cancelled => Error::Timeout,
            other => Error::Transfer(other),
        }
    }
}

impl From<GetDescriptorError> for Error {
    /// A string descriptor read that hits its timeout is a timeout too.
    fn from(e: GetDescriptorError) -> Self {
        match e {
            GetDescriptorError::Transfer(t) => Error::from(t),
            other => Error::Descriptor(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_transfer_is_timeout() {
        let err = Error::from(TransferError::Cancelled);
        assert!(matches!(err, Error::Timeout));
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn cancelled_descriptor_read_is_timeout() {
        let err = Error::from(GetDescriptorError::Transfer(TransferError::Cancelled));
        assert!(matches!(err, Error::Timeout));
        assert_eq!(err.code(), -8);

        let err = Error::from(GetDescriptorError::Transfer(TransferError::Stall));
        assert!(matches!(err, Error::Transfer(TransferError::Stall)));
        let err = Error::from(GetDescriptorError::InvalidDescriptor);
        assert!(matches!(err, Error::Descriptor(_)));
        assert_eq!(err.kind(), ErrorKind::Usb);
    }

    #[test]
    fn stall_is_usb_class() {
        let err = Error::from(TransferError::Stall);
        assert_eq!(err.kind(), ErrorKind::Usb);
        assert_eq!(err.code(), -1);
    }

    #[test]
    fn bitbang_disabled_is_not_open_class() {
        assert_eq!(Error::BitbangDisabled.kind(), ErrorKind::NotOpen);
        assert_eq!(Error::BitbangDisabled.code(), Error::NotOpen.code());
    }

    #[test]
    fn codes_are_negative_and_messages_non_empty() {
        let errors = [
            Error::DeviceNotFound,
            Error::Timeout,
            Error::AlreadyOpen,
            Error::NotOpen,
            Error::InvalidModeValue(0x03),
            Error::OutOfRange { addr: 0x80, words: 0x40 },
            Error::SizeMismatch {
                requested: 256,
                available: 128,
            },
            Error::InvalidArgument("x"),
            Error::UnsupportedChip(ChipType::Bm),
        ];
        for err in &errors {
            assert!(err.code() < 0, "{err:?}");
            assert!(!err.to_string().is_empty(), "{err:?}");
        }
    }
}
