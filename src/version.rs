//! Library version information.

/// Version of this library.
///
/// Pure data with no lifecycle: query it any time, with or without a
/// context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LibraryVersion {
    /// Major version.
    pub major: u16,
    /// Minor version.
    pub minor: u16,
    /// Micro (patch) version.
    pub micro: u16,
    /// Full version string, e.g. `"0.1.0"`.
    pub version_str: &'static str,
    /// Source snapshot the library was built from, or `"unknown"`.
    pub snapshot_str: &'static str,
}

/// The version of the running library.
///
/// `snapshot_str` is taken from the `BRITEBLOX_SNAPSHOT` environment
/// variable at build time.
pub const LIBRARY_VERSION: LibraryVersion = LibraryVersion {
    major: parse_component(env!("CARGO_PKG_VERSION_MAJOR")),
    minor: parse_component(env!("CARGO_PKG_VERSION_MINOR")),
    micro: parse_component(env!("CARGO_PKG_VERSION_PATCH")),
    version_str: env!("CARGO_PKG_VERSION"),
    snapshot_str: match option_env!("BRITEBLOX_SNAPSHOT") {
        Some(s) => s,
        None => "unknown",
    },
};

/// Return [`LIBRARY_VERSION`].
pub const fn library_version() -> LibraryVersion {
    LIBRARY_VERSION
}

const fn parse_component(s: &str) -> u16 {
    let bytes = s.as_bytes();
    let mut value = 0u16;
    let mut i = 0;
    while i < bytes.len() {
        value = value * 10 + (bytes[i] - b'0') as u16;
        i += 1;
    }
    value
}
