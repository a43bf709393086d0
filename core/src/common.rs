//!
//! # Common constants and helpers
//!

/// First four bytes of every database file.
pub const SIGNATURE: &[u8; 4] = b"RRD\0";

/// Oldest format revision the engine can still read.
pub const VERSION_1: &str = "0001";

/// The revision written by this engine; adds the microsecond cell
/// next to the last-update timestamp.
pub const VERSION_3: &str = "0003";

/// Sentinel double stored right after the version string. Its byte
/// pattern and position identify the endianness and alignment of a file.
pub const FLOAT_COOKIE: f64 = 8.642135e130;

/// `FLOAT_COOKIE` in big-endian byte order.
pub const FLOAT_COOKIE_BE: [u8; 8] = [0x5b, 0x1f, 0x2b, 0x43, 0xc7, 0xc0, 0x25, 0x2f];

/// Width of a data source name cell, including the trailing NUL.
pub const DS_NAME_SIZE: usize = 20;

/// Width of a data source type cell.
pub const DS_TYPE_SIZE: usize = 20;

/// Width of a consolidation function name cell.
pub const CF_NAME_SIZE: usize = 20;

/// Width of the last-reading cell.
pub const LAST_DS_SIZE: usize = 30;

/// A primary data point whose window is unknown for more than this
/// fraction of its length is itself unknown.
pub const MAX_UNKNOWN_FRACTION: f64 = 0.5;

/// Largest timestamp the on-disk `i32` cells can carry.
pub const MAX_TIMESTAMP: i64 = i32::MAX as i64;

/// Round `t` down to the previous multiple of `unit`.
#[inline(always)]
pub fn normalize(t: i64, unit: i64) -> i64 {
    t - t.rem_euclid(unit)
}

/// Round `t` up to the next multiple of `unit`.
#[inline(always)]
pub fn normalize_up(t: i64, unit: i64) -> i64 {
    let r = t.rem_euclid(unit);
    if r == 0 { t } else { t - r + unit }
}
