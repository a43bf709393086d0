//!
//! # On-disk format
//!
//! Identification and geometry of the binary layout. A file starts with
//! the four-byte signature, a five-byte version string, padding up to the
//! alignment boundary, and the float cookie whose byte pattern pins down
//! the endianness of everything that follows.
//!
//! New files are always written in host byte order with 8-byte alignment;
//! the reader additionally accepts the three other legacy shapes.
//!


use crate::common::{FLOAT_COOKIE, FLOAT_COOKIE_BE, SIGNATURE, VERSION_1, VERSION_3};
use crate::store::ByteStore;
use ruc::*;

/// Size of one descriptor slot.
pub const SLOT: u64 = 8;

/// Unused scratch slots at the end of the header block.
pub const HEADER_SCRATCH: u64 = 80;

/// Bytes per data source descriptor.
pub const DS_DEF_SIZE: u64 = 120;

/// Bytes per archive descriptor.
pub const ARC_DEF_SIZE: u64 = 112;

/// Bytes per per-source PDP prep block.
pub const PDP_PREP_SIZE: u64 = 112;

/// Bytes per per-archive, per-source CDP prep block.
pub const CDP_PREP_SIZE: u64 = 80;

/// How many bytes of prefix `detect` needs.
pub const PREFIX_SIZE: usize = 24;

/// Physical shape of a database file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Layout {
    pub big_endian: bool,
    pub alignment: u32,
}

impl Layout {
    /// The shape this engine writes: host byte order, 8-byte aligned.
    pub fn native() -> Self {
        Self {
            big_endian: cfg!(target_endian = "big"),
            alignment: 8,
        }
    }

    /// Offset of the float cookie, right after the signature padding.
    pub fn cookie_ofs(&self) -> u64 {
        if 8 == self.alignment { 16 } else { 12 }
    }

    /// Offset of the first data source descriptor.
    pub fn header_size(&self) -> u64 {
        self.cookie_ofs() + 8 + 3 * SLOT + HEADER_SCRATCH
    }
}

/// Classify a file prefix: signature, version, cookie position and byte
/// order. Unknown versions and unrecognizable cookies are rejected.
pub fn detect(prefix: &[u8; PREFIX_SIZE]) -> Result<(Layout, String)> {
    alt!(
        &prefix[..4] != SIGNATURE,
        return Err(eg!("InvalidFormat: not a round-robin database (bad signature)"))
    );

    alt!(
        0 != prefix[8],
        return Err(eg!("InvalidFormat: not a round-robin database (unterminated version)"))
    );
    let version = String::from_utf8(prefix[4..8].to_vec()).c(d!())?;
    alt!(
        version != VERSION_1 && version != VERSION_3,
        return Err(eg!(format!("UnsupportedVersion: format revision `{version}`")))
    );

    for alignment in [4_u32, 8] {
        let p = if 8 == alignment { 16 } else { 12 };
        let window = &prefix[p..p + 8];
        if window == FLOAT_COOKIE_BE {
            return Ok((
                Layout {
                    big_endian: true,
                    alignment,
                },
                version,
            ));
        }
        let le: Vec<u8> = FLOAT_COOKIE_BE.iter().rev().copied().collect();
        if window == &le[..] {
            return Ok((
                Layout {
                    big_endian: false,
                    alignment,
                },
                version,
            ));
        }
    }

    Err(eg!("InvalidFormat: not a round-robin database (float cookie not found)"))
}

/// Write signature, version and cookie for a fresh file.
pub(crate) fn write_prelude(
    sto: &mut dyn ByteStore,
    layout: Layout,
    version: &str,
) -> Result<()> {
    sto.write_at(0, SIGNATURE).c(d!())?;
    let mut v = [0_u8; 5];
    v[..4].copy_from_slice(version.as_bytes());
    sto.write_at(4, &v).c(d!())?;
    let cookie = if layout.big_endian {
        FLOAT_COOKIE.to_be_bytes()
    } else {
        FLOAT_COOKIE.to_le_bytes()
    };
    sto.write_at(layout.cookie_ofs(), &cookie).c(d!())
}
