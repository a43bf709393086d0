//!
//! # Byte stores
//!
//! Random-access, length-addressable stores of raw bytes. All persistence
//! goes through this interface; the typed-cell layer above it is the only
//! direct client.
//!

pub(crate) mod cells;

mod file_backend;
mod mem_backend;

pub use file_backend::FileStore;
pub use mem_backend::MemStore;

use ruc::*;

/// Low-level storage interface.
pub trait ByteStore: Send {
    /// Fill `buf` starting at `offset`. Short reads are errors.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Write `data` at `offset`, extending the store if needed.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()>;

    /// Current size in bytes.
    fn len(&self) -> Result<u64>;

    fn is_empty(&self) -> Result<bool> {
        self.len().map(|l| 0 == l)
    }

    /// Grow or shrink the store to exactly `len` bytes.
    fn truncate(&mut self, len: u64) -> Result<()>;

    /// Push buffered writes down to the durable medium.
    fn sync(&mut self) -> Result<()>;
}
