use super::ByteStore;
use log::debug;
use ruc::*;
use std::{
    fs::{File, OpenOptions},
    os::unix::fs::FileExt,
    path::{Path, PathBuf},
};

/// File-backed store. Holds one exclusive handle per open database;
/// two writers on the same path are undefined behavior.
pub struct FileStore {
    path: PathBuf,
    file: File,
    writable: bool,
}

impl FileStore {
    /// Create (or replace) the file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .c(d!())?;
        debug!("created backing file {}", path.display());
        Ok(Self {
            path,
            file,
            writable: true,
        })
    }

    /// Open an existing file.
    pub fn open(path: impl AsRef<Path>, read_only: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(&path)
            .c(d!())?;
        Ok(Self {
            path,
            file,
            writable: !read_only,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteStore for FileStore {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file.read_exact_at(buf, offset).c(d!())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        alt!(!self.writable, return Err(eg!("store is read-only")));
        self.file.write_all_at(data, offset).c(d!())
    }

    fn len(&self) -> Result<u64> {
        self.file.metadata().c(d!()).map(|m| m.len())
    }

    fn truncate(&mut self, len: u64) -> Result<()> {
        alt!(!self.writable, return Err(eg!("store is read-only")));
        self.file.set_len(len).c(d!())
    }

    fn sync(&mut self) -> Result<()> {
        alt!(!self.writable, return Ok(()));
        self.file.sync_data().c(d!())
    }
}
