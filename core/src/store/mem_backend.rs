use super::ByteStore;
use log::debug;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use ruc::*;
use std::{collections::HashMap, sync::Arc};

type SharedBuf = Arc<Mutex<Vec<u8>>>;

// All named in-memory stores of the process. Mutations of the map itself
// are serialized by this single mutex.
static REGISTRY: Lazy<Mutex<HashMap<String, SharedBuf>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Named, process-shared in-memory store.
pub struct MemStore {
    name: String,
    buf: SharedBuf,
    writable: bool,
}

impl MemStore {
    /// Create-or-join the buffer registered under `name`.
    pub fn attach(name: &str) -> Self {
        let buf = REGISTRY.lock().entry(name.to_owned()).or_default().clone();
        debug!("attached memory store `{}`", name);
        Self {
            name: name.to_owned(),
            buf,
            writable: true,
        }
    }

    /// Join an existing buffer without write access.
    pub fn attach_read_only(name: &str) -> Result<Self> {
        let buf = REGISTRY
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| eg!(format!("no memory store named `{name}`")))?;
        Ok(Self {
            name: name.to_owned(),
            buf,
            writable: false,
        })
    }

    /// Whether a buffer named `name` currently exists.
    pub fn exists(name: &str) -> bool {
        REGISTRY.lock().contains_key(name)
    }

    /// Remove `name` from the registry. Live handles keep their buffer.
    pub fn drop_named(name: &str) -> bool {
        REGISTRY.lock().remove(name).is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ByteStore for MemStore {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let data = self.buf.lock();
        let start = offset as usize;
        let end = start + buf.len();
        alt!(
            end > data.len(),
            return Err(eg!(format!(
                "short read at {}..{} (store is {} bytes)",
                start,
                end,
                data.len()
            )))
        );
        buf.copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        alt!(!self.writable, return Err(eg!("store is read-only")));
        let mut buf = self.buf.lock();
        let end = offset as usize + data.len();
        if end > buf.len() {
            buf.resize(end, 0);
        }
        buf[offset as usize..end].copy_from_slice(data);
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.buf.lock().len() as u64)
    }

    fn truncate(&mut self, len: u64) -> Result<()> {
        alt!(!self.writable, return Err(eg!("store is read-only")));
        self.buf.lock().resize(len as usize, 0);
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}
