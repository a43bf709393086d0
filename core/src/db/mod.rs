//!
//! # Database handle
//!
//! Owns the byte store and the cell schema, and enforces the lifecycle:
//! a handle is `Open` (read-write or read-only) until `close`, which is
//! idempotent. A storage failure during a mutation poisons the handle;
//! every further write fails until the database is reopened.
//!

#[cfg(test)]
mod test;

use crate::common::{normalize, MAX_TIMESTAMP, VERSION_3};
use crate::format::{self, Layout};
use crate::model::schema::Schema;
use crate::model::{ConsolidationFn, Definition};
use crate::store::{ByteStore, FileStore, MemStore};
use log::debug;
use ruc::*;

/// Access mode of an open handle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    Open(OpenMode),
    Closed,
}

/// An open round-robin database.
pub struct Database {
    pub(crate) store: Box<dyn ByteStore>,
    pub(crate) schema: Schema,
    pub(crate) step: i64,
    state: State,
    poisoned: bool,
}

impl Database {
    /// Create a file-backed database from `def`.
    pub fn create(def: &Definition) -> Result<Self> {
        def.validate().c(d!())?;
        let store = FileStore::create(def.path()).c(d!())?;
        Self::create_with(Box::new(store), def)
    }

    /// Create a database on the named in-memory store.
    pub fn create_named(def: &Definition) -> Result<Self> {
        def.validate().c(d!())?;
        let mut store = MemStore::attach(def.path());
        store.truncate(0).c(d!())?;
        Self::create_with(Box::new(store), def)
    }

    /// Create a database on an arbitrary store.
    pub fn create_with(mut store: Box<dyn ByteStore>, def: &Definition) -> Result<Self> {
        def.validate().c(d!())?;

        let layout = Layout::native();
        let arc_rows: Vec<u32> = def.arc_defs().iter().map(|a| a.rows).collect();
        let schema = Schema::build(layout, VERSION_3, def.ds_defs().len(), &arc_rows);

        let sto = &mut *store;
        sto.truncate(schema.total_size).c(d!())?;
        format::write_prelude(sto, layout, VERSION_3).c(d!())?;

        let hdr = &schema.header;
        hdr.version.set(sto, VERSION_3).c(d!())?;
        hdr.ds_count.set(sto, def.ds_defs().len() as i32).c(d!())?;
        hdr.arc_count.set(sto, def.arc_defs().len() as i32).c(d!())?;
        hdr.step.set(sto, def.step() as i32).c(d!())?;

        let lut = normalize(def.start(), def.step());
        hdr.last_update.set(sto, lut as i32).c(d!())?;
        if let Some(us) = hdr.last_update_us {
            us.set(sto, 0).c(d!())?;
        }

        for (src, d) in schema.sources.iter().zip(def.ds_defs().iter()) {
            src.name.set(sto, &d.name).c(d!())?;
            src.kind.set(sto, d.kind.as_str()).c(d!())?;
            src.heartbeat.set(sto, d.heartbeat as i32).c(d!())?;
            src.min.set(sto, d.min).c(d!())?;
            src.max.set(sto, d.max).c(d!())?;
            src.last_ds.set(sto, "U").c(d!())?;
            src.unknown_sec.set(sto, 0).c(d!())?;
            src.scratch.set(sto, 0.0).c(d!())?;
        }

        for (arc, a) in schema.archives.iter().zip(def.arc_defs().iter()) {
            arc.cf.set(sto, a.cf.as_str()).c(d!())?;
            arc.rows.set(sto, a.rows as i32).c(d!())?;
            arc.pdp_per_row.set(sto, a.steps as i32).c(d!())?;
            arc.xff.set(sto, a.xff).c(d!())?;
            arc.cur_row.set(sto, 0).c(d!())?;

            // primary windows between the archive boundary and the
            // normalized start predate the database and stay unknown
            let arc_step = def.step() * a.steps as i64;
            let gap = ((lut - normalize(lut, arc_step)) / def.step()) as i32;
            for st in arc.states.iter() {
                st.value.set(sto, f64::NAN).c(d!())?;
                st.unknown_steps.set(sto, gap).c(d!())?;
            }

            for row in 0..a.rows as i64 {
                for col in 0..def.ds_defs().len() as u32 {
                    arc.robin.set(sto, row, col, f64::NAN).c(d!())?;
                }
            }
        }

        sto.sync().c(d!())?;
        debug!(
            "created database `{}`: {} bytes, {} sources, {} archives",
            def.path(),
            schema.total_size,
            def.ds_defs().len(),
            def.arc_defs().len()
        );

        Ok(Self {
            store,
            step: def.step(),
            schema,
            state: State::Open(OpenMode::ReadWrite),
            poisoned: false,
        })
    }

    /// Open a file-backed database.
    pub fn open(path: &str, mode: OpenMode) -> Result<Self> {
        let store = FileStore::open(path, OpenMode::ReadOnly == mode).c(d!())?;
        Self::open_with(Box::new(store), mode)
    }

    /// Open a database on the named in-memory store.
    pub fn open_named(name: &str, mode: OpenMode) -> Result<Self> {
        alt!(
            !MemStore::exists(name),
            return Err(eg!(format!("no memory database named `{name}`")))
        );
        let store: Box<dyn ByteStore> = if OpenMode::ReadOnly == mode {
            Box::new(MemStore::attach_read_only(name).c(d!())?)
        } else {
            Box::new(MemStore::attach(name))
        };
        Self::open_with(store, mode)
    }

    /// Open a database on an arbitrary store.
    pub fn open_with(store: Box<dyn ByteStore>, mode: OpenMode) -> Result<Self> {
        let schema = Schema::probe(&*store).c(d!())?;
        let step = schema.header.step.get(&*store).c(d!())? as i64;
        alt!(step <= 0, return Err(eg!("InvalidFormat: corrupt header (bad step)")));
        Ok(Self {
            store,
            schema,
            step,
            state: State::Open(mode),
            poisoned: false,
        })
    }

    /// Flush and close. Further operations fail; closing twice is fine.
    pub fn close(&mut self) -> Result<()> {
        if let State::Open(OpenMode::ReadWrite) = self.state {
            self.store.sync().c(d!())?;
        }
        self.state = State::Closed;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        State::Closed == self.state
    }

    pub(crate) fn guard_readable(&self) -> Result<()> {
        alt!(
            State::Closed == self.state,
            return Err(eg!("DatabaseClosed: the handle is closed"))
        );
        Ok(())
    }

    pub(crate) fn guard_writable(&self) -> Result<()> {
        self.guard_readable().c(d!())?;
        alt!(
            self.poisoned,
            return Err(eg!("StorageError: a previous write failed, reopen the database"))
        );
        alt!(
            State::Open(OpenMode::ReadOnly) == self.state,
            return Err(eg!("NotWritable: database opened read-only"))
        );
        Ok(())
    }

    pub(crate) fn poison(&mut self) {
        self.poisoned = true;
    }

    // ------------------------------------------------------------------
    // introspection
    // ------------------------------------------------------------------

    /// Primary data point interval, seconds.
    pub fn step(&self) -> i64 {
        self.step
    }

    pub fn ds_count(&self) -> usize {
        self.schema.sources.len()
    }

    pub fn arc_count(&self) -> usize {
        self.schema.archives.len()
    }

    pub fn version(&self) -> &str {
        &self.schema.version
    }

    pub fn last_update(&self) -> Result<i64> {
        self.guard_readable().c(d!())?;
        self.schema
            .header
            .last_update
            .get(&*self.store)
            .map(|t| t as i64)
            .c(d!())
    }

    pub fn ds_names(&self) -> Result<Vec<String>> {
        self.guard_readable().c(d!())?;
        self.schema
            .sources
            .iter()
            .map(|s| s.name.get(&*self.store).c(d!()))
            .collect()
    }

    pub fn ds_index(&self, name: &str) -> Result<usize> {
        self.ds_names()
            .c(d!())?
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| eg!(format!("no data source named `{name}`")))
    }

    /// Seconds per row of archive `idx`.
    pub fn arc_step(&self, idx: usize) -> Result<i64> {
        let arc = self.archive(idx).c(d!())?;
        let steps = arc.pdp_per_row.get(&*self.store).c(d!())? as i64;
        Ok(self.step * steps)
    }

    pub fn arc_rows(&self, idx: usize) -> Result<u32> {
        self.archive(idx).c(d!())?;
        Ok(self.schema.archives[idx].robin.rows())
    }

    pub fn arc_cf(&self, idx: usize) -> Result<ConsolidationFn> {
        let arc = self.archive(idx).c(d!())?;
        arc.cf.get(&*self.store).c(d!())?.parse::<ConsolidationFn>().c(d!())
    }

    /// End of the window archive `idx` currently covers.
    pub fn archive_end(&self, idx: usize) -> Result<i64> {
        let arc_step = self.arc_step(idx).c(d!())?;
        Ok(normalize(self.last_update().c(d!())?, arc_step))
    }

    /// Start of the window archive `idx` currently covers.
    pub fn archive_start(&self, idx: usize) -> Result<i64> {
        let arc_step = self.arc_step(idx).c(d!())?;
        let rows = self.arc_rows(idx).c(d!())? as i64;
        Ok(self.archive_end(idx).c(d!())? - arc_step * rows)
    }

    /// Read the `nth` newest stored row of an archive; `nth == 1` is the
    /// most recent one.
    pub fn tail_value(&self, idx: usize, ds: usize, nth: u32) -> Result<f64> {
        let arc = self.archive(idx).c(d!())?;
        alt!(
            ds >= self.schema.sources.len(),
            return Err(eg!(format!("no data source #{ds}")))
        );
        alt!(nth < 1, return Err(eg!("rows are counted from 1")));
        let cur = arc.cur_row.get(&*self.store).c(d!())? as i64;
        arc.robin
            .get(&*self.store, cur - (nth as i64 - 1), ds as u32)
            .c(d!())
    }

    pub(crate) fn archive(&self, idx: usize) -> Result<&crate::model::schema::Archive> {
        self.guard_readable().c(d!())?;
        self.schema
            .archives
            .get(idx)
            .ok_or_else(|| eg!(format!("no archive #{idx}")))
    }

    /// Largest sample time the format can hold.
    pub fn max_timestamp(&self) -> i64 {
        MAX_TIMESTAMP
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let State::Open(OpenMode::ReadWrite) = self.state {
            info_omit!(self.store.sync());
        }
    }
}
