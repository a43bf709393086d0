//!
//! Cell-backed views over the descriptors of an open database.
//!
//! `Schema::build` walks the layout exactly once, in file order, and
//! binds every cell to its offset. Creation and open run the same walk,
//! so the offsets can never drift between the two paths.
//!

use crate::common::{
    CF_NAME_SIZE, DS_NAME_SIZE, DS_TYPE_SIZE, LAST_DS_SIZE, VERSION_3,
};
use crate::format::{
    self, Layout, ARC_DEF_SIZE, CDP_PREP_SIZE, DS_DEF_SIZE, HEADER_SCRATCH,
    PDP_PREP_SIZE, PREFIX_SIZE, SLOT,
};
use crate::store::{
    cells::{Allocator, DoubleCell, IntCell, StrCell},
    ByteStore,
};
use ruc::*;

/// Fixed header counters plus the live last-update cells.
pub(crate) struct Header {
    pub version: StrCell,
    pub ds_count: IntCell,
    pub arc_count: IntCell,
    pub step: IntCell,
    pub last_update: IntCell,
    /// Present from format version 3 on; always written as zero.
    pub last_update_us: Option<IntCell>,
}

/// One data source descriptor plus its PDP prep block.
pub(crate) struct DataSource {
    pub name: StrCell,
    pub kind: StrCell,
    pub heartbeat: IntCell,
    pub min: DoubleCell,
    pub max: DoubleCell,
    /// Raw text of the most recent reading, `U` when unknown.
    pub last_ds: StrCell,
    /// Unknown seconds inside the current primary window.
    pub unknown_sec: IntCell,
    /// Partial integral over the known part of the current window.
    pub scratch: DoubleCell,
}

/// Consolidation state of one archive for one data source.
pub(crate) struct ArcState {
    /// Consolidated value in progress.
    pub value: DoubleCell,
    /// Primary points unknown in the value in progress.
    pub unknown_steps: IntCell,
}

/// One archive descriptor with its states and ring buffer.
pub(crate) struct Archive {
    pub cf: StrCell,
    pub rows: IntCell,
    pub pdp_per_row: IntCell,
    pub xff: DoubleCell,
    /// Absolute ring index of the newest stored row.
    pub cur_row: IntCell,
    pub states: Vec<ArcState>,
    pub robin: Robin,
}

/// Ring-buffer view over a contiguous block of doubles. Rows wrap; a
/// row index may be any integer and is reduced modulo the ring length.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Robin {
    base: u64,
    rows: u32,
    width: u32,
    layout: Layout,
}

impl Robin {
    pub fn rows(&self) -> u32 {
        self.rows
    }

    fn cell(&self, row: i64, col: u32) -> DoubleCell {
        let row = row.rem_euclid(self.rows as i64) as u64;
        let ofs = self.base + (row * self.width as u64 + col as u64) * 8;
        DoubleCell::new(ofs, self.layout)
    }

    pub fn get(&self, sto: &dyn ByteStore, row: i64, col: u32) -> Result<f64> {
        self.cell(row, col).get(sto).c(d!())
    }

    pub fn set(&self, sto: &mut dyn ByteStore, row: i64, col: u32, v: f64) -> Result<()> {
        self.cell(row, col).set(sto, v).c(d!())
    }
}

/// Every cell of a database, bound to its offset.
pub(crate) struct Schema {
    pub layout: Layout,
    pub version: String,
    pub header: Header,
    pub sources: Vec<DataSource>,
    pub archives: Vec<Archive>,
    pub total_size: u64,
}

impl Schema {
    /// Bind all cells for a database with `ds_count` sources and one
    /// archive per entry of `arc_rows`.
    pub fn build(
        layout: Layout,
        version: &str,
        ds_count: usize,
        arc_rows: &[u32],
    ) -> Self {
        let arc_count = arc_rows.len();
        let mut alc = Allocator::new();

        alc.take(4);
        let version_cell = StrCell::new(alc.take(5), 5);
        alc.align(layout.alignment as u64);
        alc.take(8); // float cookie
        let ds_count_cell = IntCell::slot(alc.take(SLOT), layout);
        let arc_count_cell = IntCell::slot(alc.take(SLOT), layout);
        let step_cell = IntCell::slot(alc.take(SLOT), layout);
        alc.take(HEADER_SCRATCH);

        let mut sources = Vec::with_capacity(ds_count);
        for _ in 0..ds_count {
            let base = alc.take(DS_DEF_SIZE);
            sources.push(DataSource {
                name: StrCell::new(base, DS_NAME_SIZE),
                kind: StrCell::new(base + 20, DS_TYPE_SIZE),
                heartbeat: IntCell::slot(base + 40, layout),
                min: DoubleCell::new(base + 48, layout),
                max: DoubleCell::new(base + 56, layout),
                // prep cells are bound further down
                last_ds: StrCell::new(0, LAST_DS_SIZE),
                unknown_sec: IntCell::packed(0, layout),
                scratch: DoubleCell::new(0, layout),
            });
        }

        struct ArcSeed {
            cf: StrCell,
            rows: IntCell,
            pdp_per_row: IntCell,
            xff: DoubleCell,
        }
        let mut seeds = Vec::with_capacity(arc_count);
        for _ in 0..arc_count {
            let base = alc.take(ARC_DEF_SIZE);
            seeds.push(ArcSeed {
                cf: StrCell::new(base, CF_NAME_SIZE),
                rows: IntCell::packed(base + 20, layout),
                pdp_per_row: IntCell::packed(base + 24, layout),
                xff: DoubleCell::new(base + 32, layout),
            });
        }

        let last_update = IntCell::slot(alc.take(SLOT), layout);
        let last_update_us = if version == VERSION_3 {
            Some(IntCell::slot(alc.take(SLOT), layout))
        } else {
            None
        };

        for src in sources.iter_mut() {
            let base = alc.take(PDP_PREP_SIZE);
            src.last_ds = StrCell::new(base, LAST_DS_SIZE);
            src.unknown_sec = IntCell::packed(base + 32, layout);
            src.scratch = DoubleCell::new(base + 40, layout);
        }

        let mut all_states = Vec::with_capacity(arc_count);
        for _ in 0..arc_count {
            let mut states = Vec::with_capacity(ds_count);
            for _ in 0..ds_count {
                let base = alc.take(CDP_PREP_SIZE);
                states.push(ArcState {
                    value: DoubleCell::new(base, layout),
                    unknown_steps: IntCell::packed(base + 8, layout),
                });
            }
            all_states.push(states);
        }

        let mut cur_rows = Vec::with_capacity(arc_count);
        for _ in 0..arc_count {
            cur_rows.push(IntCell::slot(alc.take(SLOT), layout));
        }

        let mut archives = Vec::with_capacity(arc_count);
        for (j, (seed, states)) in
            seeds.into_iter().zip(all_states.into_iter()).enumerate()
        {
            let rows = arc_rows[j];
            let base = alc.take(rows as u64 * ds_count as u64 * 8);
            archives.push(Archive {
                cf: seed.cf,
                rows: seed.rows,
                pdp_per_row: seed.pdp_per_row,
                xff: seed.xff,
                cur_row: cur_rows[j],
                states,
                robin: Robin {
                    base,
                    rows,
                    width: ds_count as u32,
                    layout,
                },
            });
        }

        Self {
            layout,
            version: version.to_owned(),
            header: Header {
                version: version_cell,
                ds_count: ds_count_cell,
                arc_count: arc_count_cell,
                step: step_cell,
                last_update,
                last_update_us,
            },
            sources,
            archives,
            total_size: alc.pos(),
        }
    }

    /// Read the shape of an existing store, then bind all cells.
    pub fn probe(sto: &dyn ByteStore) -> Result<Self> {
        let mut prefix = [0_u8; PREFIX_SIZE];
        sto.read_at(0, &mut prefix)
            .c(d!("InvalidFormat: file too short for a database header"))?;
        let (layout, version) = format::detect(&prefix).c(d!())?;

        let hdr_base = layout.cookie_ofs() + 8;
        let ds_count = IntCell::slot(hdr_base, layout).get(sto).c(d!())?;
        let arc_count = IntCell::slot(hdr_base + SLOT, layout).get(sto).c(d!())?;
        alt!(
            ds_count < 1 || arc_count < 1,
            return Err(eg!("InvalidFormat: corrupt header (empty schema)"))
        );

        let arc_base = layout.header_size() + ds_count as u64 * DS_DEF_SIZE;
        let mut arc_rows = Vec::with_capacity(arc_count as usize);
        for j in 0..arc_count as u64 {
            let rows = IntCell::packed(arc_base + j * ARC_DEF_SIZE + 20, layout)
                .get(sto)
                .c(d!())?;
            alt!(rows < 1, return Err(eg!("InvalidFormat: corrupt archive descriptor")));
            arc_rows.push(rows as u32);
        }

        let schema = Self::build(layout, &version, ds_count as usize, &arc_rows);
        let len = sto.len().c(d!())?;
        alt!(
            len != schema.total_size,
            return Err(eg!(format!(
                "InvalidFormat: database is {} bytes, layout needs {}",
                len, schema.total_size
            )))
        );
        Ok(schema)
    }
}
