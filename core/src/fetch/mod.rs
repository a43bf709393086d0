//!
//! # Fetch engine
//!
//! Picks the best archive for a requested window and resolution, snaps
//! the window to the archive's row interval, and reads the wrapped rows
//! into a rectangular result. Positions outside the archive's covered
//! window come back as NaN.
//!

#[cfg(test)]
mod test;

use crate::common::{normalize, normalize_up};
use crate::db::Database;
use crate::model::ConsolidationFn;
use ruc::*;
use serde::{Deserialize, Serialize};

/// A consolidated-data query.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchRequest {
    pub cf: ConsolidationFn,
    pub start: i64,
    pub end: i64,
    /// Preferred seconds per row; the archive closest to it wins among
    /// the ones fully covering the window.
    pub resolution: i64,
    filter: Option<Vec<String>>,
}

impl FetchRequest {
    pub fn new(cf: ConsolidationFn, start: i64, end: i64) -> Self {
        Self {
            cf,
            start,
            end,
            resolution: 1,
            filter: None,
        }
    }

    pub fn with_resolution(mut self, resolution: i64) -> Self {
        self.resolution = resolution;
        self
    }

    /// Restrict the result to the named data sources.
    pub fn with_filter(mut self, names: &[&str]) -> Self {
        self.filter = Some(names.iter().map(|s| (*s).to_owned()).collect());
        self
    }

    fn validate(&self) -> Result<()> {
        alt!(
            self.start >= self.end,
            return Err(eg!(format!(
                "empty fetch window [{}, {}]",
                self.start, self.end
            )))
        );
        alt!(self.start < 0, return Err(eg!("fetch window before epoch")));
        alt!(
            self.resolution < 1,
            return Err(eg!("resolution must be at least one second"))
        );
        Ok(())
    }
}

/// Rectangular fetch outcome: one timestamp axis, one column per
/// selected data source. NaN positions are preserved verbatim.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchResult {
    pub cf: ConsolidationFn,
    /// Seconds between rows, the chosen archive's row interval.
    pub step: i64,
    pub names: Vec<String>,
    pub timestamps: Vec<i64>,
    columns: Vec<Vec<f64>>,
}

impl FetchResult {
    pub fn rows(&self) -> usize {
        self.timestamps.len()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| &self.columns[i][..])
    }

    pub fn column_at(&self, idx: usize) -> &[f64] {
        &self.columns[idx]
    }

    pub fn value(&self, row: usize, name: &str) -> Option<f64> {
        self.column(name).and_then(|c| c.get(row).copied())
    }
}

impl Database {
    pub fn fetch(&self, req: &FetchRequest) -> Result<FetchResult> {
        self.guard_readable().c(d!())?;
        req.validate().c(d!())?;

        let sto = &*self.store;
        let lut = self.last_update().c(d!())?;

        // pick the archive: full coverage beats overlap, closest
        // resolution breaks ties among full matches
        let mut best_full: Option<(usize, i64)> = None;
        let mut best_partial: Option<(usize, i64)> = None;
        for (j, arc) in self.schema.archives.iter().enumerate() {
            let cf: ConsolidationFn = arc.cf.get(sto).c(d!())?.parse::<ConsolidationFn>().c(d!())?;
            if cf != req.cf {
                continue;
            }
            let arc_step = self.step * arc.pdp_per_row.get(sto).c(d!())? as i64;
            let arc_end = normalize(lut, arc_step);
            let arc_start = arc_end - arc_step * arc.robin.rows() as i64;
            if arc_start <= req.start && arc_end >= req.end {
                let d = (req.resolution - arc_step).abs();
                if best_full.map(|(_, cur)| d < cur).unwrap_or(true) {
                    best_full = Some((j, d));
                }
            } else {
                let overlap =
                    req.end.min(arc_end) - req.start.max(arc_start);
                if best_partial.map(|(_, cur)| overlap > cur).unwrap_or(true) {
                    best_partial = Some((j, overlap));
                }
            }
        }
        let j = best_full
            .or(best_partial)
            .map(|(j, _)| j)
            .ok_or_else(|| {
                eg!(format!(
                    "NoMatchingArchive: no {} archive matches [{}, {}]",
                    req.cf, req.start, req.end
                ))
            })?;

        let arc = &self.schema.archives[j];
        let arc_step = self.step * arc.pdp_per_row.get(sto).c(d!())? as i64;
        let arc_end = normalize(lut, arc_step);
        let arc_start = arc_end - arc_step * arc.robin.rows() as i64;
        let cur = arc.cur_row.get(sto).c(d!())? as i64;

        let names = self.ds_names().c(d!())?;
        let picked: Vec<usize> = match &req.filter {
            None => (0..names.len()).collect(),
            Some(f) => f
                .iter()
                .map(|want| {
                    names
                        .iter()
                        .position(|n| n == want)
                        .ok_or_else(|| eg!(format!("no data source named `{want}`")))
                })
                .collect::<Result<_>>()?,
        };

        let fs = normalize(req.start, arc_step);
        let fe = normalize_up(req.end, arc_step);
        let rows_out = ((fe - fs) / arc_step + 1) as usize;

        let mut timestamps = Vec::with_capacity(rows_out);
        let mut columns = vec![vec![f64::NAN; rows_out]; picked.len()];
        for i in 0..rows_out {
            let ts = fs + i as i64 * arc_step;
            timestamps.push(ts);
            if ts > arc_start && ts <= arc_end {
                let row = cur - (arc_end - ts) / arc_step;
                for (c, ds) in picked.iter().enumerate() {
                    columns[c][i] = arc.robin.get(sto, row, *ds as u32).c(d!())?;
                }
            }
        }

        Ok(FetchResult {
            cf: req.cf,
            step: arc_step,
            names: picked.into_iter().map(|i| names[i].clone()).collect(),
            timestamps,
            columns,
        })
    }
}
