//!
//! # Data processor
//!
//! Named virtual series over one query window. Sources either pull a
//! data source from an archive (by path, name and consolidation
//! function) or derive from previously declared series: RPN
//! expressions, constants, and the rate-to-amount step transform.
//! Everything is aligned on one timestamp grid, the requested
//! resolution or the coarsest fetched source.
//!

mod rpn;

#[cfg(test)]
mod test;

use chrono::{Local, TimeZone};
use log::debug;
use rpn::{RpnCtx, RpnExpr};
use rrdb_core::{ConsolidationFn, Database, FetchRequest, FetchResult, OpenMode};
use ruc::*;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::SystemTime};

use crate::timespec::TimeSpec;

const DEFAULT_STEP: i64 = 300;

enum Def {
    Archive {
        path: String,
        ds: String,
        cf: ConsolidationFn,
    },
    Rpn(String),
    Constant(f64),
    /// Source values multiplied by the grid step: rates become amounts.
    StepTotal(String),
}

/// Declares and evaluates named series over a fixed window.
pub struct DataProcessor {
    start: i64,
    end: i64,
    resolution: Option<i64>,
    defs: Vec<(String, Def)>,
}

impl DataProcessor {
    /// Window `[start, end]`; passing `(0, 0)` means the last 24 hours.
    pub fn new(start: i64, end: i64) -> Self {
        Self {
            start,
            end,
            resolution: None,
            defs: Vec::new(),
        }
    }

    /// Window from a resolved at-style pair.
    pub fn from_specs(start: &TimeSpec, end: &TimeSpec) -> Result<Self> {
        let (s, e) = TimeSpec::resolve_pair(start, end).c(d!())?;
        Ok(Self::new(s, e))
    }

    /// Force the grid step instead of following the coarsest source.
    pub fn set_resolution(&mut self, sec: i64) -> &mut Self {
        self.resolution = Some(sec);
        self
    }

    /// Pull `ds` consolidated with `cf` out of the database at `path`.
    pub fn def_archive(&mut self, name: &str, path: &str, ds: &str, cf: ConsolidationFn) -> &mut Self {
        self.defs.push((
            name.to_owned(),
            Def::Archive {
                path: path.to_owned(),
                ds: ds.to_owned(),
                cf,
            },
        ));
        self
    }

    /// Derive a series from earlier ones with an RPN expression.
    pub fn def_rpn(&mut self, name: &str, expr: &str) -> &mut Self {
        self.defs.push((name.to_owned(), Def::Rpn(expr.to_owned())));
        self
    }

    pub fn def_constant(&mut self, name: &str, v: f64) -> &mut Self {
        self.defs.push((name.to_owned(), Def::Constant(v)));
        self
    }

    /// `source × step`: turn a per-second rate into a per-row amount.
    pub fn def_step_total(&mut self, name: &str, source: &str) -> &mut Self {
        self.defs
            .push((name.to_owned(), Def::StepTotal(source.to_owned())));
        self
    }

    /// Fetch, align and evaluate every declared series.
    pub fn process(&self) -> Result<ProcessedSeries> {
        let now = epoch_now().c(d!())?;
        let (start, end) = if 0 == self.start && 0 == self.end {
            (now - 86_400, now)
        } else {
            (self.start, self.end)
        };
        alt!(
            start >= end,
            return Err(eg!(format!("empty processing window [{start}, {end}]")))
        );
        alt!(self.defs.is_empty(), return Err(eg!("nothing to process")));

        // fetch phase
        let mut fetched: HashMap<usize, FetchResult> = HashMap::new();
        for (i, (name, def)) in self.defs.iter().enumerate() {
            if let Def::Archive { path, ds, cf } = def {
                let db = Database::open(path, OpenMode::ReadOnly).c(d!())?;
                let req = FetchRequest::new(*cf, start, end)
                    .with_resolution(self.resolution.unwrap_or(1))
                    .with_filter(&[ds.as_str()]);
                let r = db.fetch(&req).c(d!())?;
                debug!("fetched `{name}` from {path}: {} rows at {}s", r.rows(), r.step);
                fetched.insert(i, r);
            }
        }

        let step = self
            .resolution
            .or_else(|| fetched.values().map(|r| r.step).max())
            .unwrap_or(DEFAULT_STEP);
        let gstart = start - start.rem_euclid(step);
        let gend = {
            let r = end.rem_euclid(step);
            if 0 == r { end } else { end - r + step }
        };
        let rows = ((gend - gstart) / step + 1) as usize;
        let timestamps: Vec<i64> =
            (0..rows).map(|i| gstart + i as i64 * step).collect();

        // evaluation phase, in declaration order
        let mut names: Vec<String> = Vec::with_capacity(self.defs.len());
        let mut columns: Vec<Vec<f64>> = Vec::with_capacity(self.defs.len());
        let index_of = |names: &[String], want: &str| -> Result<usize> {
            names
                .iter()
                .position(|n| n == want)
                .ok_or_else(|| eg!(format!("no series named `{want}`")))
        };

        let local_offset = Local
            .timestamp_opt(gstart, 0)
            .single()
            .map(|dt| dt.offset().local_minus_utc() as i64)
            .unwrap_or(0);

        for (i, (name, def)) in self.defs.iter().enumerate() {
            alt!(
                names.iter().any(|n| n == name),
                return Err(eg!(format!("duplicate series name `{name}`")))
            );
            let col = match def {
                Def::Archive { ds, .. } => {
                    let r = &fetched[&i];
                    let src = r
                        .column(ds)
                        .ok_or_else(|| eg!(format!("no data source named `{ds}`")))?;
                    align(&timestamps, r, src)
                }
                Def::Constant(v) => vec![*v; rows],
                Def::StepTotal(source) => {
                    let idx = index_of(&names, source).c(d!())?;
                    columns[idx].iter().map(|v| v * step as f64).collect()
                }
                Def::Rpn(expr) => {
                    let compiled = RpnExpr::parse(expr, |n| {
                        names.iter().position(|have| have == n)
                    })
                    .c(d!())?;
                    let mut out = Vec::with_capacity(rows);
                    for row in 0..rows {
                        let ctx = RpnCtx {
                            ts: timestamps[row],
                            step,
                            now,
                            local_offset,
                            prev: if 0 == row {
                                f64::NAN
                            } else {
                                out[row - 1]
                            },
                        };
                        out.push(compiled.eval(&ctx, &columns, row));
                    }
                    out
                }
            };
            names.push(name.clone());
            columns.push(col);
        }

        Ok(ProcessedSeries {
            step,
            timestamps,
            names,
            columns,
        })
    }
}

/// Sample a fetched column onto the processing grid: each grid point
/// takes the consolidated row covering it, NaN outside the fetch.
fn align(grid: &[i64], r: &FetchResult, src: &[f64]) -> Vec<f64> {
    let first = match r.timestamps.first() {
        Some(t) => *t,
        None => return vec![f64::NAN; grid.len()],
    };
    grid.iter()
        .map(|t| {
            let covering = {
                let rem = (*t - first).rem_euclid(r.step);
                if 0 == rem { *t } else { *t - rem + r.step }
            };
            let idx = (covering - first) / r.step;
            if idx < 0 || idx as usize >= src.len() {
                f64::NAN
            } else {
                src[idx as usize]
            }
        })
        .collect()
}

/// Aligned evaluation output: a shared timestamp axis plus one column
/// per declared series.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessedSeries {
    pub step: i64,
    pub timestamps: Vec<i64>,
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl ProcessedSeries {
    pub fn rows(&self) -> usize {
        self.timestamps.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn series(&self, name: &str) -> Option<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| &self.columns[i][..])
    }

    pub fn value(&self, row: usize, name: &str) -> Option<f64> {
        self.series(name).and_then(|c| c.get(row).copied())
    }
}

fn epoch_now() -> Result<i64> {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .c(d!())
        .map(|d| d.as_secs() as i64)
}
