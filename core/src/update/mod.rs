//!
//! # Sample and update engine
//!
//! Turns one timestamped batch of raw readings into per-source rates,
//! folds them into the current primary window, and drives every
//! archive's consolidation when step boundaries are crossed.
//!
//! All validation and all reads happen before the first cell write, so a
//! rejected sample leaves the database untouched. A write failure after
//! that point poisons the handle.
//!


use crate::common::{normalize, LAST_DS_SIZE, MAX_TIMESTAMP, MAX_UNKNOWN_FRACTION};
use crate::db::Database;
use crate::model::{ConsolidationFn, DsType};
use log::warn;
use ruc::*;
use std::time::SystemTime;

// 32-bit counter wrap
const WRAP32: f64 = 4_294_967_296.0;
// remaining distance to the 64-bit wrap
const WRAP64: f64 = 18_446_744_069_414_584_320.0;

/// One timestamped batch of readings, one slot per data source.
/// Unset slots stay unknown.
pub struct Sample<'a> {
    db: &'a mut Database,
    time: i64,
    values: Vec<f64>,
}

impl Sample<'_> {
    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Set the reading of the named data source.
    pub fn set(&mut self, name: &str, v: f64) -> Result<&mut Self> {
        let i = self.db.ds_index(name).c(d!())?;
        self.values[i] = v;
        Ok(self)
    }

    /// Set the reading of data source `idx`.
    pub fn set_at(&mut self, idx: usize, v: f64) -> Result<&mut Self> {
        alt!(
            idx >= self.values.len(),
            return Err(eg!(format!("UpdateError: no data source #{idx}")))
        );
        self.values[idx] = v;
        Ok(self)
    }

    /// Set all readings at once.
    pub fn set_all(&mut self, vals: &[f64]) -> Result<&mut Self> {
        alt!(
            vals.len() != self.values.len(),
            return Err(eg!(format!(
                "UpdateError: expected {} readings, got {}",
                self.values.len(),
                vals.len()
            )))
        );
        self.values.copy_from_slice(vals);
        Ok(self)
    }

    /// Apply the sample to its database.
    pub fn update(self) -> Result<()> {
        let Sample { db, time, values } = self;
        db.apply_sample(time, &values).c(d!())
    }
}

impl Database {
    /// Start a sample at `time`; all readings begin unknown.
    pub fn create_sample(&mut self, time: i64) -> Result<Sample<'_>> {
        self.guard_writable().c(d!())?;
        let n = self.ds_count();
        Ok(Sample {
            db: self,
            time,
            values: vec![f64::NAN; n],
        })
    }

    /// Apply the classic `T:v1:v2:..:vN` form. `N` as the time token
    /// means "now", `U` readings are unknown.
    pub fn update_from_str(&mut self, line: &str) -> Result<()> {
        let toks: Vec<&str> = line.split(':').collect();
        alt!(
            toks.len() < 2,
            return Err(eg!(format!("Unparseable: malformed sample `{line}`")))
        );
        let time = if "N" == toks[0] {
            epoch_now().c(d!())?
        } else {
            toks[0]
                .parse()
                .map_err(|_| eg!(format!("Unparseable: bad sample time `{}`", toks[0])))?
        };
        let mut values = Vec::with_capacity(toks.len() - 1);
        for t in toks[1..].iter() {
            if "U" == *t {
                values.push(f64::NAN);
            } else {
                values.push(
                    t.parse()
                        .map_err(|_| eg!(format!("Unparseable: bad reading `{t}`")))?,
                );
            }
        }
        self.apply_sample(time, &values).c(d!())
    }

    pub(crate) fn apply_sample(&mut self, time: i64, values: &[f64]) -> Result<()> {
        self.guard_writable().c(d!())?;
        let n = self.ds_count();
        alt!(
            values.len() != n,
            return Err(eg!(format!(
                "UpdateError: expected {} readings, got {}",
                n,
                values.len()
            )))
        );
        alt!(
            time > MAX_TIMESTAMP,
            return Err(eg!(format!("UpdateError: sample time {time} beyond format range")))
        );
        let lut = self.last_update().c(d!())?;
        alt!(
            time <= lut,
            return Err(eg!(format!(
                "TimeNonMonotonic: sample time {time} not after last update {lut}"
            )))
        );

        let step = self.step;
        let interval = time - lut;
        let occu = normalize(time, step);
        let proc0 = normalize(lut, step);
        let elapsed = (occu - proc0) / step;
        // window index of the primary point being closed out
        let first_idx = proc0 / step;

        // ---- read phase: stage every new cell value in memory ----

        let sto = &*self.store;

        let mut rates = vec![f64::NAN; n];
        let mut pdp_first = vec![f64::NAN; n];
        let mut new_last = Vec::with_capacity(n);
        let mut new_scratch = vec![0.0_f64; n];
        let mut new_unknown = vec![0_i64; n];

        for (i, src) in self.schema.sources.iter().enumerate() {
            let kind: DsType = src.kind.get(sto).c(d!())?.parse::<DsType>().c(d!())?;
            let hb = src.heartbeat.get(sto).c(d!())? as i64;
            let min = src.min.get(sto).c(d!())?;
            let max = src.max.get(sto).c(d!())?;
            let prev_raw = src.last_ds.get(sto).c(d!())?;
            let scratch = src.scratch.get(sto).c(d!())?;
            let unknown = src.unknown_sec.get(sto).c(d!())? as i64;

            let reading = values[i];
            let rate = rate_of(kind, reading, &prev_raw, interval, hb, min, max);
            rates[i] = rate;

            if 0 == elapsed {
                if rate.is_nan() {
                    new_scratch[i] = scratch;
                    new_unknown[i] = unknown + interval;
                } else {
                    new_scratch[i] = scratch + rate * interval as f64;
                    new_unknown[i] = unknown;
                }
            } else {
                let pre = (proc0 + step) - lut;
                let post = time - occu;
                let (closed_val, closed_unknown) = if rate.is_nan() {
                    (scratch, unknown + pre)
                } else {
                    (scratch + rate * pre as f64, unknown)
                };
                pdp_first[i] =
                    if closed_unknown as f64 > step as f64 * MAX_UNKNOWN_FRACTION {
                        f64::NAN
                    } else {
                        closed_val / (step - closed_unknown) as f64
                    };
                if rate.is_nan() {
                    new_scratch[i] = 0.0;
                    new_unknown[i] = post;
                } else {
                    new_scratch[i] = rate * post as f64;
                    new_unknown[i] = 0;
                }
            }

            new_last.push(fmt_reading(reading));
        }

        struct ArcStage {
            states: Vec<(f64, i64)>,
            // finalized rows, oldest first
            appended: Vec<Vec<f64>>,
            new_cur: i64,
        }

        let mut stages = Vec::with_capacity(self.schema.archives.len());
        for arc in self.schema.archives.iter() {
            let s_cnt = arc.pdp_per_row.get(sto).c(d!())? as i64;
            let cf: ConsolidationFn = arc.cf.get(sto).c(d!())?.parse::<ConsolidationFn>().c(d!())?;
            let xff = arc.xff.get(sto).c(d!())?;
            let rows = arc.robin.rows() as i64;
            let cur = arc.cur_row.get(sto).c(d!())? as i64;

            let mut states = Vec::with_capacity(n);
            for st in arc.states.iter() {
                states.push((
                    st.value.get(sto).c(d!())?,
                    st.unknown_steps.get(sto).c(d!())? as i64,
                ));
            }

            let mut appended = Vec::new();
            for k in 0..elapsed {
                for i in 0..n {
                    let pdp = if 0 == k { pdp_first[i] } else { rates[i] };
                    fold(cf, &mut states[i], pdp);
                }
                if (first_idx + k).rem_euclid(s_cnt) == s_cnt - 1 {
                    appended.push(
                        states
                            .iter()
                            .map(|st| finalize(cf, st, s_cnt, xff))
                            .collect::<Vec<f64>>(),
                    );
                    states.iter_mut().for_each(|st| *st = (f64::NAN, 0));
                }
            }

            let new_cur = (cur + appended.len() as i64).rem_euclid(rows);
            stages.push(ArcStage {
                states,
                appended,
                new_cur,
            });
        }

        // ---- commit phase: only storage failures are possible now ----

        let res = (|| -> Result<()> {
            let sto = &mut *self.store;
            for (i, src) in self.schema.sources.iter().enumerate() {
                src.last_ds.set(sto, &new_last[i]).c(d!())?;
                src.unknown_sec.set(sto, new_unknown[i] as i32).c(d!())?;
                src.scratch.set(sto, new_scratch[i]).c(d!())?;
            }
            for (arc, stage) in self.schema.archives.iter().zip(stages.iter()) {
                for (st, v) in arc.states.iter().zip(stage.states.iter()) {
                    st.value.set(sto, v.0).c(d!())?;
                    st.unknown_steps.set(sto, v.1 as i32).c(d!())?;
                }
                let cur = arc.cur_row.get(&*sto).c(d!())? as i64;
                for (t, row) in stage.appended.iter().enumerate() {
                    let at = cur + 1 + t as i64;
                    for (col, v) in row.iter().enumerate() {
                        arc.robin.set(sto, at, col as u32, *v).c(d!())?;
                    }
                }
                arc.cur_row.set(sto, stage.new_cur as i32).c(d!())?;
            }
            self.schema.header.last_update.set(sto, time as i32).c(d!())?;
            if let Some(us) = self.schema.header.last_update_us {
                us.set(sto, 0).c(d!())?;
            }
            Ok(())
        })();

        if res.is_err() {
            self.poison();
        }
        res
    }
}

/// Raw reading to rate, honoring heartbeat and the min/max bounds.
fn rate_of(
    kind: DsType,
    reading: f64,
    prev_raw: &str,
    interval: i64,
    hb: i64,
    min: f64,
    max: f64,
) -> f64 {
    let dt = interval as f64;
    let mut rate = if interval > hb {
        f64::NAN
    } else {
        match kind {
            DsType::Gauge => reading,
            DsType::Counter => match parse_reading(prev_raw) {
                Some(prev) if !reading.is_nan() => {
                    let mut diff = reading - prev;
                    if diff < 0.0 {
                        diff += WRAP32;
                    }
                    if diff < 0.0 {
                        diff += WRAP64;
                    }
                    diff / dt
                }
                _ => f64::NAN,
            },
            DsType::Derive => match parse_reading(prev_raw) {
                Some(prev) if !reading.is_nan() => (reading - prev) / dt,
                _ => f64::NAN,
            },
            DsType::Absolute => reading / dt,
        }
    };

    if !rate.is_nan()
        && ((!min.is_nan() && rate < min) || (!max.is_nan() && rate > max))
    {
        warn!("rate {rate} outside [{min}, {max}], treating as unknown");
        rate = f64::NAN;
    }
    rate
}

/// Render a reading for the fixed-width last-reading cell.
fn fmt_reading(v: f64) -> String {
    if v.is_nan() {
        return "U".to_owned();
    }
    let s = format!("{v}");
    if s.len() < LAST_DS_SIZE {
        s
    } else {
        format!("{v:e}")
    }
}

fn parse_reading(s: &str) -> Option<f64> {
    if s.is_empty() || "U" == s {
        None
    } else {
        s.parse().ok()
    }
}

/// Fold one primary point into a consolidation state.
fn fold(cf: ConsolidationFn, st: &mut (f64, i64), pdp: f64) {
    if pdp.is_nan() {
        st.1 += 1;
        return;
    }
    let acc = st.0;
    st.0 = match cf {
        ConsolidationFn::Average | ConsolidationFn::Total => {
            if acc.is_nan() {
                pdp
            } else {
                acc + pdp
            }
        }
        ConsolidationFn::Min => {
            if acc.is_nan() || pdp < acc {
                pdp
            } else {
                acc
            }
        }
        ConsolidationFn::Max => {
            if acc.is_nan() || pdp > acc {
                pdp
            } else {
                acc
            }
        }
        ConsolidationFn::Last => pdp,
        ConsolidationFn::First => {
            if acc.is_nan() {
                pdp
            } else {
                acc
            }
        }
    };
}

/// Close a consolidation state into the value written to the ring.
fn finalize(cf: ConsolidationFn, st: &(f64, i64), steps: i64, xff: f64) -> f64 {
    let (acc, unknown) = *st;
    if unknown as f64 / steps as f64 > xff {
        return f64::NAN;
    }
    match cf {
        ConsolidationFn::Average => {
            if acc.is_nan() {
                f64::NAN
            } else {
                acc / (steps - unknown) as f64
            }
        }
        _ => acc,
    }
}

fn epoch_now() -> Result<i64> {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .c(d!())
        .map(|d| d.as_secs() as i64)
}
