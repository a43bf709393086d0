//!
//! # Schema model
//!
//! Declarations a database is created from, plus the cell-backed views
//! over its descriptors (`schema`). Sizes and names are fixed at
//! creation; nothing here can be altered afterwards.
//!

pub(crate) mod schema;

#[cfg(test)]
mod test;

use crate::common::{DS_NAME_SIZE, MAX_TIMESTAMP};
use ruc::*;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt, str::FromStr, time::SystemTime};

/// How raw readings are turned into rates.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum DsType {
    /// The reading is the rate.
    Gauge,
    /// Rate is the delta against the previous reading, with 32/64-bit
    /// wrap correction.
    Counter,
    /// Like `Counter`, without wrap correction.
    Derive,
    /// The reading is an amount accumulated since the previous sample.
    Absolute,
}

impl DsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DsType::Gauge => "GAUGE",
            DsType::Counter => "COUNTER",
            DsType::Derive => "DERIVE",
            DsType::Absolute => "ABSOLUTE",
        }
    }
}

impl fmt::Display for DsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DsType {
    type Err = Box<dyn RucError>;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "GAUGE" => Ok(DsType::Gauge),
            "COUNTER" => Ok(DsType::Counter),
            "DERIVE" => Ok(DsType::Derive),
            "ABSOLUTE" => Ok(DsType::Absolute),
            _ => Err(eg!(format!("DefinitionError: unknown data source type `{s}`"))),
        }
    }
}

/// How primary data points are folded into consolidated ones.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ConsolidationFn {
    Average,
    Min,
    Max,
    Last,
    First,
    Total,
}

impl ConsolidationFn {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsolidationFn::Average => "AVERAGE",
            ConsolidationFn::Min => "MIN",
            ConsolidationFn::Max => "MAX",
            ConsolidationFn::Last => "LAST",
            ConsolidationFn::First => "FIRST",
            ConsolidationFn::Total => "TOTAL",
        }
    }
}

impl fmt::Display for ConsolidationFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsolidationFn {
    type Err = Box<dyn RucError>;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "AVERAGE" => Ok(ConsolidationFn::Average),
            "MIN" => Ok(ConsolidationFn::Min),
            "MAX" => Ok(ConsolidationFn::Max),
            "LAST" => Ok(ConsolidationFn::Last),
            "FIRST" => Ok(ConsolidationFn::First),
            "TOTAL" => Ok(ConsolidationFn::Total),
            _ => Err(eg!(format!("DefinitionError: unknown consolidation function `{s}`"))),
        }
    }
}

/// One data source declaration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DsDef {
    pub name: String,
    pub kind: DsType,
    /// Maximum silence (seconds) before readings count as unknown.
    pub heartbeat: i64,
    /// Lower rate bound; NaN leaves that side unbounded.
    pub min: f64,
    /// Upper rate bound; NaN leaves that side unbounded.
    pub max: f64,
}

impl DsDef {
    pub fn new(name: &str, kind: DsType, heartbeat: i64, min: f64, max: f64) -> Result<Self> {
        let d = Self {
            name: name.to_owned(),
            kind,
            heartbeat,
            min,
            max,
        };
        d.validate().c(d!())?;
        Ok(d)
    }

    /// Parse the classic `DS:name:type:heartbeat:min:max` form;
    /// `U` leaves a bound open.
    pub fn parse(s: &str) -> Result<Self> {
        let t: Vec<&str> = s.split(':').collect();
        alt!(
            6 != t.len() || "DS" != t[0],
            return Err(eg!(format!("DefinitionError: malformed data source spec `{s}`")))
        );
        Self::new(
            t[1],
            t[2].parse::<DsType>().c(d!())?,
            t[3].parse()
                .map_err(|_| eg!(format!("DefinitionError: bad heartbeat `{}`", t[3])))?,
            parse_bound(t[4]).c(d!())?,
            parse_bound(t[5]).c(d!())?,
        )
    }

    fn validate(&self) -> Result<()> {
        alt!(
            self.name.is_empty() || self.name.len() >= DS_NAME_SIZE,
            return Err(eg!(format!(
                "DefinitionError: data source name `{}` must be 1..{} bytes",
                self.name,
                DS_NAME_SIZE - 1
            )))
        );
        alt!(
            !self
                .name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-'),
            return Err(eg!(format!("DefinitionError: illegal data source name `{}`", self.name)))
        );
        alt!(
            self.heartbeat <= 0,
            return Err(eg!(format!(
                "DefinitionError: heartbeat of `{}` must be positive",
                self.name
            )))
        );
        alt!(
            !self.min.is_nan() && !self.max.is_nan() && self.min >= self.max,
            return Err(eg!(format!(
                "DefinitionError: bounds of `{}` are inverted ({} >= {})",
                self.name, self.min, self.max
            )))
        );
        Ok(())
    }
}

/// One archive declaration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArcDef {
    pub cf: ConsolidationFn,
    /// Largest tolerated fraction of unknown primary points per
    /// consolidated point.
    pub xff: f64,
    /// Primary points per consolidated point.
    pub steps: u32,
    /// Ring length.
    pub rows: u32,
}

impl ArcDef {
    pub fn new(cf: ConsolidationFn, xff: f64, steps: u32, rows: u32) -> Result<Self> {
        let a = Self {
            cf,
            xff,
            steps,
            rows,
        };
        a.validate().c(d!())?;
        Ok(a)
    }

    /// Parse the classic `RRA:cf:xff:steps:rows` form.
    pub fn parse(s: &str) -> Result<Self> {
        let t: Vec<&str> = s.split(':').collect();
        alt!(
            5 != t.len() || "RRA" != t[0],
            return Err(eg!(format!("DefinitionError: malformed archive spec `{s}`")))
        );
        Self::new(
            t[1].parse::<ConsolidationFn>().c(d!())?,
            t[2].parse()
                .map_err(|_| eg!(format!("DefinitionError: bad xff `{}`", t[2])))?,
            t[3].parse()
                .map_err(|_| eg!(format!("DefinitionError: bad step count `{}`", t[3])))?,
            t[4].parse()
                .map_err(|_| eg!(format!("DefinitionError: bad row count `{}`", t[4])))?,
        )
    }

    fn validate(&self) -> Result<()> {
        alt!(
            !(0.0..1.0).contains(&self.xff),
            return Err(eg!(format!("DefinitionError: xff {} outside [0, 1)", self.xff)))
        );
        alt!(
            self.steps < 1,
            return Err(eg!("DefinitionError: archives need at least one step per row"))
        );
        alt!(
            self.rows < 1,
            return Err(eg!("DefinitionError: archives need at least one row"))
        );
        Ok(())
    }
}

/// Everything needed to create a database.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Definition {
    path: String,
    step: i64,
    start: i64,
    ds_defs: Vec<DsDef>,
    arc_defs: Vec<ArcDef>,
}

impl Definition {
    /// Start time defaults to ten seconds ago.
    pub fn new(path: &str, step: i64) -> Result<Self> {
        alt!(step <= 0, return Err(eg!("DefinitionError: step must be positive")));
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .c(d!())?
            .as_secs() as i64;
        Ok(Self {
            path: path.to_owned(),
            step,
            start: now - 10,
            ds_defs: vec![],
            arc_defs: vec![],
        })
    }

    pub fn set_start(&mut self, start: i64) -> &mut Self {
        self.start = start;
        self
    }

    pub fn add_ds(&mut self, d: DsDef) -> &mut Self {
        self.ds_defs.push(d);
        self
    }

    /// Add a data source from its `DS:..` form.
    pub fn add_ds_str(&mut self, s: &str) -> Result<&mut Self> {
        self.ds_defs.push(DsDef::parse(s).c(d!())?);
        Ok(self)
    }

    pub fn add_archive(&mut self, a: ArcDef) -> &mut Self {
        self.arc_defs.push(a);
        self
    }

    /// Add an archive from its `RRA:..` form.
    pub fn add_archive_str(&mut self, s: &str) -> Result<&mut Self> {
        self.arc_defs.push(ArcDef::parse(s).c(d!())?);
        Ok(self)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn step(&self) -> i64 {
        self.step
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn ds_defs(&self) -> &[DsDef] {
        &self.ds_defs
    }

    pub fn arc_defs(&self) -> &[ArcDef] {
        &self.arc_defs
    }

    pub(crate) fn validate(&self) -> Result<()> {
        alt!(
            self.ds_defs.is_empty(),
            return Err(eg!("DefinitionError: a database needs at least one data source"))
        );
        alt!(
            self.arc_defs.is_empty(),
            return Err(eg!("DefinitionError: a database needs at least one archive"))
        );
        alt!(
            self.start < 0 || self.start > MAX_TIMESTAMP,
            return Err(eg!(format!("DefinitionError: start time {} out of range", self.start)))
        );
        let mut seen = HashSet::new();
        for d in self.ds_defs.iter() {
            d.validate().c(d!())?;
            alt!(
                !seen.insert(d.name.as_str()),
                return Err(eg!(format!("DefinitionError: duplicate data source name `{}`", d.name)))
            );
        }
        for a in self.arc_defs.iter() {
            a.validate().c(d!())?;
        }
        Ok(())
    }
}

fn parse_bound(s: &str) -> Result<f64> {
    if "U" == s {
        Ok(f64::NAN)
    } else {
        s.parse()
            .map_err(|_| eg!(format!("DefinitionError: bad bound `{s}`")))
    }
}
