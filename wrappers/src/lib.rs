#![doc = include_str!("../README.md")]

/// Named-series evaluation over fetched data.
pub mod dataproc;

/// The at-style time-specification grammar.
pub mod timespec;

pub use dataproc::{DataProcessor, ProcessedSeries};

pub use timespec::{TimeAnchor, TimeParser, TimeSpec};

pub use rrdb_core::{self, *};
