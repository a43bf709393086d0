#![doc = include_str!("../README.md")]

pub mod common;

pub mod store;

pub mod format;

pub mod model;

pub mod db;

pub mod update;

pub mod fetch;

pub mod xml;

pub use db::{Database, OpenMode};

pub use fetch::{FetchRequest, FetchResult};

pub use model::{ArcDef, ConsolidationFn, Definition, DsDef, DsType};

pub use store::{ByteStore, FileStore, MemStore};

pub use update::Sample;
