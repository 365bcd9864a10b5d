//! PNI ETL - vaccination dose registry extraction and relational load.
//!
//! Three stages run in sequence:
//!
//! 1. [`harvest`]: page through the open-data registry and keep every
//!    record, optionally writing a JSON [`snapshot`].
//! 2. [`flatten`]: turn the snapshot into one wide table.
//! 3. [`load`]: decompose the table into the relational schema described by
//!    [`entities`] and replace the SQLite destination with it.
//!
//! [`queries`] holds the named analysis queries run against the result.

pub mod config;
pub mod entities;
pub mod flatten;
pub mod harvest;
pub mod load;
pub mod pipeline;
pub mod queries;
pub mod snapshot;
pub mod storage;
pub mod utils;
