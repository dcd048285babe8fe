//! DataFusion integration for `tsbench-core`.
//!
//! This crate intentionally keeps all DataFusion types out of `tsbench-core`.
//! The main entry point is [`SqlBackend`], a [`tsbench_core::Backend`] that
//! answers range scans with SQL over the Parquet file written by the core
//! file backend.
#![deny(missing_docs)]

mod error;
mod sql_backend;

pub use error::{SqlError, SqlResult};
pub use sql_backend::{
    CLOSED_PER_READ, ENABLE_OBJECT_CACHE, LOAD_ONLY, SqlBackend, SqlConfig, SqlOptions,
};
