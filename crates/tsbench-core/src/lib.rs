//! Core of a benchmark-driver adapter for time-series storage backends.
//!
//! The crate exposes the four-operation surface a load-generating harness
//! expects (point read, range scan, insert, delete) and maps it onto
//! interchangeable storage backends:
//!
//! - A write buffer that accumulates sparse, per-key, per-field writes and
//!   transposes them into row-major or column-major bulk payloads
//!   (`write_buffer`, `payload` modules).
//! - A flush policy that decides, from the buffered point count, when the
//!   buffer is handed to the active backend (`flush` module).
//! - A `Backend` trait with a remote-session adapter, a Parquet file adapter
//!   and a batched dataset-scanner adapter (`backend` module). The embedded
//!   SQL adapter lives in `tsbench-datafusion` so that SQL engine types stay
//!   out of this crate.
//! - A `Gateway` that translates harness keys, tables and field maps into the
//!   internal `(key, path)` addressing scheme (`gateway` module).
//!
//! Every operation is synchronous and runs on the calling thread.
#![deny(missing_docs)]
pub mod backend;
pub mod codec;
pub mod config;
pub mod flush;
pub mod gateway;
pub mod model;
pub mod payload;
pub mod write_buffer;

#[cfg(test)]
pub(crate) mod test_util;

pub use backend::{Backend, BackendError, ScanResult};
pub use config::{ConfigError, Properties};
pub use gateway::{FieldMap, Gateway, GatewayConfig, Status};
pub use model::{Key, KeyedRow, ScanWindow, SparseRow, Value};
pub use payload::{BulkPayload, ColumnMajorPayload, PayloadLayout, RowMajorPayload};
pub use write_buffer::{BufferSnapshot, WriteBuffer};
