//! # PCS Driver
//!
//! Query translation and result normalization in front of a columnar
//! analytics store that is driven entirely through three command-line tools:
//! `query`, `ingest` and `digest`.
//!
//! ## Pieces
//!
//! - **Command adapter**: typed argument lists and process execution
//! - **Query compiler**: abstract query specs to query tool flags
//! - **Marshaller**: raw tool rows to canonical table, time, distribution
//!   and sample shapes
//! - **Column cache**: TTL cache of column metadata with per-table request
//!   coalescing
//! - **Digest scheduler**: batches background re-indexing after writes
//!
//! The driver does not store, index or aggregate anything itself.

pub mod command;
pub mod config;
pub mod driver;
pub mod ingester;
pub mod metadata;
pub mod query;
pub mod telemetry;

mod error;

pub use driver::PcsDriver;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::command::{CommandArgs, ProcessRunner, Tool, ToolRunner};
    pub use crate::config::{ComponentFactory, DriverConfig, ToolPaths};
    pub use crate::driver::PcsDriver;
    pub use crate::metadata::{ColumnMeta, ColumnType, TableInfo, TableRef};
    pub use crate::query::{CanonicalRow, Filter, QueryOpts, QueryOutput, QuerySpec, Sample, View};
    pub use crate::{Error, Result};
}
