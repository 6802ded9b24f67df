//! Unified Parquet and Delta Lake storage
//!
//! This crate reads and writes Parquet datasets and Delta Lake tables through
//! one interface, against Azure Data Lake Storage Gen2, Databricks DBFS or the
//! local filesystem. Encoding, the Delta transaction log and the network
//! clients are delegated to `parquet`, `deltalake` and `opendal`.

// Engine errors keep their source and a formatted message, which makes the
// error type larger than clippy's default threshold.
#![allow(clippy::result_large_err)]

pub mod backend;
mod data;
mod dataset;
mod delta;
mod error;
pub mod filter;
mod options;
pub mod parquet;
mod partition;
pub mod path;
mod storage;

pub use backend::{
    AdlsBackend, AdlsConfig, BackendKind, DbfsBackend, DbfsConfig, LocalBackend, LocalConfig,
    StorageBackend,
};
pub use data::WriteData;
pub use dataset::{BatchStream, Dataset, Fragment};
pub use error::{redact_secret, Engine, ErrorCode, Result, StorageError};
pub use filter::{col, Filter, ScalarValue};
pub use options::{
    CompressionCodec, DeltaLakeWriteOptions, DeltaWriteMode, ExistingDataBehavior, FileFormat,
    ParquetWriteOptions, WriteOptions,
};
pub use partition::HIVE_DEFAULT_PARTITION;
pub use storage::{Storage, WriteSummary};

// Re-exported so callers build batches against the same Arrow version.
pub use arrow;
