//! Storage facade.

use std::sync::Arc;

use arrow::record_batch::RecordBatch;

use crate::backend::StorageBackend;
use crate::data::WriteData;
use crate::dataset::{BatchStream, Dataset, DEFAULT_BATCH_SIZE};
use crate::delta;
use crate::error::{Result, StorageError};
use crate::filter::Filter;
use crate::options::{FileFormat, WriteOptions};
use crate::parquet::{discover, writer::DatasetWriter};

/// What a write produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub rows: usize,
    /// Data files written, relative to the backend filesystem. Delta Lake
    /// writes leave this empty; the transaction log is the record.
    pub files: Vec<String>,
}

/// Reads and writes Parquet datasets and Delta Lake tables on one backend.
///
/// Holds nothing but the backend; clones share it.
#[derive(Debug, Clone)]
pub struct Storage {
    backend: Arc<dyn StorageBackend>,
}

impl Storage {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }

    /// Write `data` to `path` in `file_format`.
    ///
    /// `options` must belong to `file_format`; every partition column must be
    /// present in the data.
    pub async fn write(
        &self,
        data: impl Into<WriteData>,
        file_format: FileFormat,
        path: &str,
        options: &WriteOptions,
    ) -> Result<WriteSummary> {
        if options.format() != file_format {
            return Err(StorageError::invalid_config(format!(
                "{} write options cannot be used for a {} write",
                options.format(),
                file_format
            )));
        }

        let (schema, batches) = data.into().into_stream();
        for name in options.partitions() {
            if schema.field_with_name(name).is_err() {
                return Err(StorageError::schema(format!(
                    "partition column '{}' not found in data",
                    name
                )));
            }
        }

        tracing::debug!(
            backend = %self.backend.kind(),
            format = %file_format,
            path = %path,
            codec = %options.compression_codec(),
            "Writing data"
        );

        match options {
            WriteOptions::Parquet(parquet) => {
                let base_path = self.backend.base_path(path)?;
                let written =
                    DatasetWriter::try_new(self.backend.filesystem(), &base_path, &schema, parquet)?
                        .write_all(batches)
                        .await?;
                Ok(WriteSummary {
                    rows: written.rows,
                    files: written.files,
                })
            }
            WriteOptions::DeltaLake(delta_options) => {
                let rows =
                    delta::write(self.backend.as_ref(), path, schema, batches, delta_options)
                        .await?;
                Ok(WriteSummary {
                    rows,
                    files: Vec::new(),
                })
            }
        }
    }

    /// Resolve the dataset at `path` without reading row data.
    pub async fn dataset(&self, file_format: FileFormat, path: &str) -> Result<Dataset> {
        match file_format {
            FileFormat::Parquet => {
                let base_path = self.backend.base_path(path)?;
                let files = discover(self.backend.filesystem(), &base_path).await?;
                Dataset::from_files(
                    self.backend.filesystem().clone(),
                    FileFormat::Parquet,
                    &base_path,
                    files,
                )
                .await
            }
            FileFormat::DeltaLake => delta::dataset(self.backend.as_ref(), path).await,
        }
    }

    /// Read every row matching `filters` into one in-memory table.
    pub async fn read_table(
        &self,
        file_format: FileFormat,
        path: &str,
        filters: Option<Filter>,
    ) -> Result<RecordBatch> {
        let dataset = self.dataset(file_format, path).await?;
        let table = dataset.to_table(filters).await?;
        tracing::info!(
            format = %file_format,
            path = %path,
            rows = table.num_rows(),
            "Read table"
        );
        Ok(table)
    }

    /// Stream rows matching `filters` in batches of at most `batch_size`
    /// (64Ki rows when `None`).
    pub async fn read_batches(
        &self,
        file_format: FileFormat,
        path: &str,
        filters: Option<Filter>,
        batch_size: Option<usize>,
    ) -> Result<BatchStream> {
        let dataset = self.dataset(file_format, path).await?;
        dataset.scan(filters, batch_size.unwrap_or(DEFAULT_BATCH_SIZE))
    }
}
