//! Partitioned Parquet dataset writer.
//!
//! Rows are grouped by their partition values into `column=value/`
//! directories. Each directory receives files named from the basename
//! template, a new one every `max_rows_per_file` rows. Files are encoded in
//! memory and uploaded through the operator when complete.

use std::collections::{BTreeMap, HashSet};

use arrow::array::UInt32Array;
use arrow::compute::take_record_batch;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use futures::stream::{BoxStream, StreamExt};
use opendal::{ErrorKind, Operator};
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;

use super::{encoding::writer_properties, file_path, list_files};
use crate::error::{Engine, Result, StorageError};
use crate::options::{ExistingDataBehavior, ParquetWriteOptions};
use crate::partition::group_rows;
use crate::path::{as_dir, join};

/// Outcome of a dataset write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct WrittenFiles {
    pub rows: usize,
    pub files: Vec<String>,
}

struct OpenFile {
    path: String,
    rows: usize,
    writer: ArrowWriter<Vec<u8>>,
}

pub(crate) struct DatasetWriter<'a> {
    op: &'a Operator,
    base_path: String,
    options: &'a ParquetWriteOptions,
    file_schema: SchemaRef,
    file_columns: Vec<usize>,
    properties: WriterProperties,
    open: BTreeMap<String, OpenFile>,
    next_index: BTreeMap<String, usize>,
    cleared: HashSet<String>,
    written: WrittenFiles,
}

impl<'a> DatasetWriter<'a> {
    pub(crate) fn try_new(
        op: &'a Operator,
        base_path: &str,
        schema: &SchemaRef,
        options: &'a ParquetWriteOptions,
    ) -> Result<Self> {
        let mut file_columns = Vec::with_capacity(schema.fields().len());
        for (idx, field) in schema.fields().iter().enumerate() {
            if !options.partitions().contains(field.name()) {
                file_columns.push(idx);
            }
        }
        for name in options.partitions() {
            if schema.field_with_name(name).is_err() {
                return Err(StorageError::schema(format!(
                    "partition column '{}' not found in data",
                    name
                )));
            }
        }
        if file_columns.is_empty() {
            return Err(StorageError::schema(
                "every column is a partition column, no data columns left to write",
            ));
        }

        let file_schema = schema
            .project(&file_columns)
            .map(std::sync::Arc::new)
            .map_err(|e| StorageError::arrow("Failed to project file schema", e))?;

        Ok(Self {
            op,
            base_path: base_path.to_string(),
            options,
            file_schema,
            file_columns,
            properties: writer_properties(
                options.compression_codec(),
                options.max_rows_per_group(),
            ),
            open: BTreeMap::new(),
            next_index: BTreeMap::new(),
            cleared: HashSet::new(),
            written: WrittenFiles::default(),
        })
    }

    /// Consume `batches` and write them out, returning what was written.
    pub(crate) async fn write_all(
        mut self,
        mut batches: BoxStream<'_, Result<RecordBatch>>,
    ) -> Result<WrittenFiles> {
        self.check_existing().await?;

        while let Some(batch) = batches.next().await {
            self.write_batch(&batch?).await?;
        }

        if self.written.rows == 0 && self.options.partitions().is_empty() {
            // An empty unpartitioned write still leaves a readable schema behind.
            self.open_file("").await?;
        }

        let remaining: Vec<String> = self.open.keys().cloned().collect();
        for dir in remaining {
            self.close_file(&dir).await?;
        }

        tracing::info!(
            path = %self.base_path,
            rows = self.written.rows,
            files = self.written.files.len(),
            "Wrote Parquet dataset"
        );
        Ok(self.written)
    }

    async fn check_existing(&self) -> Result<()> {
        if self.options.existing_data_behavior() != ExistingDataBehavior::Error {
            return Ok(());
        }
        let existing = list_files(self.op, &self.base_path).await?;
        if let Some(first) = existing.first() {
            return Err(StorageError::conflict(
                &self.base_path,
                format!(
                    "found '{}' and existing_data_behavior is 'error'",
                    first.relative
                ),
            ));
        }
        Ok(())
    }

    async fn write_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        if batch.num_rows() == 0 {
            return Ok(());
        }

        if self.options.partitions().is_empty() {
            let data = self.project(batch)?;
            return self.write_to_dir("", data).await;
        }

        for group in group_rows(batch, self.options.partitions())? {
            let indices = UInt32Array::from(group.indices);
            let rows = take_record_batch(batch, &indices)
                .map_err(|e| StorageError::arrow("Failed to split batch by partition", e))?;
            let data = self.project(&rows)?;
            self.write_to_dir(&group.dir, data).await?;
        }
        Ok(())
    }

    fn project(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        batch
            .project(&self.file_columns)
            .map_err(|e| StorageError::arrow("Failed to drop partition columns", e))
    }

    async fn write_to_dir(&mut self, dir: &str, mut data: RecordBatch) -> Result<()> {
        let limit = self.options.max_rows_per_file().unwrap_or(usize::MAX);

        while data.num_rows() > 0 {
            if !self.open.contains_key(dir) {
                self.open_file(dir).await?;
            }
            let Some(file) = self.open.get_mut(dir) else {
                return Err(StorageError::engine_message(
                    Engine::Parquet,
                    format!("no open file for partition '{}'", dir),
                ));
            };

            let take = data.num_rows().min(limit - file.rows);
            let chunk = data.slice(0, take);
            file.writer
                .write(&chunk)
                .map_err(|e| StorageError::parquet(format!("Failed to encode '{}'", file.path), e))?;
            file.rows += take;
            self.written.rows += take;
            let full = file.rows >= limit;

            data = data.slice(take, data.num_rows() - take);
            if full {
                self.close_file(dir).await?;
            }
        }
        Ok(())
    }

    async fn open_file(&mut self, dir: &str) -> Result<()> {
        if self.options.existing_data_behavior() == ExistingDataBehavior::DeleteMatching
            && self.cleared.insert(dir.to_string())
        {
            let target = as_dir(&join(&self.base_path, dir));
            tracing::debug!(path = %target, "Clearing partition before write");
            match self.op.remove_all(&target).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(StorageError::filesystem(
                        format!("Failed to clear '{}'", target),
                        e,
                    ))
                }
            }
        }

        let index = self.next_index.entry(dir.to_string()).or_insert(0);
        let path = file_path(&self.base_path, dir, &self.options.file_name(*index));
        *index += 1;

        let writer = ArrowWriter::try_new(
            Vec::new(),
            self.file_schema.clone(),
            Some(self.properties.clone()),
        )
        .map_err(|e| StorageError::parquet(format!("Failed to create writer for '{}'", path), e))?;

        self.open.insert(
            dir.to_string(),
            OpenFile {
                path,
                rows: 0,
                writer,
            },
        );
        Ok(())
    }

    async fn close_file(&mut self, dir: &str) -> Result<()> {
        let Some(file) = self.open.remove(dir) else {
            return Ok(());
        };
        let bytes = file
            .writer
            .into_inner()
            .map_err(|e| StorageError::parquet(format!("Failed to finish '{}'", file.path), e))?;
        let size = bytes.len();

        self.op
            .write(&file.path, bytes)
            .await
            .map_err(|e| StorageError::filesystem(format!("Failed to write '{}'", file.path), e))?;

        tracing::debug!(path = %file.path, rows = file.rows, bytes = size, "Wrote Parquet file");
        self.written.files.push(file.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::CompressionCodec;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use futures::stream;
    use std::sync::Arc;

    fn operator(root: &std::path::Path) -> Operator {
        let builder = opendal::services::Fs::default().root(root.to_str().unwrap());
        Operator::new(builder).unwrap().finish()
    }

    fn batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("k", DataType::Int64, false),
            Field::new("v", DataType::Utf8, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 1, 1, 2])),
                Arc::new(StringArray::from(vec!["a", "b", "c", "d", "e"])),
            ],
        )
        .unwrap()
    }

    async fn write(op: &Operator, options: &ParquetWriteOptions) -> Result<WrittenFiles> {
        let b = batch();
        let schema = b.schema();
        let writer = DatasetWriter::try_new(op, "out", &schema, options)?;
        writer.write_all(stream::iter(vec![Ok(b)]).boxed()).await
    }

    #[tokio::test]
    async fn partitions_and_rolls_files() {
        let dir = tempfile::tempdir().unwrap();
        let op = operator(dir.path());
        let options = ParquetWriteOptions::try_new(
            ["k"],
            CompressionCodec::Snappy,
            ExistingDataBehavior::Error,
        )
        .unwrap()
        .with_max_rows_per_file(2)
        .unwrap();

        let written = write(&op, &options).await.unwrap();
        assert_eq!(written.rows, 5);
        let mut files = written.files.clone();
        files.sort();
        assert_eq!(
            files,
            vec![
                "out/k=1/part-0.parquet",
                "out/k=1/part-1.parquet",
                "out/k=2/part-0.parquet",
            ]
        );
    }

    #[tokio::test]
    async fn error_behavior_refuses_existing_data() {
        let dir = tempfile::tempdir().unwrap();
        let op = operator(dir.path());
        let options = ParquetWriteOptions::default();
        write(&op, &options).await.unwrap();
        assert!(matches!(
            write(&op, &options).await,
            Err(StorageError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn delete_matching_clears_touched_partitions_only() {
        let dir = tempfile::tempdir().unwrap();
        let op = operator(dir.path());
        op.write("out/k=1/stale.parquet", vec![0u8]).await.unwrap();
        op.write("out/k=9/keep.parquet", vec![0u8]).await.unwrap();

        let options = ParquetWriteOptions::try_new(
            ["k"],
            CompressionCodec::None,
            ExistingDataBehavior::DeleteMatching,
        )
        .unwrap();
        write(&op, &options).await.unwrap();

        assert!(!op.exists("out/k=1/stale.parquet").await.unwrap());
        assert!(op.exists("out/k=9/keep.parquet").await.unwrap());
        assert!(op.exists("out/k=1/part-0.parquet").await.unwrap());
    }

    #[tokio::test]
    async fn all_partition_columns_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let op = operator(dir.path());
        let schema = Arc::new(Schema::new(vec![Field::new("k", DataType::Int64, false)]));
        let options = ParquetWriteOptions::try_new(
            ["k"],
            CompressionCodec::None,
            ExistingDataBehavior::Error,
        )
        .unwrap();
        assert!(matches!(
            DatasetWriter::try_new(&op, "out", &schema, &options),
            Err(StorageError::Schema { .. })
        ));
    }
}
