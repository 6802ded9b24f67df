//! Caller-supplied data accepted by writes.

use std::fmt;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::{RecordBatch, RecordBatchReader};
use futures::stream::{self, BoxStream, StreamExt};

use crate::error::{Result, StorageError};

/// Data to be written, in any of the shapes callers hold it in.
pub enum WriteData {
    /// Columnar in-memory table.
    Table {
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
    },
    /// A single materialized frame.
    Frame(RecordBatch),
    /// Lazy batch reader; consumed once.
    Reader(Box<dyn RecordBatchReader + Send>),
    /// Async batch stream, e.g. the output of a read.
    Stream {
        schema: SchemaRef,
        stream: BoxStream<'static, Result<RecordBatch>>,
    },
}

impl fmt::Debug for WriteData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteData::Table { schema, batches } => f
                .debug_struct("Table")
                .field("fields", &schema.fields().len())
                .field("batches", &batches.len())
                .finish(),
            WriteData::Frame(batch) => f
                .debug_struct("Frame")
                .field("rows", &batch.num_rows())
                .finish(),
            WriteData::Reader(_) => f.write_str("Reader"),
            WriteData::Stream { .. } => f.write_str("Stream"),
        }
    }
}

impl WriteData {
    /// Build a table from batches that share their first batch's schema.
    pub fn table(batches: Vec<RecordBatch>) -> Result<Self> {
        let schema = batches
            .first()
            .map(|b| b.schema())
            .ok_or_else(|| StorageError::schema("a table needs at least one batch"))?;
        Ok(WriteData::Table { schema, batches })
    }

    pub fn schema(&self) -> SchemaRef {
        match self {
            WriteData::Table { schema, .. } | WriteData::Stream { schema, .. } => schema.clone(),
            WriteData::Frame(batch) => batch.schema(),
            WriteData::Reader(reader) => reader.schema(),
        }
    }

    /// Normalize into a schema and a stream of batches checked against it.
    pub(crate) fn into_stream(self) -> (SchemaRef, BoxStream<'static, Result<RecordBatch>>) {
        let schema = self.schema();
        let raw: BoxStream<'static, Result<RecordBatch>> = match self {
            WriteData::Table { batches, .. } => stream::iter(batches.into_iter().map(Ok)).boxed(),
            WriteData::Frame(batch) => stream::iter(std::iter::once(Ok(batch))).boxed(),
            WriteData::Reader(reader) => stream::iter(
                reader.map(|r| r.map_err(|e| StorageError::arrow("Failed to read input batch", e))),
            )
            .boxed(),
            WriteData::Stream { stream, .. } => stream,
        };

        let expected = schema.clone();
        let checked = raw
            .map(move |batch| {
                let batch = batch?;
                if !same_columns(&batch.schema(), &expected) {
                    return Err(StorageError::schema(format!(
                        "input batch schema {:?} does not match declared schema {:?}",
                        field_names(&batch.schema()),
                        field_names(&expected)
                    )));
                }
                if batch.schema() == expected {
                    return Ok(batch);
                }
                RecordBatch::try_new(expected.clone(), batch.columns().to_vec()).map_err(|e| {
                    StorageError::schema(format!("input batch does not fit declared schema: {}", e))
                })
            })
            .boxed();

        (schema, checked)
    }
}

/// Names and types must line up; nullability and metadata may differ.
fn same_columns(actual: &SchemaRef, expected: &SchemaRef) -> bool {
    actual.fields().len() == expected.fields().len()
        && actual
            .fields()
            .iter()
            .zip(expected.fields().iter())
            .all(|(a, e)| a.name() == e.name() && a.data_type() == e.data_type())
}

fn field_names(schema: &SchemaRef) -> Vec<&str> {
    schema.fields().iter().map(|f| f.name().as_str()).collect()
}

impl From<RecordBatch> for WriteData {
    fn from(batch: RecordBatch) -> Self {
        WriteData::Frame(batch)
    }
}
