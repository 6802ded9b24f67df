//! Subcommand implementations.
//!
//! Each command takes a ready [`Storage`] and returns what it found, leaving
//! printing to the binary.

use std::fmt;

use anyhow::{Context, Result};
use futures::TryStreamExt;
use lakestore_core::{FileFormat, Storage, WriteData, WriteOptions, WriteSummary};

use crate::filter_expr::parse_filters;

/// What `schema` reports about a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaReport {
    pub format: FileFormat,
    pub path: String,
    /// `(name, type)` per field, partition columns last.
    pub fields: Vec<(String, String)>,
    pub partition_columns: Vec<String>,
    pub fragments: usize,
}

impl fmt::Display for SchemaReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({})", self.path, self.format)?;
        for (name, data_type) in &self.fields {
            let marker = if self.partition_columns.contains(name) {
                " [partition]"
            } else {
                ""
            };
            writeln!(f, "  {}: {}{}", name, data_type, marker)?;
        }
        write!(f, "fragments: {}", self.fragments)
    }
}

pub async fn schema(storage: &Storage, format: FileFormat, path: &str) -> Result<SchemaReport> {
    let dataset = storage
        .dataset(format, path)
        .await
        .with_context(|| format!("Failed to open {} dataset '{}'", format, path))?;

    Ok(SchemaReport {
        format,
        path: path.to_string(),
        fields: dataset
            .schema()
            .fields()
            .iter()
            .map(|f| (f.name().clone(), f.data_type().to_string()))
            .collect(),
        partition_columns: dataset
            .partition_columns()
            .into_iter()
            .map(str::to_string)
            .collect(),
        fragments: dataset.fragments().len(),
    })
}

/// Stream the matching rows and count them.
pub async fn count(
    storage: &Storage,
    format: FileFormat,
    path: &str,
    filters: &[String],
    batch_size: usize,
) -> Result<usize> {
    let filter = parse_filters(filters)?;
    let batches = storage
        .read_batches(format, path, filter, Some(batch_size))
        .await
        .with_context(|| format!("Failed to read {} dataset '{}'", format, path))?;

    let rows = batches
        .try_fold(0usize, |rows, batch| async move { Ok(rows + batch.num_rows()) })
        .await?;
    tracing::debug!(path = %path, rows, "Counted rows");
    Ok(rows)
}

/// Arguments of `copy` beyond the two paths.
#[derive(Debug, Clone)]
pub struct CopyArgs {
    pub from: FileFormat,
    pub to: FileFormat,
    pub partitions: Vec<String>,
    pub compression: String,
    pub behavior: String,
    pub filters: Vec<String>,
    pub batch_size: usize,
}

/// Pipe the rows of `src` into a write at `dst`.
pub async fn copy(storage: &Storage, src: &str, dst: &str, args: &CopyArgs) -> Result<WriteSummary> {
    let options = WriteOptions::parse(
        args.to,
        args.partitions.iter().cloned(),
        &args.compression,
        &args.behavior,
    )?;
    let filter = parse_filters(&args.filters)?;

    let dataset = storage
        .dataset(args.from, src)
        .await
        .with_context(|| format!("Failed to open {} dataset '{}'", args.from, src))?;
    let data = WriteData::Stream {
        schema: dataset.schema(),
        stream: dataset.scan(filter, args.batch_size)?,
    };

    let summary = storage
        .write(data, args.to, dst, &options)
        .await
        .with_context(|| format!("Failed to write {} dataset '{}'", args.to, dst))?;

    tracing::info!(
        src = %src,
        dst = %dst,
        rows = summary.rows,
        files = summary.files.len(),
        "Copied dataset"
    );
    Ok(summary)
}
