//! Resolved datasets and lazy batch scans.
//!
//! A [`Dataset`] is the list of Parquet files behind a path together with
//! the schema they share. Resolving one reads at most a single footer and
//! no row data. Scans open one fragment at a time, fetch only the row
//! groups and columns they need, and yield batches as the caller polls.

use std::collections::VecDeque;
use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::compute::{cast, concat_batches};
use arrow::datatypes::{Field, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use opendal::Operator;
use parquet::arrow::arrow_reader::statistics::StatisticsConverter;
use parquet::arrow::arrow_reader::{ArrowPredicateFn, RowFilter};
use parquet::arrow::async_reader::ParquetRecordBatchStream;
use parquet::arrow::ProjectionMask;
use parquet::file::metadata::ParquetMetaData;
use parquet::schema::types::SchemaDescriptor;

use crate::error::{Result, StorageError};
use crate::filter::Filter;
use crate::options::FileFormat;
use crate::parquet::reader::{open_builder, read_schema, OperatorFileReader};
use crate::parquet::DiscoveredFile;
use crate::partition::{constant_array, infer_type, parse_path, PartitionValues};

/// Batches produced by a scan, in fragment order.
pub type BatchStream = BoxStream<'static, Result<RecordBatch>>;

pub(crate) const DEFAULT_BATCH_SIZE: usize = 64 * 1024;

/// One data file and the partition values it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub path: String,
    pub partition_values: PartitionValues,
    /// Size in bytes, when the listing that produced the fragment knew it.
    pub size: Option<u64>,
}

impl Fragment {
    fn value_of(&self, column: &str) -> Option<&str> {
        self.partition_values
            .iter()
            .find(|(name, _)| name == column)
            .and_then(|(_, value)| value.as_deref())
    }
}

#[derive(Debug, Clone)]
pub struct Dataset {
    format: FileFormat,
    root: String,
    schema: SchemaRef,
    file_schema: SchemaRef,
    partition_fields: Vec<Field>,
    fragments: Vec<Fragment>,
    operator: Operator,
}

/// How a scan filter is split between the stages of a scan.
#[derive(Debug, Default)]
struct ScanPlan {
    fragments: Vec<Fragment>,
    /// Evaluated inside the Parquet decoder, on file columns only.
    pushed: Option<Filter>,
    /// Evaluated on completed batches.
    residual: Option<Filter>,
}

impl Dataset {
    /// Dataset over plain Parquet files. The first footer supplies the file
    /// columns; partition columns come from `column=value` directories and
    /// their types are inferred from every value seen.
    pub(crate) async fn from_files(
        operator: Operator,
        format: FileFormat,
        root: &str,
        files: Vec<DiscoveredFile>,
    ) -> Result<Self> {
        let Some(first) = files.first() else {
            return Err(StorageError::not_found(root));
        };
        let file_schema = read_schema(operator.clone(), &first.path).await?;

        let fragments: Vec<Fragment> = files
            .iter()
            .map(|file| Fragment {
                path: file.path.clone(),
                partition_values: parse_path(&file.relative),
                size: None,
            })
            .collect();

        let mut names: Vec<String> = Vec::new();
        for fragment in &fragments {
            for (name, _) in &fragment.partition_values {
                if !names.contains(name) && file_schema.field_with_name(name).is_err() {
                    names.push(name.clone());
                }
            }
        }

        let partition_fields: Vec<Field> = names
            .iter()
            .map(|name| {
                let values: Vec<Option<&str>> =
                    fragments.iter().map(|f| f.value_of(name)).collect();
                Field::new(name, infer_type(values.iter().copied()), true)
            })
            .collect();

        Ok(Self::assemble(
            operator,
            format,
            root,
            file_schema,
            partition_fields,
            fragments,
        ))
    }

    /// Dataset over the files of a table that declares its own schema.
    ///
    /// Columns named in any fragment's partition values are partition
    /// columns and keep their declared types; the rest are file columns.
    /// No footer is read, and a table without files is an empty dataset.
    pub(crate) fn from_table(
        operator: Operator,
        format: FileFormat,
        root: &str,
        table_schema: &Schema,
        fragments: Vec<Fragment>,
    ) -> Self {
        let is_partition = |name: &str| {
            fragments
                .iter()
                .any(|f| f.partition_values.iter().any(|(n, _)| n == name))
        };

        let mut file_fields = Vec::new();
        let mut partition_fields = Vec::new();
        for field in table_schema.fields() {
            if is_partition(field.name()) {
                partition_fields.push(field.as_ref().clone().with_nullable(true));
            } else {
                file_fields.push(field.as_ref().clone());
            }
        }

        Self::assemble(
            operator,
            format,
            root,
            Arc::new(Schema::new(file_fields)),
            partition_fields,
            fragments,
        )
    }

    fn assemble(
        operator: Operator,
        format: FileFormat,
        root: &str,
        file_schema: SchemaRef,
        partition_fields: Vec<Field>,
        fragments: Vec<Fragment>,
    ) -> Self {
        let mut fields: Vec<Field> = file_schema
            .fields()
            .iter()
            .map(|f| f.as_ref().clone())
            .collect();
        fields.extend(partition_fields.iter().cloned());
        let schema = Arc::new(Schema::new(fields));

        tracing::debug!(
            format = %format,
            root = %root,
            fragments = fragments.len(),
            partitions = ?partition_fields.iter().map(|f| f.name()).collect::<Vec<_>>(),
            "Resolved dataset"
        );

        Self {
            format,
            root: root.to_string(),
            schema,
            file_schema,
            partition_fields,
            fragments,
            operator,
        }
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    /// Dataset root, relative to the backend filesystem.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// File columns followed by partition columns.
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn partition_columns(&self) -> Vec<&str> {
        self.partition_fields
            .iter()
            .map(|f| f.name().as_str())
            .collect()
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Stream the rows matching `filter` in batches of at most `batch_size`.
    ///
    /// Fragments whose partition values rule out every row are skipped
    /// without being opened. Conditions on file columns are evaluated by the
    /// Parquet decoder, which also skips row groups whose statistics rule
    /// them out. Calling `scan` again starts over.
    pub fn scan(&self, filter: Option<Filter>, batch_size: usize) -> Result<BatchStream> {
        if batch_size == 0 {
            return Err(StorageError::invalid_config(
                "batch_size must be greater than 0",
            ));
        }
        if let Some(filter) = &filter {
            filter.validate(&self.schema)?;
        }

        let plan = self.plan(filter)?;
        tracing::debug!(
            root = %self.root,
            selected = plan.fragments.len(),
            total = self.fragments.len(),
            pushed = ?plan.pushed.as_ref().map(ToString::to_string),
            residual = ?plan.residual.as_ref().map(ToString::to_string),
            batch_size,
            "Starting scan"
        );

        let state = ScanState {
            operator: self.operator.clone(),
            schema: self.schema.clone(),
            file_schema: self.file_schema.clone(),
            partition_fields: self.partition_fields.clone(),
            pushed: plan.pushed,
            residual: plan.residual,
            batch_size,
            pending: plan.fragments.into(),
            current: None,
        };

        Ok(stream::try_unfold(state, |mut state| async move {
            let next = state.next_batch().await?;
            Ok(next.map(|batch| (batch, state)))
        })
        .boxed())
    }

    /// Read all matching rows into one batch.
    pub async fn to_table(&self, filter: Option<Filter>) -> Result<RecordBatch> {
        let batches: Vec<RecordBatch> = self
            .scan(filter, DEFAULT_BATCH_SIZE)?
            .try_collect()
            .await?;
        concat_batches(&self.schema, &batches)
            .map_err(|e| StorageError::arrow("Failed to concatenate batches", e))
    }

    pub async fn count_rows(&self, filter: Option<Filter>) -> Result<usize> {
        self.scan(filter, DEFAULT_BATCH_SIZE)?
            .try_fold(0usize, |acc, batch| async move { Ok(acc + batch.num_rows()) })
            .await
    }

    fn is_partition_column(&self, name: &str) -> bool {
        self.partition_fields.iter().any(|f| f.name().as_str() == name)
    }

    /// Split `filter` into its conjuncts: those on partition columns select
    /// fragments, those on file columns are pushed into the decoder, and
    /// the rest are applied to completed batches.
    fn plan(&self, filter: Option<Filter>) -> Result<ScanPlan> {
        let Some(filter) = filter else {
            return Ok(ScanPlan {
                fragments: self.fragments.clone(),
                ..ScanPlan::default()
            });
        };

        let mut on_partitions = Vec::new();
        let mut on_files = Vec::new();
        let mut mixed = Vec::new();
        for part in filter.into_conjuncts() {
            let columns = part.columns();
            if columns.iter().all(|c| self.is_partition_column(c)) {
                on_partitions.push(part);
            } else if columns.iter().all(|c| !self.is_partition_column(c)) {
                on_files.push(part);
            } else {
                mixed.push(part);
            }
        }

        let fragments = match Filter::all(on_partitions) {
            Some(filter) => self.select_fragments(&filter)?,
            None => self.fragments.clone(),
        };
        Ok(ScanPlan {
            fragments,
            pushed: Filter::all(on_files),
            residual: Filter::all(mixed),
        })
    }

    /// Fragments whose partition values satisfy `filter`.
    fn select_fragments(&self, filter: &Filter) -> Result<Vec<Fragment>> {
        let schema = Arc::new(Schema::new(self.partition_fields.clone()));
        let mut selected = Vec::new();
        for fragment in &self.fragments {
            let columns = self
                .partition_fields
                .iter()
                .map(|f| constant_array(f.name(), f.data_type(), fragment.value_of(f.name()), 1))
                .collect::<Result<Vec<_>>>()?;
            let row = RecordBatch::try_new(schema.clone(), columns)
                .map_err(|e| StorageError::arrow("Failed to build partition row", e))?;
            if filter.matches_row(&row)? {
                selected.push(fragment.clone());
            }
        }
        Ok(selected)
    }
}

struct OpenFragment {
    fragment: Fragment,
    reader: ParquetRecordBatchStream<OperatorFileReader>,
}

struct ScanState {
    operator: Operator,
    schema: SchemaRef,
    file_schema: SchemaRef,
    partition_fields: Vec<Field>,
    pushed: Option<Filter>,
    residual: Option<Filter>,
    batch_size: usize,
    pending: VecDeque<Fragment>,
    current: Option<OpenFragment>,
}

impl ScanState {
    async fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        loop {
            if let Some(open) = self.current.as_mut() {
                match open.reader.next().await {
                    Some(batch) => {
                        let batch = batch.map_err(|e| {
                            StorageError::parquet(
                                format!("Failed to decode '{}'", open.fragment.path),
                                e,
                            )
                        })?;
                        let fragment = open.fragment.clone();
                        let batch = self.complete(&fragment, batch)?;
                        if batch.num_rows() > 0 {
                            return Ok(Some(batch));
                        }
                        continue;
                    }
                    None => self.current = None,
                }
            }

            let Some(fragment) = self.pending.pop_front() else {
                return Ok(None);
            };
            if let Some(reader) = self.open(&fragment).await? {
                tracing::trace!(path = %fragment.path, "Opened fragment");
                self.current = Some(OpenFragment { fragment, reader });
            }
        }
    }

    /// Open a fragment for decoding, or `None` when its statistics rule out
    /// every row group.
    async fn open(
        &mut self,
        fragment: &Fragment,
    ) -> Result<Option<ParquetRecordBatchStream<OperatorFileReader>>> {
        let builder = open_builder(self.operator.clone(), &fragment.path, fragment.size).await?;
        let path = fragment.path.as_str();

        let file_schema = builder.schema().clone();
        let parquet_schema = builder.parquet_schema();
        let columns = self
            .file_schema
            .fields()
            .iter()
            .map(|field| root_index(&file_schema, field.name(), path))
            .collect::<Result<Vec<_>>>()?;
        let projection = ProjectionMask::roots(parquet_schema, columns);

        let (row_groups, row_filter) = match &self.pushed {
            Some(filter) => {
                let row_groups = matching_row_groups(filter, &file_schema, builder.metadata());
                let row_filter = row_filter(filter, &file_schema, parquet_schema, path)?;
                (Some(row_groups), Some(row_filter))
            }
            None => (None, None),
        };

        let mut builder = builder
            .with_projection(projection)
            .with_batch_size(self.batch_size);
        if let Some(row_groups) = row_groups {
            if row_groups.is_empty() {
                tracing::trace!(path = %path, "Statistics rule out every row group");
                return Ok(None);
            }
            builder = builder.with_row_groups(row_groups);
        }
        if let Some(row_filter) = row_filter {
            builder = builder.with_row_filter(row_filter);
        }

        builder
            .build()
            .map(Some)
            .map_err(|e| StorageError::parquet(format!("Failed to open '{}'", path), e))
    }

    /// Align a decoded batch to the dataset schema, append partition
    /// columns and apply the residual filter.
    fn complete(&self, fragment: &Fragment, batch: RecordBatch) -> Result<RecordBatch> {
        let rows = batch.num_rows();
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(self.schema.fields().len());
        for field in self.file_schema.fields() {
            let column = batch.column_by_name(field.name()).ok_or_else(|| {
                StorageError::schema(format!(
                    "file '{}' has no column '{}'",
                    fragment.path,
                    field.name()
                ))
            })?;
            if column.data_type() == field.data_type() {
                columns.push(column.clone());
            } else {
                let cast = cast(column.as_ref(), field.data_type()).map_err(|e| {
                    StorageError::schema(format!(
                        "column '{}' of file '{}' cannot be read as {}: {}",
                        field.name(),
                        fragment.path,
                        field.data_type(),
                        e
                    ))
                })?;
                columns.push(cast);
            }
        }
        for field in &self.partition_fields {
            columns.push(constant_array(
                field.name(),
                field.data_type(),
                fragment.value_of(field.name()),
                rows,
            )?);
        }

        let batch = RecordBatch::try_new(self.schema.clone(), columns).map_err(|e| {
            StorageError::schema(format!(
                "file '{}' does not match the dataset schema: {}",
                fragment.path, e
            ))
        })?;

        match &self.residual {
            Some(filter) => filter.apply(&batch),
            None => Ok(batch),
        }
    }
}

fn root_index(file_schema: &Schema, column: &str, path: &str) -> Result<usize> {
    file_schema.index_of(column).map_err(|_| {
        StorageError::schema(format!("file '{}' has no column '{}'", path, column))
    })
}

/// Row groups of a file that statistics do not rule out for `filter`.
fn matching_row_groups(filter: &Filter, file_schema: &Schema, metadata: &ParquetMetaData) -> Vec<usize> {
    let groups = metadata.row_groups();
    let stats = |column: &str| -> Option<(ArrayRef, ArrayRef)> {
        let converter = StatisticsConverter::try_new(
            column,
            file_schema,
            metadata.file_metadata().schema_descr(),
        )
        .ok()?;
        let mins = converter.row_group_mins(groups.iter()).ok()?;
        let maxes = converter.row_group_maxes(groups.iter()).ok()?;
        Some((mins, maxes))
    };
    filter
        .may_match(&stats, groups.len())
        .into_iter()
        .enumerate()
        .filter_map(|(index, keep)| keep.then_some(index))
        .collect()
}

/// Decoder-side predicate evaluating `filter` on just the columns it names.
fn row_filter(
    filter: &Filter,
    file_schema: &Schema,
    parquet_schema: &SchemaDescriptor,
    path: &str,
) -> Result<RowFilter> {
    let columns = filter
        .columns()
        .iter()
        .map(|column| root_index(file_schema, column, path))
        .collect::<Result<Vec<_>>>()?;
    let projection = ProjectionMask::roots(parquet_schema, columns);

    let filter = filter.clone();
    let predicate = ArrowPredicateFn::new(projection, move |batch: RecordBatch| {
        filter
            .evaluate(&batch)
            .map_err(|e| ArrowError::ExternalError(Box::new(e)))
    });
    Ok(RowFilter::new(vec![Box::new(predicate)]))
}
