//! Delta Lake tables through `deltalake`.
//!
//! Writes go through the Delta engine so every write is one commit; the
//! caller's batches are streamed into it as a DataFusion plan and never
//! collected. Reads take the active add actions of the latest version,
//! with their table-relative paths and typed partition values, and decode
//! those files through the backend filesystem handle like any other
//! Parquet dataset.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use deltalake::datafusion::catalog::streaming::StreamingTable;
use deltalake::datafusion::datasource::provider_as_source;
use deltalake::datafusion::error::DataFusionError;
use deltalake::datafusion::execution::TaskContext;
use deltalake::datafusion::logical_expr::{LogicalPlan, LogicalPlanBuilder};
use deltalake::datafusion::physical_plan::stream::RecordBatchStreamAdapter;
use deltalake::datafusion::physical_plan::streaming::PartitionStream;
use deltalake::datafusion::physical_plan::SendableRecordBatchStream;
use deltalake::kernel::scalars::ScalarExt;
use deltalake::kernel::LogicalFileView;
use deltalake::protocol::SaveMode;
use deltalake::{open_table_with_storage_options, DeltaOps, DeltaTableError};
use futures::stream::{self, BoxStream, StreamExt};
use opendal::Operator;
use percent_encoding::percent_decode_str;
use url::Url;

use crate::backend::StorageBackend;
use crate::dataset::{Dataset, Fragment};
use crate::error::{Engine, Result, StorageError};
use crate::options::{DeltaLakeWriteOptions, DeltaWriteMode, FileFormat};
use crate::parquet::{encoding::writer_properties, list_files};
use crate::path::join;

const DELTA_LOG_DIR: &str = "_delta_log";

static REGISTER_HANDLERS: Once = Once::new();

/// Make `abfss://` table URIs resolvable by the Delta engine.
fn register_handlers() {
    REGISTER_HANDLERS.call_once(|| {
        deltalake::azure::register_handlers(None);
        tracing::debug!("Registered Delta Lake object store handlers");
    });
}

/// Turn a backend table URI into the URL form the engine expects.
pub(crate) fn table_url(table_uri: &str) -> Result<Url> {
    let invalid = |detail: String| {
        StorageError::invalid_config(format!("invalid table URI '{}': {}", table_uri, detail))
    };

    if table_uri.contains("://") {
        let mut url = Url::parse(table_uri).map_err(|e| invalid(e.to_string()))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        return Ok(url);
    }

    let path = std::path::Path::new(table_uri);
    if !path.is_absolute() {
        return Err(invalid("expected an absolute path or a URL".to_string()));
    }
    Url::from_directory_path(path).map_err(|_| invalid("not a directory path".to_string()))
}

/// Path of a data file relative to the table root, or `None` when the file
/// lies outside the table.
///
/// Add actions normally carry relative paths. Absolute ones show up as
/// URIs or, for local tables, as bare filesystem paths.
fn relative_file_path(table: &Url, file: &str) -> Option<String> {
    let decoded_root = percent_decode_str(table.path()).decode_utf8_lossy();

    if file.contains("://") {
        let url = Url::parse(file).ok()?;
        if url.scheme() != table.scheme() || url.host_str() != table.host_str() {
            return None;
        }
        let relative = url.path().strip_prefix(table.path())?;
        return Some(percent_decode_str(relative).decode_utf8_lossy().into_owned());
    }

    if file.starts_with('/') {
        return file
            .strip_prefix(decoded_root.as_ref())
            .map(|relative| relative.trim_start_matches('/').to_string());
    }

    Some(file.to_string())
}

/// Whether a transaction log exists under `base_path`.
async fn table_exists(op: &Operator, base_path: &str) -> Result<bool> {
    let log = list_files(op, &join(base_path, DELTA_LOG_DIR)).await?;
    Ok(!log.is_empty())
}

fn save_mode(mode: DeltaWriteMode) -> SaveMode {
    match mode {
        DeltaWriteMode::Error => SaveMode::ErrorIfExists,
        DeltaWriteMode::Append => SaveMode::Append,
        DeltaWriteMode::Overwrite => SaveMode::Overwrite,
    }
}

/// Hands the caller's batch stream to the engine exactly once and counts
/// the rows that pass through.
struct BatchSource {
    schema: SchemaRef,
    batches: Mutex<Option<BoxStream<'static, Result<RecordBatch>>>>,
    rows: Arc<AtomicUsize>,
}

impl fmt::Debug for BatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchSource")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl PartitionStream for BatchSource {
    fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn execute(&self, _ctx: Arc<TaskContext>) -> SendableRecordBatchStream {
        let taken = self.batches.lock().ok().and_then(|mut slot| slot.take());
        let batches = match taken {
            Some(batches) => {
                let rows = self.rows.clone();
                batches
                    .map(move |batch| {
                        let batch = batch.map_err(|e| DataFusionError::External(Box::new(e)))?;
                        rows.fetch_add(batch.num_rows(), Ordering::Relaxed);
                        Ok(batch)
                    })
                    .boxed()
            }
            None => stream::once(async {
                Err(DataFusionError::Execution(
                    "input batches were already consumed".to_string(),
                ))
            })
            .boxed(),
        };
        Box::pin(RecordBatchStreamAdapter::new(self.schema.clone(), batches))
    }
}

/// Logical plan scanning `batches` as a single streaming partition.
fn input_plan(
    schema: SchemaRef,
    batches: BoxStream<'static, Result<RecordBatch>>,
    rows: Arc<AtomicUsize>,
) -> Result<LogicalPlan> {
    let plan_error = |e: DataFusionError| {
        StorageError::engine(Engine::DeltaLake, "Failed to plan input batches", e)
    };
    let source = BatchSource {
        schema: schema.clone(),
        batches: Mutex::new(Some(batches)),
        rows,
    };
    let partitions: Vec<Arc<dyn PartitionStream>> = vec![Arc::new(source)];
    let table = StreamingTable::try_new(schema, partitions).map_err(plan_error)?;
    LogicalPlanBuilder::scan("input", provider_as_source(Arc::new(table)), None)
        .and_then(|builder| builder.build())
        .map_err(plan_error)
}

/// Write all batches as one commit to the table at `logical_path`.
///
/// Batches are pulled while the engine writes. A stream without batches
/// still commits, creating the table with `schema` and no data files.
pub(crate) async fn write(
    backend: &dyn StorageBackend,
    logical_path: &str,
    schema: SchemaRef,
    batches: BoxStream<'static, Result<RecordBatch>>,
    options: &DeltaLakeWriteOptions,
) -> Result<usize> {
    let storage_options = backend.storage_options()?;
    let base_path = backend.base_path(logical_path)?;
    let url = table_url(&backend.table_uri(logical_path)?)?;
    register_handlers();

    if options.mode() == DeltaWriteMode::Error
        && table_exists(backend.filesystem(), &base_path).await?
    {
        return Err(StorageError::conflict(
            url.as_str(),
            "table already exists and mode is 'error'",
        ));
    }

    if url.scheme() == "file" {
        backend
            .filesystem()
            .create_dir(&format!("{}/", base_path))
            .await
            .map_err(|e| {
                StorageError::filesystem(format!("Failed to create '{}'", base_path), e)
            })?;
    }

    tracing::debug!(
        table = %url,
        mode = %options.mode(),
        partitions = ?options.partitions(),
        "Writing Delta Lake table"
    );

    let rows = Arc::new(AtomicUsize::new(0));
    let plan = input_plan(schema, batches, rows.clone())?;

    let table = DeltaOps::try_from_uri_with_storage_options(url.clone(), storage_options)
        .await
        .map_err(|e| StorageError::delta(format!("Failed to open '{}'", url), e))?
        .write(Vec::<RecordBatch>::new())
        .with_input_execution_plan(Arc::new(plan))
        .with_save_mode(save_mode(options.mode()))
        .with_partition_columns(options.partitions().to_vec())
        .with_writer_properties(writer_properties(
            options.compression_codec(),
            options.max_rows_per_group(),
        ))
        .await
        .map_err(|e| StorageError::delta(format!("Failed to write '{}'", url), e))?;

    let rows = rows.load(Ordering::Relaxed);
    tracing::info!(table = %url, version = ?table.version(), rows, "Wrote Delta Lake table");
    Ok(rows)
}

/// Fragment for one active data file of the table at `url`.
fn fragment(url: &Url, base_path: &str, file: &LogicalFileView) -> Result<Fragment> {
    let path = file.path();
    let relative = relative_file_path(url, &path).ok_or_else(|| {
        StorageError::unsupported(format!(
            "data file '{}' lies outside table '{}'",
            path, url
        ))
    })?;

    let partition_values = file
        .partition_values()
        .map(|values| {
            values
                .fields()
                .iter()
                .zip(values.values())
                .map(|(field, value)| {
                    let value = (!value.is_null()).then(|| value.serialize());
                    (field.name().to_string(), value)
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Fragment {
        path: join(base_path, &relative),
        partition_values,
        size: u64::try_from(file.size()).ok(),
    })
}

/// Resolve the active files of the table at `logical_path`.
pub(crate) async fn dataset(backend: &dyn StorageBackend, logical_path: &str) -> Result<Dataset> {
    let storage_options = backend.storage_options()?;
    let base_path = backend.base_path(logical_path)?;
    let url = table_url(&backend.table_uri(logical_path)?)?;
    register_handlers();

    if !table_exists(backend.filesystem(), &base_path).await? {
        return Err(StorageError::not_found(url.as_str()));
    }

    let table = match open_table_with_storage_options(url.clone(), storage_options).await {
        Ok(table) => table,
        Err(DeltaTableError::NotATable(_)) => return Err(StorageError::not_found(url.as_str())),
        Err(e) => return Err(StorageError::delta(format!("Failed to open '{}'", url), e)),
    };
    let state = table
        .snapshot()
        .map_err(|e| StorageError::delta(format!("Failed to load '{}'", url), e))?;
    let table_schema = state.snapshot().arrow_schema();

    let mut fragments = state
        .log_data()
        .into_iter()
        .map(|file| fragment(&url, &base_path, &file))
        .collect::<Result<Vec<_>>>()?;
    fragments.sort_by(|a, b| a.path.cmp(&b.path));

    tracing::debug!(
        table = %url,
        version = state.version(),
        files = fragments.len(),
        "Resolved Delta Lake table"
    );

    Ok(Dataset::from_table(
        backend.filesystem().clone(),
        FileFormat::DeltaLake,
        &base_path,
        &table_schema,
        fragments,
    ))
}
