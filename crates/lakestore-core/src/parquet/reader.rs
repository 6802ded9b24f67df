//! Ranged Parquet reads through an `opendal` operator.
//!
//! Opening a file fetches its footer only; a scan then fetches the column
//! chunks of the row groups it selects. No file is ever read in full.

use std::ops::Range;
use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use opendal::Operator;
use parquet::arrow::arrow_reader::ArrowReaderOptions;
use parquet::arrow::async_reader::{AsyncFileReader, ParquetRecordBatchStreamBuilder};
use parquet::errors::ParquetError;
use parquet::file::metadata::{ParquetMetaData, ParquetMetaDataReader};

use crate::error::{Result, StorageError};

/// Tail bytes fetched with the first request. Large enough for the footer
/// of most files, so metadata usually costs one round trip.
const FOOTER_PREFETCH: usize = 64 * 1024;

/// [`AsyncFileReader`] over one file of an operator.
#[derive(Debug, Clone)]
pub(crate) struct OperatorFileReader {
    operator: Operator,
    path: String,
    size: u64,
}

impl OperatorFileReader {
    /// Reader for `path`. The size is looked up unless the caller knows it.
    pub(crate) async fn open(operator: Operator, path: &str, size: Option<u64>) -> Result<Self> {
        let size = match size {
            Some(size) => size,
            None => operator
                .stat(path)
                .await
                .map_err(|e| StorageError::filesystem(format!("Failed to stat '{}'", path), e))?
                .content_length(),
        };
        Ok(Self {
            operator,
            path: path.to_string(),
            size,
        })
    }
}

impl AsyncFileReader for OperatorFileReader {
    fn get_bytes(&mut self, range: Range<u64>) -> BoxFuture<'_, parquet::errors::Result<Bytes>> {
        async move {
            let buffer = self
                .operator
                .read_with(&self.path)
                .range(range)
                .await
                .map_err(|e| ParquetError::External(Box::new(e)))?;
            Ok(buffer.to_bytes())
        }
        .boxed()
    }

    fn get_metadata<'a>(
        &'a mut self,
        _options: Option<&'a ArrowReaderOptions>,
    ) -> BoxFuture<'a, parquet::errors::Result<Arc<ParquetMetaData>>> {
        async move {
            let size = self.size;
            let metadata = ParquetMetaDataReader::new()
                .with_prefetch_hint(Some(FOOTER_PREFETCH))
                .load_and_finish(self, size)
                .await?;
            Ok(Arc::new(metadata))
        }
        .boxed()
    }
}

/// Open a stream builder for `path`, reading its footer.
pub(crate) async fn open_builder(
    operator: Operator,
    path: &str,
    size: Option<u64>,
) -> Result<ParquetRecordBatchStreamBuilder<OperatorFileReader>> {
    let reader = OperatorFileReader::open(operator, path, size).await?;
    ParquetRecordBatchStreamBuilder::new(reader)
        .await
        .map_err(|e| StorageError::parquet(format!("Failed to open '{}'", path), e))
}

/// Arrow schema stored in the footer of `path`.
pub(crate) async fn read_schema(operator: Operator, path: &str) -> Result<SchemaRef> {
    let builder = open_builder(operator, path, None).await?;
    Ok(builder.schema().clone())
}
