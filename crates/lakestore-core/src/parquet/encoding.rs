use parquet::file::properties::{EnabledStatistics, WriterProperties};
use parquet::format::KeyValue;

use crate::options::CompressionCodec;

const DEFAULT_ROW_GROUP_SIZE: usize = 1024 * 1024;

/// Writer properties shared by the Parquet and Delta Lake writers.
///
/// - The codec is applied to every column
/// - Dictionary encoding and page statistics enabled
/// - Row groups capped at `max_rows_per_group` (1Mi rows by default)
/// - Writer version embedded in file metadata
pub fn writer_properties(
    codec: CompressionCodec,
    max_rows_per_group: Option<usize>,
) -> WriterProperties {
    let metadata = vec![KeyValue {
        key: "lakestore.version".to_string(),
        value: Some(env!("CARGO_PKG_VERSION").to_string()),
    }];

    WriterProperties::builder()
        .set_dictionary_enabled(true)
        .set_statistics_enabled(EnabledStatistics::Page)
        .set_compression(codec.to_parquet())
        .set_max_row_group_size(max_rows_per_group.unwrap_or(DEFAULT_ROW_GROUP_SIZE))
        .set_key_value_metadata(Some(metadata))
        .build()
}
