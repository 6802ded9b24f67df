//! Hive-style partition directories (`column=value/`).

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{new_null_array, Array, ArrayRef, StringArray, UInt32Array};
use arrow::compute::{cast, take};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::{Result, StorageError};

/// Directory value used for null partition values.
pub const HIVE_DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

const PARTITION_VALUE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'*')
    .add(b'/')
    .add(b':')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'|');

/// Partition values of one fragment, in directory order. `None` is null.
pub type PartitionValues = Vec<(String, Option<String>)>;

pub(crate) fn encode_value(value: Option<&str>) -> String {
    match value {
        None => HIVE_DEFAULT_PARTITION.to_string(),
        Some(v) => utf8_percent_encode(v, PARTITION_VALUE).to_string(),
    }
}

fn decode_value(raw: &str) -> Option<String> {
    if raw == HIVE_DEFAULT_PARTITION {
        return None;
    }
    Some(percent_decode_str(raw).decode_utf8_lossy().into_owned())
}

/// Parse the `column=value` directory segments of a path relative to the
/// dataset root. The final segment is the file name and is ignored.
pub(crate) fn parse_path(relative_path: &str) -> PartitionValues {
    let mut segments: Vec<&str> = relative_path.split('/').filter(|s| !s.is_empty()).collect();
    segments.pop();
    segments
        .into_iter()
        .filter_map(|segment| {
            let (column, raw) = segment.split_once('=')?;
            if column.is_empty() {
                return None;
            }
            let column = percent_decode_str(column).decode_utf8_lossy().into_owned();
            Some((column, decode_value(raw)))
        })
        .collect()
}

/// Rows of a batch grouped by partition directory, in first-seen order.
pub(crate) struct RowGroups {
    pub dir: String,
    pub indices: Vec<u32>,
}

/// Group the rows of `batch` by the values of `columns`.
pub(crate) fn group_rows(batch: &RecordBatch, columns: &[String]) -> Result<Vec<RowGroups>> {
    let arrays = columns
        .iter()
        .map(|name| {
            batch.column_by_name(name).cloned().ok_or_else(|| {
                StorageError::schema(format!("partition column '{}' not found in data", name))
            })
        })
        .collect::<Result<Vec<ArrayRef>>>()?;

    let mut groups: Vec<RowGroups> = Vec::new();
    let mut by_dir: HashMap<String, usize> = HashMap::new();

    for row in 0..batch.num_rows() {
        let mut segments = Vec::with_capacity(columns.len());
        for (name, array) in columns.iter().zip(&arrays) {
            let value = if array.is_null(row) {
                None
            } else {
                Some(
                    array_value_to_string(array.as_ref(), row)
                        .map_err(|e| StorageError::arrow("Failed to render partition value", e))?,
                )
            };
            segments.push(format!(
                "{}={}",
                utf8_percent_encode(name, PARTITION_VALUE),
                encode_value(value.as_deref())
            ));
        }
        let dir = segments.join("/");

        let slot = match by_dir.get(&dir) {
            Some(slot) => *slot,
            None => {
                by_dir.insert(dir.clone(), groups.len());
                groups.push(RowGroups {
                    dir,
                    indices: Vec::new(),
                });
                groups.len() - 1
            }
        };
        groups[slot].indices.push(row as u32);
    }

    Ok(groups)
}

/// Infer a column type from every value observed for it.
pub(crate) fn infer_type<'a>(values: impl IntoIterator<Item = Option<&'a str>> + Clone) -> DataType {
    let present = || values.clone().into_iter().flatten();
    if present().next().is_none() {
        return DataType::Utf8;
    }
    if present().all(|v| v.parse::<i64>().is_ok()) {
        DataType::Int64
    } else if present().all(|v| v.parse::<f64>().is_ok()) {
        DataType::Float64
    } else if present().all(|v| v == "true" || v == "false") {
        DataType::Boolean
    } else {
        DataType::Utf8
    }
}

/// Constant column holding one partition value for `num_rows` rows.
///
/// The directory text is cast to `data_type` once, so any type Arrow can
/// parse from a string works, including types declared by a table schema.
pub(crate) fn constant_array(
    column: &str,
    data_type: &DataType,
    value: Option<&str>,
    num_rows: usize,
) -> Result<ArrayRef> {
    let Some(value) = value else {
        return Ok(new_null_array(data_type, num_rows));
    };
    let invalid = || {
        StorageError::schema(format!(
            "partition value '{}' of column '{}' is not a valid {}",
            value, column, data_type
        ))
    };

    let text = StringArray::from(vec![value]);
    let single = if *data_type == DataType::Utf8 {
        Arc::new(text) as ArrayRef
    } else {
        cast(&text, data_type).map_err(|_| invalid())?
    };
    if single.is_null(0) {
        return Err(invalid());
    }
    take(single.as_ref(), &UInt32Array::from(vec![0u32; num_rows]), None)
        .map_err(|e| StorageError::arrow("Failed to repeat partition value", e))
}
