//! Format discriminator and write-options model.
//!
//! Options are plain values validated when they are built. Conflict policies
//! stay format specific: Parquet and Delta Lake do not share a policy enum,
//! and a value owned by one format is rejected for the other.

use std::fmt;
use std::str::FromStr;

use parquet::basic::{BrotliLevel, Compression, GzipLevel, ZstdLevel};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};

/// Storage format an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Parquet,
    #[serde(alias = "delta")]
    DeltaLake,
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileFormat::Parquet => write!(f, "parquet"),
            FileFormat::DeltaLake => write!(f, "deltalake"),
        }
    }
}

impl FromStr for FileFormat {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "parquet" => Ok(FileFormat::Parquet),
            "deltalake" | "delta" => Ok(FileFormat::DeltaLake),
            _ => Err(StorageError::invalid_config(format!(
                "Unsupported file format: {}. Supported: parquet, deltalake",
                s
            ))),
        }
    }
}

/// Compression codec applied to every written data file.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum CompressionCodec {
    None,
    #[default]
    Snappy,
    Gzip,
    Brotli,
    Zstd,
    Lz4,
}

impl CompressionCodec {
    pub const ALL: [CompressionCodec; 6] = [
        CompressionCodec::None,
        CompressionCodec::Snappy,
        CompressionCodec::Gzip,
        CompressionCodec::Brotli,
        CompressionCodec::Zstd,
        CompressionCodec::Lz4,
    ];

    /// Parquet codec written for this setting. LZ4 is written as `LZ4_RAW`.
    pub fn to_parquet(self) -> Compression {
        match self {
            CompressionCodec::None => Compression::UNCOMPRESSED,
            CompressionCodec::Snappy => Compression::SNAPPY,
            CompressionCodec::Gzip => Compression::GZIP(GzipLevel::default()),
            CompressionCodec::Brotli => Compression::BROTLI(BrotliLevel::default()),
            CompressionCodec::Zstd => Compression::ZSTD(ZstdLevel::default()),
            CompressionCodec::Lz4 => Compression::LZ4_RAW,
        }
    }

    /// Map a codec found in file metadata back to a setting, ignoring levels.
    pub fn from_parquet(compression: Compression) -> Option<Self> {
        match compression {
            Compression::UNCOMPRESSED => Some(CompressionCodec::None),
            Compression::SNAPPY => Some(CompressionCodec::Snappy),
            Compression::GZIP(_) => Some(CompressionCodec::Gzip),
            Compression::BROTLI(_) => Some(CompressionCodec::Brotli),
            Compression::ZSTD(_) => Some(CompressionCodec::Zstd),
            Compression::LZ4 | Compression::LZ4_RAW => Some(CompressionCodec::Lz4),
            _ => None,
        }
    }
}

impl fmt::Display for CompressionCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompressionCodec::None => "none",
            CompressionCodec::Snappy => "snappy",
            CompressionCodec::Gzip => "gzip",
            CompressionCodec::Brotli => "brotli",
            CompressionCodec::Zstd => "zstd",
            CompressionCodec::Lz4 => "lz4",
        };
        f.write_str(name)
    }
}

impl FromStr for CompressionCodec {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" | "uncompressed" => Ok(CompressionCodec::None),
            "snappy" => Ok(CompressionCodec::Snappy),
            "gzip" => Ok(CompressionCodec::Gzip),
            "brotli" => Ok(CompressionCodec::Brotli),
            "zstd" => Ok(CompressionCodec::Zstd),
            "lz4" | "lz4_raw" => Ok(CompressionCodec::Lz4),
            _ => Err(StorageError::invalid_config(format!(
                "Unsupported compression codec: {}. Supported: none, snappy, gzip, brotli, zstd, lz4",
                s
            ))),
        }
    }
}

/// What a Parquet write does when the destination already holds files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistingDataBehavior {
    /// Fail if the destination contains any file.
    #[default]
    Error,
    /// Overwrite files with the same name, leave everything else.
    OverwriteOrIgnore,
    /// Clear every partition directory the write touches.
    DeleteMatching,
}

impl fmt::Display for ExistingDataBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExistingDataBehavior::Error => write!(f, "error"),
            ExistingDataBehavior::OverwriteOrIgnore => write!(f, "overwrite_or_ignore"),
            ExistingDataBehavior::DeleteMatching => write!(f, "delete_matching"),
        }
    }
}

impl FromStr for ExistingDataBehavior {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "error" => Ok(ExistingDataBehavior::Error),
            "overwrite_or_ignore" => Ok(ExistingDataBehavior::OverwriteOrIgnore),
            "delete_matching" => Ok(ExistingDataBehavior::DeleteMatching),
            "append" | "overwrite" => Err(StorageError::invalid_config(format!(
                "existing_data_behavior '{}' is only valid for deltalake. Parquet supports: error, overwrite_or_ignore, delete_matching",
                s
            ))),
            _ => Err(StorageError::invalid_config(format!(
                "Unsupported existing_data_behavior for parquet: {}. Supported: error, overwrite_or_ignore, delete_matching",
                s
            ))),
        }
    }
}

/// Save mode of a Delta Lake write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaWriteMode {
    /// Fail if the table already exists.
    #[default]
    Error,
    Append,
    Overwrite,
}

impl fmt::Display for DeltaWriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeltaWriteMode::Error => write!(f, "error"),
            DeltaWriteMode::Append => write!(f, "append"),
            DeltaWriteMode::Overwrite => write!(f, "overwrite"),
        }
    }
}

impl FromStr for DeltaWriteMode {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "error" => Ok(DeltaWriteMode::Error),
            "append" => Ok(DeltaWriteMode::Append),
            "overwrite" => Ok(DeltaWriteMode::Overwrite),
            "overwrite_or_ignore" | "delete_matching" => Err(StorageError::invalid_config(format!(
                "existing_data_behavior '{}' is only valid for parquet. Delta Lake supports: error, append, overwrite",
                s
            ))),
            _ => Err(StorageError::invalid_config(format!(
                "Unsupported existing_data_behavior for deltalake: {}. Supported: error, append, overwrite",
                s
            ))),
        }
    }
}

const DEFAULT_BASENAME_TEMPLATE: &str = "part-{i}.parquet";

fn validate_partitions(partitions: &[String]) -> Result<()> {
    for (idx, name) in partitions.iter().enumerate() {
        if name.trim().is_empty() {
            return Err(StorageError::invalid_config(
                "partition column names must not be empty",
            ));
        }
        if partitions[..idx].contains(name) {
            return Err(StorageError::invalid_config(format!(
                "partition column '{}' listed more than once",
                name
            )));
        }
    }
    Ok(())
}

fn validate_positive(name: &str, value: Option<usize>) -> Result<()> {
    if value == Some(0) {
        return Err(StorageError::invalid_config(format!(
            "{} must be greater than 0",
            name
        )));
    }
    Ok(())
}

/// Options for writing a Parquet dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParquetWriteOptions {
    partitions: Vec<String>,
    compression_codec: CompressionCodec,
    existing_data_behavior: ExistingDataBehavior,
    max_rows_per_file: Option<usize>,
    max_rows_per_group: Option<usize>,
    basename_template: String,
}

impl ParquetWriteOptions {
    pub fn try_new<I, S>(
        partitions: I,
        compression_codec: CompressionCodec,
        existing_data_behavior: ExistingDataBehavior,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let partitions: Vec<String> = partitions.into_iter().map(Into::into).collect();
        validate_partitions(&partitions)?;
        Ok(Self {
            partitions,
            compression_codec,
            existing_data_behavior,
            max_rows_per_file: None,
            max_rows_per_group: None,
            basename_template: DEFAULT_BASENAME_TEMPLATE.to_string(),
        })
    }

    /// Start a new file once a file holds this many rows.
    pub fn with_max_rows_per_file(mut self, rows: usize) -> Result<Self> {
        validate_positive("max_rows_per_file", Some(rows))?;
        self.max_rows_per_file = Some(rows);
        Ok(self)
    }

    pub fn with_max_rows_per_group(mut self, rows: usize) -> Result<Self> {
        validate_positive("max_rows_per_group", Some(rows))?;
        self.max_rows_per_group = Some(rows);
        Ok(self)
    }

    /// File name pattern; `{i}` is replaced with a per-directory counter.
    pub fn with_basename_template(mut self, template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        if !template.contains("{i}") {
            return Err(StorageError::invalid_config(format!(
                "basename_template '{}' must contain '{{i}}'",
                template
            )));
        }
        if template.contains('/') {
            return Err(StorageError::invalid_config(format!(
                "basename_template '{}' must not contain '/'",
                template
            )));
        }
        self.basename_template = template;
        Ok(self)
    }

    pub fn partitions(&self) -> &[String] {
        &self.partitions
    }

    pub fn compression_codec(&self) -> CompressionCodec {
        self.compression_codec
    }

    pub fn existing_data_behavior(&self) -> ExistingDataBehavior {
        self.existing_data_behavior
    }

    pub fn max_rows_per_file(&self) -> Option<usize> {
        self.max_rows_per_file
    }

    pub fn max_rows_per_group(&self) -> Option<usize> {
        self.max_rows_per_group
    }

    pub fn basename_template(&self) -> &str {
        &self.basename_template
    }

    pub(crate) fn file_name(&self, index: usize) -> String {
        self.basename_template.replace("{i}", &index.to_string())
    }
}

impl Default for ParquetWriteOptions {
    fn default() -> Self {
        Self {
            partitions: Vec::new(),
            compression_codec: CompressionCodec::default(),
            existing_data_behavior: ExistingDataBehavior::default(),
            max_rows_per_file: None,
            max_rows_per_group: None,
            basename_template: DEFAULT_BASENAME_TEMPLATE.to_string(),
        }
    }
}

/// Options for writing a Delta Lake table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeltaLakeWriteOptions {
    partitions: Vec<String>,
    compression_codec: CompressionCodec,
    mode: DeltaWriteMode,
    max_rows_per_group: Option<usize>,
}

impl DeltaLakeWriteOptions {
    pub fn try_new<I, S>(
        partitions: I,
        compression_codec: CompressionCodec,
        mode: DeltaWriteMode,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let partitions: Vec<String> = partitions.into_iter().map(Into::into).collect();
        validate_partitions(&partitions)?;
        Ok(Self {
            partitions,
            compression_codec,
            mode,
            max_rows_per_group: None,
        })
    }

    pub fn with_max_rows_per_group(mut self, rows: usize) -> Result<Self> {
        validate_positive("max_rows_per_group", Some(rows))?;
        self.max_rows_per_group = Some(rows);
        Ok(self)
    }

    pub fn partitions(&self) -> &[String] {
        &self.partitions
    }

    pub fn compression_codec(&self) -> CompressionCodec {
        self.compression_codec
    }

    pub fn mode(&self) -> DeltaWriteMode {
        self.mode
    }

    pub fn max_rows_per_group(&self) -> Option<usize> {
        self.max_rows_per_group
    }
}

/// Write options tagged with the format that owns them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOptions {
    Parquet(ParquetWriteOptions),
    DeltaLake(DeltaLakeWriteOptions),
}

impl WriteOptions {
    pub fn format(&self) -> FileFormat {
        match self {
            WriteOptions::Parquet(_) => FileFormat::Parquet,
            WriteOptions::DeltaLake(_) => FileFormat::DeltaLake,
        }
    }

    pub fn partitions(&self) -> &[String] {
        match self {
            WriteOptions::Parquet(o) => o.partitions(),
            WriteOptions::DeltaLake(o) => o.partitions(),
        }
    }

    pub fn compression_codec(&self) -> CompressionCodec {
        match self {
            WriteOptions::Parquet(o) => o.compression_codec(),
            WriteOptions::DeltaLake(o) => o.compression_codec(),
        }
    }

    /// Build options from loosely typed values, checking that the conflict
    /// policy belongs to `format`.
    pub fn parse<I, S>(
        format: FileFormat,
        partitions: I,
        compression_codec: &str,
        existing_data_behavior: &str,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let codec = compression_codec.parse::<CompressionCodec>()?;
        match format {
            FileFormat::Parquet => {
                let behavior = existing_data_behavior.parse::<ExistingDataBehavior>()?;
                Ok(WriteOptions::Parquet(ParquetWriteOptions::try_new(
                    partitions, codec, behavior,
                )?))
            }
            FileFormat::DeltaLake => {
                let mode = existing_data_behavior.parse::<DeltaWriteMode>()?;
                Ok(WriteOptions::DeltaLake(DeltaLakeWriteOptions::try_new(
                    partitions, codec, mode,
                )?))
            }
        }
    }

    /// Default options for a format.
    pub fn default_for(format: FileFormat) -> Self {
        match format {
            FileFormat::Parquet => WriteOptions::Parquet(ParquetWriteOptions::default()),
            FileFormat::DeltaLake => WriteOptions::DeltaLake(DeltaLakeWriteOptions::default()),
        }
    }
}

impl From<ParquetWriteOptions> for WriteOptions {
    fn from(options: ParquetWriteOptions) -> Self {
        WriteOptions::Parquet(options)
    }
}

impl From<DeltaLakeWriteOptions> for WriteOptions {
    fn from(options: DeltaLakeWriteOptions) -> Self {
        WriteOptions::DeltaLake(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_format_from_str() {
        assert_eq!("parquet".parse::<FileFormat>().unwrap(), FileFormat::Parquet);
        assert_eq!(
            "DeltaLake".parse::<FileFormat>().unwrap(),
            FileFormat::DeltaLake
        );
        assert_eq!("delta".parse::<FileFormat>().unwrap(), FileFormat::DeltaLake);
        assert!("csv".parse::<FileFormat>().is_err());
    }

    #[test]
    fn test_codec_from_str() {
        assert_eq!(
            "None".parse::<CompressionCodec>().unwrap(),
            CompressionCodec::None
        );
        assert_eq!(
            "uncompressed".parse::<CompressionCodec>().unwrap(),
            CompressionCodec::None
        );
        assert_eq!(
            "ZSTD".parse::<CompressionCodec>().unwrap(),
            CompressionCodec::Zstd
        );
        assert!("lzo".parse::<CompressionCodec>().is_err());
    }

    #[test]
    fn codec_survives_parquet_mapping() {
        for codec in CompressionCodec::ALL {
            assert_eq!(CompressionCodec::from_parquet(codec.to_parquet()), Some(codec));
        }
        assert_eq!(
            CompressionCodec::from_parquet(Compression::LZ4),
            Some(CompressionCodec::Lz4)
        );
    }

    #[test]
    fn behaviors_are_format_specific() {
        let err = WriteOptions::parse(FileFormat::Parquet, ["a"], "snappy", "append").unwrap_err();
        assert!(matches!(err, StorageError::InvalidConfig { .. }));
        assert!(err.to_string().contains("only valid for deltalake"));

        let err = WriteOptions::parse(
            FileFormat::DeltaLake,
            Vec::<String>::new(),
            "snappy",
            "overwrite_or_ignore",
        )
        .unwrap_err();
        assert!(err.to_string().contains("only valid for parquet"));

        let ok = WriteOptions::parse(FileFormat::DeltaLake, ["a"], "zstd", "overwrite").unwrap();
        assert_eq!(ok.format(), FileFormat::DeltaLake);
        assert_eq!(ok.compression_codec(), CompressionCodec::Zstd);
        assert_eq!(ok.partitions(), ["a".to_string()]);
    }

    #[test]
    fn partitions_are_validated_at_construction() {
        assert!(ParquetWriteOptions::try_new(
            ["a", "a"],
            CompressionCodec::None,
            ExistingDataBehavior::Error
        )
        .is_err());
        assert!(DeltaLakeWriteOptions::try_new(
            [""],
            CompressionCodec::None,
            DeltaWriteMode::Append
        )
        .is_err());
    }

    #[test]
    fn parquet_limits_and_template() {
        let options = ParquetWriteOptions::default();
        assert_eq!(options.file_name(3), "part-3.parquet");
        assert!(options.clone().with_max_rows_per_file(0).is_err());
        assert!(options.clone().with_basename_template("data.parquet").is_err());
        assert!(options.clone().with_basename_template("a/{i}.parquet").is_err());

        let custom = options
            .with_basename_template("chunk-{i}.parquet")
            .unwrap()
            .with_max_rows_per_file(100)
            .unwrap();
        assert_eq!(custom.file_name(0), "chunk-0.parquet");
        assert_eq!(custom.max_rows_per_file(), Some(100));
    }
}
