//! Error types for storage operations.

use std::fmt;
use thiserror::Error;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// E001: Configuration missing or invalid
    E001InvalidConfig,
    /// E002: Credentials rejected by the backend
    E002Authentication,
    /// E003: Operation not supported by the backend
    E003Unsupported,
    /// E004: Destination already holds data
    E004Conflict,
    /// E005: Nothing readable at the path
    E005NotFound,
    /// E006: Data or filter does not match the schema
    E006Schema,
    /// E007: Failure raised by a delegated engine
    E007Engine,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E001InvalidConfig => "E001",
            Self::E002Authentication => "E002",
            Self::E003Unsupported => "E003",
            Self::E004Conflict => "E004",
            Self::E005NotFound => "E005",
            Self::E006Schema => "E006",
            Self::E007Engine => "E007",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The engine a delegated failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Parquet,
    DeltaLake,
    Filesystem,
    Arrow,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::Parquet => write!(f, "parquet"),
            Engine::DeltaLake => write!(f, "deltalake"),
            Engine::Filesystem => write!(f, "filesystem"),
            Engine::Arrow => write!(f, "arrow"),
        }
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// Invalid configuration or argument provided
    #[error("[{code}] Invalid configuration: {message}")]
    InvalidConfig { code: ErrorCode, message: String },

    /// Credentials were rejected when the backend was constructed
    #[error("[{code}] Authentication failed for {backend} backend: {reason}")]
    Authentication {
        code: ErrorCode,
        backend: String,
        reason: String,
    },

    /// The backend cannot serve this operation
    #[error("[{code}] Not supported: {message}")]
    Unsupported { code: ErrorCode, message: String },

    /// Destination already holds data and the conflict policy forbids writing
    #[error("[{code}] Data already exists at '{path}': {message}")]
    Conflict {
        code: ErrorCode,
        path: String,
        message: String,
    },

    /// The path resolves to no readable files
    #[error("[{code}] No readable data found at '{path}'")]
    NotFound { code: ErrorCode, path: String },

    /// Partition columns or filter columns do not match the data schema
    #[error("[{code}] Schema error: {message}")]
    Schema { code: ErrorCode, message: String },

    /// Failure raised by the Parquet, Delta Lake, filesystem or Arrow engine
    #[error("[{code}] {engine} engine error: {message}")]
    Engine {
        code: ErrorCode,
        engine: Engine,
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl StorageError {
    /// Create an invalid config error with error code
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            code: ErrorCode::E001InvalidConfig,
            message: message.into(),
        }
    }

    /// Create an authentication error with error code
    pub fn authentication(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Authentication {
            code: ErrorCode::E002Authentication,
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// Create an unsupported operation error with error code
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            code: ErrorCode::E003Unsupported,
            message: message.into(),
        }
    }

    /// Create a conflict error with error code
    pub fn conflict(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            code: ErrorCode::E004Conflict,
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a not-found error with error code
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound {
            code: ErrorCode::E005NotFound,
            path: path.into(),
        }
    }

    /// Create a schema error with error code
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            code: ErrorCode::E006Schema,
            message: message.into(),
        }
    }

    /// Wrap a failure from a delegated engine, keeping the original as `source`.
    pub fn engine<E>(engine: Engine, context: impl fmt::Display, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Engine {
            code: ErrorCode::E007Engine,
            engine,
            message: format!("{}: {}", context, err),
            source: Some(Box::new(err)),
        }
    }

    /// Engine failure without an underlying error value.
    pub fn engine_message(engine: Engine, message: impl Into<String>) -> Self {
        Self::Engine {
            code: ErrorCode::E007Engine,
            engine,
            message: message.into(),
            source: None,
        }
    }

    pub fn parquet(context: impl fmt::Display, err: parquet::errors::ParquetError) -> Self {
        Self::engine(Engine::Parquet, context, err)
    }

    pub fn delta(context: impl fmt::Display, err: deltalake::DeltaTableError) -> Self {
        Self::engine(Engine::DeltaLake, context, err)
    }

    pub fn filesystem(context: impl fmt::Display, err: opendal::Error) -> Self {
        Self::engine(Engine::Filesystem, context, err)
    }

    pub fn arrow(context: impl fmt::Display, err: arrow::error::ArrowError) -> Self {
        Self::engine(Engine::Arrow, context, err)
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidConfig { code, .. }
            | Self::Authentication { code, .. }
            | Self::Unsupported { code, .. }
            | Self::Conflict { code, .. }
            | Self::NotFound { code, .. }
            | Self::Schema { code, .. }
            | Self::Engine { code, .. } => *code,
        }
    }

    /// The engine that produced this error, if it came from one.
    pub fn engine_kind(&self) -> Option<Engine> {
        match self {
            Self::Engine { engine, .. } => Some(*engine),
            _ => None,
        }
    }
}

/// Result type alias for StorageError
pub type Result<T> = std::result::Result<T, StorageError>;

/// Mask a credential for logs and error messages, keeping a short prefix
/// so operators can tell which key was used.
pub fn redact_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("{}****", visible)
    }
}
