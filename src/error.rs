use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModelError>;

// Errors raised while loading inputs or running the model
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("grid '{name}' not found at {path}")]
    GridNotFound { name: String, path: PathBuf },

    #[error("failed to parse grid {path}: {message}")]
    GridParse { path: PathBuf, message: String },

    #[error("grid shape mismatch for '{name}': expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: String,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("invalid parameter {name} = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: String,
    },

    #[error("invalid record in {source_name} line {line}: {message}")]
    InvalidRecord {
        source_name: String,
        line: usize,
        message: String,
    },

    #[error("climate records out of order: day {current} follows day {previous}")]
    UnorderedRecords { previous: u32, current: u32 },

    #[error("invalid day id {0} (expected YYYYMMDD)")]
    InvalidDayId(u32),

    #[error("no precipitation measurements for day {0}")]
    NoPrecipitationData(u32),

    #[error("config error: {0}")]
    Config(String),

    #[error("workspace {0} already exists and overwrite is disabled")]
    WorkspaceExists(PathBuf),

    #[error("csv error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ModelError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ModelError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        ModelError::Csv {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_parameter(name: &'static str, value: f64, reason: impl Into<String>) -> Self {
        ModelError::InvalidParameter {
            name,
            value,
            reason: reason.into(),
        }
    }
}
