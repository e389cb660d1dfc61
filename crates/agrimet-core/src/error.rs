// crates/agrimet-core/src/error.rs

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("source {location} is unavailable: {source}")]
    SourceUnavailable {
        location: String,
        #[source]
        source: BoxError,
    },

    #[error("{origin} returned no rows")]
    EmptyResult { origin: String },

    #[error("column {column} does not exist in the dataset")]
    MissingColumn { column: String },

    #[error("relabeling would produce duplicate column {column}")]
    DuplicateColumn { column: String },

    #[error("pattern {label} matched but captured {text:?}, which is not a number")]
    MalformedMeasurement { label: String, text: String },

    #[error("pattern {label} is invalid: {source}")]
    InvalidPattern {
        label: String,
        #[source]
        source: regex::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("configuration could not be parsed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

impl EtlError {
    pub fn source_unavailable(location: impl Into<String>, source: impl Into<BoxError>) -> Self {
        EtlError::SourceUnavailable {
            location: location.into(),
            source: source.into(),
        }
    }

    pub fn missing_column(column: impl Into<String>) -> Self {
        EtlError::MissingColumn {
            column: column.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
