pub mod config;
pub mod dataset;
pub mod error;
pub mod field;
pub mod source;
pub mod stages;
pub mod weather;

pub use config::{
    ColumnSwap, FieldConfig, LogLevel, MalformedPolicy, MeasurementPattern, PipelineConfig,
    WeatherConfig,
};
pub use error::{EtlError, Result};
pub use field::FieldPipeline;
pub use source::{SqlCsvSource, TabularSource};
pub use weather::{Measurement, MeasurementMatcher, WeatherPipeline};
