use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::error::{EtlError, Result};

pub const FIELD_LOG_TARGET: &str = "agrimet_core::field";
pub const WEATHER_LOG_TARGET: &str = "agrimet_core::weather";

/// Verbosity of diagnostic output. Parsing is case-insensitive and falls back
/// to `Info` for anything it does not recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    None,
}

impl LogLevel {
    pub fn directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::None => "off",
        }
    }
}

impl From<String> for LogLevel {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => LogLevel::Debug,
            "NONE" | "OFF" => LogLevel::None,
            _ => LogLevel::Info,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.directive())
    }
}

/// Two columns whose labels are exchanged.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ColumnSwap {
    pub first: String,
    pub second: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MeasurementPattern {
    pub label: String,
    pub pattern: String,
}

impl MeasurementPattern {
    pub fn new(label: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            pattern: pattern.into(),
        }
    }
}

/// What to do when a pattern matches but its capture is not numeric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Record the row as unclassified and keep going.
    #[default]
    Unclassified,
    /// Fail the whole batch.
    Abort,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldConfig {
    pub db_path: String,
    pub sql_query: String,
    pub columns_to_swap: ColumnSwap,
    #[serde(default)]
    pub values_to_rename: BTreeMap<String, String>,
    pub weather_mapping_csv: String,
    #[serde(default = "default_key_column")]
    pub key_column: String,
    #[serde(default = "default_elevation_column")]
    pub elevation_column: String,
    #[serde(default = "default_categorical_column")]
    pub categorical_column: String,
    #[serde(default)]
    pub log_level: Option<LogLevel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeatherConfig {
    pub weather_csv_path: String,
    pub patterns: Vec<MeasurementPattern>,
    #[serde(default = "default_station_column")]
    pub station_column: String,
    #[serde(default = "default_message_column")]
    pub message_column: String,
    #[serde(default)]
    pub malformed_measurements: MalformedPolicy,
    #[serde(default)]
    pub log_level: Option<LogLevel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub log_level: LogLevel,
    pub field: FieldConfig,
    pub weather: WeatherConfig,
}

impl PipelineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    fn validate(&self) -> Result<()> {
        if self.weather.patterns.is_empty() {
            return Err(EtlError::Config(
                "weather.patterns must contain at least one pattern".to_string(),
            ));
        }
        if self.field.sql_query.trim().is_empty() {
            return Err(EtlError::Config("field.sql_query is empty".to_string()));
        }
        Ok(())
    }

    /// Filter directive for `tracing_subscriber::EnvFilter`. Per-pipeline
    /// levels are applied to that pipeline's target only.
    pub fn log_filter(&self) -> String {
        let field = self.field.log_level.unwrap_or(self.log_level);
        let weather = self.weather.log_level.unwrap_or(self.log_level);
        format!(
            "{},{}={},{}={}",
            self.log_level.directive(),
            FIELD_LOG_TARGET,
            field.directive(),
            WEATHER_LOG_TARGET,
            weather.directive()
        )
    }
}

fn default_key_column() -> String {
    "Field_ID".to_string()
}

fn default_elevation_column() -> String {
    "Elevation".to_string()
}

fn default_categorical_column() -> String {
    "Crop_type".to_string()
}

fn default_station_column() -> String {
    "Weather_station_ID".to_string()
}

fn default_message_column() -> String {
    "Message".to_string()
}
