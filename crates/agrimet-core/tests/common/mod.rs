#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::io;

use agrimet_core::config::{ColumnSwap, FieldConfig, MalformedPolicy, MeasurementPattern, WeatherConfig};
use agrimet_core::{EtlError, Result, TabularSource};
use polars::prelude::DataFrame;

pub const DB: &str = "sqlite://fixture.db";
pub const MAPPING_CSV: &str = "mapping.csv";
pub const WEATHER_CSV: &str = "weather.csv";

/// Serves canned frames; a missing entry behaves like an unreachable source.
#[derive(Debug, Default, Clone)]
pub struct StaticSource {
    pub query_result: Option<DataFrame>,
    pub csv: HashMap<String, DataFrame>,
}

impl StaticSource {
    pub fn with_query(mut self, df: DataFrame) -> Self {
        self.query_result = Some(df);
        self
    }

    pub fn with_csv(mut self, location: &str, df: DataFrame) -> Self {
        self.csv.insert(location.to_string(), df);
        self
    }
}

fn unavailable(location: &str) -> EtlError {
    EtlError::source_unavailable(
        location,
        io::Error::new(io::ErrorKind::NotFound, "no fixture registered"),
    )
}

impl TabularSource for StaticSource {
    async fn query(&self, descriptor: &str, _sql: &str) -> Result<DataFrame> {
        self.query_result
            .clone()
            .ok_or_else(|| unavailable(descriptor))
    }

    async fn fetch_csv(&self, location: &str) -> Result<DataFrame> {
        self.csv
            .get(location)
            .cloned()
            .ok_or_else(|| unavailable(location))
    }
}

pub fn field_config(values_to_rename: &[(&str, &str)]) -> FieldConfig {
    FieldConfig {
        db_path: DB.to_string(),
        sql_query: "SELECT * FROM fields".to_string(),
        columns_to_swap: ColumnSwap {
            first: "Annual_yield".to_string(),
            second: "Crop_type".to_string(),
        },
        values_to_rename: values_to_rename
            .iter()
            .map(|(raw, canonical)| (raw.to_string(), canonical.to_string()))
            .collect::<BTreeMap<_, _>>(),
        weather_mapping_csv: MAPPING_CSV.to_string(),
        key_column: "Field_ID".to_string(),
        elevation_column: "Elevation".to_string(),
        categorical_column: "Crop_type".to_string(),
        log_level: None,
    }
}

pub fn weather_config(patterns: &[(&str, &str)], policy: MalformedPolicy) -> WeatherConfig {
    WeatherConfig {
        weather_csv_path: WEATHER_CSV.to_string(),
        patterns: patterns
            .iter()
            .map(|(label, pattern)| MeasurementPattern::new(*label, *pattern))
            .collect(),
        station_column: "Weather_station_ID".to_string(),
        message_column: "Message".to_string(),
        malformed_measurements: policy,
        log_level: None,
    }
}
