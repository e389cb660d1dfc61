//! Weather station log pipeline: load the raw messages, classify each one
//! with the ordered measurement patterns, and average values per station.

use polars::prelude::*;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::{MalformedPolicy, MeasurementPattern, WeatherConfig};
use crate::dataset::{ensure_non_empty, require_column};
use crate::error::{EtlError, Result};
use crate::source::TabularSource;
use crate::stages::StagePlan;

pub const MEASUREMENT_COLUMN: &str = "Measurement";
pub const VALUE_COLUMN: &str = "Value";

#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub label: String,
    pub value: f64,
}

/// Compiled measurement patterns, tried in configuration order.
#[derive(Debug, Clone)]
pub struct MeasurementMatcher {
    patterns: Vec<(String, Regex)>,
}

impl MeasurementMatcher {
    pub fn new(patterns: &[MeasurementPattern]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let regex = Regex::new(&pattern.pattern).map_err(|source| EtlError::InvalidPattern {
                label: pattern.label.clone(),
                source,
            })?;
            if regex.captures_len() < 2 {
                return Err(EtlError::Config(format!(
                    "pattern {} has no capture group",
                    pattern.label
                )));
            }
            compiled.push((pattern.label.clone(), regex));
        }
        Ok(Self { patterns: compiled })
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|(label, _)| label.as_str())
    }

    /// The first pattern that matches decides the label; its first
    /// participating capture group is parsed as the value. `Ok(None)` means
    /// no pattern matched.
    pub fn extract(&self, message: &str) -> Result<Option<Measurement>> {
        for (label, regex) in &self.patterns {
            let Some(captures) = regex.captures(message) else {
                continue;
            };

            let text = captures
                .iter()
                .skip(1)
                .flatten()
                .next()
                .map(|m| m.as_str())
                .unwrap_or_default();

            let value = text
                .trim()
                .parse::<f64>()
                .map_err(|_| EtlError::MalformedMeasurement {
                    label: label.clone(),
                    text: text.to_string(),
                })?;

            debug!(label = label.as_str(), value, "Measurement extracted");
            return Ok(Some(Measurement {
                label: label.clone(),
                value,
            }));
        }

        debug!("No measurement match found.");
        Ok(None)
    }
}

#[derive(Debug)]
pub struct WeatherPipeline<S> {
    config: WeatherConfig,
    matcher: MeasurementMatcher,
    source: S,
}

impl<S: TabularSource> WeatherPipeline<S> {
    pub fn new(config: WeatherConfig, source: S) -> Result<Self> {
        let matcher = MeasurementMatcher::new(&config.patterns)?;
        // Labels become columns of the means table next to the station ids.
        if matcher.labels().any(|label| label == config.station_column) {
            return Err(EtlError::Config(format!(
                "measurement label {} collides with the station column",
                config.station_column
            )));
        }
        Ok(Self {
            config,
            matcher,
            source,
        })
    }

    pub fn config(&self) -> &WeatherConfig {
        &self.config
    }

    pub fn matcher(&self) -> &MeasurementMatcher {
        &self.matcher
    }

    pub async fn load(&self) -> Result<DataFrame> {
        let location = &self.config.weather_csv_path;
        let df = self.source.fetch_csv(location).await?;
        let df = ensure_non_empty(df, location)?;
        info!(rows = df.height(), "Successfully loaded weather station data.");
        Ok(df)
    }

    pub fn extract_measurement(&self, message: &str) -> Result<Option<Measurement>> {
        self.matcher.extract(message)
    }

    /// Adds the measurement label and value columns, aligned row for row with
    /// the messages. Rows that match nothing keep nulls in both.
    pub fn process_messages(&self, df: DataFrame) -> Result<DataFrame> {
        let message_column = self.config.message_column.as_str();
        require_column(&df, message_column)?;

        let mut labels: Vec<Option<String>> = Vec::with_capacity(df.height());
        let mut values: Vec<Option<f64>> = Vec::with_capacity(df.height());

        // A column the source typed as non-text (e.g. entirely null) still
        // reads as text: nulls stay null and numbers render as strings.
        let messages = df.column(message_column)?.cast(&DataType::String)?;
        for (row, message) in messages.str()?.into_iter().enumerate() {
            let extracted = match message {
                Some(text) => match self.matcher.extract(text) {
                    Ok(found) => found,
                    Err(err @ EtlError::MalformedMeasurement { .. }) => {
                        match self.config.malformed_measurements {
                            MalformedPolicy::Abort => return Err(err),
                            MalformedPolicy::Unclassified => {
                                warn!(row, error = %err, "recording malformed measurement as unclassified");
                                None
                            }
                        }
                    }
                    Err(err) => return Err(err),
                },
                None => None,
            };

            match extracted {
                Some(measurement) => {
                    labels.push(Some(measurement.label));
                    values.push(Some(measurement.value));
                }
                None => {
                    labels.push(None);
                    values.push(None);
                }
            }
        }

        let classified = labels.iter().filter(|label| label.is_some()).count();

        let mut df = df;
        df.with_column(Series::new(MEASUREMENT_COLUMN.into(), labels))?;
        df.with_column(Series::new(VALUE_COLUMN.into(), values))?;

        info!(
            rows = df.height(),
            classified,
            "Messages processed and measurements extracted."
        );
        Ok(df)
    }

    /// Mean value per (station, measurement), pivoted so that each
    /// measurement label is a column. Unclassified rows are ignored. Station
    /// ids are rendered as strings; rows and label columns are sorted.
    pub fn calculate_means(&self, df: &DataFrame) -> Result<DataFrame> {
        let station_column = self.config.station_column.as_str();
        require_column(df, station_column)?;
        require_column(df, MEASUREMENT_COLUMN)?;
        require_column(df, VALUE_COLUMN)?;

        let grouped = df
            .clone()
            .lazy()
            .filter(
                col(MEASUREMENT_COLUMN)
                    .is_not_null()
                    .and(col(station_column).is_not_null()),
            )
            .group_by([
                col(station_column).cast(DataType::String),
                col(MEASUREMENT_COLUMN),
            ])
            .agg([col(VALUE_COLUMN).cast(DataType::Float64).mean()])
            .collect()?;

        // One row per (station, label) after the group-by, so no aggregation
        // is needed; absent pairs come out null.
        let pivoted = pivot::pivot_stable(
            &grouped,
            [MEASUREMENT_COLUMN],
            Some([station_column]),
            Some([VALUE_COLUMN]),
            true,
            None,
            None,
        )?
        .sort([station_column], SortMultipleOptions::default())?;

        info!(
            stations = pivoted.height(),
            measurements = pivoted.width().saturating_sub(1),
            "Mean values calculated."
        );
        Ok(pivoted)
    }

    fn message_plan(&self) -> StagePlan<'_> {
        StagePlan::new()
            .inspect(|stage, df| {
                debug!(stage, rows = df.height(), columns = df.width(), "stage complete")
            })
            .then("process_messages", |df| self.process_messages(df))
    }

    /// Loads and classifies the messages. The per-station means are a
    /// separate call to [`WeatherPipeline::calculate_means`].
    pub async fn process(&self) -> Result<DataFrame> {
        let raw = self.load().await?;
        let processed = self.message_plan().run(raw)?;
        info!("Weather data processing completed.");
        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(patterns: &[(&str, &str)]) -> MeasurementMatcher {
        let patterns: Vec<MeasurementPattern> = patterns
            .iter()
            .map(|(label, pattern)| MeasurementPattern::new(*label, *pattern))
            .collect();
        MeasurementMatcher::new(&patterns).expect("patterns compile")
    }

    #[test]
    fn rejects_pattern_without_capture_group() {
        let err = MeasurementMatcher::new(&[MeasurementPattern::new("Rainfall", r"\d+mm")])
            .unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
    }

    #[test]
    fn rejects_invalid_regex() {
        let err = MeasurementMatcher::new(&[MeasurementPattern::new("Rainfall", r"(\d+")])
            .unwrap_err();
        assert!(matches!(err, EtlError::InvalidPattern { label, .. } if label == "Rainfall"));
    }

    #[test]
    fn uses_first_participating_group() {
        let m = matcher(&[(
            "Pollution_level",
            r"=\s*(-?\d+(\.\d+)?)|Pollution at \s*(-?\d+(\.\d+)?)",
        )]);
        let found = m
            .extract("Pollution at 0.35 today")
            .unwrap()
            .expect("pattern matches");
        assert_eq!(found.label, "Pollution_level");
        assert_eq!(found.value, 0.35);
    }

    #[test]
    fn non_numeric_capture_is_malformed() {
        let m = matcher(&[("Rainfall", r"rain:(\S+)")]);
        let err = m.extract("rain:lots").unwrap_err();
        assert!(
            matches!(err, EtlError::MalformedMeasurement { label, text } if label == "Rainfall" && text == "lots")
        );
    }

    #[test]
    fn labels_keep_configuration_order() {
        let m = matcher(&[("b", r"(\d)b"), ("a", r"(\d)a")]);
        assert_eq!(m.labels().collect::<Vec<_>>(), vec!["b", "a"]);
    }
}
