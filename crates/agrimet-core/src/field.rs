//! Field survey pipeline: ingest field records from the relational source,
//! repair the swapped column labels, normalize elevation and crop values,
//! then attach each field's weather station.

use polars::prelude::*;
use tracing::{debug, info};

use crate::config::FieldConfig;
use crate::dataset::{ensure_non_empty, require_column, swap_column_labels, swap_placeholder};
use crate::error::Result;
use crate::source::TabularSource;
use crate::stages::StagePlan;

#[derive(Debug)]
pub struct FieldPipeline<S> {
    config: FieldConfig,
    source: S,
}

impl<S: TabularSource> FieldPipeline<S> {
    pub fn new(config: FieldConfig, source: S) -> Self {
        Self { config, source }
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    pub async fn ingest(&self) -> Result<DataFrame> {
        let df = self
            .source
            .query(&self.config.db_path, &self.config.sql_query)
            .await?;
        let df = ensure_non_empty(df, "field query")?;
        info!(rows = df.height(), "Successfully loaded data.");
        Ok(df)
    }

    pub fn swap_columns(&self, df: DataFrame) -> Result<DataFrame> {
        let swap = &self.config.columns_to_swap;
        let df = swap_column_labels(df, &swap.first, &swap.second)?;
        info!("Swapped columns: {} with {}", swap.first, swap.second);
        Ok(df)
    }

    /// Takes the absolute value of `elevation_column` and maps
    /// `categorical_column` through the configured rename table. Values with
    /// no entry in the table are left alone.
    pub fn apply_corrections(
        &self,
        df: DataFrame,
        elevation_column: &str,
        categorical_column: &str,
    ) -> Result<DataFrame> {
        require_column(&df, elevation_column)?;
        require_column(&df, categorical_column)?;

        let mut df = df
            .lazy()
            .with_column(col(elevation_column).abs().alias(elevation_column))
            .collect()?;

        // Rename keys are strings; a column of any other dtype (including an
        // all-null column typed by the source) has nothing to look up.
        if df.column(categorical_column)?.dtype() != &DataType::String {
            debug!(
                categorical_column,
                dtype = %df.column(categorical_column)?.dtype(),
                "categorical column is not text, leaving values unchanged"
            );
            return Ok(df);
        }

        let renamed = {
            let renames = &self.config.values_to_rename;
            let values: Vec<Option<&str>> = df
                .column(categorical_column)?
                .str()?
                .into_iter()
                .map(|value| {
                    value.map(|raw| renames.get(raw).map(String::as_str).unwrap_or(raw))
                })
                .collect();
            Series::new(categorical_column.into(), values)
        };
        df.with_column(renamed)?;

        debug!(elevation_column, categorical_column, "corrections applied");
        Ok(df)
    }

    /// Inner join of the field records against the station mapping on the key
    /// column. Field rows without a mapping entry are dropped; the surviving
    /// rows keep their original order.
    pub fn join_with_mapping(&self, df: DataFrame, mapping: DataFrame) -> Result<DataFrame> {
        let key = self.config.key_column.as_str();
        require_column(&df, key)?;
        require_column(&mapping, key)?;

        let key_dtype = df.column(key)?.dtype().clone();
        let order_column = swap_placeholder(&df);

        let joined = df
            .lazy()
            .with_row_index(order_column.as_str(), None)
            .join(
                mapping.lazy().with_column(col(key).cast(key_dtype)),
                [col(key)],
                [col(key)],
                JoinArgs::new(JoinType::Inner),
            )
            .sort([order_column.as_str()], SortMultipleOptions::default())
            .collect()?;

        Ok(joined.drop(&order_column)?)
    }

    pub async fn join_weather_station(&self, df: DataFrame) -> Result<DataFrame> {
        let location = &self.config.weather_mapping_csv;
        let mapping = self.source.fetch_csv(location).await?;
        let mapping = ensure_non_empty(mapping, location)?;

        let before = df.height();
        let joined = self.join_with_mapping(df, mapping)?;
        info!(
            rows = joined.height(),
            dropped = before.saturating_sub(joined.height()),
            "Weather station mapping merged."
        );
        Ok(joined)
    }

    fn correction_plan(&self) -> StagePlan<'_> {
        StagePlan::new()
            .inspect(|stage, df| {
                debug!(stage, rows = df.height(), columns = df.width(), "stage complete")
            })
            .then("swap_columns", |df| self.swap_columns(df))
            .then("apply_corrections", |df| {
                self.apply_corrections(
                    df,
                    &self.config.elevation_column,
                    &self.config.categorical_column,
                )
            })
    }

    /// Runs ingest, column swap, corrections and the station join in that
    /// order. Consumes the pipeline: the swap is not safe to apply twice.
    pub async fn process(self) -> Result<DataFrame> {
        let raw = self.ingest().await?;
        let corrected = self.correction_plan().run(raw)?;
        let joined = self.join_weather_station(corrected).await?;
        info!("Field data processing completed.");
        Ok(joined)
    }
}
