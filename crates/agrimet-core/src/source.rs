use std::future::Future;
use std::io::Cursor;
use std::str::FromStr;

use polars::prelude::*;
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{ConnectOptions, Connection, Row, TypeInfo, ValueRef};
use tracing::{error, info};

use crate::dataset::ensure_non_empty;
use crate::error::{EtlError, Result};

/// Anything that can hand the pipelines a rectangular dataset. Implementations
/// return a non-empty frame or fail.
pub trait TabularSource {
    fn query(&self, descriptor: &str, sql: &str) -> impl Future<Output = Result<DataFrame>> + Send;

    fn fetch_csv(&self, location: &str) -> impl Future<Output = Result<DataFrame>> + Send;
}

/// SQLite via sqlx for queries, HTTP or the local filesystem for CSV.
#[derive(Debug, Clone, Default)]
pub struct SqlCsvSource {
    http: reqwest::Client,
}

impl SqlCsvSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn read_location(&self, location: &str) -> Result<Vec<u8>> {
        if location.starts_with("http://") || location.starts_with("https://") {
            let response = self
                .http
                .get(location)
                .send()
                .await
                .and_then(|resp| resp.error_for_status())
                .map_err(|err| EtlError::source_unavailable(location, err))?;
            let bytes = response
                .bytes()
                .await
                .map_err(|err| EtlError::source_unavailable(location, err))?;
            Ok(bytes.to_vec())
        } else {
            let path = location.strip_prefix("file://").unwrap_or(location);
            tokio::fs::read(path)
                .await
                .map_err(|err| EtlError::source_unavailable(location, err))
        }
    }
}

impl TabularSource for SqlCsvSource {
    async fn query(&self, descriptor: &str, sql: &str) -> Result<DataFrame> {
        let options = SqliteConnectOptions::from_str(descriptor)
            .map_err(|err| EtlError::source_unavailable(descriptor, err))?
            .read_only(true);

        let mut conn = options.connect().await.map_err(|err| {
            error!(descriptor, error = %err, "failed to open database connection");
            EtlError::source_unavailable(descriptor, err)
        })?;
        info!(descriptor, "database connection established");

        let fetched = sqlx::query(sql).fetch_all(&mut conn).await;
        if let Err(err) = conn.close().await {
            error!(descriptor, error = %err, "failed to close database connection");
        }
        let rows = fetched.map_err(|err| {
            error!(descriptor, error = %err, "query failed");
            EtlError::source_unavailable(descriptor, err)
        })?;

        if rows.is_empty() {
            error!(descriptor, "query returned no rows");
            return Err(EtlError::EmptyResult {
                origin: format!("query against {descriptor}"),
            });
        }

        let df = rows_to_frame(&rows)?;
        info!(descriptor, rows = df.height(), "query executed successfully");
        Ok(df)
    }

    async fn fetch_csv(&self, location: &str) -> Result<DataFrame> {
        let bytes = self.read_location(location).await.map_err(|err| {
            error!(location, error = %err, "failed to read CSV");
            err
        })?;

        let df = match parse_csv(bytes) {
            Ok(df) => df,
            Err(PolarsError::NoData(_)) => {
                error!(location, "CSV has no data");
                return Err(EtlError::EmptyResult {
                    origin: location.to_string(),
                });
            }
            Err(err) => {
                error!(location, error = %err, "failed to parse CSV");
                return Err(EtlError::source_unavailable(location, err));
            }
        };

        let df = ensure_non_empty(df, location)?;
        info!(location, rows = df.height(), "CSV file read successfully");
        Ok(df)
    }
}

pub fn parse_csv(bytes: Vec<u8>) -> PolarsResult<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()
}

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    fn as_text(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Int(v) => Some(v.to_string()),
            Cell::Float(v) => Some(v.to_string()),
            Cell::Text(v) => Some(v.clone()),
        }
    }
}

fn read_cell(row: &SqliteRow, idx: usize) -> Result<Cell> {
    let raw = row
        .try_get_raw(idx)
        .map_err(|err| EtlError::source_unavailable("sqlite row", err))?;
    if raw.is_null() {
        return Ok(Cell::Null);
    }
    let storage = raw.type_info().name().to_ascii_uppercase();

    let cell = match storage.as_str() {
        "INTEGER" | "INT" | "INT8" | "BIGINT" | "BOOLEAN" => {
            Cell::Int(row.try_get_unchecked::<i64, _>(idx).map_err(decode_err)?)
        }
        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
            Cell::Float(row.try_get_unchecked::<f64, _>(idx).map_err(decode_err)?)
        }
        _ => Cell::Text(row.try_get_unchecked::<String, _>(idx).map_err(decode_err)?),
    };
    Ok(cell)
}

fn decode_err(err: sqlx::Error) -> EtlError {
    EtlError::source_unavailable("sqlite row", err)
}

fn cells_to_column(name: &str, cells: &[Cell]) -> Column {
    let all_int = cells
        .iter()
        .all(|c| matches!(c, Cell::Null | Cell::Int(_)));
    let all_numeric = cells
        .iter()
        .all(|c| matches!(c, Cell::Null | Cell::Int(_) | Cell::Float(_)));

    let series = if all_int {
        let values: Vec<Option<i64>> = cells
            .iter()
            .map(|c| match c {
                Cell::Int(v) => Some(*v),
                _ => None,
            })
            .collect();
        Series::new(name.into(), values)
    } else if all_numeric {
        let values: Vec<Option<f64>> = cells
            .iter()
            .map(|c| match c {
                Cell::Int(v) => Some(*v as f64),
                Cell::Float(v) => Some(*v),
                _ => None,
            })
            .collect();
        Series::new(name.into(), values)
    } else {
        let values: Vec<Option<String>> = cells.iter().map(Cell::as_text).collect();
        Series::new(name.into(), values)
    };
    series.into()
}

fn rows_to_frame(rows: &[SqliteRow]) -> Result<DataFrame> {
    let Some(first) = rows.first() else {
        return Ok(DataFrame::default());
    };
    let names: Vec<String> = first
        .columns()
        .iter()
        .map(|c| sqlx::Column::name(c).to_string())
        .collect();

    let mut cells: Vec<Vec<Cell>> = vec![Vec::with_capacity(rows.len()); names.len()];
    for row in rows {
        for (idx, column_cells) in cells.iter_mut().enumerate() {
            column_cells.push(read_cell(row, idx)?);
        }
    }

    let columns: Vec<Column> = names
        .iter()
        .zip(cells.iter())
        .map(|(name, column_cells)| cells_to_column(name, column_cells))
        .collect();

    Ok(DataFrame::new(columns)?)
}
