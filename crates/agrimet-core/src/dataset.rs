use std::collections::{HashMap, HashSet};

use polars::prelude::{Column, DataFrame};

use crate::error::{EtlError, Result};

const PLACEHOLDER_BASE: &str = "__temp_name_for_swap__";

pub fn require_column(df: &DataFrame, name: &str) -> Result<()> {
    if df.get_column_index(name).is_some() {
        Ok(())
    } else {
        Err(EtlError::missing_column(name))
    }
}

pub fn ensure_non_empty(df: DataFrame, origin: &str) -> Result<DataFrame> {
    if df.height() == 0 {
        return Err(EtlError::EmptyResult {
            origin: origin.to_string(),
        });
    }
    Ok(df)
}

/// Returns a column name that does not occur in `df`. Deterministic: the base
/// name is lengthened with underscores until it is free.
pub fn swap_placeholder(df: &DataFrame) -> String {
    let existing: HashSet<&str> = df.get_column_names().into_iter().map(|n| n.as_str()).collect();
    let mut name = PLACEHOLDER_BASE.to_string();
    while existing.contains(name.as_str()) {
        name.push('_');
    }
    name
}

/// Relabels columns simultaneously according to `mapping` (old name -> new
/// name). The column data never moves; only labels change, so mappings that
/// permute names (`a -> b`, `b -> a`) need no intermediate name.
pub fn relabel_columns(df: DataFrame, mapping: &HashMap<String, String>) -> Result<DataFrame> {
    for old in mapping.keys() {
        require_column(&df, old)?;
    }

    let mut columns: Vec<Column> = df.take_columns();
    let mut seen: HashSet<String> = HashSet::with_capacity(columns.len());

    for column in columns.iter_mut() {
        let target = match mapping.get(column.name().as_str()) {
            Some(new_name) => new_name.clone(),
            None => column.name().to_string(),
        };
        if !seen.insert(target.clone()) {
            return Err(EtlError::DuplicateColumn { column: target });
        }
        column.rename(target.into());
    }

    Ok(DataFrame::new(columns)?)
}

/// Exchanges the labels of two existing columns. Applying it twice restores
/// the original labeling.
pub fn swap_column_labels(df: DataFrame, first: &str, second: &str) -> Result<DataFrame> {
    let mapping = HashMap::from([
        (first.to_string(), second.to_string()),
        (second.to_string(), first.to_string()),
    ]);
    relabel_columns(df, &mapping)
}
