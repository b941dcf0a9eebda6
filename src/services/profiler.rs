//! Deterministic statistics extraction over a loaded dataset.
//!
//! Nothing here talks to the network or mutates the input; the same frame
//! always yields the same [`StatisticsRecord`].

use std::collections::HashSet;

use polars::prelude::*;
use rayon::prelude::*;

use crate::error::AppError;
use crate::models::{ColumnMap, ColumnType, NumericSummary, StatisticsRecord};

struct ColumnProfile {
    name: String,
    missing: usize,
    column_type: ColumnType,
    summary: Option<NumericSummary>,
}

pub fn profile(df: &DataFrame) -> Result<StatisticsRecord, AppError> {
    let start = std::time::Instant::now();
    validate_shape(df)?;

    // Columns are independent; rayon keeps them in order on collect.
    let columns: Vec<ColumnProfile> = df
        .get_columns()
        .par_iter()
        .map(profile_column)
        .collect::<Result<Vec<_>, AppError>>()?;

    let duplicate_row_count = count_duplicate_rows(df)?;

    let mut missing_per_column = ColumnMap::new();
    let mut column_types = ColumnMap::new();
    let mut numeric_summary = Vec::new();
    let mut column_names = Vec::with_capacity(columns.len());

    for column in columns {
        missing_per_column.insert(column.name.clone(), column.missing);
        column_types.insert(column.name.clone(), column.column_type);
        if let Some(summary) = column.summary {
            numeric_summary.push(summary);
        }
        column_names.push(column.name);
    }

    let record = StatisticsRecord {
        row_count: df.height(),
        column_count: df.width(),
        missing_per_column,
        duplicate_row_count,
        column_types,
        numeric_summary,
        column_names,
    };

    tracing::debug!(
        "Profiled {} rows x {} columns in {:?} ({} missing, {} duplicates)",
        record.row_count,
        record.column_count,
        start.elapsed(),
        record.total_missing(),
        record.duplicate_row_count
    );
    Ok(record)
}

fn validate_shape(df: &DataFrame) -> Result<(), AppError> {
    let height = df.height();
    let mut names = HashSet::with_capacity(df.width());

    for series in df.get_columns() {
        if series.len() != height {
            return Err(AppError::MalformedDataset(format!(
                "Column '{}' has {} values, expected {}",
                series.name(),
                series.len(),
                height
            )));
        }
        if !names.insert(series.name()) {
            return Err(AppError::MalformedDataset(format!(
                "Column '{}' appears more than once",
                series.name()
            )));
        }
    }
    Ok(())
}

pub fn column_type_of(dtype: &DataType) -> ColumnType {
    match dtype {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => ColumnType::Integer,
        DataType::Float32 | DataType::Float64 => ColumnType::Float,
        DataType::Boolean => ColumnType::Boolean,
        DataType::Date | DataType::Datetime(_, _) | DataType::Duration(_) | DataType::Time => {
            ColumnType::Temporal
        }
        _ => ColumnType::Text,
    }
}

fn profile_column(series: &Series) -> Result<ColumnProfile, AppError> {
    let column_type = column_type_of(series.dtype());

    let (missing, summary) = if column_type.is_numeric() {
        let values = float_values(series)?;
        let nan_count = values.iter().filter(|v| matches!(v, Some(x) if x.is_nan())).count();
        let present: Vec<f64> = values.into_iter().flatten().filter(|v| !v.is_nan()).collect();
        (
            series.null_count() + nan_count,
            summarize(series.name(), present),
        )
    } else {
        (series.null_count(), None)
    };

    Ok(ColumnProfile {
        name: series.name().to_string(),
        missing,
        column_type,
        summary,
    })
}

fn float_values(series: &Series) -> Result<Vec<Option<f64>>, AppError> {
    let cast = series
        .cast(&DataType::Float64)
        .map_err(|e| AppError::ProfilingInternal(format!("Column '{}': {}", series.name(), e)))?;
    let ca = cast
        .f64()
        .map_err(|e| AppError::ProfilingInternal(format!("Column '{}': {}", series.name(), e)))?;
    Ok(ca.into_iter().collect())
}

/// count/mean/std/min/quartiles/max; `None` when the column has no values.
fn summarize(column: &str, mut values: Vec<f64>) -> Option<NumericSummary> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));

    let count = values.len();
    let mean = values.iter().sum::<f64>() / count as f64;
    let std = (count > 1).then(|| {
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        variance.sqrt()
    });

    Some(NumericSummary {
        column: column.to_string(),
        count,
        mean,
        std,
        min: values[0],
        p25: percentile(&values, 0.25),
        p50: percentile(&values, 0.50),
        p75: percentile(&values, 0.75),
        max: values[count - 1],
    })
}

/// Linear interpolation between order statistics. `sorted` must be non-empty.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (pos - lower as f64)
}

/// Rows whose full field tuple matches a strictly earlier row. Null matches null.
fn count_duplicate_rows(df: &DataFrame) -> Result<usize, AppError> {
    let mut seen: HashSet<Vec<String>> = HashSet::with_capacity(df.height());
    let mut duplicates = 0;

    for row_idx in 0..df.height() {
        let key = df
            .get_columns()
            .iter()
            .map(|series| series.get(row_idx).map(cell_key))
            .collect::<PolarsResult<Vec<_>>>()
            .map_err(|e| AppError::ProfilingInternal(format!("Row {}: {}", row_idx, e)))?;

        if !seen.insert(key) {
            duplicates += 1;
        }
    }
    Ok(duplicates)
}

/// Equality key for one cell. Signed zeros compare equal.
fn cell_key(value: AnyValue) -> String {
    match value {
        AnyValue::Float64(v) if v == 0.0 => "Float64(0.0)".to_string(),
        AnyValue::Float32(v) if v == 0.0 => "Float32(0.0)".to_string(),
        other => format!("{:?}", other),
    }
}
