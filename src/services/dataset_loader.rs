use std::collections::HashSet;
use std::io::Cursor;

use bytes::Bytes;
use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::ColumnType;

// Cell texts read as missing, alongside empty fields.
const NULL_MARKERS: [&str; 18] = [
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN", "<NA>", "N/A", "NA",
    "NULL", "NaN", "None", "n/a", "nan", "null",
];

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%d/%m/%Y %H:%M:%S"];

// Days between the Excel epoch (1899-12-30) and the Unix epoch.
const EXCEL_UNIX_EPOCH_DAYS: f64 = 25569.0;
const MILLIS_PER_DAY: f64 = 86_400_000.0;

static EMPTY_CELL: Data = Data::Empty;

static DATE_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{1,4}[-/]\d{1,2}[-/]\d{1,4}(?:[ T]\d{2}:\d{2}:\d{2}(?:\.\d{1,9})?)?$").expect("valid date regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetFormat {
    #[default]
    Csv,
    Xlsx,
}

impl DatasetFormat {
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let content_type = content_type.to_lowercase();
        if content_type.contains("spreadsheetml") || content_type.contains("xlsx") {
            Some(DatasetFormat::Xlsx)
        } else if content_type.contains("csv") || content_type.starts_with("text/") {
            Some(DatasetFormat::Csv)
        } else {
            None
        }
    }
}

pub fn load_dataset(file_data: Bytes, format: DatasetFormat) -> Result<DataFrame, AppError> {
    match format {
        DatasetFormat::Csv => load_csv(file_data),
        DatasetFormat::Xlsx => load_xlsx(file_data),
    }
}

/// Parses delimited text with a header row into a dataset.
pub fn load_csv(file_data: Bytes) -> Result<DataFrame, AppError> {
    tracing::info!("Parsing CSV upload of {} bytes", file_data.len());

    if file_data.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(AppError::MalformedDataset("CSV input is empty".to_string()));
    }
    if let Err(e) = std::str::from_utf8(&file_data) {
        return Err(AppError::MalformedDataset(format!("CSV input is not valid UTF-8: {}", e)));
    }

    // Whole-file inference: a late float widens integers, a late word makes text.
    let null_markers = NULL_MARKERS.iter().map(|m| m.to_string()).collect();
    let df = CsvReader::new(Cursor::new(file_data))
        .has_header(true)
        .infer_schema(None)
        .with_null_values(Some(NullValues::AllColumns(null_markers)))
        .with_try_parse_dates(true)
        .finish()
        .map_err(|e| {
            tracing::warn!("Failed to parse CSV: {}", e);
            AppError::MalformedDataset(format!("Failed to parse CSV: {}", e))
        })?;

    if df.width() == 0 {
        return Err(AppError::MalformedDataset("CSV input has no columns".to_string()));
    }

    tracing::info!("Parsed CSV into {} rows x {} columns", df.height(), df.width());
    Ok(df)
}

/// Reads the first worksheet of an XLSX workbook, first row as header.
pub fn load_xlsx(file_data: Bytes) -> Result<DataFrame, AppError> {
    tracing::info!("Opening workbook of {} bytes", file_data.len());
    let cursor = Cursor::new(file_data);

    let mut workbook: Xlsx<_> = open_workbook_from_rs(cursor).map_err(|e| {
        tracing::warn!("Failed to open Excel file: {}", e);
        AppError::MalformedDataset(format!("Failed to open Excel file: {}", e))
    })?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| AppError::MalformedDataset("No sheets found in workbook".to_string()))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| AppError::MalformedDataset(format!("Failed to read worksheet {}: {}", sheet_name, e)))?;

    let rows: Vec<Vec<Data>> = range.rows().map(|row| row.to_vec()).collect();
    if rows.is_empty() {
        return Err(AppError::MalformedDataset(format!("Sheet {} is empty", sheet_name)));
    }

    let mut existing_names = HashSet::new();
    let headers: Vec<String> = rows[0]
        .iter()
        .enumerate()
        .map(|(idx, cell)| unique_column_name(&cell.to_string(), idx, &mut existing_names))
        .collect();

    tracing::info!("Creating dataframe for sheet {} with {} data rows", sheet_name, rows.len() - 1);
    create_dataframe(&rows[1..], &headers)
}

fn unique_column_name(raw: &str, idx: usize, existing_names: &mut HashSet<String>) -> String {
    let trimmed = raw.trim();
    let base = if trimmed.is_empty() {
        format!("column_{}", idx + 1)
    } else {
        trimmed.to_string()
    };

    // If the name already exists, add a numeric suffix
    let mut candidate = base.clone();
    let mut counter = 1;
    while !existing_names.insert(candidate.clone()) {
        candidate = format!("{}_{}", base, counter);
        counter += 1;
    }
    candidate
}

fn create_dataframe(rows: &[Vec<Data>], headers: &[String]) -> Result<DataFrame, AppError> {
    if headers.is_empty() {
        return Err(AppError::MalformedDataset("Sheet has no header row".to_string()));
    }

    let mut columns = Vec::with_capacity(headers.len());
    for (col_idx, header) in headers.iter().enumerate() {
        let values: Vec<&Data> = rows
            .iter()
            .map(|row| row.get(col_idx).unwrap_or(&EMPTY_CELL))
            .collect();

        let series = match detect_column_type(&values) {
            ColumnType::Integer => {
                let ints: Vec<Option<i64>> = values.iter().map(|v| cell_as_i64(v)).collect();
                Series::new(header, ints)
            }
            ColumnType::Float => {
                let floats: Vec<Option<f64>> = values.iter().map(|v| cell_as_f64(v)).collect();
                Series::new(header, floats)
            }
            ColumnType::Boolean => {
                let bools: Vec<Option<bool>> = values
                    .iter()
                    .map(|v| match v {
                        Data::Bool(b) => Some(*b),
                        _ => None,
                    })
                    .collect();
                Series::new(header, bools)
            }
            ColumnType::Temporal => {
                let millis: Vec<Option<i64>> = values.iter().map(|v| cell_as_millis(v)).collect();
                Series::new(header, millis)
                    .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
                    .map_err(|e| AppError::MalformedDataset(format!("Column {}: {}", header, e)))?
            }
            ColumnType::Text => {
                let strings: Vec<Option<String>> = values
                    .iter()
                    .map(|v| if is_empty_cell(v) { None } else { Some(v.to_string()) })
                    .collect();
                Series::new(header, strings)
            }
        };

        columns.push(series);
    }

    DataFrame::new(columns)
        .map_err(|e| AppError::MalformedDataset(format!("Failed to create DataFrame: {}", e)))
}

fn is_empty_cell(value: &Data) -> bool {
    match value {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Classifies a column from its non-empty cells. Anything mixed is text, and
/// so is an ISO date cell in a layout we cannot read.
fn detect_column_type(values: &[&Data]) -> ColumnType {
    let mut kinds = values
        .iter()
        .filter(|v| !is_empty_cell(v))
        .map(|v| match v {
            Data::Int(_) => ColumnType::Integer,
            Data::Float(f) if is_integral(*f) => ColumnType::Integer,
            Data::Float(_) => ColumnType::Float,
            Data::Bool(_) => ColumnType::Boolean,
            Data::DateTime(_) => ColumnType::Temporal,
            Data::DateTimeIso(s) | Data::String(s) if parse_date_millis(s).is_some() => ColumnType::Temporal,
            _ => ColumnType::Text,
        });

    let Some(first) = kinds.next() else {
        return ColumnType::Text;
    };

    kinds.fold(first, |acc, kind| match (acc, kind) {
        (a, b) if a == b => a,
        (ColumnType::Integer, ColumnType::Float) | (ColumnType::Float, ColumnType::Integer) => ColumnType::Float,
        _ => ColumnType::Text,
    })
}

fn is_integral(value: f64) -> bool {
    value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64
}

fn cell_as_i64(value: &Data) -> Option<i64> {
    match value {
        Data::Int(i) => Some(*i),
        Data::Float(f) if is_integral(*f) => Some(*f as i64),
        _ => None,
    }
}

fn cell_as_f64(value: &Data) -> Option<f64> {
    match value {
        Data::Int(i) => Some(*i as f64),
        Data::Float(f) => Some(*f),
        _ => None,
    }
}

fn cell_as_millis(value: &Data) -> Option<i64> {
    match value {
        Data::DateTime(dt) => Some(((dt.as_f64() - EXCEL_UNIX_EPOCH_DAYS) * MILLIS_PER_DAY).round() as i64),
        Data::DateTimeIso(s) | Data::String(s) => parse_date_millis(s),
        _ => None,
    }
}

/// Milliseconds since the Unix epoch for the date layouts we recognise.
pub fn parse_date_millis(s: &str) -> Option<i64> {
    let s = s.trim();
    if !DATE_SHAPE.is_match(s) {
        return None;
    }
    for format in DATETIME_FORMATS.iter() {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    for format in DATE_FORMATS.iter() {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp_millis());
        }
    }
    None
}
