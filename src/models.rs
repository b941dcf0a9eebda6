use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::error::RecommendationError;

/// Type label assigned to each column by the profiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Temporal,
    Text,
}

impl ColumnType {
    pub fn label(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Temporal => "temporal",
            ColumnType::Text => "text",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Column name to value mapping that keeps dataset column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnMap<T> {
    entries: Vec<(String, T)>,
}

impl<T> ColumnMap<T> {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn insert(&mut self, column: impl Into<String>, value: T) {
        self.entries.push((column.into(), value));
    }

    pub fn get(&self, column: &str) -> Option<&T> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: std::fmt::Display> ColumnMap<T> {
    /// Flat `{name: value, ...}` listing used inside prompts.
    pub fn render_flat(&self) -> String {
        let body = self
            .entries
            .iter()
            .map(|(name, value)| format!("{}: {}", name, value))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{{{}}}", body)
    }
}

impl<T> FromIterator<(String, T)> for ColumnMap<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}

impl<T: Serialize> Serialize for ColumnMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// describe-style statistics for one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericSummary {
    pub column: String,
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation (n - 1); undefined for a single value.
    pub std: Option<f64>,
    pub min: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsRecord {
    pub row_count: usize,
    pub column_count: usize,
    pub missing_per_column: ColumnMap<usize>,
    pub duplicate_row_count: usize,
    pub column_types: ColumnMap<ColumnType>,
    pub numeric_summary: Vec<NumericSummary>,
    pub column_names: Vec<String>,
}

impl StatisticsRecord {
    pub fn total_missing(&self) -> usize {
        self.missing_per_column.values().sum()
    }

    pub fn numeric_columns(&self) -> Vec<&str> {
        self.numeric_summary.iter().map(|s| s.column.as_str()).collect()
    }

    /// Text table laid out like a describe() call: one row per statistic,
    /// one column per numeric column. Empty when there is nothing numeric.
    pub fn render_numeric_summary(&self) -> String {
        if self.numeric_summary.is_empty() {
            return String::new();
        }

        let labels = ["count", "mean", "std", "min", "25%", "50%", "75%", "max"];
        let rows: Vec<Vec<String>> = self
            .numeric_summary
            .iter()
            .map(|s| {
                vec![
                    format!("{:.6}", s.count as f64),
                    format!("{:.6}", s.mean),
                    s.std.map_or_else(|| "NaN".to_string(), |v| format!("{:.6}", v)),
                    format!("{:.6}", s.min),
                    format!("{:.6}", s.p25),
                    format!("{:.6}", s.p50),
                    format!("{:.6}", s.p75),
                    format!("{:.6}", s.max),
                ]
            })
            .collect();

        let widths: Vec<usize> = self
            .numeric_summary
            .iter()
            .zip(&rows)
            .map(|(s, cells)| {
                cells
                    .iter()
                    .map(|c| c.len())
                    .chain(std::iter::once(s.column.len()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut out = format!("{:<5}", "");
        for (s, width) in self.numeric_summary.iter().zip(&widths) {
            out.push_str(&format!("  {:>width$}", s.column, width = width));
        }
        for (idx, label) in labels.iter().enumerate() {
            out.push('\n');
            out.push_str(&format!("{:<5}", label));
            for (cells, width) in rows.iter().zip(&widths) {
                out.push_str(&format!("  {:>width$}", cells[idx], width = width));
            }
        }
        out
    }
}

/// Leading rows of a dataset rendered as text, for grounding the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplePreview {
    pub rows: usize,
    pub text: String,
}

/// The single completion payload built for one analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationRequest {
    pub prompt: String,
    pub sample_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub text: String,
    pub model: String,
    pub attempts: u32,
}

pub type RecommendationResult = Result<Recommendation, RecommendationError>;

/// Where an analysis request currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStage {
    Idle,
    Profiling,
    ProfileReady,
    ProfileFailed,
    Recommending,
    RecommendationReady,
    RecommendationFailed,
}

impl AnalysisStage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AnalysisStage::ProfileReady
                | AnalysisStage::ProfileFailed
                | AnalysisStage::RecommendationReady
                | AnalysisStage::RecommendationFailed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_map_keeps_insertion_order_in_json() {
        let mut map = ColumnMap::new();
        map.insert("zeta", 1usize);
        map.insert("alpha", 0usize);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"zeta":1,"alpha":0}"#);
        assert_eq!(map.render_flat(), "{zeta: 1, alpha: 0}");
    }

    #[test]
    fn numeric_summary_table_is_empty_without_numeric_columns() {
        let record = StatisticsRecord {
            row_count: 1,
            column_count: 1,
            missing_per_column: [("name".to_string(), 0)].into_iter().collect(),
            duplicate_row_count: 0,
            column_types: [("name".to_string(), ColumnType::Text)].into_iter().collect(),
            numeric_summary: Vec::new(),
            column_names: vec!["name".to_string()],
        };
        assert_eq!(record.render_numeric_summary(), "");
    }

    #[test]
    fn numeric_summary_table_lists_every_statistic() {
        let record = StatisticsRecord {
            row_count: 2,
            column_count: 1,
            missing_per_column: [("age".to_string(), 0)].into_iter().collect(),
            duplicate_row_count: 0,
            column_types: [("age".to_string(), ColumnType::Integer)].into_iter().collect(),
            numeric_summary: vec![NumericSummary {
                column: "age".to_string(),
                count: 1,
                mean: 30.0,
                std: None,
                min: 30.0,
                p25: 30.0,
                p50: 30.0,
                p75: 30.0,
                max: 30.0,
            }],
            column_names: vec!["age".to_string()],
        };
        let table = record.render_numeric_summary();
        assert!(table.lines().next().unwrap().contains("age"));
        assert_eq!(table.lines().count(), 9);
        assert!(table.contains("NaN"));
    }

    #[test]
    fn terminal_stages() {
        assert!(AnalysisStage::ProfileFailed.is_terminal());
        assert!(AnalysisStage::RecommendationReady.is_terminal());
        assert!(!AnalysisStage::Recommending.is_terminal());
    }
}
