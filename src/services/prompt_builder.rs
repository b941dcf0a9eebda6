use polars::prelude::DataFrame;

use crate::models::{RecommendationRequest, SamplePreview, StatisticsRecord};

pub const DEFAULT_SAMPLE_ROWS: usize = 5;
pub const DEFAULT_TARGET_IDIOM: &str = "Python (Pandas)";

#[derive(Debug, Clone, PartialEq)]
pub struct PromptSettings {
    /// Upper bound on rows copied into the prompt.
    pub sample_rows: usize,
    /// Language/library the remediation code should be written in.
    pub target_idiom: String,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            sample_rows: DEFAULT_SAMPLE_ROWS,
            target_idiom: DEFAULT_TARGET_IDIOM.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    settings: PromptSettings,
}

impl PromptBuilder {
    pub fn new(settings: PromptSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PromptSettings {
        &self.settings
    }

    /// First rows of the dataset as a text table, never more than the cap.
    pub fn sample_preview(&self, df: &DataFrame) -> SamplePreview {
        let head = df.head(Some(self.settings.sample_rows));
        SamplePreview {
            rows: head.height(),
            text: format!("{}", head),
        }
    }

    pub fn build_request(&self, record: &StatisticsRecord, sample: &SamplePreview) -> RecommendationRequest {
        let idiom = &self.settings.target_idiom;
        let prompt = format!(
            r#"You are a Senior Data Scientist.
Review the dataset profile below and give actionable data cleaning recommendations.

DATASET STATISTICS:
- Total Rows: {rows}
- Total Columns: {columns}
- Duplicate Rows: {duplicates}
- Missing Values per Column: {missing}
- Data Types: {types}

SAMPLE DATA (first {sample_rows} rows):
{sample}

YOUR TASK:
1. Identify the critical data quality issues (missing values, duplicates, wrong types, suspicious values).
2. Explain why each issue is a problem for analysis.
3. Write specific {idiom} code that fixes each issue.

OUTPUT FORMAT (repeat for every issue):
- **Issue N:** [Explanation]
- **Code:** [{idiom} code block]
"#,
            rows = record.row_count,
            columns = record.column_count,
            duplicates = record.duplicate_row_count,
            missing = record.missing_per_column.render_flat(),
            types = record.column_types.render_flat(),
            sample_rows = sample.rows,
            sample = sample.text,
            idiom = idiom,
        );

        RecommendationRequest {
            prompt,
            sample_rows: sample.rows,
        }
    }
}
