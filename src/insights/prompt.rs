use crate::cell::Row;
use crate::error::{AppError, AppResult};
use crate::loader::Table;
use crate::statistics::ColumnStatistics;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Rows embedded in the prompt as a representative sample
pub const SAMPLE_ROW_LIMIT: usize = 3;

/// Most columns a single insight request may cover
pub const MAX_COLUMNS: usize = 5;

/// Section headings requested from the generator, in order
///
/// The segmenter classifies sections by these words, so both sides change together.
pub const SECTION_HEADINGS: [&str; 6] = [
    "Key Trends and Patterns",
    "Correlations between Variables",
    "Potential Anomalies/Outliers",
    "Data Quality Issues (if any)",
    "Actionable Recommendations",
    "Regional Performance Analysis",
];

const SECTION_GUIDANCE: [&[&str]; 6] = [
    &["[Insight 1]", "[Insight 2]"],
    &[
        "[Correlation 1: e.g., \"Strong positive correlation between Sales and Marketing Spend\"]",
        "[Correlation 2]",
    ],
    &[
        "[Anomaly 1: e.g., \"Unusually high sales on 2023-03-15, investigate cause\"]",
        "[Anomaly 2]",
    ],
    &[
        "[Issue 1: e.g., \"Missing values in 'Customer ID' column\"]",
        "[Issue 2]",
    ],
    &[
        "[Recommendation 1: e.g., \"Focus marketing efforts on Region X based on growth trends\"]",
        "[Recommendation 2]",
    ],
    &[
        "Identify the best-performing regions/categories based on relevant metrics (e.g., Sales, Revenue).",
        "Identify the worst-performing regions/categories and suggest potential reasons.",
        "[Regional Insight 1: e.g., \"Region A shows consistent sales growth over the past quarter.\"]",
    ],
];

/// Dataset summary handed to the generator
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightRequest {
    #[serde(default)]
    pub columns: Vec<String>,

    #[serde(default)]
    pub row_count: usize,

    #[serde(default)]
    pub sample_data: Vec<Row>,

    #[serde(default)]
    pub statistics: Vec<ColumnStatistics>,
}

impl InsightRequest {
    /// Summary of `table` restricted to `columns`
    ///
    /// Sample rows are projected onto the selected columns and capped at
    /// `SAMPLE_ROW_LIMIT`; statistics are filtered to the selected columns.
    pub fn from_table(table: &Table, columns: &[String], statistics: &[ColumnStatistics]) -> Self {
        Self {
            columns: columns.to_vec(),
            row_count: table.row_count(),
            sample_data: table
                .rows
                .iter()
                .take(SAMPLE_ROW_LIMIT)
                .map(|row| row.project(columns))
                .collect(),
            statistics: statistics
                .iter()
                .filter(|stat| columns.contains(&stat.column))
                .cloned()
                .collect(),
        }
    }

    /// Check that the request carries enough to analyze
    pub fn validate(&self) -> AppResult<()> {
        if self.columns.is_empty() || self.sample_data.is_empty() || self.statistics.is_empty() {
            return Err(AppError::InvalidInput(
                "Invalid or missing data for AI analysis. Please provide columns, sample data, and statistics."
                    .to_string(),
            ));
        }

        if self.columns.len() > MAX_COLUMNS {
            return Err(AppError::InvalidInput(format!(
                "Maximum {} columns can be analyzed at once",
                MAX_COLUMNS
            )));
        }

        Ok(())
    }

    /// Compose the instruction block sent to the generator
    ///
    /// # Errors
    /// * `AppError::InvalidInput` when `validate` fails
    pub fn build_prompt(&self) -> AppResult<String> {
        self.validate()?;

        let sample = &self.sample_data[..self.sample_data.len().min(SAMPLE_ROW_LIMIT)];
        let sample_json = serde_json::to_string_pretty(sample)
            .map_err(|e| AppError::InvalidInput(format!("Unserializable sample data: {e}")))?;

        let mut prompt = String::new();
        // Writing into a String cannot fail
        let _ = writeln!(
            prompt,
            "Analyze the provided Excel dataset summary and generate comprehensive business insights.\n"
        );
        let _ = writeln!(prompt, "**Dataset Overview:**");
        let _ = writeln!(prompt, "- Total Rows: {}", self.row_count);
        let _ = writeln!(prompt, "- Total Columns: {}", self.columns.len());
        let _ = writeln!(prompt, "- Columns: {}\n", self.columns.join(", "));
        let _ = writeln!(
            prompt,
            "**Sample Data (first {} rows):** {}\n",
            sample.len(),
            sample_json
        );
        let _ = writeln!(prompt, "**Key Statistics for Numeric Columns:**");
        for stat in &self.statistics {
            let _ = writeln!(
                prompt,
                " - {}: Mean={:.2}, Min={:.2}, Max={:.2} (from {} numeric values)",
                stat.column, stat.mean, stat.min, stat.max, stat.count
            );
        }

        let _ = writeln!(
            prompt,
            "\n**Please provide insights in the following structured format:**"
        );
        let _ = writeln!(
            prompt,
            "**Be concise and to the point. Each bullet point should be brief.**\n"
        );
        for (idx, (heading, guidance)) in SECTION_HEADINGS.iter().zip(SECTION_GUIDANCE).enumerate()
        {
            let _ = writeln!(prompt, "**{}. {}:**", idx + 1, heading);
            for line in guidance {
                let _ = writeln!(prompt, "   - {}", line);
            }
            let _ = writeln!(prompt, "   - ...\n");
        }
        let _ = writeln!(
            prompt,
            "Ensure your insights are concise, relevant, and directly actionable where possible. Focus on business implications."
        );

        Ok(prompt)
    }
}
