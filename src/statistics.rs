use crate::cell::Row;
use serde::{Deserialize, Serialize};

/// Summary statistics of one numeric column
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnStatistics {
    pub column: String,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Number of cells that coerced to a finite number
    #[serde(default)]
    pub count: usize,
}

/// Compute statistics for each of `columns` over `rows`
///
/// Cells that do not coerce to a finite number (including empty or missing ones)
/// are left out of a column's statistics rather than counted as zero. A column with
/// no numeric cell at all is omitted from the result. Output follows the order of
/// `columns`.
///
/// # Examples
/// ```
/// use excel_analytics::cell::{CellValue, Row};
/// use excel_analytics::statistics::summarize;
///
/// let rows: Vec<Row> = vec![
///     [("Sales", CellValue::Number(10.0)), ("Region", CellValue::Text("North".into()))]
///         .into_iter()
///         .collect(),
///     [("Sales", CellValue::Text("30".into())), ("Region", CellValue::Text("South".into()))]
///         .into_iter()
///         .collect(),
/// ];
///
/// let stats = summarize(&rows, &["Sales".to_string(), "Region".to_string()]);
/// assert_eq!(stats.len(), 1);
/// assert_eq!(stats[0].mean, 20.0);
/// ```
pub fn summarize(rows: &[Row], columns: &[String]) -> Vec<ColumnStatistics> {
    columns
        .iter()
        .filter_map(|column| summarize_column(rows, column))
        .collect()
}

/// Statistics for a single column, or `None` if it has no numeric cell
pub fn summarize_column(rows: &[Row], column: &str) -> Option<ColumnStatistics> {
    let mut count = 0usize;
    let mut sum = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    for value in rows
        .iter()
        .filter_map(|row| row.get(column))
        .filter_map(|cell| cell.as_number())
    {
        count += 1;
        sum += value;
        min = min.min(value);
        max = max.max(value);
    }

    if count == 0 {
        return None;
    }

    // Rounding in the sum can push the mean a hair outside [min, max]
    let mean = (sum / count as f64).clamp(min, max);

    Some(ColumnStatistics {
        column: column.to_string(),
        mean,
        min,
        max,
        count,
    })
}
