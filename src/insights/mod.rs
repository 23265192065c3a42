//! AI insight generation: prompt building, the text-generation client, and
//! segmentation of the generated text into labeled insight records.

pub mod client;
pub mod prompt;
pub mod segmenter;

use crate::error::AppResult;
use serde::{Deserialize, Serialize};

pub use client::{GeminiClient, GenerationError, RetryPolicy, TextGenerator, generate_with_retry};
pub use prompt::InsightRequest;
pub use segmenter::segment;

/// Category of an insight record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    TrendPattern,
    Correlation,
    Anomaly,
    DataQuality,
    Recommendation,
    RawInsight,
    Error,
    Insight,
}

impl InsightKind {
    /// Classify a section heading
    ///
    /// Case-insensitive substring match, first hit wins: trend/pattern, correlation,
    /// anomal/outlier, data quality, recommendation. Anything else is a plain insight.
    pub fn classify(heading: &str) -> Self {
        let heading = heading.to_lowercase();
        if heading.contains("trend") || heading.contains("pattern") {
            InsightKind::TrendPattern
        } else if heading.contains("correlation") {
            InsightKind::Correlation
        } else if heading.contains("anomal") || heading.contains("outlier") {
            InsightKind::Anomaly
        } else if heading.contains("data quality") {
            InsightKind::DataQuality
        } else if heading.contains("recommendation") {
            InsightKind::Recommendation
        } else {
            InsightKind::Insight
        }
    }
}

/// One labeled section of AI output
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    #[serde(rename = "type")]
    pub kind: InsightKind,
    pub title: String,
    pub description: String,
    pub recommendation: String,
}

/// Run the insight pipeline for an already rate-limited caller
///
/// Builds the prompt, calls the generator with the retry policy, and segments
/// whatever text comes back.
///
/// # Errors
/// * `AppError::InvalidInput` if the request is missing columns, sample rows or statistics
/// * `AppError::UpstreamUnavailable` once the generator keeps failing after all retries
pub async fn generate_insights(
    generator: &dyn TextGenerator,
    request: &InsightRequest,
    policy: &RetryPolicy,
) -> AppResult<Vec<Insight>> {
    let prompt = request.build_prompt()?;
    let text = generate_with_retry(generator, &prompt, policy).await?;
    Ok(segment(&text))
}
