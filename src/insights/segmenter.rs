use super::{Insight, InsightKind};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

lazy_static! {
    static ref SECTION_HEADING: Regex = Regex::new(r"\*\*(\d+\.\s*[^:]+):\*\*\s*\n").unwrap();
    static ref LEADING_ORDINAL: Regex = Regex::new(r"^\d+\.\s*").unwrap();
    static ref RECOMMENDATION: Regex =
        Regex::new(r"(?i)recommend(?:ation)?s?:\s*([^.]+)").unwrap();
    static ref CODE_FENCE: Regex = Regex::new(r"(?s)^```[A-Za-z]*\s*(.*?)\s*```$").unwrap();
}

const NO_RESPONSE_GUIDANCE: &str = "The AI did not provide a response. This could be due to an internal error or a very unusual input. Please try again or with different data.";

impl Insight {
    fn analysis_error() -> Self {
        Insight {
            kind: InsightKind::Error,
            title: "Analysis Error".to_string(),
            description: "No insights generated by AI.".to_string(),
            recommendation: NO_RESPONSE_GUIDANCE.to_string(),
        }
    }

    fn raw(text: &str) -> Self {
        Insight {
            kind: InsightKind::RawInsight,
            title: "AI Insights".to_string(),
            description: text.to_string(),
            recommendation: String::new(),
        }
    }

    /// Build a record from a heading/body pair; `None` if either side is blank
    fn from_section(heading: &str, body: &str) -> Option<Self> {
        let heading = heading.trim();
        let body = body.trim();
        if heading.is_empty() || body.is_empty() {
            return None;
        }

        Some(Insight {
            kind: InsightKind::classify(heading),
            title: LEADING_ORDINAL.replace(heading, "").trim().to_string(),
            description: body.to_string(),
            recommendation: extract_recommendation(body),
        })
    }
}

/// Split generated text into insight records
///
/// Structured output (a JSON list of `{heading, body}` sections) is used when the
/// generator produced it. Otherwise the text is split on bold numbered headings such
/// as `**1. Key Trends and Patterns:**` followed by a line break, and each heading
/// owns the text up to the next one. Text before the first heading and headings
/// without a body are dropped.
///
/// Blank input yields a single `error` record; text without any usable section
/// yields a single `raw_insight` record holding the trimmed text.
///
/// # Examples
/// ```
/// use excel_analytics::insights::{segment, InsightKind};
///
/// let insights = segment("**1. Key Trends:**\nSales rising.\n**2. Correlations:**\nA and B move together.");
/// assert_eq!(insights.len(), 2);
/// assert_eq!(insights[0].kind, InsightKind::TrendPattern);
/// assert_eq!(insights[1].title, "Correlations");
/// ```
pub fn segment(text: &str) -> Vec<Insight> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return vec![Insight::analysis_error()];
    }

    if let Some(insights) = parse_structured(trimmed) {
        return insights;
    }

    let insights = split_sections(text);
    if insights.is_empty() {
        return vec![Insight::raw(trimmed)];
    }
    insights
}

fn split_sections(text: &str) -> Vec<Insight> {
    // (heading text, heading start, body start)
    let headings: Vec<(&str, usize, usize)> = SECTION_HEADING
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let heading = caps.get(1)?;
            Some((heading.as_str(), whole.start(), whole.end()))
        })
        .collect();

    headings
        .iter()
        .enumerate()
        .filter_map(|(idx, (heading, _, body_start))| {
            let body_end = headings
                .get(idx + 1)
                .map_or(text.len(), |(_, next_start, _)| *next_start);
            Insight::from_section(heading, &text[*body_start..body_end])
        })
        .collect()
}

#[derive(Deserialize)]
struct StructuredSection {
    heading: String,
    body: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StructuredOutput {
    Sections(Vec<StructuredSection>),
    Wrapped { sections: Vec<StructuredSection> },
}

/// Sections from tagged JSON output, if the text is that shape
fn parse_structured(text: &str) -> Option<Vec<Insight>> {
    let json = CODE_FENCE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map_or(text, |inner| inner.as_str());

    if !json.starts_with('[') && !json.starts_with('{') {
        return None;
    }

    let sections = match serde_json::from_str::<StructuredOutput>(json).ok()? {
        StructuredOutput::Sections(sections) => sections,
        StructuredOutput::Wrapped { sections } => sections,
    };

    let insights: Vec<Insight> = sections
        .iter()
        .filter_map(|section| Insight::from_section(&section.heading, &section.body))
        .collect();

    (!insights.is_empty()).then_some(insights)
}

/// Recommendation sentence embedded in a section body
///
/// Takes the text after the first `recommend:`, `recommendation:` or
/// `recommendations:` (any case) up to the next period. Empty when there is none.
pub fn extract_recommendation(body: &str) -> String {
    RECOMMENDATION
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}
