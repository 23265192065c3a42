mod common;

use excel_analytics::insights::segmenter::extract_recommendation;
use excel_analytics::insights::{InsightKind, segment};

#[test]
fn two_section_example() {
    let insights = segment(common::TWO_SECTIONS);

    assert_eq!(insights.len(), 2);

    assert_eq!(insights[0].kind, InsightKind::TrendPattern);
    assert_eq!(insights[0].title, "Key Trends and Patterns");
    assert!(insights[0].description.starts_with("Sales increased 20%"));
    assert_eq!(insights[0].recommendation, "expand inventory before Q4");

    assert_eq!(insights[1].kind, InsightKind::Correlation);
    assert_eq!(insights[1].title, "Correlations between Variables");
    assert_eq!(insights[1].description, "Units and Sales move together.");
    assert_eq!(insights[1].recommendation, "");
}

#[test]
fn blank_text_yields_single_error_record() {
    for text in ["", "   \n\t  "] {
        let insights = segment(text);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].kind, InsightKind::Error);
        assert_eq!(insights[0].title, "Analysis Error");
        assert_eq!(insights[0].description, "No insights generated by AI.");
        assert!(!insights[0].recommendation.is_empty());
    }
}

#[test]
fn text_without_headings_is_one_raw_insight() {
    let insights = segment("  Sales look healthy overall.  ");

    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0].kind, InsightKind::RawInsight);
    assert_eq!(insights[0].title, "AI Insights");
    assert_eq!(insights[0].description, "Sales look healthy overall.");
    assert_eq!(insights[0].recommendation, "");
}

#[test]
fn classifies_every_heading_family() {
    let text = "\
**1. Key Trends and Patterns:**
a
**2. Correlations between Variables:**
b
**3. Potential Anomalies/Outliers:**
c
**4. Data Quality Issues (if any):**
d
**5. Actionable Recommendations:**
e
**6. Regional Performance Analysis:**
f
";
    let kinds: Vec<InsightKind> = segment(text).iter().map(|i| i.kind).collect();
    assert_eq!(
        kinds,
        vec![
            InsightKind::TrendPattern,
            InsightKind::Correlation,
            InsightKind::Anomaly,
            InsightKind::DataQuality,
            InsightKind::Recommendation,
            InsightKind::Insight,
        ]
    );
}

#[test]
fn preamble_and_empty_sections_are_dropped() {
    let text = "Here is my analysis.\n**1. Key Trends:**\n\n**2. Outliers:**\nOne spike in March.\n";
    let insights = segment(text);

    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0].kind, InsightKind::Anomaly);
    assert_eq!(insights[0].title, "Outliers");
}

#[test]
fn headings_only_falls_back_to_raw_insight() {
    let text = "**1. Key Trends:**\n**2. Outliers:**\n";
    let insights = segment(text);

    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0].kind, InsightKind::RawInsight);
}

#[test]
fn structured_json_sections_are_used_directly() {
    let text = r#"[
        {"heading": "1. Key Trends and Patterns", "body": "Revenue grew. Recommendation: hire two reps."},
        {"heading": "Data Quality Issues", "body": "Region is blank in 3 rows."}
    ]"#;
    let insights = segment(text);

    assert_eq!(insights.len(), 2);
    assert_eq!(insights[0].title, "Key Trends and Patterns");
    assert_eq!(insights[0].recommendation, "hire two reps");
    assert_eq!(insights[1].kind, InsightKind::DataQuality);
}

#[test]
fn fenced_and_wrapped_json_is_accepted() {
    let text = "```json\n{\"sections\": [{\"heading\": \"Outliers\", \"body\": \"None found.\"}]}\n```";
    let insights = segment(text);

    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0].kind, InsightKind::Anomaly);
}

#[test]
fn unrelated_json_falls_back_to_raw_text() {
    let insights = segment(r#"{"answer": 42}"#);
    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0].kind, InsightKind::RawInsight);
}

#[test]
fn recommendation_needs_colon_and_stops_at_period() {
    assert_eq!(
        extract_recommendation("We RECOMMEND: cut costs. Then grow."),
        "cut costs"
    );
    assert_eq!(
        extract_recommendation("Recommendations: focus on Region X"),
        "focus on Region X"
    );
    assert_eq!(extract_recommendation("We recommend cutting costs."), "");
}
