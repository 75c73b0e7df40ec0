//! Insight text generation from computed patterns
//!
//! Each builder returns ready-to-store candidates. Confidence values are fixed
//! per insight category, they describe how directly the text follows from
//! the counts rather than any statistical estimate.

use chrono::NaiveDate;
use serde_json::json;

use super::ranking::RankedPattern;
use super::InsightCandidate;

pub const CRIME_PATTERN: &str = "crime_pattern";
pub const LOCATION_PATTERN: &str = "location_pattern";
pub const VICTIM_PATTERN: &str = "victim_pattern";
pub const SUMMARY: &str = "summary";
pub const DATA_QUALITY: &str = "data_quality";

pub const SUMMARY_CONFIDENCE: f64 = 1.0;
pub const CATEGORY_CONFIDENCE: f64 = 0.95;
pub const LOCATION_CONFIDENCE: f64 = 0.90;
pub const DATA_QUALITY_CONFIDENCE: f64 = 1.0;
pub const QUALITATIVE_CONFIDENCE: f64 = 0.70;

/// One insight per top category label
pub fn category_insights(pattern: &RankedPattern, top_n: usize) -> Vec<InsightCandidate> {
    pattern
        .counts
        .iter()
        .take(top_n)
        .map(|entry| InsightCandidate {
            text: format!("{}: {} incidents reported", entry.label, entry.count),
            insight_type: CRIME_PATTERN.to_string(),
            confidence: CATEGORY_CONFIDENCE,
            metadata: json!({ "crime_type": entry.label, "count": entry.count }),
        })
        .collect()
}

/// One insight per top location label
pub fn location_insights(pattern: &RankedPattern, top_n: usize) -> Vec<InsightCandidate> {
    pattern
        .counts
        .iter()
        .take(top_n)
        .map(|entry| InsightCandidate {
            text: format!("{} has {} reported incidents", entry.label, entry.count),
            insight_type: LOCATION_PATTERN.to_string(),
            confidence: LOCATION_CONFIDENCE,
            metadata: json!({ "location": entry.label, "count": entry.count }),
        })
        .collect()
}

/// Fixed observations about victim analysis that are not backed by counts
pub fn qualitative_insights() -> Vec<InsightCandidate> {
    [
        ("Analyzing victim patterns to identify vulnerable populations", "demographic"),
        ("Monitoring repeat victimization patterns", "repeat_victimization"),
    ]
    .into_iter()
    .map(|(text, analysis_type)| InsightCandidate {
        text: text.to_string(),
        insight_type: VICTIM_PATTERN.to_string(),
        confidence: QUALITATIVE_CONFIDENCE,
        metadata: json!({ "analysis_type": analysis_type }),
    })
    .collect()
}

/// Total count and observed date range
pub fn summary_insight(total: usize, range: Option<(NaiveDate, NaiveDate)>) -> InsightCandidate {
    let (text, date_range) = match range {
        Some((min, max)) => {
            let date_range = format!("{} to {}", min.format("%Y-%m-%d"), max.format("%Y-%m-%d"));
            (format!("Analyzed {} incidents from {}", total, date_range), Some(date_range))
        }
        None => (format!("Analyzed {} incidents (date range unknown)", total), None),
    };

    InsightCandidate {
        text,
        insight_type: SUMMARY.to_string(),
        confidence: SUMMARY_CONFIDENCE,
        metadata: json!({ "total_incidents": total, "date_range": date_range }),
    }
}

/// Missing-location report, only produced when something is missing
pub fn data_quality_insight(missing_locations: usize) -> Option<InsightCandidate> {
    if missing_locations == 0 {
        return None;
    }

    Some(InsightCandidate {
        text: format!(
            "Data quality issue: {} incidents have missing location information",
            missing_locations
        ),
        insight_type: DATA_QUALITY.to_string(),
        confidence: DATA_QUALITY_CONFIDENCE,
        metadata: json!({ "missing_locations": missing_locations }),
    })
}
