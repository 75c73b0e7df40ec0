//! Aggregator - pattern and insight computation over an incident batch
//!
//! Everything here is pure: a batch of normalized records goes in, pattern
//! snapshots and insight candidates come out. Nothing touches storage or the
//! clock, so identical batches always produce identical reports.

pub mod ranking;
pub mod report;
pub mod temporal;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::types::{IncidentRecord, UNKNOWN_LABEL};

pub use ranking::{rank_labels, LabelCount, RankedPattern};
pub use temporal::{CalendarPattern, HourlyPattern};

/// Pattern type keys as stored
pub const HOURLY: &str = "hourly";
pub const DAILY: &str = "daily";
pub const MONTHLY: &str = "monthly";
pub const CRIME_TYPES: &str = "crime_types";
pub const LOCATIONS: &str = "locations";

/// Confidence for histogram patterns, which are exact counts
pub const TEMPORAL_CONFIDENCE: f64 = 1.0;

/// Structured payload of a pattern snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternData {
    Hourly(HourlyPattern),
    Calendar(CalendarPattern),
    Ranked(RankedPattern),
}

/// A computed pattern ready to be upserted
#[derive(Debug, Clone, PartialEq)]
pub struct PatternCandidate {
    pub pattern_type: String,
    pub data: PatternData,
    pub confidence: f64,
}

/// A generated insight ready to be appended
#[derive(Debug, Clone, PartialEq)]
pub struct InsightCandidate {
    pub text: String,
    pub insight_type: String,
    pub confidence: f64,
    pub metadata: Value,
}

/// Output of one aggregation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisReport {
    pub patterns: Vec<PatternCandidate>,
    pub insights: Vec<InsightCandidate>,
    pub records: usize,
}

impl AnalysisReport {
    /// Find a computed pattern by type
    pub fn pattern(&self, pattern_type: &str) -> Option<&PatternCandidate> {
        self.patterns.iter().find(|p| p.pattern_type == pattern_type)
    }

    /// Insights of one type, in generation order
    pub fn insights_of<'a>(&'a self, insight_type: &'a str) -> impl Iterator<Item = &'a InsightCandidate> + 'a {
        self.insights.iter().filter(move |i| i.insight_type == insight_type)
    }
}

/// Aggregator settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Labels kept in stored categorical/location patterns
    pub top_n_stored: usize,
    /// Labels surfaced as individual insights
    pub top_n_insights: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            top_n_stored: 10,
            top_n_insights: 5,
        }
    }
}

/// Computes patterns and insights from record batches
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    /// Run every analysis over the batch
    pub fn analyze(&self, records: &[IncidentRecord]) -> AnalysisReport {
        let mut report = AnalysisReport {
            records: records.len(),
            ..Default::default()
        };

        self.temporal(records, &mut report);
        self.categorical(records, &mut report);
        self.summary(records, &mut report);

        debug!(
            "Aggregated {} records into {} patterns and {} insights",
            records.len(),
            report.patterns.len(),
            report.insights.len()
        );

        report
    }

    fn temporal(&self, records: &[IncidentRecord], out: &mut AnalysisReport) {
        let hourly = temporal::hourly_pattern(records);
        debug!("Peak hour {:02}:00 with {} incidents", hourly.peak_hour, hourly.peak_count);
        out.patterns.push(PatternCandidate {
            pattern_type: HOURLY.to_string(),
            data: PatternData::Hourly(hourly),
            confidence: TEMPORAL_CONFIDENCE,
        });

        let calendars = [
            (DAILY, temporal::weekday_pattern(records)),
            (MONTHLY, temporal::month_pattern(records)),
        ];
        for (pattern_type, pattern) in calendars {
            if let Some(pattern) = pattern {
                out.patterns.push(PatternCandidate {
                    pattern_type: pattern_type.to_string(),
                    data: PatternData::Calendar(pattern),
                    confidence: TEMPORAL_CONFIDENCE,
                });
            }
        }
    }

    fn categorical(&self, records: &[IncidentRecord], out: &mut AnalysisReport) {
        let categories = rank_labels(records.iter().map(|r| r.category.as_str()));
        if let Some(pattern) = RankedPattern::from_ranking(&categories, self.config.top_n_stored) {
            out
                .insights
                .extend(report::category_insights(&pattern, self.config.top_n_insights));
            out.patterns.push(PatternCandidate {
                pattern_type: CRIME_TYPES.to_string(),
                data: PatternData::Ranked(pattern),
                confidence: report::CATEGORY_CONFIDENCE,
            });
        }

        let locations = rank_labels(
            records
                .iter()
                .map(|r| r.location.as_deref().unwrap_or(UNKNOWN_LABEL)),
        );
        if let Some(pattern) = RankedPattern::from_ranking(&locations, self.config.top_n_stored) {
            out
                .insights
                .extend(report::location_insights(&pattern, self.config.top_n_insights));
            out.patterns.push(PatternCandidate {
                pattern_type: LOCATIONS.to_string(),
                data: PatternData::Ranked(pattern),
                confidence: report::LOCATION_CONFIDENCE,
            });
        }

        out.insights.extend(report::qualitative_insights());
    }

    fn summary(&self, records: &[IncidentRecord], out: &mut AnalysisReport) {
        out.insights.push(report::summary_insight(
            records.len(),
            temporal::date_range(records),
        ));

        let missing = records.iter().filter(|r| r.location.is_none()).count();
        out.insights.extend(report::data_quality_insight(missing));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(hour: u8, category: &str, location: Option<&str>) -> IncidentRecord {
        IncidentRecord::new(hour, NaiveDate::from_ymd_opt(2024, 10, 1), category, location)
    }

    #[test]
    fn test_hourly_end_to_end() {
        let records: Vec<_> = [3, 3, 14, 14, 14]
            .into_iter()
            .map(|h| record(h, "A", Some("X")))
            .collect();
        let report = Aggregator::default().analyze(&records);

        let hourly = match &report.pattern(HOURLY).unwrap().data {
            PatternData::Hourly(h) => h.clone(),
            other => panic!("unexpected hourly data: {:?}", other),
        };
        assert_eq!(hourly.counts[3], 2);
        assert_eq!(hourly.counts[14], 3);
        assert_eq!(hourly.peak_hour, 14);
        assert_eq!(hourly.peak_count, 3);
    }

    #[test]
    fn test_categories_end_to_end() {
        let records = vec![
            record(1, "A", Some("X")),
            record(2, "A", Some("X")),
            record(3, "B", Some("Y")),
        ];
        let report = Aggregator::default().analyze(&records);

        let crime = match &report.pattern(CRIME_TYPES).unwrap().data {
            PatternData::Ranked(r) => r.clone(),
            other => panic!("unexpected crime data: {:?}", other),
        };
        assert_eq!(crime.counts[0], LabelCount { label: "A".into(), count: 2 });
        assert_eq!(crime.counts[1], LabelCount { label: "B".into(), count: 1 });

        let category_insights: Vec<_> = report.insights_of(report::CRIME_PATTERN).collect();
        assert_eq!(category_insights.len(), 2);
        assert_eq!(category_insights[0].metadata["count"], 2);
        assert_eq!(category_insights[1].metadata["count"], 1);
    }

    #[test]
    fn test_missing_locations() {
        let records = vec![record(1, "A", None), record(2, "A", Some("X")), record(3, "B", None)];
        let report = Aggregator::default().analyze(&records);

        let quality: Vec<_> = report.insights_of(report::DATA_QUALITY).collect();
        assert_eq!(quality.len(), 1);
        assert_eq!(quality[0].metadata["missing_locations"], 2);

        let locations = match &report.pattern(LOCATIONS).unwrap().data {
            PatternData::Ranked(r) => r.clone(),
            other => panic!("unexpected location data: {:?}", other),
        };
        assert_eq!(locations.top_label, UNKNOWN_LABEL);
        assert_eq!(locations.top_count, 2);
    }

    #[test]
    fn test_no_quality_insight_when_complete() {
        let records = vec![record(1, "A", Some("X"))];
        let report = Aggregator::default().analyze(&records);
        assert_eq!(report.insights_of(report::DATA_QUALITY).count(), 0);
    }

    #[test]
    fn test_empty_batch() {
        let report = Aggregator::default().analyze(&[]);
        assert_eq!(report.records, 0);
        assert!(report.pattern(HOURLY).is_some());
        assert!(report.pattern(CRIME_TYPES).is_none());
        assert!(report.pattern(LOCATIONS).is_none());
        assert!(report.pattern(DAILY).is_none());

        let summary: Vec<_> = report.insights_of(report::SUMMARY).collect();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].text, "Analyzed 0 incidents (date range unknown)");
    }

    #[test]
    fn test_deterministic() {
        let records = vec![
            record(9, "B", Some("Y")),
            record(9, "A", Some("X")),
            record(22, "C", None),
        ];
        let aggregator = Aggregator::default();
        assert_eq!(aggregator.analyze(&records), aggregator.analyze(&records));
    }

    #[test]
    fn test_top_n_config() {
        let records: Vec<_> = (0..12).map(|i| record(0, &format!("C{}", i), Some("X"))).collect();
        let report = Aggregator::new(AggregatorConfig { top_n_stored: 4, top_n_insights: 2 }).analyze(&records);

        match &report.pattern(CRIME_TYPES).unwrap().data {
            PatternData::Ranked(r) => assert_eq!(r.counts.len(), 4),
            other => panic!("unexpected crime data: {:?}", other),
        }
        assert_eq!(report.insights_of(report::CRIME_PATTERN).count(), 2);
    }

    #[test]
    fn test_pattern_data_serializes_plain() {
        let records = vec![record(14, "A", Some("X"))];
        let report = Aggregator::default().analyze(&records);
        let value = serde_json::to_value(&report.pattern(HOURLY).unwrap().data).unwrap();
        assert_eq!(value["peak_hour"], 14);
        assert_eq!(value["counts"].as_array().unwrap().len(), 24);
    }
}
