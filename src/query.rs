//! Question answering over stored patterns
//!
//! A question is routed to a topic by an ordered keyword table; the first
//! rule with a matching keyword wins. Keywords match at the start of a word,
//! so "hours" hits "hour" but "neighbourhood" does not. Answers are built only from the
//! pattern snapshots in the store, never from the raw batch.

use serde::de::DeserializeOwned;
use std::fmt::Write as _;
use tracing::debug;

use crate::analysis::{CalendarPattern, HourlyPattern, RankedPattern, CRIME_TYPES, DAILY, HOURLY, LOCATIONS};
use crate::store::{PatternStore, StoreError};

/// What a question is about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Report,
    Locations,
    CrimeTypes,
    Temporal,
    Help,
}

/// Routing table, evaluated top to bottom
const RULES: &[(&[&str], Topic)] = &[
    (&["report", "summary", "overview", "statistics", "stats"], Topic::Report),
    (
        &["area", "where", "location", "neighborhood", "neighbourhood", "place", "district", "region", "zone", "highest", "dangerous"],
        Topic::Locations,
    ),
    (&["crime", "offense", "incident", "common", "frequent", "type"], Topic::CrimeTypes),
    (&["time", "hour", "day", "when", "pattern"], Topic::Temporal),
];

/// Route a question to a topic
pub fn classify(question: &str) -> Topic {
    let question = question.to_lowercase();
    let words: Vec<&str> = question
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    RULES
        .iter()
        .find(|(keywords, _)| {
            keywords
                .iter()
                .any(|k| words.iter().any(|w| w.starts_with(k)))
        })
        .map(|(_, topic)| *topic)
        .unwrap_or(Topic::Help)
}

pub const HELP_TEXT: &str = "I can answer questions about the analyzed incidents. Try asking:\n\n\
- Where do most incidents occur?\n\
- What types of crime are most common?\n\
- When do most incidents happen?\n\
- Can you give me a summary report?";

const NO_DATA: &str = "No analysis results are stored yet. Run an analysis pass first.";

/// Answers questions from a pattern store
#[derive(Clone)]
pub struct QueryEngine {
    patterns: PatternStore,
}

impl QueryEngine {
    pub fn new(patterns: PatternStore) -> Self {
        Self { patterns }
    }

    /// Answer a free-text question
    pub async fn answer(&self, question: &str) -> Result<String, StoreError> {
        let topic = classify(question);
        debug!("Question routed to {:?}", topic);

        let answer = match topic {
            Topic::Help => Some(HELP_TEXT.to_string()),
            Topic::Locations => {
                let total = self.total().await?;
                self.load::<RankedPattern>(LOCATIONS)
                    .await?
                    .map(|p| ranked_answer("Incidents by location", &p, total))
            }
            Topic::CrimeTypes => {
                let total = self.total().await?;
                self.load::<RankedPattern>(CRIME_TYPES)
                    .await?
                    .map(|p| ranked_answer("Most common incident types", &p, total))
            }
            Topic::Temporal => {
                let daily = self.load::<CalendarPattern>(DAILY).await?;
                self.load::<HourlyPattern>(HOURLY)
                    .await?
                    .map(|h| temporal_answer(&h, daily.as_ref()))
            }
            Topic::Report => self.report().await?,
        };

        Ok(answer.unwrap_or_else(|| NO_DATA.to_string()))
    }

    async fn report(&self) -> Result<Option<String>, StoreError> {
        let Some(hourly) = self.load::<HourlyPattern>(HOURLY).await? else {
            return Ok(None);
        };
        let crimes = self.load::<RankedPattern>(CRIME_TYPES).await?;
        let locations = self.load::<RankedPattern>(LOCATIONS).await?;
        let daily = self.load::<CalendarPattern>(DAILY).await?;
        let total = hourly.counts.iter().sum::<u64>();

        let mut out = format!("Incident Analysis Report\n\nTotal incidents: {}\n", total);
        if let Some(crimes) = &crimes {
            out.push('\n');
            out.push_str(&ranked_answer("Most common incident types", crimes, Some(total)));
            out.push('\n');
        }
        if let Some(locations) = &locations {
            out.push('\n');
            out.push_str(&ranked_answer("Most affected locations", locations, Some(total)));
            out.push('\n');
        }

        out.push_str("\nTemporal patterns:\n");
        let _ = writeln!(out, "- Peak hour: {:02}:00", hourly.peak_hour);
        if let Some(daily) = &daily {
            let _ = writeln!(out, "- Busiest day: {}", daily.busiest);
        }
        let _ = writeln!(out, "- Daytime incidents (06:00-17:59): {}", hourly.daytime_count);
        let _ = write!(out, "- Nighttime incidents (18:00-05:59): {}", hourly.nighttime_count);

        Ok(Some(out))
    }

    /// Total incidents, taken from the hourly histogram
    async fn total(&self) -> Result<Option<u64>, StoreError> {
        Ok(self
            .load::<HourlyPattern>(HOURLY)
            .await?
            .map(|h| h.counts.iter().sum()))
    }

    /// Load and decode a snapshot, `None` if missing or of an unexpected shape
    async fn load<T: DeserializeOwned>(&self, pattern_type: &str) -> Result<Option<T>, StoreError> {
        match self.patterns.get(pattern_type).await {
            Ok(snapshot) => match serde_json::from_value(snapshot.data) {
                Ok(data) => Ok(Some(data)),
                Err(e) => {
                    debug!("Stored {} pattern has unexpected shape: {}", pattern_type, e);
                    Ok(None)
                }
            },
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn percent(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

fn ranked_answer(title: &str, pattern: &RankedPattern, total: Option<u64>) -> String {
    let mut out = format!("{}:\n", title);
    for entry in pattern.counts.iter().take(5) {
        match total {
            Some(total) => {
                let _ = writeln!(
                    out,
                    "- {}: {} incidents ({:.1}% of total)",
                    entry.label,
                    entry.count,
                    percent(entry.count, total)
                );
            }
            None => {
                let _ = writeln!(out, "- {}: {} incidents", entry.label, entry.count);
            }
        }
    }
    if pattern.distinct > pattern.counts.len() {
        let _ = writeln!(out, "({} distinct labels in total)", pattern.distinct);
    }
    out.trim_end().to_string()
}

fn temporal_answer(hourly: &HourlyPattern, daily: Option<&CalendarPattern>) -> String {
    let mut out = String::from("Temporal patterns:\n");

    if let Some(daily) = daily {
        out.push_str("\nIncidents by day of week:\n");
        for (day, count) in &daily.counts {
            let _ = writeln!(out, "- {}: {}", day, count);
        }
    }

    out.push_str("\nIncidents by hour:\n");
    for (hour, count) in hourly.counts.iter().enumerate() {
        let _ = writeln!(out, "- {:02}:00: {}", hour, count);
    }

    let total = hourly.daytime_count + hourly.nighttime_count;
    let _ = writeln!(
        out,
        "\nPeak activity: {:02}:00 ({} incidents)",
        hourly.peak_hour, hourly.peak_count
    );
    let _ = writeln!(
        out,
        "Daytime (06:00-17:59): {} incidents ({:.1}%)",
        hourly.daytime_count,
        percent(hourly.daytime_count, total)
    );
    let _ = write!(
        out,
        "Nighttime (18:00-05:59): {} incidents ({:.1}%)",
        hourly.nighttime_count,
        percent(hourly.nighttime_count, total)
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Aggregator;
    use crate::store::sqlite::open_in_memory;
    use crate::types::IncidentRecord;
    use chrono::NaiveDate;

    async fn engine_with_data() -> QueryEngine {
        let patterns = PatternStore::from_connection(open_in_memory().unwrap());
        let date = NaiveDate::from_ymd_opt(2024, 10, 7);
        let records = vec![
            IncidentRecord::new(3, date, "Theft", Some("Downtown")),
            IncidentRecord::new(14, date, "Theft", Some("Downtown")),
            IncidentRecord::new(14, date, "Assault", Some("Midtown")),
            IncidentRecord::new(20, date, "Theft", Some("Midtown")),
        ];
        let report = Aggregator::default().analyze(&records);
        for pattern in &report.patterns {
            patterns
                .upsert(&pattern.pattern_type, &pattern.data, pattern.confidence)
                .await
                .unwrap();
        }
        QueryEngine::new(patterns)
    }

    #[test]
    fn test_classify_first_match_wins() {
        assert_eq!(classify("Where do most crimes occur?"), Topic::Locations);
        assert_eq!(classify("What types of offense are common?"), Topic::CrimeTypes);
        assert_eq!(classify("When do things happen?"), Topic::Temporal);
        assert_eq!(classify("Give me a full crime report"), Topic::Report);
        // "dangerous" is a location keyword and outranks "time"
        assert_eq!(classify("What is the most dangerous time?"), Topic::Locations);
        assert_eq!(classify("hello"), Topic::Help);
    }

    #[test]
    fn test_classify_matches_word_starts_only() {
        assert_eq!(classify("Which neighbourhood is worst?"), Topic::Locations);
        assert_eq!(classify("Busiest hours?"), Topic::Temporal);
        assert_eq!(classify("Any offenses?"), Topic::CrimeTypes);
        assert_eq!(classify("anything new today?"), Topic::Help);
        assert_eq!(classify("what happened on Monday"), Topic::Help);
        assert_eq!(classify("somewhere else"), Topic::Help);
    }

    #[tokio::test]
    async fn test_answer_without_data() {
        let engine = QueryEngine::new(PatternStore::from_connection(open_in_memory().unwrap()));
        assert_eq!(engine.answer("where?").await.unwrap(), NO_DATA);
        assert_eq!(engine.answer("hello").await.unwrap(), HELP_TEXT);
    }

    #[tokio::test]
    async fn test_location_answer() {
        let answer = engine_with_data().await.answer("Which neighborhood is worst?").await.unwrap();
        assert!(answer.starts_with("Incidents by location:"));
        assert!(answer.contains("- Downtown: 2 incidents (50.0% of total)"));
    }

    #[tokio::test]
    async fn test_crime_type_answer() {
        let answer = engine_with_data().await.answer("most common crime").await.unwrap();
        let first = answer.lines().nth(1).unwrap();
        assert_eq!(first, "- Theft: 3 incidents (75.0% of total)");
    }

    #[tokio::test]
    async fn test_temporal_answer() {
        let answer = engine_with_data().await.answer("when?").await.unwrap();
        assert!(answer.contains("- Monday: 4"));
        assert!(answer.contains("- 14:00: 2"));
        assert!(answer.contains("Peak activity: 14:00 (2 incidents)"));
        assert!(answer.contains("Daytime (06:00-17:59): 2 incidents (50.0%)"));
    }

    #[tokio::test]
    async fn test_report_answer() {
        let answer = engine_with_data().await.answer("summary please").await.unwrap();
        assert!(answer.contains("Total incidents: 4"));
        assert!(answer.contains("- Peak hour: 14:00"));
        assert!(answer.contains("- Busiest day: Monday"));
        assert!(answer.contains("Most affected locations:"));
    }
}
