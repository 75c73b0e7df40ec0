//! Incident record types shared by the analysis and monitor modules
//!
//! Raw records come from outside the crate in whatever shape the upstream
//! export produced. `IncidentRecord` is the normalized form: the hour is
//! always in `0..=23`, labels are never empty, and fields that cannot be
//! parsed fall back to a default instead of failing the whole record.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Label used when a category is missing or blank
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Date formats accepted for the incident date, tried in order
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%d-%b-%Y"];

/// Date-time formats accepted when the date column carries a time part
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M",
];

/// A time or hour column value, which upstream exports as either text or a number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTime {
    Number(i64),
    Text(String),
}

/// A record as it arrives from a data source, before normalization
///
/// Field aliases follow the column names of the municipal incident export
/// (`OccurredFromTime`, `IncidentDate`, `Offense`, `Description`,
/// `Neighborhood`) as well as plain snake_case names.
///
/// Every field is read leniently: numbers become label text, a float hour
/// is truncated, and values of any other shape become `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawIncident {
    #[serde(default, alias = "OccurredFromTime", alias = "hour", deserialize_with = "lenient_time")]
    pub time: Option<RawTime>,
    #[serde(default, alias = "IncidentDate", deserialize_with = "lenient_text")]
    pub date: Option<String>,
    #[serde(default, alias = "Offense", alias = "type", deserialize_with = "lenient_text")]
    pub category: Option<String>,
    #[serde(default, alias = "Description", deserialize_with = "lenient_text")]
    pub description: Option<String>,
    #[serde(default, alias = "Neighborhood", deserialize_with = "lenient_text")]
    pub location: Option<String>,
}

fn lenient_time<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<RawTime>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .map(RawTime::Number),
        Value::String(s) => Some(RawTime::Text(s)),
        _ => None,
    })
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// A normalized incident record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentRecord {
    /// Hour of day, always in `0..=23` (unknown maps to 0)
    pub hour: u8,
    /// Calendar date, if one could be parsed
    pub date: Option<NaiveDate>,
    /// Category label, `"Unknown"` when missing
    pub category: String,
    /// Free-text description, empty when missing
    pub description: String,
    /// Location label, `None` when missing
    pub location: Option<String>,
}

impl IncidentRecord {
    /// Build a record from already-clean values, clamping the hour
    pub fn new(
        hour: u8,
        date: Option<NaiveDate>,
        category: impl Into<String>,
        location: Option<&str>,
    ) -> Self {
        Self {
            hour: if hour < 24 { hour } else { 0 },
            date,
            category: normalize_label(Some(category.into())).unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
            description: String::new(),
            location: normalize_label(location.map(str::to_string)),
        }
    }
}

impl From<RawIncident> for IncidentRecord {
    fn from(raw: RawIncident) -> Self {
        let description = raw.description.map(|d| d.trim().to_string()).unwrap_or_default();

        // Exports without an offense column still carry a description
        let category = normalize_label(raw.category)
            .or_else(|| normalize_label(Some(description.clone())))
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string());

        Self {
            hour: raw.time.as_ref().map(parse_hour).unwrap_or(0),
            date: raw.date.as_deref().and_then(parse_date),
            category,
            description,
            location: normalize_label(raw.location),
        }
    }
}

/// Extract the hour from a time value such as `"14:30"`, `"7"` or `1430`
///
/// Anything unparseable or outside `0..=23` becomes 0.
pub fn parse_hour(time: &RawTime) -> u8 {
    let hour = match time {
        RawTime::Number(n) if (0..24).contains(n) => Some(*n),
        // HHMM numeric times
        RawTime::Number(n) if (0..2400).contains(n) => Some(n / 100),
        RawTime::Number(_) => None,
        RawTime::Text(s) => s
            .trim()
            .split(':')
            .next()
            .and_then(|h| h.trim().parse::<i64>().ok()),
    };

    match hour {
        Some(h) if (0..24).contains(&h) => h as u8,
        _ => 0,
    }
}

/// Parse a calendar date, ignoring any time component
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }

    // Compact YYYYMMDD, which numeric date columns produce
    if value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit()) {
        let (y, m, d) = (&value[..4], &value[4..6], &value[6..]);
        return NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?);
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|dt| dt.date())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        })
}

fn normalize_label(label: Option<String>) -> Option<String> {
    label
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty() && !l.eq_ignore_ascii_case("nan"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hour_text() {
        assert_eq!(parse_hour(&RawTime::Text("14:30".to_string())), 14);
        assert_eq!(parse_hour(&RawTime::Text("07".to_string())), 7);
        assert_eq!(parse_hour(&RawTime::Text("25:00".to_string())), 0);
        assert_eq!(parse_hour(&RawTime::Text("noon".to_string())), 0);
        assert_eq!(parse_hour(&RawTime::Text(String::new())), 0);
    }

    #[test]
    fn test_parse_hour_number() {
        assert_eq!(parse_hour(&RawTime::Number(23)), 23);
        assert_eq!(parse_hour(&RawTime::Number(1430)), 14);
        assert_eq!(parse_hour(&RawTime::Number(-1)), 0);
        assert_eq!(parse_hour(&RawTime::Number(9999)), 0);
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 10, 3);
        assert_eq!(parse_date("2024-10-03"), expected);
        assert_eq!(parse_date("10/03/2024"), expected);
        assert_eq!(parse_date("2024-10-03 22:15:00"), expected);
        assert_eq!(parse_date("2024-10-03T22:15:00Z"), expected);
        assert_eq!(parse_date("20241003"), expected);
        assert_eq!(parse_date("20241399"), None);
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date("  "), None);
    }

    #[test]
    fn test_raw_record_normalization() {
        let raw: RawIncident = serde_json::from_str(
            r#"{"OccurredFromTime": "18:45", "IncidentDate": "2024-10-01",
                "Offense": " LARCENY ", "Description": "stolen bike", "Neighborhood": ""}"#,
        )
        .unwrap();

        let record = IncidentRecord::from(raw);
        assert_eq!(record.hour, 18);
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 10, 1));
        assert_eq!(record.category, "LARCENY");
        assert_eq!(record.description, "stolen bike");
        assert_eq!(record.location, None);
    }

    #[test]
    fn test_category_falls_back_to_description() {
        let raw = RawIncident {
            description: Some("VANDALISM".to_string()),
            ..Default::default()
        };
        let record = IncidentRecord::from(raw);
        assert_eq!(record.category, "VANDALISM");
        assert_eq!(record.hour, 0);

        let record = IncidentRecord::from(RawIncident::default());
        assert_eq!(record.category, UNKNOWN_LABEL);
    }

    #[test]
    fn test_wrong_field_types_are_defaulted() {
        let raw: RawIncident = serde_json::from_str(
            r#"{"hour": 14.0, "IncidentDate": 20241001, "Offense": "A", "Neighborhood": 12}"#,
        )
        .unwrap();
        let record = IncidentRecord::from(raw);
        assert_eq!(record.hour, 14);
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 10, 1));
        assert_eq!(record.location.as_deref(), Some("12"));

        let raw: RawIncident = serde_json::from_str(
            r#"{"hour": [1, 2], "date": {"y": 2024}, "category": true, "location": null}"#,
        )
        .unwrap();
        let record = IncidentRecord::from(raw);
        assert_eq!(record.hour, 0);
        assert_eq!(record.date, None);
        assert_eq!(record.category, UNKNOWN_LABEL);
        assert_eq!(record.location, None);
    }

    #[test]
    fn test_new_clamps_hour() {
        let record = IncidentRecord::new(30, None, "A", Some("Downtown"));
        assert_eq!(record.hour, 0);
        assert_eq!(record.location.as_deref(), Some("Downtown"));
    }
}
