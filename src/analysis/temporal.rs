//! Temporal histograms: hour of day, day of week and month

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::types::IncidentRecord;

/// Hours counted as daytime (06:00 to 17:59)
const DAYTIME_HOURS: std::ops::Range<u8> = 6..18;

const WEEKDAYS: [&str; 7] = [
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
];

const MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June",
    "July", "August", "September", "October", "November", "December",
];

/// Incidents per hour of day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourlyPattern {
    /// One bucket per hour, index = hour
    pub counts: [u64; 24],
    /// Hour with the most incidents, lowest hour wins ties
    pub peak_hour: u8,
    pub peak_count: u64,
    /// Incidents between 06:00 and 17:59
    pub daytime_count: u64,
    /// Incidents between 18:00 and 05:59
    pub nighttime_count: u64,
}

/// Incidents per named calendar bucket (weekday or month)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarPattern {
    /// Bucket names in calendar order with their counts
    pub counts: Vec<(String, u64)>,
    /// Busiest bucket, earliest in calendar order wins ties
    pub busiest: String,
    pub busiest_count: u64,
    /// Records that carried a usable date
    pub dated_records: u64,
}

/// Build the hourly histogram. All 24 buckets are always present.
pub fn hourly_pattern(records: &[IncidentRecord]) -> HourlyPattern {
    let mut counts = [0u64; 24];
    for record in records {
        // IncidentRecord guarantees hour < 24, guard anyway for hand-built values
        if let Some(bucket) = counts.get_mut(record.hour as usize) {
            *bucket += 1;
        }
    }

    let (peak_hour, peak_count) = peak(&counts);
    let daytime_count: u64 = DAYTIME_HOURS.map(|h| counts[h as usize]).sum();
    let nighttime_count = counts.iter().sum::<u64>() - daytime_count;

    HourlyPattern {
        counts,
        peak_hour: peak_hour as u8,
        peak_count,
        daytime_count,
        nighttime_count,
    }
}

/// Day-of-week histogram over records with a date, `None` when no record has one
pub fn weekday_pattern(records: &[IncidentRecord]) -> Option<CalendarPattern> {
    calendar_pattern(records, &WEEKDAYS, |d| d.weekday().num_days_from_monday() as usize)
}

/// Month histogram over records with a date, `None` when no record has one
pub fn month_pattern(records: &[IncidentRecord]) -> Option<CalendarPattern> {
    calendar_pattern(records, &MONTHS, |d| d.month0() as usize)
}

/// Earliest and latest parseable date in the batch
pub fn date_range(records: &[IncidentRecord]) -> Option<(NaiveDate, NaiveDate)> {
    let mut dates = records.iter().filter_map(|r| r.date);
    let first = dates.next()?;
    Some(dates.fold((first, first), |(min, max), d| (min.min(d), max.max(d))))
}

fn calendar_pattern<const N: usize>(
    records: &[IncidentRecord],
    names: &[&str; N],
    bucket_of: impl Fn(NaiveDate) -> usize,
) -> Option<CalendarPattern> {
    let mut counts = [0u64; N];
    let mut dated = 0u64;
    for date in records.iter().filter_map(|r| r.date) {
        counts[bucket_of(date)] += 1;
        dated += 1;
    }

    if dated == 0 {
        return None;
    }

    let (busiest, busiest_count) = peak(&counts);
    Some(CalendarPattern {
        counts: names
            .iter()
            .zip(counts.iter())
            .map(|(name, count)| (name.to_string(), *count))
            .collect(),
        busiest: names[busiest].to_string(),
        busiest_count,
        dated_records: dated,
    })
}

/// Index and value of the maximum bucket; the first maximum wins
fn peak(counts: &[u64]) -> (usize, u64) {
    counts
        .iter()
        .enumerate()
        .fold((0, 0), |best, (i, &c)| if c > best.1 { (i, c) } else { best })
}
