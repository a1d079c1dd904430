//! Explicit temporal markers in free text.
//!
//! Recognizes ISO dates (`2024-07-28`), US dates (`7/28/2024`), written dates
//! (`July 28, 2024`, `28 July 2024`), months (`July 2024`), quarters
//! (`Q3 2024`) and bare years (`2014`). Each marker covers a period whose
//! width depends on its precision.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use strum::Display;

/// How narrow a marker's period is. Later variants are more specific.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    Year,
    Quarter,
    Month,
    Day,
}

/// A date or period mentioned in text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalMarker {
    /// Matched text.
    pub text: String,
    /// First day of the period.
    pub start: NaiveDate,
    /// Last day of the period.
    pub end: NaiveDate,
    pub precision: Precision,
    /// Byte offset of the match.
    pub offset: usize,
}

impl TemporalMarker {
    /// Sort key placing earlier periods first and, on the same start day,
    /// the more specific marker first.
    pub fn chronological_key(&self) -> (NaiveDate, Reverse<Precision>) {
        (self.start, Reverse(self.precision))
    }

    /// Days between the two periods, zero when they overlap.
    pub fn distance_days(&self, other: &TemporalMarker) -> i64 {
        if self.end < other.start {
            (other.start - self.end).num_days()
        } else if other.end < self.start {
            (self.start - other.end).num_days()
        } else {
            0
        }
    }
}

const MONTH: &str = r"(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?";

type Period = (NaiveDate, NaiveDate, Precision);
type Builder = fn(&Captures<'_>) -> Option<Period>;

// Ordered from most to least specific; a match never overlaps an earlier one.
static PATTERNS: Lazy<Vec<(Regex, Builder)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap(),
            iso_date as Builder,
        ),
        (
            Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap(),
            us_date,
        ),
        (
            Regex::new(&format!(
                r"(?i)\b{MONTH}\s+(\d{{1,2}})(?:st|nd|rd|th)?,?\s+(\d{{4}})\b"
            ))
            .unwrap(),
            month_day_year,
        ),
        (
            Regex::new(&format!(
                r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?{MONTH},?\s+(\d{{4}})\b"
            ))
            .unwrap(),
            day_month_year,
        ),
        (
            Regex::new(&format!(r"(?i)\b{MONTH},?\s+(?:of\s+)?(\d{{4}})\b")).unwrap(),
            month_year,
        ),
        (
            Regex::new(r"(?i)\bQ([1-4])\s*(?:of\s+)?(\d{4})\b").unwrap(),
            quarter_year,
        ),
        (Regex::new(r"\b([12]\d{3})\b").unwrap(), bare_year),
    ]
});

/// Extract every marker in `text`, in order of appearance.
pub fn extract_markers(text: &str) -> Vec<TemporalMarker> {
    let mut found: Vec<TemporalMarker> = Vec::new();
    let mut taken: Vec<(usize, usize)> = Vec::new();

    for (re, build) in PATTERNS.iter() {
        for cap in re.captures_iter(text) {
            let Some(m) = cap.get(0) else { continue };
            let span = (m.start(), m.end());
            if taken.iter().any(|&(s, e)| span.0 < e && s < span.1) {
                continue;
            }
            // Claimed even when invalid so "2024-13-45" does not fall back to a bare year.
            taken.push(span);
            if let Some((start, end, precision)) = build(&cap) {
                found.push(TemporalMarker {
                    text: m.as_str().to_string(),
                    start,
                    end,
                    precision,
                    offset: span.0,
                });
            }
        }
    }

    found.sort_by_key(|m| m.offset);
    found
}

fn iso_date(c: &Captures<'_>) -> Option<Period> {
    day(num(&c[1])?, num(&c[2])?, num(&c[3])?)
}

fn us_date(c: &Captures<'_>) -> Option<Period> {
    day(num(&c[3])?, num(&c[1])?, num(&c[2])?)
}

fn month_day_year(c: &Captures<'_>) -> Option<Period> {
    day(num(&c[3])?, month_number(&c[1])?, num(&c[2])?)
}

fn day_month_year(c: &Captures<'_>) -> Option<Period> {
    day(num(&c[3])?, month_number(&c[2])?, num(&c[1])?)
}

fn month_year(c: &Captures<'_>) -> Option<Period> {
    month(num(&c[2])?, month_number(&c[1])?)
}

fn quarter_year(c: &Captures<'_>) -> Option<Period> {
    quarter(num(&c[2])?, num(&c[1])?)
}

fn bare_year(c: &Captures<'_>) -> Option<Period> {
    year(num(&c[1])?)
}

/// The marker with the earliest period start; on ties the most specific.
pub fn earliest_marker(text: &str) -> Option<TemporalMarker> {
    extract_markers(text)
        .into_iter()
        .min_by_key(TemporalMarker::chronological_key)
}

/// The most specific precision mentioned in `text`.
pub fn finest_precision(text: &str) -> Option<Precision> {
    extract_markers(text).iter().map(|m| m.precision).max()
}

fn num<T: std::str::FromStr>(s: &str) -> Option<T> {
    s.parse().ok()
}

fn month_number(name: &str) -> Option<u32> {
    let lower = name.trim_end_matches('.').to_lowercase();
    let n = match lower.get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(n)
}

fn day(y: i32, m: u32, d: u32) -> Option<Period> {
    let date = NaiveDate::from_ymd_opt(y, m, d)?;
    Some((date, date, Precision::Day))
}

fn month(y: i32, m: u32) -> Option<Period> {
    let start = NaiveDate::from_ymd_opt(y, m, 1)?;
    Some((start, month_end(start)?, Precision::Month))
}

fn quarter(y: i32, q: u32) -> Option<Period> {
    let start = NaiveDate::from_ymd_opt(y, (q - 1) * 3 + 1, 1)?;
    let last_month = NaiveDate::from_ymd_opt(y, q * 3, 1)?;
    Some((start, month_end(last_month)?, Precision::Quarter))
}

fn year(y: i32) -> Option<Period> {
    Some((
        NaiveDate::from_ymd_opt(y, 1, 1)?,
        NaiveDate::from_ymd_opt(y, 12, 31)?,
        Precision::Year,
    ))
}

fn month_end(first: NaiveDate) -> Option<NaiveDate> {
    let (y, m) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)?.pred_opt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_written_date_is_day_precision() {
        let markers = extract_markers("He set the record on July 28, 2024 in Paris.");
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].start, date(2024, 7, 28));
        assert_eq!(markers[0].precision, Precision::Day);
        assert_eq!(markers[0].text, "July 28, 2024");
    }

    #[test]
    fn test_more_specific_patterns_win_over_overlapping_year() {
        let markers = extract_markers("Reported 2024-07-29, revised in Q3 2024 and March 2025.");
        let precisions: Vec<_> = markers.iter().map(|m| m.precision).collect();
        assert_eq!(
            precisions,
            vec![Precision::Day, Precision::Quarter, Precision::Month]
        );
        assert_eq!(markers[1].start, date(2024, 7, 1));
        assert_eq!(markers[1].end, date(2024, 9, 30));
        assert_eq!(markers[2].end, date(2025, 3, 31));
    }

    #[test]
    fn test_us_and_day_month_formats() {
        let markers = extract_markers("Signed 1/15/2024; ratified 3rd of March, 2024.");
        assert_eq!(markers[0].start, date(2024, 1, 15));
        assert_eq!(markers[1].start, date(2024, 3, 3));
    }

    #[test]
    fn test_bare_years_and_earliest() {
        let earliest = earliest_marker("Debuted in Paris in 2014, retired 2024.").unwrap();
        assert_eq!(earliest.start, date(2014, 1, 1));
        assert_eq!(earliest.precision, Precision::Year);
        assert!(earliest_marker("no dates here, only 12 apples").is_none());
    }

    #[test]
    fn test_earliest_prefers_specific_on_same_start() {
        let earliest = earliest_marker("In 2024, specifically 2024-01-01.").unwrap();
        assert_eq!(earliest.precision, Precision::Day);
    }

    #[test]
    fn test_invalid_calendar_dates_are_skipped() {
        assert!(extract_markers("2024-13-45").is_empty());
    }

    #[test]
    fn test_distance_days() {
        let a = earliest_marker("2014").unwrap();
        let b = earliest_marker("2014-06-01").unwrap();
        let c = earliest_marker("January 2016").unwrap();
        assert_eq!(a.distance_days(&b), 0);
        assert_eq!(a.distance_days(&c), 366);
        assert_eq!(finest_precision("Q1 2020 and 2021"), Some(Precision::Quarter));
    }
}
