//! Date and timestamp utilities

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Full-date layouts tried before falling back to year-token extraction
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
];

/// Extract a calendar year from a loosely formatted date string.
///
/// Accepts RFC 3339 timestamps, ISO dates, spelled-out dates ("8 December 2019")
/// and partial dates that carry exactly one four-digit year ("Dec 2019", "2019").
/// Returns `None` for empty, unparsable or ambiguous input ("2018-2019").
pub fn parse_year_lenient(text: &str) -> Option<i32> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(timestamp.year());
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date.year());
        }
    }

    let mut years = trimmed
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| token.len() == 4 && token.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|token| token.parse::<i32>().ok());

    let first = years.next()?;
    if years.any(|other| other != first) {
        return None;
    }
    Some(first)
}

/// Whole days from `origin` to `instant`, rounded towards negative infinity.
///
/// An instant 36 hours before the origin is day -2, not day -1.
pub fn floor_days_between(instant: DateTime<Utc>, origin: DateTime<Utc>) -> i64 {
    (instant - origin).num_milliseconds().div_euclid(MILLIS_PER_DAY)
}

/// Midnight UTC of a publication date, used as the zero point of activity series
pub fn pivot_from_date(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Parse an ISO-8601 date column value ("YYYY-MM-DD")
pub fn parse_iso_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_year_iso_and_rfc3339() {
        assert_eq!(parse_year_lenient("2019-12-08"), Some(2019));
        assert_eq!(parse_year_lenient("2019-12-08T10:15:00Z"), Some(2019));
        assert_eq!(parse_year_lenient("2019/06/16"), Some(2019));
    }

    #[test]
    fn test_parse_year_spelled_out_dates() {
        assert_eq!(parse_year_lenient("8 December 2019"), Some(2019));
        assert_eq!(parse_year_lenient("Dec 2019"), Some(2019));
        assert_eq!(parse_year_lenient("Winter 2018"), Some(2018));
        assert_eq!(parse_year_lenient("2017"), Some(2017));
    }

    #[test]
    fn test_parse_year_rejects_garbage() {
        assert_eq!(parse_year_lenient(""), None);
        assert_eq!(parse_year_lenient("   "), None);
        assert_eq!(parse_year_lenient("forthcoming"), None);
        assert_eq!(parse_year_lenient("12/08"), None);
    }

    #[test]
    fn test_parse_year_rejects_ambiguous_ranges() {
        assert_eq!(parse_year_lenient("2018-2019"), None);
        // Same year repeated is not ambiguous
        assert_eq!(parse_year_lenient("2019 (2019 edition)"), Some(2019));
    }

    #[test]
    fn test_floor_days_between_rounds_down() {
        let origin = Utc.with_ymd_and_hms(2019, 12, 8, 0, 0, 0).unwrap();

        let after = Utc.with_ymd_and_hms(2019, 12, 9, 23, 0, 0).unwrap();
        assert_eq!(floor_days_between(after, origin), 1);

        let just_before = Utc.with_ymd_and_hms(2019, 12, 7, 23, 59, 0).unwrap();
        assert_eq!(floor_days_between(just_before, origin), -1);

        let thirty_six_hours_before = Utc.with_ymd_and_hms(2019, 12, 6, 12, 0, 0).unwrap();
        assert_eq!(floor_days_between(thirty_six_hours_before, origin), -2);

        assert_eq!(floor_days_between(origin, origin), 0);
    }

    #[test]
    fn test_pivot_from_date_is_midnight_utc() {
        let date = NaiveDate::from_ymd_opt(2020, 2, 7).unwrap();
        let pivot = pivot_from_date(date);
        assert_eq!(pivot, Utc.with_ymd_and_hms(2020, 2, 7, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_iso_date() {
        assert_eq!(
            parse_iso_date("2018-06-19"),
            NaiveDate::from_ymd_opt(2018, 6, 19)
        );
        assert_eq!(parse_iso_date("June 2018"), None);
    }
}
