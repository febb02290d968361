//! Fuzzy publication-year window
//!
//! A candidate record matches a publication when each of its date fields falls within
//! one year of the publication year. Unparsable dates fail the window; they never error.

use codecite_common::time::parse_year_lenient;
use serde_json::Value;

/// Outcome of validating one candidate against a target year
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowVerdict {
    Match,
    /// Candidate carries no date field at all
    NoDateFields,
    /// A present date field could not be read as a year
    Unparsable,
    /// A date field parsed to a year outside {target-1, target, target+1}
    OutOfWindow(i32),
}

impl WindowVerdict {
    pub fn is_match(&self) -> bool {
        matches!(self, WindowVerdict::Match)
    }
}

/// True iff `candidate` is present and within one year of `target`
pub fn year_in_window(candidate: Option<i32>, target: i32) -> bool {
    candidate.is_some_and(|year| year.abs_diff(target) <= 1)
}

/// Read a year from a JSON number or a loosely formatted date string
pub fn year_from_value(value: &Value) -> Option<i32> {
    match value {
        Value::Number(number) => {
            if let Some(year) = number.as_i64() {
                return i32::try_from(year).ok();
            }
            number
                .as_f64()
                .filter(|year| year.fract() == 0.0)
                .map(|year| year as i32)
        }
        Value::String(text) => parse_year_lenient(text),
        _ => None,
    }
}

/// Validate every present date field of a candidate against `target_year`.
///
/// JSON `null` counts as absent. All present fields must pass; a candidate with no
/// present field is rejected.
pub fn validate_candidate<'a, I>(date_fields: I, target_year: i32) -> WindowVerdict
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut seen = false;
    for value in date_fields.into_iter().filter(|v| !v.is_null()) {
        seen = true;
        match year_from_value(value) {
            None => return WindowVerdict::Unparsable,
            Some(year) if !year_in_window(Some(year), target_year) => {
                return WindowVerdict::OutOfWindow(year)
            }
            Some(_) => {}
        }
    }

    if seen {
        WindowVerdict::Match
    } else {
        WindowVerdict::NoDateFields
    }
}
