//! Activity aggregation
//!
//! Turns raw, irregularly timed event logs into series anchored at a pivot (usually the
//! publication date). Bucket index of an event is
//! `floor(floor_days(event - pivot) / width)`, so an event 36 hours before the pivot is
//! day -2 and, at width 7, week -1.

use crate::error::{ExportError, Result};
use chrono::{DateTime, Utc};
use codecite_common::time::floor_days_between;
use codecite_common::{ActivityEvent, ActivityLog};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::num::NonZeroU32;

/// Bucket width in whole days, always positive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketWidth(NonZeroU32);

impl BucketWidth {
    pub const DAY: BucketWidth = BucketWidth(NonZeroU32::MIN);

    pub fn new(days: u32) -> Result<Self> {
        NonZeroU32::new(days)
            .map(BucketWidth)
            .ok_or(ExportError::InvalidBucketWidth(days))
    }

    pub fn days(&self) -> i64 {
        i64::from(self.0.get())
    }
}

/// What an event contributes to its bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSelector {
    /// 1 per event
    Count,
    /// The event's size; events without one contribute 0
    Size,
}

impl ValueSelector {
    fn value(&self, event: &ActivityEvent) -> f64 {
        match self {
            ValueSelector::Count => 1.0,
            ValueSelector::Size => event.size.unwrap_or(0) as f64,
        }
    }
}

/// One (index, value) point of a series.
///
/// Serializes as a two-element array, with integral values written as integers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivityBucket {
    pub index: i64,
    pub value: f64,
}

impl Serialize for ActivityBucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if self.value.fract() == 0.0 && self.value.abs() < 9.0e15 {
            (self.index, self.value as i64).serialize(serializer)
        } else {
            (self.index, self.value).serialize(serializer)
        }
    }
}

/// Output of [`aggregate`]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregatedSeries {
    pub series: Vec<ActivityBucket>,
    /// Running totals over `series`, when requested
    pub cumulative: Option<Vec<ActivityBucket>>,
}

/// Bucket events relative to `pivot`.
///
/// Output is sorted by ascending index and independent of input order.
pub fn aggregate(
    events: &[ActivityEvent],
    width: BucketWidth,
    pivot: DateTime<Utc>,
    selector: ValueSelector,
    cumulative: bool,
) -> AggregatedSeries {
    let mut buckets: BTreeMap<i64, f64> = BTreeMap::new();
    for event in events {
        let index = floor_days_between(event.at, pivot).div_euclid(width.days());
        *buckets.entry(index).or_insert(0.0) += selector.value(event);
    }

    let series: Vec<ActivityBucket> = buckets
        .into_iter()
        .map(|(index, value)| ActivityBucket { index, value })
        .collect();

    let cumulative = cumulative.then(|| {
        let mut total = 0.0;
        series
            .iter()
            .map(|bucket| {
                total += bucket.value;
                ActivityBucket {
                    index: bucket.index,
                    value: total,
                }
            })
            .collect()
    });

    AggregatedSeries { series, cumulative }
}

/// Flatten a commit log into timestamped events.
///
/// Weekly entries become one event at the week start sized by net change (additions
/// minus deletions); per-commit events pass through.
pub fn log_events(log: &ActivityLog) -> Vec<ActivityEvent> {
    match log {
        ActivityLog::Weekly(weeks) => weeks
            .iter()
            .map(|week| ActivityEvent::with_size(week.week, week.net()))
            .collect(),
        ActivityLog::Events(events) => events.clone(),
    }
}

/// Unbucketed description of a commit log
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActivitySummary {
    /// Whole days between the earliest and the latest event
    pub active_span_days: Option<i64>,
    /// Mean activity per log entry
    pub mean_activity: Option<f64>,
    /// Activity strictly before the pivot
    pub before_pivot: Option<f64>,
    /// Activity on or after the pivot
    pub after_pivot: Option<f64>,
    /// Net activity per week relative to the pivot
    pub weekly: Option<Vec<ActivityBucket>>,
}

/// Summarize a commit log.
///
/// An absent or empty log gives all-`None`; pivot-relative fields stay `None` without a
/// pivot.
pub fn summarize(log: Option<&ActivityLog>, pivot: Option<DateTime<Utc>>) -> ActivitySummary {
    let events = match log {
        Some(log) if !log.is_empty() => log_events(log),
        _ => return ActivitySummary::default(),
    };

    let (Some(earliest), Some(latest)) = (
        events.iter().map(|e| e.at).min(),
        events.iter().map(|e| e.at).max(),
    ) else {
        return ActivitySummary::default();
    };

    let total: f64 = events.iter().map(|e| ValueSelector::Size.value(e)).sum();
    let mut summary = ActivitySummary {
        active_span_days: Some((latest - earliest).num_days()),
        mean_activity: Some(total / events.len() as f64),
        ..Default::default()
    };

    if let Some(pivot) = pivot {
        let (before, after): (Vec<&ActivityEvent>, Vec<&ActivityEvent>) =
            events.iter().partition(|e| e.at < pivot);
        summary.before_pivot = Some(before.iter().map(|e| ValueSelector::Size.value(e)).sum());
        summary.after_pivot = Some(after.iter().map(|e| ValueSelector::Size.value(e)).sum());

        let week = BucketWidth(NonZeroU32::new(7).unwrap_or(NonZeroU32::MIN));
        summary.weekly = Some(aggregate(&events, week, pivot, ValueSelector::Size, false).series);
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use codecite_common::WeeklyActivity;

    fn pivot() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 12, 8, 0, 0, 0).unwrap()
    }

    fn at_offset_days(days: i64) -> ActivityEvent {
        ActivityEvent::new(pivot() + Duration::days(days))
    }

    fn bucket(index: i64, value: f64) -> ActivityBucket {
        ActivityBucket { index, value }
    }

    #[test]
    fn test_zero_width_rejected() {
        assert!(matches!(BucketWidth::new(0), Err(ExportError::InvalidBucketWidth(0))));
        assert_eq!(BucketWidth::new(7).unwrap().days(), 7);
        assert_eq!(BucketWidth::DAY.days(), 1);
    }

    #[test]
    fn test_weekly_buckets_with_cumulative() {
        let events = vec![at_offset_days(-10), at_offset_days(-3), at_offset_days(5)];
        let out = aggregate(&events, BucketWidth::new(7).unwrap(), pivot(), ValueSelector::Count, true);

        assert_eq!(out.series, vec![bucket(-2, 1.0), bucket(-1, 1.0), bucket(0, 1.0)]);
        assert_eq!(
            out.cumulative,
            Some(vec![bucket(-2, 1.0), bucket(-1, 2.0), bucket(0, 3.0)])
        );
    }

    #[test]
    fn test_sub_day_offsets_floor() {
        let thirty_six_hours_before = ActivityEvent::new(pivot() - Duration::hours(36));
        let one_hour_before = ActivityEvent::new(pivot() - Duration::hours(1));

        let days = aggregate(
            &[thirty_six_hours_before.clone(), one_hour_before.clone()],
            BucketWidth::DAY,
            pivot(),
            ValueSelector::Count,
            false,
        );
        assert_eq!(days.series, vec![bucket(-2, 1.0), bucket(-1, 1.0)]);

        let weeks = aggregate(
            &[thirty_six_hours_before, one_hour_before],
            BucketWidth::new(7).unwrap(),
            pivot(),
            ValueSelector::Count,
            false,
        );
        assert_eq!(weeks.series, vec![bucket(-1, 2.0)]);
    }

    #[test]
    fn test_order_independent() {
        let mut events: Vec<ActivityEvent> = [40, -3, 0, 17, -65, 3, 3]
            .iter()
            .map(|d| ActivityEvent::with_size(pivot() + Duration::days(*d), *d))
            .collect();
        let width = BucketWidth::new(30).unwrap();
        let forward = aggregate(&events, width, pivot(), ValueSelector::Size, true);
        events.reverse();
        events.swap(1, 4);
        let shuffled = aggregate(&events, width, pivot(), ValueSelector::Size, true);
        assert_eq!(forward, shuffled);
    }

    #[test]
    fn test_size_selector_treats_missing_as_zero() {
        let events = vec![
            ActivityEvent::with_size(pivot(), 10),
            ActivityEvent::new(pivot() + Duration::hours(2)),
        ];
        let out = aggregate(&events, BucketWidth::DAY, pivot(), ValueSelector::Size, false);
        assert_eq!(out.series, vec![bucket(0, 10.0)]);
        assert_eq!(out.cumulative, None);
    }

    #[test]
    fn test_empty_events_give_empty_series() {
        let out = aggregate(&[], BucketWidth::DAY, pivot(), ValueSelector::Count, true);
        assert!(out.series.is_empty());
        assert_eq!(out.cumulative, Some(vec![]));
    }

    #[test]
    fn test_bucket_serializes_as_pair() {
        let json = serde_json::to_string(&vec![bucket(-2, 1.0), bucket(0, 2.5)]).unwrap();
        assert_eq!(json, "[[-2,1],[0,2.5]]");
    }

    #[test]
    fn test_summarize_weekly_log() {
        let week = |days: i64, additions: i64, deletions: i64| WeeklyActivity {
            week: pivot() + Duration::days(days),
            additions,
            deletions,
        };
        let log = ActivityLog::Weekly(vec![week(-14, 100, 20), week(-7, 10, 10), week(0, 50, 0)]);

        let summary = summarize(Some(&log), Some(pivot()));
        assert_eq!(summary.active_span_days, Some(14));
        assert_eq!(summary.mean_activity, Some(130.0 / 3.0));
        assert_eq!(summary.before_pivot, Some(80.0));
        assert_eq!(summary.after_pivot, Some(50.0));
        assert_eq!(
            summary.weekly,
            Some(vec![bucket(-2, 80.0), bucket(-1, 0.0), bucket(0, 50.0)])
        );
    }

    #[test]
    fn test_summarize_without_pivot() {
        let log = ActivityLog::Events(vec![
            ActivityEvent::with_size(pivot(), 4),
            ActivityEvent::with_size(pivot() + Duration::days(3), 2),
        ]);
        let summary = summarize(Some(&log), None);
        assert_eq!(summary.active_span_days, Some(3));
        assert_eq!(summary.mean_activity, Some(3.0));
        assert_eq!(summary.before_pivot, None);
        assert_eq!(summary.weekly, None);
    }

    #[test]
    fn test_summarize_absent_empty_and_zero_logs() {
        assert_eq!(summarize(None, Some(pivot())), ActivitySummary::default());
        assert_eq!(
            summarize(Some(&ActivityLog::Events(vec![])), Some(pivot())),
            ActivitySummary::default()
        );

        let zero = ActivityLog::Events(vec![ActivityEvent::with_size(pivot(), 0)]);
        let summary = summarize(Some(&zero), Some(pivot()));
        assert_eq!(summary.mean_activity, Some(0.0));
        assert_eq!(summary.before_pivot, Some(0.0));
        assert_eq!(summary.after_pivot, Some(0.0));
        assert_eq!(summary.active_span_days, Some(0));
    }
}
