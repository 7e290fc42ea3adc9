//! Time-of-day arithmetic on 24-hour `"HH:MM"` strings.
//!
//! Every time of day in TurnoLink (schedules, booking start/end, slots) is
//! stored as a canonical `"HH:MM"` string and converted to minutes since
//! midnight for comparison. Ranges are half-open: `[start, end)`.

use std::cmp::Ordering;
use std::iter::{Map, StepBy};
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const MINUTES_PER_HOUR: i64 = 60;
pub const MINUTES_PER_DAY: i64 = 24 * MINUTES_PER_HOUR;

// Hardcoded pattern, always compiles; `None` would make `parse` reject everything
static TIME_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^([01]?[0-9]|2[0-3]):([0-5][0-9])$").ok());

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    #[error("Invalid time format: {0:?} (expected HH:MM)")]
    InvalidFormat(String),

    #[error("Minutes cannot be negative: {0}")]
    NegativeMinutes(i64),

    #[error("Adding {minutes} minutes to {time} results in a negative time")]
    NegativeResult { time: String, minutes: i64 },

    #[error("Slot interval must be positive, got {0}")]
    InvalidInterval(i64),

    #[error("Adding {minutes} minutes to {time} overflows")]
    Overflow { time: String, minutes: i64 },
}

/// Components of a validated time of day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParsedTime {
    pub hours: u32,
    pub minutes: u32,
    pub total_minutes: u32,
}

/// A half-open time range `[start, end)` expressed as `"HH:MM"` strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
}

impl TimeRange {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Length of the range in minutes (negative if `end` precedes `start`)
    pub fn duration_minutes(&self) -> Result<i64, TimeError> {
        difference_in_minutes(&self.start, &self.end)
    }

    pub fn contains(&self, time: &str) -> Result<bool, TimeError> {
        is_time_in_range(time, &self.start, &self.end)
    }

    pub fn overlaps(&self, other: &TimeRange) -> Result<bool, TimeError> {
        do_ranges_overlap(self, other)
    }
}

/// Validates a `"HH:MM"` string and splits it into its components.
///
/// Single-digit hours are accepted (`"9:05"`), minutes always take two digits.
pub fn parse(time: &str) -> Result<ParsedTime, TimeError> {
    let invalid = || TimeError::InvalidFormat(time.to_string());

    let captures = TIME_PATTERN
        .as_ref()
        .and_then(|re| re.captures(time))
        .ok_or_else(invalid)?;

    let hours: u32 = captures[1].parse().map_err(|_| invalid())?;
    let minutes: u32 = captures[2].parse().map_err(|_| invalid())?;

    Ok(ParsedTime {
        hours,
        minutes,
        total_minutes: hours * 60 + minutes,
    })
}

pub fn to_minutes(time: &str) -> Result<i64, TimeError> {
    parse(time).map(|p| i64::from(p.total_minutes))
}

/// Formats minutes since midnight as `"HH:MM"`.
///
/// Totals of a day or more wrap around midnight (`1500` becomes `"01:00"`).
pub fn from_minutes(total_minutes: i64) -> Result<String, TimeError> {
    if total_minutes < 0 {
        return Err(TimeError::NegativeMinutes(total_minutes));
    }

    Ok(format_hhmm(total_minutes % MINUTES_PER_DAY))
}

/// Canonical zero-padded form of a valid time (`"9:05"` -> `"09:05"`)
pub fn format(time: &str) -> Result<String, TimeError> {
    to_minutes(time).map(format_hhmm)
}

fn checked_total(time: &str, minutes: i64) -> Result<i64, TimeError> {
    to_minutes(time)?
        .checked_add(minutes)
        .ok_or_else(|| TimeError::Overflow {
            time: time.to_string(),
            minutes,
        })
}

pub fn calculate_end_time(start: &str, duration_minutes: i64) -> Result<String, TimeError> {
    from_minutes(checked_total(start, duration_minutes)?)
}

pub fn add_minutes(time: &str, minutes: i64) -> Result<String, TimeError> {
    let total = checked_total(time, minutes)?;
    if total < 0 {
        return Err(TimeError::NegativeResult {
            time: time.to_string(),
            minutes,
        });
    }

    from_minutes(total)
}

/// Signed number of minutes from `start` to `end`
pub fn difference_in_minutes(start: &str, end: &str) -> Result<i64, TimeError> {
    Ok(to_minutes(end)? - to_minutes(start)?)
}

pub fn is_time_in_range(time: &str, start: &str, end: &str) -> Result<bool, TimeError> {
    let t = to_minutes(time)?;
    Ok(to_minutes(start)? <= t && t < to_minutes(end)?)
}

/// Touching ranges (`end1 == start2`) do not overlap.
pub fn do_ranges_overlap(first: &TimeRange, second: &TimeRange) -> Result<bool, TimeError> {
    let (start1, end1) = (to_minutes(&first.start)?, to_minutes(&first.end)?);
    let (start2, end2) = (to_minutes(&second.start)?, to_minutes(&second.end)?);

    Ok(start1 < end2 && start2 < end1)
}

pub fn compare(a: &str, b: &str) -> Result<Ordering, TimeError> {
    Ok(to_minutes(a)?.cmp(&to_minutes(b)?))
}

pub fn is_before(a: &str, b: &str) -> Result<bool, TimeError> {
    compare(a, b).map(Ordering::is_lt)
}

pub fn is_after(a: &str, b: &str) -> Result<bool, TimeError> {
    compare(a, b).map(Ordering::is_gt)
}

pub fn is_equal(a: &str, b: &str) -> Result<bool, TimeError> {
    compare(a, b).map(Ordering::is_eq)
}

pub type SlotIter = Map<StepBy<Range<i64>>, fn(i64) -> String>;

/// Slot starts from `start` (inclusive) to `end` (exclusive) every `interval` minutes.
///
/// The value is `Copy`, so the sequence can be walked any number of times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSlots {
    start: i64,
    end: i64,
    interval: i64,
}

impl TimeSlots {
    pub fn iter(&self) -> SlotIter {
        self.minutes().map(format_hhmm as fn(i64) -> String)
    }

    /// Slot starts as minutes since midnight
    pub fn minutes(&self) -> StepBy<Range<i64>> {
        (self.start..self.end).step_by(self.interval as usize)
    }

    pub fn len(&self) -> usize {
        self.minutes().count()
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

impl IntoIterator for TimeSlots {
    type Item = String;
    type IntoIter = SlotIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for &TimeSlots {
    type Item = String;
    type IntoIter = SlotIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub fn generate_time_slots(start: &str, end: &str, interval: i64) -> Result<TimeSlots, TimeError> {
    if interval <= 0 {
        return Err(TimeError::InvalidInterval(interval));
    }

    Ok(TimeSlots {
        start: to_minutes(start)?,
        end: to_minutes(end)?,
        interval,
    })
}

fn format_hhmm(total_minutes: i64) -> String {
    format!(
        "{:02}:{:02}",
        total_minutes / MINUTES_PER_HOUR,
        total_minutes % MINUTES_PER_HOUR
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_times() {
        let parsed = parse("09:30").unwrap();
        assert_eq!(parsed.hours, 9);
        assert_eq!(parsed.minutes, 30);
        assert_eq!(parsed.total_minutes, 570);

        assert_eq!(parse("0:00").unwrap().total_minutes, 0);
        assert_eq!(parse("23:59").unwrap().total_minutes, 1439);
        assert_eq!(parse("7:05").unwrap().total_minutes, 425);
    }

    #[test]
    fn test_parse_rejects_invalid_formats() {
        for input in ["24:00", "9:60", "", "12", "12:5", "1:2:3", "ab:cd", " 09:00", "09:00 ", "-1:00", "123:00"] {
            assert!(
                matches!(parse(input), Err(TimeError::InvalidFormat(_))),
                "expected InvalidFormat for {:?}",
                input
            );
        }
    }

    #[test]
    fn test_round_trip_after_canonicalization() {
        for input in ["9:05", "09:05", "0:00", "23:59", "12:30"] {
            let minutes = to_minutes(input).unwrap();
            assert_eq!(from_minutes(minutes).unwrap(), format(input).unwrap());
        }
        assert_eq!(format("9:05").unwrap(), "09:05");
    }

    #[test]
    fn test_minutes_round_trip_over_whole_day() {
        for m in 0..MINUTES_PER_DAY {
            assert_eq!(to_minutes(&from_minutes(m).unwrap()).unwrap(), m);
        }
    }

    #[test]
    fn test_from_minutes_wraps_past_midnight() {
        assert_eq!(from_minutes(1500).unwrap(), "01:00");
        assert_eq!(from_minutes(1440).unwrap(), "00:00");
    }

    #[test]
    fn test_from_minutes_rejects_negative() {
        assert_eq!(from_minutes(-1), Err(TimeError::NegativeMinutes(-1)));
    }

    #[test]
    fn test_calculate_end_time() {
        assert_eq!(calculate_end_time("09:00", 45).unwrap(), "09:45");
        assert_eq!(calculate_end_time("23:30", 60).unwrap(), "00:30");
        assert!(calculate_end_time("9:75", 10).is_err());
    }

    #[test]
    fn test_add_minutes() {
        assert_eq!(add_minutes("10:00", 90).unwrap(), "11:30");
        assert_eq!(add_minutes("10:00", -60).unwrap(), "09:00");
        assert!(matches!(
            add_minutes("00:30", -31),
            Err(TimeError::NegativeResult { minutes: -31, .. })
        ));
    }

    #[test]
    fn test_huge_offsets_are_errors() {
        assert!(matches!(
            calculate_end_time("00:01", i64::MAX),
            Err(TimeError::Overflow { .. })
        ));
        assert!(matches!(
            add_minutes("23:59", i64::MAX),
            Err(TimeError::Overflow { .. })
        ));
        assert!(matches!(
            add_minutes("00:00", i64::MIN),
            Err(TimeError::NegativeResult { .. })
        ));
    }

    #[test]
    fn test_time_pattern_compiles() {
        assert!(TIME_PATTERN.is_some());
    }

    #[test]
    fn test_difference_in_minutes_is_signed() {
        assert_eq!(difference_in_minutes("09:00", "10:30").unwrap(), 90);
        assert_eq!(difference_in_minutes("10:30", "09:00").unwrap(), -90);
    }

    #[test]
    fn test_is_time_in_range_is_half_open() {
        assert!(is_time_in_range("09:00", "09:00", "10:00").unwrap());
        assert!(is_time_in_range("09:59", "09:00", "10:00").unwrap());
        assert!(!is_time_in_range("10:00", "09:00", "10:00").unwrap());
        assert!(!is_time_in_range("08:59", "09:00", "10:00").unwrap());
    }

    #[test]
    fn test_ranges_overlap() {
        let morning = TimeRange::new("09:00", "10:00");
        assert!(do_ranges_overlap(&morning, &TimeRange::new("09:30", "11:00")).unwrap());
        assert!(!do_ranges_overlap(&morning, &TimeRange::new("10:00", "11:00")).unwrap());
        assert!(morning.overlaps(&TimeRange::new("08:00", "12:00")).unwrap());
        assert!(!morning.overlaps(&TimeRange::new("07:00", "09:00")).unwrap());
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(compare("9:00", "09:00").unwrap(), Ordering::Equal);
        assert!(is_before("08:59", "09:00").unwrap());
        assert!(is_after("13:00", "09:00").unwrap());
        assert!(is_equal("9:00", "09:00").unwrap());
        assert!(compare("09:00", "25:00").is_err());
    }

    #[test]
    fn test_generate_time_slots_excludes_end() {
        let slots: Vec<String> = generate_time_slots("09:00", "10:00", 30).unwrap().iter().collect();
        assert_eq!(slots, vec!["09:00", "09:30"]);
    }

    #[test]
    fn test_generate_time_slots_is_restartable() {
        let slots = generate_time_slots("09:00", "10:30", 20).unwrap();
        let first: Vec<String> = slots.iter().collect();
        let second: Vec<String> = slots.into_iter().collect();
        assert_eq!(first, vec!["09:00", "09:20", "09:40", "10:00", "10:20"]);
        assert_eq!(first, second);
        assert_eq!(slots.len(), 5);
    }

    #[test]
    fn test_generate_time_slots_empty_when_end_not_after_start() {
        let slots = generate_time_slots("10:00", "10:00", 15).unwrap();
        assert!(slots.is_empty());
        assert_eq!(slots.iter().count(), 0);
    }

    #[test]
    fn test_generate_time_slots_rejects_non_positive_interval() {
        assert_eq!(
            generate_time_slots("09:00", "10:00", 0),
            Err(TimeError::InvalidInterval(0))
        );
        assert_eq!(
            generate_time_slots("09:00", "10:00", -15),
            Err(TimeError::InvalidInterval(-15))
        );
    }

    #[test]
    fn test_time_range_duration() {
        assert_eq!(TimeRange::new("09:15", "10:00").duration_minutes().unwrap(), 45);
        assert!(TimeRange::new("09:15", "10:00").contains("09:15").unwrap());
    }
}
