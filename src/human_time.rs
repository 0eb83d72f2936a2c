//! Human-readable numeric timestamps
//!
//! Record timestamps are plain `i64` values whose decimal digits read as a
//! calendar date and time:
//!
//! ```text
//! 2019_06_30__12_34_56_789   =>  2019-06-30 12:34:56.789
//! YYYY MM DD  hh mm ss mmm
//! ```
//!
//! Ordering the numbers orders the moments, which is all the index needs to
//! answer date range queries. No timezone is attached.

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, Timelike};

pub const MILLISECONDS: i64 = 1;
pub const SECONDS: i64 = 1000 * MILLISECONDS;
pub const MINUTES: i64 = 100 * SECONDS;
pub const HOURS: i64 = 100 * MINUTES;
pub const DAYS: i64 = 100 * HOURS;
pub const MONTHS: i64 = 100 * DAYS;
pub const YEARS: i64 = 100 * MONTHS;

/// Smallest representable timestamp
pub const MIN_VALUE: i64 = -999_991_231_235_959_999;
/// Largest representable timestamp
pub const MAX_VALUE: i64 = 999_991_231_235_959_999;

pub const MIN_YEAR: i64 = MIN_VALUE / YEARS;
pub const MAX_YEAR: i64 = MAX_VALUE / YEARS;

pub fn years_of(t: i64) -> i64 {
    t / YEARS
}

pub fn months_of(t: i64) -> i64 {
    (t % YEARS) / MONTHS
}

pub fn days_of(t: i64) -> i64 {
    (t % MONTHS) / DAYS
}

pub fn hours_of(t: i64) -> i64 {
    (t % DAYS) / HOURS
}

pub fn minutes_of(t: i64) -> i64 {
    (t % HOURS) / MINUTES
}

pub fn seconds_of(t: i64) -> i64 {
    (t % MINUTES) / SECONDS
}

pub fn ms_of(t: i64) -> i64 {
    t % SECONDS
}

/// Year, month, day, hour, minute, second, millisecond
pub fn parts_of(t: i64) -> [i64; 7] {
    [
        years_of(t),
        months_of(t),
        days_of(t),
        hours_of(t),
        minutes_of(t),
        seconds_of(t),
        ms_of(t),
    ]
}

pub fn from_parts(parts: [i64; 7]) -> i64 {
    let [y, mo, d, h, mi, s, ms] = parts;
    to_date_time(y, mo, d, h, mi, s, ms)
}

pub fn is_leap_year(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Number of days in `month` (1..=12) of `year`
pub fn days_in_month(year: i64, month: i64) -> i64 {
    match month {
        2 if is_leap_year(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Build a timestamp, clamping every component into its legal range
///
/// The day is clamped to the length of the month, so asking for February 31st
/// yields the last day of February.
pub fn to_date_time(
    year: i64,
    month: i64,
    day: i64,
    hour: i64,
    minute: i64,
    second: i64,
    ms: i64,
) -> i64 {
    let year = year.clamp(MIN_YEAR, MAX_YEAR);
    let month = month.clamp(1, 12);
    let day = day.clamp(1, days_in_month(year, month));

    YEARS * year
        + MONTHS * month
        + DAYS * day
        + HOURS * hour.clamp(0, 23)
        + MINUTES * minute.clamp(0, 59)
        + SECONDS * second.clamp(0, 59)
        + MILLISECONDS * ms.clamp(0, 999)
}

pub fn from_naive(dt: NaiveDateTime) -> i64 {
    to_date_time(
        i64::from(dt.year()),
        i64::from(dt.month()),
        i64::from(dt.day()),
        i64::from(dt.hour()),
        i64::from(dt.minute()),
        i64::from(dt.second()),
        i64::from(dt.nanosecond() / 1_000_000),
    )
}

/// Calendar value of a timestamp, when it names a real moment
pub fn to_naive(t: i64) -> Option<NaiveDateTime> {
    let [y, mo, d, h, mi, s, ms] = parts_of(t);
    NaiveDate::from_ymd_opt(i32::try_from(y).ok()?, mo as u32, d as u32)?.and_hms_milli_opt(
        h as u32,
        mi as u32,
        s as u32,
        ms as u32,
    )
}

/// Milliseconds since the Unix epoch, reading the timestamp as UTC
pub fn to_ms_since_epoch(t: i64) -> Option<i64> {
    to_naive(t).map(|dt| dt.and_utc().timestamp_millis())
}

/// Current local wall-clock time
pub fn now() -> i64 {
    from_naive(Local::now().naive_local())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parts() {
        let t = 2019_04_29_14_03_55_789;
        assert_eq!(years_of(t), 2019);
        assert_eq!(months_of(t), 4);
        assert_eq!(days_of(t), 29);
        assert_eq!(hours_of(t), 14);
        assert_eq!(minutes_of(t), 3);
        assert_eq!(seconds_of(t), 55);
        assert_eq!(ms_of(t), 789);

        assert_eq!(from_parts([2019, 6, 30, 12, 34, 56, 777]), 2019_06_30_12_34_56_777);
        assert_eq!(from_parts(parts_of(t)), t);
    }

    #[test]
    fn test_to_date_time() {
        assert_eq!(to_date_time(2019, 2, 3, 4, 5, 6, 7), 2019_02_03_04_05_06_007);
    }

    #[test]
    fn test_components_are_clamped() {
        assert_eq!(to_date_time(2019, 13, 0, 24, 60, 99, 1000), 2019_12_01_23_59_59_999);
        assert_eq!(to_date_time(2019, 2, 31, 0, 0, 0, 0), 2019_02_28_00_00_00_000);
        assert_eq!(to_date_time(2020, 2, 31, 0, 0, 0, 0), 2020_02_29_00_00_00_000);
        assert_eq!(years_of(to_date_time(1_000_000, 1, 1, 0, 0, 0, 0)), MAX_YEAR);
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2001, 2), 28);
        assert_eq!(days_in_month(2000, 2), 29);
        assert_eq!(days_in_month(1900, 2), 28);
        let expected = [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
        for (month, days) in (1..=12).zip(expected) {
            assert_eq!(days_in_month(2000, month), days, "month {}", month);
        }
    }

    #[test]
    fn test_naive_conversion() {
        let t = 1832_12_24_19_23_55_999;
        let dt = to_naive(t).unwrap();
        assert_eq!(dt.year(), 1832);
        assert_eq!(dt.month(), 12);
        assert_eq!(dt.day(), 24);
        assert_eq!(dt.hour(), 19);
        assert_eq!(from_naive(dt), t);

        assert!(to_naive(2019_00_00_00_00_00_000).is_none());
    }

    #[test]
    fn test_now_round_trips() {
        let t = now();
        assert!(t > 2020_01_01_00_00_00_000);
        assert_eq!(from_naive(to_naive(t).unwrap()), t);
    }

    #[test]
    fn test_since_epoch() {
        assert_eq!(to_ms_since_epoch(1970_01_01_00_00_01_500), Some(1500));
    }
}
