//! Conversion between ZIP entry timestamps and filesystem times.
//!
//! ZIP entries store MS-DOS date-times: local calendar fields with two-second
//! resolution and no time zone. The pipeline treats them as UTC, which keeps
//! extraction deterministic across machines.

use filetime::FileTime;
use zip::DateTime;

/// Seconds per day.
const SECS_PER_DAY: i64 = 86_400;

/// The timestamp written to every entry by normalization: 1980-01-01 00:00:00,
/// the earliest MS-DOS date-time.
pub fn normalized() -> DateTime {
    DateTime::default()
}

/// Converts an entry timestamp to a [`FileTime`], interpreting the calendar
/// fields as UTC.
pub fn to_file_time(dt: &DateTime) -> FileTime {
    let days = days_from_civil(dt.year() as i64, dt.month() as u32, dt.day() as u32);
    let secs = days * SECS_PER_DAY
        + dt.hour() as i64 * 3600
        + dt.minute() as i64 * 60
        + dt.second() as i64;
    FileTime::from_unix_time(secs, 0)
}

/// Days since 1970-01-01 for a proleptic Gregorian date.
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = if year >= 0 { year } else { year - 399 } / 400;
    let year_of_era = year - era * 400;
    let shifted_month = (month as i64 + 9) % 12;
    let day_of_year = (153 * shifted_month + 2) / 5 + day as i64 - 1;
    let day_of_era = year_of_era * 365 + year_of_era / 4 - year_of_era / 100 + day_of_year;
    era * 146_097 + day_of_era - 719_468
}
