//! Clinic wall clock.
//!
//! Every conversion between clinic-local wall-clock values and absolute instants
//! lives here. The clinic runs on a fixed UTC offset taken from configuration, so
//! results never depend on the time zone of the host running the service.

use std::fmt;

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Utc, Weekday,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClinicTimeError {
    #[error("UTC offset of {0} minutes is out of range")]
    InvalidOffset(i32),

    #[error("Invalid wall-clock time '{0}', expected HH:MM")]
    InvalidWallTime(String),

    #[error("Invalid day of week {0}, expected 1 (Sunday) to 7 (Saturday)")]
    InvalidDayOfWeek(u8),

    #[error("Invalid month {month}/{year}")]
    InvalidMonth { month: u32, year: i32 },
}

/// Day of week, 1 = Sunday through 7 = Saturday.
///
/// This is the only day-of-week representation used inside the workspace; values
/// crossing an HTTP or storage boundary are validated on deserialisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DayOfWeek(u8);

impl DayOfWeek {
    pub const SUNDAY: DayOfWeek = DayOfWeek(1);
    pub const SATURDAY: DayOfWeek = DayOfWeek(7);

    pub fn new(value: u8) -> Result<Self, ClinicTimeError> {
        if (1..=7).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ClinicTimeError::InvalidDayOfWeek(value))
        }
    }

    pub fn from_weekday(weekday: Weekday) -> Self {
        Self(weekday.num_days_from_sunday() as u8 + 1)
    }

    pub fn number(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for DayOfWeek {
    type Error = ClinicTimeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DayOfWeek> for u8 {
    fn from(day: DayOfWeek) -> Self {
        day.0
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Calendar quarter of the clinic's year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quarter {
    pub year: i32,
    pub quarter: u32,
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{}/{}", self.quarter, self.year)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClinicClock {
    offset: FixedOffset,
}

impl ClinicClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn from_offset_minutes(minutes: i32) -> Result<Self, ClinicTimeError> {
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .map(Self::new)
            .ok_or(ClinicTimeError::InvalidOffset(minutes))
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Absolute instant of a clinic-local wall-clock time on a clinic-local date.
    pub fn to_instant(&self, date: NaiveDate, wall_time: NaiveTime) -> DateTime<Utc> {
        let local = date.and_time(wall_time);
        let offset = Duration::seconds(self.offset.local_minus_utc() as i64);
        (local - offset).and_utc()
    }

    /// Clinic-local calendar date an instant falls on.
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    /// Clinic-local wall-clock time of an instant.
    pub fn local_time(&self, instant: DateTime<Utc>) -> NaiveTime {
        instant.with_timezone(&self.offset).time()
    }

    pub fn local_midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        self.to_instant(date, NaiveTime::MIN)
    }

    pub fn day_of_week(&self, date: NaiveDate) -> DayOfWeek {
        DayOfWeek::from_weekday(date.weekday())
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.local_date(now)
    }

    pub fn quarter_of(&self, date: NaiveDate) -> Quarter {
        Quarter {
            year: date.year(),
            quarter: (date.month() - 1) / 3 + 1,
        }
    }

    pub fn current_quarter(&self, now: DateTime<Utc>) -> Quarter {
        self.quarter_of(self.today(now))
    }

    /// First and last clinic-local dates of a month.
    pub fn month_bounds(&self, month: u32, year: i32) -> Result<(NaiveDate, NaiveDate), ClinicTimeError> {
        let invalid = || ClinicTimeError::InvalidMonth { month, year };
        let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
        let next_first = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(invalid)?;
        let last = next_first.pred_opt().ok_or_else(invalid)?;
        Ok((first, last))
    }
}

/// Parse a shift's `HH:MM` (or `HH:MM:SS`) wall-clock string.
pub fn parse_wall_time(raw: &str) -> Result<NaiveTime, ClinicTimeError> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|_| ClinicTimeError::InvalidWallTime(raw.to_string()))
}

/// Inclusive iterator over calendar days.
pub fn days_in_range(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |day| *day <= end)
}
