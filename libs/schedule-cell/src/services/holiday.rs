use chrono::NaiveDate;
use tracing::debug;

use shared_utils::clinic_time::{days_in_range, ClinicClock};

use crate::error::ScheduleError;
use crate::models::{HolidayConfig, HolidaySnapshot, NonRecurringHoliday, RecurringHoliday};

/// Resolves holiday rules into concrete clinic-local days off.
#[derive(Debug, Clone, Copy)]
pub struct HolidayResolver {
    clock: ClinicClock,
}

impl HolidayResolver {
    pub fn new(clock: ClinicClock) -> Self {
        Self { clock }
    }

    /// Snapshot of the config for `[start, end]`, stored on a schedule when it is created.
    pub fn snapshot(
        &self,
        config: &HolidayConfig,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<HolidaySnapshot, ScheduleError> {
        if end < start {
            return Err(ScheduleError::Validation(format!(
                "Holiday range end {} is before start {}",
                end, start
            )));
        }

        let computed_days_off: Vec<NaiveDate> = days_in_range(start, end)
            .filter(|day| {
                self.matches_rules(&config.recurring_holidays, &config.non_recurring_holidays, *day)
            })
            .collect();

        debug!("Computed {} days off between {} and {}", computed_days_off.len(), start, end);

        Ok(HolidaySnapshot {
            recurring_holidays: config.recurring_holidays.clone(),
            non_recurring_holidays: config.non_recurring_holidays.clone(),
            computed_days_off,
            range_start: Some(start),
            range_end: Some(end),
        })
    }

    /// Whether `date` is a day off under a stored snapshot.
    ///
    /// The precomputed list answers for dates it was built for. An empty list,
    /// or a date outside the snapshot's range, falls back to the copied rules.
    pub fn is_day_off(&self, snapshot: &HolidaySnapshot, date: NaiveDate) -> bool {
        if snapshot.computed_days_off.contains(&date) {
            return true;
        }

        let covered = match (snapshot.range_start, snapshot.range_end) {
            (Some(start), Some(end)) => start <= date && date <= end,
            _ => true,
        };
        if !snapshot.computed_days_off.is_empty() && covered {
            return false;
        }

        self.matches_rules(
            &snapshot.recurring_holidays,
            &snapshot.non_recurring_holidays,
            date,
        )
    }

    pub fn is_holiday(&self, config: &HolidayConfig, date: NaiveDate) -> bool {
        self.matches_rules(&config.recurring_holidays, &config.non_recurring_holidays, date)
    }

    fn matches_rules(
        &self,
        recurring: &[RecurringHoliday],
        non_recurring: &[NonRecurringHoliday],
        date: NaiveDate,
    ) -> bool {
        let weekday = self.clock.day_of_week(date);
        if recurring.iter().any(|h| h.is_active && h.day_of_week == weekday) {
            return true;
        }

        non_recurring.iter().filter(|h| h.is_active).any(|h| {
            let first = self.clock.local_date(h.start_date);
            let last = self.clock.local_date(h.end_date);
            first <= date && date <= last
        })
    }
}

/// Checks an incoming holiday configuration before it replaces the stored one.
pub fn validate_holiday_config(config: &HolidayConfig) -> Result<(), ScheduleError> {
    for holiday in &config.non_recurring_holidays {
        if holiday.name.trim().is_empty() {
            return Err(ScheduleError::Validation("Holiday name is required".to_string()));
        }
        if holiday.end_date < holiday.start_date {
            return Err(ScheduleError::Validation(format!(
                "Holiday '{}' ends before it starts",
                holiday.name
            )));
        }
    }

    let mut seen = Vec::new();
    for holiday in &config.recurring_holidays {
        if seen.contains(&holiday.day_of_week) {
            return Err(ScheduleError::Validation(format!(
                "Day of week {} is listed more than once",
                holiday.day_of_week
            )));
        }
        seen.push(holiday.day_of_week);
    }
    Ok(())
}
