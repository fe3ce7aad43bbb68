use chrono::{DateTime, Duration, NaiveDate, Utc};
use uuid::Uuid;

use shared_utils::clinic_time::{days_in_range, ClinicClock};

use crate::error::ScheduleError;
use crate::models::{HolidaySnapshot, ShiftWindow, Slot, SlotDayKey, SlotStatus};
use crate::services::holiday::HolidayResolver;

/// Slots for one generation key, ready to be written as a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct DayPlan {
    pub key: SlotDayKey,
    pub slots: Vec<Slot>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationPlan {
    pub days: Vec<DayPlan>,
    pub days_off: Vec<NaiveDate>,
}

impl GenerationPlan {
    pub fn slot_count(&self) -> usize {
        self.days.iter().map(|d| d.slots.len()).sum()
    }
}

/// Where generated slots belong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotOwner {
    pub schedule_id: Uuid,
    pub room_id: Uuid,
    pub sub_room_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy)]
pub struct SlotGenerator {
    clock: ClinicClock,
    resolver: HolidayResolver,
}

pub fn validate_duration(duration_minutes: i64, window: &ShiftWindow) -> Result<(), ScheduleError> {
    if duration_minutes <= 0 {
        return Err(ScheduleError::Validation(format!(
            "Slot duration must be a positive number of minutes, got {}",
            duration_minutes
        )));
    }
    if duration_minutes > window.length_minutes() {
        return Err(ScheduleError::Validation(format!(
            "Slot duration of {} minutes does not fit in shift '{}' ({} minutes)",
            duration_minutes,
            window.name,
            window.length_minutes()
        )));
    }
    Ok(())
}

impl SlotGenerator {
    pub fn new(clock: ClinicClock) -> Self {
        Self {
            clock,
            resolver: HolidayResolver::new(clock),
        }
    }

    /// Consecutive `[start, start + duration)` windows inside the shift on one date.
    pub fn day_slots(
        &self,
        owner: SlotOwner,
        window: &ShiftWindow,
        duration_minutes: i64,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<Slot>, ScheduleError> {
        validate_duration(duration_minutes, window)?;

        let step = Duration::minutes(duration_minutes);
        let shift_end = self.clock.to_instant(date, window.end);
        let mut current_start = self.clock.to_instant(date, window.start);
        let mut slots = Vec::new();

        while current_start + step <= shift_end {
            let current_end = current_start + step;
            slots.push(Slot {
                id: Uuid::new_v4(),
                schedule_id: owner.schedule_id,
                room_id: owner.room_id,
                sub_room_id: owner.sub_room_id,
                shift_id: window.shift_id,
                date,
                start_time: current_start,
                end_time: current_end,
                dentist_ids: Vec::new(),
                nurse_ids: Vec::new(),
                status: SlotStatus::Available,
                is_active: true,
                created_at: now,
                updated_at: now,
            });
            current_start = current_end;
        }

        Ok(slots)
    }

    /// Plan every non-holiday day of `[start, end]` for one shift and owner.
    /// Slots starting before `now` are left out, and a day with none left is skipped.
    pub fn plan(
        &self,
        owner: SlotOwner,
        window: &ShiftWindow,
        duration_minutes: i64,
        snapshot: &HolidaySnapshot,
        start: NaiveDate,
        end: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<GenerationPlan, ScheduleError> {
        validate_duration(duration_minutes, window)?;

        let mut plan = GenerationPlan::default();
        for date in days_in_range(start, end) {
            if self.resolver.is_day_off(snapshot, date) {
                plan.days_off.push(date);
                continue;
            }
            let mut slots = self.day_slots(owner, window, duration_minutes, date, now)?;
            slots.retain(|slot| slot.start_time >= now);
            if slots.is_empty() {
                continue;
            }
            plan.days.push(DayPlan {
                key: SlotDayKey {
                    schedule_id: owner.schedule_id,
                    shift_id: window.shift_id,
                    date,
                    sub_room_id: owner.sub_room_id,
                },
                slots,
            });
        }
        Ok(plan)
    }
}
