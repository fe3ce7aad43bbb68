use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::auth::Role;
use shared_utils::clinic_time::{parse_wall_time, DayOfWeek};

use crate::error::ScheduleError;

// ==============================================================================
// REFERENCE DATA
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shift {
    pub id: Uuid,
    pub name: String,
    /// Clinic-local wall clock, `HH:MM`.
    pub start_time: String,
    pub end_time: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shift {
    pub fn window(&self) -> Result<ShiftWindow, ScheduleError> {
        ShiftWindow::parse(self.id, &self.name, &self.start_time, &self.end_time)
    }
}

/// Parsed wall-clock window of a shift.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftWindow {
    pub shift_id: Uuid,
    pub name: String,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl ShiftWindow {
    pub fn parse(shift_id: Uuid, name: &str, start: &str, end: &str) -> Result<Self, ScheduleError> {
        let start_time = parse_wall_time(start)?;
        let end_time = parse_wall_time(end)?;
        if start_time >= end_time {
            return Err(ScheduleError::Validation(format!(
                "Shift '{}' must start before it ends ({} - {})",
                name, start, end
            )));
        }
        Ok(Self {
            shift_id,
            name: name.to_string(),
            start: start_time,
            end: end_time,
        })
    }

    pub fn length_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubRoom {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub name: String,
    pub room_type: String,
    pub is_active: bool,
    #[serde(default)]
    pub sub_rooms: Vec<SubRoom>,
    pub max_dentists: u32,
    pub max_nurses: u32,
}

impl Room {
    pub fn has_sub_rooms(&self) -> bool {
        !self.sub_rooms.is_empty()
    }

    pub fn sub_room(&self, sub_room_id: Uuid) -> Option<&SubRoom> {
        self.sub_rooms.iter().find(|s| s.id == sub_room_id)
    }

    pub fn active_sub_rooms(&self) -> impl Iterator<Item = &SubRoom> {
        self.sub_rooms.iter().filter(|s| s.is_active)
    }

    pub fn max_for(&self, role: Role) -> u32 {
        match role {
            Role::Dentist => self.max_dentists,
            Role::Nurse => self.max_nurses,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: Uuid,
    pub full_name: String,
    pub role: Role,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DentalService {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub allowed_room_types: Vec<String>,
    pub is_active: bool,
}

impl DentalService {
    pub fn allows(&self, room: &Room) -> bool {
        self.allowed_room_types.iter().any(|t| t.eq_ignore_ascii_case(&room.room_type))
    }
}

// ==============================================================================
// HOLIDAYS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringHoliday {
    pub name: String,
    pub day_of_week: DayOfWeek,
    pub is_active: bool,
}

/// A closure spanning `[start_date, end_date]`, both bounds inclusive once
/// normalised to clinic-local dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NonRecurringHoliday {
    pub name: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HolidayConfig {
    #[serde(default)]
    pub recurring_holidays: Vec<RecurringHoliday>,
    #[serde(default)]
    pub non_recurring_holidays: Vec<NonRecurringHoliday>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HolidaySnapshot {
    #[serde(default)]
    pub recurring_holidays: Vec<RecurringHoliday>,
    #[serde(default)]
    pub non_recurring_holidays: Vec<NonRecurringHoliday>,
    #[serde(default)]
    pub computed_days_off: Vec<NaiveDate>,
    /// Dates the computed list was built for; dates outside it are checked against the rules.
    #[serde(default)]
    pub range_start: Option<NaiveDate>,
    #[serde(default)]
    pub range_end: Option<NaiveDate>,
}

// ==============================================================================
// SCHEDULES & SLOTS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftConfigEntry {
    pub shift_id: Uuid,
    pub name: String,
    pub start_time: String,
    pub end_time: String,
    pub is_generated: bool,
    pub is_active: bool,
}

impl ShiftConfigEntry {
    pub fn from_shift(shift: &Shift) -> Self {
        Self {
            shift_id: shift.id,
            name: shift.name.clone(),
            start_time: shift.start_time.clone(),
            end_time: shift.end_time.clone(),
            is_generated: false,
            is_active: true,
        }
    }

    pub fn window(&self) -> Result<ShiftWindow, ScheduleError> {
        ShiftWindow::parse(self.shift_id, &self.name, &self.start_time, &self.end_time)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub room_id: Uuid,
    pub month: u32,
    pub year: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub slot_duration: i64,
    pub holiday_snapshot: HolidaySnapshot,
    #[serde(default)]
    pub shift_config: BTreeMap<Uuid, ShiftConfigEntry>,
    #[serde(default)]
    pub sub_room_ids: Vec<Uuid>,
    pub is_active: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    /// Slot owners: each generated subroom, or the room itself when it has none.
    pub fn slot_targets(&self) -> Vec<Option<Uuid>> {
        if self.sub_room_ids.is_empty() {
            vec![None]
        } else {
            self.sub_room_ids.iter().copied().map(Some).collect()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Available,
    Booked,
    Locked,
    Disabled,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Available => "available",
            SlotStatus::Booked => "booked",
            SlotStatus::Locked => "locked",
            SlotStatus::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub room_id: Uuid,
    pub sub_room_id: Option<Uuid>,
    pub shift_id: Uuid,
    /// Clinic-local calendar date.
    pub date: NaiveDate,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub dentist_ids: Vec<Uuid>,
    #[serde(default)]
    pub nurse_ids: Vec<Uuid>,
    pub status: SlotStatus,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Slot {
    pub fn day_key(&self) -> SlotDayKey {
        SlotDayKey {
            schedule_id: self.schedule_id,
            shift_id: self.shift_id,
            date: self.date,
            sub_room_id: self.sub_room_id,
        }
    }

    pub fn staff_for(&self, role: Role) -> &[Uuid] {
        match role {
            Role::Dentist => &self.dentist_ids,
            Role::Nurse => &self.nurse_ids,
            _ => &[],
        }
    }

    pub fn staff_for_mut(&mut self, role: Role) -> Option<&mut Vec<Uuid>> {
        match role {
            Role::Dentist => Some(&mut self.dentist_ids),
            Role::Nurse => Some(&mut self.nurse_ids),
            _ => None,
        }
    }
}

/// Unit of idempotent slot generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotDayKey {
    pub schedule_id: Uuid,
    pub shift_id: Uuid,
    pub date: NaiveDate,
    pub sub_room_id: Option<Uuid>,
}

// ==============================================================================
// REQUESTS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScheduleRequest {
    pub room_id: Uuid,
    pub month: u32,
    pub year: i32,
    pub shift_ids: Vec<Uuid>,
    pub slot_duration: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateScheduleRequest {
    pub slot_duration: Option<i64>,
    /// Shifts to add to the schedule; existing ones are kept.
    pub shift_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignStaffRequest {
    pub slot_ids: Vec<Uuid>,
    pub room_id: Uuid,
    pub sub_room_id: Option<Uuid>,
    #[serde(default)]
    pub dentist_ids: Vec<Uuid>,
    #[serde(default)]
    pub nurse_ids: Vec<Uuid>,
    pub quarter: Option<u32>,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReassignStaffRequest {
    pub slot_ids: Vec<Uuid>,
    pub old_staff_id: Uuid,
    pub new_staff_id: Uuid,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveStaffRequest {
    pub slot_ids: Vec<Uuid>,
    #[serde(default)]
    pub remove_dentists: bool,
    #[serde(default)]
    pub remove_nurses: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleSlotsRequest {
    pub slot_ids: Vec<Uuid>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateShiftRequest {
    pub name: String,
    pub start_time: String,
    pub end_time: String,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateShiftRequest {
    pub name: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateHolidayConfigRequest {
    #[serde(default)]
    pub recurring_holidays: Vec<RecurringHoliday>,
    #[serde(default)]
    pub non_recurring_holidays: Vec<NonRecurringHoliday>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NearestSlotQuery {
    pub service_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkingDatesQuery {
    pub service_id: Option<Uuid>,
    /// Clinic-local date range, inclusive. Narrows the booking window, never widens it.
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FutureDetailsQuery {
    pub date: Option<NaiveDate>,
    pub service_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleListQuery {
    pub room_id: Option<Uuid>,
    pub month: Option<u32>,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotListQuery {
    pub room_id: Uuid,
    pub sub_room_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub schedule_id: Option<Uuid>,
}

// ==============================================================================
// RESPONSES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleGenerationSummary {
    pub schedule: Schedule,
    pub slots_created: usize,
    pub days_off: Vec<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleUpdateSummary {
    pub schedule: Schedule,
    pub slots_regenerated: usize,
    /// Days left untouched because they already carry bookings.
    pub days_preserved: Vec<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffBatchResult {
    pub updated: usize,
    pub unchanged: usize,
    pub slots: Vec<Slot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DentistNearestSlot {
    pub dentist_id: Uuid,
    pub dentist_name: String,
    pub slot: Slot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingDate {
    pub date: NaiveDate,
    pub slot_count: usize,
    pub first_slot_start: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftSlots {
    pub shift_id: Uuid,
    pub shift_name: String,
    pub slots: Vec<Slot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DentistFutureDetails {
    pub dentist_id: Uuid,
    pub dentist_name: String,
    pub total_slots: usize,
    pub shifts: Vec<ShiftSlots>,
}
