pub mod memory;
pub mod supabase;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::ScheduleError;
use crate::models::{
    DentalService, HolidayConfig, Room, Schedule, Shift, Slot, SlotDayKey, SlotStatus, StaffMember,
};

pub use memory::{InMemoryReferenceSource, InMemoryScheduleStore};
pub use supabase::{SupabaseReferenceSource, SupabaseScheduleStore};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleFilter {
    pub room_id: Option<Uuid>,
    pub month: Option<u32>,
    pub year: Option<i32>,
}

impl ScheduleFilter {
    pub fn matches(&self, schedule: &Schedule) -> bool {
        self.room_id.map_or(true, |id| schedule.room_id == id)
            && self.month.map_or(true, |m| schedule.month == m)
            && self.year.map_or(true, |y| schedule.year == y)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotFilter {
    pub schedule_id: Option<Uuid>,
    pub room_id: Option<Uuid>,
    /// Restrict to these rooms; an empty list matches nothing.
    pub room_ids: Option<Vec<Uuid>>,
    pub sub_room_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub dentist_id: Option<Uuid>,
    pub status: Option<SlotStatus>,
    pub is_active: Option<bool>,
    pub start_from: Option<DateTime<Utc>>,
    pub start_to: Option<DateTime<Utc>>,
}

impl SlotFilter {
    pub fn matches(&self, slot: &Slot) -> bool {
        self.schedule_id.map_or(true, |id| slot.schedule_id == id)
            && self.room_id.map_or(true, |id| slot.room_id == id)
            && self.room_ids.as_ref().map_or(true, |ids| ids.contains(&slot.room_id))
            && self.sub_room_id.map_or(true, |id| slot.sub_room_id == Some(id))
            && self.date.map_or(true, |d| slot.date == d)
            && self.dentist_id.map_or(true, |id| slot.dentist_ids.contains(&id))
            && self.status.map_or(true, |s| slot.status == s)
            && self.is_active.map_or(true, |a| slot.is_active == a)
            && self.start_from.map_or(true, |t| slot.start_time >= t)
            && self.start_to.map_or(true, |t| slot.start_time <= t)
    }
}

/// New state for a slot, applied only if its status is still `expected_status`.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotUpdate {
    pub slot: Slot,
    pub expected_status: SlotStatus,
}

/// Persistence for schedules and their slots.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn insert_schedule(&self, schedule: &Schedule) -> Result<Schedule, ScheduleError>;

    async fn update_schedule(&self, schedule: &Schedule) -> Result<Schedule, ScheduleError>;

    async fn get_schedule(&self, id: Uuid) -> Result<Option<Schedule>, ScheduleError>;

    async fn find_schedules(&self, filter: &ScheduleFilter) -> Result<Vec<Schedule>, ScheduleError>;

    /// Replace every slot under `key` with `slots`. Either the whole day is
    /// written or no slot is left under the key.
    async fn replace_day_slots(&self, key: &SlotDayKey, slots: Vec<Slot>) -> Result<Vec<Slot>, ScheduleError>;

    async fn get_slots(&self, ids: &[Uuid]) -> Result<Vec<Slot>, ScheduleError>;

    /// Matching slots ordered by start time.
    async fn find_slots(&self, filter: &SlotFilter) -> Result<Vec<Slot>, ScheduleError>;

    /// Apply all updates or none. Fails with `Conflict` when any slot's status
    /// no longer equals its expected status.
    async fn commit_slot_updates(&self, updates: Vec<SlotUpdate>) -> Result<Vec<Slot>, ScheduleError>;

    async fn set_schedule_slots_active(&self, schedule_id: Uuid, is_active: bool) -> Result<usize, ScheduleError>;
}

/// Directory of reference data owned by other services (rooms, staff, catalog)
/// plus the shift and holiday definitions this service maintains.
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    async fn load_shifts(&self) -> Result<Vec<Shift>, ScheduleError>;

    async fn load_rooms(&self) -> Result<Vec<Room>, ScheduleError>;

    async fn load_staff(&self) -> Result<Vec<StaffMember>, ScheduleError>;

    async fn load_services(&self) -> Result<Vec<DentalService>, ScheduleError>;

    async fn load_holiday_config(&self) -> Result<HolidayConfig, ScheduleError>;

    async fn save_shift(&self, shift: &Shift) -> Result<Shift, ScheduleError>;

    async fn save_holiday_config(&self, config: &HolidayConfig) -> Result<HolidayConfig, ScheduleError>;
}

pub(crate) fn conflict_message(slot_ids: &[Uuid]) -> String {
    format!(
        "Slots changed while the request was being processed: {}",
        crate::error::join_ids(slot_ids)
    )
}
