use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::ScheduleError;
use crate::models::{
    DentalService, HolidayConfig, Room, Schedule, Shift, Slot, SlotDayKey, StaffMember,
};
use crate::store::{
    conflict_message, ReferenceSource, ScheduleFilter, ScheduleStore, SlotFilter, SlotUpdate,
};

#[derive(Default)]
struct StoreData {
    schedules: HashMap<Uuid, Schedule>,
    slots: HashMap<Uuid, Slot>,
}

/// Process-local store used when no database is configured and in tests.
/// A single write lock makes every batch atomic.
#[derive(Default)]
pub struct InMemoryScheduleStore {
    data: RwLock<StoreData>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite slots directly, bypassing status checks. Stands in for the
    /// external booking flow.
    pub async fn put_slots(&self, slots: Vec<Slot>) {
        let mut data = self.data.write().await;
        for slot in slots {
            data.slots.insert(slot.id, slot);
        }
    }

    pub async fn slot_count(&self) -> usize {
        self.data.read().await.slots.len()
    }
}

#[async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    async fn insert_schedule(&self, schedule: &Schedule) -> Result<Schedule, ScheduleError> {
        let mut data = self.data.write().await;
        if data.schedules.contains_key(&schedule.id) {
            return Err(ScheduleError::Conflict(format!(
                "Schedule {} already exists",
                schedule.id
            )));
        }
        data.schedules.insert(schedule.id, schedule.clone());
        Ok(schedule.clone())
    }

    async fn update_schedule(&self, schedule: &Schedule) -> Result<Schedule, ScheduleError> {
        let mut data = self.data.write().await;
        match data.schedules.get_mut(&schedule.id) {
            Some(existing) => {
                *existing = schedule.clone();
                Ok(schedule.clone())
            }
            None => Err(ScheduleError::not_found("Schedule", schedule.id)),
        }
    }

    async fn get_schedule(&self, id: Uuid) -> Result<Option<Schedule>, ScheduleError> {
        Ok(self.data.read().await.schedules.get(&id).cloned())
    }

    async fn find_schedules(&self, filter: &ScheduleFilter) -> Result<Vec<Schedule>, ScheduleError> {
        let data = self.data.read().await;
        let mut schedules: Vec<Schedule> = data
            .schedules
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        schedules.sort_by_key(|s| (s.year, s.month, s.created_at));
        Ok(schedules)
    }

    async fn replace_day_slots(&self, key: &SlotDayKey, slots: Vec<Slot>) -> Result<Vec<Slot>, ScheduleError> {
        if let Some(stray) = slots.iter().find(|s| s.day_key() != *key) {
            return Err(ScheduleError::Validation(format!(
                "Slot {} does not belong to day {}",
                stray.id, key.date
            )));
        }

        let mut data = self.data.write().await;
        let before = data.slots.len();
        data.slots.retain(|_, slot| slot.day_key() != *key);
        debug!("Removed {} slots for {:?}", before - data.slots.len(), key);

        for slot in &slots {
            data.slots.insert(slot.id, slot.clone());
        }
        Ok(slots)
    }

    async fn get_slots(&self, ids: &[Uuid]) -> Result<Vec<Slot>, ScheduleError> {
        let data = self.data.read().await;
        Ok(ids.iter().filter_map(|id| data.slots.get(id).cloned()).collect())
    }

    async fn find_slots(&self, filter: &SlotFilter) -> Result<Vec<Slot>, ScheduleError> {
        let data = self.data.read().await;
        let mut slots: Vec<Slot> = data
            .slots
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        slots.sort_by_key(|s| (s.start_time, s.sub_room_id, s.id));
        Ok(slots)
    }

    async fn commit_slot_updates(&self, updates: Vec<SlotUpdate>) -> Result<Vec<Slot>, ScheduleError> {
        let mut data = self.data.write().await;

        let changed: Vec<Uuid> = updates
            .iter()
            .filter(|u| {
                data.slots
                    .get(&u.slot.id)
                    .map_or(true, |current| current.status != u.expected_status)
            })
            .map(|u| u.slot.id)
            .collect();
        if !changed.is_empty() {
            return Err(ScheduleError::Conflict(conflict_message(&changed)));
        }

        let mut written = Vec::with_capacity(updates.len());
        for update in updates {
            data.slots.insert(update.slot.id, update.slot.clone());
            written.push(update.slot);
        }
        Ok(written)
    }

    async fn set_schedule_slots_active(&self, schedule_id: Uuid, is_active: bool) -> Result<usize, ScheduleError> {
        let mut data = self.data.write().await;
        let now = Utc::now();
        let mut count = 0;
        for slot in data.slots.values_mut().filter(|s| s.schedule_id == schedule_id) {
            slot.is_active = is_active;
            slot.updated_at = now;
            count += 1;
        }
        Ok(count)
    }
}

#[derive(Default)]
struct ReferenceData {
    shifts: Vec<Shift>,
    rooms: Vec<Room>,
    staff: Vec<StaffMember>,
    services: Vec<DentalService>,
    holiday_config: HolidayConfig,
}

/// Reference directory held in memory, seeded by the caller.
#[derive(Default)]
pub struct InMemoryReferenceSource {
    data: RwLock<ReferenceData>,
}

impl InMemoryReferenceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(
        shifts: Vec<Shift>,
        rooms: Vec<Room>,
        staff: Vec<StaffMember>,
        services: Vec<DentalService>,
        holiday_config: HolidayConfig,
    ) -> Self {
        Self {
            data: RwLock::new(ReferenceData {
                shifts,
                rooms,
                staff,
                services,
                holiday_config,
            }),
        }
    }

    pub async fn set_rooms(&self, rooms: Vec<Room>) {
        self.data.write().await.rooms = rooms;
    }

    pub async fn set_staff(&self, staff: Vec<StaffMember>) {
        self.data.write().await.staff = staff;
    }
}

#[async_trait]
impl ReferenceSource for InMemoryReferenceSource {
    async fn load_shifts(&self) -> Result<Vec<Shift>, ScheduleError> {
        Ok(self.data.read().await.shifts.clone())
    }

    async fn load_rooms(&self) -> Result<Vec<Room>, ScheduleError> {
        Ok(self.data.read().await.rooms.clone())
    }

    async fn load_staff(&self) -> Result<Vec<StaffMember>, ScheduleError> {
        Ok(self.data.read().await.staff.clone())
    }

    async fn load_services(&self) -> Result<Vec<DentalService>, ScheduleError> {
        Ok(self.data.read().await.services.clone())
    }

    async fn load_holiday_config(&self) -> Result<HolidayConfig, ScheduleError> {
        Ok(self.data.read().await.holiday_config.clone())
    }

    async fn save_shift(&self, shift: &Shift) -> Result<Shift, ScheduleError> {
        let mut data = self.data.write().await;
        match data.shifts.iter_mut().find(|s| s.id == shift.id) {
            Some(existing) => *existing = shift.clone(),
            None => data.shifts.push(shift.clone()),
        }
        Ok(shift.clone())
    }

    async fn save_holiday_config(&self, config: &HolidayConfig) -> Result<HolidayConfig, ScheduleError> {
        self.data.write().await.holiday_config = config.clone();
        Ok(config.clone())
    }
}
