use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::Role;
use shared_utils::clinic_time::ClinicClock;

use crate::error::ScheduleError;
use crate::models::{
    DentistFutureDetails, DentistNearestSlot, FutureDetailsQuery, NearestSlotQuery, ShiftSlots,
    Slot, SlotStatus, StaffMember, WorkingDate, WorkingDatesQuery,
};
use crate::services::reference_cache::ReferenceCache;
use crate::store::{ScheduleStore, SlotFilter};

/// The span of start times a patient may book at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingWindow {
    pub threshold: DateTime<Utc>,
    pub max_date: DateTime<Utc>,
}

impl BookingWindow {
    pub fn at(now: DateTime<Utc>, buffer_minutes: i64, max_booking_days: i64) -> Self {
        Self {
            threshold: now + Duration::minutes(buffer_minutes),
            max_date: now + Duration::days(max_booking_days),
        }
    }

    pub fn admits(&self, slot: &Slot) -> bool {
        slot.status == SlotStatus::Available
            && slot.is_active
            && !slot.dentist_ids.is_empty()
            && self.threshold <= slot.start_time
            && slot.start_time <= self.max_date
    }

    /// Store-side prefilter. `admits` still has the final say.
    pub fn slot_filter(&self) -> SlotFilter {
        SlotFilter {
            status: Some(SlotStatus::Available),
            is_active: Some(true),
            start_from: Some(self.threshold),
            start_to: Some(self.max_date),
            ..SlotFilter::default()
        }
    }
}

/// Patient-facing availability. All three queries go through `bookable_slots`.
pub struct AvailabilityService {
    store: Arc<dyn ScheduleStore>,
    cache: Arc<ReferenceCache>,
    clock: ClinicClock,
    buffer_minutes: i64,
    max_booking_days: i64,
}

impl AvailabilityService {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        cache: Arc<ReferenceCache>,
        clock: ClinicClock,
        config: &AppConfig,
    ) -> Self {
        Self {
            store,
            cache,
            clock,
            buffer_minutes: config.booking_buffer_minutes,
            max_booking_days: config.max_booking_days,
        }
    }

    pub fn window(&self, now: DateTime<Utc>) -> BookingWindow {
        BookingWindow::at(now, self.buffer_minutes, self.max_booking_days)
    }

    /// Earliest bookable slot per active dentist, sorted by that slot's start.
    pub async fn nearest_available_slots(
        &self,
        query: NearestSlotQuery,
        now: DateTime<Utc>,
    ) -> Result<Vec<DentistNearestSlot>, ScheduleError> {
        let slots = self
            .bookable_slots(self.window(now), None, query.service_id, query.date)
            .await?;
        let directory = self.cache.staff().await?;

        let mut seen = HashSet::new();
        let mut nearest = Vec::new();
        for slot in slots {
            for dentist_id in &slot.dentist_ids {
                if seen.contains(dentist_id) {
                    continue;
                }
                let Some(dentist) = active_dentist(&directory, *dentist_id) else {
                    continue;
                };
                seen.insert(*dentist_id);
                nearest.push(DentistNearestSlot {
                    dentist_id: dentist.id,
                    dentist_name: dentist.full_name.clone(),
                    slot: slot.clone(),
                });
            }
        }

        nearest.sort_by(|a, b| {
            a.slot
                .start_time
                .cmp(&b.slot.start_time)
                .then_with(|| a.dentist_name.cmp(&b.dentist_name))
        });
        debug!("Found nearest slots for {} dentists", nearest.len());
        Ok(nearest)
    }

    /// Clinic-local dates on which the dentist has bookable slots, optionally within `from..=to`.
    pub async fn working_dates(
        &self,
        dentist_id: Uuid,
        query: WorkingDatesQuery,
        now: DateTime<Utc>,
    ) -> Result<Vec<WorkingDate>, ScheduleError> {
        if let (Some(from), Some(to)) = (query.from, query.to) {
            if from > to {
                return Err(ScheduleError::Validation(format!(
                    "Date range is inverted: from {} is after to {}",
                    from, to
                )));
            }
        }
        self.dentist(dentist_id).await?;
        let mut slots = self
            .bookable_slots(self.window(now), Some(dentist_id), query.service_id, None)
            .await?;
        slots.retain(|s| {
            let date = self.clock.local_date(s.start_time);
            query.from.map_or(true, |from| date >= from) && query.to.map_or(true, |to| date <= to)
        });

        let mut dates: BTreeMap<NaiveDate, WorkingDate> = BTreeMap::new();
        for slot in slots {
            let date = self.clock.local_date(slot.start_time);
            dates
                .entry(date)
                .and_modify(|d| {
                    d.slot_count += 1;
                    d.first_slot_start = d.first_slot_start.min(slot.start_time);
                })
                .or_insert(WorkingDate {
                    date,
                    slot_count: 1,
                    first_slot_start: slot.start_time,
                });
        }
        Ok(dates.into_values().collect())
    }

    /// Bookable slots of one dentist grouped by shift, groups ordered by their first slot.
    pub async fn dentist_future_slots(
        &self,
        dentist_id: Uuid,
        query: FutureDetailsQuery,
        now: DateTime<Utc>,
    ) -> Result<DentistFutureDetails, ScheduleError> {
        let dentist = self.dentist(dentist_id).await?;
        let slots = self
            .bookable_slots(self.window(now), Some(dentist_id), query.service_id, query.date)
            .await?;
        let shifts = self.cache.shifts().await?;

        let total_slots = slots.len();
        let mut groups: Vec<ShiftSlots> = Vec::new();
        for slot in slots {
            match groups.iter_mut().find(|g| g.shift_id == slot.shift_id) {
                Some(group) => group.slots.push(slot),
                None => {
                    let shift_name = shifts
                        .iter()
                        .find(|s| s.id == slot.shift_id)
                        .map(|s| s.name.clone())
                        .unwrap_or_else(|| slot.shift_id.to_string());
                    groups.push(ShiftSlots {
                        shift_id: slot.shift_id,
                        shift_name,
                        slots: vec![slot],
                    });
                }
            }
        }

        Ok(DentistFutureDetails {
            dentist_id: dentist.id,
            dentist_name: dentist.full_name,
            total_slots,
            shifts: groups,
        })
    }

    /// Slots inside `window` that pass `BookingWindow::admits`, ordered by start.
    pub async fn bookable_slots(
        &self,
        window: BookingWindow,
        dentist_id: Option<Uuid>,
        service_id: Option<Uuid>,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Slot>, ScheduleError> {
        let mut filter = window.slot_filter();
        filter.dentist_id = dentist_id;
        filter.date = date;

        if let Some(service_id) = service_id {
            let service = self.cache.find_service(service_id).await?;
            let rooms = self.cache.rooms().await?;
            filter.room_ids = Some(
                rooms
                    .iter()
                    .filter(|r| r.is_active && service.allows(r))
                    .map(|r| r.id)
                    .collect(),
            );
        }

        let mut slots = self.store.find_slots(&filter).await?;
        slots.retain(|s| window.admits(s));
        slots.sort_by_key(|s| s.start_time);
        Ok(slots)
    }

    async fn dentist(&self, dentist_id: Uuid) -> Result<StaffMember, ScheduleError> {
        let directory = self.cache.staff().await?;
        active_dentist(&directory, dentist_id)
            .cloned()
            .ok_or_else(|| ScheduleError::not_found("Dentist", dentist_id))
    }
}

fn active_dentist(directory: &[StaffMember], id: Uuid) -> Option<&StaffMember> {
    directory
        .iter()
        .find(|s| s.id == id && s.role == Role::Dentist && s.is_active)
}
