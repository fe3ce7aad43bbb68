use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_utils::clinic_time::ClinicClock;

use crate::error::{join_ids, ScheduleError};
use crate::models::{
    CreateScheduleRequest, Room, Schedule, ScheduleGenerationSummary, ScheduleListQuery,
    ScheduleUpdateSummary, ShiftConfigEntry, Slot, SlotDayKey, SlotListQuery, SlotStatus,
    UpdateScheduleRequest,
};
use crate::services::holiday::HolidayResolver;
use crate::services::reference_cache::ReferenceCache;
use crate::services::slot_generator::{validate_duration, GenerationPlan, SlotGenerator, SlotOwner};
use crate::store::{ScheduleFilter, ScheduleStore, SlotFilter};

pub struct ScheduleService {
    store: Arc<dyn ScheduleStore>,
    cache: Arc<ReferenceCache>,
    clock: ClinicClock,
    generator: SlotGenerator,
    resolver: HolidayResolver,
}

impl ScheduleService {
    pub fn new(store: Arc<dyn ScheduleStore>, cache: Arc<ReferenceCache>, clock: ClinicClock) -> Self {
        Self {
            store,
            cache,
            clock,
            generator: SlotGenerator::new(clock),
            resolver: HolidayResolver::new(clock),
        }
    }

    /// Create a room's schedule for one month and generate its slots.
    pub async fn create_schedule(
        &self,
        request: CreateScheduleRequest,
        created_by: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ScheduleGenerationSummary, ScheduleError> {
        debug!("Creating schedule for room {} {}/{}", request.room_id, request.month, request.year);

        let (first_day, last_day) = self.clock.month_bounds(request.month, request.year)?;
        let today = self.clock.today(now);
        if last_day < today {
            return Err(ScheduleError::Validation(format!(
                "Cannot create a schedule for {}/{} because that month has already elapsed",
                request.month, request.year
            )));
        }

        let shift_ids = dedupe(&request.shift_ids);
        if shift_ids.is_empty() {
            return Err(ScheduleError::Validation("At least one shift is required".to_string()));
        }

        let room = self.active_room(request.room_id).await?;
        let targets = generation_targets(&room)?;

        let mut shift_config = BTreeMap::new();
        for shift_id in &shift_ids {
            let shift = self.cache.find_shift(*shift_id).await?;
            if !shift.is_active {
                return Err(ScheduleError::Validation(format!("Shift '{}' is inactive", shift.name)));
            }
            validate_duration(request.slot_duration, &shift.window()?)?;
            shift_config.insert(shift.id, ShiftConfigEntry::from_shift(&shift));
        }

        let existing = self
            .store
            .find_schedules(&ScheduleFilter {
                room_id: Some(room.id),
                month: Some(request.month),
                year: Some(request.year),
            })
            .await?;
        if !existing.is_empty() {
            return Err(ScheduleError::Conflict(format!(
                "Room '{}' already has a schedule for {}/{}",
                room.name, request.month, request.year
            )));
        }

        let holiday_config = self.cache.holiday_config().await?;
        let holiday_snapshot = self.resolver.snapshot(&holiday_config, first_day, last_day)?;

        let mut schedule = Schedule {
            id: Uuid::new_v4(),
            room_id: room.id,
            month: request.month,
            year: request.year,
            start_date: first_day,
            end_date: last_day,
            slot_duration: request.slot_duration,
            holiday_snapshot,
            shift_config,
            sub_room_ids: targets.iter().flatten().copied().collect(),
            is_active: true,
            created_by,
            created_at: now,
            updated_at: now,
        };

        // Plan everything before the first write so bad input leaves nothing behind.
        let generate_from = first_day.max(today);
        let mut plans = Vec::new();
        for entry in schedule.shift_config.values() {
            let window = entry.window()?;
            for sub_room_id in &targets {
                plans.push(self.generator.plan(
                    owner(&schedule, *sub_room_id),
                    &window,
                    schedule.slot_duration,
                    &schedule.holiday_snapshot,
                    generate_from,
                    last_day,
                    now,
                )?);
            }
        }

        self.store.insert_schedule(&schedule).await?;
        let slots_created = self.write_plans(plans.iter()).await?;

        for entry in schedule.shift_config.values_mut() {
            entry.is_generated = true;
        }
        let schedule = self.store.update_schedule(&schedule).await?;

        let days_off = days_off_in(&schedule, generate_from);
        info!("Schedule {} created with {} slots", schedule.id, slots_created);

        Ok(ScheduleGenerationSummary {
            schedule,
            slots_created,
            days_off,
        })
    }

    /// Change slot duration and/or add shifts. Days whose slots are untouched are
    /// regenerated; a day with any held, staffed or started slot keeps its slots.
    pub async fn update_schedule(
        &self,
        schedule_id: Uuid,
        request: UpdateScheduleRequest,
        now: DateTime<Utc>,
    ) -> Result<ScheduleUpdateSummary, ScheduleError> {
        let mut schedule = self.get_schedule(schedule_id).await?;
        let today = self.clock.today(now);
        let generate_from = schedule.start_date.max(today);
        if generate_from > schedule.end_date {
            return Err(ScheduleError::Validation(format!(
                "Schedule {}/{} has already elapsed",
                schedule.month, schedule.year
            )));
        }

        let duration_changed = matches!(request.slot_duration, Some(d) if d != schedule.slot_duration);
        let new_duration = request.slot_duration.unwrap_or(schedule.slot_duration);

        let mut added = Vec::new();
        for shift_id in dedupe(request.shift_ids.as_deref().unwrap_or_default()) {
            if schedule.shift_config.contains_key(&shift_id) {
                continue;
            }
            let shift = self.cache.find_shift(shift_id).await?;
            if !shift.is_active {
                return Err(ScheduleError::Validation(format!("Shift '{}' is inactive", shift.name)));
            }
            added.push(ShiftConfigEntry::from_shift(&shift));
        }

        for entry in schedule.shift_config.values().chain(added.iter()) {
            validate_duration(new_duration, &entry.window()?)?;
        }

        let existing = self
            .store
            .find_slots(&SlotFilter {
                schedule_id: Some(schedule.id),
                ..SlotFilter::default()
            })
            .await?;
        let held_days: HashSet<SlotDayKey> = existing
            .iter()
            .filter(|s| is_held(s, now))
            .map(Slot::day_key)
            .collect();

        let mut plans = Vec::new();
        let mut days_preserved = Vec::new();

        let regenerate: Vec<&ShiftConfigEntry> = if duration_changed {
            schedule.shift_config.values().filter(|e| e.is_generated).collect()
        } else {
            Vec::new()
        };
        for entry in regenerate.into_iter().chain(added.iter()) {
            let window = entry.window()?;
            for sub_room_id in schedule.slot_targets() {
                let mut plan = self.generator.plan(
                    owner(&schedule, sub_room_id),
                    &window,
                    new_duration,
                    &schedule.holiday_snapshot,
                    generate_from,
                    schedule.end_date,
                    now,
                )?;
                plan.days.retain(|day| {
                    let keep = !held_days.contains(&day.key);
                    if !keep {
                        days_preserved.push(day.key.date);
                    }
                    keep
                });
                plans.push(plan);
            }
        }

        let slots_regenerated = self.write_plans(plans.iter()).await?;

        for mut entry in added {
            entry.is_generated = true;
            schedule.shift_config.insert(entry.shift_id, entry);
        }
        schedule.slot_duration = new_duration;
        schedule.updated_at = now;
        let schedule = self.store.update_schedule(&schedule).await?;

        days_preserved.sort();
        days_preserved.dedup();
        if !days_preserved.is_empty() {
            warn!(
                "Schedule {} kept existing slots on days in use: {}",
                schedule.id,
                join_ids(&days_preserved)
            );
        }
        info!("Schedule {} updated, {} slots regenerated", schedule.id, slots_regenerated);

        Ok(ScheduleUpdateSummary {
            schedule,
            slots_regenerated,
            days_preserved,
        })
    }

    /// Flip a schedule's active flag and carry it to every slot it owns.
    pub async fn toggle_schedule(&self, schedule_id: Uuid, now: DateTime<Utc>) -> Result<Schedule, ScheduleError> {
        let mut schedule = self.get_schedule(schedule_id).await?;
        schedule.is_active = !schedule.is_active;
        schedule.updated_at = now;

        let schedule = self.store.update_schedule(&schedule).await?;
        let touched = self
            .store
            .set_schedule_slots_active(schedule.id, schedule.is_active)
            .await?;

        info!(
            "Schedule {} is now {} ({} slots updated)",
            schedule.id,
            if schedule.is_active { "active" } else { "inactive" },
            touched
        );
        Ok(schedule)
    }

    /// Generate slots for a subroom added to the room after the schedule was created.
    pub async fn generate_sub_room_slots(
        &self,
        schedule_id: Uuid,
        sub_room_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ScheduleGenerationSummary, ScheduleError> {
        let mut schedule = self.get_schedule(schedule_id).await?;
        let room = self.cache.find_room(schedule.room_id).await?;

        let sub_room = room.sub_room(sub_room_id).ok_or_else(|| {
            ScheduleError::Validation(format!(
                "Subroom {} does not belong to room '{}'. Valid subrooms: {}",
                sub_room_id,
                room.name,
                describe_sub_rooms(&room)
            ))
        })?;
        if !sub_room.is_active {
            return Err(ScheduleError::Validation(format!(
                "Subroom '{}' of room '{}' is inactive",
                sub_room.name, room.name
            )));
        }
        if schedule.sub_room_ids.is_empty() {
            return Err(ScheduleError::Conflict(format!(
                "Schedule {} was generated for room '{}' as a whole; create a new schedule to use subroom '{}'",
                schedule.id, room.name, sub_room.name
            )));
        }
        if schedule.sub_room_ids.contains(&sub_room_id) {
            return Err(ScheduleError::Conflict(format!(
                "Subroom '{}' already has slots in schedule {}",
                sub_room.name, schedule.id
            )));
        }

        let generate_from = schedule.start_date.max(self.clock.today(now));
        let mut plans = Vec::new();
        for entry in schedule.shift_config.values().filter(|e| e.is_generated && e.is_active) {
            plans.push(self.generator.plan(
                owner(&schedule, Some(sub_room_id)),
                &entry.window()?,
                schedule.slot_duration,
                &schedule.holiday_snapshot,
                generate_from,
                schedule.end_date,
                now,
            )?);
        }

        let slots_created = self.write_plans(plans.iter()).await?;

        schedule.sub_room_ids.push(sub_room_id);
        schedule.updated_at = now;
        let schedule = self.store.update_schedule(&schedule).await?;
        info!("Generated {} slots for subroom {} in schedule {}", slots_created, sub_room_id, schedule.id);

        let days_off = days_off_in(&schedule, generate_from);
        Ok(ScheduleGenerationSummary {
            schedule,
            slots_created,
            days_off,
        })
    }

    pub async fn get_schedule(&self, schedule_id: Uuid) -> Result<Schedule, ScheduleError> {
        self.store
            .get_schedule(schedule_id)
            .await?
            .ok_or_else(|| ScheduleError::not_found("Schedule", schedule_id))
    }

    pub async fn list_schedules(&self, query: ScheduleListQuery) -> Result<Vec<Schedule>, ScheduleError> {
        self.store
            .find_schedules(&ScheduleFilter {
                room_id: query.room_id,
                month: query.month,
                year: query.year,
            })
            .await
    }

    pub async fn list_slots(&self, query: SlotListQuery) -> Result<Vec<Slot>, ScheduleError> {
        let room = self.cache.find_room(query.room_id).await?;
        if let Some(sub_room_id) = query.sub_room_id {
            if room.sub_room(sub_room_id).is_none() {
                return Err(ScheduleError::not_found("Subroom", sub_room_id));
            }
        }
        self.store
            .find_slots(&SlotFilter {
                schedule_id: query.schedule_id,
                room_id: Some(room.id),
                sub_room_id: query.sub_room_id,
                date: query.date,
                ..SlotFilter::default()
            })
            .await
    }

    async fn active_room(&self, room_id: Uuid) -> Result<Room, ScheduleError> {
        let room = self.cache.find_room(room_id).await?;
        if !room.is_active {
            return Err(ScheduleError::Validation(format!("Room '{}' is inactive", room.name)));
        }
        Ok(room)
    }

    async fn write_plans<'a>(
        &self,
        plans: impl Iterator<Item = &'a GenerationPlan>,
    ) -> Result<usize, ScheduleError> {
        let mut written = 0;
        for plan in plans {
            for day in &plan.days {
                written += self.store.replace_day_slots(&day.key, day.slots.clone()).await?.len();
            }
        }
        Ok(written)
    }
}

/// A slot someone has acted on: booked, locked, disabled, staffed, or already started.
fn is_held(slot: &Slot, now: DateTime<Utc>) -> bool {
    slot.status != SlotStatus::Available
        || !slot.dentist_ids.is_empty()
        || !slot.nurse_ids.is_empty()
        || slot.start_time < now
}

fn owner(schedule: &Schedule, sub_room_id: Option<Uuid>) -> SlotOwner {
    SlotOwner {
        schedule_id: schedule.id,
        room_id: schedule.room_id,
        sub_room_id,
    }
}

/// Active subrooms of a room, or the room itself when it has none.
fn generation_targets(room: &Room) -> Result<Vec<Option<Uuid>>, ScheduleError> {
    if !room.has_sub_rooms() {
        return Ok(vec![None]);
    }
    let targets: Vec<Option<Uuid>> = room.active_sub_rooms().map(|s| Some(s.id)).collect();
    if targets.is_empty() {
        return Err(ScheduleError::Validation(format!(
            "Room '{}' has no active subrooms",
            room.name
        )));
    }
    Ok(targets)
}

pub(crate) fn describe_sub_rooms(room: &Room) -> String {
    room.sub_rooms
        .iter()
        .map(|s| format!("{} ({})", s.name, s.id))
        .collect::<Vec<_>>()
        .join(", ")
}

fn dedupe(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

fn days_off_in(schedule: &Schedule, from: NaiveDate) -> Vec<NaiveDate> {
    let mut days: Vec<NaiveDate> = schedule
        .holiday_snapshot
        .computed_days_off
        .iter()
        .copied()
        .filter(|date| *date >= from && *date <= schedule.end_date)
        .collect();
    days.sort();
    days.dedup();
    days
}
