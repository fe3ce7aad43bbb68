use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::auth::Role;
use shared_utils::clinic_time::{ClinicClock, Quarter};

use crate::error::{join_ids, ScheduleError};
use crate::models::{
    AssignStaffRequest, ReassignStaffRequest, RemoveStaffRequest, Room, Slot, SlotStatus,
    StaffBatchResult, StaffMember, ToggleSlotsRequest,
};
use crate::services::reference_cache::ReferenceCache;
use crate::services::schedule::describe_sub_rooms;
use crate::store::{ScheduleStore, SlotUpdate};

/// Validates and applies staffing changes to batches of slots.
///
/// Every check runs before the store is touched; the final commit re-checks
/// slot statuses so a booking that lands in between aborts the whole batch.
pub struct StaffAssignmentService {
    store: Arc<dyn ScheduleStore>,
    cache: Arc<ReferenceCache>,
    clock: ClinicClock,
}

impl StaffAssignmentService {
    pub fn new(store: Arc<dyn ScheduleStore>, cache: Arc<ReferenceCache>, clock: ClinicClock) -> Self {
        Self { store, cache, clock }
    }

    pub async fn assign_staff(
        &self,
        request: AssignStaffRequest,
        now: DateTime<Utc>,
    ) -> Result<StaffBatchResult, ScheduleError> {
        debug!(
            "Assigning {} dentists and {} nurses to {} slots",
            request.dentist_ids.len(),
            request.nurse_ids.len(),
            request.slot_ids.len()
        );

        let dentist_ids = dedupe(&request.dentist_ids);
        let nurse_ids = dedupe(&request.nurse_ids);
        if dentist_ids.is_empty() && nurse_ids.is_empty() {
            return Err(ScheduleError::Validation(
                "At least one dentist or nurse must be provided".to_string(),
            ));
        }

        let room = self.cache.find_room(request.room_id).await?;
        validate_sub_room(&room, request.sub_room_id)?;

        let directory = self.cache.staff().await?;
        let mut problems = role_problems(&directory, &dentist_ids, Role::Dentist);
        problems.extend(role_problems(&directory, &nurse_ids, Role::Nurse));
        if !problems.is_empty() {
            return Err(ScheduleError::Validation(problems.join("; ")));
        }

        let period = match (request.quarter, request.year) {
            (Some(quarter), Some(year)) => Some(self.validate_period(quarter, year, now)?),
            (None, None) => None,
            _ => {
                return Err(ScheduleError::Validation(
                    "Quarter and year must be provided together".to_string(),
                ))
            }
        };

        let slots = self.load_slots(&request.slot_ids).await?;
        self.ensure_not_elapsed(&slots, now)?;

        let misplaced: Vec<Uuid> = slots
            .iter()
            .filter(|s| s.room_id != room.id || s.sub_room_id != request.sub_room_id)
            .map(|s| s.id)
            .collect();
        if !misplaced.is_empty() {
            return Err(ScheduleError::Validation(format!(
                "Slots {} do not belong to room '{}'{}",
                join_ids(&misplaced),
                room.name,
                request.sub_room_id.map(|id| format!(" / subroom {}", id)).unwrap_or_default()
            )));
        }

        if let Some(period) = period {
            let outside: Vec<Uuid> = slots
                .iter()
                .filter(|s| self.clock.quarter_of(s.date) != period)
                .map(|s| s.id)
                .collect();
            if !outside.is_empty() {
                return Err(ScheduleError::Validation(format!(
                    "Slots {} are outside {}",
                    join_ids(&outside),
                    period
                )));
            }
        }

        let updates: Vec<SlotUpdate> = slots
            .iter()
            .map(|slot| {
                let mut next = slot.clone();
                merge_ids(&mut next.dentist_ids, &dentist_ids);
                merge_ids(&mut next.nurse_ids, &nurse_ids);
                next.updated_at = now;
                SlotUpdate {
                    expected_status: slot.status,
                    slot: next,
                }
            })
            .collect();

        check_capacity(&room, &updates)?;
        self.commit(updates, 0).await
    }

    pub async fn reassign_staff(
        &self,
        request: ReassignStaffRequest,
        now: DateTime<Utc>,
    ) -> Result<StaffBatchResult, ScheduleError> {
        debug!(
            "Reassigning {} {} -> {} on {} slots",
            request.role,
            request.old_staff_id,
            request.new_staff_id,
            request.slot_ids.len()
        );

        if !matches!(request.role, Role::Dentist | Role::Nurse) {
            return Err(ScheduleError::Validation(format!(
                "Only dentists and nurses can be reassigned, got '{}'",
                request.role
            )));
        }
        if request.old_staff_id == request.new_staff_id {
            return Err(ScheduleError::Validation(
                "Old and new staff must be different".to_string(),
            ));
        }

        let directory = self.cache.staff().await?;
        let problems = role_problems(&directory, &[request.new_staff_id], request.role);
        if !problems.is_empty() {
            return Err(ScheduleError::Validation(problems.join("; ")));
        }

        let slots = self.load_slots(&request.slot_ids).await?;
        self.ensure_not_elapsed(&slots, now)?;

        let missing_old: Vec<Uuid> = slots
            .iter()
            .filter(|s| !s.staff_for(request.role).contains(&request.old_staff_id))
            .map(|s| s.id)
            .collect();
        if !missing_old.is_empty() {
            return Err(ScheduleError::Validation(format!(
                "Staff {} is not assigned as {} on slots {}",
                request.old_staff_id,
                request.role,
                join_ids(&missing_old)
            )));
        }

        let already_assigned: Vec<Uuid> = slots
            .iter()
            .filter(|s| s.staff_for(request.role).contains(&request.new_staff_id))
            .map(|s| s.id)
            .collect();
        if !already_assigned.is_empty() {
            return Err(ScheduleError::Validation(format!(
                "Staff {} is already assigned on slots {}",
                request.new_staff_id,
                join_ids(&already_assigned)
            )));
        }

        let mut updates = Vec::with_capacity(slots.len());
        for slot in &slots {
            let mut next = slot.clone();
            if let Some(ids) = next.staff_for_mut(request.role) {
                for id in ids.iter_mut().filter(|id| **id == request.old_staff_id) {
                    *id = request.new_staff_id;
                }
            }
            next.updated_at = now;
            updates.push(SlotUpdate {
                expected_status: slot.status,
                slot: next,
            });
        }

        self.commit(updates, 0).await
    }

    pub async fn remove_staff(
        &self,
        request: RemoveStaffRequest,
        now: DateTime<Utc>,
    ) -> Result<StaffBatchResult, ScheduleError> {
        if !request.remove_dentists && !request.remove_nurses {
            return Err(ScheduleError::Validation(
                "Select dentists, nurses or both to remove".to_string(),
            ));
        }

        let slots = self.load_slots(&request.slot_ids).await?;
        self.ensure_not_elapsed(&slots, now)?;

        let mut updates = Vec::new();
        let mut unchanged = 0;
        for slot in &slots {
            let mut next = slot.clone();
            if request.remove_dentists {
                next.dentist_ids.clear();
            }
            if request.remove_nurses {
                next.nurse_ids.clear();
            }
            if next == *slot {
                unchanged += 1;
                continue;
            }
            next.updated_at = now;
            updates.push(SlotUpdate {
                expected_status: slot.status,
                slot: next,
            });
        }

        self.commit(updates, unchanged).await
    }

    /// Move slots between `available` and `disabled`. Slots already in the
    /// target state are left alone.
    pub async fn set_slots_enabled(
        &self,
        request: ToggleSlotsRequest,
        now: DateTime<Utc>,
    ) -> Result<StaffBatchResult, ScheduleError> {
        let (from, to) = if request.enabled {
            (SlotStatus::Disabled, SlotStatus::Available)
        } else {
            (SlotStatus::Available, SlotStatus::Disabled)
        };

        let slots = self.load_slots(&request.slot_ids).await?;

        let blocked: Vec<String> = slots
            .iter()
            .filter(|s| s.status != from && s.status != to)
            .map(|s| format!("{} ({})", s.id, s.status))
            .collect();
        if !blocked.is_empty() {
            return Err(ScheduleError::Conflict(format!(
                "Slots cannot change to {}: {}",
                to,
                blocked.join(", ")
            )));
        }

        let mut updates = Vec::new();
        let mut unchanged = 0;
        for slot in &slots {
            if slot.status == to {
                unchanged += 1;
                continue;
            }
            let mut next = slot.clone();
            next.status = to;
            next.updated_at = now;
            updates.push(SlotUpdate {
                expected_status: from,
                slot: next,
            });
        }

        self.commit(updates, unchanged).await
    }

    fn validate_period(&self, quarter: u32, year: i32, now: DateTime<Utc>) -> Result<Quarter, ScheduleError> {
        if !(1..=4).contains(&quarter) {
            return Err(ScheduleError::Validation(format!(
                "Quarter must be between 1 and 4, got {}",
                quarter
            )));
        }
        let requested = Quarter { year, quarter };
        let current = self.clock.current_quarter(now);
        if requested < current {
            return Err(ScheduleError::Validation(format!(
                "{} has already elapsed; the current quarter is {}",
                requested, current
            )));
        }
        Ok(requested)
    }

    fn ensure_not_elapsed(&self, slots: &[Slot], now: DateTime<Utc>) -> Result<(), ScheduleError> {
        let elapsed: Vec<Uuid> = slots
            .iter()
            .filter(|s| s.start_time <= now)
            .map(|s| s.id)
            .collect();
        if elapsed.is_empty() {
            return Ok(());
        }
        Err(ScheduleError::Validation(format!(
            "Slots {} have already started (clinic date {}, current {})",
            join_ids(&elapsed),
            self.clock.today(now),
            self.clock.current_quarter(now)
        )))
    }

    async fn load_slots(&self, slot_ids: &[Uuid]) -> Result<Vec<Slot>, ScheduleError> {
        let ids = dedupe(slot_ids);
        if ids.is_empty() {
            return Err(ScheduleError::Validation("At least one slot id is required".to_string()));
        }

        let slots = self.store.get_slots(&ids).await?;
        let found: HashSet<Uuid> = slots.iter().map(|s| s.id).collect();
        let missing: Vec<Uuid> = ids.iter().copied().filter(|id| !found.contains(id)).collect();
        if !missing.is_empty() {
            return Err(ScheduleError::not_found("Slot", join_ids(&missing)));
        }
        Ok(slots)
    }

    async fn commit(&self, updates: Vec<SlotUpdate>, unchanged: usize) -> Result<StaffBatchResult, ScheduleError> {
        if updates.is_empty() {
            return Ok(StaffBatchResult {
                updated: 0,
                unchanged,
                slots: Vec::new(),
            });
        }

        let slots = self.store.commit_slot_updates(updates).await.map_err(|e| {
            if let ScheduleError::Conflict(msg) = &e {
                warn!("Staff batch aborted: {}", msg);
            }
            e
        })?;

        info!("Updated {} slots", slots.len());
        Ok(StaffBatchResult {
            updated: slots.len(),
            unchanged,
            slots,
        })
    }
}

fn dedupe(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

fn merge_ids(target: &mut Vec<Uuid>, additions: &[Uuid]) {
    for id in additions {
        if !target.contains(id) {
            target.push(*id);
        }
    }
}

/// Subroom rules: required and owned by the room when it has subrooms, absent otherwise.
pub fn validate_sub_room(room: &Room, sub_room_id: Option<Uuid>) -> Result<(), ScheduleError> {
    match (room.has_sub_rooms(), sub_room_id) {
        (true, None) => Err(ScheduleError::Validation(format!(
            "Room '{}' has subrooms; choose one of: {}",
            room.name,
            describe_sub_rooms(room)
        ))),
        (true, Some(id)) if room.sub_room(id).is_none() => Err(ScheduleError::Validation(format!(
            "Subroom {} does not belong to room '{}'; choose one of: {}",
            id,
            room.name,
            describe_sub_rooms(room)
        ))),
        (false, Some(id)) => Err(ScheduleError::Validation(format!(
            "Room '{}' has no subrooms, but subroom {} was given",
            room.name, id
        ))),
        _ => Ok(()),
    }
}

/// One message per id that is unknown, inactive, or holds a different role.
pub fn role_problems(directory: &[StaffMember], ids: &[Uuid], role: Role) -> Vec<String> {
    ids.iter()
        .filter_map(|id| match directory.iter().find(|s| s.id == *id) {
            None => Some(format!("Staff {} not found", id)),
            Some(member) if member.role != role => Some(format!(
                "Staff {} ({}) is a {}, not a {}",
                id, member.full_name, member.role, role
            )),
            Some(member) if !member.is_active => Some(format!(
                "Staff {} ({}) is inactive",
                id, member.full_name
            )),
            Some(_) => None,
        })
        .collect()
}

fn check_capacity(room: &Room, updates: &[SlotUpdate]) -> Result<(), ScheduleError> {
    let mut problems = Vec::new();
    for role in [Role::Dentist, Role::Nurse] {
        let max = room.max_for(role) as usize;
        let over: Vec<Uuid> = updates
            .iter()
            .filter(|u| u.slot.staff_for(role).len() > max)
            .map(|u| u.slot.id)
            .collect();
        if !over.is_empty() {
            problems.push(format!(
                "Room '{}' allows at most {} {}(s) per slot; exceeded on slots {}",
                room.name,
                max,
                role,
                join_ids(&over)
            ));
        }
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(ScheduleError::Validation(problems.join("; ")))
    }
}
