mod common;

use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use async_trait::async_trait;
use uuid::Uuid;

use schedule_cell::models::{
    AssignStaffRequest, CreateScheduleRequest, ReassignStaffRequest, RemoveStaffRequest, Schedule, Slot,
    SlotDayKey, SlotStatus, ToggleSlotsRequest,
};
use schedule_cell::store::{InMemoryScheduleStore, ScheduleFilter, ScheduleStore, SlotFilter, SlotUpdate};
use schedule_cell::ScheduleError;
use shared_models::auth::Role;

use common::{date, now, Fixture};

async fn monday_slots(fx: &Fixture, schedule_id: Uuid) -> Vec<Slot> {
    fx.slots_of(schedule_id)
        .await
        .into_iter()
        .filter(|s| s.date == date(2025, 11, 3))
        .collect()
}

fn ids(slots: &[Slot]) -> Vec<Uuid> {
    slots.iter().map(|s| s.id).collect()
}

fn assign(fx: &Fixture, slot_ids: Vec<Uuid>, dentist_ids: Vec<Uuid>, nurse_ids: Vec<Uuid>) -> AssignStaffRequest {
    AssignStaffRequest {
        slot_ids,
        room_id: fx.exam_room.id,
        sub_room_id: None,
        dentist_ids,
        nurse_ids,
        quarter: None,
        year: None,
    }
}

async fn exam_room_monday(fx: &Fixture) -> Vec<Slot> {
    let summary = fx.create_november(&fx.exam_room, &[&fx.morning], 30).await;
    monday_slots(fx, summary.schedule.id).await
}

#[tokio::test]
async fn assigns_and_merges_staff() {
    let fx = Fixture::new();
    let slots = exam_room_monday(&fx).await;
    let targets = ids(&slots[..3]);
    let service = fx.state.staff_assignments();

    let result = service
        .assign_staff(assign(&fx, targets.clone(), vec![fx.dentist_lan.id], vec![fx.nurse_hoa.id]), now())
        .await
        .unwrap();
    assert_eq!(result.updated, 3);
    assert!(result.slots.iter().all(|s| s.dentist_ids == vec![fx.dentist_lan.id]));

    // Same dentist again plus a second nurse: no duplicates, capacity still respected.
    let result = service
        .assign_staff(
            assign(&fx, targets, vec![fx.dentist_lan.id], vec![fx.nurse_mai.id, fx.nurse_mai.id]),
            now(),
        )
        .await
        .unwrap();
    for slot in &result.slots {
        assert_eq!(slot.dentist_ids, vec![fx.dentist_lan.id]);
        assert_eq!(slot.nurse_ids, vec![fx.nurse_hoa.id, fx.nurse_mai.id]);
    }
}

#[tokio::test]
async fn bad_staff_ids_reject_the_whole_batch() {
    let fx = Fixture::new();
    let slots = exam_room_monday(&fx).await;
    let ghost = Uuid::new_v4();

    let err = fx
        .state
        .staff_assignments()
        .assign_staff(
            assign(
                &fx,
                ids(&slots[..2]),
                vec![ghost, fx.nurse_hoa.id, fx.retired_dentist.id],
                vec![],
            ),
            now(),
        )
        .await
        .unwrap_err();

    let message = err.to_string();
    assert_matches!(err, ScheduleError::Validation(_));
    assert!(message.contains(&ghost.to_string()));
    assert!(message.contains(&fx.nurse_hoa.id.to_string()));
    assert!(message.contains(&fx.retired_dentist.id.to_string()));

    let after = monday_slots(&fx, slots[0].schedule_id).await;
    assert!(after.iter().all(|s| s.dentist_ids.is_empty() && s.nurse_ids.is_empty()));
}

#[tokio::test]
async fn capacity_is_enforced_per_slot() {
    let fx = Fixture::new();
    let slots = exam_room_monday(&fx).await;
    let service = fx.state.staff_assignments();

    service
        .assign_staff(assign(&fx, ids(&slots[..1]), vec![fx.dentist_lan.id], vec![]), now())
        .await
        .unwrap();

    let err = service
        .assign_staff(assign(&fx, ids(&slots[..2]), vec![fx.dentist_minh.id], vec![]), now())
        .await
        .unwrap_err();
    assert_matches!(err, ScheduleError::Validation(ref m) if m.contains("at most 1"));

    // The second slot was valid on its own but must not have been written.
    let after = monday_slots(&fx, slots[0].schedule_id).await;
    assert!(after[1].dentist_ids.is_empty());
}

#[tokio::test]
async fn subroom_rules_follow_the_room() {
    let fx = Fixture::new();
    let exam = exam_room_monday(&fx).await;
    let chair_schedule = fx.create_november(&fx.chair_room, &[&fx.morning], 60).await;
    let chair_slots = monday_slots(&fx, chair_schedule.schedule.id).await;
    let service = fx.state.staff_assignments();

    let mut missing_sub_room = assign(&fx, ids(&chair_slots[..1]), vec![fx.dentist_lan.id], vec![]);
    missing_sub_room.room_id = fx.chair_room.id;
    let err = service.assign_staff(missing_sub_room, now()).await.unwrap_err();
    assert!(err.to_string().contains("Ghế 1"));

    let mut unexpected_sub_room = assign(&fx, ids(&exam[..1]), vec![fx.dentist_lan.id], vec![]);
    unexpected_sub_room.sub_room_id = Some(fx.chair_room.sub_rooms[0].id);
    let err = service.assign_staff(unexpected_sub_room, now()).await.unwrap_err();
    assert!(err.to_string().contains(&fx.exam_room.name));

    let chair_one = chair_slots
        .iter()
        .find(|s| s.sub_room_id == Some(fx.chair_room.sub_rooms[0].id))
        .unwrap();
    let mut ok = assign(&fx, vec![chair_one.id], vec![fx.dentist_lan.id], vec![]);
    ok.room_id = fx.chair_room.id;
    ok.sub_room_id = chair_one.sub_room_id;
    assert_eq!(service.assign_staff(ok, now()).await.unwrap().updated, 1);
}

#[tokio::test]
async fn slots_must_belong_to_the_room_and_exist() {
    let fx = Fixture::new();
    let exam = exam_room_monday(&fx).await;
    let chair_schedule = fx.create_november(&fx.chair_room, &[&fx.morning], 60).await;
    let chair_slots = monday_slots(&fx, chair_schedule.schedule.id).await;
    let service = fx.state.staff_assignments();

    let err = service
        .assign_staff(assign(&fx, vec![exam[0].id, chair_slots[0].id], vec![fx.dentist_lan.id], vec![]), now())
        .await
        .unwrap_err();
    assert_matches!(err, ScheduleError::Validation(ref m) if m.contains(&chair_slots[0].id.to_string()));

    let ghost = Uuid::new_v4();
    let err = service
        .assign_staff(assign(&fx, vec![exam[0].id, ghost], vec![fx.dentist_lan.id], vec![]), now())
        .await
        .unwrap_err();
    assert_matches!(err, ScheduleError::NotFound { entity: "Slot", ref id } if id.contains(&ghost.to_string()));
}

#[tokio::test]
async fn elapsed_quarter_names_the_current_one() {
    let fx = Fixture::new();
    let slots = exam_room_monday(&fx).await;
    let service = fx.state.staff_assignments();

    let mut request = assign(&fx, ids(&slots[..1]), vec![fx.dentist_lan.id], vec![]);
    request.quarter = Some(3);
    request.year = Some(2025);
    let err = service.assign_staff(request.clone(), now()).await.unwrap_err();
    assert!(err.to_string().contains("Q4/2025"));

    request.quarter = Some(1);
    request.year = Some(2026);
    let err = service.assign_staff(request.clone(), now()).await.unwrap_err();
    assert_matches!(err, ScheduleError::Validation(ref m) if m.contains("outside"));

    request.year = None;
    assert_matches!(
        service.assign_staff(request.clone(), now()).await,
        Err(ScheduleError::Validation(_))
    );

    request.quarter = Some(4);
    request.year = Some(2025);
    assert_eq!(service.assign_staff(request, now()).await.unwrap().updated, 1);
}

#[tokio::test]
async fn started_slots_are_rejected() {
    let fx = Fixture::new();
    let summary = fx
        .schedules()
        .create_schedule(
            CreateScheduleRequest {
                room_id: fx.exam_room.id,
                month: 10,
                year: 2025,
                shift_ids: vec![fx.morning.id],
                slot_duration: 60,
            },
            None,
            now(),
        )
        .await
        .unwrap();
    // 08:00 today has already started at 09:00.
    let started = fx.slots_of(summary.schedule.id).await.remove(0);
    assert_eq!(started.date, date(2025, 10, 27));

    let err = fx
        .state
        .staff_assignments()
        .assign_staff(assign(&fx, vec![started.id], vec![fx.dentist_lan.id], vec![]), now())
        .await
        .unwrap_err();
    assert_matches!(err, ScheduleError::Validation(ref m) if m.contains("already started"));
}

/// Books the chosen slot right before the batch is committed, as a patient
/// booking racing the admin would.
struct BookingRaceStore {
    inner: Arc<InMemoryScheduleStore>,
    book_on_commit: Mutex<Option<Uuid>>,
}

#[async_trait]
impl ScheduleStore for BookingRaceStore {
    async fn insert_schedule(&self, schedule: &Schedule) -> Result<Schedule, ScheduleError> {
        self.inner.insert_schedule(schedule).await
    }

    async fn update_schedule(&self, schedule: &Schedule) -> Result<Schedule, ScheduleError> {
        self.inner.update_schedule(schedule).await
    }

    async fn get_schedule(&self, id: Uuid) -> Result<Option<Schedule>, ScheduleError> {
        self.inner.get_schedule(id).await
    }

    async fn find_schedules(&self, filter: &ScheduleFilter) -> Result<Vec<Schedule>, ScheduleError> {
        self.inner.find_schedules(filter).await
    }

    async fn replace_day_slots(&self, key: &SlotDayKey, slots: Vec<Slot>) -> Result<Vec<Slot>, ScheduleError> {
        self.inner.replace_day_slots(key, slots).await
    }

    async fn get_slots(&self, ids: &[Uuid]) -> Result<Vec<Slot>, ScheduleError> {
        self.inner.get_slots(ids).await
    }

    async fn find_slots(&self, filter: &SlotFilter) -> Result<Vec<Slot>, ScheduleError> {
        self.inner.find_slots(filter).await
    }

    async fn commit_slot_updates(&self, updates: Vec<SlotUpdate>) -> Result<Vec<Slot>, ScheduleError> {
        let target = self.book_on_commit.lock().unwrap().take();
        if let Some(id) = target {
            let mut slots = self.inner.get_slots(&[id]).await?;
            for slot in &mut slots {
                slot.status = SlotStatus::Booked;
            }
            self.inner.put_slots(slots).await;
        }
        self.inner.commit_slot_updates(updates).await
    }

    async fn set_schedule_slots_active(&self, schedule_id: Uuid, is_active: bool) -> Result<usize, ScheduleError> {
        self.inner.set_schedule_slots_active(schedule_id, is_active).await
    }
}

#[tokio::test]
async fn booking_between_validation_and_commit_conflicts() {
    let memory = Arc::new(InMemoryScheduleStore::new());
    let race = Arc::new(BookingRaceStore {
        inner: memory.clone(),
        book_on_commit: Mutex::new(None),
    });
    let fx = Fixture::build(memory, race.clone());
    let slots = exam_room_monday(&fx).await;
    *race.book_on_commit.lock().unwrap() = Some(slots[1].id);

    let err = fx
        .state
        .staff_assignments()
        .assign_staff(assign(&fx, ids(&slots[..3]), vec![fx.dentist_lan.id], vec![]), now())
        .await
        .unwrap_err();
    assert_matches!(err, ScheduleError::Conflict(ref m) if m.contains(&slots[1].id.to_string()));

    let after = monday_slots(&fx, slots[0].schedule_id).await;
    assert!(after.iter().all(|s| s.dentist_ids.is_empty()));
}

#[tokio::test]
async fn reassign_swaps_staff_on_every_slot() {
    let fx = Fixture::new();
    let slots = exam_room_monday(&fx).await;
    let targets = ids(&slots[..2]);
    let service = fx.state.staff_assignments();
    service
        .assign_staff(assign(&fx, targets.clone(), vec![fx.dentist_lan.id], vec![]), now())
        .await
        .unwrap();

    let request = |old, new, role| ReassignStaffRequest {
        slot_ids: targets.clone(),
        old_staff_id: old,
        new_staff_id: new,
        role,
    };

    let result = service
        .reassign_staff(request(fx.dentist_lan.id, fx.dentist_minh.id, Role::Dentist), now())
        .await
        .unwrap();
    assert!(result.slots.iter().all(|s| s.dentist_ids == vec![fx.dentist_minh.id]));

    // Lan is no longer on these slots.
    let err = service
        .reassign_staff(request(fx.dentist_lan.id, fx.dentist_minh.id, Role::Dentist), now())
        .await
        .unwrap_err();
    assert_matches!(err, ScheduleError::Validation(_));

    let err = service
        .reassign_staff(request(fx.dentist_minh.id, fx.nurse_hoa.id, Role::Dentist), now())
        .await
        .unwrap_err();
    assert!(err.to_string().contains(&fx.nurse_hoa.id.to_string()));

    let err = service
        .reassign_staff(request(fx.dentist_minh.id, fx.dentist_lan.id, Role::Receptionist), now())
        .await
        .unwrap_err();
    assert_matches!(err, ScheduleError::Validation(_));

    let err = service
        .reassign_staff(request(fx.dentist_minh.id, fx.dentist_minh.id, Role::Dentist), now())
        .await
        .unwrap_err();
    assert_matches!(err, ScheduleError::Validation(_));
}

#[tokio::test]
async fn reassign_refuses_slots_already_holding_the_new_staff() {
    let fx = Fixture::new();
    let summary = fx.create_november(&fx.chair_room, &[&fx.morning], 60).await;
    let chair_one = fx.chair_room.sub_rooms[0].id;
    let slots: Vec<Slot> = monday_slots(&fx, summary.schedule.id)
        .await
        .into_iter()
        .filter(|s| s.sub_room_id == Some(chair_one))
        .collect();
    fx.staff_directly(&slots[..1], &[fx.dentist_lan.id, fx.dentist_minh.id]).await;

    let err = fx
        .state
        .staff_assignments()
        .reassign_staff(
            ReassignStaffRequest {
                slot_ids: ids(&slots[..1]),
                old_staff_id: fx.dentist_lan.id,
                new_staff_id: fx.dentist_minh.id,
                role: Role::Dentist,
            },
            now(),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ScheduleError::Validation(ref m) if m.contains("already assigned"));
}

#[tokio::test]
async fn remove_clears_selected_lists_only() {
    let fx = Fixture::new();
    let slots = exam_room_monday(&fx).await;
    let targets = ids(&slots[..2]);
    let service = fx.state.staff_assignments();
    service
        .assign_staff(assign(&fx, targets.clone(), vec![fx.dentist_lan.id], vec![fx.nurse_hoa.id]), now())
        .await
        .unwrap();

    let nothing = service
        .remove_staff(
            RemoveStaffRequest {
                slot_ids: targets.clone(),
                remove_dentists: false,
                remove_nurses: false,
            },
            now(),
        )
        .await;
    assert_matches!(nothing, Err(ScheduleError::Validation(_)));

    let request = RemoveStaffRequest {
        slot_ids: targets,
        remove_dentists: true,
        remove_nurses: false,
    };
    let result = service.remove_staff(request.clone(), now()).await.unwrap();
    assert_eq!(result.updated, 2);
    assert!(result.slots.iter().all(|s| s.dentist_ids.is_empty() && s.nurse_ids == vec![fx.nurse_hoa.id]));

    let again = service.remove_staff(request, now()).await.unwrap();
    assert_eq!((again.updated, again.unchanged), (0, 2));
}

#[tokio::test]
async fn enabling_and_disabling_is_idempotent() {
    let fx = Fixture::new();
    let slots = exam_room_monday(&fx).await;
    let service = fx.state.staff_assignments();
    let disable = ToggleSlotsRequest {
        slot_ids: ids(&slots[..2]),
        enabled: false,
    };

    let first = service.set_slots_enabled(disable.clone(), now()).await.unwrap();
    assert_eq!(first.updated, 2);
    assert!(first.slots.iter().all(|s| s.status == SlotStatus::Disabled));

    let second = service.set_slots_enabled(disable, now()).await.unwrap();
    assert_eq!((second.updated, second.unchanged), (0, 2));

    let enabled = service
        .set_slots_enabled(
            ToggleSlotsRequest {
                slot_ids: ids(&slots[..2]),
                enabled: true,
            },
            now(),
        )
        .await
        .unwrap();
    assert!(enabled.slots.iter().all(|s| s.status == SlotStatus::Available));
}

#[tokio::test]
async fn booked_slots_cannot_be_toggled() {
    let fx = Fixture::new();
    let slots = exam_room_monday(&fx).await;
    let mut booked = slots[0].clone();
    booked.status = SlotStatus::Booked;
    fx.memory.put_slots(vec![booked.clone()]).await;

    let err = fx
        .state
        .staff_assignments()
        .set_slots_enabled(
            ToggleSlotsRequest {
                slot_ids: vec![booked.id, slots[1].id],
                enabled: false,
            },
            now(),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ScheduleError::Conflict(ref m) if m.contains("booked"));

    let after = monday_slots(&fx, booked.schedule_id).await;
    assert_eq!(after[1].status, SlotStatus::Available);
}
