mod common;

use assert_matches::assert_matches;
use uuid::Uuid;

use schedule_cell::models::{FutureDetailsQuery, NearestSlotQuery, Slot, SlotStatus, WorkingDatesQuery};
use schedule_cell::ScheduleError;

use common::{date, local, now, Fixture};

struct Clinic {
    fx: Fixture,
    exam_schedule: Uuid,
    lan_exam_slots: Vec<Slot>,
}

/// Lan works the exam room all of Monday 3 Nov and chair 1 on Wednesday 5 Nov.
/// Minh works the exam room on Tuesday 4 Nov.
async fn clinic() -> Clinic {
    let fx = Fixture::new();
    let exam = fx.create_november(&fx.exam_room, &[&fx.morning, &fx.afternoon], 30).await;
    let chair = fx.create_november(&fx.chair_room, &[&fx.morning], 60).await;

    let exam_slots = fx.slots_of(exam.schedule.id).await;
    let lan_exam_slots: Vec<Slot> = exam_slots.iter().filter(|s| s.date == date(2025, 11, 3)).cloned().collect();
    let minh_slots: Vec<Slot> = exam_slots.iter().filter(|s| s.date == date(2025, 11, 4)).cloned().collect();
    let chair_one = fx.chair_room.sub_rooms[0].id;
    let lan_chair_slots: Vec<Slot> = fx
        .slots_of(chair.schedule.id)
        .await
        .into_iter()
        .filter(|s| s.date == date(2025, 11, 5) && s.sub_room_id == Some(chair_one))
        .collect();

    fx.staff_directly(&lan_exam_slots, &[fx.dentist_lan.id]).await;
    fx.staff_directly(&minh_slots, &[fx.dentist_minh.id]).await;
    fx.staff_directly(&lan_chair_slots, &[fx.dentist_lan.id]).await;

    Clinic {
        exam_schedule: exam.schedule.id,
        lan_exam_slots,
        fx,
    }
}

#[tokio::test]
async fn nearest_slot_per_dentist_sorted_by_start() {
    let clinic = clinic().await;
    let fx = &clinic.fx;

    let nearest = fx
        .state
        .availability()
        .nearest_available_slots(NearestSlotQuery::default(), now())
        .await
        .unwrap();

    assert_eq!(nearest.len(), 2);
    assert_eq!(nearest[0].dentist_id, fx.dentist_lan.id);
    assert_eq!(nearest[0].slot.start_time, local(2025, 11, 3, 8, 0));
    assert_eq!(nearest[1].dentist_id, fx.dentist_minh.id);
    assert_eq!(nearest[1].slot.start_time, local(2025, 11, 4, 8, 0));
    assert_eq!(nearest[1].dentist_name, "BS. Minh");
}

#[tokio::test]
async fn service_restricts_to_allowed_room_types() {
    let clinic = clinic().await;
    let fx = &clinic.fx;

    let nearest = fx
        .state
        .availability()
        .nearest_available_slots(
            NearestSlotQuery {
                service_id: Some(fx.implant.id),
                date: None,
            },
            now(),
        )
        .await
        .unwrap();

    assert_eq!(nearest.len(), 1);
    assert_eq!(nearest[0].dentist_id, fx.dentist_lan.id);
    assert_eq!(nearest[0].slot.room_id, fx.chair_room.id);
    assert_eq!(nearest[0].slot.date, date(2025, 11, 5));

    let unknown = fx
        .state
        .availability()
        .nearest_available_slots(
            NearestSlotQuery {
                service_id: Some(Uuid::new_v4()),
                date: None,
            },
            now(),
        )
        .await;
    assert_matches!(unknown, Err(ScheduleError::NotFound { entity: "Service", .. }));
}

#[tokio::test]
async fn date_filter_uses_clinic_dates() {
    let clinic = clinic().await;
    let fx = &clinic.fx;

    let nearest = fx
        .state
        .availability()
        .nearest_available_slots(
            NearestSlotQuery {
                service_id: None,
                date: Some(date(2025, 11, 4)),
            },
            now(),
        )
        .await
        .unwrap();

    assert_eq!(nearest.len(), 1);
    assert_eq!(nearest[0].dentist_id, fx.dentist_minh.id);
}

#[tokio::test]
async fn working_dates_count_bookable_slots() {
    let clinic = clinic().await;
    let fx = &clinic.fx;
    let availability = fx.state.availability();

    let dates = availability
        .working_dates(fx.dentist_lan.id, WorkingDatesQuery::default(), now())
        .await
        .unwrap();
    assert_eq!(dates.len(), 2);
    assert_eq!((dates[0].date, dates[0].slot_count), (date(2025, 11, 3), 16));
    assert_eq!(dates[0].first_slot_start, local(2025, 11, 3, 8, 0));
    assert_eq!((dates[1].date, dates[1].slot_count), (date(2025, 11, 5), 4));

    let cleaning_only = availability
        .working_dates(
            fx.dentist_lan.id,
            WorkingDatesQuery {
                service_id: Some(fx.cleaning.id),
                ..WorkingDatesQuery::default()
            },
            now(),
        )
        .await
        .unwrap();
    assert_eq!(cleaning_only.len(), 1);
    assert_eq!(cleaning_only[0].date, date(2025, 11, 3));
}

#[tokio::test]
async fn working_dates_range_narrows_the_booking_window() {
    let clinic = clinic().await;
    let fx = &clinic.fx;
    let availability = fx.state.availability();

    let range = |from, to| WorkingDatesQuery {
        service_id: None,
        from,
        to,
    };

    let wednesday = availability
        .working_dates(fx.dentist_lan.id, range(Some(date(2025, 11, 4)), Some(date(2025, 11, 5))), now())
        .await
        .unwrap();
    assert_eq!(wednesday.len(), 1);
    assert_eq!((wednesday[0].date, wednesday[0].slot_count), (date(2025, 11, 5), 4));

    let until_monday = availability
        .working_dates(fx.dentist_lan.id, range(None, Some(date(2025, 11, 3))), now())
        .await
        .unwrap();
    assert_eq!(until_monday.len(), 1);
    assert_eq!(until_monday[0].date, date(2025, 11, 3));

    // A range reaching into the past still starts at the booking threshold.
    let at = local(2025, 11, 3, 11, 0);
    let from_october = availability
        .working_dates(fx.dentist_lan.id, range(Some(date(2025, 10, 1)), Some(date(2025, 11, 3))), at)
        .await
        .unwrap();
    assert_eq!(from_october.len(), 1);
    assert_eq!(from_october[0].first_slot_start, local(2025, 11, 3, 11, 30));

    // A range past max booking days is cut off at the window's end.
    let early = local(2025, 10, 5, 7, 0);
    let far = availability
        .working_dates(fx.dentist_lan.id, range(Some(date(2025, 11, 1)), Some(date(2025, 11, 30))), early)
        .await
        .unwrap();
    assert_eq!(far.len(), 1);
    assert_eq!(far[0].date, date(2025, 11, 3));

    let inverted = availability
        .working_dates(fx.dentist_lan.id, range(Some(date(2025, 11, 5)), Some(date(2025, 11, 3))), now())
        .await;
    assert_matches!(inverted, Err(ScheduleError::Validation(_)));
}

#[tokio::test]
async fn future_details_group_by_shift() {
    let clinic = clinic().await;
    let fx = &clinic.fx;

    let details = fx
        .state
        .availability()
        .dentist_future_slots(fx.dentist_lan.id, FutureDetailsQuery::default(), now())
        .await
        .unwrap();

    assert_eq!(details.dentist_name, "BS. Lan");
    assert_eq!(details.total_slots, 20);
    assert_eq!(details.shifts.len(), 2);
    assert_eq!(details.shifts[0].shift_name, "Ca Sáng");
    assert_eq!(details.shifts[0].slots.len(), 12);
    assert_eq!(details.shifts[1].shift_name, "Ca Chiều");
    assert_eq!(details.shifts[1].slots.len(), 8);
    for group in &details.shifts {
        assert!(group.slots.windows(2).all(|p| p[0].start_time <= p[1].start_time));
    }

    let one_day = fx
        .state
        .availability()
        .dentist_future_slots(
            fx.dentist_lan.id,
            FutureDetailsQuery {
                date: Some(date(2025, 11, 5)),
                service_id: None,
            },
            now(),
        )
        .await
        .unwrap();
    assert_eq!(one_day.total_slots, 4);
}

#[tokio::test]
async fn unknown_or_non_dentist_ids_are_not_found() {
    let clinic = clinic().await;
    let fx = &clinic.fx;
    let availability = fx.state.availability();

    for id in [Uuid::new_v4(), fx.nurse_hoa.id, fx.retired_dentist.id] {
        let err = availability
            .working_dates(id, WorkingDatesQuery::default(), now())
            .await
            .unwrap_err();
        assert_matches!(err, ScheduleError::NotFound { entity: "Dentist", .. });

        let err = availability
            .dentist_future_slots(id, FutureDetailsQuery::default(), now())
            .await
            .unwrap_err();
        assert_matches!(err, ScheduleError::NotFound { entity: "Dentist", .. });
    }
}

#[tokio::test]
async fn queries_agree_on_the_same_slot_set() {
    let clinic = clinic().await;
    let fx = &clinic.fx;
    let availability = fx.state.availability();

    // Just after the 08:00 threshold so the first Monday slot drops out.
    let at = local(2025, 11, 3, 7, 31);
    let nearest = availability
        .nearest_available_slots(NearestSlotQuery::default(), at)
        .await
        .unwrap();

    for dentist in [&fx.dentist_lan, &fx.dentist_minh] {
        let dates = availability
            .working_dates(dentist.id, WorkingDatesQuery::default(), at)
            .await
            .unwrap();
        let details = availability
            .dentist_future_slots(dentist.id, FutureDetailsQuery::default(), at)
            .await
            .unwrap();
        let first = nearest.iter().find(|n| n.dentist_id == dentist.id).unwrap();

        let counted: usize = dates.iter().map(|d| d.slot_count).sum();
        assert_eq!(counted, details.total_slots);

        let earliest = details
            .shifts
            .iter()
            .flat_map(|g| g.slots.iter())
            .min_by_key(|s| s.start_time)
            .unwrap();
        assert_eq!(earliest.id, first.slot.id);
        assert_eq!(dates[0].first_slot_start, first.slot.start_time);
    }

    let lan = nearest.iter().find(|n| n.dentist_id == fx.dentist_lan.id).unwrap();
    assert_eq!(lan.slot.start_time, local(2025, 11, 3, 8, 30));
}

#[tokio::test]
async fn threshold_is_inclusive() {
    let clinic = clinic().await;
    let fx = &clinic.fx;

    let nearest = fx
        .state
        .availability()
        .nearest_available_slots(NearestSlotQuery::default(), local(2025, 11, 3, 7, 30))
        .await
        .unwrap();
    let lan = nearest.iter().find(|n| n.dentist_id == fx.dentist_lan.id).unwrap();
    assert_eq!(lan.slot.start_time, local(2025, 11, 3, 8, 0));
}

#[tokio::test]
async fn booked_and_deactivated_slots_disappear() {
    let clinic = clinic().await;
    let fx = &clinic.fx;

    let mut booked = clinic.lan_exam_slots[0].clone();
    booked.status = SlotStatus::Booked;
    fx.memory.put_slots(vec![booked]).await;

    let nearest = fx
        .state
        .availability()
        .nearest_available_slots(NearestSlotQuery::default(), now())
        .await
        .unwrap();
    let lan = nearest.iter().find(|n| n.dentist_id == fx.dentist_lan.id).unwrap();
    assert_eq!(lan.slot.start_time, local(2025, 11, 3, 8, 30));

    fx.schedules().toggle_schedule(clinic.exam_schedule, now()).await.unwrap();
    let nearest = fx
        .state
        .availability()
        .nearest_available_slots(NearestSlotQuery::default(), now())
        .await
        .unwrap();
    assert_eq!(nearest.len(), 1);
    assert_eq!(nearest[0].slot.date, date(2025, 11, 5));
}

#[tokio::test]
async fn slots_beyond_max_booking_days_are_hidden() {
    let clinic = clinic().await;
    let fx = &clinic.fx;

    // 30 days after 5 Oct is 4 Nov 07:00 at the clinic, before any Tuesday slot.
    let early = local(2025, 10, 5, 7, 0);
    let nearest = fx
        .state
        .availability()
        .nearest_available_slots(NearestSlotQuery::default(), early)
        .await
        .unwrap();
    assert_eq!(nearest.len(), 1);
    assert_eq!(nearest[0].dentist_id, fx.dentist_lan.id);
}
