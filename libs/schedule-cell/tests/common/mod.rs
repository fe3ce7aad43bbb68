#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use schedule_cell::models::{
    CreateScheduleRequest, DentalService, HolidayConfig, RecurringHoliday, Room, ScheduleGenerationSummary,
    Shift, Slot, StaffMember, SubRoom,
};
use schedule_cell::services::ScheduleService;
use schedule_cell::store::{InMemoryReferenceSource, InMemoryScheduleStore, ScheduleStore, SlotFilter};
use schedule_cell::ScheduleState;
use shared_config::AppConfig;
use shared_models::auth::Role;
use shared_utils::clinic_time::{ClinicClock, DayOfWeek};
use shared_utils::test_utils::TestConfig;

pub fn clock() -> ClinicClock {
    ClinicClock::from_offset_minutes(7 * 60).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Clinic-local wall time as an instant.
pub fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    clock().to_instant(date(y, m, d), NaiveTime::from_hms_opt(h, min, 0).unwrap())
}

/// Monday 27 October 2025, 09:00 at the clinic.
pub fn now() -> DateTime<Utc> {
    local(2025, 10, 27, 9, 0)
}

fn shift(name: &str, start: &str, end: &str) -> Shift {
    Shift {
        id: Uuid::new_v4(),
        name: name.to_string(),
        start_time: start.to_string(),
        end_time: end.to_string(),
        is_active: true,
        created_at: now(),
        updated_at: now(),
    }
}

fn staff(name: &str, role: Role, is_active: bool) -> StaffMember {
    StaffMember {
        id: Uuid::new_v4(),
        full_name: name.to_string(),
        role,
        is_active,
    }
}

fn sub_room(name: &str, is_active: bool) -> SubRoom {
    SubRoom {
        id: Uuid::new_v4(),
        name: name.to_string(),
        is_active,
    }
}

pub fn sundays_off() -> HolidayConfig {
    HolidayConfig {
        recurring_holidays: vec![RecurringHoliday {
            name: "Chủ nhật".to_string(),
            day_of_week: DayOfWeek::SUNDAY,
            is_active: true,
        }],
        non_recurring_holidays: vec![],
    }
}

pub struct Fixture {
    pub config: AppConfig,
    pub memory: Arc<InMemoryScheduleStore>,
    pub source: Arc<InMemoryReferenceSource>,
    pub state: Arc<ScheduleState>,
    pub morning: Shift,
    pub afternoon: Shift,
    /// Exam room without subrooms: one dentist, two nurses per slot.
    pub exam_room: Room,
    /// Surgery with chairs "Ghế 1", "Ghế 2" active and "Ghế 3" inactive.
    pub chair_room: Room,
    pub dentist_lan: StaffMember,
    pub dentist_minh: StaffMember,
    pub retired_dentist: StaffMember,
    pub nurse_hoa: StaffMember,
    pub nurse_mai: StaffMember,
    pub cleaning: DentalService,
    pub implant: DentalService,
}

impl Fixture {
    pub fn new() -> Self {
        let memory = Arc::new(InMemoryScheduleStore::new());
        Self::build(memory.clone(), memory)
    }

    pub fn with_config(config: AppConfig) -> Self {
        let memory = Arc::new(InMemoryScheduleStore::new());
        Self::build_with_config(memory.clone(), memory, config)
    }

    /// Fixture whose services write through `store`, which wraps `memory`.
    pub fn build(memory: Arc<InMemoryScheduleStore>, store: Arc<dyn ScheduleStore>) -> Self {
        Self::build_with_config(memory, store, TestConfig::default().to_in_memory_app_config())
    }

    fn build_with_config(memory: Arc<InMemoryScheduleStore>, store: Arc<dyn ScheduleStore>, config: AppConfig) -> Self {
        let morning = shift("Ca Sáng", "08:00", "12:00");
        let afternoon = shift("Ca Chiều", "13:00", "17:00");

        let exam_room = Room {
            id: Uuid::new_v4(),
            name: "Phòng khám 1".to_string(),
            room_type: "exam".to_string(),
            is_active: true,
            sub_rooms: vec![],
            max_dentists: 1,
            max_nurses: 2,
        };
        let chair_room = Room {
            id: Uuid::new_v4(),
            name: "Phòng phẫu thuật".to_string(),
            room_type: "surgery".to_string(),
            is_active: true,
            sub_rooms: vec![sub_room("Ghế 1", true), sub_room("Ghế 2", true), sub_room("Ghế 3", false)],
            max_dentists: 2,
            max_nurses: 2,
        };

        let dentist_lan = staff("BS. Lan", Role::Dentist, true);
        let dentist_minh = staff("BS. Minh", Role::Dentist, true);
        let retired_dentist = staff("BS. Hùng", Role::Dentist, false);
        let nurse_hoa = staff("Y tá Hoa", Role::Nurse, true);
        let nurse_mai = staff("Y tá Mai", Role::Nurse, true);

        let cleaning = DentalService {
            id: Uuid::new_v4(),
            name: "Cạo vôi răng".to_string(),
            allowed_room_types: vec!["exam".to_string()],
            is_active: true,
        };
        let implant = DentalService {
            id: Uuid::new_v4(),
            name: "Cấy ghép implant".to_string(),
            allowed_room_types: vec!["surgery".to_string()],
            is_active: true,
        };

        let source = Arc::new(InMemoryReferenceSource::seeded(
            vec![morning.clone(), afternoon.clone()],
            vec![exam_room.clone(), chair_room.clone()],
            vec![
                dentist_lan.clone(),
                dentist_minh.clone(),
                retired_dentist.clone(),
                nurse_hoa.clone(),
                nurse_mai.clone(),
            ],
            vec![cleaning.clone(), implant.clone()],
            sundays_off(),
        ));

        let state = Arc::new(ScheduleState::new(Arc::new(config.clone()), store, source.clone()).unwrap());

        Self {
            config,
            memory,
            source,
            state,
            morning,
            afternoon,
            exam_room,
            chair_room,
            dentist_lan,
            dentist_minh,
            retired_dentist,
            nurse_hoa,
            nurse_mai,
            cleaning,
            implant,
        }
    }

    pub fn schedules(&self) -> ScheduleService {
        self.state.schedules()
    }

    pub async fn create_november(&self, room: &Room, shifts: &[&Shift], slot_duration: i64) -> ScheduleGenerationSummary {
        self.schedules()
            .create_schedule(
                CreateScheduleRequest {
                    room_id: room.id,
                    month: 11,
                    year: 2025,
                    shift_ids: shifts.iter().map(|s| s.id).collect(),
                    slot_duration,
                },
                Some("admin-1".to_string()),
                now(),
            )
            .await
            .unwrap()
    }

    pub async fn slots_of(&self, schedule_id: Uuid) -> Vec<Slot> {
        self.memory
            .find_slots(&SlotFilter {
                schedule_id: Some(schedule_id),
                ..SlotFilter::default()
            })
            .await
            .unwrap()
    }

    /// Put `dentist_ids` on the given slots directly, skipping validation.
    pub async fn staff_directly(&self, slots: &[Slot], dentist_ids: &[Uuid]) {
        let staffed = slots
            .iter()
            .cloned()
            .map(|mut s| {
                s.dentist_ids = dentist_ids.to_vec();
                s
            })
            .collect();
        self.memory.put_slots(staffed).await;
    }
}
