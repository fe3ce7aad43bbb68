use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Method,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::error::{join_ids, ScheduleError};
use crate::models::{
    DentalService, HolidayConfig, Room, Schedule, Shift, Slot, SlotDayKey, StaffMember,
};
use crate::store::{
    conflict_message, ReferenceSource, ScheduleFilter, ScheduleStore, SlotFilter, SlotUpdate,
};

const SCHEDULES: &str = "/rest/v1/schedules";
const SLOTS: &str = "/rest/v1/slots";
const SHIFTS: &str = "/rest/v1/shifts";
const ROOMS: &str = "/rest/v1/rooms";
const STAFF: &str = "/rest/v1/staff";
const SERVICES: &str = "/rest/v1/dental_services";
const HOLIDAY_CONFIGS: &str = "/rest/v1/holiday_configs";

/// The clinic keeps a single holiday configuration row.
const HOLIDAY_CONFIG_ROW_ID: i64 = 1;

fn timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn upsert_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "Prefer",
        HeaderValue::from_static("resolution=merge-duplicates,return=representation"),
    );
    headers
}

fn day_key_query(key: &SlotDayKey) -> String {
    let sub_room = match key.sub_room_id {
        Some(id) => format!("eq.{}", id),
        None => "is.null".to_string(),
    };
    format!(
        "schedule_id=eq.{}&shift_id=eq.{}&date=eq.{}&sub_room_id={}",
        key.schedule_id, key.shift_id, key.date, sub_room
    )
}

fn slot_query(filter: &SlotFilter) -> String {
    let mut params = Vec::new();
    if let Some(id) = filter.schedule_id {
        params.push(format!("schedule_id=eq.{}", id));
    }
    if let Some(id) = filter.room_id {
        params.push(format!("room_id=eq.{}", id));
    }
    if let Some(ids) = &filter.room_ids {
        params.push(format!("room_id=in.({})", ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(",")));
    }
    if let Some(id) = filter.sub_room_id {
        params.push(format!("sub_room_id=eq.{}", id));
    }
    if let Some(date) = filter.date {
        params.push(format!("date=eq.{}", date));
    }
    if let Some(id) = filter.dentist_id {
        params.push(format!("dentist_ids=cs.{{{}}}", id));
    }
    if let Some(status) = filter.status {
        params.push(format!("status=eq.{}", status.as_str()));
    }
    if let Some(active) = filter.is_active {
        params.push(format!("is_active=eq.{}", active));
    }
    if let Some(from) = filter.start_from {
        params.push(format!("start_time=gte.{}", timestamp(from)));
    }
    if let Some(to) = filter.start_to {
        params.push(format!("start_time=lte.{}", timestamp(to)));
    }
    params.push("order=start_time.asc".to_string());
    params.join("&")
}

/// Schedules and slots persisted through PostgREST.
pub struct SupabaseScheduleStore {
    supabase: SupabaseClient,
}

impl SupabaseScheduleStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ScheduleError> {
        self.supabase
            .request(Method::GET, path, None, None)
            .await
            .map_err(ScheduleError::database)
    }

    async fn write<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Value,
    ) -> Result<Vec<T>, ScheduleError> {
        self.supabase
            .request_with_headers(
                method,
                path,
                None,
                Some(body),
                Some(SupabaseClient::return_representation()),
            )
            .await
            .map_err(ScheduleError::database)
    }

    async fn delete_day(&self, key: &SlotDayKey) -> Result<(), ScheduleError> {
        let path = format!("{}?{}", SLOTS, day_key_query(key));
        let _: Vec<Value> = self
            .supabase
            .request(Method::DELETE, &path, None, None)
            .await
            .map_err(ScheduleError::database)?;
        Ok(())
    }

    fn slot_patch(slot: &Slot) -> Value {
        json!({
            "dentist_ids": slot.dentist_ids,
            "nurse_ids": slot.nurse_ids,
            "status": slot.status,
            "is_active": slot.is_active,
            "updated_at": timestamp(slot.updated_at),
        })
    }

    /// Compensate a partially applied batch by restoring the previous rows.
    async fn revert(&self, previous: &[Slot]) {
        for slot in previous {
            let path = format!("{}?id=eq.{}", SLOTS, slot.id);
            let result: Result<Vec<Value>, ScheduleError> =
                self.write(Method::PATCH, &path, Self::slot_patch(slot)).await;
            if let Err(e) = result {
                error!("Failed to revert slot {} after aborted batch: {}", slot.id, e);
            }
        }
    }
}

#[async_trait]
impl ScheduleStore for SupabaseScheduleStore {
    async fn insert_schedule(&self, schedule: &Schedule) -> Result<Schedule, ScheduleError> {
        let mut rows: Vec<Schedule> = self
            .write(Method::POST, SCHEDULES, serde_json::to_value(schedule)?)
            .await?;
        if rows.is_empty() {
            return Err(ScheduleError::Database("Failed to create schedule".to_string()));
        }
        Ok(rows.remove(0))
    }

    async fn update_schedule(&self, schedule: &Schedule) -> Result<Schedule, ScheduleError> {
        let path = format!("{}?id=eq.{}", SCHEDULES, schedule.id);
        let mut rows: Vec<Schedule> = self
            .write(Method::PATCH, &path, serde_json::to_value(schedule)?)
            .await?;
        if rows.is_empty() {
            return Err(ScheduleError::not_found("Schedule", schedule.id));
        }
        Ok(rows.remove(0))
    }

    async fn get_schedule(&self, id: Uuid) -> Result<Option<Schedule>, ScheduleError> {
        let rows: Vec<Schedule> = self.fetch(&format!("{}?id=eq.{}", SCHEDULES, id)).await?;
        Ok(rows.into_iter().next())
    }

    async fn find_schedules(&self, filter: &ScheduleFilter) -> Result<Vec<Schedule>, ScheduleError> {
        let mut params = Vec::new();
        if let Some(room_id) = filter.room_id {
            params.push(format!("room_id=eq.{}", room_id));
        }
        if let Some(month) = filter.month {
            params.push(format!("month=eq.{}", month));
        }
        if let Some(year) = filter.year {
            params.push(format!("year=eq.{}", year));
        }
        params.push("order=year.asc,month.asc".to_string());
        self.fetch(&format!("{}?{}", SCHEDULES, params.join("&"))).await
    }

    async fn replace_day_slots(&self, key: &SlotDayKey, slots: Vec<Slot>) -> Result<Vec<Slot>, ScheduleError> {
        debug!("Replacing slots for schedule {} shift {} on {}", key.schedule_id, key.shift_id, key.date);
        self.delete_day(key).await?;

        if slots.is_empty() {
            return Ok(slots);
        }

        let body = serde_json::to_value(&slots)?;
        match self.write::<Slot>(Method::POST, SLOTS, body).await {
            Ok(written) if written.len() == slots.len() => Ok(written),
            outcome => {
                warn!("Slot insert for {} incomplete, removing the day's slots", key.date);
                if let Err(e) = self.delete_day(key).await {
                    error!("Failed to clean up slots for {}: {}", key.date, e);
                }
                match outcome {
                    Err(e) => Err(e),
                    Ok(written) => Err(ScheduleError::Database(format!(
                        "Inserted {} of {} slots for {}",
                        written.len(),
                        slots.len(),
                        key.date
                    ))),
                }
            }
        }
    }

    async fn get_slots(&self, ids: &[Uuid]) -> Result<Vec<Slot>, ScheduleError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let ids = ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(",");
        self.fetch(&format!("{}?id=in.({})", SLOTS, ids)).await
    }

    async fn find_slots(&self, filter: &SlotFilter) -> Result<Vec<Slot>, ScheduleError> {
        if matches!(&filter.room_ids, Some(ids) if ids.is_empty()) {
            return Ok(vec![]);
        }
        self.fetch(&format!("{}?{}", SLOTS, slot_query(filter))).await
    }

    async fn commit_slot_updates(&self, updates: Vec<SlotUpdate>) -> Result<Vec<Slot>, ScheduleError> {
        let ids: Vec<Uuid> = updates.iter().map(|u| u.slot.id).collect();
        let current: HashMap<Uuid, Slot> = self
            .get_slots(&ids)
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();

        let changed: Vec<Uuid> = updates
            .iter()
            .filter(|u| current.get(&u.slot.id).map_or(true, |s| s.status != u.expected_status))
            .map(|u| u.slot.id)
            .collect();
        if !changed.is_empty() {
            return Err(ScheduleError::Conflict(conflict_message(&changed)));
        }

        let mut applied: Vec<Slot> = Vec::with_capacity(updates.len());
        let mut written = Vec::with_capacity(updates.len());
        for update in &updates {
            // The status guard in the filter makes each row update conditional.
            let path = format!(
                "{}?id=eq.{}&status=eq.{}",
                SLOTS,
                update.slot.id,
                update.expected_status.as_str()
            );
            let result: Result<Vec<Slot>, ScheduleError> =
                self.write(Method::PATCH, &path, Self::slot_patch(&update.slot)).await;

            match result {
                Ok(mut rows) if rows.len() == 1 => {
                    if let Some(previous) = current.get(&update.slot.id) {
                        applied.push(previous.clone());
                    }
                    written.push(rows.remove(0));
                }
                Ok(_) => {
                    self.revert(&applied).await;
                    return Err(ScheduleError::Conflict(conflict_message(&[update.slot.id])));
                }
                Err(e) => {
                    self.revert(&applied).await;
                    return Err(e);
                }
            }
        }

        debug!("Committed updates for slots {}", join_ids(&ids));
        Ok(written)
    }

    async fn set_schedule_slots_active(&self, schedule_id: Uuid, is_active: bool) -> Result<usize, ScheduleError> {
        let path = format!("{}?schedule_id=eq.{}", SLOTS, schedule_id);
        let rows: Vec<Value> = self
            .write(
                Method::PATCH,
                &path,
                json!({ "is_active": is_active, "updated_at": timestamp(Utc::now()) }),
            )
            .await?;
        Ok(rows.len())
    }
}

/// Reference collections read from the tables the other clinic services own.
pub struct SupabaseReferenceSource {
    supabase: SupabaseClient,
}

impl SupabaseReferenceSource {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ScheduleError> {
        self.supabase
            .request(Method::GET, path, None, None)
            .await
            .map_err(ScheduleError::database)
    }

    async fn upsert<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T, ScheduleError> {
        let rows: Vec<T> = self
            .supabase
            .request_with_headers(Method::POST, path, None, Some(body), Some(upsert_headers()))
            .await
            .map_err(ScheduleError::database)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| ScheduleError::Database(format!("Upsert into {} returned no rows", path)))
    }
}

#[async_trait]
impl ReferenceSource for SupabaseReferenceSource {
    async fn load_shifts(&self) -> Result<Vec<Shift>, ScheduleError> {
        self.fetch(&format!("{}?order=start_time.asc", SHIFTS)).await
    }

    async fn load_rooms(&self) -> Result<Vec<Room>, ScheduleError> {
        self.fetch(&format!("{}?order=name.asc", ROOMS)).await
    }

    async fn load_staff(&self) -> Result<Vec<StaffMember>, ScheduleError> {
        self.fetch(&format!("{}?order=full_name.asc", STAFF)).await
    }

    async fn load_services(&self) -> Result<Vec<DentalService>, ScheduleError> {
        self.fetch(&format!("{}?order=name.asc", SERVICES)).await
    }

    async fn load_holiday_config(&self) -> Result<HolidayConfig, ScheduleError> {
        let rows: Vec<HolidayConfig> = self
            .fetch(&format!("{}?id=eq.{}", HOLIDAY_CONFIGS, HOLIDAY_CONFIG_ROW_ID))
            .await?;
        Ok(rows.into_iter().next().unwrap_or_default())
    }

    async fn save_shift(&self, shift: &Shift) -> Result<Shift, ScheduleError> {
        self.upsert(&format!("{}?on_conflict=id", SHIFTS), serde_json::to_value(shift)?).await
    }

    async fn save_holiday_config(&self, config: &HolidayConfig) -> Result<HolidayConfig, ScheduleError> {
        let mut body = serde_json::to_value(config)?;
        if let Value::Object(map) = &mut body {
            map.insert("id".to_string(), json!(HOLIDAY_CONFIG_ROW_ID));
        }
        self.upsert(&format!("{}?on_conflict=id", HOLIDAY_CONFIGS), body).await
    }
}
