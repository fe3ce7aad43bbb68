use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_models::auth::{require_role, require_staff, Role, User};
use shared_models::error::AppError;

use crate::models::{
    AssignStaffRequest, CreateScheduleRequest, CreateShiftRequest, FutureDetailsQuery,
    NearestSlotQuery, ReassignStaffRequest, RemoveStaffRequest, ScheduleListQuery, SlotListQuery,
    ToggleSlotsRequest, UpdateHolidayConfigRequest, UpdateScheduleRequest, UpdateShiftRequest,
    WorkingDatesQuery,
};
use crate::state::ScheduleState;

const SCHEDULE_MANAGERS: &[Role] = &[Role::Admin, Role::Manager];
const ADMINS: &[Role] = &[Role::Admin];

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

pub async fn health(State(state): State<Arc<ScheduleState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "clinic-schedule",
        "database_configured": state.config.is_database_configured(),
        "cache_refreshed_at": state.cache.refreshed_at().await,
    }))
}

#[axum::debug_handler]
pub async fn dentists_with_nearest_slot(
    State(state): State<Arc<ScheduleState>>,
    Query(query): Query<NearestSlotQuery>,
) -> Result<Json<Value>, AppError> {
    let dentists = state.availability().nearest_available_slots(query, Utc::now()).await?;
    Ok(Json(json!({
        "total": dentists.len(),
        "dentists": dentists,
    })))
}

#[axum::debug_handler]
pub async fn dentist_working_dates(
    State(state): State<Arc<ScheduleState>>,
    Path(dentist_id): Path<Uuid>,
    Query(query): Query<WorkingDatesQuery>,
) -> Result<Json<Value>, AppError> {
    let dates = state
        .availability()
        .working_dates(dentist_id, query, Utc::now())
        .await?;
    Ok(Json(json!({
        "dentist_id": dentist_id,
        "total": dates.len(),
        "working_dates": dates,
    })))
}

#[axum::debug_handler]
pub async fn dentist_future_details(
    State(state): State<Arc<ScheduleState>>,
    Path(dentist_id): Path<Uuid>,
    Query(query): Query<FutureDetailsQuery>,
) -> Result<Json<Value>, AppError> {
    let details = state
        .availability()
        .dentist_future_slots(dentist_id, query, Utc::now())
        .await?;
    Ok(Json(json!(details)))
}

// ==============================================================================
// SCHEDULE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_schedule(
    State(state): State<Arc<ScheduleState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateScheduleRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_role(&user, SCHEDULE_MANAGERS)?;
    debug!("User {} creating schedule for room {}", user.id, request.room_id);

    let summary = state
        .schedules()
        .create_schedule(request, Some(user.id.clone()), Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(json!(summary))))
}

#[axum::debug_handler]
pub async fn list_schedules(
    State(state): State<Arc<ScheduleState>>,
    Extension(user): Extension<User>,
    Query(query): Query<ScheduleListQuery>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;
    let schedules = state.schedules().list_schedules(query).await?;
    Ok(Json(json!({
        "total": schedules.len(),
        "schedules": schedules,
    })))
}

#[axum::debug_handler]
pub async fn get_schedule(
    State(state): State<Arc<ScheduleState>>,
    Extension(user): Extension<User>,
    Path(schedule_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;
    let schedule = state.schedules().get_schedule(schedule_id).await?;
    Ok(Json(json!(schedule)))
}

#[axum::debug_handler]
pub async fn update_schedule(
    State(state): State<Arc<ScheduleState>>,
    Extension(user): Extension<User>,
    Path(schedule_id): Path<Uuid>,
    Json(request): Json<UpdateScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, SCHEDULE_MANAGERS)?;
    let summary = state
        .schedules()
        .update_schedule(schedule_id, request, Utc::now())
        .await?;
    Ok(Json(json!(summary)))
}

#[axum::debug_handler]
pub async fn toggle_schedule(
    State(state): State<Arc<ScheduleState>>,
    Extension(user): Extension<User>,
    Path(schedule_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, SCHEDULE_MANAGERS)?;
    let schedule = state.schedules().toggle_schedule(schedule_id, Utc::now()).await?;
    Ok(Json(json!(schedule)))
}

#[axum::debug_handler]
pub async fn generate_sub_room_slots(
    State(state): State<Arc<ScheduleState>>,
    Extension(user): Extension<User>,
    Path((schedule_id, sub_room_id)): Path<(Uuid, Uuid)>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_role(&user, SCHEDULE_MANAGERS)?;
    let summary = state
        .schedules()
        .generate_sub_room_slots(schedule_id, sub_room_id, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(json!(summary))))
}

// ==============================================================================
// SLOT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_slots(
    State(state): State<Arc<ScheduleState>>,
    Extension(user): Extension<User>,
    Query(query): Query<SlotListQuery>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;
    let slots = state.schedules().list_slots(query).await?;
    Ok(Json(json!({
        "total": slots.len(),
        "slots": slots,
    })))
}

#[axum::debug_handler]
pub async fn assign_staff(
    State(state): State<Arc<ScheduleState>>,
    Extension(user): Extension<User>,
    Json(request): Json<AssignStaffRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, SCHEDULE_MANAGERS)?;
    let result = state.staff_assignments().assign_staff(request, Utc::now()).await?;
    Ok(Json(json!(result)))
}

#[axum::debug_handler]
pub async fn reassign_staff(
    State(state): State<Arc<ScheduleState>>,
    Extension(user): Extension<User>,
    Json(request): Json<ReassignStaffRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, SCHEDULE_MANAGERS)?;
    let result = state.staff_assignments().reassign_staff(request, Utc::now()).await?;
    Ok(Json(json!(result)))
}

#[axum::debug_handler]
pub async fn remove_staff(
    State(state): State<Arc<ScheduleState>>,
    Extension(user): Extension<User>,
    Json(request): Json<RemoveStaffRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, SCHEDULE_MANAGERS)?;
    let result = state.staff_assignments().remove_staff(request, Utc::now()).await?;
    Ok(Json(json!(result)))
}

#[axum::debug_handler]
pub async fn toggle_slots(
    State(state): State<Arc<ScheduleState>>,
    Extension(user): Extension<User>,
    Json(request): Json<ToggleSlotsRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, SCHEDULE_MANAGERS)?;
    let result = state.staff_assignments().set_slots_enabled(request, Utc::now()).await?;
    Ok(Json(json!(result)))
}

// ==============================================================================
// REFERENCE DATA HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_shifts(
    State(state): State<Arc<ScheduleState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;
    let shifts = state.reference_data().list_shifts().await?;
    Ok(Json(json!({
        "total": shifts.len(),
        "shifts": shifts,
    })))
}

#[axum::debug_handler]
pub async fn create_shift(
    State(state): State<Arc<ScheduleState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateShiftRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_role(&user, ADMINS)?;
    let shift = state.reference_data().create_shift(request, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(json!(shift))))
}

#[axum::debug_handler]
pub async fn update_shift(
    State(state): State<Arc<ScheduleState>>,
    Extension(user): Extension<User>,
    Path(shift_id): Path<Uuid>,
    Json(request): Json<UpdateShiftRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, ADMINS)?;
    let shift = state
        .reference_data()
        .update_shift(shift_id, request, Utc::now())
        .await?;
    Ok(Json(json!(shift)))
}

#[axum::debug_handler]
pub async fn get_holiday_config(
    State(state): State<Arc<ScheduleState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;
    let config = state.reference_data().get_holiday_config().await?;
    Ok(Json(json!(config)))
}

#[axum::debug_handler]
pub async fn update_holiday_config(
    State(state): State<Arc<ScheduleState>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateHolidayConfigRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, ADMINS)?;
    let config = state.reference_data().update_holiday_config(request).await?;
    Ok(Json(json!(config)))
}

#[axum::debug_handler]
pub async fn refresh_cache(
    State(state): State<Arc<ScheduleState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, ADMINS)?;
    let refreshed = state.cache.refresh_all().await?;
    Ok(Json(json!({
        "refreshed": refreshed,
        "refreshed_at": state.cache.refreshed_at().await,
    })))
}
