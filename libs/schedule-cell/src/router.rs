use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post, put},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::state::ScheduleState;

pub fn schedule_routes(state: Arc<ScheduleState>) -> Router {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/slot/dentists-with-nearest-slot", get(handlers::dentists_with_nearest_slot))
        .route("/slot/dentist/{dentist_id}/working-dates", get(handlers::dentist_working_dates))
        .route("/slot/dentist/{dentist_id}/details/future", get(handlers::dentist_future_details));

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        // Schedules
        .route("/schedule", post(handlers::create_schedule).get(handlers::list_schedules))
        .route("/schedule/{schedule_id}", get(handlers::get_schedule).put(handlers::update_schedule))
        .route("/schedule/{schedule_id}/toggle", patch(handlers::toggle_schedule))
        .route(
            "/schedule/{schedule_id}/subrooms/{sub_room_id}/slots",
            post(handlers::generate_sub_room_slots),
        )
        // Slots and staffing
        .route("/slot", get(handlers::list_slots))
        .route("/slot/assign-staff", post(handlers::assign_staff))
        .route("/slot/reassign-staff", post(handlers::reassign_staff))
        .route("/slot/remove-staff", post(handlers::remove_staff))
        .route("/slot/toggle", patch(handlers::toggle_slots))
        // Reference data
        .route("/shift", get(handlers::list_shifts).post(handlers::create_shift))
        .route("/shift/{shift_id}", put(handlers::update_shift))
        .route(
            "/holiday-config",
            get(handlers::get_holiday_config).put(handlers::update_holiday_config),
        )
        .route("/cache/refresh", post(handlers::refresh_cache))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
