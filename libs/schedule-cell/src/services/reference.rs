use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ScheduleError;
use crate::models::{
    CreateShiftRequest, HolidayConfig, Shift, ShiftWindow, UpdateHolidayConfigRequest,
    UpdateShiftRequest,
};
use crate::services::holiday::validate_holiday_config;
use crate::services::reference_cache::{Collection, ReferenceCache};

/// Shift and holiday definitions owned by this service. Every write refreshes
/// its cache key before returning.
pub struct ReferenceDataService {
    cache: Arc<ReferenceCache>,
}

impl ReferenceDataService {
    pub fn new(cache: Arc<ReferenceCache>) -> Self {
        Self { cache }
    }

    pub async fn list_shifts(&self) -> Result<Vec<Shift>, ScheduleError> {
        let mut shifts = self.cache.shifts().await?.as_ref().clone();
        shifts.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.name.cmp(&b.name)));
        Ok(shifts)
    }

    pub async fn create_shift(&self, request: CreateShiftRequest, now: DateTime<Utc>) -> Result<Shift, ScheduleError> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(ScheduleError::Validation("Shift name is required".to_string()));
        }
        let id = Uuid::new_v4();
        ShiftWindow::parse(id, &name, &request.start_time, &request.end_time)?;
        self.ensure_unique_name(&name, None).await?;

        let shift = Shift {
            id,
            name,
            start_time: request.start_time,
            end_time: request.end_time,
            is_active: request.is_active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        };
        let saved = self.cache.source().save_shift(&shift).await?;
        self.cache.refresh(Collection::Shifts).await?;

        info!("Shift '{}' created ({})", saved.name, saved.id);
        Ok(saved)
    }

    /// Existing schedules keep the shift times they were generated with.
    pub async fn update_shift(
        &self,
        shift_id: Uuid,
        request: UpdateShiftRequest,
        now: DateTime<Utc>,
    ) -> Result<Shift, ScheduleError> {
        let mut shift = self.cache.find_shift(shift_id).await?;

        if let Some(name) = request.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ScheduleError::Validation("Shift name is required".to_string()));
            }
            self.ensure_unique_name(&name, Some(shift_id)).await?;
            shift.name = name;
        }
        if let Some(start_time) = request.start_time {
            shift.start_time = start_time;
        }
        if let Some(end_time) = request.end_time {
            shift.end_time = end_time;
        }
        if let Some(is_active) = request.is_active {
            shift.is_active = is_active;
        }
        shift.window()?;
        shift.updated_at = now;

        let saved = self.cache.source().save_shift(&shift).await?;
        self.cache.refresh(Collection::Shifts).await?;

        info!("Shift '{}' updated", saved.name);
        Ok(saved)
    }

    pub async fn get_holiday_config(&self) -> Result<HolidayConfig, ScheduleError> {
        Ok(self.cache.holiday_config().await?.as_ref().clone())
    }

    /// Replaces the configuration. Schedules already created keep their snapshot.
    pub async fn update_holiday_config(
        &self,
        request: UpdateHolidayConfigRequest,
    ) -> Result<HolidayConfig, ScheduleError> {
        let config = HolidayConfig {
            recurring_holidays: request.recurring_holidays,
            non_recurring_holidays: request.non_recurring_holidays,
        };
        validate_holiday_config(&config)?;

        let saved = self.cache.source().save_holiday_config(&config).await?;
        self.cache.refresh(Collection::HolidayConfig).await?;

        info!(
            "Holiday config saved: {} recurring, {} one-off",
            saved.recurring_holidays.len(),
            saved.non_recurring_holidays.len()
        );
        Ok(saved)
    }

    async fn ensure_unique_name(&self, name: &str, except: Option<Uuid>) -> Result<(), ScheduleError> {
        let shifts = self.cache.shifts().await?;
        let wanted = name.to_lowercase();
        let taken = shifts
            .iter()
            .any(|s| Some(s.id) != except && s.name.trim().to_lowercase() == wanted);
        if taken {
            debug!("Rejected duplicate shift name '{}'", name);
            return Err(ScheduleError::Conflict(format!("Shift '{}' already exists", name)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryReferenceSource;
    use shared_utils::clinic_time::DayOfWeek;

    use crate::models::RecurringHoliday;

    fn service() -> ReferenceDataService {
        ReferenceDataService::new(Arc::new(ReferenceCache::new(Arc::new(InMemoryReferenceSource::new()))))
    }

    fn morning() -> CreateShiftRequest {
        CreateShiftRequest {
            name: "Ca Sáng".to_string(),
            start_time: "08:00".to_string(),
            end_time: "12:00".to_string(),
            is_active: None,
        }
    }

    #[tokio::test]
    async fn created_shift_is_visible_immediately() {
        let service = service();
        // Prime the cache so the write has to refresh it.
        assert!(service.list_shifts().await.unwrap().is_empty());

        let shift = service.create_shift(morning(), Utc::now()).await.unwrap();
        assert!(shift.is_active);
        assert_eq!(service.list_shifts().await.unwrap(), vec![shift]);
    }

    #[tokio::test]
    async fn duplicate_shift_names_conflict() {
        let service = service();
        service.create_shift(morning(), Utc::now()).await.unwrap();

        let mut again = morning();
        again.name = "  ca sáng ".to_string();
        let err = service.create_shift(again, Utc::now()).await.unwrap_err();
        assert!(matches!(err, ScheduleError::Conflict(_)));
    }

    #[tokio::test]
    async fn vietnamese_capitals_count_as_duplicates() {
        let service = service();
        service.create_shift(morning(), Utc::now()).await.unwrap();

        let mut shouted = morning();
        shouted.name = "CA SÁNG".to_string();
        let err = service.create_shift(shouted, Utc::now()).await.unwrap_err();
        assert!(matches!(err, ScheduleError::Conflict(_)));

        let mut other = morning();
        other.name = "CA CHIỀU".to_string();
        let afternoon = service.create_shift(other, Utc::now()).await.unwrap();
        let err = service
            .update_shift(
                afternoon.id,
                UpdateShiftRequest {
                    name: Some("ca sáng".to_string()),
                    ..UpdateShiftRequest::default()
                },
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ScheduleError::Conflict(_)));
    }

    #[tokio::test]
    async fn inverted_shift_window_is_rejected() {
        let service = service();
        let mut request = morning();
        request.end_time = "07:00".to_string();
        let err = service.create_shift(request, Utc::now()).await.unwrap_err();
        assert!(matches!(err, ScheduleError::Validation(_)));
    }

    #[tokio::test]
    async fn update_shift_revalidates_window() {
        let service = service();
        let shift = service.create_shift(morning(), Utc::now()).await.unwrap();

        let err = service
            .update_shift(
                shift.id,
                UpdateShiftRequest {
                    start_time: Some("13:00".to_string()),
                    ..UpdateShiftRequest::default()
                },
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ScheduleError::Validation(_)));

        let updated = service
            .update_shift(
                shift.id,
                UpdateShiftRequest {
                    end_time: Some("11:30".to_string()),
                    ..UpdateShiftRequest::default()
                },
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(updated.end_time, "11:30");
    }

    #[tokio::test]
    async fn holiday_config_update_refreshes_cache() {
        let service = service();
        assert!(service.get_holiday_config().await.unwrap().recurring_holidays.is_empty());

        service
            .update_holiday_config(UpdateHolidayConfigRequest {
                recurring_holidays: vec![RecurringHoliday {
                    name: "Chủ nhật".to_string(),
                    day_of_week: DayOfWeek::SUNDAY,
                    is_active: true,
                }],
                non_recurring_holidays: vec![],
            })
            .await
            .unwrap();

        let config = service.get_holiday_config().await.unwrap();
        assert_eq!(config.recurring_holidays.len(), 1);
    }
}
