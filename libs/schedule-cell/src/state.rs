use std::sync::Arc;

use tracing::{info, warn};

use shared_config::AppConfig;
use shared_utils::clinic_time::ClinicClock;

use crate::error::ScheduleError;
use crate::services::{
    AvailabilityService, ReferenceCache, ReferenceDataService, ScheduleService,
    StaffAssignmentService,
};
use crate::store::{
    InMemoryReferenceSource, InMemoryScheduleStore, ReferenceSource, ScheduleStore,
    SupabaseReferenceSource, SupabaseScheduleStore,
};

/// Everything the schedule handlers share across requests.
pub struct ScheduleState {
    pub config: Arc<AppConfig>,
    pub clock: ClinicClock,
    pub store: Arc<dyn ScheduleStore>,
    pub cache: Arc<ReferenceCache>,
}

impl ScheduleState {
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<dyn ScheduleStore>,
        source: Arc<dyn ReferenceSource>,
    ) -> Result<Self, ScheduleError> {
        let clock = ClinicClock::from_offset_minutes(config.clinic_utc_offset_minutes)?;
        Ok(Self {
            config,
            clock,
            store,
            cache: Arc::new(ReferenceCache::new(source)),
        })
    }

    /// PostgREST-backed state when Supabase is configured, in-memory otherwise.
    pub fn from_config(config: Arc<AppConfig>) -> Result<Self, ScheduleError> {
        if config.is_database_configured() {
            info!("Using PostgREST schedule store at {}", config.supabase_url);
            let store = Arc::new(SupabaseScheduleStore::new(&config));
            let source = Arc::new(SupabaseReferenceSource::new(&config));
            Self::new(config, store, source)
        } else {
            warn!("Supabase not configured, schedule data is kept in memory only");
            Self::new(
                config,
                Arc::new(InMemoryScheduleStore::new()),
                Arc::new(InMemoryReferenceSource::new()),
            )
        }
    }

    pub fn schedules(&self) -> ScheduleService {
        ScheduleService::new(self.store.clone(), self.cache.clone(), self.clock)
    }

    pub fn staff_assignments(&self) -> StaffAssignmentService {
        StaffAssignmentService::new(self.store.clone(), self.cache.clone(), self.clock)
    }

    pub fn availability(&self) -> AvailabilityService {
        AvailabilityService::new(self.store.clone(), self.cache.clone(), self.clock, &self.config)
    }

    pub fn reference_data(&self) -> ReferenceDataService {
        ReferenceDataService::new(self.cache.clone())
    }
}
