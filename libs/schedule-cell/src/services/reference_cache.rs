use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ScheduleError;
use crate::models::{DentalService, HolidayConfig, Room, Shift, StaffMember};
use crate::store::ReferenceSource;

/// Cache keys. Each key is always refreshed as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Shifts,
    Rooms,
    Staff,
    Services,
    HolidayConfig,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Shifts,
        Collection::Rooms,
        Collection::Staff,
        Collection::Services,
        Collection::HolidayConfig,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Shifts => "shifts",
            Collection::Rooms => "rooms",
            Collection::Staff => "staff",
            Collection::Services => "services",
            Collection::HolidayConfig => "holiday_config",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Default)]
struct Entries {
    shifts: Option<Arc<Vec<Shift>>>,
    rooms: Option<Arc<Vec<Room>>>,
    staff: Option<Arc<Vec<StaffMember>>>,
    services: Option<Arc<Vec<DentalService>>>,
    holiday_config: Option<Arc<HolidayConfig>>,
    refreshed_at: Option<DateTime<Utc>>,
}

/// Read-through cache over the reference directory.
pub struct ReferenceCache {
    source: Arc<dyn ReferenceSource>,
    entries: RwLock<Entries>,
}

macro_rules! read_through {
    ($self:ident, $field:ident, $collection:expr) => {{
        if let Some(cached) = $self.entries.read().await.$field.clone() {
            return Ok(cached);
        }
        $self.refresh($collection).await?;
        $self
            .entries
            .read()
            .await
            .$field
            .clone()
            .ok_or_else(|| ScheduleError::Database(format!("Cache key {} failed to load", $collection)))
    }};
}

impl ReferenceCache {
    pub fn new(source: Arc<dyn ReferenceSource>) -> Self {
        Self {
            source,
            entries: RwLock::new(Entries::default()),
        }
    }

    pub fn source(&self) -> &Arc<dyn ReferenceSource> {
        &self.source
    }

    /// Reload one key from the source, replacing whatever was cached.
    pub async fn refresh(&self, collection: Collection) -> Result<(), ScheduleError> {
        debug!("Refreshing reference cache key {}", collection);
        match collection {
            Collection::Shifts => {
                let shifts = Arc::new(self.source.load_shifts().await?);
                self.entries.write().await.shifts = Some(shifts);
            }
            Collection::Rooms => {
                let rooms = Arc::new(self.source.load_rooms().await?);
                self.entries.write().await.rooms = Some(rooms);
            }
            Collection::Staff => {
                let staff = Arc::new(self.source.load_staff().await?);
                self.entries.write().await.staff = Some(staff);
            }
            Collection::Services => {
                let services = Arc::new(self.source.load_services().await?);
                self.entries.write().await.services = Some(services);
            }
            Collection::HolidayConfig => {
                let config = Arc::new(self.source.load_holiday_config().await?);
                self.entries.write().await.holiday_config = Some(config);
            }
        }
        self.entries.write().await.refreshed_at = Some(Utc::now());
        Ok(())
    }

    pub async fn refresh_all(&self) -> Result<Vec<Collection>, ScheduleError> {
        for collection in Collection::ALL {
            self.refresh(collection).await?;
        }
        info!("Reference cache fully refreshed");
        Ok(Collection::ALL.to_vec())
    }

    pub async fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.entries.read().await.refreshed_at
    }

    pub async fn shifts(&self) -> Result<Arc<Vec<Shift>>, ScheduleError> {
        read_through!(self, shifts, Collection::Shifts)
    }

    pub async fn rooms(&self) -> Result<Arc<Vec<Room>>, ScheduleError> {
        read_through!(self, rooms, Collection::Rooms)
    }

    pub async fn staff(&self) -> Result<Arc<Vec<StaffMember>>, ScheduleError> {
        read_through!(self, staff, Collection::Staff)
    }

    pub async fn services(&self) -> Result<Arc<Vec<DentalService>>, ScheduleError> {
        read_through!(self, services, Collection::Services)
    }

    pub async fn holiday_config(&self) -> Result<Arc<HolidayConfig>, ScheduleError> {
        read_through!(self, holiday_config, Collection::HolidayConfig)
    }

    pub async fn find_shift(&self, id: Uuid) -> Result<Shift, ScheduleError> {
        self.shifts()
            .await?
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| ScheduleError::not_found("Shift", id))
    }

    pub async fn find_room(&self, id: Uuid) -> Result<Room, ScheduleError> {
        self.rooms()
            .await?
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| ScheduleError::not_found("Room", id))
    }

    pub async fn find_service(&self, id: Uuid) -> Result<DentalService, ScheduleError> {
        self.services()
            .await?
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| ScheduleError::not_found("Service", id))
    }
}
