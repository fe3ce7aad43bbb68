use thiserror::Error;

use shared_models::error::AppError;
use shared_utils::clinic_time::ClinicTimeError;

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("{0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Time(#[from] ClinicTimeError),
}

impl ScheduleError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        ScheduleError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn database(err: impl std::fmt::Display) -> Self {
        ScheduleError::Database(err.to_string())
    }
}

impl From<ScheduleError> for AppError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::Validation(msg) => AppError::ValidationError(msg),
            ScheduleError::Time(e) => AppError::ValidationError(e.to_string()),
            e @ ScheduleError::NotFound { .. } => AppError::NotFound(e.to_string()),
            ScheduleError::Conflict(msg) => AppError::Conflict(msg),
            ScheduleError::Database(msg) => AppError::Database(msg),
            e @ ScheduleError::Serialization(_) => AppError::Internal(e.to_string()),
        }
    }
}

/// Comma-separated id list for error messages.
pub(crate) fn join_ids<T: ToString>(ids: impl IntoIterator<Item = T>) -> String {
    ids.into_iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
