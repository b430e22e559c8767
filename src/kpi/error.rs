#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum KpiError {
    #[error("Invalid reference: {0}")]
    InvalidReference(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Field is immutable after creation: {0}")]
    ImmutableField(&'static str),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),
    #[error("Unsupported KPI type: {0}")]
    UnsupportedKpiType(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KpiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidReference(_)
            | Self::Validation(_)
            | Self::ImmutableField(_)
            | Self::InvalidTransition(_)
            | Self::UnsupportedKpiType(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Database(_) | Self::Config(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{entity} {id}"))
    }
}

#[cfg(feature = "postgres")]
impl From<diesel::result::Error> for KpiError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};
        match err {
            Error::NotFound => Self::NotFound("record".to_string()),
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                Self::Conflict(info.message().to_string())
            }
            other => Self::Database(other.to_string()),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<diesel::r2d2::PoolError> for KpiError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<figment::Error> for KpiError {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}
