pub mod achievement;
pub mod error;
pub mod period_facts;
#[cfg(feature = "postgres")]
pub mod pg_repository;
pub mod repository;
pub mod service;
pub mod storage;
pub mod types;
pub mod validation;
pub mod widget;

pub use achievement::{achievement_rate, decimal_achievement_rate};
pub use error::{ErrorKind, KpiError};
pub use period_facts::{assemble_period_facts, assemble_with_direction};
#[cfg(feature = "postgres")]
pub use pg_repository::PgKpiRepository;
pub use repository::{InMemoryKpiRepository, KpiRepository};
pub use service::KpiService;
pub use storage::*;
pub use types::*;
pub use validation::{ActionPlanReference, ItemReferences, ReferenceTarget};
pub use widget::WidgetDisplayConfig;
