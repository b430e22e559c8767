//! KPI mapping and derivation engine for the EPM suite.
//!
//! Turns stored KPI rows (events, items, definitions, fact amounts, target
//! values) into the shapes the UI renders: achievement rates, per-period
//! facts, and camelCase DTOs. Persistence sits behind [`kpi::KpiRepository`];
//! the PostgreSQL implementation is gated on the `postgres` feature.

pub mod config;
pub mod kpi;
pub mod shared;

pub use config::KpiConfig;
pub use kpi::{KpiError, KpiService};
