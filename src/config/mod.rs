use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::kpi::error::KpiError;

pub const DEFAULT_CONFIG_FILE: &str = "kpi.toml";
pub const ENV_PREFIX: &str = "KPI_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub min_fiscal_year: i32,
    pub max_fiscal_year: i32,
}

impl Default for KpiConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 10,
            default_page_size: 20,
            max_page_size: 200,
            min_fiscal_year: 2000,
            max_fiscal_year: 2100,
        }
    }
}

impl KpiConfig {
    /// Defaults, then `kpi.toml` if present, then `KPI_*` variables
    /// (after loading `.env`).
    pub fn load() -> Result<Self, KpiError> {
        dotenvy::dotenv().ok();
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, KpiError> {
        let config: Self = Self::figment(path.as_ref()).extract()?;
        config.validate()?;
        info!(
            "KPI config loaded (page size {}/{}, fiscal years {}..={}, database {})",
            config.default_page_size,
            config.max_page_size,
            config.min_fiscal_year,
            config.max_fiscal_year,
            if config.database_url.is_some() {
                "configured"
            } else {
                "not configured"
            }
        );
        Ok(config)
    }

    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn validate(&self) -> Result<(), KpiError> {
        if self.max_page_size == 0 {
            return Err(KpiError::Config("max_page_size must be positive".into()));
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(KpiError::Config(format!(
                "default_page_size must be within 1..={}",
                self.max_page_size
            )));
        }
        if self.min_fiscal_year > self.max_fiscal_year {
            return Err(KpiError::Config(
                "min_fiscal_year is after max_fiscal_year".into(),
            ));
        }
        if self.max_connections == 0 {
            return Err(KpiError::Config("max_connections must be positive".into()));
        }
        Ok(())
    }

    pub fn fiscal_year_in_range(&self, year: i32) -> bool {
        (self.min_fiscal_year..=self.max_fiscal_year).contains(&year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_are_valid() {
        let config = KpiConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.fiscal_year_in_range(2026));
        assert!(!config.fiscal_year_in_range(1999));
    }

    #[test]
    fn test_file_and_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "kpi.toml",
                r#"
                    default_page_size = 50
                    max_page_size = 500
                    database_url = "postgres://kpi@localhost/epm"
                "#,
            )?;
            jail.set_env("KPI_DEFAULT_PAGE_SIZE", "25");

            let config = KpiConfig::load_from("kpi.toml").expect("config loads");
            assert_eq!(config.default_page_size, 25);
            assert_eq!(config.max_page_size, 500);
            assert_eq!(
                config.database_url.as_deref(),
                Some("postgres://kpi@localhost/epm")
            );
            assert_eq!(config.min_fiscal_year, 2000);
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        Jail::expect_with(|_jail| {
            let config = KpiConfig::load_from("absent.toml").expect("config loads");
            assert_eq!(config, KpiConfig::default());
            Ok(())
        });
    }

    #[test]
    fn test_inconsistent_values_are_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("KPI_DEFAULT_PAGE_SIZE", "900");
            let err = KpiConfig::load_from("kpi.toml").unwrap_err();
            assert!(matches!(err, KpiError::Config(_)));
            Ok(())
        });
    }
}
