use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[cfg(feature = "postgres")]
use diesel::prelude::*;

#[cfg(feature = "postgres")]
use crate::shared::schema::{
    kpi_definitions, kpi_fact_amounts, kpi_master_events, kpi_master_items, kpi_target_values,
};

use super::achievement::decimal_achievement_rate;
use super::error::KpiError;
use super::types::{
    AggregationMethod, Direction, EventStatus, HierarchyLevel, KpiDefinition, KpiFactAmount,
    KpiMasterEvent, KpiMasterItem, KpiTargetValue, KpiType, TenantScope,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(
    feature = "postgres",
    derive(Queryable, Selectable, Insertable, AsChangeset),
    diesel(table_name = kpi_master_events)
)]
pub struct DbKpiMasterEvent {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub company_id: Uuid,
    pub event_code: String,
    pub event_name: String,
    pub fiscal_year: i32,
    pub status: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(
    feature = "postgres",
    derive(Queryable, Selectable, Insertable, AsChangeset),
    diesel(table_name = kpi_master_items, treat_none_as_null = true)
)]
pub struct DbKpiMasterItem {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub company_id: Uuid,
    pub kpi_event_id: Uuid,
    pub parent_kpi_item_id: Option<Uuid>,
    pub kpi_code: String,
    pub kpi_name: String,
    pub kpi_type: String,
    pub hierarchy_level: i16,
    pub ref_subject_id: Option<Uuid>,
    pub ref_kpi_definition_id: Option<Uuid>,
    pub ref_metric_id: Option<Uuid>,
    pub department_stable_id: Option<String>,
    pub owner_employee_id: Option<Uuid>,
    pub unit: Option<String>,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(
    feature = "postgres",
    derive(Queryable, Selectable, Insertable, AsChangeset),
    diesel(table_name = kpi_definitions, treat_none_as_null = true)
)]
pub struct DbKpiDefinition {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub company_id: Uuid,
    pub kpi_code: String,
    pub kpi_name: String,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub aggregation_method: String,
    pub direction: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(
    feature = "postgres",
    derive(Queryable, Selectable, Insertable, AsChangeset),
    diesel(table_name = kpi_fact_amounts, treat_none_as_null = true)
)]
pub struct DbKpiFactAmount {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub company_id: Uuid,
    pub kpi_event_id: Uuid,
    pub kpi_definition_id: Uuid,
    pub period_code: String,
    pub period_start_date: Option<NaiveDate>,
    pub period_end_date: Option<NaiveDate>,
    pub department_stable_id: Option<String>,
    pub target_value: Option<BigDecimal>,
    pub actual_value: Option<BigDecimal>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbKpiFactAmount {
    /// Uniqueness key; a `None` department is the company-wide row.
    pub fn unique_key(&self) -> (Uuid, Uuid, &str, Option<&str>) {
        (
            self.kpi_event_id,
            self.kpi_definition_id,
            self.period_code.as_str(),
            self.department_stable_id.as_deref(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(
    feature = "postgres",
    derive(Queryable, Selectable, Insertable, AsChangeset),
    diesel(table_name = kpi_target_values)
)]
pub struct DbKpiTargetValue {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub company_id: Uuid,
    pub kpi_master_item_id: Uuid,
    pub period_code: String,
    pub target_value: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, KpiError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| KpiError::Validation(format!("Invalid timestamp '{value}': {e}")))
}

pub fn format_date(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn decimal_to_f64(value: &BigDecimal) -> Option<f64> {
    value.to_f64().filter(|v| v.is_finite())
}

/// Stores the shortest decimal that round-trips to `value`, so `0.1` is
/// persisted as `0.1` and not as its binary expansion.
pub fn f64_to_decimal(value: f64) -> Result<BigDecimal, KpiError> {
    if !value.is_finite() {
        return Err(KpiError::Validation(format!("Not a finite number: {value}")));
    }
    BigDecimal::from_str(&value.to_string())
        .map_err(|e| KpiError::Validation(format!("Unparseable number {value}: {e}")))
}

pub fn db_event_to_event(db: DbKpiMasterEvent) -> Result<KpiMasterEvent, KpiError> {
    Ok(KpiMasterEvent {
        id: db.id,
        status: EventStatus::from_str(&db.status)?,
        event_code: db.event_code,
        event_name: db.event_name,
        fiscal_year: db.fiscal_year,
        is_active: db.is_active,
        created_at: format_timestamp(&db.created_at),
        updated_at: format_timestamp(&db.updated_at),
    })
}

pub fn db_item_to_item(db: DbKpiMasterItem) -> Result<KpiMasterItem, KpiError> {
    Ok(KpiMasterItem {
        id: db.id,
        kpi_event_id: db.kpi_event_id,
        parent_kpi_item_id: db.parent_kpi_item_id,
        kpi_type: KpiType::from_str(&db.kpi_type)?,
        hierarchy_level: HierarchyLevel::try_from(db.hierarchy_level)?,
        kpi_code: db.kpi_code,
        kpi_name: db.kpi_name,
        ref_subject_id: db.ref_subject_id,
        ref_kpi_definition_id: db.ref_kpi_definition_id,
        ref_metric_id: db.ref_metric_id,
        department_stable_id: db.department_stable_id,
        owner_employee_id: db.owner_employee_id,
        unit: db.unit,
        sort_order: db.sort_order,
        is_active: db.is_active,
        created_at: format_timestamp(&db.created_at),
        updated_at: format_timestamp(&db.updated_at),
    })
}

pub fn db_items_to_items(rows: Vec<DbKpiMasterItem>) -> Result<Vec<KpiMasterItem>, KpiError> {
    rows.into_iter().map(db_item_to_item).collect()
}

pub fn db_definition_to_definition(db: DbKpiDefinition) -> Result<KpiDefinition, KpiError> {
    Ok(KpiDefinition {
        id: db.id,
        aggregation_method: AggregationMethod::from_str(&db.aggregation_method)?,
        direction: db
            .direction
            .as_deref()
            .map(Direction::from_str)
            .transpose()?,
        kpi_code: db.kpi_code,
        kpi_name: db.kpi_name,
        description: db.description,
        unit: db.unit,
        is_active: db.is_active,
        created_at: format_timestamp(&db.created_at),
        updated_at: format_timestamp(&db.updated_at),
    })
}

/// Inverse of [`db_definition_to_definition`]; the UI shape carries no scope,
/// so the caller supplies it.
pub fn definition_to_db(
    definition: &KpiDefinition,
    scope: &TenantScope,
) -> Result<DbKpiDefinition, KpiError> {
    Ok(DbKpiDefinition {
        id: definition.id,
        tenant_id: scope.tenant_id,
        company_id: scope.company_id,
        kpi_code: definition.kpi_code.clone(),
        kpi_name: definition.kpi_name.clone(),
        description: definition.description.clone(),
        unit: definition.unit.clone(),
        aggregation_method: definition.aggregation_method.as_str().to_string(),
        direction: definition.direction.map(|d| d.as_str().to_string()),
        is_active: definition.is_active,
        created_at: parse_timestamp(&definition.created_at)?,
        updated_at: parse_timestamp(&definition.updated_at)?,
    })
}

pub fn db_fact_amount_to_fact_amount(db: DbKpiFactAmount) -> KpiFactAmount {
    let target_value = db.target_value.as_ref().and_then(decimal_to_f64);
    let actual_value = db.actual_value.as_ref().and_then(decimal_to_f64);

    KpiFactAmount {
        id: db.id,
        kpi_event_id: db.kpi_event_id,
        kpi_definition_id: db.kpi_definition_id,
        period_code: db.period_code,
        period_start_date: db.period_start_date.as_ref().map(format_date),
        period_end_date: db.period_end_date.as_ref().map(format_date),
        department_stable_id: db.department_stable_id,
        target_value,
        actual_value,
        achievement_rate: decimal_achievement_rate(
            db.actual_value.as_ref(),
            db.target_value.as_ref(),
        ),
        notes: db.notes,
        created_at: format_timestamp(&db.created_at),
        updated_at: format_timestamp(&db.updated_at),
    }
}

pub fn db_target_value_to_target_value(db: DbKpiTargetValue) -> Result<KpiTargetValue, KpiError> {
    let target_value = decimal_to_f64(&db.target_value).ok_or_else(|| {
        KpiError::Validation(format!(
            "Target value {} for period {} is out of range",
            db.target_value, db.period_code
        ))
    })?;
    Ok(KpiTargetValue {
        id: db.id,
        kpi_master_item_id: db.kpi_master_item_id,
        period_code: db.period_code,
        target_value,
        created_at: format_timestamp(&db.created_at),
        updated_at: format_timestamp(&db.updated_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    fn sample_definition() -> DbKpiDefinition {
        DbKpiDefinition {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            kpi_code: "CSAT".to_string(),
            kpi_name: "Customer satisfaction".to_string(),
            description: Some("Quarterly survey".to_string()),
            unit: Some("pt".to_string()),
            aggregation_method: "AVG".to_string(),
            direction: Some("higher_is_better".to_string()),
            is_active: true,
            created_at: ts(1_767_225_600_123),
            updated_at: ts(1_767_312_000_456),
        }
    }

    #[test]
    fn test_definition_round_trip_preserves_every_field() {
        let db = sample_definition();
        let scope = TenantScope::new(db.tenant_id, db.company_id);

        let ui = db_definition_to_definition(db.clone()).unwrap();
        assert_eq!(ui.aggregation_method, AggregationMethod::Avg);
        assert_eq!(ui.direction, Some(Direction::HigherIsBetter));
        assert_eq!(ui.created_at, "2026-01-01T00:00:00.123Z");

        let back = definition_to_db(&ui, &scope).unwrap();
        assert_eq!(back, db);
    }

    #[test]
    fn test_definition_without_direction() {
        let mut db = sample_definition();
        db.direction = None;
        let ui = db_definition_to_definition(db.clone()).unwrap();
        assert_eq!(ui.direction, None);
        let scope = TenantScope::new(db.tenant_id, db.company_id);
        assert_eq!(definition_to_db(&ui, &scope).unwrap(), db);
    }

    #[test]
    fn test_unknown_kpi_type_fails_loudly() {
        let now = Utc::now();
        let db = DbKpiMasterItem {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            kpi_event_id: Uuid::new_v4(),
            parent_kpi_item_id: None,
            kpi_code: "K1".to_string(),
            kpi_name: "Revenue".to_string(),
            kpi_type: "BALANCE".to_string(),
            hierarchy_level: 1,
            ref_subject_id: Some(Uuid::new_v4()),
            ref_kpi_definition_id: None,
            ref_metric_id: None,
            department_stable_id: None,
            owner_employee_id: None,
            unit: None,
            sort_order: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        assert!(matches!(
            db_item_to_item(db),
            Err(KpiError::UnsupportedKpiType(_))
        ));
    }

    #[test]
    fn test_fact_amount_mapping_parses_decimals_and_dates() {
        let now = ts(0);
        let db = DbKpiFactAmount {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            kpi_event_id: Uuid::new_v4(),
            kpi_definition_id: Uuid::new_v4(),
            period_code: "2026-04".to_string(),
            period_start_date: NaiveDate::from_ymd_opt(2026, 4, 1),
            period_end_date: NaiveDate::from_ymd_opt(2026, 4, 30),
            department_stable_id: None,
            target_value: Some(BigDecimal::from_str("500000.00").unwrap()),
            actual_value: Some(BigDecimal::from_str("520000").unwrap()),
            notes: Some("campaign month".to_string()),
            created_at: now,
            updated_at: now,
        };

        let ui = db_fact_amount_to_fact_amount(db);
        assert_eq!(ui.target_value, Some(500_000.0));
        assert_eq!(ui.actual_value, Some(520_000.0));
        assert_eq!(ui.achievement_rate, Some(104.0));
        assert_eq!(ui.period_start_date.as_deref(), Some("2026-04-01"));
        assert_eq!(ui.period_end_date.as_deref(), Some("2026-04-30"));
        assert_eq!(ui.created_at, "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_fact_amount_without_actual_has_no_rate() {
        let now = Utc::now();
        let db = DbKpiFactAmount {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            kpi_event_id: Uuid::new_v4(),
            kpi_definition_id: Uuid::new_v4(),
            period_code: "2026-05".to_string(),
            period_start_date: None,
            period_end_date: None,
            department_stable_id: Some("D-100".to_string()),
            target_value: Some(BigDecimal::from(10)),
            actual_value: None,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        let ui = db_fact_amount_to_fact_amount(db);
        assert_eq!(ui.actual_value, None);
        assert_eq!(ui.achievement_rate, None);
        assert_eq!(ui.period_start_date, None);
    }

    #[test]
    fn test_f64_to_decimal_rejects_nan() {
        assert!(f64_to_decimal(f64::NAN).is_err());
        assert!(f64_to_decimal(f64::NEG_INFINITY).is_err());
        assert_eq!(
            f64_to_decimal(1_000_000.0).unwrap(),
            BigDecimal::from(1_000_000)
        );
    }

    #[test]
    fn test_f64_to_decimal_keeps_shortest_form() {
        assert_eq!(
            f64_to_decimal(1234.56).unwrap(),
            BigDecimal::from_str("1234.56").unwrap()
        );
        assert_eq!(f64_to_decimal(0.1).unwrap().to_string(), "0.1");
        assert_eq!(
            f64_to_decimal(-0.000125).unwrap(),
            BigDecimal::from_str("-0.000125").unwrap()
        );
    }

    fn target_row(value: &str) -> DbKpiTargetValue {
        let now = Utc::now();
        DbKpiTargetValue {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            kpi_master_item_id: Uuid::new_v4(),
            period_code: "2026-Q1".to_string(),
            target_value: BigDecimal::from_str(value).unwrap(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_target_value_maps_stored_decimal() {
        let ui = db_target_value_to_target_value(target_row("1000000.50")).unwrap();
        assert_eq!(ui.target_value, 1_000_000.5);
        assert_eq!(ui.period_code, "2026-Q1");
    }

    #[test]
    fn test_out_of_range_target_value_is_reported() {
        let err = db_target_value_to_target_value(target_row("1e400")).unwrap_err();
        assert!(matches!(err, KpiError::Validation(_)));
    }

    #[test]
    fn test_fact_amount_rate_uses_stored_decimals() {
        let now = Utc::now();
        let db = DbKpiFactAmount {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            kpi_event_id: Uuid::new_v4(),
            kpi_definition_id: Uuid::new_v4(),
            period_code: "2026-07".to_string(),
            period_start_date: None,
            period_end_date: None,
            department_stable_id: None,
            target_value: Some(BigDecimal::from_str("10000").unwrap()),
            actual_value: Some(BigDecimal::from_str("10045").unwrap()),
            notes: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(db_fact_amount_to_fact_amount(db).achievement_rate, Some(100.5));
    }

    #[test]
    fn test_event_status_must_be_known() {
        let now = Utc::now();
        let db = DbKpiMasterEvent {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            event_code: "FY2026".to_string(),
            event_name: "FY2026 KPI".to_string(),
            fiscal_year: 2026,
            status: "ARCHIVED".to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        assert!(matches!(db_event_to_event(db), Err(KpiError::Validation(_))));
    }
}
