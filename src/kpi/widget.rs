//! Display configuration for KPI dashboard widgets.
//!
//! Stored configs are JSON blobs. They are resolved once, at load time, into
//! a tagged enum keyed by `componentType`. Nothing downstream guesses the
//! widget kind from which fields happen to be present.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::KpiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Line,
    Bar,
    Area,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FactColumn {
    PeriodCode,
    TargetValue,
    ActualValue,
    AchievementRate,
    Judgement,
    Notes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GaugeBands {
    pub warning_below: f64,
    pub critical_below: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "componentType", rename_all = "camelCase")]
pub enum WidgetDisplayConfig {
    #[serde(rename_all = "camelCase")]
    KpiCard {
        kpi_item_id: Uuid,
        period_code: Option<String>,
        #[serde(default = "default_true")]
        show_achievement_rate: bool,
    },
    #[serde(rename_all = "camelCase")]
    TrendChart {
        kpi_item_ids: Vec<Uuid>,
        chart_kind: ChartKind,
        #[serde(default)]
        show_target_line: bool,
    },
    #[serde(rename_all = "camelCase")]
    FactTable {
        kpi_item_id: Uuid,
        columns: Vec<FactColumn>,
    },
    #[serde(rename_all = "camelCase")]
    Gauge {
        kpi_item_id: Uuid,
        bands: Option<GaugeBands>,
    },
}

fn default_true() -> bool {
    true
}

impl WidgetDisplayConfig {
    pub fn from_value(value: serde_json::Value) -> Result<Self, KpiError> {
        let config: Self = serde_json::from_value(value)
            .map_err(|e| KpiError::Validation(format!("Invalid widget config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_value(&self) -> Result<serde_json::Value, KpiError> {
        serde_json::to_value(self)
            .map_err(|e| KpiError::Validation(format!("Unserializable widget config: {e}")))
    }

    pub fn component_type(&self) -> &'static str {
        match self {
            Self::KpiCard { .. } => "kpiCard",
            Self::TrendChart { .. } => "trendChart",
            Self::FactTable { .. } => "factTable",
            Self::Gauge { .. } => "gauge",
        }
    }

    /// KPI items whose period facts the widget needs.
    pub fn referenced_items(&self) -> Vec<Uuid> {
        match self {
            Self::KpiCard { kpi_item_id, .. }
            | Self::FactTable { kpi_item_id, .. }
            | Self::Gauge { kpi_item_id, .. } => vec![*kpi_item_id],
            Self::TrendChart { kpi_item_ids, .. } => kpi_item_ids.clone(),
        }
    }

    fn validate(&self) -> Result<(), KpiError> {
        match self {
            Self::TrendChart { kpi_item_ids, .. } if kpi_item_ids.is_empty() => Err(
                KpiError::Validation("trendChart needs at least one KPI item".to_string()),
            ),
            Self::FactTable { columns, .. } if columns.is_empty() => Err(KpiError::Validation(
                "factTable needs at least one column".to_string(),
            )),
            Self::Gauge {
                bands: Some(bands), ..
            } if bands.critical_below > bands.warning_below => Err(KpiError::Validation(
                "gauge critical band must not exceed warning band".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolves_by_component_type() {
        let id = Uuid::new_v4();
        let config = WidgetDisplayConfig::from_value(json!({
            "componentType": "kpiCard",
            "kpiItemId": id,
            "periodCode": "2026-04"
        }))
        .unwrap();
        assert_eq!(
            config,
            WidgetDisplayConfig::KpiCard {
                kpi_item_id: id,
                period_code: Some("2026-04".to_string()),
                show_achievement_rate: true,
            }
        );
        assert_eq!(config.component_type(), "kpiCard");
        assert_eq!(config.referenced_items(), vec![id]);
    }

    #[test]
    fn test_missing_or_unknown_tag_is_rejected() {
        let id = Uuid::new_v4();
        assert!(WidgetDisplayConfig::from_value(json!({ "kpiItemId": id })).is_err());
        assert!(WidgetDisplayConfig::from_value(json!({
            "componentType": "pieChart",
            "kpiItemId": id
        }))
        .is_err());
    }

    #[test]
    fn test_structural_rules() {
        assert!(WidgetDisplayConfig::from_value(json!({
            "componentType": "trendChart",
            "kpiItemIds": [],
            "chartKind": "line"
        }))
        .is_err());
        assert!(WidgetDisplayConfig::from_value(json!({
            "componentType": "gauge",
            "kpiItemId": Uuid::new_v4(),
            "bands": { "warningBelow": 80.0, "criticalBelow": 90.0 }
        }))
        .is_err());
    }

    #[test]
    fn test_value_round_trip_keeps_tag() {
        let ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        let config = WidgetDisplayConfig::TrendChart {
            kpi_item_ids: ids.clone(),
            chart_kind: ChartKind::Bar,
            show_target_line: true,
        };
        let value = config.to_value().unwrap();
        assert_eq!(value["componentType"], "trendChart");
        assert_eq!(value["chartKind"], "bar");
        assert_eq!(WidgetDisplayConfig::from_value(value).unwrap(), config);
        assert_eq!(config.referenced_items(), ids);
    }
}
