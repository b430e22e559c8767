use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::error::KpiError;

/// Isolation boundary passed to every repository call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantScope {
    pub tenant_id: Uuid,
    pub company_id: Uuid,
}

impl TenantScope {
    pub fn new(tenant_id: Uuid, company_id: Uuid) -> Self {
        Self {
            tenant_id,
            company_id,
        }
    }

    pub fn owns(&self, tenant_id: Uuid, company_id: Uuid) -> bool {
        self.tenant_id == tenant_id && self.company_id == company_id
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Draft,
    Confirmed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Confirmed => "CONFIRMED",
        }
    }

    /// DRAFT -> CONFIRMED is the only modelled transition.
    pub fn confirm(self) -> Result<Self, KpiError> {
        match self {
            Self::Draft => Ok(Self::Confirmed),
            Self::Confirmed => Err(KpiError::InvalidTransition(
                "event is already CONFIRMED".to_string(),
            )),
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed)
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventStatus {
    type Err = KpiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(Self::Draft),
            "CONFIRMED" => Ok(Self::Confirmed),
            _ => Err(KpiError::Validation(format!("Unknown event status: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KpiType {
    Financial,
    NonFinancial,
    Metric,
}

impl KpiType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Financial => "FINANCIAL",
            Self::NonFinancial => "NON_FINANCIAL",
            Self::Metric => "METRIC",
        }
    }

    /// Which of the three reference columns an item of this type must set.
    pub fn reference_kind(&self) -> ReferenceKind {
        match self {
            Self::Financial => ReferenceKind::Subject,
            Self::NonFinancial => ReferenceKind::KpiDefinition,
            Self::Metric => ReferenceKind::Metric,
        }
    }

    /// FINANCIAL and METRIC items are planned through target values, not fact amounts.
    pub fn uses_target_values(&self) -> bool {
        matches!(self, Self::Financial | Self::Metric)
    }
}

impl std::fmt::Display for KpiType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for KpiType {
    type Err = KpiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FINANCIAL" => Ok(Self::Financial),
            "NON_FINANCIAL" => Ok(Self::NonFinancial),
            "METRIC" => Ok(Self::Metric),
            _ => Err(KpiError::UnsupportedKpiType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    Subject,
    KpiDefinition,
    Metric,
    KpiMasterItem,
}

impl ReferenceKind {
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Subject => "subjectId",
            Self::KpiDefinition => "kpiDefinitionId",
            Self::Metric => "metricId",
            Self::KpiMasterItem => "kpiMasterItemId",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "i16", into = "i16")]
pub enum HierarchyLevel {
    Kgi,
    Kpi,
}

impl HierarchyLevel {
    pub fn as_i16(&self) -> i16 {
        match self {
            Self::Kgi => 1,
            Self::Kpi => 2,
        }
    }
}

impl TryFrom<i16> for HierarchyLevel {
    type Error = KpiError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Kgi),
            2 => Ok(Self::Kpi),
            _ => Err(KpiError::Validation(format!(
                "Unknown hierarchy level: {value}"
            ))),
        }
    }
}

impl From<HierarchyLevel> for i16 {
    fn from(level: HierarchyLevel) -> Self {
        level.as_i16()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregationMethod {
    Sum,
    Eop,
    Avg,
    Max,
    Min,
}

impl AggregationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sum => "SUM",
            Self::Eop => "EOP",
            Self::Avg => "AVG",
            Self::Max => "MAX",
            Self::Min => "MIN",
        }
    }
}

impl std::fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AggregationMethod {
    type Err = KpiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUM" => Ok(Self::Sum),
            "EOP" => Ok(Self::Eop),
            "AVG" => Ok(Self::Avg),
            "MAX" => Ok(Self::Max),
            "MIN" => Ok(Self::Min),
            _ => Err(KpiError::Validation(format!(
                "Unknown aggregation method: {s}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HigherIsBetter => "higher_is_better",
            Self::LowerIsBetter => "lower_is_better",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Direction {
    type Err = KpiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "higher_is_better" => Ok(Self::HigherIsBetter),
            "lower_is_better" => Ok(Self::LowerIsBetter),
            _ => Err(KpiError::Validation(format!("Unknown direction: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Judgement {
    Achieved,
    NotAchieved,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KpiMasterEvent {
    pub id: Uuid,
    pub event_code: String,
    pub event_name: String,
    pub fiscal_year: i32,
    pub status: EventStatus,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KpiMasterItem {
    pub id: Uuid,
    pub kpi_event_id: Uuid,
    pub parent_kpi_item_id: Option<Uuid>,
    pub kpi_code: String,
    pub kpi_name: String,
    pub kpi_type: KpiType,
    pub hierarchy_level: HierarchyLevel,
    pub ref_subject_id: Option<Uuid>,
    pub ref_kpi_definition_id: Option<Uuid>,
    pub ref_metric_id: Option<Uuid>,
    pub department_stable_id: Option<String>,
    pub owner_employee_id: Option<Uuid>,
    pub unit: Option<String>,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KpiDefinition {
    pub id: Uuid,
    pub kpi_code: String,
    pub kpi_name: String,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub aggregation_method: AggregationMethod,
    pub direction: Option<Direction>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KpiFactAmount {
    pub id: Uuid,
    pub kpi_event_id: Uuid,
    pub kpi_definition_id: Uuid,
    pub period_code: String,
    pub period_start_date: Option<String>,
    pub period_end_date: Option<String>,
    pub department_stable_id: Option<String>,
    pub target_value: Option<f64>,
    pub actual_value: Option<f64>,
    pub achievement_rate: Option<f64>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KpiTargetValue {
    pub id: Uuid,
    pub kpi_master_item_id: Uuid,
    pub period_code: String,
    pub target_value: f64,
    pub created_at: String,
    pub updated_at: String,
}

/// Per-period view of an item, rebuilt on every read and never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeriodFact {
    pub period_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub achievement_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub judgement: Option<Judgement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

pub type PeriodFacts = BTreeMap<String, PeriodFact>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KpiItemDetail {
    #[serde(flatten)]
    pub item: KpiMasterItem,
    pub period_facts: PeriodFacts,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KpiItemNode {
    #[serde(flatten)]
    pub item: KpiMasterItem,
    pub children: Vec<KpiItemNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKpiEventRequest {
    pub event_code: String,
    pub event_name: String,
    pub fiscal_year: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateKpiEventRequest {
    pub event_name: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKpiDefinitionRequest {
    pub kpi_code: String,
    pub kpi_name: String,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub aggregation_method: AggregationMethod,
    pub direction: Option<Direction>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateKpiDefinitionRequest {
    pub kpi_name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub unit: Option<Option<String>>,
    pub aggregation_method: Option<AggregationMethod>,
    #[serde(default, deserialize_with = "double_option")]
    pub direction: Option<Option<Direction>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKpiItemRequest {
    pub kpi_event_id: Uuid,
    pub parent_kpi_item_id: Option<Uuid>,
    pub kpi_code: String,
    pub kpi_name: String,
    pub kpi_type: KpiType,
    pub hierarchy_level: HierarchyLevel,
    pub ref_subject_id: Option<Uuid>,
    pub ref_kpi_definition_id: Option<Uuid>,
    pub ref_metric_id: Option<Uuid>,
    pub department_stable_id: Option<String>,
    pub owner_employee_id: Option<Uuid>,
    pub unit: Option<String>,
    pub sort_order: Option<i32>,
}

/// `kpiType` and the reference fields are accepted only so that a malformed
/// payload trying to change them can be rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateKpiItemRequest {
    pub kpi_name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub parent_kpi_item_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub department_stable_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub owner_employee_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub unit: Option<Option<String>>,
    pub sort_order: Option<i32>,
    pub kpi_type: Option<KpiType>,
    #[serde(default, deserialize_with = "double_option")]
    pub ref_subject_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub ref_kpi_definition_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub ref_metric_id: Option<Option<Uuid>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFactAmountRequest {
    pub kpi_event_id: Uuid,
    pub kpi_definition_id: Uuid,
    pub period_code: String,
    pub period_start_date: Option<chrono::NaiveDate>,
    pub period_end_date: Option<chrono::NaiveDate>,
    pub department_stable_id: Option<String>,
    pub target_value: Option<f64>,
    pub actual_value: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFactAmountRequest {
    #[serde(default, deserialize_with = "double_option")]
    pub target_value: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub actual_value: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTargetValueRequest {
    pub kpi_master_item_id: Uuid,
    pub period_code: String,
    pub target_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTargetValueRequest {
    pub target_value: f64,
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_kpi_type_parse_and_display() {
        for kpi_type in [KpiType::Financial, KpiType::NonFinancial, KpiType::Metric] {
            assert_eq!(KpiType::from_str(kpi_type.as_str()).unwrap(), kpi_type);
        }
        assert!(matches!(
            KpiType::from_str("BALANCE"),
            Err(KpiError::UnsupportedKpiType(s)) if s == "BALANCE"
        ));
    }

    #[test]
    fn test_kpi_type_reference_kind() {
        assert_eq!(KpiType::Financial.reference_kind(), ReferenceKind::Subject);
        assert_eq!(
            KpiType::NonFinancial.reference_kind(),
            ReferenceKind::KpiDefinition
        );
        assert_eq!(KpiType::Metric.reference_kind(), ReferenceKind::Metric);
        assert!(KpiType::Metric.uses_target_values());
        assert!(!KpiType::NonFinancial.uses_target_values());
    }

    #[test]
    fn test_event_status_is_one_way() {
        let confirmed = EventStatus::Draft.confirm().unwrap();
        assert_eq!(confirmed, EventStatus::Confirmed);
        assert!(matches!(
            confirmed.confirm(),
            Err(KpiError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_hierarchy_level_serde() {
        assert_eq!(serde_json::to_string(&HierarchyLevel::Kgi).unwrap(), "1");
        let level: HierarchyLevel = serde_json::from_str("2").unwrap();
        assert_eq!(level, HierarchyLevel::Kpi);
        assert!(serde_json::from_str::<HierarchyLevel>("3").is_err());
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(
            serde_json::to_string(&KpiType::NonFinancial).unwrap(),
            "\"NON_FINANCIAL\""
        );
        assert_eq!(
            serde_json::to_string(&Direction::LowerIsBetter).unwrap(),
            "\"lower_is_better\""
        );
        assert_eq!(
            serde_json::to_string(&AggregationMethod::Eop).unwrap(),
            "\"EOP\""
        );
    }

    #[test]
    fn test_update_request_distinguishes_null_from_missing() {
        let req: UpdateKpiItemRequest =
            serde_json::from_str(r#"{"kpiName":"Sales","parentKpiItemId":null}"#).unwrap();
        assert_eq!(req.kpi_name.as_deref(), Some("Sales"));
        assert_eq!(req.parent_kpi_item_id, Some(None));
        assert_eq!(req.unit, None);
        assert_eq!(req.ref_subject_id, None);
    }

    #[test]
    fn test_period_fact_omits_absent_values() {
        let fact = PeriodFact {
            period_code: "2026-Q1".to_string(),
            target_value: Some(1_000_000.0),
            actual_value: None,
            achievement_rate: None,
            judgement: None,
            notes: None,
        };
        let json = serde_json::to_value(&fact).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "periodCode": "2026-Q1", "targetValue": 1000000.0 })
        );
    }
}
