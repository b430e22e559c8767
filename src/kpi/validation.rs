//! Structural guards run before anything is written: reference cardinality,
//! type/reference consistency, hierarchy shape, immutability, and
//! delete-protection of confirmed events.

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::error::KpiError;
use super::repository::KpiRepository;
use super::storage::{DbKpiMasterEvent, DbKpiMasterItem};
use super::types::{
    CreateKpiItemRequest, EventStatus, HierarchyLevel, KpiType, ReferenceKind, TenantScope,
    UpdateKpiItemRequest,
};

/// Reference columns of a KPI master item, before validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemReferences {
    pub subject_id: Option<Uuid>,
    pub kpi_definition_id: Option<Uuid>,
    pub metric_id: Option<Uuid>,
}

impl From<&CreateKpiItemRequest> for ItemReferences {
    fn from(req: &CreateKpiItemRequest) -> Self {
        Self {
            subject_id: req.ref_subject_id,
            kpi_definition_id: req.ref_kpi_definition_id,
            metric_id: req.ref_metric_id,
        }
    }
}

/// Link from an action plan to either an account subject or a KPI item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPlanReference {
    pub subject_id: Option<Uuid>,
    pub kpi_master_item_id: Option<Uuid>,
}

/// A reference that passed the cardinality check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum ReferenceTarget {
    Subject(Uuid),
    KpiDefinition(Uuid),
    Metric(Uuid),
    KpiMasterItem(Uuid),
}

impl ReferenceTarget {
    pub fn kind(&self) -> ReferenceKind {
        match self {
            Self::Subject(_) => ReferenceKind::Subject,
            Self::KpiDefinition(_) => ReferenceKind::KpiDefinition,
            Self::Metric(_) => ReferenceKind::Metric,
            Self::KpiMasterItem(_) => ReferenceKind::KpiMasterItem,
        }
    }

    pub fn id(&self) -> Uuid {
        match *self {
            Self::Subject(id)
            | Self::KpiDefinition(id)
            | Self::Metric(id)
            | Self::KpiMasterItem(id) => id,
        }
    }
}

fn exactly_one(candidates: Vec<ReferenceTarget>) -> Result<ReferenceTarget, KpiError> {
    match candidates.as_slice() {
        [single] => Ok(*single),
        [] => Err(KpiError::InvalidReference(
            "exactly one reference is required, none given".to_string(),
        )),
        many => Err(KpiError::InvalidReference(format!(
            "exactly one reference is required, got {}: {}",
            many.len(),
            many.iter()
                .map(|r| r.kind().field_name())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

/// Cardinality check only; no lookups.
pub fn check_item_references(refs: &ItemReferences) -> Result<ReferenceTarget, KpiError> {
    let candidates = [
        refs.subject_id.map(ReferenceTarget::Subject),
        refs.kpi_definition_id.map(ReferenceTarget::KpiDefinition),
        refs.metric_id.map(ReferenceTarget::Metric),
    ]
    .into_iter()
    .flatten()
    .collect();
    exactly_one(candidates)
}

pub fn check_action_plan_reference(
    reference: &ActionPlanReference,
) -> Result<ReferenceTarget, KpiError> {
    let candidates = [
        reference.subject_id.map(ReferenceTarget::Subject),
        reference.kpi_master_item_id.map(ReferenceTarget::KpiMasterItem),
    ]
    .into_iter()
    .flatten()
    .collect();
    exactly_one(candidates)
}

pub fn check_reference_matches_type(
    kpi_type: KpiType,
    target: &ReferenceTarget,
) -> Result<(), KpiError> {
    let expected = kpi_type.reference_kind();
    if target.kind() == expected {
        Ok(())
    } else {
        Err(KpiError::InvalidReference(format!(
            "{kpi_type} items must reference {}, got {}",
            expected.field_name(),
            target.kind().field_name()
        )))
    }
}

/// Existence and active check through the repository.
pub fn ensure_reference_exists<R: KpiRepository + ?Sized>(
    repo: &R,
    scope: &TenantScope,
    target: &ReferenceTarget,
) -> Result<(), KpiError> {
    let active = match *target {
        ReferenceTarget::Subject(id) => repo.subject_is_active(scope, id)?,
        ReferenceTarget::Metric(id) => repo.metric_is_active(scope, id)?,
        ReferenceTarget::KpiDefinition(id) => repo
            .find_definition(scope, id)?
            .is_some_and(|d| d.is_active),
        ReferenceTarget::KpiMasterItem(id) => {
            repo.find_item(scope, id)?.is_some_and(|i| i.is_active)
        }
    };
    if active {
        Ok(())
    } else {
        warn!(
            "Rejected reference to missing or inactive {} {}",
            target.kind().field_name(),
            target.id()
        );
        Err(KpiError::not_found(target.kind().field_name(), target.id()))
    }
}

/// Full KPI-item reference validation: cardinality, kind matching the
/// item's type, then existence.
pub fn validate_item_references<R: KpiRepository + ?Sized>(
    repo: &R,
    scope: &TenantScope,
    kpi_type: KpiType,
    refs: &ItemReferences,
) -> Result<ReferenceTarget, KpiError> {
    let target = check_item_references(refs)?;
    check_reference_matches_type(kpi_type, &target)?;
    ensure_reference_exists(repo, scope, &target)?;
    Ok(target)
}

pub fn validate_action_plan_reference<R: KpiRepository + ?Sized>(
    repo: &R,
    scope: &TenantScope,
    reference: &ActionPlanReference,
) -> Result<ReferenceTarget, KpiError> {
    let target = check_action_plan_reference(reference)?;
    ensure_reference_exists(repo, scope, &target)?;
    Ok(target)
}

pub fn require_non_empty(field: &str, value: &str) -> Result<(), KpiError> {
    if value.trim().is_empty() {
        return Err(KpiError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

pub fn validate_period_code(period_code: &str) -> Result<(), KpiError> {
    require_non_empty("periodCode", period_code)?;
    if period_code.chars().any(char::is_whitespace) || period_code.len() > 32 {
        return Err(KpiError::Validation(format!(
            "Invalid periodCode: {period_code}"
        )));
    }
    Ok(())
}

/// Rejects any attempt to change kpiType or a reference column.
pub fn ensure_immutable_fields(
    existing: &DbKpiMasterItem,
    req: &UpdateKpiItemRequest,
) -> Result<(), KpiError> {
    if let Some(kpi_type) = req.kpi_type {
        if kpi_type.as_str() != existing.kpi_type {
            return Err(KpiError::ImmutableField("kpiType"));
        }
    }
    let references = [
        ("refSubjectId", req.ref_subject_id, existing.ref_subject_id),
        (
            "refKpiDefinitionId",
            req.ref_kpi_definition_id,
            existing.ref_kpi_definition_id,
        ),
        ("refMetricId", req.ref_metric_id, existing.ref_metric_id),
    ];
    for (field, requested, current) in references {
        if let Some(requested) = requested {
            if requested != current {
                return Err(KpiError::ImmutableField(field));
            }
        }
    }
    Ok(())
}

/// Level 1 items are roots. A level 2 item may hang under an active level 1
/// item of the same event.
pub fn check_parent(
    level: HierarchyLevel,
    kpi_event_id: Uuid,
    parent: Option<&DbKpiMasterItem>,
) -> Result<(), KpiError> {
    let Some(parent) = parent else {
        return Ok(());
    };
    if level == HierarchyLevel::Kgi {
        return Err(KpiError::Validation(
            "KGI items cannot have a parent".to_string(),
        ));
    }
    if parent.kpi_event_id != kpi_event_id {
        return Err(KpiError::Validation(
            "parent item belongs to another event".to_string(),
        ));
    }
    if !parent.is_active {
        return Err(KpiError::not_found("parent kpi item", parent.id));
    }
    if parent.hierarchy_level != HierarchyLevel::Kgi.as_i16() {
        return Err(KpiError::Validation(
            "parent item must be a KGI".to_string(),
        ));
    }
    Ok(())
}

/// Walks up from `new_parent` through `parents` (item id -> parent id) and
/// fails if it reaches `item_id`.
pub fn ensure_no_cycle(
    item_id: Uuid,
    new_parent: Option<Uuid>,
    parents: &HashMap<Uuid, Option<Uuid>>,
) -> Result<(), KpiError> {
    let mut cursor = new_parent;
    let mut steps = 0usize;
    while let Some(current) = cursor {
        if current == item_id {
            return Err(KpiError::Validation(
                "parent assignment would create a cycle".to_string(),
            ));
        }
        steps += 1;
        if steps > parents.len() {
            return Err(KpiError::Validation(
                "existing hierarchy already contains a cycle".to_string(),
            ));
        }
        cursor = parents.get(&current).copied().flatten();
    }
    Ok(())
}

pub fn ensure_event_editable(event: &DbKpiMasterEvent) -> Result<(), KpiError> {
    if event.status == EventStatus::Confirmed.as_str() {
        return Err(KpiError::Validation(format!(
            "event {} is CONFIRMED",
            event.event_code
        )));
    }
    Ok(())
}
