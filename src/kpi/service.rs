use chrono::Utc;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::KpiConfig;
use crate::shared::paging::{ListQuery, Page};

use super::error::KpiError;
use super::period_facts::assemble_with_direction;
use super::repository::KpiRepository;
use super::storage::{
    db_definition_to_definition, db_event_to_event, db_fact_amount_to_fact_amount,
    db_item_to_item, db_target_value_to_target_value, f64_to_decimal, DbKpiDefinition,
    DbKpiFactAmount, DbKpiMasterEvent, DbKpiMasterItem, DbKpiTargetValue,
};
use super::types::{
    CreateFactAmountRequest, CreateKpiDefinitionRequest, CreateKpiEventRequest,
    CreateKpiItemRequest, CreateTargetValueRequest, Direction, EventStatus, HierarchyLevel,
    KpiDefinition, KpiFactAmount, KpiItemDetail, KpiItemNode, KpiMasterEvent, KpiMasterItem,
    KpiTargetValue, KpiType, TenantScope, UpdateFactAmountRequest, UpdateKpiDefinitionRequest,
    UpdateKpiEventRequest, UpdateKpiItemRequest, UpdateTargetValueRequest,
};
use super::validation::{
    check_parent, ensure_event_editable, ensure_immutable_fields, ensure_no_cycle,
    require_non_empty, validate_action_plan_reference, validate_item_references,
    validate_period_code, ActionPlanReference, ItemReferences, ReferenceTarget,
};

fn optional_decimal(value: Option<f64>) -> Result<Option<bigdecimal::BigDecimal>, KpiError> {
    value.map(f64_to_decimal).transpose()
}

/// KPI operations for one request. Holds no state beyond its collaborators.
pub struct KpiService<R: KpiRepository + ?Sized> {
    repo: Arc<R>,
    config: KpiConfig,
}

impl<R: KpiRepository + ?Sized> Clone for KpiService<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            config: self.config.clone(),
        }
    }
}

impl<R: KpiRepository + ?Sized> KpiService<R> {
    pub fn new(repo: Arc<R>, config: KpiConfig) -> Self {
        Self { repo, config }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn config(&self) -> &KpiConfig {
        &self.config
    }

    fn load_event(&self, scope: &TenantScope, id: Uuid) -> Result<DbKpiMasterEvent, KpiError> {
        self.repo
            .find_event(scope, id)?
            .ok_or_else(|| KpiError::not_found("kpi event", id))
    }

    fn load_definition(&self, scope: &TenantScope, id: Uuid) -> Result<DbKpiDefinition, KpiError> {
        self.repo
            .find_definition(scope, id)?
            .ok_or_else(|| KpiError::not_found("kpi definition", id))
    }

    fn load_item(&self, scope: &TenantScope, id: Uuid) -> Result<DbKpiMasterItem, KpiError> {
        self.repo
            .find_item(scope, id)?
            .ok_or_else(|| KpiError::not_found("kpi item", id))
    }

    // ---- events ----

    pub fn create_event(
        &self,
        scope: &TenantScope,
        req: CreateKpiEventRequest,
    ) -> Result<KpiMasterEvent, KpiError> {
        require_non_empty("eventCode", &req.event_code)?;
        require_non_empty("eventName", &req.event_name)?;
        if !self.config.fiscal_year_in_range(req.fiscal_year) {
            return Err(KpiError::Validation(format!(
                "fiscalYear {} is outside {}..={}",
                req.fiscal_year, self.config.min_fiscal_year, self.config.max_fiscal_year
            )));
        }
        if self.repo.find_event_by_code(scope, &req.event_code)?.is_some() {
            return Err(KpiError::Conflict(format!(
                "event code {} already exists",
                req.event_code
            )));
        }

        let now = Utc::now();
        let record = self.repo.create_event(DbKpiMasterEvent {
            id: Uuid::new_v4(),
            tenant_id: scope.tenant_id,
            company_id: scope.company_id,
            event_code: req.event_code,
            event_name: req.event_name,
            fiscal_year: req.fiscal_year,
            status: EventStatus::Draft.as_str().to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        })?;
        info!(
            "Created KPI event {} ({}) for FY{}",
            record.event_code, record.id, record.fiscal_year
        );
        db_event_to_event(record)
    }

    pub fn get_event(&self, scope: &TenantScope, id: Uuid) -> Result<KpiMasterEvent, KpiError> {
        db_event_to_event(self.load_event(scope, id)?)
    }

    pub fn list_events(
        &self,
        scope: &TenantScope,
        query: &ListQuery,
    ) -> Result<Page<KpiMasterEvent>, KpiError> {
        self.repo
            .list_events(scope, &query.resolved(&self.config))?
            .map(db_event_to_event)
    }

    pub fn update_event(
        &self,
        scope: &TenantScope,
        id: Uuid,
        req: UpdateKpiEventRequest,
    ) -> Result<KpiMasterEvent, KpiError> {
        let mut record = self.load_event(scope, id)?;
        ensure_event_editable(&record)?;
        if let Some(name) = req.event_name {
            require_non_empty("eventName", &name)?;
            record.event_name = name;
        }
        if let Some(is_active) = req.is_active {
            record.is_active = is_active;
        }
        record.updated_at = Utc::now();
        db_event_to_event(self.repo.update_event(record)?)
    }

    pub fn confirm_event(&self, scope: &TenantScope, id: Uuid) -> Result<KpiMasterEvent, KpiError> {
        let mut record = self.load_event(scope, id)?;
        let next = EventStatus::from_str(&record.status)?.confirm()?;
        record.status = next.as_str().to_string();
        record.updated_at = Utc::now();
        let record = self.repo.update_event(record)?;
        info!("Confirmed KPI event {} ({})", record.event_code, record.id);
        db_event_to_event(record)
    }

    // ---- definitions ----

    pub fn create_definition(
        &self,
        scope: &TenantScope,
        req: CreateKpiDefinitionRequest,
    ) -> Result<KpiDefinition, KpiError> {
        require_non_empty("kpiCode", &req.kpi_code)?;
        require_non_empty("kpiName", &req.kpi_name)?;
        if self
            .repo
            .find_definition_by_code(scope, &req.kpi_code)?
            .is_some()
        {
            return Err(KpiError::Conflict(format!(
                "kpi definition code {} already exists",
                req.kpi_code
            )));
        }

        let now = Utc::now();
        let record = self.repo.create_definition(DbKpiDefinition {
            id: Uuid::new_v4(),
            tenant_id: scope.tenant_id,
            company_id: scope.company_id,
            kpi_code: req.kpi_code,
            kpi_name: req.kpi_name,
            description: req.description,
            unit: req.unit,
            aggregation_method: req.aggregation_method.as_str().to_string(),
            direction: req.direction.map(|d| d.as_str().to_string()),
            is_active: true,
            created_at: now,
            updated_at: now,
        })?;
        info!("Created KPI definition {} ({})", record.kpi_code, record.id);
        db_definition_to_definition(record)
    }

    pub fn get_definition(&self, scope: &TenantScope, id: Uuid) -> Result<KpiDefinition, KpiError> {
        db_definition_to_definition(self.load_definition(scope, id)?)
    }

    pub fn list_definitions(
        &self,
        scope: &TenantScope,
        query: &ListQuery,
    ) -> Result<Page<KpiDefinition>, KpiError> {
        self.repo
            .list_definitions(scope, &query.resolved(&self.config))?
            .map(db_definition_to_definition)
    }

    pub fn update_definition(
        &self,
        scope: &TenantScope,
        id: Uuid,
        req: UpdateKpiDefinitionRequest,
    ) -> Result<KpiDefinition, KpiError> {
        let mut record = self.load_definition(scope, id)?;
        if let Some(name) = req.kpi_name {
            require_non_empty("kpiName", &name)?;
            record.kpi_name = name;
        }
        if let Some(description) = req.description {
            record.description = description;
        }
        if let Some(unit) = req.unit {
            record.unit = unit;
        }
        if let Some(method) = req.aggregation_method {
            record.aggregation_method = method.as_str().to_string();
        }
        if let Some(direction) = req.direction {
            record.direction = direction.map(|d| d.as_str().to_string());
        }
        if let Some(is_active) = req.is_active {
            record.is_active = is_active;
        }
        record.updated_at = Utc::now();
        db_definition_to_definition(self.repo.update_definition(record)?)
    }

    // ---- items ----

    /// Everything is validated before the repository sees a write.
    pub fn create_item(
        &self,
        scope: &TenantScope,
        req: CreateKpiItemRequest,
    ) -> Result<KpiMasterItem, KpiError> {
        let refs = ItemReferences::from(&req);
        let target = match validate_item_references(&*self.repo, scope, req.kpi_type, &refs) {
            Ok(target) => target,
            Err(e) => {
                warn!("Rejected KPI item {}: {}", req.kpi_code, e);
                return Err(e);
            }
        };
        require_non_empty("kpiCode", &req.kpi_code)?;
        require_non_empty("kpiName", &req.kpi_name)?;

        let event = self.load_event(scope, req.kpi_event_id)?;
        if !event.is_active {
            return Err(KpiError::not_found("kpi event", event.id));
        }
        let parent = req
            .parent_kpi_item_id
            .map(|id| self.load_item(scope, id))
            .transpose()?;
        check_parent(req.hierarchy_level, event.id, parent.as_ref())?;
        if self
            .repo
            .find_item_by_code(scope, event.id, &req.kpi_code)?
            .is_some()
        {
            return Err(KpiError::Conflict(format!(
                "kpi item code {} already exists in event {}",
                req.kpi_code, event.event_code
            )));
        }

        let sort_order = match req.sort_order {
            Some(order) => order,
            None => self.next_sort_order(scope, event.id, req.parent_kpi_item_id)?,
        };
        let now = Utc::now();
        let record = self.repo.create_item(DbKpiMasterItem {
            id: Uuid::new_v4(),
            tenant_id: scope.tenant_id,
            company_id: scope.company_id,
            kpi_event_id: event.id,
            parent_kpi_item_id: req.parent_kpi_item_id,
            kpi_code: req.kpi_code,
            kpi_name: req.kpi_name,
            kpi_type: req.kpi_type.as_str().to_string(),
            hierarchy_level: req.hierarchy_level.as_i16(),
            ref_subject_id: refs.subject_id,
            ref_kpi_definition_id: refs.kpi_definition_id,
            ref_metric_id: refs.metric_id,
            department_stable_id: req.department_stable_id,
            owner_employee_id: req.owner_employee_id,
            unit: req.unit,
            sort_order,
            is_active: true,
            created_at: now,
            updated_at: now,
        })?;
        info!(
            "Created KPI item {} ({}) in event {} referencing {:?}",
            record.kpi_code, record.id, event.event_code, target
        );
        db_item_to_item(record)
    }

    fn next_sort_order(
        &self,
        scope: &TenantScope,
        event_id: Uuid,
        parent: Option<Uuid>,
    ) -> Result<i32, KpiError> {
        Ok(self
            .repo
            .list_items(scope, event_id)?
            .iter()
            .filter(|i| i.parent_kpi_item_id == parent)
            .map(|i| i.sort_order)
            .max()
            .map_or(0, |max| max.saturating_add(1)))
    }

    pub fn get_item(&self, scope: &TenantScope, id: Uuid) -> Result<KpiMasterItem, KpiError> {
        db_item_to_item(self.load_item(scope, id)?)
    }

    pub fn update_item(
        &self,
        scope: &TenantScope,
        id: Uuid,
        req: UpdateKpiItemRequest,
    ) -> Result<KpiMasterItem, KpiError> {
        let mut record = self.load_item(scope, id)?;
        if let Err(e) = ensure_immutable_fields(&record, &req) {
            warn!("Rejected update of KPI item {}: {}", record.id, e);
            return Err(e);
        }

        if let Some(parent_id) = req.parent_kpi_item_id {
            if parent_id != record.parent_kpi_item_id {
                let level = HierarchyLevel::try_from(record.hierarchy_level)?;
                let parent = parent_id
                    .map(|pid| self.load_item(scope, pid))
                    .transpose()?;
                check_parent(level, record.kpi_event_id, parent.as_ref())?;
                let parents: HashMap<Uuid, Option<Uuid>> = self
                    .repo
                    .list_items(scope, record.kpi_event_id)?
                    .into_iter()
                    .map(|i| (i.id, i.parent_kpi_item_id))
                    .collect();
                ensure_no_cycle(record.id, parent_id, &parents)?;
                record.parent_kpi_item_id = parent_id;
            }
        }
        if let Some(name) = req.kpi_name {
            require_non_empty("kpiName", &name)?;
            record.kpi_name = name;
        }
        if let Some(department) = req.department_stable_id {
            record.department_stable_id = department;
        }
        if let Some(owner) = req.owner_employee_id {
            record.owner_employee_id = owner;
        }
        if let Some(unit) = req.unit {
            record.unit = unit;
        }
        if let Some(sort_order) = req.sort_order {
            record.sort_order = sort_order;
        }
        record.updated_at = Utc::now();
        db_item_to_item(self.repo.update_item(record)?)
    }

    /// Soft delete. Items of a CONFIRMED event are protected.
    pub fn delete_item(&self, scope: &TenantScope, id: Uuid) -> Result<(), KpiError> {
        let mut record = self.load_item(scope, id)?;
        let event = self.load_event(scope, record.kpi_event_id)?;
        ensure_event_editable(&event)?;
        let has_active_children = self
            .repo
            .list_items(scope, record.kpi_event_id)?
            .iter()
            .any(|i| i.is_active && i.parent_kpi_item_id == Some(record.id));
        if has_active_children {
            return Err(KpiError::Validation(format!(
                "kpi item {} still has active children",
                record.kpi_code
            )));
        }
        record.is_active = false;
        record.updated_at = Utc::now();
        self.repo.update_item(record)?;
        info!("Deactivated KPI item {id}");
        Ok(())
    }

    /// The item plus its period facts, assembled fresh from storage.
    pub fn get_item_detail(
        &self,
        scope: &TenantScope,
        id: Uuid,
    ) -> Result<KpiItemDetail, KpiError> {
        let record = self.load_item(scope, id)?;
        let item = db_item_to_item(record)?;

        let (fact_amounts, target_values, direction) = match item.kpi_type {
            KpiType::NonFinancial => {
                let definition_id = item.ref_kpi_definition_id.ok_or_else(|| {
                    KpiError::InvalidReference(format!(
                        "NON_FINANCIAL item {} has no kpi definition",
                        item.kpi_code
                    ))
                })?;
                let direction = self
                    .repo
                    .find_definition(scope, definition_id)?
                    .and_then(|d| d.direction)
                    .map(|d| Direction::from_str(&d))
                    .transpose()?;
                let facts = self
                    .repo
                    .list_fact_amounts(scope, item.kpi_event_id, definition_id)?;
                (facts, Vec::new(), direction)
            }
            KpiType::Financial | KpiType::Metric => {
                (Vec::new(), self.repo.list_target_values(scope, item.id)?, None)
            }
        };

        let period_facts =
            assemble_with_direction(item.kpi_type, &fact_amounts, &target_values, direction);
        debug!(
            "Item {} detail: {} fact rows, {} target rows",
            item.kpi_code,
            fact_amounts.len(),
            target_values.len()
        );
        Ok(KpiItemDetail { item, period_facts })
    }

    /// Active items of an event as a KGI/KPI forest. Siblings follow
    /// sortOrder, then code. Items whose parent is inactive surface as roots.
    pub fn list_item_tree(
        &self,
        scope: &TenantScope,
        event_id: Uuid,
    ) -> Result<Vec<KpiItemNode>, KpiError> {
        self.load_event(scope, event_id)?;
        let mut rows: Vec<DbKpiMasterItem> = self
            .repo
            .list_items(scope, event_id)?
            .into_iter()
            .filter(|i| i.is_active)
            .collect();
        rows.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then_with(|| a.kpi_code.cmp(&b.kpi_code))
        });

        let active: std::collections::HashSet<Uuid> = rows.iter().map(|i| i.id).collect();
        let mut children: HashMap<Option<Uuid>, Vec<KpiMasterItem>> = HashMap::new();
        for row in rows {
            let parent = row.parent_kpi_item_id.filter(|p| active.contains(p));
            children.entry(parent).or_default().push(db_item_to_item(row)?);
        }
        Ok(build_forest(None, &mut children))
    }

    // ---- fact amounts ----

    pub fn create_fact_amount(
        &self,
        scope: &TenantScope,
        req: CreateFactAmountRequest,
    ) -> Result<KpiFactAmount, KpiError> {
        validate_period_code(&req.period_code)?;
        if let (Some(start), Some(end)) = (req.period_start_date, req.period_end_date) {
            if start > end {
                return Err(KpiError::Validation(
                    "periodStartDate is after periodEndDate".to_string(),
                ));
            }
        }
        let event = self.load_event(scope, req.kpi_event_id)?;
        if !event.is_active {
            return Err(KpiError::not_found("kpi event", event.id));
        }
        let definition = self.load_definition(scope, req.kpi_definition_id)?;
        if !definition.is_active {
            return Err(KpiError::not_found("kpi definition", definition.id));
        }

        let now = Utc::now();
        let record = self.repo.create_fact_amount(DbKpiFactAmount {
            id: Uuid::new_v4(),
            tenant_id: scope.tenant_id,
            company_id: scope.company_id,
            kpi_event_id: req.kpi_event_id,
            kpi_definition_id: req.kpi_definition_id,
            period_code: req.period_code,
            period_start_date: req.period_start_date,
            period_end_date: req.period_end_date,
            department_stable_id: req.department_stable_id,
            target_value: optional_decimal(req.target_value)?,
            actual_value: optional_decimal(req.actual_value)?,
            notes: req.notes,
            created_at: now,
            updated_at: now,
        })?;
        info!(
            "Recorded fact amount {} for {} period {}",
            record.id, definition.kpi_code, record.period_code
        );
        Ok(db_fact_amount_to_fact_amount(record))
    }

    pub fn update_fact_amount(
        &self,
        scope: &TenantScope,
        id: Uuid,
        req: UpdateFactAmountRequest,
    ) -> Result<KpiFactAmount, KpiError> {
        let mut record = self
            .repo
            .find_fact_amount(scope, id)?
            .ok_or_else(|| KpiError::not_found("fact amount", id))?;
        if let Some(target) = req.target_value {
            record.target_value = optional_decimal(target)?;
        }
        if let Some(actual) = req.actual_value {
            record.actual_value = optional_decimal(actual)?;
        }
        if let Some(notes) = req.notes {
            record.notes = notes;
        }
        record.updated_at = Utc::now();
        Ok(db_fact_amount_to_fact_amount(
            self.repo.update_fact_amount(record)?,
        ))
    }

    // ---- target values ----

    pub fn create_target_value(
        &self,
        scope: &TenantScope,
        req: CreateTargetValueRequest,
    ) -> Result<KpiTargetValue, KpiError> {
        validate_period_code(&req.period_code)?;
        let item = self.load_item(scope, req.kpi_master_item_id)?;
        let kpi_type = KpiType::from_str(&item.kpi_type)?;
        if !kpi_type.uses_target_values() {
            return Err(KpiError::Validation(format!(
                "{kpi_type} items record fact amounts, not target values"
            )));
        }

        let now = Utc::now();
        let record = self.repo.create_target_value(DbKpiTargetValue {
            id: Uuid::new_v4(),
            tenant_id: scope.tenant_id,
            company_id: scope.company_id,
            kpi_master_item_id: item.id,
            period_code: req.period_code,
            target_value: f64_to_decimal(req.target_value)?,
            created_at: now,
            updated_at: now,
        })?;
        info!(
            "Recorded target value {} for item {} period {}",
            record.id, item.kpi_code, record.period_code
        );
        db_target_value_to_target_value(record)
    }

    pub fn update_target_value(
        &self,
        scope: &TenantScope,
        id: Uuid,
        req: UpdateTargetValueRequest,
    ) -> Result<KpiTargetValue, KpiError> {
        let mut record = self
            .repo
            .find_target_value(scope, id)?
            .ok_or_else(|| KpiError::not_found("target value", id))?;
        record.target_value = f64_to_decimal(req.target_value)?;
        record.updated_at = Utc::now();
        db_target_value_to_target_value(self.repo.update_target_value(record)?)
    }

    // ---- action plans ----

    pub fn validate_action_plan_reference(
        &self,
        scope: &TenantScope,
        reference: &ActionPlanReference,
    ) -> Result<ReferenceTarget, KpiError> {
        validate_action_plan_reference(&*self.repo, scope, reference)
    }
}

fn build_forest(
    parent: Option<Uuid>,
    children: &mut HashMap<Option<Uuid>, Vec<KpiMasterItem>>,
) -> Vec<KpiItemNode> {
    children
        .remove(&parent)
        .unwrap_or_default()
        .into_iter()
        .map(|item| {
            let nested = build_forest(Some(item.id), children);
            KpiItemNode {
                item,
                children: nested,
            }
        })
        .collect()
}
