use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::shared::paging::{paginate, ListQuery, Listable, Page};

use super::error::KpiError;
use super::storage::{
    DbKpiDefinition, DbKpiFactAmount, DbKpiMasterEvent, DbKpiMasterItem, DbKpiTargetValue,
};
use super::types::TenantScope;

/// Tenant-scoped persistence for the KPI entities. Lookups never return a row
/// that belongs to another scope; inactive rows are returned and the caller
/// decides what inactive means.
pub trait KpiRepository: Send + Sync {
    fn find_event(
        &self,
        scope: &TenantScope,
        id: Uuid,
    ) -> Result<Option<DbKpiMasterEvent>, KpiError>;
    fn find_event_by_code(
        &self,
        scope: &TenantScope,
        event_code: &str,
    ) -> Result<Option<DbKpiMasterEvent>, KpiError>;
    fn list_events(
        &self,
        scope: &TenantScope,
        query: &ListQuery,
    ) -> Result<Page<DbKpiMasterEvent>, KpiError>;
    fn create_event(&self, record: DbKpiMasterEvent) -> Result<DbKpiMasterEvent, KpiError>;
    fn update_event(&self, record: DbKpiMasterEvent) -> Result<DbKpiMasterEvent, KpiError>;

    fn find_definition(
        &self,
        scope: &TenantScope,
        id: Uuid,
    ) -> Result<Option<DbKpiDefinition>, KpiError>;
    fn find_definition_by_code(
        &self,
        scope: &TenantScope,
        kpi_code: &str,
    ) -> Result<Option<DbKpiDefinition>, KpiError>;
    fn list_definitions(
        &self,
        scope: &TenantScope,
        query: &ListQuery,
    ) -> Result<Page<DbKpiDefinition>, KpiError>;
    fn create_definition(&self, record: DbKpiDefinition) -> Result<DbKpiDefinition, KpiError>;
    fn update_definition(&self, record: DbKpiDefinition) -> Result<DbKpiDefinition, KpiError>;

    fn find_item(&self, scope: &TenantScope, id: Uuid) -> Result<Option<DbKpiMasterItem>, KpiError>;
    fn find_item_by_code(
        &self,
        scope: &TenantScope,
        kpi_event_id: Uuid,
        kpi_code: &str,
    ) -> Result<Option<DbKpiMasterItem>, KpiError>;
    /// All items of an event, active or not.
    fn list_items(
        &self,
        scope: &TenantScope,
        kpi_event_id: Uuid,
    ) -> Result<Vec<DbKpiMasterItem>, KpiError>;
    fn create_item(&self, record: DbKpiMasterItem) -> Result<DbKpiMasterItem, KpiError>;
    fn update_item(&self, record: DbKpiMasterItem) -> Result<DbKpiMasterItem, KpiError>;

    fn find_fact_amount(
        &self,
        scope: &TenantScope,
        id: Uuid,
    ) -> Result<Option<DbKpiFactAmount>, KpiError>;
    fn list_fact_amounts(
        &self,
        scope: &TenantScope,
        kpi_event_id: Uuid,
        kpi_definition_id: Uuid,
    ) -> Result<Vec<DbKpiFactAmount>, KpiError>;
    fn create_fact_amount(&self, record: DbKpiFactAmount) -> Result<DbKpiFactAmount, KpiError>;
    fn update_fact_amount(&self, record: DbKpiFactAmount) -> Result<DbKpiFactAmount, KpiError>;

    fn find_target_value(
        &self,
        scope: &TenantScope,
        id: Uuid,
    ) -> Result<Option<DbKpiTargetValue>, KpiError>;
    fn list_target_values(
        &self,
        scope: &TenantScope,
        kpi_master_item_id: Uuid,
    ) -> Result<Vec<DbKpiTargetValue>, KpiError>;
    fn create_target_value(&self, record: DbKpiTargetValue) -> Result<DbKpiTargetValue, KpiError>;
    fn update_target_value(&self, record: DbKpiTargetValue) -> Result<DbKpiTargetValue, KpiError>;

    /// Subjects and metrics are owned by other masters; only existence matters here.
    fn subject_is_active(&self, scope: &TenantScope, id: Uuid) -> Result<bool, KpiError>;
    fn metric_is_active(&self, scope: &TenantScope, id: Uuid) -> Result<bool, KpiError>;
}

macro_rules! impl_listable {
    ($ty:ty, $code:ident, $name:ident) => {
        impl Listable for $ty {
            fn code(&self) -> &str {
                &self.$code
            }
            fn name(&self) -> &str {
                &self.$name
            }
            fn created_at(&self) -> DateTime<Utc> {
                self.created_at
            }
            fn updated_at(&self) -> DateTime<Utc> {
                self.updated_at
            }
        }
    };
}

impl_listable!(DbKpiMasterEvent, event_code, event_name);
impl_listable!(DbKpiDefinition, kpi_code, kpi_name);
impl_listable!(DbKpiMasterItem, kpi_code, kpi_name);

#[derive(Debug, Clone, Copy)]
struct ExternalRef {
    scope: TenantScope,
    is_active: bool,
}

#[derive(Debug, Default)]
struct Store {
    events: HashMap<Uuid, DbKpiMasterEvent>,
    definitions: HashMap<Uuid, DbKpiDefinition>,
    items: HashMap<Uuid, DbKpiMasterItem>,
    fact_amounts: HashMap<Uuid, DbKpiFactAmount>,
    target_values: HashMap<Uuid, DbKpiTargetValue>,
    subjects: HashMap<Uuid, ExternalRef>,
    metrics: HashMap<Uuid, ExternalRef>,
}

/// In-process repository with the same uniqueness rules as the database.
/// Used by tests and local tooling.
#[derive(Debug, Default)]
pub struct InMemoryKpiRepository {
    store: RwLock<Store>,
}

fn in_scope(scope: &TenantScope, tenant_id: Uuid, company_id: Uuid) -> bool {
    scope.owns(tenant_id, company_id)
}

impl InMemoryKpiRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Store>, KpiError> {
        self.store
            .read()
            .map_err(|_| KpiError::Database("repository lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Store>, KpiError> {
        self.store
            .write()
            .map_err(|_| KpiError::Database("repository lock poisoned".to_string()))
    }

    pub fn register_subject(
        &self,
        scope: &TenantScope,
        id: Uuid,
        is_active: bool,
    ) -> Result<(), KpiError> {
        self.write()?.subjects.insert(
            id,
            ExternalRef {
                scope: *scope,
                is_active,
            },
        );
        Ok(())
    }

    pub fn register_metric(
        &self,
        scope: &TenantScope,
        id: Uuid,
        is_active: bool,
    ) -> Result<(), KpiError> {
        self.write()?.metrics.insert(
            id,
            ExternalRef {
                scope: *scope,
                is_active,
            },
        );
        Ok(())
    }

    /// Number of stored items across all scopes.
    pub fn item_count(&self) -> Result<usize, KpiError> {
        Ok(self.read()?.items.len())
    }
}

fn ensure_exists<T>(map: &HashMap<Uuid, T>, id: Uuid, entity: &str) -> Result<(), KpiError> {
    if map.contains_key(&id) {
        Ok(())
    } else {
        Err(KpiError::not_found(entity, id))
    }
}

fn ensure_new<T>(map: &HashMap<Uuid, T>, id: Uuid, entity: &str) -> Result<(), KpiError> {
    if map.contains_key(&id) {
        Err(KpiError::Conflict(format!("{entity} {id} already exists")))
    } else {
        Ok(())
    }
}

impl Store {
    fn check_event_code(&self, record: &DbKpiMasterEvent) -> Result<(), KpiError> {
        let taken = self.events.values().any(|e| {
            e.id != record.id
                && e.tenant_id == record.tenant_id
                && e.company_id == record.company_id
                && e.event_code == record.event_code
        });
        if taken {
            return Err(KpiError::Conflict(format!(
                "event code {} already exists",
                record.event_code
            )));
        }
        Ok(())
    }

    fn check_definition_code(&self, record: &DbKpiDefinition) -> Result<(), KpiError> {
        let taken = self.definitions.values().any(|d| {
            d.id != record.id
                && d.tenant_id == record.tenant_id
                && d.company_id == record.company_id
                && d.kpi_code == record.kpi_code
        });
        if taken {
            return Err(KpiError::Conflict(format!(
                "kpi definition code {} already exists",
                record.kpi_code
            )));
        }
        Ok(())
    }

    fn check_item_code(&self, record: &DbKpiMasterItem) -> Result<(), KpiError> {
        let taken = self.items.values().any(|i| {
            i.id != record.id
                && i.tenant_id == record.tenant_id
                && i.kpi_event_id == record.kpi_event_id
                && i.kpi_code == record.kpi_code
        });
        if taken {
            return Err(KpiError::Conflict(format!(
                "kpi item code {} already exists in event",
                record.kpi_code
            )));
        }
        Ok(())
    }

    fn check_fact_key(&self, record: &DbKpiFactAmount) -> Result<(), KpiError> {
        let key = record.unique_key();
        let taken = self.fact_amounts.values().any(|f| {
            f.id != record.id && f.tenant_id == record.tenant_id && f.unique_key() == key
        });
        if taken {
            return Err(KpiError::Conflict(format!(
                "fact amount for period {} already exists",
                record.period_code
            )));
        }
        Ok(())
    }

    fn check_target_key(&self, record: &DbKpiTargetValue) -> Result<(), KpiError> {
        let taken = self.target_values.values().any(|t| {
            t.id != record.id
                && t.kpi_master_item_id == record.kpi_master_item_id
                && t.period_code == record.period_code
        });
        if taken {
            return Err(KpiError::Conflict(format!(
                "target value for period {} already exists",
                record.period_code
            )));
        }
        Ok(())
    }
}

impl KpiRepository for InMemoryKpiRepository {
    fn find_event(
        &self,
        scope: &TenantScope,
        id: Uuid,
    ) -> Result<Option<DbKpiMasterEvent>, KpiError> {
        Ok(self
            .read()?
            .events
            .get(&id)
            .filter(|e| in_scope(scope, e.tenant_id, e.company_id))
            .cloned())
    }

    fn find_event_by_code(
        &self,
        scope: &TenantScope,
        event_code: &str,
    ) -> Result<Option<DbKpiMasterEvent>, KpiError> {
        Ok(self
            .read()?
            .events
            .values()
            .find(|e| in_scope(scope, e.tenant_id, e.company_id) && e.event_code == event_code)
            .cloned())
    }

    fn list_events(
        &self,
        scope: &TenantScope,
        query: &ListQuery,
    ) -> Result<Page<DbKpiMasterEvent>, KpiError> {
        let rows = self
            .read()?
            .events
            .values()
            .filter(|e| in_scope(scope, e.tenant_id, e.company_id))
            .cloned()
            .collect();
        Ok(paginate(rows, query))
    }

    fn create_event(&self, record: DbKpiMasterEvent) -> Result<DbKpiMasterEvent, KpiError> {
        let mut store = self.write()?;
        ensure_new(&store.events, record.id, "kpi event")?;
        store.check_event_code(&record)?;
        store.events.insert(record.id, record.clone());
        Ok(record)
    }

    fn update_event(&self, record: DbKpiMasterEvent) -> Result<DbKpiMasterEvent, KpiError> {
        let mut store = self.write()?;
        ensure_exists(&store.events, record.id, "kpi event")?;
        store.check_event_code(&record)?;
        store.events.insert(record.id, record.clone());
        Ok(record)
    }

    fn find_definition(
        &self,
        scope: &TenantScope,
        id: Uuid,
    ) -> Result<Option<DbKpiDefinition>, KpiError> {
        Ok(self
            .read()?
            .definitions
            .get(&id)
            .filter(|d| in_scope(scope, d.tenant_id, d.company_id))
            .cloned())
    }

    fn find_definition_by_code(
        &self,
        scope: &TenantScope,
        kpi_code: &str,
    ) -> Result<Option<DbKpiDefinition>, KpiError> {
        Ok(self
            .read()?
            .definitions
            .values()
            .find(|d| in_scope(scope, d.tenant_id, d.company_id) && d.kpi_code == kpi_code)
            .cloned())
    }

    fn list_definitions(
        &self,
        scope: &TenantScope,
        query: &ListQuery,
    ) -> Result<Page<DbKpiDefinition>, KpiError> {
        let rows = self
            .read()?
            .definitions
            .values()
            .filter(|d| in_scope(scope, d.tenant_id, d.company_id))
            .cloned()
            .collect();
        Ok(paginate(rows, query))
    }

    fn create_definition(&self, record: DbKpiDefinition) -> Result<DbKpiDefinition, KpiError> {
        let mut store = self.write()?;
        ensure_new(&store.definitions, record.id, "kpi definition")?;
        store.check_definition_code(&record)?;
        store.definitions.insert(record.id, record.clone());
        Ok(record)
    }

    fn update_definition(&self, record: DbKpiDefinition) -> Result<DbKpiDefinition, KpiError> {
        let mut store = self.write()?;
        ensure_exists(&store.definitions, record.id, "kpi definition")?;
        store.check_definition_code(&record)?;
        store.definitions.insert(record.id, record.clone());
        Ok(record)
    }

    fn find_item(
        &self,
        scope: &TenantScope,
        id: Uuid,
    ) -> Result<Option<DbKpiMasterItem>, KpiError> {
        Ok(self
            .read()?
            .items
            .get(&id)
            .filter(|i| in_scope(scope, i.tenant_id, i.company_id))
            .cloned())
    }

    fn find_item_by_code(
        &self,
        scope: &TenantScope,
        kpi_event_id: Uuid,
        kpi_code: &str,
    ) -> Result<Option<DbKpiMasterItem>, KpiError> {
        Ok(self
            .read()?
            .items
            .values()
            .find(|i| {
                in_scope(scope, i.tenant_id, i.company_id)
                    && i.kpi_event_id == kpi_event_id
                    && i.kpi_code == kpi_code
            })
            .cloned())
    }

    fn list_items(
        &self,
        scope: &TenantScope,
        kpi_event_id: Uuid,
    ) -> Result<Vec<DbKpiMasterItem>, KpiError> {
        let mut rows: Vec<DbKpiMasterItem> = self
            .read()?
            .items
            .values()
            .filter(|i| {
                in_scope(scope, i.tenant_id, i.company_id) && i.kpi_event_id == kpi_event_id
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then_with(|| a.kpi_code.cmp(&b.kpi_code))
        });
        Ok(rows)
    }

    fn create_item(&self, record: DbKpiMasterItem) -> Result<DbKpiMasterItem, KpiError> {
        let mut store = self.write()?;
        ensure_new(&store.items, record.id, "kpi item")?;
        store.check_item_code(&record)?;
        store.items.insert(record.id, record.clone());
        Ok(record)
    }

    fn update_item(&self, record: DbKpiMasterItem) -> Result<DbKpiMasterItem, KpiError> {
        let mut store = self.write()?;
        ensure_exists(&store.items, record.id, "kpi item")?;
        store.check_item_code(&record)?;
        store.items.insert(record.id, record.clone());
        Ok(record)
    }

    fn find_fact_amount(
        &self,
        scope: &TenantScope,
        id: Uuid,
    ) -> Result<Option<DbKpiFactAmount>, KpiError> {
        Ok(self
            .read()?
            .fact_amounts
            .get(&id)
            .filter(|f| in_scope(scope, f.tenant_id, f.company_id))
            .cloned())
    }

    fn list_fact_amounts(
        &self,
        scope: &TenantScope,
        kpi_event_id: Uuid,
        kpi_definition_id: Uuid,
    ) -> Result<Vec<DbKpiFactAmount>, KpiError> {
        let mut rows: Vec<DbKpiFactAmount> = self
            .read()?
            .fact_amounts
            .values()
            .filter(|f| {
                in_scope(scope, f.tenant_id, f.company_id)
                    && f.kpi_event_id == kpi_event_id
                    && f.kpi_definition_id == kpi_definition_id
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.period_code
                .cmp(&b.period_code)
                .then_with(|| a.department_stable_id.cmp(&b.department_stable_id))
        });
        Ok(rows)
    }

    fn create_fact_amount(&self, record: DbKpiFactAmount) -> Result<DbKpiFactAmount, KpiError> {
        let mut store = self.write()?;
        ensure_new(&store.fact_amounts, record.id, "fact amount")?;
        store.check_fact_key(&record)?;
        store.fact_amounts.insert(record.id, record.clone());
        Ok(record)
    }

    fn update_fact_amount(&self, record: DbKpiFactAmount) -> Result<DbKpiFactAmount, KpiError> {
        let mut store = self.write()?;
        ensure_exists(&store.fact_amounts, record.id, "fact amount")?;
        store.check_fact_key(&record)?;
        store.fact_amounts.insert(record.id, record.clone());
        Ok(record)
    }

    fn find_target_value(
        &self,
        scope: &TenantScope,
        id: Uuid,
    ) -> Result<Option<DbKpiTargetValue>, KpiError> {
        Ok(self
            .read()?
            .target_values
            .get(&id)
            .filter(|t| in_scope(scope, t.tenant_id, t.company_id))
            .cloned())
    }

    fn list_target_values(
        &self,
        scope: &TenantScope,
        kpi_master_item_id: Uuid,
    ) -> Result<Vec<DbKpiTargetValue>, KpiError> {
        let mut rows: Vec<DbKpiTargetValue> = self
            .read()?
            .target_values
            .values()
            .filter(|t| {
                in_scope(scope, t.tenant_id, t.company_id)
                    && t.kpi_master_item_id == kpi_master_item_id
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.period_code.cmp(&b.period_code));
        Ok(rows)
    }

    fn create_target_value(&self, record: DbKpiTargetValue) -> Result<DbKpiTargetValue, KpiError> {
        let mut store = self.write()?;
        ensure_new(&store.target_values, record.id, "target value")?;
        store.check_target_key(&record)?;
        store.target_values.insert(record.id, record.clone());
        Ok(record)
    }

    fn update_target_value(&self, record: DbKpiTargetValue) -> Result<DbKpiTargetValue, KpiError> {
        let mut store = self.write()?;
        ensure_exists(&store.target_values, record.id, "target value")?;
        store.check_target_key(&record)?;
        store.target_values.insert(record.id, record.clone());
        Ok(record)
    }

    fn subject_is_active(&self, scope: &TenantScope, id: Uuid) -> Result<bool, KpiError> {
        Ok(self
            .read()?
            .subjects
            .get(&id)
            .is_some_and(|s| s.scope == *scope && s.is_active))
    }

    fn metric_is_active(&self, scope: &TenantScope, id: Uuid) -> Result<bool, KpiError> {
        Ok(self
            .read()?
            .metrics
            .get(&id)
            .is_some_and(|m| m.scope == *scope && m.is_active))
    }
}
