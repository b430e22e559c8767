use diesel::pg::Pg;
use diesel::prelude::*;
use uuid::Uuid;

use crate::shared::paging::{ListQuery, Page, SortField, SortOrder};
use crate::shared::schema::{
    kpi_definitions, kpi_fact_amounts, kpi_master_events, kpi_master_items, kpi_target_values,
    ref_metrics, ref_subjects,
};
use crate::shared::utils::{DbConnection, DbPool};

use super::error::KpiError;
use super::repository::KpiRepository;
use super::storage::{
    DbKpiDefinition, DbKpiFactAmount, DbKpiMasterEvent, DbKpiMasterItem, DbKpiTargetValue,
};
use super::types::TenantScope;

/// `%` and `_` in user input match literally.
fn like_pattern(keyword: &str) -> String {
    let escaped = keyword
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn page_window(query: &ListQuery) -> (i64, i64) {
    (
        i64::from(query.offset()),
        query.limit.map_or(i64::MAX, i64::from),
    )
}

pub struct PgKpiRepository {
    pool: DbPool,
}

impl PgKpiRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<DbConnection, KpiError> {
        Ok(self.pool.get()?)
    }
}

fn events_query<'a>(
    scope: &TenantScope,
    keyword: Option<String>,
) -> kpi_master_events::BoxedQuery<'a, Pg> {
    let mut query = kpi_master_events::table
        .filter(kpi_master_events::tenant_id.eq(scope.tenant_id))
        .filter(kpi_master_events::company_id.eq(scope.company_id))
        .into_boxed();
    if let Some(keyword) = keyword {
        let pattern = like_pattern(&keyword);
        query = query.filter(
            kpi_master_events::event_code
                .ilike(pattern.clone())
                .or(kpi_master_events::event_name.ilike(pattern)),
        );
    }
    query
}

fn definitions_query<'a>(
    scope: &TenantScope,
    keyword: Option<String>,
) -> kpi_definitions::BoxedQuery<'a, Pg> {
    let mut query = kpi_definitions::table
        .filter(kpi_definitions::tenant_id.eq(scope.tenant_id))
        .filter(kpi_definitions::company_id.eq(scope.company_id))
        .into_boxed();
    if let Some(keyword) = keyword {
        let pattern = like_pattern(&keyword);
        query = query.filter(
            kpi_definitions::kpi_code
                .ilike(pattern.clone())
                .or(kpi_definitions::kpi_name.ilike(pattern)),
        );
    }
    query
}

impl KpiRepository for PgKpiRepository {
    fn find_event(
        &self,
        scope: &TenantScope,
        id: Uuid,
    ) -> Result<Option<DbKpiMasterEvent>, KpiError> {
        let mut conn = self.conn()?;
        Ok(kpi_master_events::table
            .filter(kpi_master_events::id.eq(id))
            .filter(kpi_master_events::tenant_id.eq(scope.tenant_id))
            .filter(kpi_master_events::company_id.eq(scope.company_id))
            .first::<DbKpiMasterEvent>(&mut conn)
            .optional()?)
    }

    fn find_event_by_code(
        &self,
        scope: &TenantScope,
        event_code: &str,
    ) -> Result<Option<DbKpiMasterEvent>, KpiError> {
        let mut conn = self.conn()?;
        Ok(kpi_master_events::table
            .filter(kpi_master_events::event_code.eq(event_code))
            .filter(kpi_master_events::tenant_id.eq(scope.tenant_id))
            .filter(kpi_master_events::company_id.eq(scope.company_id))
            .first::<DbKpiMasterEvent>(&mut conn)
            .optional()?)
    }

    fn list_events(
        &self,
        scope: &TenantScope,
        query: &ListQuery,
    ) -> Result<Page<DbKpiMasterEvent>, KpiError> {
        let mut conn = self.conn()?;
        let keyword = query.normalized_keyword();
        let total: i64 = events_query(scope, keyword.clone())
            .count()
            .get_result(&mut conn)?;

        let rows = events_query(scope, keyword);
        let rows = match (query.sort_field(), query.order()) {
            (SortField::Code, SortOrder::Asc) => rows.order(kpi_master_events::event_code.asc()),
            (SortField::Code, SortOrder::Desc) => rows.order(kpi_master_events::event_code.desc()),
            (SortField::Name, SortOrder::Asc) => rows
                .order(kpi_master_events::event_name.asc())
                .then_order_by(kpi_master_events::event_code.asc()),
            (SortField::Name, SortOrder::Desc) => rows
                .order(kpi_master_events::event_name.desc())
                .then_order_by(kpi_master_events::event_code.desc()),
            (SortField::CreatedAt, SortOrder::Asc) => {
                rows.order(kpi_master_events::created_at.asc())
            }
            (SortField::CreatedAt, SortOrder::Desc) => {
                rows.order(kpi_master_events::created_at.desc())
            }
            (SortField::UpdatedAt, SortOrder::Asc) => {
                rows.order(kpi_master_events::updated_at.asc())
            }
            (SortField::UpdatedAt, SortOrder::Desc) => {
                rows.order(kpi_master_events::updated_at.desc())
            }
        };
        let (offset, limit) = page_window(query);
        let items = rows
            .offset(offset)
            .limit(limit)
            .load::<DbKpiMasterEvent>(&mut conn)?;

        Ok(Page {
            items,
            total_count: u64::try_from(total).unwrap_or(0),
            offset: query.offset(),
            limit: query.limit.unwrap_or(u32::MAX),
        })
    }

    fn create_event(&self, record: DbKpiMasterEvent) -> Result<DbKpiMasterEvent, KpiError> {
        let mut conn = self.conn()?;
        Ok(diesel::insert_into(kpi_master_events::table)
            .values(&record)
            .get_result(&mut conn)?)
    }

    fn update_event(&self, record: DbKpiMasterEvent) -> Result<DbKpiMasterEvent, KpiError> {
        let mut conn = self.conn()?;
        Ok(diesel::update(
            kpi_master_events::table
                .filter(kpi_master_events::id.eq(record.id))
                .filter(kpi_master_events::tenant_id.eq(record.tenant_id)),
        )
        .set(&record)
        .get_result(&mut conn)?)
    }

    fn find_definition(
        &self,
        scope: &TenantScope,
        id: Uuid,
    ) -> Result<Option<DbKpiDefinition>, KpiError> {
        let mut conn = self.conn()?;
        Ok(kpi_definitions::table
            .filter(kpi_definitions::id.eq(id))
            .filter(kpi_definitions::tenant_id.eq(scope.tenant_id))
            .filter(kpi_definitions::company_id.eq(scope.company_id))
            .first::<DbKpiDefinition>(&mut conn)
            .optional()?)
    }

    fn find_definition_by_code(
        &self,
        scope: &TenantScope,
        kpi_code: &str,
    ) -> Result<Option<DbKpiDefinition>, KpiError> {
        let mut conn = self.conn()?;
        Ok(kpi_definitions::table
            .filter(kpi_definitions::kpi_code.eq(kpi_code))
            .filter(kpi_definitions::tenant_id.eq(scope.tenant_id))
            .filter(kpi_definitions::company_id.eq(scope.company_id))
            .first::<DbKpiDefinition>(&mut conn)
            .optional()?)
    }

    fn list_definitions(
        &self,
        scope: &TenantScope,
        query: &ListQuery,
    ) -> Result<Page<DbKpiDefinition>, KpiError> {
        let mut conn = self.conn()?;
        let keyword = query.normalized_keyword();
        let total: i64 = definitions_query(scope, keyword.clone())
            .count()
            .get_result(&mut conn)?;

        let rows = definitions_query(scope, keyword);
        let rows = match (query.sort_field(), query.order()) {
            (SortField::Code, SortOrder::Asc) => rows.order(kpi_definitions::kpi_code.asc()),
            (SortField::Code, SortOrder::Desc) => rows.order(kpi_definitions::kpi_code.desc()),
            (SortField::Name, SortOrder::Asc) => rows
                .order(kpi_definitions::kpi_name.asc())
                .then_order_by(kpi_definitions::kpi_code.asc()),
            (SortField::Name, SortOrder::Desc) => rows
                .order(kpi_definitions::kpi_name.desc())
                .then_order_by(kpi_definitions::kpi_code.desc()),
            (SortField::CreatedAt, SortOrder::Asc) => rows.order(kpi_definitions::created_at.asc()),
            (SortField::CreatedAt, SortOrder::Desc) => {
                rows.order(kpi_definitions::created_at.desc())
            }
            (SortField::UpdatedAt, SortOrder::Asc) => rows.order(kpi_definitions::updated_at.asc()),
            (SortField::UpdatedAt, SortOrder::Desc) => {
                rows.order(kpi_definitions::updated_at.desc())
            }
        };
        let (offset, limit) = page_window(query);
        let items = rows
            .offset(offset)
            .limit(limit)
            .load::<DbKpiDefinition>(&mut conn)?;

        Ok(Page {
            items,
            total_count: u64::try_from(total).unwrap_or(0),
            offset: query.offset(),
            limit: query.limit.unwrap_or(u32::MAX),
        })
    }

    fn create_definition(&self, record: DbKpiDefinition) -> Result<DbKpiDefinition, KpiError> {
        let mut conn = self.conn()?;
        Ok(diesel::insert_into(kpi_definitions::table)
            .values(&record)
            .get_result(&mut conn)?)
    }

    fn update_definition(&self, record: DbKpiDefinition) -> Result<DbKpiDefinition, KpiError> {
        let mut conn = self.conn()?;
        Ok(diesel::update(
            kpi_definitions::table
                .filter(kpi_definitions::id.eq(record.id))
                .filter(kpi_definitions::tenant_id.eq(record.tenant_id)),
        )
        .set(&record)
        .get_result(&mut conn)?)
    }

    fn find_item(
        &self,
        scope: &TenantScope,
        id: Uuid,
    ) -> Result<Option<DbKpiMasterItem>, KpiError> {
        let mut conn = self.conn()?;
        Ok(kpi_master_items::table
            .filter(kpi_master_items::id.eq(id))
            .filter(kpi_master_items::tenant_id.eq(scope.tenant_id))
            .filter(kpi_master_items::company_id.eq(scope.company_id))
            .first::<DbKpiMasterItem>(&mut conn)
            .optional()?)
    }

    fn find_item_by_code(
        &self,
        scope: &TenantScope,
        kpi_event_id: Uuid,
        kpi_code: &str,
    ) -> Result<Option<DbKpiMasterItem>, KpiError> {
        let mut conn = self.conn()?;
        Ok(kpi_master_items::table
            .filter(kpi_master_items::kpi_event_id.eq(kpi_event_id))
            .filter(kpi_master_items::kpi_code.eq(kpi_code))
            .filter(kpi_master_items::tenant_id.eq(scope.tenant_id))
            .filter(kpi_master_items::company_id.eq(scope.company_id))
            .first::<DbKpiMasterItem>(&mut conn)
            .optional()?)
    }

    fn list_items(
        &self,
        scope: &TenantScope,
        kpi_event_id: Uuid,
    ) -> Result<Vec<DbKpiMasterItem>, KpiError> {
        let mut conn = self.conn()?;
        Ok(kpi_master_items::table
            .filter(kpi_master_items::kpi_event_id.eq(kpi_event_id))
            .filter(kpi_master_items::tenant_id.eq(scope.tenant_id))
            .filter(kpi_master_items::company_id.eq(scope.company_id))
            .order((
                kpi_master_items::sort_order.asc(),
                kpi_master_items::kpi_code.asc(),
            ))
            .load::<DbKpiMasterItem>(&mut conn)?)
    }

    fn create_item(&self, record: DbKpiMasterItem) -> Result<DbKpiMasterItem, KpiError> {
        let mut conn = self.conn()?;
        Ok(diesel::insert_into(kpi_master_items::table)
            .values(&record)
            .get_result(&mut conn)?)
    }

    fn update_item(&self, record: DbKpiMasterItem) -> Result<DbKpiMasterItem, KpiError> {
        let mut conn = self.conn()?;
        Ok(diesel::update(
            kpi_master_items::table
                .filter(kpi_master_items::id.eq(record.id))
                .filter(kpi_master_items::tenant_id.eq(record.tenant_id)),
        )
        .set(&record)
        .get_result(&mut conn)?)
    }

    fn find_fact_amount(
        &self,
        scope: &TenantScope,
        id: Uuid,
    ) -> Result<Option<DbKpiFactAmount>, KpiError> {
        let mut conn = self.conn()?;
        Ok(kpi_fact_amounts::table
            .filter(kpi_fact_amounts::id.eq(id))
            .filter(kpi_fact_amounts::tenant_id.eq(scope.tenant_id))
            .filter(kpi_fact_amounts::company_id.eq(scope.company_id))
            .first::<DbKpiFactAmount>(&mut conn)
            .optional()?)
    }

    fn list_fact_amounts(
        &self,
        scope: &TenantScope,
        kpi_event_id: Uuid,
        kpi_definition_id: Uuid,
    ) -> Result<Vec<DbKpiFactAmount>, KpiError> {
        let mut conn = self.conn()?;
        Ok(kpi_fact_amounts::table
            .filter(kpi_fact_amounts::kpi_event_id.eq(kpi_event_id))
            .filter(kpi_fact_amounts::kpi_definition_id.eq(kpi_definition_id))
            .filter(kpi_fact_amounts::tenant_id.eq(scope.tenant_id))
            .filter(kpi_fact_amounts::company_id.eq(scope.company_id))
            .order((
                kpi_fact_amounts::period_code.asc(),
                kpi_fact_amounts::department_stable_id.asc(),
            ))
            .load::<DbKpiFactAmount>(&mut conn)?)
    }

    fn create_fact_amount(&self, record: DbKpiFactAmount) -> Result<DbKpiFactAmount, KpiError> {
        let mut conn = self.conn()?;
        Ok(diesel::insert_into(kpi_fact_amounts::table)
            .values(&record)
            .get_result(&mut conn)?)
    }

    fn update_fact_amount(&self, record: DbKpiFactAmount) -> Result<DbKpiFactAmount, KpiError> {
        let mut conn = self.conn()?;
        Ok(diesel::update(
            kpi_fact_amounts::table
                .filter(kpi_fact_amounts::id.eq(record.id))
                .filter(kpi_fact_amounts::tenant_id.eq(record.tenant_id)),
        )
        .set(&record)
        .get_result(&mut conn)?)
    }

    fn find_target_value(
        &self,
        scope: &TenantScope,
        id: Uuid,
    ) -> Result<Option<DbKpiTargetValue>, KpiError> {
        let mut conn = self.conn()?;
        Ok(kpi_target_values::table
            .filter(kpi_target_values::id.eq(id))
            .filter(kpi_target_values::tenant_id.eq(scope.tenant_id))
            .filter(kpi_target_values::company_id.eq(scope.company_id))
            .first::<DbKpiTargetValue>(&mut conn)
            .optional()?)
    }

    fn list_target_values(
        &self,
        scope: &TenantScope,
        kpi_master_item_id: Uuid,
    ) -> Result<Vec<DbKpiTargetValue>, KpiError> {
        let mut conn = self.conn()?;
        Ok(kpi_target_values::table
            .filter(kpi_target_values::kpi_master_item_id.eq(kpi_master_item_id))
            .filter(kpi_target_values::tenant_id.eq(scope.tenant_id))
            .filter(kpi_target_values::company_id.eq(scope.company_id))
            .order(kpi_target_values::period_code.asc())
            .load::<DbKpiTargetValue>(&mut conn)?)
    }

    fn create_target_value(&self, record: DbKpiTargetValue) -> Result<DbKpiTargetValue, KpiError> {
        let mut conn = self.conn()?;
        Ok(diesel::insert_into(kpi_target_values::table)
            .values(&record)
            .get_result(&mut conn)?)
    }

    fn update_target_value(&self, record: DbKpiTargetValue) -> Result<DbKpiTargetValue, KpiError> {
        let mut conn = self.conn()?;
        Ok(diesel::update(
            kpi_target_values::table
                .filter(kpi_target_values::id.eq(record.id))
                .filter(kpi_target_values::tenant_id.eq(record.tenant_id)),
        )
        .set(&record)
        .get_result(&mut conn)?)
    }

    fn subject_is_active(&self, scope: &TenantScope, id: Uuid) -> Result<bool, KpiError> {
        let mut conn = self.conn()?;
        let active = ref_subjects::table
            .filter(ref_subjects::id.eq(id))
            .filter(ref_subjects::tenant_id.eq(scope.tenant_id))
            .filter(ref_subjects::company_id.eq(scope.company_id))
            .select(ref_subjects::is_active)
            .first::<bool>(&mut conn)
            .optional()?;
        Ok(active.unwrap_or(false))
    }

    fn metric_is_active(&self, scope: &TenantScope, id: Uuid) -> Result<bool, KpiError> {
        let mut conn = self.conn()?;
        let active = ref_metrics::table
            .filter(ref_metrics::id.eq(id))
            .filter(ref_metrics::tenant_id.eq(scope.tenant_id))
            .filter(ref_metrics::company_id.eq(scope.company_id))
            .select(ref_metrics::is_active)
            .first::<bool>(&mut conn)
            .optional()?;
        Ok(active.unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("sales"), "%sales%");
        assert_eq!(like_pattern("100%_ok"), "%100\\%\\_ok%");
    }

    #[test]
    fn test_page_window_defaults() {
        assert_eq!(page_window(&ListQuery::default()), (0, i64::MAX));
        assert_eq!(page_window(&ListQuery::from_page(2, 50)), (50, 50));
    }
}
