use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::config::KpiConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    #[default]
    Code,
    Name,
    CreatedAt,
    UpdatedAt,
}

impl SortField {
    /// Accepts camelCase or snake_case names, with or without an entity
    /// prefix (`kpiCode`, `event_name`, `createdAt`). Anything else sorts by code.
    pub fn parse(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Self::default();
        };
        let normalized: String = value
            .chars()
            .filter(|c| *c != '_')
            .collect::<String>()
            .to_lowercase();
        if normalized.ends_with("createdat") {
            Self::CreatedAt
        } else if normalized.ends_with("updatedat") {
            Self::UpdatedAt
        } else if normalized.ends_with("name") {
            Self::Name
        } else {
            Self::Code
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub keyword: Option<String>,
    pub offset: Option<u32>,
    pub limit: Option<u32>,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
}

impl ListQuery {
    /// BFF paging: `page` is 1-based.
    pub fn from_page(page: u32, page_size: u32) -> Self {
        let page = page.max(1);
        Self {
            offset: Some((page - 1).saturating_mul(page_size)),
            limit: Some(page_size),
            ..Self::default()
        }
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn sorted_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort_by = Some(field.into());
        self.sort_order = Some(order);
        self
    }

    pub fn sort_field(&self) -> SortField {
        SortField::parse(self.sort_by.as_deref())
    }

    pub fn order(&self) -> SortOrder {
        self.sort_order.unwrap_or_default()
    }

    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }

    pub fn effective_limit(&self, config: &KpiConfig) -> u32 {
        self.limit
            .unwrap_or(config.default_page_size)
            .clamp(1, config.max_page_size)
    }

    /// Trimmed, lower-cased keyword; `None` when blank.
    pub fn normalized_keyword(&self) -> Option<String> {
        self.keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_lowercase)
    }

    /// Clamps the limit so that repositories see the final window.
    pub fn resolved(&self, config: &KpiConfig) -> Self {
        Self {
            limit: Some(self.effective_limit(config)),
            offset: Some(self.offset()),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: u64,
    pub offset: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    pub fn map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        Ok(Page {
            items: self.items.into_iter().map(f).collect::<Result<_, _>>()?,
            total_count: self.total_count,
            offset: self.offset,
            limit: self.limit,
        })
    }
}

/// Rows that can be keyword-searched and sorted in memory.
pub trait Listable {
    fn code(&self) -> &str;
    fn name(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;
    fn updated_at(&self) -> DateTime<Utc>;

    fn matches_keyword(&self, keyword: &str) -> bool {
        self.code().to_lowercase().contains(keyword) || self.name().to_lowercase().contains(keyword)
    }
}

fn compare<T: Listable>(a: &T, b: &T, field: SortField) -> Ordering {
    match field {
        SortField::Code => a.code().cmp(b.code()),
        SortField::Name => a.name().cmp(b.name()).then_with(|| a.code().cmp(b.code())),
        SortField::CreatedAt => a.created_at().cmp(&b.created_at()),
        SortField::UpdatedAt => a.updated_at().cmp(&b.updated_at()),
    }
}

/// Filters, sorts, and slices `rows` according to an already-resolved query.
pub fn paginate<T: Listable>(mut rows: Vec<T>, query: &ListQuery) -> Page<T> {
    if let Some(keyword) = query.normalized_keyword() {
        rows.retain(|row| row.matches_keyword(&keyword));
    }
    let field = query.sort_field();
    rows.sort_by(|a, b| compare(a, b, field));
    if query.order() == SortOrder::Desc {
        rows.reverse();
    }

    let total_count = rows.len() as u64;
    let offset = query.offset();
    let limit = query.limit.unwrap_or(u32::MAX);
    let items = rows
        .into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .collect();
    Page {
        items,
        total_count,
        offset,
        limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row(&'static str, &'static str);

    impl Listable for Row {
        fn code(&self) -> &str {
            self.0
        }
        fn name(&self) -> &str {
            self.1
        }
        fn created_at(&self) -> DateTime<Utc> {
            DateTime::<Utc>::default()
        }
        fn updated_at(&self) -> DateTime<Utc> {
            DateTime::<Utc>::default()
        }
    }

    fn rows() -> Vec<Row> {
        vec![
            Row("K3", "Churn rate"),
            Row("K1", "Revenue"),
            Row("K2", "Customer satisfaction"),
        ]
    }

    #[test]
    fn test_sort_field_aliases() {
        assert_eq!(SortField::parse(Some("kpiName")), SortField::Name);
        assert_eq!(SortField::parse(Some("event_name")), SortField::Name);
        assert_eq!(SortField::parse(Some("createdAt")), SortField::CreatedAt);
        assert_eq!(SortField::parse(Some("updated_at")), SortField::UpdatedAt);
        assert_eq!(SortField::parse(Some("kpiCode")), SortField::Code);
        assert_eq!(SortField::parse(Some("bogus")), SortField::Code);
        assert_eq!(SortField::parse(None), SortField::Code);
    }

    #[test]
    fn test_from_page_is_one_based() {
        let q = ListQuery::from_page(3, 20);
        assert_eq!(q.offset, Some(40));
        assert_eq!(q.limit, Some(20));
        assert_eq!(ListQuery::from_page(0, 20).offset, Some(0));
    }

    #[test]
    fn test_limit_is_clamped() {
        let config = KpiConfig::default();
        let q = ListQuery {
            limit: Some(10_000),
            ..Default::default()
        };
        assert_eq!(q.effective_limit(&config), config.max_page_size);
        assert_eq!(
            ListQuery::default().effective_limit(&config),
            config.default_page_size
        );
    }

    #[test]
    fn test_keyword_is_case_insensitive_on_code_and_name() {
        let page = paginate(rows(), &ListQuery::default().with_keyword("  CUST "));
        assert_eq!(page.total_count, 1);
        assert_eq!(page.items[0].code(), "K2");

        let page = paginate(rows(), &ListQuery::default().with_keyword("k"));
        assert_eq!(page.total_count, 3);
    }

    #[test]
    fn test_sort_and_slice() {
        let query = ListQuery {
            offset: Some(1),
            limit: Some(1),
            ..ListQuery::default().sorted_by("kpiName", SortOrder::Desc)
        };
        let page = paginate(rows(), &query);
        assert_eq!(page.total_count, 3);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].name(), "Customer satisfaction");
    }
}
