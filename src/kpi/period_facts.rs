//! Builds the per-period view of a KPI item from its stored rows.
//!
//! NON_FINANCIAL items read measured fact amounts (target and actual).
//! FINANCIAL and METRIC items read plan-only target values; their actuals
//! come from the reporting pipeline and are never filled in here.

use log::{debug, warn};
use std::collections::btree_map::Entry;
use std::collections::BTreeSet;
use std::str::FromStr;

use super::achievement::{decimal_achievement_rate, judge};
use super::error::KpiError;
use super::storage::{decimal_to_f64, DbKpiFactAmount, DbKpiTargetValue};
use super::types::{Direction, KpiType, PeriodFact, PeriodFacts};

pub fn assemble_period_facts(
    kpi_type: KpiType,
    fact_amounts: &[DbKpiFactAmount],
    target_values: &[DbKpiTargetValue],
) -> PeriodFacts {
    assemble_with_direction(kpi_type, fact_amounts, target_values, None)
}

/// Same as [`assemble_period_facts`], with a direction for judging
/// NON_FINANCIAL periods.
pub fn assemble_with_direction(
    kpi_type: KpiType,
    fact_amounts: &[DbKpiFactAmount],
    target_values: &[DbKpiTargetValue],
    direction: Option<Direction>,
) -> PeriodFacts {
    let facts = match kpi_type {
        KpiType::NonFinancial => from_fact_amounts(fact_amounts, direction),
        KpiType::Financial | KpiType::Metric => from_target_values(target_values),
    };
    debug!(
        "Assembled {} period facts for {} item",
        facts.len(),
        kpi_type
    );
    facts
}

/// Entry point for a kpiType read straight from storage.
pub fn assemble_for_stored_type(
    kpi_type: &str,
    fact_amounts: &[DbKpiFactAmount],
    target_values: &[DbKpiTargetValue],
) -> Result<PeriodFacts, KpiError> {
    let kpi_type = KpiType::from_str(kpi_type)?;
    Ok(assemble_period_facts(kpi_type, fact_amounts, target_values))
}

/// One entry per period. If several departments report the same period, the
/// company-wide row (no department) takes precedence; otherwise the first
/// row in input order is kept.
fn from_fact_amounts(rows: &[DbKpiFactAmount], direction: Option<Direction>) -> PeriodFacts {
    let mut facts = PeriodFacts::new();
    let mut company_wide = BTreeSet::new();

    for row in rows {
        let is_company_wide = row.department_stable_id.is_none();
        match facts.entry(row.period_code.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(fact_from_amount(row, direction));
                if is_company_wide {
                    company_wide.insert(row.period_code.as_str());
                }
            }
            Entry::Occupied(mut slot) => {
                if is_company_wide && company_wide.insert(row.period_code.as_str()) {
                    slot.insert(fact_from_amount(row, direction));
                }
            }
        }
    }
    facts
}

fn fact_from_amount(row: &DbKpiFactAmount, direction: Option<Direction>) -> PeriodFact {
    let target_value = row.target_value.as_ref().and_then(decimal_to_f64);
    let actual_value = row.actual_value.as_ref().and_then(decimal_to_f64);
    PeriodFact {
        period_code: row.period_code.clone(),
        target_value,
        actual_value,
        achievement_rate: decimal_achievement_rate(
            row.actual_value.as_ref(),
            row.target_value.as_ref(),
        ),
        judgement: judge(direction, actual_value, target_value),
        notes: row.notes.clone(),
    }
}

fn from_target_values(rows: &[DbKpiTargetValue]) -> PeriodFacts {
    let mut facts = PeriodFacts::new();
    for row in rows {
        facts
            .entry(row.period_code.clone())
            .or_insert_with(|| {
                let target_value = decimal_to_f64(&row.target_value);
                if target_value.is_none() {
                    warn!(
                        "Target value {} for period {} is out of range",
                        row.target_value, row.period_code
                    );
                }
                PeriodFact {
                    period_code: row.period_code.clone(),
                    target_value,
                    actual_value: None,
                    achievement_rate: None,
                    judgement: None,
                    notes: None,
                }
            });
    }
    facts
}

/// Orders facts by the start date of their source rows, falling back to
/// period code for periods without a start date.
pub fn chronological<'a>(
    facts: &'a PeriodFacts,
    fact_amounts: &[DbKpiFactAmount],
) -> Vec<&'a PeriodFact> {
    let mut ordered: Vec<&PeriodFact> = facts.values().collect();
    ordered.sort_by_key(|fact| {
        let start = fact_amounts
            .iter()
            .filter(|row| row.period_code == fact.period_code)
            .filter_map(|row| row.period_start_date)
            .min();
        (start.is_none(), start, fact.period_code.clone())
    });
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    fn fact_row(period: &str, target: Option<i64>, actual: Option<i64>) -> DbKpiFactAmount {
        let now = Utc::now();
        DbKpiFactAmount {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            company_id: Uuid::nil(),
            kpi_event_id: Uuid::nil(),
            kpi_definition_id: Uuid::nil(),
            period_code: period.to_string(),
            period_start_date: None,
            period_end_date: None,
            department_stable_id: None,
            target_value: target.map(BigDecimal::from),
            actual_value: actual.map(BigDecimal::from),
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn target_row(period: &str, target: i64) -> DbKpiTargetValue {
        let now = Utc::now();
        DbKpiTargetValue {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            company_id: Uuid::nil(),
            kpi_master_item_id: Uuid::nil(),
            period_code: period.to_string(),
            target_value: BigDecimal::from(target),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_non_financial_uses_fact_amounts() {
        let mut row = fact_row("2026-04", Some(500_000), Some(520_000));
        row.notes = Some("ok".to_string());
        let facts = assemble_period_facts(
            KpiType::NonFinancial,
            &[row],
            &[target_row("2026-04", 1)],
        );

        assert_eq!(facts.len(), 1);
        assert_eq!(
            facts["2026-04"],
            PeriodFact {
                period_code: "2026-04".to_string(),
                target_value: Some(500_000.0),
                actual_value: Some(520_000.0),
                achievement_rate: Some(104.0),
                judgement: None,
                notes: Some("ok".to_string()),
            }
        );
    }

    #[test]
    fn test_financial_and_metric_use_target_values() {
        for kpi_type in [KpiType::Financial, KpiType::Metric] {
            let facts = assemble_period_facts(
                kpi_type,
                &[fact_row("2026-Q1", Some(1), Some(1))],
                &[target_row("2026-Q1", 1_000_000)],
            );
            assert_eq!(
                facts["2026-Q1"],
                PeriodFact {
                    period_code: "2026-Q1".to_string(),
                    target_value: Some(1_000_000.0),
                    actual_value: None,
                    achievement_rate: None,
                    judgement: None,
                    notes: None,
                }
            );
        }
    }

    #[test]
    fn test_missing_values_leave_rate_undefined() {
        let facts = assemble_period_facts(
            KpiType::NonFinancial,
            &[
                fact_row("2026-05", Some(100), None),
                fact_row("2026-06", Some(0), Some(5)),
            ],
            &[],
        );
        assert_eq!(facts["2026-05"].achievement_rate, None);
        assert_eq!(facts["2026-06"].achievement_rate, None);
        assert_eq!(facts["2026-06"].actual_value, Some(5.0));
    }

    #[test]
    fn test_unknown_stored_type_is_rejected() {
        let result = assemble_for_stored_type("BUDGET", &[], &[target_row("2026-Q1", 1)]);
        assert!(matches!(result, Err(KpiError::UnsupportedKpiType(_))));

        let facts = assemble_for_stored_type("METRIC", &[], &[target_row("2026-Q1", 1)]).unwrap();
        assert_eq!(facts.len(), 1);
    }

    #[test]
    fn test_assembly_is_repeatable() {
        let facts = vec![
            fact_row("2026-06", Some(10), Some(7)),
            fact_row("2026-04", Some(10), Some(12)),
        ];
        let first = assemble_period_facts(KpiType::NonFinancial, &facts, &[]);
        let second = assemble_period_facts(KpiType::NonFinancial, &facts, &[]);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        let keys: Vec<&String> = first.keys().collect();
        assert_eq!(keys, ["2026-04", "2026-06"]);
    }

    #[test]
    fn test_company_wide_row_wins_period() {
        let mut sales = fact_row("2026-04", Some(10), Some(4));
        sales.department_stable_id = Some("SALES".to_string());
        let total = fact_row("2026-04", Some(100), Some(90));
        let mut ops = fact_row("2026-04", Some(20), Some(20));
        ops.department_stable_id = Some("OPS".to_string());

        let facts = assemble_period_facts(
            KpiType::NonFinancial,
            &[sales.clone(), total, ops.clone()],
            &[],
        );
        assert_eq!(facts["2026-04"].target_value, Some(100.0));

        let facts = assemble_period_facts(KpiType::NonFinancial, &[sales, ops], &[]);
        assert_eq!(facts["2026-04"].target_value, Some(10.0));
    }

    #[test]
    fn test_direction_adds_judgement() {
        let facts = assemble_with_direction(
            KpiType::NonFinancial,
            &[fact_row("2026-04", Some(10), Some(12))],
            &[],
            Some(Direction::LowerIsBetter),
        );
        assert_eq!(
            facts["2026-04"].judgement,
            Some(crate::kpi::types::Judgement::NotAchieved)
        );
    }

    #[test]
    fn test_chronological_order_uses_start_dates() {
        let mut fy_h2 = fact_row("H2", Some(1), Some(1));
        fy_h2.period_start_date = NaiveDate::from_ymd_opt(2026, 10, 1);
        let mut fy_h1 = fact_row("H1", Some(1), Some(1));
        fy_h1.period_start_date = NaiveDate::from_ymd_opt(2026, 4, 1);
        let undated = fact_row("ADJ", Some(1), Some(1));
        let rows = vec![fy_h2, undated, fy_h1];

        let facts = assemble_period_facts(KpiType::NonFinancial, &rows, &[]);
        let ordered: Vec<&str> = chronological(&facts, &rows)
            .into_iter()
            .map(|f| f.period_code.as_str())
            .collect();
        assert_eq!(ordered, ["H1", "H2", "ADJ"]);
    }
}
