//! Achievement rate and direction judgement for measured KPI periods.

use bigdecimal::{BigDecimal, RoundingMode, ToPrimitive, Zero};

use super::storage::f64_to_decimal;
use super::types::{Direction, Judgement};

/// `actual / target * 100`, rounded half-up to one decimal place.
///
/// Returns `None` when either side is missing, the target is zero, or the
/// result would not be a finite number. Each input is taken at its shortest
/// decimal form, so `1.0045` rounds like the decimal it prints as.
pub fn achievement_rate(actual: Option<f64>, target: Option<f64>) -> Option<f64> {
    let actual = f64_to_decimal(actual?).ok()?;
    let target = f64_to_decimal(target?).ok()?;
    decimal_achievement_rate(Some(&actual), Some(&target))
}

/// Rate computed on stored NUMERIC values without passing through binary
/// floating point.
pub fn decimal_achievement_rate(
    actual: Option<&BigDecimal>,
    target: Option<&BigDecimal>,
) -> Option<f64> {
    let (actual, target) = (actual?, target?);
    if target.is_zero() {
        return None;
    }
    round_half_up_tenth(&(actual * BigDecimal::from(100) / target))
}

/// `floor(value * 10 + 0.5) / 10`, so ties move toward positive infinity.
fn round_half_up_tenth(value: &BigDecimal) -> Option<f64> {
    let half = BigDecimal::from(5) / BigDecimal::from(10);
    let tenths = (value * BigDecimal::from(10) + half).with_scale_round(0, RoundingMode::Floor);
    let rounded = match tenths.to_i64() {
        Some(n) => n as f64 / 10.0,
        None => (tenths / BigDecimal::from(10)).to_f64()?,
    };
    rounded.is_finite().then_some(rounded)
}

impl Direction {
    pub fn judge(&self, actual: Option<f64>, target: Option<f64>) -> Option<Judgement> {
        let (actual, target) = (actual?, target?);
        let achieved = match self {
            Self::HigherIsBetter => actual >= target,
            Self::LowerIsBetter => actual <= target,
        };
        Some(if achieved {
            Judgement::Achieved
        } else {
            Judgement::NotAchieved
        })
    }
}

/// No judgement is rendered for a definition without a direction.
pub fn judge(
    direction: Option<Direction>,
    actual: Option<f64>,
    target: Option<f64>,
) -> Option<Judgement> {
    direction?.judge(actual, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_rate_rounds_to_one_decimal() {
        assert_eq!(
            achievement_rate(Some(104_200_000.0), Some(100_000_000.0)),
            Some(104.2)
        );
        assert_eq!(achievement_rate(Some(520_000.0), Some(500_000.0)), Some(104.0));
        assert_eq!(achievement_rate(Some(2.0), Some(3.0)), Some(66.7));
        assert_eq!(achievement_rate(Some(1.0), Some(3.0)), Some(33.3));
    }

    #[test]
    fn test_rate_rounds_half_up() {
        // x/16 is exact in binary, so these land exactly on the .x5 boundary
        assert_eq!(achievement_rate(Some(1.0), Some(16.0)), Some(6.3));
        assert_eq!(achievement_rate(Some(3.0), Some(16.0)), Some(18.8));
        assert_eq!(achievement_rate(Some(-1.0), Some(16.0)), Some(-6.2));
    }

    #[test]
    fn test_rate_rounds_half_up_on_decimal_boundary() {
        assert_eq!(achievement_rate(Some(10_045.0), Some(10_000.0)), Some(100.5));
        assert_eq!(achievement_rate(Some(1.0045), Some(1.0)), Some(100.5));
        assert_eq!(achievement_rate(Some(0.1235), Some(0.1)), Some(123.5));
        assert_eq!(achievement_rate(Some(1.0044), Some(1.0)), Some(100.4));
    }

    #[test]
    fn test_decimal_rate_matches_stored_values() {
        let dec = |s: &str| BigDecimal::from_str(s).unwrap();
        assert_eq!(
            decimal_achievement_rate(Some(&dec("10045")), Some(&dec("10000"))),
            Some(100.5)
        );
        assert_eq!(
            decimal_achievement_rate(Some(&dec("520000")), Some(&dec("500000.00"))),
            Some(104.0)
        );
        assert_eq!(
            decimal_achievement_rate(Some(&dec("-1")), Some(&dec("16"))),
            Some(-6.2)
        );
        assert_eq!(decimal_achievement_rate(Some(&dec("5")), Some(&dec("0.000"))), None);
        assert_eq!(decimal_achievement_rate(None, Some(&dec("1"))), None);
    }

    #[test]
    fn test_rate_is_undefined_without_inputs() {
        assert_eq!(achievement_rate(None, Some(100.0)), None);
        assert_eq!(achievement_rate(Some(100.0), None), None);
        assert_eq!(achievement_rate(None, None), None);
        assert_eq!(achievement_rate(Some(100.0), Some(0.0)), None);
        assert_eq!(achievement_rate(Some(0.0), Some(-0.0)), None);
        assert_eq!(achievement_rate(Some(f64::NAN), Some(1.0)), None);
        assert_eq!(achievement_rate(Some(1.0), Some(f64::INFINITY)), None);
    }

    #[test]
    fn test_rate_of_zero_actual() {
        assert_eq!(achievement_rate(Some(0.0), Some(250.0)), Some(0.0));
        assert_eq!(achievement_rate(Some(0.0), Some(-250.0)), Some(0.0));
    }

    #[test]
    fn test_judgement_follows_direction() {
        assert_eq!(
            judge(Some(Direction::HigherIsBetter), Some(110.0), Some(100.0)),
            Some(Judgement::Achieved)
        );
        assert_eq!(
            judge(Some(Direction::HigherIsBetter), Some(90.0), Some(100.0)),
            Some(Judgement::NotAchieved)
        );
        assert_eq!(
            judge(Some(Direction::LowerIsBetter), Some(90.0), Some(100.0)),
            Some(Judgement::Achieved)
        );
        assert_eq!(
            judge(Some(Direction::LowerIsBetter), Some(100.0), Some(100.0)),
            Some(Judgement::Achieved)
        );
    }

    #[test]
    fn test_no_judgement_without_direction_or_values() {
        assert_eq!(judge(None, Some(1.0), Some(1.0)), None);
        assert_eq!(judge(Some(Direction::HigherIsBetter), None, Some(1.0)), None);
    }
}
