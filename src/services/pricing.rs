use crate::{config::AppConfig, errors::ServiceError};
use rust_decimal::{Decimal, RoundingStrategy};
use std::{fmt, str::FromStr, sync::Arc};

/// Unit price actually charged: the promotional price when it is positive,
/// otherwise the list price.
pub fn effective_unit_price(
    product_id: i32,
    list_price: Decimal,
    promo_price: Option<Decimal>,
) -> Result<Decimal, ServiceError> {
    match promo_price {
        Some(promo) if promo > Decimal::ZERO => Ok(promo),
        _ if list_price > Decimal::ZERO => Ok(list_price),
        _ => Err(ServiceError::InvalidPrice(product_id)),
    }
}

/// Rounds to the currency's minor unit, halves away from zero
pub fn round_money(amount: Decimal, minor_units: u32) -> Decimal {
    amount.round_dp_with_strategy(minor_units, RoundingStrategy::MidpointAwayFromZero)
}

fn rate_to_decimal(name: &str, rate: f64) -> Result<Decimal, ServiceError> {
    // Going through the shortest decimal text keeps 0.08 as exactly 0.08.
    Decimal::from_str(&rate.to_string())
        .map_err(|e| ServiceError::InternalError(format!("invalid {} {}: {}", name, rate, e)))
}

/// Part of a line's value drawn from one category
#[derive(Debug, Clone, PartialEq)]
pub struct TaxableSlice {
    pub amount: Decimal,
    pub category_name: Option<String>,
}

/// A priced order line with the slices it was allocated from
#[derive(Debug, Clone, PartialEq)]
pub struct PricedLine {
    pub product_id: i32,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
    pub slices: Vec<TaxableSlice>,
}

impl PricedLine {
    pub fn new(product_id: i32, unit_price: Decimal, quantity: i32) -> Self {
        Self {
            product_id,
            unit_price,
            quantity,
            line_total: unit_price * Decimal::from(quantity),
            slices: Vec::new(),
        }
    }

    /// Records `quantity` units of this line as coming from `category_name`
    pub fn add_slice(&mut self, quantity: i32, category_name: Option<String>) {
        self.slices.push(TaxableSlice {
            amount: self.unit_price * Decimal::from(quantity),
            category_name,
        });
    }

    fn taxable_slices(&self) -> Vec<TaxableSlice> {
        if self.slices.is_empty() {
            vec![TaxableSlice {
                amount: self.line_total,
                category_name: None,
            }]
        } else {
            self.slices.clone()
        }
    }
}

/// Computes unrounded tax for a set of taxable slices
pub trait TaxPolicy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;
    fn unrounded_tax(&self, slices: &[TaxableSlice]) -> Decimal;
}

/// One rate applied to the whole subtotal
#[derive(Debug, Clone)]
pub struct FlatRateTax {
    pub rate: Decimal,
}

impl TaxPolicy for FlatRateTax {
    fn name(&self) -> &'static str {
        "flat"
    }

    fn unrounded_tax(&self, slices: &[TaxableSlice]) -> Decimal {
        let base: Decimal = slices.iter().map(|s| s.amount).sum();
        base * self.rate
    }
}

/// Reduced rate for categories whose name contains one of the keywords,
/// standard rate for everything else
#[derive(Debug, Clone)]
pub struct CategoryRateTax {
    pub reduced_rate: Decimal,
    pub standard_rate: Decimal,
    /// Lowercased name fragments
    pub reduced_keywords: Vec<String>,
}

impl CategoryRateTax {
    pub fn rate_for(&self, category_name: Option<&str>) -> Decimal {
        let reduced = category_name
            .map(str::to_lowercase)
            .map_or(false, |name| {
                self.reduced_keywords
                    .iter()
                    .any(|keyword| name.contains(keyword.as_str()))
            });
        if reduced {
            self.reduced_rate
        } else {
            self.standard_rate
        }
    }
}

impl TaxPolicy for CategoryRateTax {
    fn name(&self) -> &'static str {
        "category"
    }

    fn unrounded_tax(&self, slices: &[TaxableSlice]) -> Decimal {
        slices
            .iter()
            .map(|s| s.amount * self.rate_for(s.category_name.as_deref()))
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Turns priced lines into order totals under the configured tax policy
#[derive(Debug, Clone)]
pub struct PricingCalculator {
    policy: Arc<dyn TaxPolicy>,
    minor_units: u32,
}

impl PricingCalculator {
    pub fn new(policy: Arc<dyn TaxPolicy>, minor_units: u32) -> Self {
        Self {
            policy,
            minor_units,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        let policy: Arc<dyn TaxPolicy> = match config.tax_policy.to_ascii_lowercase().as_str() {
            "flat" => Arc::new(FlatRateTax {
                rate: rate_to_decimal("default_tax_rate", config.default_tax_rate)?,
            }),
            "category" => Arc::new(CategoryRateTax {
                reduced_rate: rate_to_decimal("reduced_tax_rate", config.reduced_tax_rate)?,
                standard_rate: rate_to_decimal("standard_tax_rate", config.standard_tax_rate)?,
                reduced_keywords: config.reduced_tax_keywords(),
            }),
            other => {
                return Err(ServiceError::InternalError(format!(
                    "unknown tax policy '{}'",
                    other
                )))
            }
        };
        Ok(Self::new(policy, config.currency_minor_units))
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Subtotal is exact; tax is rounded once over the whole order.
    pub fn totals(&self, lines: &[PricedLine]) -> OrderTotals {
        let subtotal: Decimal = lines.iter().map(|line| line.line_total).sum();
        let slices: Vec<TaxableSlice> = lines.iter().flat_map(PricedLine::taxable_slices).collect();
        let tax = round_money(self.policy.unrounded_tax(&slices), self.minor_units);
        OrderTotals {
            subtotal,
            tax,
            total: subtotal + tax,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn flat(rate: Decimal) -> PricingCalculator {
        PricingCalculator::new(Arc::new(FlatRateTax { rate }), 0)
    }

    fn category() -> CategoryRateTax {
        CategoryRateTax {
            reduced_rate: dec!(0.08),
            standard_rate: dec!(0.10),
            reduced_keywords: vec!["food".into(), "thực phẩm".into()],
        }
    }

    #[rstest]
    #[case(dec!(100), Some(dec!(80)), 2, dec!(160))]
    #[case(dec!(50), Some(dec!(0)), 3, dec!(150))]
    #[case(dec!(50), None, 1, dec!(50))]
    fn line_totals_use_the_effective_price(
        #[case] list: Decimal,
        #[case] promo: Option<Decimal>,
        #[case] quantity: i32,
        #[case] expected: Decimal,
    ) {
        let unit = effective_unit_price(1, list, promo).unwrap();
        assert_eq!(PricedLine::new(1, unit, quantity).line_total, expected);
    }

    #[test]
    fn no_positive_price_is_rejected() {
        assert!(matches!(
            effective_unit_price(4, dec!(0), Some(dec!(0))),
            Err(ServiceError::InvalidPrice(4))
        ));
        assert!(matches!(
            effective_unit_price(4, dec!(-1), None),
            Err(ServiceError::InvalidPrice(4))
        ));
    }

    #[test]
    fn end_to_end_totals_at_flat_eight_percent() {
        let lines = vec![
            PricedLine::new(1, dec!(20000), 2),
            PricedLine::new(2, dec!(15000), 5),
        ];
        let totals = flat(dec!(0.08)).totals(&lines);
        assert_eq!(totals.subtotal, dec!(115000));
        assert_eq!(totals.tax, dec!(9200));
        assert_eq!(totals.total, dec!(124200));
    }

    #[rstest]
    #[case(dec!(12.5), 0, dec!(13))]
    #[case(dec!(-12.5), 0, dec!(-13))]
    #[case(dec!(12.345), 2, dec!(12.35))]
    #[case(dec!(12.344), 2, dec!(12.34))]
    fn money_rounds_half_away_from_zero(
        #[case] amount: Decimal,
        #[case] minor_units: u32,
        #[case] expected: Decimal,
    ) {
        assert_eq!(round_money(amount, minor_units), expected);
    }

    #[test]
    fn category_policy_taxes_slices_by_category_name() {
        let policy = category();
        assert_eq!(policy.rate_for(Some("Thực phẩm khô")), dec!(0.08));
        assert_eq!(policy.rate_for(Some("Frozen FOOD")), dec!(0.08));
        assert_eq!(policy.rate_for(Some("Household")), dec!(0.10));
        assert_eq!(policy.rate_for(None), dec!(0.10));

        let mut line = PricedLine::new(1, dec!(1000), 3);
        line.add_slice(1, Some("food".into()));
        line.add_slice(2, Some("tools".into()));
        let calc = PricingCalculator::new(Arc::new(policy), 0);
        // 1000 * 0.08 + 2000 * 0.10
        assert_eq!(calc.totals(&[line]).tax, dec!(280));
    }

    #[test]
    fn category_tax_rounds_once_over_the_sum() {
        let mut line = PricedLine::new(1, dec!(5), 2);
        line.add_slice(1, Some("food".into()));
        line.add_slice(1, Some("food".into()));
        let calc = PricingCalculator::new(Arc::new(category()), 0);
        // 0.4 + 0.4 = 0.8 -> 1, whereas rounding each slice would give 0.
        assert_eq!(calc.totals(&[line]).tax, dec!(1));
    }

    #[test]
    fn config_selects_policy() {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".into(),
            "x".repeat(64),
            "127.0.0.1".into(),
            0,
            "development".into(),
        );
        assert_eq!(PricingCalculator::from_config(&cfg).unwrap().policy_name(), "flat");
        cfg.tax_policy = "category".into();
        assert_eq!(
            PricingCalculator::from_config(&cfg).unwrap().policy_name(),
            "category"
        );
        assert_eq!(rate_to_decimal("r", 0.08).unwrap(), dec!(0.08));
    }

    proptest! {
        #[test]
        fn total_is_subtotal_plus_tax(
            items in prop::collection::vec((1i64..1_000_000, 1i32..50), 1..8),
            rate_bp in 0u32..2500,
        ) {
            let lines: Vec<PricedLine> = items
                .iter()
                .enumerate()
                .map(|(i, (price, qty))| PricedLine::new(i as i32, Decimal::from(*price), *qty))
                .collect();
            let calc = flat(Decimal::new(rate_bp as i64, 4));
            let totals = calc.totals(&lines);
            prop_assert_eq!(totals.total, totals.subtotal + totals.tax);
            prop_assert!(totals.tax >= Decimal::ZERO);
            prop_assert_eq!(totals.tax, totals.tax.round_dp(0));
        }
    }
}
