//! Result rows returned by the analytics queries.

use chrono::{DateTime, Utc};
use common::ProductId;
use domain::{Money, OrderFilter};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AnalyticsError, Result};

/// Half-open window on order creation time: `from <= created_at < to`.
///
/// Either bound may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Result<Self> {
        if let (Some(from), Some(to)) = (from, to)
            && from > to
        {
            return Err(AnalyticsError::InvalidRange { from, to });
        }
        Ok(Self { from, to })
    }

    /// Unbounded on both sides.
    pub fn all_time() -> Self {
        Self::default()
    }

    pub(crate) fn apply(&self, filter: OrderFilter) -> OrderFilter {
        filter.created_between(self.from, self.to)
    }
}

/// One group of a breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue<V = Money> {
    pub key: String,
    pub value: V,
}

impl<V> KeyValue<V> {
    pub fn new(key: impl Into<String>, value: V) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Revenue and cost figures over a set of orders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesSummary {
    pub order_count: u64,
    /// Sum of order totals.
    pub revenue: Money,
    pub cogs: Money,
    /// `revenue - cogs`.
    pub gross_profit: Money,
    /// Zero when there are no orders.
    pub average_order_value: Money,
    pub average_cogs: Money,
}

impl SalesSummary {
    pub(crate) fn from_totals(order_count: u64, revenue: Money, cogs: Money) -> Self {
        Self {
            order_count,
            revenue,
            cogs,
            gross_profit: revenue - cogs,
            average_order_value: average(revenue, order_count),
            average_cogs: average(cogs, order_count),
        }
    }
}

/// Mean rounded to two decimal places; zero for an empty set.
fn average(sum: Money, count: u64) -> Money {
    if count == 0 {
        return Money::zero();
    }
    Money::new((sum.amount() / Decimal::from(count)).round_dp(2))
}

/// Units and revenue attributed to one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSales {
    pub product_id: ProductId,
    pub quantity: u64,
    /// Sum of line totals (`unit_price × quantity`).
    pub revenue: Money,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reversed_range_is_rejected() {
        let now = Utc::now();
        let err = DateRange::new(Some(now), Some(now - Duration::days(1))).unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidRange { .. }));
        assert!(DateRange::new(Some(now), None).is_ok());
    }

    #[test]
    fn test_empty_summary_is_zero() {
        let summary = SalesSummary::from_totals(0, Money::zero(), Money::zero());
        assert_eq!(summary, SalesSummary::default());
    }

    #[test]
    fn test_averages_round_to_cents() {
        let summary =
            SalesSummary::from_totals(3, Money::new(dec!(10.00)), Money::new(dec!(4.00)));
        assert_eq!(summary.average_order_value, Money::new(dec!(3.33)));
        assert_eq!(summary.average_cogs, Money::new(dec!(1.33)));
        assert_eq!(summary.gross_profit, Money::new(dec!(6.00)));
    }
}
