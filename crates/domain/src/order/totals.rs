//! Order totals computed at creation time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Money, NewOrderItem};
use crate::error::OrderError;

/// Extended amounts of one requested line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineTotals {
    pub total: Money,
    pub total_cost: Money,
}

/// Monetary summary of an order.
///
/// `total = subtotal + vat + shipping_fee - discount`, all exact. Any step
/// that leaves the decimal range fails with [`OrderError::AmountOverflow`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub cogs: Money,
    pub vat_rate: Decimal,
    pub vat: Money,
    pub shipping_fee: Money,
    pub discount: Money,
    pub total: Money,
    /// One entry per requested item, in request order.
    pub lines: Vec<LineTotals>,
}

impl OrderTotals {
    /// Computes totals from requested line items and the business VAT rate.
    pub fn compute(
        items: &[NewOrderItem],
        vat_rate: Decimal,
        shipping_fee: Money,
        discount: Money,
    ) -> Result<Self, OrderError> {
        let mut lines = Vec::with_capacity(items.len());
        let mut subtotal = Money::zero();
        let mut cogs = Money::zero();
        for item in items {
            let line = LineTotals {
                total: overflow(item.unit_price.times(item.quantity), "subtotal")?,
                total_cost: overflow(item.unit_cost.times(item.quantity), "cogs")?,
            };
            subtotal = overflow(subtotal.checked_add(line.total), "subtotal")?;
            cogs = overflow(cogs.checked_add(line.total_cost), "cogs")?;
            lines.push(line);
        }
        let vat = overflow(subtotal.apply_rate(vat_rate), "vat")?;
        let total = overflow(
            Self::total_of(subtotal, vat, shipping_fee, discount),
            "total",
        )?;

        Ok(Self {
            subtotal,
            cogs,
            vat_rate,
            vat,
            shipping_fee,
            discount,
            total,
            lines,
        })
    }

    /// The total formula, applied to stored fields. `None` on overflow.
    pub fn total_of(
        subtotal: Money,
        vat: Money,
        shipping_fee: Money,
        discount: Money,
    ) -> Option<Money> {
        subtotal
            .checked_add(vat)?
            .checked_add(shipping_fee)?
            .checked_sub(discount)
    }
}

fn overflow(amount: Option<Money>, field: &'static str) -> Result<Money, OrderError> {
    amount.ok_or(OrderError::AmountOverflow { field })
}
