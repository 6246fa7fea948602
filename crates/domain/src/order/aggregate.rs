//! Order aggregate, line items and notes.

use chrono::{DateTime, Utc};
use common::{
    AddressId, BusinessId, CustomerId, OrderId, OrderItemId, OrderNoteId, ProductId, VariantId,
    Version,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::directory::BusinessContext;

use super::state_machine::{Lifecycle, PaymentChange, StatusChange, TransitionError};
use super::{Money, NewOrder, OrderStatus, OrderTotals, PaymentMethod, PaymentStatus};

/// A single customer purchase within one business.
///
/// Monetary fields and `currency` are snapshots taken at creation; nothing
/// here is re-derived from the catalog or business settings afterwards.
/// Status fields change only through [`Order::transition_status`] and
/// [`Order::transition_payment`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub business_id: BusinessId,
    pub order_number: String,
    pub customer_id: Option<CustomerId>,
    pub shipping_address_id: Option<AddressId>,
    pub channel: String,

    pub subtotal: Money,
    pub vat: Money,
    pub vat_rate: Decimal,
    pub shipping_fee: Money,
    pub discount: Money,
    pub cogs: Money,
    pub total: Money,
    pub currency: String,

    #[serde(flatten)]
    lifecycle: Lifecycle,
    pub payment_method: PaymentMethod,
    pub payment_reference: Option<String>,

    pub items: Vec<OrderItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<OrderNote>,

    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Builds a new pending order from a validated request.
    ///
    /// Currency and VAT rate are copied from `business` by value. Line
    /// amounts come from `totals.lines`, which pairs with `request.items`.
    pub fn create(
        business: &BusinessContext,
        request: &NewOrder,
        totals: &OrderTotals,
        order_number: String,
        now: DateTime<Utc>,
    ) -> Self {
        let id = OrderId::new();
        let items = request
            .items
            .iter()
            .zip(&totals.lines)
            .map(|(item, line)| OrderItem {
                id: OrderItemId::new(),
                order_id: id,
                // Filled from the catalog lookup by the service.
                product_id: None,
                variant_id: item.variant_id,
                quantity: item.quantity,
                currency: business.currency.clone(),
                unit_price: item.unit_price,
                unit_cost: item.unit_cost,
                total_cost: line.total_cost,
                total: line.total,
            })
            .collect();

        Self {
            id,
            business_id: business.id,
            order_number,
            customer_id: request.customer_id,
            shipping_address_id: request.shipping_address_id,
            channel: request.channel.clone(),
            subtotal: totals.subtotal,
            vat: totals.vat,
            vat_rate: totals.vat_rate,
            shipping_fee: totals.shipping_fee,
            discount: totals.discount,
            cogs: totals.cogs,
            total: totals.total,
            currency: business.currency.clone(),
            lifecycle: Lifecycle::new(),
            payment_method: request.payment_method,
            payment_reference: None,
            items,
            notes: Vec::new(),
            version: Version::first(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Rebuilds an order from persisted parts.
    pub fn restore(header: OrderHeader, lifecycle: Lifecycle, items: Vec<OrderItem>) -> Self {
        Self {
            id: header.id,
            business_id: header.business_id,
            order_number: header.order_number,
            customer_id: header.customer_id,
            shipping_address_id: header.shipping_address_id,
            channel: header.channel,
            subtotal: header.subtotal,
            vat: header.vat,
            vat_rate: header.vat_rate,
            shipping_fee: header.shipping_fee,
            discount: header.discount,
            cogs: header.cogs,
            total: header.total,
            currency: header.currency,
            lifecycle,
            payment_method: header.payment_method,
            payment_reference: header.payment_reference,
            items,
            notes: Vec::new(),
            version: header.version,
            created_at: header.created_at,
            updated_at: header.updated_at,
            deleted_at: header.deleted_at,
        }
    }

    pub fn status(&self) -> OrderStatus {
        self.lifecycle.status()
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.lifecycle.payment_status()
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }

    /// Recomputes the total from the stored monetary fields.
    pub fn expected_total(&self) -> Option<Money> {
        OrderTotals::total_of(self.subtotal, self.vat, self.shipping_fee, self.discount)
    }

    /// Sum of the line totals.
    pub fn items_subtotal(&self) -> Money {
        self.items.iter().map(|i| i.total).sum()
    }

    /// Moves the order status. On error the order is unchanged.
    pub fn transition_status(
        &mut self,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<StatusChange, TransitionError> {
        let change = self.lifecycle.transition_status(to, at)?;
        self.updated_at = at;
        Ok(change)
    }

    /// Moves the payment status. On error the order is unchanged.
    pub fn transition_payment(
        &mut self,
        to: PaymentStatus,
        at: DateTime<Utc>,
    ) -> Result<PaymentChange, TransitionError> {
        let change = self.lifecycle.transition_payment(to, at)?;
        self.updated_at = at;
        Ok(change)
    }

    /// Records how the order was paid.
    pub fn set_payment_details(
        &mut self,
        method: Option<PaymentMethod>,
        reference: Option<String>,
    ) {
        if let Some(method) = method {
            self.payment_method = method;
        }
        if reference.is_some() {
            self.payment_reference = reference;
        }
    }

    /// Marks the order as logically deleted.
    pub fn mark_deleted(&mut self, at: DateTime<Utc>) {
        self.deleted_at.get_or_insert(at);
        self.updated_at = at;
    }
}

/// Scalar columns of an order, as loaded from storage.
#[derive(Debug, Clone)]
pub struct OrderHeader {
    pub id: OrderId,
    pub business_id: BusinessId,
    pub order_number: String,
    pub customer_id: Option<CustomerId>,
    pub shipping_address_id: Option<AddressId>,
    pub channel: String,
    pub subtotal: Money,
    pub vat: Money,
    pub vat_rate: Decimal,
    pub shipping_fee: Money,
    pub discount: Money,
    pub cogs: Money,
    pub total: Money,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub payment_reference: Option<String>,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Immutable price/quantity snapshot for one variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: Option<ProductId>,
    pub variant_id: VariantId,
    pub quantity: u32,
    pub currency: String,
    pub unit_price: Money,
    pub unit_cost: Money,
    pub total_cost: Money,
    /// `unit_price × quantity`.
    pub total: Money,
}

/// Free-text annotation on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderNote {
    pub id: OrderNoteId,
    pub order_id: OrderId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl OrderNote {
    pub fn new(order_id: OrderId, content: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: OrderNoteId::new(),
            order_id,
            content: content.into(),
            created_at: at,
        }
    }
}
