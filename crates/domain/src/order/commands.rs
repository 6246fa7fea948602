//! Order commands.

use common::{AddressId, CustomerId, VariantId};
use serde::{Deserialize, Serialize};

use super::{Money, PaymentMethod};

/// Largest quantity one line may carry. Stored quantities are 32-bit signed.
pub const MAX_ITEM_QUANTITY: u32 = i32::MAX as u32;

/// Request to create a new order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    /// The customer placing the order.
    pub customer_id: Option<CustomerId>,

    /// Shipping address; must belong to `customer_id`.
    pub shipping_address_id: Option<AddressId>,

    /// Sales channel tag (e.g. "instagram", "whatsapp").
    #[serde(default)]
    pub channel: String,

    /// Line items. Must be non-empty.
    pub items: Vec<NewOrderItem>,

    #[serde(default)]
    pub shipping_fee: Money,

    #[serde(default)]
    pub discount: Money,

    #[serde(default)]
    pub payment_method: PaymentMethod,
}

impl NewOrder {
    /// Creates a request for a customer with the given items.
    pub fn new(customer_id: CustomerId, items: Vec<NewOrderItem>) -> Self {
        Self {
            customer_id: Some(customer_id),
            shipping_address_id: None,
            channel: String::new(),
            items,
            shipping_fee: Money::zero(),
            discount: Money::zero(),
            payment_method: PaymentMethod::default(),
        }
    }

    pub fn with_shipping_address(mut self, address_id: AddressId) -> Self {
        self.shipping_address_id = Some(address_id);
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_shipping_fee(mut self, fee: Money) -> Self {
        self.shipping_fee = fee;
        self
    }

    pub fn with_discount(mut self, discount: Money) -> Self {
        self.discount = discount;
        self
    }

    pub fn with_payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = method;
        self
    }
}

/// One requested line item. Prices are supplied by the caller and snapshotted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub variant_id: VariantId,
    pub quantity: u32,
    pub unit_price: Money,
    #[serde(default)]
    pub unit_cost: Money,
}

impl NewOrderItem {
    pub fn new(variant_id: VariantId, quantity: u32, unit_price: Money, unit_cost: Money) -> Self {
        Self {
            variant_id,
            quantity,
            unit_price,
            unit_cost,
        }
    }
}

/// Payment details recorded when an order is marked paid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    /// Overrides the method chosen at creation when present.
    pub payment_method: Option<PaymentMethod>,
    pub payment_reference: Option<String>,
}

impl PaymentDetails {
    pub fn new(payment_method: PaymentMethod, payment_reference: Option<String>) -> Self {
        Self {
            payment_method: Some(payment_method),
            payment_reference,
        }
    }
}
