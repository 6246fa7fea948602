//! Order status, payment status and payment method enumerations.

use serde::{Deserialize, Serialize};

/// Fulfillment-progress axis of an order.
///
/// ```text
/// Pending ──► Placed ──┬──► ReadyForShipment ──► Shipped ──► Fulfilled ──► Returned
///    │           │     └───────────────────────►   ▲
///    │           │            │
///    └───────────┴────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order captured but not yet confirmed.
    #[default]
    Pending,

    /// Order confirmed by the merchant.
    Placed,

    /// Optional packing step between placed and shipped.
    ReadyForShipment,

    /// Handed to the carrier.
    Shipped,

    /// Delivered to the customer.
    Fulfilled,

    /// Cancelled before shipment (terminal).
    Cancelled,

    /// Returned after fulfillment (terminal).
    Returned,
}

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Placed,
        OrderStatus::ReadyForShipment,
        OrderStatus::Shipped,
        OrderStatus::Fulfilled,
        OrderStatus::Cancelled,
        OrderStatus::Returned,
    ];

    /// Returns true if payment status may move while the order is in this status.
    pub fn accepts_payment_changes(&self) -> bool {
        matches!(
            self,
            OrderStatus::Placed
                | OrderStatus::ReadyForShipment
                | OrderStatus::Shipped
                | OrderStatus::Fulfilled
        )
    }

    /// Returns true if the order may be (soft) deleted in this status.
    pub fn is_deletable(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Cancelled)
    }

    /// Returns true if the order is still in flight.
    pub fn is_open(&self) -> bool {
        !matches!(
            self,
            OrderStatus::Fulfilled | OrderStatus::Cancelled | OrderStatus::Returned
        )
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Returned)
    }

    /// Returns the wire/storage name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Placed => "placed",
            OrderStatus::ReadyForShipment => "ready_for_shipment",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Fulfilled => "fulfilled",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Returned => "returned",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("order status", s))
    }
}

/// Money-collection axis of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 4] = [
        PaymentStatus::Pending,
        PaymentStatus::Paid,
        PaymentStatus::Failed,
        PaymentStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("payment status", s))
    }
}

/// How the customer paid (or will pay) for the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    Paypal,
    #[default]
    BankTransfer,
    CashOnDelivery,
    Tamara,
    Tabby,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 6] = [
        PaymentMethod::CreditCard,
        PaymentMethod::Paypal,
        PaymentMethod::BankTransfer,
        PaymentMethod::CashOnDelivery,
        PaymentMethod::Tamara,
        PaymentMethod::Tabby,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::CashOnDelivery => "cash_on_delivery",
            PaymentMethod::Tamara => "tamara",
            PaymentMethod::Tabby => "tabby",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentMethod::ALL
            .into_iter()
            .find(|method| method.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("payment method", s))
    }
}

/// Returned when a stored or submitted name matches no enum variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
