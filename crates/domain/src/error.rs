//! Domain error types.

use common::{AddressId, BusinessId, CustomerId, OrderId, OrderNoteId, VariantId};
use serde_json::{Value, json};
use thiserror::Error;

use crate::directory::LookupError;
use crate::order::{Money, OrderStatus, PaymentStatus, TransitionError};
use crate::repository::RepositoryError;

/// Broad category of an [`OrderError`], used to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Internal,
}

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order must contain at least one item")]
    EmptyItems,

    #[error("item {index} has invalid quantity {quantity} (must be between 1 and {max})", max = crate::order::MAX_ITEM_QUANTITY)]
    InvalidItemQuantity { index: usize, quantity: u32 },

    #[error("item {index} has invalid unit price {price} (must be greater than 0)")]
    InvalidItemPrice { index: usize, price: Money },

    #[error("item {index} has invalid unit cost {cost} (must not be negative)")]
    InvalidItemCost { index: usize, cost: Money },

    #[error("{field} must not be negative, got {amount}")]
    InvalidAmount { field: &'static str, amount: Money },

    #[error("{field} exceeds the supported amount range")]
    AmountOverflow { field: &'static str },

    #[error("note content must not be empty")]
    EmptyNote,

    #[error("order not found: {order_id}")]
    NotFound { order_id: OrderId },

    #[error("order not found: {order_number}")]
    OrderNumberNotFound { order_number: String },

    #[error("business not found: {business_id}")]
    BusinessNotFound { business_id: BusinessId },

    #[error("customer not found: {customer_id}")]
    CustomerNotFound { customer_id: CustomerId },

    #[error("address not found: {address_id}")]
    AddressNotFound { address_id: AddressId },

    #[error("variant not found: {variant_id}")]
    VariantNotFound { variant_id: VariantId },

    #[error("note {note_id} not found on order {order_id}")]
    NoteNotFound {
        order_id: OrderId,
        note_id: OrderNoteId,
    },

    #[error("cannot transition order status from {from} to {to}")]
    StatusUpdateNotAllowed {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("cannot transition payment status from {from} to {to}")]
    PaymentStatusUpdateNotAllowed {
        order_id: OrderId,
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("cannot set payment status to {requested} while order status is {order_status}")]
    PaymentStatusInvalidForOrderStatus {
        order_id: OrderId,
        order_status: OrderStatus,
        requested: PaymentStatus,
    },

    #[error("cannot delete order in status {status}")]
    CannotDelete {
        order_id: OrderId,
        status: OrderStatus,
    },

    #[error("order number {order_number} already exists")]
    DuplicateOrderNumber { order_number: String },

    #[error("order {order_id} was modified concurrently")]
    ConcurrentModification { order_id: OrderId },

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("lookup error: {0}")]
    Lookup(#[from] LookupError),
}

impl OrderError {
    /// Attaches the order ID to a state machine denial.
    pub fn from_transition(order_id: OrderId, err: TransitionError) -> Self {
        match err {
            TransitionError::Status { from, to } => {
                OrderError::StatusUpdateNotAllowed { order_id, from, to }
            }
            TransitionError::Payment { from, to } => {
                OrderError::PaymentStatusUpdateNotAllowed { order_id, from, to }
            }
            TransitionError::PaymentForOrderStatus {
                order_status,
                requested,
            } => OrderError::PaymentStatusInvalidForOrderStatus {
                order_id,
                order_status,
                requested,
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        use OrderError::*;
        match self {
            EmptyItems
            | InvalidItemQuantity { .. }
            | InvalidItemPrice { .. }
            | InvalidItemCost { .. }
            | InvalidAmount { .. }
            | AmountOverflow { .. }
            | EmptyNote => ErrorKind::Validation,
            NotFound { .. }
            | OrderNumberNotFound { .. }
            | BusinessNotFound { .. }
            | CustomerNotFound { .. }
            | AddressNotFound { .. }
            | VariantNotFound { .. }
            | NoteNotFound { .. } => ErrorKind::NotFound,
            StatusUpdateNotAllowed { .. }
            | PaymentStatusUpdateNotAllowed { .. }
            | PaymentStatusInvalidForOrderStatus { .. }
            | CannotDelete { .. }
            | DuplicateOrderNumber { .. }
            | ConcurrentModification { .. } => ErrorKind::Conflict,
            Repository(_) | Lookup(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable identifier.
    pub fn code(&self) -> &'static str {
        use OrderError::*;
        match self {
            EmptyItems => "order.empty_items",
            InvalidItemQuantity { .. } => "order.invalid_item_quantity",
            InvalidItemPrice { .. } => "order.invalid_item_price",
            InvalidItemCost { .. } => "order.invalid_item_cost",
            InvalidAmount { .. } => "order.invalid_amount",
            AmountOverflow { .. } => "order.amount_overflow",
            EmptyNote => "order.invalid_note",
            NotFound { .. } | OrderNumberNotFound { .. } => "order.not_found",
            BusinessNotFound { .. } => "order.business_not_found",
            CustomerNotFound { .. } => "order.customer_not_found",
            AddressNotFound { .. } => "order.address_not_found",
            VariantNotFound { .. } => "order.variant_not_found",
            NoteNotFound { .. } => "order.note_not_found",
            StatusUpdateNotAllowed { .. } => "order.status_update_not_allowed",
            PaymentStatusUpdateNotAllowed { .. } => "order.payment_status_update_not_allowed",
            PaymentStatusInvalidForOrderStatus { .. } => {
                "order.payment_status_invalid_for_order_status"
            }
            CannotDelete { .. } => "order.cannot_delete",
            DuplicateOrderNumber { .. } => "order.duplicate_order_number",
            ConcurrentModification { .. } => "order.concurrent_modification",
            Repository(_) | Lookup(_) => "order.internal",
        }
    }

    /// Structured context for callers. Internal errors carry none.
    pub fn details(&self) -> Value {
        use OrderError::*;
        match self {
            InvalidItemQuantity { index, quantity } => {
                json!({ "index": index, "quantity": quantity })
            }
            InvalidItemPrice { index, price } => json!({ "index": index, "unit_price": price }),
            InvalidItemCost { index, cost } => json!({ "index": index, "unit_cost": cost }),
            InvalidAmount { field, amount } => json!({ "field": field, "amount": amount }),
            AmountOverflow { field } => json!({ "field": field }),
            NotFound { order_id } | ConcurrentModification { order_id } => {
                json!({ "order_id": order_id })
            }
            OrderNumberNotFound { order_number } | DuplicateOrderNumber { order_number } => {
                json!({ "order_number": order_number })
            }
            BusinessNotFound { business_id } => json!({ "business_id": business_id }),
            CustomerNotFound { customer_id } => json!({ "customer_id": customer_id }),
            AddressNotFound { address_id } => json!({ "address_id": address_id }),
            VariantNotFound { variant_id } => json!({ "variant_id": variant_id }),
            NoteNotFound { order_id, note_id } => {
                json!({ "order_id": order_id, "note_id": note_id })
            }
            StatusUpdateNotAllowed { order_id, from, to } => {
                json!({ "order_id": order_id, "current_status": from, "requested_status": to })
            }
            PaymentStatusUpdateNotAllowed { order_id, from, to } => json!({
                "order_id": order_id,
                "current_payment_status": from,
                "requested_payment_status": to,
            }),
            PaymentStatusInvalidForOrderStatus {
                order_id,
                order_status,
                requested,
            } => json!({
                "order_id": order_id,
                "order_status": order_status,
                "requested_payment_status": requested,
            }),
            CannotDelete { order_id, status } => {
                json!({ "order_id": order_id, "status": status })
            }
            EmptyItems | EmptyNote | Repository(_) | Lookup(_) => Value::Null,
        }
    }
}
