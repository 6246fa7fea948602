//! Shared identifier types for the order core.

mod types;

pub use types::{
    AddressId, BusinessId, CustomerId, OrderId, OrderItemId, OrderNoteId, ProductId, VariantId,
    Version,
};
