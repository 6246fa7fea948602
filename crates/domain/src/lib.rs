//! Order core of the Kyora back office.
//!
//! This crate provides:
//! - Money and totals arithmetic on exact decimals
//! - Order status and payment status state machines
//! - The order aggregate with line items and notes
//! - The tenant-scoped repository contract and an in-memory implementation
//! - Collaborator lookups (business, customer, variant)
//! - The order service and its error taxonomy

pub mod directory;
pub mod error;
pub mod memory;
pub mod order;
pub mod repository;

pub use directory::{
    AddressRef, BusinessContext, BusinessDirectory, CustomerDirectory, CustomerRef, Directories,
    InMemoryDirectory, LookupError, VariantCatalog, VariantRef,
};
pub use error::{ErrorKind, OrderError};
pub use memory::InMemoryOrderRepository;
pub use order::{
    BroadcastEventBus, Lifecycle, LineTotals, MAX_ITEM_QUANTITY, Money, NewOrder, NewOrderItem,
    Order, OrderEvent, OrderEventPublisher, OrderItem, OrderNote, OrderService,
    OrderServiceConfig, OrderStatus, OrderTotals, PaymentDetails, PaymentMethod, PaymentStatus,
    StatusTimestamps, TransitionError,
};
pub use repository::{
    OrderFilter, OrderQuery, OrderRepository, Page, RepositoryError, SortDirection, SortField,
};
