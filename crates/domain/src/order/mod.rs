//! Order aggregate and related types.

mod aggregate;
pub mod codes;
mod commands;
pub mod events;
mod service;
mod state;
pub mod state_machine;
mod totals;
mod value_objects;

pub use aggregate::{Order, OrderHeader, OrderItem, OrderNote};
pub use commands::{MAX_ITEM_QUANTITY, NewOrder, NewOrderItem, PaymentDetails};
pub use events::{
    BroadcastEventBus, NoopPublisher, OrderCreatedData, OrderEvent, OrderEventPublisher,
    PaymentStatusChangedData, PaymentSucceededData, StatusChangedData,
};
pub use service::{OrderService, OrderServiceConfig};
pub use state::{OrderStatus, PaymentMethod, PaymentStatus, UnknownVariant};
pub use state_machine::{Lifecycle, StatusTimestamps, TransitionError};
pub use totals::{LineTotals, OrderTotals};
pub use value_objects::Money;
