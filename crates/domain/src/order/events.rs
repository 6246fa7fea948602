//! Order domain events and the in-process bus that carries them.
//!
//! Events are published after the change is persisted. Delivery is best
//! effort: subscribers that lag or are absent simply miss events.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{BusinessId, OrderId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::{Money, OrderStatus, PaymentMethod, PaymentStatus};

const CHANNEL_CAPACITY: usize = 1024;

/// Events emitted by the order service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    OrderCreated(OrderCreatedData),
    StatusChanged(StatusChangedData),
    PaymentStatusChanged(PaymentStatusChangedData),
    /// Payment moved into `paid` from another status.
    PaymentSucceeded(PaymentSucceededData),
}

impl OrderEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "OrderCreated",
            OrderEvent::StatusChanged(_) => "StatusChanged",
            OrderEvent::PaymentStatusChanged(_) => "PaymentStatusChanged",
            OrderEvent::PaymentSucceeded(_) => "PaymentSucceeded",
        }
    }

    pub fn order_id(&self) -> OrderId {
        match self {
            OrderEvent::OrderCreated(d) => d.order_id,
            OrderEvent::StatusChanged(d) => d.order_id,
            OrderEvent::PaymentStatusChanged(d) => d.order_id,
            OrderEvent::PaymentSucceeded(d) => d.order_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreatedData {
    pub business_id: BusinessId,
    pub order_id: OrderId,
    pub order_number: String,
    pub total: Money,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChangedData {
    pub business_id: BusinessId,
    pub order_id: OrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatusChangedData {
    pub business_id: BusinessId,
    pub order_id: OrderId,
    pub from: PaymentStatus,
    pub to: PaymentStatus,
    pub changed_at: DateTime<Utc>,
}

/// Signal for the accounting side to record revenue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSucceededData {
    pub business_id: BusinessId,
    pub order_id: OrderId,
    pub payment_method: PaymentMethod,
    pub order_total: Money,
    pub currency: String,
    pub paid_at: DateTime<Utc>,
}

/// Sink for order events.
pub trait OrderEventPublisher: Send + Sync {
    fn publish(&self, event: OrderEvent);
}

/// Publisher that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

impl OrderEventPublisher for NoopPublisher {
    fn publish(&self, _event: OrderEvent) {}
}

/// In-process fan-out over a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastEventBus {
    sender: broadcast::Sender<Arc<OrderEvent>>,
}

impl BroadcastEventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<OrderEvent>> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderEventPublisher for BroadcastEventBus {
    fn publish(&self, event: OrderEvent) {
        let event_type = event.event_type();
        // Err only means nobody is listening.
        if self.sender.send(Arc::new(event)).is_err() {
            tracing::trace!(event_type, "no subscribers for order event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn payment_succeeded() -> OrderEvent {
        OrderEvent::PaymentSucceeded(PaymentSucceededData {
            business_id: BusinessId::new(),
            order_id: OrderId::new(),
            payment_method: PaymentMethod::CreditCard,
            order_total: Money::new(dec!(27.25)),
            currency: "AED".into(),
            paid_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscribers() {
        let bus = BroadcastEventBus::new();
        let mut rx = bus.subscribe();
        let event = payment_succeeded();

        bus.publish(event.clone());

        let received = rx.recv().await.unwrap();
        assert_eq!(*received, event);
    }

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        BroadcastEventBus::new().publish(payment_succeeded());
        NoopPublisher.publish(payment_succeeded());
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = payment_succeeded();
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "PaymentSucceeded");
        assert_eq!(json["data"]["order_total"], "27.25");
        assert_eq!(json["data"]["payment_method"], "credit_card");
        assert_eq!(event.event_type(), "PaymentSucceeded");
    }
}
