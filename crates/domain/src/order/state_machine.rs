//! Transition rules for the two order axes.
//!
//! Both tables live in one place so they can be read alongside their tests.
//! [`Lifecycle`] is the only type that mutates status fields, and it checks
//! before it acts: a rejected transition leaves every field untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::state::{OrderStatus, PaymentStatus};

/// Order-status transition table.
pub fn allowed_status_transitions(from: OrderStatus) -> &'static [OrderStatus] {
    use OrderStatus::*;
    match from {
        Pending => &[Placed, Cancelled],
        Placed => &[ReadyForShipment, Shipped, Cancelled],
        ReadyForShipment => &[Shipped, Cancelled],
        Shipped => &[Fulfilled],
        Fulfilled => &[Returned],
        Cancelled => &[],
        Returned => &[],
    }
}

/// Payment-status transition table.
pub fn allowed_payment_transitions(from: PaymentStatus) -> &'static [PaymentStatus] {
    use PaymentStatus::*;
    match from {
        Pending => &[Paid, Failed],
        Paid => &[Refunded],
        Failed => &[Pending],
        Refunded => &[],
    }
}

/// A denied transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot transition order status from {from} to {to}")]
    Status { from: OrderStatus, to: OrderStatus },

    #[error("cannot transition payment status from {from} to {to}")]
    Payment {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("cannot set payment status to {requested} while order status is {order_status}")]
    PaymentForOrderStatus {
        order_status: OrderStatus,
        requested: PaymentStatus,
    },
}

impl TransitionError {
    /// Short label used for the rejection metric.
    pub fn label(&self) -> &'static str {
        match self {
            TransitionError::Status { .. } => "status",
            TransitionError::Payment { .. } => "payment",
            TransitionError::PaymentForOrderStatus { .. } => "payment_for_order_status",
        }
    }
}

/// Decides whether the order status may move from `from` to `to`.
pub fn check_status_transition(from: OrderStatus, to: OrderStatus) -> Result<(), TransitionError> {
    if allowed_status_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(TransitionError::Status { from, to })
    }
}

/// Decides whether the payment status may move, given the current order status.
///
/// The order-status check runs first so a pending or cancelled order is
/// rejected regardless of which payment status is requested.
pub fn check_payment_transition(
    order_status: OrderStatus,
    from: PaymentStatus,
    to: PaymentStatus,
) -> Result<(), TransitionError> {
    if !order_status.accepts_payment_changes() {
        return Err(TransitionError::PaymentForOrderStatus {
            order_status,
            requested: to,
        });
    }
    if allowed_payment_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(TransitionError::Payment { from, to })
    }
}

/// Moment each status was first reached. `None` means never reached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTimestamps {
    pub placed_at: Option<DateTime<Utc>>,
    pub ready_for_shipment_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl StatusTimestamps {
    fn status_slot(&mut self, status: OrderStatus) -> Option<&mut Option<DateTime<Utc>>> {
        match status {
            OrderStatus::Pending => None,
            OrderStatus::Placed => Some(&mut self.placed_at),
            OrderStatus::ReadyForShipment => Some(&mut self.ready_for_shipment_at),
            OrderStatus::Shipped => Some(&mut self.shipped_at),
            OrderStatus::Fulfilled => Some(&mut self.fulfilled_at),
            OrderStatus::Cancelled => Some(&mut self.cancelled_at),
            OrderStatus::Returned => Some(&mut self.returned_at),
        }
    }

    fn payment_slot(&mut self, status: PaymentStatus) -> Option<&mut Option<DateTime<Utc>>> {
        match status {
            PaymentStatus::Pending => None,
            PaymentStatus::Paid => Some(&mut self.paid_at),
            PaymentStatus::Failed => Some(&mut self.failed_at),
            PaymentStatus::Refunded => Some(&mut self.refunded_at),
        }
    }

    /// Returns the timestamp recorded for an order status, if any.
    pub fn for_status(&self, status: OrderStatus) -> Option<DateTime<Utc>> {
        match status {
            OrderStatus::Pending => None,
            OrderStatus::Placed => self.placed_at,
            OrderStatus::ReadyForShipment => self.ready_for_shipment_at,
            OrderStatus::Shipped => self.shipped_at,
            OrderStatus::Fulfilled => self.fulfilled_at,
            OrderStatus::Cancelled => self.cancelled_at,
            OrderStatus::Returned => self.returned_at,
        }
    }

    /// Returns the timestamp recorded for a payment status, if any.
    pub fn for_payment(&self, status: PaymentStatus) -> Option<DateTime<Utc>> {
        match status {
            PaymentStatus::Pending => None,
            PaymentStatus::Paid => self.paid_at,
            PaymentStatus::Failed => self.failed_at,
            PaymentStatus::Refunded => self.refunded_at,
        }
    }
}

fn stamp_once(slot: Option<&mut Option<DateTime<Utc>>>, at: DateTime<Utc>) {
    if let Some(slot) = slot {
        slot.get_or_insert(at);
    }
}

/// Applied order-status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

/// Applied payment-status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentChange {
    pub from: PaymentStatus,
    pub to: PaymentStatus,
}

/// Status, payment status and their timestamps for one order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    status: OrderStatus,
    payment_status: PaymentStatus,
    #[serde(flatten)]
    timestamps: StatusTimestamps,
}

impl Lifecycle {
    /// Lifecycle of a freshly created order: pending on both axes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a lifecycle from persisted fields.
    pub fn restore(
        status: OrderStatus,
        payment_status: PaymentStatus,
        timestamps: StatusTimestamps,
    ) -> Self {
        Self {
            status,
            payment_status,
            timestamps,
        }
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn timestamps(&self) -> &StatusTimestamps {
        &self.timestamps
    }

    /// Moves the order status, stamping the target timestamp if unset.
    pub fn transition_status(
        &mut self,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<StatusChange, TransitionError> {
        let from = self.status;
        check_status_transition(from, to)?;

        self.status = to;
        stamp_once(self.timestamps.status_slot(to), at);
        Ok(StatusChange { from, to })
    }

    /// Moves the payment status, stamping the target timestamp if unset.
    pub fn transition_payment(
        &mut self,
        to: PaymentStatus,
        at: DateTime<Utc>,
    ) -> Result<PaymentChange, TransitionError> {
        let from = self.payment_status;
        check_payment_transition(self.status, from, to)?;

        self.payment_status = to;
        stamp_once(self.timestamps.payment_slot(to), at);
        Ok(PaymentChange { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn lifecycle_at(status: OrderStatus) -> Lifecycle {
        Lifecycle::restore(status, PaymentStatus::Pending, StatusTimestamps::default())
    }

    #[test]
    fn test_every_pair_outside_table_is_rejected_without_mutation() {
        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                let mut lifecycle = lifecycle_at(from);
                let before = lifecycle.clone();
                let result = lifecycle.transition_status(to, Utc::now());

                if allowed_status_transitions(from).contains(&to) {
                    assert!(result.is_ok(), "{from} -> {to} should be allowed");
                    assert_eq!(lifecycle.status(), to);
                } else {
                    assert_eq!(result, Err(TransitionError::Status { from, to }));
                    assert_eq!(lifecycle, before);
                }
            }
        }
    }

    #[test]
    fn test_terminal_statuses_have_no_exits() {
        assert!(allowed_status_transitions(OrderStatus::Cancelled).is_empty());
        assert!(allowed_status_transitions(OrderStatus::Returned).is_empty());
        assert!(allowed_payment_transitions(PaymentStatus::Refunded).is_empty());
    }

    #[test]
    fn test_returned_only_reachable_from_fulfilled() {
        let sources: Vec<_> = OrderStatus::ALL
            .into_iter()
            .filter(|from| allowed_status_transitions(*from).contains(&OrderStatus::Returned))
            .collect();
        assert_eq!(sources, vec![OrderStatus::Fulfilled]);
    }

    #[test]
    fn test_pending_cannot_skip_to_shipped() {
        let mut lifecycle = Lifecycle::new();
        let err = lifecycle
            .transition_status(OrderStatus::Shipped, Utc::now())
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "cannot transition order status from pending to shipped"
        );
        assert_eq!(lifecycle.status(), OrderStatus::Pending);
        assert!(lifecycle.timestamps().shipped_at.is_none());
    }

    #[test]
    fn test_ready_for_shipment_path() {
        let mut lifecycle = lifecycle_at(OrderStatus::Placed);
        lifecycle
            .transition_status(OrderStatus::ReadyForShipment, Utc::now())
            .unwrap();
        lifecycle
            .transition_status(OrderStatus::Shipped, Utc::now())
            .unwrap();

        assert!(lifecycle.timestamps().ready_for_shipment_at.is_some());
        assert!(lifecycle.timestamps().shipped_at.is_some());
    }

    #[test]
    fn test_payment_blocked_for_inactive_order_statuses() {
        for order_status in [
            OrderStatus::Pending,
            OrderStatus::Cancelled,
            OrderStatus::Returned,
        ] {
            for requested in PaymentStatus::ALL {
                let mut lifecycle = lifecycle_at(order_status);
                let err = lifecycle
                    .transition_payment(requested, Utc::now())
                    .unwrap_err();
                assert_eq!(
                    err,
                    TransitionError::PaymentForOrderStatus {
                        order_status,
                        requested
                    }
                );
                assert_eq!(lifecycle.payment_status(), PaymentStatus::Pending);
            }
        }
    }

    #[test]
    fn test_payment_table_for_active_order() {
        let mut lifecycle = lifecycle_at(OrderStatus::Shipped);

        let err = lifecycle
            .transition_payment(PaymentStatus::Refunded, Utc::now())
            .unwrap_err();
        assert_eq!(err.label(), "payment");

        lifecycle
            .transition_payment(PaymentStatus::Failed, Utc::now())
            .unwrap();
        lifecycle
            .transition_payment(PaymentStatus::Pending, Utc::now())
            .unwrap();
        lifecycle
            .transition_payment(PaymentStatus::Paid, Utc::now())
            .unwrap();
        let change = lifecycle
            .transition_payment(PaymentStatus::Refunded, Utc::now())
            .unwrap();

        assert_eq!(
            change,
            PaymentChange {
                from: PaymentStatus::Paid,
                to: PaymentStatus::Refunded
            }
        );
        assert!(lifecycle.timestamps().failed_at.is_some());
        assert!(lifecycle.timestamps().paid_at.is_some());
        assert!(lifecycle.timestamps().refunded_at.is_some());
    }

    #[test]
    fn test_timestamps_are_set_once() {
        let placed_at = Utc::now() - Duration::hours(3);
        let mut lifecycle = Lifecycle::new();
        lifecycle
            .transition_status(OrderStatus::Placed, placed_at)
            .unwrap();

        let failed_at = Utc::now() - Duration::hours(2);
        lifecycle
            .transition_payment(PaymentStatus::Failed, failed_at)
            .unwrap();
        lifecycle
            .transition_payment(PaymentStatus::Pending, Utc::now())
            .unwrap();
        lifecycle
            .transition_payment(PaymentStatus::Failed, Utc::now())
            .unwrap();
        lifecycle
            .transition_status(OrderStatus::Shipped, Utc::now())
            .unwrap();

        assert_eq!(lifecycle.timestamps().placed_at, Some(placed_at));
        assert_eq!(lifecycle.timestamps().failed_at, Some(failed_at));
    }

    #[test]
    fn test_timestamp_present_iff_status_reached() {
        let mut lifecycle = Lifecycle::new();
        lifecycle
            .transition_status(OrderStatus::Placed, Utc::now())
            .unwrap();
        lifecycle
            .transition_status(OrderStatus::Cancelled, Utc::now())
            .unwrap();

        for status in OrderStatus::ALL {
            let reached = matches!(status, OrderStatus::Placed | OrderStatus::Cancelled);
            assert_eq!(
                lifecycle.timestamps().for_status(status).is_some(),
                reached,
                "{status}"
            );
        }
    }
}
