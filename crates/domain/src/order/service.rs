//! Order service: creation, transitions, notes and deletion.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use common::{BusinessId, OrderId, OrderNoteId, ProductId, VariantId, Version};

use crate::directory::{BusinessContext, Directories};
use crate::error::OrderError;
use crate::repository::{OrderFilter, OrderQuery, OrderRepository, RepositoryError};

use super::codes::{generate_order_number, retry_on_conflict};
use super::events::{
    NoopPublisher, OrderCreatedData, OrderEvent, OrderEventPublisher, PaymentStatusChangedData,
    PaymentSucceededData, StatusChangedData,
};
use super::{
    MAX_ITEM_QUANTITY, Money, NewOrder, Order, OrderNote, OrderStatus, OrderTotals,
    PaymentDetails, PaymentStatus, TransitionError,
};

/// Tunables of the order service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderServiceConfig {
    /// How many order numbers to try before surfacing a collision.
    ///
    /// The default of 1 surfaces every collision to the caller.
    pub order_number_attempts: u32,
}

impl Default for OrderServiceConfig {
    fn default() -> Self {
        Self {
            order_number_attempts: 1,
        }
    }
}

/// Service for managing orders.
///
/// Every operation is scoped to a business. Mutations go through the state
/// machine on a freshly loaded order and are written back with an expected
/// version, so two racing transitions on one order cannot both succeed.
pub struct OrderService<R: OrderRepository> {
    repository: R,
    directories: Directories,
    publisher: Arc<dyn OrderEventPublisher>,
    config: OrderServiceConfig,
}

impl<R: OrderRepository> OrderService<R> {
    /// Creates a new order service that drops its events.
    pub fn new(repository: R, directories: Directories) -> Self {
        Self {
            repository,
            directories,
            publisher: Arc::new(NoopPublisher),
            config: OrderServiceConfig::default(),
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn OrderEventPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn with_config(mut self, config: OrderServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns a reference to the underlying repository.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn directories(&self) -> &Directories {
        &self.directories
    }

    /// Creates an order and its items in one transaction.
    ///
    /// Everything detectable from the request and the lookups is checked
    /// before anything is written.
    #[tracing::instrument(skip(self, request), fields(items = request.items.len()))]
    pub async fn create_order(
        &self,
        business_id: BusinessId,
        request: NewOrder,
    ) -> Result<Order, OrderError> {
        let started = Instant::now();

        let Priced {
            business,
            totals,
            product_ids,
        } = self.price(business_id, &request).await?;

        let repository = &self.repository;
        let order = retry_on_conflict(
            self.config.order_number_attempts,
            |attempt| {
                let order = build_order(&business, &request, &totals, &product_ids);
                tracing::debug!(attempt, order_number = %order.order_number, "inserting order");
                async move {
                    repository
                        .insert_order(business_id, &order)
                        .await
                        .map(|()| order)
                }
            },
            |err| matches!(err, RepositoryError::DuplicateOrderNumber { .. }),
        )
        .await
        .map_err(map_repository_error)?;

        metrics::counter!("orders_created_total").increment(1);
        metrics::histogram!("order_create_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total,
            "order created"
        );

        self.publisher
            .publish(OrderEvent::OrderCreated(OrderCreatedData {
                business_id,
                order_id: order.id,
                order_number: order.order_number.clone(),
                total: order.total,
                currency: order.currency.clone(),
                created_at: order.created_at,
            }));

        Ok(order)
    }

    /// Validates a creation request and returns the totals it would get.
    ///
    /// Runs the same checks as [`create_order`](Self::create_order) and
    /// writes nothing.
    #[tracing::instrument(skip(self, request), fields(items = request.items.len()))]
    pub async fn preview_order(
        &self,
        business_id: BusinessId,
        request: &NewOrder,
    ) -> Result<OrderTotals, OrderError> {
        let priced = self.price(business_id, request).await?;
        metrics::counter!("order_previews_total").increment(1);
        Ok(priced.totals)
    }

    /// Loads an order with its items and notes.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(
        &self,
        business_id: BusinessId,
        order_id: OrderId,
    ) -> Result<Order, OrderError> {
        let mut order = self.load(business_id, order_id).await?;
        order.notes = self
            .repository
            .list_notes(business_id, order_id)
            .await
            .map_err(map_repository_error)?;
        Ok(order)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_order_by_number(
        &self,
        business_id: BusinessId,
        order_number: &str,
    ) -> Result<Order, OrderError> {
        let mut order = self
            .repository
            .find_order_by_number(business_id, order_number)
            .await
            .map_err(map_repository_error)?
            .ok_or_else(|| OrderError::OrderNumberNotFound {
                order_number: order_number.to_string(),
            })?;
        order.notes = self
            .repository
            .list_notes(business_id, order.id)
            .await
            .map_err(map_repository_error)?;
        Ok(order)
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_orders(
        &self,
        business_id: BusinessId,
        query: &OrderQuery,
    ) -> Result<Vec<Order>, OrderError> {
        self.repository
            .list_orders(business_id, query)
            .await
            .map_err(map_repository_error)
    }

    #[tracing::instrument(skip(self))]
    pub async fn count_orders(
        &self,
        business_id: BusinessId,
        filter: &OrderFilter,
    ) -> Result<u64, OrderError> {
        self.repository
            .count_orders(business_id, filter)
            .await
            .map_err(map_repository_error)
    }

    /// Moves the order to `status` if the transition table allows it.
    #[tracing::instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        business_id: BusinessId,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, OrderError> {
        let mut order = self.load(business_id, order_id).await?;
        let expected = order.version;
        let now = Utc::now();

        let change = order
            .transition_status(status, now)
            .map_err(|e| reject(order_id, e))?;
        order.version = self.persist(&order, expected).await?;

        metrics::counter!(
            "order_status_transitions_total",
            "from" => change.from.as_str(),
            "to" => change.to.as_str()
        )
        .increment(1);
        tracing::info!(from = %change.from, to = %change.to, "order status changed");

        self.publisher
            .publish(OrderEvent::StatusChanged(StatusChangedData {
                business_id,
                order_id,
                from: change.from,
                to: change.to,
                changed_at: now,
            }));

        Ok(order)
    }

    /// Moves the payment status through the payment machine.
    #[tracing::instrument(skip(self))]
    pub async fn update_payment_status(
        &self,
        business_id: BusinessId,
        order_id: OrderId,
        status: PaymentStatus,
    ) -> Result<Order, OrderError> {
        self.apply_payment(business_id, order_id, status, None)
            .await
    }

    /// Marks the order paid and records the payment method and reference.
    #[tracing::instrument(skip(self))]
    pub async fn pay_order(
        &self,
        business_id: BusinessId,
        order_id: OrderId,
        details: PaymentDetails,
    ) -> Result<Order, OrderError> {
        self.apply_payment(business_id, order_id, PaymentStatus::Paid, Some(details))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn refund_order(
        &self,
        business_id: BusinessId,
        order_id: OrderId,
    ) -> Result<Order, OrderError> {
        self.apply_payment(business_id, order_id, PaymentStatus::Refunded, None)
            .await
    }

    /// Appends a note to an order.
    #[tracing::instrument(skip(self, content))]
    pub async fn add_note(
        &self,
        business_id: BusinessId,
        order_id: OrderId,
        content: &str,
    ) -> Result<OrderNote, OrderError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(OrderError::EmptyNote);
        }
        self.load(business_id, order_id).await?;

        let note = OrderNote::new(order_id, content, Utc::now());
        self.repository
            .insert_note(business_id, &note)
            .await
            .map_err(map_repository_error)?;

        metrics::counter!("order_notes_created_total").increment(1);
        tracing::debug!(note_id = %note.id, "order note added");
        Ok(note)
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_notes(
        &self,
        business_id: BusinessId,
        order_id: OrderId,
    ) -> Result<Vec<OrderNote>, OrderError> {
        self.load(business_id, order_id).await?;
        self.repository
            .list_notes(business_id, order_id)
            .await
            .map_err(map_repository_error)
    }

    /// Removes a note. A note that belongs to another order is not found.
    #[tracing::instrument(skip(self))]
    pub async fn delete_note(
        &self,
        business_id: BusinessId,
        order_id: OrderId,
        note_id: OrderNoteId,
    ) -> Result<(), OrderError> {
        self.load(business_id, order_id).await?;
        let deleted = self
            .repository
            .delete_note(business_id, order_id, note_id)
            .await
            .map_err(map_repository_error)?;
        if !deleted {
            return Err(OrderError::NoteNotFound { order_id, note_id });
        }
        tracing::info!(%note_id, "order note deleted");
        Ok(())
    }

    /// Soft-deletes an order that is still pending or already cancelled.
    #[tracing::instrument(skip(self))]
    pub async fn delete_order(
        &self,
        business_id: BusinessId,
        order_id: OrderId,
    ) -> Result<(), OrderError> {
        let mut order = self.load(business_id, order_id).await?;
        let status = order.status();
        if !status.is_deletable() {
            metrics::counter!("order_transition_rejections_total", "kind" => "delete")
                .increment(1);
            tracing::debug!(%status, "order delete rejected");
            return Err(OrderError::CannotDelete { order_id, status });
        }

        let expected = order.version;
        order.mark_deleted(Utc::now());
        self.persist(&order, expected).await?;

        metrics::counter!("orders_deleted_total").increment(1);
        tracing::info!(%status, "order deleted");
        Ok(())
    }

    /// Physically removes an order with its items and notes, regardless of status.
    #[tracing::instrument(skip(self))]
    pub async fn purge_order(
        &self,
        business_id: BusinessId,
        order_id: OrderId,
    ) -> Result<(), OrderError> {
        let purged = self
            .repository
            .purge_order(business_id, order_id)
            .await
            .map_err(map_repository_error)?;
        if !purged {
            return Err(OrderError::NotFound { order_id });
        }
        tracing::warn!("order purged");
        Ok(())
    }

    async fn apply_payment(
        &self,
        business_id: BusinessId,
        order_id: OrderId,
        status: PaymentStatus,
        details: Option<PaymentDetails>,
    ) -> Result<Order, OrderError> {
        let mut order = self.load(business_id, order_id).await?;
        let expected = order.version;
        let now = Utc::now();

        let change = order
            .transition_payment(status, now)
            .map_err(|e| reject(order_id, e))?;
        if let Some(details) = details {
            order.set_payment_details(details.payment_method, details.payment_reference);
        }
        order.version = self.persist(&order, expected).await?;

        metrics::counter!(
            "order_payment_transitions_total",
            "from" => change.from.as_str(),
            "to" => change.to.as_str()
        )
        .increment(1);
        tracing::info!(from = %change.from, to = %change.to, "payment status changed");

        self.publisher
            .publish(OrderEvent::PaymentStatusChanged(PaymentStatusChangedData {
                business_id,
                order_id,
                from: change.from,
                to: change.to,
                changed_at: now,
            }));
        if change.to == PaymentStatus::Paid && change.from != PaymentStatus::Paid {
            self.publisher
                .publish(OrderEvent::PaymentSucceeded(PaymentSucceededData {
                    business_id,
                    order_id,
                    payment_method: order.payment_method,
                    order_total: order.total,
                    currency: order.currency.clone(),
                    paid_at: order.lifecycle().timestamps().paid_at.unwrap_or(now),
                }));
        }

        Ok(order)
    }

    async fn load(&self, business_id: BusinessId, order_id: OrderId) -> Result<Order, OrderError> {
        self.repository
            .find_order(business_id, order_id)
            .await
            .map_err(map_repository_error)?
            .ok_or(OrderError::NotFound { order_id })
    }

    async fn persist(&self, order: &Order, expected: Version) -> Result<Version, OrderError> {
        self.repository
            .update_order(order.business_id, order, expected)
            .await
            .map_err(map_repository_error)
    }

    /// Resolves the business and collaborators of a request and prices it.
    async fn price(
        &self,
        business_id: BusinessId,
        request: &NewOrder,
    ) -> Result<Priced, OrderError> {
        let business = self
            .directories
            .businesses
            .find_business(business_id)
            .await?
            .ok_or(OrderError::BusinessNotFound { business_id })?;

        validate_request(request)?;
        self.verify_customer_and_address(business_id, request)
            .await?;
        let product_ids = self.resolve_variants(business_id, request).await?;

        let totals = OrderTotals::compute(
            &request.items,
            business.vat_rate,
            request.shipping_fee,
            request.discount,
        )?;

        Ok(Priced {
            business,
            totals,
            product_ids,
        })
    }

    async fn verify_customer_and_address(
        &self,
        business_id: BusinessId,
        request: &NewOrder,
    ) -> Result<(), OrderError> {
        let customers = &self.directories.customers;

        if let Some(customer_id) = request.customer_id {
            customers
                .find_customer(business_id, customer_id)
                .await?
                .ok_or(OrderError::CustomerNotFound { customer_id })?;
        }

        if let Some(address_id) = request.shipping_address_id {
            let address = customers
                .find_address(business_id, address_id)
                .await?
                .ok_or(OrderError::AddressNotFound { address_id })?;
            // An address is only usable by the customer who owns it.
            if request.customer_id != Some(address.customer_id) {
                return Err(OrderError::AddressNotFound { address_id });
            }
        }

        Ok(())
    }

    async fn resolve_variants(
        &self,
        business_id: BusinessId,
        request: &NewOrder,
    ) -> Result<Vec<(VariantId, ProductId)>, OrderError> {
        let mut resolved = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let variant = self
                .directories
                .variants
                .find_variant(business_id, item.variant_id)
                .await?
                .ok_or(OrderError::VariantNotFound {
                    variant_id: item.variant_id,
                })?;
            resolved.push((variant.id, variant.product_id));
        }
        Ok(resolved)
    }
}

/// A validated creation request with its lookups resolved.
struct Priced {
    business: BusinessContext,
    totals: OrderTotals,
    product_ids: Vec<(VariantId, ProductId)>,
}

fn validate_request(request: &NewOrder) -> Result<(), OrderError> {
    if request.items.is_empty() {
        return Err(OrderError::EmptyItems);
    }

    for (index, item) in request.items.iter().enumerate() {
        if !(1..=MAX_ITEM_QUANTITY).contains(&item.quantity) {
            return Err(OrderError::InvalidItemQuantity {
                index,
                quantity: item.quantity,
            });
        }
        if !item.unit_price.is_positive() {
            return Err(OrderError::InvalidItemPrice {
                index,
                price: item.unit_price,
            });
        }
        if item.unit_cost.is_negative() {
            return Err(OrderError::InvalidItemCost {
                index,
                cost: item.unit_cost,
            });
        }
    }

    check_non_negative("shipping_fee", request.shipping_fee)?;
    check_non_negative("discount", request.discount)
}

fn check_non_negative(field: &'static str, amount: Money) -> Result<(), OrderError> {
    if amount.is_negative() {
        Err(OrderError::InvalidAmount { field, amount })
    } else {
        Ok(())
    }
}

fn build_order(
    business: &BusinessContext,
    request: &NewOrder,
    totals: &OrderTotals,
    product_ids: &[(VariantId, ProductId)],
) -> Order {
    let prefix = if business.code.trim().is_empty() {
        &business.name
    } else {
        &business.code
    };
    let mut order = Order::create(
        business,
        request,
        totals,
        generate_order_number(prefix),
        Utc::now(),
    );
    for item in &mut order.items {
        item.product_id = product_ids
            .iter()
            .find(|(variant_id, _)| *variant_id == item.variant_id)
            .map(|(_, product_id)| *product_id);
    }
    order
}

fn reject(order_id: OrderId, err: TransitionError) -> OrderError {
    metrics::counter!("order_transition_rejections_total", "kind" => err.label()).increment(1);
    tracing::debug!(error = %err, "transition rejected");
    OrderError::from_transition(order_id, err)
}

fn map_repository_error(err: RepositoryError) -> OrderError {
    match err {
        RepositoryError::DuplicateOrderNumber { order_number } => {
            OrderError::DuplicateOrderNumber { order_number }
        }
        RepositoryError::VersionConflict { order_id, .. } => {
            tracing::info!(%order_id, "lost optimistic concurrency race");
            OrderError::ConcurrentModification { order_id }
        }
        RepositoryError::NotFound { order_id } => OrderError::NotFound { order_id },
        other => {
            tracing::error!(error = %other, "order repository failure");
            OrderError::Repository(other)
        }
    }
}
