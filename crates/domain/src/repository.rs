//! Tenant-scoped persistence contract for orders.
//!
//! Every method takes the owning [`BusinessId`] first. An order, item or note
//! that exists under a different business is reported exactly as if it did
//! not exist.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BusinessId, CustomerId, OrderId, OrderNoteId, Version};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::{Order, OrderNote, OrderStatus, PaymentMethod, PaymentStatus};

/// Errors that can occur in an order repository.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The per-business order number is already taken.
    #[error("duplicate order number: {order_number}")]
    DuplicateOrderNumber { order_number: String },

    /// The stored version did not match the expected one.
    #[error("version conflict for order {order_id}: expected {expected}")]
    VersionConflict { order_id: OrderId, expected: Version },

    #[error("order not found: {order_id}")]
    NotFound { order_id: OrderId },

    /// The backend could not be reached or refused the operation.
    #[error("repository unavailable: {0}")]
    Unavailable(String),

    #[error("repository backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl RepositoryError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Filters shared by listing, counting and analytics.
///
/// Empty vectors mean "no constraint". Soft-deleted orders never match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFilter {
    #[serde(default)]
    pub statuses: Vec<OrderStatus>,
    #[serde(default)]
    pub exclude_statuses: Vec<OrderStatus>,
    #[serde(default)]
    pub payment_statuses: Vec<PaymentStatus>,
    #[serde(default)]
    pub payment_methods: Vec<PaymentMethod>,
    #[serde(default)]
    pub customer_ids: Vec<CustomerId>,
    #[serde(default)]
    pub channels: Vec<String>,
    /// Inclusive lower bound on `created_at`.
    pub created_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub created_to: Option<DateTime<Utc>>,
}

impl OrderFilter {
    /// Orders counted as revenue: paid and not cancelled or returned.
    pub fn paid_and_active() -> Self {
        Self {
            payment_statuses: vec![PaymentStatus::Paid],
            exclude_statuses: vec![OrderStatus::Cancelled, OrderStatus::Returned],
            ..Self::default()
        }
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = OrderStatus>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    pub fn created_between(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.created_from = from;
        self.created_to = to;
        self
    }

    /// Evaluates the filter against an in-memory order.
    pub fn matches(&self, order: &Order) -> bool {
        fn allows<T: PartialEq>(set: &[T], value: &T) -> bool {
            set.is_empty() || set.contains(value)
        }

        !order.is_deleted()
            && allows(&self.statuses, &order.status())
            && !self.exclude_statuses.contains(&order.status())
            && allows(&self.payment_statuses, &order.payment_status())
            && allows(&self.payment_methods, &order.payment_method)
            && (self.customer_ids.is_empty()
                || order
                    .customer_id
                    .is_some_and(|c| self.customer_ids.contains(&c)))
            && allows(&self.channels, &order.channel)
            && self.created_from.is_none_or(|from| order.created_at >= from)
            && self.created_to.is_none_or(|to| order.created_at < to)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    Total,
    OrderNumber,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// One-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page: u32,
    pub page_size: u32,
}

impl Page {
    pub const MAX_PAGE_SIZE: u32 = 100;

    /// Clamps the page to at least 1 and the size to `1..=MAX_PAGE_SIZE`.
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, Self::MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.page_size)
    }
}

/// Listing request: filter, ordering and optional pagination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderQuery {
    pub filter: OrderFilter,
    pub sort_by: SortField,
    pub direction: SortDirection,
    pub page: Option<Page>,
}

impl OrderQuery {
    pub fn new(filter: OrderFilter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn sorted(mut self, field: SortField, direction: SortDirection) -> Self {
        self.sort_by = field;
        self.direction = direction;
        self
    }

    pub fn paged(mut self, page: Page) -> Self {
        self.page = Some(page);
        self
    }
}

/// Storage for orders, their items and notes.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Inserts the order and all of its items atomically.
    ///
    /// Fails with [`RepositoryError::DuplicateOrderNumber`] if the number is
    /// taken within the business. On any failure nothing is persisted.
    async fn insert_order(&self, business_id: BusinessId, order: &Order) -> Result<()>;

    /// Loads an order with its items. Soft-deleted orders are not returned.
    async fn find_order(&self, business_id: BusinessId, order_id: OrderId)
    -> Result<Option<Order>>;

    async fn find_order_by_number(
        &self,
        business_id: BusinessId,
        order_number: &str,
    ) -> Result<Option<Order>>;

    async fn list_orders(&self, business_id: BusinessId, query: &OrderQuery)
    -> Result<Vec<Order>>;

    async fn count_orders(&self, business_id: BusinessId, filter: &OrderFilter) -> Result<u64>;

    /// Writes the mutable fields of `order` if the stored version is `expected`.
    ///
    /// Returns the new version. Items are never rewritten.
    async fn update_order(
        &self,
        business_id: BusinessId,
        order: &Order,
        expected: Version,
    ) -> Result<Version>;

    /// Physically removes the order, its items and notes. Returns false if absent.
    async fn purge_order(&self, business_id: BusinessId, order_id: OrderId) -> Result<bool>;

    async fn insert_note(&self, business_id: BusinessId, note: &OrderNote) -> Result<()>;

    /// Notes of an order, oldest first.
    async fn list_notes(&self, business_id: BusinessId, order_id: OrderId)
    -> Result<Vec<OrderNote>>;

    /// Removes a note only if it belongs to `order_id`. Returns false otherwise.
    async fn delete_note(
        &self,
        business_id: BusinessId,
        order_id: OrderId,
        note_id: OrderNoteId,
    ) -> Result<bool>;
}
