//! In-memory order repository used by tests and the database-less server.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use async_trait::async_trait;
use common::{BusinessId, OrderId, OrderNoteId, Version};
use tokio::sync::RwLock;

use crate::order::{Order, OrderItem, OrderNote};
use crate::repository::{
    OrderFilter, OrderQuery, OrderRepository, RepositoryError, Result, SortDirection, SortField,
};

#[derive(Default)]
struct Tables {
    /// Order rows, stored without items or notes.
    orders: HashMap<OrderId, Order>,
    items: HashMap<OrderId, Vec<OrderItem>>,
    notes: Vec<OrderNote>,
}

impl Tables {
    fn scoped(&self, business_id: BusinessId, order_id: OrderId) -> Option<&Order> {
        self.orders
            .get(&order_id)
            .filter(|o| o.business_id == business_id)
    }

    fn hydrate(&self, row: &Order) -> Order {
        let mut order = row.clone();
        order.items = self.items.get(&row.id).cloned().unwrap_or_default();
        order
    }

    fn visible(&self, business_id: BusinessId) -> impl Iterator<Item = &Order> {
        self.orders
            .values()
            .filter(move |o| o.business_id == business_id && !o.is_deleted())
    }
}

/// In-memory order repository for testing.
///
/// Provides the same interface and the same atomicity guarantees as the
/// PostgreSQL implementation: each call runs under a single write lock.
#[derive(Clone, Default)]
pub struct InMemoryOrderRepository {
    tables: Arc<RwLock<Tables>>,
    fail_before_item_insert: Arc<AtomicBool>,
}

impl InMemoryOrderRepository {
    /// Creates a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `insert_order` fail after the order row is staged but before
    /// its items are written.
    pub fn set_fail_before_item_insert(&self, fail: bool) {
        self.fail_before_item_insert
            .store(fail, AtomicOrdering::SeqCst);
    }

    /// Number of order rows across all businesses, including soft-deleted.
    pub async fn order_row_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    /// Number of item rows across all orders.
    pub async fn item_row_count(&self) -> usize {
        self.tables.read().await.items.values().map(Vec::len).sum()
    }
}

fn compare(a: &Order, b: &Order, field: SortField) -> Ordering {
    let primary = match field {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::Total => a.total.cmp(&b.total),
        SortField::OrderNumber => a.order_number.cmp(&b.order_number),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert_order(&self, business_id: BusinessId, order: &Order) -> Result<()> {
        let mut tables = self.tables.write().await;

        let taken = tables
            .orders
            .values()
            .any(|o| o.business_id == business_id && o.order_number == order.order_number);
        if taken {
            return Err(RepositoryError::DuplicateOrderNumber {
                order_number: order.order_number.clone(),
            });
        }

        let mut row = order.clone();
        row.business_id = business_id;
        row.items = Vec::new();
        row.notes = Vec::new();
        tables.orders.insert(order.id, row);

        if self.fail_before_item_insert.load(AtomicOrdering::SeqCst) {
            // Roll back the staged row before the lock is released.
            tables.orders.remove(&order.id);
            return Err(RepositoryError::Unavailable(
                "simulated failure before item insert".to_string(),
            ));
        }

        tables.items.insert(order.id, order.items.clone());
        Ok(())
    }

    async fn find_order(
        &self,
        business_id: BusinessId,
        order_id: OrderId,
    ) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .scoped(business_id, order_id)
            .filter(|o| !o.is_deleted())
            .map(|o| tables.hydrate(o)))
    }

    async fn find_order_by_number(
        &self,
        business_id: BusinessId,
        order_number: &str,
    ) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .visible(business_id)
            .find(|o| o.order_number == order_number)
            .map(|o| tables.hydrate(o)))
    }

    async fn list_orders(
        &self,
        business_id: BusinessId,
        query: &OrderQuery,
    ) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<&Order> = tables
            .visible(business_id)
            .filter(|o| query.filter.matches(o))
            .collect();

        rows.sort_by(|a, b| {
            let ord = compare(a, b, query.sort_by);
            match query.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        });

        let (skip, take) = match query.page {
            Some(page) => (page.offset() as usize, page.limit() as usize),
            None => (0, usize::MAX),
        };

        Ok(rows
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|o| tables.hydrate(o))
            .collect())
    }

    async fn count_orders(&self, business_id: BusinessId, filter: &OrderFilter) -> Result<u64> {
        let tables = self.tables.read().await;
        Ok(tables
            .visible(business_id)
            .filter(|o| filter.matches(o))
            .count() as u64)
    }

    async fn update_order(
        &self,
        business_id: BusinessId,
        order: &Order,
        expected: Version,
    ) -> Result<Version> {
        let mut tables = self.tables.write().await;
        let Some(row) = tables
            .orders
            .get_mut(&order.id)
            .filter(|o| o.business_id == business_id)
        else {
            return Err(RepositoryError::NotFound { order_id: order.id });
        };

        if row.version != expected {
            return Err(RepositoryError::VersionConflict {
                order_id: order.id,
                expected,
            });
        }

        let next = expected.next();
        let mut updated = order.clone();
        updated.business_id = business_id;
        updated.items = Vec::new();
        updated.notes = Vec::new();
        updated.version = next;
        // Snapshot columns are immutable after creation.
        updated.order_number = row.order_number.clone();
        updated.created_at = row.created_at;
        *row = updated;

        Ok(next)
    }

    async fn purge_order(&self, business_id: BusinessId, order_id: OrderId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables.scoped(business_id, order_id).is_none() {
            return Ok(false);
        }
        tables.orders.remove(&order_id);
        tables.items.remove(&order_id);
        tables.notes.retain(|n| n.order_id != order_id);
        Ok(true)
    }

    async fn insert_note(&self, business_id: BusinessId, note: &OrderNote) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.scoped(business_id, note.order_id).is_none() {
            return Err(RepositoryError::NotFound {
                order_id: note.order_id,
            });
        }
        tables.notes.push(note.clone());
        Ok(())
    }

    async fn list_notes(
        &self,
        business_id: BusinessId,
        order_id: OrderId,
    ) -> Result<Vec<OrderNote>> {
        let tables = self.tables.read().await;
        if tables.scoped(business_id, order_id).is_none() {
            return Ok(Vec::new());
        }
        let mut notes: Vec<_> = tables
            .notes
            .iter()
            .filter(|n| n.order_id == order_id)
            .cloned()
            .collect();
        notes.sort_by_key(|n| n.created_at);
        Ok(notes)
    }

    async fn delete_note(
        &self,
        business_id: BusinessId,
        order_id: OrderId,
        note_id: OrderNoteId,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables.scoped(business_id, order_id).is_none() {
            return Ok(false);
        }
        let before = tables.notes.len();
        tables
            .notes
            .retain(|n| !(n.id == note_id && n.order_id == order_id));
        Ok(tables.notes.len() != before)
    }
}
