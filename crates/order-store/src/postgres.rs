use std::collections::HashMap;
use std::str::FromStr;
use std::time::Instant;

use async_trait::async_trait;
use common::{
    AddressId, BusinessId, CustomerId, OrderId, OrderItemId, OrderNoteId, ProductId, VariantId,
    Version,
};
use domain::order::{OrderHeader, UnknownVariant};
use domain::{
    Lifecycle, Money, Order, OrderFilter, OrderItem, OrderNote, OrderQuery, OrderRepository,
    RepositoryError, SortDirection, SortField, StatusTimestamps,
};
use metrics::histogram;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{Result, StoreError};

const ORDER_COLUMNS: &str = "id, business_id, order_number, customer_id, shipping_address_id, \
     channel, subtotal, vat, vat_rate, shipping_fee, discount, cogs, total, currency, status, \
     payment_status, payment_method, payment_reference, placed_at, ready_for_shipment_at, \
     shipped_at, fulfilled_at, cancelled_at, returned_at, paid_at, failed_at, refunded_at, \
     version, created_at, updated_at, deleted_at";

const ITEM_COLUMNS: &str = "id, order_id, product_id, variant_id, quantity, currency, \
     unit_price, unit_cost, total_cost, total";

const UNIQUE_ORDER_NUMBER: &str = "unique_business_order_number";

enum OrderKey {
    Id(OrderId),
    Number(String),
}

/// PostgreSQL-backed order repository.
///
/// Orders, items and notes live in three tables. Items and notes cascade
/// when their order row is removed.
#[derive(Clone)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    /// Creates a new PostgreSQL order repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    async fn insert(&self, business_id: BusinessId, order: &Order) -> Result<()> {
        let started = Instant::now();
        let lifecycle = order.lifecycle();
        let stamps = lifecycle.timestamps();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, business_id, order_number, customer_id, shipping_address_id, channel,
                subtotal, vat, vat_rate, shipping_fee, discount, cogs, total, currency,
                status, payment_status, payment_method, payment_reference,
                placed_at, ready_for_shipment_at, shipped_at, fulfilled_at, cancelled_at,
                returned_at, paid_at, failed_at, refunded_at,
                version, created_at, updated_at, deleted_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6,
                $7, $8, $9, $10, $11, $12, $13, $14,
                $15, $16, $17, $18,
                $19, $20, $21, $22, $23,
                $24, $25, $26, $27,
                $28, $29, $30, $31
            )
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(business_id.as_uuid())
        .bind(&order.order_number)
        .bind(order.customer_id.map(|id| id.as_uuid()))
        .bind(order.shipping_address_id.map(|id| id.as_uuid()))
        .bind(&order.channel)
        .bind(order.subtotal.amount())
        .bind(order.vat.amount())
        .bind(order.vat_rate)
        .bind(order.shipping_fee.amount())
        .bind(order.discount.amount())
        .bind(order.cogs.amount())
        .bind(order.total.amount())
        .bind(&order.currency)
        .bind(lifecycle.status().as_str())
        .bind(lifecycle.payment_status().as_str())
        .bind(order.payment_method.as_str())
        .bind(&order.payment_reference)
        .bind(stamps.placed_at)
        .bind(stamps.ready_for_shipment_at)
        .bind(stamps.shipped_at)
        .bind(stamps.fulfilled_at)
        .bind(stamps.cancelled_at)
        .bind(stamps.returned_at)
        .bind(stamps.paid_at)
        .bind(stamps.failed_at)
        .bind(stamps.refunded_at)
        .bind(order.version.as_i64())
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.deleted_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some(UNIQUE_ORDER_NUMBER)
            {
                return StoreError::DuplicateOrderNumber {
                    order_number: order.order_number.clone(),
                };
            }
            StoreError::Database(e)
        })?;

        for (position, item) in order.items.iter().enumerate() {
            let quantity = i32::try_from(item.quantity).map_err(|_| StoreError::OutOfRange {
                column: "order_items.quantity",
                value: item.quantity.to_string(),
            })?;

            sqlx::query(
                r#"
                INSERT INTO order_items (
                    id, order_id, position, product_id, variant_id, quantity, currency,
                    unit_price, unit_cost, total_cost, total, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(order.id.as_uuid())
            .bind(position as i32)
            .bind(item.product_id.map(|id| id.as_uuid()))
            .bind(item.variant_id.as_uuid())
            .bind(quantity)
            .bind(&item.currency)
            .bind(item.unit_price.amount())
            .bind(item.unit_cost.amount())
            .bind(item.total_cost.amount())
            .bind(item.total.amount())
            .bind(order.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        histogram!("order_store.insert.duration_seconds").record(started.elapsed().as_secs_f64());
        Ok(())
    }

    async fn find_one(&self, business_id: BusinessId, key: OrderKey) -> Result<Option<Order>> {
        let mut qb = QueryBuilder::new(format!("SELECT {ORDER_COLUMNS} FROM orders WHERE "));
        match key {
            OrderKey::Id(order_id) => qb.push("id = ").push_bind(order_id.as_uuid()),
            OrderKey::Number(number) => qb.push("order_number = ").push_bind(number),
        };
        qb.push(" AND business_id = ")
            .push_bind(business_id.as_uuid())
            .push(" AND deleted_at IS NULL");

        let Some(row) = qb.build().fetch_optional(&self.pool).await? else {
            return Ok(None);
        };
        let header = row_to_header(&row)?;
        let lifecycle = row_to_lifecycle(&row)?;
        let items = self.load_items(&[header.id]).await?.remove(&header.id);

        Ok(Some(Order::restore(
            header,
            lifecycle,
            items.unwrap_or_default(),
        )))
    }

    async fn load_items(&self, order_ids: &[OrderId]) -> Result<HashMap<OrderId, Vec<OrderItem>>> {
        if order_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let ids: Vec<Uuid> = order_ids.iter().map(OrderId::as_uuid).collect();
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) \
             ORDER BY order_id, position"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            let item = row_to_item(&row)?;
            grouped.entry(item.order_id).or_default().push(item);
        }
        Ok(grouped)
    }

    async fn list(&self, business_id: BusinessId, query: &OrderQuery) -> Result<Vec<Order>> {
        let mut qb = QueryBuilder::new(format!("SELECT {ORDER_COLUMNS} FROM orders"));
        push_filter(&mut qb, business_id, &query.filter);

        let column = match query.sort_by {
            SortField::CreatedAt => "created_at",
            SortField::Total => "total",
            SortField::OrderNumber => "order_number",
        };
        let direction = match query.direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        qb.push(format!(" ORDER BY {column} {direction}, id {direction}"));

        if let Some(page) = query.page {
            qb.push(" LIMIT ")
                .push_bind(page.limit() as i64)
                .push(" OFFSET ")
                .push_bind(page.offset() as i64);
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut headers = Vec::with_capacity(rows.len());
        for row in &rows {
            headers.push((row_to_header(row)?, row_to_lifecycle(row)?));
        }

        let ids: Vec<OrderId> = headers.iter().map(|(h, _)| h.id).collect();
        let mut items = self.load_items(&ids).await?;

        Ok(headers
            .into_iter()
            .map(|(header, lifecycle)| {
                let order_items = items.remove(&header.id).unwrap_or_default();
                Order::restore(header, lifecycle, order_items)
            })
            .collect())
    }

    async fn count(&self, business_id: BusinessId, filter: &OrderFilter) -> Result<u64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM orders");
        push_filter(&mut qb, business_id, filter);

        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    async fn update(
        &self,
        business_id: BusinessId,
        order: &Order,
        expected: Version,
    ) -> Result<Version> {
        let lifecycle = order.lifecycle();
        let stamps = lifecycle.timestamps();

        let version: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE orders SET
                status = $4,
                payment_status = $5,
                payment_method = $6,
                payment_reference = $7,
                placed_at = $8,
                ready_for_shipment_at = $9,
                shipped_at = $10,
                fulfilled_at = $11,
                cancelled_at = $12,
                returned_at = $13,
                paid_at = $14,
                failed_at = $15,
                refunded_at = $16,
                updated_at = $17,
                deleted_at = $18,
                version = version + 1
            WHERE id = $1 AND business_id = $2 AND version = $3
            RETURNING version
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(business_id.as_uuid())
        .bind(expected.as_i64())
        .bind(lifecycle.status().as_str())
        .bind(lifecycle.payment_status().as_str())
        .bind(order.payment_method.as_str())
        .bind(&order.payment_reference)
        .bind(stamps.placed_at)
        .bind(stamps.ready_for_shipment_at)
        .bind(stamps.shipped_at)
        .bind(stamps.fulfilled_at)
        .bind(stamps.cancelled_at)
        .bind(stamps.returned_at)
        .bind(stamps.paid_at)
        .bind(stamps.failed_at)
        .bind(stamps.refunded_at)
        .bind(order.updated_at)
        .bind(order.deleted_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(version) = version {
            return Ok(Version::new(version));
        }

        // Nothing matched: tell a stale version apart from a missing row.
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM orders WHERE id = $1 AND business_id = $2)",
        )
        .bind(order.id.as_uuid())
        .bind(business_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        if exists {
            Err(StoreError::VersionConflict {
                order_id: order.id,
                expected,
            })
        } else {
            Err(StoreError::OrderNotFound { order_id: order.id })
        }
    }

    async fn purge(&self, business_id: BusinessId, order_id: OrderId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1 AND business_id = $2")
            .bind(order_id.as_uuid())
            .bind(business_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_note(&self, business_id: BusinessId, note: &OrderNote) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO order_notes (id, order_id, content, created_at)
            SELECT $1, $2, $3, $4
            WHERE EXISTS (SELECT 1 FROM orders WHERE id = $2 AND business_id = $5)
            "#,
        )
        .bind(note.id.as_uuid())
        .bind(note.order_id.as_uuid())
        .bind(&note.content)
        .bind(note.created_at)
        .bind(business_id.as_uuid())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound {
                order_id: note.order_id,
            });
        }
        Ok(())
    }

    async fn notes(&self, business_id: BusinessId, order_id: OrderId) -> Result<Vec<OrderNote>> {
        let rows = sqlx::query(
            r#"
            SELECT n.id, n.order_id, n.content, n.created_at
            FROM order_notes n
            JOIN orders o ON o.id = n.order_id
            WHERE n.order_id = $1 AND o.business_id = $2
            ORDER BY n.created_at ASC, n.id ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(business_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_note).collect()
    }

    async fn remove_note(
        &self,
        business_id: BusinessId,
        order_id: OrderId,
        note_id: OrderNoteId,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM order_notes n
            USING orders o
            WHERE n.id = $1 AND n.order_id = $2
              AND o.id = n.order_id AND o.business_id = $3
            "#,
        )
        .bind(note_id.as_uuid())
        .bind(order_id.as_uuid())
        .bind(business_id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Appends the tenant scope, soft-delete exclusion and filter predicates.
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, business_id: BusinessId, filter: &OrderFilter) {
    qb.push(" WHERE business_id = ")
        .push_bind(business_id.as_uuid())
        .push(" AND deleted_at IS NULL");

    if !filter.statuses.is_empty() {
        let values: Vec<String> = filter.statuses.iter().map(|s| s.as_str().to_owned()).collect();
        qb.push(" AND status = ANY(").push_bind(values).push(")");
    }
    if !filter.exclude_statuses.is_empty() {
        let values: Vec<String> = filter
            .exclude_statuses
            .iter()
            .map(|s| s.as_str().to_owned())
            .collect();
        qb.push(" AND status <> ALL(").push_bind(values).push(")");
    }
    if !filter.payment_statuses.is_empty() {
        let values: Vec<String> = filter
            .payment_statuses
            .iter()
            .map(|s| s.as_str().to_owned())
            .collect();
        qb.push(" AND payment_status = ANY(").push_bind(values).push(")");
    }
    if !filter.payment_methods.is_empty() {
        let values: Vec<String> = filter
            .payment_methods
            .iter()
            .map(|m| m.as_str().to_owned())
            .collect();
        qb.push(" AND payment_method = ANY(").push_bind(values).push(")");
    }
    if !filter.customer_ids.is_empty() {
        let values: Vec<Uuid> = filter.customer_ids.iter().map(CustomerId::as_uuid).collect();
        qb.push(" AND customer_id = ANY(").push_bind(values).push(")");
    }
    if !filter.channels.is_empty() {
        qb.push(" AND channel = ANY(")
            .push_bind(filter.channels.clone())
            .push(")");
    }
    if let Some(from) = filter.created_from {
        qb.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.created_to {
        qb.push(" AND created_at < ").push_bind(to);
    }
}

fn parse_column<T>(row: &PgRow, column: &str) -> Result<T>
where
    T: FromStr<Err = UnknownVariant>,
{
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|e: UnknownVariant| StoreError::Decode(format!("{column}: {e}")))
}

fn money(row: &PgRow, column: &str) -> Result<Money> {
    Ok(Money::new(row.try_get(column)?))
}

fn row_to_header(row: &PgRow) -> Result<OrderHeader> {
    Ok(OrderHeader {
        id: OrderId::from_uuid(row.try_get("id")?),
        business_id: BusinessId::from_uuid(row.try_get("business_id")?),
        order_number: row.try_get("order_number")?,
        customer_id: row
            .try_get::<Option<Uuid>, _>("customer_id")?
            .map(CustomerId::from_uuid),
        shipping_address_id: row
            .try_get::<Option<Uuid>, _>("shipping_address_id")?
            .map(AddressId::from_uuid),
        channel: row.try_get("channel")?,
        subtotal: money(row, "subtotal")?,
        vat: money(row, "vat")?,
        vat_rate: row.try_get("vat_rate")?,
        shipping_fee: money(row, "shipping_fee")?,
        discount: money(row, "discount")?,
        cogs: money(row, "cogs")?,
        total: money(row, "total")?,
        currency: row.try_get("currency")?,
        payment_method: parse_column(row, "payment_method")?,
        payment_reference: row.try_get("payment_reference")?,
        version: Version::new(row.try_get("version")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn row_to_lifecycle(row: &PgRow) -> Result<Lifecycle> {
    let timestamps = StatusTimestamps {
        placed_at: row.try_get("placed_at")?,
        ready_for_shipment_at: row.try_get("ready_for_shipment_at")?,
        shipped_at: row.try_get("shipped_at")?,
        fulfilled_at: row.try_get("fulfilled_at")?,
        cancelled_at: row.try_get("cancelled_at")?,
        returned_at: row.try_get("returned_at")?,
        paid_at: row.try_get("paid_at")?,
        failed_at: row.try_get("failed_at")?,
        refunded_at: row.try_get("refunded_at")?,
    };
    Ok(Lifecycle::restore(
        parse_column(row, "status")?,
        parse_column(row, "payment_status")?,
        timestamps,
    ))
}

fn row_to_item(row: &PgRow) -> Result<OrderItem> {
    let quantity: i32 = row.try_get("quantity")?;
    Ok(OrderItem {
        id: OrderItemId::from_uuid(row.try_get("id")?),
        order_id: OrderId::from_uuid(row.try_get("order_id")?),
        product_id: row
            .try_get::<Option<Uuid>, _>("product_id")?
            .map(ProductId::from_uuid),
        variant_id: VariantId::from_uuid(row.try_get("variant_id")?),
        quantity: u32::try_from(quantity)
            .map_err(|_| StoreError::Decode(format!("negative quantity {quantity}")))?,
        currency: row.try_get("currency")?,
        unit_price: money(row, "unit_price")?,
        unit_cost: money(row, "unit_cost")?,
        total_cost: money(row, "total_cost")?,
        total: money(row, "total")?,
    })
}

fn row_to_note(row: &PgRow) -> Result<OrderNote> {
    Ok(OrderNote {
        id: OrderNoteId::from_uuid(row.try_get("id")?),
        order_id: OrderId::from_uuid(row.try_get("order_id")?),
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id))]
    async fn insert_order(
        &self,
        business_id: BusinessId,
        order: &Order,
    ) -> std::result::Result<(), RepositoryError> {
        Ok(self.insert(business_id, order).await?)
    }

    async fn find_order(
        &self,
        business_id: BusinessId,
        order_id: OrderId,
    ) -> std::result::Result<Option<Order>, RepositoryError> {
        Ok(self.find_one(business_id, OrderKey::Id(order_id)).await?)
    }

    async fn find_order_by_number(
        &self,
        business_id: BusinessId,
        order_number: &str,
    ) -> std::result::Result<Option<Order>, RepositoryError> {
        let key = OrderKey::Number(order_number.to_owned());
        Ok(self.find_one(business_id, key).await?)
    }

    async fn list_orders(
        &self,
        business_id: BusinessId,
        query: &OrderQuery,
    ) -> std::result::Result<Vec<Order>, RepositoryError> {
        Ok(self.list(business_id, query).await?)
    }

    async fn count_orders(
        &self,
        business_id: BusinessId,
        filter: &OrderFilter,
    ) -> std::result::Result<u64, RepositoryError> {
        Ok(self.count(business_id, filter).await?)
    }

    #[tracing::instrument(skip(self, order), fields(order_id = %order.id))]
    async fn update_order(
        &self,
        business_id: BusinessId,
        order: &Order,
        expected: Version,
    ) -> std::result::Result<Version, RepositoryError> {
        Ok(self.update(business_id, order, expected).await?)
    }

    async fn purge_order(
        &self,
        business_id: BusinessId,
        order_id: OrderId,
    ) -> std::result::Result<bool, RepositoryError> {
        Ok(self.purge(business_id, order_id).await?)
    }

    async fn insert_note(
        &self,
        business_id: BusinessId,
        note: &OrderNote,
    ) -> std::result::Result<(), RepositoryError> {
        Ok(self.add_note(business_id, note).await?)
    }

    async fn list_notes(
        &self,
        business_id: BusinessId,
        order_id: OrderId,
    ) -> std::result::Result<Vec<OrderNote>, RepositoryError> {
        Ok(self.notes(business_id, order_id).await?)
    }

    async fn delete_note(
        &self,
        business_id: BusinessId,
        order_id: OrderId,
        note_id: OrderNoteId,
    ) -> std::result::Result<bool, RepositoryError> {
        Ok(self.remove_note(business_id, order_id, note_id).await?)
    }
}
