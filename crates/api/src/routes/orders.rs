//! Order endpoints: creation, reads, status and payment transitions, delete.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{BusinessId, CustomerId, OrderId};
use domain::{
    NewOrder, Order, OrderFilter, OrderQuery, OrderRepository, OrderStatus, OrderTotals, Page,
    PaymentDetails, PaymentMethod, PaymentStatus, SortDirection, SortField,
};
use serde::{Deserialize, Serialize};

use super::{AppState, parse_id, parse_list};
use crate::error::ApiError;

const DEFAULT_PAGE_SIZE: u32 = 20;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatusRequest {
    pub payment_status: PaymentStatus,
}

/// Query string of `GET /orders`. List-valued filters are comma-separated.
#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersParams {
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub payment_method: Option<String>,
    pub customer_id: Option<String>,
    pub channel: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub sort_by: Option<SortField>,
    pub direction: Option<SortDirection>,
}

impl ListOrdersParams {
    fn filter(&self) -> Result<OrderFilter, ApiError> {
        Ok(OrderFilter {
            statuses: parse_list::<OrderStatus>(self.status.as_deref(), "status")?,
            payment_statuses: parse_list::<PaymentStatus>(
                self.payment_status.as_deref(),
                "payment_status",
            )?,
            payment_methods: parse_list::<PaymentMethod>(
                self.payment_method.as_deref(),
                "payment_method",
            )?,
            customer_ids: parse_list::<CustomerId>(self.customer_id.as_deref(), "customer_id")?,
            channels: parse_list::<String>(self.channel.as_deref(), "channel")?,
            ..OrderFilter::default()
        }
        .created_between(self.from, self.to))
    }

    fn page(&self) -> Page {
        Page::new(
            self.page.unwrap_or(1),
            self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
    }
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct OrderPage {
    pub items: Vec<Order>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

// -- Handlers --

/// POST /businesses/{business_id}/orders — create an order with its items.
#[tracing::instrument(skip(state, payload))]
pub async fn create<R: OrderRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(business_id): Path<String>,
    payload: Result<Json<NewOrder>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let business_id: BusinessId = parse_id(&business_id, "business_id")?;
    let Json(request) = payload?;
    let order = state.orders.create_order(business_id, request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// POST /businesses/{business_id}/orders/preview — totals without writing.
#[tracing::instrument(skip(state, payload))]
pub async fn preview<R: OrderRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(business_id): Path<String>,
    payload: Result<Json<NewOrder>, JsonRejection>,
) -> Result<Json<OrderTotals>, ApiError> {
    let business_id: BusinessId = parse_id(&business_id, "business_id")?;
    let Json(request) = payload?;
    Ok(Json(state.orders.preview_order(business_id, &request).await?))
}

/// GET /businesses/{business_id}/orders — filtered, sorted, paginated listing.
#[tracing::instrument(skip(state, params))]
pub async fn list<R: OrderRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(business_id): Path<String>,
    params: Result<Query<ListOrdersParams>, QueryRejection>,
) -> Result<Json<OrderPage>, ApiError> {
    let business_id: BusinessId = parse_id(&business_id, "business_id")?;
    let Query(params) = params?;

    let filter = params.filter()?;
    let page = params.page();
    let query = OrderQuery::new(filter.clone())
        .sorted(
            params.sort_by.unwrap_or_default(),
            params.direction.unwrap_or_default(),
        )
        .paged(page);

    let items = state.orders.list_orders(business_id, &query).await?;
    let total = state.orders.count_orders(business_id, &filter).await?;

    Ok(Json(OrderPage {
        items,
        total,
        page: page.page,
        page_size: page.page_size,
    }))
}

/// GET /businesses/{business_id}/orders/{order_id} — order with items and notes.
#[tracing::instrument(skip(state))]
pub async fn get<R: OrderRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path((business_id, order_id)): Path<(String, String)>,
) -> Result<Json<Order>, ApiError> {
    let (business_id, order_id) = ids(&business_id, &order_id)?;
    Ok(Json(state.orders.get_order(business_id, order_id).await?))
}

/// GET /businesses/{business_id}/orders/by-number/{order_number}
#[tracing::instrument(skip(state))]
pub async fn get_by_number<R: OrderRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path((business_id, order_number)): Path<(String, String)>,
) -> Result<Json<Order>, ApiError> {
    let business_id: BusinessId = parse_id(&business_id, "business_id")?;
    Ok(Json(
        state
            .orders
            .get_order_by_number(business_id, &order_number)
            .await?,
    ))
}

/// PATCH /businesses/{business_id}/orders/{order_id}/status
#[tracing::instrument(skip(state, payload))]
pub async fn update_status<R: OrderRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path((business_id, order_id)): Path<(String, String)>,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    let (business_id, order_id) = ids(&business_id, &order_id)?;
    let Json(request) = payload?;
    let order = state
        .orders
        .update_order_status(business_id, order_id, request.status)
        .await?;
    Ok(Json(order))
}

/// PATCH /businesses/{business_id}/orders/{order_id}/payment-status
#[tracing::instrument(skip(state, payload))]
pub async fn update_payment_status<R: OrderRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path((business_id, order_id)): Path<(String, String)>,
    payload: Result<Json<PaymentStatusRequest>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    let (business_id, order_id) = ids(&business_id, &order_id)?;
    let Json(request) = payload?;
    let order = state
        .orders
        .update_payment_status(business_id, order_id, request.payment_status)
        .await?;
    Ok(Json(order))
}

/// POST /businesses/{business_id}/orders/{order_id}/pay — mark paid.
///
/// The body is optional; without one the method chosen at creation stays.
#[tracing::instrument(skip(state, payload))]
pub async fn pay<R: OrderRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path((business_id, order_id)): Path<(String, String)>,
    payload: Result<Json<PaymentDetails>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    let (business_id, order_id) = ids(&business_id, &order_id)?;
    let details = match payload {
        Ok(Json(details)) => details,
        Err(JsonRejection::MissingJsonContentType(_)) => PaymentDetails::default(),
        Err(rejection) => return Err(rejection.into()),
    };
    let order = state.orders.pay_order(business_id, order_id, details).await?;
    Ok(Json(order))
}

/// POST /businesses/{business_id}/orders/{order_id}/refund
#[tracing::instrument(skip(state))]
pub async fn refund<R: OrderRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path((business_id, order_id)): Path<(String, String)>,
) -> Result<Json<Order>, ApiError> {
    let (business_id, order_id) = ids(&business_id, &order_id)?;
    Ok(Json(state.orders.refund_order(business_id, order_id).await?))
}

/// DELETE /businesses/{business_id}/orders/{order_id} — soft delete.
#[tracing::instrument(skip(state))]
pub async fn delete<R: OrderRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path((business_id, order_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let (business_id, order_id) = ids(&business_id, &order_id)?;
    state.orders.delete_order(business_id, order_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /businesses/{business_id}/orders/{order_id}/purge — hard delete.
#[tracing::instrument(skip(state))]
pub async fn purge<R: OrderRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path((business_id, order_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let (business_id, order_id) = ids(&business_id, &order_id)?;
    state.orders.purge_order(business_id, order_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) fn ids(business_id: &str, order_id: &str) -> Result<(BusinessId, OrderId), ApiError> {
    Ok((
        parse_id(business_id, "business_id")?,
        parse_id(order_id, "order_id")?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_build_filter_and_page() {
        let customer = CustomerId::new();
        let params = ListOrdersParams {
            status: Some("placed,shipped".into()),
            payment_method: Some("tabby".into()),
            customer_id: Some(customer.to_string()),
            page: Some(0),
            page_size: Some(500),
            ..ListOrdersParams::default()
        };

        let filter = params.filter().unwrap();
        assert_eq!(
            filter.statuses,
            vec![OrderStatus::Placed, OrderStatus::Shipped]
        );
        assert_eq!(filter.payment_methods, vec![PaymentMethod::Tabby]);
        assert_eq!(filter.customer_ids, vec![customer]);

        let page = params.page();
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, Page::MAX_PAGE_SIZE);
    }

    #[test]
    fn test_params_reject_unknown_status() {
        let params = ListOrdersParams {
            status: Some("lost".into()),
            ..ListOrdersParams::default()
        };
        assert!(params.filter().is_err());
    }
}
