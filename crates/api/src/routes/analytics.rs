//! Dashboard read endpoints backed by [`SalesAnalytics`](analytics::SalesAnalytics).

use std::sync::Arc;

use analytics::{DateRange, Granularity, KeyValue, ProductSales, SalesSummary, TimeSeries};
use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use common::BusinessId;
use domain::OrderRepository;
use serde::{Deserialize, Serialize};

use super::{AppState, parse_id};
use crate::error::ApiError;

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsParams {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub granularity: Option<Granularity>,
    pub limit: Option<usize>,
}

impl AnalyticsParams {
    fn range(&self) -> Result<DateRange, ApiError> {
        Ok(DateRange::new(self.from, self.to)?)
    }

    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    #[serde(flatten)]
    pub summary: SalesSummary,
    pub items_sold: u64,
}

#[derive(Debug, Serialize)]
pub struct BreakdownsResponse {
    pub by_status: Vec<KeyValue<u64>>,
    pub by_channel: Vec<KeyValue>,
    pub by_country: Vec<KeyValue>,
}

#[derive(Debug, Serialize)]
pub struct CustomersResponse {
    pub distinct: u64,
    pub returning: u64,
    pub orders_by_customer: Vec<KeyValue<u64>>,
    pub top_spenders: Vec<KeyValue>,
}

#[derive(Debug, Serialize)]
pub struct OpenOrdersResponse {
    pub count: u64,
    pub funnel: Vec<KeyValue<u64>>,
}

type Scope = (BusinessId, AnalyticsParams);

fn scope(
    business_id: &str,
    params: Result<Query<AnalyticsParams>, QueryRejection>,
) -> Result<Scope, ApiError> {
    let business_id = parse_id(business_id, "business_id")?;
    let Query(params) = params?;
    Ok((business_id, params))
}

/// GET /businesses/{business_id}/analytics/summary
#[tracing::instrument(skip(state, params))]
pub async fn summary<R: OrderRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(business_id): Path<String>,
    params: Result<Query<AnalyticsParams>, QueryRejection>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let (business_id, params) = scope(&business_id, params)?;
    let range = params.range()?;
    let summary = state.analytics.sales_summary(business_id, range).await?;
    let items_sold = state.analytics.items_sold(business_id, range).await?;
    Ok(Json(SummaryResponse {
        summary,
        items_sold,
    }))
}

/// GET /businesses/{business_id}/analytics/top-products
#[tracing::instrument(skip(state, params))]
pub async fn top_products<R: OrderRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(business_id): Path<String>,
    params: Result<Query<AnalyticsParams>, QueryRejection>,
) -> Result<Json<Vec<ProductSales>>, ApiError> {
    let (business_id, params) = scope(&business_id, params)?;
    let products = state
        .analytics
        .top_products(business_id, params.range()?, params.limit())
        .await?;
    Ok(Json(products))
}

/// GET /businesses/{business_id}/analytics/breakdowns
#[tracing::instrument(skip(state, params))]
pub async fn breakdowns<R: OrderRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(business_id): Path<String>,
    params: Result<Query<AnalyticsParams>, QueryRejection>,
) -> Result<Json<BreakdownsResponse>, ApiError> {
    let (business_id, params) = scope(&business_id, params)?;
    let range = params.range()?;
    Ok(Json(BreakdownsResponse {
        by_status: state.analytics.orders_by_status(business_id, range).await?,
        by_channel: state.analytics.revenue_by_channel(business_id, range).await?,
        by_country: state.analytics.revenue_by_country(business_id, range).await?,
    }))
}

/// GET /businesses/{business_id}/analytics/series/revenue
#[tracing::instrument(skip(state, params))]
pub async fn revenue_series<R: OrderRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(business_id): Path<String>,
    params: Result<Query<AnalyticsParams>, QueryRejection>,
) -> Result<Json<TimeSeries>, ApiError> {
    let (business_id, params) = scope(&business_id, params)?;
    let series = state
        .analytics
        .revenue_series(business_id, params.range()?, params.granularity)
        .await?;
    Ok(Json(series))
}

/// GET /businesses/{business_id}/analytics/series/orders
#[tracing::instrument(skip(state, params))]
pub async fn order_count_series<R: OrderRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(business_id): Path<String>,
    params: Result<Query<AnalyticsParams>, QueryRejection>,
) -> Result<Json<TimeSeries>, ApiError> {
    let (business_id, params) = scope(&business_id, params)?;
    let series = state
        .analytics
        .order_count_series(business_id, params.range()?, params.granularity)
        .await?;
    Ok(Json(series))
}

/// GET /businesses/{business_id}/analytics/customers
#[tracing::instrument(skip(state, params))]
pub async fn customers<R: OrderRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(business_id): Path<String>,
    params: Result<Query<AnalyticsParams>, QueryRejection>,
) -> Result<Json<CustomersResponse>, ApiError> {
    let (business_id, params) = scope(&business_id, params)?;
    let range = params.range()?;
    let analytics = &state.analytics;
    Ok(Json(CustomersResponse {
        distinct: analytics.distinct_customers(business_id, range).await?,
        returning: analytics.returning_customers(business_id, range).await?,
        orders_by_customer: analytics.orders_by_customer(business_id, range).await?,
        top_spenders: analytics
            .revenue_by_customer(business_id, range, params.limit())
            .await?,
    }))
}

/// GET /businesses/{business_id}/analytics/open-orders
#[tracing::instrument(skip(state, params))]
pub async fn open_orders<R: OrderRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(business_id): Path<String>,
    params: Result<Query<AnalyticsParams>, QueryRejection>,
) -> Result<Json<OpenOrdersResponse>, ApiError> {
    let (business_id, params) = scope(&business_id, params)?;
    Ok(Json(OpenOrdersResponse {
        count: state.analytics.open_orders(business_id).await?,
        funnel: state
            .analytics
            .open_orders_funnel(business_id, params.range()?)
            .await?,
    }))
}
