//! HTTP API for the order core.
//!
//! Exposes tenant-scoped order, note and analytics endpoints under
//! `/businesses/{business_id}`, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, patch, post};
use domain::order::NoopPublisher;
use domain::{
    Directories, InMemoryDirectory, InMemoryOrderRepository, OrderRepository, OrderServiceConfig,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::{Config, LogFormat};
pub use error::ApiError;
pub use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<R: OrderRepository + 'static>(
    state: Arc<AppState<R>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use routes::{analytics, notes, orders};

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let business = Router::new()
        .route("/orders", post(orders::create::<R>).get(orders::list::<R>))
        .route("/orders/preview", post(orders::preview::<R>))
        .route(
            "/orders/by-number/{order_number}",
            get(orders::get_by_number::<R>),
        )
        .route(
            "/orders/{order_id}",
            get(orders::get::<R>).delete(orders::delete::<R>),
        )
        .route("/orders/{order_id}/purge", delete(orders::purge::<R>))
        .route("/orders/{order_id}/status", patch(orders::update_status::<R>))
        .route(
            "/orders/{order_id}/payment-status",
            patch(orders::update_payment_status::<R>),
        )
        .route("/orders/{order_id}/pay", post(orders::pay::<R>))
        .route("/orders/{order_id}/refund", post(orders::refund::<R>))
        .route(
            "/orders/{order_id}/notes",
            post(notes::create::<R>).get(notes::list::<R>),
        )
        .route(
            "/orders/{order_id}/notes/{note_id}",
            delete(notes::delete::<R>),
        )
        .route("/analytics/summary", get(analytics::summary::<R>))
        .route("/analytics/top-products", get(analytics::top_products::<R>))
        .route("/analytics/breakdowns", get(analytics::breakdowns::<R>))
        .route(
            "/analytics/series/revenue",
            get(analytics::revenue_series::<R>),
        )
        .route(
            "/analytics/series/orders",
            get(analytics::order_count_series::<R>),
        )
        .route("/analytics/customers", get(analytics::customers::<R>))
        .route("/analytics/open-orders", get(analytics::open_orders::<R>));

    Router::new()
        .route("/health", get(routes::health::check))
        .nest("/businesses/{business_id}", business)
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Application state over the in-memory repository and the given directory.
///
/// Events are dropped.
pub fn in_memory_state(directory: Arc<InMemoryDirectory>) -> Arc<AppState<InMemoryOrderRepository>> {
    Arc::new(AppState::new(
        InMemoryOrderRepository::new(),
        Directories::from_shared(directory),
        OrderServiceConfig::default(),
        Arc::new(NoopPublisher),
    ))
}
