//! API server entry point.

use std::sync::Arc;

use api::{AppState, Config, LogFormat};
use domain::{
    BroadcastEventBus, Directories, InMemoryDirectory, InMemoryOrderRepository, OrderEvent,
    OrderRepository, OrderServiceConfig,
};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::{PostgresDirectory, PostgresOrderRepository};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Forwards payment signals to the log until the bus closes.
fn spawn_payment_listener(bus: &BroadcastEventBus) {
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let OrderEvent::PaymentSucceeded(data) = event.as_ref() {
                        tracing::info!(
                            business_id = %data.business_id,
                            order_id = %data.order_id,
                            payment_method = %data.payment_method,
                            amount = %data.order_total,
                            currency = %data.currency,
                            "payment succeeded"
                        );
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "order event listener lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

async fn serve<R: OrderRepository + 'static>(
    config: &Config,
    state: Arc<AppState<R>>,
    metrics_handle: PrometheusHandle,
) {
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    init_tracing(&config);

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let bus = BroadcastEventBus::new();
    spawn_payment_listener(&bus);

    let service_config = OrderServiceConfig {
        order_number_attempts: config.order_number_attempts.max(1),
    };

    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            let repository = PostgresOrderRepository::new(pool.clone());
            repository
                .run_migrations()
                .await
                .expect("failed to run migrations");

            let state = Arc::new(AppState::new(
                repository,
                Directories::from_shared(Arc::new(PostgresDirectory::new(pool))),
                service_config,
                Arc::new(bus),
            ));
            serve(&config, state, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, orders are kept in memory");
            let state = Arc::new(AppState::new(
                InMemoryOrderRepository::new(),
                Directories::from_shared(Arc::new(InMemoryDirectory::new())),
                service_config,
                Arc::new(bus),
            ));
            serve(&config, state, metrics_handle).await;
        }
    }

    tracing::info!("server shut down gracefully");
}
