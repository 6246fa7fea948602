//! HTTP handlers, grouped by resource.

pub mod analytics;
pub mod health;
pub mod metrics;
pub mod notes;
pub mod orders;

use std::str::FromStr;
use std::sync::Arc;

use ::analytics::SalesAnalytics;
use domain::{Directories, OrderEventPublisher, OrderRepository, OrderService, OrderServiceConfig};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<R: OrderRepository> {
    pub orders: OrderService<R>,
    pub analytics: SalesAnalytics<R>,
}

impl<R: OrderRepository + Clone> AppState<R> {
    /// Wires the order service and the analytics reader over one repository.
    pub fn new(
        repository: R,
        directories: Directories,
        config: OrderServiceConfig,
        publisher: Arc<dyn OrderEventPublisher>,
    ) -> Self {
        let analytics = SalesAnalytics::new(repository.clone(), directories.customers.clone());
        let orders = OrderService::new(repository, directories)
            .with_config(config)
            .with_publisher(publisher);
        Self { orders, analytics }
    }
}

/// Parses an identifier taken from the URL path.
pub(crate) fn parse_id<T: FromStr>(raw: &str, name: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request("request.invalid_id", format!("invalid {name}: {raw}")))
}

/// Parses a comma-separated query value into a list. Blank entries are skipped.
pub(crate) fn parse_list<T>(raw: Option<&str>, name: &str) -> Result<Vec<T>, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse().map_err(|err: T::Err| {
                ApiError::bad_request("request.invalid_query", format!("{name}: {err}"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::OrderId;
    use domain::OrderStatus;

    #[test]
    fn test_parse_list_splits_and_trims() {
        let statuses: Vec<OrderStatus> =
            parse_list(Some("pending, placed,,shipped"), "status").unwrap();
        assert_eq!(
            statuses,
            vec![OrderStatus::Pending, OrderStatus::Placed, OrderStatus::Shipped]
        );
        assert!(parse_list::<OrderStatus>(None, "status").unwrap().is_empty());
    }

    #[test]
    fn test_parse_list_rejects_unknown_values() {
        assert!(parse_list::<OrderStatus>(Some("placed,lost"), "status").is_err());
    }

    #[test]
    fn test_parse_id_rejects_garbage() {
        assert!(parse_id::<OrderId>("not-a-uuid", "order_id").is_err());
        let id = OrderId::new();
        assert_eq!(parse_id::<OrderId>(&id.to_string(), "order_id").unwrap(), id);
    }
}
