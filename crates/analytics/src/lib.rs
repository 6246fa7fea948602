//! Read-side aggregation over persisted orders.
//!
//! This crate provides:
//! - [`SalesAnalytics`] for revenue, product, customer and status aggregates
//! - [`TimeSeries`] bucketing with [`Granularity`] chosen from the date range
//! - [`KeyValue`] rows for grouped breakdowns
//!
//! Revenue figures only count orders that are paid and neither cancelled nor
//! returned. Empty selections aggregate to zero.

pub mod error;
pub mod report;
pub mod sales;
pub mod timeseries;

pub use error::{AnalyticsError, Result};
pub use report::{DateRange, KeyValue, ProductSales, SalesSummary};
pub use sales::SalesAnalytics;
pub use timeseries::{Granularity, TimeSeries, TimeSeriesPoint};
