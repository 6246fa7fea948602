//! Sales aggregates computed from the order repository.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{BusinessId, CustomerId, ProductId};
use domain::{
    CustomerDirectory, Money, Order, OrderFilter, OrderQuery, OrderRepository, OrderStatus, Page,
    SortDirection, SortField,
};
use rust_decimal::Decimal;

use crate::report::{DateRange, KeyValue, ProductSales, SalesSummary};
use crate::timeseries::{Granularity, TimeSeries};
use crate::{AnalyticsError, Result};

/// Orders fetched per repository round trip while aggregating.
const SCAN_BATCH: u32 = Page::MAX_PAGE_SIZE;

/// Read-only aggregations over one business's orders.
///
/// Revenue, cost, product and customer figures are computed over orders
/// that are paid and neither cancelled nor returned. Status breakdowns and
/// order-count series cover every order that has not been deleted.
///
/// Orders are scanned oldest first in pages of [`SCAN_BATCH`], so memory
/// is bounded by one page plus the aggregate being built.
pub struct SalesAnalytics<R> {
    repository: R,
    customers: Arc<dyn CustomerDirectory>,
}

/// Page-by-page walk over the orders matching a filter.
struct OrderScan<'a, R> {
    repository: &'a R,
    business_id: BusinessId,
    query: OrderQuery,
    exhausted: bool,
}

impl<R: OrderRepository> OrderScan<'_, R> {
    async fn next_batch(&mut self) -> Result<Option<Vec<Order>>> {
        let Some(page) = self.query.page.filter(|_| !self.exhausted) else {
            return Ok(None);
        };
        let batch = self
            .repository
            .list_orders(self.business_id, &self.query)
            .await?;
        self.exhausted = (batch.len() as u64) < page.limit();
        self.query.page = Some(Page::new(page.page + 1, page.page_size));
        Ok((!batch.is_empty()).then_some(batch))
    }
}

impl<R: OrderRepository> SalesAnalytics<R> {
    pub fn new(repository: R, customers: Arc<dyn CustomerDirectory>) -> Self {
        Self {
            repository,
            customers,
        }
    }

    fn scan(&self, business_id: BusinessId, filter: OrderFilter) -> OrderScan<'_, R> {
        metrics::counter!("analytics_queries_total").increment(1);
        OrderScan {
            repository: &self.repository,
            business_id,
            query: OrderQuery::new(filter)
                .sorted(SortField::CreatedAt, SortDirection::Asc)
                .paged(Page::new(1, SCAN_BATCH)),
            exhausted: false,
        }
    }

    fn revenue_orders(&self, business_id: BusinessId, range: DateRange) -> OrderScan<'_, R> {
        self.scan(business_id, range.apply(OrderFilter::paid_and_active()))
    }

    /// Order count, revenue, COGS and their averages.
    #[tracing::instrument(skip(self))]
    pub async fn sales_summary(
        &self,
        business_id: BusinessId,
        range: DateRange,
    ) -> Result<SalesSummary> {
        let mut scan = self.revenue_orders(business_id, range);
        let (mut count, mut revenue, mut cogs) = (0u64, Money::zero(), Money::zero());
        while let Some(batch) = scan.next_batch().await? {
            count += batch.len() as u64;
            for order in &batch {
                accumulate(&mut revenue, order.total, "revenue")?;
                accumulate(&mut cogs, order.cogs, "cogs")?;
            }
        }
        Ok(SalesSummary::from_totals(count, revenue, cogs))
    }

    /// Total units across all line items.
    pub async fn items_sold(&self, business_id: BusinessId, range: DateRange) -> Result<u64> {
        let mut scan = self.revenue_orders(business_id, range);
        let mut units = 0u64;
        while let Some(batch) = scan.next_batch().await? {
            units += batch.iter().map(Order::total_quantity).sum::<u64>();
        }
        Ok(units)
    }

    /// Best sellers by units, ties broken by revenue.
    #[tracing::instrument(skip(self))]
    pub async fn top_products(
        &self,
        business_id: BusinessId,
        range: DateRange,
        limit: usize,
    ) -> Result<Vec<ProductSales>> {
        let mut scan = self.revenue_orders(business_id, range);
        let mut by_product: HashMap<ProductId, (u64, Money)> = HashMap::new();
        while let Some(batch) = scan.next_batch().await? {
            for item in batch.iter().flat_map(|o| &o.items) {
                let Some(product_id) = item.product_id else {
                    continue;
                };
                let entry = by_product.entry(product_id).or_default();
                entry.0 += u64::from(item.quantity);
                accumulate(&mut entry.1, item.total, "product revenue")?;
            }
        }

        let mut products: Vec<ProductSales> = by_product
            .into_iter()
            .map(|(product_id, (quantity, revenue))| ProductSales {
                product_id,
                quantity,
                revenue,
            })
            .collect();
        products.sort_by(|a, b| {
            b.quantity
                .cmp(&a.quantity)
                .then_with(|| b.revenue.cmp(&a.revenue))
                .then_with(|| a.product_id.cmp(&b.product_id))
        });
        products.truncate(limit);
        Ok(products)
    }

    /// Order counts per status, in lifecycle order, omitting empty statuses.
    pub async fn orders_by_status(
        &self,
        business_id: BusinessId,
        range: DateRange,
    ) -> Result<Vec<KeyValue<u64>>> {
        let scan = self.scan(business_id, range.apply(OrderFilter::default()));
        count_by_status(scan).await
    }

    /// Revenue per sales channel, largest first.
    pub async fn revenue_by_channel(
        &self,
        business_id: BusinessId,
        range: DateRange,
    ) -> Result<Vec<KeyValue>> {
        let mut scan = self.revenue_orders(business_id, range);
        let mut sums = BTreeMap::new();
        while let Some(batch) = scan.next_batch().await? {
            for order in &batch {
                add_to(&mut sums, &order.channel, order.total)?;
            }
        }
        Ok(ranked(sums))
    }

    /// Revenue per shipping country, largest first.
    ///
    /// Orders without a resolvable shipping address are grouped under an
    /// empty key.
    #[tracing::instrument(skip(self))]
    pub async fn revenue_by_country(
        &self,
        business_id: BusinessId,
        range: DateRange,
    ) -> Result<Vec<KeyValue>> {
        let mut scan = self.revenue_orders(business_id, range);
        let mut countries = HashMap::new();
        let mut sums = BTreeMap::new();
        while let Some(batch) = scan.next_batch().await? {
            for order in &batch {
                let country = match order.shipping_address_id {
                    Some(address_id) => {
                        if !countries.contains_key(&address_id) {
                            let code = self
                                .customers
                                .find_address(business_id, address_id)
                                .await?
                                .map(|a| a.country_code.trim().to_uppercase())
                                .unwrap_or_default();
                            countries.insert(address_id, code);
                        }
                        countries.get(&address_id).cloned().unwrap_or_default()
                    }
                    None => String::new(),
                };
                add_to(&mut sums, &country, order.total)?;
            }
        }
        Ok(ranked(sums))
    }

    /// Revenue per time bucket.
    ///
    /// Without an explicit granularity one is chosen from the range, or from
    /// the span of the data when the range is open.
    pub async fn revenue_series(
        &self,
        business_id: BusinessId,
        range: DateRange,
        granularity: Option<Granularity>,
    ) -> Result<TimeSeries> {
        let mut scan = self.revenue_orders(business_id, range);
        let mut samples = Vec::new();
        while let Some(batch) = scan.next_batch().await? {
            samples.extend(batch.iter().map(|o| (o.created_at, o.total.amount())));
        }
        Ok(build_series(samples, range, granularity))
    }

    /// Number of orders created per time bucket.
    pub async fn order_count_series(
        &self,
        business_id: BusinessId,
        range: DateRange,
        granularity: Option<Granularity>,
    ) -> Result<TimeSeries> {
        let mut scan = self.scan(business_id, range.apply(OrderFilter::default()));
        let mut samples = Vec::new();
        while let Some(batch) = scan.next_batch().await? {
            samples.extend(batch.iter().map(|o| (o.created_at, Decimal::ONE)));
        }
        Ok(build_series(samples, range, granularity))
    }

    /// Number of distinct customers with revenue orders.
    pub async fn distinct_customers(
        &self,
        business_id: BusinessId,
        range: DateRange,
    ) -> Result<u64> {
        let mut scan = self.revenue_orders(business_id, range);
        let mut customers: HashSet<CustomerId> = HashSet::new();
        while let Some(batch) = scan.next_batch().await? {
            customers.extend(batch.iter().filter_map(|o| o.customer_id));
        }
        Ok(customers.len() as u64)
    }

    /// Order counts per customer, most orders first.
    pub async fn orders_by_customer(
        &self,
        business_id: BusinessId,
        range: DateRange,
    ) -> Result<Vec<KeyValue<u64>>> {
        let counts = orders_per_customer(self.revenue_orders(business_id, range)).await?;

        let mut rows: Vec<_> = counts
            .into_iter()
            .map(|(customer_id, count)| KeyValue::new(customer_id.to_string(), count))
            .collect();
        rows.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.key.cmp(&b.key)));
        Ok(rows)
    }

    /// Customers with more than one revenue order in the range.
    pub async fn returning_customers(
        &self,
        business_id: BusinessId,
        range: DateRange,
    ) -> Result<u64> {
        let counts = orders_per_customer(self.revenue_orders(business_id, range)).await?;
        Ok(counts.values().filter(|count| **count > 1).count() as u64)
    }

    /// Top spenders, largest first.
    pub async fn revenue_by_customer(
        &self,
        business_id: BusinessId,
        range: DateRange,
        limit: usize,
    ) -> Result<Vec<KeyValue>> {
        let mut scan = self.revenue_orders(business_id, range);
        let mut sums = BTreeMap::new();
        while let Some(batch) = scan.next_batch().await? {
            for order in &batch {
                if let Some(customer_id) = order.customer_id {
                    add_to(&mut sums, &customer_id.to_string(), order.total)?;
                }
            }
        }
        let mut rows = ranked(sums);
        rows.truncate(limit);
        Ok(rows)
    }

    /// Orders still in progress: not fulfilled, cancelled or returned.
    pub async fn open_orders(&self, business_id: BusinessId) -> Result<u64> {
        Ok(self
            .repository
            .count_orders(business_id, &open_filter())
            .await?)
    }

    /// Open orders grouped by status, in lifecycle order.
    pub async fn open_orders_funnel(
        &self,
        business_id: BusinessId,
        range: DateRange,
    ) -> Result<Vec<KeyValue<u64>>> {
        count_by_status(self.scan(business_id, range.apply(open_filter()))).await
    }
}

fn open_filter() -> OrderFilter {
    OrderFilter::default().with_statuses(OrderStatus::ALL.into_iter().filter(|s| s.is_open()))
}

fn build_series(
    samples: Vec<(DateTime<Utc>, Decimal)>,
    range: DateRange,
    granularity: Option<Granularity>,
) -> TimeSeries {
    let granularity = granularity.unwrap_or_else(|| {
        let from = range.from.or_else(|| samples.iter().map(|(at, _)| *at).min());
        let to = range.to.or_else(|| samples.iter().map(|(at, _)| *at).max());
        match (from, to) {
            (Some(from), Some(to)) => Granularity::for_range(from, to),
            _ => Granularity::default(),
        }
    });
    TimeSeries::bucket(samples, granularity, range.from, range.to)
}

async fn count_by_status<R: OrderRepository>(
    mut scan: OrderScan<'_, R>,
) -> Result<Vec<KeyValue<u64>>> {
    let mut counts: HashMap<OrderStatus, u64> = HashMap::new();
    while let Some(batch) = scan.next_batch().await? {
        for order in &batch {
            *counts.entry(order.status()).or_default() += 1;
        }
    }
    Ok(OrderStatus::ALL
        .into_iter()
        .filter_map(|status| {
            counts
                .get(&status)
                .map(|count| KeyValue::new(status.as_str(), *count))
        })
        .collect())
}

async fn orders_per_customer<R: OrderRepository>(
    mut scan: OrderScan<'_, R>,
) -> Result<HashMap<CustomerId, u64>> {
    let mut counts = HashMap::new();
    while let Some(batch) = scan.next_batch().await? {
        for customer_id in batch.iter().filter_map(|o| o.customer_id) {
            *counts.entry(customer_id).or_default() += 1;
        }
    }
    Ok(counts)
}

fn accumulate(sum: &mut Money, amount: Money, aggregate: &'static str) -> Result<()> {
    *sum = sum
        .checked_add(amount)
        .ok_or(AnalyticsError::Overflow { aggregate })?;
    Ok(())
}

fn add_to(sums: &mut BTreeMap<String, Money>, key: &str, amount: Money) -> Result<()> {
    match sums.get_mut(key) {
        Some(sum) => accumulate(sum, amount, "revenue"),
        None => {
            sums.insert(key.to_string(), amount);
            Ok(())
        }
    }
}

/// Largest first, ties by key.
fn ranked(sums: BTreeMap<String, Money>) -> Vec<KeyValue> {
    let mut out: Vec<_> = sums
        .into_iter()
        .map(|(key, value)| KeyValue::new(key, value))
        .collect();
    out.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.key.cmp(&b.key)));
    out
}
