//! Integration tests: OrderService writes → SalesAnalytics reads.

use std::sync::Arc;

use analytics::{DateRange, Granularity, KeyValue, SalesAnalytics};
use chrono::{Duration, Utc};
use common::{AddressId, BusinessId, CustomerId, OrderId, ProductId, VariantId};
use domain::{
    AddressRef, BusinessContext, CustomerRef, Directories, InMemoryDirectory,
    InMemoryOrderRepository, Money, NewOrder, NewOrderItem, OrderService, OrderStatus,
    PaymentStatus, VariantRef,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

struct Setup {
    service: OrderService<InMemoryOrderRepository>,
    analytics: SalesAnalytics<InMemoryOrderRepository>,
    business_id: BusinessId,
    alice: (CustomerId, AddressId),
    bob: (CustomerId, AddressId),
    shirt: (VariantId, ProductId),
    mug: (VariantId, ProductId),
}

async fn setup() -> Setup {
    let directory = Arc::new(InMemoryDirectory::new());
    let business_id = BusinessId::new();
    directory
        .add_business(BusinessContext {
            id: business_id,
            code: "acme".into(),
            name: "Acme".into(),
            currency: "AED".into(),
            vat_rate: dec!(0),
        })
        .await;

    let mut customers = Vec::new();
    for (name, country) in [("Alice", "ae"), ("Bob", "SA")] {
        let customer_id = CustomerId::new();
        directory
            .add_customer(CustomerRef {
                id: customer_id,
                business_id,
                name: name.into(),
            })
            .await;
        let address_id = AddressId::new();
        directory
            .add_address(AddressRef {
                id: address_id,
                customer_id,
                country_code: country.into(),
            })
            .await;
        customers.push((customer_id, address_id));
    }

    let mut variants = Vec::new();
    for name in ["Shirt", "Mug"] {
        let variant_id = VariantId::new();
        let product_id = ProductId::new();
        directory
            .add_variant(VariantRef {
                id: variant_id,
                product_id,
                business_id,
                name: name.into(),
            })
            .await;
        variants.push((variant_id, product_id));
    }

    let repository = InMemoryOrderRepository::new();
    let service = OrderService::new(
        repository.clone(),
        Directories::from_shared(directory.clone()),
    );
    let analytics = SalesAnalytics::new(repository, directory);

    Setup {
        service,
        analytics,
        business_id,
        alice: customers[0],
        bob: customers[1],
        shirt: variants[0],
        mug: variants[1],
    }
}

impl Setup {
    /// Creates an order, moves it to `placed` and, if asked, marks it paid.
    async fn order(
        &self,
        customer: (CustomerId, AddressId),
        channel: &str,
        items: Vec<NewOrderItem>,
        paid: bool,
    ) -> OrderId {
        let request = NewOrder::new(customer.0, items)
            .with_shipping_address(customer.1)
            .with_channel(channel);
        let order = self
            .service
            .create_order(self.business_id, request)
            .await
            .unwrap();
        self.service
            .update_order_status(self.business_id, order.id, OrderStatus::Placed)
            .await
            .unwrap();
        if paid {
            self.service
                .update_payment_status(self.business_id, order.id, PaymentStatus::Paid)
                .await
                .unwrap();
        }
        order.id
    }

    fn shirts(&self, quantity: u32) -> NewOrderItem {
        NewOrderItem::new(
            self.shirt.0,
            quantity,
            Money::new(dec!(20.00)),
            Money::new(dec!(8.00)),
        )
    }

    fn mugs(&self, quantity: u32) -> NewOrderItem {
        NewOrderItem::new(
            self.mug.0,
            quantity,
            Money::new(dec!(5.00)),
            Money::new(dec!(1.50)),
        )
    }

    /// Alice: two paid web orders. Bob: one paid instagram order, one unpaid
    /// instagram order and one cancelled web order.
    async fn seed(&self) {
        self.order(self.alice, "web", vec![self.shirts(2)], true).await;
        self.order(self.alice, "web", vec![self.mugs(4)], true).await;
        self.order(
            self.bob,
            "instagram",
            vec![self.shirts(1), self.mugs(1)],
            true,
        )
        .await;
        self.order(self.bob, "instagram", vec![self.shirts(5)], false)
            .await;

        let cancelled = self.order(self.bob, "web", vec![self.mugs(10)], false).await;
        self.service
            .update_order_status(self.business_id, cancelled, OrderStatus::Cancelled)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_empty_business_aggregates_to_zero() {
    let s = setup().await;
    let range = DateRange::all_time();

    let summary = s.analytics.sales_summary(s.business_id, range).await.unwrap();
    assert_eq!(summary.order_count, 0);
    assert_eq!(summary.revenue, Money::zero());
    assert_eq!(summary.average_order_value, Money::zero());
    assert_eq!(s.analytics.items_sold(s.business_id, range).await.unwrap(), 0);
    assert!(
        s.analytics
            .top_products(s.business_id, range, 5)
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(s.analytics.open_orders(s.business_id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_sales_summary_counts_only_paid_active_orders() {
    let s = setup().await;
    s.seed().await;

    let summary = s
        .analytics
        .sales_summary(s.business_id, DateRange::all_time())
        .await
        .unwrap();

    // 40.00 + 20.00 + 25.00
    assert_eq!(summary.order_count, 3);
    assert_eq!(summary.revenue, Money::new(dec!(85.00)));
    // 16.00 + 6.00 + 9.50
    assert_eq!(summary.cogs, Money::new(dec!(31.50)));
    assert_eq!(summary.gross_profit, Money::new(dec!(53.50)));
    assert_eq!(summary.average_order_value, Money::new(dec!(28.33)));
}

#[tokio::test]
async fn test_items_and_top_products() {
    let s = setup().await;
    s.seed().await;
    let range = DateRange::all_time();

    assert_eq!(s.analytics.items_sold(s.business_id, range).await.unwrap(), 8);

    let top = s.analytics.top_products(s.business_id, range, 1).await.unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].product_id, s.mug.1);
    assert_eq!(top[0].quantity, 5);
    assert_eq!(top[0].revenue, Money::new(dec!(25.00)));
}

#[tokio::test]
async fn test_breakdowns() {
    let s = setup().await;
    s.seed().await;
    let range = DateRange::all_time();

    let by_status = s
        .analytics
        .orders_by_status(s.business_id, range)
        .await
        .unwrap();
    assert_eq!(
        by_status,
        vec![KeyValue::new("placed", 4), KeyValue::new("cancelled", 1)]
    );

    let by_channel = s
        .analytics
        .revenue_by_channel(s.business_id, range)
        .await
        .unwrap();
    assert_eq!(
        by_channel,
        vec![
            KeyValue::new("web", Money::new(dec!(60.00))),
            KeyValue::new("instagram", Money::new(dec!(25.00))),
        ]
    );

    let by_country = s
        .analytics
        .revenue_by_country(s.business_id, range)
        .await
        .unwrap();
    assert_eq!(
        by_country,
        vec![
            KeyValue::new("AE", Money::new(dec!(60.00))),
            KeyValue::new("SA", Money::new(dec!(25.00))),
        ]
    );
}

#[tokio::test]
async fn test_customer_aggregates() {
    let s = setup().await;
    s.seed().await;
    let range = DateRange::all_time();

    assert_eq!(
        s.analytics
            .distinct_customers(s.business_id, range)
            .await
            .unwrap(),
        2
    );
    assert_eq!(
        s.analytics
            .returning_customers(s.business_id, range)
            .await
            .unwrap(),
        1
    );

    let spenders = s
        .analytics
        .revenue_by_customer(s.business_id, range, 1)
        .await
        .unwrap();
    assert_eq!(
        spenders,
        vec![KeyValue::new(s.alice.0.to_string(), Money::new(dec!(60.00)))]
    );

    let counts = s
        .analytics
        .orders_by_customer(s.business_id, range)
        .await
        .unwrap();
    assert_eq!(counts[0], KeyValue::new(s.alice.0.to_string(), 2));
}

#[tokio::test]
async fn test_open_orders_and_funnel() {
    let s = setup().await;
    s.seed().await;

    assert_eq!(s.analytics.open_orders(s.business_id).await.unwrap(), 4);

    let funnel = s
        .analytics
        .open_orders_funnel(s.business_id, DateRange::all_time())
        .await
        .unwrap();
    assert_eq!(funnel, vec![KeyValue::new("placed", 4)]);
}

#[tokio::test]
async fn test_series_cover_the_requested_range() {
    let s = setup().await;
    s.seed().await;

    let now = Utc::now();
    let range =
        DateRange::new(Some(now - Duration::days(6)), Some(now + Duration::days(1))).unwrap();

    let revenue = s
        .analytics
        .revenue_series(s.business_id, range, Some(Granularity::Daily))
        .await
        .unwrap();
    assert_eq!(revenue.granularity, Granularity::Daily);
    assert!(revenue.series.len() >= 7);
    assert_eq!(revenue.total(), dec!(85.00));

    let counts = s
        .analytics
        .order_count_series(s.business_id, range, None)
        .await
        .unwrap();
    assert_eq!(counts.granularity, Granularity::Daily);
    assert_eq!(counts.total(), dec!(5));
}

#[tokio::test]
async fn test_other_business_sees_nothing() {
    let s = setup().await;
    s.seed().await;

    let summary = s
        .analytics
        .sales_summary(BusinessId::new(), DateRange::all_time())
        .await
        .unwrap();
    assert_eq!(summary.order_count, 0);
}

#[tokio::test]
async fn test_aggregates_cover_more_orders_than_one_page() {
    let s = setup().await;
    let count = 2 * domain::Page::MAX_PAGE_SIZE + 5;
    for _ in 0..count {
        s.order(s.alice, "web", vec![s.shirts(1)], true).await;
    }
    let range = DateRange::all_time();

    let summary = s.analytics.sales_summary(s.business_id, range).await.unwrap();
    assert_eq!(summary.order_count, u64::from(count));
    assert_eq!(
        summary.revenue,
        Money::new(dec!(20.00) * Decimal::from(count))
    );
    assert_eq!(
        s.analytics.items_sold(s.business_id, range).await.unwrap(),
        u64::from(count)
    );
    assert_eq!(
        s.analytics
            .orders_by_status(s.business_id, range)
            .await
            .unwrap(),
        vec![KeyValue::new("placed", u64::from(count))]
    );
    let series = s
        .analytics
        .order_count_series(s.business_id, range, None)
        .await
        .unwrap();
    assert_eq!(series.total(), Decimal::from(count));
}
