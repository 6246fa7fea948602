//! Integration tests for the API server.

use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{AddressId, BusinessId, CustomerId, ProductId, VariantId};
use domain::{AddressRef, BusinessContext, CustomerRef, InMemoryDirectory, VariantRef};
use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    router: axum::Router,
    business_id: BusinessId,
    customer_id: CustomerId,
    address_id: AddressId,
    variant_id: VariantId,
}

async fn setup() -> TestApp {
    let directory = Arc::new(InMemoryDirectory::new());
    let business_id = BusinessId::new();
    directory
        .add_business(BusinessContext {
            id: business_id,
            code: "acme".into(),
            name: "Acme".into(),
            currency: "AED".into(),
            vat_rate: dec!(0.05),
        })
        .await;

    let customer_id = CustomerId::new();
    directory
        .add_customer(CustomerRef {
            id: customer_id,
            business_id,
            name: "Alice".into(),
        })
        .await;
    let address_id = AddressId::new();
    directory
        .add_address(AddressRef {
            id: address_id,
            customer_id,
            country_code: "AE".into(),
        })
        .await;
    let variant_id = VariantId::new();
    directory
        .add_variant(VariantRef {
            id: variant_id,
            product_id: ProductId::new(),
            business_id,
            name: "Shirt".into(),
        })
        .await;

    let state = api::in_memory_state(directory);
    TestApp {
        router: api::create_app(state, get_metrics_handle()),
        business_id,
        customer_id,
        address_id,
        variant_id,
    }
}

impl TestApp {
    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    fn orders_uri(&self) -> String {
        format!("/businesses/{}/orders", self.business_id)
    }

    fn order_uri(&self, order: &Value) -> String {
        format!("{}/{}", self.orders_uri(), order["id"].as_str().unwrap())
    }

    fn order_request(&self, quantity: u32) -> Value {
        json!({
            "customer_id": self.customer_id,
            "shipping_address_id": self.address_id,
            "channel": "instagram",
            "shipping_fee": "5.00",
            "items": [{
                "variant_id": self.variant_id,
                "quantity": quantity,
                "unit_price": "10.00",
                "unit_cost": "4.00"
            }]
        })
    }

    async fn create_order(&self, quantity: u32) -> Value {
        let (status, order) = self
            .send("POST", &self.orders_uri(), Some(self.order_request(quantity)))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{order}");
        order
    }

    async fn set_status(&self, order: &Value, status: &str) -> (StatusCode, Value) {
        self.send(
            "PATCH",
            &format!("{}/status", self.order_uri(order)),
            Some(json!({ "status": status })),
        )
        .await
    }
}

fn money(value: &Value) -> Decimal {
    Decimal::from_str(value.as_str().unwrap()).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = setup().await;

    let (status, json) = app.send("GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_create_order_computes_totals() {
    let app = setup().await;

    let order = app.create_order(2).await;

    assert_eq!(order["status"], "pending");
    assert_eq!(order["payment_status"], "pending");
    assert_eq!(order["currency"], "AED");
    assert!(order["order_number"].as_str().unwrap().starts_with("ACM"));
    assert_eq!(order["items"].as_array().unwrap().len(), 1);
    assert_eq!(money(&order["subtotal"]), dec!(20.00));
    assert_eq!(money(&order["vat"]), dec!(1.00));
    assert_eq!(money(&order["cogs"]), dec!(8.00));
    assert_eq!(money(&order["total"]), dec!(26.00));
}

#[tokio::test]
async fn test_create_order_with_no_items_is_rejected() {
    let app = setup().await;
    let mut request = app.order_request(1);
    request["items"] = json!([]);

    let (status, json) = app.send("POST", &app.orders_uri(), Some(request)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "order.empty_items");
}

#[tokio::test]
async fn test_create_order_with_overflowing_amount_is_rejected() {
    let app = setup().await;
    let mut request = app.order_request(2);
    request["items"][0]["unit_price"] = json!("79228162514264337593543950335");

    let (status, json) = app.send("POST", &app.orders_uri(), Some(request)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "order.amount_overflow");
    assert_eq!(json["error"]["details"]["field"], "subtotal");
}

#[tokio::test]
async fn test_create_order_with_unstorable_quantity_is_rejected() {
    let app = setup().await;

    let (status, json) = app
        .send("POST", &app.orders_uri(), Some(app.order_request(3_000_000_000)))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "order.invalid_item_quantity");
    assert_eq!(json["error"]["details"]["quantity"], 3_000_000_000u32);
}

#[tokio::test]
async fn test_preview_order_matches_created_totals() {
    let app = setup().await;
    let uri = format!("{}/preview", app.orders_uri());

    let (status, preview) = app.send("POST", &uri, Some(app.order_request(2))).await;
    assert_eq!(status, StatusCode::OK, "{preview}");
    assert_eq!(money(&preview["subtotal"]), dec!(20.00));
    assert_eq!(money(&preview["vat"]), dec!(1.00));
    assert_eq!(money(&preview["cogs"]), dec!(8.00));
    assert_eq!(money(&preview["total"]), dec!(26.00));
    assert_eq!(money(&preview["lines"][0]["total"]), dec!(20.00));

    let (_, listed) = app.send("GET", &app.orders_uri(), None).await;
    assert_eq!(listed["total"], 0);

    let order = app.create_order(2).await;
    assert_eq!(money(&order["total"]), money(&preview["total"]));

    let mut request = app.order_request(1);
    request["items"] = json!([]);
    let (status, json) = app.send("POST", &uri, Some(request)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "order.empty_items");
}

#[tokio::test]
async fn test_create_order_for_unknown_business() {
    let app = setup().await;
    let uri = format!("/businesses/{}/orders", BusinessId::new());

    let (status, json) = app.send("POST", &uri, Some(app.order_request(1))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "order.business_not_found");
}

#[tokio::test]
async fn test_malformed_requests_use_error_envelope() {
    let app = setup().await;

    let (status, json) = app.send("GET", "/businesses/not-a-uuid/orders", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "request.invalid_id");

    let (status, json) = app
        .send("POST", &app.orders_uri(), Some(json!({ "items": "nope" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "request.invalid_body");

    let uri = format!("{}?status=lost", app.orders_uri());
    let (status, json) = app.send("GET", &uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "request.invalid_query");
}

#[tokio::test]
async fn test_get_order_and_lookup_by_number() {
    let app = setup().await;
    let order = app.create_order(1).await;

    let (status, fetched) = app.send("GET", &app.order_uri(&order), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], order["id"]);

    let uri = format!(
        "{}/by-number/{}",
        app.orders_uri(),
        order["order_number"].as_str().unwrap()
    );
    let (status, by_number) = app.send("GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_number["id"], order["id"]);

    let uri = format!("{}/{}", app.orders_uri(), common::OrderId::new());
    let (status, json) = app.send("GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "order.not_found");
}

#[tokio::test]
async fn test_status_transitions_and_conflicts() {
    let app = setup().await;
    let order = app.create_order(1).await;

    let (status, json) = app.set_status(&order, "shipped").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "order.status_update_not_allowed");
    assert_eq!(json["error"]["details"]["current_status"], "pending");
    assert_eq!(json["error"]["details"]["requested_status"], "shipped");

    let (status, json) = app.set_status(&order, "placed").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "placed");
    assert!(json["placed_at"].is_string());

    let (status, json) = app.set_status(&order, "ready_for_shipment").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ready_for_shipment");
}

#[tokio::test]
async fn test_pay_and_refund() {
    let app = setup().await;
    let order = app.create_order(1).await;
    let pay_uri = format!("{}/pay", app.order_uri(&order));
    let payment = json!({ "payment_method": "credit_card", "payment_reference": "ch_123" });

    let (status, json) = app.send("POST", &pay_uri, Some(payment.clone())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        json["error"]["code"],
        "order.payment_status_invalid_for_order_status"
    );

    app.set_status(&order, "placed").await;
    let (status, json) = app.send("POST", &pay_uri, Some(payment)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["payment_status"], "paid");
    assert_eq!(json["payment_method"], "credit_card");
    assert_eq!(json["payment_reference"], "ch_123");

    let refund_uri = format!("{}/refund", app.order_uri(&order));
    let (status, json) = app.send("POST", &refund_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["payment_status"], "refunded");
}

#[tokio::test]
async fn test_notes_lifecycle() {
    let app = setup().await;
    let order = app.create_order(1).await;
    let notes_uri = format!("{}/notes", app.order_uri(&order));

    let (status, note) = app
        .send("POST", &notes_uri, Some(json!({ "content": "gift wrap" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(note["content"], "gift wrap");

    let (status, json) = app
        .send("POST", &notes_uri, Some(json!({ "content": "   " })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "order.invalid_note");

    let (status, notes) = app.send("GET", &notes_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(notes.as_array().unwrap().len(), 1);

    // A note cannot be deleted through another order.
    let other = app.create_order(1).await;
    let foreign_uri = format!(
        "{}/notes/{}",
        app.order_uri(&other),
        note["id"].as_str().unwrap()
    );
    let (status, json) = app.send("DELETE", &foreign_uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "order.note_not_found");

    let note_uri = format!("{notes_uri}/{}", note["id"].as_str().unwrap());
    let (status, _) = app.send("DELETE", &note_uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_list_filters_and_paginates() {
    let app = setup().await;
    let placed = app.create_order(1).await;
    app.set_status(&placed, "placed").await;
    app.create_order(2).await;
    app.create_order(3).await;

    let uri = format!("{}?status=placed", app.orders_uri());
    let (status, page) = app.send("GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["id"], placed["id"]);

    let uri = format!(
        "{}?page=2&page_size=2&sort_by=total&direction=asc",
        app.orders_uri()
    );
    let (status, page) = app.send("GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 3);
    assert_eq!(page["page"], 2);
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
    assert_eq!(money(&page["items"][0]["total"]), dec!(36.50));
}

#[tokio::test]
async fn test_delete_is_gated_by_status() {
    let app = setup().await;
    let pending = app.create_order(1).await;
    let placed = app.create_order(1).await;
    app.set_status(&placed, "placed").await;

    let (status, json) = app.send("DELETE", &app.order_uri(&placed), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "order.cannot_delete");

    let (status, _) = app.send("DELETE", &app.order_uri(&pending), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.send("GET", &app.order_uri(&pending), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let purge_uri = format!("{}/purge", app.order_uri(&placed));
    let (status, _) = app.send("DELETE", &purge_uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.send("GET", &app.order_uri(&placed), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_analytics_endpoints() {
    let app = setup().await;
    let paid = app.create_order(2).await;
    app.set_status(&paid, "placed").await;
    app.send("POST", &format!("{}/pay", app.order_uri(&paid)), None)
        .await;
    app.create_order(1).await;

    let base = format!("/businesses/{}/analytics", app.business_id);

    let (status, summary) = app.send("GET", &format!("{base}/summary"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["order_count"], 1);
    assert_eq!(summary["items_sold"], 2);
    assert_eq!(money(&summary["revenue"]), dec!(26.00));

    let (status, open) = app
        .send("GET", &format!("{base}/open-orders"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(open["count"], 2);

    let (status, series) = app
        .send(
            "GET",
            &format!("{base}/series/revenue?granularity=monthly"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(series["granularity"], "monthly");

    let uri = format!("{base}/summary?from=2025-02-01T00:00:00Z&to=2025-01-01T00:00:00Z");
    let (status, json) = app.send("GET", &uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "analytics.invalid_range");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup().await;
    app.create_order(1).await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("orders_created_total"));
}
