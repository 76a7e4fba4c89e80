//! Integration tests for the API server.

use std::sync::OnceLock;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use fulfillment::SignatureVerifier;
use fulfillment::services::{InMemoryCarrier, InMemoryPaymentGateway, PincodeInfo};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::InMemoryOrderStore;
use serde_json::{Value, json};
use tower::ServiceExt;

use api::config::Config;
use api::routes::webhooks::{SIGNATURE_HEADER, TIMESTAMP_HEADER};

const SECRET: &str = "whsec_api_test";
const TIMESTAMP: &str = "1700000000";

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

fn config() -> Config {
    Config {
        webhook_secret: SECRET.to_string(),
        ..Config::default()
    }
}

fn setup() -> axum::Router {
    let state = api::create_default_state(&config(), InMemoryOrderStore::new());
    api::create_app(state, get_metrics_handle())
}

fn setup_with_carrier(carrier: InMemoryCarrier) -> axum::Router {
    let state = api::create_state(
        &config(),
        InMemoryOrderStore::new(),
        InMemoryPaymentGateway::new(),
        carrier,
    );
    api::create_app(state, get_metrics_handle())
}

fn order_body() -> Value {
    json!({
        "amountMajorUnits": "1212.00",
        "customer": {
            "name": "Asha Rao",
            "email": "asha@example.com",
            "phone": "9876543210",
            "address": {
                "line1": "12 MG Road",
                "city": "Bengaluru",
                "state": "Karnataka",
                "pincode": "560001"
            }
        },
        "items": [{
            "productId": "SKU-001",
            "name": "Widget",
            "unitPriceMajorUnits": "300.00",
            "quantity": 3
        }],
        "returnTarget": "https://shop.example.com/orders/{order_id}"
    })
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn signed_webhook(body: &[u8], signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks/payment")
        .header("content-type", "application/json")
        .header(TIMESTAMP_HEADER, TIMESTAMP);
    if let Some(signature) = signature {
        builder = builder.header(SIGNATURE_HEADER, signature);
    }
    builder.body(Body::from(body.to_vec())).unwrap()
}

fn webhook(order_id: &str, status: &str) -> Request<Body> {
    let body = serde_json::to_vec(&json!({
        "orderId": order_id,
        "orderStatus": status,
        "eventType": "PAYMENT_UPDATE"
    }))
    .unwrap();
    let signature = SignatureVerifier::new(SECRET).sign(TIMESTAMP, &body).unwrap();
    signed_webhook(&body, Some(&signature))
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn create_order(app: &axum::Router) -> String {
    let response = app
        .clone()
        .oneshot(post_json("/orders", &order_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = json_body(response).await;
    json["orderId"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();

    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "order-fulfillment");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();
    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_create_order() {
    let app = setup();

    let response = app
        .oneshot(post_json("/orders", &order_body()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = json_body(response).await;
    assert!(json["orderId"].as_str().unwrap().starts_with("order_"));
    assert_eq!(json["amountMinorUnits"], 121_200);
    assert_eq!(json["gatewaySessionToken"], "session_0001");
}

#[tokio::test]
async fn test_create_order_validation() {
    let app = setup();

    let mut body = order_body();
    body["customer"]["email"] = json!("");
    let response = app.clone().oneshot(post_json("/orders", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert!(json["error"].as_str().unwrap().contains("email"));

    let mut body = order_body();
    body["amountMajorUnits"] = json!("999.00");
    let response = app.clone().oneshot(post_json("/orders", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut body = order_body();
    body["items"] = json!([]);
    let response = app.oneshot(post_json("/orders", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rejected_bodies_use_the_error_shape() {
    let app = setup();

    let request = Request::builder()
        .method("POST")
        .uri("/orders")
        .header("content-type", "application/json")
        .body(Body::from("{\"customer\": "))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert!(json["error"].is_string());

    let mut body = order_body();
    body["items"][0]["quantity"] = json!("three");
    let response = app.clone().oneshot(post_json("/orders", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert!(json["error"].is_string());

    let response = app
        .oneshot(get("/pincodes/560001/serviceability?cod=maybe"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_create_and_get_order() {
    let app = setup();
    let order_id = create_order(&app).await;

    let response = app
        .oneshot(get(&format!("/orders/{order_id}")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["orderId"], order_id.as_str());
    assert_eq!(json["paymentStatus"], "ACTIVE");
    assert_eq!(json["source"], "cache");
    assert_eq!(json["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_get_unknown_and_invalid_order() {
    let app = setup();

    let response = app
        .clone()
        .oneshot(get("/orders/order_does_not_exist"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.oneshot(get("/orders/not%20an%20id")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_paid_webhook_books_shipment() {
    let app = setup();
    let order_id = create_order(&app).await;

    let response = app.clone().oneshot(webhook(&order_id, "PAID")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "applied");

    let response = app
        .clone()
        .oneshot(get(&format!("/orders/{order_id}")))
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["source"], "store");
    assert_eq!(json["paymentStatus"], "PAID");
    assert_eq!(json["shipmentStatus"], "CREATED");
    assert!(json["waybill"].as_str().is_some_and(|w| !w.is_empty()));

    // Redelivery is acknowledged without another booking.
    let response = app.oneshot(webhook(&order_id, "PAID")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "already_processed");
}

#[tokio::test]
async fn test_webhook_signature_required() {
    let app = setup();
    let order_id = create_order(&app).await;

    let body = serde_json::to_vec(&json!({"orderId": order_id, "orderStatus": "PAID"})).unwrap();
    let response = app
        .clone()
        .oneshot(signed_webhook(&body, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let forged = SignatureVerifier::new("not-the-secret")
        .sign(TIMESTAMP, &body)
        .unwrap();
    let response = app
        .clone()
        .oneshot(signed_webhook(&body, Some(&forged)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(get(&format!("/orders/{order_id}")))
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["paymentStatus"], "ACTIVE");
}

#[tokio::test]
async fn test_webhook_malformed_body() {
    let app = setup();
    let body = b"not json".to_vec();
    let signature = SignatureVerifier::new(SECRET).sign(TIMESTAMP, &body).unwrap();

    let response = app
        .oneshot(signed_webhook(&body, Some(&signature)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_for_unknown_order_is_acknowledged() {
    let app = setup();
    let response = app
        .oneshot(webhook("order_from_elsewhere", "PAID"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "unknown_order");
}

#[tokio::test]
async fn test_pincode_serviceability() {
    let carrier = InMemoryCarrier::new();
    carrier
        .add_pincode(PincodeInfo {
            pincode: "560001".to_string(),
            cod: false,
            prepaid: true,
            city: "Bengaluru".to_string(),
            ..PincodeInfo::default()
        })
        .await;
    let app = setup_with_carrier(carrier);

    let response = app
        .clone()
        .oneshot(get("/pincodes/560001/serviceability?weight_kg=1.5"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["serviceable"], true);
    assert_eq!(json["deliveryEstimate"]["minDays"], 1);
    assert_eq!(json["deliveryEstimate"]["maxDays"], 3);

    let response = app
        .clone()
        .oneshot(get("/pincodes/560001/serviceability?weight_kg=1&cod=true"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["serviceable"], false);
    assert_eq!(json["reason"]["code"], "cod_unavailable");

    let response = app
        .oneshot(get("/pincodes/56001/serviceability"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
