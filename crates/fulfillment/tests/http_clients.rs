//! HTTP gateway and carrier clients against a mock server.

use std::time::Duration;

use common::{Currency, OrderId};
use domain::{CustomerDetails, Pincode};
use fulfillment::FulfillmentError;
use fulfillment::services::{
    Carrier, CarrierConfig, CarrierPaymentMode, DelhiveryCarrier, GatewayConfig,
    HttpPaymentGateway, PaymentGateway, SessionRequest, ShipmentRequest,
};
use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway(server: &MockServer, timeout: Duration) -> HttpPaymentGateway {
    HttpPaymentGateway::new(GatewayConfig {
        base_url: server.uri(),
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        api_version: "2023-08-01".to_string(),
        timeout,
    })
    .unwrap()
}

fn carrier(server: &MockServer) -> DelhiveryCarrier {
    DelhiveryCarrier::new(CarrierConfig {
        base_url: server.uri(),
        api_token: "carrier-token".to_string(),
        pickup_location: "Main Warehouse".to_string(),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn session_request(order_id: &OrderId) -> SessionRequest {
    let customer = CustomerDetails {
        name: "Asha Rao".to_string(),
        email: "asha@example.com".to_string(),
        phone: "9876543210".to_string(),
        address: None,
    };
    SessionRequest {
        order_id: order_id.clone(),
        amount_minor: 121_200,
        currency: Currency::Inr,
        customer_id: customer.customer_id(),
        customer,
        return_url: format!("https://shop.example.com/orders/{order_id}"),
    }
}

fn shipment_request() -> ShipmentRequest {
    ShipmentRequest {
        consignee_name: "Asha Rao".to_string(),
        address: "12 MG Road".to_string(),
        phone: "9876543210".to_string(),
        pincode: Pincode::parse("560001").unwrap(),
        city: "Bengaluru".to_string(),
        state: "Karnataka".to_string(),
        country: "India".to_string(),
        order_ref: "order_abc".to_string(),
        payment_mode: CarrierPaymentMode::Cod,
        products_desc: "Widget x3".to_string(),
        cod_amount: Some(dec!(1212.00)),
        total_amount: dec!(1212.00),
        weight_kg: dec!(1.5),
    }
}

#[tokio::test]
async fn test_gateway_creates_session() {
    let server = MockServer::start().await;
    let order_id = OrderId::generate();

    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(header("x-client-id", "client-id"))
        .and(header("x-api-version", "2023-08-01"))
        .and(body_string_contains("\"order_amount\":121200"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "order_id": order_id.as_str(),
            "payment_session_id": "session_live_123",
            "order_amount": 121200,
            "order_status": "ACTIVE"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = gateway(&server, Duration::from_secs(5))
        .create_session(&session_request(&order_id))
        .await
        .unwrap();

    assert_eq!(session.order_id, order_id.as_str());
    assert_eq!(session.session_token, "session_live_123");
    assert_eq!(session.amount_minor, 121_200);
}

#[tokio::test]
async fn test_gateway_error_status_is_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(401).set_body_string("authentication failed"))
        .mount(&server)
        .await;

    let result = gateway(&server, Duration::from_secs(5))
        .create_session(&session_request(&OrderId::generate()))
        .await;

    match result {
        Err(FulfillmentError::Upstream { message, .. }) => {
            assert!(message.contains("401"));
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_gateway_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let result = gateway(&server, Duration::from_millis(50))
        .create_session(&session_request(&OrderId::generate()))
        .await;

    assert!(matches!(result, Err(FulfillmentError::Timeout { .. })));
}

#[tokio::test]
async fn test_gateway_fetch_order() {
    let server = MockServer::start().await;
    let order_id = OrderId::generate();

    Mock::given(method("GET"))
        .and(path(format!("/orders/{order_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "order_id": order_id.as_str(),
            "order_status": "PAID",
            "order_amount": 265500,
            "order_currency": "INR",
            "customer_details": {"customer_name": "Asha Rao", "customer_email": "asha@example.com"}
        })))
        .mount(&server)
        .await;

    let client = gateway(&server, Duration::from_secs(5));
    let order = client.fetch_order(&order_id).await.unwrap().unwrap();
    assert_eq!(order.order_status, "PAID");
    assert_eq!(order.amount_minor, 265_500);
    assert_eq!(order.customer_name.as_deref(), Some("Asha Rao"));

    // Anything else is unknown to the mock server.
    let missing = client.fetch_order(&OrderId::generate()).await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_carrier_books_shipment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/cmu/create.json"))
        .and(header("authorization", "Token carrier-token"))
        .and(body_string_contains("format=json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "packages": [{"waybill": "1490810000123", "status": "Success", "remarks": []}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let booking = carrier(&server)
        .create_shipment(&shipment_request())
        .await
        .unwrap();
    assert_eq!(booking.waybill, "1490810000123");
}

#[tokio::test]
async fn test_carrier_rejection_carries_remarks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/cmu/create.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "packages": [{"waybill": "", "remarks": ["Non serviceable pincode"]}],
            "rmk": "An internal error has occurred"
        })))
        .mount(&server)
        .await;

    let result = carrier(&server).create_shipment(&shipment_request()).await;
    match result {
        Err(FulfillmentError::Upstream { message, .. }) => {
            assert_eq!(message, "Non serviceable pincode");
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_carrier_pincode_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/c/api/pin-codes/json/"))
        .and(query_param("filter_codes", "560001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "delivery_codes": [{
                "postal_code": {
                    "pin": 560001,
                    "cod": "Y",
                    "pre_paid": "Y",
                    "max_weight": 25,
                    "max_amount": 50000,
                    "remarks": "",
                    "city": "Bengaluru",
                    "district": "Bangalore",
                    "state_code": "KA",
                    "sun_tat": false
                }
            }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/c/api/pin-codes/json/"))
        .and(query_param("filter_codes", "799001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"delivery_codes": []})))
        .mount(&server)
        .await;

    let client = carrier(&server);
    let info = client
        .pincode_info(&Pincode::parse("560001").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(info.cod);
    assert_eq!(info.max_weight_kg, Some(dec!(25)));
    assert_eq!(info.max_cod_amount, Some(dec!(50000)));

    let none = client
        .pincode_info(&Pincode::parse("799001").unwrap())
        .await
        .unwrap();
    assert!(none.is_none());
}
