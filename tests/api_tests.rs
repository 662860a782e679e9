/// HTTP-level tests: the full router driven with `oneshot` over in-memory
/// stores and fake providers.
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use rust_rental_api::api::{build_rate_limited_router, build_router};
use rust_rental_api::business_store::MemoryBusinessStore;
use rust_rental_api::config::Config;
use rust_rental_api::dispatch::{BulkDispatcher, UnpacedGate};
use rust_rental_api::equipment_store::MemoryEquipmentStore;
use rust_rental_api::errors::AppError;
use rust_rental_api::handlers::AppState;
use rust_rental_api::models::{BusinessProfile, BusinessType};
use rust_rental_api::payment_models::{PaymentIntent, PaymentIntentParams};
use rust_rental_api::payments::{sign_payload, PaymentGateway};
use rust_rental_api::routes::MAX_BODY_BYTES;
use rust_rental_api::analysis::ProfileAnalyzer;
use rust_rental_api::sms::{SentMessage, SmsTransport};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use url::Url;

const WEBHOOK_SECRET: &str = "whsec_api_test";

#[derive(Default)]
struct FakeTransport {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl SmsTransport for FakeTransport {
    async fn send(&self, to: &str, body: &str) -> Result<SentMessage, AppError> {
        let mut sent = self.sent.lock().unwrap();
        if to.ends_with("0000") {
            return Err(AppError::ExternalApiError("unreachable handset".into()));
        }
        sent.push((to.to_string(), body.to_string()));
        Ok(SentMessage {
            sid: format!("SM{}", sent.len()),
            status: "queued".into(),
        })
    }
}

struct FakeGateway;

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_payment_intent(
        &self,
        params: &PaymentIntentParams,
    ) -> Result<PaymentIntent, AppError> {
        Ok(PaymentIntent {
            id: format!("pi_{}", params.amount_minor),
            client_secret: "pi_secret".into(),
            status: Some("requires_payment_method".into()),
        })
    }
}

struct FakeAnalyzer;

#[async_trait]
impl ProfileAnalyzer for FakeAnalyzer {
    async fn analyze(&self, website: &Url) -> Result<BusinessProfile, AppError> {
        Ok(BusinessProfile {
            name: "Lakeside Tool Rental".into(),
            business_type: BusinessType::ToolRental,
            industry: "Tool Rental".into(),
            contact: Default::default(),
            description: format!("Profile of {}", website),
            features: vec![],
            branding: Default::default(),
            confidence_score: 75,
            business_details: json!({}),
            reputation_score: 4.0,
            web_intelligence: json!({}),
        })
    }
}

struct TestApp {
    router: Router,
    transport: Arc<FakeTransport>,
}

fn test_app() -> TestApp {
    let transport = Arc::new(FakeTransport::default());
    let config = Config {
        stripe_webhook_secret: Some(WEBHOOK_SECRET.into()),
        ..Config::default()
    };

    let state = AppState {
        config,
        businesses: Arc::new(MemoryBusinessStore::new()),
        equipment: Arc::new(MemoryEquipmentStore::new()),
        sms: Some(BulkDispatcher::new(transport.clone(), Arc::new(UnpacedGate), 1)),
        payments: Some(Arc::new(FakeGateway)),
        analyzer: Some(Arc::new(FakeAnalyzer)),
    };

    TestApp {
        router: build_router(Arc::new(state)),
        transport,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = test_app();
    let (status, body) = send(&app.router, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_equipment_without_daily_rate_is_rejected_and_not_stored() {
    let app = test_app();

    let (status, body) = send(
        &app.router,
        json_request(
            "POST",
            "/api/equipment",
            json!({ "business_id": "biz-1", "name": "Mini excavator", "category": "excavators" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "validation");
    assert!(body["error"].as_str().unwrap().contains("daily_rate"));

    let (status, body) = send(&app.router, get("/api/equipment?business_id=biz-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
    assert_eq!(body["pagination"]["total"], 0);
}

#[tokio::test]
async fn test_equipment_create_then_list() {
    let app = test_app();

    for name in ["Scissor lift", "Boom lift", "Pressure washer"] {
        let (status, body) = send(
            &app.router,
            json_request(
                "POST",
                "/api/equipment",
                json!({
                    "business_id": "biz-1",
                    "name": name,
                    "category": if name.ends_with("lift") { "aerial" } else { "cleaning" },
                    "daily_rate": 120.0
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["status"], "available");
    }

    let (status, body) = send(
        &app.router,
        get("/api/equipment?business_id=biz-1&category=aerial&limit=1"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(
        body["pagination"],
        json!({ "page": 1, "limit": 1, "total": 2, "totalPages": 2 })
    );

    let (_, other) = send(&app.router, get("/api/equipment?business_id=biz-2")).await;
    assert_eq!(other["pagination"]["total"], 0);
}

#[tokio::test]
async fn test_equipment_list_requires_business_id() {
    let app = test_app();
    let (status, body) = send(&app.router, get("/api/equipment?category=aerial")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("business_id"));
}

#[tokio::test]
async fn test_unknown_business_is_404() {
    let app = test_app();
    let (status, body) = send(&app.router, get("/api/business/does-not-exist")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "success": false, "error": "Business not found", "kind": "not_found" }));
}

#[tokio::test]
async fn test_business_lifecycle() {
    let app = test_app();

    let (status, created) = send(
        &app.router,
        json_request(
            "POST",
            "/api/businesses",
            json!({ "websiteUrl": "https://lakeside-tools.example.com" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(created["data"]["business"]["status"], "setup");
    assert_eq!(created["data"]["business"]["type"], "tool_rental");

    let (status, body) = send(
        &app.router,
        json_request(
            "PUT",
            &format!("/api/business/{}/status", id),
            json!({ "status": "active" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "active");

    let (status, detail) = send(&app.router, get(&format!("/api/business/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["data"]["business"]["name"], "Lakeside Tool Rental");
    assert_eq!(detail["data"]["stats"]["active"], 1);
    assert_eq!(detail["data"]["stats"]["totalRevenue"], 45_000);
    assert!(detail["data"]["lastUpdated"].is_string());

    let (_, list) = send(&app.router, get("/api/businesses")).await;
    assert_eq!(list["data"]["businesses"].as_array().unwrap().len(), 1);
    assert_eq!(list["data"]["stats"]["total"], 1);
}

#[tokio::test]
async fn test_business_status_validation() {
    let app = test_app();

    let (status, _) = send(
        &app.router,
        json_request("PUT", "/api/business/nope/status", json!({ "status": "paused" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app.router,
        json_request("PUT", "/api/business/nope/status", json!({ "status": "inactive" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_business_rejects_bad_url() {
    let app = test_app();
    let (status, body) = send(
        &app.router,
        json_request("POST", "/api/businesses", json!({ "websiteUrl": "not a url" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");

    let (_, list) = send(&app.router, get("/api/businesses")).await;
    assert_eq!(list["data"]["stats"]["total"], 0);
}

#[tokio::test]
async fn test_malformed_json_uses_error_envelope() {
    let app = test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/equipment")
        .header("content-type", "application/json")
        .body(Body::from("{\"business_id\": "))
        .unwrap();

    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_oversized_body_uses_error_envelope() {
    let app = test_app();
    let name = "x".repeat(2 * MAX_BODY_BYTES);
    let request = json_request(
        "POST",
        "/api/equipment",
        json!({ "business_id": "biz-1", "name": name, "category": "tools", "daily_rate": 10.0 }),
    );

    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "validation");

    let (status, body) = send(&app.router, webhook_request(&name, "t=1,v1=00")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
}

#[tokio::test]
async fn test_rate_limited_requests_use_error_envelope() {
    let state = Arc::new(AppState {
        config: Config::default(),
        businesses: Arc::new(MemoryBusinessStore::new()),
        equipment: Arc::new(MemoryEquipmentStore::new()),
        sms: None,
        payments: None,
        analyzer: None,
    });
    let router = build_rate_limited_router(state, 60, 1).unwrap();

    let from_client = || {
        Request::builder()
            .uri("/api/businesses")
            .header("x-forwarded-for", "203.0.113.7")
            .body(Body::empty())
            .unwrap()
    };

    let (status, _) = send(&router, from_client()).await;
    assert_eq!(status, StatusCode::OK);

    let response = router.clone().oneshot(from_client()).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("x-ratelimit-after"));
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "rate_limited");
}

#[tokio::test]
async fn test_single_sms_renders_template() {
    let app = test_app();
    let (status, body) = send(
        &app.router,
        json_request(
            "POST",
            "/api/notifications/sms",
            json!({
                "to": "(555) 222-3333",
                "type": "pickup_reminder",
                "businessId": "biz-1",
                "templateArgs": ["Sam", "generator", "Monday"]
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "messageId": "SM1", "status": "queued" }));

    let sent = app.transport.sent.lock().unwrap();
    assert_eq!(sent[0].0, "+15552223333");
    assert!(sent[0].1.contains("generator"));
}

#[tokio::test]
async fn test_single_sms_requires_message() {
    let app = test_app();
    let (status, _) = send(
        &app.router,
        json_request(
            "POST",
            "/api/notifications/sms",
            json!({ "to": "5552223333", "type": "custom", "businessId": "biz-1" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.transport.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_bulk_sms_reports_every_recipient() {
    let app = test_app();
    let (status, body) = send(
        &app.router,
        json_request(
            "PUT",
            "/api/notifications/sms",
            json!({
                "recipients": ["555-111-2222", "555-111-0000", "15551113333"],
                "message": "We are closed Monday",
                "businessId": "biz-1"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["total"], 3);
    assert_eq!(body["successful"], 2);
    assert_eq!(body["failed"], 1);
    assert_eq!(body["results"][1]["phone"], "555-111-0000");
    assert_eq!(body["results"][1]["success"], false);
    assert_eq!(body["results"][2]["phone"], "15551113333");
}

#[tokio::test]
async fn test_bulk_sms_requires_recipients() {
    let app = test_app();
    let (status, _) = send(
        &app.router,
        json_request(
            "PUT",
            "/api/notifications/sms",
            json!({ "recipients": [], "message": "hi", "businessId": "biz-1" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unconfigured_provider_is_500() {
    let state = AppState::from_config(Config::default(), None).unwrap();
    let router = build_router(Arc::new(state));

    let (status, body) = send(
        &router,
        json_request(
            "POST",
            "/api/notifications/sms",
            json!({ "to": "5552223333", "message": "hi", "businessId": "biz-1" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Twilio not configured");
}

#[tokio::test]
async fn test_create_payment_intent() {
    let app = test_app();
    let (status, body) = send(
        &app.router,
        json_request(
            "POST",
            "/api/payments/create-intent",
            json!({ "amount": 99.99, "customerId": "cus_1", "rentalId": "r_1", "businessId": "biz-1" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "success": true, "clientSecret": "pi_secret", "paymentIntentId": "pi_9999" })
    );

    let (status, _) = send(
        &app.router,
        json_request(
            "POST",
            "/api/payments/create-intent",
            json!({ "amount": 0, "customerId": "cus_1", "rentalId": "r_1", "businessId": "biz-1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

fn webhook_request(payload: &str, signature: &str) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri("/api/payments/create-intent")
        .header("content-type", "application/json")
        .header("stripe-signature", signature)
        .body(Body::from(payload.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_webhook_with_valid_signature() {
    let app = test_app();
    let payload = json!({
        "id": "evt_1",
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": "pi_1", "metadata": { "rentalId": "r_1" } } }
    })
    .to_string();
    let now = chrono::Utc::now().timestamp();
    let signature = format!(
        "t={},v1={}",
        now,
        sign_payload(payload.as_bytes(), WEBHOOK_SECRET, now).unwrap()
    );

    let (status, body) = send(&app.router, webhook_request(&payload, &signature)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "received": true,
            "eventType": "payment_intent.succeeded",
            "handled": true,
            "paymentStatus": "succeeded"
        })
    );
}

#[tokio::test]
async fn test_webhook_rejects_bad_signature() {
    let app = test_app();
    let payload = r#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{}}}"#;
    let now = chrono::Utc::now().timestamp();
    let signature = format!("t={},v1={}", now, "00".repeat(32));

    let (status, body) = send(&app.router, webhook_request(payload, &signature)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "signature");

    for extreme in [i64::MIN, i64::MAX] {
        let signature = format!("t={},v1={}", extreme, "00".repeat(32));
        let (status, body) = send(&app.router, webhook_request(payload, &signature)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "signature");
    }

    let missing = Request::builder()
        .method("PUT")
        .uri("/api/payments/create-intent")
        .body(Body::from(payload))
        .unwrap();
    let (status, _) = send(&app.router, missing).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
