mod common;

use axum::http::StatusCode;
use common::{order_payload, sign_client_payment, sign_webhook, TestApp, TEST_KEY_ID};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use storefront_api::entities::{order, payment, payment_event};
use uuid::Uuid;

async fn place_order(app: &TestApp, token: &str) -> Uuid {
    let product_id = app.seed_product("Indigo Kurta", 50_000, 10).await;
    let (status, body) = app
        .post_json("/api/v1/orders", Some(token), &order_payload(product_id, 2))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    body["orderId"].as_str().unwrap().parse().unwrap()
}

async fn create_intent(app: &TestApp, token: &str, order_id: Uuid) -> String {
    let (status, body) = app
        .post_json(
            "/api/v1/payments/create",
            Some(token),
            &serde_json::json!({ "orderId": order_id }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    body["providerOrderId"].as_str().unwrap().to_string()
}

fn capture_body(event_id: &str, provider_order_id: &str, payment_id: &str) -> String {
    serde_json::json!({
        "id": event_id,
        "event": "payment.captured",
        "created_at": 1_700_000_000,
        "payload": {
            "payment": {"entity": {"id": payment_id, "order_id": provider_order_id}}
        }
    })
    .to_string()
}

async fn fetch_order(app: &TestApp, order_id: Uuid) -> order::Model {
    order::Entity::find_by_id(order_id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap()
}

async fn fetch_payment(app: &TestApp, provider_order_id: &str) -> payment::Model {
    payment::Entity::find()
        .filter(payment::Column::ProviderOrderId.eq(provider_order_id))
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap()
}

async fn fetch_event(app: &TestApp, event_id: &str) -> payment_event::Model {
    payment_event::Entity::find()
        .filter(payment_event::Column::EventId.eq(event_id))
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn intent_creation_returns_checkout_fields_and_reuses_live_intents() {
    let app = TestApp::spawn().await;
    let token = app.token_for(Uuid::new_v4());
    let order_id = place_order(&app, &token).await;

    let (status, body) = app
        .post_json(
            "/api/v1/payments/create",
            Some(&token),
            &serde_json::json!({ "orderId": order_id }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["providerOrderId"], "order_gw_1");
    assert_eq!(body["amount"], 100_000);
    assert_eq!(body["currency"], "INR");
    assert_eq!(body["keyId"], TEST_KEY_ID);
    assert_eq!(body["orderId"], order_id.to_string());

    // A retried checkout gets the same intent back, not a second one.
    let reused = create_intent(&app, &token, order_id).await;
    assert_eq!(reused, "order_gw_1");
    assert_eq!(app.gateway.intent_calls(), 1);

    let rows = payment::Entity::find()
        .filter(payment::Column::OrderId.eq(order_id))
        .all(&*app.db)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, "created");
    assert_eq!(rows[0].amount, 100_000);
}

#[tokio::test]
async fn intent_creation_enforces_ownership_and_payability() {
    let app = TestApp::spawn().await;
    let owner = app.token_for(Uuid::new_v4());
    let stranger = app.token_for(Uuid::new_v4());
    let order_id = place_order(&app, &owner).await;

    let (status, _) = app
        .post_json(
            "/api/v1/payments/create",
            Some(&stranger),
            &serde_json::json!({ "orderId": order_id }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post_json(
            "/api/v1/payments/create",
            Some(&owner),
            &serde_json::json!({ "orderId": Uuid::new_v4() }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn valid_client_confirmation_authorizes_without_settling() {
    let app = TestApp::spawn().await;
    let token = app.token_for(Uuid::new_v4());
    let order_id = place_order(&app, &token).await;
    let provider_order_id = create_intent(&app, &token, order_id).await;

    let signature = sign_client_payment(&provider_order_id, "pay_123");
    let (status, body) = app
        .post_json(
            "/api/v1/payments/verify",
            Some(&token),
            &serde_json::json!({
                "orderId": order_id,
                "providerOrderId": provider_order_id,
                "providerPaymentId": "pay_123",
                "providerSignature": signature
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["message"], "Payment received. Awaiting confirmation.");

    let row = fetch_payment(&app, &provider_order_id).await;
    assert_eq!(row.status, "authorized");
    assert_eq!(row.provider_payment_id.as_deref(), Some("pay_123"));

    // The client path never settles: order state is untouched.
    let stored = fetch_order(&app, order_id).await;
    assert_eq!(stored.payment_status, "unpaid");
    assert_eq!(stored.status, "pending");
}

#[tokio::test]
async fn tampered_client_confirmation_is_rejected() {
    let app = TestApp::spawn().await;
    let token = app.token_for(Uuid::new_v4());
    let order_id = place_order(&app, &token).await;
    let provider_order_id = create_intent(&app, &token, order_id).await;

    let signature = sign_client_payment(&provider_order_id, "pay_other");
    let (status, body) = app
        .post_json(
            "/api/v1/payments/verify",
            Some(&token),
            &serde_json::json!({
                "orderId": order_id,
                "providerOrderId": provider_order_id,
                "providerPaymentId": "pay_123",
                "providerSignature": signature
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Bad request: Invalid payment signature.");

    let row = fetch_payment(&app, &provider_order_id).await;
    assert_eq!(row.status, "created");
}

#[tokio::test]
async fn capture_webhook_settles_payment_order_and_ledger() {
    let app = TestApp::spawn().await;
    let token = app.token_for(Uuid::new_v4());
    let order_id = place_order(&app, &token).await;
    let provider_order_id = create_intent(&app, &token, order_id).await;

    let body = capture_body("evt_1", &provider_order_id, "pay_1");
    let (status, ack) = app.post_webhook(&body, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["status"], "processed");

    let row = fetch_payment(&app, &provider_order_id).await;
    assert_eq!(row.status, "captured");
    assert_eq!(row.provider_payment_id.as_deref(), Some("pay_1"));

    let stored = fetch_order(&app, order_id).await;
    assert_eq!(stored.payment_status, "paid");
    assert_eq!(stored.status, "confirmed");
    assert!(stored.paid_at.is_some());

    let ledger = fetch_event(&app, "evt_1").await;
    assert_eq!(ledger.processing_status, "processed");
    assert_eq!(ledger.order_id, Some(order_id));
    assert!(ledger.processed_at.is_some());
}

#[tokio::test]
async fn duplicate_delivery_is_acknowledged_without_reprocessing() {
    let app = TestApp::spawn().await;
    let token = app.token_for(Uuid::new_v4());
    let order_id = place_order(&app, &token).await;
    let provider_order_id = create_intent(&app, &token, order_id).await;

    let body = capture_body("evt_dup", &provider_order_id, "pay_1");
    let (status, ack) = app.post_webhook(&body, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["status"], "processed");

    let (status, ack) = app.post_webhook(&body, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["status"], "duplicate");

    let rows = payment_event::Entity::find()
        .filter(payment_event::Column::EventId.eq("evt_dup"))
        .all(&*app.db)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn late_failure_never_reverts_a_paid_order() {
    let app = TestApp::spawn().await;
    let token = app.token_for(Uuid::new_v4());
    let order_id = place_order(&app, &token).await;
    let provider_order_id = create_intent(&app, &token, order_id).await;

    let (status, _) = app
        .post_webhook(&capture_body("evt_cap", &provider_order_id, "pay_1"), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let failure = serde_json::json!({
        "id": "evt_fail",
        "event": "payment.failed",
        "created_at": 1_700_000_100,
        "payload": {
            "payment": {"entity": {"id": "pay_1", "order_id": provider_order_id}}
        }
    })
    .to_string();
    let (status, ack) = app.post_webhook(&failure, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["status"], "processed");

    let stored = fetch_order(&app, order_id).await;
    assert_eq!(stored.payment_status, "paid");
    assert_eq!(stored.status, "confirmed");
    let row = fetch_payment(&app, &provider_order_id).await;
    assert_eq!(row.status, "captured");
}

#[tokio::test]
async fn failure_webhook_marks_order_failed_and_allows_retry() {
    let app = TestApp::spawn().await;
    let token = app.token_for(Uuid::new_v4());
    let order_id = place_order(&app, &token).await;
    let provider_order_id = create_intent(&app, &token, order_id).await;

    let failure = serde_json::json!({
        "id": "evt_fail_first",
        "event": "payment.failed",
        "created_at": 1_700_000_000,
        "payload": {
            "payment": {"entity": {"id": "pay_1", "order_id": provider_order_id}}
        }
    })
    .to_string();
    let (status, _) = app.post_webhook(&failure, None).await;
    assert_eq!(status, StatusCode::OK);

    let stored = fetch_order(&app, order_id).await;
    assert_eq!(stored.payment_status, "failed");
    assert_eq!(fetch_payment(&app, &provider_order_id).await.status, "failed");

    // A failed order is payable again; the dead intent is not reused.
    let second_intent = create_intent(&app, &token, order_id).await;
    assert_ne!(second_intent, provider_order_id);
    assert_eq!(app.gateway.intent_calls(), 2);
}

#[tokio::test]
async fn unknown_event_types_are_recorded_and_ignored() {
    let app = TestApp::spawn().await;

    let body = serde_json::json!({
        "id": "evt_refund",
        "event": "refund.processed",
        "created_at": 1_700_000_000
    })
    .to_string();
    let (status, ack) = app.post_webhook(&body, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["status"], "ignored");

    let ledger = fetch_event(&app, "evt_refund").await;
    assert_eq!(ledger.processing_status, "ignored");
    assert_eq!(ledger.event_type, "refund.processed");
}

#[tokio::test]
async fn unresolvable_capture_fails_and_is_retried_in_full() {
    let app = TestApp::spawn().await;

    let body = capture_body("evt_orphan", "order_gw_missing", "pay_x");
    let (status, _) = app.post_webhook(&body, None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let ledger = fetch_event(&app, "evt_orphan").await;
    assert_eq!(ledger.processing_status, "failed");
    assert!(ledger.error.is_some());

    // The provider's redelivery gets a full second attempt, not a dedup ack.
    let (status, _) = app.post_webhook(&body, None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn webhook_signature_is_mandatory_and_verified() {
    let app = TestApp::spawn().await;
    let body = capture_body("evt_sig", "order_gw_1", "pay_1");

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/v1/webhooks/razorpay")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.clone()))
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.router.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post_webhook(&body, Some(&sign_webhook("wrong_secret", &body)))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Nothing reached the ledger.
    assert_eq!(
        payment_event::Entity::find().all(&*app.db).await.unwrap().len(),
        0
    );
}

#[tokio::test]
async fn intent_creation_is_rate_limited_per_client() {
    let app = TestApp::spawn().await;
    let token = app.token_for(Uuid::new_v4());
    let payload = serde_json::json!({ "orderId": Uuid::new_v4() });

    // The limit is checked before the order lookup, so 404s still count.
    for _ in 0..10 {
        let (status, _) = app
            .post_json("/api/v1/payments/create", Some(&token), &payload)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/v1/payments/create")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(axum::body::Body::from(payload.to_string()))
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.router.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap();
    assert!(retry_after > 0 && retry_after <= 60);
}

#[tokio::test]
async fn signed_but_unparseable_body_is_a_bad_request() {
    let app = TestApp::spawn().await;
    let body = "not json at all";
    let (status, _) = app.post_webhook(body, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_event_id_is_synthesized_for_dedup() {
    let app = TestApp::spawn().await;
    let token = app.token_for(Uuid::new_v4());
    let order_id = place_order(&app, &token).await;
    let provider_order_id = create_intent(&app, &token, order_id).await;

    let body = serde_json::json!({
        "event": "payment.captured",
        "created_at": 1_700_000_000,
        "payload": {
            "payment": {"entity": {"id": "pay_syn", "order_id": provider_order_id}}
        }
    })
    .to_string();

    let (status, ack) = app.post_webhook(&body, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["status"], "processed");

    // A byte-identical redelivery synthesizes the same id and dedups.
    let (status, ack) = app.post_webhook(&body, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["status"], "duplicate");

    let ledger = fetch_event(&app, "payment.captured:pay_syn:1700000000").await;
    assert_eq!(ledger.processing_status, "processed");
}
