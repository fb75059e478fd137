//! Shared integration-test harness: an in-memory SQLite database, a scripted
//! payment gateway and a router exercised through `tower::ServiceExt`.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, EntityTrait, Set};
use serde_json::Value;
use sha2::Sha256;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use storefront_api::{
    auth::AuthService,
    config::AppConfig,
    db::{run_migrations, DbPool},
    entities::product,
    errors::ServiceError,
    events::{process_events, EventSender},
    gateway::{GatewayIntent, PaymentGateway},
    rate_limiter::RateLimiter,
    AppServices, AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_KEY_ID: &str = "rzp_test_key";
pub const TEST_KEY_SECRET: &str = "test_gateway_key_secret";
pub const TEST_WEBHOOK_SECRET: &str = "test_webhook_secret";
const TEST_JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";

/// Gateway double: mints deterministic intent ids and counts calls so tests
/// can assert intent reuse.
pub struct MockGateway {
    calls: AtomicU64,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            calls: AtomicU64::new(0),
        }
    }

    pub fn intent_calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn key_id(&self) -> Result<String, ServiceError> {
        Ok(TEST_KEY_ID.to_string())
    }

    fn key_secret(&self) -> Result<String, ServiceError> {
        Ok(TEST_KEY_SECRET.to_string())
    }

    async fn create_intent(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayIntent, ServiceError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("order_gw_{n}");
        Ok(GatewayIntent {
            id: id.clone(),
            amount,
            currency: currency.to_string(),
            raw: serde_json::json!({
                "id": id,
                "amount": amount,
                "currency": currency,
                "receipt": receipt,
                "status": "created"
            }),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub db: Arc<DbPool>,
    pub auth: Arc<AuthService>,
    pub gateway: Arc<MockGateway>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        // One pooled connection so every handle sees the same in-memory
        // database.
        let mut options = ConnectOptions::new("sqlite::memory:".to_string());
        options.max_connections(1).sqlx_logging(false);
        let db = Arc::new(Database::connect(options).await.expect("sqlite connect"));
        run_migrations(&db).await.expect("migrations");

        let mut config = AppConfig::new(
            "sqlite::memory:".to_string(),
            TEST_JWT_SECRET.to_string(),
            "test".to_string(),
        );
        config.razorpay_key_id = Some(TEST_KEY_ID.to_string());
        config.razorpay_key_secret = Some(TEST_KEY_SECRET.to_string());
        config.razorpay_webhook_secret = Some(TEST_WEBHOOK_SECRET.to_string());

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        tokio::spawn(process_events(event_rx));

        let gateway = Arc::new(MockGateway::new());
        let services = AppServices::build(
            db.clone(),
            &config,
            gateway.clone(),
            event_sender.clone(),
        );
        let auth = Arc::new(AuthService::new(&config.jwt_secret, 3600));

        let state = AppState {
            db: db.clone(),
            config: Arc::new(config),
            event_sender,
            services,
            rate_limiter: RateLimiter::in_memory(),
            auth: auth.clone(),
        };

        Self {
            router: storefront_api::app_router(state),
            db,
            auth,
            gateway,
        }
    }

    pub fn token_for(&self, user_id: Uuid) -> String {
        self.auth
            .generate_token(user_id, Some("buyer@example.com".to_string()))
            .expect("token")
    }

    pub async fn seed_product(&self, title: &str, price: i64, stock: i32) -> Uuid {
        let id = Uuid::new_v4();
        product::ActiveModel {
            id: Set(id),
            title: Set(title.to_string()),
            price: Set(price),
            stock: Set(stock),
            active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed product");
        id
    }

    pub async fn deactivate_product(&self, product_id: Uuid) {
        let mut model: product::ActiveModel = product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await
            .expect("find product")
            .expect("product exists")
            .into();
        model.active = Set(false);
        model.update(&*self.db).await.expect("deactivate");
    }

    pub async fn post_json(
        &self,
        path: &str,
        token: Option<&str>,
        body: &Value,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap();
        Self::run(self.router.clone(), request).await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("GET").uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty()).unwrap();
        Self::run(self.router.clone(), request).await
    }

    /// Delivers a webhook body, signed unless an explicit signature is given.
    pub async fn post_webhook(
        &self,
        body: &str,
        signature: Option<&str>,
    ) -> (StatusCode, Value) {
        let signed;
        let signature = match signature {
            Some(sig) => sig,
            None => {
                signed = sign_webhook(TEST_WEBHOOK_SECRET, body);
                &signed
            }
        };
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/webhooks/razorpay")
            .header("content-type", "application/json")
            .header("x-razorpay-signature", signature)
            .body(Body::from(body.to_string()))
            .unwrap();
        Self::run(self.router.clone(), request).await
    }

    async fn run(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.expect("request");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }
}

pub fn sign_webhook(secret: &str, body: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Client confirmation signature over `{provider_order_id}|{payment_id}`.
pub fn sign_client_payment(provider_order_id: &str, payment_id: &str) -> String {
    sign_webhook(
        TEST_KEY_SECRET,
        &format!("{provider_order_id}|{payment_id}"),
    )
}

pub fn order_payload(product_id: Uuid, qty: i32) -> Value {
    serde_json::json!({
        "cartItems": [{"productId": product_id, "qty": qty}],
        "shipping": {
            "name": "Asha Verma",
            "phone": "+91 98765 43210",
            "addressLine1": "14 MG Road",
            "city": "Lucknow",
            "state": "Uttar Pradesh",
            "pincode": "226001",
            "country": "India"
        },
        "paymentMethod": "razorpay"
    })
}
