//! Outbound payment gateway integration.

pub mod signature;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, instrument};

/// Provider key used on payments and payment_events rows.
pub const PROVIDER: &str = "razorpay";

/// A gateway-side payment intent awaiting capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    /// Full provider response, stored on the payment row for audit.
    pub raw: serde_json::Value,
}

/// Outbound calls to the payment gateway.
///
/// The trait seam exists so tests can reconcile against a scripted gateway
/// without network access.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Public key id handed to the checkout UI.
    fn key_id(&self) -> Result<String, ServiceError>;

    /// Secret used to sign client payment confirmations.
    fn key_secret(&self) -> Result<String, ServiceError>;

    /// Creates a gateway-side intent for the exact order total.
    async fn create_intent(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayIntent, ServiceError>;
}

/// Razorpay Orders API client.
pub struct RazorpayClient {
    http: reqwest::Client,
    api_base: String,
    key_id: Option<String>,
    key_secret: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    payment_capture: u8,
}

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    id: String,
    amount: i64,
    currency: String,
}

impl RazorpayClient {
    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.gateway_timeout_secs))
            .build()
            .map_err(|e| {
                ServiceError::InternalError(format!("failed to build gateway client: {e}"))
            })?;

        Ok(Self {
            http,
            api_base: config.razorpay_api_base.clone(),
            key_id: config.razorpay_key_id.clone(),
            key_secret: config.razorpay_key_secret.clone(),
        })
    }

    fn credentials(&self) -> Result<(&str, &str), ServiceError> {
        match (self.key_id.as_deref(), self.key_secret.as_deref()) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                Ok((id, secret))
            }
            _ => Err(ServiceError::ExternalServiceError(
                "Payment gateway is not configured.".to_string(),
            )),
        }
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    fn key_id(&self) -> Result<String, ServiceError> {
        self.credentials().map(|(id, _)| id.to_string())
    }

    fn key_secret(&self) -> Result<String, ServiceError> {
        self.credentials().map(|(_, secret)| secret.to_string())
    }

    #[instrument(skip(self))]
    async fn create_intent(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayIntent, ServiceError> {
        let (key_id, key_secret) = self.credentials()?;
        let auth =
            base64::engine::general_purpose::STANDARD.encode(format!("{key_id}:{key_secret}"));

        let response = self
            .http
            .post(format!("{}/v1/orders", self.api_base))
            .header("Authorization", format!("Basic {auth}"))
            .json(&CreateOrderBody {
                amount,
                currency,
                receipt,
                payment_capture: 1,
            })
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "gateway order creation request failed");
                ServiceError::ExternalServiceError(format!("gateway unreachable: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, "gateway rejected order creation");
            return Err(ServiceError::ExternalServiceError(format!(
                "gateway order creation failed with status {status}: {body}"
            )));
        }

        let raw: serde_json::Value = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("invalid gateway response: {e}"))
        })?;
        let parsed: CreateOrderResponse =
            serde_json::from_value(raw.clone()).map_err(|e| {
                ServiceError::ExternalServiceError(format!("invalid gateway response: {e}"))
            })?;

        Ok(GatewayIntent {
            id: parsed.id,
            amount: parsed.amount,
            currency: parsed.currency,
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn config_without_credentials() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "test_secret_key_for_testing_purposes_only_32chars".into(),
            "test".into(),
        )
    }

    #[tokio::test]
    async fn missing_credentials_surface_as_external_service_error() {
        let client = RazorpayClient::from_config(&config_without_credentials()).unwrap();
        let err = client.create_intent(100_000, "INR", "order-1").await.unwrap_err();
        assert!(matches!(err, ServiceError::ExternalServiceError(_)));
        assert!(client.key_id().is_err());
    }
}
