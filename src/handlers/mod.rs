pub mod orders;
pub mod payment_webhooks;
pub mod payments;

use crate::{
    errors::ServiceError,
    rate_limiter::{client_ip, RateLimitConfig},
    AppState,
};
use axum::http::HeaderMap;
use std::time::Duration;

/// Applies the per-endpoint fixed-window limit, keyed by client address.
pub(crate) async fn enforce_rate_limit(
    state: &AppState,
    endpoint: &str,
    headers: &HeaderMap,
    limit: u32,
) -> Result<(), ServiceError> {
    let key = format!("{endpoint}:{}", client_ip(headers));
    let config = RateLimitConfig {
        limit,
        window: Duration::from_secs(state.config.rate_limit_window_seconds),
    };
    let decision = state.rate_limiter.check(&key, config).await;
    if !decision.allowed {
        return Err(ServiceError::RateLimited {
            retry_after_secs: decision.retry_after_secs,
        });
    }
    Ok(())
}
