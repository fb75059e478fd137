use anyhow::Context;
use std::sync::Arc;
use storefront_api::{
    auth::AuthService,
    config::{init_tracing, load_config},
    db,
    events::{self, EventSender},
    gateway::RazorpayClient,
    rate_limiter::{RateLimitBackend, RateLimiter},
    AppServices, AppState,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    init_tracing(&config.log_level, config.log_json);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        "starting storefront api"
    );

    let db = Arc::new(
        db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?,
    );
    if config.auto_migrate {
        db::run_migrations(&db)
            .await
            .context("failed to run migrations")?;
    }

    let rate_limiter = if config.rate_limit_use_redis {
        match redis::Client::open(config.redis_url.as_str()) {
            Ok(client) => RateLimiter::new(RateLimitBackend::Redis {
                client: Arc::new(client),
                namespace: config.rate_limit_namespace.clone(),
            }),
            Err(err) => {
                warn!(error = %err, "invalid redis url, using in-process rate limiting");
                RateLimiter::in_memory()
            }
        }
    } else {
        RateLimiter::in_memory()
    };

    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = EventSender::new(event_tx);
    tokio::spawn(events::process_events(event_rx));

    let gateway = Arc::new(RazorpayClient::from_config(&config)?);
    let auth = Arc::new(AuthService::new(&config.jwt_secret, config.jwt_expiration));

    let config = Arc::new(config);
    let services = AppServices::build(db.clone(), &config, gateway, event_sender.clone());
    let state = AppState {
        db,
        config: config.clone(),
        event_sender,
        services,
        rate_limiter,
        auth,
    };

    let app = storefront_api::app_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => warn!(error = %err, "failed to install sigterm handler"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received terminate signal"),
    }
}
