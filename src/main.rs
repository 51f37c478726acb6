use std::process;
use std::sync::Arc;
use tokio::signal;
use dotenv::dotenv;

use sapp_unlock_webhook::{
    app,
    config::{Config, ConfigError},
    state::AppContext,
    store::{DocumentStore, MemoryStore, RedisStore},
};

#[tokio::main]
async fn main() {
    // Load environment variables from .env if available
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("[CONFIG] ❌ {}", e);
        process::exit(1);
    }
}

async fn run() -> Result<(), ConfigError> {
    let config = Config::from_env()?;
    tracing::info!(
        "[CONFIG] ✅ Service account loaded for project '{}'",
        config.service_account.project_id
    );

    let store: Arc<dyn DocumentStore> = match &config.redis_url {
        Some(url) => Arc::new(RedisStore::open(url, &config.service_account.project_id)?),
        None => {
            tracing::warn!("[STORE] ⚠️ REDIS_URL not set — using in-memory store, data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let ctx = Arc::new(AppContext::from_config(&config, store));
    if ctx.operator_token.is_some() {
        tracing::warn!("[CONFIG] /test-unlock enabled (operator token set)");
    }

    let addr = config.addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("[CONFIG] ❌ Cannot bind {}: {}", addr, e);
            process::exit(1);
        }
    };

    tracing::info!("🚀 Webhook running on {}", addr);
    tracing::info!("   - NOWPayments IPN: http://{}/webhook", addr);
    tracing::info!("   - Health Check:    http://{}/health", addr);

    if let Err(e) = axum::serve(listener, app(ctx))
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {}", e);
        process::exit(1);
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("SIGTERM received, shutting down gracefully");
}
