// sapp_unlock_webhook/src/lib.rs
// Router for the NOWPayments unlock webhook and its operator test route.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod nowpayments_handler;
pub mod order_token;
pub mod reconcile;
pub mod signature;
pub mod state;
pub mod store;
pub mod test_unlock;

use nowpayments_handler::nowpayments_webhook_handler;
use state::AppContext;
use test_unlock::test_unlock_handler;

pub fn app(ctx: Arc<AppContext>) -> Router {
    let mut router = Router::new()
        .route("/webhook", post(nowpayments_webhook_handler))
        .route("/health", get(|| async { "OK" }));

    if ctx.operator_token.is_some() {
        router = router.route("/test-unlock", get(test_unlock_handler));
    }

    router
        .with_state(ctx)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
