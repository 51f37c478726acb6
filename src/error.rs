use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::order_token::OrderTokenError;
use crate::store::StoreError;

/// Reasons a webhook delivery is not processed. Each maps to one status/body pair.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid or missing signature")]
    Unauthorized,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("invalid order_id: {0}")]
    InvalidOrder(#[from] OrderTokenError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            WebhookError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            WebhookError::InvalidPayload(_) => (StatusCode::BAD_REQUEST, "Invalid payload"),
            WebhookError::InvalidOrder(_) => (StatusCode::BAD_REQUEST, "Invalid order_id"),
            WebhookError::Store(e) => {
                tracing::error!("[WEBHOOK] 🔥 Webhook error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "server error")
            }
        };
        (status, body).into_response()
    }
}
