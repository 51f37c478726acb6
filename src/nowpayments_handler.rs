// sapp_unlock_webhook/src/nowpayments_handler.rs
// NOWPayments IPN webhook: signature → status gate → order token → unlock

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::error::WebhookError;
use crate::order_token::parse_order_token;
use crate::reconcile::{
    coerce_amount, coerce_currency, coerce_email, coerce_id, reconcile, Reconciliation,
};
use crate::signature::{verify_signature, SIGNATURE_HEADER};
use crate::state::AppContext;

pub const FINISHED: &str = "finished";

// ═══════════════════════════════════════════════════════════════════════════════
// NOTIFICATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Fields we read from an IPN body. Every field stays raw JSON and is coerced
/// later, so a wrongly typed field never rejects the whole delivery.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub payment_status: Option<Value>,
    #[serde(default)]
    pub order_id: Option<Value>,
    #[serde(default)]
    pub price_amount: Option<Value>,
    #[serde(default)]
    pub pay_currency: Option<Value>,
    #[serde(default)]
    pub payment_id: Option<Value>,
    #[serde(default)]
    pub invoice_id: Option<Value>,
    #[serde(default)]
    pub customer_email: Option<Value>,
}

impl Notification {
    pub fn is_finished(&self) -> bool {
        self.payment_status.as_ref().and_then(Value::as_str) == Some(FINISHED)
    }

    /// A missing or non-string order id reads as the empty token.
    pub fn order_token(&self) -> String {
        self.order_id
            .as_ref()
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed,
    Ignored,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Processed => "ok",
            WebhookOutcome::Ignored => "ignored",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// WEBHOOK HANDLER
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn nowpayments_webhook_handler(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match handle_notification(&ctx, &headers, &body).await {
        Ok(outcome) => (StatusCode::OK, outcome.as_str()).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn handle_notification(
    ctx: &AppContext,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<WebhookOutcome, WebhookError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    if !verify_signature(ctx.signature_mode, signature, ctx.secret.as_deref(), body) {
        tracing::warn!(
            "[WEBHOOK] ❌ Invalid signature (header present: {})",
            signature.is_some()
        );
        return Err(WebhookError::Unauthorized);
    }

    let raw: Value = serde_json::from_slice(body).map_err(|e| {
        tracing::warn!("[WEBHOOK] ❌ Unparseable body: {}", e);
        WebhookError::InvalidPayload(e.to_string())
    })?;
    if !raw.is_object() {
        tracing::warn!("[WEBHOOK] ❌ Body is not a JSON object");
        return Err(WebhookError::InvalidPayload("expected a JSON object".into()));
    }
    let notification: Notification = serde_json::from_value(raw.clone()).map_err(|e| {
        tracing::warn!("[WEBHOOK] ❌ Unexpected field types: {}", e);
        WebhookError::InvalidPayload(e.to_string())
    })?;

    tracing::info!(
        status = ?notification.payment_status,
        order_id = ?notification.order_id,
        payment_id = ?notification.payment_id,
        "[WEBHOOK] 💰 Payment received"
    );

    if !notification.is_finished() {
        tracing::info!("[WEBHOOK] Payment not finished, ignoring.");
        return Ok(WebhookOutcome::Ignored);
    }

    let order_id = notification.order_token();
    let token = parse_order_token(&order_id).map_err(|e| {
        tracing::warn!("[WEBHOOK] ❌ Invalid order_id {:?}: {}", order_id, e);
        WebhookError::from(e)
    })?;

    let rec = Reconciliation {
        user_id: token.user_id,
        product_key: token.product_key,
        order_id,
        payment_status: FINISHED.to_string(),
        amount: coerce_amount(notification.price_amount.as_ref()),
        currency: coerce_currency(notification.pay_currency.as_ref()),
        payment_id: coerce_id(notification.payment_id.as_ref()),
        invoice_id: coerce_id(notification.invoice_id.as_ref()),
        customer_email: coerce_email(notification.customer_email.as_ref()),
        raw,
    };
    reconcile(ctx, &rec).await?;

    Ok(WebhookOutcome::Processed)
}
