// sapp_unlock_webhook/src/reconcile.rs
// Turns a finished payment into entitlement and transaction-log writes.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use crate::state::AppContext;
use crate::store::{Document, DocumentStore, StoreError, PAYMENTS, TRANSACTIONS, USERS};

pub const GATEWAY: &str = "nowpayments";

/// Everything needed to record one finished payment.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub user_id: String,
    pub product_key: String,
    pub order_id: String,
    pub payment_status: String,
    /// Already coerced: a JSON number, a verbatim numeric string, or null.
    pub amount: Value,
    /// Already coerced: a JSON string or null.
    pub currency: Value,
    pub payment_id: Option<String>,
    pub invoice_id: Option<String>,
    pub customer_email: Option<String>,
    pub raw: Value,
}

/// Where a transaction record's key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnIdSource {
    PaymentId,
    InvoiceId,
    Generated,
}

impl TxnIdSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxnIdSource::PaymentId => "payment_id",
            TxnIdSource::InvoiceId => "invoice_id",
            TxnIdSource::Generated => "generated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub txn_id: Option<String>,
    pub txn_id_source: Option<TxnIdSource>,
}

/// Numbers pass through. A numeric string becomes a number when that keeps its
/// exact text (`"49.99"`, `"10"`), otherwise it is stored verbatim (`"49.990"`,
/// huge integers). Anything non-numeric becomes null.
pub fn coerce_amount(value: Option<&Value>) -> Value {
    match value {
        Some(Value::Number(n)) => Value::Number(n.clone()),
        Some(Value::String(s)) => {
            let text = s.trim();
            match serde_json::from_str::<serde_json::Number>(text) {
                Ok(n) if n.to_string() == text => Value::Number(n),
                Ok(_) => Value::String(text.to_string()),
                Err(_) if text.parse::<f64>().is_ok_and(f64::is_finite) => {
                    Value::String(text.to_string())
                }
                Err(_) => Value::Null,
            }
        }
        _ => Value::Null,
    }
}

pub fn coerce_currency(value: Option<&Value>) -> Value {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Value::String(s.clone()),
        _ => Value::Null,
    }
}

/// Only a non-empty string is an email; anything else is treated as absent.
pub fn coerce_email(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Gateway ids arrive as numbers or strings; empty strings count as absent.
pub fn coerce_id(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Merge `{product_key: entry}` into `payments/{user_id}`; other products stay as they are.
pub async fn unlock_product(
    store: &dyn DocumentStore,
    user_id: &str,
    product_key: &str,
    entry: Value,
) -> Result<(), StoreError> {
    let mut fields = Document::new();
    fields.insert(product_key.to_string(), entry);
    store.merge(PAYMENTS, user_id, fields).await
}

pub fn entitlement_entry(rec: &Reconciliation, at: DateTime<Utc>) -> Value {
    let mut entry = json!({
        "status": "paid",
        "amount": rec.amount,
        "currency": rec.currency,
        "timestamp": iso_timestamp(at),
        "gateway": GATEWAY,
        "order_id": rec.order_id,
    });
    if let Some(payment_id) = &rec.payment_id {
        entry["payment_id"] = Value::String(payment_id.clone());
    }
    entry
}

pub fn transaction_id(rec: &Reconciliation, at: DateTime<Utc>) -> (String, TxnIdSource) {
    if let Some(id) = &rec.payment_id {
        return (id.clone(), TxnIdSource::PaymentId);
    }
    if let Some(id) = &rec.invoice_id {
        return (id.clone(), TxnIdSource::InvoiceId);
    }
    (
        format!("txn_{}_{:08x}", at.timestamp_millis(), rand::random::<u32>()),
        TxnIdSource::Generated,
    )
}

fn transaction_record(
    rec: &Reconciliation,
    txn_id: &str,
    source: TxnIdSource,
    email: Option<&str>,
    at: DateTime<Utc>,
) -> Document {
    let mut doc = Map::new();
    doc.insert("txn_id".into(), json!(txn_id));
    doc.insert("id_source".into(), json!(source.as_str()));
    doc.insert("user_id".into(), json!(rec.user_id));
    doc.insert("product_key".into(), json!(rec.product_key));
    doc.insert("order_id".into(), json!(rec.order_id));
    doc.insert("payment_status".into(), json!(rec.payment_status));
    doc.insert("amount".into(), rec.amount.clone());
    doc.insert("currency".into(), rec.currency.clone());
    doc.insert("gateway".into(), json!(GATEWAY));
    doc.insert("payment_id".into(), json!(rec.payment_id));
    doc.insert("invoice_id".into(), json!(rec.invoice_id));
    doc.insert("customer_email".into(), json!(email));
    doc.insert("raw".into(), rec.raw.clone());
    doc.insert("recorded_at".into(), json!(iso_timestamp(at)));
    doc
}

/// Best-effort read of `users/{user_id}.email`. Failures are logged and yield None.
async fn lookup_email(store: &dyn DocumentStore, user_id: &str) -> Option<String> {
    match store.get(USERS, user_id).await {
        Ok(Some(profile)) => profile
            .get("email")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!("[UNLOCK] ⚠️ Profile lookup failed for '{}': {}", user_id, e);
            None
        }
    }
}

/// Entitlement first, then the optional transaction log. Both are merges, so a
/// redelivered notification with a gateway id converges to the same state.
pub async fn reconcile(ctx: &AppContext, rec: &Reconciliation) -> Result<ReconcileOutcome, StoreError> {
    let now = ctx.now();
    let store = ctx.store.as_ref();

    unlock_product(store, &rec.user_id, &rec.product_key, entitlement_entry(rec, now)).await?;
    tracing::info!(
        "[UNLOCK] ✅ Course '{}' unlocked for user '{}'",
        rec.product_key,
        rec.user_id
    );

    if !ctx.record_transactions {
        return Ok(ReconcileOutcome {
            txn_id: None,
            txn_id_source: None,
        });
    }

    let email = match &rec.customer_email {
        Some(email) if !email.is_empty() => Some(email.clone()),
        _ => lookup_email(store, &rec.user_id).await,
    };

    let (txn_id, source) = transaction_id(rec, now);
    if source == TxnIdSource::Generated {
        tracing::warn!(
            "[UNLOCK] No gateway id for order '{}', logging under generated id {}",
            rec.order_id,
            txn_id
        );
    }
    store
        .merge(
            TRANSACTIONS,
            &txn_id,
            transaction_record(rec, &txn_id, source, email.as_deref(), now),
        )
        .await?;

    Ok(ReconcileOutcome {
        txn_id: Some(txn_id),
        txn_id_source: Some(source),
    })
}
