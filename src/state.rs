// sapp_unlock_webhook/src/state.rs
// Shared, read-only request context handed to every handler.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::Config;
use crate::signature::SignatureMode;
use crate::store::DocumentStore;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<dyn DocumentStore>,
    pub secret: Option<String>,
    pub signature_mode: SignatureMode,
    /// Enables `/test-unlock` when set.
    pub operator_token: Option<String>,
    pub record_transactions: bool,
    pub clock: Clock,
}

impl AppContext {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            secret: None,
            signature_mode: SignatureMode::SharedSecret,
            operator_token: None,
            record_transactions: true,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn from_config(config: &Config, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            secret: config.nowpayments_secret.clone(),
            signature_mode: config.signature_mode,
            operator_token: config.operator_token.clone(),
            record_transactions: config.record_transactions,
            ..Self::new(store)
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_signature_mode(mut self, mode: SignatureMode) -> Self {
        self.signature_mode = mode;
        self
    }

    pub fn with_operator_token(mut self, token: impl Into<String>) -> Self {
        self.operator_token = Some(token.into());
        self
    }

    pub fn with_transaction_log(mut self, enabled: bool) -> Self {
        self.record_transactions = enabled;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}
