// sapp_unlock_webhook/src/config.rs
// Environment configuration, loaded once at startup.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use std::env;
use thiserror::Error;

use crate::signature::SignatureMode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing FIREBASE_SERVICE_ACCOUNT (or FIREBASE_CONFIG) environment variable")]
    MissingServiceAccount,

    #[error("invalid JSON in service account: {0}")]
    InvalidServiceAccount(String),

    #[error("invalid {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },

    #[error("store connection error: {0}")]
    Store(#[from] redis::RedisError),
}

/// Subset of a Google service-account key we rely on.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    #[serde(default)]
    pub client_email: Option<String>,
    #[serde(rename = "type", default)]
    pub account_type: Option<String>,
}

impl ServiceAccount {
    /// Accepts the key as raw JSON or as base64-encoded JSON.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        let json = if trimmed.starts_with('{') {
            trimmed.to_string()
        } else {
            let bytes = STANDARD
                .decode(trimmed)
                .map_err(|e| ConfigError::InvalidServiceAccount(e.to_string()))?;
            String::from_utf8(bytes).map_err(|e| ConfigError::InvalidServiceAccount(e.to_string()))?
        };

        let account: ServiceAccount = serde_json::from_str(&json)
            .map_err(|e| ConfigError::InvalidServiceAccount(e.to_string()))?;

        if account.project_id.trim().is_empty() {
            return Err(ConfigError::InvalidServiceAccount(
                "project_id is empty".to_string(),
            ));
        }
        Ok(account)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub service_account: ServiceAccount,
    pub nowpayments_secret: Option<String>,
    pub signature_mode: SignatureMode,
    pub redis_url: Option<String>,
    pub operator_token: Option<String>,
    pub record_transactions: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable source; `from_env` passes the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_account = lookup("FIREBASE_SERVICE_ACCOUNT")
            .or_else(|| lookup("FIREBASE_CONFIG"))
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingServiceAccount)?;
        let service_account = ServiceAccount::parse(&raw_account)?;

        let nowpayments_secret = non_empty(lookup("NOWPAYMENTS_SECRET"));
        if nowpayments_secret.is_none() {
            tracing::warn!("[CONFIG] ⚠️ NOWPAYMENTS_SECRET not set — signature verification will fail");
        }

        let signature_mode = match non_empty(lookup("SIGNATURE_MODE")) {
            None => SignatureMode::SharedSecret,
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                name: "SIGNATURE_MODE",
                value,
            })?,
        };

        let port = match non_empty(lookup("PORT")) {
            None => 8080,
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                name: "PORT",
                value,
            })?,
        };

        let record_transactions = match non_empty(lookup("RECORD_TRANSACTIONS")) {
            None => true,
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: "RECORD_TRANSACTIONS",
                        value,
                    })
                }
            },
        };

        Ok(Self {
            host: non_empty(lookup("HOST")).unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            service_account,
            nowpayments_secret,
            signature_mode,
            redis_url: non_empty(lookup("REDIS_URL")),
            operator_token: non_empty(lookup("OPERATOR_TOKEN")),
            record_transactions,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
