// sapp_unlock_webhook/src/order_token.rs
// Order ids carry the purchase: sapp_<productKey>_<userId>_<timestamp>

use thiserror::Error;

const ORDER_PREFIX: &str = "sapp";
const DELIMITER: char = '_';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderToken {
    pub product_key: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderTokenError {
    #[error("order id has fewer than 3 segments")]
    TooFewSegments,
    #[error("order id does not start with `sapp`")]
    WrongPrefix,
    #[error("order id has an empty product key")]
    EmptyProductKey,
    #[error("order id has an empty user id")]
    EmptyUserId,
}

/// Positional split on `_`. Segments past the user id are ignored, so a product
/// key containing `_` cannot be represented.
pub fn parse_order_token(token: &str) -> Result<OrderToken, OrderTokenError> {
    let parts: Vec<&str> = token.split(DELIMITER).collect();
    if parts.len() < 3 {
        return Err(OrderTokenError::TooFewSegments);
    }
    if parts[0] != ORDER_PREFIX {
        return Err(OrderTokenError::WrongPrefix);
    }
    if parts[1].is_empty() {
        return Err(OrderTokenError::EmptyProductKey);
    }
    if parts[2].is_empty() {
        return Err(OrderTokenError::EmptyUserId);
    }

    Ok(OrderToken {
        product_key: parts[1].to_string(),
        user_id: parts[2].to_string(),
    })
}
