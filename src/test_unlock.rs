// sapp_unlock_webhook/src/test_unlock.rs
// Operator-only manual unlock, mounted only when OPERATOR_TOKEN is configured.

use axum::{
    extract::{Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::reconcile::{iso_timestamp, unlock_product};
use crate::state::AppContext;

pub const DEFAULT_USER: &str = "TEST_USER";
pub const DEFAULT_COURSE: &str = "beginner";

#[derive(Debug, Default, Deserialize)]
pub struct TestUnlockParams {
    pub uid: Option<String>,
    pub course: Option<String>,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

fn is_operator(ctx: &AppContext, headers: &HeaderMap) -> bool {
    match (ctx.operator_token.as_deref(), bearer_token(headers)) {
        (Some(expected), Some(given)) if !expected.is_empty() => {
            given.as_bytes().ct_eq(expected.as_bytes()).into()
        }
        _ => false,
    }
}

pub async fn test_unlock_handler(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Query(params): Query<TestUnlockParams>,
) -> Response {
    if !is_operator(&ctx, &headers) {
        tracing::warn!("[UNLOCK] ❌ Test unlock refused: missing or wrong operator token");
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }

    let user_id = params
        .uid
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_USER.to_string());
    let course = params
        .course
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_COURSE.to_string());

    let entry = json!({
        "status": "paid",
        "amount": "TEST",
        "currency": "TEST",
        "timestamp": iso_timestamp(ctx.now()),
        "gateway": "test-unlock",
    });

    match unlock_product(ctx.store.as_ref(), &user_id, &course, entry).await {
        Ok(()) => {
            tracing::info!(
                "[UNLOCK] 🎉 TEST UNLOCK: Course '{}' unlocked for user '{}'",
                course,
                user_id
            );
            (
                StatusCode::OK,
                format!("TEST UNLOCK SUCCESS → User: {}, Course: {}", user_id, course),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("[UNLOCK] 🔥 TEST UNLOCK ERROR: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "error").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use axum::http::HeaderValue;

    fn headers(auth: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(AUTHORIZATION, HeaderValue::from_str(auth).unwrap());
        h
    }

    #[test]
    fn operator_token_must_match() {
        let ctx = AppContext::new(Arc::new(MemoryStore::new())).with_operator_token("op-token");
        assert!(is_operator(&ctx, &headers("Bearer op-token")));
        assert!(!is_operator(&ctx, &headers("Bearer op-token-2")));
        assert!(!is_operator(&ctx, &headers("op-token")));
        assert!(!is_operator(&ctx, &HeaderMap::new()));
    }

    #[test]
    fn no_operator_token_means_nobody() {
        let ctx = AppContext::new(Arc::new(MemoryStore::new()));
        assert!(!is_operator(&ctx, &headers("Bearer ")));
        assert!(!is_operator(&ctx, &headers("Bearer anything")));
    }
}
