use axum::{
    Json, Router,
    body::Bytes,
    extract::{RawQuery, Request, State},
    http::{HeaderMap, Method, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use super::proxy::request_body;
use super::{ApiError, AppState};

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

const BOOKS_PATH: &str = "/books";
const SEARCH_PATH: &str = "/search";

const UPDATE_FAILURE: &str = "Failed to update book index";
const SEARCH_FAILURE: &str = "Failed to search files";

/// Rejects the request unless `x-admin-key` matches the configured secret.
/// An unset secret rejects everything.
pub async fn admin_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let expected = state.config().read().await.admin.key.clone();
    let provided = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if expected.is_empty() || !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        warn!(path = %request.uri().path(), "Rejected admin request");
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

async fn relay(
    state: &AppState,
    method: Method,
    path: &str,
    query: Option<String>,
    body: Option<Value>,
    failure: &str,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let (status, value) = state
        .index()
        .forward(method, path, query.as_deref(), body)
        .await
        .map_err(|e| {
            warn!(path, error = %e, "Document index call failed");
            ApiError::unreachable(failure)
        })?;

    if !status.is_success() {
        return Err(ApiError::downstream(status, failure));
    }
    Ok((status, Json(value)))
}

pub async fn list_index(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    relay(&state, Method::GET, BOOKS_PATH, query, None, "Failed to fetch book index").await
}

pub async fn update_index(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
    bytes: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let body = request_body(&bytes, UPDATE_FAILURE)?;
    relay(&state, Method::POST, BOOKS_PATH, query, Some(body), UPDATE_FAILURE).await
}

pub async fn search_get(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    relay(&state, Method::GET, SEARCH_PATH, query, None, SEARCH_FAILURE).await
}

pub async fn search_post(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
    bytes: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let body = request_body(&bytes, SEARCH_FAILURE)?;
    relay(&state, Method::POST, SEARCH_PATH, query, Some(body), SEARCH_FAILURE).await
}

pub fn routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let admin = Router::new()
        .route("/books/index", get(list_index).post(update_index))
        .route_layer(middleware::from_fn_with_state(state, admin_middleware));

    Router::new()
        .merge(admin)
        .route("/file-search", get(search_get).post(search_post))
}

#[cfg(test)]
mod tests {
    use super::constant_time_eq;

    #[test]
    fn key_comparison() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret2"));
        assert!(!constant_time_eq(b"", b"secret"));
    }
}
