use axum::{Json, body::Bytes, extract::State, http::StatusCode};
use serde_json::{Value, json};
use std::sync::Arc;

use super::proxy::{CAREER, Operation, request_body};
use super::{ApiError, AppState};

const PREDICT: Operation = Operation {
    failure: "Failed to generate career prediction",
    ..CAREER
};

/// Career scoring from the backend plus a generated `oracle_verdict`.
pub async fn predict(
    State(state): State<Arc<AppState>>,
    bytes: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let body = request_body(&bytes, PREDICT.failure)?;
    let (status, Json(scores)) = super::proxy::forward(&state, PREDICT, body).await?;

    let verdict = state.oracle().verdict(&scores).await;

    let response = match scores {
        Value::Object(mut map) => {
            map.insert("oracle_verdict".to_string(), Value::String(verdict));
            Value::Object(map)
        }
        other => json!({ "result": other, "oracle_verdict": verdict }),
    };

    Ok((status, Json(response)))
}
