use axum::{Json, Router, body::Bytes, extract::State, http::StatusCode, routing::post};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use super::{ApiError, AppState};
use crate::config::Deployment;

/// A pass-through route to the computation backend.
#[derive(Debug, Clone, Copy)]
pub struct Operation {
    pub route: &'static str,
    pub downstream: &'static str,
    /// The only error text clients ever see for this route.
    pub failure: &'static str,
    pub web_only: bool,
}

pub const BIRTH_CHART: Operation = Operation {
    route: "/birth-chart",
    downstream: "/calculate/chart",
    failure: "Failed to fetch birth chart",
    web_only: false,
};

pub const CAREER: Operation = Operation {
    route: "/career",
    downstream: "/predict/career",
    failure: "Failed to fetch career prediction",
    web_only: false,
};

pub const OPERATIONS: &[Operation] = &[
    BIRTH_CHART,
    CAREER,
    Operation {
        route: "/dasha",
        downstream: "/calculate/dasha",
        failure: "Failed to fetch dasha",
        web_only: false,
    },
    Operation {
        route: "/gochar/daily",
        downstream: "/calculate/daily-transits",
        failure: "Failed to fetch daily transits",
        web_only: false,
    },
    Operation {
        route: "/transits",
        downstream: "/calculate/transits",
        failure: "Failed to fetch transits",
        web_only: false,
    },
    Operation {
        route: "/panchang",
        downstream: "/calculate/panchang",
        failure: "Failed to fetch panchang",
        web_only: false,
    },
    Operation {
        route: "/dasha-periods",
        downstream: "/calculate/dasha-periods",
        failure: "Failed to fetch dasha periods",
        web_only: true,
    },
    Operation {
        route: "/gochar",
        downstream: "/calculate/gochar",
        failure: "Failed to fetch gochar",
        web_only: true,
    },
    Operation {
        route: "/matchmaking",
        downstream: "/calculate/matchmaking",
        failure: "Failed to calculate matchmaking",
        web_only: true,
    },
    Operation {
        route: "/varga",
        downstream: "/calculate/varga",
        failure: "Failed to fetch varga chart",
        web_only: true,
    },
];

/// Parses a request body. A body that is not JSON fails the same way an
/// unreachable backend does.
pub(super) fn request_body(bytes: &[u8], failure: &str) -> Result<Value, ApiError> {
    serde_json::from_slice(bytes).map_err(|e| {
        warn!(error = %e, "Malformed request body");
        ApiError::unreachable(failure)
    })
}

/// Forwards `body` and relays the backend's answer. Failures collapse to the
/// operation's generic message.
pub async fn forward(
    state: &AppState,
    op: Operation,
    body: Value,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let (status, value) = state
        .compute()
        .forward(op.downstream, body)
        .await
        .map_err(|e| {
            warn!(route = op.route, error = %e, "Computation backend call failed");
            ApiError::unreachable(op.failure)
        })?;

    if !status.is_success() {
        return Err(ApiError::downstream(status, op.failure));
    }

    Ok((status, Json(value)))
}

pub fn routes(deployment: Deployment) -> Router<Arc<AppState>> {
    OPERATIONS
        .iter()
        .copied()
        .filter(|op| deployment == Deployment::Web || !op.web_only)
        .fold(Router::new(), |router, op| {
            router.route(
                op.route,
                post(move |State(state): State<Arc<AppState>>, bytes: Bytes| async move {
                    let body = request_body(&bytes, op.failure)?;
                    forward(&state, op, body).await
                }),
            )
        })
}
