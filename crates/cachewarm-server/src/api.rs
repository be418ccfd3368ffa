use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{ConnectInfo, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use cachewarm_fetch::{Fetcher, WARM_HEADER};
use cachewarm_runner::{RunRequest, Runner};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::middleware::{request_id, DebugAccess};

/// Transparent 1x1 PNG returned to callers that do not get a report.
pub const PIXEL: &[u8] = &[
    137, 80, 78, 71, 13, 10, 26, 10, 0, 0, 0, 13, 73, 72, 68, 82, 0, 0, 0, 1, 0, 0, 0, 1, 8, 4, 0,
    0, 0, 181, 28, 12, 2, 0, 0, 0, 11, 73, 68, 65, 84, 120, 218, 99, 252, 255, 31, 0, 3, 3, 2, 0,
    238, 254, 211, 253, 0, 0, 0, 0, 73, 69, 78, 68, 174, 66, 96, 130,
];

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<Runner<Fetcher>>,
    pub debug: DebugAccess,
}

/// Query string of `/warm`. Values are kept raw so a malformed one is
/// ignored instead of failing the request.
#[derive(Debug, Default, Deserialize)]
pub struct WarmParams {
    debug: Option<String>,
    force: Option<String>,
    budget_ms: Option<String>,
    job: Option<String>,
}

impl WarmParams {
    fn wants_report(&self) -> bool {
        is_set(self.debug.as_deref())
    }

    fn run_request(&self, self_triggered: bool) -> RunRequest {
        let budget = self
            .budget_ms
            .as_deref()
            .filter(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|v| v.parse::<u64>().ok());
        let jobs = self
            .job
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
            .collect();

        let mut request = RunRequest::traffic()
            .force(is_set(self.force.as_deref()))
            .budget_ms(budget)
            .jobs(jobs);
        request.debug = self.wants_report();
        request.self_triggered = self_triggered;
        request
    }
}

/// Present, non-empty and not `"0"`.
fn is_set(value: Option<&str>) -> bool {
    matches!(value, Some(v) if !v.is_empty() && v != "0")
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    jobs: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rejected: Option<usize>,
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/warm", get(warm))
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

fn pixel() -> Response {
    (
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "no-store, max-age=0"),
        ],
        PIXEL,
    )
        .into_response()
}

async fn warm(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(params): Query<WarmParams>,
) -> Response {
    let self_triggered = headers
        .keys()
        .any(|name| name.as_str().eq_ignore_ascii_case(WARM_HEADER));
    let request = params.run_request(self_triggered);

    if params.wants_report() {
        if !state.debug.is_trusted(peer.ip(), &headers) {
            tracing::debug!(%peer, "refusing run report to untrusted caller");
            return StatusCode::NOT_FOUND.into_response();
        }
        let report = state.runner.run(&request).await;
        return Json(report).into_response();
    }

    let runner = Arc::clone(&state.runner);
    tokio::spawn(async move {
        let report = runner.run(&request).await;
        tracing::debug!(
            run_id = %report.run_id,
            ok = report.ok_count(),
            errors = report.error_count(),
            skipped = ?report.skipped,
            "background warm run finished"
        );
    });
    pixel()
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.runner.source().load() {
        Ok(registry) => (
            StatusCode::OK,
            Json(HealthData {
                status: "ok",
                jobs: Some(registry.jobs().count()),
                rejected: Some(registry.rejected().count()),
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: job source unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthData {
                    status: "degraded",
                    jobs: None,
                    rejected: None,
                }),
            )
        }
    }
}
