//! HTTP API server.
//!
//! Subscription management, the durable push-schedule endpoints (including
//! the cron-style sweep trigger), the full dispatcher chain, and a view of
//! the background worker's cache. Spawned as a background task by `serve`.

use crate::dispatcher::{Dispatcher, Handling};
use crate::executor::worker::WorkerHandle;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, Request, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use beacon_core::{
    config::ApiConfig,
    error::BeaconError,
    notification::{PushSubscription, ScheduleRequest, SubscriptionKeys},
    time::format_iso,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

type ApiError = (StatusCode, Json<Value>);
type ApiResult = Result<Json<Value>, ApiError>;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    dispatcher: Arc<Dispatcher>,
    worker: Option<WorkerHandle>,
    api_key: Option<String>,
    uptime: Instant,
    worker_timeout: Duration,
}

impl ApiState {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        worker: Option<WorkerHandle>,
        api_key: &str,
        worker_timeout: Duration,
    ) -> Self {
        Self {
            dispatcher,
            worker,
            api_key: (!api_key.is_empty()).then(|| api_key.to_string()),
            uptime: Instant::now(),
            worker_timeout,
        }
    }
}

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

fn bad_request(message: impl Into<String>) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, message)
}

/// Map a scheduling failure onto a response. Only client errors become 400s.
fn schedule_error(e: BeaconError) -> ApiError {
    if !e.is_client_error() {
        error!("scheduling failed: {e}");
        return api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to schedule notification",
        );
    }
    match e {
        BeaconError::EventAlreadyPassed => bad_request("Event time has already passed"),
        BeaconError::MissingFields(fields) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Missing required fields",
                "detail": fields.join(", "),
                "fields": fields,
            })),
        ),
        BeaconError::Validation(msg) => bad_request(msg),
        other => bad_request(other.to_string()),
    }
}

fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(v)| v)
        .map_err(|e| bad_request(format!("invalid request: {e}")))
}

/// Constant-time string comparison to prevent timing attacks on API token validation.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Check bearer token auth. Returns `None` if authorized, `Some(response)` if rejected.
fn check_auth(headers: &HeaderMap, api_key: &Option<String>) -> Option<ApiError> {
    let key = api_key.as_ref()?;

    let Some(header) = headers.get("authorization") else {
        return Some(api_error(
            StatusCode::UNAUTHORIZED,
            "missing Authorization header",
        ));
    };
    let Ok(value) = header.to_str() else {
        return Some(api_error(
            StatusCode::UNAUTHORIZED,
            "invalid Authorization header",
        ));
    };

    match value.strip_prefix("Bearer ") {
        Some(token) if constant_time_eq(token, key) => None,
        _ => Some(api_error(StatusCode::UNAUTHORIZED, "invalid token")),
    }
}

/// Runs before every handler: authenticate, then wake the worker.
async fn guard(
    State(state): State<ApiState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    if let Some(rejected) = check_auth(&headers, &state.api_key) {
        warn!(method = %method, uri = %uri, "API request rejected");
        return rejected.into_response();
    }

    if let Some(worker) = &state.worker {
        worker.wake();
    }

    let start = Instant::now();
    let response = next.run(request).await;
    debug!(
        method = %method,
        uri = %uri,
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        "API request"
    );
    response
}

/// `GET /api/health`
async fn health(State(state): State<ApiState>) -> Json<Value> {
    let worker = match &state.worker {
        Some(w) if w.is_running() => w.state().as_str(),
        Some(_) => "stopped",
        None => "disabled",
    };
    Json(json!({
        "status": "ok",
        "uptime_secs": state.uptime.elapsed().as_secs(),
        "push": state.dispatcher.push().provider_name(),
        "worker": worker,
    }))
}

/// `GET /api/push/subscribe`: the key clients subscribe with.
async fn public_key(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({ "publicKey": state.dispatcher.push().public_key() }))
}

/// `POST /api/push/subscribe`
async fn subscribe(
    State(state): State<ApiState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let body = parse_body(body)?;
    let endpoint = body.get("endpoint").and_then(Value::as_str).unwrap_or("");
    let Some(keys) = body
        .get("keys")
        .filter(|k| k.is_object() && !endpoint.is_empty())
    else {
        return Err(bad_request("Invalid subscription"));
    };
    let key = |name: &str| {
        keys.get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let subscription = PushSubscription {
        endpoint: endpoint.to_string(),
        keys: SubscriptionKeys {
            p256dh: key("p256dh"),
            auth: key("auth"),
        },
    };
    if !state.dispatcher.push().registry().upsert(subscription).await {
        return Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to save subscription",
        ));
    }
    Ok(Json(json!({ "success": true })))
}

/// `DELETE /api/push/subscribe`
async fn unsubscribe(
    State(state): State<ApiState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let body = parse_body(body)?;
    let endpoint = body
        .get("endpoint")
        .and_then(Value::as_str)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| bad_request("Endpoint required"))?;

    if !state.dispatcher.push().registry().remove(endpoint).await {
        return Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to remove subscription",
        ));
    }
    info!("push subscription removed");
    Ok(Json(json!({ "success": true })))
}

/// `POST /api/push/schedule`: persist to the durable store only.
async fn push_schedule(
    State(state): State<ApiState>,
    body: Result<Json<ScheduleRequest>, JsonRejection>,
) -> ApiResult {
    let req = parse_body(body)?;
    let record = state
        .dispatcher
        .persist_schedule(&req)
        .await
        .map_err(schedule_error)?;
    Ok(Json(json!({
        "success": true,
        "scheduledTime": format_iso(record.scheduled_time),
    })))
}

/// `DELETE /api/push/schedule`
async fn push_unschedule(
    State(state): State<ApiState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let body = parse_body(body)?;
    let task_id = body
        .get("taskId")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| bad_request("Task ID required"))?;

    if !state.dispatcher.store().remove_by_task(task_id).await {
        return Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to cancel notification",
        ));
    }
    info!("push schedule cancelled for task {task_id}");
    Ok(Json(json!({ "success": true })))
}

/// `GET /api/push/schedule`: run the sweep (cron trigger), or list with `?debug=1`.
async fn push_sweep_or_list(
    State(state): State<ApiState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    if params.get("debug").map(String::as_str) == Some("1") {
        let schedules = state.dispatcher.store().list().await;
        return Json(json!({ "schedules": schedules }));
    }
    sweep_response(&state).await
}

/// `PATCH /api/push/schedule`: run the sweep.
async fn push_sweep(State(state): State<ApiState>) -> Json<Value> {
    sweep_response(&state).await
}

async fn sweep_response(state: &ApiState) -> Json<Value> {
    let sent = state.dispatcher.check_and_send_due_notifications().await;
    info!("cron check complete, sent: {sent}");
    Json(json!({ "success": true, "sentCount": sent }))
}

/// `POST /api/notifications`: schedule through the full fallback chain.
async fn schedule_notification(
    State(state): State<ApiState>,
    body: Result<Json<ScheduleRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let req = parse_body(body)?;
    let scheduled = state
        .dispatcher
        .try_schedule(&req)
        .await
        .map_err(|e| match e {
            BeaconError::Delivery(d) => {
                error!("no delivery tier accepted {}: {d}", req.task_id);
                api_error(StatusCode::SERVICE_UNAVAILABLE, d.to_string())
            }
            other => schedule_error(other),
        })?;

    let handling = match scheduled.handling {
        Handling::Immediate => "immediate",
        Handling::Deferred => "deferred",
    };
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": scheduled.id,
            "taskId": scheduled.task_id,
            "scheduledTime": format_iso(scheduled.fire_at),
            "handling": handling,
            "tier": scheduled.tier,
        })),
    ))
}

/// `POST /api/notifications/test`
async fn test_notification(State(state): State<ApiState>) -> ApiResult {
    let tier = state
        .dispatcher
        .test_notification()
        .await
        .map_err(|e| api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))?;
    Ok(Json(json!({ "success": true, "tier": tier })))
}

/// `DELETE /api/notifications/{task_id}`
async fn cancel_notification(
    State(state): State<ApiState>,
    Path(task_id): Path<String>,
) -> Json<Value> {
    state.dispatcher.cancel_notification(&task_id).await;
    Json(json!({ "success": true }))
}

/// `DELETE /api/notifications`
async fn cancel_all_notifications(State(state): State<ApiState>) -> Json<Value> {
    state.dispatcher.cancel_all_notifications().await;
    Json(json!({ "success": true }))
}

/// `GET /api/worker/pending`
async fn worker_pending(State(state): State<ApiState>) -> ApiResult {
    let worker = state
        .worker
        .as_ref()
        .ok_or_else(|| api_error(StatusCode::SERVICE_UNAVAILABLE, "worker not running"))?;
    let pending = worker
        .list(state.worker_timeout)
        .await
        .ok_or_else(|| api_error(StatusCode::SERVICE_UNAVAILABLE, "worker not responding"))?;
    Ok(Json(json!({ "pending": pending })))
}

/// Build the axum router with shared state.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route(
            "/api/push/subscribe",
            get(public_key).post(subscribe).delete(unsubscribe),
        )
        .route(
            "/api/push/schedule",
            get(push_sweep_or_list)
                .post(push_schedule)
                .delete(push_unschedule)
                .patch(push_sweep),
        )
        .route(
            "/api/notifications",
            post(schedule_notification).delete(cancel_all_notifications),
        )
        .route("/api/notifications/test", post(test_notification))
        .route("/api/notifications/{task_id}", delete(cancel_notification))
        .route("/api/worker/pending", get(worker_pending))
        .layer(middleware::from_fn_with_state(state.clone(), guard))
        .layer(axum::extract::DefaultBodyLimit::max(1024 * 1024)) // 1 MB max request body
        .with_state(state)
}

/// Start the API server. Runs until the task is aborted.
pub async fn serve(config: ApiConfig, state: ApiState) {
    let app = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("API server failed to bind to {addr}: {e}");
            return;
        }
    };

    info!("API server listening on {addr}");

    if let Err(e) = axum::serve(listener, app).await {
        error!("API server error: {e}");
    }
}
