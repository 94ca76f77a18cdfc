//! HTTP surface: webhook intake and signed callback handlers.
//!
//! Every POST route runs the same verification path: resolve the source from
//! the query parameter, check the HMAC signature over the raw body, then
//! dispatch. Unregistered sources are acknowledged and dropped so scanner
//! traffic never reads as an attack.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header::HOST, HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::callbacks::CallbackScheduler;
use crate::config::Config;
use crate::models::{Action, Job, Payload};
use crate::provision::RunnerProvisioner;
use crate::sources::Source;
use crate::webhooks::{verify_signature, EVENT_HEADER, SIGNATURE_HEADER, SIGNATURE_HEADER_LEN};

const PING_EVENT: &str = "ping";
const JOB_EVENT: &str = "workflow_job";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Configuration, including the source registry.
    pub config: Arc<Config>,
    /// Callback scheduler over the durable queue.
    pub scheduler: Arc<CallbackScheduler>,
    /// Runner VM provisioner.
    pub provisioner: Arc<RunnerProvisioner>,
}

/// Build the HTTP router.
pub fn build_router(state: AppState) -> Router {
    let route_webhook = state.config.route_webhook.clone();
    let route_create_vm = state.config.route_create_vm.clone();
    let route_delete_vm = state.config.route_delete_vm.clone();

    Router::new()
        .route(&route_webhook, post(webhook_handler))
        .route(&route_create_vm, post(create_vm_handler))
        .route(&route_delete_vm, post(delete_vm_handler))
        .route("/healthcheck", get(healthcheck_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn healthcheck_handler() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// Outcome of request verification.
enum Verified<'a> {
    /// Signature checked out against this registered source.
    Source {
        /// Registry key the request carried.
        key: &'a str,
        /// The resolved source.
        source: &'a Source,
    },
    /// The source key is not registered; acknowledge and drop.
    Ignored,
}

/// Resolve the source and verify the HMAC signature over the raw body.
fn verify_request<'a>(
    state: &'a AppState,
    params: &'a HashMap<String, String>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Verified<'a>, StatusCode> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if signature.len() != SIGNATURE_HEADER_LEN {
        warn!("Request did not provide a well-formed signature");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let Some(key) = params.get(&state.config.source_query_param) else {
        error!(
            param = %state.config.source_query_param,
            "Missing source query parameter"
        );
        return Err(StatusCode::BAD_REQUEST);
    };

    let Some(source) = state.config.sources.get(key) else {
        info!(key = %key, "Source not registered - ignoring");
        return Ok(Verified::Ignored);
    };

    if !verify_signature(body, signature, &source.secret) {
        warn!(key = %key, "Signature did not match");
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(Verified::Source { key, source })
}

/// Round-trip URL for a callback, carrying the registry key so the callback
/// leg resolves the identical source.
fn callback_url(headers: &HeaderMap, path: &str, param: &str, key: &str) -> Option<String> {
    let host = headers.get(HOST).and_then(|v| v.to_str().ok())?;
    Some(format!(
        "https://{host}{path}?{param}={}",
        urlencoding::encode(key)
    ))
}

fn ignored(reason: &str) -> Json<Value> {
    Json(json!({ "status": "ignored", "reason": reason }))
}

/// Handle incoming GitHub webhooks.
async fn webhook_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, StatusCode> {
    info!("Received webhook");

    let (key, source) = match verify_request(&state, &params, &headers, &body)? {
        Verified::Source { key, source } => (key, source),
        Verified::Ignored => return Ok(ignored("unknown_source")),
    };

    let event = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if event == PING_EVENT {
        info!("Webhook ping acknowledged");
        return Ok(Json(json!({ "status": "ok" })));
    }
    if event != JOB_EVENT {
        info!(event = %event, "Unknown GitHub webhook event received - ignoring");
        return Ok(ignored("unknown_event"));
    }

    let payload: Payload = serde_json::from_slice(&body).map_err(|e| {
        error!(
            error = %e,
            "Can not parse payload - is the webhook content type set to \"application/json\"?"
        );
        StatusCode::BAD_REQUEST
    })?;
    debug!(action = ?payload.action, job_id = payload.workflow_job.id, "Parsed workflow job event");

    match payload.action {
        Action::Queued => {
            let (ok, missing) = payload.workflow_job.has_all_labels(&state.config.runner_labels);
            if !ok {
                warn!(
                    missing = %missing.join(", "),
                    "Webhook requested to start a runner that is missing labels - ignoring"
                );
                return Ok(ignored("missing_labels"));
            }

            let url = callback_url(
                &headers,
                &state.config.route_create_vm,
                &state.config.source_query_param,
                key,
            )
            .ok_or_else(|| {
                error!("Missing host header");
                StatusCode::BAD_REQUEST
            })?;

            state
                .scheduler
                .schedule(&url, &source.secret, &payload.workflow_job)
                .await
                .map_err(|e| {
                    error!(error = %e, "Can not enqueue create-vm callback");
                    StatusCode::INTERNAL_SERVER_ERROR
                })?;

            Ok(Json(json!({
                "status": "accepted",
                "callback": "create_vm",
                "job_id": payload.workflow_job.id
            })))
        }
        Action::Completed => {
            let expected = source
                .source_type
                .effective_runner_group_id(state.config.runner_group_id);
            let actual = payload.workflow_job.runner_group_id.unwrap_or_default();
            if actual != expected {
                warn!(
                    expected,
                    actual,
                    "Webhook signaled to delete a runner that does not belong to the expected runner group - ignoring"
                );
                return Ok(ignored("runner_group_mismatch"));
            }

            let (ok, missing) = payload.workflow_job.has_all_labels(&state.config.runner_labels);
            if !ok {
                warn!(
                    missing = %missing.join(", "),
                    "Webhook signaled to delete a runner that is missing labels - ignoring"
                );
                return Ok(ignored("missing_labels"));
            }

            let url = callback_url(
                &headers,
                &state.config.route_delete_vm,
                &state.config.source_query_param,
                key,
            )
            .ok_or_else(|| {
                error!("Missing host header");
                StatusCode::BAD_REQUEST
            })?;

            state
                .scheduler
                .schedule(&url, &source.secret, &payload.workflow_job)
                .await
                .map_err(|e| {
                    error!(error = %e, "Can not enqueue delete-vm callback");
                    StatusCode::INTERNAL_SERVER_ERROR
                })?;

            Ok(Json(json!({
                "status": "accepted",
                "callback": "delete_vm",
                "job_id": payload.workflow_job.id
            })))
        }
        Action::InProgress | Action::Waiting | Action::Other => {
            Ok(Json(json!({ "status": "ok", "reason": "no_action" })))
        }
    }
}

/// Handle create-VM callbacks dispatched by the task queue.
async fn create_vm_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, StatusCode> {
    info!("Received create-vm callback");

    let source = match verify_request(&state, &params, &headers, &body)? {
        Verified::Source { source, .. } => source,
        Verified::Ignored => return Ok(ignored("unknown_source")),
    };

    let job: Job = serde_json::from_slice(&body).map_err(|e| {
        error!(error = %e, "Can not parse callback job");
        StatusCode::BAD_REQUEST
    })?;

    let runner_group_id = source
        .source_type
        .effective_runner_group_id(state.config.runner_group_id);
    info!(
        source = %source.name,
        source_type = %source.source_type,
        "Using jit config for runner registration"
    );

    match state.provisioner.create_vm(source, runner_group_id, &job).await {
        Ok(instance) => Ok(Json(json!({ "status": "created", "instance": instance }))),
        Err(e) => {
            error!(error = %e, job_id = job.id, "Failed to create runner instance");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Handle delete-VM callbacks dispatched by the task queue.
async fn delete_vm_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, StatusCode> {
    info!("Received delete-vm callback");

    if let Verified::Ignored = verify_request(&state, &params, &headers, &body)? {
        return Ok(ignored("unknown_source"));
    }

    let job: Job = serde_json::from_slice(&body).map_err(|e| {
        error!(error = %e, "Can not parse callback job");
        StatusCode::BAD_REQUEST
    })?;

    let Some(runner_name) = job.runner_name.as_deref().filter(|n| !n.is_empty()) else {
        warn!(job_id = job.id, "Delete callback without a runner name");
        return Err(StatusCode::BAD_REQUEST);
    };

    match state.provisioner.delete_vm(runner_name).await {
        Ok(()) => Ok(Json(json!({ "status": "deleted", "instance": runner_name }))),
        Err(e) => {
            error!(error = %e, instance = %runner_name, "Failed to delete runner instance");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
