//! HTTP surface: the authoritative contract of the boundary.
//!
//! | POST /submit        | multipart `file` -> `{job_id, status: "QUEUED"}` |
//! | GET  /status/{id}   | registry row, 404 if absent                      |
//! | GET  /ws/{id}       | upgrade; streams event JSON until peer closes    |
//! | GET  /              | static index page                                |
//! | GET  /metrics       | counters in exposition format                    |

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crucible_protocol::{JobId, JobStatus, QueueMessage};

use crate::metrics::METRICS;
use crate::state::AppState;

const INDEX_HTML: &str = include_str!("../static/index.html");

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/submit", post(submit))
        .route("/status/:job_id", get(status))
        .route("/ws/:job_id", get(live))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    job_id: String,
    status: JobStatus,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    job_id: String,
    status: JobStatus,
    submitted_at: DateTime<Utc>,
    logs: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

struct ApiError {
    code: StatusCode,
    detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            code: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    fn internal(detail: impl Into<String>) -> Self {
        Self {
            code: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }

    fn not_found(detail: impl Into<String>) -> Self {
        Self {
            code: StatusCode::NOT_FOUND,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Ingress gate. Step ordering is mandatory: artifact upload, then
/// registry commit, then enqueue. An upload failure is fail-fast with
/// nothing recorded; an enqueue failure leaves the job QUEUED for the
/// orphan sweep and is reported to the operator, not the client.
async fn submit(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<SubmitResponse>, ApiError> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or("").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("Unreadable upload: {}", e)))?;
            upload = Some((filename, bytes.to_vec()));
            break;
        }
    }
    let Some((filename, bytes)) = upload else {
        return Err(ApiError::bad_request("Missing 'file' field"));
    };

    let job_id = JobId::new();

    if let Err(e) = state.store.put(&job_id, bytes).await {
        METRICS.inc_upload_failures();
        return Err(ApiError::internal(format!("Artifact upload failed: {}", e)));
    }

    state
        .registry
        .insert_queued(&job_id, &filename)
        .await
        .map_err(|e| ApiError::internal(format!("Registry insert failed: {}", e)))?;

    if let Err(e) = state.queue.enqueue(&QueueMessage::new(&job_id)).await {
        // The job row is committed; a sweeper can requeue it later.
        error!("CRITICAL: failed to enqueue job {}: {}", job_id, e);
        METRICS.inc_enqueue_failures();
    }

    METRICS.inc_jobs_submitted();
    info!("Accepted job {} ({})", job_id, filename);

    Ok(Json(SubmitResponse {
        job_id: job_id.to_string(),
        status: JobStatus::Queued,
    }))
}

async fn status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    METRICS.inc_status_requests();

    let id = JobId::parse(&job_id).map_err(|_| {
        METRICS.inc_status_not_found();
        ApiError::not_found("Job not found")
    })?;

    let job = state
        .registry
        .fetch(&id)
        .await
        .map_err(|e| ApiError::internal(format!("Registry read failed: {}", e)))?
        .ok_or_else(|| {
            METRICS.inc_status_not_found();
            ApiError::not_found("Job not found")
        })?;

    Ok(Json(StatusResponse {
        job_id: job.id,
        status: job.status,
        submitted_at: job.created_at,
        logs: job.logs,
    }))
}

async fn live(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| serve_live(socket, state, job_id))
}

/// One live viewer. Events arrive via the hub channel; anything the
/// peer sends is drained and ignored. The loop ends when the peer
/// closes or a newer viewer for the same job id evicts this one.
async fn serve_live(mut socket: WebSocket, state: Arc<AppState>, job_id: String) {
    METRICS.inc_ws_connected();
    let (token, mut events, evicted_previous) = state.hub.subscribe(&job_id);
    if evicted_previous {
        METRICS.inc_ws_evicted();
    }
    info!("Viewer attached for job {}", job_id);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(payload) => {
                    if socket.send(Message::Text(payload)).await.is_err() {
                        break;
                    }
                }
                // Sender gone: a newer viewer took this job id.
                None => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }

    state.hub.unsubscribe(&job_id, token);
    info!("Viewer detached for job {}", job_id);
}

async fn metrics() -> String {
    METRICS.prometheus_format()
}
