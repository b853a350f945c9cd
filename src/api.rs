//! REST API Server for chat digests
//!
//! Exposes report jobs over HTTP. The streaming endpoint forwards
//! progress events as Server-Sent Events while the job runs.

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::DigestError;
use crate::progress::{ChannelSink, TracingSink};
use crate::report::{ReportJob, ReportRequest};

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type ApiError = (StatusCode, Json<ApiResponse>);

fn status_for(error: &DigestError) -> StatusCode {
    match error {
        DigestError::InvalidWindow(_) | DigestError::Report(_) => StatusCode::BAD_REQUEST,
        DigestError::Overloaded { .. } => StatusCode::SERVICE_UNAVAILABLE,
        DigestError::Resolution { .. } | DigestError::Fetch { .. } | DigestError::Upstream(_) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(error: DigestError) -> ApiError {
    (status_for(&error), Json(ApiResponse::error(error.to_string())))
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub job: Arc<ReportJob>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "services": state.job.context().metrics.snapshot(),
    }))
}

/// =============================
/// Report Endpoints
/// =============================

async fn stream_report(
    State(state): State<ApiState>,
    Json(req): Json<ReportRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    req.validate().map_err(api_error)?;

    info!(
        conversations = req.conversation_ids.len(),
        "Received streaming report request"
    );

    let (sink, rx) = ChannelSink::new();
    let job = state.job.clone();

    // The sink is dropped when the job ends, which ends the stream.
    tokio::spawn(async move {
        let _ = job.run(&req, &sink).await;
    });

    let stream = UnboundedReceiverStream::new(rx).map(|event| {
        Event::default()
            .event(event.stage.clone())
            .json_data(&event)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn run_report(
    State(state): State<ApiState>,
    Json(req): Json<ReportRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    info!(
        conversations = req.conversation_ids.len(),
        "Received report request"
    );

    let result = state.job.run(&req, &TracingSink).await.map_err(api_error)?;
    Ok(Json(ApiResponse::success(result)))
}

/// =============================
/// Router
/// =============================

pub fn create_router(job: Arc<ReportJob>) -> Router {
    let state = ApiState { job };

    Router::new()
        .route("/health", get(health))
        .route("/api/reports", post(stream_report))
        .route("/api/reports/sync", post(run_report))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    job: Arc<ReportJob>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(job);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DigestContext;
    use crate::messaging::testing::{feed, ts, FakeDirectory, FakeSource};
    use crate::messaging::FetchLimits;
    use crate::report::{JobSettings, ReportWriter};
    use crate::summary::testing::ScriptedModel;
    use crate::summary::RetryPolicy;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::Duration;
    use tower::ServiceExt;

    fn router_with(
        dir: &tempfile::TempDir,
        model: Arc<ScriptedModel>,
        retry: RetryPolicy,
    ) -> Router {
        let source = FakeSource::new(feed(ts(2024, 1, 2, 12, 0), Duration::hours(1), 4, 10));
        let job = ReportJob::new(
            DigestContext::new(),
            Arc::new(source),
            Arc::new(FakeDirectory::new(&[])),
            model,
            JobSettings {
                fetch: FetchLimits { page_size: 10, max_pages: 20 },
                retry,
                ..JobSettings::default()
            },
            ReportWriter::new(dir.path()),
        );
        create_router(Arc::new(job))
    }

    fn router(dir: &tempfile::TempDir) -> Router {
        router_with(
            dir,
            Arc::new(ScriptedModel::new(vec![Ok("- digest".into())])),
            RetryPolicy::default(),
        )
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_service_counters() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(&dir)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["services"]["messaging-api"]["calls"], 0);
        assert!(body["services"]["ai-service"].is_object());
    }

    #[tokio::test]
    async fn test_sync_report_returns_result() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(&dir)
            .oneshot(post_json(
                "/api/reports/sync",
                serde_json::json!({
                    "conversation_ids": ["c1"],
                    "from": "2024-01-01T00:00:00Z",
                    "to": "2024-01-02T00:00:00Z",
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["summary"], "- digest");
        assert_eq!(body["data"]["conversations"][0]["route"], "chat");
    }

    #[tokio::test]
    async fn test_inverted_window_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(&dir)
            .oneshot(post_json(
                "/api/reports",
                serde_json::json!({
                    "conversation_ids": ["c1"],
                    "from": "2024-01-03T00:00:00Z",
                    "to": "2024-01-02T00:00:00Z",
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_streaming_report_emits_progress_events() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(&dir)
            .oneshot(post_json(
                "/api/reports",
                serde_json::json!({
                    "conversation_ids": ["c1"],
                    "from": "2024-01-01T00:00:00Z",
                    "to": "2024-01-02T00:00:00Z",
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("event: job_started"));
        assert!(text.contains("event: report_written"));
    }

    #[tokio::test]
    async fn test_health_answers_while_summary_backs_off() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(ScriptedModel::overloaded(1, Some("- late digest")));
        let app = router_with(
            &dir,
            model.clone(),
            RetryPolicy {
                max_retries: 1,
                initial_backoff: std::time::Duration::from_secs(60),
            },
        );

        let report = tokio::spawn(app.clone().oneshot(post_json(
            "/api/reports/sync",
            serde_json::json!({
                "conversation_ids": ["c1"],
                "from": "2024-01-01T00:00:00Z",
                "to": "2024-01-02T00:00:00Z",
            }),
        )));

        // Wait for the first, overloaded call; the job then sleeps for a minute.
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while model.call_times().is_empty() {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let health = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            app.oneshot(Request::get("/health").body(Body::empty()).unwrap()),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(health.status(), StatusCode::OK);
        assert_eq!(model.call_times().len(), 1);
        assert!(!report.is_finished());
        report.abort();
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            status_for(&DigestError::Overloaded { attempts: 4 }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&DigestError::Upstream("x".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&DigestError::Config("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
