//! HTTP request handlers.
//!
//! This module provides the routes the hosting platform talks to: the health check,
//! the transcription route, and two informational routes.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{error, info_span, warn, Instrument};
use uuid::Uuid;

use crate::asr::{panic_message, AudioSource, InferenceRequest, InferenceResponse};
use crate::constants::http::{
    INVOCATIONS_ROUTE, JSON_CONTENT_TYPE, METRICS_ROUTE, PING_ROUTE, ROOT_ROUTE,
};
use crate::error::{AppError, Result};
use crate::server::metrics::Outcome;
use crate::server::state::ServiceContext;

/// Health check. 200 once the model is ready, 503 before that. Empty body.
pub async fn ping(State(ctx): State<Arc<ServiceContext>>) -> StatusCode {
    if ctx.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Informational root route.
pub async fn root(State(ctx): State<Arc<ServiceContext>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "model": ctx.model_id(),
        "status": ctx.readiness().as_status(),
        "endpoints": {
            PING_ROUTE: "Health check",
            INVOCATIONS_ROUTE: "Transcription endpoint",
            METRICS_ROUTE: "Service counters",
        }
    }))
}

/// Metrics endpoint.
pub async fn metrics_handler(State(ctx): State<Arc<ServiceContext>>) -> impl IntoResponse {
    Json(ctx.metrics.to_json())
}

/// Transcribe the audio named by a JSON request body.
pub async fn invocations(
    State(ctx): State<Arc<ServiceContext>>,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Json<InferenceResponse>> {
    let started = Instant::now();
    let _in_flight = ctx.metrics.begin();
    let span = info_span!("invocation", request_id = %Uuid::new_v4());

    let result = match body {
        Ok(body) => {
            transcribe_request(&ctx, &headers, &body, started)
                .instrument(span.clone())
                .await
        }
        Err(rejection) => Err(body_rejection(rejection)),
    };

    let _entered = span.enter();
    match &result {
        Ok(response) => {
            ctx.metrics.finish(Outcome::Success);
            ctx.metrics.record_processing_time(response.processing_time);
        }
        Err(e @ AppError::NotReady(_)) => {
            ctx.metrics.finish(Outcome::NotReady);
            warn!(error = %e, "Rejected invocation");
        }
        Err(e) if e.status_code().is_client_error() => {
            ctx.metrics.finish(Outcome::ClientError);
            warn!(error = %e, "Rejected invocation");
        }
        Err(e) => {
            ctx.metrics.finish(Outcome::ServerError);
            error!(error = %e, "Invocation failed");
        }
    }

    result.map(Json)
}

async fn transcribe_request(
    ctx: &ServiceContext,
    headers: &HeaderMap,
    body: &[u8],
    started: Instant,
) -> Result<InferenceResponse> {
    check_content_type(headers)?;

    let request: InferenceRequest = serde_json::from_slice(body)
        .map_err(|e| AppError::InvalidInput(format!("malformed JSON body: {}", e)))?;
    let source = AudioSource::from_raw(request.audio.as_ref())?;
    let model = ctx.ready_model()?;

    tracing::debug!(
        source = source.kind(),
        timestamps = request.timestamps,
        language = request.language.as_deref().unwrap_or("unspecified"),
        "Accepted invocation"
    );

    ctx.pipeline
        .run(model.as_ref(), &source, request.timestamps, started)
        .await
}

/// Accept `application/json` in any letter case, with or without parameters.
fn check_content_type(headers: &HeaderMap) -> Result<()> {
    let raw = match headers.get(header::CONTENT_TYPE) {
        Some(value) => String::from_utf8_lossy(value.as_bytes()).into_owned(),
        None => return Err(AppError::UnsupportedMediaType("none".to_string())),
    };

    let essence = raw.split(';').next().unwrap_or_default().trim();
    if essence.eq_ignore_ascii_case(JSON_CONTENT_TYPE) {
        Ok(())
    } else {
        Err(AppError::UnsupportedMediaType(raw))
    }
}

/// Body read failures keep the JSON error shape; oversized bodies stay 413.
fn body_rejection(rejection: BytesRejection) -> AppError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(rejection.body_text())
    } else {
        AppError::InvalidInput(rejection.body_text())
    }
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic_message(panic.as_ref());
    error!(panic = %message, "Handler panicked");
    AppError::Internal(message).into_response()
}

/// Create the application router.
pub fn create_router(ctx: Arc<ServiceContext>, max_request_bytes: usize) -> Router {
    Router::new()
        .route(ROOT_ROUTE, get(root))
        .route(PING_ROUTE, get(ping))
        .route(INVOCATIONS_ROUTE, post(invocations))
        .route(METRICS_ROUTE, get(metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::custom(panic_response))
                .layer(DefaultBodyLimit::max(max_request_bytes)),
        )
        .with_state(ctx)
}
