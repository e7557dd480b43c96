//! Endpoints of HTTP server.
//!
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Extension, Form, Json, Router,
};
use bytes::Bytes;
use serde::Deserialize;

use crate::{
    render::render_page,
    session::{Event, Summary},
    state::AppState,
    MAX_CAPTURE_BYTES,
};

/// Slider values posted by the settings form.
#[derive(Debug, Deserialize)]
pub struct ConfigForm {
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    overlap: Option<f32>,
}

/// All routes of the page, sharing `state`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/config", post(update_config))
        .route("/capture", post(capture))
        .route("/reset", post(reset))
        .route("/captured", get(captured_image))
        .route("/annotated.jpg", get(annotated_image))
        .route("/summary", get(summary))
        .route("/healthcheck", get(healthcheck))
        .layer(DefaultBodyLimit::max(MAX_CAPTURE_BYTES))
        .layer(Extension(state))
}

/// Health check endpoint.
pub async fn healthcheck() -> &'static str {
    "healthy"
}

/// The interactive page.
pub async fn index(Extension(state): Extension<Arc<AppState>>) -> Html<String> {
    Html(state.with_session(render_page).await)
}

/// Apply changed slider values and re-evaluate.
pub async fn update_config(
    Extension(state): Extension<Arc<AppState>>,
    Form(form): Form<ConfigForm>,
) -> Result<Redirect, StatusCode> {
    let current = state
        .with_session(|session| session.config().clone())
        .await;

    // Only changed values become events, so a slider move runs the detector once
    let mut events = vec![];
    if let Some(confidence) = form.confidence {
        if confidence != current.confidence_threshold() {
            events.push(Event::SetConfidence(confidence));
        }
    }
    if let Some(overlap) = form.overlap {
        if overlap != current.overlap_threshold() {
            events.push(Event::SetOverlap(overlap));
        }
    }

    for event in events {
        log::info!("Settings changed: {:?}", event);
        dispatch(&state, event).await?;
    }

    Ok(Redirect::to("/"))
}

/// Receive an encoded still as request body.
pub async fn capture(
    Extension(state): Extension<Arc<AppState>>,
    body: Bytes,
) -> Result<Redirect, StatusCode> {
    log::info!("Received capture of {} bytes via HTTP", body.len());
    dispatch(&state, Event::Capture(body.to_vec())).await?;

    Ok(Redirect::to("/"))
}

pub async fn reset(Extension(state): Extension<Arc<AppState>>) -> Result<Redirect, StatusCode> {
    dispatch(&state, Event::Reset).await?;

    Ok(Redirect::to("/"))
}

/// The captured image as it was received.
pub async fn captured_image(Extension(state): Extension<Arc<AppState>>) -> Response {
    state.with_session(|session| match session.capture() {
        Some(capture) => (
            [(header::CONTENT_TYPE, capture.content_type())],
            capture.bytes().to_vec(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    })
    .await
}

/// The captured image with detections drawn on it.
pub async fn annotated_image(Extension(state): Extension<Arc<AppState>>) -> Response {
    state.with_session(|session| match session.report() {
        Some(report) => (
            [(header::CONTENT_TYPE, "image/jpeg")],
            report.annotated_jpeg.clone(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    })
    .await
}

/// Category counts and state of the session as JSON.
pub async fn summary(Extension(state): Extension<Arc<AppState>>) -> Json<Summary> {
    Json(state.with_session(|session| session.summary()).await)
}

async fn dispatch(state: &Arc<AppState>, event: Event) -> Result<(), StatusCode> {
    match state.dispatch(event).await {
        Ok(phase) => {
            log::debug!("Session now {:?}", phase);
            Ok(())
        }
        Err(err) => {
            log::error!("Event handling aborted: {}", err);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
