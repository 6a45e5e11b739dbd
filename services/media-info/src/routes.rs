//! Media information service routes

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, header},
    response::{Html, IntoResponse},
    routing::get,
};
use serde_json::json;

use crate::{
    context::RequestContext,
    docs::{self, CapabilityReport},
    error::{ServiceError, ServiceResult},
    pipeline,
    state::AppState,
};

/// Create the router for the media information service
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/",
            get(status_page)
                .post(probe_media)
                // `get` would otherwise answer HEAD as well
                .head(method_not_allowed)
                .fallback(method_not_allowed),
        )
        .route("/health", get(health_check))
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "media-info"
    }))
}

/// Documentation page with a live capability report
pub async fn status_page(State(state): State<AppState>, headers: HeaderMap) -> Html<String> {
    let report = CapabilityReport::gather(&state.config).await;
    Html(docs::render_page(&report, &endpoint_url(&headers)))
}

/// Download, probe and describe the media file named in the JSON body
pub async fn probe_media(
    State(state): State<AppState>,
    body: Bytes,
) -> ServiceResult<impl IntoResponse> {
    let ctx = RequestContext::begin(&state.config).await;
    let info = pipeline::run_with_budget(&state, &ctx, &body).await?;

    Ok(Json(info))
}

pub async fn method_not_allowed() -> ServiceError {
    ServiceError::MethodNotAllowed
}

fn endpoint_url(headers: &HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .filter(|p| *p == "https")
        .unwrap_or("http");

    format!("{}://{}/", scheme, host)
}
