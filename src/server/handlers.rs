//! Request dispatcher and the fixed JSON endpoints.

use super::AppState;
use crate::error::{AppError, Result};
use crate::proxy::response::{CORS_ALLOW_HEADERS, CORS_ALLOW_METHODS, CORS_MAX_AGE};
use crate::stats::SharedStats;
use crate::{log_error, log_warn};
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Json, Response};
use chrono::{SecondsFormat, Utc};
use http::{header, HeaderValue, Method, StatusCode};
use serde_json::{json, Value};
use std::any::Any;
use std::time::Instant;

const SERVICE_NAME: &str = "SourceForge Proxy API";
const UNKNOWN_CLIENT: &str = "unknown";

/// Single entry point for every inbound request and the outermost failure
/// boundary: nothing below it reaches the client as anything but JSON.
pub async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let started = Instant::now();

    // A due flush keeps running after the response has been sent.
    let _detached_flush = state.stats.prepare(Utc::now()).await;

    let client_id = client_id(&request, &state.config.proxy.client_ip_header);
    state.stats.record_client(&client_id).await;

    if request.method() == Method::OPTIONS {
        return preflight();
    }

    let path = request.uri().path().to_string();
    let result = match path.as_str() {
        "/" | "/api" => Ok(api_info()),
        "/health" => Ok(health(&state)),
        "/stats" => stats_report(&state).await,
        _ => {
            let result = state.proxy.handle(&path).await;
            state.stats.record_response_time(started.elapsed()).await;
            result
        }
    };

    match result {
        Ok(response) => response,
        Err(err) => failure_response(&state, err).await,
    }
}

fn client_id(request: &Request, header_name: &str) -> String {
    request
        .headers()
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

async fn failure_response(state: &AppState, err: AppError) -> Response {
    state.stats.record_error().await;

    match err {
        AppError::Proxy(e) => {
            log_warn!("[proxy] request failed: {}", e);
            error_response(e.status(), &e.to_string())
        }
        other => {
            log_error!(other => "[server] unhandled failure");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

/// Turns a panic that escaped the dispatcher into the generic 500.
pub fn panic_response(stats: &SharedStats, panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload");
    log_error!("[server] request handler panicked: {}", detail);

    let stats = stats.clone();
    tokio::spawn(async move { stats.record_error().await });
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn json_response(status: StatusCode, body: Value) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

pub fn error_response(status: StatusCode, message: &str) -> Response {
    json_response(
        status,
        json!({
            "error": true,
            "message": message,
            "status": status.as_u16(),
            "timestamp": timestamp(),
        }),
    )
}

fn preflight() -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static(CORS_MAX_AGE),
    );
    response
}

fn api_info() -> Response {
    json_response(
        StatusCode::OK,
        json!({
            "name": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "description": "SourceForge mirror download accelerator",
            "usage": {
                "example": "https://<proxy-host>/projects/project-name/files/file.zip/download",
                "original": "https://sourceforge.net/projects/project-name/files/file.zip/download",
            },
        }),
    )
}

fn health(state: &AppState) -> Response {
    json_response(
        StatusCode::OK,
        json!({
            "status": "healthy",
            "timestamp": timestamp(),
            "uptime": state.started.elapsed().as_secs(),
            "version": env!("CARGO_PKG_VERSION"),
        }),
    )
}

async fn stats_report(state: &AppState) -> Result<Response> {
    let report = state.stats.report(Utc::now()).await;
    Ok(json_response(StatusCode::OK, serde_json::to_value(report)?))
}
