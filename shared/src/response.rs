use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::Serialize;

use crate::error::ApiError;

const ALLOWED_METHODS: &str = "GET,POST,PUT,DELETE,OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type,Authorization,X-User-Id";

/// JSON response with the CORS headers the web client needs.
pub fn json<T: Serialize>(status: StatusCode, body: &T, origin: &str) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", origin)
        .header("Access-Control-Allow-Credentials", "true")
        .body(serde_json::to_string(body)?.into())
        .map_err(Box::new)?)
}

pub fn message(status: StatusCode, text: &str, origin: &str) -> Result<Response<Body>, Error> {
    json(status, &serde_json::json!({ "message": text }), origin)
}

/// Render an [`ApiError`]. Internal failures are logged here and answered generically.
pub fn error(err: &ApiError, origin: &str) -> Result<Response<Body>, Error> {
    match err {
        ApiError::Internal(detail) => tracing::error!("Request failed: {}", detail),
        other => tracing::info!("Request rejected: {}", other),
    }
    message(err.status_code(), &err.client_message(), origin)
}

pub fn preflight(origin: &str) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", origin)
        .header("Access-Control-Allow-Credentials", "true")
        .header("Access-Control-Allow-Methods", ALLOWED_METHODS)
        .header("Access-Control-Allow-Headers", ALLOWED_HEADERS)
        .body(Body::Empty)
        .map_err(Box::new)?)
}
