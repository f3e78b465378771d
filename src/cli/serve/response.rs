//! HTTP response helpers.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tiny_http::{Header, Method, Request, Response, StatusCode};

use crate::utils::mime;

/// Respond with a stored artifact file.
pub fn respond_file(request: Request, path: &Path) -> Result<()> {
    let content_type = mime::content_type(path);
    if is_head_request(&request) {
        let response =
            Response::empty(StatusCode(200)).with_header(header("Content-Type", content_type));
        return request.respond(response).map_err(Into::into);
    }

    let body = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    send_body(request, 200, content_type, body)
}

pub fn respond_json<T: Serialize>(request: Request, status: u16, value: &T) -> Result<()> {
    let body = serde_json::to_vec(value)?;
    send_body(request, status, mime::JSON, body)
}

/// `{"error": "..."}` with the given status.
pub fn respond_error(request: Request, status: u16, message: &str) -> Result<()> {
    respond_json(request, status, &serde_json::json!({ "error": message }))
}

pub fn respond_not_found(request: Request) -> Result<()> {
    respond_error(request, 404, "not found")
}

/// Respond with 503 Service Unavailable (server shutting down).
pub fn respond_unavailable(request: Request) -> Result<()> {
    respond_error(request, 503, "shutting down")
}

fn is_head_request(request: &Request) -> bool {
    request.method() == &Method::Head
}

fn send_body(request: Request, status: u16, content_type: &'static str, body: Vec<u8>) -> Result<()> {
    let response = Response::from_data(body)
        .with_status_code(StatusCode(status))
        .with_header(header("Content-Type", content_type))
        .with_header(header("Cache-Control", "no-cache"));
    request.respond(response)?;
    Ok(())
}

fn header(key: &'static str, value: &'static str) -> Header {
    Header::from_bytes(key, value).unwrap()
}
