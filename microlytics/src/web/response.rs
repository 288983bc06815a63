//! JSON response rendering.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::CONTENT_TYPE;
use hyper::{Response, StatusCode};
use serde::Serialize;
use serde_json::json;

use super::error::RequestError;

pub type HttpResponse = Response<Full<Bytes>>;

/// 200 with a JSON body.
pub fn render<T: Serialize>(data: &T) -> HttpResponse {
    match serde_json::to_vec(data) {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(_) => render_error(&RequestError::Internal),
    }
}

/// Empty 200, for writes that return nothing.
pub fn render_empty() -> HttpResponse {
    Response::builder()
        .status(StatusCode::OK)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

/// Error body `{"code": ..., "message": ...}` with the error's status.
pub fn render_error(err: &RequestError) -> HttpResponse {
    let body = json!({
        "code": err.code(),
        "message": err.to_string(),
    });

    json_response(
        err.status(),
        serde_json::to_vec(&body).unwrap_or_default(),
    )
}

/// Plain 404 for routes outside the API surface.
pub fn render_not_found() -> HttpResponse {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

fn json_response(status: StatusCode, body: Vec<u8>) -> HttpResponse {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}
