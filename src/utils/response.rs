//! Response building for the HTTP apps.
//!
//! Successful bodies are wrapped as `{"data": ...}`, failures as
//! `{"error": {"kind": ..., "message": ...}}`.

use http::{header, HeaderValue, Response, StatusCode};
use serde::Serialize;

use crate::core::error::RalError;

/// Standard content types
pub mod content_type {
    pub const TEXT_PLAIN: &str = "text/plain";
    pub const APPLICATION_JSON: &str = "application/json";
}

#[derive(Serialize)]
pub struct ResponseEnvelope<'a, T> {
    pub data: &'a T,
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    kind: &'a str,
    message: String,
}

/// HTTP status an engine error is reported with.
pub fn status_for(err: &RalError) -> StatusCode {
    match err {
        RalError::PoolSaturated(_) => StatusCode::SERVICE_UNAVAILABLE,
        RalError::Collaborator { .. } => StatusCode::BAD_GATEWAY,
        RalError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        RalError::Validation(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub struct ResponseBuilder;

impl ResponseBuilder {
    fn with_status(
        status: StatusCode,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Response<Vec<u8>> {
        let mut builder = Response::builder().status(status);

        if let Some(ct) = content_type {
            match HeaderValue::from_str(ct) {
                Ok(header_value) => {
                    builder = builder.header(header::CONTENT_TYPE, header_value);
                }
                Err(e) => {
                    log::error!("Invalid content type '{}': {}", ct, e);
                }
            }
        }

        builder.body(body).unwrap_or_else(|e| {
            log::error!("Failed to build response: {}", e);
            Self::error_http(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        })
    }

    /// Plain text error response
    pub fn error_http(status: StatusCode, message: &str) -> Response<Vec<u8>> {
        let mut response = Response::new(message.as_bytes().to_vec());
        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(content_type::TEXT_PLAIN),
        );
        response
    }

    /// Raw JSON body without envelope
    pub fn json<T: Serialize>(status: StatusCode, data: &T) -> Response<Vec<u8>> {
        match serde_json::to_vec(data) {
            Ok(body) => Self::with_status(status, body, Some(content_type::APPLICATION_JSON)),
            Err(e) => {
                log::error!("Failed to serialize JSON response: {}", e);
                Self::error_http(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "JSON serialization failed",
                )
            }
        }
    }

    /// `{"data": ...}` with 200
    pub fn success_json<T: Serialize>(data: &T) -> Response<Vec<u8>> {
        Self::json(StatusCode::OK, &ResponseEnvelope { data })
    }

    /// `{"error": ...}` with the status mapped from the error
    pub fn error_json(err: &RalError) -> Response<Vec<u8>> {
        let envelope = ErrorEnvelope {
            error: ErrorBody {
                kind: err.kind(),
                message: err.to_string(),
            },
        };
        Self::json(status_for(err), &envelope)
    }
}

/// Common error response helpers
pub struct CommonErrors;

impl CommonErrors {
    pub fn not_found() -> Response<Vec<u8>> {
        ResponseBuilder::error_http(StatusCode::NOT_FOUND, "Not Found")
    }

    pub fn method_not_allowed() -> Response<Vec<u8>> {
        ResponseBuilder::error_http(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
    }
}
