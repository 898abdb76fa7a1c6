//! API module for the SSE transport
//!
//! A thin HTTP layer over the event stream store: sessions own streams,
//! producers push events through the stream's writer, and consumers attach
//! over SSE, resuming with the `Last-Event-ID` header.

pub mod http;
pub mod sse;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::types::StreamStoreError;

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: message.into(),
            code: "NOT_FOUND".to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            error: message.into(),
            code: "CONFLICT".to_string(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: message.into(),
            code: "BAD_REQUEST".to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: message.into(),
            code: "INTERNAL_ERROR".to_string(),
        }
    }
}

impl From<StreamStoreError> for ApiError {
    fn from(e: StreamStoreError) -> Self {
        match e {
            StreamStoreError::DuplicateStream { .. } | StreamStoreError::StreamCompleted { .. } => {
                ApiError::conflict(e.to_string())
            }
            StreamStoreError::ResumePointNotFound(_) => ApiError::not_found(e.to_string()),
            StreamStoreError::InvalidEventId(_) => ApiError::bad_request(e.to_string()),
            StreamStoreError::Cache(_) | StreamStoreError::Json(_) => ApiError::internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}
