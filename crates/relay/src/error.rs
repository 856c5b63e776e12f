// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors the relay reports to HTTP callers.
///
/// Per-connection failures (send errors, transport errors) never reach a
/// caller; they are logged and the connection is dropped from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayError {
    MissingPayload,
    NotFound,
    ShuttingDown,
}

impl RelayError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::MissingPayload => 400,
            Self::NotFound => 404,
            Self::ShuttingDown => 503,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingPayload => "MISSING_PAYLOAD",
            Self::NotFound => "NOT_FOUND",
            Self::ShuttingDown => "SHUTTING_DOWN",
        }
    }

    /// Human-readable message used when the caller supplies none.
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::MissingPayload => "The \"message\" field is required.",
            Self::NotFound => "Not found.",
            Self::ShuttingDown => "Server is shutting down.",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { status: "error".to_owned(), message: message.into() }
    }

    pub fn to_http_response(&self, message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_error_body(message)))
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for RelayError {}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        self.to_http_response(self.default_message()).into_response()
    }
}

/// Error envelope: `{"status":"error","message":"..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: String,
    pub message: String,
}
