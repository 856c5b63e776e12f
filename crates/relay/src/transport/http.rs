// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers: the trigger endpoint and health reporting.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::registry::Payload;
use crate::state::{iso_timestamp, RelayState};

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub clients: usize,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub status: String,
    pub message: String,
    #[serde(rename = "clientsCount", default, skip_serializing_if = "Option::is_none")]
    pub clients_count: Option<usize>,
}

/// Pull a usable payload out of a trigger body.
///
/// Falsy values (missing key, `null`, `""`, `false`, `0`) and bodies that are
/// not JSON objects yield `None`. Other non-string values are relayed as
/// their JSON text.
pub fn extract_message(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    match value.get("message")? {
        serde_json::Value::Null | serde_json::Value::Bool(false) => None,
        serde_json::Value::String(s) if s.is_empty() => None,
        serde_json::Value::Number(n) if n.as_f64() == Some(0.0) => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Whether `headers` declare a JSON body. Media type parameters are ignored.
pub fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

// -- Handlers -----------------------------------------------------------------

/// `GET /health`
pub async fn health(State(s): State<Arc<RelayState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_owned(),
        service: s.config.service_name.clone(),
        clients: s.registry.size(),
        timestamp: iso_timestamp(),
    })
}

/// `POST /trigger`: broadcast `{"message": ...}` to every connected client.
pub async fn trigger(
    State(s): State<Arc<RelayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let message = if is_json_content_type(&headers) { extract_message(&body) } else { None };
    let Some(message) = message else {
        tracing::debug!(bytes = body.len(), "trigger rejected: missing message");
        return RelayError::MissingPayload.into_response();
    };

    let clients = s.registry.size();
    tracing::info!(message = %message, clients, "trigger received");

    if clients == 0 {
        return no_clients(&s);
    }

    let delivered = s.registry.broadcast(&Payload::Text(message), None).await;
    tracing::info!(delivered, "trigger broadcast complete");
    if delivered == 0 {
        return no_clients(&s);
    }

    Json(TriggerResponse {
        status: "success".to_owned(),
        message: "Message broadcasted successfully.".to_owned(),
        clients_count: Some(delivered),
    })
    .into_response()
}

fn no_clients(s: &RelayState) -> Response {
    Json(TriggerResponse {
        status: "info".to_owned(),
        message: format!("Trigger received, but no {} are connected.", s.config.client_label),
        clients_count: None,
    })
    .into_response()
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
