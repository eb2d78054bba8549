// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-LoanIntake-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Loan Intake and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Session resolution in front of the streamable HTTP service.
//!
//! A stateful `POST /mcp` without a live session token is not rejected: a stale token is
//! dropped and a fresh session is opened. When that first message is not `initialize`, the
//! handshake is performed on the caller's behalf before the message is delivered.

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{Request, State};
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rmcp::model::{ClientJsonRpcMessage, ClientRequest};
use rmcp::transport::streamable_http_server::session::{SessionId, SessionManager};
use serde_json::{json, Value};

use super::http::{HttpTransport, MCP_PATH, SESSION_HEADER};
use super::sessions::SessionMode;

/// Largest JSON-RPC message accepted on `POST /mcp`.
pub const MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const INTERNAL_ERROR: i64 = -32603;

const HANDSHAKE_ID: &str = "loan-intake-handshake";
const HANDSHAKE_PROTOCOL_VERSION: &str = "2025-03-26";
const STREAM_ACCEPT: &str = "application/json, text/event-stream";

pub(super) async fn handle_mcp(
    State(transport): State<HttpTransport>,
    request: Request,
) -> Response {
    let stateful = transport.mode() == SessionMode::Stateful;
    match request.method().clone() {
        Method::POST => post(&transport, request, stateful).await,
        Method::DELETE if stateful => delete(&transport, request).await,
        _ => forward(&transport, request).await,
    }
}

async fn post(transport: &HttpTransport, request: Request, stateful: bool) -> Response {
    let (mut parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_MESSAGE_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::debug!(error = %err, "unreadable request body");
            return rpc_error(StatusCode::BAD_REQUEST, INVALID_REQUEST, "unreadable request body");
        }
    };
    let message = match serde_json::from_slice::<ClientJsonRpcMessage>(&bytes) {
        Ok(message) => message,
        Err(err) if err.is_syntax() || err.is_eof() => {
            tracing::debug!(error = %err, "rejecting malformed message");
            return rpc_error(StatusCode::BAD_REQUEST, PARSE_ERROR, &format!("parse error: {err}"));
        }
        Err(err) => {
            tracing::debug!(error = %err, "rejecting invalid message");
            let message = format!("invalid request: {err}");
            return rpc_error(StatusCode::BAD_REQUEST, INVALID_REQUEST, &message);
        }
    };
    if !stateful {
        return forward(transport, Request::from_parts(parts, Body::from(bytes))).await;
    }

    let session = match live_session(transport, &parts.headers).await {
        Some(session) => session,
        None => {
            parts.headers.remove(SESSION_HEADER);
            match &message {
                ClientJsonRpcMessage::Request(request)
                    if matches!(request.request, ClientRequest::InitializeRequest(_)) =>
                {
                    return forward(transport, Request::from_parts(parts, Body::from(bytes))).await;
                }
                ClientJsonRpcMessage::Request(_) => match handshake(transport).await {
                    Ok(session) => session,
                    Err(response) => return response,
                },
                // Nothing to deliver a notification or response to.
                _ => return StatusCode::ACCEPTED.into_response(),
            }
        }
    };

    parts.headers.insert(SESSION_HEADER, session.clone());
    let mut response = forward(transport, Request::from_parts(parts, Body::from(bytes))).await;
    response.headers_mut().insert(SESSION_HEADER, session);
    response
}

async fn delete(transport: &HttpTransport, request: Request) -> Response {
    if session_header(request.headers()).is_some()
        && live_session(transport, request.headers()).await.is_none()
    {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "unknown session" }))).into_response();
    }
    forward(transport, request).await
}

async fn forward(transport: &HttpTransport, request: Request) -> Response {
    transport.service.handle(request).await.map(Body::new)
}

/// Token of the session named in `headers`, if that session is still open.
async fn live_session(transport: &HttpTransport, headers: &HeaderMap) -> Option<HeaderValue> {
    let requested = SessionId::from(session_header(headers)?);
    match transport.sessions.has_session(&requested).await {
        Ok(true) => headers.get(SESSION_HEADER).cloned(),
        Ok(false) => {
            tracing::debug!(requested = %requested, "unknown session token; opening a new session");
            None
        }
        Err(err) => {
            tracing::warn!(requested = %requested, error = %err, "session lookup failed");
            None
        }
    }
}

/// Opens a session on the caller's behalf: `initialize`, then `notifications/initialized`.
async fn handshake(transport: &HttpTransport) -> Result<HeaderValue, Response> {
    let initialize = json!({
        "jsonrpc": "2.0",
        "id": HANDSHAKE_ID,
        "method": "initialize",
        "params": {
            "protocolVersion": HANDSHAKE_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": { "name": "loan-intake-http", "version": env!("CARGO_PKG_VERSION") }
        }
    });
    let response = forward(transport, internal_request(&initialize, None)).await;
    let Some(session) = response.headers().get(SESSION_HEADER).cloned() else {
        tracing::warn!(status = %response.status(), "implicit initialize was refused");
        return Err(session_refused());
    };

    let initialized = json!({ "jsonrpc": "2.0", "method": "notifications/initialized" });
    let ack = forward(transport, internal_request(&initialized, Some(session.clone()))).await;
    if ack.status() != StatusCode::ACCEPTED {
        tracing::warn!(status = %ack.status(), "implicit initialized was refused");
        return Err(session_refused());
    }
    tracing::debug!(session = ?session, "opened session with implicit handshake");
    Ok(session)
}

fn internal_request(message: &Value, session: Option<HeaderValue>) -> Request {
    let mut request = Request::new(Body::from(Bytes::from(message.to_string())));
    *request.method_mut() = Method::POST;
    *request.uri_mut() = Uri::from_static(MCP_PATH);
    let headers = request.headers_mut();
    headers.insert(ACCEPT, HeaderValue::from_static(STREAM_ACCEPT));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(session) = session {
        headers.insert(SESSION_HEADER, session);
    }
    request
}

fn session_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

fn session_refused() -> Response {
    rpc_error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR, "failed to open session")
}

fn rpc_error(status: StatusCode, code: i64, message: &str) -> Response {
    let body = json!({
        "jsonrpc": "2.0",
        "id": Value::Null,
        "error": { "code": code, "message": message }
    });
    (status, Json(body)).into_response()
}
