// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-LoanIntake-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Loan Intake and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Plain JSON tool routes for callers that do not speak MCP.
//!
//! Calls are independent of MCP sessions and go straight to the dispatcher.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::http::HttpTransport;
use crate::mcp::dispatch::JsonObject;
use crate::mcp::{LoanMcp, ToolError};

#[derive(Debug, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: JsonObject,
}

pub(super) async fn list_tools() -> Json<Value> {
    Json(json!({ "tools": LoanMcp::tool_catalog() }))
}

pub(super) async fn call_tool(
    State(transport): State<HttpTransport>,
    call: Result<Json<ToolCall>, JsonRejection>,
) -> Response {
    let Json(call) = match call {
        Ok(call) => call,
        Err(rejection) => {
            let body = json!({
                "error": { "kind": "invalid_request", "message": rejection.body_text() }
            });
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    };

    let cancel = transport.shutdown.child_token();
    match transport.dispatcher.dispatch(&call.name, &call.arguments, &cancel).await {
        Ok(blocks) => {
            let content = blocks
                .iter()
                .filter_map(|block| block.as_text())
                .map(|text| json!({ "type": "text", "text": text }))
                .collect::<Vec<_>>();
            Json(json!({ "content": content })).into_response()
        }
        Err(err) => {
            tracing::debug!(tool = %call.name, kind = err.kind(), "REST tool call failed");
            (status_for(&err), Json(err.payload())).into_response()
        }
    }
}

fn status_for(err: &ToolError) -> StatusCode {
    match err {
        ToolError::UnknownTool { .. } => StatusCode::BAD_REQUEST,
        err if err.is_validation() => StatusCode::BAD_REQUEST,
        ToolError::BackendAuth(_) | ToolError::BackendProtocol(_) => StatusCode::BAD_GATEWAY,
        ToolError::AnalysisTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        ToolError::SessionClosed => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
