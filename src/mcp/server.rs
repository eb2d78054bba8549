// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-LoanIntake-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Loan Intake and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;

use rmcp::handler::server::tool::{ToolCallContext, ToolRouter};
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, ErrorCode, ListToolsResult,
    PaginatedRequestParams, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::{tool, tool_router, ErrorData, RoleServer, ServerHandler, ServiceExt};
use serde_json::json;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use super::dispatch::{
    lookup_tool, ContentBlock, Dispatcher, JsonObject, ToolError, EXTRACT_LOAN_DATA,
    GET_DOCUMENT_TEXT,
};
use super::types::DocumentArguments;

/// JSON-RPC error code for non-tool requests whose session closed before they were answered.
pub const SESSION_CLOSED_CODE: ErrorCode = ErrorCode(-32000);

/// MCP handler exposing the loan document tools.
///
/// One value serves one protocol conversation: the HTTP transport builds a fresh handler per
/// session. Tool calls and listings within a conversation take turns, so they complete in the
/// order they were admitted. Each call runs under the request's cancellation token, which rmcp
/// fires when the conversation is torn down.
#[derive(Clone)]
pub struct LoanMcp {
    dispatcher: Arc<Dispatcher>,
    turn: Arc<Mutex<()>>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl LoanMcp {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher, turn: Arc::new(Mutex::new(())), tool_router: Self::tool_router() }
    }

    /// Tool descriptors sorted by name.
    pub fn tool_catalog() -> Vec<Tool> {
        let mut tools = Self::tool_router().list_all();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub async fn serve_stdio(self) -> Result<(), rmcp::RmcpError> {
        let service = self.serve((tokio::io::stdin(), tokio::io::stdout())).await?;
        service.waiting().await?;
        Ok(())
    }

    async fn take_turn(&self, cancel: &CancellationToken) -> Option<MutexGuard<'_, ()>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            guard = self.turn.lock() => Some(guard),
        }
    }

    async fn call(
        &self,
        name: &str,
        arguments: &JsonObject,
        cancel: &CancellationToken,
    ) -> CallToolResult {
        let Some(_turn) = self.take_turn(cancel).await else {
            return tool_error_result(&ToolError::SessionClosed);
        };
        match self.dispatcher.dispatch(name, arguments, cancel).await {
            Ok(blocks) => CallToolResult::success(blocks.into_iter().map(into_content).collect()),
            Err(err) => tool_error_result(&err),
        }
    }

    /// Analyze a loan document and return the extracted applicant record as JSON (applicant
    /// name, SSN last four, income, employment, loan amount and purpose, property address,
    /// confidence, and the first 2000 characters of document text).
    #[tool(name = "extract_loan_data")]
    async fn extract_loan_data(
        &self,
        params: Parameters<DocumentArguments>,
        cancel: CancellationToken,
    ) -> Result<CallToolResult, ErrorData> {
        Ok(self.call(EXTRACT_LOAN_DATA, params.0.as_object(), &cancel).await)
    }

    /// Analyze a document and return its full text as markdown.
    #[tool(name = "get_document_text")]
    async fn get_document_text(
        &self,
        params: Parameters<DocumentArguments>,
        cancel: CancellationToken,
    ) -> Result<CallToolResult, ErrorData> {
        Ok(self.call(GET_DOCUMENT_TEXT, params.0.as_object(), &cancel).await)
    }
}

impl ServerHandler for LoanMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Loan document intake server (tools: extract_loan_data, get_document_text). Pass \
                 an absolute http(s) document_url; analysis may take up to two minutes."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        // Unregistered names come back as an `unknown_tool` result from the dispatcher.
        if lookup_tool(&request.name).is_none() {
            let arguments = request.arguments.unwrap_or_default();
            return Ok(self.call(&request.name, &arguments, &context.ct).await);
        }
        let call = ToolCallContext::new(self, request, context);
        self.tool_router.call(call).await
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        let Some(_turn) = self.take_turn(&context.ct).await else {
            return Err(session_closed_error());
        };
        Ok(ListToolsResult { tools: Self::tool_catalog(), meta: None, next_cursor: None })
    }
}

fn into_content(block: ContentBlock) -> Content {
    match block {
        ContentBlock::Text(text) => Content::text(text),
    }
}

pub(crate) fn tool_error_result(err: &ToolError) -> CallToolResult {
    CallToolResult::error(vec![Content::text(err.envelope_text())])
}

pub(crate) fn session_closed_error() -> ErrorData {
    let closed = ToolError::SessionClosed;
    ErrorData::new(SESSION_CLOSED_CODE, closed.to_string(), Some(json!({ "kind": closed.kind() })))
}
