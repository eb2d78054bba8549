// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-LoanIntake-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Loan Intake and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Tool registry and dispatch.
//!
//! Every tool call ends in either a list of content blocks or a [`ToolError`]; nothing a tool
//! does (including a panic in a downstream component) escapes as a protocol fault.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::analysis::{JobEngine, JobError};
use crate::extract::extract;

pub const EXTRACT_LOAN_DATA: &str = "extract_loan_data";
pub const GET_DOCUMENT_TEXT: &str = "get_document_text";
pub const DOCUMENT_URL: &str = "document_url";
pub const NO_CONTENT_TEXT: &str = "No content extracted from document";

pub type JsonObject = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    ExtractLoanData,
    GetDocumentText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub kind: ToolKind,
}

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec { name: EXTRACT_LOAN_DATA, kind: ToolKind::ExtractLoanData },
    ToolSpec { name: GET_DOCUMENT_TEXT, kind: ToolKind::GetDocumentText },
];

pub fn lookup_tool(name: &str) -> Option<&'static ToolSpec> {
    TOOLS.iter().find(|tool| tool.name == name)
}

/// Typed piece of tool output. Only text is produced today.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentBlock {
    Text(String),
}

impl ContentBlock {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },
    #[error("{argument} is required")]
    MissingArgument { argument: &'static str },
    #[error("invalid {argument}: {reason}")]
    InvalidArgument { argument: &'static str, reason: String },
    #[error("{0}")]
    BackendProtocol(String),
    #[error("{0}")]
    BackendAuth(String),
    #[error("analysis failed with status: {status}")]
    AnalysisFailed { status: String },
    #[error("document analysis timed out after {attempts} poll attempts")]
    AnalysisTimeout { attempts: u32 },
    #[error("session closed before the tool call completed")]
    SessionClosed,
    #[error("internal error: {0}")]
    Internal(String),
}

impl ToolError {
    /// Stable machine-readable error code.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTool { .. } => "unknown_tool",
            Self::MissingArgument { .. } => "missing_argument",
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::BackendProtocol(_) => "backend_protocol_error",
            Self::BackendAuth(_) => "backend_auth_error",
            Self::AnalysisFailed { .. } => "analysis_failed",
            Self::AnalysisTimeout { .. } => "analysis_timeout",
            Self::SessionClosed => "session_closed",
            Self::Internal(_) => "internal",
        }
    }

    /// True for failures caused by the caller's input.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::MissingArgument { .. } | Self::InvalidArgument { .. })
    }

    pub fn payload(&self) -> Value {
        serde_json::json!({ "error": { "kind": self.kind(), "message": self.to_string() } })
    }

    /// Text of the error content block returned to the client.
    pub fn envelope_text(&self) -> String {
        serde_json::to_string_pretty(&self.payload()).unwrap_or_else(|_| self.to_string())
    }
}

impl From<JobError> for ToolError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Token(err) => Self::BackendAuth(err.to_string()),
            JobError::BackendAuth { .. } => Self::BackendAuth(err.to_string()),
            JobError::BackendProtocol(_) => Self::BackendProtocol(err.to_string()),
            JobError::Transport(_) => Self::Internal(err.to_string()),
            JobError::AnalysisFailed { status } => Self::AnalysisFailed { status },
            JobError::AnalysisTimeout { attempts } => Self::AnalysisTimeout { attempts },
            JobError::Aborted => Self::SessionClosed,
        }
    }
}

/// Routes named tool calls to their handlers.
#[derive(Clone)]
pub struct Dispatcher {
    engine: JobEngine,
}

impl Dispatcher {
    pub fn new(engine: JobEngine) -> Self {
        Self { engine }
    }

    pub async fn dispatch(
        &self,
        name: &str,
        arguments: &JsonObject,
        cancel: &CancellationToken,
    ) -> Result<Vec<ContentBlock>, ToolError> {
        let Some(tool) = lookup_tool(name) else {
            tracing::warn!(tool = name, "unknown tool requested");
            return Err(ToolError::UnknownTool { name: name.to_owned() });
        };
        let document_url = required_document_url(arguments)?;

        tracing::info!(tool = tool.name, %document_url, "tool call started");
        let outcome =
            AssertUnwindSafe(self.run(tool.kind, &document_url, cancel)).catch_unwind().await;
        let result = match outcome {
            Ok(result) => result,
            Err(panic) => Err(ToolError::Internal(panic_message(panic.as_ref()))),
        };

        match &result {
            Ok(_) => tracing::info!(tool = tool.name, %document_url, "tool call finished"),
            Err(ToolError::Internal(message)) => {
                tracing::error!(tool = tool.name, %document_url, %message, "tool call crashed")
            }
            Err(err) => {
                tracing::warn!(tool = tool.name, %document_url, kind = err.kind(), error = %err, "tool call failed")
            }
        }
        result
    }

    async fn run(
        &self,
        kind: ToolKind,
        document_url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ContentBlock>, ToolError> {
        let job = self.engine.run(document_url, cancel).await?;
        let result = job.into_result().unwrap_or_default();

        match kind {
            ToolKind::ExtractLoanData => {
                let record = extract(&result);
                let text = serde_json::to_string_pretty(&record)
                    .map_err(|err| ToolError::Internal(format!("cannot encode record: {err}")))?;
                Ok(vec![ContentBlock::Text(text)])
            }
            ToolKind::GetDocumentText => {
                let text = result
                    .first_section()
                    .map(|section| section.markdown.clone())
                    .unwrap_or_else(|| NO_CONTENT_TEXT.to_owned());
                Ok(vec![ContentBlock::Text(text)])
            }
        }
    }
}

fn required_document_url(arguments: &JsonObject) -> Result<String, ToolError> {
    let raw = match arguments.get(DOCUMENT_URL) {
        None | Some(Value::Null) => {
            return Err(ToolError::MissingArgument { argument: DOCUMENT_URL });
        }
        Some(Value::String(raw)) => raw.trim(),
        Some(other) => {
            return Err(ToolError::InvalidArgument {
                argument: DOCUMENT_URL,
                reason: format!("expected a string, got {}", json_type_name(other)),
            });
        }
    };
    if raw.is_empty() {
        return Err(ToolError::MissingArgument { argument: DOCUMENT_URL });
    }

    let parsed = reqwest::Url::parse(raw).map_err(|err| ToolError::InvalidArgument {
        argument: DOCUMENT_URL,
        reason: err.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ToolError::InvalidArgument {
            argument: DOCUMENT_URL,
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    Ok(raw.to_owned())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("tool handler panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("tool handler panicked: {message}")
    } else {
        "tool handler panicked".to_owned()
    }
}
