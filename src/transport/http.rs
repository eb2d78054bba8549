// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-LoanIntake-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Loan Intake and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Streamable HTTP surface: rmcp's streamable HTTP service behind session resolution, REST tool
//! routes, and a liveness check.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderName, Method};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use rmcp::transport::{StreamableHttpServerConfig, StreamableHttpService};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use super::sessions::{LoanSessionManager, SessionMode};
use super::{resolve, rest};
use crate::mcp::{Dispatcher, LoanMcp};

pub const MCP_PATH: &str = "/mcp";
pub const TOOLS_PATH: &str = "/mcp/tools";
pub const TOOLS_CALL_PATH: &str = "/mcp/tools/call";
pub const HEALTH_PATH: &str = "/health";
pub const SESSION_HEADER: &str = "mcp-session-id";
pub const SERVICE_NAME: &str = "loan-intake-mcp";

/// Shared state of the HTTP surface.
///
/// Each stateful session gets its own [`LoanMcp`]; in stateless mode every request does.
#[derive(Clone)]
pub struct HttpTransport {
    pub(super) service: StreamableHttpService<LoanMcp, LoanSessionManager>,
    pub(super) sessions: Arc<LoanSessionManager>,
    pub(super) dispatcher: Arc<Dispatcher>,
    pub(super) shutdown: CancellationToken,
    mode: SessionMode,
}

impl HttpTransport {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        mode: SessionMode,
        keep_alive: Option<Duration>,
    ) -> Self {
        let sessions = Arc::new(LoanSessionManager::new(keep_alive));
        let config = StreamableHttpServerConfig {
            stateful_mode: mode == SessionMode::Stateful,
            ..StreamableHttpServerConfig::default()
        };
        let handler_dispatcher = Arc::clone(&dispatcher);
        let service = StreamableHttpService::new(
            move || Ok(LoanMcp::new(Arc::clone(&handler_dispatcher))),
            Arc::clone(&sessions),
            config,
        );
        Self { service, sessions, dispatcher, shutdown: CancellationToken::new(), mode }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn sessions(&self) -> &LoanSessionManager {
        &self.sessions
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(MCP_PATH, any(resolve::handle_mcp))
            .route(TOOLS_PATH, get(rest::list_tools))
            .route(TOOLS_CALL_PATH, post(rest::call_tool))
            .route(HEALTH_PATH, get(health))
            .layer(cors_layer())
            .with_state(self.clone())
    }

    /// Cancels REST calls in flight and closes every session.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.sessions.close_all().await;
    }
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(SESSION_HEADER)])
}

/// Serves the router until `shutdown` resolves, then closes every session.
///
/// Sessions are closed as soon as shutdown begins so that requests waiting on analysis finish
/// with a `session_closed` payload instead of holding the server open.
pub async fn serve(
    listener: tokio::net::TcpListener,
    transport: HttpTransport,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = transport.router();
    let drain = transport.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            tracing::info!("shutting down HTTP server");
            drain.shutdown().await;
        })
        .await?;
    transport.shutdown().await;
    Ok(())
}

async fn health(State(transport): State<HttpTransport>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "transport": "streamable-http",
        "mode": transport.mode().as_str(),
        "sessions": transport.sessions().session_count().await,
    }))
}

#[cfg(test)]
mod e2e;
