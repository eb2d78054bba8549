// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-LoanIntake-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Loan Intake and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::Poll;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use rmcp::model::{
    ClientJsonRpcMessage, ClientRequest, RequestId, ServerJsonRpcMessage, ServerResult,
};
use rmcp::transport::streamable_http_server::session::local::{
    LocalSessionManager, LocalSessionManagerError, SessionConfig, SessionError,
};
use rmcp::transport::streamable_http_server::session::{
    ServerSseMessage, SessionId, SessionManager,
};

use crate::mcp::{session_closed_error, tool_error_result, ToolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Sessions persist across requests and are addressed by token.
    Stateful,
    /// Every request is served by a fresh handler; nothing is retained.
    Stateless,
}

impl SessionMode {
    pub fn from_stateless_flag(stateless: bool) -> Self {
        if stateless {
            Self::Stateless
        } else {
            Self::Stateful
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stateful => "stateful",
            Self::Stateless => "stateless",
        }
    }
}

/// Process-local session registry built on rmcp's [`LocalSessionManager`].
///
/// Sessions live until they are deleted, sit idle past the keep-alive, or the process stops.
/// A request whose session goes away before it is answered still gets a `session_closed` reply
/// on its response stream.
#[derive(Debug)]
pub struct LoanSessionManager {
    inner: LocalSessionManager,
    opened: Mutex<HashMap<SessionId, DateTime<Utc>>>,
}

impl LoanSessionManager {
    pub fn new(keep_alive: Option<Duration>) -> Self {
        let inner = LocalSessionManager {
            sessions: Default::default(),
            session_config: SessionConfig { keep_alive, ..SessionConfig::default() },
        };
        Self { inner, opened: Mutex::new(HashMap::new()) }
    }

    pub async fn session_count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    /// Closes every live session. Used on process shutdown.
    pub async fn close_all(&self) {
        let ids = self.inner.sessions.read().await.keys().cloned().collect::<Vec<_>>();
        if !ids.is_empty() {
            tracing::info!(count = ids.len(), "closing sessions");
        }
        for id in ids {
            if let Err(err) = self.close_session(&id).await {
                tracing::warn!(session = %id, error = %err, "failed to close session");
            }
        }
    }

    fn opened(&self) -> MutexGuard<'_, HashMap<SessionId, DateTime<Utc>>> {
        self.opened.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionManager for LoanSessionManager {
    type Error = LocalSessionManagerError;
    type Transport = <LocalSessionManager as SessionManager>::Transport;

    async fn create_session(&self) -> Result<(SessionId, Self::Transport), Self::Error> {
        let (id, transport) = self.inner.create_session().await?;
        self.opened().insert(id.clone(), Utc::now());
        tracing::info!(session = %id, "session opened");
        Ok((id, transport))
    }

    async fn initialize_session(
        &self,
        id: &SessionId,
        message: ClientJsonRpcMessage,
    ) -> Result<ServerJsonRpcMessage, Self::Error> {
        self.inner.initialize_session(id, message).await
    }

    async fn has_session(&self, id: &SessionId) -> Result<bool, Self::Error> {
        self.inner.has_session(id).await
    }

    async fn close_session(&self, id: &SessionId) -> Result<(), Self::Error> {
        let opened = self.opened().remove(id);
        match self.inner.close_session(id).await {
            Ok(()) => {}
            // The protocol loop already stopped (idle timeout or a failed handshake).
            Err(LocalSessionManagerError::SessionError(
                SessionError::SessionServiceTerminated,
            )) => {}
            Err(err) => return Err(err),
        }
        if let Some(opened) = opened {
            let lifetime = Utc::now() - opened;
            tracing::info!(session = %id, lifetime_secs = lifetime.num_seconds(), "session closed");
        }
        Ok(())
    }

    async fn create_stream(
        &self,
        id: &SessionId,
        message: ClientJsonRpcMessage,
    ) -> Result<impl Stream<Item = ServerSseMessage> + Send + Sync + 'static, Self::Error> {
        let pending = PendingReply::for_message(&message);
        let stream = self.inner.create_stream(id, message).await?;
        Ok(answer_on_close(stream, pending))
    }

    async fn accept_message(
        &self,
        id: &SessionId,
        message: ClientJsonRpcMessage,
    ) -> Result<(), Self::Error> {
        self.inner.accept_message(id, message).await
    }

    async fn create_standalone_stream(
        &self,
        id: &SessionId,
    ) -> Result<impl Stream<Item = ServerSseMessage> + Send + Sync + 'static, Self::Error> {
        self.inner.create_standalone_stream(id).await
    }

    async fn resume(
        &self,
        id: &SessionId,
        last_event_id: String,
    ) -> Result<impl Stream<Item = ServerSseMessage> + Send + Sync + 'static, Self::Error> {
        self.inner.resume(id, last_event_id).await
    }
}

/// The request a response stream was opened for.
#[derive(Debug, Clone, PartialEq)]
struct PendingReply {
    id: RequestId,
    tool_call: bool,
}

impl PendingReply {
    fn for_message(message: &ClientJsonRpcMessage) -> Option<Self> {
        match message {
            ClientJsonRpcMessage::Request(request) => Some(Self {
                id: request.id.clone(),
                tool_call: matches!(request.request, ClientRequest::CallToolRequest(_)),
            }),
            _ => None,
        }
    }

    fn is_answered_by(&self, event: &ServerSseMessage) -> bool {
        match event.message.as_deref() {
            Some(ServerJsonRpcMessage::Response(response)) => response.id == self.id,
            Some(ServerJsonRpcMessage::Error(error)) => error.id == self.id,
            _ => false,
        }
    }

    /// Tool calls get the `session_closed` tool error; anything else a JSON-RPC error.
    fn session_closed(self) -> ServerSseMessage {
        tracing::debug!(request = %self.id, "session closed before reply");
        let message = if self.tool_call {
            let result = tool_error_result(&ToolError::SessionClosed);
            ServerJsonRpcMessage::response(ServerResult::from(result), self.id)
        } else {
            ServerJsonRpcMessage::error(session_closed_error(), self.id)
        };
        ServerSseMessage { event_id: None, message: Some(Arc::new(message)), retry: None }
    }
}

/// Appends a `session_closed` reply when `stream` ends before answering `pending`.
fn answer_on_close(
    stream: impl Stream<Item = ServerSseMessage> + Send + Sync + 'static,
    mut pending: Option<PendingReply>,
) -> impl Stream<Item = ServerSseMessage> + Send + Sync + 'static {
    let mut stream = Box::pin(stream.fuse());
    futures::stream::poll_fn(move |cx| match stream.poll_next_unpin(cx) {
        Poll::Ready(Some(event)) => {
            if pending.as_ref().is_some_and(|reply| reply.is_answered_by(&event)) {
                pending = None;
            }
            Poll::Ready(Some(event))
        }
        Poll::Ready(None) => Poll::Ready(pending.take().map(PendingReply::session_closed)),
        Poll::Pending => Poll::Pending,
    })
}
