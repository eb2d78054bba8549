// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-LoanIntake-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Loan Intake and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use axum::body::{to_bytes, Body};
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use super::*;
use crate::analysis::testing::{engine_with, loan_document, new_runtime, FakeBackend};
use crate::mcp::SESSION_CLOSED_CODE;

const DOC: &str = "https://docs.test/application.pdf";
const STREAM_ACCEPT: &str = "application/json, text/event-stream";

struct Harness {
    transport: HttpTransport,
    router: Router,
    backend: Arc<FakeBackend>,
}

impl Harness {
    fn new(backend: FakeBackend, mode: SessionMode) -> Self {
        Self::with_keep_alive(backend, mode, None)
    }

    fn with_keep_alive(
        backend: FakeBackend,
        mode: SessionMode,
        keep_alive: Option<Duration>,
    ) -> Self {
        let backend = Arc::new(backend);
        let (engine, _) = engine_with(backend.clone());
        let transport = HttpTransport::new(Arc::new(Dispatcher::new(engine)), mode, keep_alive);
        let router = transport.router();
        Self { transport, router, backend }
    }

    async fn sessions(&self) -> usize {
        self.transport.sessions().session_count().await
    }

    async fn send(&self, request: Request<Body>) -> Reply {
        let response = self.router.clone().oneshot(request).await.expect("router is infallible");
        let status = response.status();
        let (session, content_type) = {
            let header = |name: &str| {
                response.headers().get(name).and_then(|value| value.to_str().ok()).map(str::to_owned)
            };
            (header(SESSION_HEADER), header("content-type").unwrap_or_default())
        };
        let bytes = tokio::time::timeout(
            Duration::from_secs(10),
            to_bytes(response.into_body(), usize::MAX),
        )
        .await
        .expect("timeout collecting response body")
        .expect("response body");
        let body = if content_type.starts_with("text/event-stream") {
            last_event(&bytes)
        } else if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        Reply { status, session, content_type, body }
    }

    async fn post_raw(&self, path: &str, session: Option<&str>, body: impl Into<Body>) -> Reply {
        let mut request = Request::builder()
            .method("POST")
            .uri(path)
            .header(ACCEPT, STREAM_ACCEPT)
            .header(CONTENT_TYPE, "application/json");
        if let Some(session) = session {
            request = request.header(SESSION_HEADER, session);
        }
        self.send(request.body(body.into()).expect("request")).await
    }

    async fn post(&self, session: Option<&str>, message: Value) -> Reply {
        self.post_raw(MCP_PATH, session, message.to_string()).await
    }

    async fn open_session(&self) -> String {
        let reply = self.post(None, initialize(1)).await;
        assert_eq!(reply.status, StatusCode::OK);
        let session = reply.session.expect("session header issued on initialize");
        assert_eq!(self.post(Some(&session), initialized()).await.status, StatusCode::ACCEPTED);
        session
    }

    async fn delete(&self, session: Option<&str>) -> Reply {
        let mut request = Request::builder().method("DELETE").uri(MCP_PATH);
        if let Some(session) = session {
            request = request.header(SESSION_HEADER, session);
        }
        self.send(request.body(Body::empty()).expect("request")).await
    }

    async fn get(&self, path: &str) -> Reply {
        self.send(Request::builder().uri(path).body(Body::empty()).expect("request")).await
    }
}

#[derive(Debug)]
struct Reply {
    status: StatusCode,
    session: Option<String>,
    content_type: String,
    body: Value,
}

/// Last JSON-RPC message of an SSE body; priming events carry no data.
fn last_event(bytes: &[u8]) -> Value {
    let text = std::str::from_utf8(bytes).expect("utf-8 event stream");
    text.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .filter(|data| !data.is_empty())
        .map(|data| serde_json::from_str::<Value>(data).expect("json event"))
        .last()
        .unwrap_or(Value::Null)
}

fn initialize(id: i64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "clientInfo": { "name": "e2e", "version": "0.0.0" }
        }
    })
}

fn initialized() -> Value {
    json!({ "jsonrpc": "2.0", "method": "notifications/initialized" })
}

fn tools_list(id: i64) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "method": "tools/list", "params": {} })
}

fn tools_call(id: i64, name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": { "name": name, "arguments": arguments }
    })
}

fn extract(id: i64) -> Value {
    tools_call(id, "extract_loan_data", json!({ "document_url": DOC }))
}

fn envelope(reply: &Reply) -> Value {
    let text = reply.body["result"]["content"][0]["text"].as_str().expect("text content");
    serde_json::from_str(text).expect("envelope json")
}

fn tool_names(tools: &Value) -> Vec<&str> {
    tools.as_array().expect("tools").iter().filter_map(|tool| tool["name"].as_str()).collect()
}

#[test]
fn e2e_stateful_session_lifecycle() {
    let runtime = new_runtime();
    runtime.block_on(async {
        let harness = Harness::new(FakeBackend::succeeding(loan_document()), SessionMode::Stateful);

        let reply = harness.post(None, initialize(1)).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.content_type.starts_with("text/event-stream"));
        assert_eq!(reply.body["id"], 1);
        let session = reply.session.expect("session header issued on initialize");
        assert_eq!(harness.sessions().await, 1);

        let reply = harness.post(Some(&session), initialized()).await;
        assert_eq!(reply.status, StatusCode::ACCEPTED);

        let reply = harness.post(Some(&session), tools_list(2)).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.session.as_deref(), Some(session.as_str()), "session is reused");
        let names = tool_names(&reply.body["result"]["tools"]);
        assert_eq!(names, ["extract_loan_data", "get_document_text"]);

        let reply = harness.post(Some(&session), extract(3)).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_ne!(reply.body["result"]["isError"], json!(true));
        let record: Value = serde_json::from_str(
            reply.body["result"]["content"][0]["text"].as_str().expect("record text"),
        )
        .expect("record json");
        assert_eq!(record["applicant_name"], "Jane Doe");
        assert_eq!(harness.sessions().await, 1);

        assert_eq!(harness.delete(Some(&session)).await.status, StatusCode::ACCEPTED);
        assert_eq!(harness.delete(Some(&session)).await.status, StatusCode::NOT_FOUND);
        assert_eq!(harness.sessions().await, 0);
    });
}

#[test]
fn e2e_first_message_without_initialize_is_served() {
    let runtime = new_runtime();
    runtime.block_on(async {
        let harness = Harness::new(FakeBackend::hanging(), SessionMode::Stateful);

        let reply = harness.post(None, tools_list(7)).await;

        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["id"], 7);
        assert!(reply.body["result"]["tools"].is_array(), "unexpected reply: {:?}", reply.body);
        let session = reply.session.expect("session header");
        assert_eq!(harness.sessions().await, 1);

        let reply = harness.post(Some(&session), tools_list(8)).await;
        assert_eq!(reply.body["id"], 8);
        assert_eq!(harness.sessions().await, 1);
        harness.transport.shutdown().await;
    });
}

#[test]
fn e2e_unknown_session_token_opens_a_new_session() {
    let runtime = new_runtime();
    runtime.block_on(async {
        let harness = Harness::new(FakeBackend::hanging(), SessionMode::Stateful);

        let reply = harness.post(Some("no-such-session"), tools_list(1)).await;

        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["id"], 1);
        let issued = reply.session.expect("new session header");
        assert_ne!(issued, "no-such-session");
        assert_eq!(harness.sessions().await, 1);
        harness.transport.shutdown().await;
    });
}

#[test]
fn e2e_notification_without_session_opens_nothing() {
    let runtime = new_runtime();
    runtime.block_on(async {
        let harness = Harness::new(FakeBackend::hanging(), SessionMode::Stateful);

        let reply = harness.post(None, initialized()).await;

        assert_eq!(reply.status, StatusCode::ACCEPTED);
        assert!(reply.session.is_none());
        assert_eq!(harness.sessions().await, 0);
    });
}

#[test]
fn e2e_tool_failure_keeps_session_open() {
    let runtime = new_runtime();
    runtime.block_on(async {
        let harness = Harness::new(FakeBackend::succeeding(loan_document()), SessionMode::Stateful);
        let session = harness.open_session().await;

        let reply = harness
            .post(
                Some(&session),
                tools_call(2, "extract_loan_data", json!({ "document_url": "not a url" })),
            )
            .await;

        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["result"]["isError"], json!(true));
        assert_eq!(envelope(&reply)["error"]["kind"], "invalid_argument");
        assert_eq!(harness.backend.submits(), 0);

        let reply = harness.post(Some(&session), tools_list(3)).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.session.as_deref(), Some(session.as_str()));
        harness.transport.shutdown().await;
    });
}

#[test]
fn e2e_unknown_tool_is_a_tool_error_result() {
    let runtime = new_runtime();
    runtime.block_on(async {
        let harness = Harness::new(FakeBackend::succeeding(loan_document()), SessionMode::Stateful);
        let session = harness.open_session().await;

        let reply = harness
            .post(Some(&session), tools_call(5, "no_such_tool", json!({ "document_url": DOC })))
            .await;

        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["id"], 5);
        assert!(reply.body.get("error").is_none(), "not a protocol error: {:?}", reply.body);
        assert_eq!(reply.body["result"]["isError"], json!(true));
        let envelope = envelope(&reply);
        assert_eq!(envelope["error"]["kind"], "unknown_tool");
        assert!(envelope["error"]["message"].as_str().unwrap_or_default().contains("no_such_tool"));
        assert_eq!(harness.backend.submits(), 0);
        harness.transport.shutdown().await;
    });
}

#[test]
fn e2e_stateless_mode_issues_no_session() {
    let runtime = new_runtime();
    runtime.block_on(async {
        let backend = FakeBackend::succeeding(loan_document());
        let harness = Harness::new(backend, SessionMode::Stateless);

        let reply = harness
            .post(None, tools_call(1, "get_document_text", json!({ "document_url": DOC })))
            .await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.session.is_none());
        let text = &reply.body["result"]["content"][0]["text"];
        assert_eq!(text, "# Loan Application\nApplicant: Jane Doe");
        assert_eq!(harness.sessions().await, 0);

        let reply = harness.post(None, tools_call(2, "no_such_tool", json!({}))).await;
        assert_eq!(envelope(&reply)["error"]["kind"], "unknown_tool");

        assert_eq!(harness.post(None, initialized()).await.status, StatusCode::ACCEPTED);
        assert_eq!(harness.delete(Some("anything")).await.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(harness.get(MCP_PATH).await.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(harness.sessions().await, 0);
    });
}

#[test]
fn e2e_teardown_mid_poll_resolves_pending_call() {
    let runtime = new_runtime();
    runtime.block_on(async {
        let harness = Arc::new(Harness::new(FakeBackend::hanging(), SessionMode::Stateful));
        let session = harness.open_session().await;

        let pending = tokio::spawn({
            let harness = harness.clone();
            let session = session.clone();
            async move { harness.post(Some(&session), extract(2)).await }
        });

        harness.backend.poll_started.notified().await;
        assert_eq!(harness.delete(Some(&session)).await.status, StatusCode::ACCEPTED);

        let reply = pending.await.expect("join");
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["id"], 2);
        assert_eq!(reply.body["result"]["isError"], json!(true));
        assert_eq!(envelope(&reply)["error"]["kind"], "session_closed");

        tokio::time::timeout(Duration::from_secs(5), harness.backend.poll_dropped.notified())
            .await
            .expect("poll future dropped");
        assert_eq!(harness.sessions().await, 0);
    });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn e2e_concurrent_requests_share_one_session() {
    let harness = Arc::new(Harness::new(FakeBackend::hanging(), SessionMode::Stateful));
    let session = harness.open_session().await;

    let requests = (10..18).map(|id| {
        let harness = harness.clone();
        let session = session.clone();
        tokio::spawn(async move { (id, harness.post(Some(&session), tools_list(id)).await) })
    });
    let replies = futures::future::join_all(requests).await;

    for joined in replies {
        let (id, reply) = joined.expect("join");
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.session.as_deref(), Some(session.as_str()));
        assert_eq!(reply.body["id"], id);
        assert!(reply.body["result"]["tools"].is_array(), "unexpected reply: {:?}", reply.body);
    }
    assert_eq!(harness.sessions().await, 1);
    harness.transport.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn e2e_requests_in_one_session_wait_their_turn() {
    let harness = Arc::new(Harness::new(FakeBackend::hanging(), SessionMode::Stateful));
    let session = harness.open_session().await;

    let slow = tokio::spawn({
        let harness = harness.clone();
        let session = session.clone();
        async move { harness.post(Some(&session), extract(2)).await }
    });
    harness.backend.poll_started.notified().await;

    let queued = tokio::spawn({
        let harness = harness.clone();
        let session = session.clone();
        async move { harness.post(Some(&session), tools_list(3)).await }
    });
    let second_call = tokio::spawn({
        let harness = harness.clone();
        let session = session.clone();
        async move {
            harness
                .post(
                    Some(&session),
                    tools_call(4, "get_document_text", json!({ "document_url": DOC })),
                )
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!queued.is_finished(), "tools/list must wait for the running call");
    assert!(!second_call.is_finished(), "second call must wait for the running call");
    assert_eq!(harness.backend.submits(), 1);
    assert_eq!(harness.sessions().await, 1);

    assert_eq!(harness.delete(Some(&session)).await.status, StatusCode::ACCEPTED);

    let slow = slow.await.expect("join");
    assert_eq!(envelope(&slow)["error"]["kind"], "session_closed");
    let second_call = second_call.await.expect("join");
    assert_eq!(second_call.body["id"], 4);
    assert_eq!(envelope(&second_call)["error"]["kind"], "session_closed");
    let queued = queued.await.expect("join");
    assert_eq!(queued.body["id"], 3);
    assert_eq!(queued.body["error"]["code"], SESSION_CLOSED_CODE.0);
    assert_eq!(queued.body["error"]["data"]["kind"], "session_closed");
    assert_eq!(harness.backend.submits(), 1);
}

#[test]
fn e2e_idle_sessions_expire() {
    let runtime = new_runtime();
    runtime.block_on(async {
        let harness = Harness::with_keep_alive(
            FakeBackend::hanging(),
            SessionMode::Stateful,
            Some(Duration::from_millis(100)),
        );
        let session = harness.open_session().await;
        assert_eq!(harness.sessions().await, 1);

        tokio::time::timeout(Duration::from_secs(5), async {
            while harness.sessions().await > 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("idle session closed");

        let reply = harness.post(Some(&session), tools_list(2)).await;
        assert_eq!(reply.status, StatusCode::OK);
        let issued = reply.session.as_deref();
        assert_ne!(issued, Some(session.as_str()), "expired sessions are not reused");
        harness.transport.shutdown().await;
    });
}

#[test]
fn e2e_sessions_closed_by_shutdown_are_not_reused() {
    let runtime = new_runtime();
    runtime.block_on(async {
        let harness = Harness::new(FakeBackend::hanging(), SessionMode::Stateful);
        let session = harness.open_session().await;
        harness.transport.shutdown().await;
        assert_eq!(harness.sessions().await, 0);

        let reply = harness.post(Some(&session), tools_list(4)).await;

        assert_eq!(reply.status, StatusCode::OK);
        let issued = reply.session.as_deref();
        assert_ne!(issued, Some(session.as_str()), "closed sessions are not reused");
        harness.transport.shutdown().await;
    });
}

#[test]
fn e2e_malformed_json_is_a_parse_error() {
    let runtime = new_runtime();
    runtime.block_on(async {
        let harness = Harness::new(FakeBackend::hanging(), SessionMode::Stateful);

        let reply = harness.post_raw(MCP_PATH, None, "{\"jsonrpc\": \"2.0\", ").await;

        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.body["error"]["code"], -32700);
        assert!(reply.session.is_none());
        assert_eq!(harness.sessions().await, 0);
    });
}

#[test]
fn e2e_delete_without_header_is_unauthorized() {
    let runtime = new_runtime();
    runtime.block_on(async {
        let harness = Harness::new(FakeBackend::hanging(), SessionMode::Stateful);
        assert_eq!(harness.delete(None).await.status, StatusCode::UNAUTHORIZED);
    });
}

#[test]
fn e2e_event_stream_needs_a_session() {
    let runtime = new_runtime();
    runtime.block_on(async {
        let harness = Harness::new(FakeBackend::hanging(), SessionMode::Stateful);
        let request = Request::builder()
            .uri(MCP_PATH)
            .header(ACCEPT, "text/event-stream")
            .body(Body::empty())
            .expect("request");

        assert_eq!(harness.send(request).await.status, StatusCode::UNAUTHORIZED);
    });
}

#[test]
fn e2e_rest_lists_tools() {
    let runtime = new_runtime();
    runtime.block_on(async {
        let harness = Harness::new(FakeBackend::hanging(), SessionMode::Stateful);

        let reply = harness.get(TOOLS_PATH).await;

        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(tool_names(&reply.body["tools"]), ["extract_loan_data", "get_document_text"]);
        for tool in reply.body["tools"].as_array().expect("tools") {
            assert!(tool["description"].as_str().is_some_and(|text| !text.is_empty()));
            assert_eq!(tool["inputSchema"]["required"], json!(["document_url"]));
        }
        assert_eq!(harness.sessions().await, 0);
    });
}

#[test]
fn e2e_rest_call_returns_content() {
    let runtime = new_runtime();
    runtime.block_on(async {
        let backend = FakeBackend::succeeding(loan_document());
        let harness = Harness::new(backend, SessionMode::Stateless);
        let call = json!({ "name": "extract_loan_data", "arguments": { "document_url": DOC } });

        let reply = harness.post_raw(TOOLS_CALL_PATH, None, call.to_string()).await;

        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["content"][0]["type"], "text");
        let record: Value = serde_json::from_str(
            reply.body["content"][0]["text"].as_str().expect("record text"),
        )
        .expect("record json");
        assert_eq!(record["applicant_name"], "Jane Doe");
        assert_eq!(harness.backend.submits(), 1);
    });
}

#[test]
fn e2e_rest_rejects_bad_calls() {
    let runtime = new_runtime();
    runtime.block_on(async {
        let harness = Harness::new(FakeBackend::succeeding(loan_document()), SessionMode::Stateful);
        let cases = [
            (json!({ "name": "extract_loan_data", "arguments": {} }), "missing_argument"),
            (json!({ "name": "get_document_text" }), "missing_argument"),
            (
                json!({ "name": "no_such_tool", "arguments": { "document_url": DOC } }),
                "unknown_tool",
            ),
            (json!({ "arguments": { "document_url": DOC } }), "invalid_request"),
        ];

        for (call, kind) in cases {
            let reply = harness.post_raw(TOOLS_CALL_PATH, None, call.to_string()).await;

            assert_eq!(reply.status, StatusCode::BAD_REQUEST, "{call}");
            assert_eq!(reply.body["error"]["kind"], kind, "{call}");
        }
        assert_eq!(harness.backend.submits(), 0);
    });
}

#[test]
fn e2e_health_reports_mode() {
    let runtime = new_runtime();
    runtime.block_on(async {
        let modes = [(SessionMode::Stateful, "stateful"), (SessionMode::Stateless, "stateless")];
        for (mode, label) in modes {
            let harness = Harness::new(FakeBackend::hanging(), mode);

            let reply = harness.get(HEALTH_PATH).await;

            assert_eq!(reply.status, StatusCode::OK);
            assert_eq!(
                reply.body,
                json!({
                    "status": "healthy",
                    "service": SERVICE_NAME,
                    "transport": "streamable-http",
                    "mode": label,
                    "sessions": 0,
                })
            );
        }
    });
}

#[test]
fn e2e_cors_exposes_session_header() {
    let runtime = new_runtime();
    runtime.block_on(async {
        let harness = Harness::new(FakeBackend::hanging(), SessionMode::Stateful);
        let request = Request::builder()
            .uri(HEALTH_PATH)
            .header("origin", "https://inspector.test")
            .body(Body::empty())
            .expect("request");

        let response = harness.router.clone().oneshot(request).await.expect("router is infallible");

        let headers = response.headers();
        let origin = headers.get("access-control-allow-origin").and_then(|v| v.to_str().ok());
        assert_eq!(origin, Some("*"));
        let exposed = headers
            .get("access-control-expose-headers")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        assert!(exposed.contains(SESSION_HEADER), "exposed headers: {exposed}");
    });
}
