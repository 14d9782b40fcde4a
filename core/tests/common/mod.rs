//! In-process tool server used by the integration tests.
//!
//! Serves `/events` (SSE fed from a broadcast channel), `/health`, `/tools`
//! and `/execute` on an ephemeral port.
#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Broadcasting this ends every open event stream
const CLOSE_SENTINEL: &str = "__close__";

/// Builds the result for an auto-replied call from `(tool_name, parameters)`
pub type Responder = Arc<dyn Fn(&str, &Value) -> Value + Send + Sync>;

struct Inner {
    events: broadcast::Sender<String>,
    events_status: AtomicU16,
    health_status: AtomicU16,
    tools_status: AtomicU16,
    execute_status: AtomicU16,
    tools: Mutex<Value>,
    executed: Mutex<Vec<Value>>,
    responder: Mutex<Option<Responder>>,
    health_hits: AtomicUsize,
    tools_hits: AtomicUsize,
    stream_opens: AtomicUsize,
    /// Request headers seen, tagged with the endpoint that received them
    headers: Mutex<Vec<(&'static str, HeaderMap)>>,
}

#[derive(Clone)]
pub struct MockServer {
    inner: Arc<Inner>,
    pub addr: SocketAddr,
    handle: Arc<JoinHandle<()>>,
}

impl MockServer {
    /// Start a server whose `/tools` lists the given tools
    pub async fn start(tools: Value) -> Self {
        let (events, _) = broadcast::channel(256);
        let inner = Arc::new(Inner {
            events,
            events_status: AtomicU16::new(200),
            health_status: AtomicU16::new(200),
            tools_status: AtomicU16::new(200),
            execute_status: AtomicU16::new(200),
            tools: Mutex::new(json!({ "tools": tools })),
            executed: Mutex::new(Vec::new()),
            responder: Mutex::new(None),
            health_hits: AtomicUsize::new(0),
            tools_hits: AtomicUsize::new(0),
            stream_opens: AtomicUsize::new(0),
            headers: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/events", get(events_handler))
            .route("/sse", get(events_handler))
            .route("/health", get(health_handler))
            .route("/tools", get(tools_handler))
            .route("/execute", post(execute_handler))
            .with_state(Arc::clone(&inner));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let addr = listener.local_addr().expect("local addr");
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            inner,
            addr,
            handle: Arc::new(handle),
        }
    }

    pub fn events_url(&self) -> String {
        format!("http://{}/events", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Non-200 makes `/events` refuse new streams
    pub fn set_events_status(&self, status: u16) {
        self.inner.events_status.store(status, Ordering::SeqCst);
    }

    pub fn set_health_status(&self, status: u16) {
        self.inner.health_status.store(status, Ordering::SeqCst);
    }

    pub fn set_tools_status(&self, status: u16) {
        self.inner.tools_status.store(status, Ordering::SeqCst);
    }

    /// Replace the whole `/tools` response body
    pub fn set_tools_body(&self, body: Value) {
        *self.inner.tools.lock().unwrap() = body;
    }

    /// Headers of every request received by `endpoint` (`events`, `health`, `tools` or `execute`)
    pub fn headers_for(&self, endpoint: &str) -> Vec<HeaderMap> {
        self.inner
            .headers
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| *name == endpoint)
            .map(|(_, headers)| headers.clone())
            .collect()
    }

    pub fn set_execute_status(&self, status: u16) {
        self.inner.execute_status.store(status, Ordering::SeqCst);
    }

    /// Answer every accepted execute with a `tool_response` built by `responder`.
    /// A numeric `delay_ms` parameter delays that reply.
    pub fn auto_reply<F>(&self, responder: F)
    where
        F: Fn(&str, &Value) -> Value + Send + Sync + 'static,
    {
        *self.inner.responder.lock().unwrap() = Some(Arc::new(responder));
    }

    /// Push a raw `data:` payload to every open stream
    pub fn push_raw(&self, data: impl Into<String>) {
        let _ = self.inner.events.send(data.into());
    }

    pub fn push(&self, event: Value) {
        self.push_raw(event.to_string());
    }

    /// End every open event stream
    pub fn close_streams(&self) {
        self.push_raw(CLOSE_SENTINEL);
    }

    pub fn subscribers(&self) -> usize {
        self.inner.events.receiver_count()
    }

    pub fn executed(&self) -> Vec<Value> {
        self.inner.executed.lock().unwrap().clone()
    }

    pub fn execute_count(&self) -> usize {
        self.inner.executed.lock().unwrap().len()
    }

    pub fn health_hits(&self) -> usize {
        self.inner.health_hits.load(Ordering::SeqCst)
    }

    pub fn tools_hits(&self) -> usize {
        self.inner.tools_hits.load(Ordering::SeqCst)
    }

    pub fn stream_opens(&self) -> usize {
        self.inner.stream_opens.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` event streams are subscribed
    pub async fn wait_for_subscribers(&self, n: usize) {
        wait_until(|| self.subscribers() >= n).await;
    }

    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

/// Poll `cond` every 10ms for up to 5s
pub async fn wait_until<F: Fn() -> bool>(cond: F) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 5s");
}

/// A tool descriptor as served by `/tools`
pub fn tool_json(name: &str, description: &str) -> Value {
    json!({
        "name": name,
        "description": description,
        "input_schema": {"type": "object", "properties": {}}
    })
}

async fn events_handler(State(inner): State<Arc<Inner>>, headers: HeaderMap) -> Response {
    inner.record("events", headers);
    let status = status_of(&inner.events_status);
    if status != StatusCode::OK {
        return status.into_response();
    }

    inner.stream_opens.fetch_add(1, Ordering::SeqCst);
    let rx = inner.events.subscribe();

    let stream = BroadcastStream::new(rx)
        .filter_map(|result| result.ok())
        .take_while(|data| data != CLOSE_SENTINEL)
        .map(|data| Ok::<_, Infallible>(Event::default().data(data)));

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

async fn health_handler(State(inner): State<Arc<Inner>>, headers: HeaderMap) -> impl IntoResponse {
    inner.record("health", headers);
    inner.health_hits.fetch_add(1, Ordering::SeqCst);
    status_of(&inner.health_status)
}

async fn tools_handler(State(inner): State<Arc<Inner>>, headers: HeaderMap) -> impl IntoResponse {
    inner.record("tools", headers);
    inner.tools_hits.fetch_add(1, Ordering::SeqCst);
    let status = status_of(&inner.tools_status);
    let body = inner.tools.lock().unwrap().clone();
    (status, Json(body))
}

async fn execute_handler(
    State(inner): State<Arc<Inner>>,
    headers: HeaderMap,
    Json(request): Json<Value>,
) -> impl IntoResponse {
    inner.record("execute", headers);
    inner.executed.lock().unwrap().push(request.clone());

    let status = status_of(&inner.execute_status);
    if status != StatusCode::OK {
        return (status, Json(json!({"error": "rejected"})));
    }

    let responder = inner.responder.lock().unwrap().clone();
    if let Some(responder) = responder {
        let events = inner.events.clone();
        tokio::spawn(async move {
            let tool = request["tool_name"].as_str().unwrap_or_default().to_string();
            let params = request["parameters"].clone();
            if let Some(ms) = params.get("delay_ms").and_then(Value::as_u64) {
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            let reply = json!({
                "type": "tool_response",
                "request_id": request["request_id"],
                "result": responder(&tool, &params),
            });
            let _ = events.send(reply.to_string());
        });
    }

    (StatusCode::OK, Json(json!({"status": "accepted"})))
}

impl Inner {
    fn record(&self, endpoint: &'static str, headers: HeaderMap) {
        self.headers.lock().unwrap().push((endpoint, headers));
    }
}

fn status_of(cell: &AtomicU16) -> StatusCode {
    StatusCode::from_u16(cell.load(Ordering::SeqCst)).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}
