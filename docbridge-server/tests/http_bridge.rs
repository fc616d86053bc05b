//! # HTTP Bridge Integration Tests
//!
//! Purpose: Drive the server end to end over real TCP connections with a raw
//! HTTP client and check what lands in the store.
//!
//! ## Design Principles
//!
//! 1. **End-to-End**: Exercise accept, framing, dispatch and encoding together.
//! 2. **Isolated Server**: Bind to an ephemeral port per test.
//! 3. **Identity-Agnostic**: Compare documents with the store-assigned `_id` removed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use docbridge_common::{Document, DocumentId, ID_FIELD};
use docbridge_server::metrics::Metrics;
use docbridge_server::protocol::ParseLimits;
use docbridge_server::server::{self, Server, ServerSettings};
use docbridge_store::{
    DocumentCursor, DocumentStore, MemoryStore, SharedStore, StoreBackend, StoreConfig,
    StoreError, StoreResult,
};

struct TestServer {
    addr: SocketAddr,
    metrics: Arc<Metrics>,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl TestServer {
    async fn stop(self) {
        let _ = self.shutdown.send(());
        self.handle.await.unwrap();
    }
}

async fn spawn_test_server(store: SharedStore, settings: ServerSettings) -> TestServer {
    let listener =
        server::bind_listener("127.0.0.1:0".parse().unwrap(), server::DEFAULT_BACKLOG).unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Server::new(listener, store, settings);
    let metrics = server.metrics();
    let (shutdown, shutdown_rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(server.serve_until(async move {
        let _ = shutdown_rx.await;
    }));

    TestServer {
        addr,
        metrics,
        shutdown,
        handle,
    }
}

fn memory_store() -> SharedStore {
    Arc::new(MemoryStore::new("test_db", "test_coll"))
}

async fn exchange(addr: SocketAddr, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8(response).unwrap()
}

async fn post(addr: SocketAddr, body: &str) -> String {
    let raw = format!(
        "POST / HTTP/1.1\r\nHost: test\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    exchange(addr, raw.as_bytes()).await
}

async fn get(addr: SocketAddr) -> String {
    exchange(addr, b"GET / HTTP/1.1\r\nHost: test\r\n\r\n").await
}

fn split(response: &str) -> (&str, &str) {
    response.split_once("\r\n\r\n").expect("response has a head")
}

fn status(response: &str) -> u16 {
    response
        .split(' ')
        .nth(1)
        .and_then(|code| code.parse().ok())
        .expect("response has a status code")
}

/// Parses a read body into documents without their identity field.
fn documents(response: &str) -> Vec<Value> {
    let (_, body) = split(response);
    body.lines()
        .map(|line| {
            let mut value: Value = serde_json::from_str(line).unwrap();
            value.as_object_mut().unwrap().remove(ID_FIELD);
            value
        })
        .collect()
}

#[tokio::test]
async fn write_then_read_round_trips_document() {
    let server = spawn_test_server(memory_store(), ServerSettings::default()).await;

    let written = post(server.addr, r#"{"name":"a"}"#).await;
    assert_eq!(written, "HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");

    let read = get(server.addr).await;
    let (head, _) = split(&read);
    assert_eq!(head, "HTTP/1.1 200 OK\r\nContent-Type: application/json");
    assert_eq!(documents(&read), vec![json!({"name": "a"})]);

    server.stop().await;
}

#[tokio::test]
async fn malformed_json_is_rejected_and_not_stored() {
    let server = spawn_test_server(memory_store(), ServerSettings::default()).await;
    post(server.addr, r#"{"x":0}"#).await;
    let baseline = documents(&get(server.addr).await).len();

    let rejected = post(server.addr, "not json").await;
    assert_eq!(status(&rejected), 400);
    let (_, body) = split(&rejected);
    let error: Value = serde_json::from_str(body).unwrap();
    assert_eq!(error["error"], "malformed document");

    let non_object = post(server.addr, "[1,2,3]").await;
    assert_eq!(status(&non_object), 400);

    assert_eq!(documents(&get(server.addr).await).len(), baseline);
    server.stop().await;
}

#[tokio::test]
async fn reads_preserve_insertion_order() {
    let server = spawn_test_server(memory_store(), ServerSettings::default()).await;
    post(server.addr, r#"{"x":1}"#).await;
    post(server.addr, r#"{"x":2}"#).await;

    assert_eq!(documents(&get(server.addr).await), vec![json!({"x": 1}), json!({"x": 2})]);
    server.stop().await;
}

#[tokio::test]
async fn empty_collection_reads_as_empty_success() {
    let server = spawn_test_server(memory_store(), ServerSettings::default()).await;

    let read = get(server.addr).await;
    assert_eq!(status(&read), 200);
    assert_eq!(split(&read).1, "");
    server.stop().await;
}

#[tokio::test]
async fn sequential_writes_yield_one_line_each() {
    let server = spawn_test_server(memory_store(), ServerSettings::default()).await;
    for i in 0..10 {
        let body = json!({"seq": i, "nested": {"tags": ["a", "b"]}}).to_string();
        assert_eq!(status(&post(server.addr, &body).await), 200);
    }

    let docs = documents(&get(server.addr).await);
    assert_eq!(docs.len(), 10);
    for (i, doc) in docs.iter().enumerate() {
        assert_eq!(doc["seq"], i);
    }
    assert_eq!(server.metrics.snapshot().documents_inserted, 10);
    server.stop().await;
}

#[tokio::test]
async fn large_scans_are_not_capped() {
    let store = Arc::new(MemoryStore::new("test_db", "test_coll"));
    for i in 0..500 {
        let doc = Document::from_value(json!({"i": i, "pad": "x".repeat(64)})).unwrap();
        store.insert_one(doc).unwrap();
    }
    let server = spawn_test_server(store, ServerSettings::default()).await;

    let read = get(server.addr).await;
    assert!(read.len() > 4096);
    assert_eq!(documents(&read).len(), 500);
    server.stop().await;
}

#[tokio::test]
async fn unsupported_method_is_405_and_leaves_store_untouched() {
    let store = Arc::new(MemoryStore::new("test_db", "test_coll"));
    let server = spawn_test_server(store.clone(), ServerSettings::default()).await;

    let response = exchange(
        server.addr,
        b"PUT / HTTP/1.1\r\nContent-Length: 7\r\n\r\n{\"x\":1}",
    )
    .await;
    assert_eq!(status(&response), 405);
    assert!(split(&response).0.contains("Allow: GET, POST"));
    assert!(store.is_empty());
    server.stop().await;
}

#[tokio::test]
async fn oversized_body_is_413_and_not_stored() {
    let store = Arc::new(MemoryStore::new("test_db", "test_coll"));
    let settings = ServerSettings {
        limits: ParseLimits { max_head_bytes: 1024, max_body_bytes: 16 },
        ..ServerSettings::default()
    };
    let server = spawn_test_server(store.clone(), settings).await;

    let response = exchange(server.addr, b"POST / HTTP/1.1\r\nContent-Length: 64\r\n\r\n").await;
    assert_eq!(status(&response), 413);
    assert!(store.is_empty());
    server.stop().await;
}

#[tokio::test]
async fn oversized_head_is_431() {
    let settings = ServerSettings {
        limits: ParseLimits { max_head_bytes: 64, max_body_bytes: 1024 },
        ..ServerSettings::default()
    };
    let server = spawn_test_server(memory_store(), settings).await;

    let raw = format!("GET / HTTP/1.1\r\nX-Padding: {}\r\n\r\n", "a".repeat(128));
    let response = exchange(server.addr, raw.as_bytes()).await;
    assert_eq!(status(&response), 431);
    assert_eq!(server.metrics.snapshot().client_errors, 1);
    server.stop().await;
}

#[tokio::test]
async fn chunked_body_is_501_and_not_stored() {
    let store = Arc::new(MemoryStore::new("test_db", "test_coll"));
    let server = spawn_test_server(store.clone(), ServerSettings::default()).await;

    let response = exchange(
        server.addr,
        b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n7\r\n{\"x\":1}\r\n0\r\n\r\n",
    )
    .await;
    assert_eq!(status(&response), 501);
    assert!(store.is_empty());
    assert_eq!(server.metrics.snapshot().server_errors, 1);
    server.stop().await;
}

#[tokio::test]
async fn garbage_request_line_is_400() {
    let server = spawn_test_server(memory_store(), ServerSettings::default()).await;
    let response = exchange(server.addr, b"hello there\r\n\r\n").await;
    assert_eq!(status(&response), 400);
    assert_eq!(server.metrics.snapshot().client_errors, 1);
    server.stop().await;
}

#[tokio::test]
async fn slow_peer_gets_408() {
    let settings = ServerSettings {
        request_timeout: Duration::from_millis(100),
        ..ServerSettings::default()
    };
    let server = spawn_test_server(memory_store(), settings).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    assert_eq!(status(&String::from_utf8(response).unwrap()), 408);

    // The loop keeps serving after a timed-out peer.
    assert_eq!(status(&get(server.addr).await), 200);
    server.stop().await;
}

#[tokio::test]
async fn disconnected_store_is_503() {
    let store = memory_store();
    store.disconnect().unwrap();
    let server = spawn_test_server(store, ServerSettings::default()).await;

    assert_eq!(status(&post(server.addr, r#"{"x":1}"#).await), 503);
    assert_eq!(status(&get(server.addr).await), 503);
    assert_eq!(server.metrics.snapshot().server_errors, 2);
    server.stop().await;
}

/// Store whose inserts fail and whose scans break after one document.
struct FlakyStore {
    unreachable: AtomicBool,
}

impl DocumentStore for FlakyStore {
    fn insert_one(&self, _document: Document) -> StoreResult<DocumentId> {
        Err(StoreError::Backend("duplicate key".to_string()))
    }

    fn scan_all(&self) -> StoreResult<DocumentCursor> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        let first = Document::from_value(json!({"x": 1})).unwrap();
        let items: Vec<StoreResult<Document>> = vec![
            Ok(first),
            Err(StoreError::Backend("cursor killed".to_string())),
        ];
        Ok(Box::new(items.into_iter()))
    }

    fn disconnect(&self) -> StoreResult<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        "flaky".to_string()
    }
}

#[tokio::test]
async fn store_failures_are_not_reported_as_success() {
    let store = Arc::new(FlakyStore { unreachable: AtomicBool::new(false) });
    let server = spawn_test_server(store.clone(), ServerSettings::default()).await;

    assert_eq!(status(&post(server.addr, r#"{"x":1}"#).await), 500);

    // Mid-stream failure: the status is already sent, so the body is cut short.
    let truncated = get(server.addr).await;
    assert_eq!(status(&truncated), 200);
    assert_eq!(documents(&truncated), vec![json!({"x": 1})]);

    store.unreachable.store(true, Ordering::SeqCst);
    assert_eq!(status(&get(server.addr).await), 503);
    server.stop().await;
}

/// Store that refuses every document as unrepresentable.
struct PickyStore;

impl DocumentStore for PickyStore {
    fn insert_one(&self, _document: Document) -> StoreResult<DocumentId> {
        Err(StoreError::InvalidDocument("invalid $date".to_string()))
    }

    fn scan_all(&self) -> StoreResult<DocumentCursor> {
        Ok(Box::new(std::iter::empty()))
    }

    fn disconnect(&self) -> StoreResult<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        "picky".to_string()
    }
}

#[tokio::test]
async fn document_refused_by_store_is_400() {
    let server = spawn_test_server(Arc::new(PickyStore), ServerSettings::default()).await;

    let response = post(server.addr, r#"{"when":{"$date":"nope"}}"#).await;
    assert_eq!(status(&response), 400);
    assert_eq!(server.metrics.snapshot().client_errors, 1);
    server.stop().await;
}

#[tokio::test]
async fn shutdown_waits_for_inflight_connection() {
    let store = Arc::new(MemoryStore::new("test_db", "test_coll"));
    store.insert_one(Document::from_value(json!({"x": 1})).unwrap()).unwrap();
    let TestServer { addr, shutdown, handle, .. } =
        spawn_test_server(store, ServerSettings::default()).await;

    let mut stalled = TcpStream::connect(addr).await.unwrap();
    stalled.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    shutdown.send(()).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!handle.is_finished(), "serve loop returned with a connection in flight");

    stalled.write_all(b"\r\n").await.unwrap();
    let mut response = Vec::new();
    stalled.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8(response).unwrap();
    assert_eq!(split(&response).0, "HTTP/1.1 200 OK\r\nContent-Type: application/json");
    assert_eq!(documents(&response), vec![json!({"x": 1})]);

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("serve loop finished after draining")
        .unwrap();
}

#[tokio::test]
async fn second_connection_waits_while_first_is_served() {
    let server = spawn_test_server(memory_store(), ServerSettings::default()).await;
    let addr = server.addr;

    let mut first = TcpStream::connect(addr).await.unwrap();
    first.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = tokio::spawn(async move { get(addr).await });
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!second.is_finished(), "second peer served while first was in flight");

    first.write_all(b"\r\n").await.unwrap();
    let mut response = Vec::new();
    first.read_to_end(&mut response).await.unwrap();
    assert_eq!(status(&String::from_utf8(response).unwrap()), 200);

    let second = tokio::time::timeout(Duration::from_secs(5), second)
        .await
        .expect("second peer served after first closed")
        .unwrap();
    assert_eq!(status(&second), 200);
    server.stop().await;
}

#[tokio::test]
async fn bounded_concurrency_allows_overlap() {
    let settings = ServerSettings { max_connections: 4, ..ServerSettings::default() };
    let server = spawn_test_server(memory_store(), settings).await;

    let mut stalled = TcpStream::connect(server.addr).await.unwrap();
    stalled.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let served = tokio::time::timeout(Duration::from_secs(5), post(server.addr, r#"{"x":1}"#))
        .await
        .expect("overlapping request served");
    assert_eq!(status(&served), 200);

    stalled.write_all(b"\r\n").await.unwrap();
    let mut response = Vec::new();
    stalled.read_to_end(&mut response).await.unwrap();
    assert_eq!(documents(&String::from_utf8(response).unwrap()), vec![json!({"x": 1})]);
    server.stop().await;
}

#[tokio::test]
async fn file_backend_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        backend: StoreBackend::File { root: dir.path().to_path_buf() },
        ..StoreConfig::default()
    };

    let store = docbridge_store::connect(&config).unwrap();
    let server = spawn_test_server(Arc::clone(&store), ServerSettings::default()).await;
    post(server.addr, r#"{"x":1}"#).await;
    post(server.addr, r#"{"x":2}"#).await;
    server.stop().await;
    store.disconnect().unwrap();

    let store = docbridge_store::connect(&config).unwrap();
    let server = spawn_test_server(store, ServerSettings::default()).await;
    assert_eq!(documents(&get(server.addr).await), vec![json!({"x": 1}), json!({"x": 2})]);
    server.stop().await;
}
