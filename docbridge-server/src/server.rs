//! # Connection Acceptor and Request Handler
//!
//! Accept TCP connections, frame one request per connection, dispatch it to
//! the document store and write exactly one response before closing.
//!
//! ## Design Principles
//!
//! 1. **Bounded Admission**: A semaphore gates `accept`, so with one permit the
//!    next peer waits in the listen backlog until the current one is closed.
//! 2. **Blocking Store, Async Socket**: Store calls run on the blocking pool;
//!    scans feed the socket through a bounded channel.
//! 3. **No Silent Success**: Every failure before the status line is sent is
//!    answered with its own status; failures after it truncate the stream.
//! 4. **Loop Survives Peers**: Accept and per-connection errors are logged,
//!    never propagated out of the loop.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, mpsc, oneshot};
use tracing::{Instrument, debug, error, info, info_span, warn};

use docbridge_common::{BridgeError, Document, DocumentId, RequestKind};
use docbridge_store::{SharedStore, StoreError, StoreResult};

use crate::metrics::Metrics;
use crate::protocol::{ParseLimits, Request, RequestParser};
use crate::response::{SCAN_HEAD, WRITE_OK, encode_document_line, encode_error};

/// Default listen backlog.
pub const DEFAULT_BACKLOG: i32 = 3;

/// Default number of connections handled at once.
pub const DEFAULT_MAX_CONNECTIONS: usize = 1;

/// Default time allowed for a peer to send its full request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Initial read buffer size.
const READ_CHUNK: usize = 4 * 1024;

/// Scan output is flushed whenever the buffer grows past this size.
const FLUSH_THRESHOLD: usize = 16 * 1024;

/// Documents buffered between the store cursor and the socket.
const SCAN_CHANNEL_DEPTH: usize = 64;

/// Runtime knobs for the accept loop and handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSettings {
    /// Connections handled concurrently; 1 serializes requests.
    pub max_connections: usize,
    /// Upper bound on receiving a complete request.
    pub request_timeout: Duration,
    /// Request size limits.
    pub limits: ParseLimits,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            limits: ParseLimits::default(),
        }
    }
}

/// Binds a listening socket on `addr` with the given backlog.
///
/// Must be called from within a tokio runtime.
pub fn bind_listener(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    socket.set_nonblocking(true)?;
    TcpListener::from_std(socket.into())
}

/// Accept loop bound to one listener and one store.
pub struct Server {
    listener: TcpListener,
    store: SharedStore,
    settings: ServerSettings,
    metrics: Arc<Metrics>,
}

impl Server {
    /// Creates a server over an already bound listener.
    pub fn new(listener: TcpListener, store: SharedStore, settings: ServerSettings) -> Self {
        Server {
            listener,
            store,
            settings,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared metrics, readable after the server stops.
    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Accepts and serves connections until `shutdown` resolves, then waits
    /// for in-flight connections to finish.
    pub async fn serve_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let max_connections = self.settings.max_connections.max(1);
        let permits = Arc::new(Semaphore::new(max_connections));
        let next_id = AtomicU64::new(1);
        tokio::pin!(shutdown);

        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        drop(permit);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                },
            };

            let id = next_id.fetch_add(1, Ordering::Relaxed);
            let store = Arc::clone(&self.store);
            let metrics = Arc::clone(&self.metrics);
            let settings = self.settings;
            let span = info_span!("conn", id, %peer);

            tokio::spawn(
                async move {
                    if let Err(err) = handle_connection(stream, store, &settings, &metrics).await {
                        debug!(error = %err, "connection ended with i/o error");
                    }
                    drop(permit);
                }
                .instrument(span),
            );
        }

        info!("shutdown requested; draining connections");
        // Every permit back means every connection task has finished.
        let _ = permits.acquire_many(max_connections as u32).await;
    }
}

/// Serves exactly one request on `stream`, then closes it.
pub async fn handle_connection(
    mut stream: TcpStream,
    store: SharedStore,
    settings: &ServerSettings,
    metrics: &Metrics,
) -> io::Result<()> {
    let started = Instant::now();
    metrics.record_connection_start();
    let result = serve_request(&mut stream, &store, settings, metrics).await;
    let closed = stream.shutdown().await;
    metrics.record_connection_end(started.elapsed());
    result.and(closed.or_else(ignore_disconnect))
}

enum Incoming {
    Request(Request),
    Rejected(BridgeError),
    Closed { partial: bool },
}

/// What happened to a dispatched request.
enum Completion {
    Stored(DocumentId),
    Streamed(usize),
    Truncated { sent: usize, error: StoreError },
    Rejected { error: BridgeError, detail: String },
}

async fn serve_request(
    stream: &mut TcpStream,
    store: &SharedStore,
    settings: &ServerSettings,
    metrics: &Metrics,
) -> io::Result<()> {
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    let mut parser = RequestParser::new(settings.limits);

    let incoming = match tokio::time::timeout(
        settings.request_timeout,
        read_request(stream, &mut buf, &mut parser),
    )
    .await
    {
        Ok(incoming) => incoming?,
        Err(_) => Incoming::Rejected(BridgeError::RequestTimeout),
    };

    let request = match incoming {
        Incoming::Request(request) => request,
        Incoming::Rejected(error) => {
            let detail = match error {
                BridgeError::RequestTimeout => "request was not received in time",
                BridgeError::PayloadTooLarge => "request body exceeds the configured limit",
                BridgeError::HeaderTooLarge => "request head exceeds the configured limit",
                BridgeError::UnsupportedEncoding => "only Content-Length bodies are supported",
                _ => "request could not be parsed",
            };
            return respond_error(stream, metrics, error, detail).await;
        }
        Incoming::Closed { partial } => {
            debug!(partial, "peer closed before sending a complete request");
            return Ok(());
        }
    };

    debug!(method = %request.method, target = %request.target, "request received");
    let completion = match &request.kind {
        RequestKind::Write => handle_write(stream, store, &request).await?,
        RequestKind::Read => handle_read(stream, store).await?,
        RequestKind::Unsupported(method) => Completion::Rejected {
            error: BridgeError::UnsupportedMethod,
            detail: format!("method `{method}` is not supported"),
        },
    };

    match completion {
        Completion::Stored(id) => {
            metrics.record_insert();
            debug!(%id, "document stored");
            Ok(())
        }
        Completion::Streamed(sent) => {
            metrics.record_scan(sent);
            debug!(documents = sent, "scan streamed");
            Ok(())
        }
        Completion::Truncated { sent, error } => {
            metrics.record_server_error();
            error!(documents = sent, error = %error, "scan failed mid-stream; response truncated");
            Ok(())
        }
        Completion::Rejected { error, detail } => {
            respond_error(stream, metrics, error, &detail).await
        }
    }
}

async fn read_request(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    parser: &mut RequestParser,
) -> io::Result<Incoming> {
    loop {
        match parser.parse(buf) {
            Ok(Some(request)) => return Ok(Incoming::Request(request)),
            Ok(None) => {}
            Err(error) => return Ok(Incoming::Rejected(error)),
        }
        if stream.read_buf(buf).await? == 0 {
            let partial = !buf.is_empty() || parser.awaiting_body();
            return Ok(Incoming::Closed { partial });
        }
    }
}

/// Write path: parse the body, insert it, acknowledge with an empty 200.
async fn handle_write(
    stream: &mut TcpStream,
    store: &SharedStore,
    request: &Request,
) -> io::Result<Completion> {
    let document = match Document::from_json_bytes(&request.body) {
        Ok(document) => document,
        Err(error) => {
            return Ok(Completion::Rejected {
                error,
                detail: "request body must be a JSON object".to_string(),
            });
        }
    };

    let store = Arc::clone(store);
    match tokio::task::spawn_blocking(move || store.insert_one(document)).await {
        Ok(Ok(id)) => {
            stream.write_all(WRITE_OK).await?;
            Ok(Completion::Stored(id))
        }
        Ok(Err(err)) => Ok(Completion::Rejected {
            error: BridgeError::from(&err),
            detail: err.to_string(),
        }),
        Err(join) => Ok(Completion::Rejected {
            error: BridgeError::InternalError,
            detail: join.to_string(),
        }),
    }
}

/// Read path: open a scan, commit the 200 head, stream one line per document.
async fn handle_read(stream: &mut TcpStream, store: &SharedStore) -> io::Result<Completion> {
    let (opened_tx, opened_rx) = oneshot::channel::<StoreResult<()>>();
    let (doc_tx, mut doc_rx) = mpsc::channel::<StoreResult<Document>>(SCAN_CHANNEL_DEPTH);

    let producer = Arc::clone(store);
    tokio::task::spawn_blocking(move || {
        let cursor = match producer.scan_all() {
            Ok(cursor) => {
                let _ = opened_tx.send(Ok(()));
                cursor
            }
            Err(err) => {
                let _ = opened_tx.send(Err(err));
                return;
            }
        };
        for item in cursor {
            let failed = item.is_err();
            // A closed receiver means the peer went away.
            if doc_tx.blocking_send(item).is_err() || failed {
                break;
            }
        }
    });

    match opened_rx.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            return Ok(Completion::Rejected {
                error: BridgeError::from(&err),
                detail: err.to_string(),
            });
        }
        Err(_) => {
            return Ok(Completion::Rejected {
                error: BridgeError::InternalError,
                detail: "scan task ended before opening a cursor".to_string(),
            });
        }
    }

    let mut out = BytesMut::with_capacity(FLUSH_THRESHOLD);
    out.extend_from_slice(SCAN_HEAD);
    let mut sent = 0;

    while let Some(item) = doc_rx.recv().await {
        match item {
            Ok(document) => {
                encode_document_line(&document, &mut out);
                sent += 1;
                if out.len() >= FLUSH_THRESHOLD {
                    stream.write_all(&out).await?;
                    out.clear();
                }
            }
            Err(error) => {
                stream.write_all(&out).await?;
                return Ok(Completion::Truncated { sent, error });
            }
        }
    }

    stream.write_all(&out).await?;
    Ok(Completion::Streamed(sent))
}

async fn respond_error(
    stream: &mut TcpStream,
    metrics: &Metrics,
    error: BridgeError,
    detail: &str,
) -> io::Result<()> {
    let status = error.status();
    if status.code() >= 500 {
        metrics.record_server_error();
        error!(status = status.code(), code = error.code(), %error, detail, "request failed");
    } else {
        metrics.record_client_error();
        warn!(status = status.code(), code = error.code(), %error, detail, "request rejected");
    }
    stream.write_all(&encode_error(error, detail)).await
}

fn ignore_disconnect(err: io::Error) -> io::Result<()> {
    match err.kind() {
        io::ErrorKind::NotConnected | io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe => {
            Ok(())
        }
        _ => Err(err),
    }
}
