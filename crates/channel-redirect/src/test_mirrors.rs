//! Local mirror servers for race and handler tests.
//!
//! Paths understood by a mirror:
//! - `/ok`: 200 immediately
//! - `/slow/<ms>`: 200 after `<ms>` milliseconds
//! - `/status/<code>`: the given status immediately
//! - `/redirect`: 302 to `/ok`
//!
//! [`StalledListener`] stands in for a mirror whose connect never completes.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;

pub struct Mirror {
    base: String,
    hits: Arc<AtomicUsize>,
}

impl Mirror {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Number of requests the mirror has received.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

pub async fn spawn_mirror() -> Mirror {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new().fallback(serve).with_state(hits.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(axum::serve(listener, app).into_future());

    Mirror {
        base: format!("http://{addr}"),
        hits,
    }
}

/// A URL on a port nothing listens on.
pub fn refused_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/stream")
}

/// A listener whose accept queue is full and never drained, so new
/// connections hang in the handshake instead of being refused.
pub struct StalledListener {
    addr: SocketAddr,
    _listener: tokio::net::TcpListener,
    _queued: Vec<std::net::TcpStream>,
}

impl StalledListener {
    pub async fn new() -> Self {
        let socket = tokio::net::TcpSocket::new_v4().unwrap();
        socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = socket.local_addr().unwrap();
        let listener = socket.listen(0).unwrap();

        let mut queued = Vec::new();
        for _ in 0..8 {
            match std::net::TcpStream::connect_timeout(&addr, Duration::from_millis(50)) {
                Ok(stream) => queued.push(stream),
                Err(_) => break,
            }
        }

        Self {
            addr,
            _listener: listener,
            _queued: queued,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}/stream", self.addr)
    }
}

async fn serve(State(hits): State<Arc<AtomicUsize>>, uri: Uri) -> Response {
    hits.fetch_add(1, Ordering::SeqCst);
    let path = uri.path();

    if let Some(ms) = path.strip_prefix("/slow/").and_then(|ms| ms.parse().ok()) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        return (StatusCode::OK, "live").into_response();
    }
    if let Some(code) = path.strip_prefix("/status/").and_then(|c| c.parse().ok()) {
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, "status").into_response();
    }
    match path {
        "/ok" => (StatusCode::OK, "live").into_response(),
        "/redirect" => (StatusCode::FOUND, [(header::LOCATION, "/ok")]).into_response(),
        _ => (StatusCode::NOT_FOUND, "unknown").into_response(),
    }
}
