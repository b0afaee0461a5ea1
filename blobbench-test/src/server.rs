//! Exposes an in-process blob server for use in integration tests.
//!
//! ```
//! use blobbench_test::server::TestServer;
//!
//! let server = TestServer::new();
//! let endpoint = server.url();
//! // point an HTTP transport at the endpoint...
//! ```

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use tokio::sync::oneshot;

#[derive(Debug, Default)]
struct ServerState {
    blobs: Mutex<HashMap<(String, String), Bytes>>,
    fail_next: AtomicUsize,
    requests: AtomicUsize,
}

impl ServerState {
    /// Counts the request and returns `true` if it should be rejected.
    fn should_fail(&self) -> bool {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.fail_next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

type SharedState = Arc<ServerState>;

async fn put_blob(
    State(state): State<SharedState>,
    Path((container, name)): Path<(String, String)>,
    body: Bytes,
) -> StatusCode {
    if state.should_fail() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    state.blobs.lock().unwrap().insert((container, name), body);
    StatusCode::CREATED
}

async fn get_blob(
    State(state): State<SharedState>,
    Path((container, name)): Path<(String, String)>,
) -> Result<Bytes, StatusCode> {
    if state.should_fail() {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    let blobs = state.blobs.lock().unwrap();
    blobs
        .get(&(container, name))
        .cloned()
        .ok_or(StatusCode::NOT_FOUND)
}

/// An in-process blob server for use in integration tests.
///
/// Blobs are kept in memory and addressed as `/{container}/{name}`. The server runs on its own
/// thread and runtime, so it can be used from synchronous tests, and listens on a random available
/// port on localhost. It shuts down when dropped.
#[derive(Debug)]
pub struct TestServer {
    socket: SocketAddr,
    state: SharedState,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TestServer {
    pub fn new() -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let state = SharedState::default();
        let app = Router::new()
            .route("/{container}/{name}", get(get_blob).put(put_blob))
            .layer(DefaultBodyLimit::disable())
            .with_state(Arc::clone(&state));

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let thread = std::thread::Builder::new()
            .name("test-server".into())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap();

                runtime.block_on(async move {
                    let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                    axum::serve(listener, app)
                        .with_graceful_shutdown(async {
                            shutdown_rx.await.ok();
                        })
                        .await
                        .unwrap();
                });
            })
            .unwrap();

        Self {
            socket,
            state,
            shutdown: Some(shutdown),
            thread: Some(thread),
        }
    }

    /// Returns the base URL of the server.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self) -> String {
        format!("http://localhost:{}", self.socket.port())
    }

    /// Rejects the next `count` requests with `503 Service Unavailable`.
    pub fn fail_next(&self, count: usize) {
        self.state.fail_next.store(count, Ordering::Release);
    }

    /// Returns the number of requests received so far.
    pub fn requests(&self) -> usize {
        self.state.requests.load(Ordering::Relaxed)
    }

    /// Returns the stored contents of a blob.
    pub fn blob(&self, container: &str, name: &str) -> Option<Bytes> {
        let key = (container.to_owned(), name.to_owned());
        self.state.blobs.lock().unwrap().get(&key).cloned()
    }

    /// Returns the number of stored blobs.
    pub fn blob_count(&self) -> usize {
        self.state.blobs.lock().unwrap().len()
    }
}

impl Default for TestServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            shutdown.send(()).ok();
        }
        // Connections still held by a client would block a join, so the thread is detached.
        self.thread.take();
    }
}
