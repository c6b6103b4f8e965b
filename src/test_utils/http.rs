//! Loopback HTTP server answering fixed responses per path.
//!
//! An axum [`Router`] with a single fallback handler looks each request path
//! up in a shared table, so routes can be added after the server started.
//! Unknown paths get a 404.

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
enum Canned {
    Body {
        status: u16,
        content_type: &'static str,
        body: Vec<u8>,
    },
    Redirect(String),
}

#[derive(Debug, Default)]
struct Shared {
    routes: Mutex<HashMap<String, Canned>>,
    hits: AtomicUsize,
}

/// Local server with canned responses.
#[derive(Debug)]
pub struct CannedHttp {
    addr: SocketAddr,
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl CannedHttp {
    /// Binds an ephemeral port on loopback and starts serving.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        let shared = Arc::new(Shared::default());

        let router = Router::new().fallback(respond).with_state(Arc::clone(&shared));
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::debug!("canned HTTP server stopped: {e}");
            }
        });

        Self {
            addr,
            shared,
            task,
        }
    }

    /// `http://127.0.0.1:<port>`
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Requests served so far, 404s included.
    pub fn hits(&self) -> usize {
        self.shared.hits.load(Ordering::SeqCst)
    }

    fn route(self, path: &str, canned: Canned) -> Self {
        self.shared
            .routes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(path.to_string(), canned);
        self
    }

    pub fn json(self, path: &str, body: &str) -> Self {
        self.route(
            path,
            Canned::Body {
                status: 200,
                content_type: "application/json",
                body: body.as_bytes().to_vec(),
            },
        )
    }

    pub fn text(self, path: &str, body: &str) -> Self {
        self.route(
            path,
            Canned::Body {
                status: 200,
                content_type: "text/plain",
                body: body.as_bytes().to_vec(),
            },
        )
    }

    pub fn bytes(self, path: &str, body: Vec<u8>) -> Self {
        self.route(
            path,
            Canned::Body {
                status: 200,
                content_type: "application/octet-stream",
                body,
            },
        )
    }

    /// Empty body with the given status.
    pub fn status(self, path: &str, status: u16) -> Self {
        self.route(
            path,
            Canned::Body {
                status,
                content_type: "text/plain",
                body: Vec::new(),
            },
        )
    }

    /// `302 Found` to `location`.
    pub fn redirect(self, path: &str, location: &str) -> Self {
        self.route(path, Canned::Redirect(location.to_string()))
    }
}

impl Drop for CannedHttp {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn respond(State(shared): State<Arc<Shared>>, uri: Uri) -> Response {
    shared.hits.fetch_add(1, Ordering::SeqCst);
    let canned = shared
        .routes
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .get(uri.path())
        .cloned();

    match canned {
        Some(Canned::Body {
            status,
            content_type,
            body,
        }) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, [(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Some(Canned::Redirect(location)) => {
            (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
        }
        None => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}
