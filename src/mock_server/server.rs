//! Lifecycle of the mock widget API.

use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::fixtures::Fixtures;
use super::handlers;
use super::state::MockState;

/// A widget API served from a background task on an ephemeral port.
///
/// Links in every payload are absolute URLs built from [`url`](Self::url).
pub struct MockServer {
    url: String,
    handle: JoinHandle<()>,
    state: Arc<RwLock<MockState>>,
}

impl MockServer {
    /// Serve the five widgets of [`Fixtures::default_scenario`].
    pub async fn start() -> Self {
        let state = Fixtures::default_scenario()
            .widgets
            .into_iter()
            .fold(MockState::new(), MockState::with_widget);
        Self::with_state(state).await
    }

    /// Serve no widgets at all.
    pub async fn start_empty() -> Self {
        Self::with_state(MockState::new()).await
    }

    pub async fn with_state(state: MockState) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to address");
        let url = format!(
            "http://{}",
            listener.local_addr().expect("Failed to get local address")
        );

        let mut state = state;
        state.base_url = url.clone();
        let state = state.shared();
        let app = routes(state.clone());

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::warn!(error = %e, "Mock server stopped");
            }
        });

        Self { url, handle, state }
    }

    /// `http://127.0.0.1:<port>`; the API root is at `<url>/api/`.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The live server state, for seeding or inspecting data mid-test.
    pub fn state(&self) -> Arc<RwLock<MockState>> {
        self.state.clone()
    }

    pub async fn shutdown(self) {
        self.handle.abort();
        let _ = self.handle.await;
    }
}

fn routes(state: Arc<RwLock<MockState>>) -> Router {
    Router::new()
        .route("/api/", get(handlers::get_root))
        .route(
            "/api/widgets/",
            get(handlers::list_widgets).post(handlers::create_widget),
        )
        .route(
            "/api/widgets/:id/",
            get(handlers::get_widget)
                .put(handlers::update_widget)
                .delete(handlers::delete_widget),
        )
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
}
