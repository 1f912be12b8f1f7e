//! Mock hypermedia API server for E2E testing.
//!
//! This module provides an in-memory mock server that serves a small widget
//! API for integration and end-to-end testing. Unlike wiremock which mocks at
//! the HTTP level per-test, this server maintains state across requests and
//! emits real links, enabling workflow tests that navigate by hypermedia.
//!
//! Routes:
//!
//! - `GET /api/` - root with URI templates and capabilities
//! - `GET /api/widgets/` - paginated list (`start`, `max-results`, `color`,
//!   `counts-only`) with a `create` link
//! - `POST /api/widgets/` - create a widget
//! - `GET|PUT|DELETE /api/widgets/{id}/` - a single widget, with ETags
//!
//! # Example
//!
//! ```ignore
//! use hyperapi::mock_server::MockServer;
//! use hyperapi::{ApiClient, HyperResource, QueryArgs, TransportConfig};
//!
//! #[tokio::test]
//! async fn test_workflow() {
//!     let server = MockServer::start().await;
//!     let client = ApiClient::new(server.url(), TransportConfig::default()).unwrap();
//!
//!     // Server comes with default fixtures
//!     let widget = client.get_path("widgets/1", &QueryArgs::new()).await.unwrap();
//!     assert_eq!(widget.value("name").unwrap(), "sprocket");
//!
//!     server.shutdown().await;
//! }
//! ```

mod fixtures;
mod handlers;
mod server;
mod state;

pub use fixtures::{
    DefaultScenario, Fixtures, ROOT_MIME_TYPE, WIDGETS_MIME_TYPE, WIDGET_MIME_TYPE,
};
pub use server::MockServer;
pub use state::{MockState, Widget};
