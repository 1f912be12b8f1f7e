//! API root handler.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use super::{authorize, hyper_json};
use crate::mock_server::fixtures::ROOT_MIME_TYPE;
use crate::mock_server::state::MockState;

/// The root payload for a server at `base_url`.
pub fn root_payload(state: &MockState) -> Value {
    let base = &state.base_url;

    json!({
        "stat": "ok",
        "uri_templates": {
            "widgets": format!("{base}/api/widgets/"),
            "widget": format!("{base}/api/widgets/{{widget_id}}/"),
        },
        "capabilities": {
            "authentication": {"client_web_login": state.web_login},
        },
        "product": {
            "name": "Widget Server",
            "package_version": state.product_version,
        },
        "links": {
            "self": {"href": format!("{base}/api/"), "method": "GET"},
            "widgets": {"href": format!("{base}/api/widgets/"), "method": "GET"},
        },
    })
}

/// GET /api/
pub async fn get_root(
    State(state): State<Arc<RwLock<MockState>>>,
    headers: HeaderMap,
) -> Response {
    let state = state.read().await;
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    hyper_json(StatusCode::OK, ROOT_MIME_TYPE, None, &root_payload(&state))
}
