//! Widget endpoint handlers.

use std::sync::Arc;

use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use super::{api_error, authorize, form_fields, hyper_json};
use crate::mock_server::fixtures::{WIDGETS_MIME_TYPE, WIDGET_MIME_TYPE};
use crate::mock_server::state::{MockState, Widget};

/// Page size when `max-results` is not given.
pub const DEFAULT_MAX_RESULTS: usize = 25;

/// Query parameters for listing widgets.
#[derive(Debug, Default, Deserialize)]
pub struct ListWidgetsQuery {
    pub start: Option<usize>,
    #[serde(rename = "max-results")]
    pub max_results: Option<usize>,
    #[serde(rename = "counts-only")]
    pub counts_only: Option<String>,
    pub color: Option<String>,
}

fn list_url(base: &str) -> String {
    format!("{base}/api/widgets/")
}

fn page_url(base: &str, color: Option<&str>, start: usize, max_results: usize) -> String {
    let mut url = format!("{}?start={start}&max-results={max_results}", list_url(base));
    if let Some(color) = color {
        url.push_str(&format!("&color={color}"));
    }
    url
}

/// One widget as it appears in item and list payloads.
pub fn widget_payload(base: &str, widget: &Widget) -> Value {
    let href = format!("{}{}/", list_url(base), widget.id);

    json!({
        "id": widget.id,
        "name": widget.name,
        "color": widget.color,
        "extra_data": widget.extra_data,
        "links": {
            "self": {"href": href, "method": "GET"},
            "update": {"href": href, "method": "PUT"},
            "delete": {"href": href, "method": "DELETE"},
            "widgets": {"href": list_url(base), "method": "GET"},
        },
    })
}

fn item_body(base: &str, widget: &Widget) -> Value {
    json!({
        "stat": "ok",
        "widget": widget_payload(base, widget),
    })
}

fn etag_for(body: &Value) -> String {
    let digest = Sha256::digest(body.to_string().as_bytes());
    format!("\"{digest:x}\"")
}

fn not_found() -> Response {
    api_error(StatusCode::NOT_FOUND, 100, "Object does not exist", None)
}

fn invalid_field(field: &str, message: &str) -> Response {
    api_error(
        StatusCode::BAD_REQUEST,
        105,
        "One or more fields had errors",
        Some(json!({ field: [message] })),
    )
}

/// GET /api/widgets/
pub async fn list_widgets(
    State(state): State<Arc<RwLock<MockState>>>,
    headers: HeaderMap,
    Query(query): Query<ListWidgetsQuery>,
) -> Response {
    let state = state.read().await;
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    let base = &state.base_url;
    let color = query.color.as_deref();
    let start = query.start.unwrap_or(0);
    let max_results = query.max_results.unwrap_or(DEFAULT_MAX_RESULTS).clamp(1, 200);
    let (page, total) = state.list_widgets(color, start, max_results);

    if matches!(query.counts_only.as_deref(), Some("1" | "true")) {
        let body = json!({"stat": "ok", "count": total});
        return hyper_json(StatusCode::OK, WIDGETS_MIME_TYPE, None, &body);
    }

    let mut links = json!({
        "self": {"href": page_url(base, color, start, max_results), "method": "GET"},
        "create": {"href": list_url(base), "method": "POST"},
    });
    if start + max_results < total {
        links["next"] = json!({
            "href": page_url(base, color, start + max_results, max_results),
            "method": "GET",
        });
    }
    if start > 0 {
        links["prev"] = json!({
            "href": page_url(base, color, start.saturating_sub(max_results), max_results),
            "method": "GET",
        });
    }

    let widgets: Vec<Value> = page.iter().map(|w| widget_payload(base, w)).collect();
    let body = json!({
        "stat": "ok",
        "total_results": total,
        "widgets": widgets,
        "links": links,
    });

    hyper_json(
        StatusCode::OK,
        WIDGETS_MIME_TYPE,
        Some(WIDGET_MIME_TYPE),
        &body,
    )
}

/// GET /api/widgets/{id}/
///
/// Answers with an `ETag` and `Cache-Control: no-cache`, and with
/// 304 Not Modified when `If-None-Match` matches.
pub async fn get_widget(
    State(state): State<Arc<RwLock<MockState>>>,
    Path(id): Path<u64>,
    headers: HeaderMap,
) -> Response {
    let mut state = state.write().await;
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    let Some(widget) = state.get_widget(id) else {
        return not_found();
    };
    let body = item_body(&state.base_url, widget);
    let etag = etag_for(&body);

    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok());
    if if_none_match == Some(etag.as_str()) {
        state.not_modified_count += 1;
        return (StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response();
    }

    let mut response = hyper_json(StatusCode::OK, WIDGET_MIME_TYPE, None, &body);
    if let Ok(etag) = HeaderValue::from_str(&etag) {
        response.headers_mut().insert(header::ETAG, etag);
    }
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

/// POST /api/widgets/
pub async fn create_widget(
    State(state): State<Arc<RwLock<MockState>>>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let fields = form_fields(multipart).await;

    let mut state = state.write().await;
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    let Some(name) = fields.get("name").filter(|name| !name.is_empty()) else {
        return invalid_field("name", "This field is required.");
    };
    let color = fields
        .get("color")
        .cloned()
        .unwrap_or_else(|| "gray".to_string());

    let id = state.create_widget(name.clone(), color).id;
    let Some(widget) = state.update_widget(id, &fields).cloned() else {
        return not_found();
    };

    hyper_json(
        StatusCode::CREATED,
        WIDGET_MIME_TYPE,
        None,
        &item_body(&state.base_url, &widget),
    )
}

/// PUT /api/widgets/{id}/
pub async fn update_widget(
    State(state): State<Arc<RwLock<MockState>>>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let fields = form_fields(multipart).await;

    let mut state = state.write().await;
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    if fields.get("color").is_some_and(String::is_empty) {
        return invalid_field("color", "This field may not be blank.");
    }

    let Some(widget) = state.update_widget(id, &fields).cloned() else {
        return not_found();
    };

    hyper_json(
        StatusCode::OK,
        WIDGET_MIME_TYPE,
        None,
        &item_body(&state.base_url, &widget),
    )
}

/// DELETE /api/widgets/{id}/
pub async fn delete_widget(
    State(state): State<Arc<RwLock<MockState>>>,
    Path(id): Path<u64>,
    headers: HeaderMap,
) -> Response {
    let mut state = state.write().await;
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    match state.delete_widget(id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => not_found(),
    }
}
