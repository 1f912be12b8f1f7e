//! HTTP request handlers for the mock server.

pub mod root;
pub mod widgets;

pub use root::*;
pub use widgets::*;

use std::collections::BTreeMap;

use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};

use super::state::MockState;

/// A JSON response with a vendor content type.
pub(crate) fn hyper_json(
    status: StatusCode,
    mime_type: &str,
    item_mime_type: Option<&str>,
    body: &Value,
) -> Response {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(mime_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Some(value) = item_mime_type.and_then(|mime| HeaderValue::from_str(mime).ok()) {
        headers.insert("item-content-type", value);
    }

    (status, headers, body.to_string()).into_response()
}

/// A `stat: fail` error response.
pub(crate) fn api_error(status: StatusCode, code: i64, msg: &str, fields: Option<Value>) -> Response {
    let mut body = json!({
        "stat": "fail",
        "err": {"code": code, "msg": msg},
    });
    if let Some(fields) = fields {
        body["fields"] = fields;
    }

    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Reject the request unless it carries the required token.
pub(crate) fn authorize(state: &MockState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(token) = &state.required_token else {
        return Ok(());
    };

    let expected = format!("token {token}");
    let sent = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if sent == Some(expected.as_str()) {
        return Ok(());
    }

    let mut response = api_error(StatusCode::UNAUTHORIZED, 103, "You are not logged in", None);
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"Web API\""),
    );
    Err(response)
}

/// Text fields of a `multipart/form-data` body. A missing body has no fields.
pub(crate) async fn form_fields(
    multipart: Result<Multipart, MultipartRejection>,
) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    let Ok(mut multipart) = multipart else {
        return fields;
    };

    while let Ok(Some(field)) = multipart.next_field().await {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if let Ok(value) = field.text().await {
            fields.insert(name, value);
        }
    }

    fields
}
