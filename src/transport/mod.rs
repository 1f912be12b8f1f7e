//! Request execution.
//!
//! Every resource action reduces to a [`MethodResult`]: either a request that
//! still has to be sent, or a value that is already known. A [`Transport`]
//! executes the former and builds the next resource through its
//! [`ResourceFactory`]. The resource layer never touches the network
//! directly, so [`HttpTransport`] and [`ReplayTransport`] share it unchanged.

pub mod auth;
pub mod cache;
pub mod cookies;
mod http;
mod replay;
pub mod web_login;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;

use crate::error::{HyperApiError, Result};
use crate::factory::{CreateOptions, ResourceFactory, ResourceKind};
use crate::request::HttpRequest;
use crate::resource::Resource;

use self::cache::CacheEntry;

pub use http::{HttpTransport, HttpTransportBuilder};
pub use replay::ReplayTransport;

/// The outcome of a resource action before execution.
#[derive(Debug)]
pub enum MethodResult {
    /// A request the transport must send.
    Request(HttpRequest),
    /// A value returned to the caller unchanged.
    Resolved(Option<Resource>),
}

impl From<HttpRequest> for MethodResult {
    fn from(request: HttpRequest) -> Self {
        Self::Request(request)
    }
}

/// Executes requests and turns responses into resources.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// The factory responses are built with.
    fn factory(&self) -> &ResourceFactory;

    /// A shared handle to this transport, stored in every resource it builds.
    fn handle(&self) -> Arc<dyn Transport>;

    /// Send one request.
    ///
    /// Returns `None` for DELETE requests and empty bodies.
    ///
    /// # Errors
    ///
    /// Returns [`HyperApiError::ServerApi`] for non-2xx responses and
    /// payloads whose `stat` is not `ok`, and
    /// [`HyperApiError::ServerInterface`] when the server cannot be reached.
    async fn execute_request(&self, request: HttpRequest) -> Result<Option<Resource>>;

    /// Execute a method result.
    async fn execute(&self, method: MethodResult) -> Result<Option<Resource>> {
        match method {
            MethodResult::Request(request) => self.execute_request(request).await,
            MethodResult::Resolved(value) => Ok(value),
        }
    }

    /// Stop caching responses for the rest of the session.
    fn disable_cache(&self) {}
}

/// A response as received, or as replayed from the cache.
#[derive(Debug, Clone)]
pub(crate) struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, content_type: Option<&str>, body: Vec<u8>) -> Self {
        let mut headers = HeaderMap::new();
        if let Some(value) = content_type.and_then(|ct| HeaderValue::from_str(ct).ok()) {
            headers.insert(CONTENT_TYPE, value);
        }
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn item_content_type(&self) -> Option<&str> {
        self.header(ITEM_CONTENT_TYPE)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// A 200 rebuilt from a cache entry.
    pub fn from_cache(entry: &CacheEntry) -> Self {
        let mut response = Self::new(200, entry.mime_type.as_deref(), entry.response_body.clone());
        if let Some(value) = entry
            .item_mime_type
            .as_deref()
            .and_then(|mime| HeaderValue::from_str(mime).ok())
        {
            response.headers.insert(ITEM_CONTENT_TYPE, value);
        }
        response
    }
}

/// Header carrying the content type of a list's items.
pub(crate) const ITEM_CONTENT_TYPE: &str = "item-content-type";

/// Turn a response into a resource or an API error.
pub(crate) fn build_response(
    transport: &dyn Transport,
    method: &Method,
    url: &str,
    response: &RawResponse,
    force_kind: Option<ResourceKind>,
) -> Result<Option<Resource>> {
    if !response.is_success() {
        return Err(error_from_body(response.status, &response.body));
    }

    if *method == Method::DELETE || response.body.is_empty() {
        return Ok(None);
    }

    let content_type = response.content_type().unwrap_or("application/json");
    let payload = transport
        .factory()
        .decoders()
        .decode(&response.body, content_type)?;

    if let Some(err) = HyperApiError::from_failed_stat(response.status, &payload) {
        tracing::debug!(status = response.status, code = err.error_code(), url, "Request failed");
        return Err(err);
    }

    let mut options = CreateOptions::new().mime_type(content_type);
    if let Some(item_content_type) = response.item_content_type() {
        options = options.item_mime_type(item_content_type);
    }
    if let Some(kind) = force_kind {
        options = options.force_kind(kind);
    }

    let resource = transport
        .factory()
        .create(transport.handle(), payload, url, &options)?;

    Ok(Some(resource))
}

/// The API error for a non-2xx response body.
pub(crate) fn error_from_body(status: u16, body: &[u8]) -> HyperApiError {
    let err = match serde_json::from_slice::<Value>(body) {
        Ok(payload) => {
            let code = payload.pointer("/err/code").and_then(Value::as_i64);
            HyperApiError::api(status, code, Some(payload), None)
        }
        Err(_) => {
            let text = String::from_utf8_lossy(body).trim().to_string();
            HyperApiError::api(status, None, None, Some(text).filter(|t| !t.is_empty()))
        }
    };

    tracing::debug!(status, code = err.error_code(), "Got API error");
    err
}
