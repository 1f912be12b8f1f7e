//! A transport that answers from canned responses.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Method;
use serde_json::Value;

use crate::error::{HyperApiError, Result};
use crate::factory::ResourceFactory;
use crate::request::HttpRequest;
use crate::resource::Resource;

use super::{build_response, RawResponse, Transport};

#[derive(Debug)]
struct ReplayState {
    factory: ResourceFactory,
    responses: Mutex<HashMap<(Method, String), RawResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
    cache_disabled: AtomicBool,
}

/// Serves responses registered up front and records every request.
///
/// Useful for exercising resource code without a server. Responses are keyed
/// by method and exact URL and can be served any number of times. A DELETE
/// with no registered response succeeds; any other unknown request is a 404.
///
/// # Example
///
/// ```
/// use hyperapi::{HyperResource, QueryArgs, ReplayTransport, ResourceFactory, Transport};
/// use reqwest::Method;
/// use serde_json::json;
///
/// # async fn example() -> hyperapi::Result<()> {
/// let transport = ReplayTransport::new(ResourceFactory::default());
/// transport.respond(
///     Method::GET,
///     "/api/widgets/7/",
///     json!({"widget": {"id": 7}, "stat": "ok"}),
/// );
///
/// let widget = transport
///     .execute_request(hyperapi::HttpRequest::get("/api/widgets/7/", &QueryArgs::new()))
///     .await?;
/// assert!(widget.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ReplayTransport {
    state: Arc<ReplayState>,
}

impl ReplayTransport {
    pub fn new(factory: ResourceFactory) -> Self {
        Self {
            state: Arc::new(ReplayState {
                factory,
                responses: Mutex::new(HashMap::new()),
                requests: Mutex::new(Vec::new()),
                cache_disabled: AtomicBool::new(false),
            }),
        }
    }

    /// Answer `method url` with a JSON payload and status 200.
    pub fn respond(&self, method: Method, url: &str, payload: Value) {
        self.respond_status(method, url, 200, payload);
    }

    /// Answer `method url` with a JSON payload and the given status.
    pub fn respond_status(&self, method: Method, url: &str, status: u16, payload: Value) {
        self.insert(
            method,
            url,
            RawResponse::new(status, Some("application/json"), payload.to_string().into_bytes()),
        );
    }

    /// Answer `method url` with raw bytes of the given content type.
    pub fn respond_raw(
        &self,
        method: Method,
        url: &str,
        content_type: &str,
        body: impl Into<Vec<u8>>,
    ) {
        self.insert(method, url, RawResponse::new(200, Some(content_type), body.into()));
    }

    /// Requests executed so far, oldest first.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state.requests.lock().clone()
    }

    /// Whether a resource asked for caching to be disabled.
    pub fn cache_disabled(&self) -> bool {
        self.state.cache_disabled.load(Ordering::SeqCst)
    }

    fn insert(&self, method: Method, url: &str, response: RawResponse) {
        self.state
            .responses
            .lock()
            .insert((method, url.to_string()), response);
    }
}

#[async_trait]
impl Transport for ReplayTransport {
    fn factory(&self) -> &ResourceFactory {
        &self.state.factory
    }

    fn handle(&self) -> Arc<dyn Transport> {
        Arc::new(self.clone())
    }

    async fn execute_request(&self, request: HttpRequest) -> Result<Option<Resource>> {
        let method = request.method().clone();
        let url = request.url().to_string();
        tracing::debug!(%method, url, "Replaying request");

        self.state.requests.lock().push(request);

        let response = self
            .state
            .responses
            .lock()
            .get(&(method.clone(), url.clone()))
            .cloned();

        match response {
            Some(response) => build_response(self, &method, &url, &response, None),
            None if method == Method::DELETE => Ok(None),
            None => Err(HyperApiError::api(
                404,
                None,
                None,
                Some(format!("No response registered for {method} {url}")),
            )),
        }
    }

    fn disable_cache(&self) {
        self.state.cache_disabled.store(true, Ordering::SeqCst);
    }
}
