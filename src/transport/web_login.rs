//! Browser-based login.
//!
//! A short-lived local HTTP server redirects the browser to the API server's
//! login page. After the user signs in, the login page POSTs an API token
//! back to `/login`, which is installed on the transport.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::capabilities::{version_at_least, Capabilities};
use crate::error::{HyperApiError, Result};

use super::HttpTransport;

/// Oldest server version that supports web login.
pub const WEB_LOGIN_MINIMUM_VERSION: &str = "5.0.5";

pub const DEFAULT_HOSTNAME: &str = "localhost";

const CLIENT_NAME: &str = "hyperapi";

/// Whether a server supports browser-based login.
pub fn web_login_supported(version: Option<&str>, capabilities: &Capabilities) -> bool {
    version_at_least(version, WEB_LOGIN_MINIMUM_VERSION)
        && capabilities.has_capability(&["authentication", "client_web_login"])
}

#[derive(Clone)]
struct LoginState {
    transport: HttpTransport,
    client_url: String,
    result: Arc<Mutex<Option<oneshot::Sender<bool>>>>,
}

impl LoginState {
    fn finish(&self, success: bool) {
        if let Some(sender) = self.result.lock().take() {
            let _ = sender.send(success);
        }
    }

    fn cors_headers(&self) -> HeaderMap {
        let origin = self.transport.server_url().as_str().trim_end_matches('/');
        let mut headers = HeaderMap::new();

        if let Ok(origin) = HeaderValue::from_str(origin) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        }
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        );
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
        headers
    }
}

/// Runs the local login server and waits for the result.
///
/// # Example
///
/// ```no_run
/// use hyperapi::{HttpTransport, WebLoginManager};
///
/// # async fn example(transport: HttpTransport) -> hyperapi::Result<()> {
/// let logged_in = WebLoginManager::new(transport)
///     .open_browser(true)
///     .run()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct WebLoginManager {
    transport: HttpTransport,
    hostname: String,
    open_browser: bool,
    timeout: Duration,
}

impl WebLoginManager {
    pub fn new(transport: HttpTransport) -> Self {
        Self {
            transport,
            hostname: DEFAULT_HOSTNAME.to_string(),
            open_browser: false,
            timeout: Duration::from_secs(180),
        }
    }

    #[must_use]
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Open the login page in a browser instead of only logging its URL.
    #[must_use]
    pub fn open_browser(mut self, open_browser: bool) -> Self {
        self.open_browser = open_browser;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The router served on `port`, and the receiver for the login result.
    pub fn router(&self, port: u16) -> (Router, oneshot::Receiver<bool>) {
        let (sender, receiver) = oneshot::channel();
        let state = LoginState {
            transport: self.transport.clone(),
            client_url: format!("http://{}:{port}/login", self.hostname),
            result: Arc::new(Mutex::new(Some(sender))),
        };

        let login = get(get_login).post(post_login).options(options_login);
        let router = Router::new()
            .route("/login", login.clone())
            .route("/login/", login)
            .with_state(state);

        (router, receiver)
    }

    /// Serve until a login result arrives or the timeout passes.
    ///
    /// Returns whether the login succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`HyperApiError::LoginTimeout`] when no result arrives in
    /// time, or an I/O error if the server cannot be started.
    pub async fn run(self) -> Result<bool> {
        let listener = TcpListener::bind((self.hostname.as_str(), 0)).await?;
        let port = listener.local_addr()?.port();
        let login_url = format!("http://{}:{port}/login", self.hostname);
        let (router, result) = self.router(port);

        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::warn!(error = %e, "Web login server failed");
            }
        });

        let domain = self
            .transport
            .server_url()
            .host_str()
            .unwrap_or_default()
            .to_string();

        if self.open_browser {
            tracing::info!("Opening {login_url} to log in to the {domain} server...");
            if let Err(e) = open::that(&login_url) {
                tracing::warn!(error = %e, "Could not open a browser, visit {login_url} instead");
            }
        } else {
            tracing::info!("Please log in to the {domain} server at {login_url}");
        }

        let outcome = tokio::time::timeout(self.timeout, result).await;
        server.abort();

        match outcome {
            Ok(Ok(success)) => Ok(success),
            Ok(Err(_)) => Ok(false),
            Err(_) => Err(HyperApiError::LoginTimeout(self.timeout.as_secs())),
        }
    }
}

async fn get_login(State(state): State<LoginState>) -> Response {
    let location = format!(
        "{}account/login/?client-name={CLIENT_NAME}&client-url={}",
        state.transport.server_url(),
        state.client_url
    );

    let mut headers = state.cors_headers();
    if let Ok(location) = HeaderValue::from_str(&location) {
        headers.insert(header::LOCATION, location);
    }

    (StatusCode::MOVED_PERMANENTLY, headers).into_response()
}

async fn post_login(State(state): State<LoginState>, body: Bytes) -> Response {
    let token = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(|data| data.get("api_token")?.as_str().map(str::to_string))
        .filter(|token| !token.is_empty());

    let headers = state.cors_headers();

    match token {
        Some(token) => {
            state.transport.login_with_token(&token);
            state.finish(true);
            tracing::info!("Successfully logged in");
            (StatusCode::OK, headers).into_response()
        }
        None => {
            tracing::error!("Did not receive valid data for authentication");
            state.finish(false);
            (StatusCode::BAD_REQUEST, headers).into_response()
        }
    }
}

async fn options_login(State(state): State<LoginState>) -> Response {
    (StatusCode::OK, state.cors_headers()).into_response()
}
