//! Hypermedia API client.
//!
//! The entry point for most users. Wraps an [`HttpTransport`] and hands out
//! resources, from which everything else is reached by following links.

use std::env;

use url::Url;

use crate::config::{TransportConfig, ENV_PREFIX};
use crate::error::{HyperApiError, Result};
use crate::factory::ResourceFactory;
use crate::request::QueryArgs;
use crate::resource::{Resource, RootResource};
use crate::transport::auth::{AuthCallback, OtpCallback};
use crate::transport::{HttpTransport, HttpTransportBuilder};

/// Client for one hypermedia API server.
///
/// This struct is cheaply cloneable; clones share the same transport,
/// cookie jar and cache.
///
/// # Example
///
/// ```no_run
/// use hyperapi::{ApiClient, HyperResource, QueryArgs, TransportConfig};
///
/// # async fn example() -> hyperapi::Result<()> {
/// // Create from environment variables
/// let client = ApiClient::from_env()?;
///
/// // Or configure manually
/// let client = ApiClient::new("https://reviews.example.com", TransportConfig::default())?;
///
/// let widgets = client
///     .get_path("widgets", &QueryArgs::new().arg("max_results", 25))
///     .await?;
/// println!("{}", widgets.url());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ApiClient {
    transport: HttpTransport,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("server_url", &self.transport.server_url().as_str())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ApiClient`].
#[derive(Debug)]
pub struct ApiClientBuilder {
    transport: HttpTransportBuilder,
}

impl ApiClientBuilder {
    #[must_use]
    pub fn config(mut self, config: TransportConfig) -> Self {
        self.transport = self.transport.config(config);
        self
    }

    /// Use a factory with registered resource classes.
    #[must_use]
    pub fn factory(mut self, factory: ResourceFactory) -> Self {
        self.transport = self.transport.factory(factory);
        self
    }

    /// Ask for credentials when the server rejects a request.
    #[must_use]
    pub fn auth_callback(mut self, callback: AuthCallback) -> Self {
        self.transport = self.transport.auth_callback(callback);
        self
    }

    /// Ask for a one-time password when the server requires one.
    #[must_use]
    pub fn otp_callback(mut self, callback: OtpCallback) -> Self {
        self.transport = self.transport.otp_callback(callback);
        self
    }

    /// # Errors
    ///
    /// Returns an error if the server URL is invalid or the HTTP client
    /// cannot be configured.
    pub fn build(self) -> Result<ApiClient> {
        Ok(ApiClient {
            transport: self.transport.build()?,
        })
    }
}

impl ApiClient {
    /// Create a client from environment variables.
    ///
    /// Uses `HYPERAPI_URL` for the server and the other `HYPERAPI_*`
    /// variables for [`TransportConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `HYPERAPI_URL` is not set or a variable has an
    /// invalid value.
    pub fn from_env() -> Result<Self> {
        let url = env::var(format!("{ENV_PREFIX}URL")).map_err(|_| {
            HyperApiError::ConfigMissing(format!("{ENV_PREFIX}URL environment variable not set"))
        })?;

        Self::new(&url, TransportConfig::from_env()?)
    }

    /// Create a client for the server at `url`.
    ///
    /// The API root is `<url>/api/`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn new(url: &str, config: TransportConfig) -> Result<Self> {
        Self::builder(url).config(config).build()
    }

    pub fn builder(url: impl Into<String>) -> ApiClientBuilder {
        ApiClientBuilder {
            transport: HttpTransport::builder(url),
        }
    }

    pub fn server_url(&self) -> &Url {
        self.transport.server_url()
    }

    /// Host name of the server.
    pub fn domain(&self) -> &str {
        self.transport.server_url().host_str().unwrap_or_default()
    }

    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    /// Fetch the API root.
    #[tracing::instrument(skip(self))]
    pub async fn get_root(&self) -> Result<RootResource> {
        self.transport.get_root().await
    }

    /// Fetch a path relative to the API root, e.g. `widgets/7`.
    #[tracing::instrument(skip(self, query))]
    pub async fn get_path(&self, path: &str, query: &QueryArgs) -> Result<Resource> {
        self.transport.get_path(path, query).await
    }

    /// Fetch an absolute URL on the server.
    #[tracing::instrument(skip(self, query))]
    pub async fn get_url(&self, url: &str, query: &QueryArgs) -> Result<Resource> {
        self.transport.get_url(url, query).await
    }

    pub fn login(&self, username: &str, password: &str) {
        self.transport.login(username, password);
    }

    pub fn login_with_token(&self, token: &str) {
        self.transport.login_with_token(token);
    }

    pub fn logout(&self) {
        self.transport.logout();
    }
}
