//! The reqwest-backed transport.

use std::fmt;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use reqwest::header::{
    HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, PROXY_AUTHORIZATION, WWW_AUTHENTICATE,
};
use reqwest::{Certificate, Client, Identity, Method, Proxy};
use url::Url;

use crate::config::TransportConfig;
use crate::error::{HyperApiError, Result};
use crate::factory::{ResourceFactory, ResourceKind};
use crate::request::{HttpRequest, QueryArgs};
use crate::resource::{Resource, RootResource};

use super::auth::{otp_method, AuthCallback, Authenticator, Challenge, Credentials, OtpCallback};
use super::cache::{ApiCache, CacheLookup};
use super::cookies::MozillaCookieJar;
use super::{build_response, RawResponse, Transport};

const USER_AGENT: &str = concat!("hyperapi/", env!("CARGO_PKG_VERSION"));

struct Inner {
    http: Client,
    server_url: Url,
    api_url: Url,
    factory: ResourceFactory,
    auth: Authenticator,
    cookies: Arc<MozillaCookieJar>,
    save_cookies: bool,
    cache: RwLock<Option<Arc<ApiCache>>>,
    otp_header: String,
    proxy_authorization: Option<String>,
}

/// Executes requests against a live server.
///
/// Owns the cookie jar, the authentication state and the optional response
/// cache for one server. Cloning is cheap; clones share all of it.
///
/// # Example
///
/// ```no_run
/// use hyperapi::{HttpTransport, HyperResource, TransportConfig};
///
/// # async fn example() -> hyperapi::Result<()> {
/// let transport = HttpTransport::builder("https://reviews.example.com")
///     .config(TransportConfig {
///         api_token: Some("secret".to_string()),
///         ..TransportConfig::default()
///     })
///     .build()?;
///
/// let root = transport.get_root().await?;
/// println!("{:?}", root.template_names().collect::<Vec<_>>());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct HttpTransport {
    inner: Arc<Inner>,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("server_url", &self.inner.server_url.as_str())
            .field("auth", &self.inner.auth)
            .field("cache", &self.inner.cache.read().is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`HttpTransport`].
pub struct HttpTransportBuilder {
    url: String,
    config: TransportConfig,
    factory: ResourceFactory,
    auth_callback: Option<AuthCallback>,
    otp_callback: Option<OtpCallback>,
}

impl fmt::Debug for HttpTransportBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransportBuilder")
            .field("url", &self.url)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HttpTransportBuilder {
    #[must_use]
    pub fn config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    /// The factory used to build resources, with its registered classes.
    #[must_use]
    pub fn factory(mut self, factory: ResourceFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Called with the realm and URL when the server asks for credentials.
    #[must_use]
    pub fn auth_callback(mut self, callback: AuthCallback) -> Self {
        self.auth_callback = Some(callback);
        self
    }

    /// Called with the URL and delivery method when the server asks for a
    /// one-time password.
    #[must_use]
    pub fn otp_callback(mut self, callback: OtpCallback) -> Self {
        self.otp_callback = Some(callback);
        self
    }

    /// Build the transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, a certificate cannot be read,
    /// or the HTTP client cannot be configured.
    pub fn build(self) -> Result<HttpTransport> {
        let Self {
            url,
            config,
            factory,
            auth_callback,
            otp_callback,
        } = self;

        let server_url = if url.ends_with('/') {
            Url::parse(&url)?
        } else {
            Url::parse(&format!("{url}/"))?
        };
        let api_url = server_url.join("api/")?;

        let cookies = Arc::new(match config.cookie_file.clone().or_else(MozillaCookieJar::default_path) {
            Some(path) => MozillaCookieJar::open(path),
            None => MozillaCookieJar::new(),
        });

        if let Some(session) = &config.session {
            cookies.set_session_cookie(&server_url, &config.session_cookie_name, session);
            if let Err(e) = cookies.save() {
                tracing::warn!(error = %e, "Could not save the session cookie");
            }
        }

        let mut http = Client::builder()
            .user_agent(config.user_agent.as_deref().unwrap_or(USER_AGENT))
            .brotli(true)
            .gzip(true)
            .deflate(true)
            .timeout(Duration::from_secs(config.timeout_secs))
            .cookie_provider(cookies.clone());

        let mut proxy_authorization = config.proxy_authorization.clone();
        if config.disable_proxy {
            http = http.no_proxy();
        } else if let Some(proxy_url) = &config.proxy_url {
            let mut proxy = Proxy::all(proxy_url.as_str())?;
            if let Some(value) = proxy_authorization.take() {
                let value = HeaderValue::from_str(&value).map_err(|_| {
                    HyperApiError::InvalidConfig {
                        key: "proxy_authorization".to_string(),
                        value: "<redacted>".to_string(),
                    }
                })?;
                proxy = proxy.custom_http_auth(value);
            }
            http = http.proxy(proxy);
        }

        if let Some(path) = &config.ca_certs {
            let pem = fs::read(path)?;
            for cert in Certificate::from_pem_bundle(&pem)? {
                http = http.add_root_certificate(cert);
            }
        }

        if let (Some(cert), Some(key)) = (&config.client_cert, &config.client_key) {
            let identity = Identity::from_pkcs8_pem(&fs::read(cert)?, &fs::read(key)?)?;
            http = http.identity(identity);
        }

        if config.disable_ssl_verification {
            tracing::warn!("SSL certificate verification is disabled");
            http = http.danger_accept_invalid_certs(true);
        }

        let cache = if config.cache.disable_cache {
            None
        } else if config.cache.in_memory_cache {
            Some(Arc::new(ApiCache::in_memory()))
        } else {
            Some(Arc::new(ApiCache::open(config.cache.cache_location.clone())))
        };

        let credentials = config
            .username
            .clone()
            .map(|username| Credentials::new(username, config.password.clone().unwrap_or_default()));

        Ok(HttpTransport {
            inner: Arc::new(Inner {
                http: http.build()?,
                server_url,
                api_url,
                factory,
                auth: Authenticator::new(
                    credentials,
                    config.api_token.clone(),
                    auth_callback,
                    otp_callback,
                ),
                cookies,
                save_cookies: config.save_cookies,
                cache: RwLock::new(cache),
                otp_header: config.otp_header,
                proxy_authorization,
            }),
        })
    }
}

impl HttpTransport {
    pub fn builder(url: impl Into<String>) -> HttpTransportBuilder {
        HttpTransportBuilder {
            url: url.into(),
            config: TransportConfig::default(),
            factory: ResourceFactory::default(),
            auth_callback: None,
            otp_callback: None,
        }
    }

    /// A transport for `url` with the given configuration.
    ///
    /// # Errors
    ///
    /// See [`HttpTransportBuilder::build`].
    pub fn new(url: &str, config: TransportConfig) -> Result<Self> {
        Self::builder(url).config(config).build()
    }

    /// The server URL, always with a trailing slash.
    pub fn server_url(&self) -> &Url {
        &self.inner.server_url
    }

    /// `<server>/api/`.
    pub fn api_url(&self) -> &Url {
        &self.inner.api_url
    }

    pub fn cookie_jar(&self) -> &Arc<MozillaCookieJar> {
        &self.inner.cookies
    }

    /// The response cache, unless disabled.
    pub fn cache(&self) -> Option<Arc<ApiCache>> {
        self.inner.cache.read().clone()
    }

    /// Send these credentials with the next request.
    pub fn login(&self, username: &str, password: &str) {
        self.inner.auth.login(Credentials::new(username, password));
    }

    /// Authenticate every request with an API token.
    pub fn login_with_token(&self, token: &str) {
        self.inner.auth.login_with_token(token);
    }

    /// Forget credentials and drop this server's cookies.
    pub fn logout(&self) {
        self.inner.auth.logout();
        self.inner.cookies.clear_host(&self.inner.server_url);
        self.save_cookies();
    }

    /// Fetch the API root.
    pub async fn get_root(&self) -> Result<RootResource> {
        let request = HttpRequest::get(self.inner.api_url.as_str(), &QueryArgs::new());
        self.fetch_resource(request, Some(ResourceKind::Root))
            .await?
            .into_root()
    }

    /// Fetch a path below the API root.
    pub async fn get_path(&self, path: &str, query: &QueryArgs) -> Result<Resource> {
        let path = path.trim_start_matches('/');
        let path = if path.is_empty() || path.ends_with('/') {
            path.to_string()
        } else {
            format!("{path}/")
        };
        let url = self.inner.api_url.join(&path)?;
        self.get_url(url.as_str(), query).await
    }

    /// Fetch an absolute URL.
    pub async fn get_url(&self, url: &str, query: &QueryArgs) -> Result<Resource> {
        let url = if url.ends_with('/') || url.contains('?') {
            url.to_string()
        } else {
            format!("{url}/")
        };
        self.fetch_resource(HttpRequest::get(&url, query), None).await
    }

    async fn fetch_resource(
        &self,
        request: HttpRequest,
        force_kind: Option<ResourceKind>,
    ) -> Result<Resource> {
        let url = request.url().to_string();
        self.perform(request, force_kind).await?.ok_or_else(|| {
            HyperApiError::ServerInterface(format!("Empty response from {url}"))
        })
    }

    #[tracing::instrument(skip(self, request), fields(method = %request.method(), url = request.url()))]
    async fn perform(
        &self,
        request: HttpRequest,
        force_kind: Option<ResourceKind>,
    ) -> Result<Option<Resource>> {
        let url = self.inner.server_url.join(request.url())?;
        let response = self.fetch(&request, &url).await;
        self.save_cookies();

        build_response(self, request.method(), url.as_str(), &response?, force_kind)
    }

    async fn fetch(&self, request: &HttpRequest, url: &Url) -> Result<RawResponse> {
        let cache = if *request.method() == Method::GET {
            self.cache()
        } else {
            None
        };

        let Some(cache) = cache else {
            return self.send_with_auth(request, url, &[]).await;
        };

        match cache.lookup(url.as_str(), request.headers(), Utc::now()) {
            CacheLookup::Fresh(entry) => {
                tracing::debug!("Cached response is up to date");
                Ok(RawResponse::from_cache(&entry))
            }
            CacheLookup::Stale(entry) => {
                let response = self
                    .send_with_auth(request, url, &entry.revalidation_headers())
                    .await?;

                if response.status == 304 {
                    tracing::debug!("Cached response expired and was not modified");
                    let entry = cache.refresh(&entry, Utc::now());
                    return Ok(RawResponse::from_cache(&entry));
                }

                if response.is_success() {
                    tracing::debug!("Cached response expired and was modified");
                    cache.store(url.as_str(), request.headers(), &response.headers, &response.body, Utc::now());
                }
                Ok(response)
            }
            CacheLookup::Miss => {
                let response = self.send_with_auth(request, url, &[]).await?;
                if response.is_success() {
                    cache.store(url.as_str(), request.headers(), &response.headers, &response.body, Utc::now());
                }
                Ok(response)
            }
        }
    }

    /// Send a request, answering at most one credential challenge per URL.
    async fn send_with_auth(
        &self,
        request: &HttpRequest,
        url: &Url,
        extra_headers: &[(&'static str, String)],
    ) -> Result<RawResponse> {
        let auth = &self.inner.auth;
        let mut authorization = auth.preset_header();
        let mut otp = None;

        let mut response = self
            .send_once(request, url, extra_headers, authorization.as_deref(), None)
            .await?;

        if response.status != 401 || auth.uses_token() || !auth.begin_retry(url.as_str()) {
            return Ok(response);
        }

        let uri = match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_string(),
        };

        loop {
            if let Some(method) = response.header(&self.inner.otp_header).and_then(otp_method) {
                match auth.otp_token(url.as_str(), method).await {
                    Some(token) => otp = Some(token),
                    None => break,
                }
            }

            let challenge = response
                .header(WWW_AUTHENTICATE.as_str())
                .map(Challenge::parse)
                .unwrap_or(Challenge::Basic { realm: None });

            let Some(header) = auth.retry_header(
                &challenge,
                url.as_str(),
                request.method().as_str(),
                &uri,
                authorization.as_deref(),
            )
            .await
            else {
                break;
            };

            tracing::debug!("Retrying request with credentials");
            authorization = Some(header);
            response = self
                .send_once(request, url, extra_headers, authorization.as_deref(), otp.as_deref())
                .await?;

            let otp_required = response
                .header(&self.inner.otp_header)
                .and_then(otp_method)
                .is_some();
            if response.status == 401 && otp_required {
                continue;
            }

            auth.finish_retry(response.status);
            break;
        }

        Ok(response)
    }

    async fn send_once(
        &self,
        request: &HttpRequest,
        url: &Url,
        extra_headers: &[(&'static str, String)],
        authorization: Option<&str>,
        otp: Option<&str>,
    ) -> Result<RawResponse> {
        tracing::debug!(method = %request.method(), %url, "Making HTTP request");

        let mut builder = self.inner.http.request(request.method().clone(), url.clone());

        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        for (name, value) in extra_headers {
            builder = builder.header(*name, value.as_str());
        }
        if let Some(authorization) = authorization {
            builder = builder.header(AUTHORIZATION, authorization);
        }
        if let Some(otp) = otp {
            builder = builder.header(self.inner.otp_header.as_str(), otp);
        }
        if let Some(proxy_authorization) = &self.inner.proxy_authorization {
            builder = builder.header(PROXY_AUTHORIZATION, proxy_authorization.as_str());
        }

        match request.encode_multipart_formdata() {
            Some(body) => {
                builder = builder
                    .header(CONTENT_TYPE, body.content_type)
                    .header(CONTENT_LENGTH, body.body.len())
                    .body(body.body);
            }
            None if *request.method() != Method::GET => {
                builder = builder.header(CONTENT_LENGTH, 0);
            }
            None => {}
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }

    fn save_cookies(&self) {
        if !self.inner.save_cookies {
            return;
        }
        if let Err(e) = self.inner.cookies.save() {
            tracing::warn!(error = %e, "Could not save cookies");
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn factory(&self) -> &ResourceFactory {
        &self.inner.factory
    }

    fn handle(&self) -> Arc<dyn Transport> {
        Arc::new(self.clone())
    }

    async fn execute_request(&self, request: HttpRequest) -> Result<Option<Resource>> {
        self.perform(request, None).await
    }

    fn disable_cache(&self) {
        if self.inner.cache.write().take().is_some() {
            tracing::debug!("API cache disabled");
        }
    }
}
