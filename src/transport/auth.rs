//! Authentication strategy.
//!
//! Token auth sends `Authorization: token <token>` on every request and
//! never falls back to Basic. Otherwise the first request after
//! construction or [`login`](Authenticator::login) carries preset Basic
//! credentials, and a 401 triggers at most one credential retry per URL.
//! Servers that challenge with `Digest algorithm=SHA-256` get an RFC 7616
//! digest response instead of Basic. One-time passwords requested through
//! the OTP header are obtained from a callback and retried a bounded number
//! of times.
//!
//! Callbacks may block on user input; they run on tokio's blocking pool.

use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rand::Rng;
use regex::Regex;
use sha2::{Digest, Sha256};

/// Realm reported to the credential callback for Basic challenges.
pub const DEFAULT_REALM: &str = "Web API";

/// OTP prompts allowed per URL.
pub const MAX_OTP_TOKEN_ATTEMPTS: u32 = 5;

static CHALLENGE_PARAM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z0-9_-]+)\s*=\s*(?:"([^"]*)"|([^,\s]*))"#).expect("Invalid regex")
});

/// A username and password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// The `Authorization` value for Basic auth.
    pub fn basic_header(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("Basic {}", STANDARD.encode(raw))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// What the credential callback is told about a challenge.
#[derive(Debug, Clone, Copy)]
pub struct AuthPrompt<'a> {
    pub realm: &'a str,
    pub url: &'a str,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
}

/// Asked for credentials when the server rejects a request.
pub type AuthCallback = Arc<dyn Fn(&AuthPrompt<'_>) -> Option<Credentials> + Send + Sync>;

/// Asked for a one-time password, given the URL and the delivery method.
pub type OtpCallback = Arc<dyn Fn(&str, &str) -> Option<String> + Send + Sync>;

/// A parsed `WWW-Authenticate` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    Basic { realm: Option<String> },
    Digest(DigestChallenge),
    Other(String),
}

impl Challenge {
    pub fn parse(header: &str) -> Self {
        let header = header.trim();
        let (scheme, rest) = header.split_once(' ').unwrap_or((header, ""));

        if scheme.eq_ignore_ascii_case("basic") {
            Self::Basic {
                realm: challenge_param(rest, "realm"),
            }
        } else if scheme.eq_ignore_ascii_case("digest") {
            match DigestChallenge::from_params(rest) {
                Some(digest) => Self::Digest(digest),
                None => Self::Other(header.to_string()),
            }
        } else {
            Self::Other(header.to_string())
        }
    }

    pub fn realm(&self) -> Option<&str> {
        match self {
            Self::Basic { realm } => realm.as_deref(),
            Self::Digest(digest) => Some(&digest.realm),
            Self::Other(_) => None,
        }
    }
}

/// The parameters of a Digest challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    pub algorithm: String,
    pub qop: Option<String>,
}

impl DigestChallenge {
    fn from_params(params: &str) -> Option<Self> {
        Some(Self {
            realm: challenge_param(params, "realm").unwrap_or_default(),
            nonce: challenge_param(params, "nonce")?,
            opaque: challenge_param(params, "opaque"),
            algorithm: challenge_param(params, "algorithm").unwrap_or_else(|| "MD5".to_string()),
            qop: challenge_param(params, "qop"),
        })
    }

    /// Only SHA-256 digests are supported.
    pub fn is_supported(&self) -> bool {
        self.algorithm.eq_ignore_ascii_case("SHA-256")
    }

    /// The `Authorization` value answering this challenge.
    pub fn authorization(
        &self,
        credentials: &Credentials,
        method: &str,
        uri: &str,
        cnonce: &str,
        nonce_count: u32,
    ) -> String {
        let ha1 = sha256_hex(&format!(
            "{}:{}:{}",
            credentials.username, self.realm, credentials.password
        ));
        let ha2 = sha256_hex(&format!("{method}:{uri}"));
        let nc = format!("{nonce_count:08x}");

        let use_qop = self
            .qop
            .as_deref()
            .is_some_and(|qop| qop.split(',').any(|q| q.trim() == "auth"));

        let response = if use_qop {
            sha256_hex(&format!("{ha1}:{}:{nc}:{cnonce}:auth:{ha2}", self.nonce))
        } else {
            sha256_hex(&format!("{ha1}:{}:{ha2}", self.nonce))
        };

        let mut header = format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{uri}\", algorithm=SHA-256, response=\"{response}\"",
            credentials.username, self.realm, self.nonce
        );
        if use_qop {
            header.push_str(&format!(", qop=auth, nc={nc}, cnonce=\"{cnonce}\""));
        }
        if let Some(opaque) = &self.opaque {
            header.push_str(&format!(", opaque=\"{opaque}\""));
        }
        header
    }
}

/// Parse an OTP header value of the form `required; <method>`.
pub fn otp_method(header: &str) -> Option<&str> {
    let rest = header.trim().strip_prefix("required")?;
    Some(rest.trim_start().trim_start_matches(';').trim())
}

#[derive(Default)]
struct AuthState {
    credentials: Option<Credentials>,
    api_token: Option<String>,
    preset_used: bool,
    retried: bool,
    last_url: String,
    needs_otp: bool,
    otp_attempts: u32,
    nonce_count: u32,
}

/// Credential state shared by every request of a transport.
pub struct Authenticator {
    state: Mutex<AuthState>,
    auth_callback: Option<AuthCallback>,
    otp_callback: Option<OtpCallback>,
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Authenticator")
            .field("credentials", &state.credentials)
            .field("token", &state.api_token.as_ref().map(|_| "<redacted>"))
            .field("auth_callback", &self.auth_callback.is_some())
            .field("otp_callback", &self.otp_callback.is_some())
            .finish()
    }
}

impl Authenticator {
    pub fn new(
        credentials: Option<Credentials>,
        api_token: Option<String>,
        auth_callback: Option<AuthCallback>,
        otp_callback: Option<OtpCallback>,
    ) -> Self {
        Self {
            state: Mutex::new(AuthState {
                credentials,
                api_token,
                ..AuthState::default()
            }),
            auth_callback,
            otp_callback,
        }
    }

    /// Replace the credentials and send them with the next request.
    pub fn login(&self, credentials: Credentials) {
        let mut state = self.state.lock();
        state.credentials = Some(credentials);
        state.preset_used = false;
    }

    /// Switch to token auth.
    pub fn login_with_token(&self, token: impl Into<String>) {
        self.state.lock().api_token = Some(token.into());
    }

    /// Forget every credential.
    pub fn logout(&self) {
        let mut state = self.state.lock();
        state.credentials = None;
        state.api_token = None;
        state.preset_used = false;
        state.retried = false;
    }

    pub fn uses_token(&self) -> bool {
        self.state.lock().api_token.is_some()
    }

    pub fn username(&self) -> Option<String> {
        self.state
            .lock()
            .credentials
            .as_ref()
            .map(|credentials| credentials.username.clone())
    }

    /// The `Authorization` header to send up front, if any.
    pub fn preset_header(&self) -> Option<String> {
        let mut state = self.state.lock();

        if let Some(token) = &state.api_token {
            return Some(format!("token {token}"));
        }

        if state.preset_used {
            return None;
        }

        let header = state.credentials.as_ref().map(Credentials::basic_header)?;
        state.preset_used = true;
        Some(header)
    }

    /// Claim the single credential retry for `url`.
    ///
    /// A different URL than the last retried one resets the budget.
    pub fn begin_retry(&self, url: &str) -> bool {
        let mut state = self.state.lock();

        if state.last_url != url {
            state.retried = false;
            state.needs_otp = false;
            state.otp_attempts = 0;
            state.last_url = url.to_string();
        }

        if state.retried {
            tracing::debug!(url, "Already retried credentials for this URL");
            return false;
        }

        state.retried = true;
        true
    }

    /// Record the status of a retried request. Success frees the retry.
    pub fn finish_retry(&self, status: u16) {
        if status != 401 {
            let mut state = self.state.lock();
            state.retried = false;
            state.needs_otp = false;
            state.otp_attempts = 0;
        }
    }

    /// Compute the `Authorization` header for a retry.
    ///
    /// Returns `None` when there is nothing new to try: no credentials, an
    /// unsupported challenge, or the same header that was just rejected.
    pub async fn retry_header(
        &self,
        challenge: &Challenge,
        url: &str,
        method: &str,
        uri: &str,
        sent: Option<&str>,
    ) -> Option<String> {
        if let Challenge::Digest(digest) = challenge {
            if !digest.is_supported() {
                tracing::debug!(algorithm = digest.algorithm, "Unsupported digest algorithm");
                return None;
            }
        }

        let realm = challenge.realm().unwrap_or(DEFAULT_REALM);
        let credentials = self.find_credentials(realm, url).await?;

        let header = match challenge {
            Challenge::Digest(digest) => {
                let cnonce = make_cnonce();
                let nonce_count = {
                    let mut state = self.state.lock();
                    state.nonce_count += 1;
                    state.nonce_count
                };
                digest.authorization(&credentials, method, uri, &cnonce, nonce_count)
            }
            _ => credentials.basic_header(),
        };

        let state = self.state.lock();
        if sent == Some(header.as_str())
            && (!state.needs_otp || state.otp_attempts > MAX_OTP_TOKEN_ATTEMPTS)
        {
            tracing::debug!(url, "Credentials were already rejected");
            return None;
        }

        Some(header)
    }

    /// Ask for a one-time password after a `required` OTP header.
    pub async fn otp_token(&self, url: &str, method: &str) -> Option<String> {
        {
            let mut state = self.state.lock();
            state.needs_otp = true;
            if state.otp_attempts >= MAX_OTP_TOKEN_ATTEMPTS {
                tracing::debug!(url, "Giving up after {MAX_OTP_TOKEN_ATTEMPTS} OTP attempts");
                return None;
            }
            state.otp_attempts += 1;
        }

        let callback = self.otp_callback.clone()?;
        let (url, method) = (url.to_string(), method.to_string());
        let token = run_callback(move || callback(&url, &method)).await?;
        token.filter(|token| !token.is_empty())
    }

    async fn find_credentials(&self, realm: &str, url: &str) -> Option<Credentials> {
        let current = self.state.lock().credentials.clone();

        let credentials = match self.auth_callback.clone() {
            Some(callback) => {
                let (realm, url, known) = (realm.to_string(), url.to_string(), current.clone());
                let answered = run_callback(move || {
                    callback(&AuthPrompt {
                        realm: &realm,
                        url: &url,
                        username: known.as_ref().map(|c| c.username.as_str()),
                        password: known.as_ref().map(|c| c.password.as_str()),
                    })
                })
                .await
                .flatten()
                .or(current);
                self.state.lock().credentials = answered.clone();
                answered
            }
            None => current,
        };

        credentials.filter(|c| !c.password.is_empty() || !c.username.is_empty())
    }
}

async fn run_callback<T, F>(callback: F) -> Option<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(callback).await {
        Ok(answer) => Some(answer),
        Err(e) => {
            tracing::warn!(error = %e, "Authentication callback failed");
            None
        }
    }
}

fn challenge_param(params: &str, name: &str) -> Option<String> {
    CHALLENGE_PARAM_RE
        .captures_iter(params)
        .find(|caps| caps[1].eq_ignore_ascii_case(name))
        .and_then(|caps| caps.get(2).or_else(|| caps.get(3)))
        .map(|value| value.as_str().to_string())
}

fn sha256_hex(input: &str) -> String {
    Sha256::digest(input.as_bytes())
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

fn make_cnonce() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}
