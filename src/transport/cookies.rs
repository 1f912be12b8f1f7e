//! Cookie jar persisted in the Netscape/Mozilla text format.
//!
//! The jar plugs into reqwest as its [`CookieStore`], so `Set-Cookie`
//! headers are captured and `Cookie` headers sent without any help from the
//! transport. Expired cookies are kept on load, so session cookies written
//! by other tools survive, but are never sent.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use cookie::Cookie;
use parking_lot::RwLock;
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use url::Url;

use crate::error::Result;

const HEADER: &str = "# Netscape HTTP Cookie File";
const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

/// Default file name, under the home directory.
pub const DEFAULT_COOKIE_FILE: &str = ".hyperapi-cookies";

/// One stored cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCookie {
    pub domain: String,
    pub include_subdomains: bool,
    pub path: String,
    pub secure: bool,
    /// Expiry as a unix timestamp. `None` for session cookies.
    pub expires: Option<i64>,
    pub name: String,
    pub value: String,
    pub http_only: bool,
}

impl StoredCookie {
    fn is_expired(&self, now: i64) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }

    fn matches(&self, url: &Url, now: i64) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };

        domain_matches(&self.domain, self.include_subdomains, host)
            && url.path().starts_with(&self.path)
            && (!self.secure || url.scheme() == "https")
            && !self.is_expired(now)
    }

    fn same_slot(&self, other: &StoredCookie) -> bool {
        self.name == other.name
            && self.path == other.path
            && self.domain.trim_start_matches('.') == other.domain.trim_start_matches('.')
    }

    fn to_line(&self) -> String {
        let domain = if self.http_only {
            format!("{HTTP_ONLY_PREFIX}{}", self.domain)
        } else {
            self.domain.clone()
        };

        format!(
            "{domain}\t{}\t{}\t{}\t{}\t{}\t{}",
            bool_field(self.include_subdomains),
            self.path,
            bool_field(self.secure),
            self.expires.unwrap_or(0),
            self.name,
            self.value
        )
    }

    fn from_line(line: &str) -> Option<Self> {
        let (line, http_only) = match line.strip_prefix(HTTP_ONLY_PREFIX) {
            Some(rest) => (rest, true),
            None if line.starts_with('#') => return None,
            None => (line, false),
        };

        let parts: Vec<&str> = line.split('\t').collect();
        let [domain, include_subdomains, path, secure, expires, name, value] = parts.as_slice() else {
            return None;
        };

        let expires: i64 = expires.parse().ok()?;
        Some(Self {
            domain: domain.to_string(),
            include_subdomains: include_subdomains.eq_ignore_ascii_case("TRUE"),
            path: path.to_string(),
            secure: secure.eq_ignore_ascii_case("TRUE"),
            expires: (expires != 0).then_some(expires),
            name: name.to_string(),
            value: value.to_string(),
            http_only,
        })
    }
}

/// A cookie jar backed by a Mozilla-format text file.
#[derive(Debug, Default)]
pub struct MozillaCookieJar {
    path: Option<PathBuf>,
    cookies: RwLock<Vec<StoredCookie>>,
}

impl MozillaCookieJar {
    /// A jar that is never written to disk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (creating if needed) the jar at `path`.
    ///
    /// A file that cannot be read or created leaves an empty jar and a
    /// warning.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        if !path.exists() {
            if let Err(e) = create_private_file(&path) {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "There was an error while creating a cookie file"
                );
            }
        }

        let cookies = match fs::read_to_string(&path) {
            Ok(text) => Self::parse(&text),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Could not load cookies");
                Vec::new()
            }
        };

        Self {
            path: Some(path),
            cookies: RwLock::new(cookies),
        }
    }

    /// `<home>/.hyperapi-cookies`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(DEFAULT_COOKIE_FILE))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Parse the Mozilla text format, skipping malformed lines.
    pub fn parse(text: &str) -> Vec<StoredCookie> {
        text.lines()
            .map(str::trim_end)
            .filter(|line| !line.trim().is_empty())
            .filter_map(StoredCookie::from_line)
            .collect()
    }

    /// Render the jar in the Mozilla text format.
    pub fn to_text(&self) -> String {
        let mut text = format!("{HEADER}\n# This file is generated by hyperapi. Do not edit.\n\n");
        for cookie in self.cookies.read().iter() {
            text.push_str(&cookie.to_line());
            text.push('\n');
        }
        text
    }

    pub fn len(&self) -> usize {
        self.cookies.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.read().is_empty()
    }

    /// All stored cookies, including expired ones.
    pub fn cookies(&self) -> Vec<StoredCookie> {
        self.cookies.read().clone()
    }

    /// Insert a cookie, replacing one with the same name, domain and path.
    pub fn set_cookie(&self, cookie: StoredCookie) {
        let mut cookies = self.cookies.write();
        cookies.retain(|existing| !existing.same_slot(&cookie));
        cookies.push(cookie);
    }

    /// Store a session cookie for the host of `server_url`.
    ///
    /// Hosts without a dot get a `.local` suffix as their effective domain.
    pub fn set_session_cookie(&self, server_url: &Url, name: &str, value: &str) {
        let host = server_url.host_str().unwrap_or_default();
        self.set_cookie(StoredCookie {
            domain: format!(".{}", effective_host(host)),
            include_subdomains: true,
            path: server_url.path().to_string(),
            secure: false,
            expires: None,
            name: name.to_string(),
            value: value.to_string(),
            http_only: true,
        });
    }

    /// Record a `Set-Cookie` header received from `url`.
    pub fn store_set_cookie(&self, header: &str, url: &Url) {
        let parsed = match Cookie::parse(header) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(header, error = %e, "Failed to parse Set-Cookie header");
                return;
            }
        };

        let host = url.host_str().unwrap_or_default();
        let (domain, include_subdomains) = match parsed.domain() {
            Some(domain) => (format!(".{}", domain.trim_start_matches('.')), true),
            None => (host.to_string(), false),
        };

        let now = Utc::now().timestamp();
        let expires = parsed
            .max_age()
            .map(|max_age| now + max_age.whole_seconds())
            .or_else(|| parsed.expires_datetime().map(|when| when.unix_timestamp()));

        let cookie = StoredCookie {
            domain,
            include_subdomains,
            path: parsed.path().unwrap_or("/").to_string(),
            secure: parsed.secure().unwrap_or(false),
            expires,
            name: parsed.name().to_string(),
            value: parsed.value().to_string(),
            http_only: parsed.http_only().unwrap_or(false),
        };

        if cookie.is_expired(now) {
            tracing::debug!(name = cookie.name, "Removing expired cookie");
            self.cookies.write().retain(|existing| !existing.same_slot(&cookie));
        } else {
            self.set_cookie(cookie);
        }
    }

    /// The `Cookie` header value for a request to `url`.
    pub fn header_for(&self, url: &Url) -> Option<String> {
        let now = Utc::now().timestamp();
        let cookies = self.cookies.read();
        let pairs: Vec<String> = cookies
            .iter()
            .filter(|cookie| cookie.matches(url, now))
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect();

        (!pairs.is_empty()).then(|| pairs.join("; "))
    }

    /// Remove every cookie that would be sent to `url`'s host.
    pub fn clear_host(&self, url: &Url) {
        let host = url.host_str().unwrap_or_default().to_string();
        self.cookies
            .write()
            .retain(|cookie| !domain_matches(&cookie.domain, cookie.include_subdomains, &host));
    }

    /// Write the jar to its file. In-memory jars do nothing.
    pub fn save(&self) -> Result<()> {
        if let Some(path) = &self.path {
            fs::write(path, self.to_text())?;
        }
        Ok(())
    }
}

impl CookieStore for MozillaCookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        for header in cookie_headers {
            match header.to_str() {
                Ok(header) => self.store_set_cookie(header, url),
                Err(_) => tracing::warn!("Ignoring non-UTF-8 Set-Cookie header"),
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let header = self.header_for(url)?;
        HeaderValue::from_str(&header).ok()
    }
}

/// Hosts without a dot are treated as `<host>.local`.
fn effective_host(host: &str) -> String {
    if host.contains('.') {
        host.to_string()
    } else {
        format!("{host}.local")
    }
}

fn domain_matches(domain: &str, include_subdomains: bool, host: &str) -> bool {
    let host = effective_host(host);
    let bare = effective_host(domain.trim_start_matches('.'));

    host.eq_ignore_ascii_case(&bare)
        || (include_subdomains
            && host.len() > bare.len()
            && host.to_ascii_lowercase().ends_with(&format!(".{}", bare.to_ascii_lowercase())))
}

fn bool_field(value: bool) -> &'static str {
    if value {
        "TRUE"
    } else {
        "FALSE"
    }
}

fn create_private_file(path: &Path) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(false);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options.open(path).map(|_| ())
}
