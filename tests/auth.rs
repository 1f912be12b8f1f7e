//! Authentication tests for the HTTP transport.
//!
//! Uses wiremock to play the server side of Basic, Digest, token and
//! one-time-password exchanges.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use hyperapi::{
    AuthCallback, CacheConfig, Credentials, HttpTransport, OtpCallback, TransportConfig,
};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{header, header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BASIC_ALICE: &str = "Basic YWxpY2U6c2VjcmV0"; // alice:secret

fn config(dir: &TempDir) -> TransportConfig {
    TransportConfig {
        cookie_file: Some(dir.path().join("cookies.txt")),
        cache: CacheConfig {
            disable_cache: true,
            ..CacheConfig::default()
        },
        ..TransportConfig::default()
    }
}

fn root_json() -> serde_json::Value {
    json!({
        "stat": "ok",
        "uri_templates": {},
        "product": {"package_version": "7.0.1"},
        "links": {"self": {"href": "/api/", "method": "GET"}},
    })
}

fn unauthorized() -> ResponseTemplate {
    ResponseTemplate::new(401)
        .insert_header("WWW-Authenticate", "Basic realm=\"Web API\"")
        .set_body_json(json!({
            "stat": "fail",
            "err": {"code": 103, "msg": "You are not logged in"},
        }))
}

fn counting_callback(credentials: Credentials, calls: Arc<AtomicUsize>) -> AuthCallback {
    Arc::new(move |_prompt| {
        calls.fetch_add(1, Ordering::SeqCst);
        Some(credentials.clone())
    })
}

// =============================================================================
// Basic Auth
// =============================================================================

#[tokio::test]
async fn test_retries_once_with_prompted_credentials() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/"))
        .and(header("authorization", BASIC_ALICE))
        .respond_with(ResponseTemplate::new(200).set_body_json(root_json()))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/"))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&mock_server)
        .await;

    let calls = Arc::new(AtomicUsize::new(0));
    let transport = HttpTransport::builder(mock_server.uri())
        .config(config(&dir))
        .auth_callback(counting_callback(
            Credentials::new("alice", "secret"),
            calls.clone(),
        ))
        .build()
        .unwrap();

    let root = transport.get_root().await.unwrap();

    assert_eq!(root.product_version(), Some("7.0.1"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rejected_credentials_are_retried_only_once() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/"))
        .respond_with(unauthorized())
        .expect(2)
        .mount(&mock_server)
        .await;

    let calls = Arc::new(AtomicUsize::new(0));
    let transport = HttpTransport::builder(mock_server.uri())
        .config(config(&dir))
        .auth_callback(counting_callback(
            Credentials::new("alice", "wrong"),
            calls.clone(),
        ))
        .build()
        .unwrap();

    let err = transport.get_root().await.unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(err.error_code(), Some(103));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_configured_credentials_are_sent_up_front() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/"))
        .and(header("authorization", BASIC_ALICE))
        .respond_with(ResponseTemplate::new(200).set_body_json(root_json()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let transport = HttpTransport::new(
        &mock_server.uri(),
        TransportConfig {
            username: Some("alice".to_string()),
            password: Some("secret".to_string()),
            ..config(&dir)
        },
    )
    .unwrap();

    transport.get_root().await.unwrap();
}

#[tokio::test]
async fn test_same_rejected_credentials_are_not_resent() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/"))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&mock_server)
        .await;

    let transport = HttpTransport::new(
        &mock_server.uri(),
        TransportConfig {
            username: Some("alice".to_string()),
            password: Some("secret".to_string()),
            ..config(&dir)
        },
    )
    .unwrap();

    let err = transport.get_root().await.unwrap_err();
    assert!(err.is_unauthorized());
}

// =============================================================================
// Token Auth
// =============================================================================

#[tokio::test]
async fn test_token_is_sent_on_every_request() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/"))
        .and(header("authorization", "token abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(root_json()))
        .expect(2)
        .mount(&mock_server)
        .await;

    let transport = HttpTransport::new(
        &mock_server.uri(),
        TransportConfig {
            api_token: Some("abc123".to_string()),
            ..config(&dir)
        },
    )
    .unwrap();

    transport.get_root().await.unwrap();
    transport.get_root().await.unwrap();
}

#[tokio::test]
async fn test_token_auth_never_falls_back_to_basic() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/"))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&mock_server)
        .await;

    let calls = Arc::new(AtomicUsize::new(0));
    let transport = HttpTransport::builder(mock_server.uri())
        .config(TransportConfig {
            api_token: Some("expired".to_string()),
            ..config(&dir)
        })
        .auth_callback(counting_callback(
            Credentials::new("alice", "secret"),
            calls.clone(),
        ))
        .build()
        .unwrap();

    let err = transport.get_root().await.unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_login_with_token_after_construction() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/"))
        .and(header("authorization", "token late"))
        .respond_with(ResponseTemplate::new(200).set_body_json(root_json()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let transport = HttpTransport::new(&mock_server.uri(), config(&dir)).unwrap();
    transport.login_with_token("late");

    transport.get_root().await.unwrap();
}

// =============================================================================
// One-Time Passwords
// =============================================================================

#[tokio::test]
async fn test_otp_challenge_invokes_callback() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/"))
        .and(header("authorization", BASIC_ALICE))
        .and(header("x-otp", "123456"))
        .respond_with(ResponseTemplate::new(200).set_body_json(root_json()))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/"))
        .respond_with(unauthorized().insert_header("X-OTP", "required; sms"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in_callback = seen.clone();
    let otp: OtpCallback = Arc::new(move |url, method| {
        seen_in_callback
            .lock()
            .unwrap()
            .push((url.to_string(), method.to_string()));
        Some("123456".to_string())
    });

    let transport = HttpTransport::builder(mock_server.uri())
        .config(config(&dir))
        .auth_callback(counting_callback(
            Credentials::new("alice", "secret"),
            Arc::new(AtomicUsize::new(0)),
        ))
        .otp_callback(otp)
        .build()
        .unwrap();

    transport.get_root().await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, format!("{}/api/", mock_server.uri()));
    assert_eq!(seen[0].1, "sms");
}

#[tokio::test]
async fn test_otp_attempts_are_bounded() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/"))
        .respond_with(unauthorized().insert_header("X-OTP", "required; generator"))
        .mount(&mock_server)
        .await;

    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_in_callback = attempts.clone();
    let otp: OtpCallback = Arc::new(move |_, _| {
        attempts_in_callback.fetch_add(1, Ordering::SeqCst);
        Some("000000".to_string())
    });

    let transport = HttpTransport::builder(mock_server.uri())
        .config(TransportConfig {
            username: Some("alice".to_string()),
            password: Some("secret".to_string()),
            ..config(&dir)
        })
        .otp_callback(otp)
        .build()
        .unwrap();

    let err = transport.get_root().await.unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(attempts.load(Ordering::SeqCst), 5);
}

// =============================================================================
// Digest Auth
// =============================================================================

#[tokio::test]
async fn test_sha256_digest_challenge() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/"))
        .and(header_regex(
            "authorization",
            r#"^Digest username="alice", realm="Web API", nonce="abc123", uri="/api/", algorithm=SHA-256, response="[0-9a-f]{64}""#,
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(root_json()))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/"))
        .respond_with(ResponseTemplate::new(401).insert_header(
            "WWW-Authenticate",
            "Digest realm=\"Web API\", nonce=\"abc123\", qop=\"auth\", algorithm=SHA-256",
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let transport = HttpTransport::builder(mock_server.uri())
        .config(config(&dir))
        .auth_callback(counting_callback(
            Credentials::new("alice", "secret"),
            Arc::new(AtomicUsize::new(0)),
        ))
        .build()
        .unwrap();

    transport.get_root().await.unwrap();
}

#[tokio::test]
async fn test_md5_digest_challenge_is_not_answered() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/"))
        .respond_with(ResponseTemplate::new(401).insert_header(
            "WWW-Authenticate",
            "Digest realm=\"Web API\", nonce=\"abc123\", qop=\"auth\", algorithm=MD5",
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let calls = Arc::new(AtomicUsize::new(0));
    let transport = HttpTransport::builder(mock_server.uri())
        .config(config(&dir))
        .auth_callback(counting_callback(
            Credentials::new("alice", "secret"),
            calls.clone(),
        ))
        .build()
        .unwrap();

    let err = transport.get_root().await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
