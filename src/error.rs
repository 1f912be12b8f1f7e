//! Error types for hypermedia API operations.

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur while talking to a hypermedia API.
#[derive(Debug, Error)]
pub enum HyperApiError {
    /// The server answered with a structured (or unstructured) HTTP failure.
    #[error("{}", describe_api_error(.message, .http_status, .error_code, .payload))]
    ServerApi {
        /// HTTP status of the failed response.
        http_status: Option<u16>,
        /// Server-specific error code from the `err` object, if any.
        error_code: Option<i64>,
        /// Decoded error payload, when the body was JSON.
        payload: Option<Value>,
        /// Human readable message.
        message: String,
    },

    /// The server could not be reached or the exchange failed below HTTP.
    #[error("{0}")]
    ServerInterface(String),

    /// The resource model was used incorrectly.
    #[error(transparent)]
    ResourceModel(#[from] ResourceModelError),

    /// There is no next/previous page.
    #[error("No more pages are available in this sequence")]
    EndOfSequence,

    /// Configuration is missing or incomplete.
    #[error("Configuration required: {0}")]
    ConfigMissing(String),

    /// A configuration value could not be interpreted.
    #[error("Invalid value '{value}' for configuration key '{key}'")]
    InvalidConfig { key: String, value: String },

    /// The response cache could not be read or written.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Filesystem error (cookie jar, cache, certificates).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("Failed to parse response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    /// The browser-based login did not complete in time.
    #[error("The web login server timed out after {0} seconds")]
    LoginTimeout(u64),
}

impl HyperApiError {
    /// Build an API error from an HTTP status and optional decoded payload.
    ///
    /// The message falls back to `err.msg` in the payload, then to a default
    /// chosen by status.
    pub fn api(
        http_status: u16,
        error_code: Option<i64>,
        payload: Option<Value>,
        message: Option<String>,
    ) -> Self {
        let message = message
            .or_else(|| {
                payload
                    .as_ref()
                    .and_then(|p| p.pointer("/err/msg"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| default_message(http_status).to_string());

        Self::ServerApi {
            http_status: Some(http_status),
            error_code,
            payload,
            message,
        }
    }

    /// The error for a payload whose `stat` is not `ok`, if it is one.
    pub fn from_failed_stat(http_status: u16, payload: &Value) -> Option<Self> {
        match payload.get("stat").and_then(Value::as_str) {
            Some(stat) if stat != "ok" => {
                let code = payload.pointer("/err/code").and_then(Value::as_i64);
                Some(Self::api(http_status, code, Some(payload.clone()), None))
            }
            _ => None,
        }
    }

    /// The HTTP status, for API errors.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::ServerApi { http_status, .. } => *http_status,
            _ => None,
        }
    }

    /// The server error code, for API errors that carried one.
    pub fn error_code(&self) -> Option<i64> {
        match self {
            Self::ServerApi { error_code, .. } => *error_code,
            _ => None,
        }
    }

    /// Whether this is an HTTP 401 from the server.
    pub fn is_unauthorized(&self) -> bool {
        self.http_status() == Some(401)
    }

    /// Whether this is the pagination sentinel.
    pub fn is_end_of_sequence(&self) -> bool {
        matches!(self, Self::EndOfSequence)
    }
}

impl From<reqwest::Error> for HyperApiError {
    fn from(err: reqwest::Error) -> Self {
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);

        // reqwest hides the interesting part (DNS, refused, TLS) in the chain.
        while let Some(cause) = source {
            message = format!("{message}: {cause}");
            source = cause.source();
        }

        Self::ServerInterface(message)
    }
}

/// Local misuse of the resource model.
///
/// These always indicate a bug in the calling code and should never be
/// swallowed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceModelError {
    /// No field with this name is exposed.
    #[error("This {resource} does not have a field named \"{name}\"")]
    UnknownField { resource: String, name: String },

    /// No link with this relation is present.
    #[error("This {resource} does not have a \"{rel}\" link")]
    UnknownLink { resource: String, rel: String },

    /// A mutation was attempted on an immutable field wrapper.
    #[error(
        "Fields cannot be modified directly on this dictionary. To change \
         values, stage them on the parent resource and call update() or save()"
    )]
    ImmutableField,

    /// A mutation was attempted on an extra data wrapper.
    #[error(
        "extra_data fields cannot be modified directly. Call to_owned_map() for \
         a mutable copy, or update the parent resource with \
         FieldData::extra_data_json (JSON Merge Patch) or \
         FieldData::extra_data_json_patch (JSON Patch)"
    )]
    ImmutableExtraData,

    /// The resource was deleted on the server and is no longer usable.
    #[error("This resource has been deleted")]
    Deleted,

    /// The requested lifecycle transition is not allowed from this state.
    #[error("Cannot {action} a resource in the {state} state")]
    InvalidState { action: &'static str, state: String },

    /// No URI template with this name is advertised by the root resource.
    #[error("The root resource has no URI template named \"{0}\"")]
    UnknownTemplate(String),

    /// A URI template placeholder had no value.
    #[error("Template {template} was not provided a value for \"{key}\"")]
    MissingTemplateValue { template: String, key: String },

    /// The payload does not have the shape the resource requires.
    #[error("Malformed resource payload: {0}")]
    MalformedPayload(String),
}

/// Default message for a status when the payload carries none.
fn default_message(http_status: u16) -> &'static str {
    match http_status {
        400 => "Missing or invalid data was sent to the server.",
        401 => "Error authenticating to the server.",
        _ => "An error occurred when communicating with the server.",
    }
}

/// Well-known API error codes and their names.
fn api_error_name(code: i64) -> Option<&'static str> {
    Some(match code {
        0 => "No Error",
        1 => "Service Not Configured",
        100 => "Does Not Exist",
        101 => "Permission Denied",
        102 => "Invalid Attribute",
        103 => "Not Logged In",
        104 => "Login Failed",
        105 => "Invalid Form Data",
        106 => "Missing Attribute",
        111 => "Duplicate Item",
        112 => "OAuth Scope Missing",
        113 => "OAuth Token Access Denied",
        114 => "API Rate Limit Exceeded",
        _ => return None,
    })
}

fn describe_api_error(
    message: &str,
    http_status: &Option<u16>,
    error_code: &Option<i64>,
    payload: &Option<Value>,
) -> String {
    let details = match (error_code, http_status) {
        (Some(code), _) => Some(match api_error_name(*code) {
            Some(name) => format!("API Error {code}: {name}"),
            None => format!("API Error {code}"),
        }),
        (None, Some(status)) => Some(
            match StatusCode::from_u16(*status)
                .ok()
                .and_then(|s| s.canonical_reason())
            {
                Some(reason) => format!("HTTP {status}: {reason}"),
                None => format!("HTTP {status}"),
            },
        ),
        (None, None) => None,
    };

    let mut text = match details {
        Some(details) => format!("{message} ({details})"),
        None => message.to_string(),
    };

    if *http_status == Some(400) {
        if let Some(fields) = payload
            .as_ref()
            .and_then(|p| p.get("fields"))
            .and_then(Value::as_object)
        {
            text.push('\n');
            let mut fields: Vec<_> = fields.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            for (field, errors) in fields {
                let errors = match errors {
                    Value::Array(items) => items
                        .iter()
                        .map(|e| e.as_str().map_or_else(|| e.to_string(), str::to_string))
                        .collect::<Vec<_>>()
                        .join("; "),
                    other => other.to_string(),
                };
                text.push_str(&format!("\n    {field}: {errors}"));
            }
        }
    }

    text
}

/// Result type alias for hypermedia API operations.
pub type Result<T> = core::result::Result<T, HyperApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_api_error_message_from_payload() {
        let payload = json!({"stat": "fail", "err": {"code": 100, "msg": "Object does not exist"}});
        let err = HyperApiError::api(404, Some(100), Some(payload), None);

        assert_eq!(
            err.to_string(),
            "Object does not exist (API Error 100: Does Not Exist)"
        );
        assert_eq!(err.http_status(), Some(404));
        assert_eq!(err.error_code(), Some(100));
    }

    #[test]
    fn test_api_error_falls_back_to_http_status() {
        let err = HyperApiError::api(500, None, None, None);
        assert_eq!(
            err.to_string(),
            "An error occurred when communicating with the server. \
             (HTTP 500: Internal Server Error)"
        );
    }

    #[test]
    fn test_unauthorized_default_message() {
        let err = HyperApiError::api(401, None, None, None);
        assert!(err.is_unauthorized());
        assert!(err.to_string().starts_with("Error authenticating"));
    }

    #[test]
    fn test_bad_request_lists_fields() {
        let payload = json!({
            "stat": "fail",
            "err": {"code": 105, "msg": "One or more fields had errors"},
            "fields": {"summary": ["This field is required."], "color": ["Bad", "Worse"]},
        });
        let err = HyperApiError::api(400, Some(105), Some(payload), None);
        let text = err.to_string();

        assert!(text.starts_with("One or more fields had errors (API Error 105: Invalid Form Data)"));
        let color = text.find("color: Bad; Worse").unwrap();
        let summary = text.find("summary: This field is required.").unwrap();
        assert!(color < summary);
    }

    #[test]
    fn test_failed_stat() {
        let failed = json!({"stat": "fail", "err": {"code": 101, "msg": "Nope"}});
        let err = HyperApiError::from_failed_stat(403, &failed).unwrap();
        assert_eq!(err.error_code(), Some(101));
        assert_eq!(err.http_status(), Some(403));

        assert!(HyperApiError::from_failed_stat(200, &json!({"stat": "ok"})).is_none());
        assert!(HyperApiError::from_failed_stat(200, &json!({"count": 1})).is_none());
    }

    #[test]
    fn test_interface_error_has_no_status() {
        let err = HyperApiError::ServerInterface("connection refused".to_string());
        assert_eq!(err.http_status(), None);
        assert_eq!(err.to_string(), "connection refused");
    }
}
