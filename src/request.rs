//! I/O-free description of HTTP exchanges.
//!
//! [`HttpRequest`] captures the method, URL, headers, form fields and file
//! attachments of a single exchange. Building one never touches the network;
//! a [`Transport`](crate::Transport) executes it.

use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;
use reqwest::Method;
use serde_json::{Map, Value};
use url::form_urlencoded;

/// A single query argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Str(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Encoded as `1` or `0`.
    Bool(bool),
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::UInt(u) => write!(f, "{u}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => f.write_str(if *b { "1" } else { "0" }),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i32> for QueryValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for QueryValue {
    fn from(value: u32) -> Self {
        Self::UInt(u64::from(value))
    }
}

impl From<u64> for QueryValue {
    fn from(value: u64) -> Self {
        Self::UInt(value)
    }
}

impl From<f64> for QueryValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Ordered query arguments for a request.
///
/// Keys are kept as given; they are normalized (`_` → `-`) when a request is
/// built from them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryArgs {
    args: Vec<(String, QueryValue)>,
}

impl QueryArgs {
    /// Create empty query arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set an argument, replacing any previous value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<QueryValue>) {
        let key = key.into();
        let value = value.into();

        match self.args.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.args.push((key, value)),
        }
    }

    /// Remove and return the value for a key.
    pub fn remove(&mut self, key: &str) -> Option<QueryValue> {
        let index = self.args.iter().position(|(k, _)| k == key)?;
        Some(self.args.remove(index).1)
    }

    /// The value for a key.
    pub fn get(&self, key: &str) -> Option<&QueryValue> {
        self.args.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Whether there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Iterate over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryValue)> {
        self.args.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<QueryValue>> FromIterator<(K, V)> for QueryArgs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut args = Self::new();
        for (key, value) in iter {
            args.insert(key, value);
        }
        args
    }
}

/// A file attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttachment {
    pub filename: String,
    pub content: Vec<u8>,
}

/// An encoded `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartBody {
    /// Value for the `Content-Type` header, including the boundary.
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Description of one HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    method: Method,
    url: String,
    headers: BTreeMap<String, String>,
    fields: BTreeMap<String, String>,
    files: BTreeMap<String, FileAttachment>,
}

impl HttpRequest {
    /// Build a request, merging `query` into any query string already on `url`.
    ///
    /// `url` may be absolute or relative to the server.
    pub fn new(url: &str, method: Method, query: &QueryArgs) -> Self {
        Self {
            method,
            url: merge_query(url, query),
            headers: BTreeMap::new(),
            fields: BTreeMap::new(),
            files: BTreeMap::new(),
        }
    }

    /// Shorthand for a GET request.
    pub fn get(url: &str, query: &QueryArgs) -> Self {
        Self::new(url, Method::GET, query)
    }

    /// Builder-style [`add_header`](Self::add_header).
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.add_header(name, value);
        self
    }

    pub fn add_header(&mut self, name: &str, value: &str) {
        self.headers.insert(name.to_string(), value.to_string());
    }

    pub fn add_field(&mut self, name: &str, value: impl Into<String>) {
        self.fields.insert(name.to_string(), value.into());
    }

    pub fn del_field(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name)
    }

    pub fn add_file(&mut self, name: &str, filename: &str, content: impl Into<Vec<u8>>) {
        self.files.insert(
            name.to_string(),
            FileAttachment {
                filename: filename.to_string(),
                content: content.into(),
            },
        );
    }

    pub fn del_file(&mut self, name: &str) -> Option<FileAttachment> {
        self.files.remove(name)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn files(&self) -> &BTreeMap<String, FileAttachment> {
        &self.files
    }

    /// Encode fields then files as `multipart/form-data`.
    ///
    /// Returns `None` when there is nothing to send.
    pub fn encode_multipart_formdata(&self) -> Option<MultipartBody> {
        self.encode_multipart_with_boundary(&make_mime_boundary())
    }

    /// [`encode_multipart_formdata`](Self::encode_multipart_formdata) with a
    /// fixed boundary.
    pub fn encode_multipart_with_boundary(&self, boundary: &str) -> Option<MultipartBody> {
        if self.fields.is_empty() && self.files.is_empty() {
            return None;
        }

        const NEWLINE: &[u8] = b"\r\n";
        let mut body = Vec::new();

        for (name, value) in &self.fields {
            body.extend_from_slice(format!("--{boundary}").as_bytes());
            body.extend_from_slice(NEWLINE);
            body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"", quote_param(name)).as_bytes(),
            );
            body.extend_from_slice(NEWLINE);
            body.extend_from_slice(NEWLINE);
            body.extend_from_slice(value.as_bytes());
            body.extend_from_slice(NEWLINE);
        }

        for (name, file) in &self.files {
            body.extend_from_slice(format!("--{boundary}").as_bytes());
            body.extend_from_slice(NEWLINE);
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"",
                    quote_param(name),
                    quote_param(&file.filename)
                )
                .as_bytes(),
            );
            body.extend_from_slice(NEWLINE);
            body.extend_from_slice(
                format!("Content-Type: {}", guess_content_type(&file.filename)).as_bytes(),
            );
            body.extend_from_slice(NEWLINE);
            body.extend_from_slice(NEWLINE);
            body.extend_from_slice(&file.content);
            body.extend_from_slice(NEWLINE);
        }

        body.extend_from_slice(format!("--{boundary}--").as_bytes());
        body.extend_from_slice(NEWLINE);
        body.extend_from_slice(NEWLINE);

        Some(MultipartBody {
            content_type: format!("multipart/form-data; boundary={boundary}"),
            body,
        })
    }
}

/// Percent-encode the characters that would end a quoted header parameter.
fn quote_param(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Field values for create/update requests.
///
/// Handles the extra data conventions: `extra_data__<key>` fields become
/// `extra_data.<key>`, and whole-document updates are sent as JSON Merge
/// Patch (`extra_data:json`) or JSON Patch (`extra_data:json-patch`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldData {
    values: BTreeMap<String, Value>,
}

const EXTRA_DATA_PREFIX: &str = "extra_data__";
const EXTRA_DATA_JSON: &str = "extra_data_json";
const EXTRA_DATA_JSON_PATCH: &str = "extra_data_json_patch";

impl FieldData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<Value>) {
        self.values.insert(name.to_string(), value.into());
    }

    /// Set a single `extra_data.<key>` value.
    #[must_use]
    pub fn extra_data(self, key: &str, value: impl Into<Value>) -> Self {
        self.set(&format!("{EXTRA_DATA_PREFIX}{key}"), value)
    }

    /// Merge a document into extra data (JSON Merge Patch, RFC 7396).
    #[must_use]
    pub fn extra_data_json(self, patch: Value) -> Self {
        self.set(EXTRA_DATA_JSON, patch)
    }

    /// Apply a list of JSON Patch (RFC 6902) operations to extra data.
    #[must_use]
    pub fn extra_data_json_patch(self, operations: Value) -> Self {
        self.set(EXTRA_DATA_JSON_PATCH, operations)
    }

    /// Add every value of `other`, replacing values with the same name.
    pub fn merge(&mut self, other: FieldData) {
        self.values.extend(other.values);
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// The form fields this data serializes to, in send order.
    pub fn to_form_fields(&self) -> Vec<(String, String)> {
        let mut fields = Vec::with_capacity(self.values.len());

        for (raw, wire) in [
            (EXTRA_DATA_JSON, "extra_data:json"),
            (EXTRA_DATA_JSON_PATCH, "extra_data:json-patch"),
        ] {
            if let Some(value) = self.values.get(raw) {
                fields.push((wire.to_string(), sorted_json(value).to_string()));
            }
        }

        for (name, value) in &self.values {
            if name == EXTRA_DATA_JSON || name == EXTRA_DATA_JSON_PATCH {
                continue;
            }

            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };

            let name = match name.strip_prefix(EXTRA_DATA_PREFIX) {
                Some(key) => format!("extra_data.{key}"),
                None => name.clone(),
            };

            fields.push((name, value));
        }

        fields
    }

    /// Add every field to a request.
    pub fn apply_to(&self, request: &mut HttpRequest) {
        for (name, value) in self.to_form_fields() {
            request.add_field(&name, value);
        }
    }
}

/// Rebuild a value with object keys inserted in sorted order.
fn sorted_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), sorted_json(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted_json).collect()),
        other => other.clone(),
    }
}

fn merge_query(url: &str, query: &QueryArgs) -> String {
    if query.is_empty() {
        return url.to_string();
    }

    let (url, fragment) = match url.split_once('#') {
        Some((url, fragment)) => (url, Some(fragment)),
        None => (url, None),
    };
    let (path, existing) = url.split_once('?').unwrap_or((url, ""));

    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(existing.as_bytes())
        .into_owned()
        .collect();

    for (key, value) in query.iter() {
        let key = key.replace('_', "-");
        let value = value.to_string();

        match pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => pairs.push((key, value)),
        }
    }

    let encoded = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(&pairs)
        .finish();

    match fragment {
        Some(fragment) => format!("{path}?{encoded}#{fragment}"),
        None => format!("{path}?{encoded}"),
    }
}

/// Remove every occurrence of a query parameter from a URL.
pub(crate) fn strip_query_param(url: &str, key: &str) -> String {
    let Some((path, rest)) = url.split_once('?') else {
        return url.to_string();
    };
    let (query, fragment) = match rest.split_once('#') {
        Some((query, fragment)) => (query, Some(fragment)),
        None => (rest, None),
    };

    let pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .filter(|(k, _)| k != key)
        .collect();

    let mut stripped = path.to_string();
    if !pairs.is_empty() {
        stripped.push('?');
        stripped.push_str(
            &form_urlencoded::Serializer::new(String::new())
                .extend_pairs(&pairs)
                .finish(),
        );
    }
    if let Some(fragment) = fragment {
        stripped.push('#');
        stripped.push_str(fragment);
    }
    stripped
}

fn make_mime_boundary() -> String {
    let token: u64 = rand::thread_rng().gen_range(0..i64::MAX as u64);
    format!("{}{token:019}==", "=".repeat(15))
}

/// Guess a content type from a filename extension.
fn guess_content_type(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "txt" | "log" => "text/plain",
        "diff" | "patch" => "text/x-patch",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "md" => "text/markdown",
        "xml" => "application/xml",
        "json" => "application/json",
        "js" => "application/javascript",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}
