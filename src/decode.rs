//! Payload decoders.
//!
//! Responses are decoded into a generic JSON tree according to their content
//! type. Unknown types never fail: their body is wrapped as
//! `{"resource": {"data": ...}}`.
//!
//! Text, diff and raw bodies are never altered. Valid UTF-8 becomes a JSON
//! string; anything else becomes an array of byte values. [`raw_bytes`]
//! recovers the original bytes from either form.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::error::Result;
use crate::mimetype::MimeType;

/// A decoding strategy for one `type/format` pair.
pub type DecodeFn = fn(&[u8]) -> Result<Value>;

/// Maps `main_type/format` keys to decoders.
#[derive(Clone)]
pub struct DecoderRegistry {
    decoders: HashMap<String, DecodeFn>,
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.decoders.keys().collect();
        keys.sort();
        f.debug_struct("DecoderRegistry").field("types", &keys).finish()
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("application/json", decode_json);
        registry.register("text/plain", decode_text);
        registry.register("text/x-patch", decode_diff);
        registry.register("text/x-diff", decode_diff);
        registry
    }
}

impl DecoderRegistry {
    /// A registry with no decoders; everything uses the fallback.
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Register (or replace) the decoder for a `main_type/format` key.
    pub fn register(&mut self, key: &str, decoder: DecodeFn) {
        self.decoders.insert(key.to_ascii_lowercase(), decoder);
    }

    /// Decode a payload according to its content type.
    pub fn decode(&self, payload: &[u8], mime_type: &str) -> Result<Value> {
        let key = MimeType::parse(mime_type).decoder_key().to_ascii_lowercase();

        match self.decoders.get(&key) {
            Some(decoder) => decoder(payload),
            None => Ok(decode_default(payload)),
        }
    }
}

/// Decode a payload with the default decoders.
pub fn decode_response(payload: &[u8], mime_type: &str) -> Result<Value> {
    DecoderRegistry::default().decode(payload, mime_type)
}

fn decode_json(payload: &[u8]) -> Result<Value> {
    Ok(serde_json::from_slice(payload)?)
}

/// The bytes behind a decoded text, diff or data value.
///
/// Returns `None` for values no decoder produces.
pub fn raw_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::String(text) => Some(text.clone().into_bytes()),
        Value::Array(bytes) => bytes
            .iter()
            .map(|byte| byte.as_u64().and_then(|b| u8::try_from(b).ok()))
            .collect(),
        _ => None,
    }
}

fn preserve_bytes(payload: &[u8]) -> Value {
    match std::str::from_utf8(payload) {
        Ok(text) => Value::String(text.to_string()),
        Err(_) => Value::Array(payload.iter().map(|&byte| Value::from(byte)).collect()),
    }
}

fn decode_text(payload: &[u8]) -> Result<Value> {
    Ok(json!({ "resource": { "text": preserve_bytes(payload) } }))
}

fn decode_diff(payload: &[u8]) -> Result<Value> {
    Ok(json!({ "resource": { "diff": preserve_bytes(payload) } }))
}

fn decode_default(payload: &[u8]) -> Value {
    json!({ "resource": { "data": preserve_bytes(payload) } })
}
