//! Resource class resolution.
//!
//! The [`ResourceFactory`] decides which [`Resource`] variant wraps a decoded
//! payload. Domain classes are looked up in an explicit [`ResourceRegistry`]
//! keyed by vendor content type, populated once when the client is built.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::decode::DecoderRegistry;
use crate::error::{ResourceModelError, Result};
use crate::mimetype::rem_mime_format;
use crate::resource::{
    CountResource, ItemResource, ListResource, Resource, ResourceCore, RootResource,
};
use crate::transport::Transport;

/// Payload keys that carry protocol metadata rather than domain data.
pub const SPECIAL_KEYS: [&str; 4] = ["links", "total_results", "stat", "count"];

/// The resource variant a payload is wrapped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Item,
    List,
    Count,
    Root,
}

/// Optional capabilities a registered class supports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceFeatures {
    /// Items can be downloaded as a patch.
    pub patch: bool,
    /// Lists accept file attachment uploads.
    pub attachments: bool,
    /// Lists accept diff uploads.
    pub diffs: bool,
}

/// A domain resource class registered for a vendor content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceClass {
    pub kind: ResourceKind,
    pub features: ResourceFeatures,
    /// Payload keys hidden from field access.
    pub excluded_fields: Vec<String>,
}

impl ResourceClass {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            features: ResourceFeatures::default(),
            excluded_fields: Vec::new(),
        }
    }

    pub fn item() -> Self {
        Self::new(ResourceKind::Item)
    }

    pub fn list() -> Self {
        Self::new(ResourceKind::List)
    }

    pub fn root() -> Self {
        Self::new(ResourceKind::Root)
    }

    #[must_use]
    pub fn with_features(mut self, features: ResourceFeatures) -> Self {
        self.features = features;
        self
    }

    #[must_use]
    pub fn exclude(mut self, field: &str) -> Self {
        self.excluded_fields.push(field.to_string());
        self
    }
}

/// Content type to resource class mapping.
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    classes: HashMap<String, ResourceClass>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class. The `+format` suffix of `mime_type` is ignored.
    pub fn register(&mut self, mime_type: &str, class: ResourceClass) {
        self.classes
            .insert(rem_mime_format(mime_type).to_string(), class);
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, mime_type: &str, class: ResourceClass) -> Self {
        self.register(mime_type, class);
        self
    }

    pub fn lookup(&self, mime_type: &str) -> Option<&ResourceClass> {
        self.classes.get(rem_mime_format(mime_type))
    }

    pub fn contains(&self, mime_type: &str) -> bool {
        self.lookup(mime_type).is_some()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Options for [`ResourceFactory::create`].
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Declared content type of the payload.
    pub mime_type: Option<String>,
    /// Content type of items inside a list payload.
    pub item_mime_type: Option<String>,
    /// Whether to look for a single domain key in the payload.
    pub guess_token: bool,
    /// Skip resolution and build this variant.
    pub force_kind: Option<ResourceKind>,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            mime_type: None,
            item_mime_type: None,
            guess_token: true,
            force_kind: None,
        }
    }
}

impl CreateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    #[must_use]
    pub fn item_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.item_mime_type = Some(mime_type.into());
        self
    }

    #[must_use]
    pub fn guess_token(mut self, guess: bool) -> Self {
        self.guess_token = guess;
        self
    }

    #[must_use]
    pub fn force_kind(mut self, kind: ResourceKind) -> Self {
        self.force_kind = Some(kind);
        self
    }
}

/// Builds resources from decoded payloads.
#[derive(Debug, Clone, Default)]
pub struct ResourceFactory {
    registry: ResourceRegistry,
    decoders: DecoderRegistry,
}

impl ResourceFactory {
    pub fn new(registry: ResourceRegistry) -> Self {
        Self {
            registry,
            decoders: DecoderRegistry::default(),
        }
    }

    #[must_use]
    pub fn with_decoders(mut self, decoders: DecoderRegistry) -> Self {
        self.decoders = decoders;
        self
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn decoders(&self) -> &DecoderRegistry {
        &self.decoders
    }

    /// The single non-metadata key of a payload, if there is exactly one.
    ///
    /// Payloads with two or more sibling data keys have no token.
    pub fn guess_token(payload: &Map<String, Value>) -> Option<String> {
        let mut keys = payload
            .keys()
            .filter(|key| !SPECIAL_KEYS.contains(&key.as_str()));

        match (keys.next(), keys.next()) {
            (Some(key), None) => Some(key.clone()),
            _ => None,
        }
    }

    /// Decide the variant, class and token for a payload.
    pub fn resolve(
        &self,
        payload: &Map<String, Value>,
        options: &CreateOptions,
    ) -> (ResourceKind, Option<ResourceClass>, Option<String>) {
        let token = if options.guess_token {
            Self::guess_token(payload)
        } else {
            None
        };

        let class = options
            .mime_type
            .as_deref()
            .and_then(|mime| self.registry.lookup(mime))
            .cloned();

        let kind = if let Some(kind) = options.force_kind {
            kind
        } else if payload.get("count").is_some_and(Value::is_number) {
            ResourceKind::Count
        } else if let Some(class) = &class {
            class.kind
        } else if token
            .as_ref()
            .is_some_and(|token| payload.get(token).is_some_and(Value::is_array))
        {
            ResourceKind::List
        } else {
            ResourceKind::Item
        };

        // Counts and roots keep their fields at the top level.
        let token = match kind {
            ResourceKind::Count | ResourceKind::Root => None,
            _ => token,
        };

        (kind, class, token)
    }

    /// Construct the resource for a decoded payload.
    pub fn create(
        &self,
        transport: Arc<dyn Transport>,
        payload: Value,
        url: &str,
        options: &CreateOptions,
    ) -> Result<Resource> {
        let Value::Object(map) = &payload else {
            return Err(ResourceModelError::MalformedPayload(format!(
                "expected an object at {url}, got {}",
                json_type_name(&payload)
            ))
            .into());
        };

        let (kind, class, token) = self.resolve(map, options);
        tracing::trace!(?kind, ?token, url, "Resolved resource class");

        if kind == ResourceKind::List && token.is_none() {
            return Err(ResourceModelError::MalformedPayload(format!(
                "list resource at {url} has no data key"
            ))
            .into());
        }

        let core = ResourceCore::new(
            transport,
            payload,
            url,
            token,
            options.mime_type.clone(),
            class,
        );

        Ok(match kind {
            ResourceKind::Item => Resource::Item(ItemResource::new(core)),
            ResourceKind::List => Resource::List(ListResource::new(
                core,
                options.item_mime_type.clone(),
            )?),
            ResourceKind::Count => Resource::Count(CountResource::new(core)?),
            ResourceKind::Root => Resource::Root(RootResource::new(core)),
        })
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
