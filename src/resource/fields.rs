//! Read-only wrappers for nested payload values.
//!
//! Wrapping is lazy: nothing is converted until a field is read, and
//! nested containers are wrapped by the same rules when they are reached.

use std::fmt;

use serde_json::{Map, Value};

use crate::error::{HyperApiError, ResourceModelError, Result};
use crate::factory::CreateOptions;
use crate::request::{HttpRequest, QueryArgs};

use super::{Resource, ResourceCore};

/// The reserved field holding free-form client metadata.
pub const EXTRA_DATA_FIELD: &str = "extra_data";

/// Keys a map may have and still be a link.
const LINK_KEYS: [&str; 4] = ["href", "method", "title", "mimetype"];

/// A wrapped field value.
#[derive(Debug, Clone)]
pub enum Field<'a> {
    /// Strings, numbers, booleans and null.
    Scalar(&'a Value),
    Dict(DictField<'a>),
    List(ListField<'a>),
    Link(LinkField<'a>),
    ExtraData(ExtraDataField<'a>),
    /// A nested payload promoted to a full resource.
    Resource(Box<Resource>),
}

impl<'a> Field<'a> {
    pub fn as_value(&self) -> Option<&'a Value> {
        match self {
            Self::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&'a str> {
        self.as_value().and_then(Value::as_str)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_value().and_then(Value::as_i64)
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_value().and_then(Value::as_u64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_value().and_then(Value::as_f64)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_value().and_then(Value::as_bool)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Scalar(Value::Null))
    }

    pub fn as_dict(&self) -> Option<&DictField<'a>> {
        match self {
            Self::Dict(dict) => Some(dict),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListField<'a>> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_link(&self) -> Option<&LinkField<'a>> {
        match self {
            Self::Link(link) => Some(link),
            _ => None,
        }
    }

    pub fn as_extra_data(&self) -> Option<&ExtraDataField<'a>> {
        match self {
            Self::ExtraData(extra) => Some(extra),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<&Resource> {
        match self {
            Self::Resource(resource) => Some(resource),
            _ => None,
        }
    }

    pub fn into_resource(self) -> Option<Resource> {
        match self {
            Self::Resource(resource) => Some(*resource),
            _ => None,
        }
    }
}

/// How a value should be wrapped.
#[derive(Debug, Clone, Copy, Default)]
struct WrapHints<'a> {
    name: Option<&'a str>,
    mime_type: Option<&'a str>,
    url: Option<&'a str>,
    item_mime_type: Option<&'a str>,
    force_resource: bool,
    force_items: bool,
}

/// Wrap a top-level field, applying any expansion metadata.
pub(crate) fn wrap_named<'a>(
    core: &'a ResourceCore,
    name: &'a str,
    value: &'a Value,
) -> Result<Field<'a>> {
    let mut hints = WrapHints {
        name: Some(name),
        ..WrapHints::default()
    };

    if let Some(info) = core.expand_info(name) {
        match value {
            Value::Object(_) => {
                hints.mime_type = info.item_mimetype.as_deref();
                hints.force_resource = true;
            }
            Value::Array(_) => {
                hints.item_mime_type = info.item_mimetype.as_deref();
                hints.force_items = true;
            }
            _ => {}
        }
    }

    wrap(core, value, hints)
}

fn wrap<'a>(core: &'a ResourceCore, value: &'a Value, hints: WrapHints<'a>) -> Result<Field<'a>> {
    match value {
        Value::Object(map) => {
            let registered = hints
                .mime_type
                .is_some_and(|mime| core.transport().factory().registry().contains(mime));

            if hints.force_resource || registered {
                nested_resource(core, value, hints.mime_type, hints.url)
                    .map(|resource| Field::Resource(Box::new(resource)))
            } else if hints.name == Some(EXTRA_DATA_FIELD) {
                Ok(Field::ExtraData(ExtraDataField::new(map)))
            } else if is_link(map) {
                Ok(Field::Link(LinkField { core, link: map }))
            } else {
                Ok(Field::Dict(DictField::new(core, map)))
            }
        }
        Value::Array(items) => Ok(Field::List(ListField {
            core,
            items,
            item_mime_type: hints.item_mime_type,
            force_items: hints.force_items,
        })),
        scalar => Ok(Field::Scalar(scalar)),
    }
}

fn is_link(map: &Map<String, Value>) -> bool {
    map.contains_key("href") && map.keys().all(|key| LINK_KEYS.contains(&key.as_str()))
}

fn nested_resource(
    core: &ResourceCore,
    payload: &Value,
    mime_type: Option<&str>,
    url: Option<&str>,
) -> Result<Resource> {
    let url = url
        .or_else(|| payload.pointer("/links/self/href").and_then(Value::as_str))
        .unwrap_or_default();

    let mut options = CreateOptions::new().guess_token(false);
    options.mime_type = mime_type.map(str::to_string);

    let transport = core.transport();
    transport
        .factory()
        .create(transport.clone(), payload.clone(), url, &options)
}

fn immutable() -> HyperApiError {
    ResourceModelError::ImmutableField.into()
}

fn immutable_extra_data() -> HyperApiError {
    ResourceModelError::ImmutableExtraData.into()
}

/// A nested map inside a resource.
///
/// Comparison looks at the wrapped values only, so two wrappers built from
/// the same payload are equal.
#[derive(Clone, Copy)]
pub struct DictField<'a> {
    core: &'a ResourceCore,
    fields: &'a Map<String, Value>,
}

impl<'a> DictField<'a> {
    pub(crate) fn new(core: &'a ResourceCore, fields: &'a Map<String, Value>) -> Self {
        Self { core, fields }
    }

    pub fn get(&self, name: &str) -> Result<Field<'a>> {
        let (name, value) = self
            .fields
            .get_key_value(name)
            .ok_or_else(|| self.core.unknown_field(name))?;

        wrap(
            self.core,
            value,
            WrapHints {
                name: Some(name.as_str()),
                ..WrapHints::default()
            },
        )
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &'a str> {
        self.fields.keys().map(String::as_str)
    }

    /// Iterate over `(name, wrapped value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, Result<Field<'a>>)> + '_ {
        self.fields.keys().map(|name| (name.as_str(), self.get(name)))
    }

    /// The unwrapped map.
    pub fn as_map(&self) -> &'a Map<String, Value> {
        self.fields
    }

    pub fn set(&mut self, _name: &str, _value: Value) -> Result<()> {
        Err(immutable())
    }

    pub fn remove(&mut self, _name: &str) -> Result<Value> {
        Err(immutable())
    }

    pub fn pop(&mut self, _name: &str) -> Result<Value> {
        Err(immutable())
    }

    pub fn clear(&mut self) -> Result<()> {
        Err(immutable())
    }
}

impl PartialEq for DictField<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl fmt::Debug for DictField<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DictField")
            .field("fields", self.fields)
            .finish()
    }
}

/// The `extra_data` map.
///
/// Nested maps stay `ExtraDataField`s and everything else is returned
/// unwrapped, so client metadata is never read as links or resources.
#[derive(Clone, Copy, PartialEq)]
pub struct ExtraDataField<'a> {
    fields: &'a Map<String, Value>,
}

impl<'a> ExtraDataField<'a> {
    fn new(fields: &'a Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<Field<'a>> {
        self.fields.get(name).map(|value| match value {
            Value::Object(map) => Field::ExtraData(ExtraDataField::new(map)),
            other => Field::Scalar(other),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &'a str> {
        self.fields.keys().map(String::as_str)
    }

    /// A deep, mutable copy of the contents.
    pub fn to_owned_map(&self) -> Map<String, Value> {
        self.fields.clone()
    }

    pub fn set(&mut self, _name: &str, _value: Value) -> Result<()> {
        Err(immutable_extra_data())
    }

    pub fn remove(&mut self, _name: &str) -> Result<Value> {
        Err(immutable_extra_data())
    }

    pub fn pop(&mut self, _name: &str) -> Result<Value> {
        Err(immutable_extra_data())
    }

    pub fn clear(&mut self) -> Result<()> {
        Err(immutable_extra_data())
    }
}

impl fmt::Debug for ExtraDataField<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtraDataField")
            .field("fields", self.fields)
            .finish()
    }
}

/// A nested array inside a resource.
#[derive(Clone, Copy)]
pub struct ListField<'a> {
    core: &'a ResourceCore,
    items: &'a [Value],
    item_mime_type: Option<&'a str>,
    force_items: bool,
}

impl<'a> ListField<'a> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The wrapped item at `index`, or `None` when out of range.
    pub fn get(&self, index: usize) -> Option<Result<Field<'a>>> {
        self.items.get(index).map(|item| self.wrap_item(item))
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<Field<'a>>> + '_ {
        self.items.iter().map(|item| self.wrap_item(item))
    }

    /// The unwrapped items.
    pub fn as_slice(&self) -> &'a [Value] {
        self.items
    }

    pub fn item_mime_type(&self) -> Option<&'a str> {
        self.item_mime_type
    }

    fn wrap_item(&self, item: &'a Value) -> Result<Field<'a>> {
        wrap(
            self.core,
            item,
            WrapHints {
                mime_type: self.item_mime_type,
                force_resource: self.force_items,
                ..WrapHints::default()
            },
        )
    }
}

impl PartialEq for ListField<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items && self.item_mime_type == other.item_mime_type
    }
}

impl fmt::Debug for ListField<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListField")
            .field("items", &self.items)
            .field("item_mime_type", &self.item_mime_type)
            .finish()
    }
}

/// A map shaped like a link (`href` plus `method`, `title`, `mimetype`).
#[derive(Clone, Copy)]
pub struct LinkField<'a> {
    core: &'a ResourceCore,
    link: &'a Map<String, Value>,
}

impl<'a> LinkField<'a> {
    pub fn href(&self) -> &'a str {
        self.link
            .get("href")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn method(&self) -> &'a str {
        self.link
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
    }

    pub fn title(&self) -> Option<&'a str> {
        self.link.get("title").and_then(Value::as_str)
    }

    pub fn mime_type(&self) -> Option<&'a str> {
        self.link.get("mimetype").and_then(Value::as_str)
    }

    /// The link as a plain read-only map.
    pub fn as_dict(&self) -> DictField<'a> {
        DictField::new(self.core, self.link)
    }

    pub fn prepare_get(&self, query: &QueryArgs) -> HttpRequest {
        HttpRequest::get(self.href(), query)
    }

    /// Fetch the linked resource.
    pub async fn get(&self, query: &QueryArgs) -> Result<Resource> {
        self.core.execute_expecting(self.prepare_get(query)).await
    }
}

impl PartialEq for LinkField<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.link == other.link
    }
}

impl fmt::Debug for LinkField<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkField").field("link", self.link).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::{ResourceClass, ResourceFactory, ResourceKind, ResourceRegistry};
    use crate::resource::HyperResource;
    use crate::transport::{ReplayTransport, Transport};
    use serde_json::json;

    fn payload() -> Value {
        json!({
            "widget": {
                "id": 7,
                "dimensions": {"width": 3, "height": {"value": 4, "unit": "cm"}},
                "tags": ["a", {"name": "b"}],
                "owner": {"href": "/api/users/admin/", "method": "GET", "title": "admin"},
                "extra_data": {
                    "color": "red",
                    "nested": {"links": {"href": "/not/a/link/"}},
                    "list": [{"href": "/x/"}],
                },
                "parts": [{"id": 1, "links": {"self": {"href": "/api/parts/1/"}}}],
                "maker": {"name": "acme", "links": {"self": {"href": "/api/makers/3/"}}},
                "_expanded": {
                    "parts": {"item_mimetype": "application/vnd.example.org.part+json"},
                    "maker": {"item_mimetype": "application/vnd.example.org.maker+json"},
                },
            },
            "links": {"self": {"href": "/api/widgets/7/"}},
            "stat": "ok",
        })
    }

    fn widget() -> Resource {
        let factory = ResourceFactory::new(
            ResourceRegistry::new()
                .with("application/vnd.example.org.gizmo+json", ResourceClass::item()),
        );
        let transport = ReplayTransport::new(factory);
        transport
            .factory()
            .create(transport.handle(), payload(), "/api/widgets/7/", &CreateOptions::new())
            .unwrap()
    }

    #[test]
    fn test_dict_field() {
        let widget = widget();
        let dims = widget.field("dimensions").unwrap();
        let dims = dims.as_dict().unwrap();

        assert_eq!(dims.len(), 2);
        assert_eq!(dims.get("width").unwrap().as_i64(), Some(3));
        let height = dims.get("height").unwrap();
        assert_eq!(height.as_dict().unwrap().get("unit").unwrap().as_str(), Some("cm"));
        assert!(dims.get("depth").is_err());
    }

    #[test]
    fn test_dict_fields_from_same_payload_are_equal() {
        let widget = widget();
        let first = widget.field("dimensions").unwrap();
        let second = widget.field("dimensions").unwrap();

        assert_eq!(first.as_dict(), second.as_dict());
    }

    #[test]
    fn test_dict_field_mutation_fails_and_leaves_payload() {
        let widget = widget();
        let field = widget.field("dimensions").unwrap();
        let mut dims = *field.as_dict().unwrap();

        assert!(matches!(
            dims.set("width", json!(10)),
            Err(HyperApiError::ResourceModel(ResourceModelError::ImmutableField))
        ));
        assert!(dims.remove("width").is_err());
        assert!(dims.pop("width").is_err());
        assert!(dims.clear().is_err());
        assert_eq!(widget.value("dimensions").unwrap()["width"], 3);
    }

    #[test]
    fn test_extra_data_stays_flat() {
        let widget = widget();
        let field = widget.field("extra_data").unwrap();
        let extra = field.as_extra_data().unwrap();

        assert_eq!(extra.get("color").unwrap().as_str(), Some("red"));
        assert!(extra.get("nested").unwrap().as_extra_data().is_some());
        assert!(extra.get("list").unwrap().as_value().unwrap().is_array());

        let mut copy = extra.to_owned_map();
        copy.insert("color".to_string(), json!("blue"));
        assert_eq!(widget.value("extra_data").unwrap()["color"], "red");
    }

    #[test]
    fn test_extra_data_mutation_message() {
        let widget = widget();
        let field = widget.field("extra_data").unwrap();
        let mut extra = *field.as_extra_data().unwrap();
        let err = extra.set("color", json!("blue")).unwrap_err();

        assert!(err.to_string().contains("extra_data_json"));
        assert!(extra.clear().is_err());
    }

    #[test]
    fn test_link_field() {
        let widget = widget();
        let field = widget.field("owner").unwrap();
        let owner = field.as_link().unwrap();

        assert_eq!(owner.href(), "/api/users/admin/");
        assert_eq!(owner.method(), "GET");
        assert_eq!(owner.title(), Some("admin"));
        assert_eq!(
            owner.prepare_get(&QueryArgs::new().arg("expand", "profile")).url(),
            "/api/users/admin/?expand=profile"
        );
    }

    #[test]
    fn test_list_field_wraps_items() {
        let widget = widget();
        let field = widget.field("tags").unwrap();
        let tags = field.as_list().unwrap();

        assert_eq!(tags.len(), 2);
        assert_eq!(tags.get(0).unwrap().unwrap().as_str(), Some("a"));
        assert!(tags.get(1).unwrap().unwrap().as_dict().is_some());
        assert!(tags.get(2).is_none());
    }

    #[test]
    fn test_expanded_fields_become_resources() {
        let widget = widget();

        let maker = widget.field("maker").unwrap().into_resource().unwrap();
        assert_eq!(maker.kind(), ResourceKind::Item);
        assert_eq!(maker.url(), "/api/makers/3/");
        assert_eq!(maker.value("name").unwrap(), "acme");

        let field = widget.field("parts").unwrap();
        let parts = field.as_list().unwrap();
        let part = parts.get(0).unwrap().unwrap().into_resource().unwrap();
        assert_eq!(part.url(), "/api/parts/1/");
        assert_eq!(part.value("id").unwrap(), 1);
    }
}
