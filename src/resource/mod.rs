//! Resource model.
//!
//! A [`Resource`] wraps one decoded payload together with the URL it came
//! from and the transport that fetched it. Links in the payload become
//! [`BoundAction`]s, fixed at construction; fields are read through the
//! wrappers in [`fields`].
//!
//! Every action has a pure `prepare_*` form that returns an [`HttpRequest`]
//! and an async form that hands the request to the owning transport.

mod count;
pub mod fields;
mod item;
mod list;
mod root;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{HyperApiError, ResourceModelError, Result};
use crate::factory::{ResourceClass, ResourceKind, SPECIAL_KEYS};
use crate::mimetype::MimeType;
use crate::request::{FieldData, HttpRequest, QueryArgs};
use crate::transport::{MethodResult, Transport};

pub use count::CountResource;
pub use fields::{DictField, ExtraDataField, Field, LinkField, ListField};
pub use item::{ItemResource, ItemState};
pub use list::{Items, ListResource, Pages, MAX_PAGES};
pub use root::RootResource;

const LINKS_KEY: &str = "links";
const EXPANDED_KEY: &str = "_expanded";

static NO_LINKS: Lazy<Map<String, Value>> = Lazy::new(Map::new);

/// Keys never exposed as fields.
const EXCLUDED_FIELDS: [&str; 3] = [LINKS_KEY, EXPANDED_KEY, "stat"];

/// A link relation name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Relation {
    Create,
    Delete,
    Next,
    Prev,
    SelfLink,
    Update,
    /// Any other relation, fetched with GET.
    Other(String),
}

impl Relation {
    pub fn from_name(name: &str) -> Self {
        match name {
            "create" => Self::Create,
            "delete" => Self::Delete,
            "next" => Self::Next,
            "prev" => Self::Prev,
            "self" => Self::SelfLink,
            "update" => Self::Update,
            other => Self::Other(other.to_string()),
        }
    }

    /// The relation name as it appears in `links`.
    pub fn name(&self) -> &str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Next => "next",
            Self::Prev => "prev",
            Self::SelfLink => "self",
            Self::Update => "update",
            Self::Other(name) => name,
        }
    }

    /// The HTTP method bound to this relation.
    pub fn method(&self) -> Method {
        match self {
            Self::Create => Method::POST,
            Self::Delete => Method::DELETE,
            Self::Update => Method::PUT,
            Self::Next | Self::Prev | Self::SelfLink | Self::Other(_) => Method::GET,
        }
    }

    /// The conventional action name (`update`, `get_self`, `get_<rel>`).
    pub fn action_name(&self) -> String {
        match self {
            Self::Create | Self::Delete | Self::Update => self.name().to_string(),
            _ => format!("get_{}", self.name()),
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An action derived from one link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundAction {
    pub relation: Relation,
    pub method: Method,
    pub href: String,
    pub title: Option<String>,
}

impl BoundAction {
    /// Build the request for this action.
    pub fn prepare(&self, query: &QueryArgs) -> HttpRequest {
        HttpRequest::new(&self.href, self.method.clone(), query)
    }
}

/// Expansion metadata for one field (`_expanded.<field>`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ExpandInfo {
    #[serde(default)]
    pub item_mimetype: Option<String>,
    #[serde(default)]
    pub list_mimetype: Option<String>,
    #[serde(default)]
    pub list_url: Option<String>,
}

/// State shared by every resource variant.
#[derive(Debug, Clone)]
pub struct ResourceCore {
    transport: Arc<dyn Transport>,
    payload: Arc<Value>,
    url: String,
    token: Option<String>,
    mime_type: Option<String>,
    class: Option<ResourceClass>,
    links: Map<String, Value>,
    pub(crate) fields: Map<String, Value>,
    expanded: BTreeMap<String, ExpandInfo>,
    actions: BTreeMap<String, BoundAction>,
}

impl ResourceCore {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        payload: Value,
        url: &str,
        token: Option<String>,
        mime_type: Option<String>,
        class: Option<ResourceClass>,
    ) -> Self {
        let empty = Map::new();
        let root = payload.as_object().unwrap_or(&empty);
        let body = token
            .as_deref()
            .and_then(|token| root.get(token))
            .and_then(Value::as_object);

        let links = root
            .get(LINKS_KEY)
            .or_else(|| body.and_then(|body| body.get(LINKS_KEY)))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let expanded = root
            .get(EXPANDED_KEY)
            .or_else(|| body.and_then(|body| body.get(EXPANDED_KEY)))
            .and_then(|info| serde_json::from_value(info.clone()).ok())
            .unwrap_or_default();

        let mut excluded: Vec<&str> = EXCLUDED_FIELDS.to_vec();
        if let Some(class) = &class {
            excluded.extend(class.excluded_fields.iter().map(String::as_str));
        }

        // Lists keep their items under the token and metadata beside it.
        let source = match body {
            Some(body) => body,
            None => {
                if let Some(token) = token.as_deref() {
                    excluded.push(token);
                    excluded.extend(SPECIAL_KEYS);
                }
                root
            }
        };

        let fields = source
            .iter()
            .filter(|(name, _)| !excluded.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let mut actions = BTreeMap::new();
        for (rel, link) in &links {
            let Some(href) = link.get("href").and_then(Value::as_str) else {
                tracing::debug!(rel, "Ignoring link without an href");
                continue;
            };

            let relation = Relation::from_name(rel);
            actions.insert(
                rel.clone(),
                BoundAction {
                    method: relation.method(),
                    relation,
                    href: href.to_string(),
                    title: link.get("title").and_then(Value::as_str).map(str::to_string),
                },
            );
        }

        Self {
            transport,
            payload: Arc::new(payload),
            url: url.to_string(),
            token,
            mime_type,
            class,
            links,
            fields,
            expanded,
            actions,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The payload key holding domain data, if any.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn class(&self) -> Option<&ResourceClass> {
        self.class.as_ref()
    }

    /// The full decoded payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// The `stat` value of the payload.
    pub fn stat(&self) -> Option<&str> {
        self.payload.get("stat").and_then(Value::as_str)
    }

    pub fn links_map(&self) -> &Map<String, Value> {
        &self.links
    }

    pub fn fields_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn expand_info(&self, field: &str) -> Option<&ExpandInfo> {
        self.expanded.get(field)
    }

    pub fn action(&self, rel: &str) -> Option<&BoundAction> {
        self.actions.get(rel)
    }

    pub fn actions(&self) -> impl Iterator<Item = &BoundAction> {
        self.actions.values()
    }

    /// A short name for error messages, from the content type or token.
    pub fn describe(&self) -> String {
        self.mime_type
            .as_deref()
            .map(|mime| MimeType::parse(mime).resource)
            .filter(|name| !name.is_empty())
            .or_else(|| self.token.clone())
            .unwrap_or_else(|| "resource".to_string())
    }

    pub fn prepare_action(&self, rel: &str, query: &QueryArgs) -> Result<HttpRequest> {
        self.action(rel)
            .map(|action| action.prepare(query))
            .ok_or_else(|| self.unknown_link(rel))
    }

    pub(crate) fn unknown_link(&self, rel: &str) -> HyperApiError {
        ResourceModelError::UnknownLink {
            resource: self.describe(),
            rel: rel.to_string(),
        }
        .into()
    }

    pub(crate) fn unknown_field(&self, name: &str) -> HyperApiError {
        ResourceModelError::UnknownField {
            resource: self.describe(),
            name: name.to_string(),
        }
        .into()
    }

    /// Read a field through the wrapper layer.
    pub fn field(&self, name: &str) -> Result<Field<'_>> {
        let (name, value) = self
            .fields
            .get_key_value(name)
            .ok_or_else(|| self.unknown_field(name))?;

        fields::wrap_named(self, name, value)
    }

    pub(crate) async fn execute(&self, request: HttpRequest) -> Result<Option<Resource>> {
        self.transport.execute(MethodResult::Request(request)).await
    }

    pub(crate) async fn execute_expecting(&self, request: HttpRequest) -> Result<Resource> {
        let url = request.url().to_string();
        self.execute(request).await?.ok_or_else(|| {
            ResourceModelError::MalformedPayload(format!("no resource returned from {url}")).into()
        })
    }

    /// Point the URL at the `self` link, when there is one.
    pub(crate) fn rebind_to_self(&mut self) {
        if let Some(action) = self.actions.get("self") {
            self.url = action.href.clone();
        }
    }
}

/// Field access and link-bound actions shared by every resource.
#[async_trait]
pub trait HyperResource: Send + Sync {
    fn core(&self) -> &ResourceCore;

    /// Fails once the resource can no longer be used.
    ///
    /// Every field read and action goes through this check.
    fn check_live(&self) -> Result<()> {
        Ok(())
    }

    fn url(&self) -> &str {
        self.core().url()
    }

    /// Read a field, wrapping maps, lists and links.
    fn field(&self, name: &str) -> Result<Field<'_>> {
        self.check_live()?;
        self.core().field(name)
    }

    /// Read a field's raw value.
    fn value(&self, name: &str) -> Result<&Value> {
        self.check_live()?;
        let core = self.core();
        core.fields.get(name).ok_or_else(|| core.unknown_field(name))
    }

    fn contains(&self, name: &str) -> bool {
        self.check_live().is_ok() && self.core().fields.contains_key(name)
    }

    fn field_names(&self) -> Vec<&str> {
        if self.check_live().is_err() {
            return Vec::new();
        }
        self.core().fields.keys().map(String::as_str).collect()
    }

    /// The links of this resource as a read-only map.
    fn links(&self) -> DictField<'_> {
        let core = self.core();
        match self.check_live() {
            Ok(()) => DictField::new(core, core.links_map()),
            Err(_) => DictField::new(core, &NO_LINKS),
        }
    }

    fn has_action(&self, rel: &str) -> bool {
        self.check_live().is_ok() && self.core().action(rel).is_some()
    }

    /// Build the request for any link relation.
    fn prepare_action(&self, rel: &str, query: &QueryArgs) -> Result<HttpRequest> {
        self.check_live()?;
        self.core().prepare_action(rel, query)
    }

    fn prepare_get_self(&self, query: &QueryArgs) -> Result<HttpRequest> {
        self.prepare_action("self", query)
    }

    fn prepare_create(&self, fields: &FieldData, query: &QueryArgs) -> Result<HttpRequest> {
        let mut request = self.prepare_action("create", query)?;
        fields.apply_to(&mut request);
        Ok(request)
    }

    fn prepare_update(&self, fields: &FieldData, query: &QueryArgs) -> Result<HttpRequest> {
        let mut request = self.prepare_action("update", query)?;
        fields.apply_to(&mut request);
        Ok(request)
    }

    fn prepare_delete(&self, query: &QueryArgs) -> Result<HttpRequest> {
        self.prepare_action("delete", query)
    }

    /// Execute any link relation. DELETE actions yield `None`.
    async fn invoke(&self, rel: &str, query: &QueryArgs) -> Result<Option<Resource>> {
        let request = self.prepare_action(rel, query)?;
        self.core().execute(request).await
    }

    async fn get_self(&self, query: &QueryArgs) -> Result<Resource> {
        let request = self.prepare_get_self(query)?;
        self.core().execute_expecting(request).await
    }

    async fn create(&self, fields: &FieldData, query: &QueryArgs) -> Result<Resource> {
        let request = self.prepare_create(fields, query)?;
        let created = self.core().execute_expecting(request).await?;
        Ok(created.rebound_to_self())
    }

    async fn update(&self, fields: &FieldData, query: &QueryArgs) -> Result<Resource> {
        let request = self.prepare_update(fields, query)?;
        let updated = self.core().execute_expecting(request).await?;
        Ok(updated.rebound_to_self())
    }
}

/// Any resource built by the factory.
#[derive(Debug, Clone)]
pub enum Resource {
    Item(ItemResource),
    List(ListResource),
    Count(CountResource),
    Root(RootResource),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Item(_) => ResourceKind::Item,
            Self::List(_) => ResourceKind::List,
            Self::Count(_) => ResourceKind::Count,
            Self::Root(_) => ResourceKind::Root,
        }
    }

    pub fn as_item(&self) -> Option<&ItemResource> {
        match self {
            Self::Item(item) => Some(item),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListResource> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<&CountResource> {
        match self {
            Self::Count(count) => Some(count),
            _ => None,
        }
    }

    pub fn as_root(&self) -> Option<&RootResource> {
        match self {
            Self::Root(root) => Some(root),
            _ => None,
        }
    }

    pub fn into_item(self) -> Result<ItemResource> {
        match self {
            Self::Item(item) => Ok(item),
            other => Err(other.wrong_kind("an item")),
        }
    }

    pub fn into_list(self) -> Result<ListResource> {
        match self {
            Self::List(list) => Ok(list),
            other => Err(other.wrong_kind("a list")),
        }
    }

    pub fn into_count(self) -> Result<CountResource> {
        match self {
            Self::Count(count) => Ok(count),
            other => Err(other.wrong_kind("a count")),
        }
    }

    pub fn into_root(self) -> Result<RootResource> {
        match self {
            Self::Root(root) => Ok(root),
            other => Err(other.wrong_kind("a root")),
        }
    }

    pub(crate) fn into_core(self) -> ResourceCore {
        match self {
            Self::Item(item) => item.into_core(),
            Self::List(list) => list.into_core(),
            Self::Count(count) => count.into_core(),
            Self::Root(root) => root.into_core(),
        }
    }

    fn core_mut(&mut self) -> &mut ResourceCore {
        match self {
            Self::Item(item) => item.core_mut(),
            Self::List(list) => list.core_mut(),
            Self::Count(count) => count.core_mut(),
            Self::Root(root) => root.core_mut(),
        }
    }

    /// This resource with its URL moved to its `self` link.
    #[must_use]
    pub fn rebound_to_self(mut self) -> Self {
        self.core_mut().rebind_to_self();
        self
    }

    fn wrong_kind(&self, expected: &str) -> HyperApiError {
        ResourceModelError::MalformedPayload(format!(
            "expected {expected} resource at {}, got {:?}",
            self.url(),
            self.kind()
        ))
        .into()
    }
}

#[async_trait]
impl HyperResource for Resource {
    fn core(&self) -> &ResourceCore {
        match self {
            Self::Item(item) => item.core(),
            Self::List(list) => list.core(),
            Self::Count(count) => count.core(),
            Self::Root(root) => root.core(),
        }
    }

    fn check_live(&self) -> Result<()> {
        match self {
            Self::Item(item) => item.check_live(),
            _ => Ok(()),
        }
    }

    fn field(&self, name: &str) -> Result<Field<'_>> {
        match self {
            Self::Item(item) => item.field(name),
            _ => self.core().field(name),
        }
    }

    fn value(&self, name: &str) -> Result<&Value> {
        match self {
            Self::Item(item) => item.value(name),
            Self::List(list) => list.value(name),
            Self::Count(count) => count.value(name),
            Self::Root(root) => root.value(name),
        }
    }

    fn prepare_get_self(&self, query: &QueryArgs) -> Result<HttpRequest> {
        match self {
            Self::Count(count) => count.prepare_get_self(query),
            _ => self.prepare_action("self", query),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::{CreateOptions, ResourceFactory};
    use crate::transport::{ReplayTransport, Transport};
    use serde_json::json;

    fn widget_payload() -> Value {
        json!({
            "widget": {"id": 7, "color": "red"},
            "links": {
                "self": {"href": "/api/widgets/7/", "method": "GET"},
                "update": {"href": "/api/widgets/7/", "method": "PUT"},
                "owner": {"href": "/api/users/admin/", "method": "GET", "title": "admin"},
            },
            "stat": "ok",
        })
    }

    fn build(payload: Value) -> Resource {
        let transport = ReplayTransport::new(ResourceFactory::default());
        transport
            .factory()
            .create(transport.handle(), payload, "/api/widgets/7/", &CreateOptions::new())
            .unwrap()
    }

    #[test]
    fn test_widget_item() {
        let resource = build(widget_payload());

        assert_eq!(resource.kind(), ResourceKind::Item);
        assert_eq!(resource.core().token(), Some("widget"));
        assert_eq!(resource.value("color").unwrap(), &json!("red"));
        assert_eq!(resource.field("id").unwrap().as_i64(), Some(7));
        assert!(!resource.contains("links"));
        assert!(!resource.contains("stat"));
    }

    #[test]
    fn test_widget_actions() {
        let resource = build(widget_payload());

        let update = resource
            .prepare_update(&FieldData::new().set("color", "blue"), &QueryArgs::new())
            .unwrap();
        assert_eq!(update.method(), &Method::PUT);
        assert_eq!(update.url(), "/api/widgets/7/");
        assert_eq!(update.fields().get("color").map(String::as_str), Some("blue"));

        assert!(!resource.has_action("delete"));
        assert!(!resource.has_action("create"));
        let err = resource.prepare_delete(&QueryArgs::new()).unwrap_err();
        assert!(matches!(
            err,
            HyperApiError::ResourceModel(ResourceModelError::UnknownLink { .. })
        ));
    }

    #[test]
    fn test_other_links_are_get_actions() {
        let resource = build(widget_payload());
        let action = resource.core().action("owner").unwrap();

        assert_eq!(action.relation, Relation::Other("owner".to_string()));
        assert_eq!(action.relation.action_name(), "get_owner");
        assert_eq!(action.method, Method::GET);
        assert_eq!(action.title.as_deref(), Some("admin"));

        let request = resource
            .prepare_action("owner", &QueryArgs::new().arg("only_fields", "username"))
            .unwrap();
        assert_eq!(request.url(), "/api/users/admin/?only-fields=username");
    }

    #[test]
    fn test_links_nested_under_token() {
        let resource = build(json!({
            "gadget": {
                "name": "sprocket",
                "links": {"delete": {"href": "/api/gadgets/1/", "method": "DELETE"}},
            },
            "stat": "ok",
        }));

        assert!(resource.has_action("delete"));
        assert_eq!(resource.field_names(), vec!["name"]);
        let request = resource.prepare_delete(&QueryArgs::new()).unwrap();
        assert_eq!(request.method(), &Method::DELETE);
    }

    #[test]
    fn test_unknown_field() {
        let resource = build(widget_payload());
        let err = resource.field("size").unwrap_err();

        assert_eq!(
            err.to_string(),
            "This widget does not have a field named \"size\""
        );
    }

    #[test]
    fn test_links_view_is_read_only() {
        let resource = build(widget_payload());
        let mut links = resource.links();

        assert!(links.contains("self"));
        assert!(links.set("self", json!({})).is_err());
        assert!(resource.has_action("self"));
    }

    #[test]
    fn test_relation_names_round_trip() {
        for name in ["create", "delete", "next", "prev", "self", "update", "owner"] {
            assert_eq!(Relation::from_name(name).name(), name);
        }
        assert_eq!(Relation::SelfLink.action_name(), "get_self");
        assert_eq!(Relation::Create.method(), Method::POST);
    }
}
