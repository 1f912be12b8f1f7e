//! The API root resource.

use std::collections::BTreeMap;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::capabilities::{version_at_least, Capabilities};
use crate::error::{ResourceModelError, Result};
use crate::request::{HttpRequest, QueryArgs};
use crate::transport::cache::MINIMUM_VERSION;

use super::{HyperResource, Resource, ResourceCore};

static TEMPLATE_PARAM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(?P<key>[A-Za-z_0-9]*)\}").expect("Invalid regex"));

/// Entry point of an API, advertising URI templates and capabilities.
///
/// Building a root from a server older than the cache's minimum version
/// disables caching on the owning transport.
#[derive(Debug, Clone)]
pub struct RootResource {
    core: ResourceCore,
    templates: BTreeMap<String, String>,
}

impl RootResource {
    pub(crate) fn new(mut core: ResourceCore) -> Self {
        let templates = core
            .payload()
            .get("uri_templates")
            .and_then(Value::as_object)
            .map(|templates| {
                templates
                    .iter()
                    .filter_map(|(name, uri)| Some((name.clone(), uri.as_str()?.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        core.fields.remove("uri_templates");

        let root = Self { core, templates };

        if !version_at_least(root.product_version(), MINIMUM_VERSION) {
            tracing::debug!(
                version = root.product_version(),
                "Server is older than {MINIMUM_VERSION}, disabling the API cache"
            );
            root.core.transport().disable_cache();
        }

        root
    }

    pub(crate) fn into_core(self) -> ResourceCore {
        self.core
    }

    pub(crate) fn core_mut(&mut self) -> &mut ResourceCore {
        &mut self.core
    }

    /// Names of the advertised URI templates.
    pub fn template_names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn uri_template(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    /// Build a GET request from a URI template.
    ///
    /// Each `{key}` placeholder is filled from `args` first, removing the
    /// argument so it is not also sent as a query parameter, and then from
    /// `values`. Remaining arguments become the query string.
    pub fn prepare_template(
        &self,
        name: &str,
        args: &QueryArgs,
        values: &BTreeMap<String, String>,
    ) -> Result<HttpRequest> {
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| ResourceModelError::UnknownTemplate(name.to_string()))?;

        let mut query = args.clone();
        let mut missing = None;

        let url = TEMPLATE_PARAM_RE.replace_all(template, |caps: &Captures<'_>| {
            let key = &caps["key"];
            match query
                .remove(key)
                .map(|value| value.to_string())
                .or_else(|| values.get(key).cloned())
            {
                Some(value) => value,
                None => {
                    missing.get_or_insert_with(|| key.to_string());
                    String::new()
                }
            }
        });

        if let Some(key) = missing {
            return Err(ResourceModelError::MissingTemplateValue {
                template: name.to_string(),
                key,
            }
            .into());
        }

        Ok(HttpRequest::get(&url, &query))
    }

    /// Fetch the resource behind a URI template.
    pub async fn get_template(
        &self,
        name: &str,
        args: &QueryArgs,
        values: &BTreeMap<String, String>,
    ) -> Result<Resource> {
        let request = self.prepare_template(name, args, values)?;
        self.core.execute_expecting(request).await
    }

    /// The server's advertised capabilities.
    pub fn capabilities(&self) -> Capabilities {
        Capabilities::new(
            self.core
                .payload()
                .get("capabilities")
                .cloned()
                .unwrap_or(Value::Null),
        )
    }

    /// `product.package_version` from the payload.
    pub fn product_version(&self) -> Option<&str> {
        self.core
            .payload()
            .pointer("/product/package_version")
            .and_then(Value::as_str)
    }
}

#[async_trait]
impl HyperResource for RootResource {
    fn core(&self) -> &ResourceCore {
        &self.core
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HyperApiError;
    use crate::factory::{CreateOptions, ResourceFactory, ResourceKind};
    use crate::transport::{ReplayTransport, Transport};
    use serde_json::json;

    fn root_payload(version: &str) -> Value {
        json!({
            "uri_templates": {
                "widget": "http://example.com/api/widgets/{widget_id}/",
                "part": "http://example.com/api/widgets/{widget_id}/parts/{part_id}/",
                "widgets": "http://example.com/api/widgets/",
            },
            "capabilities": {"authentication": {"client_web_login": true}},
            "product": {"name": "Example", "package_version": version},
            "links": {"self": {"href": "http://example.com/api/", "method": "GET"}},
            "stat": "ok",
        })
    }

    fn root(transport: &ReplayTransport, version: &str) -> RootResource {
        transport
            .factory()
            .create(
                transport.handle(),
                root_payload(version),
                "http://example.com/api/",
                &CreateOptions::new().force_kind(ResourceKind::Root),
            )
            .unwrap()
            .into_root()
            .unwrap()
    }

    #[test]
    fn test_templates_are_not_fields() {
        let transport = ReplayTransport::new(ResourceFactory::default());
        let root = root(&transport, "7.0.1");

        assert!(!root.contains("uri_templates"));
        assert!(root.contains("product"));
        assert_eq!(
            root.template_names().collect::<Vec<_>>(),
            ["part", "widget", "widgets"]
        );
    }

    #[test]
    fn test_template_args_before_values() {
        let transport = ReplayTransport::new(ResourceFactory::default());
        let root = root(&transport, "7.0.1");

        let mut values = BTreeMap::new();
        values.insert("widget_id".to_string(), "1".to_string());
        values.insert("part_id".to_string(), "9".to_string());

        let args = QueryArgs::new().arg("widget_id", 7).arg("expand", "maker");
        let request = root.prepare_template("part", &args, &values).unwrap();

        assert_eq!(
            request.url(),
            "http://example.com/api/widgets/7/parts/9/?expand=maker"
        );
    }

    #[test]
    fn test_missing_template_value() {
        let transport = ReplayTransport::new(ResourceFactory::default());
        let root = root(&transport, "7.0.1");

        let err = root
            .prepare_template("widget", &QueryArgs::new(), &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(
            err,
            HyperApiError::ResourceModel(ResourceModelError::MissingTemplateValue { ref key, .. })
                if key == "widget_id"
        ));

        let err = root
            .prepare_template("gadget", &QueryArgs::new(), &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(
            err,
            HyperApiError::ResourceModel(ResourceModelError::UnknownTemplate(_))
        ));
    }

    #[test]
    fn test_capabilities_and_version() {
        let transport = ReplayTransport::new(ResourceFactory::default());
        let root = root(&transport, "7.0.1");

        assert_eq!(root.product_version(), Some("7.0.1"));
        assert!(root
            .capabilities()
            .has_capability(&["authentication", "client_web_login"]));
        assert!(!transport.cache_disabled());
    }

    #[test]
    fn test_old_server_disables_cache() {
        let transport = ReplayTransport::new(ResourceFactory::default());
        root(&transport, "1.7.28");

        assert!(transport.cache_disabled());
    }
}
