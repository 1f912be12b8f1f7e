//! Results of `counts-only` queries.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ResourceModelError, Result};
use crate::request::{strip_query_param, HttpRequest, QueryArgs};

use super::{HyperResource, ResourceCore};

const COUNTS_ONLY: &str = "counts-only";

/// The number of items a list query would return.
#[derive(Debug, Clone)]
pub struct CountResource {
    core: ResourceCore,
    count: u64,
}

impl CountResource {
    /// Fails unless `count` is a non-negative whole number.
    pub(crate) fn new(core: ResourceCore) -> Result<Self> {
        let raw = core.payload().get("count");
        let count = raw.and_then(|count| {
            count.as_u64().or_else(|| {
                count
                    .as_f64()
                    .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                    .map(|f| f as u64)
            })
        });

        match count {
            Some(count) => Ok(Self { core, count }),
            None => Err(ResourceModelError::MalformedPayload(format!(
                "count at {} must be a non-negative integer, got {}",
                core.url(),
                raw.map_or_else(|| "nothing".to_string(), Value::to_string)
            ))
            .into()),
        }
    }

    pub(crate) fn into_core(self) -> ResourceCore {
        self.core
    }

    pub(crate) fn core_mut(&mut self) -> &mut ResourceCore {
        &mut self.core
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// The raw `count` value from the payload.
    pub fn raw_count(&self) -> Option<&Value> {
        self.core.payload().get("count")
    }
}

#[async_trait]
impl HyperResource for CountResource {
    fn core(&self) -> &ResourceCore {
        &self.core
    }

    /// Request the full list this count was taken from.
    ///
    /// Other query arguments of the count request are kept.
    fn prepare_get_self(&self, query: &QueryArgs) -> Result<HttpRequest> {
        let url = strip_query_param(self.core.url(), COUNTS_ONLY);
        let mut query = query.clone();
        query.remove("counts_only");
        query.remove(COUNTS_ONLY);

        Ok(HttpRequest::get(&url, &query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HyperApiError;
    use crate::factory::{CreateOptions, ResourceFactory, ResourceKind};
    use crate::transport::{ReplayTransport, Transport};
    use reqwest::Method;
    use serde_json::json;

    fn count(transport: &ReplayTransport) -> CountResource {
        transport
            .factory()
            .create(
                transport.handle(),
                json!({"count": 12, "stat": "ok"}),
                "/api/widgets/?counts-only=1&color=red",
                &CreateOptions::new(),
            )
            .unwrap()
            .into_count()
            .unwrap()
    }

    #[test]
    fn test_count_value() {
        let transport = ReplayTransport::new(ResourceFactory::default());
        let count = count(&transport);

        assert_eq!(count.count(), 12);
        assert_eq!(count.value("count").unwrap(), 12);
        assert_eq!(count.raw_count(), Some(&json!(12)));
    }

    #[test]
    fn test_invalid_count_is_malformed() {
        let transport = ReplayTransport::new(ResourceFactory::default());

        for bad in [json!(-3), json!(2.5)] {
            let result = transport.factory().create(
                transport.handle(),
                json!({"count": bad, "stat": "ok"}),
                "/api/widgets/?counts-only=1",
                &CreateOptions::new(),
            );
            assert!(matches!(
                result,
                Err(HyperApiError::ResourceModel(ResourceModelError::MalformedPayload(_)))
            ));
        }

        let whole = transport
            .factory()
            .create(
                transport.handle(),
                json!({"count": 4.0, "stat": "ok"}),
                "/api/widgets/?counts-only=1",
                &CreateOptions::new(),
            )
            .unwrap()
            .into_count()
            .unwrap();
        assert_eq!(whole.count(), 4);
    }

    #[test]
    fn test_get_self_drops_counts_only() {
        let transport = ReplayTransport::new(ResourceFactory::default());
        let count = count(&transport);

        let request = count
            .prepare_get_self(&QueryArgs::new().arg("max_results", 5))
            .unwrap();
        assert_eq!(request.url(), "/api/widgets/?color=red&max-results=5");
    }

    #[tokio::test]
    async fn test_get_self_fetches_list() {
        let transport = ReplayTransport::new(ResourceFactory::default());
        transport.respond(
            Method::GET,
            "/api/widgets/?color=red",
            json!({"widgets": [{"name": "a"}], "stat": "ok"}),
        );

        let list = count(&transport).get_self(&QueryArgs::new()).await.unwrap();
        assert_eq!(list.kind(), ResourceKind::List);
    }
}
