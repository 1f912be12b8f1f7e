//! Mock server state management.
//!
//! Provides the in-memory data store for the mock hypermedia API server.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

/// A widget stored by the mock server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub id: u64,
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub extra_data: Map<String, Value>,
}

/// Shared state for the mock server.
///
/// This struct holds all the mock data that the server will serve.
/// It's wrapped in `Arc<RwLock<_>>` for concurrent access.
#[derive(Debug)]
pub struct MockState {
    /// Widgets indexed by ID, listed in ID order.
    pub widgets: BTreeMap<u64, Widget>,

    /// Base URL used for links, set when the server starts.
    pub base_url: String,

    /// Version reported by the root resource.
    pub product_version: String,

    /// Whether the root advertises browser-based login.
    pub web_login: bool,

    /// Optional authentication token. If set, requests must include this token.
    pub required_token: Option<String>,

    /// Number of conditional GETs answered with 304 Not Modified.
    pub not_modified_count: usize,

    next_id: u64,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            widgets: BTreeMap::new(),
            base_url: String::new(),
            product_version: "7.0.1".to_string(),
            web_login: true,
            required_token: None,
            not_modified_count: 0,
            next_id: 1,
        }
    }
}

impl MockState {
    /// Create a new empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create state wrapped in Arc<RwLock> for sharing.
    pub fn shared(self) -> Arc<RwLock<Self>> {
        Arc::new(RwLock::new(self))
    }

    /// Add a widget to the state.
    pub fn with_widget(mut self, widget: Widget) -> Self {
        self.next_id = self.next_id.max(widget.id + 1);
        self.widgets.insert(widget.id, widget);
        self
    }

    /// Set the required authentication token.
    pub fn with_required_token(mut self, token: &str) -> Self {
        self.required_token = Some(token.to_string());
        self
    }

    /// Set the product version reported by the root.
    pub fn with_product_version(mut self, version: &str) -> Self {
        self.product_version = version.to_string();
        self
    }

    pub fn get_widget(&self, id: u64) -> Option<&Widget> {
        self.widgets.get(&id)
    }

    /// One page of widgets, and the total count.
    pub fn list_widgets(&self, color: Option<&str>, start: usize, max_results: usize) -> (Vec<&Widget>, usize) {
        let matching: Vec<&Widget> = self
            .widgets
            .values()
            .filter(|w| color.map(|c| w.color.eq_ignore_ascii_case(c)).unwrap_or(true))
            .collect();
        let total = matching.len();

        let page = matching.into_iter().skip(start).take(max_results).collect();
        (page, total)
    }

    /// Create a widget and return it.
    pub fn create_widget(&mut self, name: String, color: String) -> &Widget {
        let id = self.next_id;
        self.next_id += 1;

        self.widgets.entry(id).or_insert(Widget {
            id,
            name,
            color,
            extra_data: Map::new(),
        })
    }

    /// Apply form fields to a widget and return the updated version.
    ///
    /// `extra_data.<key>` sets one extra data value; `extra_data:json` merges
    /// a document, removing keys whose value is `null`.
    pub fn update_widget(&mut self, id: u64, fields: &BTreeMap<String, String>) -> Option<&Widget> {
        let widget = self.widgets.get_mut(&id)?;

        for (name, value) in fields {
            match name.as_str() {
                "name" => widget.name = value.clone(),
                "color" => widget.color = value.clone(),
                "extra_data:json" => {
                    if let Ok(Value::Object(patch)) = serde_json::from_str::<Value>(value) {
                        for (key, value) in patch {
                            if value.is_null() {
                                widget.extra_data.remove(&key);
                            } else {
                                widget.extra_data.insert(key, value);
                            }
                        }
                    }
                }
                other => {
                    if let Some(key) = other.strip_prefix("extra_data.") {
                        widget
                            .extra_data
                            .insert(key.to_string(), Value::String(value.clone()));
                    }
                }
            }
        }

        Some(widget)
    }

    pub fn delete_widget(&mut self, id: u64) -> Option<Widget> {
        self.widgets.remove(&id)
    }
}
