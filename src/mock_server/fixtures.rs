//! Test data fixtures for the mock server.
//!
//! Provides factory functions for creating realistic test data.

use serde_json::{Map, Value};

use super::state::Widget;

/// Content type of the API root.
pub const ROOT_MIME_TYPE: &str = "application/vnd.example.root+json";
/// Content type of widget lists.
pub const WIDGETS_MIME_TYPE: &str = "application/vnd.example.widgets+json";
/// Content type of a single widget.
pub const WIDGET_MIME_TYPE: &str = "application/vnd.example.widget+json";

/// Collection of fixture factories for test data.
pub struct Fixtures;

/// The data a default mock server starts with.
pub struct DefaultScenario {
    pub widgets: Vec<Widget>,
}

impl Fixtures {
    /// Create a widget without extra data.
    pub fn widget(id: u64, name: &str, color: &str) -> Widget {
        Widget {
            id,
            name: name.to_string(),
            color: color.to_string(),
            extra_data: Map::new(),
        }
    }

    /// Create a widget carrying extra data.
    pub fn widget_with_extra_data(id: u64, name: &str, color: &str, extra_data: Value) -> Widget {
        let mut widget = Self::widget(id, name, color);
        if let Value::Object(map) = extra_data {
            widget.extra_data = map;
        }
        widget
    }

    /// Five widgets in three colors.
    pub fn default_scenario() -> DefaultScenario {
        DefaultScenario {
            widgets: vec![
                Self::widget(1, "sprocket", "red"),
                Self::widget(2, "gear", "blue"),
                Self::widget(3, "cog", "red"),
                Self::widget(4, "flange", "green"),
                Self::widget_with_extra_data(
                    5,
                    "ratchet",
                    "blue",
                    serde_json::json!({"size": "large"}),
                ),
            ],
        }
    }
}
