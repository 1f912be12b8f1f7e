//! Output formatting for CLI display.
//!
//! Provides the [`PrettyPrint`] trait for human-readable output
//! as an alternative to JSON serialization, and table rows for `tabled`.

use serde_json::Value;
use tabled::{Table, Tabled};

use crate::error::Result;
use crate::resource::{
    CountResource, HyperResource, ItemResource, ListResource, Resource, RootResource,
};

const MAX_VALUE_WIDTH: usize = 60;

/// Fields tried, in order, for the one-line summary of a list item.
const SUMMARY_FIELDS: [&str; 5] = ["name", "title", "summary", "display_name", "username"];

/// Trait for human-readable key-value output.
///
/// Implemented by resource types to provide formatted output
/// suitable for terminal display when `--json` is not specified.
pub trait PrettyPrint {
    /// Returns a formatted string for terminal display.
    fn pretty_print(&self) -> String;
}

fn header(kind: &str, resource: &dyn HyperResource) -> Vec<String> {
    let title = format!("{kind}: {}", resource.core().describe());
    let divider = "─".repeat(title.len().max(30));
    let mut lines = vec![title, divider];

    if !resource.url().is_empty() {
        lines.push(format!("URL:            {}", resource.url()));
    }
    if let Some(mime) = resource.core().mime_type() {
        lines.push(format!("Content Type:   {mime}"));
    }
    lines
}

fn links_line(resource: &dyn HyperResource) -> Option<String> {
    let mut rels: Vec<&str> = resource
        .core()
        .actions()
        .map(|action| action.relation.name())
        .collect();
    if rels.is_empty() {
        return None;
    }
    rels.sort_unstable();
    Some(format!("Links:          {}", rels.join(", ")))
}

impl PrettyPrint for ItemResource {
    fn pretty_print(&self) -> String {
        let mut lines = header("Item", self);
        lines.push(format!("State:          {}", self.state()));
        if !self.is_deleted() {
            lines.push(format!("Fields:         {}", self.field_names().len()));
        }
        lines.extend(links_line(self));
        lines.join("\n")
    }
}

impl PrettyPrint for ListResource {
    fn pretty_print(&self) -> String {
        let mut lines = header("List", self);
        match self.total_results() {
            Some(total) => lines.push(format!("Items:          {} of {total}", self.len())),
            None => lines.push(format!("Items:          {}", self.len())),
        }
        if let Some(mime) = self.item_mime_type() {
            lines.push(format!("Item Type:      {mime}"));
        }
        lines.extend(links_line(self));
        lines.join("\n")
    }
}

impl PrettyPrint for CountResource {
    fn pretty_print(&self) -> String {
        let mut lines = header("Count", self);
        lines.push(format!("Count:          {}", self.count()));
        lines.join("\n")
    }
}

impl PrettyPrint for RootResource {
    fn pretty_print(&self) -> String {
        let mut lines = header("Root", self);
        if let Some(version) = self.product_version() {
            lines.push(format!("Version:        {version}"));
        }
        lines.push(format!(
            "Templates:      {}",
            self.template_names().count()
        ));
        lines.extend(links_line(self));
        lines.join("\n")
    }
}

impl PrettyPrint for Resource {
    fn pretty_print(&self) -> String {
        match self {
            Self::Item(item) => item.pretty_print(),
            Self::List(list) => list.pretty_print(),
            Self::Count(count) => count.pretty_print(),
            Self::Root(root) => root.pretty_print(),
        }
    }
}

/// One field of a resource.
#[derive(Debug, Tabled)]
pub struct FieldRow {
    pub field: String,
    pub value: String,
}

/// One item of a list page.
#[derive(Debug, Tabled)]
pub struct ItemRow {
    pub id: String,
    pub summary: String,
    pub url: String,
}

/// Render a value for a table cell.
pub fn display_value(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };

    if text.chars().count() > MAX_VALUE_WIDTH {
        let truncated: String = text.chars().take(MAX_VALUE_WIDTH - 1).collect();
        format!("{truncated}…")
    } else {
        text
    }
}

pub fn field_rows(resource: &dyn HyperResource) -> Vec<FieldRow> {
    let mut names = resource.field_names();
    names.sort_unstable();

    names
        .into_iter()
        .filter_map(|name| {
            let value = resource.value(name).ok()?;
            Some(FieldRow {
                field: name.to_string(),
                value: display_value(value),
            })
        })
        .collect()
}

pub fn item_row(item: &Resource) -> ItemRow {
    let id = item.value("id").map(display_value).unwrap_or_default();
    let summary = SUMMARY_FIELDS
        .iter()
        .find_map(|name| item.value(name).ok())
        .map(display_value)
        .unwrap_or_default();

    ItemRow {
        id,
        summary,
        url: item.url().to_string(),
    }
}

pub fn item_rows(list: &ListResource) -> Result<Vec<ItemRow>> {
    list.iter().map(|item| Ok(item_row(&item?))).collect()
}

/// A table of the resource's fields, or of its items for lists.
pub fn resource_table(resource: &Resource) -> Result<Table> {
    Ok(match resource {
        Resource::List(list) => Table::new(item_rows(list)?),
        other => Table::new(field_rows(other)),
    })
}
