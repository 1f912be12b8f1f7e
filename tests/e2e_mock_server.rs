//! End-to-end tests against the mock hypermedia server.
//!
//! Run with `cargo test --features test-server`.

#![cfg(feature = "test-server")]

use std::collections::BTreeMap;

use hyperapi::mock_server::{Fixtures, MockServer, MockState};
use hyperapi::{
    ApiClient, CacheConfig, HyperApiError, HyperResource, ItemState, QueryArgs, ResourceModelError,
    TransportConfig,
};
use serde_json::Value;
use tempfile::TempDir;

fn config(dir: &TempDir) -> TransportConfig {
    TransportConfig {
        cookie_file: Some(dir.path().join("cookies.txt")),
        cache: CacheConfig {
            in_memory_cache: true,
            ..CacheConfig::default()
        },
        ..TransportConfig::default()
    }
}

fn client(server: &MockServer, dir: &TempDir) -> ApiClient {
    ApiClient::new(server.url(), config(dir)).unwrap()
}

fn names(resources: &[hyperapi::Resource]) -> Vec<String> {
    resources
        .iter()
        .map(|r| r.value("name").unwrap().as_str().unwrap().to_string())
        .collect()
}

// ============================================================================
// Root and templates
// ============================================================================

#[tokio::test]
async fn test_root_advertises_templates_and_capabilities() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let root = client(&server, &dir).get_root().await.unwrap();

    let mut templates: Vec<&str> = root.template_names().collect();
    templates.sort_unstable();
    assert_eq!(templates, vec!["widget", "widgets"]);
    assert!(hyperapi::web_login_supported(
        root.product_version(),
        &root.capabilities()
    ));

    server.shutdown().await;
}

#[tokio::test]
async fn test_get_template_fills_placeholders() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let root = client(&server, &dir).get_root().await.unwrap();

    let widget = root
        .get_template("widget", &QueryArgs::new().arg("widget_id", 3), &BTreeMap::new())
        .await
        .unwrap()
        .into_item()
        .unwrap();

    assert_eq!(widget.value("name").unwrap(), "cog");
    assert!(widget.url().ends_with("/api/widgets/3/"));

    let missing = root
        .get_template("widget", &QueryArgs::new(), &BTreeMap::new())
        .await;
    assert!(matches!(
        missing,
        Err(HyperApiError::ResourceModel(
            ResourceModelError::MissingTemplateValue { .. }
        ))
    ));

    server.shutdown().await;
}

// ============================================================================
// Lists
// ============================================================================

#[tokio::test]
async fn test_all_items_walks_every_page() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let client = client(&server, &dir);

    let first = client
        .get_path("widgets", &QueryArgs::new().arg("max-results", 2))
        .await
        .unwrap()
        .into_list()
        .unwrap();

    assert_eq!(first.len(), 2);
    assert_eq!(first.total_results(), Some(5));
    assert!(first.has_action("next"));
    assert!(!first.has_action("prev"));

    let items = first.all_items().collect_all().await.unwrap();
    assert_eq!(names(&items), ["sprocket", "gear", "cog", "flange", "ratchet"]);

    let pages = first.all_pages().collect_all().await.unwrap();
    assert_eq!(pages.len(), 3);
    assert!(pages[2].get_next(&QueryArgs::new()).await.unwrap_err().is_end_of_sequence());

    server.shutdown().await;
}

#[tokio::test]
async fn test_next_and_prev_pages() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let client = client(&server, &dir);

    let first = client
        .get_path("widgets", &QueryArgs::new().arg("max-results", 2))
        .await
        .unwrap()
        .into_list()
        .unwrap();

    let second = first.get_next(&QueryArgs::new()).await.unwrap();
    let second_items: Vec<_> = second.iter().collect::<hyperapi::Result<_>>().unwrap();
    assert_eq!(names(&second_items), ["cog", "flange"]);

    let back = second.get_prev(&QueryArgs::new()).await.unwrap();
    assert_eq!(back.get(0).unwrap().unwrap().value("name").unwrap(), "sprocket");

    server.shutdown().await;
}

#[tokio::test]
async fn test_counts_only_and_back_to_list() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let client = client(&server, &dir);

    let count = client
        .get_path(
            "widgets",
            &QueryArgs::new().arg("counts-only", 1).arg("color", "red"),
        )
        .await
        .unwrap()
        .into_count()
        .unwrap();

    assert_eq!(count.count(), 2);

    let list = count
        .get_self(&QueryArgs::new())
        .await
        .unwrap()
        .into_list()
        .unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list.total_results(), Some(2));

    server.shutdown().await;
}

#[tokio::test]
async fn test_get_item_by_primary_key() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let client = client(&server, &dir);

    let list = client
        .get_path("widgets", &QueryArgs::new())
        .await
        .unwrap()
        .into_list()
        .unwrap();

    let widget = list.get_item(5, &QueryArgs::new()).await.unwrap();
    let extra = widget.field("extra_data").unwrap();
    let extra = extra.as_extra_data().unwrap();
    assert_eq!(extra.get("size").unwrap().as_str(), Some("large"));

    server.shutdown().await;
}

// ============================================================================
// Item lifecycle
// ============================================================================

#[tokio::test]
async fn test_new_item_is_created_on_save() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let client = client(&server, &dir);

    let list = client
        .get_path("widgets", &QueryArgs::new())
        .await
        .unwrap()
        .into_list()
        .unwrap();

    let mut widget = list.new_item().unwrap();
    assert_eq!(widget.state(), ItemState::Unsaved);

    widget.stage("name", "bolt").unwrap();
    widget.stage("color", "black").unwrap();
    widget.save().await.unwrap();

    assert_eq!(widget.state(), ItemState::Saved);
    assert_eq!(widget.value("id").unwrap(), 6);
    assert!(widget.url().ends_with("/api/widgets/6/"));
    assert!(widget.staged().is_empty());

    let state = server.state();
    let state = state.read().await;
    assert_eq!(state.get_widget(6).unwrap().color, "black");
    drop(state);

    server.shutdown().await;
}

#[tokio::test]
async fn test_save_updates_item_and_server() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let client = client(&server, &dir);

    let mut widget = client
        .get_path("widgets/2", &QueryArgs::new())
        .await
        .unwrap()
        .into_item()
        .unwrap();

    widget.stage("color", "purple").unwrap();
    widget.stage("extra_data.size", "small").unwrap();
    widget.save().await.unwrap();

    assert_eq!(widget.value("color").unwrap(), "purple");
    assert_eq!(
        widget.value("extra_data").unwrap().get("size"),
        Some(&Value::from("small"))
    );

    let state = server.state();
    let state = state.read().await;
    assert_eq!(state.get_widget(2).unwrap().color, "purple");
    drop(state);

    server.shutdown().await;
}

#[tokio::test]
async fn test_failed_save_leaves_item_unchanged() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let client = client(&server, &dir);

    let mut widget = client
        .get_path("widgets/2", &QueryArgs::new())
        .await
        .unwrap()
        .into_item()
        .unwrap();

    widget.stage("color", "").unwrap();
    let err = widget.save().await.unwrap_err();

    assert_eq!(err.http_status(), Some(400));
    assert_eq!(err.error_code(), Some(105));
    assert_eq!(widget.state(), ItemState::Saved);
    assert_eq!(widget.value("color").unwrap(), "blue");

    server.shutdown().await;
}

#[tokio::test]
async fn test_delete_removes_item() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let client = client(&server, &dir);

    let mut widget = client
        .get_path("widgets/4", &QueryArgs::new())
        .await
        .unwrap()
        .into_item()
        .unwrap();

    widget.delete().await.unwrap();

    assert!(widget.is_deleted());
    assert!(widget.value("name").is_err());
    assert!(widget.stage("name", "ghost").is_err());
    assert!(server.state().read().await.get_widget(4).is_none());

    let gone = client.get_path("widgets/4", &QueryArgs::new()).await;
    assert_eq!(gone.unwrap_err().http_status(), Some(404));

    server.shutdown().await;
}

// ============================================================================
// Transport behavior
// ============================================================================

#[tokio::test]
async fn test_etag_revalidation_uses_cached_body() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let client = client(&server, &dir);

    let first = client.get_path("widgets/1", &QueryArgs::new()).await.unwrap();
    let second = client.get_path("widgets/1", &QueryArgs::new()).await.unwrap();

    assert_eq!(first.value("name").unwrap(), second.value("name").unwrap());
    assert_eq!(server.state().read().await.not_modified_count, 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_required_token() {
    let state = MockState::new()
        .with_widget(Fixtures::widget(1, "sprocket", "red"))
        .with_required_token("s3cr3t");
    let server = MockServer::with_state(state).await;
    let dir = TempDir::new().unwrap();

    let anonymous = client(&server, &dir);
    let err = anonymous.get_root().await.unwrap_err();
    assert!(err.is_unauthorized());

    let authorized = ApiClient::new(
        server.url(),
        TransportConfig {
            api_token: Some("s3cr3t".to_string()),
            ..config(&dir)
        },
    )
    .unwrap();
    let widget = authorized
        .get_path("widgets/1", &QueryArgs::new())
        .await
        .unwrap();
    assert_eq!(widget.value("name").unwrap(), "sprocket");

    server.shutdown().await;
}
