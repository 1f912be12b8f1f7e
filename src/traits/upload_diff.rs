//! UploadDiff trait for posting diffs to a list.

use async_trait::async_trait;
use reqwest::Method;

use crate::error::Result;
use crate::request::{HttpRequest, QueryArgs};
use crate::resource::{HyperResource, ListResource, Resource, ResourceCore};

/// A diff to upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffUpload {
    pub diff: Vec<u8>,
    pub parent_diff: Option<Vec<u8>>,
    pub base_dir: Option<String>,
    pub base_commit_id: Option<String>,
}

impl DiffUpload {
    pub fn new(diff: impl Into<Vec<u8>>) -> Self {
        Self {
            diff: diff.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn parent_diff(mut self, parent_diff: impl Into<Vec<u8>>) -> Self {
        self.parent_diff = Some(parent_diff.into());
        self
    }

    #[must_use]
    pub fn base_dir(mut self, base_dir: impl Into<String>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    #[must_use]
    pub fn base_commit_id(mut self, base_commit_id: impl Into<String>) -> Self {
        self.base_commit_id = Some(base_commit_id.into());
        self
    }
}

/// Upload a diff to a list resource.
#[async_trait]
pub trait UploadDiff: Send + Sync {
    /// The list the diff is posted to.
    fn upload_target(&self) -> &ResourceCore;

    /// Build the multipart POST for an upload.
    fn prepare_upload_diff(&self, upload: &DiffUpload, query: &QueryArgs) -> HttpRequest {
        let mut request = HttpRequest::new(self.upload_target().url(), Method::POST, query);
        request.add_file("path", "diff", upload.diff.clone());

        if let Some(parent_diff) = &upload.parent_diff {
            request.add_file("parent_diff_path", "parent_diff", parent_diff.clone());
        }

        if let Some(base_dir) = &upload.base_dir {
            request.add_field("basedir", base_dir.clone());
        }

        if let Some(base_commit_id) = &upload.base_commit_id {
            request.add_field("base_commit_id", base_commit_id.clone());
        }

        request
    }

    /// Upload the diff and return the created resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the diff or the request fails.
    async fn upload_diff(&self, upload: &DiffUpload, query: &QueryArgs) -> Result<Resource> {
        let request = self.prepare_upload_diff(upload, query);
        self.upload_target().execute_expecting(request).await
    }
}

/// A list whose class accepts diff uploads.
#[derive(Debug, Clone, Copy)]
pub struct DiffList<'a> {
    list: &'a ListResource,
}

impl<'a> DiffList<'a> {
    pub(crate) fn new(list: &'a ListResource) -> Self {
        Self { list }
    }

    pub fn list(&self) -> &'a ListResource {
        self.list
    }
}

impl UploadDiff for DiffList<'_> {
    fn upload_target(&self) -> &ResourceCore {
        self.list.core()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::{
        CreateOptions, ResourceClass, ResourceFactory, ResourceFeatures, ResourceRegistry,
    };
    use crate::transport::{ReplayTransport, Transport};
    use serde_json::json;

    const DIFFS_MIME: &str = "application/vnd.example.org.diffs+json";

    fn diffs(transport: &ReplayTransport) -> ListResource {
        transport
            .factory()
            .create(
                transport.handle(),
                json!({"diffs": [], "links": {}, "stat": "ok"}),
                "/api/changes/3/diffs/",
                &CreateOptions::new().mime_type(DIFFS_MIME),
            )
            .unwrap()
            .into_list()
            .unwrap()
    }

    fn factory() -> ResourceFactory {
        ResourceFactory::new(ResourceRegistry::new().with(
            DIFFS_MIME,
            ResourceClass::list().with_features(ResourceFeatures {
                diffs: true,
                ..ResourceFeatures::default()
            }),
        ))
    }

    #[test]
    fn test_upload_request() {
        let transport = ReplayTransport::new(factory());
        let diffs = diffs(&transport);
        let upload = DiffUpload::new(b"--- a\n+++ b\n".to_vec())
            .parent_diff(b"parent".to_vec())
            .base_dir("/trunk")
            .base_commit_id("abc123");

        let request = diffs
            .as_diff_list()
            .unwrap()
            .prepare_upload_diff(&upload, &QueryArgs::new());

        assert_eq!(request.method(), &Method::POST);
        assert_eq!(request.url(), "/api/changes/3/diffs/");
        assert_eq!(request.files()["path"].filename, "diff");
        assert_eq!(request.files()["parent_diff_path"].content, b"parent");
        assert_eq!(request.fields()["basedir"], "/trunk");
        assert_eq!(request.fields()["base_commit_id"], "abc123");
        assert!(diffs.as_attachment_list().is_none());
    }

    #[test]
    fn test_minimal_upload_has_only_the_diff() {
        let transport = ReplayTransport::new(factory());
        let diffs = diffs(&transport);
        let request = diffs
            .as_diff_list()
            .unwrap()
            .prepare_upload_diff(&DiffUpload::new("diff"), &QueryArgs::new());

        assert_eq!(request.files().len(), 1);
        assert!(request.fields().is_empty());
    }
}
