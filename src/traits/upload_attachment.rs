//! UploadAttachment trait for posting file attachments to a list.

use async_trait::async_trait;
use reqwest::Method;

use crate::error::Result;
use crate::request::{HttpRequest, QueryArgs};
use crate::resource::{HyperResource, ListResource, Resource, ResourceCore};

/// A file to attach.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentUpload {
    pub filename: String,
    pub content: Vec<u8>,
    pub caption: Option<String>,
    /// Existing attachment history this file is a new revision of.
    pub attachment_history: Option<String>,
}

impl AttachmentUpload {
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    #[must_use]
    pub fn attachment_history(mut self, history: impl Into<String>) -> Self {
        self.attachment_history = Some(history.into());
        self
    }
}

/// Upload a file attachment to a list resource.
#[async_trait]
pub trait UploadAttachment: Send + Sync {
    /// The list the file is posted to.
    fn upload_target(&self) -> &ResourceCore;

    /// Build the multipart POST for an upload.
    fn prepare_upload_attachment(
        &self,
        upload: &AttachmentUpload,
        query: &QueryArgs,
    ) -> HttpRequest {
        let mut request = HttpRequest::new(self.upload_target().url(), Method::POST, query);
        request.add_file("path", &upload.filename, upload.content.clone());

        if let Some(caption) = &upload.caption {
            request.add_field("caption", caption.clone());
        }

        if let Some(history) = &upload.attachment_history {
            request.add_field("attachment_history", history.clone());
        }

        request
    }

    /// Upload the file and return the created attachment.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the file or the request fails.
    async fn upload_attachment(
        &self,
        upload: &AttachmentUpload,
        query: &QueryArgs,
    ) -> Result<Resource> {
        let request = self.prepare_upload_attachment(upload, query);
        self.upload_target().execute_expecting(request).await
    }
}

/// A list whose class accepts file attachments.
#[derive(Debug, Clone, Copy)]
pub struct AttachmentList<'a> {
    list: &'a ListResource,
}

impl<'a> AttachmentList<'a> {
    pub(crate) fn new(list: &'a ListResource) -> Self {
        Self { list }
    }

    pub fn list(&self) -> &'a ListResource {
        self.list
    }
}

impl UploadAttachment for AttachmentList<'_> {
    fn upload_target(&self) -> &ResourceCore {
        self.list.core()
    }
}
