//! GetPatch trait for downloading items as patches.

use async_trait::async_trait;

use crate::error::Result;
use crate::request::{HttpRequest, QueryArgs};
use crate::resource::{HyperResource, ItemResource, Resource, ResourceCore};

/// Download a resource as a patch.
///
/// The response is decoded as `text/x-patch`, so the returned resource has
/// the patch text in its `diff` field.
///
/// # Example
///
/// ```ignore
/// use hyperapi::{GetPatch, HyperResource, QueryArgs};
///
/// if let Some(patchable) = diff.as_patchable() {
///     let patch = patchable.get_patch(&QueryArgs::new()).await?;
///     println!("{}", patch.value("diff")?);
/// }
/// ```
#[async_trait]
pub trait GetPatch: Send + Sync {
    /// The resource the patch is fetched for.
    fn patch_source(&self) -> &ResourceCore;

    /// Build the patch request.
    fn prepare_get_patch(&self, query: &QueryArgs) -> HttpRequest {
        HttpRequest::get(self.patch_source().url(), query).with_header("Accept", "text/x-patch")
    }

    /// Fetch the patch.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    async fn get_patch(&self, query: &QueryArgs) -> Result<Resource> {
        let request = self.prepare_get_patch(query);
        self.patch_source().execute_expecting(request).await
    }
}

/// An item whose class supports patch downloads.
#[derive(Debug, Clone, Copy)]
pub struct PatchableItem<'a> {
    item: &'a ItemResource,
}

impl<'a> PatchableItem<'a> {
    pub(crate) fn new(item: &'a ItemResource) -> Self {
        Self { item }
    }

    pub fn item(&self) -> &'a ItemResource {
        self.item
    }
}

impl GetPatch for PatchableItem<'_> {
    fn patch_source(&self) -> &ResourceCore {
        self.item.core()
    }
}
