//! List resources and pagination.

use std::fmt::Display;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{HyperApiError, ResourceModelError, Result};
use crate::factory::{json_type_name, CreateOptions};
use crate::request::{HttpRequest, QueryArgs};
use crate::traits::{AttachmentList, DiffList};

use super::{HyperResource, ItemResource, Resource, ResourceCore};

/// Maximum pages walked by [`Pages`] and [`Items`] (safety limit).
pub const MAX_PAGES: u32 = 1000;

/// One page of a collection.
///
/// Items are built lazily from the page payload; indexing and iterating
/// never touch the network.
#[derive(Debug, Clone)]
pub struct ListResource {
    core: ResourceCore,
    item_mime_type: Option<String>,
    len: usize,
    total_results: Option<u64>,
}

impl ListResource {
    pub(crate) fn new(core: ResourceCore, item_mime_type: Option<String>) -> Result<Self> {
        let len = match core.token().and_then(|token| core.payload().get(token)) {
            Some(Value::Array(items)) => items.len(),
            other => {
                return Err(ResourceModelError::MalformedPayload(format!(
                    "list items at {} must be an array, got {}",
                    core.url(),
                    other.map_or("nothing", json_type_name)
                ))
                .into())
            }
        };

        let total_results = core.payload().get("total_results").and_then(Value::as_u64);

        Ok(Self {
            core,
            item_mime_type,
            len,
            total_results,
        })
    }

    pub(crate) fn into_core(self) -> ResourceCore {
        self.core
    }

    pub(crate) fn core_mut(&mut self) -> &mut ResourceCore {
        &mut self.core
    }

    /// Number of items on this page.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of items across all pages, when the server reports it.
    pub fn total_results(&self) -> Option<u64> {
        self.total_results
    }

    pub fn item_mime_type(&self) -> Option<&str> {
        self.item_mime_type.as_deref()
    }

    fn raw_items(&self) -> &[Value] {
        self.core
            .token()
            .and_then(|token| self.core.payload().get(token))
            .and_then(Value::as_array)
            .map_or(&[], Vec::as_slice)
    }

    /// The item at `index` on this page, or `None` when out of range.
    pub fn get(&self, index: usize) -> Result<Option<Resource>> {
        self.raw_items()
            .get(index)
            .map(|item| self.build_item(item))
            .transpose()
    }

    /// Iterate over the items on this page.
    pub fn iter(&self) -> impl Iterator<Item = Result<Resource>> + '_ {
        self.raw_items().iter().map(|item| self.build_item(item))
    }

    fn build_item(&self, payload: &Value) -> Result<Resource> {
        let url = payload
            .pointer("/links/self/href")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let mut options = CreateOptions::new().guess_token(false);
        options.mime_type = self.item_mime_type.clone();

        let transport = self.core.transport();
        transport
            .factory()
            .create(transport.clone(), payload.clone(), url, &options)
    }

    /// Request for the next page.
    ///
    /// Fails with [`HyperApiError::EndOfSequence`] on the last page.
    pub fn prepare_next(&self, query: &QueryArgs) -> Result<HttpRequest> {
        self.core
            .action("next")
            .map(|action| action.prepare(query))
            .ok_or(HyperApiError::EndOfSequence)
    }

    /// Request for the previous page.
    ///
    /// Fails with [`HyperApiError::EndOfSequence`] on the first page.
    pub fn prepare_prev(&self, query: &QueryArgs) -> Result<HttpRequest> {
        self.core
            .action("prev")
            .map(|action| action.prepare(query))
            .ok_or(HyperApiError::EndOfSequence)
    }

    pub async fn get_next(&self, query: &QueryArgs) -> Result<ListResource> {
        let request = self.prepare_next(query)?;
        self.core.execute_expecting(request).await?.into_list()
    }

    pub async fn get_prev(&self, query: &QueryArgs) -> Result<ListResource> {
        let request = self.prepare_prev(query)?;
        self.core.execute_expecting(request).await?.into_list()
    }

    /// Request for the item with primary key `pk` (`<list url><pk>/`).
    pub fn prepare_get_item(&self, pk: impl Display, query: &QueryArgs) -> HttpRequest {
        let base = self.core.url();
        let base = base.split(['?', '#']).next().unwrap_or(base);
        let url = if base.ends_with('/') {
            format!("{base}{pk}/")
        } else {
            format!("{base}/{pk}/")
        };

        HttpRequest::get(&url, query)
    }

    pub async fn get_item(&self, pk: impl Display + Send, query: &QueryArgs) -> Result<Resource> {
        let request = self.prepare_get_item(pk, query);
        self.core.execute_expecting(request).await
    }

    /// A new, unsaved item bound to this list's `create` link.
    pub fn new_item(&self) -> Result<ItemResource> {
        let href = self
            .core
            .action("create")
            .map(|action| action.href.clone())
            .ok_or_else(|| self.core.unknown_link("create"))?;

        let transport = self.core.transport();
        let class = self
            .item_mime_type
            .as_deref()
            .and_then(|mime_type| transport.factory().registry().lookup(mime_type))
            .cloned();

        let core = ResourceCore::new(
            transport.clone(),
            Value::Object(Map::new()),
            "",
            None,
            self.item_mime_type.clone(),
            class,
        );

        Ok(ItemResource::unsaved(core, href))
    }

    /// Every page, starting from this one.
    pub fn all_pages(&self) -> Pages {
        Pages::new(self.clone())
    }

    /// Every item on every page, in server order.
    pub fn all_items(&self) -> Items {
        Items {
            pages: self.all_pages(),
            page: None,
            index: 0,
        }
    }

    /// A view for uploading diffs, when this list's class supports it.
    pub fn as_diff_list(&self) -> Option<DiffList<'_>> {
        self.core
            .class()
            .filter(|class| class.features.diffs)
            .map(|_| DiffList::new(self))
    }

    /// A view for uploading file attachments, when this list's class supports it.
    pub fn as_attachment_list(&self) -> Option<AttachmentList<'_>> {
        self.core
            .class()
            .filter(|class| class.features.attachments)
            .map(|_| AttachmentList::new(self))
    }
}

#[async_trait]
impl HyperResource for ListResource {
    fn core(&self) -> &ResourceCore {
        &self.core
    }
}

/// Lazy cursor over every page of a list.
///
/// Pages are fetched one at a time as [`next`](Self::next) is awaited.
/// [`restart`](Self::restart) starts over from the first page without
/// refetching it.
#[derive(Debug, Clone)]
pub struct Pages {
    first: ListResource,
    last: Option<ListResource>,
    started: bool,
    fetched: u32,
}

impl Pages {
    fn new(first: ListResource) -> Self {
        Self {
            first,
            last: None,
            started: false,
            fetched: 0,
        }
    }

    /// The next page, or `None` after the last one.
    pub async fn next(&mut self) -> Result<Option<ListResource>> {
        if !self.started {
            self.started = true;
            self.fetched = 1;
            self.last = Some(self.first.clone());
            return Ok(self.last.clone());
        }

        let Some(last) = self.last.take() else {
            return Ok(None);
        };

        if self.fetched >= MAX_PAGES {
            tracing::warn!("Reached pagination limit of {} pages, stopping", MAX_PAGES);
            return Ok(None);
        }

        match last.get_next(&QueryArgs::new()).await {
            Ok(page) => {
                self.fetched += 1;
                self.last = Some(page.clone());
                Ok(Some(page))
            }
            Err(HyperApiError::EndOfSequence) => Ok(None),
            Err(err) => {
                // Keep the position so the caller may retry.
                self.last = Some(last);
                Err(err)
            }
        }
    }

    /// Start again from the first page.
    pub fn restart(&mut self) {
        self.last = None;
        self.started = false;
        self.fetched = 0;
    }

    /// Fetch every remaining page.
    pub async fn collect_all(mut self) -> Result<Vec<ListResource>> {
        let mut pages = Vec::new();
        while let Some(page) = self.next().await? {
            pages.push(page);
        }
        Ok(pages)
    }
}

/// Lazy cursor over every item on every page of a list.
#[derive(Debug, Clone)]
pub struct Items {
    pages: Pages,
    page: Option<ListResource>,
    index: usize,
}

impl Items {
    /// The next item, or `None` after the last one.
    pub async fn next(&mut self) -> Result<Option<Resource>> {
        loop {
            if let Some(page) = &self.page {
                if self.index < page.len() {
                    let item = page.get(self.index);
                    // A broken item is reported once, then skipped.
                    self.index += 1;
                    if let Some(item) = item? {
                        return Ok(Some(item));
                    }
                }
            }

            match self.pages.next().await? {
                Some(page) => {
                    self.page = Some(page);
                    self.index = 0;
                }
                None => {
                    self.page = None;
                    return Ok(None);
                }
            }
        }
    }

    /// Start again from the first item.
    pub fn restart(&mut self) {
        self.pages.restart();
        self.page = None;
        self.index = 0;
    }

    /// Fetch every remaining item.
    pub async fn collect_all(mut self) -> Result<Vec<Resource>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }
}
