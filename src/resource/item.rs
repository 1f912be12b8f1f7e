//! Item resources and their save/delete lifecycle.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{HyperApiError, ResourceModelError, Result};
use crate::request::{FieldData, HttpRequest, QueryArgs};
use crate::traits::PatchableItem;

use super::{HyperResource, ResourceCore};

/// Lifecycle of an item.
///
/// Items fetched from the server start out `Saved`. Items created with
/// [`ListResource::new_item`](super::ListResource::new_item) start `Unsaved`
/// until their first successful [`save`](ItemResource::save). `Deleted` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Unsaved,
    Saved,
    Deleted,
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unsaved => "unsaved",
            Self::Saved => "saved",
            Self::Deleted => "deleted",
        })
    }
}

/// A single domain object.
#[derive(Debug, Clone)]
pub struct ItemResource {
    core: ResourceCore,
    state: ItemState,
    staged: FieldData,
    create_href: Option<String>,
}

impl ItemResource {
    pub(crate) fn new(core: ResourceCore) -> Self {
        Self {
            core,
            state: ItemState::Saved,
            staged: FieldData::new(),
            create_href: None,
        }
    }

    /// An item that will be POSTed to `create_href` on first save.
    pub(crate) fn unsaved(core: ResourceCore, create_href: String) -> Self {
        Self {
            core,
            state: ItemState::Unsaved,
            staged: FieldData::new(),
            create_href: Some(create_href),
        }
    }

    pub(crate) fn into_core(self) -> ResourceCore {
        self.core
    }

    pub(crate) fn core_mut(&mut self) -> &mut ResourceCore {
        &mut self.core
    }

    pub fn state(&self) -> ItemState {
        self.state
    }

    pub fn is_deleted(&self) -> bool {
        self.state == ItemState::Deleted
    }

    /// Record a value to send on the next [`save`](Self::save).
    pub fn stage(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.ensure_live()?;
        self.staged.insert(name, value);
        Ok(())
    }

    /// Record several values at once.
    pub fn stage_all(&mut self, data: FieldData) -> Result<()> {
        self.ensure_live()?;
        self.staged.merge(data);
        Ok(())
    }

    pub fn staged(&self) -> &FieldData {
        &self.staged
    }

    /// Build the request [`save`](Self::save) would send.
    ///
    /// Unsaved items POST to the list's `create` link; saved items PUT to
    /// their `update` link.
    pub fn prepare_save(&self, query: &QueryArgs) -> Result<HttpRequest> {
        let mut request = match (self.state, &self.create_href) {
            (ItemState::Unsaved, Some(href)) => {
                HttpRequest::new(href, reqwest::Method::POST, query)
            }
            (ItemState::Saved, _) => self.core.prepare_action("update", query)?,
            (state, _) => {
                return Err(ResourceModelError::InvalidState {
                    action: "save",
                    state: state.to_string(),
                }
                .into())
            }
        };

        self.staged.apply_to(&mut request);
        Ok(request)
    }

    /// Send staged values to the server.
    ///
    /// On success the item takes the server's representation, its URL is
    /// rebound to the returned `self` link and the state becomes `Saved`.
    /// On failure nothing changes.
    pub async fn save(&mut self) -> Result<()> {
        let request = self.prepare_save(&QueryArgs::new())?;
        tracing::debug!(url = request.url(), state = %self.state, "Saving item");

        let saved = self.core.execute_expecting(request).await?;

        let mut core = saved.into_core();
        if let Some(err) = HyperApiError::from_failed_stat(200, core.payload()) {
            return Err(err);
        }
        core.rebind_to_self();

        self.core = core;
        self.state = ItemState::Saved;
        self.staged.clear();
        self.create_href = None;
        Ok(())
    }

    /// Delete the item on the server. Only saved items can be deleted.
    pub async fn delete(&mut self) -> Result<()> {
        if self.state != ItemState::Saved {
            return Err(ResourceModelError::InvalidState {
                action: "delete",
                state: self.state.to_string(),
            }
            .into());
        }

        let request = self.core.prepare_action("delete", &QueryArgs::new())?;
        self.core.execute(request).await?;
        self.state = ItemState::Deleted;
        Ok(())
    }

    /// A view for downloading this item as a patch, when its class supports it.
    pub fn as_patchable(&self) -> Option<PatchableItem<'_>> {
        self.core
            .class()
            .filter(|class| class.features.patch)
            .map(|_| PatchableItem::new(self))
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_deleted() {
            return Err(ResourceModelError::Deleted.into());
        }
        Ok(())
    }
}

#[async_trait]
impl HyperResource for ItemResource {
    fn core(&self) -> &ResourceCore {
        &self.core
    }

    fn check_live(&self) -> Result<()> {
        self.ensure_live()
    }
}
