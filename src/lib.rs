//! Hypermedia API client library.
//!
//! A Rust engine for consuming hypermedia (HATEOAS) JSON REST APIs. Server
//! payloads become [`Resource`]s exposing typed fields, link-derived actions
//! and pagination, while an [`HttpTransport`] performs the authenticated,
//! cached HTTP exchanges.
//!
//! # Quick Start
//!
//! ```no_run
//! use hyperapi::{ApiClient, HyperResource, QueryArgs};
//!
//! #[tokio::main]
//! async fn main() -> hyperapi::Result<()> {
//!     // Create client from environment variables
//!     let client = ApiClient::from_env()?;
//!
//!     // Everything is reachable from the root
//!     let root = client.get_root().await?;
//!     println!("Server version: {:?}", root.product_version());
//!
//!     // Walk every page of a list
//!     let widgets = client.get_path("widgets", &QueryArgs::new()).await?.into_list()?;
//!     let items = widgets.all_items().collect_all().await?;
//!     println!("Found {} widgets", items.len());
//!
//!     // Follow links
//!     if let Some(widget) = items.first() {
//!         let owner = widget.invoke("owner", &QueryArgs::new()).await?;
//!         println!("Owner at {:?}", owner.map(|o| o.url().to_string()));
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`ResourceFactory`] - Picks the resource variant and class for a payload
//! - [`Resource`] - Item, list, count and root resources with bound actions
//! - [`HttpRequest`] - Pure request construction, executed by a [`Transport`]
//! - [`HttpTransport`] - Cookies, authentication and the response cache
//!
//! Every action has a synchronous `prepare_*` form returning the request it
//! would send, so request construction can be tested without a server.
//!
//! # Configuration
//!
//! The client reads configuration from environment variables:
//!
//! - `HYPERAPI_URL` (required) - The server URL
//! - `HYPERAPI_API_TOKEN`, `HYPERAPI_USERNAME`, `HYPERAPI_PASSWORD` - Credentials
//! - See [`TransportConfig`] for the rest

pub mod capabilities;
pub mod cli;
mod client;
pub mod config;
pub mod decode;
mod error;
pub mod factory;
pub mod mimetype;
pub mod output;
pub mod request;
pub mod resource;
pub mod traits;
pub mod transport;

#[cfg(feature = "test-server")]
pub mod mock_server;

// Re-export core types
pub use client::{ApiClient, ApiClientBuilder};
pub use config::{CacheConfig, TransportConfig};
pub use error::{HyperApiError, ResourceModelError, Result};

// Re-export the resource model
pub use capabilities::Capabilities;
pub use decode::{raw_bytes, DecoderRegistry};
pub use factory::{
    CreateOptions, ResourceClass, ResourceFactory, ResourceFeatures, ResourceKind,
    ResourceRegistry,
};
pub use mimetype::MimeType;
pub use request::{FieldData, FileAttachment, HttpRequest, QueryArgs, QueryValue};
pub use resource::{
    BoundAction, CountResource, DictField, ExtraDataField, Field, HyperResource, ItemResource,
    ItemState, Items, LinkField, ListField, ListResource, Pages, Relation, Resource, RootResource,
};

// Re-export capability interfaces
pub use traits::{
    AttachmentList, AttachmentUpload, DiffList, DiffUpload, GetPatch, PatchableItem,
    UploadAttachment, UploadDiff,
};

// Re-export transports
pub use transport::auth::{AuthCallback, AuthPrompt, Credentials, OtpCallback};
pub use transport::web_login::{web_login_supported, WebLoginManager};
pub use transport::{HttpTransport, HttpTransportBuilder, MethodResult, ReplayTransport, Transport};
