//! Optional capability interfaces.
//!
//! Registered resource classes opt into these through
//! [`ResourceFeatures`](crate::ResourceFeatures). Each interface is
//! implemented on a small view borrowed from the resource, obtained with
//! [`ItemResource::as_patchable`](crate::ItemResource::as_patchable),
//! [`ListResource::as_diff_list`](crate::ListResource::as_diff_list) or
//! [`ListResource::as_attachment_list`](crate::ListResource::as_attachment_list).

mod get_patch;
mod upload_attachment;
mod upload_diff;

pub use get_patch::{GetPatch, PatchableItem};
pub use upload_attachment::{AttachmentList, AttachmentUpload, UploadAttachment};
pub use upload_diff::{DiffList, DiffUpload, UploadDiff};
