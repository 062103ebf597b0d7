//! Domain models for adboard
//!
//! Contains the core business rules without any I/O concerns: the category
//! forest, the ad status machine and tag normalization.

mod id;
mod error;
mod category;
mod hierarchy;
mod ad;
mod tag;

pub use id::{AdId, CategoryId, IdError, TagId, UserId};
pub use error::{ensure_unreferenced, CoreError, CoreResult, EntityKind, InvalidOperation};
pub use category::{Category, CategoryDraft, CategoryNode, CategorySelect};
pub use hierarchy::{ancestor_chain, build_forest, check_reparent, sort_by_name, subtree_ids, Ancestry};
pub use ad::{validate_fields, Ad, AdStatus, Transition};
pub use tag::{normalize_name, Tag};
