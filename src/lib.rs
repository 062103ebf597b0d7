//! adboard - A local-first classified ads manager
//!
//! Ads live in a category forest and carry free-form tags. Every status
//! change goes through a fixed transition table, and the catalog is kept
//! as JSONL files with a rebuildable SQLite index beside them.

pub mod domain;
pub mod storage;
pub mod service;
pub mod cli;

pub use domain::{Ad, AdId, AdStatus, Category, CategoryId, CoreError, Tag, TagId, UserId};
pub use service::{AdManager, CategoryManager, TagManager};
