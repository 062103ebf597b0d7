//! # Storage Layer
//!
//! Persistence for adboard with git-friendly file formats.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Categories | JSONL (one JSON per line) | `.adboard/categories.jsonl` |
//! | Ads | JSONL | `.adboard/ads.jsonl` |
//! | Tags | JSONL | `.adboard/tags.jsonl` |
//! | Config | TOML | `.adboard/config.toml` |
//! | Index | SQLite (auto-regenerated) | `.adboard/.cache/adboard.db` |
//!
//! ## Concurrency Safety
//!
//! - [`CatalogStore`] serializes writers with an exclusive `fs2` lock on
//!   `.adboard/catalog.lock`; readers take a shared lock
//! - All writes are atomic (temp file + rename)
//! - [`Cache`] is rebuilt when a source table changes
//!
//! ## Key Types
//!
//! - [`Project`] - Entry point for accessing an adboard project
//! - [`CategoryReader`], [`CategoryStore`], [`AdStore`], [`TagStore`] -
//!   what the managers need from a backend
//! - [`Catalog`] - In-memory snapshot implementing every store trait
//! - [`Config`] - Project and global configuration

mod repo;
mod memory;
mod jsonl;
mod catalog;
mod config;
mod project;
mod cache;

pub use repo::{AdStore, CategoryReader, CategoryStore, TagStore};
pub use memory::{Catalog, Dirty};
pub use jsonl::{JsonlTable, Record};
pub use catalog::CatalogStore;
pub use config::{Config, ConfigError, GlobalConfig, OutputFormat, ProjectConfig};
pub use project::{Project, ProjectError};
pub use cache::{Cache, CacheCounts, SearchHit};
