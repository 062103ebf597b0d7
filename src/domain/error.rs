//! Error taxonomy shared by every manager
//!
//! Failures are deterministic validation results tied to one request;
//! nothing here is retried and nothing is fatal.

use std::fmt;

use thiserror::Error;

use super::ad::AdStatus;
use super::id::{AdId, CategoryId, UserId};

/// The kind of record an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Category,
    Ad,
    Tag,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Category => write!(f, "category"),
            EntityKind::Ad => write!(f, "ad"),
            EntityKind::Tag => write!(f, "tag"),
        }
    }
}

/// Business-rule violations
#[derive(Debug, Error, PartialEq)]
pub enum InvalidOperation {
    #[error("Cannot move category {category} under {parent}: circular reference")]
    CircularReference {
        category: CategoryId,
        parent: CategoryId,
    },

    #[error("Category {category} has {count} subcategories and cannot be deleted")]
    HasSubcategories { category: CategoryId, count: usize },

    #[error("{kind} {key} is used by {count} ad(s) and cannot be deleted")]
    Referenced {
        kind: EntityKind,
        key: String,
        count: usize,
    },

    #[error("Ad {ad} cannot change status from {from} to {to}")]
    StatusTransition {
        ad: AdId,
        from: AdStatus,
        to: AdStatus,
    },

    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl InvalidOperation {
    pub fn invalid_field(field: &'static str, reason: impl Into<String>) -> Self {
        InvalidOperation::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// Error returned by every manager operation
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{kind} not found: {key}")]
    NotFound { kind: EntityKind, key: String },

    #[error("{kind} already exists: {name}")]
    DuplicateName { kind: EntityKind, name: String },

    #[error(transparent)]
    InvalidOperation(#[from] InvalidOperation),

    #[error("{actor} is not allowed to modify {kind} {key}")]
    Unauthorized {
        actor: UserId,
        kind: EntityKind,
        key: String,
    },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn not_found(kind: EntityKind, key: impl ToString) -> Self {
        CoreError::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    pub fn duplicate(kind: EntityKind, name: impl Into<String>) -> Self {
        CoreError::DuplicateName {
            kind,
            name: name.into(),
        }
    }

    /// Stable error code for machine-readable output
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::NotFound { kind, .. } => match kind {
                EntityKind::Category => "CAT-001",
                EntityKind::Ad => "AD-001",
                EntityKind::Tag => "TAG-001",
            },
            CoreError::DuplicateName { kind, .. } => match kind {
                EntityKind::Category => "CAT-002",
                EntityKind::Ad => "GEN-002",
                EntityKind::Tag => "TAG-002",
            },
            CoreError::InvalidOperation(op) => match op {
                InvalidOperation::CircularReference { .. } => "CAT-003",
                InvalidOperation::HasSubcategories { .. } => "CAT-004",
                InvalidOperation::Referenced { kind, .. } => match kind {
                    EntityKind::Tag => "TAG-003",
                    _ => "CAT-005",
                },
                InvalidOperation::StatusTransition { .. } => "AD-002",
                InvalidOperation::InvalidField { .. } => "GEN-002",
            },
            CoreError::Unauthorized { .. } => "GEN-003",
            CoreError::Store(_) => "GEN-001",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound { .. })
    }

    pub fn is_invalid_operation(&self) -> bool {
        matches!(self, CoreError::InvalidOperation(_))
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, CoreError::DuplicateName { .. })
    }
}

/// Refuses deletion of a record that ads still point at.
///
/// Categories and tags share this rule.
pub fn ensure_unreferenced(
    kind: EntityKind,
    key: impl ToString,
    ad_references: usize,
) -> Result<(), InvalidOperation> {
    if ad_references > 0 {
        return Err(InvalidOperation::Referenced {
            kind,
            key: key.to_string(),
            count: ad_references,
        });
    }
    Ok(())
}
