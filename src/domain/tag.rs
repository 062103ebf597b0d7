//! Tag domain model
//!
//! Tag names are stored trimmed and lowercase; two tags whose names differ
//! only in case are the same tag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::InvalidOperation;
use super::id::{TagId, UserId};

const NAME_MIN: usize = 2;
const NAME_MAX: usize = 50;

/// A free-form label attached to ads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,

    /// Normalized (lowercase) name
    pub name: String,

    pub created_at: DateTime<Utc>,

    pub created_by: UserId,
}

impl Tag {
    /// Creates a tag, normalizing and validating the name
    pub fn new(name: &str, actor: &UserId, now: DateTime<Utc>) -> Result<Self, InvalidOperation> {
        let name = normalize_name(name)?;
        Ok(Self {
            id: TagId::generate(&name, now),
            name,
            created_at: now,
            created_by: actor.clone(),
        })
    }
}

/// Lowercases and trims a tag name, rejecting anything outside
/// `[a-z0-9_-]{2,50}`
pub fn normalize_name(raw: &str) -> Result<String, InvalidOperation> {
    let name = raw.trim().to_lowercase();

    let len = name.chars().count();
    if !(NAME_MIN..=NAME_MAX).contains(&len) {
        return Err(InvalidOperation::invalid_field(
            "tag name",
            format!("must be between {NAME_MIN} and {NAME_MAX} characters"),
        ));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(InvalidOperation::invalid_field(
            "tag name",
            "can only contain letters, numbers, hyphens, and underscores",
        ));
    }

    Ok(name)
}
