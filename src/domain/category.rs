//! Category domain model
//!
//! Categories form a forest. A category only records the ID of its parent;
//! children are always derived by looking up who points at it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::InvalidOperation;
use super::id::{CategoryId, UserId};

const NAME_MIN: usize = 2;
const NAME_MAX: usize = 50;
const DESCRIPTION_MAX: usize = 255;

/// A node in the category hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// Unique identifier
    pub id: CategoryId,

    /// Display name, unique ignoring case
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Parent category; `None` for roots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CategoryId>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub created_by: UserId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<UserId>,
}

impl Category {
    /// Creates a category from a validated draft
    pub fn new(draft: CategoryDraft, actor: &UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: CategoryId::generate(&draft.name, now),
            name: draft.name,
            description: draft.description,
            parent_id: draft.parent_id,
            created_at: now,
            updated_at: now,
            created_by: actor.clone(),
            updated_by: None,
        }
    }

    /// Returns true if this category has no parent
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Case-insensitive name comparison
    pub fn has_name(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.trim().to_lowercase()
    }

    /// Case-insensitive substring match on name or description
    pub fn matches(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        self.name.to_lowercase().contains(&term)
            || self
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&term))
    }

    /// Stamps a modification
    pub fn touch(&mut self, actor: &UserId, now: DateTime<Utc>) {
        self.updated_at = now;
        self.updated_by = Some(actor.clone());
    }
}

/// Input for creating or updating a category
///
/// On update the draft describes the full desired state: `parent_id: None`
/// promotes the category to a root.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryDraft {
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<CategoryId>,
}

impl CategoryDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_parent(mut self, parent_id: CategoryId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Trims fields and checks length limits
    pub fn normalized(mut self) -> Result<Self, InvalidOperation> {
        self.name = self.name.trim().to_string();
        let len = self.name.chars().count();
        if !(NAME_MIN..=NAME_MAX).contains(&len) {
            return Err(InvalidOperation::invalid_field(
                "name",
                format!("must be between {NAME_MIN} and {NAME_MAX} characters"),
            ));
        }

        self.description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        if let Some(description) = &self.description {
            if description.chars().count() > DESCRIPTION_MAX {
                return Err(InvalidOperation::invalid_field(
                    "description",
                    format!("cannot exceed {DESCRIPTION_MAX} characters"),
                ));
            }
        }

        Ok(self)
    }
}

/// A category with its nested children, as emitted by the tree view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryNode {
    #[serde(flatten)]
    pub category: Category,

    /// Ads referencing this category directly
    pub ads_count: usize,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<CategoryNode>,
}

impl CategoryNode {
    /// Depth of the subtree rooted here (a leaf has depth 1)
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(CategoryNode::depth).max().unwrap_or(0)
    }

    /// Total number of nodes in this subtree
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(CategoryNode::size).sum::<usize>()
    }
}

/// Flattened entry for populating pickers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySelect {
    pub id: CategoryId,
    pub name: String,
    pub parent_id: Option<CategoryId>,
    pub has_children: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor() -> UserId {
        UserId::new("tester").unwrap()
    }

    #[test]
    fn new_category_is_root_without_parent() {
        let cat = Category::new(CategoryDraft::new("Vehicles"), &actor(), Utc::now());
        assert!(cat.is_root());
        assert_eq!(cat.created_at, cat.updated_at);
        assert!(cat.updated_by.is_none());
    }

    #[test]
    fn name_comparison_ignores_case() {
        let cat = Category::new(CategoryDraft::new("Vehicles"), &actor(), Utc::now());
        assert!(cat.has_name("vehicles"));
        assert!(cat.has_name(" VEHICLES "));
        assert!(!cat.has_name("vehicle"));
    }

    #[test]
    fn matches_description() {
        let cat = Category::new(
            CategoryDraft::new("Bikes").with_description("Road and mountain bicycles"),
            &actor(),
            Utc::now(),
        );
        assert!(cat.matches("MOUNTAIN"));
        assert!(cat.matches("bik"));
        assert!(!cat.matches("cars"));
    }

    #[test]
    fn draft_trims_and_validates() {
        let draft = CategoryDraft::new("  Home  ")
            .with_description("   ")
            .normalized()
            .unwrap();
        assert_eq!(draft.name, "Home");
        assert_eq!(draft.description, None);

        assert!(CategoryDraft::new("x").normalized().is_err());
        assert!(CategoryDraft::new("a".repeat(51)).normalized().is_err());
        assert!(CategoryDraft::new("ok")
            .with_description("d".repeat(256))
            .normalized()
            .is_err());
    }

    #[test]
    fn serialization_skips_missing_parent() {
        let cat = Category::new(CategoryDraft::new("Jobs"), &actor(), Utc::now());
        let json = serde_json::to_string(&cat).unwrap();
        assert!(!json.contains("parent_id"));

        let back: Category = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cat);
    }
}
