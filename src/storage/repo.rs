//! Store traits consumed by the managers
//!
//! Recursive queries (`ancestor_chain`, `subtree_ids`, `subtree_ad_count`)
//! have in-process defaults built on the single-step lookups. A backend
//! with native recursive queries overrides them.

use std::collections::HashSet;

use anyhow::Result;

use crate::domain::{self, Ad, AdId, Category, CategoryId, Tag, TagId};

/// Read access to the category forest
pub trait CategoryReader {
    /// Looks up a category by ID
    fn find_by_id(&self, id: &CategoryId) -> Result<Option<Category>>;

    /// Looks up a category by name, ignoring case
    fn find_by_name(&self, name: &str) -> Result<Option<Category>>;

    /// Returns direct children of `parent`, or the roots when `None`
    fn find_children(&self, parent: Option<&CategoryId>) -> Result<Vec<Category>>;

    /// Returns every category
    fn find_all(&self) -> Result<Vec<Category>>;

    /// Number of ads that reference the category directly
    fn count_referencing_ads(&self, id: &CategoryId) -> Result<usize>;

    fn exists_by_name(&self, name: &str) -> Result<bool> {
        Ok(self.find_by_name(name)?.is_some())
    }

    /// Chain from the root down to `id`, inclusive; empty if `id` is unknown
    fn ancestor_chain(&self, id: &CategoryId) -> Result<Vec<Category>> {
        match self.find_by_id(id)? {
            Some(start) => domain::ancestor_chain(start, |parent| self.find_by_id(parent)),
            None => Ok(Vec::new()),
        }
    }

    /// `id` followed by all of its descendants
    fn subtree_ids(&self, id: &CategoryId) -> Result<Vec<CategoryId>> {
        domain::subtree_ids(id, |parent| {
            Ok(self
                .find_children(Some(parent))?
                .into_iter()
                .map(|c| c.id)
                .collect())
        })
    }

    /// Sum of direct ad references over `id` and every descendant
    fn subtree_ad_count(&self, id: &CategoryId) -> Result<usize> {
        let mut total = 0;
        for node in self.subtree_ids(id)? {
            total += self.count_referencing_ads(&node)?;
        }
        Ok(total)
    }
}

/// Read/write access to categories
pub trait CategoryStore: CategoryReader {
    /// Inserts or replaces a category
    fn save(&mut self, category: Category) -> Result<()>;

    /// Removes a category, returning true if it existed
    fn delete(&mut self, id: &CategoryId) -> Result<bool>;
}

/// Read/write access to advertisements
pub trait AdStore {
    fn find_ad(&self, id: &AdId) -> Result<Option<Ad>>;

    fn find_all_ads(&self) -> Result<Vec<Ad>>;

    /// Inserts or replaces an ad
    fn save_ad(&mut self, ad: Ad) -> Result<()>;

    /// Ads referencing any of the given categories
    fn find_ads_in_categories(&self, categories: &HashSet<CategoryId>) -> Result<Vec<Ad>> {
        Ok(self
            .find_all_ads()?
            .into_iter()
            .filter(|ad| ad.categories.iter().any(|c| categories.contains(c)))
            .collect())
    }
}

/// Read/write access to tags
pub trait TagStore {
    fn find_tag(&self, id: &TagId) -> Result<Option<Tag>>;

    /// Looks up a tag by (normalized) name
    fn find_tag_by_name(&self, name: &str) -> Result<Option<Tag>>;

    fn find_all_tags(&self) -> Result<Vec<Tag>>;

    /// Number of ads carrying the tag
    fn count_ads_with_tag(&self, id: &TagId) -> Result<usize>;

    /// Inserts or replaces a tag
    fn save_tag(&mut self, tag: Tag) -> Result<()>;

    /// Removes a tag, returning true if it existed
    fn delete_tag(&mut self, id: &TagId) -> Result<bool>;
}
