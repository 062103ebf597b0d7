//! In-memory catalog
//!
//! An ID-indexed snapshot of every category, ad and tag. It is what a
//! transaction loads from disk, mutates and writes back, and it is the
//! store used directly in tests.

use std::collections::HashMap;

use anyhow::Result;

use super::repo::{AdStore, CategoryReader, CategoryStore, TagStore};
use crate::domain::{sort_by_name, Ad, AdId, Category, CategoryId, Tag, TagId};

/// Which collections changed since the catalog was loaded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dirty {
    pub categories: bool,
    pub ads: bool,
    pub tags: bool,
}

impl Dirty {
    pub fn any(&self) -> bool {
        self.categories || self.ads || self.tags
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    categories: HashMap<CategoryId, Category>,
    ads: HashMap<AdId, Ad>,
    tags: HashMap<TagId, Tag>,
    dirty: Dirty,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from loaded collections; nothing is marked dirty
    pub fn from_parts(
        categories: HashMap<CategoryId, Category>,
        ads: HashMap<AdId, Ad>,
        tags: HashMap<TagId, Tag>,
    ) -> Self {
        Self {
            categories,
            ads,
            tags,
            dirty: Dirty::default(),
        }
    }

    pub fn categories(&self) -> &HashMap<CategoryId, Category> {
        &self.categories
    }

    pub fn ads(&self) -> &HashMap<AdId, Ad> {
        &self.ads
    }

    pub fn tags(&self) -> &HashMap<TagId, Tag> {
        &self.tags
    }

    pub fn dirty(&self) -> Dirty {
        self.dirty
    }
}

impl CategoryReader for Catalog {
    fn find_by_id(&self, id: &CategoryId) -> Result<Option<Category>> {
        Ok(self.categories.get(id).cloned())
    }

    fn find_by_name(&self, name: &str) -> Result<Option<Category>> {
        Ok(self.categories.values().find(|c| c.has_name(name)).cloned())
    }

    fn find_children(&self, parent: Option<&CategoryId>) -> Result<Vec<Category>> {
        let mut children: Vec<_> = self
            .categories
            .values()
            .filter(|c| c.parent_id.as_ref() == parent)
            .cloned()
            .collect();
        sort_by_name(&mut children);
        Ok(children)
    }

    fn find_all(&self) -> Result<Vec<Category>> {
        let mut all: Vec<_> = self.categories.values().cloned().collect();
        sort_by_name(&mut all);
        Ok(all)
    }

    fn count_referencing_ads(&self, id: &CategoryId) -> Result<usize> {
        Ok(self
            .ads
            .values()
            .filter(|ad| ad.categories.contains(id))
            .count())
    }
}

impl CategoryStore for Catalog {
    fn save(&mut self, category: Category) -> Result<()> {
        self.categories.insert(category.id.clone(), category);
        self.dirty.categories = true;
        Ok(())
    }

    fn delete(&mut self, id: &CategoryId) -> Result<bool> {
        let removed = self.categories.remove(id).is_some();
        self.dirty.categories |= removed;
        Ok(removed)
    }
}

impl AdStore for Catalog {
    fn find_ad(&self, id: &AdId) -> Result<Option<Ad>> {
        Ok(self.ads.get(id).cloned())
    }

    fn find_all_ads(&self) -> Result<Vec<Ad>> {
        Ok(self.ads.values().cloned().collect())
    }

    fn save_ad(&mut self, ad: Ad) -> Result<()> {
        self.ads.insert(ad.id.clone(), ad);
        self.dirty.ads = true;
        Ok(())
    }
}

impl TagStore for Catalog {
    fn find_tag(&self, id: &TagId) -> Result<Option<Tag>> {
        Ok(self.tags.get(id).cloned())
    }

    fn find_tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let name = name.trim().to_lowercase();
        Ok(self.tags.values().find(|t| t.name == name).cloned())
    }

    fn find_all_tags(&self) -> Result<Vec<Tag>> {
        let mut all: Vec<_> = self.tags.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    fn count_ads_with_tag(&self, id: &TagId) -> Result<usize> {
        Ok(self.ads.values().filter(|ad| ad.tags.contains(id)).count())
    }

    fn save_tag(&mut self, tag: Tag) -> Result<()> {
        self.tags.insert(tag.id.clone(), tag);
        self.dirty.tags = true;
        Ok(())
    }

    fn delete_tag(&mut self, id: &TagId) -> Result<bool> {
        let removed = self.tags.remove(id).is_some();
        self.dirty.tags |= removed;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CategoryDraft, UserId};
    use chrono::Utc;

    fn user() -> UserId {
        UserId::new("tester").unwrap()
    }

    fn category(name: &str, parent: Option<&CategoryId>) -> Category {
        let mut draft = CategoryDraft::new(name);
        draft.parent_id = parent.cloned();
        Category::new(draft, &user(), Utc::now())
    }

    #[test]
    fn starts_clean() {
        let catalog = Catalog::new();
        assert!(!catalog.dirty().any());
    }

    #[test]
    fn save_marks_only_touched_collection() {
        let mut catalog = Catalog::new();
        catalog.save(category("Home", None)).unwrap();

        let dirty = catalog.dirty();
        assert!(dirty.categories);
        assert!(!dirty.ads);
        assert!(!dirty.tags);
    }

    #[test]
    fn deleting_missing_record_stays_clean() {
        let mut catalog = Catalog::new();
        let id = CategoryId::generate("nothing", Utc::now());
        assert!(!catalog.delete(&id).unwrap());
        assert!(!catalog.dirty().any());
    }

    #[test]
    fn children_and_roots() {
        let mut catalog = Catalog::new();
        let root = category("Vehicles", None);
        let cars = category("Cars", Some(&root.id));
        let bikes = category("bikes", Some(&root.id));
        let root_id = root.id.clone();
        catalog.save(root).unwrap();
        catalog.save(cars).unwrap();
        catalog.save(bikes).unwrap();

        let roots = catalog.find_children(None).unwrap();
        assert_eq!(roots.len(), 1);

        let names: Vec<_> = catalog
            .find_children(Some(&root_id))
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, ["bikes", "Cars"]);
    }

    #[test]
    fn default_recursive_queries() {
        let mut catalog = Catalog::new();
        let a = category("Alpha", None);
        let b = category("Beta", Some(&a.id));
        let c = category("Gamma", Some(&b.id));
        let (a_id, b_id, c_id) = (a.id.clone(), b.id.clone(), c.id.clone());
        catalog.save(a).unwrap();
        catalog.save(b).unwrap();
        catalog.save(c).unwrap();

        let mut ad = Ad::new("Leaf level ad", "Twenty characters or more", &user(), Utc::now());
        ad.categories.insert(c_id.clone());
        catalog.save_ad(ad).unwrap();
        let mut ad = Ad::new("Mid level ad", "Twenty characters or more", &user(), Utc::now());
        ad.categories.insert(b_id.clone());
        catalog.save_ad(ad).unwrap();

        let chain: Vec<_> = catalog
            .ancestor_chain(&c_id)
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(chain, [a_id.clone(), b_id.clone(), c_id.clone()]);

        assert_eq!(catalog.subtree_ids(&a_id).unwrap().len(), 3);
        assert_eq!(catalog.subtree_ad_count(&a_id).unwrap(), 2);
        assert_eq!(catalog.subtree_ad_count(&c_id).unwrap(), 1);
        assert_eq!(catalog.count_referencing_ads(&a_id).unwrap(), 0);
    }

    #[test]
    fn tag_lookup_ignores_case() {
        let mut catalog = Catalog::new();
        let tag = Tag::new("vintage", &user(), Utc::now()).unwrap();
        catalog.save_tag(tag.clone()).unwrap();

        assert_eq!(catalog.find_tag_by_name("VINTAGE").unwrap(), Some(tag));
    }
}
