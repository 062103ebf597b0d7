//! Category hierarchy manager
//!
//! Keeps the category forest acyclic under create, update, move and
//! delete, and answers the tree and aggregation queries.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::domain::{
    build_forest, check_reparent, ensure_unreferenced, Ancestry, Category, CategoryDraft,
    CategoryId, CategoryNode, CategorySelect, CoreError, CoreResult, EntityKind,
    InvalidOperation, UserId,
};
use crate::storage::{CategoryReader, CategoryStore};
use super::unused_id;

/// Applies the hierarchy rules against a category store
pub struct CategoryManager<'s, S: ?Sized> {
    store: &'s mut S,
}

impl<'s, S: ?Sized> CategoryManager<'s, S> {
    pub fn new(store: &'s mut S) -> Self {
        Self { store }
    }
}

impl<S: CategoryReader + ?Sized> CategoryManager<'_, S> {
    pub fn get(&self, id: &CategoryId) -> CoreResult<Category> {
        self.store
            .find_by_id(id)?
            .ok_or_else(|| CoreError::not_found(EntityKind::Category, id))
    }

    pub fn get_by_name(&self, name: &str) -> CoreResult<Category> {
        self.store
            .find_by_name(name)?
            .ok_or_else(|| CoreError::not_found(EntityKind::Category, name.trim()))
    }

    /// Returns true if a category with this name exists, ignoring case
    pub fn exists(&self, name: &str) -> CoreResult<bool> {
        Ok(self.store.exists_by_name(name)?)
    }

    /// Chain from the root down to `id`, inclusive
    pub fn path(&self, id: &CategoryId) -> CoreResult<Vec<Category>> {
        let chain = self.store.ancestor_chain(id)?;
        if chain.is_empty() {
            return Err(CoreError::not_found(EntityKind::Category, id));
        }
        Ok(chain)
    }

    /// Direct children of `parent` ordered by name, or the roots when `None`
    pub fn children_of(&self, parent: Option<&CategoryId>) -> CoreResult<Vec<Category>> {
        if let Some(parent) = parent {
            self.get(parent)?;
        }
        Ok(self.store.find_children(parent)?)
    }

    /// The whole forest with per-node ad counts
    pub fn tree(&self) -> CoreResult<Vec<CategoryNode>> {
        let categories = self.store.find_all()?;
        let counts = self.direct_counts(&categories)?;
        debug!(nodes = categories.len(), "building category tree");

        Ok(build_forest(categories, |id| {
            counts.get(id).copied().unwrap_or(0)
        }))
    }

    /// Ads referencing the category directly
    pub fn ad_count(&self, id: &CategoryId) -> CoreResult<usize> {
        self.get(id)?;
        Ok(self.store.count_referencing_ads(id)?)
    }

    /// Ad references summed over the category and all its descendants
    pub fn subtree_ad_count(&self, id: &CategoryId) -> CoreResult<usize> {
        self.get(id)?;
        Ok(self.store.subtree_ad_count(id)?)
    }

    /// Flat list for pickers, ordered by name
    pub fn select_list(&self) -> CoreResult<Vec<CategorySelect>> {
        let all = self.store.find_all()?;
        let parents: HashSet<CategoryId> = all.iter().filter_map(|c| c.parent_id.clone()).collect();

        Ok(all
            .into_iter()
            .map(|c| CategorySelect {
                has_children: parents.contains(&c.id),
                id: c.id,
                name: c.name,
                parent_id: c.parent_id,
            })
            .collect())
    }

    /// Case-insensitive substring search on name or description
    pub fn search(&self, term: &str) -> CoreResult<Vec<Category>> {
        Ok(self
            .store
            .find_all()?
            .into_iter()
            .filter(|c| c.matches(term))
            .collect())
    }

    /// Categories with at least one ad, most referenced first
    pub fn most_used(&self, limit: usize) -> CoreResult<Vec<(Category, usize)>> {
        let all = self.store.find_all()?;
        let counts = self.direct_counts(&all)?;

        let mut used: Vec<_> = all
            .into_iter()
            .filter_map(|c| {
                let n = counts.get(&c.id).copied().unwrap_or(0);
                (n > 0).then_some((c, n))
            })
            .collect();
        // find_all is name-ordered and the sort is stable, so ties stay alphabetical
        used.sort_by(|a, b| b.1.cmp(&a.1));
        used.truncate(limit);
        Ok(used)
    }

    /// Categories no ad references
    pub fn unused(&self) -> CoreResult<Vec<Category>> {
        let mut unused = Vec::new();
        for category in self.store.find_all()? {
            if self.store.count_referencing_ads(&category.id)? == 0 {
                unused.push(category);
            }
        }
        Ok(unused)
    }

    fn direct_counts(&self, categories: &[Category]) -> CoreResult<HashMap<CategoryId, usize>> {
        let mut counts = HashMap::with_capacity(categories.len());
        for category in categories {
            counts.insert(
                category.id.clone(),
                self.store.count_referencing_ads(&category.id)?,
            );
        }
        Ok(counts)
    }

    /// Rejects `parent` if it is `id` itself or lies below it
    fn ensure_acyclic(&self, id: &CategoryId, parent: &CategoryId) -> CoreResult<()> {
        let ancestry = check_reparent(id, parent, |node| {
            Ok::<_, anyhow::Error>(self.store.find_by_id(node)?.and_then(|c| c.parent_id))
        })?;

        match ancestry {
            Ancestry::Clear => Ok(()),
            other => {
                warn!(category = %id, parent = %parent, ?other, "rejected reparent");
                Err(InvalidOperation::CircularReference {
                    category: id.clone(),
                    parent: parent.clone(),
                }
                .into())
            }
        }
    }

    fn ensure_name_free(&self, name: &str, owner: Option<&CategoryId>) -> CoreResult<()> {
        match self.store.find_by_name(name)? {
            Some(existing) if Some(&existing.id) != owner => {
                warn!(category = name, "duplicate category name");
                Err(CoreError::duplicate(EntityKind::Category, name))
            }
            _ => Ok(()),
        }
    }
}

impl<S: CategoryStore + ?Sized> CategoryManager<'_, S> {
    /// Creates a category under an optional parent
    pub fn create(&mut self, draft: CategoryDraft, actor: &UserId) -> CoreResult<Category> {
        let draft = draft.normalized()?;
        self.ensure_name_free(&draft.name, None)?;
        if let Some(parent) = &draft.parent_id {
            self.get(parent)?;
        }

        let now = Utc::now();
        let mut category = Category::new(draft, actor, now);
        category.id = unused_id(
            category.id,
            || CategoryId::generate(&category.name, now),
            |id| Ok(self.store.find_by_id(id)?.is_some()),
        )?;
        self.store.save(category.clone())?;

        info!(category = %category.id, name = %category.name, "category created");
        Ok(category)
    }

    /// Replaces name, description and parent.
    ///
    /// `draft.parent_id == None` makes the category a root. Nothing is
    /// written unless every check passes.
    pub fn update(
        &mut self,
        id: &CategoryId,
        draft: CategoryDraft,
        actor: &UserId,
    ) -> CoreResult<Category> {
        let mut category = self.get(id)?;
        let draft = draft.normalized()?;
        self.ensure_name_free(&draft.name, Some(id))?;

        if draft.parent_id != category.parent_id {
            if let Some(parent) = &draft.parent_id {
                self.get(parent)?;
                self.ensure_acyclic(id, parent)?;
            }
        }

        category.name = draft.name;
        category.description = draft.description;
        category.parent_id = draft.parent_id;
        category.touch(actor, Utc::now());
        self.store.save(category.clone())?;

        info!(category = %id, "category updated");
        Ok(category)
    }

    /// Moves a category under `new_parent`, or to the top level when `None`
    pub fn move_to(
        &mut self,
        id: &CategoryId,
        new_parent: Option<&CategoryId>,
        actor: &UserId,
    ) -> CoreResult<Category> {
        let mut category = self.get(id)?;

        if let Some(parent) = new_parent {
            if parent == id {
                warn!(category = %id, "rejected self-parent");
                return Err(InvalidOperation::CircularReference {
                    category: id.clone(),
                    parent: parent.clone(),
                }
                .into());
            }
            self.get(parent)?;
            self.ensure_acyclic(id, parent)?;
        }

        category.parent_id = new_parent.cloned();
        category.touch(actor, Utc::now());
        self.store.save(category.clone())?;

        info!(category = %id, parent = ?new_parent.map(|p| p.to_string()), "category moved");
        Ok(category)
    }

    /// Deletes a leaf category that no ad references
    pub fn delete(&mut self, id: &CategoryId) -> CoreResult<Category> {
        let category = self.get(id)?;

        let children = self.store.find_children(Some(id))?.len();
        if children > 0 {
            warn!(category = %id, children, "category has subcategories");
            return Err(InvalidOperation::HasSubcategories {
                category: id.clone(),
                count: children,
            }
            .into());
        }

        ensure_unreferenced(
            EntityKind::Category,
            id,
            self.store.count_referencing_ads(id)?,
        )?;

        self.store.delete(id)?;
        info!(category = %id, "category deleted");
        Ok(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Ad;
    use crate::storage::{AdStore, Catalog};

    fn actor() -> UserId {
        UserId::new("editor").unwrap()
    }

    fn create(catalog: &mut Catalog, name: &str, parent: Option<&CategoryId>) -> CategoryId {
        let mut draft = CategoryDraft::new(name);
        draft.parent_id = parent.cloned();
        CategoryManager::new(catalog).create(draft, &actor()).unwrap().id
    }

    fn attach_ad(catalog: &mut Catalog, category: &CategoryId) {
        let mut ad = Ad::new("Something nice", "A description of twenty", &actor(), Utc::now());
        ad.categories.insert(category.clone());
        catalog.save_ad(ad).unwrap();
    }

    /// A > B > C
    fn chain() -> (Catalog, CategoryId, CategoryId, CategoryId) {
        let mut catalog = Catalog::new();
        let a = create(&mut catalog, "Alpha", None);
        let b = create(&mut catalog, "Beta", Some(&a));
        let c = create(&mut catalog, "Gamma", Some(&b));
        (catalog, a, b, c)
    }

    #[test]
    fn create_rejects_duplicate_name_ignoring_case() {
        let mut catalog = Catalog::new();
        create(&mut catalog, "Vehicles", None);

        let err = CategoryManager::new(&mut catalog)
            .create(CategoryDraft::new("VEHICLES"), &actor())
            .unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(err.code(), "CAT-002");
    }

    #[test]
    fn create_with_unknown_parent() {
        let mut catalog = Catalog::new();
        let ghost = CategoryId::generate("ghost", Utc::now());

        let err = CategoryManager::new(&mut catalog)
            .create(CategoryDraft::new("Orphan").with_parent(ghost), &actor())
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(catalog.categories().is_empty());
    }

    #[test]
    fn move_under_descendant_is_rejected() {
        let (mut catalog, a, _b, c) = chain();
        let before = catalog.categories().clone();

        let err = CategoryManager::new(&mut catalog)
            .move_to(&a, Some(&c), &actor())
            .unwrap_err();

        assert_eq!(err.code(), "CAT-003");
        assert_eq!(catalog.categories(), &before);
    }

    #[test]
    fn move_under_self_is_rejected() {
        let (mut catalog, a, _, _) = chain();
        let err = CategoryManager::new(&mut catalog)
            .move_to(&a, Some(&a), &actor())
            .unwrap_err();
        assert!(err.is_invalid_operation());
    }

    #[test]
    fn promote_to_root_always_allowed() {
        let (mut catalog, _a, _b, c) = chain();
        let moved = CategoryManager::new(&mut catalog)
            .move_to(&c, None, &actor())
            .unwrap();

        assert!(moved.is_root());
        assert_eq!(moved.updated_by, Some(actor()));
    }

    #[test]
    fn sideways_move_is_allowed() {
        let (mut catalog, a, _b, c) = chain();
        let other = create(&mut catalog, "Delta", None);

        let mut manager = CategoryManager::new(&mut catalog);
        manager.move_to(&c, Some(&other), &actor()).unwrap();
        // Alpha can now go under Gamma, which is no longer below it
        manager.move_to(&a, Some(&c), &actor()).unwrap();

        let path: Vec<_> = manager.path(&a).unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(path, ["Delta", "Gamma", "Alpha"]);
    }

    #[test]
    fn update_checks_cycles_and_names() {
        let (mut catalog, a, b, c) = chain();
        let mut manager = CategoryManager::new(&mut catalog);

        let err = manager
            .update(&a, CategoryDraft::new("Alpha").with_parent(c.clone()), &actor())
            .unwrap_err();
        assert_eq!(err.code(), "CAT-003");

        let err = manager
            .update(&b, CategoryDraft::new("alpha").with_parent(a.clone()), &actor())
            .unwrap_err();
        assert!(err.is_duplicate());

        // Keeping its own name and parent is fine
        let updated = manager
            .update(
                &b,
                CategoryDraft::new("Beta")
                    .with_description("Second level")
                    .with_parent(a.clone()),
                &actor(),
            )
            .unwrap();
        assert_eq!(updated.description.as_deref(), Some("Second level"));

        // No parent promotes to root
        let updated = manager.update(&c, CategoryDraft::new("Gamma"), &actor()).unwrap();
        assert!(updated.is_root());
    }

    #[test]
    fn delete_checks_children_before_ads() {
        let (mut catalog, a, b, c) = chain();
        attach_ad(&mut catalog, &b);

        let mut manager = CategoryManager::new(&mut catalog);
        let err = manager.delete(&b).unwrap_err();
        assert_eq!(err.code(), "CAT-004");

        manager.delete(&c).unwrap();
        let err = manager.delete(&b).unwrap_err();
        assert_eq!(err.code(), "CAT-005");

        let err = manager.delete(&a).unwrap_err();
        assert_eq!(err.code(), "CAT-004");
    }

    #[test]
    fn delete_unknown() {
        let mut catalog = Catalog::new();
        let err = CategoryManager::new(&mut catalog)
            .delete(&CategoryId::generate("x", Utc::now()))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn path_root_first() {
        let (mut catalog, a, b, c) = chain();
        let manager = CategoryManager::new(&mut catalog);

        let ids: Vec<_> = manager.path(&c).unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, [a.clone(), b, c]);
        assert_eq!(manager.path(&a).unwrap().len(), 1);
        assert!(manager
            .path(&CategoryId::generate("nope", Utc::now()))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn tree_nests_and_counts() {
        let (mut catalog, a, b, c) = chain();
        let d = create(&mut catalog, "Aardvark", Some(&a));
        attach_ad(&mut catalog, &c);
        attach_ad(&mut catalog, &c);
        attach_ad(&mut catalog, &b);

        let manager = CategoryManager::new(&mut catalog);
        let tree = manager.tree().unwrap();
        assert_eq!(tree.len(), 1);

        let root = &tree[0];
        assert_eq!(root.category.id, a);
        assert_eq!(root.size(), 4);
        assert_eq!(root.depth(), 3);
        let names: Vec<_> = root.children.iter().map(|n| n.category.name.as_str()).collect();
        assert_eq!(names, ["Aardvark", "Beta"]);
        assert_eq!(root.children[0].category.id, d);
        assert_eq!(root.children[1].ads_count, 1);
        assert_eq!(root.children[1].children[0].ads_count, 2);

        assert_eq!(manager.subtree_ad_count(&a).unwrap(), 3);
        assert_eq!(manager.subtree_ad_count(&b).unwrap(), 3);
        assert_eq!(manager.subtree_ad_count(&c).unwrap(), 2);
        assert_eq!(manager.ad_count(&a).unwrap(), 0);
    }

    #[test]
    fn subtree_count_sums_memberships() {
        let (mut catalog, a, b, c) = chain();
        let mut ad = Ad::new("Shared listing", "Listed in two categories", &actor(), Utc::now());
        ad.categories.insert(b.clone());
        ad.categories.insert(c.clone());
        catalog.save_ad(ad).unwrap();

        let manager = CategoryManager::new(&mut catalog);
        assert_eq!(manager.subtree_ad_count(&a).unwrap(), 2);
    }

    #[test]
    fn select_list_flags_parents() {
        let (mut catalog, a, b, c) = chain();
        let manager = CategoryManager::new(&mut catalog);

        let list = manager.select_list().unwrap();
        let flags: HashMap<_, _> = list.iter().map(|s| (s.id.clone(), s.has_children)).collect();
        assert!(flags[&a]);
        assert!(flags[&b]);
        assert!(!flags[&c]);

        let names: Vec<_> = list.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Alpha", "Beta", "Gamma"]);
    }

    #[test]
    fn usage_queries() {
        let (mut catalog, a, b, c) = chain();
        attach_ad(&mut catalog, &c);
        attach_ad(&mut catalog, &c);
        attach_ad(&mut catalog, &b);

        let manager = CategoryManager::new(&mut catalog);
        let used: Vec<_> = manager
            .most_used(10)
            .unwrap()
            .into_iter()
            .map(|(c, n)| (c.id, n))
            .collect();
        assert_eq!(used, [(c, 2), (b, 1)]);

        let unused: Vec<_> = manager.unused().unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(unused, [a]);
    }

    #[test]
    fn search_and_children() {
        let (mut catalog, a, _b, _c) = chain();
        let manager = CategoryManager::new(&mut catalog);

        assert_eq!(manager.search("amm").unwrap().len(), 1);
        assert_eq!(manager.children_of(None).unwrap().len(), 1);
        assert_eq!(manager.children_of(Some(&a)).unwrap().len(), 1);
        assert!(manager.exists("beta").unwrap());
        assert_eq!(manager.get_by_name("GAMMA").unwrap().name, "Gamma");
    }
}
