//! Tag manager

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::Utc;
use tracing::{info, warn};

use crate::domain::{
    ensure_unreferenced, normalize_name, AdId, CategoryId, CoreError, CoreResult, EntityKind, Tag,
    TagId, UserId,
};
use crate::storage::{AdStore, CategoryReader, TagStore};
use super::unused_id;

/// Applies the tag rules against a store
pub struct TagManager<'s, S: ?Sized> {
    store: &'s mut S,
}

impl<'s, S: TagStore + AdStore + ?Sized> TagManager<'s, S> {
    pub fn new(store: &'s mut S) -> Self {
        Self { store }
    }

    pub fn get(&self, id: &TagId) -> CoreResult<Tag> {
        self.store
            .find_tag(id)?
            .ok_or_else(|| CoreError::not_found(EntityKind::Tag, id))
    }

    pub fn get_by_name(&self, name: &str) -> CoreResult<Tag> {
        self.store
            .find_tag_by_name(name)?
            .ok_or_else(|| CoreError::not_found(EntityKind::Tag, name.trim()))
    }

    pub fn exists(&self, name: &str) -> CoreResult<bool> {
        Ok(self.store.find_tag_by_name(name)?.is_some())
    }

    /// All tags ordered by name
    pub fn list(&self) -> CoreResult<Vec<Tag>> {
        Ok(self.store.find_all_tags()?)
    }

    /// Tags whose name contains `term`, ignoring case
    pub fn search(&self, term: &str) -> CoreResult<Vec<Tag>> {
        let term = term.trim().to_lowercase();
        Ok(self
            .store
            .find_all_tags()?
            .into_iter()
            .filter(|t| t.name.contains(&term))
            .collect())
    }

    pub fn ad_count(&self, id: &TagId) -> CoreResult<usize> {
        self.get(id)?;
        Ok(self.store.count_ads_with_tag(id)?)
    }

    /// Tags on at least one ad, most used first
    pub fn popular(&self, limit: usize) -> CoreResult<Vec<(Tag, usize)>> {
        let mut used = Vec::new();
        for tag in self.store.find_all_tags()? {
            let count = self.store.count_ads_with_tag(&tag.id)?;
            if count > 0 {
                used.push((tag, count));
            }
        }
        used.sort_by(|a, b| b.1.cmp(&a.1));
        used.truncate(limit);
        Ok(used)
    }

    /// Tags no ad carries
    pub fn unused(&self) -> CoreResult<Vec<Tag>> {
        let mut unused = Vec::new();
        for tag in self.store.find_all_tags()? {
            if self.store.count_ads_with_tag(&tag.id)? == 0 {
                unused.push(tag);
            }
        }
        Ok(unused)
    }

    /// Tags on an ad, ordered by name
    pub fn for_ad(&self, ad: &AdId) -> CoreResult<Vec<Tag>> {
        let ad = self
            .store
            .find_ad(ad)?
            .ok_or_else(|| CoreError::not_found(EntityKind::Ad, ad))?;

        let mut tags = Vec::with_capacity(ad.tags.len());
        for id in &ad.tags {
            if let Some(tag) = self.store.find_tag(id)? {
                tags.push(tag);
            }
        }
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    /// Tags appearing on the same ads as `id`, by number of shared ads
    pub fn related(&self, id: &TagId, limit: usize) -> CoreResult<Vec<(Tag, usize)>> {
        self.get(id)?;

        let mut shared: HashMap<TagId, usize> = HashMap::new();
        for ad in self.store.find_all_ads()? {
            if !ad.tags.contains(id) {
                continue;
            }
            for other in ad.tags.iter().filter(|t| *t != id) {
                *shared.entry(other.clone()).or_default() += 1;
            }
        }

        let mut related = Vec::with_capacity(shared.len());
        for (tag_id, count) in shared {
            if let Some(tag) = self.store.find_tag(&tag_id)? {
                related.push((tag, count));
            }
        }
        related.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.name.cmp(&b.0.name)));
        related.truncate(limit);
        Ok(related)
    }

    pub fn create(&mut self, name: &str, actor: &UserId) -> CoreResult<Tag> {
        let now = Utc::now();
        let mut tag = Tag::new(name, actor, now)?;
        if self.store.find_tag_by_name(&tag.name)?.is_some() {
            warn!(tag = %tag.name, "duplicate tag name");
            return Err(CoreError::duplicate(EntityKind::Tag, tag.name));
        }
        tag.id = unused_id(
            tag.id,
            || TagId::generate(&tag.name, now),
            |id| Ok(self.store.find_tag(id)?.is_some()),
        )?;

        self.store.save_tag(tag.clone())?;
        info!(tag = %tag.id, name = %tag.name, by = %actor, "tag created");
        Ok(tag)
    }

    pub fn rename(&mut self, id: &TagId, name: &str, actor: &UserId) -> CoreResult<Tag> {
        let mut tag = self.get(id)?;
        let name = normalize_name(name)?;

        if let Some(existing) = self.store.find_tag_by_name(&name)? {
            if &existing.id != id {
                warn!(tag = %name, "duplicate tag name");
                return Err(CoreError::duplicate(EntityKind::Tag, name));
            }
        }

        tag.name = name;
        self.store.save_tag(tag.clone())?;
        info!(tag = %id, name = %tag.name, by = %actor, "tag renamed");
        Ok(tag)
    }

    /// Deletes a tag no ad carries
    pub fn delete(&mut self, id: &TagId) -> CoreResult<Tag> {
        let tag = self.get(id)?;
        ensure_unreferenced(EntityKind::Tag, &tag.name, self.store.count_ads_with_tag(id)?)?;

        self.store.delete_tag(id)?;
        info!(tag = %id, "tag deleted");
        Ok(tag)
    }

    /// Returns the tags with these names, creating missing ones.
    ///
    /// Names are normalized first, so `Rust` and `rust ` yield one tag.
    /// Either every name is valid or nothing is created.
    pub fn ensure(&mut self, names: &[String], actor: &UserId) -> CoreResult<Vec<Tag>> {
        let mut normalized: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            let name = normalize_name(name)?;
            if !normalized.contains(&name) {
                normalized.push(name);
            }
        }

        let mut tags = Vec::with_capacity(normalized.len());
        for name in normalized {
            let tag = match self.store.find_tag_by_name(&name)? {
                Some(tag) => tag,
                None => self.create(&name, actor)?,
            };
            tags.push(tag);
        }
        Ok(tags)
    }
}

impl<'s, S: TagStore + AdStore + CategoryReader + ?Sized> TagManager<'s, S> {
    /// Tags carried by ads filed under `category`, ordered by name.
    ///
    /// With `include_subcategories`, ads anywhere in its subtree count too.
    pub fn by_category(
        &self,
        category: &CategoryId,
        include_subcategories: bool,
    ) -> CoreResult<Vec<Tag>> {
        if self.store.find_by_id(category)?.is_none() {
            return Err(CoreError::not_found(EntityKind::Category, category));
        }

        let scope: HashSet<CategoryId> = if include_subcategories {
            self.store.subtree_ids(category)?.into_iter().collect()
        } else {
            HashSet::from([category.clone()])
        };

        let ids = self
            .store
            .find_ads_in_categories(&scope)?
            .into_iter()
            .flat_map(|ad| ad.tags)
            .collect();
        self.load_sorted(ids)
    }
}

impl<'s, S: TagStore + AdStore + ?Sized> TagManager<'s, S> {
    /// Tags used on ads owned by `owner`, ordered by name
    pub fn by_creator(&self, owner: &UserId) -> CoreResult<Vec<Tag>> {
        let ids = self
            .store
            .find_all_ads()?
            .into_iter()
            .filter(|ad| &ad.owner == owner)
            .flat_map(|ad| ad.tags)
            .collect();
        self.load_sorted(ids)
    }

    fn load_sorted(&self, ids: BTreeSet<TagId>) -> CoreResult<Vec<Tag>> {
        let mut tags = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(tag) = self.store.find_tag(id)? {
                tags.push(tag);
            }
        }
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Ad;
    use crate::domain::{Category, CategoryDraft};
    use crate::storage::{Catalog, CategoryStore};

    fn actor() -> UserId {
        UserId::new("tagger").unwrap()
    }

    fn tag_ad(catalog: &mut Catalog, tags: &[&TagId]) -> AdId {
        let mut ad = Ad::new("Tagged listing", "Description long enough", &actor(), Utc::now());
        ad.tags = tags.iter().map(|t| (*t).clone()).collect();
        let id = ad.id.clone();
        catalog.save_ad(ad).unwrap();
        id
    }

    fn names(tags: Vec<Tag>) -> Vec<String> {
        tags.into_iter().map(|t| t.name).collect()
    }

    #[test]
    fn create_normalizes_and_rejects_duplicates() {
        let mut catalog = Catalog::new();
        let mut manager = TagManager::new(&mut catalog);

        let tag = manager.create("  Vintage ", &actor()).unwrap();
        assert_eq!(tag.name, "vintage");

        let err = manager.create("VINTAGE", &actor()).unwrap_err();
        assert_eq!(err.code(), "TAG-002");

        let err = manager.create("no spaces", &actor()).unwrap_err();
        assert!(err.is_invalid_operation());
    }

    #[test]
    fn rename_checks_other_tags() {
        let mut catalog = Catalog::new();
        let mut manager = TagManager::new(&mut catalog);
        let a = manager.create("retro", &actor()).unwrap();
        manager.create("classic", &actor()).unwrap();

        assert!(manager.rename(&a.id, "Classic", &actor()).unwrap_err().is_duplicate());

        // Renaming to its own name in another case is fine
        let renamed = manager.rename(&a.id, "RETRO", &actor()).unwrap();
        assert_eq!(renamed.name, "retro");
        let renamed = manager.rename(&a.id, "old-school", &actor()).unwrap();
        assert_eq!(manager.get_by_name("Old-School").unwrap().id, renamed.id);
    }

    #[test]
    fn delete_only_when_unused() {
        let mut catalog = Catalog::new();
        let tag = TagManager::new(&mut catalog).create("rare", &actor()).unwrap();
        tag_ad(&mut catalog, &[&tag.id]);

        let mut manager = TagManager::new(&mut catalog);
        let err = manager.delete(&tag.id).unwrap_err();
        assert_eq!(err.code(), "TAG-003");

        let spare = manager.create("spare", &actor()).unwrap();
        manager.delete(&spare.id).unwrap();
        assert!(!manager.exists("spare").unwrap());
        assert!(manager.delete(&spare.id).unwrap_err().is_not_found());
    }

    #[test]
    fn popularity_and_related() {
        let mut catalog = Catalog::new();
        let tags = TagManager::new(&mut catalog)
            .ensure(
                &["bike".into(), "road".into(), "carbon".into(), "idle".into()],
                &actor(),
            )
            .unwrap();
        let (bike, road, carbon) = (&tags[0].id, &tags[1].id, &tags[2].id);
        tag_ad(&mut catalog, &[bike, road]);
        tag_ad(&mut catalog, &[bike, road, carbon]);
        let ad = tag_ad(&mut catalog, &[bike]);

        let manager = TagManager::new(&mut catalog);
        let popular: Vec<_> = manager
            .popular(2)
            .unwrap()
            .into_iter()
            .map(|(t, n)| (t.name, n))
            .collect();
        assert_eq!(popular, [("bike".to_string(), 3), ("road".to_string(), 2)]);

        let related: Vec<_> = manager
            .related(bike, 10)
            .unwrap()
            .into_iter()
            .map(|(t, n)| (t.name, n))
            .collect();
        assert_eq!(related, [("road".to_string(), 2), ("carbon".to_string(), 1)]);

        let unused: Vec<_> = manager.unused().unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(unused, ["idle"]);

        assert_eq!(manager.for_ad(&ad).unwrap().len(), 1);
        assert_eq!(manager.ad_count(bike).unwrap(), 3);
        assert_eq!(manager.search("AR").unwrap().len(), 1);
    }

    #[test]
    fn ensure_deduplicates_and_reuses() {
        let mut catalog = Catalog::new();
        let mut manager = TagManager::new(&mut catalog);
        let existing = manager.create("rust", &actor()).unwrap();

        let tags = manager
            .ensure(&["Rust".into(), "rust ".into(), "cli".into()], &actor())
            .unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].id, existing.id);
        assert_eq!(manager.list().unwrap().len(), 2);

        assert!(manager.ensure(&["ok".into(), "bad name".into()], &actor()).is_err());
        assert_eq!(manager.list().unwrap().len(), 2);
    }

    #[test]
    fn tags_by_category_with_and_without_subcategories() {
        let mut catalog = Catalog::new();
        let vehicles = Category::new(CategoryDraft::new("Vehicles"), &actor(), Utc::now());
        let bikes = Category::new(
            CategoryDraft::new("Bikes").with_parent(vehicles.id.clone()),
            &actor(),
            Utc::now(),
        );
        catalog.save(vehicles.clone()).unwrap();
        catalog.save(bikes.clone()).unwrap();

        let tags = TagManager::new(&mut catalog)
            .ensure(&["van".into(), "road".into(), "idle".into()], &actor())
            .unwrap();
        let mut van = Ad::new("Camper van", "Sleeps four, new tyres", &actor(), Utc::now());
        van.categories.insert(vehicles.id.clone());
        van.tags.insert(tags[0].id.clone());
        catalog.save_ad(van).unwrap();
        let mut bike = Ad::new("Road bike", "Carbon frame, size 56", &actor(), Utc::now());
        bike.categories.insert(bikes.id.clone());
        bike.tags.insert(tags[1].id.clone());
        catalog.save_ad(bike).unwrap();

        let manager = TagManager::new(&mut catalog);
        assert_eq!(names(manager.by_category(&vehicles.id, false).unwrap()), ["van"]);
        assert_eq!(names(manager.by_category(&vehicles.id, true).unwrap()), ["road", "van"]);
        assert_eq!(names(manager.by_category(&bikes.id, true).unwrap()), ["road"]);

        let ghost = CategoryId::generate("ghost", Utc::now());
        assert_eq!(manager.by_category(&ghost, true).unwrap_err().code(), "CAT-001");
    }

    #[test]
    fn tags_by_creator_cover_only_their_ads() {
        let mut catalog = Catalog::new();
        let tags = TagManager::new(&mut catalog)
            .ensure(&["lamp".into(), "desk".into(), "sofa".into()], &actor())
            .unwrap();
        tag_ad(&mut catalog, &[&tags[0].id, &tags[1].id]);

        let bob = UserId::new("bob").unwrap();
        let mut other = Ad::new("Old sofa", "Comfortable three seater", &bob, Utc::now());
        other.tags.insert(tags[2].id.clone());
        catalog.save_ad(other).unwrap();

        let manager = TagManager::new(&mut catalog);
        assert_eq!(names(manager.by_creator(&actor()).unwrap()), ["desk", "lamp"]);
        assert_eq!(names(manager.by_creator(&bob).unwrap()), ["sofa"]);
        assert!(manager.by_creator(&UserId::new("nobody").unwrap()).unwrap().is_empty());
    }

    #[test]
    fn create_never_replaces_an_existing_tag() {
        let mut catalog = Catalog::new();
        let mut manager = TagManager::new(&mut catalog);
        let first = manager.create("alpha", &actor()).unwrap();
        let second = manager.create("beta", &actor()).unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(manager.get(&first.id).unwrap().name, "alpha");
    }
}
