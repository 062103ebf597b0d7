//! Advertisement manager
//!
//! Every status change, including the expiration sweep, goes through
//! [`Ad::transition`], so the transition table is the single authority on
//! what may happen to an ad.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::domain::{
    validate_fields, Ad, AdId, AdStatus, CategoryId, CoreError, CoreResult, EntityKind,
    InvalidOperation, TagId, UserId,
};
use crate::storage::{AdStore, CategoryReader, TagStore};
use super::unused_id;

/// Input for creating an ad
#[derive(Debug, Clone, Default)]
pub struct AdDraft {
    pub title: String,
    pub description: String,
    pub price: Option<Decimal>,
    /// Initial status; only `Draft` and `Published` are accepted
    pub status: AdStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub featured: bool,
    pub categories: BTreeSet<CategoryId>,
    pub tags: BTreeSet<TagId>,
}

impl AdDraft {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            ..Self::default()
        }
    }
}

/// Changes to an existing ad; `None` leaves a field as it is
#[derive(Debug, Clone, Default)]
pub struct AdUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    /// `Some(None)` clears the price
    pub price: Option<Option<Decimal>>,
    pub status: Option<AdStatus>,
    pub expires_at: Option<DateTime<Utc>>,
    pub featured: Option<bool>,
    pub categories: Option<BTreeSet<CategoryId>>,
    pub tags: Option<BTreeSet<TagId>>,
}

/// Criteria for listing ads
#[derive(Debug, Clone, Default)]
pub struct AdFilter {
    /// Exact status; when unset every status except `Deleted` matches
    pub status: Option<AdStatus>,
    pub category: Option<CategoryId>,
    /// Also match ads in descendants of `category`
    pub include_subcategories: bool,
    pub tag: Option<TagId>,
    pub owner: Option<UserId>,
    pub featured_only: bool,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub text: Option<String>,
    pub limit: Option<usize>,
}

impl AdFilter {
    fn matches(&self, ad: &Ad, categories: Option<&HashSet<CategoryId>>) -> bool {
        let status_ok = match self.status {
            Some(status) => ad.status == status,
            None => ad.status != AdStatus::Deleted,
        };

        status_ok
            && categories.map_or(true, |set| ad.categories.iter().any(|c| set.contains(c)))
            && self.tag.as_ref().map_or(true, |t| ad.tags.contains(t))
            && self.owner.as_ref().map_or(true, |o| ad.is_owned_by(o))
            && (!self.featured_only || ad.featured)
            && self.min_price.map_or(true, |min| ad.price.is_some_and(|p| p >= min))
            && self.max_price.map_or(true, |max| ad.price.is_some_and(|p| p <= max))
            && self.text.as_deref().map_or(true, |t| ad.matches(t))
    }
}

/// Applies the ad rules against a store
pub struct AdManager<'s, S: ?Sized> {
    store: &'s mut S,
    default_ttl: Option<Duration>,
}

impl<'s, S: AdStore + CategoryReader + TagStore + ?Sized> AdManager<'s, S> {
    pub fn new(store: &'s mut S) -> Self {
        Self {
            store,
            default_ttl: None,
        }
    }

    /// Expiration applied when an ad is published without one
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn get(&self, id: &AdId) -> CoreResult<Ad> {
        self.store
            .find_ad(id)?
            .ok_or_else(|| CoreError::not_found(EntityKind::Ad, id))
    }

    /// Creates an ad owned by `actor`
    pub fn create(&mut self, draft: AdDraft, actor: &UserId) -> CoreResult<Ad> {
        let now = Utc::now();
        let title = draft.title.trim().to_string();
        let description = draft.description.trim().to_string();
        validate_fields(&title, &description, draft.price)?;

        if !matches!(draft.status, AdStatus::Draft | AdStatus::Published) {
            return Err(InvalidOperation::invalid_field(
                "status",
                "new ads must start as draft or published",
            )
            .into());
        }
        if let Some(at) = draft.expires_at {
            ensure_future(at, now)?;
        }
        self.ensure_references(&draft.categories, &draft.tags)?;

        let mut ad = Ad::new(title, description, actor, now);
        ad.id = unused_id(
            ad.id,
            || AdId::generate(&ad.title, now),
            |id| Ok(self.store.find_ad(id)?.is_some()),
        )?;
        ad.price = draft.price;
        ad.featured = draft.featured;
        ad.categories = draft.categories;
        ad.tags = draft.tags;

        if draft.status == AdStatus::Published {
            let expires_at = self.publication_expiry(&ad, draft.expires_at, now)?;
            ad.transition(AdStatus::Published, expires_at, Some(actor), now)?;
        } else {
            ad.expires_at = draft.expires_at;
        }

        self.store.save_ad(ad.clone())?;
        info!(ad = %ad.id, owner = %actor, status = %ad.status, "ad created");
        Ok(ad)
    }

    /// Applies changes to an ad owned by `actor`.
    ///
    /// A status change follows the transition table like any other.
    pub fn update(&mut self, id: &AdId, changes: AdUpdate, actor: &UserId) -> CoreResult<Ad> {
        let now = Utc::now();
        let mut ad = self.get(id)?;
        authorize(&ad, actor)?;

        if let Some(title) = changes.title {
            ad.title = title.trim().to_string();
        }
        if let Some(description) = changes.description {
            ad.description = description.trim().to_string();
        }
        if let Some(price) = changes.price {
            ad.price = price;
        }
        validate_fields(&ad.title, &ad.description, ad.price)?;

        if let Some(at) = changes.expires_at {
            ensure_future(at, now)?;
        }
        if let Some(featured) = changes.featured {
            ad.featured = featured;
        }

        let categories = changes.categories.unwrap_or_else(|| ad.categories.clone());
        let tags = changes.tags.unwrap_or_else(|| ad.tags.clone());
        self.ensure_references(&categories, &tags)?;
        ad.categories = categories;
        ad.tags = tags;

        match changes.status {
            Some(next) if next != ad.status => {
                let expires_at = if next == AdStatus::Published {
                    self.publication_expiry(&ad, changes.expires_at, now)?
                } else {
                    None
                };
                ad.transition(next, expires_at, Some(actor), now)?;
                if next != AdStatus::Published {
                    if let Some(at) = changes.expires_at {
                        ad.expires_at = Some(at);
                    }
                }
            }
            _ => {
                if let Some(at) = changes.expires_at {
                    ad.expires_at = Some(at);
                }
            }
        }

        ad.modified_at = Some(now);
        ad.modified_by = Some(actor.clone());
        self.store.save_ad(ad.clone())?;

        info!(ad = %id, "ad updated");
        Ok(ad)
    }

    /// Lists ads matching `filter`, newest first
    pub fn list(&self, filter: &AdFilter) -> CoreResult<Vec<Ad>> {
        let categories = match &filter.category {
            Some(category) => {
                if self.store.find_by_id(category)?.is_none() {
                    return Err(CoreError::not_found(EntityKind::Category, category));
                }
                let ids = if filter.include_subcategories {
                    self.store.subtree_ids(category)?
                } else {
                    vec![category.clone()]
                };
                Some(ids.into_iter().collect::<HashSet<_>>())
            }
            None => None,
        };

        let mut ads: Vec<_> = self
            .store
            .find_all_ads()?
            .into_iter()
            .filter(|ad| filter.matches(ad, categories.as_ref()))
            .collect();
        sort_newest_first(&mut ads);

        if let Some(limit) = filter.limit {
            ads.truncate(limit);
        }
        debug!(count = ads.len(), "listed ads");
        Ok(ads)
    }

    /// Moves an ad owned by `actor` to `next`.
    ///
    /// `expires_at` only takes effect when entering `Published`.
    pub fn transition(
        &mut self,
        id: &AdId,
        next: AdStatus,
        expires_at: Option<DateTime<Utc>>,
        actor: &UserId,
    ) -> CoreResult<Ad> {
        let now = Utc::now();
        let mut ad = self.get(id)?;
        authorize(&ad, actor)?;

        let expires_at = if next == AdStatus::Published {
            self.publication_expiry(&ad, expires_at, now)?
        } else {
            None
        };

        let change = ad.transition(next, expires_at, Some(actor), now).map_err(|e| {
            warn!(ad = %id, from = %ad.status, to = %next, "rejected status change");
            e
        })?;
        self.store.save_ad(ad.clone())?;

        info!(
            ad = %id,
            from = %change.from,
            to = %change.to,
            first_publication = change.first_publication,
            "ad status changed"
        );
        Ok(ad)
    }

    pub fn publish(
        &mut self,
        id: &AdId,
        expires_at: Option<DateTime<Utc>>,
        actor: &UserId,
    ) -> CoreResult<Ad> {
        self.transition(id, AdStatus::Published, expires_at, actor)
    }

    /// Soft-deletes an ad
    pub fn delete(&mut self, id: &AdId, actor: &UserId) -> CoreResult<Ad> {
        self.transition(id, AdStatus::Deleted, None, actor)
    }

    /// Records a view; returns the new count
    pub fn increment_views(&mut self, id: &AdId) -> CoreResult<u64> {
        let mut ad = self.get(id)?;
        let views = ad.record_view();
        self.store.save_ad(ad)?;
        debug!(ad = %id, views, "view recorded");
        Ok(views)
    }

    /// Expires every published ad whose expiration is before `now`.
    ///
    /// Returns how many changed; running it again right away returns 0.
    pub fn mark_expired(&mut self, now: DateTime<Utc>) -> CoreResult<usize> {
        let mut changed = 0;
        for mut ad in self.store.find_all_ads()? {
            if ad.expire_if_overdue(now)? {
                debug!(ad = %ad.id, "ad expired");
                self.store.save_ad(ad)?;
                changed += 1;
            }
        }

        if changed > 0 {
            info!(count = changed, "expired overdue ads");
        }
        Ok(changed)
    }

    /// Published ads expiring between `now` and `now + days`, soonest first
    pub fn expiring_within(&self, now: DateTime<Utc>, days: u32) -> CoreResult<Vec<Ad>> {
        let horizon = now
            .checked_add_signed(Duration::days(i64::from(days)))
            .ok_or_else(|| out_of_range("days"))?;
        let mut ads: Vec<_> = self
            .live_ads()?
            .into_iter()
            .filter(|ad| ad.expires_at.is_some_and(|at| at >= now && at <= horizon))
            .collect();
        ads.sort_by(|a, b| a.expires_at.cmp(&b.expires_at).then_with(|| a.id.cmp(&b.id)));
        Ok(ads)
    }

    /// Published featured ads, most recently published first
    pub fn featured(&self) -> CoreResult<Vec<Ad>> {
        let mut ads: Vec<_> = self.live_ads()?.into_iter().filter(|ad| ad.featured).collect();
        sort_recently_published(&mut ads);
        Ok(ads)
    }

    /// Published ads ordered by views
    pub fn most_viewed(&self, limit: usize) -> CoreResult<Vec<Ad>> {
        let mut ads = self.live_ads()?;
        ads.sort_by(|a, b| b.views.cmp(&a.views).then_with(|| a.id.cmp(&b.id)));
        ads.truncate(limit);
        Ok(ads)
    }

    /// Published ads first published within the last `days`
    pub fn recently_published(&self, now: DateTime<Utc>, days: u32) -> CoreResult<Vec<Ad>> {
        let since = now
            .checked_sub_signed(Duration::days(i64::from(days)))
            .ok_or_else(|| out_of_range("days"))?;
        let mut ads: Vec<_> = self
            .live_ads()?
            .into_iter()
            .filter(|ad| ad.published_at.is_some_and(|at| at >= since))
            .collect();
        sort_recently_published(&mut ads);
        Ok(ads)
    }

    fn live_ads(&self) -> CoreResult<Vec<Ad>> {
        Ok(self
            .store
            .find_all_ads()?
            .into_iter()
            .filter(|ad| ad.status.is_live())
            .collect())
    }

    /// Expiration to apply when `ad` enters `Published`
    fn publication_expiry(
        &self,
        ad: &Ad,
        requested: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> CoreResult<Option<DateTime<Utc>>> {
        if let Some(at) = requested {
            ensure_future(at, now)?;
            return Ok(Some(at));
        }

        let current_is_valid = ad.expires_at.is_some_and(|at| at > now);
        match self.default_ttl {
            Some(ttl) if !current_is_valid => now
                .checked_add_signed(ttl)
                .map(Some)
                .ok_or_else(|| out_of_range("default expiration").into()),
            _ => Ok(None),
        }
    }

    fn ensure_references(
        &self,
        categories: &BTreeSet<CategoryId>,
        tags: &BTreeSet<TagId>,
    ) -> CoreResult<()> {
        for category in categories {
            if self.store.find_by_id(category)?.is_none() {
                return Err(CoreError::not_found(EntityKind::Category, category));
            }
        }
        for tag in tags {
            if self.store.find_tag(tag)?.is_none() {
                return Err(CoreError::not_found(EntityKind::Tag, tag));
            }
        }
        Ok(())
    }
}

fn authorize(ad: &Ad, actor: &UserId) -> CoreResult<()> {
    if ad.is_owned_by(actor) {
        return Ok(());
    }

    warn!(ad = %ad.id, actor = %actor, "not the owner");
    Err(CoreError::Unauthorized {
        actor: actor.clone(),
        kind: EntityKind::Ad,
        key: ad.id.to_string(),
    })
}

fn ensure_future(at: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), InvalidOperation> {
    if at <= now {
        return Err(InvalidOperation::invalid_field(
            "expiration date",
            "must be in the future",
        ));
    }
    Ok(())
}

fn out_of_range(field: &'static str) -> InvalidOperation {
    InvalidOperation::invalid_field(field, "reaches past the supported date range")
}

fn sort_newest_first(ads: &mut [Ad]) {
    ads.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}

fn sort_recently_published(ads: &mut [Ad]) {
    ads.sort_by(|a, b| b.published_at.cmp(&a.published_at).then_with(|| a.id.cmp(&b.id)));
}
