//! Advertisement domain model
//!
//! An ad moves through a fixed status table. Publication and expiration
//! timestamps are side effects of those transitions, never set directly.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::InvalidOperation;
use super::id::{AdId, CategoryId, TagId, UserId};

const TITLE_MIN: usize = 5;
const TITLE_MAX: usize = 100;
const DESCRIPTION_MIN: usize = 20;
const DESCRIPTION_MAX: usize = 2000;

/// Status of an advertisement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AdStatus {
    /// Being written, not visible
    #[default]
    Draft,

    /// Visible to everyone
    Published,

    /// Passed its expiration date
    Expired,

    /// Taken down by a moderator or the owner
    Suspended,

    /// Soft-deleted; terminal
    Deleted,
}

impl AdStatus {
    /// Returns all valid status values
    pub fn all() -> &'static [AdStatus] {
        &[
            AdStatus::Draft,
            AdStatus::Published,
            AdStatus::Expired,
            AdStatus::Suspended,
            AdStatus::Deleted,
        ]
    }

    /// Statuses reachable from this one
    pub fn allowed_next(&self) -> &'static [AdStatus] {
        match self {
            AdStatus::Draft => &[AdStatus::Published, AdStatus::Deleted],
            AdStatus::Published => &[AdStatus::Expired, AdStatus::Suspended, AdStatus::Deleted],
            AdStatus::Expired => &[AdStatus::Published, AdStatus::Deleted],
            AdStatus::Suspended => &[AdStatus::Published, AdStatus::Deleted],
            AdStatus::Deleted => &[],
        }
    }

    pub fn can_transition_to(&self, next: AdStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    /// Returns true if no transition leaves this status
    pub fn is_terminal(&self) -> bool {
        self.allowed_next().is_empty()
    }

    /// Returns true if the ad is publicly visible
    pub fn is_live(&self) -> bool {
        matches!(self, AdStatus::Published)
    }
}

impl std::fmt::Display for AdStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdStatus::Draft => write!(f, "draft"),
            AdStatus::Published => write!(f, "published"),
            AdStatus::Expired => write!(f, "expired"),
            AdStatus::Suspended => write!(f, "suspended"),
            AdStatus::Deleted => write!(f, "deleted"),
        }
    }
}

impl std::str::FromStr for AdStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Ok(AdStatus::Draft),
            "published" | "publish" | "live" => Ok(AdStatus::Published),
            "expired" => Ok(AdStatus::Expired),
            "suspended" | "suspend" => Ok(AdStatus::Suspended),
            "deleted" | "delete" => Ok(AdStatus::Deleted),
            _ => Err(format!("Unknown ad status: {}", s)),
        }
    }
}

/// What a successful transition changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: AdStatus,
    pub to: AdStatus,
    /// True when this transition stamped the first publication date
    pub first_publication: bool,
}

/// A classified advertisement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ad {
    /// Unique identifier
    pub id: AdId,

    pub title: String,

    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,

    pub status: AdStatus,

    /// When the ad was created (never changes)
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,

    /// First time the ad became published
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub views: u64,

    #[serde(default)]
    pub featured: bool,

    /// The user who created and owns the ad
    pub owner: UserId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_by: Option<UserId>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub categories: BTreeSet<CategoryId>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<TagId>,
}

impl Ad {
    /// Creates a draft ad owned by `owner`
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        owner: &UserId,
        now: DateTime<Utc>,
    ) -> Self {
        let title = title.into();
        Self {
            id: AdId::generate(&title, now),
            title,
            description: description.into(),
            price: None,
            status: AdStatus::Draft,
            created_at: now,
            modified_at: None,
            published_at: None,
            expires_at: None,
            views: 0,
            featured: false,
            owner: owner.clone(),
            modified_by: None,
            categories: BTreeSet::new(),
            tags: BTreeSet::new(),
        }
    }

    /// Applies a status transition.
    ///
    /// Fails without touching the ad if the table does not allow it.
    /// Entering `Published` stamps `published_at` only the first time;
    /// a supplied `expires_at` is applied on every entry into `Published`.
    pub fn transition(
        &mut self,
        next: AdStatus,
        expires_at: Option<DateTime<Utc>>,
        actor: Option<&UserId>,
        now: DateTime<Utc>,
    ) -> Result<Transition, InvalidOperation> {
        let from = self.status;
        if !from.can_transition_to(next) {
            return Err(InvalidOperation::StatusTransition {
                ad: self.id.clone(),
                from,
                to: next,
            });
        }

        self.status = next;
        self.modified_at = Some(now);
        if let Some(actor) = actor {
            self.modified_by = Some(actor.clone());
        }

        let mut first_publication = false;
        if next == AdStatus::Published {
            if self.published_at.is_none() {
                self.published_at = Some(now);
                first_publication = true;
            }
            if let Some(expires_at) = expires_at {
                self.expires_at = Some(expires_at);
            }
        }

        Ok(Transition {
            from,
            to: next,
            first_publication,
        })
    }

    /// Returns true if the ad is published and its expiration has passed
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == AdStatus::Published && self.expires_at.is_some_and(|at| at < now)
    }

    /// Moves an overdue published ad to `Expired`.
    ///
    /// Returns false (and changes nothing) when the ad is not overdue, so
    /// repeated sweeps are no-ops.
    pub fn expire_if_overdue(&mut self, now: DateTime<Utc>) -> Result<bool, InvalidOperation> {
        if !self.is_overdue(now) {
            return Ok(false);
        }
        self.transition(AdStatus::Expired, None, None, now)?;
        Ok(true)
    }

    /// Records one more view
    pub fn record_view(&mut self) -> u64 {
        self.views = self.views.saturating_add(1);
        self.views
    }

    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.owner == user
    }

    /// Case-insensitive substring match on title or description
    pub fn matches(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        self.title.to_lowercase().contains(&term) || self.description.to_lowercase().contains(&term)
    }
}

/// Validates title, description and price against the field limits
pub fn validate_fields(
    title: &str,
    description: &str,
    price: Option<Decimal>,
) -> Result<(), InvalidOperation> {
    let title_len = title.trim().chars().count();
    if !(TITLE_MIN..=TITLE_MAX).contains(&title_len) {
        return Err(InvalidOperation::invalid_field(
            "title",
            format!("must be between {TITLE_MIN} and {TITLE_MAX} characters"),
        ));
    }

    let description_len = description.trim().chars().count();
    if !(DESCRIPTION_MIN..=DESCRIPTION_MAX).contains(&description_len) {
        return Err(InvalidOperation::invalid_field(
            "description",
            format!("must be between {DESCRIPTION_MIN} and {DESCRIPTION_MAX} characters"),
        ));
    }

    if price.is_some_and(|p| p.is_sign_negative() && !p.is_zero()) {
        return Err(InvalidOperation::invalid_field("price", "cannot be negative"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn owner() -> UserId {
        UserId::new("owner").unwrap()
    }

    fn make_ad() -> Ad {
        Ad::new(
            "Mountain bike",
            "Barely used, 21 gears, new tyres.",
            &owner(),
            Utc::now(),
        )
    }

    #[test]
    fn table_matches_documented_transitions() {
        use AdStatus::*;
        let allowed = [
            (Draft, Published),
            (Draft, Deleted),
            (Published, Expired),
            (Published, Suspended),
            (Published, Deleted),
            (Expired, Published),
            (Expired, Deleted),
            (Suspended, Published),
            (Suspended, Deleted),
        ];

        for from in AdStatus::all() {
            for to in AdStatus::all() {
                let expected = allowed.contains(&(*from, *to));
                assert_eq!(from.can_transition_to(*to), expected, "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn deleted_is_terminal() {
        assert!(AdStatus::Deleted.is_terminal());
        assert!(!AdStatus::Draft.is_terminal());
    }

    #[test]
    fn first_publication_sets_date() {
        let mut ad = make_ad();
        assert!(ad.published_at.is_none());

        let now = Utc::now();
        let t = ad.transition(AdStatus::Published, None, None, now).unwrap();

        assert!(t.first_publication);
        assert_eq!(ad.status, AdStatus::Published);
        assert_eq!(ad.published_at, Some(now));
        assert_eq!(ad.modified_at, Some(now));
    }

    #[test]
    fn republishing_keeps_first_publication_date() {
        let mut ad = make_ad();
        let first = Utc::now();
        ad.transition(AdStatus::Published, None, None, first).unwrap();
        ad.transition(AdStatus::Suspended, None, None, first + Duration::hours(1))
            .unwrap();

        let later = first + Duration::days(2);
        let expiry = later + Duration::days(30);
        let t = ad
            .transition(AdStatus::Published, Some(expiry), None, later)
            .unwrap();

        assert!(!t.first_publication);
        assert_eq!(ad.published_at, Some(first));
        assert_eq!(ad.expires_at, Some(expiry));
    }

    #[test]
    fn illegal_transition_changes_nothing() {
        let mut ad = make_ad();
        ad.transition(AdStatus::Published, None, None, Utc::now())
            .unwrap();
        let before = ad.clone();

        let err = ad
            .transition(AdStatus::Draft, None, None, Utc::now())
            .unwrap_err();
        assert_eq!(
            err,
            InvalidOperation::StatusTransition {
                ad: ad.id.clone(),
                from: AdStatus::Published,
                to: AdStatus::Draft,
            }
        );
        assert_eq!(ad, before);
    }

    #[test]
    fn nothing_leaves_deleted() {
        let mut ad = make_ad();
        ad.transition(AdStatus::Deleted, None, None, Utc::now())
            .unwrap();

        for next in AdStatus::all() {
            assert!(ad.transition(*next, None, None, Utc::now()).is_err());
        }
    }

    #[test]
    fn expiration_only_applies_when_entering_published() {
        let mut ad = make_ad();
        let expiry = Utc::now() + Duration::days(10);
        ad.transition(AdStatus::Deleted, Some(expiry), None, Utc::now())
            .unwrap();
        assert!(ad.expires_at.is_none());
    }

    #[test]
    fn expire_if_overdue_is_idempotent() {
        let mut ad = make_ad();
        let now = Utc::now();
        ad.transition(
            AdStatus::Published,
            Some(now - Duration::minutes(1)),
            None,
            now - Duration::days(1),
        )
        .unwrap();

        assert!(ad.expire_if_overdue(now).unwrap());
        assert_eq!(ad.status, AdStatus::Expired);
        assert!(!ad.expire_if_overdue(now).unwrap());
    }

    #[test]
    fn actor_is_recorded() {
        let mut ad = make_ad();
        let mod_user = UserId::new("moderator").unwrap();
        ad.transition(AdStatus::Published, None, Some(&mod_user), Utc::now())
            .unwrap();
        assert_eq!(ad.modified_by, Some(mod_user));
    }

    #[test]
    fn status_parsing() {
        assert_eq!("PUBLISHED".parse::<AdStatus>(), Ok(AdStatus::Published));
        assert_eq!("suspend".parse::<AdStatus>(), Ok(AdStatus::Suspended));
        assert!("archived".parse::<AdStatus>().is_err());
    }

    #[test]
    fn field_validation() {
        assert!(validate_fields("Short", "Twenty characters min!", None).is_ok());
        assert!(validate_fields("Tiny", "Twenty characters min!", None).is_err());
        assert!(validate_fields("Long enough", "too short", None).is_err());
        assert!(validate_fields(
            "Long enough",
            "Twenty characters min!",
            Some(Decimal::new(-100, 2))
        )
        .is_err());
        assert!(validate_fields("Long enough", "Twenty characters min!", Some(Decimal::ZERO)).is_ok());
    }

    #[test]
    fn views_never_decrease() {
        let mut ad = make_ad();
        assert_eq!(ad.record_view(), 1);
        assert_eq!(ad.record_view(), 2);
    }
}
