//! Managers applying the business rules
//!
//! Each manager borrows a store for the duration of one operation. The
//! CLI hands them the [`crate::storage::Catalog`] loaded inside a
//! transaction; tests hand them a bare in-memory catalog.

mod categories;
mod ads;
mod tags;

pub use categories::CategoryManager;
pub use ads::{AdDraft, AdFilter, AdManager, AdUpdate};
pub use tags::TagManager;

use std::fmt::Display;

use anyhow::anyhow;
use tracing::debug;

use crate::domain::CoreResult;

const ID_ATTEMPTS: usize = 32;

/// Returns `first` unless the store already holds it, otherwise the first
/// id from `regenerate` that is free.
///
/// Stores insert-or-replace on save, so a new record must never reuse a
/// taken id.
fn unused_id<I: Display>(
    first: I,
    mut regenerate: impl FnMut() -> I,
    mut taken: impl FnMut(&I) -> CoreResult<bool>,
) -> CoreResult<I> {
    let mut id = first;
    for _ in 0..ID_ATTEMPTS {
        if !taken(&id)? {
            return Ok(id);
        }
        debug!(id = %id, "generated id already taken");
        id = regenerate();
    }
    Err(anyhow!("Could not generate an unused id after {} attempts", ID_ATTEMPTS).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Category, CategoryDraft, CategoryId, UserId};
    use crate::storage::{Catalog, CategoryReader, CategoryStore};
    use chrono::Utc;

    #[test]
    fn taken_id_is_regenerated() {
        let mut catalog = Catalog::new();
        let actor = UserId::new("seeder").unwrap();
        let existing = Category::new(CategoryDraft::new("Seeded"), &actor, Utc::now());
        catalog.save(existing.clone()).unwrap();

        let mut calls = 0;
        let id = unused_id(
            existing.id.clone(),
            || {
                calls += 1;
                CategoryId::generate("Seeded", Utc::now())
            },
            |id| Ok(catalog.find_by_id(id)?.is_some()),
        )
        .unwrap();

        assert_eq!(calls, 1);
        assert_ne!(id, existing.id);
        assert_eq!(catalog.find_by_id(&existing.id).unwrap(), Some(existing));
    }

    #[test]
    fn gives_up_when_every_id_is_taken() {
        let seeded: CategoryId = "c-0000001".parse().unwrap();
        let err = unused_id(seeded.clone(), || seeded.clone(), |_| Ok(true)).unwrap_err();
        assert_eq!(err.code(), "GEN-001");
    }
}
