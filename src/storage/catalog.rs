//! Locked access to the on-disk catalog
//!
//! Every mutating operation runs as one transaction: take the exclusive
//! lock, load the tables, apply the change to an in-memory [`Catalog`],
//! write back the tables that changed, release the lock. Readers take a
//! shared lock, so a read-validate-write sequence never interleaves with
//! another writer, whether in another thread or another process.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::Context;
use fs2::FileExt;
use tracing::debug;

use super::jsonl::JsonlTable;
use super::memory::Catalog;
use crate::domain::{Ad, Category, CoreError, Tag};

/// File-backed catalog of categories, ads and tags
pub struct CatalogStore {
    dir: PathBuf,
    categories: JsonlTable<Category>,
    ads: JsonlTable<Ad>,
    tags: JsonlTable<Tag>,
}

impl CatalogStore {
    /// Creates a store rooted at a data directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            categories: JsonlTable::new(dir.join("categories.jsonl")),
            ads: JsonlTable::new(dir.join("ads.jsonl")),
            tags: JsonlTable::new(dir.join("tags.jsonl")),
            dir,
        }
    }

    /// Creates the default store for a project
    pub fn for_project(project_root: &Path) -> Self {
        Self::new(project_root.join(".adboard"))
    }

    /// Paths of the three table files
    pub fn table_paths(&self) -> [&Path; 3] {
        [self.categories.path(), self.ads.path(), self.tags.path()]
    }

    fn lock_file(&self) -> Result<File, CoreError> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create directory: {}", self.dir.display()))?;

        let path = self.dir.join("catalog.lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;
        Ok(file)
    }

    fn load(&self) -> Result<Catalog, CoreError> {
        Ok(Catalog::from_parts(
            self.categories.read_all()?,
            self.ads.read_all()?,
            self.tags.read_all()?,
        ))
    }

    /// Stages every dirty table before renaming any of them, so a failed
    /// write leaves all tables as they were.
    fn persist(&self, catalog: &Catalog) -> Result<(), CoreError> {
        let dirty = catalog.dirty();
        if let Err(e) = self.stage_dirty(catalog) {
            self.categories.discard();
            self.ads.discard();
            self.tags.discard();
            return Err(e.into());
        }

        if dirty.categories {
            self.categories.commit()?;
        }
        if dirty.ads {
            self.ads.commit()?;
        }
        if dirty.tags {
            self.tags.commit()?;
        }
        Ok(())
    }

    fn stage_dirty(&self, catalog: &Catalog) -> anyhow::Result<()> {
        let dirty = catalog.dirty();
        if dirty.categories {
            self.categories.stage(catalog.categories())?;
        }
        if dirty.ads {
            self.ads.stage(catalog.ads())?;
        }
        if dirty.tags {
            self.tags.stage(catalog.tags())?;
        }
        Ok(())
    }

    /// Runs `f` against a consistent snapshot under a shared lock
    pub fn read<T, F>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&mut Catalog) -> Result<T, CoreError>,
    {
        let lock = self.lock_file()?;
        lock.lock_shared()
            .context("Failed to acquire read lock on catalog")?;
        debug!(dir = %self.dir.display(), "catalog read lock acquired");

        let mut catalog = self.load()?;
        f(&mut catalog)
    }

    /// Runs `f` as a transaction under the exclusive lock.
    ///
    /// Changes are written back only if `f` succeeds; on error the files
    /// are left untouched.
    pub fn transact<T, F>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&mut Catalog) -> Result<T, CoreError>,
    {
        let lock = self.lock_file()?;
        lock.lock_exclusive()
            .context("Failed to acquire write lock on catalog")?;
        debug!(dir = %self.dir.display(), "catalog write lock acquired");

        let mut catalog = self.load()?;
        let value = f(&mut catalog)?;

        if catalog.dirty().any() {
            self.persist(&catalog)?;
            debug!(dirty = ?catalog.dirty(), "catalog persisted");
        }

        // Lock is released when the file is dropped
        Ok(value)
    }
}
