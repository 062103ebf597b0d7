//! SQLite index for fast queries
//!
//! The index sits in `.adboard/.cache/adboard.db` and mirrors the
//! source-of-truth JSONL tables. It is rebuilt whenever one of them has
//! changed since the last rebuild. Besides full-text ad search it answers the
//! recursive category queries with `WITH RECURSIVE` instead of walking
//! the forest one lookup at a time.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::debug;

use super::catalog::CatalogStore;
use super::memory::Catalog;
use super::repo::CategoryReader;
use crate::domain::{sort_by_name, Category, CategoryId};

/// SQLite index for fast queries
pub struct Cache {
    /// Path to the SQLite database
    db_path: PathBuf,

    /// Source tables (for change detection)
    sources: Vec<PathBuf>,

    conn: Connection,
}

impl Cache {
    /// Schema version - bump when schema changes to force rebuild
    const SCHEMA_VERSION: i32 = 1;

    /// Creates or opens the index for a project
    pub fn open(project_root: &Path) -> Result<Self> {
        let data_dir = project_root.join(".adboard");
        let cache_dir = data_dir.join(".cache");
        let db_path = cache_dir.join("adboard.db");
        let sources = CatalogStore::for_project(project_root)
            .table_paths()
            .iter()
            .map(|path| path.to_path_buf())
            .collect();

        fs::create_dir_all(&cache_dir).with_context(|| {
            format!("Failed to create cache directory: {}", cache_dir.display())
        })?;

        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open cache database: {}", db_path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let mut cache = Self {
            db_path,
            sources,
            conn,
        };

        cache.ensure_schema()?;

        Ok(cache)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        if self.schema_version()? != Self::SCHEMA_VERSION {
            self.create_schema()?;
        }
        Ok(())
    }

    fn schema_version(&self) -> Result<i32> {
        let version: Option<i32> = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .optional()?;

        Ok(version.unwrap_or(0))
    }

    fn create_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "
            DROP TABLE IF EXISTS ad_categories;
            DROP TABLE IF EXISTS ad_tags;
            DROP TABLE IF EXISTS ads_fts;
            DROP TABLE IF EXISTS ads;
            DROP TABLE IF EXISTS categories;
            DROP TABLE IF EXISTS tags;
            DROP TABLE IF EXISTS cache_meta;
            ",
        )?;

        self.conn.execute_batch(
            "
            CREATE TABLE categories (
                id TEXT PRIMARY KEY,
                name_key TEXT NOT NULL,
                parent_id TEXT,
                data TEXT NOT NULL
            );

            CREATE TABLE ads (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                status TEXT NOT NULL,
                owner TEXT NOT NULL,
                views INTEGER NOT NULL
            );

            CREATE TABLE tags (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL
            );

            CREATE TABLE ad_categories (
                ad_id TEXT NOT NULL,
                category_id TEXT NOT NULL,
                PRIMARY KEY (ad_id, category_id)
            );

            CREATE TABLE ad_tags (
                ad_id TEXT NOT NULL,
                tag_id TEXT NOT NULL,
                PRIMARY KEY (ad_id, tag_id)
            );

            CREATE TABLE cache_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX idx_categories_parent ON categories(parent_id);
            CREATE INDEX idx_categories_name ON categories(name_key);
            CREATE INDEX idx_ad_categories_category ON ad_categories(category_id);
            CREATE INDEX idx_ad_tags_tag ON ad_tags(tag_id);

            CREATE VIRTUAL TABLE ads_fts USING fts5(
                id,
                title,
                description,
                content='ads',
                content_rowid='rowid'
            );

            CREATE TRIGGER ads_ai AFTER INSERT ON ads BEGIN
                INSERT INTO ads_fts(rowid, id, title, description)
                VALUES (NEW.rowid, NEW.id, NEW.title, NEW.description);
            END;

            CREATE TRIGGER ads_ad AFTER DELETE ON ads BEGIN
                INSERT INTO ads_fts(ads_fts, rowid, id, title, description)
                VALUES ('delete', OLD.rowid, OLD.id, OLD.title, OLD.description);
            END;
            ",
        )?;

        self.conn.execute(
            &format!("PRAGMA user_version = {}", Self::SCHEMA_VERSION),
            [],
        )?;

        Ok(())
    }

    /// Checks if any source table changed since the last rebuild
    pub fn is_stale(&self) -> Result<bool> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM cache_meta WHERE key = 'sources'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match stored {
            Some(stored) => Ok(stored != self.fingerprint()?),
            None => Ok(true),
        }
    }

    /// Size and modification time of every source table
    fn fingerprint(&self) -> Result<String> {
        let mut parts = Vec::with_capacity(self.sources.len());

        for path in &self.sources {
            if !path.exists() {
                parts.push("-".to_string());
                continue;
            }

            let meta = fs::metadata(path)
                .with_context(|| format!("Failed to stat {}", path.display()))?;
            let mtime = meta
                .modified()?
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0);
            parts.push(format!("{}:{}", meta.len(), mtime));
        }

        Ok(parts.join(","))
    }

    fn mark_rebuilt(&self) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO cache_meta (key, value) VALUES ('sources', ?1)",
            params![self.fingerprint()?],
        )?;

        Ok(())
    }

    /// Rebuilds the index from a catalog snapshot
    pub fn rebuild(&mut self, catalog: &Catalog) -> Result<()> {
        let tx = self.conn.transaction()?;

        tx.execute("DELETE FROM ad_categories", [])?;
        tx.execute("DELETE FROM ad_tags", [])?;
        tx.execute("DELETE FROM ads", [])?;
        tx.execute("DELETE FROM categories", [])?;
        tx.execute("DELETE FROM tags", [])?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO categories (id, name_key, parent_id, data) VALUES (?1, ?2, ?3, ?4)",
            )?;

            for category in catalog.categories().values() {
                stmt.execute(params![
                    category.id.to_string(),
                    category.name.to_lowercase(),
                    category.parent_id.as_ref().map(|p| p.to_string()),
                    serde_json::to_string(category)?,
                ])?;
            }
        }

        {
            let mut ad_stmt = tx.prepare(
                "INSERT INTO ads (id, title, description, status, owner, views)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            let mut category_stmt =
                tx.prepare("INSERT INTO ad_categories (ad_id, category_id) VALUES (?1, ?2)")?;
            let mut tag_stmt = tx.prepare("INSERT INTO ad_tags (ad_id, tag_id) VALUES (?1, ?2)")?;

            for ad in catalog.ads().values() {
                let ad_id = ad.id.to_string();
                ad_stmt.execute(params![
                    ad_id,
                    ad.title,
                    ad.description,
                    ad.status.to_string(),
                    ad.owner.as_str(),
                    i64::try_from(ad.views).unwrap_or(i64::MAX),
                ])?;

                for category in &ad.categories {
                    category_stmt.execute(params![ad_id, category.to_string()])?;
                }
                for tag in &ad.tags {
                    tag_stmt.execute(params![ad_id, tag.to_string()])?;
                }
            }
        }

        {
            let mut stmt = tx.prepare("INSERT INTO tags (id, name) VALUES (?1, ?2)")?;
            for tag in catalog.tags().values() {
                stmt.execute(params![tag.id.to_string(), tag.name])?;
            }
        }

        tx.commit()?;
        self.mark_rebuilt()?;

        debug!(
            categories = catalog.categories().len(),
            ads = catalog.ads().len(),
            tags = catalog.tags().len(),
            "cache rebuilt"
        );

        Ok(())
    }

    /// Row counts per table
    pub fn counts(&self) -> Result<CacheCounts> {
        let count = |table: &str| -> Result<usize> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
            Ok(n as usize)
        };

        Ok(CacheCounts {
            categories: count("categories")?,
            ads: count("ads")?,
            tags: count("tags")?,
        })
    }

    /// Full-text search over ad titles and descriptions.
    ///
    /// Deleted ads are never returned.
    pub fn search_ads(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let Some(expr) = fts_query(query) else {
            return Ok(Vec::new());
        };

        let mut stmt = self.conn.prepare(
            "SELECT ads_fts.id, ads_fts.title,
                    snippet(ads_fts, 2, '[', ']', '...', 16),
                    ads.status
             FROM ads_fts JOIN ads ON ads.rowid = ads_fts.rowid
             WHERE ads_fts MATCH ?1 AND ads.status != 'deleted'
             ORDER BY rank LIMIT ?2",
        )?;

        let hits = stmt
            .query_map(params![expr, limit as i64], |row| {
                Ok(SearchHit {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    snippet: row.get(2)?,
                    status: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(hits)
    }

    /// Returns the path to the cache database
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn categories_where(&self, sql: &str, param: Option<&str>) -> Result<Vec<Category>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows: Vec<String> = match param {
            Some(p) => stmt
                .query_map(params![p], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?,
            None => stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?,
        };

        rows.iter()
            .map(|data| serde_json::from_str(data).context("Corrupt category row in cache"))
            .collect()
    }
}

/// Turns free text into an FTS5 expression matching every word
fn fts_query(raw: &str) -> Option<String> {
    let terms: Vec<String> = raw
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

impl CategoryReader for Cache {
    fn find_by_id(&self, id: &CategoryId) -> Result<Option<Category>> {
        Ok(self
            .categories_where("SELECT data FROM categories WHERE id = ?1", Some(id.to_string().as_str()))?
            .pop())
    }

    fn find_by_name(&self, name: &str) -> Result<Option<Category>> {
        let key = name.trim().to_lowercase();
        Ok(self
            .categories_where("SELECT data FROM categories WHERE name_key = ?1", Some(key.as_str()))?
            .pop())
    }

    fn find_children(&self, parent: Option<&CategoryId>) -> Result<Vec<Category>> {
        let mut children = match parent {
            Some(parent) => self.categories_where(
                "SELECT data FROM categories WHERE parent_id = ?1",
                Some(parent.to_string().as_str()),
            )?,
            None => {
                self.categories_where("SELECT data FROM categories WHERE parent_id IS NULL", None)?
            }
        };
        sort_by_name(&mut children);
        Ok(children)
    }

    fn find_all(&self) -> Result<Vec<Category>> {
        let mut all = self.categories_where("SELECT data FROM categories", None)?;
        sort_by_name(&mut all);
        Ok(all)
    }

    fn count_referencing_ads(&self, id: &CategoryId) -> Result<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM ad_categories WHERE category_id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    fn ancestor_chain(&self, id: &CategoryId) -> Result<Vec<Category>> {
        // Depth is capped by the table size so a corrupted loop still terminates
        self.categories_where(
            "WITH RECURSIVE chain(id, parent_id, data, depth) AS (
                 SELECT id, parent_id, data, 0 FROM categories WHERE id = ?1
                 UNION ALL
                 SELECT c.id, c.parent_id, c.data, chain.depth + 1
                 FROM categories c JOIN chain ON c.id = chain.parent_id
                 WHERE chain.depth < (SELECT COUNT(*) FROM categories)
             )
             SELECT data FROM chain ORDER BY depth DESC",
            Some(id.to_string().as_str()),
        )
    }

    fn subtree_ad_count(&self, id: &CategoryId) -> Result<usize> {
        let n: i64 = self.conn.query_row(
            "WITH RECURSIVE subtree(id) AS (
                 SELECT id FROM categories WHERE id = ?1
                 UNION
                 SELECT c.id FROM categories c JOIN subtree s ON c.parent_id = s.id
             )
             SELECT COUNT(*) FROM ad_categories
             WHERE category_id IN (SELECT id FROM subtree)",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

/// Number of rows mirrored per table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheCounts {
    pub categories: usize,
    pub ads: usize,
    pub tags: usize,
}

/// Result from an ad search
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub snippet: String,
    pub status: String,
}
