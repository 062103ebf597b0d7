//! JSONL tables
//!
//! Each collection lives in `.adboard/{name}.jsonl` with one JSON object per
//! line. Writes go to a temp file and are renamed into place. Callers are
//! expected to hold the catalog lock (see [`super::CatalogStore`]).

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::hash::Hash;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::{Ad, AdId, Category, CategoryId, Tag, TagId};

/// A record that can be stored in a JSONL table
pub trait Record: Serialize + DeserializeOwned {
    type Key: Eq + Hash + Ord + Clone;

    fn key(&self) -> &Self::Key;
}

impl Record for Category {
    type Key = CategoryId;

    fn key(&self) -> &CategoryId {
        &self.id
    }
}

impl Record for Ad {
    type Key = AdId;

    fn key(&self) -> &AdId {
        &self.id
    }
}

impl Record for Tag {
    type Key = TagId;

    fn key(&self) -> &TagId {
        &self.id
    }
}

/// One JSONL file holding records of type `T`
pub struct JsonlTable<T> {
    path: PathBuf,
    _record: PhantomData<T>,
}

impl<T: Record> JsonlTable<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _record: PhantomData,
        }
    }

    /// Returns the path to the table file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every record; a missing file is an empty table.
    ///
    /// Later lines win when a key appears twice.
    pub fn read_all(&self) -> Result<HashMap<T::Key, T>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }

        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open table: {}", self.path.display()))?;

        let reader = BufReader::new(file);
        let mut records = HashMap::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.with_context(|| {
                format!("Failed to read line {} of {}", line_num + 1, self.path.display())
            })?;

            if line.trim().is_empty() {
                continue;
            }

            let record: T = serde_json::from_str(&line).with_context(|| {
                format!(
                    "Failed to parse record at line {} of {}",
                    line_num + 1,
                    self.path.display()
                )
            })?;

            records.insert(record.key().clone(), record);
        }

        Ok(records)
    }

    /// Rewrites the whole table, sorted by key
    pub fn write_all(&self, records: &HashMap<T::Key, T>) -> Result<()> {
        self.stage(records)?;
        self.commit()
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("jsonl.tmp")
    }

    /// Writes the records to the temp file next to the table.
    ///
    /// The table itself is untouched until [`Self::commit`].
    pub fn stage(&self, records: &HashMap<T::Key, T>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let temp_path = self.temp_path();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

        let mut writer = BufWriter::new(file);

        let mut sorted: Vec<_> = records.values().collect();
        sorted.sort_by(|a, b| a.key().cmp(b.key()));

        for record in sorted {
            let line = serde_json::to_string(record).context("Failed to serialize record")?;
            writeln!(writer, "{}", line).context("Failed to write record")?;
        }

        writer.flush().context("Failed to flush table")?;
        Ok(())
    }

    /// Renames the staged temp file over the table
    pub fn commit(&self) -> Result<()> {
        let temp_path = self.temp_path();
        fs::rename(&temp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                temp_path.display(),
                self.path.display()
            )
        })
    }

    /// Removes a staged temp file, if any
    pub fn discard(&self) {
        let _ = fs::remove_file(self.temp_path());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CategoryDraft, UserId};
    use chrono::Utc;
    use tempfile::TempDir;

    fn make_category(name: &str) -> Category {
        Category::new(
            CategoryDraft::new(name),
            &UserId::new("tester").unwrap(),
            Utc::now(),
        )
    }

    #[test]
    fn read_missing_table() {
        let dir = TempDir::new().unwrap();
        let table: JsonlTable<Category> = JsonlTable::new(dir.path().join("categories.jsonl"));

        assert!(table.read_all().unwrap().is_empty());
    }

    #[test]
    fn write_and_read_records() {
        let dir = TempDir::new().unwrap();
        let table = JsonlTable::new(dir.path().join("categories.jsonl"));

        let a = make_category("Books");
        let b = make_category("Music");
        let mut records = HashMap::new();
        records.insert(a.id.clone(), a.clone());
        records.insert(b.id.clone(), b.clone());

        table.write_all(&records).unwrap();

        let loaded = table.read_all().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get(&a.id), Some(&a));
        assert_eq!(loaded.get(&b.id), Some(&b));
    }

    #[test]
    fn later_lines_win() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("categories.jsonl");

        let mut cat = make_category("Books");
        let first = serde_json::to_string(&cat).unwrap();
        cat.name = "Comics".to_string();
        let second = serde_json::to_string(&cat).unwrap();
        fs::write(&path, format!("{}\n\n{}\n", first, second)).unwrap();

        let table: JsonlTable<Category> = JsonlTable::new(&path);
        let loaded = table.read_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[&cat.id].name, "Comics");
    }

    #[test]
    fn corrupt_line_reports_position() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tags.jsonl");
        fs::write(&path, "{not json}\n").unwrap();

        let table: JsonlTable<Tag> = JsonlTable::new(&path);
        let err = table.read_all().unwrap_err();
        assert!(format!("{:#}", err).contains("line 1"));
    }

    #[test]
    fn creates_parent_directories_and_no_temp_left() {
        let dir = TempDir::new().unwrap();
        let table = JsonlTable::new(dir.path().join("nested").join("categories.jsonl"));

        let cat = make_category("Garden");
        let mut records = HashMap::new();
        records.insert(cat.id.clone(), cat);
        table.write_all(&records).unwrap();

        assert!(table.path().exists());
        assert!(!table.path().with_extension("jsonl.tmp").exists());
    }
}
