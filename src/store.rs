use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::book::{BookFormat, ReadingMode};

/// One book's persisted state, as held by the host library database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookRecord {
    pub id: String,
    pub path: PathBuf,
    pub format: BookFormat,
    pub total_pages: usize,
    pub current_page: usize,
    pub precise_progress: f64,
    pub mode: ReadingMode,
    pub finished: bool,
    pub last_read: DateTime<Utc>,
    /// Accumulated active reading time in seconds
    #[serde(default)]
    pub reading_secs: u64,
}

impl BookRecord {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>, format: BookFormat) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            format,
            total_pages: 0,
            current_page: 1,
            precise_progress: 0.0,
            mode: ReadingMode::Paged,
            finished: false,
            last_read: Utc::now(),
            reading_secs: 0,
        }
    }
}

/// Persistence collaborator owned by the surrounding application. The
/// engine only reports progress through it and never reads it back on
/// the hot path.
pub trait BookStore: Send {
    fn get_book(&self, id: &str) -> Option<BookRecord>;

    fn update_progress(&mut self, id: &str, record: &BookRecord) -> Result<()>;

    fn mark_finished(&mut self, id: &str) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    books: HashMap<String, BookRecord>,
}

/// File-backed store keeping every record in one pretty-printed JSON
/// file, written through on each update.
pub struct JsonBookStore {
    books: HashMap<String, BookRecord>,
    file_path: Option<PathBuf>,
}

impl JsonBookStore {
    /// In-memory only, nothing touches disk
    #[must_use]
    pub fn ephemeral() -> Self {
        Self {
            books: HashMap::new(),
            file_path: None,
        }
    }

    pub fn with_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let books = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read book store at {path:?}"))?;
            let file: StoreFile = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse book store at {path:?}"))?;
            debug!("Loaded {} book records from {path:?}", file.books.len());
            file.books
        } else {
            HashMap::new()
        };
        Ok(Self {
            books,
            file_path: Some(path),
        })
    }

    /// Like `with_file` but a corrupt or unreadable file degrades to an
    /// empty store instead of failing the session
    #[must_use]
    pub fn load_or_ephemeral(path: impl AsRef<Path>) -> Self {
        match Self::with_file(path.as_ref()) {
            Ok(store) => store,
            Err(e) => {
                warn!("Falling back to ephemeral book store: {e:#}");
                Self::ephemeral()
            }
        }
    }

    pub fn insert(&mut self, record: BookRecord) -> Result<()> {
        self.books.insert(record.id.clone(), record);
        self.save()
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.file_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create store directory {parent:?}"))?;
            }
        }
        let file = StoreFile {
            books: self.books.clone(),
        };
        let content =
            serde_json::to_string_pretty(&file).context("Failed to serialize book store")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write book store to {path:?}"))?;
        Ok(())
    }
}

impl BookStore for JsonBookStore {
    fn get_book(&self, id: &str) -> Option<BookRecord> {
        self.books.get(id).cloned()
    }

    fn update_progress(&mut self, id: &str, record: &BookRecord) -> Result<()> {
        self.books.insert(id.to_string(), record.clone());
        self.save()
    }

    fn mark_finished(&mut self, id: &str) -> Result<()> {
        if let Some(record) = self.books.get_mut(id) {
            if !record.finished {
                info!("Marking book {id} as finished");
            }
            record.finished = true;
            record.last_read = Utc::now();
        }
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(id: &str) -> BookRecord {
        let mut r = BookRecord::new(id, format!("/books/{id}.pdf"), BookFormat::Pdf);
        r.total_pages = 100;
        r
    }

    #[test]
    fn ephemeral_store_round_trips_records() {
        let mut store = JsonBookStore::ephemeral();
        store.insert(record("a")).unwrap();

        let mut updated = record("a");
        updated.current_page = 42;
        store.update_progress("a", &updated).unwrap();

        assert_eq!(store.get_book("a").unwrap().current_page, 42);
        assert!(store.get_book("missing").is_none());
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("books.json");

        {
            let mut store = JsonBookStore::with_file(&path).unwrap();
            store.insert(record("a")).unwrap();
            store.mark_finished("a").unwrap();
        }

        let store = JsonBookStore::with_file(&path).unwrap();
        let book = store.get_book("a").unwrap();
        assert!(book.finished);
        assert_eq!(book.total_pages, 100);
    }

    #[test]
    fn corrupt_file_degrades_to_ephemeral() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("books.json");
        fs::write(&path, "not json at all").unwrap();

        let store = JsonBookStore::load_or_ephemeral(&path);
        assert!(store.is_empty());
    }

    #[test]
    fn mark_finished_on_unknown_id_is_a_no_op() {
        let mut store = JsonBookStore::ephemeral();
        store.mark_finished("nope").unwrap();
        assert!(store.is_empty());
    }
}
