//! Book model and format detection

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RenderError;

/// Document format, selected by content sniffing at open time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookFormat {
    Pdf,
    Epub,
    Mobi,
    Text,
    Markdown,
    Html,
}

impl BookFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookFormat::Pdf => "pdf",
            BookFormat::Epub => "epub",
            BookFormat::Mobi => "mobi",
            BookFormat::Text => "txt",
            BookFormat::Markdown => "md",
            BookFormat::Html => "html",
        }
    }

    /// True for formats whose natural granularity is finer than whole pages
    #[must_use]
    pub fn is_flowed(&self) -> bool {
        matches!(self, BookFormat::Epub | BookFormat::Mobi)
    }
}

/// Page/continuous presentation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReadingMode {
    #[default]
    Paged,
    Continuous,
}

impl ReadingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingMode::Paged => "Paged",
            ReadingMode::Continuous => "Continuous",
        }
    }
}

/// An open book and its navigation-relevant state.
///
/// `current_page` is 1-based and always within `[1, total_pages]`;
/// mutation goes through the navigation controller, persistence through
/// the external store.
#[derive(Debug, Clone)]
pub struct Book {
    pub id: String,
    pub path: String,
    pub format: BookFormat,
    pub total_pages: usize,
    pub current_page: usize,
    pub mode: ReadingMode,
    pub theme: String,
    pub finished: bool,
    pub last_read: DateTime<Utc>,
    /// Reading position in fractional page units, within
    /// `[1.0, total_pages]` (page 12 read 60% through is 12.6)
    pub precise_progress: f64,
}

impl Book {
    pub fn new(id: impl Into<String>, path: impl Into<String>, format: BookFormat) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            format,
            total_pages: 1,
            current_page: 1,
            mode: ReadingMode::default(),
            theme: "default".to_string(),
            finished: false,
            last_read: Utc::now(),
            precise_progress: 0.0,
        }
    }

    pub fn clamp_page(&self, page: usize) -> usize {
        page.clamp(1, self.total_pages.max(1))
    }
}

const MOBI_MAGIC_OFFSET: usize = 60;
const SNIFF_LEN: usize = 68;

/// Detect the document format from content, falling back to the file
/// extension for the plain-text family (which has no magic bytes).
pub fn sniff_format(path: &Path) -> Result<BookFormat, RenderError> {
    let mut file = File::open(path)?;
    let mut head = [0u8; SNIFF_LEN];
    let read = file.read(&mut head)?;
    let head = &head[..read];

    if head.starts_with(b"%PDF-") {
        return Ok(BookFormat::Pdf);
    }

    // EPUB is a zip container; MOBI is a PalmDB with "BOOKMOBI" at offset 60
    if head.starts_with(b"PK\x03\x04") {
        return Ok(BookFormat::Epub);
    }
    if read >= MOBI_MAGIC_OFFSET + 8 && &head[MOBI_MAGIC_OFFSET..MOBI_MAGIC_OFFSET + 8] == b"BOOKMOBI"
    {
        return Ok(BookFormat::Mobi);
    }

    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("md" | "markdown") => Ok(BookFormat::Markdown),
        Some("html" | "htm" | "xhtml") => Ok(BookFormat::Html),
        Some("txt" | "text") => Ok(BookFormat::Text),
        // Unknown extension: accept as plain text only if it looks like text
        _ if read > 0 && !head.contains(&0) => Ok(BookFormat::Text),
        _ => Err(RenderError::UnsupportedFormat),
    }
}
