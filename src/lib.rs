//! Cross-format document reading engine: renderer abstraction, render
//! queue with generation-token staleness control, byte-budgeted page
//! caches, navigation with undo, pinch-zoom gestures and reading
//! session tracking.
//!
//! The host owns the actual drawing surface and the persistent library
//! database; both plug in through the [`Surface`] and
//! [`store::BookStore`] traits.

pub mod book;
pub mod bridge;
pub mod error;
pub mod gesture;
pub mod navigation;
pub mod render;
pub mod session;
pub mod settings;
pub mod store;
pub mod tracker;

pub mod test_utils;

pub use book::{Book, BookFormat, ReadingMode, sniff_format};
pub use error::{CacheError, RenderError};
pub use gesture::{GestureController, TouchPoint, Transform};
pub use navigation::{NavCommand, NavEffect, NavState, UndoJump};
pub use render::queue::{QueueConfig, RenderOutcome, RenderQueue};
pub use render::renderer::{Renderer, RendererFactory};
pub use render::request::{ModeVersion, RenderOptions};
pub use render::types::{PageArtifact, Surface, TocEntry, TocTarget};
pub use session::{EventBus, ReaderEvent, ReaderSession, UiState};
pub use store::{BookRecord, BookStore, JsonBookStore};
pub use tracker::SessionTracker;

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use simplelog::{Config, LevelFilter, WriteLogger};

/// Route `log` output to a file. The engine never writes to stdout;
/// the host usually owns the terminal or screen.
pub fn init_file_logging(path: impl AsRef<Path>, level: LevelFilter) -> Result<()> {
    let file = File::create(path.as_ref())
        .with_context(|| format!("Failed to create log file {:?}", path.as_ref()))?;
    WriteLogger::init(level, Config::default(), file).context("Failed to install logger")?;
    Ok(())
}
