//! Renderer abstraction and per-format adapters
//!
//! One adapter per format family behind the common `Renderer` trait.
//! Binary formats (PDF/EPUB/MOBI/HTML) wrap opaque backends injected by
//! the host; plain text is paginated in-crate.

use std::path::{Path, PathBuf};

use crate::error::RenderError;
use crate::render::request::RenderOptions;
use crate::render::types::{PageArtifact, TocEntry};

/// Fixed layout geometry a paginating renderer was opened with
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageLayout {
    /// Text columns per line
    pub cols: u32,
    /// Lines per page
    pub rows: usize,
}

impl Default for PageLayout {
    fn default() -> Self {
        Self { cols: 80, rows: 40 }
    }
}

/// Uniform interface over an opened document.
///
/// `render_page` may be called concurrently for distinct pages from
/// distinct workers; implementations must not assume single-caller
/// discipline. Renderers never touch application navigation state.
pub trait Renderer: Send {
    fn page_count(&self) -> usize;

    fn table_of_contents(&self) -> &[TocEntry];

    fn render_page(&self, page: usize, options: &RenderOptions)
    -> Result<PageArtifact, RenderError>;

    /// Fractional document position, for formats whose granularity is
    /// finer than whole pages
    fn precise_progress(&self) -> Option<f64> {
        None
    }

    /// Resolve an intra-document anchor to a page (1-based)
    fn go_to_anchor(&self, id: &str) -> Option<usize>;

    /// Release backend resources; idempotent
    fn dispose(&mut self);
}

/// Opens renderers for the queue: one per worker thread, plus the
/// degraded-retry path when the accelerated backend fails to come up.
pub trait RendererFactory: Send + Sync {
    fn open(&self, accelerated: bool) -> Result<Box<dyn Renderer>, RenderError>;
}

fn disposed() -> RenderError {
    RenderError::Io(std::io::Error::other("renderer disposed"))
}

// ---------------------------------------------------------------------------
// Paged-bitmap formats (PDF)

/// Opaque backend producing rasterized pages
pub trait BitmapBackend: Send {
    fn page_count(&self) -> usize;
    fn toc(&self) -> Vec<TocEntry>;
    /// Rasterize a page (1-based) at the given width, tinted with the
    /// theme colors; returns (RGB pixels, width, height)
    fn rasterize(
        &self,
        page: usize,
        width: u32,
        fg: i32,
        bg: i32,
    ) -> Result<(Vec<u8>, u32, u32), RenderError>;
}

pub struct BitmapRenderer {
    backend: Option<Box<dyn BitmapBackend>>,
    page_count: usize,
    toc: Vec<TocEntry>,
}

impl BitmapRenderer {
    pub fn new(backend: Box<dyn BitmapBackend>) -> Result<Self, RenderError> {
        let page_count = backend.page_count();
        if page_count == 0 {
            return Err(RenderError::corrupt("document has no pages"));
        }
        let toc = backend.toc();
        Ok(Self {
            backend: Some(backend),
            page_count,
            toc,
        })
    }
}

impl Renderer for BitmapRenderer {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn table_of_contents(&self) -> &[TocEntry] {
        &self.toc
    }

    fn render_page(
        &self,
        page: usize,
        options: &RenderOptions,
    ) -> Result<PageArtifact, RenderError> {
        let backend = self.backend.as_ref().ok_or_else(disposed)?;
        let (pixels, width_px, height_px) =
            backend.rasterize(page, options.width, options.fg, options.bg)?;
        Ok(PageArtifact::Bitmap {
            pixels,
            width_px,
            height_px,
        })
    }

    fn go_to_anchor(&self, _id: &str) -> Option<usize> {
        // Bitmap formats address pages, not anchors
        None
    }

    fn dispose(&mut self) {
        self.backend = None;
    }
}

// ---------------------------------------------------------------------------
// Flowed formats (EPUB/MOBI)

/// Opaque backend over a reflowable document, one section per page
pub trait FlowBackend: Send {
    fn section_count(&self) -> usize;
    fn toc(&self) -> Vec<TocEntry>;
    fn layout_section(&self, section: usize, width_cols: u32) -> Result<Vec<String>, RenderError>;
    /// Sub-section document position maintained by the backend
    fn position_fraction(&self) -> f64;
    /// Resolve an anchor id to a section (1-based)
    fn resolve_anchor(&self, id: &str) -> Option<usize>;
}

pub struct FlowedRenderer {
    backend: Option<Box<dyn FlowBackend>>,
    section_count: usize,
    toc: Vec<TocEntry>,
}

impl FlowedRenderer {
    pub fn new(backend: Box<dyn FlowBackend>) -> Result<Self, RenderError> {
        let section_count = backend.section_count();
        if section_count == 0 {
            return Err(RenderError::corrupt("document has no sections"));
        }
        let toc = backend.toc();
        Ok(Self {
            backend: Some(backend),
            section_count,
            toc,
        })
    }
}

impl Renderer for FlowedRenderer {
    fn page_count(&self) -> usize {
        self.section_count
    }

    fn table_of_contents(&self) -> &[TocEntry] {
        &self.toc
    }

    fn render_page(
        &self,
        page: usize,
        options: &RenderOptions,
    ) -> Result<PageArtifact, RenderError> {
        let backend = self.backend.as_ref().ok_or_else(disposed)?;
        let lines = backend.layout_section(page, options.width)?;
        Ok(PageArtifact::Lines {
            lines,
            width_cols: options.width,
        })
    }

    fn precise_progress(&self) -> Option<f64> {
        self.backend.as_ref().map(|b| b.position_fraction())
    }

    fn go_to_anchor(&self, id: &str) -> Option<usize> {
        self.backend.as_ref().and_then(|b| b.resolve_anchor(id))
    }

    fn dispose(&mut self) {
        self.backend = None;
    }
}

// ---------------------------------------------------------------------------
// Paginated plain text (TXT)

/// Plain text paginated in-crate: lines wrapped to the layout width and
/// sliced into fixed-height pages at open time.
#[derive(Debug)]
pub struct PlainTextRenderer {
    pages: Vec<Vec<String>>,
    layout: PageLayout,
    disposed: bool,
}

impl PlainTextRenderer {
    pub fn open(path: &Path, layout: PageLayout) -> Result<Self, RenderError> {
        let bytes = std::fs::read(path)?;
        let text = String::from_utf8(bytes)
            .map_err(|_| RenderError::corrupt("text file is not valid UTF-8"))?;
        Ok(Self::from_text(&text, layout))
    }

    pub fn from_text(text: &str, layout: PageLayout) -> Self {
        let cols = layout.cols.max(1) as usize;
        let mut wrapped: Vec<String> = Vec::new();
        for line in text.lines() {
            if line.is_empty() {
                wrapped.push(String::new());
            } else {
                wrapped.extend(textwrap::wrap(line, cols).into_iter().map(|c| c.into_owned()));
            }
        }

        let rows = layout.rows.max(1);
        let mut pages: Vec<Vec<String>> = wrapped
            .chunks(rows)
            .map(|chunk| chunk.to_vec())
            .collect();
        if pages.is_empty() {
            pages.push(Vec::new());
        }

        Self {
            pages,
            layout,
            disposed: false,
        }
    }
}

impl Renderer for PlainTextRenderer {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn table_of_contents(&self) -> &[TocEntry] {
        &[]
    }

    fn render_page(
        &self,
        page: usize,
        _options: &RenderOptions,
    ) -> Result<PageArtifact, RenderError> {
        if self.disposed {
            return Err(disposed());
        }
        let lines = self
            .pages
            .get(page.wrapping_sub(1))
            .cloned()
            .unwrap_or_default();
        Ok(PageArtifact::Lines {
            lines,
            width_cols: self.layout.cols,
        })
    }

    fn go_to_anchor(&self, _id: &str) -> Option<usize> {
        None
    }

    fn dispose(&mut self) {
        self.disposed = true;
    }
}

/// Factory opening an independent `PlainTextRenderer` per worker
pub struct PlainTextFactory {
    path: PathBuf,
    layout: PageLayout,
}

impl PlainTextFactory {
    pub fn new(path: impl Into<PathBuf>, layout: PageLayout) -> Self {
        Self {
            path: path.into(),
            layout,
        }
    }
}

impl RendererFactory for PlainTextFactory {
    fn open(&self, _accelerated: bool) -> Result<Box<dyn Renderer>, RenderError> {
        Ok(Box::new(PlainTextRenderer::open(&self.path, self.layout)?))
    }
}

// ---------------------------------------------------------------------------
// Static documents (Markdown/HTML)

/// Opaque backend that lays out a whole static document as text lines
pub trait StaticBackend: Send {
    fn layout(&self, width_cols: u32) -> Result<Vec<String>, RenderError>;
    fn toc(&self) -> Vec<TocEntry>;
    /// Resolve an anchor id to a line index in the laid-out document
    fn anchor_line(&self, id: &str) -> Option<usize>;
}

/// Markdown/HTML adapter: the backend handles markup, the adapter
/// slices the laid-out document into fixed-height pages.
pub struct StaticRenderer {
    backend: Option<Box<dyn StaticBackend>>,
    pages: Vec<Vec<String>>,
    toc: Vec<TocEntry>,
    layout: PageLayout,
}

impl StaticRenderer {
    pub fn new(backend: Box<dyn StaticBackend>, layout: PageLayout) -> Result<Self, RenderError> {
        let lines = backend.layout(layout.cols)?;
        let rows = layout.rows.max(1);
        let mut pages: Vec<Vec<String>> = lines.chunks(rows).map(|c| c.to_vec()).collect();
        if pages.is_empty() {
            pages.push(Vec::new());
        }
        let toc = backend.toc();
        Ok(Self {
            backend: Some(backend),
            pages,
            toc,
            layout,
        })
    }

    fn line_to_page(&self, line: usize) -> usize {
        line / self.layout.rows.max(1) + 1
    }
}

impl Renderer for StaticRenderer {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn table_of_contents(&self) -> &[TocEntry] {
        &self.toc
    }

    fn render_page(
        &self,
        page: usize,
        _options: &RenderOptions,
    ) -> Result<PageArtifact, RenderError> {
        if self.backend.is_none() {
            return Err(disposed());
        }
        let lines = self
            .pages
            .get(page.wrapping_sub(1))
            .cloned()
            .unwrap_or_default();
        Ok(PageArtifact::Lines {
            lines,
            width_cols: self.layout.cols,
        })
    }

    fn go_to_anchor(&self, id: &str) -> Option<usize> {
        let backend = self.backend.as_ref()?;
        backend.anchor_line(id).map(|line| self.line_to_page(line))
    }

    fn dispose(&mut self) {
        self.backend = None;
    }
}
