//! Mock renderers, surfaces and polling helpers shared by unit and
//! integration tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::error::RenderError;
use crate::render::queue::{RenderOutcome, RenderQueue};
use crate::render::renderer::{Renderer, RendererFactory};
use crate::render::request::RenderOptions;
use crate::render::types::{PageArtifact, Surface, TocEntry, TocTarget};

/// Scripted renderer factory. Every opened renderer shares the
/// factory's counters so tests can assert on render and open calls.
pub struct MockFactory {
    pages: usize,
    toc: Vec<TocEntry>,
    render_delay: Duration,
    fail_accelerated: bool,
    fail_all: bool,
    artifact_bytes: usize,
    progress: Option<f64>,
    pub opens: AtomicUsize,
    pub renders: Arc<AtomicUsize>,
}

impl MockFactory {
    #[must_use]
    pub fn pages(pages: usize) -> Self {
        Self {
            pages,
            toc: Vec::new(),
            render_delay: Duration::ZERO,
            fail_accelerated: false,
            fail_all: false,
            artifact_bytes: 64,
            progress: None,
            opens: AtomicUsize::new(0),
            renders: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn with_render_delay(mut self, delay: Duration) -> Self {
        self.render_delay = delay;
        self
    }

    #[must_use]
    pub fn with_toc(mut self, toc: Vec<TocEntry>) -> Self {
        self.toc = toc;
        self
    }

    /// Accelerated opens fail, degraded opens succeed
    #[must_use]
    pub fn fail_accelerated_init(mut self) -> Self {
        self.fail_accelerated = true;
        self
    }

    /// Every open fails, regardless of mode
    #[must_use]
    pub fn fail_all_init(mut self) -> Self {
        self.fail_all = true;
        self
    }

    /// Pixel payload size of each rendered page
    #[must_use]
    pub fn with_artifact_bytes(mut self, bytes: usize) -> Self {
        self.artifact_bytes = bytes;
        self
    }

    /// Renderers report this whole-document position fraction, the way
    /// a flowed-format backend would
    #[must_use]
    pub fn reporting_progress(mut self, fraction: f64) -> Self {
        self.progress = Some(fraction);
        self
    }

    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

impl RendererFactory for MockFactory {
    fn open(&self, accelerated: bool) -> Result<Box<dyn Renderer>, RenderError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_all || (self.fail_accelerated && accelerated) {
            return Err(RenderError::worker_init(format!(
                "mock init failure (accelerated={accelerated})"
            )));
        }
        Ok(Box::new(MockRenderer {
            pages: self.pages,
            toc: self.toc.clone(),
            render_delay: self.render_delay,
            artifact_bytes: self.artifact_bytes,
            progress: self.progress,
            renders: Arc::clone(&self.renders),
        }))
    }
}

struct MockRenderer {
    pages: usize,
    toc: Vec<TocEntry>,
    render_delay: Duration,
    artifact_bytes: usize,
    progress: Option<f64>,
    renders: Arc<AtomicUsize>,
}

impl Renderer for MockRenderer {
    fn page_count(&self) -> usize {
        self.pages
    }

    fn table_of_contents(&self) -> &[TocEntry] {
        &self.toc
    }

    fn render_page(
        &self,
        page: usize,
        _options: &RenderOptions,
    ) -> Result<PageArtifact, RenderError> {
        if self.render_delay > Duration::ZERO {
            std::thread::sleep(self.render_delay);
        }
        if page == 0 || page > self.pages {
            return Err(RenderError::corrupt(format!("page {page} out of range")));
        }
        self.renders.fetch_add(1, Ordering::SeqCst);
        // One pixel row per page, payload sized by the factory
        Ok(PageArtifact::Bitmap {
            pixels: vec![(page % 256) as u8; self.artifact_bytes],
            width_px: (self.artifact_bytes / 3).max(1) as u32,
            height_px: 1,
        })
    }

    fn precise_progress(&self) -> Option<f64> {
        self.progress
    }

    // Anchors follow the `chN` naming of `anchor_toc`, landing on the
    // same pages `chapter_toc` uses
    fn go_to_anchor(&self, id: &str) -> Option<usize> {
        let n: usize = id.strip_prefix("ch")?.parse().ok()?;
        let page = (n.checked_sub(1)?) * 10 + 1;
        (page <= self.pages).then_some(page)
    }

    fn dispose(&mut self) {}
}

/// Polls the queue until `expected` outcomes have settled or two
/// seconds pass, whichever comes first.
pub fn wait_for(queue: &mut RenderQueue, expected: usize) -> Vec<RenderOutcome> {
    let deadline = Instant::now() + Duration::from_secs(2);
    let mut outcomes = Vec::new();
    while outcomes.len() < expected && Instant::now() < deadline {
        outcomes.extend(queue.poll(Instant::now()));
        std::thread::sleep(Duration::from_millis(2));
    }
    outcomes
}

/// Surface that records applied pages instead of drawing them
#[derive(Default)]
pub struct MemorySurface {
    pub applied: Vec<(usize, u64)>,
}

impl MemorySurface {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_applied_page(&self) -> Option<usize> {
        self.applied.last().map(|(page, _)| *page)
    }
}

impl Surface for MemorySurface {
    fn apply(&mut self, page: usize, artifact: &PageArtifact) {
        self.applied.push((page, artifact.size_bytes()));
    }

    fn snapshot(&self) -> Option<(u32, u32, Vec<u8>)> {
        let (_, size) = *self.applied.last()?;
        let width = (size / 3).max(1) as u32;
        Some((width, 1, vec![0x7F; (width * 3) as usize]))
    }
}

/// Chapter starts at pages 1, 11, 21, ... for quick navigation tests
#[must_use]
pub fn chapter_toc(chapters: usize) -> Vec<TocEntry> {
    (0..chapters)
        .map(|i| TocEntry {
            title: format!("Chapter {}", i + 1),
            level: 0,
            target: TocTarget::Page(i * 10 + 1),
        })
        .collect()
}

/// Same chapters as `chapter_toc`, but addressed by anchor id the way
/// reflowable formats build their contents tables
#[must_use]
pub fn anchor_toc(chapters: usize) -> Vec<TocEntry> {
    (0..chapters)
        .map(|i| TocEntry {
            title: format!("Chapter {}", i + 1),
            level: 0,
            target: TocTarget::Anchor(format!("ch{}", i + 1)),
        })
        .collect()
}
