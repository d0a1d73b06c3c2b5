//! Reading session: the root object tying a book, its render queue,
//! navigation, gestures and progress tracking together behind one
//! small host-facing API.
//!
//! The session is per-book; switching books means dropping the session
//! (which shuts the worker pool down) and opening a new one. Mode and
//! appearance switches stay inside the session and invalidate exactly
//! one render generation.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::book::{Book, ReadingMode, sniff_format};
use crate::error::RenderError;
use crate::gesture::{GestureController, TouchPoint, Transform};
use crate::navigation::{NavCommand, NavEffect, NavState};
use crate::render::queue::{QueueConfig, RenderOutcome, RenderQueue};
use crate::render::renderer::{Renderer, RendererFactory};
use crate::render::request::RenderOptions;
use crate::render::types::{Surface, TocEntry, TocTarget};
use crate::render::window::{PageGeometry, ScrollPredictor, VelocityPredictor, render_window};
use crate::settings::ReaderSettings;
use crate::store::BookStore;
use crate::tracker::SessionTracker;

/// Estimated page height before the first real render reports one
const ESTIMATED_PAGE_HEIGHT: u32 = 1200;
/// How far ahead the scroll predictor looks when extending the window
const PREDICT_HORIZON: Duration = Duration::from_millis(300);

/// Notifications published by the session after each call into it
#[derive(Debug, Clone, PartialEq)]
pub enum ReaderEvent {
    PageChanged { page: usize },
    ContentReady { page: usize },
    RenderFailed { page: usize, detail: String },
    UndoChanged { active: bool },
    Finished,
    Fatal { detail: String },
}

/// Publish/subscribe fanout for [`ReaderEvent`]s, owned by the session.
///
/// Subscribers are called synchronously at publish time; events are
/// also queued so polling hosts can drain them instead.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Box<dyn FnMut(&ReaderEvent) + Send>>,
    queued: VecDeque<ReaderEvent>,
}

impl EventBus {
    pub fn subscribe(&mut self, subscriber: impl FnMut(&ReaderEvent) + Send + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    fn publish(&mut self, event: ReaderEvent) {
        for subscriber in &mut self.subscribers {
            subscriber(&event);
        }
        self.queued.push_back(event);
    }

    fn drain(&mut self) -> Vec<ReaderEvent> {
        self.queued.drain(..).collect()
    }
}

/// Snapshot for the host's status chrome
#[derive(Debug, Clone, PartialEq)]
pub struct UiState {
    pub current_page: usize,
    pub total_pages: usize,
    pub content_ready: bool,
    pub undo_active: bool,
    pub seeking: Option<usize>,
    pub zoomed: bool,
}

pub struct ReaderSession {
    book: Book,
    queue: RenderQueue,
    nav: NavState,
    gesture: GestureController,
    tracker: SessionTracker,
    store: Box<dyn BookStore>,
    surface: Box<dyn Surface>,
    /// Session-thread renderer for anchors and precise progress; the
    /// workers hold their own
    meta: Box<dyn Renderer>,
    geometry: PageGeometry,
    predictor: VelocityPredictor,
    settings: ReaderSettings,
    viewport_height: u32,
    scroll_offset: u64,
    content_ready: bool,
    undo_was_active: bool,
    events: EventBus,
}

impl ReaderSession {
    /// Open a book: sniff the format, read document metadata through a
    /// short-lived renderer, resume the stored position and start the
    /// worker pool.
    pub fn open(
        id: impl Into<String>,
        path: impl AsRef<Path>,
        factory: Arc<dyn RendererFactory>,
        store: Box<dyn BookStore>,
        surface: Box<dyn Surface>,
        settings: ReaderSettings,
    ) -> Result<Self, RenderError> {
        let id = id.into();
        let path = path.as_ref();
        let format = sniff_format(path)?;

        let mut options = RenderOptions::default();
        let meta = match factory.open(options.accelerated) {
            Ok(renderer) => renderer,
            Err(e) if options.accelerated => {
                warn!("accelerated open failed, retrying degraded: {e}");
                options.accelerated = false;
                factory.open(false)?
            }
            Err(e) => return Err(e),
        };
        let total_pages = meta.page_count();
        let toc = resolve_toc_anchors(meta.table_of_contents().to_vec(), meta.as_ref());

        let mut book = Book::new(id.clone(), path.to_string_lossy(), format);
        book.total_pages = total_pages;

        if let Some(record) = store.get_book(&id) {
            book.current_page = book.clamp_page(record.current_page);
            book.precise_progress = record.precise_progress;
            book.mode = record.mode;
            book.finished = record.finished;
            debug!("resuming {id} at page {}", book.current_page);
        }

        let mut queue = RenderQueue::new(
            factory,
            QueueConfig {
                cache_budget: settings.cache_budget_bytes(format),
                preload_range: settings.preload_range,
                decode_timeout: settings.decode_timeout(),
                options,
                ..QueueConfig::default()
            },
        );
        queue.set_page_count(total_pages);
        queue.set_current_page(book.current_page);

        let mut nav = NavState::new(total_pages, settings.seek_quiet());
        nav.set_toc(toc);
        nav.current_page = book.current_page;
        nav.set_precise_position(book.precise_progress.max(1.0));

        let geometry = PageGeometry::uniform(
            total_pages,
            ESTIMATED_PAGE_HEIGHT,
            u32::from(settings.page_gap),
        );
        // A continuous-mode resume starts scrolled to the stored page
        let scroll_offset = match book.mode {
            ReadingMode::Continuous => geometry.page_top(book.current_page),
            ReadingMode::Paged => 0,
        };
        let tracker = SessionTracker::new(settings.idle_cutoff(), settings.auto_finish_ratio);

        info!(
            "opened {} ({}, {total_pages} pages) at page {}",
            book.id,
            format.as_str(),
            book.current_page
        );

        let mut session = Self {
            book,
            queue,
            nav,
            gesture: GestureController::new(800.0, 1200.0),
            tracker,
            store,
            surface,
            meta,
            geometry,
            predictor: VelocityPredictor::default(),
            settings,
            viewport_height: 1200,
            scroll_offset,
            content_ready: false,
            undo_was_active: false,
            events: EventBus::default(),
        };
        session.queue.submit_page(session.nav.current_page);
        session.queue.schedule_preload();
        Ok(session)
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport_height = height.max(1);
        self.gesture.set_viewport(width as f32, height as f32);
    }

    #[must_use]
    pub fn book(&self) -> &Book {
        &self.book
    }

    #[must_use]
    pub fn ui_state(&self) -> UiState {
        UiState {
            current_page: self.nav.current_page,
            total_pages: self.nav.total_pages,
            content_ready: self.content_ready,
            undo_active: self.nav.undo_active(),
            seeking: self.nav.seek_page(),
            zoomed: self.gesture.is_zoomed(),
        }
    }

    #[must_use]
    pub fn transform(&self) -> Transform {
        self.gesture.transform()
    }

    /// Register a synchronous event subscriber
    pub fn subscribe(&mut self, subscriber: impl FnMut(&ReaderEvent) + Send + 'static) {
        self.events.subscribe(subscriber);
    }

    /// Drain queued events, for hosts that poll instead of subscribing
    pub fn drain_events(&mut self) -> Vec<ReaderEvent> {
        self.events.drain()
    }

    /// Run a navigation command and carry out its effects
    pub fn command(&mut self, cmd: NavCommand, now: Instant) {
        let effects = self.nav.apply(cmd);
        self.run_effects(&effects, now);
    }

    pub fn go_to_page(&mut self, page: usize, now: Instant) {
        self.command(NavCommand::GoToPage(page), now);
    }

    pub fn undo_jump(&mut self, now: Instant) {
        self.command(NavCommand::Undo, now);
    }

    /// Jump to an intra-document anchor (contents/bookmark tap).
    /// Returns false when the renderer cannot resolve the id. The jump
    /// records the undo slot even when it stays on the current page.
    pub fn go_to_anchor(&mut self, id: &str, now: Instant) -> bool {
        let Some(page) = self.meta.go_to_anchor(id) else {
            warn!("anchor {id:?} not found in {}", self.book.id);
            return false;
        };
        let effects = self.nav.go_to_anchor_page(page);
        self.run_effects(&effects, now);
        true
    }

    pub fn seek_start(&mut self, now: Instant) {
        self.nav.seek_start(now);
    }

    pub fn seek_change(&mut self, page: usize, now: Instant) {
        self.nav.seek_change(page, now);
        self.tracker.note_activity(now);
    }

    pub fn seek_end(&mut self, page: usize, now: Instant) {
        self.command(NavCommand::SeekEnd(page), now);
    }

    /// Switch paged/continuous presentation. Invalidates exactly one
    /// render generation; in-flight renders for the old mode can no
    /// longer settle.
    pub fn switch_mode(&mut self, mode: ReadingMode, now: Instant) {
        if self.book.mode == mode {
            return;
        }
        info!("switching {} to {mode:?} mode", self.book.id);
        self.book.mode = mode;
        self.content_ready = false;

        self.queue.bump_generation();
        self.gesture.reset();
        self.predictor.reset();
        self.scroll_offset = self
            .geometry
            .page_top(self.nav.current_page);

        self.queue.set_current_page(self.nav.current_page);
        self.queue.submit_page(self.nav.current_page);
        self.queue.schedule_preload();
        self.persist(now);
    }

    /// Re-render under new appearance options (theme, width). The page
    /// cache is keyed on them, so this only invalidates, no token bump.
    pub fn set_render_options(&mut self, options: RenderOptions) {
        self.queue.set_options(options);
        self.content_ready = false;
        self.queue.submit_page(self.nav.current_page);
        self.queue.schedule_preload();
    }

    /// Continuous-mode scroll. Derives the committed page from the
    /// offset and keeps the render window filled around both the
    /// visible and the predicted position.
    pub fn scroll_to(&mut self, offset: u64, now: Instant) {
        if self.book.mode != ReadingMode::Continuous {
            return;
        }
        let offset = offset.min(self.geometry.total_height().saturating_sub(1));
        self.scroll_offset = offset;
        self.predictor.record(offset, now);
        self.tracker.note_activity(now);

        let window = render_window(
            &self.geometry,
            offset,
            self.viewport_height,
            &self.predictor,
            PREDICT_HORIZON,
            now,
        );
        for page in window {
            self.queue.submit_page_if_needed(page);
        }

        let page = self.geometry.page_at(offset);
        if page != self.nav.current_page {
            self.nav.current_page = page;
            self.nav.set_precise_position(self.precise_from_offset(offset));
            self.queue.set_current_page(page);
            self.events.publish(ReaderEvent::PageChanged { page });
            self.persist(now);
        } else {
            self.nav.set_precise_position(self.precise_from_offset(offset));
        }
    }

    fn precise_from_offset(&self, offset: u64) -> f64 {
        let page = self.geometry.page_at(offset);
        let top = self.geometry.page_top(page);
        let height = f64::from(self.geometry.height_of(page).max(1));
        page as f64 + (offset.saturating_sub(top) as f64 / height).min(0.999)
    }

    pub fn touch_down(&mut self, points: &[TouchPoint], now: Instant) {
        self.gesture.on_touch_down(points);
        self.tracker.note_activity(now);
    }

    pub fn touch_move(&mut self, points: &[TouchPoint], now: Instant) {
        self.gesture.on_touch_move(points);
        self.tracker.note_activity(now);
    }

    pub fn touch_up(&mut self, remaining: &[TouchPoint], now: Instant) {
        self.gesture.on_touch_up(remaining);
        self.tracker.note_activity(now);
    }

    /// Pump the queue: apply fresh artifacts to the surface, surface
    /// failures, flush throttled seek previews and emit undo changes.
    /// Call once per host frame.
    pub fn tick(&mut self, now: Instant) {
        if let Some(page) = self.nav.take_seek_preview(now) {
            debug!("seek preview render for page {page}");
            self.queue.submit_page_if_needed(page);
        }

        for outcome in self.queue.poll(now) {
            match outcome {
                RenderOutcome::Fresh { page, artifact } => {
                    self.geometry.set_height(page, artifact.height());
                    // Preload completions warm the cache and geometry;
                    // only pages the user can see reach the surface.
                    let visible = self.book.mode == ReadingMode::Continuous
                        || page == self.nav.current_page
                        || self.nav.seek_page() == Some(page);
                    if visible {
                        self.surface.apply(page, &artifact);
                    }
                    if page == self.nav.current_page {
                        self.content_ready = true;
                    }
                    self.events.publish(ReaderEvent::ContentReady { page });
                }
                RenderOutcome::Failed { page, error } => {
                    // Last good page stays applied
                    warn!("render of page {page} failed: {error}");
                    self.events.publish(ReaderEvent::RenderFailed {
                        page,
                        detail: error.to_string(),
                    });
                }
                RenderOutcome::Fatal(error) => {
                    self.events.publish(ReaderEvent::Fatal {
                        detail: error.to_string(),
                    });
                }
            }
        }

        let undo_active = self.nav.undo_active();
        if undo_active != self.undo_was_active {
            self.undo_was_active = undo_active;
            self.events
                .publish(ReaderEvent::UndoChanged { active: undo_active });
        }
    }

    /// Encode the surface's current pixels as a PNG, for sharing and
    /// bug reports
    pub fn capture(&self) -> Result<Vec<u8>, RenderError> {
        use image::{ExtendedColorType, ImageEncoder, codecs::png::PngEncoder};

        let Some((width, height, pixels)) = self.surface.snapshot() else {
            return Err(RenderError::corrupt("nothing rendered to capture"));
        };
        let mut out = Vec::new();
        PngEncoder::new(&mut out)
            .write_image(&pixels, width, height, ExtendedColorType::Rgb8)
            .map_err(|e| RenderError::corrupt(format!("png encoding failed: {e}")))?;
        Ok(out)
    }

    fn run_effects(&mut self, effects: &[NavEffect], now: Instant) {
        for effect in effects {
            match effect {
                NavEffect::Render(page) => {
                    self.content_ready = false;
                    self.queue.set_current_page(*page);
                    self.queue.submit_page(*page);
                    if self.book.mode == ReadingMode::Continuous {
                        self.scroll_offset = self.geometry.page_top(*page);
                        self.predictor.reset();
                    }
                    self.events
                        .publish(ReaderEvent::PageChanged { page: *page });
                }
                NavEffect::Preload => self.queue.schedule_preload(),
                NavEffect::PersistProgress => self.persist(now),
            }
        }
    }

    fn persist(&mut self, now: Instant) {
        // Flowed backends track their own sub-page position, finer than
        // anything scroll geometry can derive
        if let Some(fraction) = self.meta.precise_progress() {
            self.nav
                .set_precise_position(fraction * self.nav.total_pages as f64);
        }
        self.book.current_page = self.nav.current_page;
        self.book.precise_progress = self.nav.precise_position();
        if self
            .tracker
            .on_progress(&mut self.book, self.store.as_mut(), now)
        {
            self.events.publish(ReaderEvent::Finished);
        }
    }

    /// Current continuous-mode scroll offset in content units
    #[must_use]
    pub fn scroll_offset(&self) -> u64 {
        self.scroll_offset
    }

    /// Direct read access for hosts drawing their own chrome
    #[must_use]
    pub fn is_page_cached(&self, page: usize) -> bool {
        self.queue.is_page_cached(page)
    }

    #[must_use]
    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }
}

impl Drop for ReaderSession {
    fn drop(&mut self) {
        self.meta.dispose();
    }
}

/// Pin anchor targets to pages while a renderer is at hand, so chapter
/// navigation works uniformly over page- and anchor-addressed contents
/// tables. Unresolvable anchors keep their target and are skipped by
/// chapter walks.
fn resolve_toc_anchors(toc: Vec<TocEntry>, renderer: &dyn Renderer) -> Vec<TocEntry> {
    toc.into_iter()
        .map(|mut entry| {
            if let TocTarget::Anchor(id) = &entry.target {
                match renderer.go_to_anchor(id) {
                    Some(page) => entry.target = TocTarget::Page(page),
                    None => debug!("contents anchor {id:?} did not resolve"),
                }
            }
            entry
        })
        .collect()
}
