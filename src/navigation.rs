//! Navigation controller: page/chapter movement, seek-scrub
//! decoupling and the single-slot undo jump.
//!
//! Pure state machine in the Command/Effect style; the session owns
//! executing effects against the render queue and the store.

use std::time::{Duration, Instant};

use log::debug;

use crate::render::types::{TocEntry, TocTarget};

/// A recorded jump that can be reversed once. A new jump overwrites
/// the slot rather than stacking.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UndoJump {
    /// Precise page position the jump left from
    pub from_progress: f64,
    /// Page the jump landed on
    pub to_progress: f64,
}

/// Seek-scrub phase. Values inside `Seeking` are display-only; nothing
/// reaches committed navigation until the seek ends.
#[derive(Clone, Copy, Debug)]
enum SeekPhase {
    Idle,
    Seeking {
        seek_page: usize,
        started: Instant,
        last_change: Instant,
        /// Last page a throttled preview render was emitted for
        previewed: Option<usize>,
    },
}

/// Navigation commands
#[derive(Clone, Debug)]
pub enum NavCommand {
    /// Go to a page; out-of-range targets are clamped, never errors
    GoToPage(usize),
    PrevChapter,
    NextChapter,
    /// Commit a seek at the given page
    SeekEnd(usize),
    /// Reverse the recorded jump, if any
    Undo,
}

/// Effects produced by navigation changes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NavEffect {
    /// Render a page (1-based)
    Render(usize),
    /// Refresh the preload window around the current page
    Preload,
    /// Push progress to the persistence collaborator
    PersistProgress,
}

pub struct NavState {
    /// Committed page, 1-based, always in `[1, total_pages]`
    pub current_page: usize,
    pub total_pages: usize,
    toc: Vec<TocEntry>,
    /// Sub-page position as a fractional page number
    precise_position: f64,
    seek: SeekPhase,
    undo: Option<UndoJump>,
    seek_quiet: Duration,
}

impl NavState {
    pub fn new(total_pages: usize, seek_quiet: Duration) -> Self {
        Self {
            current_page: 1,
            total_pages: total_pages.max(1),
            toc: Vec::new(),
            precise_position: 1.0,
            seek: SeekPhase::Idle,
            undo: None,
            seek_quiet,
        }
    }

    pub fn set_toc(&mut self, toc: Vec<TocEntry>) {
        self.toc = toc;
    }

    pub fn set_total_pages(&mut self, total: usize) {
        self.total_pages = total.max(1);
        if self.current_page > self.total_pages {
            self.current_page = self.total_pages;
        }
    }

    /// Update the precise position from scroll (continuous mode)
    pub fn set_precise_position(&mut self, position: f64) {
        self.precise_position = position.clamp(1.0, self.total_pages as f64);
    }

    #[must_use]
    pub fn precise_position(&self) -> f64 {
        self.precise_position
    }

    #[must_use]
    pub fn undo_active(&self) -> bool {
        self.undo.is_some()
    }

    #[must_use]
    pub fn undo_slot(&self) -> Option<UndoJump> {
        self.undo
    }

    #[must_use]
    pub fn is_seeking(&self) -> bool {
        matches!(self.seek, SeekPhase::Seeking { .. })
    }

    /// The page shown by the seek affordance while scrubbing
    #[must_use]
    pub fn seek_page(&self) -> Option<usize> {
        match self.seek {
            SeekPhase::Seeking { seek_page, .. } => Some(seek_page),
            SeekPhase::Idle => None,
        }
    }

    fn clamp(&self, page: usize) -> usize {
        page.clamp(1, self.total_pages)
    }

    /// Apply a command and return resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: NavCommand) -> Vec<NavEffect> {
        match cmd {
            NavCommand::GoToPage(page) => self.go_to_page(page, true),

            NavCommand::PrevChapter => match self.chapter_before(self.current_page) {
                Some(page) => self.go_to_page(page, true),
                None => vec![],
            },

            NavCommand::NextChapter => match self.chapter_after(self.current_page) {
                Some(page) => self.go_to_page(page, true),
                None => vec![],
            },

            NavCommand::SeekEnd(page) => {
                self.seek = SeekPhase::Idle;
                self.go_to_page(page, true)
            }

            NavCommand::Undo => match self.undo.take() {
                Some(jump) => {
                    let target = jump.from_progress.round().max(1.0) as usize;
                    // Undo never records a new slot
                    self.go_to_page(target, false)
                }
                None => vec![],
            },
        }
    }

    /// Jump to an anchor's resolved page. Anchor jumps always record
    /// the undo slot, even when the page number does not change (the
    /// anchor may only move the position within the page).
    #[must_use]
    pub fn go_to_anchor_page(&mut self, page: usize) -> Vec<NavEffect> {
        let target = self.clamp(page);
        self.handle_jump(self.precise_position, target as f64, true);
        self.go_to_page(target, false)
    }

    fn go_to_page(&mut self, page: usize, record_undo: bool) -> Vec<NavEffect> {
        let target = self.clamp(page);
        if record_undo {
            self.handle_jump(self.precise_position, target as f64, false);
        }
        self.current_page = target;
        self.precise_position = target as f64;
        vec![
            NavEffect::Render(target),
            NavEffect::Preload,
            NavEffect::PersistProgress,
        ]
    }

    /// Record a jump into the single undo slot. `force` records even
    /// when the page number did not change (continuous-mode anchor
    /// jumps that only move the scroll position).
    pub fn handle_jump(&mut self, from: f64, to: f64, force: bool) {
        if from == to && !force {
            return;
        }
        debug!("recording jump {from} -> {to}");
        self.undo = Some(UndoJump {
            from_progress: from,
            to_progress: to,
        });
    }

    /// Begin a seek scrub; committed navigation is untouched
    pub fn seek_start(&mut self, now: Instant) {
        self.seek = SeekPhase::Seeking {
            seek_page: self.current_page,
            started: now,
            last_change: now,
            previewed: None,
        };
    }

    /// Update the scrub position for display only: no render, no
    /// navigation
    pub fn seek_change(&mut self, page: usize, now: Instant) {
        let page = self.clamp(page);
        if let SeekPhase::Seeking {
            seek_page,
            last_change,
            previewed,
            ..
        } = &mut self.seek
        {
            if *seek_page != page {
                *seek_page = page;
                *previewed = None;
            }
            *last_change = now;
        }
    }

    /// Throttled preview render while scrubbing: returns the seek page
    /// once a quiet period has elapsed since the last change, at most
    /// once per scrub position. Keeps fast scrubs from flooding the
    /// queue with renders for skipped positions.
    pub fn take_seek_preview(&mut self, now: Instant) -> Option<usize> {
        let quiet = self.seek_quiet;
        if let SeekPhase::Seeking {
            seek_page,
            last_change,
            previewed,
            ..
        } = &mut self.seek
        {
            if now.duration_since(*last_change) >= quiet && *previewed != Some(*seek_page) {
                *previewed = Some(*seek_page);
                return Some(*seek_page);
            }
        }
        None
    }

    /// Nearest TOC entry strictly before the page
    fn chapter_before(&self, page: usize) -> Option<usize> {
        self.toc
            .iter()
            .filter_map(|e| match e.target {
                TocTarget::Page(p) if p < page => Some(p),
                _ => None,
            })
            .max()
    }

    /// Nearest TOC entry strictly after the page
    fn chapter_after(&self, page: usize) -> Option<usize> {
        self.toc
            .iter()
            .filter_map(|e| match e.target {
                TocTarget::Page(p) if p > page => Some(p),
                _ => None,
            })
            .min()
    }
}
