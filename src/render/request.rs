//! Render job and reply types

use std::sync::Arc;

use crate::error::RenderError;
use crate::render::types::PageArtifact;

/// Unique identifier for render jobs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Generation counter identifying the current (book, reading-mode)
/// generation. Incremented exactly once per book or mode switch; a
/// render result is applied only if its captured token equals the live
/// value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModeVersion(pub u64);

impl ModeVersion {
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Options captured per render job
#[derive(Clone, Debug, PartialEq)]
pub struct RenderOptions {
    /// Theme foreground/background as packed RGB
    pub fg: i32,
    pub bg: i32,
    /// Gap between pages in continuous mode
    pub page_gap: u16,
    /// Target width in columns/pixels depending on the backend
    pub width: u32,
    /// Whether the accelerated backend path may be used
    pub accelerated: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            fg: 0x000000,
            bg: 0xFFFFFF,
            page_gap: 1,
            width: 80,
            accelerated: true,
        }
    }
}

/// Request sent to render workers
#[derive(Debug)]
pub enum RenderJob {
    /// Render a page (foreground priority)
    Page {
        id: RequestId,
        page: usize,
        options: RenderOptions,
        token: ModeVersion,
    },

    /// Fill the cache ahead of need (background priority)
    Preload {
        id: RequestId,
        page: usize,
        options: RenderOptions,
        token: ModeVersion,
    },

    /// Shutdown the worker
    Shutdown,
}

impl RenderJob {
    #[must_use]
    pub fn token(&self) -> Option<ModeVersion> {
        match self {
            RenderJob::Page { token, .. } | RenderJob::Preload { token, .. } => Some(*token),
            RenderJob::Shutdown => None,
        }
    }
}

/// Response from render workers
#[derive(Debug)]
pub enum RenderReply {
    /// Rendered page data, echoing the captured token
    Page {
        id: RequestId,
        page: usize,
        token: ModeVersion,
        artifact: Arc<PageArtifact>,
    },

    /// Error during rendering
    Error {
        id: RequestId,
        page: usize,
        token: ModeVersion,
        error: RenderError,
    },

    /// Worker failed before serving any request
    InitFailed {
        error: RenderError,
        /// Whether the failed worker was using the accelerated backend
        accelerated: bool,
    },
}
