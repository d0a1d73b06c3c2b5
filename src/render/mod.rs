//! Rendering infrastructure: caches, workers, the mode coordinator and
//! the continuous-scroll window

use std::time::Duration;

pub mod cache;
pub mod queue;
pub mod renderer;
pub mod request;
pub mod types;
pub mod window;
pub mod worker;

pub use cache::{FormatCache, PageKey};
pub use queue::{QueueConfig, RenderOutcome, RenderQueue};
pub use renderer::{
    BitmapBackend, BitmapRenderer, FlowBackend, FlowedRenderer, PageLayout, PlainTextFactory,
    PlainTextRenderer, Renderer, RendererFactory, StaticBackend, StaticRenderer,
};
pub use request::{ModeVersion, RenderJob, RenderOptions, RenderReply, RequestId};
pub use types::{PageArtifact, Surface, TocEntry, TocTarget};
pub use window::{PageGeometry, ScrollPredictor, VelocityPredictor, render_window};

/// Default worker threads per opened book
pub const DEFAULT_WORKERS: usize = 2;

/// Default preload radius around the current page
pub const DEFAULT_PRELOAD_RANGE: usize = 5;

/// Default per-render decode deadline
pub const DEFAULT_DECODE_TIMEOUT: Duration = Duration::from_secs(10);
