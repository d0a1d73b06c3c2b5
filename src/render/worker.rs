//! Render worker - runs in a dedicated thread per opened renderer

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use flume::{Receiver, Sender};
use log::debug;

use crate::render::cache::{FormatCache, PageKey};
use crate::render::renderer::{Renderer, RendererFactory};
use crate::render::request::{ModeVersion, RenderJob, RenderOptions, RenderReply, RequestId};

/// Main worker loop. Opens its own renderer through the factory; an
/// open failure is reported as `InitFailed` so the queue can run the
/// degraded retry.
pub fn render_worker(
    factory: &Arc<dyn RendererFactory>,
    accelerated: bool,
    jobs: &Receiver<RenderJob>,
    replies: &Sender<RenderReply>,
    cache: &Arc<Mutex<FormatCache>>,
    live_version: &Arc<AtomicU64>,
) {
    let mut renderer = match factory.open(accelerated) {
        Ok(r) => r,
        Err(error) => {
            let _ = replies.send(RenderReply::InitFailed { error, accelerated });
            return;
        }
    };

    for job in jobs {
        match job {
            RenderJob::Page {
                id,
                page,
                options,
                token,
            }
            | RenderJob::Preload {
                id,
                page,
                options,
                token,
            } => {
                if live_version.load(Ordering::Acquire) != token.0 {
                    // The generation this job was issued under is gone;
                    // nobody is waiting for the result.
                    debug!("skipping stale render of page {page} (token {})", token.0);
                    continue;
                }
                handle_page_job(
                    renderer.as_ref(),
                    id,
                    page,
                    &options,
                    token,
                    cache,
                    live_version,
                    replies,
                );
            }

            RenderJob::Shutdown => break,
        }
    }

    renderer.dispose();
}

#[allow(clippy::too_many_arguments)]
fn handle_page_job(
    renderer: &dyn Renderer,
    id: RequestId,
    page: usize,
    options: &RenderOptions,
    token: ModeVersion,
    cache: &Arc<Mutex<FormatCache>>,
    live_version: &Arc<AtomicU64>,
    replies: &Sender<RenderReply>,
) {
    let key = PageKey::from_options(page, options);

    let cached = cache
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .get(&key);
    if let Some(artifact) = cached {
        let _ = replies.send(RenderReply::Page {
            id,
            page,
            token,
            artifact,
        });
        return;
    }

    match renderer.render_page(page, options) {
        Ok(data) => {
            let artifact = Arc::new(data);

            // Cache mutation is gated on the token still being live so a
            // render dispatched before a book/mode switch cannot
            // repopulate a cache that was purged by the switch.
            if live_version.load(Ordering::Acquire) == token.0 {
                let put = cache
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .put(key, Arc::clone(&artifact));
                if let Err(e) = put {
                    // Not cached: a performance degradation, not a failure
                    debug!("page {page} not cached: {e}");
                }
            }

            let _ = replies.send(RenderReply::Page {
                id,
                page,
                token,
                artifact,
            });
        }
        Err(error) => {
            let _ = replies.send(RenderReply::Error {
                id,
                page,
                token,
                error,
            });
        }
    }
}
