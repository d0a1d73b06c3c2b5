//! Render queue / mode coordinator
//!
//! Owns the live `ModeVersion`, the worker pool and the per-format
//! cache. Every submitted job captures the live token; results whose
//! token is stale by the time they arrive are discarded without
//! touching cache or surface. Book and mode switches bump the token
//! exactly once and purge in-memory state; renders already dispatched
//! to a backend cannot be aborted, so the token check is the sole
//! correctness guarantee against stale results.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use flume::{Receiver, Sender};
use log::{debug, warn};

use crate::error::RenderError;
use crate::render::cache::{FormatCache, PageKey};
use crate::render::renderer::RendererFactory;
use crate::render::request::{ModeVersion, RenderJob, RenderOptions, RenderReply, RequestId};
use crate::render::types::PageArtifact;
use crate::render::worker::render_worker;
use crate::render::{DEFAULT_DECODE_TIMEOUT, DEFAULT_PRELOAD_RANGE, DEFAULT_WORKERS};

/// Queue construction parameters
#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub workers: usize,
    pub cache_budget: u64,
    pub preload_range: usize,
    pub decode_timeout: Duration,
    pub options: RenderOptions,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            cache_budget: 32 * 1024 * 1024,
            preload_range: DEFAULT_PRELOAD_RANGE,
            decode_timeout: DEFAULT_DECODE_TIMEOUT,
            options: RenderOptions::default(),
        }
    }
}

#[derive(Debug)]
struct Pending {
    page: usize,
    preload: bool,
    token: ModeVersion,
    issued_at: Instant,
}

/// A settled render, ready for the session to act on.
/// Stale results never appear here; they are discarded during polling.
#[derive(Debug)]
pub enum RenderOutcome {
    /// A fresh artifact for the live generation
    Fresh {
        page: usize,
        artifact: Arc<PageArtifact>,
    },
    /// A foreground render failed; the last good page stays on screen
    Failed { page: usize, error: RenderError },
    /// The worker pool is unusable even after the degraded retry
    Fatal(RenderError),
}

pub struct RenderQueue {
    factory: Arc<dyn RendererFactory>,
    job_tx: Sender<RenderJob>,
    job_rx: Receiver<RenderJob>,
    reply_tx: Sender<RenderReply>,
    reply_rx: Receiver<RenderReply>,
    cache: Arc<Mutex<FormatCache>>,
    /// Live generation mirrored for workers' cooperative checks
    live: Arc<AtomicU64>,
    mode_version: ModeVersion,
    next_request_id: u64,
    pending: HashMap<RequestId, Pending>,
    preload_in_flight: HashSet<usize>,
    options: RenderOptions,
    num_workers: usize,
    accelerated: bool,
    retried_init: bool,
    decode_timeout: Duration,
    preload_range: usize,
    page_count: usize,
    current_page: usize,
}

impl RenderQueue {
    pub fn new(factory: Arc<dyn RendererFactory>, config: QueueConfig) -> Self {
        let cache = Arc::new(Mutex::new(FormatCache::new(config.cache_budget)));

        // flume gives us MPMC channels: multiple workers pull from one
        // shared job queue, which std/tokio mpsc receivers cannot do.
        let (job_tx, job_rx) = flume::unbounded();
        let (reply_tx, reply_rx) = flume::unbounded();

        let accelerated = config.options.accelerated;
        let mut queue = Self {
            factory,
            job_tx,
            job_rx,
            reply_tx,
            reply_rx,
            cache,
            live: Arc::new(AtomicU64::new(0)),
            mode_version: ModeVersion::new(0),
            next_request_id: 1,
            pending: HashMap::new(),
            preload_in_flight: HashSet::new(),
            options: config.options,
            num_workers: config.workers.max(1),
            accelerated,
            retried_init: false,
            decode_timeout: config.decode_timeout,
            preload_range: config.preload_range,
            page_count: 0,
            current_page: 1,
        };
        queue.spawn_workers();
        queue
    }

    fn spawn_workers(&self) {
        for _ in 0..self.num_workers {
            let factory = Arc::clone(&self.factory);
            let accelerated = self.accelerated;
            let rx = self.job_rx.clone();
            let tx = self.reply_tx.clone();
            let cache = Arc::clone(&self.cache);
            let live = Arc::clone(&self.live);

            std::thread::spawn(move || {
                render_worker(&factory, accelerated, &rx, &tx, &cache, &live);
            });
        }
    }

    /// The live generation token
    #[must_use]
    pub fn mode_version(&self) -> ModeVersion {
        self.mode_version
    }

    /// Sync document geometry after open/reload
    pub fn set_page_count(&mut self, count: usize) {
        self.page_count = count;
    }

    /// Track the committed page so preloads center on it
    pub fn set_current_page(&mut self, page: usize) {
        self.current_page = page;
    }

    /// Change appearance options: purges the cache and forgets
    /// outstanding requests, so renders issued under the old options
    /// can never settle onto the surface.
    pub fn set_options(&mut self, options: RenderOptions) {
        if self.options != options {
            self.options = options;
            self.cache
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .invalidate_all();
            self.pending.clear();
            self.preload_in_flight.clear();
        }
    }

    /// Invalidate everything tied to the outgoing (book, mode)
    /// generation: bump the token once, purge the in-memory cache,
    /// forget outstanding work. Callers switch books/modes through
    /// this; already-dispatched renders finish in their backends but
    /// can no longer be observed.
    pub fn bump_generation(&mut self) {
        self.mode_version = self.mode_version.next();
        self.live.store(self.mode_version.0, Ordering::Release);
        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .invalidate_all();
        self.pending.clear();
        self.preload_in_flight.clear();
        debug!("render generation bumped to {}", self.mode_version.0);
    }

    /// Request a foreground render, capturing the live token
    pub fn submit_page(&mut self, page: usize) -> RequestId {
        let id = self.next_id();
        let token = self.mode_version;

        let _ = self.job_tx.send(RenderJob::Page {
            id,
            page,
            options: self.options.clone(),
            token,
        });
        self.pending.insert(
            id,
            Pending {
                page,
                preload: false,
                token,
                issued_at: Instant::now(),
            },
        );
        self.preload_in_flight.remove(&page);
        id
    }

    /// Request a page only if it is neither cached nor in flight
    pub fn submit_page_if_needed(&mut self, page: usize) -> Option<RequestId> {
        if self.is_page_cached(page) || self.is_page_in_flight(page) {
            return None;
        }
        Some(self.submit_page(page))
    }

    fn submit_preload(&mut self, page: usize) {
        let id = self.next_id();
        let token = self.mode_version;

        let _ = self.job_tx.send(RenderJob::Preload {
            id,
            page,
            options: self.options.clone(),
            token,
        });
        self.pending.insert(
            id,
            Pending {
                page,
                preload: true,
                token,
                issued_at: Instant::now(),
            },
        );
        self.preload_in_flight.insert(page);
    }

    /// Fill the preload window around the current page without
    /// blocking foreground requests
    pub fn schedule_preload(&mut self) {
        if self.page_count == 0 {
            return;
        }
        let current = self.current_page;

        for offset in 1..=self.preload_range {
            if current + offset <= self.page_count {
                self.maybe_preload(current + offset);
            }
            if current > offset {
                self.maybe_preload(current - offset);
            }
        }
    }

    fn maybe_preload(&mut self, page: usize) {
        if self.preload_in_flight.contains(&page) || self.is_page_cached(page) {
            return;
        }
        self.submit_preload(page);
    }

    fn is_page_in_flight(&self, page: usize) -> bool {
        self.preload_in_flight.contains(&page)
            || self.pending.values().any(|p| p.page == page)
    }

    /// Drain settled renders. Stale tokens and unknown request ids are
    /// discarded here; pending foreground requests past the decode
    /// deadline settle as `DecodeTimeout`.
    pub fn poll(&mut self, now: Instant) -> Vec<RenderOutcome> {
        let mut outcomes = Vec::new();

        while let Ok(reply) = self.reply_rx.try_recv() {
            match reply {
                RenderReply::Page {
                    id,
                    page,
                    token,
                    artifact,
                } => {
                    let known = self.pending.remove(&id).is_some();
                    self.preload_in_flight.remove(&page);

                    if token != self.mode_version || !known {
                        debug!(
                            "discarding stale render of page {page} (token {}, live {})",
                            token.0, self.mode_version.0
                        );
                        continue;
                    }
                    outcomes.push(RenderOutcome::Fresh { page, artifact });
                }

                RenderReply::Error {
                    id,
                    page,
                    token,
                    error,
                } => {
                    let pending = self.pending.remove(&id);
                    self.preload_in_flight.remove(&page);

                    let Some(pending) = pending else { continue };
                    if token != self.mode_version {
                        continue;
                    }
                    if pending.preload {
                        // Background fill failures degrade, not surface
                        debug!("preload of page {page} failed: {error}");
                        continue;
                    }
                    outcomes.push(RenderOutcome::Failed { page, error });
                }

                RenderReply::InitFailed { error, accelerated } => {
                    if accelerated && !self.retried_init {
                        warn!("accelerated backend failed to initialize, retrying without: {error}");
                        self.retried_init = true;
                        self.accelerated = false;
                        self.options.accelerated = false;
                        self.spawn_workers();
                    } else if !accelerated {
                        outcomes.push(RenderOutcome::Fatal(error));
                    }
                    // Further accelerated failures after the retry are
                    // the rest of the original pool dying; ignore them.
                }
            }
        }

        self.sweep_deadlines(now, &mut outcomes);
        outcomes
    }

    fn sweep_deadlines(&mut self, now: Instant, outcomes: &mut Vec<RenderOutcome>) {
        let timeout = self.decode_timeout;
        let expired: Vec<RequestId> = self
            .pending
            .iter()
            .filter(|(_, p)| now.duration_since(p.issued_at) >= timeout)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            let Some(pending) = self.pending.remove(&id) else {
                continue;
            };
            self.preload_in_flight.remove(&pending.page);
            if pending.preload {
                debug!("preload of page {} timed out", pending.page);
                continue;
            }
            outcomes.push(RenderOutcome::Failed {
                page: pending.page,
                error: RenderError::DecodeTimeout {
                    page: pending.page,
                    timeout_ms: timeout.as_millis() as u64,
                },
            });
        }
    }

    /// Check the cache under the current render options
    #[must_use]
    pub fn is_page_cached(&self, page: usize) -> bool {
        let key = PageKey::from_options(page, &self.options);
        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains(&key)
    }

    /// Get a cached artifact if available (promotes it)
    #[must_use]
    pub fn cached_page(&self, page: usize) -> Option<Arc<PageArtifact>> {
        let key = PageKey::from_options(page, &self.options);
        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&key)
    }

    /// Current resident cache bytes
    #[must_use]
    pub fn cache_usage(&self) -> u64 {
        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .usage()
    }

    /// Number of requests currently outstanding
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Shut down all workers
    pub fn shutdown(&self) {
        for _ in 0..self.num_workers {
            let _ = self.job_tx.send(RenderJob::Shutdown);
        }
    }

    fn next_id(&mut self) -> RequestId {
        let id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;
        id
    }
}

impl Drop for RenderQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}
