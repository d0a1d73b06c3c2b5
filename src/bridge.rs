use anyhow::Result;
use log::{debug, warn};

use crate::book::BookFormat;
use crate::settings::ReaderSettings;

/// Host-side persistent page cache. The engine never reads or writes
/// it, it only announces the configured size limits once at startup so
/// the host can prune on its own schedule.
pub trait DiskCacheBridge: Send {
    fn set_budget(&mut self, format: BookFormat, bytes: u64) -> Result<()>;
}

const DISK_FORMATS: [BookFormat; 6] = [
    BookFormat::Pdf,
    BookFormat::Epub,
    BookFormat::Mobi,
    BookFormat::Text,
    BookFormat::Markdown,
    BookFormat::Html,
];

/// Pushes per-format disk budgets to the host. Failures are logged and
/// swallowed, the reading session works without a disk cache.
pub fn announce_disk_budgets(bridge: &mut dyn DiskCacheBridge, settings: &ReaderSettings) {
    for format in DISK_FORMATS {
        let bytes = settings.cache_budget_bytes(format);
        match bridge.set_budget(format, bytes) {
            Ok(()) => debug!("Announced {bytes} byte disk budget for {}", format.as_str()),
            Err(e) => warn!(
                "Host rejected disk budget for {}: {e:#}",
                format.as_str()
            ),
        }
    }
}
