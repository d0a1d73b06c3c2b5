use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{LazyLock, RwLock};
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::book::BookFormat;

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "folio";

/// Engine settings, persisted as YAML in the user config directory.
/// Every field has a serde default so partial files keep working across
/// upgrades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderSettings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Pages preloaded in each direction around the current page
    #[serde(default = "default_preload_range")]
    pub preload_range: usize,

    /// Divider gap between pages in continuous mode
    #[serde(default = "default_page_gap")]
    pub page_gap: u16,

    #[serde(default = "default_true")]
    pub click_turn_page: bool,

    #[serde(default)]
    pub volume_key_turn_page: bool,

    #[serde(default = "default_scroll_speed")]
    pub scroll_speed: f64,

    #[serde(default = "default_true")]
    pub show_status_bar: bool,

    /// Cosmetic divider marks between pages in continuous mode
    #[serde(default = "default_true")]
    pub show_dividers: bool,

    /// Per-render decode deadline before a task settles as timed out
    #[serde(default = "default_decode_timeout_ms")]
    pub decode_timeout_ms: u64,

    /// Quiet period after the last seek change before a preview render
    #[serde(default = "default_seek_quiet_ms")]
    pub seek_quiet_ms: u64,

    /// Precise-progress fraction at which a book auto-marks as read
    #[serde(default = "default_auto_finish_ratio")]
    pub auto_finish_ratio: f64,

    /// Activity gaps longer than this do not count as reading time
    #[serde(default = "default_idle_cutoff_secs")]
    pub idle_cutoff_secs: u64,

    /// In-memory render cache budgets per format, in megabytes
    #[serde(default = "default_cache_budgets")]
    pub cache_budget_mb: HashMap<BookFormat, u64>,
}

fn default_true() -> bool {
    true
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_preload_range() -> usize {
    5
}

fn default_page_gap() -> u16 {
    1
}

fn default_scroll_speed() -> f64 {
    1.0
}

fn default_decode_timeout_ms() -> u64 {
    10_000
}

fn default_seek_quiet_ms() -> u64 {
    150
}

fn default_auto_finish_ratio() -> f64 {
    0.98
}

fn default_idle_cutoff_secs() -> u64 {
    60
}

fn default_cache_budgets() -> HashMap<BookFormat, u64> {
    HashMap::from([
        (BookFormat::Pdf, 64),
        (BookFormat::Epub, 32),
        (BookFormat::Mobi, 32),
        (BookFormat::Text, 8),
        (BookFormat::Markdown, 8),
        (BookFormat::Html, 8),
    ])
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            preload_range: default_preload_range(),
            page_gap: default_page_gap(),
            click_turn_page: true,
            volume_key_turn_page: false,
            scroll_speed: default_scroll_speed(),
            show_status_bar: true,
            show_dividers: true,
            decode_timeout_ms: default_decode_timeout_ms(),
            seek_quiet_ms: default_seek_quiet_ms(),
            auto_finish_ratio: default_auto_finish_ratio(),
            idle_cutoff_secs: default_idle_cutoff_secs(),
            cache_budget_mb: default_cache_budgets(),
        }
    }
}

impl ReaderSettings {
    #[must_use]
    pub fn decode_timeout(&self) -> Duration {
        Duration::from_millis(self.decode_timeout_ms)
    }

    #[must_use]
    pub fn seek_quiet(&self) -> Duration {
        Duration::from_millis(self.seek_quiet_ms)
    }

    #[must_use]
    pub fn idle_cutoff(&self) -> Duration {
        Duration::from_secs(self.idle_cutoff_secs)
    }

    /// In-memory cache budget for a format, in bytes
    #[must_use]
    pub fn cache_budget_bytes(&self, format: BookFormat) -> u64 {
        self.cache_budget_mb.get(&format).copied().unwrap_or(16) * 1024 * 1024
    }
}

static SETTINGS: LazyLock<RwLock<ReaderSettings>> =
    LazyLock::new(|| RwLock::new(ReaderSettings::default()));

fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

pub fn load_settings() {
    let Some(path) = config_path() else {
        warn!("Could not determine config directory, using default settings");
        return;
    };
    if path.exists() {
        load_settings_from_path(&path);
    } else {
        info!("Settings file not found, creating with defaults at {path:?}");
        if let Ok(settings) = SETTINGS.read() {
            save_settings_to_file(&settings, &path);
        }
    }
}

fn load_settings_from_path(path: &PathBuf) {
    match fs::read_to_string(path) {
        Ok(content) => match serde_yaml::from_str::<ReaderSettings>(&content) {
            Ok(mut settings) => {
                debug!("Loaded settings from {path:?}");

                if settings.version < CURRENT_VERSION {
                    migrate_settings(&mut settings);
                    save_settings_to_file(&settings, path);
                }

                if let Ok(mut global) = SETTINGS.write() {
                    *global = settings;
                }
            }
            Err(e) => {
                error!("Failed to parse settings file {path:?}: {e}");
            }
        },
        Err(e) => {
            error!("Failed to read settings file {path:?}: {e}");
        }
    }
}

fn migrate_settings(settings: &mut ReaderSettings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );

    // No schema changes yet

    settings.version = CURRENT_VERSION;
}

pub fn save_settings() {
    let Some(path) = config_path() else {
        warn!("Could not determine config directory, cannot save settings");
        return;
    };

    if let Ok(settings) = SETTINGS.read() {
        save_settings_to_file(&settings, &path);
    }
}

fn save_settings_to_file(settings: &ReaderSettings, path: &PathBuf) {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory {parent:?}: {e}");
                return;
            }
        }
    }

    match serde_yaml::to_string(settings) {
        Ok(content) => match fs::write(path, content) {
            Ok(()) => debug!("Saved settings to {path:?}"),
            Err(e) => error!("Failed to save settings to {path:?}: {e}"),
        },
        Err(e) => error!("Failed to serialize settings: {e}"),
    }
}

/// A point-in-time copy of the current settings
#[must_use]
pub fn snapshot() -> ReaderSettings {
    SETTINGS.read().map(|s| s.clone()).unwrap_or_default()
}

pub fn update(f: impl FnOnce(&mut ReaderSettings)) {
    if let Ok(mut settings) = SETTINGS.write() {
        f(&mut settings);
    }
    save_settings();
}

pub fn get_preload_range() -> usize {
    SETTINGS
        .read()
        .map(|s| s.preload_range)
        .unwrap_or_else(|_| default_preload_range())
}

pub fn get_page_gap() -> u16 {
    SETTINGS
        .read()
        .map(|s| s.page_gap)
        .unwrap_or_else(|_| default_page_gap())
}

pub fn show_dividers() -> bool {
    SETTINGS.read().map(|s| s.show_dividers).unwrap_or(true)
}
