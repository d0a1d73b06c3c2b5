//! Core types shared across the render infrastructure

/// A rendered page ready to be applied to a destination surface.
///
/// Bitmap formats carry RGB pixel data; flowed formats carry laid-out
/// text lines. Either way the artifact is immutable once produced and
/// shared via `Arc` between the cache and the surface.
#[derive(Clone)]
pub enum PageArtifact {
    Bitmap {
        /// Raw RGB pixel data (3 bytes per pixel)
        pixels: Vec<u8>,
        width_px: u32,
        height_px: u32,
    },
    Lines {
        lines: Vec<String>,
        width_cols: u32,
    },
}

impl PageArtifact {
    /// Estimated resident size in bytes, used for cache budgeting
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        match self {
            PageArtifact::Bitmap { pixels, .. } => pixels.len() as u64,
            PageArtifact::Lines { lines, .. } => {
                lines.iter().map(|l| l.len() as u64).sum::<u64>() + lines.len() as u64 * 24
            }
        }
    }

    /// Height in pixels for bitmaps, in rows for laid-out text
    #[must_use]
    pub fn height(&self) -> u32 {
        match self {
            PageArtifact::Bitmap { height_px, .. } => *height_px,
            PageArtifact::Lines { lines, .. } => lines.len() as u32,
        }
    }
}

impl std::fmt::Debug for PageArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageArtifact::Bitmap {
                width_px,
                height_px,
                pixels,
            } => f
                .debug_struct("PageArtifact::Bitmap")
                .field("width_px", width_px)
                .field("height_px", height_px)
                .field("bytes", &pixels.len())
                .finish(),
            PageArtifact::Lines { lines, width_cols } => f
                .debug_struct("PageArtifact::Lines")
                .field("lines", &lines.len())
                .field("width_cols", width_cols)
                .finish(),
        }
    }
}

/// Destination for applied renders, owned by the host.
///
/// The session mutates the surface only after the mode-version token
/// check; renderer backends never touch it directly.
pub trait Surface {
    /// Show the artifact for `page` (1-based)
    fn apply(&mut self, page: usize, artifact: &PageArtifact);

    /// Current visible pixels as (width, height, RGB bytes) for the
    /// capture hook; `None` when nothing has been applied yet.
    fn snapshot(&self) -> Option<(u32, u32, Vec<u8>)>;
}

/// Target of a table-of-contents entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TocTarget {
    /// Page number (1-based)
    Page(usize),
    /// Intra-document anchor resolved by the renderer
    Anchor(String),
}

/// A single entry in the table of contents
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TocEntry {
    pub title: String,
    /// Nesting level (0 = top level)
    pub level: usize,
    pub target: TocTarget,
}

impl TocEntry {
    pub fn page(title: impl Into<String>, level: usize, page: usize) -> Self {
        Self {
            title: title.into(),
            level,
            target: TocTarget::Page(page),
        }
    }
}
