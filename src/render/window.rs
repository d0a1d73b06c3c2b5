//! Windowed continuous-mode rendering
//!
//! Only pages within a visibility window around the scroll offset get
//! rendered; a velocity-based predictor extrapolates recent scroll
//! deltas so pages are rendered ahead of arrival. Dividers between
//! pages are cosmetic and carry no state.

use std::collections::VecDeque;
use std::ops::RangeInclusive;
use std::time::{Duration, Instant};

/// Per-page heights plus the divider gap, the geometry the window is
/// computed against. Heights default to an estimate until real
/// artifacts arrive.
#[derive(Clone, Debug)]
pub struct PageGeometry {
    heights: Vec<u32>,
    gap: u32,
}

impl PageGeometry {
    pub fn uniform(page_count: usize, estimated_height: u32, gap: u32) -> Self {
        Self {
            heights: vec![estimated_height.max(1); page_count],
            gap,
        }
    }

    pub fn page_count(&self) -> usize {
        self.heights.len()
    }

    /// Record the real height of a rendered page (1-based)
    pub fn set_height(&mut self, page: usize, height: u32) {
        if let Some(h) = self.heights.get_mut(page.wrapping_sub(1)) {
            *h = height.max(1);
        }
    }

    pub fn height_of(&self, page: usize) -> u32 {
        self.heights.get(page.wrapping_sub(1)).copied().unwrap_or(1)
    }

    /// Offset of the top of a page (1-based)
    pub fn page_top(&self, page: usize) -> u64 {
        self.heights
            .iter()
            .take(page.saturating_sub(1))
            .map(|&h| u64::from(h) + u64::from(self.gap))
            .sum()
    }

    pub fn total_height(&self) -> u64 {
        self.page_top(self.page_count() + 1)
    }

    /// Page (1-based) containing the given offset
    pub fn page_at(&self, offset: u64) -> usize {
        let mut top = 0u64;
        for (idx, &h) in self.heights.iter().enumerate() {
            let bottom = top + u64::from(h) + u64::from(self.gap);
            if offset < bottom {
                return idx + 1;
            }
            top = bottom;
        }
        self.page_count().max(1)
    }

    /// Pages (1-based, inclusive) intersecting `[offset, offset + viewport)`
    pub fn visible_range(&self, offset: u64, viewport: u32) -> RangeInclusive<usize> {
        let first = self.page_at(offset);
        let last = self.page_at(offset.saturating_add(u64::from(viewport.saturating_sub(1))));
        first..=last
    }
}

/// Pluggable scroll-ahead prediction, replaceable and testable in
/// isolation from the render queue.
pub trait ScrollPredictor {
    /// Record an observed scroll position
    fn record(&mut self, offset: u64, at: Instant);

    /// Predicted position `horizon` into the future; `None` when there
    /// is not enough recent movement to extrapolate from
    fn predict(&self, horizon: Duration, now: Instant) -> Option<u64>;

    /// Forget accumulated samples (book/mode switch)
    fn reset(&mut self);
}

/// Default predictor: average velocity over a short ring of recent
/// samples, linearly extrapolated.
pub struct VelocityPredictor {
    samples: VecDeque<(Instant, u64)>,
    max_samples: usize,
    max_sample_age: Duration,
}

impl Default for VelocityPredictor {
    fn default() -> Self {
        Self {
            samples: VecDeque::new(),
            max_samples: 8,
            max_sample_age: Duration::from_millis(500),
        }
    }
}

impl ScrollPredictor for VelocityPredictor {
    fn record(&mut self, offset: u64, at: Instant) {
        while self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back((at, offset));
    }

    fn predict(&self, horizon: Duration, now: Instant) -> Option<u64> {
        let (first, last) = (self.samples.front()?, self.samples.back()?);
        if now.duration_since(last.0) > self.max_sample_age {
            return None;
        }
        let elapsed = last.0.duration_since(first.0).as_secs_f64();
        if elapsed <= 0.0 {
            return None;
        }

        // Signed velocity in units per second
        let delta = last.1 as f64 - first.1 as f64;
        let velocity = delta / elapsed;
        let projected = last.1 as f64 + velocity * horizon.as_secs_f64();
        Some(projected.max(0.0) as u64)
    }

    fn reset(&mut self) {
        self.samples.clear();
    }
}

/// Visible range extended toward where the predictor expects the scroll
/// to be one horizon from now.
pub fn render_window(
    geometry: &PageGeometry,
    offset: u64,
    viewport: u32,
    predictor: &dyn ScrollPredictor,
    horizon: Duration,
    now: Instant,
) -> RangeInclusive<usize> {
    let visible = geometry.visible_range(offset, viewport);

    let Some(predicted) = predictor.predict(horizon, now) else {
        return visible;
    };
    let ahead = geometry.visible_range(predicted, viewport);

    let first = (*visible.start()).min(*ahead.start());
    let last = (*visible.end()).max(*ahead.end());
    first..=last
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> PageGeometry {
        PageGeometry::uniform(10, 100, 2)
    }

    #[test]
    fn page_at_accounts_for_gaps() {
        let geo = geometry();
        assert_eq!(geo.page_at(0), 1);
        assert_eq!(geo.page_at(99), 1);
        // The gap rows belong to the page above them
        assert_eq!(geo.page_at(101), 1);
        assert_eq!(geo.page_at(102), 2);
        assert_eq!(geo.page_at(u64::MAX), 10);
    }

    #[test]
    fn visible_range_spans_viewport() {
        let geo = geometry();
        assert_eq!(geo.visible_range(0, 100), 1..=1);
        assert_eq!(geo.visible_range(0, 250), 1..=3);
        assert_eq!(geo.visible_range(150, 100), 2..=3);
    }

    #[test]
    fn set_height_shifts_later_pages() {
        let mut geo = geometry();
        geo.set_height(1, 300);
        assert_eq!(geo.page_top(2), 302);
        assert_eq!(geo.page_at(301), 1);
    }

    #[test]
    fn predictor_extrapolates_downward_scroll() {
        let mut p = VelocityPredictor::default();
        let t0 = Instant::now();
        // 100 units per 100ms => 1000 units/sec
        p.record(0, t0);
        p.record(100, t0 + Duration::from_millis(100));

        let predicted = p
            .predict(Duration::from_millis(200), t0 + Duration::from_millis(100))
            .unwrap();
        assert!((290..=310).contains(&predicted), "predicted {predicted}");
    }

    #[test]
    fn predictor_goes_quiet_after_stale_samples() {
        let mut p = VelocityPredictor::default();
        let t0 = Instant::now();
        p.record(0, t0);
        p.record(100, t0 + Duration::from_millis(100));

        assert!(
            p.predict(Duration::from_millis(200), t0 + Duration::from_secs(5))
                .is_none()
        );
    }

    #[test]
    fn predictor_never_predicts_before_document_start() {
        let mut p = VelocityPredictor::default();
        let t0 = Instant::now();
        // Fast upward scroll near the top
        p.record(300, t0);
        p.record(50, t0 + Duration::from_millis(50));

        let predicted = p
            .predict(Duration::from_millis(500), t0 + Duration::from_millis(50))
            .unwrap();
        assert_eq!(predicted, 0);
    }

    #[test]
    fn render_window_extends_toward_prediction() {
        let geo = geometry();
        let mut p = VelocityPredictor::default();
        let t0 = Instant::now();
        p.record(0, t0);
        p.record(204, t0 + Duration::from_millis(100));

        let now = t0 + Duration::from_millis(100);
        let window = render_window(&geo, 204, 100, &p, Duration::from_millis(200), now);
        // Visible page is 3; prediction (~612) reaches page 7
        assert_eq!(*window.start(), 3);
        assert!(*window.end() >= 6, "window {window:?}");
    }

    #[test]
    fn render_window_without_movement_is_just_visible() {
        let geo = geometry();
        let p = VelocityPredictor::default();
        let window = render_window(
            &geo,
            0,
            100,
            &p,
            Duration::from_millis(200),
            Instant::now(),
        );
        assert_eq!(window, 1..=1);
    }
}
