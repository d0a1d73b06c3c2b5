use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, warn};

use crate::book::Book;
use crate::store::{BookRecord, BookStore};

/// Tracks active reading time and mirrors progress into the book store.
/// Gaps between interactions longer than the idle cutoff do not count
/// as reading.
pub struct SessionTracker {
    active: Duration,
    last_activity: Option<Instant>,
    idle_cutoff: Duration,
    auto_finish_ratio: f64,
}

impl SessionTracker {
    #[must_use]
    pub fn new(idle_cutoff: Duration, auto_finish_ratio: f64) -> Self {
        Self {
            active: Duration::ZERO,
            last_activity: None,
            idle_cutoff,
            auto_finish_ratio,
        }
    }

    /// Call on every user interaction (page turn, scroll, touch)
    pub fn note_activity(&mut self, now: Instant) {
        if let Some(last) = self.last_activity {
            let gap = now.saturating_duration_since(last);
            if gap < self.idle_cutoff {
                self.active += gap;
            } else {
                debug!("Idle gap of {gap:?}, not counted as reading time");
            }
        }
        self.last_activity = Some(now);
    }

    #[must_use]
    pub fn active_time(&self) -> Duration {
        self.active
    }

    /// Persists the book's current position. Returns true when this
    /// update crossed the finish threshold for the first time.
    pub fn on_progress(&mut self, book: &mut Book, store: &mut dyn BookStore, now: Instant) -> bool {
        self.note_activity(now);
        book.last_read = Utc::now();

        let newly_finished = !book.finished && self.is_finish_position(book);
        if newly_finished {
            book.finished = true;
        }

        let record = self.record_for(book);
        if let Err(e) = store.update_progress(&book.id, &record) {
            warn!("Failed to persist progress for {}: {e:#}", book.id);
        }
        if newly_finished {
            if let Err(e) = store.mark_finished(&book.id) {
                warn!("Failed to mark {} finished: {e:#}", book.id);
            }
        }
        newly_finished
    }

    fn is_finish_position(&self, book: &Book) -> bool {
        if book.total_pages == 0 {
            return false;
        }
        if book.current_page >= book.total_pages {
            return true;
        }
        let fraction = book.precise_progress / book.total_pages as f64;
        fraction >= self.auto_finish_ratio
    }

    fn record_for(&self, book: &Book) -> BookRecord {
        BookRecord {
            id: book.id.clone(),
            path: PathBuf::from(&book.path),
            format: book.format,
            total_pages: book.total_pages,
            current_page: book.current_page,
            precise_progress: book.precise_progress,
            mode: book.mode,
            finished: book.finished,
            last_read: book.last_read,
            reading_secs: self.active.as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::BookFormat;
    use crate::store::JsonBookStore;

    fn book(total: usize) -> Book {
        let mut b = Book::new("b1", "/books/b1.pdf", BookFormat::Pdf);
        b.total_pages = total;
        b
    }

    #[test]
    fn idle_gaps_are_not_counted() {
        let mut tracker = SessionTracker::new(Duration::from_secs(60), 0.98);
        let t0 = Instant::now();

        tracker.note_activity(t0);
        tracker.note_activity(t0 + Duration::from_secs(10));
        tracker.note_activity(t0 + Duration::from_secs(200));
        tracker.note_activity(t0 + Duration::from_secs(205));

        assert_eq!(tracker.active_time(), Duration::from_secs(15));
    }

    #[test]
    fn progress_is_mirrored_into_the_store() {
        let mut tracker = SessionTracker::new(Duration::from_secs(60), 0.98);
        let mut store = JsonBookStore::ephemeral();
        let mut b = book(100);
        b.current_page = 42;
        b.precise_progress = 41.5;

        let finished = tracker.on_progress(&mut b, &mut store, Instant::now());
        assert!(!finished);

        let record = store.get_book("b1").unwrap();
        assert_eq!(record.current_page, 42);
        assert!((record.precise_progress - 41.5).abs() < f64::EPSILON);
        assert!(!record.finished);
    }

    #[test]
    fn last_page_marks_finished_once() {
        let mut tracker = SessionTracker::new(Duration::from_secs(60), 0.98);
        let mut store = JsonBookStore::ephemeral();
        let mut b = book(100);
        b.current_page = 100;
        b.precise_progress = 100.0;

        assert!(tracker.on_progress(&mut b, &mut store, Instant::now()));
        assert!(store.get_book("b1").unwrap().finished);

        // Already finished, does not trigger again
        assert!(!tracker.on_progress(&mut b, &mut store, Instant::now()));
    }

    #[test]
    fn ratio_threshold_marks_finished() {
        let mut tracker = SessionTracker::new(Duration::from_secs(60), 0.98);
        let mut store = JsonBookStore::ephemeral();
        let mut b = book(100);
        b.current_page = 99;
        b.precise_progress = 98.5;

        assert!(tracker.on_progress(&mut b, &mut store, Instant::now()));
        assert!(b.finished);
    }

    #[test]
    fn empty_book_never_finishes() {
        let mut tracker = SessionTracker::new(Duration::from_secs(60), 0.98);
        let mut store = JsonBookStore::ephemeral();
        let mut b = book(0);

        assert!(!tracker.on_progress(&mut b, &mut store, Instant::now()));
    }
}
