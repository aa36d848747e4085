//! Pure derivation of reading statistics and the book/progress join.
//!
//! Nothing in this module touches the store or the network; every value
//! is computed from the records passed in, so the same input always
//! yields the same output.

use crate::store::{Book, Progress};
use serde::{Deserialize, Serialize};

/// Upper bound on the reported streak.
///
/// The streak is a capped proxy derived from completed books, not a
/// consecutive-day calculation.
pub const STREAK_CAP: u32 = 7;

/// Aggregate reading statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Sum of current pages across all progress records.
    pub total_pages: u64,
    /// Number of completed books.
    pub completed_books: u32,
    /// Completion streak, capped at [`STREAK_CAP`].
    pub streak: u32,
}

/// Compute aggregate statistics from progress records.
pub fn calculate_stats(progress: &[Progress]) -> Stats {
    let mut total_pages: u64 = 0;
    let mut completed_books: u32 = 0;

    for record in progress {
        total_pages += u64::from(record.current_page);
        if record.is_completed {
            completed_books += 1;
        }
    }

    Stats {
        total_pages,
        completed_books,
        streak: completed_books.min(STREAK_CAP),
    }
}

/// Reading status derived from a progress record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingStatus {
    /// In the library, not started.
    Want,
    /// Started, not finished.
    Reading,
    /// Finished.
    Completed,
}

impl ReadingStatus {
    /// Derive the status from a progress record.
    pub fn from_progress(progress: &Progress) -> Self {
        if progress.is_completed {
            ReadingStatus::Completed
        } else if progress.current_page > 0 {
            ReadingStatus::Reading
        } else {
            ReadingStatus::Want
        }
    }

    /// Short label for display.
    pub fn label(&self) -> &'static str {
        match self {
            ReadingStatus::Want => "want",
            ReadingStatus::Reading => "reading",
            ReadingStatus::Completed => "completed",
        }
    }
}

impl std::str::FromStr for ReadingStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "want" => Ok(ReadingStatus::Want),
            "reading" => Ok(ReadingStatus::Reading),
            "completed" | "done" => Ok(ReadingStatus::Completed),
            other => Err(format!(
                "Unknown status '{}', expected want, reading or completed",
                other
            )),
        }
    }
}

/// A book joined with its progress record for presentation.
#[derive(Debug, Clone, Serialize)]
pub struct UserBook {
    /// The underlying book.
    pub book: Book,
    /// Its progress record.
    pub progress: Progress,
    /// Derived reading status.
    pub status: ReadingStatus,
    /// Completion percentage, 0 when the page count is unknown.
    pub percent: u32,
}

impl UserBook {
    /// Pages left before the end of the book.
    ///
    /// Saturates at zero when the page count has been edited below the
    /// recorded progress.
    pub fn pages_remaining(&self) -> u32 {
        self.book.page_count.saturating_sub(self.progress.current_page)
    }

    /// Whether this entry matches a title/author substring filter.
    pub fn matches_text(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();

        self.book.title.to_lowercase().contains(&needle)
            || self
                .book
                .authors
                .iter()
                .any(|author| author.to_lowercase().contains(&needle))
    }
}

/// Join books with their progress records, preserving book order.
///
/// A book without a record (possible after a partial import) joins
/// against a zeroed placeholder instead of being dropped from the view.
pub fn user_books(books: &[Book], progress: &[Progress]) -> Vec<UserBook> {
    books
        .iter()
        .map(|book| {
            let record = progress
                .iter()
                .find(|record| record.book_id == book.id)
                .cloned()
                .unwrap_or_else(|| placeholder_progress(&book.id));

            let status = ReadingStatus::from_progress(&record);
            let percent = percent_complete(record.current_page, book.page_count);

            UserBook {
                book: book.clone(),
                progress: record,
                status,
                percent,
            }
        })
        .collect()
}

/// Completion percentage, rounded to the nearest whole number.
pub fn percent_complete(current_page: u32, page_count: u32) -> u32 {
    if page_count == 0 {
        return 0;
    }

    ((f64::from(current_page) / f64::from(page_count)) * 100.0).round() as u32
}

/// Zeroed stand-in for a missing progress record.
fn placeholder_progress(book_id: &str) -> Progress {
    Progress {
        id: String::new(),
        user_id: String::new(),
        book_id: book_id.to_string(),
        current_page: 0,
        is_completed: false,
        date_started: chrono::DateTime::UNIX_EPOCH,
        last_updated: chrono::DateTime::UNIX_EPOCH,
        date_completed: None,
    }
}
