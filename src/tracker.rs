//! Local state manager: every read goes through the store, every
//! mutation writes through it and then pushes fresh stats to the
//! leaderboard. Remote state never overwrites local records.

use crate::error::{AppError, Result};
use crate::leaderboard::LeaderboardSync;
use crate::stats::{self, Stats, UserBook};
use crate::store::{self, Book, Progress, Store, User};
use chrono::Utc;

/// Fields of a book that can be edited after insert.
#[derive(Debug, Clone, Default)]
pub struct BookPatch {
    /// New title.
    pub title: Option<String>,
    /// Replacement author list.
    pub authors: Option<Vec<String>>,
    /// New page count, 0 for unknown.
    pub page_count: Option<u32>,
    /// New ISBN, empty for unknown.
    pub isbn: Option<String>,
}

/// State manager for the local library.
#[derive(Clone)]
pub struct Tracker {
    store: Store,
    sync: LeaderboardSync,
}

impl Tracker {
    /// Open the tracker over a store.
    ///
    /// The default profile is persisted on first run so the reader's id
    /// stays stable across sessions, which is what keys their record on
    /// the shared leaderboard.
    pub fn open(store: Store, sync: LeaderboardSync) -> Result<Self> {
        if !store.has_user()? {
            let user = store.user()?;
            store.save_user(&user)?;
            tracing::info!(user = %user.id, "Created profile");
        }

        Ok(Self { store, sync })
    }

    // ========== READS ==========

    /// Current profile.
    pub fn user(&self) -> Result<User> {
        self.store.user()
    }

    /// All books, in insertion order.
    pub fn books(&self) -> Result<Vec<Book>> {
        self.store.books()
    }

    /// All progress records.
    pub fn progress(&self) -> Result<Vec<Progress>> {
        self.store.progress()
    }

    /// Aggregate statistics.
    pub fn stats(&self) -> Result<Stats> {
        Ok(stats::calculate_stats(&self.store.progress()?))
    }

    /// Books joined with progress for presentation.
    pub fn user_books(&self) -> Result<Vec<UserBook>> {
        Ok(stats::user_books(&self.store.books()?, &self.store.progress()?))
    }

    /// The leaderboard sync service.
    pub fn sync(&self) -> &LeaderboardSync {
        &self.sync
    }

    /// Resolve a book by exact id, then by unique case-insensitive title
    /// substring.
    pub fn find_book(&self, selector: &str) -> Result<Book> {
        let books = self.store.books()?;

        if let Some(book) = books.iter().find(|book| book.id == selector) {
            return Ok(book.clone());
        }

        let needle = selector.to_lowercase();
        let matches: Vec<&Book> = books
            .iter()
            .filter(|book| book.title.to_lowercase().contains(&needle))
            .collect();

        match matches.as_slice() {
            [book] => Ok((*book).clone()),
            [] => Err(AppError::NotFound(format!("no book matches '{}'", selector))),
            _ => Err(AppError::InvalidInput(format!(
                "'{}' is ambiguous: {}",
                selector,
                matches
                    .iter()
                    .map(|book| book.title.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    // ========== MUTATIONS ==========

    /// Add a book together with a fresh progress record.
    ///
    /// Returns `Ok(false)` without touching anything when the library
    /// already holds a book with an equal title (case-insensitive) or the
    /// same non-empty ISBN. A duplicate is an answer, not a fault.
    pub async fn add_book(&self, mut book: Book) -> Result<bool> {
        let mut books = self.store.books()?;

        if books.iter().any(|existing| is_duplicate(existing, &book)) {
            return Ok(false);
        }

        if book.id.is_empty() {
            book.id = store::generate_id();
        }

        let user = self.store.user()?;
        let record = Progress::new(&user.id, &book.id);

        tracing::info!(book = %book.id, title = %book.title, "Adding book");

        books.push(book);
        self.store.save_books(&books)?;

        let mut progress = self.store.progress()?;
        progress.push(record);
        self.store.save_progress(&progress)?;

        self.push_stats().await;
        Ok(true)
    }

    /// Delete a book and its progress record.
    ///
    /// Returns `Ok(false)` when no book carries that id.
    pub async fn delete_book(&self, book_id: &str) -> Result<bool> {
        let mut books = self.store.books()?;
        let before = books.len();
        books.retain(|book| book.id != book_id);

        if books.len() == before {
            return Ok(false);
        }

        tracing::info!(book = %book_id, "Deleting book");

        self.store.save_books(&books)?;

        let mut progress = self.store.progress()?;
        progress.retain(|record| record.book_id != book_id);
        self.store.save_progress(&progress)?;

        self.push_stats().await;
        Ok(true)
    }

    /// Edit book fields.
    ///
    /// Uniqueness is enforced at insert time only, and a completion flag
    /// is never un-set: shrinking the page count below recorded progress
    /// is flagged in the log, not repaired.
    pub async fn update_book(&self, book_id: &str, patch: BookPatch) -> Result<bool> {
        let mut books = self.store.books()?;

        let Some(book) = books.iter_mut().find(|book| book.id == book_id) else {
            return Ok(false);
        };

        if let Some(title) = patch.title {
            let title = title.trim().to_string();
            if title.is_empty() {
                return Err(AppError::InvalidInput("Title cannot be empty".to_string()));
            }
            book.title = title;
        }
        if let Some(authors) = patch.authors {
            book.authors = authors;
        }
        if let Some(isbn) = patch.isbn {
            book.isbn = crate::catalog::normalize_isbn(&isbn);
        }
        if let Some(page_count) = patch.page_count {
            book.page_count = page_count;
        }

        let page_count = book.page_count;
        self.store.save_books(&books)?;

        let progress = self.store.progress()?;
        if let Some(record) = progress.iter().find(|record| record.book_id == book_id) {
            if record.current_page > page_count {
                tracing::warn!(
                    book = %book_id,
                    current_page = record.current_page,
                    page_count,
                    "Page count now below recorded progress"
                );
            }
        }

        Ok(true)
    }

    /// Set the current page for a book.
    ///
    /// The page is clamped to `[0, page_count]`. The first time it
    /// reaches the end of a book with a known page count, the record is
    /// marked completed and stamped; completion is monotonic, so reading
    /// "backwards" later never clears it. Books with an unknown page
    /// count can never complete.
    pub async fn update_progress(&self, book_id: &str, page: u32) -> Result<Progress> {
        let books = self.store.books()?;
        let book = books
            .iter()
            .find(|book| book.id == book_id)
            .ok_or_else(|| AppError::NotFound(format!("no book with id {}", book_id)))?;

        let mut progress = self.store.progress()?;
        let record = progress
            .iter_mut()
            .find(|record| record.book_id == book_id)
            .ok_or_else(|| AppError::NotFound(format!("no progress record for book {}", book_id)))?;

        record.current_page = page.min(book.page_count);
        record.last_updated = Utc::now();

        if book.page_count > 0 && page >= book.page_count && !record.is_completed {
            record.is_completed = true;
            record.date_completed = Some(Utc::now());
            tracing::info!(book = %book_id, title = %book.title, "Book completed");
        }

        let updated = record.clone();
        self.store.save_progress(&progress)?;

        self.push_stats().await;
        Ok(updated)
    }

    /// Edit the profile name and/or email.
    pub async fn update_profile(&self, name: Option<String>, email: Option<String>) -> Result<User> {
        let mut user = self.store.user()?;

        if let Some(name) = name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(AppError::InvalidInput("Name cannot be empty".to_string()));
            }
            user.name = name;
        }
        if let Some(email) = email {
            user.email = email.trim().to_string();
        }

        self.store.save_user(&user)?;
        self.push_stats().await;
        Ok(user)
    }

    /// Export the full snapshot as a JSON document.
    pub fn export_all(&self) -> Result<String> {
        self.store.export_all()
    }

    /// Import a snapshot. A malformed payload aborts with local state
    /// unchanged.
    pub async fn import_all(&self, data: &str) -> Result<()> {
        self.store.import_all(data)?;
        self.push_stats().await;
        Ok(())
    }

    /// Delete everything and start over with a fresh profile.
    ///
    /// The fresh profile gets a new id, so the old leaderboard record is
    /// left behind and the zeroed stats are pushed under the new one.
    pub async fn reset_all(&self) -> Result<User> {
        self.store.clear_all()?;

        let user = self.store.user()?;
        self.store.save_user(&user)?;

        self.push_stats().await;
        Ok(user)
    }

    /// Push current stats to the leaderboard. No-op while sync is
    /// disabled; failures are logged, never surfaced, so a dead remote
    /// store cannot break a local mutation that already succeeded.
    pub async fn push_stats(&self) {
        let (user, stats) = match (self.store.user(), self.stats()) {
            (Ok(user), Ok(stats)) => (user, stats),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "Skipping leaderboard push");
                return;
            }
        };

        if let Err(e) = self.sync.push_stats(&user, &stats).await {
            tracing::warn!(error = %e, "Leaderboard push failed");
        }
    }
}

/// Whether two entries identify the same book: equal titles
/// (case-insensitive, ignoring surrounding whitespace) or matching
/// non-empty ISBNs. [`Tracker::add_book`] rejects on this predicate, and
/// catalog views use it to mark results already in the library.
pub fn is_duplicate(existing: &Book, candidate: &Book) -> bool {
    if existing.title.trim().to_lowercase() == candidate.title.trim().to_lowercase() {
        return true;
    }

    !existing.isbn.is_empty() && existing.isbn == candidate.isbn
}
