mod schema;

pub use schema::Store;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Reader profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique user ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
    /// Profile creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Fresh profile with placeholder identity, used until the reader
    /// edits their own.
    pub fn default_profile() -> Self {
        Self {
            id: generate_id(),
            name: "Reader".to_string(),
            email: "reader@booktrack.local".to_string(),
            created_at: Utc::now(),
        }
    }
}

/// A book in the local library.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    /// Unique book ID, assigned locally on insert.
    pub id: String,
    /// ISBN without separators (empty if unknown).
    #[serde(default)]
    pub isbn: String,
    /// Book title.
    pub title: String,
    /// Author names.
    #[serde(default)]
    pub authors: Vec<String>,
    /// Page count (0 if unknown).
    #[serde(default)]
    pub page_count: u32,
    /// Cover image URL.
    #[serde(rename = "coverURL", default)]
    pub cover_url: Option<String>,
    /// Book description.
    #[serde(default)]
    pub description: Option<String>,
    /// Publication date as given by the catalog.
    #[serde(default)]
    pub published_date: Option<String>,
    /// Publisher.
    #[serde(default)]
    pub publisher: Option<String>,
}

/// Reading progress for a book.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    /// Progress ID.
    pub id: String,
    /// User ID.
    pub user_id: String,
    /// Book ID.
    pub book_id: String,
    /// Current page, kept within `[0, page_count]`.
    #[serde(default)]
    pub current_page: u32,
    /// Whether the book was finished. Never un-set once true.
    #[serde(default)]
    pub is_completed: bool,
    /// When tracking started.
    pub date_started: DateTime<Utc>,
    /// Last update timestamp.
    pub last_updated: DateTime<Utc>,
    /// When the book was finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_completed: Option<DateTime<Utc>>,
}

impl Progress {
    /// Fresh record created alongside a book, starting at page zero.
    pub fn new(user_id: &str, book_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            user_id: user_id.to_string(),
            book_id: book_id.to_string(),
            current_page: 0,
            is_completed: false,
            date_started: now,
            last_updated: now,
            date_completed: None,
        }
    }
}

/// Full backup document: the three collections in one JSON object.
///
/// Collections absent from an imported document are left untouched, so a
/// partial backup can be applied on top of existing data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Profile record, if the document carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    /// Book collection, if the document carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub books: Option<Vec<Book>>,
    /// Progress collection, if the document carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Vec<Progress>>,
}

/// Generate an opaque record ID: random token plus a time component.
pub fn generate_id() -> String {
    let mut bytes = [0u8; 8];
    rand::rng().fill_bytes(&mut bytes);
    format!(
        "id_{}_{:x}",
        URL_SAFE_NO_PAD.encode(bytes),
        Utc::now().timestamp_millis()
    )
}
