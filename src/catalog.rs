//! Open Library catalog client.
//!
//! Read-only lookups against the public catalog: free-text search, edition
//! lookup by ISBN, and a best-effort page-count backfill. Results are
//! normalized into the local [`Book`] shape; missing metadata becomes a
//! placeholder or an empty value, never an error.

use crate::error::{AppError, Result};
use crate::store::{self, Book};
use futures_util::future::join_all;
use serde::Deserialize;

/// Cover image endpoint.
const COVERS_BASE_URL: &str = "https://covers.openlibrary.org";

/// Maximum number of search results requested and returned.
const SEARCH_LIMIT: usize = 15;

/// Number of docs scanned during the page-count fallback search.
const PAGE_COUNT_SCAN_LIMIT: usize = 5;

/// Placeholder title when the catalog has none.
const UNKNOWN_TITLE: &str = "Unknown Title";

/// Placeholder author when one cannot be resolved.
const UNKNOWN_AUTHOR: &str = "Unknown Author";

/// Client for the book catalog service.
#[derive(Clone)]
pub struct CatalogClient {
    client: reqwest::Client,
    base_url: String,
}

/// Raw search response.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

/// One document from the search index.
#[derive(Debug, Default, Deserialize)]
struct SearchDoc {
    #[serde(default)]
    isbn: Vec<String>,
    title: Option<String>,
    #[serde(default)]
    author_name: Vec<String>,
    number_of_pages_median: Option<u32>,
    cover_i: Option<i64>,
    first_publish_year: Option<i64>,
    #[serde(default)]
    publisher: Vec<String>,
}

/// Raw edition record from a by-ISBN lookup.
#[derive(Debug, Default, Deserialize)]
struct EditionRecord {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<AuthorRef>,
    number_of_pages: Option<u32>,
    #[serde(default)]
    covers: Vec<i64>,
    description: Option<TextOrTyped>,
    publish_date: Option<String>,
    #[serde(default)]
    publishers: Vec<String>,
}

/// Author reference inside an edition: an inline name or a key pointing
/// at the author's own record.
#[derive(Debug, Default, Deserialize)]
struct AuthorRef {
    name: Option<String>,
    key: Option<String>,
}

/// Author record fetched from its own resource.
#[derive(Debug, Deserialize)]
struct AuthorRecord {
    name: Option<String>,
}

/// Field the catalog serves either as a bare string or as a typed
/// `{ "value": ... }` object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TextOrTyped {
    Plain(String),
    Typed { value: String },
}

impl TextOrTyped {
    fn into_string(self) -> String {
        match self {
            TextOrTyped::Plain(text) => text,
            TextOrTyped::Typed { value } => value,
        }
    }
}

impl CatalogClient {
    /// Create a client against the given catalog endpoint.
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Free-text search, normalized into the local book shape.
    ///
    /// Returns at most 15 results. Missing fields are defaulted; network
    /// and decode failures propagate to the caller.
    pub async fn search(&self, query: &str) -> Result<Vec<Book>> {
        let url = format!(
            "{}/search.json?q={}&limit={}",
            self.base_url,
            urlencoding::encode(query),
            SEARCH_LIMIT
        );

        let response = self.client.get(&url).send().await?.error_for_status()?;
        let data: SearchResponse = response.json().await?;

        Ok(data
            .docs
            .into_iter()
            .take(SEARCH_LIMIT)
            .map(doc_to_book)
            .collect())
    }

    /// Fetch a single edition by ISBN.
    ///
    /// Author references are resolved concurrently; an author whose record
    /// cannot be fetched degrades to a placeholder name instead of failing
    /// the lookup. An unknown ISBN is [`AppError::NotFound`].
    pub async fn fetch_by_isbn(&self, isbn: &str) -> Result<Book> {
        let clean = normalize_isbn(isbn);
        let url = format!("{}/isbn/{}.json", self.base_url, clean);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(AppError::NotFound(format!("no edition for ISBN {}", clean)));
        }

        let record: EditionRecord = response.json().await?;

        let authors = if record.authors.is_empty() {
            vec![UNKNOWN_AUTHOR.to_string()]
        } else {
            let lookups = record.authors.iter().map(|author| self.resolve_author(author));
            join_all(lookups).await
        };

        Ok(Book {
            id: store::generate_id(),
            isbn: clean,
            title: record.title.unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            authors,
            page_count: record.number_of_pages.unwrap_or(0),
            cover_url: record.covers.into_iter().next().and_then(cover_url),
            description: record.description.map(TextOrTyped::into_string),
            published_date: record.publish_date,
            publisher: record.publishers.into_iter().next(),
        })
    }

    /// Best-effort page count for a book.
    ///
    /// The search index and edition records disagree on page-count
    /// availability, so no single lookup is reliable. Stages run in order,
    /// each swallowing its own failures: the book's existing value, a
    /// direct ISBN lookup, a title-search scan, and one more lookup via
    /// the first searched ISBN. Returns 0 when every stage comes up empty.
    pub async fn page_count(&self, book: &Book) -> u32 {
        if book.page_count > 0 {
            return book.page_count;
        }

        if !book.isbn.is_empty() {
            if let Some(pages) = self.pages_by_isbn(&book.isbn).await {
                return pages;
            }
        }

        if let Some(pages) = self.pages_from_title_search(&book.title).await {
            return pages;
        }

        0
    }

    /// Resolve one author reference: inline name first, else fetch the
    /// referenced record.
    async fn resolve_author(&self, author: &AuthorRef) -> String {
        if let Some(name) = &author.name {
            return name.clone();
        }

        if let Some(key) = &author.key {
            // key is catalog-relative, e.g. "/authors/OL12345A"
            let url = format!("{}{}.json", self.base_url, key);
            match self.fetch_json::<AuthorRecord>(&url).await {
                Ok(AuthorRecord { name: Some(name) }) => return name,
                Ok(AuthorRecord { name: None }) => {}
                Err(e) => {
                    tracing::debug!(key = %key, error = %e, "Author lookup failed");
                }
            }
        }

        UNKNOWN_AUTHOR.to_string()
    }

    /// Page count via a direct edition lookup.
    async fn pages_by_isbn(&self, isbn: &str) -> Option<u32> {
        let clean = normalize_isbn(isbn);
        let url = format!("{}/isbn/{}.json", self.base_url, clean);

        let record: EditionRecord = match self.fetch_json(&url).await {
            Ok(record) => record,
            Err(e) => {
                tracing::debug!(isbn = %clean, error = %e, "ISBN page lookup failed");
                return None;
            }
        };

        record.number_of_pages.filter(|pages| *pages > 0)
    }

    /// Page count via a title search: scan the first results for a page
    /// count, then fall back to an edition lookup through the first
    /// result that carries an ISBN.
    async fn pages_from_title_search(&self, title: &str) -> Option<u32> {
        let url = format!(
            "{}/search.json?title={}&limit={}",
            self.base_url,
            urlencoding::encode(title),
            PAGE_COUNT_SCAN_LIMIT
        );

        let data: SearchResponse = match self.fetch_json(&url).await {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!(title = %title, error = %e, "Title page search failed");
                return None;
            }
        };

        if let Some(pages) = scan_for_page_count(&data.docs) {
            return Some(pages);
        }

        let isbn = first_isbn(&data.docs)?.to_string();
        self.pages_by_isbn(&isbn).await
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

/// Strip separators and whitespace from an ISBN.
pub fn normalize_isbn(isbn: &str) -> String {
    isbn.chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect()
}

/// Cover image URL for a catalog cover id.
fn cover_url(cover_id: i64) -> Option<String> {
    (cover_id > 0).then(|| format!("{}/b/id/{}-M.jpg", COVERS_BASE_URL, cover_id))
}

/// Map a search document into the local book shape.
fn doc_to_book(doc: SearchDoc) -> Book {
    Book {
        id: store::generate_id(),
        isbn: doc.isbn.into_iter().next().unwrap_or_default(),
        title: doc.title.unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
        authors: if doc.author_name.is_empty() {
            vec![UNKNOWN_AUTHOR.to_string()]
        } else {
            doc.author_name
        },
        page_count: doc.number_of_pages_median.unwrap_or(0),
        cover_url: doc.cover_i.and_then(cover_url),
        description: None,
        published_date: doc.first_publish_year.map(|year| year.to_string()),
        publisher: doc.publisher.into_iter().next(),
    }
}

/// First positive page count among searched docs.
fn scan_for_page_count(docs: &[SearchDoc]) -> Option<u32> {
    docs.iter()
        .find_map(|doc| doc.number_of_pages_median.filter(|pages| *pages > 0))
}

/// First ISBN among searched docs.
fn first_isbn(docs: &[SearchDoc]) -> Option<&str> {
    docs.iter()
        .find_map(|doc| doc.isbn.first().map(String::as_str))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_doc_defaults_missing_fields() {
        let doc: SearchDoc = serde_json::from_str("{}").unwrap();
        let book = doc_to_book(doc);

        assert_eq!(book.title, UNKNOWN_TITLE);
        assert_eq!(book.authors, vec![UNKNOWN_AUTHOR.to_string()]);
        assert_eq!(book.page_count, 0);
        assert!(book.isbn.is_empty());
        assert!(book.cover_url.is_none());
        assert!(book.publisher.is_none());
    }

    #[test]
    fn test_search_doc_maps_catalog_fields() {
        let json = r#"{
            "title": "Dune",
            "author_name": ["Frank Herbert"],
            "isbn": ["9780441013593", "0441013597"],
            "number_of_pages_median": 412,
            "cover_i": 11481354,
            "first_publish_year": 1965,
            "publisher": ["Ace Books", "Chilton"]
        }"#;

        let book = doc_to_book(serde_json::from_str(json).unwrap());

        assert_eq!(book.title, "Dune");
        assert_eq!(book.authors, vec!["Frank Herbert".to_string()]);
        assert_eq!(book.isbn, "9780441013593");
        assert_eq!(book.page_count, 412);
        assert_eq!(
            book.cover_url.as_deref(),
            Some("https://covers.openlibrary.org/b/id/11481354-M.jpg")
        );
        assert_eq!(book.published_date.as_deref(), Some("1965"));
        assert_eq!(book.publisher.as_deref(), Some("Ace Books"));
    }

    #[test]
    fn test_edition_description_plain_or_typed() {
        let plain: EditionRecord =
            serde_json::from_str(r#"{"description": "A classic."}"#).unwrap();
        let typed: EditionRecord =
            serde_json::from_str(r#"{"description": {"type": "/type/text", "value": "A classic."}}"#)
                .unwrap();

        assert_eq!(plain.description.map(TextOrTyped::into_string).as_deref(), Some("A classic."));
        assert_eq!(typed.description.map(TextOrTyped::into_string).as_deref(), Some("A classic."));
    }

    #[test]
    fn test_normalize_isbn_strips_separators() {
        assert_eq!(normalize_isbn(" 978-0-441-01359-3 "), "9780441013593");
        assert_eq!(normalize_isbn("0441013597"), "0441013597");
    }

    #[test]
    fn test_page_scan_takes_first_positive() {
        let docs: Vec<SearchDoc> = serde_json::from_str(
            r#"[
                {"title": "a"},
                {"title": "b", "number_of_pages_median": 0},
                {"title": "c", "number_of_pages_median": 250},
                {"title": "d", "number_of_pages_median": 300}
            ]"#,
        )
        .unwrap();

        assert_eq!(scan_for_page_count(&docs), Some(250));
        assert_eq!(scan_for_page_count(&docs[..2]), None);
    }

    #[test]
    fn test_first_isbn_skips_docs_without_one() {
        let docs: Vec<SearchDoc> = serde_json::from_str(
            r#"[
                {"title": "a"},
                {"title": "b", "isbn": []},
                {"title": "c", "isbn": ["9780441013593"]}
            ]"#,
        )
        .unwrap();

        assert_eq!(first_isbn(&docs), Some("9780441013593"));
        assert_eq!(first_isbn(&docs[..2]), None);
    }

    #[test]
    fn test_known_page_count_short_circuits() {
        // Endpoint that would fail instantly if it were ever contacted.
        let client = CatalogClient::new("http://127.0.0.1:1");
        let book = Book {
            id: "id_test".to_string(),
            isbn: "9780441013593".to_string(),
            title: "Dune".to_string(),
            authors: vec!["Frank Herbert".to_string()],
            page_count: 412,
            cover_url: None,
            description: None,
            published_date: None,
            publisher: None,
        };

        let pages = tokio_test::block_on(client.page_count(&book));
        assert_eq!(pages, 412);
    }
}
