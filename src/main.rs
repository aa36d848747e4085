//! booktrack-rs entry point.

use booktrack_rs::{
    catalog::{self, CatalogClient},
    config::{AddCommand, Cli, Command, Config},
    leaderboard::LeaderboardSync,
    stats::{ReadingStatus, percent_complete},
    store::{self, Book, Store},
    tracker::{BookPatch, Tracker, is_duplicate},
};
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; one-shot commands stay quiet below warn
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "booktrack_rs=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Find or load config
    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };

    // Handle command
    match cli.command {
        Some(Command::Init { force }) => cmd_init(force).await,
        Some(Command::Search { query }) => cmd_search(&config, &query).await,
        Some(Command::Add { source }) => cmd_add(&config, source).await,
        Some(Command::List { status, search }) => cmd_list(&config, status, search).await,
        Some(Command::Show { book }) => cmd_show(&config, &book).await,
        Some(Command::Progress {
            book,
            page,
            advance,
        }) => cmd_progress(&config, &book, page, advance).await,
        Some(Command::Edit {
            book,
            title,
            authors,
            pages,
            isbn,
        }) => cmd_edit(&config, &book, title, authors, pages, isbn).await,
        Some(Command::Remove { book, yes }) => cmd_remove(&config, &book, yes).await,
        Some(Command::Stats) => cmd_stats(&config).await,
        Some(Command::Profile { name, email }) => cmd_profile(&config, name, email).await,
        Some(Command::Leaderboard { watch }) => cmd_leaderboard(&config, watch).await,
        Some(Command::Export { path }) => cmd_export(&config, path).await,
        Some(Command::Import { path }) => cmd_import(&config, path).await,
        Some(Command::Reset { yes }) => cmd_reset(&config, yes).await,
        Some(Command::Sync) => cmd_sync(&config).await,
        None => cmd_overview(&config).await,
    }
}

/// Open the store and wire the tracker up with leaderboard sync.
fn open_tracker(config: &Config) -> anyhow::Result<Tracker> {
    let store = Store::open(&config.database.path)?;
    let sync = LeaderboardSync::connect(config.leaderboard.url.as_deref());

    Ok(Tracker::open(store, sync)?)
}

/// Initialize config and store.
async fn cmd_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from("config.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    // Write default config
    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());

    // Initialize store
    let config = Config::default();
    let _store = Store::open(&config.database.path)?;
    println!("Initialized store: {}", config.database.path.display());

    println!("\nEdit config.toml to point at a shared leaderboard (optional).");
    println!("Then try: booktrack-rs search \"dune\"");

    Ok(())
}

/// Search the catalog.
async fn cmd_search(config: &Config, query: &str) -> anyhow::Result<()> {
    let tracker = open_tracker(config)?;
    let owned = tracker.books()?;

    let client = CatalogClient::new(&config.catalog.url);
    let results = client.search(query).await?;

    if results.is_empty() {
        println!("No results for '{}'.", query);
        return Ok(());
    }

    println!("{:<4} {:<42} {:<26} PAGES", "#", "TITLE", "AUTHORS");
    println!("{}", "-".repeat(84));

    for (index, book) in results.iter().enumerate() {
        let in_library = owned.iter().any(|mine| is_duplicate(mine, book));

        let pages = if book.page_count > 0 {
            book.page_count.to_string()
        } else {
            "?".to_string()
        };

        println!(
            "{:<4} {:<42} {:<26} {}{}",
            index + 1,
            truncate(&book.title, 40),
            truncate(&book.authors.join(", "), 24),
            pages,
            if in_library { "  (in library)" } else { "" }
        );
    }

    println!("\nAdd one with: booktrack-rs add search \"{}\" --pick <#>", query);

    Ok(())
}

/// Add a book from the catalog or by hand.
async fn cmd_add(config: &Config, source: AddCommand) -> anyhow::Result<()> {
    let tracker = open_tracker(config)?;
    let client = CatalogClient::new(&config.catalog.url);

    let book = match source {
        AddCommand::Search { query, pick } => {
            let results = client.search(&query).await?;
            if results.is_empty() {
                anyhow::bail!("No results for '{}'", query);
            }

            let count = results.len();
            let mut book = pick
                .checked_sub(1)
                .and_then(|index| results.into_iter().nth(index))
                .ok_or_else(|| {
                    anyhow::anyhow!("Pick {} is out of range (1-{})", pick, count)
                })?;

            if book.page_count == 0 {
                // The search index often lacks a page count; try the
                // remaining catalog sources before giving up.
                book.page_count = client.page_count(&book).await;
            }

            book
        }

        AddCommand::Isbn { isbn } => client.fetch_by_isbn(&isbn).await?,

        AddCommand::Manual {
            title,
            author,
            pages,
            isbn,
        } => {
            let title = title.trim().to_string();
            if title.is_empty() {
                anyhow::bail!("Title cannot be empty");
            }
            if author.is_empty() {
                anyhow::bail!("At least one --author is required");
            }

            Book {
                id: store::generate_id(),
                isbn: catalog::normalize_isbn(&isbn),
                title,
                authors: author,
                page_count: pages,
                cover_url: None,
                description: None,
                published_date: None,
                publisher: None,
            }
        }
    };

    let title = book.title.clone();
    let pages = book.page_count;

    if tracker.add_book(book).await? {
        println!("Added: {}", title);
        if pages > 0 {
            println!("Pages: {}", pages);
        } else {
            println!(
                "Page count unknown - set it with: booktrack-rs edit \"{}\" --pages <n>",
                title
            );
        }
    } else {
        println!("Already in library: {}", title);
    }

    Ok(())
}

/// List library books.
async fn cmd_list(
    config: &Config,
    status: Option<String>,
    search: Option<String>,
) -> anyhow::Result<()> {
    let tracker = open_tracker(config)?;

    let filter = status
        .as_deref()
        .map(str::parse::<ReadingStatus>)
        .transpose()
        .map_err(|e| anyhow::anyhow!(e))?;

    let mut entries = tracker.user_books()?;

    if let Some(filter) = filter {
        entries.retain(|entry| entry.status == filter);
    }
    if let Some(needle) = &search {
        entries.retain(|entry| entry.matches_text(needle));
    }

    if entries.is_empty() {
        println!("No books found.");
        println!("Add one with: booktrack-rs add search \"<query>\"");
        return Ok(());
    }

    println!("{:<11} {:<42} {:<26} PROGRESS", "STATUS", "TITLE", "AUTHORS");
    println!("{}", "-".repeat(96));

    for entry in &entries {
        let progress = if entry.book.page_count > 0 {
            format!(
                "{}/{} ({}%)",
                entry.progress.current_page, entry.book.page_count, entry.percent
            )
        } else {
            "no page count".to_string()
        };

        println!(
            "{:<11} {:<42} {:<26} {}",
            entry.status.label(),
            truncate(&entry.book.title, 40),
            truncate(&entry.book.authors.join(", "), 24),
            progress
        );
    }

    Ok(())
}

/// Show one book in detail.
async fn cmd_show(config: &Config, selector: &str) -> anyhow::Result<()> {
    let tracker = open_tracker(config)?;
    let book = tracker.find_book(selector)?;

    let entries = tracker.user_books()?;
    let entry = entries
        .iter()
        .find(|entry| entry.book.id == book.id)
        .ok_or_else(|| anyhow::anyhow!("No library entry for '{}'", book.title))?;

    println!("{:<14} {}", "Title:", book.title);
    println!("{:<14} {}", "Authors:", book.authors.join(", "));
    if !book.isbn.is_empty() {
        println!("{:<14} {}", "ISBN:", book.isbn);
    }
    if let Some(publisher) = &book.publisher {
        println!("{:<14} {}", "Publisher:", publisher);
    }
    if let Some(date) = &book.published_date {
        println!("{:<14} {}", "Published:", date);
    }

    println!("{:<14} {}", "Status:", entry.status.label());

    if book.page_count > 0 {
        println!(
            "{:<14} {} / {} ({}%)",
            "Progress:", entry.progress.current_page, book.page_count, entry.percent
        );
        if !entry.progress.is_completed {
            println!("{:<14} {} pages", "Remaining:", entry.pages_remaining());
        }
    } else {
        println!(
            "{:<14} unknown - set it with: booktrack-rs edit \"{}\" --pages <n>",
            "Pages:", book.title
        );
    }

    println!(
        "{:<14} {}",
        "Started:",
        entry.progress.date_started.format("%Y-%m-%d")
    );
    if let Some(completed) = entry.progress.date_completed {
        println!("{:<14} {}", "Completed:", completed.format("%Y-%m-%d"));
    }
    println!("{:<14} {}", "Id:", book.id);

    if let Some(description) = &book.description {
        println!("\n{}", description);
    }

    Ok(())
}

/// Record reading progress.
async fn cmd_progress(
    config: &Config,
    selector: &str,
    page: Option<u32>,
    advance: Option<u32>,
) -> anyhow::Result<()> {
    let tracker = open_tracker(config)?;
    let book = tracker.find_book(selector)?;

    if book.page_count == 0 {
        println!("'{}' has no page count, so progress cannot move.", book.title);
        println!(
            "Set one with: booktrack-rs edit \"{}\" --pages <n>",
            book.title
        );
        return Ok(());
    }

    let (current, was_completed) = tracker
        .progress()?
        .iter()
        .find(|record| record.book_id == book.id)
        .map(|record| (record.current_page, record.is_completed))
        .unwrap_or((0, false));

    let target = match (page, advance) {
        (Some(page), _) => page,
        (None, Some(step)) => current.saturating_add(step),
        (None, None) => anyhow::bail!("Pass --page <n> or --advance <n>"),
    };

    let updated = tracker.update_progress(&book.id, target).await?;

    println!(
        "{}: {} / {} ({}%)",
        book.title,
        updated.current_page,
        book.page_count,
        percent_complete(updated.current_page, book.page_count)
    );

    if updated.is_completed && !was_completed {
        println!("Congratulations! You completed \"{}\"!", book.title);
    }

    Ok(())
}

/// Edit book fields.
async fn cmd_edit(
    config: &Config,
    selector: &str,
    title: Option<String>,
    authors: Option<String>,
    pages: Option<u32>,
    isbn: Option<String>,
) -> anyhow::Result<()> {
    if title.is_none() && authors.is_none() && pages.is_none() && isbn.is_none() {
        anyhow::bail!("Nothing to change. Pass --title, --authors, --pages or --isbn.");
    }

    let tracker = open_tracker(config)?;
    let book = tracker.find_book(selector)?;

    let authors = authors.map(|list| {
        list.split(',')
            .map(|author| author.trim().to_string())
            .filter(|author| !author.is_empty())
            .collect::<Vec<_>>()
    });
    if matches!(&authors, Some(list) if list.is_empty()) {
        anyhow::bail!("Author list cannot be empty");
    }

    let patch = BookPatch {
        title,
        authors,
        page_count: pages,
        isbn,
    };

    tracker.update_book(&book.id, patch).await?;
    println!("Updated: {}", book.title);

    Ok(())
}

/// Remove a book and its progress.
async fn cmd_remove(config: &Config, selector: &str, yes: bool) -> anyhow::Result<()> {
    let tracker = open_tracker(config)?;
    let book = tracker.find_book(selector)?;

    if !yes {
        let answer = prompt(&format!(
            "Remove \"{}\" and its progress? [y/N] ",
            book.title
        ))?;
        if !answer.eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    if tracker.delete_book(&book.id).await? {
        println!("Removed: {}", book.title);
    } else {
        println!("Book not found: {}", selector);
    }

    Ok(())
}

/// Show aggregate statistics.
async fn cmd_stats(config: &Config) -> anyhow::Result<()> {
    let tracker = open_tracker(config)?;
    let stats = tracker.stats()?;
    let books = tracker.books()?;

    println!("{:<18} {}", "Books in library:", books.len());
    println!("{:<18} {}", "Pages read:", stats.total_pages);
    println!("{:<18} {}", "Books completed:", stats.completed_books);
    println!("{:<18} {}", "Streak:", stats.streak);

    Ok(())
}

/// Show or edit the profile.
async fn cmd_profile(
    config: &Config,
    name: Option<String>,
    email: Option<String>,
) -> anyhow::Result<()> {
    let tracker = open_tracker(config)?;

    if name.is_none() && email.is_none() {
        let user = tracker.user()?;
        let stats = tracker.stats()?;

        println!("{:<14} {}", "Name:", user.name);
        println!("{:<14} {}", "Email:", user.email);
        println!("{:<14} {}", "Id:", user.id);
        println!(
            "{:<14} {}",
            "Member since:",
            user.created_at.format("%Y-%m-%d")
        );
        println!();
        println!("{:<14} {}", "Pages read:", stats.total_pages);
        println!("{:<14} {}", "Completed:", stats.completed_books);

        return Ok(());
    }

    let user = tracker.update_profile(name, email).await?;
    println!("Profile updated: {} <{}>", user.name, user.email);

    Ok(())
}

/// Show the shared leaderboard.
async fn cmd_leaderboard(config: &Config, watch: bool) -> anyhow::Result<()> {
    let tracker = open_tracker(config)?;
    let sync = tracker.sync().clone();

    if !sync.is_enabled() {
        println!("Leaderboard sync is off - set [leaderboard] url in the config to compare with friends.");
        println!();
    } else if let Err(e) = sync.fetch_peers().await {
        // Render what we have; the local row is always correct.
        tracing::warn!(error = %e, "Leaderboard fetch failed");
    }

    render_leaderboard(&tracker, sync.is_enabled())?;

    if !watch || !sync.is_enabled() {
        return Ok(());
    }

    sync.start_subscription();
    let mut changes = sync.subscribe();

    println!("\nWatching for changes (Ctrl-C to stop)...");

    loop {
        if changes.changed().await.is_err() {
            break;
        }

        println!();
        render_leaderboard(&tracker, true)?;
    }

    Ok(())
}

/// Print the ranked leaderboard table.
fn render_leaderboard(tracker: &Tracker, connected: bool) -> anyhow::Result<()> {
    let user = tracker.user()?;
    let stats = tracker.stats()?;
    let entries = tracker.sync().leaderboard(&user, &stats);

    println!("{:<6} {:<26} {:<10} COMPLETED", "RANK", "READER", "PAGES");
    println!("{}", "-".repeat(60));

    for entry in &entries {
        let reader = if entry.is_current {
            format!("{} (you)", truncate(&entry.name, 18))
        } else {
            truncate(&entry.name, 24)
        };

        println!(
            "{:<6} {:<26} {:<10} {}",
            entry.rank, reader, entry.pages_read, entry.books_completed
        );
    }

    if connected {
        println!(
            "\nConnected - {} reader{}",
            entries.len(),
            if entries.len() == 1 { "" } else { "s" }
        );
    }

    Ok(())
}

/// Export all data as JSON.
async fn cmd_export(config: &Config, path: Option<PathBuf>) -> anyhow::Result<()> {
    let tracker = open_tracker(config)?;
    let json = tracker.export_all()?;

    match path {
        Some(path) => {
            std::fs::write(&path, &json)?;
            println!("Exported to: {}", path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}

/// Import a JSON backup.
async fn cmd_import(config: &Config, path: PathBuf) -> anyhow::Result<()> {
    let tracker = open_tracker(config)?;
    let data = std::fs::read_to_string(&path)?;

    tracker.import_all(&data).await?;

    let books = tracker.books()?;
    println!(
        "Imported {} book{} from {}",
        books.len(),
        if books.len() == 1 { "" } else { "s" },
        path.display()
    );

    Ok(())
}

/// Delete all local data.
async fn cmd_reset(config: &Config, yes: bool) -> anyhow::Result<()> {
    if !yes {
        let answer = prompt("Delete ALL books, progress and profile? This cannot be undone. [y/N] ")?;
        if !answer.eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let tracker = open_tracker(config)?;
    let user = tracker.reset_all().await?;
    println!("All data deleted. New profile id: {}", user.id);

    Ok(())
}

/// Push current stats to the leaderboard now.
async fn cmd_sync(config: &Config) -> anyhow::Result<()> {
    let tracker = open_tracker(config)?;

    if !tracker.sync().is_enabled() {
        println!("Leaderboard sync is off - set [leaderboard] url in the config first.");
        return Ok(());
    }

    let user = tracker.user()?;
    let stats = tracker.stats()?;
    tracker.sync().push_stats(&user, &stats).await?;

    println!(
        "Pushed {} pages / {} completed to the leaderboard.",
        stats.total_pages, stats.completed_books
    );

    Ok(())
}

/// Default view: greeting, stats and books in progress.
async fn cmd_overview(config: &Config) -> anyhow::Result<()> {
    let tracker = open_tracker(config)?;
    let user = tracker.user()?;
    let stats = tracker.stats()?;

    println!("Hello, {}!", user.name);
    println!();
    println!("{:<18} {}", "Pages read:", stats.total_pages);
    println!("{:<18} {}", "Books completed:", stats.completed_books);
    println!("{:<18} {}", "Streak:", stats.streak);

    let entries = tracker.user_books()?;
    let reading: Vec<_> = entries
        .iter()
        .filter(|entry| entry.status == ReadingStatus::Reading)
        .collect();

    if reading.is_empty() {
        println!("\nNo books in progress. Find one with: booktrack-rs search \"<query>\"");
    } else {
        println!("\nCurrently reading:");
        for entry in reading {
            println!(
                "  {} - {} / {} ({}%)",
                entry.book.title,
                entry.progress.current_page,
                entry.book.page_count,
                entry.percent
            );
        }
    }

    Ok(())
}

/// Prompt for one line of input.
fn prompt(message: &str) -> anyhow::Result<String> {
    print!("{}", message);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;

    Ok(line.trim().to_string())
}

/// Shorten a value to fit a table column.
fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        value.to_string()
    } else {
        let cut: String = value.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
