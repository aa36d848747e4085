//! Leaderboard sync: optimistic stats push and a live merged ranking.
//!
//! The service is built once at startup. Without a configured remote
//! store (or with an invalid one) it stays disabled for the lifetime of
//! the process and every operation is a silent no-op, so the tracker is
//! fully usable local-only. Local stats always come from local state;
//! the remote store only ever contributes peers.

mod remote;

pub use remote::{RemoteStore, StreamEvent};

use crate::error::Result;
use crate::stats::Stats;
use crate::store::User;
use parking_lot::RwLock;
use remote::ChangePayload;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Delay before reopening a dropped subscription stream.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// One user's public stats record on the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    /// User ID, also the record key.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Total pages read.
    #[serde(default)]
    pub pages_read: u64,
    /// Completed book count.
    #[serde(default)]
    pub books_completed: u32,
    /// Epoch milliseconds of the last push.
    #[serde(default)]
    pub last_updated: i64,
}

/// One row of the rendered leaderboard.
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    /// User ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Total pages read.
    pub pages_read: u64,
    /// Completed book count.
    pub books_completed: u32,
    /// 1-based rank after sorting.
    pub rank: usize,
    /// Whether this row is the local reader.
    pub is_current: bool,
}

/// Build the ranked view from the local entry and the cached peers.
///
/// The local entry is authoritative for the local user: remote records
/// carrying the same id are dropped before ranking. The sort is stable,
/// so entries tied on pages keep their order, local first.
pub fn ranked(local: &RemoteEntry, peers: &[RemoteEntry]) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = Vec::with_capacity(peers.len() + 1);

    entries.push(LeaderboardEntry {
        id: local.id.clone(),
        name: local.name.clone(),
        pages_read: local.pages_read,
        books_completed: local.books_completed,
        rank: 0,
        is_current: true,
    });

    for peer in peers {
        if peer.id == local.id {
            continue;
        }

        entries.push(LeaderboardEntry {
            id: peer.id.clone(),
            name: peer.name.clone(),
            pages_read: peer.pages_read,
            books_completed: peer.books_completed,
            rank: 0,
            is_current: false,
        });
    }

    entries.sort_by(|a, b| b.pages_read.cmp(&a.pages_read));

    for (index, entry) in entries.iter_mut().enumerate() {
        entry.rank = index + 1;
    }

    entries
}

/// Peer cache shared with the subscription task.
struct PeerCache {
    peers: RwLock<Vec<RemoteEntry>>,
    changes: watch::Sender<u64>,
}

impl PeerCache {
    fn new() -> Self {
        let (changes, _) = watch::channel(0);

        Self {
            peers: RwLock::new(Vec::new()),
            changes,
        }
    }

    /// Replace the whole cache, notifying only on an actual change.
    fn replace(&self, entries: Vec<RemoteEntry>) {
        let changed = {
            let mut peers = self.peers.write();
            let changed = *peers != entries;
            *peers = entries;
            changed
        };

        if changed {
            self.notify();
        }
    }

    /// Apply one stream event to the cache.
    ///
    /// Replaying an event the cache already reflects changes nothing and
    /// notifies nobody, so duplicate snapshots after a reconnect are
    /// harmless.
    fn apply_event(&self, event: &StreamEvent) {
        match event.event.as_str() {
            "put" | "patch" => {}
            // keep-alive and control frames carry no data
            _ => return,
        }

        let payload: ChangePayload = match serde_json::from_str(&event.data) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring malformed stream payload");
                return;
            }
        };

        let changed = {
            let mut peers = self.peers.write();
            let before = peers.clone();

            apply_payload(&mut peers, &event.event, payload);

            *peers != before
        };

        if changed {
            self.notify();
        }
    }

    fn notify(&self) {
        self.changes.send_modify(|generation| *generation += 1);
    }
}

/// Fold one change payload into the peer cache.
fn apply_payload(peers: &mut Vec<RemoteEntry>, event: &str, payload: ChangePayload) {
    let segments: Vec<String> = payload
        .path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect();

    match segments.as_slice() {
        [] => {
            // Root change: a put replaces the collection, a patch
            // merges its children.
            let entries = remote::entries_from_value(payload.data);
            if event == "put" {
                *peers = entries;
            } else {
                for entry in entries {
                    upsert(peers, entry);
                }
            }
        }
        [id] => {
            if payload.data.is_null() {
                peers.retain(|entry| entry.id != *id);
            } else {
                match serde_json::from_value::<RemoteEntry>(payload.data) {
                    Ok(entry) => upsert(peers, entry),
                    Err(e) => {
                        tracing::debug!(id = %id, error = %e, "Ignoring malformed peer record");
                    }
                }
            }
        }
        _ => {
            // A change below one record cannot be applied to the flat
            // cache; the next full snapshot will carry it.
            tracing::debug!(path = %payload.path, "Ignoring nested stream change");
        }
    }
}

/// Insert or replace a peer record by id, keeping arrival order.
fn upsert(entries: &mut Vec<RemoteEntry>, entry: RemoteEntry) {
    match entries.iter_mut().find(|existing| existing.id == entry.id) {
        Some(existing) => *existing = entry,
        None => entries.push(entry),
    }
}

/// One-way stats push plus a live peer cache for the leaderboard.
#[derive(Clone)]
pub struct LeaderboardSync {
    store: Option<RemoteStore>,
    cache: Arc<PeerCache>,
}

impl LeaderboardSync {
    /// Initialize from configuration. Never fails: a missing or invalid
    /// URL leaves the service disabled.
    pub fn connect(url: Option<&str>) -> Self {
        let store = match url {
            Some(url) if !url.trim().is_empty() => match RemoteStore::new(url) {
                Ok(store) => {
                    tracing::info!(url = %url, "Leaderboard sync enabled");
                    Some(store)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Leaderboard sync disabled");
                    None
                }
            },
            _ => {
                tracing::info!("No leaderboard store configured, running local-only");
                None
            }
        };

        Self {
            store,
            cache: Arc::new(PeerCache::new()),
        }
    }

    /// Service with sync off, for local-only use.
    pub fn disabled() -> Self {
        Self {
            store: None,
            cache: Arc::new(PeerCache::new()),
        }
    }

    /// Whether a remote store is configured and in use.
    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Register for change notifications. The receiver observes a
    /// generation counter that bumps whenever the peer cache changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.cache.changes.subscribe()
    }

    /// Snapshot of the cached peers.
    pub fn peers(&self) -> Vec<RemoteEntry> {
        self.cache.peers.read().clone()
    }

    /// The record pushed for the local reader.
    pub fn local_entry(user: &User, stats: &Stats) -> RemoteEntry {
        RemoteEntry {
            id: user.id.clone(),
            name: user.name.clone(),
            pages_read: stats.total_pages,
            books_completed: stats.completed_books,
            last_updated: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Upsert the local reader's stats on the remote store.
    ///
    /// No-op while disabled. Local state is already saved by the time
    /// this runs, so callers on the write-through path log failures
    /// instead of surfacing them.
    pub async fn push_stats(&self, user: &User, stats: &Stats) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let entry = Self::local_entry(user, stats);
        store.put_entry(&entry).await?;
        tracing::debug!(user = %entry.id, pages = entry.pages_read, "Pushed stats to leaderboard");
        Ok(())
    }

    /// Refresh the peer cache with a one-shot snapshot fetch.
    pub async fn fetch_peers(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let entries = store.fetch_entries().await?;
        self.cache.replace(entries);
        Ok(())
    }

    /// Ranked view from the local reader's stats and the cached peers.
    pub fn leaderboard(&self, user: &User, stats: &Stats) -> Vec<LeaderboardEntry> {
        let local = Self::local_entry(user, stats);
        ranked(&local, &self.cache.peers.read())
    }

    /// Spawn the live subscription task. No-op while disabled.
    ///
    /// The stream is reopened after a fixed delay whenever it ends or
    /// fails, so a flaky network degrades to eventual consistency rather
    /// than a dead view.
    pub fn start_subscription(&self) {
        let Some(store) = self.store.clone() else {
            return;
        };

        let cache = Arc::clone(&self.cache);

        tokio::spawn(async move {
            loop {
                let handler = {
                    let cache = Arc::clone(&cache);
                    move |event: StreamEvent| cache.apply_event(&event)
                };

                match store.stream_events(handler).await {
                    Ok(()) => tracing::debug!("Leaderboard stream ended"),
                    Err(e) => tracing::warn!(error = %e, "Leaderboard stream failed"),
                }

                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        });
    }

    /// Feed one stream event into the cache (test hook for the
    /// subscription path).
    #[cfg(test)]
    pub(crate) fn apply_stream_event(&self, event: &StreamEvent) {
        self.cache.apply_event(event);
    }
}
