#[cfg(any(test, feature = "test-util"))]
mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::error::Result;
use crate::models::{Feed, FeedUpsert, ItemInsert, ItemWithFeed};

/// Embedded migrations for the `feed`/`item` schema (spec §6). Run via
/// `store::MIGRATOR.run(&pool).await` at service startup.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Persistence contract required by the Feed Processor and Scheduler,
/// plus the read/administrative paths the HTTP API needs. Kept as a
/// trait (rather than a single concrete `PgStore`) so the processor and
/// scheduler's orchestration logic can be driven by an in-memory double
/// in tests, without needing a live database for every unit test.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Feeds whose `next_fetch_at` is null or `<= now`, ordered
    /// ascending with nulls first.
    async fn select_due_feeds(&self, now: DateTime<Utc>) -> Result<Vec<String>>;

    /// The earliest `next_fetch_at` strictly in the future, if any.
    async fn select_earliest_future_fetch(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>>;

    /// The current smoothed publish rate for a feed, if the feed is
    /// known and has one.
    async fn select_feed_rate(&self, feed_url: &str) -> Result<Option<f64>>;

    /// Insert-or-update by `feed_url`; every `Some` field overwrites
    /// the stored column, every `None` leaves it untouched.
    async fn upsert_feed(&self, row: FeedUpsert) -> Result<()>;

    /// Insert the item if its URL isn't already present. Returns
    /// whether a new row was inserted.
    async fn insert_item_if_absent(&self, row: ItemInsert) -> Result<bool>;

    /// Full-text search over title/description/content, joined with
    /// enough of the parent feed to label results, ordered by
    /// `published DESC` with nulls last.
    async fn search_items(&self, query: &str, limit: i64, offset: i64) -> Result<Vec<ItemWithFeed>>;

    async fn list_feeds(&self) -> Result<Vec<Feed>>;

    /// Deletes a feed and, via the foreign key, its items. Returns
    /// whether a row existed to delete.
    async fn delete_feed(&self, feed_url: &str) -> Result<bool>;
}
