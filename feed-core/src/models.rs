use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A subscribed feed, keyed by the final URL reached after redirects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Feed {
    pub feed_url: String,
    pub home_url: Option<String>,
    pub name: Option<String>,
    pub link: Option<String>,
    pub image: Option<String>,
    pub last_published: Option<DateTime<Utc>>,
    pub last_fetched: Option<DateTime<Utc>>,
    pub next_fetch_at: Option<DateTime<Utc>>,
    pub publish_rate_per_hour: Option<f64>,
}

/// A single feed item, keyed by its own article URL.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Item {
    pub url: String,
    pub feed_url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub image: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub author: Option<String>,
}

/// `Item` joined with enough of its parent `Feed` to render a search
/// result without a second round-trip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ItemWithFeed {
    pub url: String,
    pub feed_url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub image: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub feed_name: Option<String>,
}

/// The fields a `Feed` upsert overwrites. Every `Some` value replaces
/// the existing column; `None` leaves it untouched, per spec's
/// "overwrites all non-null columns" rule.
#[derive(Clone, Debug, PartialEq)]
pub struct FeedUpsert {
    pub feed_url: String,
    pub home_url: Option<String>,
    pub name: Option<String>,
    pub link: Option<String>,
    pub image: Option<String>,
    pub last_published: Option<DateTime<Utc>>,
    pub last_fetched: Option<DateTime<Utc>>,
    pub next_fetch_at: Option<DateTime<Utc>>,
    pub publish_rate_per_hour: Option<f64>,
}

/// A parsed item ready to be inserted, pre-image-inlining.
#[derive(Clone, Debug, PartialEq)]
pub struct ItemInsert {
    pub url: String,
    pub feed_url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub image: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub author: Option<String>,
}
