use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Feed, FeedUpsert, ItemInsert, ItemWithFeed};

use super::FeedStore;

/// In-memory double for [`FeedStore`], used to drive the processor and
/// scheduler's orchestration logic in tests without a live Postgres
/// instance. Not used in production; the `feed-api` binary always
/// wires up [`super::PgStore`].
#[derive(Default)]
pub struct MemoryStore {
    feeds: Mutex<Vec<Feed>>,
    items: Mutex<Vec<Item>>,
}

#[derive(Clone)]
struct Item {
    url: String,
    feed_url: String,
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    image: Option<String>,
    published: Option<DateTime<Utc>>,
    author: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeedStore for MemoryStore {
    async fn select_due_feeds(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let feeds = self.feeds.lock().expect("memory store poisoned");
        let mut due: Vec<&Feed> = feeds
            .iter()
            .filter(|f| f.next_fetch_at.is_none() || f.next_fetch_at.unwrap() <= now)
            .collect();
        due.sort_by_key(|f| f.next_fetch_at);
        Ok(due.into_iter().map(|f| f.feed_url.clone()).collect())
    }

    async fn select_earliest_future_fetch(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        let feeds = self.feeds.lock().expect("memory store poisoned");
        Ok(feeds
            .iter()
            .filter_map(|f| f.next_fetch_at)
            .filter(|t| *t > now)
            .min())
    }

    async fn select_feed_rate(&self, feed_url: &str) -> Result<Option<f64>> {
        let feeds = self.feeds.lock().expect("memory store poisoned");
        Ok(feeds
            .iter()
            .find(|f| f.feed_url == feed_url)
            .and_then(|f| f.publish_rate_per_hour))
    }

    async fn upsert_feed(&self, row: FeedUpsert) -> Result<()> {
        let mut feeds = self.feeds.lock().expect("memory store poisoned");
        match feeds.iter_mut().find(|f| f.feed_url == row.feed_url) {
            Some(existing) => {
                if row.home_url.is_some() {
                    existing.home_url = row.home_url;
                }
                if row.name.is_some() {
                    existing.name = row.name;
                }
                if row.link.is_some() {
                    existing.link = row.link;
                }
                if row.image.is_some() {
                    existing.image = row.image;
                }
                if row.last_published.is_some() {
                    existing.last_published = row.last_published;
                }
                if row.last_fetched.is_some() {
                    existing.last_fetched = row.last_fetched;
                }
                if row.next_fetch_at.is_some() {
                    existing.next_fetch_at = row.next_fetch_at;
                }
                if row.publish_rate_per_hour.is_some() {
                    existing.publish_rate_per_hour = row.publish_rate_per_hour;
                }
            }
            None => feeds.push(Feed {
                feed_url: row.feed_url,
                home_url: row.home_url,
                name: row.name,
                link: row.link,
                image: row.image,
                last_published: row.last_published,
                last_fetched: row.last_fetched,
                next_fetch_at: row.next_fetch_at,
                publish_rate_per_hour: row.publish_rate_per_hour,
            }),
        }
        Ok(())
    }

    async fn insert_item_if_absent(&self, row: ItemInsert) -> Result<bool> {
        let mut items = self.items.lock().expect("memory store poisoned");
        if items.iter().any(|i| i.url == row.url) {
            return Ok(false);
        }
        items.push(Item {
            url: row.url,
            feed_url: row.feed_url,
            title: row.title,
            description: row.description,
            content: row.content,
            image: row.image,
            published: row.published,
            author: row.author,
        });
        Ok(true)
    }

    async fn search_items(&self, query: &str, limit: i64, offset: i64) -> Result<Vec<ItemWithFeed>> {
        let items = self.items.lock().expect("memory store poisoned");
        let feeds = self.feeds.lock().expect("memory store poisoned");

        let tokens: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_ascii_lowercase())
            .collect();

        let mut matches: Vec<ItemWithFeed> = items
            .iter()
            .filter(|item| {
                if tokens.is_empty() {
                    return true;
                }
                let haystack = format!(
                    "{} {} {}",
                    item.title.as_deref().unwrap_or(""),
                    item.description.as_deref().unwrap_or(""),
                    item.content.as_deref().unwrap_or("")
                )
                .to_ascii_lowercase();
                tokens.iter().all(|tok| haystack.contains(tok.as_str()))
            })
            .map(|item| ItemWithFeed {
                url: item.url.clone(),
                feed_url: item.feed_url.clone(),
                title: item.title.clone(),
                description: item.description.clone(),
                content: item.content.clone(),
                image: item.image.clone(),
                published: item.published,
                author: item.author.clone(),
                feed_name: feeds
                    .iter()
                    .find(|f| f.feed_url == item.feed_url)
                    .and_then(|f| f.name.clone()),
            })
            .collect();

        matches.sort_by(|a, b| match (a.published, b.published) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });

        let start = offset.max(0) as usize;
        let end = (start + limit.max(0) as usize).min(matches.len());
        Ok(if start >= matches.len() {
            Vec::new()
        } else {
            matches[start..end].to_vec()
        })
    }

    async fn list_feeds(&self) -> Result<Vec<Feed>> {
        let feeds = self.feeds.lock().expect("memory store poisoned");
        let mut out = feeds.clone();
        out.sort_by(|a, b| a.feed_url.cmp(&b.feed_url));
        Ok(out)
    }

    async fn delete_feed(&self, feed_url: &str) -> Result<bool> {
        let mut feeds = self.feeds.lock().expect("memory store poisoned");
        let before = feeds.len();
        feeds.retain(|f| f.feed_url != feed_url);
        let removed = feeds.len() != before;
        if removed {
            let mut items = self.items.lock().expect("memory store poisoned");
            items.retain(|i| i.feed_url != feed_url);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::hours(hour)
    }

    async fn upsert(store: &MemoryStore, url: &str, next_fetch_at: Option<DateTime<Utc>>) {
        store
            .upsert_feed(FeedUpsert {
                feed_url: url.to_string(),
                home_url: None,
                name: Some("name".to_string()),
                link: None,
                image: None,
                last_published: None,
                last_fetched: None,
                next_fetch_at,
                publish_rate_per_hour: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn due_feeds_orders_nulls_first_then_ascending() {
        let store = MemoryStore::new();
        upsert(&store, "https://b", Some(at(5))).await;
        upsert(&store, "https://a", None).await;
        upsert(&store, "https://c", Some(at(1))).await;

        let due = store.select_due_feeds(at(10)).await.unwrap();
        assert_eq!(due, vec!["https://a", "https://c", "https://b"]);
    }

    #[tokio::test]
    async fn upsert_overwrites_only_some_fields() {
        let store = MemoryStore::new();
        store
            .upsert_feed(FeedUpsert {
                feed_url: "https://a".into(),
                home_url: Some("https://home".into()),
                name: Some("Name".into()),
                link: None,
                image: None,
                last_published: None,
                last_fetched: None,
                next_fetch_at: None,
                publish_rate_per_hour: Some(1.0),
            })
            .await
            .unwrap();

        store
            .upsert_feed(FeedUpsert {
                feed_url: "https://a".into(),
                home_url: None,
                name: Some("New Name".into()),
                link: None,
                image: None,
                last_published: None,
                last_fetched: None,
                next_fetch_at: None,
                publish_rate_per_hour: None,
            })
            .await
            .unwrap();

        let feeds = store.list_feeds().await.unwrap();
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].home_url.as_deref(), Some("https://home"));
        assert_eq!(feeds[0].name.as_deref(), Some("New Name"));
        assert_eq!(feeds[0].publish_rate_per_hour, Some(1.0));
    }

    #[tokio::test]
    async fn insert_item_if_absent_is_idempotent() {
        let store = MemoryStore::new();
        let make = || ItemInsert {
            url: "https://item".into(),
            feed_url: "https://feed".into(),
            title: Some("t".into()),
            description: None,
            content: None,
            image: None,
            published: None,
            author: None,
        };

        assert!(store.insert_item_if_absent(make()).await.unwrap());
        assert!(!store.insert_item_if_absent(make()).await.unwrap());
    }

    #[tokio::test]
    async fn delete_feed_cascades_to_items() {
        let store = MemoryStore::new();
        upsert(&store, "https://a", None).await;
        store
            .insert_item_if_absent(ItemInsert {
                url: "https://a/item".into(),
                feed_url: "https://a".into(),
                title: None,
                description: None,
                content: None,
                image: None,
                published: None,
                author: None,
            })
            .await
            .unwrap();

        assert!(store.delete_feed("https://a").await.unwrap());
        let results = store.search_items("", 10, 0).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn search_items_matches_all_tokens_case_insensitively() {
        let store = MemoryStore::new();
        upsert(&store, "https://feed", None).await;
        store
            .insert_item_if_absent(ItemInsert {
                url: "https://feed/1".into(),
                feed_url: "https://feed".into(),
                title: Some("Rust Async Patterns".into()),
                description: None,
                content: None,
                image: None,
                published: Some(at(1)),
                author: None,
            })
            .await
            .unwrap();

        let hits = store.search_items("rust patterns", 10, 0).await.unwrap();
        assert_eq!(hits.len(), 1);

        let misses = store.search_items("golang", 10, 0).await.unwrap();
        assert!(misses.is_empty());
    }
}
