use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::error::Result;
use crate::models::{Feed, FeedUpsert, ItemInsert, ItemWithFeed};

use super::FeedStore;

/// `sqlx`-backed implementation of [`FeedStore`] against Postgres.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl FeedStore for PgStore {
    async fn select_due_feeds(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT feed_url FROM feed \
             WHERE next_fetch_at IS NULL OR next_fetch_at <= $1 \
             ORDER BY next_fetch_at ASC NULLS FIRST",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.get("feed_url")).collect())
    }

    async fn select_earliest_future_fetch(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT next_fetch_at FROM feed \
             WHERE next_fetch_at > $1 \
             ORDER BY next_fetch_at ASC LIMIT 1",
        )
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get("next_fetch_at")))
    }

    async fn select_feed_rate(&self, feed_url: &str) -> Result<Option<f64>> {
        let row = sqlx::query("SELECT publish_rate_per_hour FROM feed WHERE feed_url = $1")
            .bind(feed_url)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.and_then(|r| r.get("publish_rate_per_hour")))
    }

    async fn upsert_feed(&self, row: FeedUpsert) -> Result<()> {
        sqlx::query(
            "INSERT INTO feed (feed_url, home_url, name, link, image, last_published, last_fetched, next_fetch_at, publish_rate_per_hour) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (feed_url) DO UPDATE SET \
                home_url = COALESCE(EXCLUDED.home_url, feed.home_url), \
                name = COALESCE(EXCLUDED.name, feed.name), \
                link = COALESCE(EXCLUDED.link, feed.link), \
                image = COALESCE(EXCLUDED.image, feed.image), \
                last_published = COALESCE(EXCLUDED.last_published, feed.last_published), \
                last_fetched = COALESCE(EXCLUDED.last_fetched, feed.last_fetched), \
                next_fetch_at = COALESCE(EXCLUDED.next_fetch_at, feed.next_fetch_at), \
                publish_rate_per_hour = COALESCE(EXCLUDED.publish_rate_per_hour, feed.publish_rate_per_hour)",
        )
        .bind(&row.feed_url)
        .bind(&row.home_url)
        .bind(&row.name)
        .bind(&row.link)
        .bind(&row.image)
        .bind(row.last_published)
        .bind(row.last_fetched)
        .bind(row.next_fetch_at)
        .bind(row.publish_rate_per_hour)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_item_if_absent(&self, row: ItemInsert) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO item (url, feed_url, title, description, content, image, published, author) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (url) DO NOTHING",
        )
        .bind(&row.url)
        .bind(&row.feed_url)
        .bind(&row.title)
        .bind(&row.description)
        .bind(&row.content)
        .bind(&row.image)
        .bind(row.published)
        .bind(&row.author)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn search_items(&self, query: &str, limit: i64, offset: i64) -> Result<Vec<ItemWithFeed>> {
        let tsquery = to_prefix_tsquery(query);

        let rows = if tsquery.is_empty() {
            sqlx::query_as::<_, ItemWithFeed>(
                "SELECT i.url, i.feed_url, i.title, i.description, i.content, i.image, i.published, i.author, f.name AS feed_name \
                 FROM item i JOIN feed f ON f.feed_url = i.feed_url \
                 ORDER BY i.published DESC NULLS LAST \
                 LIMIT $1 OFFSET $2",
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, ItemWithFeed>(
                "SELECT i.url, i.feed_url, i.title, i.description, i.content, i.image, i.published, i.author, f.name AS feed_name \
                 FROM item i JOIN feed f ON f.feed_url = i.feed_url \
                 WHERE to_tsvector('english', coalesce(i.title,'') || ' ' || coalesce(i.description,'') || ' ' || coalesce(i.content,'')) \
                       @@ to_tsquery('english', $1) \
                 ORDER BY i.published DESC NULLS LAST \
                 LIMIT $2 OFFSET $3",
            )
            .bind(&tsquery)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?
        };

        Ok(rows)
    }

    async fn list_feeds(&self) -> Result<Vec<Feed>> {
        let feeds = sqlx::query_as::<_, Feed>("SELECT * FROM feed ORDER BY feed_url ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(feeds)
    }

    async fn delete_feed(&self, feed_url: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM feed WHERE feed_url = $1")
            .bind(feed_url)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Splits on whitespace, suffixes each token with `:*` for a
/// prefix-match `tsquery`, and joins with `&`. Empty query -> empty
/// string, the caller's signal to skip filtering entirely.
fn to_prefix_tsquery(query: &str) -> String {
    query
        .split_whitespace()
        .map(|token| format!("{}:*", sanitize_token(token)))
        .collect::<Vec<_>>()
        .join(" & ")
}

fn sanitize_token(token: &str) -> String {
    token.chars().filter(|c| c.is_alphanumeric()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_tsquery_joins_tokens_with_and() {
        assert_eq!(to_prefix_tsquery("rust async"), "rust:* & async:*");
    }

    #[test]
    fn prefix_tsquery_empty_input_is_empty() {
        assert_eq!(to_prefix_tsquery(""), "");
        assert_eq!(to_prefix_tsquery("   "), "");
    }

    #[test]
    fn prefix_tsquery_strips_punctuation_from_tokens() {
        assert_eq!(to_prefix_tsquery("rust's lifetimes!"), "rusts:* & lifetimes:*");
    }
}
