//! Orchestrates a single feed's poll: parse, estimate the next poll
//! time, upsert the feed row, then upsert each item (inlining its
//! image along the way).

use chrono::{DateTime, Utc};
use reqwest::Client;

use crate::config::EstimatorConfig;
use crate::error::Result;
use crate::estimator::estimate;
use crate::image::ImageFetcher;
use crate::models::{FeedUpsert, ItemInsert};
use crate::parser;
use crate::store::FeedStore;

/// Outcome of a successful poll: the canonical (post-redirect) feed
/// URL and how many new items were inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutcome {
    pub final_url: String,
    pub items_inserted: usize,
}

/// Fetches and parses `feed_url`, estimates the next poll time from
/// the prior rate on record, upserts the feed row, then inserts each
/// new item (skipping ones already seen by URL). Returns `None` when
/// the fetch or parse failed — per spec the feed's `next_fetch_at` is
/// left untouched in that case, since this function never calls
/// `upsert_feed` at all on that path.
pub async fn process_feed(
    store: &dyn FeedStore,
    client: &Client,
    images: &ImageFetcher,
    feed_url: &str,
    cfg: &EstimatorConfig,
    now: DateTime<Utc>,
) -> Result<Option<ProcessOutcome>> {
    let Some((final_url, parsed)) = parser::parse(client, feed_url).await else {
        return Ok(None);
    };

    let prior_rate = store.select_feed_rate(&final_url).await?;
    let timestamps: Vec<DateTime<Utc>> = parsed.items.iter().filter_map(|i| i.published).collect();
    let est = estimate(&timestamps, prior_rate, now, cfg);

    let last_published = timestamps.iter().max().copied();

    store
        .upsert_feed(FeedUpsert {
            feed_url: final_url.clone(),
            home_url: parsed.home_url.clone(),
            name: parsed.name.clone(),
            link: parsed.link.clone(),
            image: parsed.image.clone(),
            last_published,
            last_fetched: Some(now),
            next_fetch_at: Some(est.next_fetch_at),
            publish_rate_per_hour: est.publish_rate_per_hour,
        })
        .await?;

    let mut inserted = 0usize;
    for item in &parsed.items {
        match insert_one(store, images, &final_url, item).await {
            Ok(true) => inserted += 1,
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(url = %item.url, %err, "failed to insert item, skipping");
            }
        }
    }

    Ok(Some(ProcessOutcome {
        final_url,
        items_inserted: inserted,
    }))
}

async fn insert_one(
    store: &dyn FeedStore,
    images: &ImageFetcher,
    final_url: &str,
    item: &parser::ParsedItem,
) -> Result<bool> {
    if item.url.trim().is_empty() {
        return Ok(false);
    }

    let image = match &item.image_url {
        Some(url) => images.fetch(url).await,
        None => None,
    };

    store
        .insert_item_if_absent(ItemInsert {
            url: item.url.clone(),
            feed_url: final_url.to_string(),
            title: item.title.clone(),
            description: item.description.clone(),
            content: item.content.clone(),
            image,
            published: item.published,
            author: item.author.clone(),
        })
        .await
}
