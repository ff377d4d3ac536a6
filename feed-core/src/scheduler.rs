//! The long-running poll loop: pick due feeds, dispatch them in fixed-
//! size concurrent batches, sleep until the next one is due (capped at
//! `tick_ms`), repeat. A single instance is assumed active per store;
//! there is no leader election (spec §9).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use reqwest::Client;
use tokio::sync::broadcast;

use crate::config::EstimatorConfig;
use crate::image::ImageFetcher;
use crate::processor::process_feed;
use crate::store::FeedStore;

/// Handle to a running scheduler; dropping it does not stop the loop,
/// call [`Scheduler::stop`] for a clean shutdown.
pub struct SchedulerHandle {
    cancel_tx: broadcast::Sender<()>,
    join: tokio::task::JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn stop(self) {
        let _ = self.cancel_tx.send(());
        let _ = self.join.await;
    }
}

/// Spawns the scheduler loop as a background task.
pub fn spawn(
    store: Arc<dyn FeedStore>,
    client: Client,
    images: Arc<ImageFetcher>,
    cfg: EstimatorConfig,
) -> SchedulerHandle {
    let (cancel_tx, cancel_rx) = broadcast::channel(1);
    let join = tokio::spawn(run(store, client, images, cfg, cancel_rx));
    SchedulerHandle { cancel_tx, join }
}

/// The loop body itself, exposed directly so tests can drive a fixed
/// number of ticks without spawning a task.
pub async fn run(
    store: Arc<dyn FeedStore>,
    client: Client,
    images: Arc<ImageFetcher>,
    cfg: EstimatorConfig,
    mut cancel_rx: broadcast::Receiver<()>,
) {
    loop {
        if let Err(err) = tick(&*store, &client, &images, &cfg).await {
            tracing::error!(%err, "scheduler tick failed");
        }

        let sleep_ms = match next_wake_ms(&*store, &cfg).await {
            Ok(ms) => ms,
            Err(err) => {
                tracing::error!(%err, "failed computing next wake, falling back to tick_ms");
                cfg.tick_ms
            }
        };

        tokio::select! {
            _ = cancel_rx.recv() => {
                tracing::info!("scheduler shutdown requested");
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(sleep_ms)) => {}
        }
    }
}

/// One tick: select due feeds (nulls first, then ascending
/// `next_fetch_at`) and process them in batches of `cfg.concurrency`,
/// running every feed in a batch concurrently and waiting for all of
/// them (success or failure) before starting the next batch.
pub async fn tick(
    store: &dyn FeedStore,
    client: &Client,
    images: &ImageFetcher,
    cfg: &EstimatorConfig,
) -> crate::error::Result<()> {
    let due = store.select_due_feeds(Utc::now()).await?;

    for batch in due.chunks(cfg.concurrency) {
        let futures = batch.iter().map(|feed_url| {
            let feed_url = feed_url.clone();
            async move {
                match process_feed(store, client, images, &feed_url, cfg, Utc::now()).await {
                    Ok(Some(outcome)) => {
                        tracing::info!(
                            feed_url = %outcome.final_url,
                            inserted = outcome.items_inserted,
                            "processed feed"
                        );
                    }
                    Ok(None) => {
                        tracing::warn!(%feed_url, "feed fetch or parse failed, schedule unchanged");
                    }
                    Err(err) => {
                        tracing::warn!(%feed_url, %err, "feed processing errored");
                    }
                }
            }
        });
        join_all(futures).await;
    }

    Ok(())
}

/// How long to sleep before the next tick: the time until the
/// earliest future `next_fetch_at`, clamped to `[0, tick_ms]`. With no
/// future-scheduled feed at all, sleeps the full `tick_ms` so newly
/// inserted subscriptions are never discovered more than a tick late.
pub async fn next_wake_ms(
    store: &dyn FeedStore,
    cfg: &EstimatorConfig,
) -> crate::error::Result<u64> {
    let now = Utc::now();
    let earliest = store.select_earliest_future_fetch(now).await?;

    Ok(match earliest {
        None => cfg.tick_ms,
        Some(next) => {
            let millis = (next - now).num_milliseconds();
            millis.clamp(0, cfg.tick_ms as i64) as u64
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FeedUpsert;
    use crate::store::MemoryStore;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn next_wake_defaults_to_tick_ms_when_nothing_scheduled() {
        let store = MemoryStore::new();
        let cfg = EstimatorConfig::default();
        let wake = next_wake_ms(&store, &cfg).await.unwrap();
        assert_eq!(wake, cfg.tick_ms);
    }

    #[tokio::test]
    async fn next_wake_clamped_to_tick_ms_for_far_future_feed() {
        let store = MemoryStore::new();
        let cfg = EstimatorConfig::default();
        store
            .upsert_feed(FeedUpsert {
                feed_url: "https://far".into(),
                home_url: None,
                name: None,
                link: None,
                image: None,
                last_published: None,
                last_fetched: None,
                next_fetch_at: Some(Utc::now() + ChronoDuration::hours(5)),
                publish_rate_per_hour: None,
            })
            .await
            .unwrap();

        let wake = next_wake_ms(&store, &cfg).await.unwrap();
        assert_eq!(wake, cfg.tick_ms);
    }

    #[tokio::test]
    async fn next_wake_returns_remaining_time_when_sooner_than_tick_ms() {
        let store = MemoryStore::new();
        let cfg = EstimatorConfig::default();
        store
            .upsert_feed(FeedUpsert {
                feed_url: "https://soon".into(),
                home_url: None,
                name: None,
                link: None,
                image: None,
                last_published: None,
                last_fetched: None,
                next_fetch_at: Some(Utc::now() + ChronoDuration::milliseconds(5_000)),
                publish_rate_per_hour: None,
            })
            .await
            .unwrap();

        let wake = next_wake_ms(&store, &cfg).await.unwrap();
        assert!(wake <= 5_000 && wake > 0);
    }

    #[tokio::test]
    async fn tick_is_a_noop_on_empty_store() {
        let store = MemoryStore::new();
        let client = Client::new();
        let images = ImageFetcher::new(client.clone());
        let cfg = EstimatorConfig::default();

        tick(&store, &client, &images, &cfg).await.unwrap();
        assert!(store.list_feeds().await.unwrap().is_empty());
    }
}
