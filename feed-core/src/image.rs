//! Downloads an image URL and inlines it as a `data:` URI, backed by a
//! bounded process-local cache so repeated item images (a site's
//! shared logo, a recurring author avatar) are fetched once.

use std::collections::VecDeque;
use std::sync::Mutex;

use base64::Engine;
use dashmap::DashMap;
use reqwest::Client;

const CACHE_CAPACITY: usize = 1000;

/// Process-local, concurrency-safe cache of fetched images. Bounded to
/// `CACHE_CAPACITY` entries with oldest-insertion eviction, since an
/// unbounded map would grow for the lifetime of a long-running process
/// subscribed to many image-bearing feeds.
pub struct ImageFetcher {
    client: Client,
    cache: DashMap<String, String>,
    order: Mutex<VecDeque<String>>,
}

impl ImageFetcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            cache: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
        }
    }

    /// Fetches `url`, returning an inlined `data:` URI, or `None` on
    /// any non-2xx response, network error, or unrecognized content
    /// type. Never returns an error to the caller — per spec, image
    /// failures degrade the item to a missing image, nothing more.
    pub async fn fetch(&self, url: &str) -> Option<String> {
        if let Some(cached) = self.cache.get(url) {
            tracing::debug!(url, "image cache hit");
            return Some(cached.clone());
        }

        let data_uri = self.fetch_uncached(url).await?;
        self.insert(url.to_string(), data_uri.clone());
        Some(data_uri)
    }

    async fn fetch_uncached(&self, url: &str) -> Option<String> {
        let response = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(err) => {
                tracing::warn!(url, %err, "image fetch failed");
                return None;
            }
        };

        if !response.status().is_success() {
            return None;
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|ct| ct.starts_with("image/"))
            .map(ToOwned::to_owned)
            .or_else(|| content_type_from_extension(url));

        let content_type = content_type?;

        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(err) => {
                tracing::warn!(url, %err, "image body read failed");
                return None;
            }
        };

        let payload = base64::engine::general_purpose::STANDARD.encode(bytes);
        Some(format!("data:{};base64,{}", content_type, payload))
    }

    fn insert(&self, url: String, data_uri: String) {
        self.cache.insert(url.clone(), data_uri);
        let mut order = self.order.lock().expect("image cache order lock poisoned");
        order.push_back(url);
        while order.len() > CACHE_CAPACITY {
            if let Some(oldest) = order.pop_front() {
                self.cache.remove(&oldest);
            }
        }
    }
}

fn content_type_from_extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path.rsplit('.').next()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        _ => return None,
    };
    Some(mime.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_table_covers_known_types() {
        assert_eq!(
            content_type_from_extension("http://x/a.jpg"),
            Some("image/jpeg".to_string())
        );
        assert_eq!(
            content_type_from_extension("http://x/a.PNG"),
            Some("image/png".to_string())
        );
        assert_eq!(
            content_type_from_extension("http://x/a.webp?w=200"),
            Some("image/webp".to_string())
        );
        assert_eq!(content_type_from_extension("http://x/a.bin"), None);
    }

    #[tokio::test]
    async fn fetch_nonexistent_host_returns_none() {
        let fetcher = ImageFetcher::new(Client::new());
        let result = fetcher
            .fetch("http://localhost.invalid.example/no-such-image.png")
            .await;
        assert!(result.is_none());
    }

    #[test]
    fn cache_evicts_oldest_entry_past_capacity() {
        let fetcher = ImageFetcher::new(Client::new());
        for i in 0..(CACHE_CAPACITY + 5) {
            fetcher.insert(format!("url-{i}"), format!("data-{i}"));
        }
        assert!(!fetcher.cache.contains_key("url-0"));
        assert!(fetcher.cache.contains_key(&format!("url-{}", CACHE_CAPACITY + 4)));
        assert_eq!(fetcher.cache.len(), CACHE_CAPACITY);
    }
}
