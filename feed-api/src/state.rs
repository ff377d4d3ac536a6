use std::sync::Arc;

use feed_core::{EstimatorConfig, FeedStore, ImageFetcher};
use reqwest::Client;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn FeedStore>,
    pub client: Client,
    pub images: Arc<ImageFetcher>,
    pub cfg: EstimatorConfig,
}

impl AppState {
    pub fn new(store: Arc<dyn FeedStore>, cfg: EstimatorConfig) -> Self {
        let client = Client::new();
        let images = Arc::new(ImageFetcher::new(client.clone()));
        Self {
            store,
            client,
            images,
            cfg,
        }
    }
}
