pub mod config;
pub mod error;
pub mod estimator;
pub mod image;
pub mod models;
pub mod parser;
pub mod processor;
pub mod scheduler;
pub mod store;

pub use config::EstimatorConfig;
pub use error::{Error, Result};
pub use estimator::{estimate, Estimate};
pub use image::ImageFetcher;
pub use models::{Feed, FeedUpsert, Item, ItemInsert, ItemWithFeed};
pub use parser::{parse, ParsedFeed, ParsedItem};
pub use processor::{process_feed, ProcessOutcome};
pub use scheduler::{spawn as spawn_scheduler, SchedulerHandle};
pub use store::{FeedStore, PgStore, MIGRATOR};

#[cfg(any(test, feature = "test-util"))]
pub use store::MemoryStore;
