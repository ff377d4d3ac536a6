use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("RSS parsing error: {0}")]
    RssParse(#[from] rss::Error),
    #[error("Atom parsing error: {0}")]
    AtomParse(#[from] atom_syndication::Error),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("feed too large: {0} bytes")]
    TooLarge(u64),
}

pub type Result<T> = std::result::Result<T, Error>;
