use thiserror::Error;

/// Main error type for Switchyard
#[derive(Error, Debug)]
pub enum SwitchyardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to fetch {url} and no cache available: {reason}")]
    CacheUnavailable { url: String, reason: String },

    #[error("Credential error: {0}")]
    Credential(String),
}
