use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Catalog API key is not configured")]
    MissingApiKey,

    #[error("Catalog rejected the API key (HTTP {status})")]
    InvalidApiKey { status: u16 },

    #[error("Not found in catalog: {0}")]
    NotFound(String),

    #[error("Rate limited by {provider}, retry after {retry_after_seconds}s")]
    RateLimited {
        provider: String,
        retry_after_seconds: u64,
    },

    #[error("Catalog API error (HTTP {status}): {body}")]
    HttpError { status: u16, body: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Failed to parse catalog response: {0}")]
    JsonParse(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::error::BridgeError),
}

impl MetadataError {
    /// Errors that make every further catalog call pointless.
    ///
    /// Synchronizer runs abort on these instead of skipping the item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MetadataError::MissingApiKey | MetadataError::InvalidApiKey { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MetadataError>;
