use thiserror::Error;

/// Failures talking to the upstream source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("upstream reported: {0}")]
    Upstream(String),
}

/// Failures talking to the content store. Neither variant stops a run.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport failure, timeout, 5xx or rate limiting.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the request; usually a payload shape problem.
    #[error("store rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("no centered block with an image was found")]
    NoCenteredImage,

    #[error("the centered block has no description line after the image")]
    MissingDescription,
}

/// Errors that abort a whole reconciliation run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("fetching pinned items failed: {0}")]
    Fetch(#[from] SourceError),
}
