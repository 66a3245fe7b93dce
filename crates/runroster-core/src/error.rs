use thiserror::Error;

use crate::pages::PageSetError;

/// The upstream tracker could not be reached or answered with a failure status.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("GET {url} returned {status}")]
    Status { url: String, status: u16 },
}

/// The upstream payload did not have the shape we expect.
#[derive(Debug, Error)]
#[error("unexpected payload from {context}: {detail}")]
pub struct DataShapeError {
    pub context: String,
    pub detail: String,
}

impl DataShapeError {
    pub fn new(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            detail: detail.into(),
        }
    }
}

/// Any failure while fetching from the upstream tracker.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    DataShape(#[from] DataShapeError),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(TransportError::Http(value))
    }
}

/// Failure reported by a messaging backend.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct DestinationError(pub String);

impl DestinationError {
    pub fn message<T: Into<String>>(message: T) -> Self {
        DestinationError(message.into())
    }
}

/// A mutation from a reconciliation plan could not be applied.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("{mutation} failed: {source}")]
    Rejected {
        mutation: String,
        #[source]
        source: DestinationError,
    },
    #[error("{mutation} refers to page {index}, which was not created in this plan")]
    UnresolvedCreate { mutation: String, index: usize },
    #[error("destination did not return a handle for created page {index}")]
    MissingHandle { index: usize },
}

/// Everything that can abort a single poll tick.
#[derive(Debug, Error)]
pub enum TickError {
    #[error("upstream fetch failed: {0}")]
    Upstream(#[from] UpstreamError),
    #[error("could not read history of {destination}: {source}")]
    History {
        destination: String,
        #[source]
        source: DestinationError,
    },
    #[error("plan for {destination} aborted: {source}")]
    Apply {
        destination: String,
        #[source]
        source: ApplyError,
    },
    #[error("renderer produced an invalid page set: {0}")]
    Pages(#[from] PageSetError),
    #[error("tick cancelled")]
    Cancelled,
}

impl TickError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TickError::Cancelled)
    }
}
