//! Distributor error types.

use thiserror::Error;

/// The upstream change feed failed or went away. Always retried.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed connect failed: {0}")]
    Connect(String),
    #[error("feed transport error: {0}")]
    Transport(String),
    #[error("feed consumer lagged, {0} frames skipped")]
    Lagged(u64),
}

/// A snapshot could not be fetched from the resource service.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("snapshot service returned {status} for {key}")]
    Status { key: String, status: u16 },
    #[error("snapshot unavailable: {0}")]
    Unavailable(String),
}

/// Delivery to one connection failed; the connection is torn down.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("send failed: {0}")]
    Send(String),
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("resync failed: {0}")]
    Snapshot(#[from] SnapshotError),
}
