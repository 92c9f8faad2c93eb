//! Authoritative resource snapshots used to resynchronize clients.

use crate::SnapshotError;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::Value;
use std::future::Future;

/// Fetches the full current state of a subscribed resource.
pub trait SnapshotSource: Send + Sync + 'static {
    fn fetch(&self, key: &str) -> impl Future<Output = Result<Value, SnapshotError>> + Send;
}

/// Snapshot source backed by the resource service's HTTP API:
/// `GET {base}/{key}` returning the resource as JSON.
#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    client: reqwest::Client,
    base: String,
}

impl HttpSnapshotSource {
    pub fn new(client: reqwest::Client, base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_owned();
        Self { client, base }
    }

    /// URL fetched for `key`. The key is opaque, so it is percent-encoded
    /// as a single path segment.
    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base, utf8_percent_encode(key, NON_ALPHANUMERIC))
    }
}

impl SnapshotSource for HttpSnapshotSource {
    fn fetch(&self, key: &str) -> impl Future<Output = Result<Value, SnapshotError>> + Send {
        let request = self.client.get(self.url_for(key));
        let key = key.to_owned();
        async move {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(SnapshotError::Status {
                    key,
                    status: status.as_u16(),
                });
            }
            Ok(response.json::<Value>().await?)
        }
    }
}
