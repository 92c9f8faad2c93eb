//! Outbound frame sinks.

use crate::DeliveryError;
use std::future::Future;
use tokio::sync::mpsc;

/// Where a connection's text frames are written. One send at a time.
pub trait FrameSink: Send {
    fn send(&mut self, frame: String) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

/// Channel sink, used to bridge into a socket writer task and in tests.
impl FrameSink for mpsc::Sender<String> {
    fn send(&mut self, frame: String) -> impl Future<Output = Result<(), DeliveryError>> + Send {
        let tx = self.clone();
        async move {
            tx.send(frame)
                .await
                .map_err(|_| DeliveryError::Send("receiver dropped".into()))
        }
    }
}
