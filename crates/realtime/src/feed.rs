//! Upstream change feed and reconnect backoff.

use crate::FeedError;
use futures_core::Stream;
use futures_util::StreamExt;
use std::{future::Future, pin::Pin, time::Duration};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_tungstenite::tungstenite::Message;

/// Raw JSON frames from one feed subscription. Ends or errors when the
/// subscription is lost.
pub type FeedStream = Pin<Box<dyn Stream<Item = Result<String, FeedError>> + Send>>;

/// A publish/subscribe source of change events.
pub trait ChangeFeed: Send + Sync {
    /// Open a fresh subscription.
    fn connect(&self) -> impl Future<Output = Result<FeedStream, FeedError>> + Send;
}

/// Change feed served over a WebSocket; every text frame is one event.
#[derive(Debug, Clone)]
pub struct WsFeed {
    url: String,
}

impl WsFeed {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ChangeFeed for WsFeed {
    fn connect(&self) -> impl Future<Output = Result<FeedStream, FeedError>> + Send {
        let url = self.url.clone();
        async move {
            let (mut socket, _) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| FeedError::Connect(e.to_string()))?;
            let stream = async_stream::stream! {
                while let Some(msg) = socket.next().await {
                    match msg {
                        Ok(Message::Text(text)) => yield Ok(text.as_str().to_owned()),
                        Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                            Ok(text) => yield Ok(text),
                            Err(_) => tracing::warn!("dropping non-utf8 feed frame"),
                        },
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {}
                        Err(e) => {
                            yield Err(FeedError::Transport(e.to_string()));
                            break;
                        }
                    }
                }
            };
            Ok(Box::pin(stream) as FeedStream)
        }
    }
}

/// In-process change feed over a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct ChannelFeed {
    tx: broadcast::Sender<String>,
}

impl ChannelFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish one raw frame. Returns the number of live subscriptions.
    pub fn publish(&self, frame: impl Into<String>) -> usize {
        self.tx.send(frame.into()).unwrap_or(0)
    }

    pub fn subscribers(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl ChangeFeed for ChannelFeed {
    fn connect(&self) -> impl Future<Output = Result<FeedStream, FeedError>> + Send {
        let mut rx = self.tx.subscribe();
        let stream = async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(frame) => yield Ok(frame),
                    Err(RecvError::Lagged(skipped)) => {
                        yield Err(FeedError::Lagged(skipped));
                        break;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        };
        std::future::ready(Ok(Box::pin(stream) as FeedStream))
    }
}

/// Exponential reconnect delay, doubling up to a cap.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30))
    }
}
