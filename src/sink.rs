//! Per-work-item message stream.
//!
//! The executor publishes chunks of output while the script runs; any
//! number of consumers subscribe and read them. Publishing never blocks:
//! with no subscriber attached a message is simply dropped, and a
//! subscriber that falls more than `capacity` messages behind loses the
//! oldest ones. Closing the sink ends every stream once it is drained.

use std::sync::{Mutex, PoisonError};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

/// Default number of messages buffered per subscriber.
pub const DEFAULT_CAPACITY: usize = 64;

/// Publishing half, owned by the work item.
#[derive(Debug)]
pub struct MessageSink {
    tx: Mutex<Option<broadcast::Sender<Vec<u8>>>>,
    capacity: usize,
}

impl MessageSink {
    /// Create an open sink. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx: Mutex::new(Some(tx)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Publish one message. Returns how many subscribers will see it;
    /// zero when nobody is listening or the sink is closed.
    pub fn publish(&self, message: impl Into<Vec<u8>>) -> usize {
        let Some(tx) = self.sender() else {
            return 0;
        };
        tx.send(message.into()).unwrap_or(0)
    }

    /// Subscribe to messages published from now on. A stream taken after
    /// the sink closed ends immediately.
    pub fn subscribe(&self) -> MessageStream {
        MessageStream {
            rx: self.sender().map(|tx| tx.subscribe()),
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender().map_or(0, |tx| tx.receiver_count())
    }

    /// Close the sink. Idempotent.
    pub fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn sender(&self) -> Option<broadcast::Sender<Vec<u8>>> {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for MessageSink {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Receiving half handed to a consumer.
#[derive(Debug)]
pub struct MessageStream {
    rx: Option<broadcast::Receiver<Vec<u8>>>,
}

impl MessageStream {
    /// Next message, or `None` once the sink is closed and drained.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(message) => return Some(message),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "message stream lagged, oldest messages dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        self.rx = None;
        None
    }
    /// Write every message to `writer`, flushing after each, until the
    /// sink closes. Returns the bytes written. The first write error ends
    /// the copy and drops the stream.
    pub async fn forward_to<W>(mut self, writer: &mut W) -> std::io::Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut written = 0u64;
        while let Some(message) = self.recv().await {
            writer.write_all(&message).await?;
            writer.flush().await?;
            written += message.len() as u64;
        }
        Ok(written)
    }
}
