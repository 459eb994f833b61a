use caracal_core::{BrokerError, Result};
use std::time::Duration;

use crate::request::AsyncRequest;
use crate::response::AsyncResponse;

/// Default capacity of the request and response channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Bounded FIFO hand-off queue decoupling network tasks from I/O
/// workers. Multi-producer, multi-consumer: network tasks clone the
/// submitter, workers clone the taker. The channel closes once every
/// submitter is dropped.
pub fn bounded<T>(capacity: usize) -> (Submitter<T>, Taker<T>) {
    let (tx, rx) = flume::bounded(capacity);
    (Submitter { tx }, Taker { rx })
}

pub struct Submitter<T> {
    tx: flume::Sender<T>,
}

impl<T> Clone for Submitter<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> Submitter<T> {
    /// Enqueue, waiting up to `timeout` for space. A queue still full at
    /// the deadline is `Backpressure`.
    pub async fn submit(&self, item: T, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.tx.send_async(item)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(BrokerError::Closed("channel")),
            Err(_) => Err(BrokerError::Backpressure),
        }
    }

    /// Enqueue without a deadline; fails only when the channel closed.
    pub async fn send(&self, item: T) -> Result<()> {
        self.tx
            .send_async(item)
            .await
            .map_err(|_| BrokerError::Closed("channel"))
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

pub struct Taker<T> {
    rx: flume::Receiver<T>,
}

impl<T> Clone for Taker<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<T> Taker<T> {
    /// Dequeue the next item; `None` once the channel is closed and
    /// drained, which is the workers' shutdown signal.
    pub async fn take(&self) -> Option<T> {
        self.rx.recv_async().await.ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

pub type RequestSubmitter = Submitter<AsyncRequest>;
pub type RequestTaker = Taker<AsyncRequest>;
pub type ResponseSubmitter = Submitter<AsyncResponse>;
pub type ResponseTaker = Taker<AsyncResponse>;

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_fifo_order() {
        let (tx, rx) = bounded::<u32>(8);
        for i in 0..5 {
            tx.submit(i, SHORT).await.unwrap();
        }
        for i in 0..5 {
            assert_eq!(rx.take().await, Some(i));
        }
    }

    #[tokio::test]
    async fn test_backpressure_when_full() {
        let (tx, rx) = bounded::<u32>(4);
        for i in 0..4 {
            tx.submit(i, SHORT).await.unwrap();
        }

        // Queue of 4 is full; the fifth submission times out.
        match tx.submit(4, SHORT).await {
            Err(BrokerError::Backpressure) => {}
            other => panic!("expected Backpressure, got {other:?}"),
        }

        // Draining one slot lets the next submission through.
        assert_eq!(rx.take().await, Some(0));
        tx.submit(4, SHORT).await.unwrap();
    }

    #[tokio::test]
    async fn test_take_returns_none_after_close() {
        let (tx, rx) = bounded::<u32>(2);
        tx.submit(1, SHORT).await.unwrap();
        drop(tx);

        assert_eq!(rx.take().await, Some(1));
        assert_eq!(rx.take().await, None);
    }

    #[tokio::test]
    async fn test_submit_to_closed_channel_fails() {
        let (tx, rx) = bounded::<u32>(2);
        drop(rx);
        assert!(matches!(
            tx.submit(1, SHORT).await,
            Err(BrokerError::Closed(_))
        ));
    }

    #[tokio::test]
    async fn test_multiple_consumers_drain_disjointly() {
        let (tx, rx) = bounded::<u32>(64);
        for i in 0..40 {
            tx.submit(i, SHORT).await.unwrap();
        }
        drop(tx);

        let a = rx.clone();
        let b = rx.clone();
        let take_all = |taker: Taker<u32>| async move {
            let mut seen = Vec::new();
            while let Some(v) = taker.take().await {
                seen.push(v);
            }
            seen
        };
        let (mut left, right) = tokio::join!(take_all(a), take_all(b));

        left.extend(right);
        left.sort_unstable();
        assert_eq!(left, (0..40).collect::<Vec<_>>());
    }
}
