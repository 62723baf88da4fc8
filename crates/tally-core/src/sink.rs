//! Delivery sinks handed over by the caller for each subscription.
//!
//! The registry only stores the sending halves. Receivers, buffering and
//! closing stay with whoever called [`subscription_channels`].

use bytes::Bytes;
use tokio::sync::mpsc;

/// Default sink buffer capacity.
pub const DEFAULT_SINK_CAPACITY: usize = 100;

/// Send half of a delivery conduit.
pub type Sink = mpsc::Sender<Bytes>;

/// Receive half of a delivery conduit.
pub type Source = mpsc::Receiver<Bytes>;

/// Success and error sinks for one subscription request.
#[derive(Debug, Clone)]
pub struct SubscriptionSinks {
    /// Receives payloads and status events.
    pub success: Sink,
    /// Receives error notifications.
    pub error: Sink,
}

impl SubscriptionSinks {
    /// Pair up existing sinks.
    #[must_use]
    pub fn new(success: Sink, error: Sink) -> Self {
        Self { success, error }
    }
}

/// Receiving ends matching a [`SubscriptionSinks`] pair.
#[derive(Debug)]
pub struct SubscriptionReceivers {
    /// Payloads and status events.
    pub success: Source,
    /// Error notifications.
    pub error: Source,
}

impl SubscriptionReceivers {
    /// Drain everything currently buffered on the success side.
    pub fn drain_success(&mut self) -> Vec<Bytes> {
        drain(&mut self.success)
    }

    /// Drain everything currently buffered on the error side.
    pub fn drain_error(&mut self) -> Vec<Bytes> {
        drain(&mut self.error)
    }
}

fn drain(source: &mut Source) -> Vec<Bytes> {
    let mut out = Vec::new();
    while let Ok(data) = source.try_recv() {
        out.push(data);
    }
    out
}

/// Create a success/error sink pair for one subscription request.
///
/// A capacity of zero is bumped to one.
#[must_use]
pub fn subscription_channels(capacity: usize) -> (SubscriptionSinks, SubscriptionReceivers) {
    let capacity = capacity.max(1);
    let (success_tx, success_rx) = mpsc::channel(capacity);
    let (error_tx, error_rx) = mpsc::channel(capacity);

    (
        SubscriptionSinks::new(success_tx, error_tx),
        SubscriptionReceivers {
            success: success_rx,
            error: error_rx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscription_channels() {
        let (sinks, mut receivers) = subscription_channels(4);

        sinks.success.send(Bytes::from_static(b"hello")).await.unwrap();
        sinks.error.send(Bytes::from_static(b"oops")).await.unwrap();

        assert_eq!(receivers.success.recv().await.unwrap(), "hello");
        assert_eq!(receivers.drain_error(), vec![Bytes::from_static(b"oops")]);
        assert!(receivers.drain_success().is_empty());
    }

    #[test]
    fn test_zero_capacity_is_bumped() {
        let (sinks, mut receivers) = subscription_channels(0);
        assert!(sinks.success.try_send(Bytes::from_static(b"x")).is_ok());
        assert!(sinks.success.try_send(Bytes::from_static(b"y")).is_err());
        assert_eq!(receivers.drain_success().len(), 1);
    }
}
