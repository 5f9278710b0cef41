//! Stream adapter over a subscription.
//!
//! A [`MessageStream`] is the shape a server-streaming transport needs: the
//! subscription's handler forwards every delivered message into a bounded
//! buffer, the consumer pulls from that buffer, and cancelling (or dropping)
//! the stream unsubscribes.

use super::{FunctionHandler, SubscriptionHandle};
use crate::{Bus, Message, Result};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Messages of one subscription, consumed as a [`Stream`].
///
/// The stream ends once the subscription has been unsubscribed and every
/// buffered message has been read, for example after the bus closes.
pub struct MessageStream {
    receiver: mpsc::Receiver<Message>,
    handle: SubscriptionHandle,
}

impl MessageStream {
    pub(crate) async fn open(bus: &Bus, subject: &str, buffer: usize) -> Result<Self> {
        let (sender, receiver) = mpsc::channel(buffer.max(1));

        let handler = FunctionHandler::with_name(
            move |message: Message| {
                let sender = sender.clone();
                async move {
                    let message_id = message.id();
                    if sender.send(message).await.is_err() {
                        trace!(message_id = %message_id, "Stream consumer gone, message dropped");
                    }
                }
            },
            format!("MessageStream<{}>", subject),
        );

        let handle = bus.subscribe(subject, handler).await?;
        debug!(subscription_id = %handle.id(), subject, "Message stream opened");

        Ok(Self { receiver, handle })
    }

    /// Receive the next message, or `None` once the stream has ended
    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }

    /// The subscription behind this stream
    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }

    /// Stop the stream and unsubscribe.
    ///
    /// Messages still sitting in the stream's buffer are discarded.
    pub async fn cancel(mut self) {
        // Closing first unblocks a handler waiting for buffer space, so the
        // drain below can finish.
        self.receiver.close();
        self.handle.unsubscribe().await;
        debug!(subscription_id = %self.handle.id(), "Message stream cancelled");
    }
}

impl Stream for MessageStream {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for MessageStream {
    fn drop(&mut self) {
        if !self.handle.is_active() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let handle = self.handle.clone();
                runtime.spawn(async move { handle.unsubscribe().await });
            }
            Err(_) => {
                warn!(
                    subscription_id = %self.handle.id(),
                    "Message stream dropped outside a runtime; subscription stays registered"
                );
            }
        }
    }
}

impl std::fmt::Debug for MessageStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStream")
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::SubscriptionState;
    use futures::StreamExt;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_stream_receives_in_order() {
        let bus = Bus::new();
        let mut stream = bus.subscribe_stream("events", 8).await.unwrap();

        for i in 0..3_u32 {
            bus.publish("events", i).await.unwrap();
        }

        for i in 0..3_u32 {
            let message = timeout(Duration::from_secs(1), stream.next())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(message.downcast_ref::<u32>(), Some(&i));
            assert_eq!(message.subject(), "events");
        }

        stream.cancel().await;
        assert_eq!(bus.stats().await.subscriptions, 0);
    }

    #[tokio::test]
    async fn test_cancel_with_full_buffer_does_not_hang() {
        let bus = Bus::new();
        let stream = bus.subscribe_stream("events", 1).await.unwrap();
        let handle = stream.handle().clone();

        for i in 0..4_u32 {
            bus.publish("events", i).await.unwrap();
        }

        timeout(Duration::from_secs(1), stream.cancel()).await.unwrap();
        assert_eq!(handle.state(), SubscriptionState::Terminated);
    }

    #[tokio::test]
    async fn test_stream_ends_when_bus_closes() {
        let bus = Bus::new();
        let mut stream = bus.subscribe_stream("events", 8).await.unwrap();

        bus.publish("events", "last").await.unwrap();
        bus.close(Duration::from_secs(1)).await.unwrap();

        assert!(stream.recv().await.is_some());
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let bus = Bus::new();
        let stream = bus.subscribe_stream("events", 8).await.unwrap();
        let handle = stream.handle().clone();

        drop(stream);

        timeout(Duration::from_secs(1), async {
            while handle.state() != SubscriptionState::Terminated {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(bus.stats().await.subscriptions, 0);
    }

    #[tokio::test]
    async fn test_subscribe_stream_on_closed_bus() {
        let bus = Bus::new();
        bus.close(Duration::from_secs(1)).await.unwrap();
        assert!(bus.subscribe_stream("events", 8).await.unwrap_err().is_closed());
    }
}
