//! Subscriptions: one bounded queue and one worker per `subscribe` call.
//!
//! Publishing only enqueues. Each subscription's worker task pulls messages
//! off its own queue in FIFO order and awaits the handler for each one, so a
//! slow handler delays its own subscription and nothing else (until its queue
//! fills, at which point the publisher waits for space).
//!
//! Lifecycle:
//! ```text
//!   Active ──unsubscribe()──► Draining ──queue empty──► Terminated
//!   (registered, worker       (removed from registry,   (worker exited)
//!    running)                  queue closed)
//! ```
//! The `Active → Draining` transition runs at most once, whoever triggers it.

use crate::bus::Shared;
use crate::Message;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, Mutex, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use uuid::Uuid;

pub mod handle;
pub mod handler;
pub mod stream;

pub use handle::SubscriptionHandle;
pub use handler::{FunctionHandler, MessageHandler, TypedHandler};
pub use stream::MessageStream;

/// Observable lifecycle state of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SubscriptionState {
    /// Registered; the worker is running
    Active = 0,
    /// Removed from the registry; the worker is finishing buffered messages
    Draining = 1,
    /// The worker has exited
    Terminated = 2,
}

impl SubscriptionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SubscriptionState::Active,
            1 => SubscriptionState::Draining,
            _ => SubscriptionState::Terminated,
        }
    }
}

/// A live binding between a subject and a handler.
pub(crate) struct Subscription {
    id: Uuid,
    subject: Arc<str>,
    handler_name: String,

    /// Write side of the queue; `None` once the queue is closed
    sender: Mutex<Option<mpsc::Sender<Message>>>,

    worker: Mutex<Option<JoinHandle<()>>>,
    state: AtomicU8,
    delivered: Arc<AtomicU64>,

    /// Guards the deregister-and-drain sequence
    done: OnceCell<()>,

    bus: Weak<Shared>,
}

impl Subscription {
    /// Create a subscription and start its worker.
    ///
    /// The caller registers the returned subscription; nothing is delivered
    /// until a publish finds it in the registry.
    pub(crate) fn spawn(
        subject: impl Into<Arc<str>>,
        handler: Arc<dyn MessageHandler>,
        capacity: usize,
        bus: Weak<Shared>,
    ) -> Arc<Self> {
        let id = Uuid::new_v4();
        let subject = subject.into();
        let handler_name = handler.name().to_string();
        let delivered = Arc::new(AtomicU64::new(0));
        let (sender, receiver) = mpsc::channel(capacity.max(1));

        let worker = tokio::spawn(Self::run(
            receiver,
            handler,
            id,
            subject.clone(),
            delivered.clone(),
        ));

        Arc::new(Self {
            id,
            subject,
            handler_name,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            state: AtomicU8::new(SubscriptionState::Active as u8),
            delivered,
            done: OnceCell::new(),
            bus,
        })
    }

    /// Worker loop: deliver in FIFO order until the queue is closed and empty
    async fn run(
        mut receiver: mpsc::Receiver<Message>,
        handler: Arc<dyn MessageHandler>,
        id: Uuid,
        subject: Arc<str>,
        delivered: Arc<AtomicU64>,
    ) {
        debug!(
            subscription_id = %id,
            subject = %subject,
            handler_name = handler.name(),
            "Subscription worker started"
        );

        while let Some(message) = receiver.recv().await {
            trace!(
                subscription_id = %id,
                message_id = %message.id(),
                "Delivering message"
            );
            handler.handle(message).await;
            delivered.fetch_add(1, Ordering::Relaxed);
        }

        debug!(subscription_id = %id, subject = %subject, "Subscription worker stopped");
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn subject(&self) -> &str {
        &self.subject
    }

    pub(crate) fn subject_key(&self) -> Arc<str> {
        self.subject.clone()
    }

    pub(crate) fn handler_name(&self) -> &str {
        &self.handler_name
    }

    pub(crate) fn state(&self) -> SubscriptionState {
        SubscriptionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Push a message onto the queue, waiting for space if it is full.
    ///
    /// Returns `false` if the queue is already closed or the worker is gone.
    pub(crate) async fn enqueue(&self, message: Message) -> bool {
        let sender = self.sender.lock().await.clone();
        let Some(sender) = sender else {
            return false;
        };

        let message_id = message.id();
        match sender.send(message).await {
            Ok(()) => {
                trace!(subscription_id = %self.id, message_id = %message_id, "Message enqueued");
                true
            }
            Err(_) => {
                trace!(subscription_id = %self.id, message_id = %message_id, "Worker gone, message dropped");
                false
            }
        }
    }

    /// Deregister, close the queue and wait for the worker to drain.
    ///
    /// Every caller returns only after the drain has finished, no matter how
    /// many times or how concurrently this is called.
    pub(crate) async fn unsubscribe(&self) {
        self.done.get_or_init(|| self.deregister_and_drain()).await;
    }

    async fn deregister_and_drain(&self) {
        debug!(subscription_id = %self.id, subject = %self.subject, "Unsubscribing");

        if let Some(bus) = self.bus.upgrade() {
            bus.registry.lock().await.remove(&self.subject, self.id);
        }
        self.state.store(SubscriptionState::Draining as u8, Ordering::Release);

        // Dropping the last sender closes the queue; the worker still drains it.
        drop(self.sender.lock().await.take());

        // The handle stays in place until the worker has exited, so a caller
        // whose drain was cancelled leaves the next caller waiting on it.
        let mut worker = self.worker.lock().await;
        if let Some(handle) = worker.as_mut() {
            if let Err(e) = handle.await {
                warn!(
                    subscription_id = %self.id,
                    handler_name = %self.handler_name,
                    error = %e,
                    "Subscription worker terminated abnormally"
                );
            }
            *worker = None;
        }
        drop(worker);
        self.state.store(SubscriptionState::Terminated as u8, Ordering::Release);

        debug!(
            subscription_id = %self.id,
            delivered = self.delivered(),
            "Subscription terminated"
        );
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("subject", &self.subject)
            .field("handler_name", &self.handler_name)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::Mutex as AsyncMutex;

    fn recording(received: Arc<AsyncMutex<Vec<i32>>>, delay: Duration) -> Arc<dyn MessageHandler> {
        Arc::new(FunctionHandler::new(move |message: Message| {
            let received = received.clone();
            async move {
                tokio::time::sleep(delay).await;
                received
                    .lock()
                    .await
                    .push(*message.downcast_ref::<i32>().unwrap());
            }
        }))
    }

    #[tokio::test]
    async fn test_worker_delivers_in_order() {
        let received = Arc::new(AsyncMutex::new(Vec::new()));
        let sub = Subscription::spawn(
            "numbers",
            recording(received.clone(), Duration::ZERO),
            8,
            Weak::new(),
        );

        for i in 0..5 {
            assert!(sub.enqueue(Message::new("numbers", i)).await);
        }
        sub.unsubscribe().await;

        assert_eq!(*received.lock().await, vec![0, 1, 2, 3, 4]);
        assert_eq!(sub.delivered(), 5);
    }

    #[tokio::test]
    async fn test_unsubscribe_drains_then_terminates() {
        let received = Arc::new(AsyncMutex::new(Vec::new()));
        let sub = Subscription::spawn(
            "slow",
            recording(received.clone(), Duration::from_millis(20)),
            8,
            Weak::new(),
        );
        assert_eq!(sub.state(), SubscriptionState::Active);

        sub.enqueue(Message::new("slow", 1)).await;
        sub.enqueue(Message::new("slow", 2)).await;
        sub.unsubscribe().await;

        assert_eq!(sub.state(), SubscriptionState::Terminated);
        assert_eq!(*received.lock().await, vec![1, 2]);
        assert!(!sub.enqueue(Message::new("slow", 3)).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_unsubscribe_runs_once() {
        let received = Arc::new(AsyncMutex::new(Vec::new()));
        let sub = Subscription::spawn(
            "once",
            recording(received.clone(), Duration::from_millis(50)),
            8,
            Weak::new(),
        );
        sub.enqueue(Message::new("once", 7)).await;

        let a = tokio::spawn({
            let sub = sub.clone();
            async move { sub.unsubscribe().await }
        });
        let b = tokio::spawn({
            let sub = sub.clone();
            async move { sub.unsubscribe().await }
        });
        a.await.unwrap();
        b.await.unwrap();
        sub.unsubscribe().await;

        assert_eq!(sub.state(), SubscriptionState::Terminated);
        assert_eq!(*received.lock().await, vec![7]);
    }

    #[tokio::test]
    async fn test_cancelled_unsubscribe_still_waits_for_worker() {
        let calls = Arc::new(AtomicU64::new(0));
        let handler: Arc<dyn MessageHandler> = Arc::new(FunctionHandler::new({
            let calls = calls.clone();
            move |_: Message| {
                let calls = calls.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    calls.fetch_add(1, Ordering::SeqCst);
                }
            }
        }));
        let sub = Subscription::spawn("slow", handler, 4, Weak::new());
        sub.enqueue(Message::new("slow", 1)).await;
        sub.enqueue(Message::new("slow", 2)).await;

        let first = tokio::time::timeout(Duration::from_millis(20), sub.unsubscribe()).await;
        assert!(first.is_err());
        assert_eq!(sub.state(), SubscriptionState::Draining);

        sub.unsubscribe().await;
        assert_eq!(sub.state(), SubscriptionState::Terminated);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_panicking_handler_does_not_block_unsubscribe() {
        let handler: Arc<dyn MessageHandler> =
            Arc::new(FunctionHandler::new(|_: Message| async { panic!("handler failure"); }));
        let sub = Subscription::spawn("boom", handler, 4, Weak::new());

        sub.enqueue(Message::new("boom", ())).await;
        tokio::time::timeout(Duration::from_secs(1), sub.unsubscribe())
            .await
            .unwrap();

        assert_eq!(sub.state(), SubscriptionState::Terminated);
        assert_eq!(sub.delivered(), 0);
    }
}
