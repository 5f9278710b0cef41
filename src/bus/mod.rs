//! The main Bus implementation.
//!
//! The Bus owns the subject registry, fans every published message out to the
//! queues of the subscriptions registered for its subject, and coordinates the
//! shutdown that waits for every subscription to drain.

use crate::message::Message;
use crate::registry::Registry;
use crate::subscription::{
    FunctionHandler, MessageHandler, MessageStream, Subscription, SubscriptionHandle,
    TypedHandler,
};
use crate::{Error, Result};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

pub mod builder;
pub mod config;
pub mod deadline;

pub use builder::BusBuilder;
pub use config::{BusConfig, EnqueuePolicy};
pub use deadline::Deadline;

/// State shared between the bus, its clones and its subscriptions.
#[derive(Debug)]
pub(crate) struct Shared {
    /// Subject registry and closed flag behind the single bus-wide lock
    pub(crate) registry: Mutex<Registry>,

    /// Unlocked mirror of the closed flag for the pre-lock fast path
    is_closed: AtomicBool,

    messages_published: AtomicU64,
}

impl Shared {
    fn new() -> Self {
        Self {
            registry: Mutex::new(Registry::new()),
            is_closed: AtomicBool::new(false),
            messages_published: AtomicU64::new(0),
        }
    }

    /// Mark the registry closed, detach every subscription and drain them all
    /// concurrently, one task per subscription.
    async fn close_and_drain(self: Arc<Self>) {
        let subscriptions = {
            let mut registry = self.registry.lock().await;
            registry.mark_closed();
            registry.drain_all()
        };

        debug!(count = subscriptions.len(), "Draining subscriptions");

        let drains = subscriptions.into_iter().map(|subscription| {
            tokio::spawn(async move { subscription.unsubscribe().await })
        });
        for result in futures::future::join_all(drains).await {
            if let Err(e) = result {
                warn!(error = %e, "Drain task failed");
            }
        }
    }
}

/// In-process publish/subscribe bus.
///
/// Cloning is cheap; clones share the same registry.
///
/// # Example
///
/// ```rust,no_run
/// use subpub::{Bus, Message};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let bus = Bus::new();
///
///     let handle = bus
///         .subscribe_fn("greetings", |message: Message| async move {
///             println!("got {:?}", message.downcast_ref::<String>());
///         })
///         .await?;
///
///     bus.publish("greetings", String::from("hello")).await?;
///
///     handle.unsubscribe().await;
///     bus.close(Duration::from_secs(1)).await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Bus {
    shared: Arc<Shared>,
    config: Arc<BusConfig>,
}

impl Bus {
    /// Create a bus with the default configuration
    pub fn new() -> Self {
        Self::from_config(BusConfig::default())
    }

    /// Create a new Bus builder
    pub fn builder() -> BusBuilder {
        BusBuilder::new()
    }

    /// Create a bus from a validated configuration
    pub fn with_config(config: BusConfig) -> Result<Self> {
        BusBuilder::new().config(config).build()
    }

    pub(crate) fn from_config(config: BusConfig) -> Self {
        Self {
            shared: Arc::new(Shared::new()),
            config: Arc::new(config),
        }
    }

    /// The configuration this bus was built with
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Register `handler` for every message later published under `subject`.
    ///
    /// Starts one worker task for the subscription. Fails with
    /// [`Error::BusClosed`] once the bus has started closing, in which case
    /// no worker is started.
    pub async fn subscribe<H>(&self, subject: &str, handler: H) -> Result<SubscriptionHandle>
    where
        H: MessageHandler,
    {
        if self.is_closed() {
            return Err(Error::BusClosed);
        }

        let mut registry = self.shared.registry.lock().await;
        // Close may have won the race for the lock.
        if registry.is_closed() {
            return Err(Error::BusClosed);
        }

        let subscription = Subscription::spawn(
            subject,
            Arc::new(handler),
            self.config.queue_capacity,
            Arc::downgrade(&self.shared),
        );
        registry.insert(subscription.clone());
        drop(registry);

        debug!(
            subscription_id = %subscription.id(),
            subject,
            handler_name = subscription.handler_name(),
            "Handler subscribed"
        );
        Ok(SubscriptionHandle::new(subscription))
    }

    /// Subscribe a closure over the raw [`Message`]
    pub async fn subscribe_fn<F, Fut>(&self, subject: &str, f: F) -> Result<SubscriptionHandle>
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.subscribe(subject, FunctionHandler::with_name(f, format!("Handler<{}>", subject)))
            .await
    }

    /// Subscribe a closure that only receives payloads of type `T`
    pub async fn subscribe_typed<T, F, Fut>(&self, subject: &str, f: F) -> Result<SubscriptionHandle>
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.subscribe(subject, TypedHandler::new(f)).await
    }

    /// Subscribe and receive messages as a [`futures::Stream`].
    ///
    /// `buffer` bounds how many delivered messages the stream holds before
    /// its subscription's handler waits for the consumer.
    pub async fn subscribe_stream(&self, subject: &str, buffer: usize) -> Result<MessageStream> {
        MessageStream::open(self, subject, buffer).await
    }

    /// Publish `payload` under `subject`.
    ///
    /// See [`publish_message`](Self::publish_message).
    pub async fn publish<T>(&self, subject: &str, payload: T) -> Result<()>
    where
        T: Send + Sync + 'static,
    {
        self.publish_message(Message::new(subject, payload)).await
    }

    /// Enqueue `message` for every subscription currently registered for its
    /// subject.
    ///
    /// Publishing to a subject nobody listens on succeeds and does nothing.
    /// If a subscriber's queue is full this waits for space; under
    /// [`EnqueuePolicy::HoldLock`] it waits while holding the registry lock,
    /// so every other bus call waits too.
    pub async fn publish_message(&self, message: Message) -> Result<()> {
        if self.is_closed() {
            return Err(Error::BusClosed);
        }

        let registry = self.shared.registry.lock().await;
        if registry.is_closed() {
            return Err(Error::BusClosed);
        }

        let targets = registry.snapshot(message.subject());
        self.shared.messages_published.fetch_add(1, Ordering::Relaxed);

        trace!(
            message_id = %message.id(),
            subject = message.subject(),
            subscribers = targets.len(),
            "Publishing message"
        );

        match self.config.enqueue_policy {
            EnqueuePolicy::HoldLock => {
                for subscription in &targets {
                    subscription.enqueue(message.clone()).await;
                }
                drop(registry);
            }
            EnqueuePolicy::Snapshot => {
                drop(registry);
                for subscription in &targets {
                    subscription.enqueue(message.clone()).await;
                }
            }
        }

        Ok(())
    }

    /// Unsubscribe a handler. Same as [`SubscriptionHandle::unsubscribe`].
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) {
        handle.unsubscribe().await
    }

    /// Close the bus and wait for every subscription to drain.
    ///
    /// From the moment this is called, `subscribe` and `publish` fail with
    /// [`Error::BusClosed`]. Every registered subscription is unsubscribed
    /// concurrently. Returns `Ok(())` once all of them have drained, or the
    /// deadline's error if it fires first (or had already fired); drains still
    /// in progress then finish in the background.
    pub async fn close(&self, deadline: impl Into<Deadline>) -> Result<()> {
        let deadline = deadline.into();
        info!("Closing event bus");

        self.shared.is_closed.store(true, Ordering::Release);
        let closing = tokio::spawn(self.shared.clone().close_and_drain());

        if let Some(err) = deadline.check() {
            warn!(error = %err, "Close deadline already expired, draining in background");
            return Err(err);
        }

        tokio::select! {
            biased;
            err = deadline.expired() => {
                warn!(error = %err, "Close deadline hit before every subscription drained");
                Err(err)
            }
            result = closing => {
                if let Err(e) = result {
                    warn!(error = %e, "Close task failed");
                }
                info!("Event bus closed");
                Ok(())
            }
        }
    }

    /// Close with the configured shutdown timeout
    pub async fn shutdown(&self) -> Result<()> {
        self.close(self.config.shutdown_timeout_duration()).await
    }

    /// Check if the bus has started closing
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed.load(Ordering::Acquire)
    }

    /// Get statistics about the bus
    pub async fn stats(&self) -> BusStats {
        let registry = self.shared.registry.lock().await;
        BusStats {
            subjects: registry.subject_count(),
            subscriptions: registry.subscription_count(),
            messages_published: self.shared.messages_published.load(Ordering::Relaxed),
            closed: registry.is_closed(),
        }
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Statistics about the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusStats {
    /// Subjects with at least one registered subscription
    pub subjects: usize,

    /// Registered subscriptions across all subjects
    pub subscriptions: usize,

    /// Successful publish calls so far
    pub messages_published: u64,

    /// Whether the bus has been closed
    pub closed: bool,
}

impl fmt::Display for BusStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bus Stats: {} subscriptions, {} subjects, {} messages published{}",
            self.subscriptions,
            self.subjects,
            self.messages_published,
            if self.closed { " (closed)" } else { "" }
        )
    }
}
