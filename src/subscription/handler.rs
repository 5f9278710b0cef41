//! Message handler traits and implementations.

use crate::Message;
use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

/// Trait for handlers that receive the messages of one subscription.
///
/// A subscription's worker awaits `handle` for one message at a time, so an
/// implementation never sees two concurrent calls from the same subscription.
/// The bus does not catch or report anything that goes wrong inside a handler.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Process one delivered message
    async fn handle(&self, message: Message);

    /// Get the handler name for debugging
    fn name(&self) -> &str {
        "unnamed"
    }
}

/// A function-based handler using closures over the raw [`Message`].
#[allow(missing_debug_implementations)]
pub struct FunctionHandler<F, Fut>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    function: F,
    name: String,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FunctionHandler<F, Fut>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    /// Create a new function handler
    pub fn new(function: F) -> Self {
        Self::with_name(function, "FunctionHandler")
    }

    /// Create a new function handler with a custom name
    pub fn with_name(function: F, name: impl Into<String>) -> Self {
        Self {
            function,
            name: name.into(),
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut> MessageHandler for FunctionHandler<F, Fut>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, message: Message) {
        (self.function)(message).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A handler that only accepts payloads of type `T`.
///
/// Messages carrying any other payload type are skipped with a warning.
#[allow(missing_debug_implementations)]
pub struct TypedHandler<T, F, Fut>
where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    function: F,
    name: String,
    _phantom: PhantomData<fn(T) -> Fut>,
}

impl<T, F, Fut> TypedHandler<T, F, Fut>
where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    /// Create a new typed handler
    pub fn new(function: F) -> Self {
        Self {
            function,
            name: format!("TypedHandler<{}>", std::any::type_name::<T>()),
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<T, F, Fut> MessageHandler for TypedHandler<T, F, Fut>
where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, message: Message) {
        match message.try_into_inner::<T>() {
            Ok(payload) => (self.function)(payload).await,
            Err(message) => {
                warn!(
                    message_id = %message.id(),
                    subject = message.subject(),
                    expected = std::any::type_name::<T>(),
                    actual = message.payload_type(),
                    handler_name = %self.name,
                    "Skipping message with unexpected payload type"
                );
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[tokio::test]
    async fn test_function_handler() {
        let seen = Arc::new(AtomicU64::new(0));
        let seen_clone = seen.clone();
        let handler = FunctionHandler::with_name(
            move |message: Message| {
                let seen = seen_clone.clone();
                async move {
                    let value = *message.downcast_ref::<u64>().unwrap();
                    seen.fetch_add(value, Ordering::SeqCst);
                }
            },
            "adder",
        );

        handler.handle(Message::new("numbers", 40_u64)).await;
        handler.handle(Message::new("numbers", 2_u64)).await;

        assert_eq!(seen.load(Ordering::SeqCst), 42);
        assert_eq!(handler.name(), "adder");
    }

    #[tokio::test]
    async fn test_typed_handler_skips_other_types() {
        let seen = Arc::new(AtomicU64::new(0));
        let seen_clone = seen.clone();
        let handler = TypedHandler::new(move |value: Arc<u64>| {
            let seen = seen_clone.clone();
            async move {
                seen.fetch_add(*value, Ordering::SeqCst);
            }
        });

        handler.handle(Message::new("numbers", 5_u64)).await;
        handler.handle(Message::new("numbers", "not a number")).await;

        assert_eq!(seen.load(Ordering::SeqCst), 5);
        assert!(handler.name().contains("u64"));
    }
}
