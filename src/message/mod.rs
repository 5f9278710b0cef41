//! Opaque message envelope delivered to handlers.
//!
//! The bus never looks inside a payload. A [`Message`] wraps any
//! `Send + Sync + 'static` value behind an `Arc`, so fanning one publish out to
//! many subscriptions costs a reference-count bump per subscriber.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod metadata;

pub use metadata::MessageMetadata;

/// A type-erased message published under a subject.
#[derive(Clone)]
pub struct Message {
    /// The type-erased payload
    payload: Arc<dyn Any + Send + Sync>,

    /// Type ID of the original payload
    type_id: TypeId,

    /// Human-readable type name for debugging
    type_name: &'static str,

    /// Message metadata
    pub metadata: MessageMetadata,
}

impl Message {
    /// Wrap a payload for publishing under `subject`
    pub fn new<T>(subject: impl Into<Arc<str>>, payload: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        Self::with_metadata(payload, MessageMetadata::new(subject))
    }

    /// Wrap a payload with pre-built metadata
    pub fn with_metadata<T>(payload: T, metadata: MessageMetadata) -> Self
    where
        T: Send + Sync + 'static,
    {
        Self {
            payload: Arc::new(payload),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            metadata,
        }
    }

    /// Message id
    pub fn id(&self) -> Uuid {
        self.metadata.id
    }

    /// Subject the message was published under
    pub fn subject(&self) -> &str {
        &self.metadata.subject
    }

    /// When the message was created
    pub fn published_at(&self) -> DateTime<Utc> {
        self.metadata.published_at
    }

    /// Type name of the payload
    pub fn payload_type(&self) -> &'static str {
        self.type_name
    }

    /// Check if the payload is a `T`
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Try to borrow the payload as a `T`
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        if self.is::<T>() {
            self.payload.downcast_ref::<T>()
        } else {
            None
        }
    }

    /// Try to extract the payload as a shared `T`
    #[allow(clippy::result_large_err)]
    pub fn try_into_inner<T>(self) -> Result<Arc<T>, Self>
    where
        T: Send + Sync + 'static,
    {
        if !self.is::<T>() {
            return Err(self);
        }
        match Arc::downcast::<T>(self.payload.clone()) {
            Ok(payload) => Ok(payload),
            Err(_) => Err(self),
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.metadata.id)
            .field("subject", &self.metadata.subject)
            .field("payload_type", &self.type_name)
            .field("published_at", &self.metadata.published_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct OrderPlaced {
        order_id: u64,
    }

    #[test]
    fn test_downcast() {
        let msg = Message::new("orders", OrderPlaced { order_id: 7 });

        assert!(msg.is::<OrderPlaced>());
        assert!(!msg.is::<String>());
        assert_eq!(msg.downcast_ref::<OrderPlaced>(), Some(&OrderPlaced { order_id: 7 }));
        assert!(msg.downcast_ref::<u64>().is_none());
        assert_eq!(msg.subject(), "orders");
    }

    #[test]
    fn test_try_into_inner() {
        let msg = Message::new("numbers", 42_i32);

        let msg = msg.try_into_inner::<String>().unwrap_err();
        let value = msg.try_into_inner::<i32>().unwrap();
        assert_eq!(*value, 42);
    }

    #[test]
    fn test_clone_shares_payload() {
        let msg = Message::new("greetings", String::from("hello"));
        let copy = msg.clone();

        assert_eq!(msg.id(), copy.id());
        assert!(std::ptr::eq(
            msg.downcast_ref::<String>().unwrap(),
            copy.downcast_ref::<String>().unwrap()
        ));
    }

    #[test]
    fn test_debug_hides_payload() {
        let msg = Message::new("secrets", String::from("hunter2"));
        let debug = format!("{:?}", msg);
        assert!(debug.contains("secrets"));
        assert!(!debug.contains("hunter2"));
    }
}
