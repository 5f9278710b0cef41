//! Subscription handle for managing subscription lifecycle.

use super::{Subscription, SubscriptionState};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// A handle to a subscription returned by `subscribe`.
///
/// Its only capability that changes anything is [`unsubscribe`](Self::unsubscribe).
/// Cloning is cheap and every clone refers to the same subscription. Dropping
/// a handle does not unsubscribe; the subscription stays registered until it
/// is unsubscribed explicitly or the bus is closed.
#[derive(Clone)]
pub struct SubscriptionHandle {
    inner: Arc<Subscription>,
}

impl SubscriptionHandle {
    pub(crate) fn new(inner: Arc<Subscription>) -> Self {
        Self { inner }
    }

    /// Get the subscription ID
    pub fn id(&self) -> Uuid {
        self.inner.id()
    }

    /// Subject this subscription was created for
    pub fn subject(&self) -> &str {
        self.inner.subject()
    }

    /// Name of the handler behind this subscription
    pub fn name(&self) -> &str {
        self.inner.handler_name()
    }

    /// Current lifecycle state
    pub fn state(&self) -> SubscriptionState {
        self.inner.state()
    }

    /// Check if this subscription is still registered
    pub fn is_active(&self) -> bool {
        self.state() == SubscriptionState::Active
    }

    /// Number of messages the handler has finished processing
    pub fn delivered(&self) -> u64 {
        self.inner.delivered()
    }

    /// Unsubscribe and wait until every message already queued has been
    /// handled.
    ///
    /// Idempotent and safe to call concurrently from several tasks; every call
    /// returns once the drain is complete. After it returns the handler is
    /// never invoked again for this subscription.
    pub async fn unsubscribe(&self) {
        self.inner.unsubscribe().await
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id())
            .field("subject", &self.subject())
            .field("name", &self.name())
            .finish()
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Subscription '{}' on '{}' ({})",
            self.name(),
            self.subject(),
            self.id()
        )
    }
}
