//! Subject registry for mapping subjects to live subscriptions.
//!
//! The registry and the bus's closed flag form one consistency unit: the bus
//! keeps a single [`Registry`] behind one async mutex, and every path that
//! reads or writes either of them (subscribe, publish's snapshot,
//! unsubscribe's removal, close's detach) holds that lock.

use crate::subscription::Subscription;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;
use uuid::Uuid;

/// Subject → subscriptions map plus the closed flag.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    /// Live subscriptions per subject, in subscribe order
    subjects: HashMap<Arc<str>, Vec<Arc<Subscription>>>,

    /// Set once by `close`, never cleared
    closed: bool,
}

impl Registry {
    /// Create an empty, open registry
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    /// Flip the closed flag. Returns `false` if it was already set.
    pub(crate) fn mark_closed(&mut self) -> bool {
        !std::mem::replace(&mut self.closed, true)
    }

    /// Append a subscription to its subject's list
    pub(crate) fn insert(&mut self, subscription: Arc<Subscription>) {
        trace!(
            subscription_id = %subscription.id(),
            subject = subscription.subject(),
            "Registering subscription"
        );
        self.subjects
            .entry(subscription.subject_key())
            .or_default()
            .push(subscription);
    }

    /// Remove a subscription. Returns whether it was present.
    pub(crate) fn remove(&mut self, subject: &str, id: Uuid) -> bool {
        let Some(subs) = self.subjects.get_mut(subject) else {
            return false;
        };
        let Some(index) = subs.iter().position(|s| s.id() == id) else {
            return false;
        };
        subs.remove(index);

        if subs.is_empty() {
            self.subjects.remove(subject);
        }

        trace!(subscription_id = %id, subject, "Subscription unregistered");
        true
    }

    /// Current subscribers of `subject`
    pub(crate) fn snapshot(&self, subject: &str) -> Vec<Arc<Subscription>> {
        self.subjects.get(subject).cloned().unwrap_or_default()
    }

    /// Detach and return every registered subscription
    pub(crate) fn drain_all(&mut self) -> Vec<Arc<Subscription>> {
        self.subjects.drain().flat_map(|(_, subs)| subs).collect()
    }

    pub(crate) fn subject_count(&self) -> usize {
        self.subjects.len()
    }

    pub(crate) fn subscription_count(&self) -> usize {
        self.subjects.values().map(Vec::len).sum()
    }
}
