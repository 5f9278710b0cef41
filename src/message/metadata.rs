//! Message metadata for tracking and correlation.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Metadata stamped on every published message.
#[derive(Debug, Clone)]
pub struct MessageMetadata {
    /// Unique identifier for this message instance
    pub id: Uuid,

    /// Subject the message was published under
    pub subject: Arc<str>,

    /// Timestamp when the message was created
    pub published_at: DateTime<Utc>,
}

impl MessageMetadata {
    /// Create new metadata with a generated id and the current timestamp
    pub fn new(subject: impl Into<Arc<str>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject: subject.into(),
            published_at: Utc::now(),
        }
    }

    /// Age of the message relative to now
    pub fn age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.published_at)
    }
}
