//! Configuration for the event bus.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Queue slots per subscription unless configured otherwise
pub const DEFAULT_QUEUE_CAPACITY: usize = 42;

/// How long `Bus::shutdown` waits for subscriptions to drain
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5_000;

/// Where `publish` performs its enqueues relative to the registry lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnqueuePolicy {
    /// Enqueue while still holding the registry lock.
    ///
    /// A full queue on any subscriber blocks the publisher *and* every other
    /// subscribe, publish and unsubscribe on the bus until space frees up.
    #[default]
    HoldLock,

    /// Snapshot the subscriber list under the lock, release it, then enqueue.
    ///
    /// A full queue still blocks that publisher, but no longer stalls
    /// callers working on other subjects. A subscription unsubscribed
    /// between the snapshot and its enqueue does not receive the message,
    /// and `publish` still returns `Ok(())`.
    Snapshot,
}

/// Configuration for the event bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Capacity of each subscription's queue
    pub queue_capacity: usize,

    /// Enqueue strategy used by `publish`
    pub enqueue_policy: EnqueuePolicy,

    /// Drain deadline used by `Bus::shutdown`, in milliseconds
    pub shutdown_timeout_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            enqueue_policy: EnqueuePolicy::default(),
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl BusConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-subscription queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the enqueue policy
    pub fn enqueue_policy(mut self, policy: EnqueuePolicy) -> Self {
        self.enqueue_policy = policy;
        self
    }

    /// Set the shutdown timeout
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Shutdown timeout as a `Duration`
    pub fn shutdown_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Check that the configuration can be used to build a bus
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::config("queue_capacity must be at least 1"));
        }
        Ok(())
    }

    /// Parse and validate a configuration from JSON.
    ///
    /// Missing fields take their default values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize this configuration to JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::config(e.to_string()))
    }
}

/// Preset configurations for common use cases
impl BusConfig {
    /// Subjects never stall each other on a full queue
    pub fn isolated_subjects() -> Self {
        Self::default().enqueue_policy(EnqueuePolicy::Snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BusConfig::default();
        assert_eq!(config.queue_capacity, 42);
        assert_eq!(config.enqueue_policy, EnqueuePolicy::HoldLock);
        assert_eq!(config.shutdown_timeout_duration(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_setters() {
        let config = BusConfig::new()
            .queue_capacity(8)
            .enqueue_policy(EnqueuePolicy::Snapshot)
            .shutdown_timeout(Duration::from_millis(250));

        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.enqueue_policy, EnqueuePolicy::Snapshot);
        assert_eq!(config.shutdown_timeout_ms, 250);
        assert_eq!(BusConfig::isolated_subjects().enqueue_policy, EnqueuePolicy::Snapshot);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = BusConfig::new().queue_capacity(0).validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_from_json_partial() {
        let config = BusConfig::from_json(r#"{ "enqueue_policy": "snapshot" }"#).unwrap();
        assert_eq!(config.enqueue_policy, EnqueuePolicy::Snapshot);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);

        let json = config.to_json().unwrap();
        assert_eq!(BusConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_from_json_errors() {
        assert!(matches!(BusConfig::from_json("not json"), Err(Error::Config(_))));
        assert!(matches!(
            BusConfig::from_json(r#"{ "queue_capacity": 0 }"#),
            Err(Error::Config(_))
        ));
    }
}
