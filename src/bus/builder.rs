//! Builder pattern for constructing Bus instances.

use crate::bus::config::{BusConfig, EnqueuePolicy};
use crate::{Bus, Result};
use std::time::Duration;
use tracing::info;

/// Builder for creating Bus instances
#[derive(Debug, Clone, Default)]
pub struct BusBuilder {
    config: BusConfig,
}

impl BusBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom configuration
    pub fn config(mut self, config: BusConfig) -> Self {
        self.config = config;
        self
    }

    /// Configure the bus
    pub fn configure<F>(mut self, f: F) -> Self
    where
        F: FnOnce(BusConfig) -> BusConfig,
    {
        self.config = f(self.config);
        self
    }

    /// Set the per-subscription queue capacity
    pub fn queue_capacity(self, capacity: usize) -> Self {
        self.configure(|c| c.queue_capacity(capacity))
    }

    /// Set the enqueue policy
    pub fn enqueue_policy(self, policy: EnqueuePolicy) -> Self {
        self.configure(|c| c.enqueue_policy(policy))
    }

    /// Set the timeout used by `Bus::shutdown`
    pub fn shutdown_timeout(self, timeout: Duration) -> Self {
        self.configure(|c| c.shutdown_timeout(timeout))
    }

    /// Build the Bus
    pub fn build(self) -> Result<Bus> {
        self.config.validate()?;

        info!(
            queue_capacity = self.config.queue_capacity,
            enqueue_policy = ?self.config.enqueue_policy,
            "Building event bus"
        );
        Ok(Bus::from_config(self.config))
    }
}
