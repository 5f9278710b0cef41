//! # subpub
//!
//! An in-process publish/subscribe event bus built on Tokio.
//!
//! Producers publish messages under a subject; every handler subscribed to
//! that subject receives each message, in publish order, on its own worker
//! task. A slow handler only slows down its own subscription until its bounded
//! queue fills up, at which point publishers wait for space.
//!
//! ## Features
//!
//! - **Per-subscription FIFO** delivery with bounded queues and backpressure
//! - **Idempotent unsubscribe** that drains already-queued messages
//! - **Deadline-bounded close** that drains every subscription concurrently
//! - **Stream adapter** for transports that push messages to remote clients
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use subpub::{Bus, Message};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = Bus::new();
//!
//!     let handle = bus
//!         .subscribe_typed("users.registered", |email: std::sync::Arc<String>| async move {
//!             println!("New user registered: {}", email);
//!         })
//!         .await?;
//!
//!     bus.publish("users.registered", String::from("user@example.com")).await?;
//!
//!     handle.unsubscribe().await;
//!     bus.close(Duration::from_secs(5)).await?;
//!     Ok(())
//! }
//! ```

#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    unreachable_pub
)]

/// Error types and result aliases
pub mod error;

/// Opaque message envelope
pub mod message;

/// Subject-to-subscription registry
mod registry;

/// Subscriptions, handlers and handles
pub mod subscription;

/// The main bus implementation
pub mod bus;

pub use bus::{Bus, BusBuilder, BusConfig, BusStats, Deadline, EnqueuePolicy};
pub use error::{Error, Result, StatusCode};
pub use message::{Message, MessageMetadata};
pub use subscription::{
    FunctionHandler, MessageHandler, MessageStream, SubscriptionHandle, SubscriptionState,
    TypedHandler,
};

/// Prelude module for convenient imports
///
/// # Example
/// ```rust
/// use subpub::prelude::*;
/// ```
pub mod prelude {
    pub use crate::bus::{Bus, Deadline};
    pub use crate::error::{Error, Result};
    pub use crate::message::Message;
    pub use crate::subscription::{MessageHandler, SubscriptionHandle};
}
