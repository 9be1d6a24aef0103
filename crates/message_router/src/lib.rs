//! # Message Router
//!
//! An in-process, synchronous publish/subscribe dispatcher. Producers publish
//! messages under an application-defined key; consumers subscribe to one key,
//! or to every key through the wildcard group.
//!
//! ## Reentrancy
//!
//! Every operation may be called from inside a subscriber callback while a
//! dispatch is running:
//!
//! - **Subscribe** during a pass: the new subscriber first runs on the next publish.
//! - **Unsubscribe** during a pass: removal is deferred until the pass ends.
//! - **Publish the same key** during its own pass: discarded with a warning.
//! - **Consume** the message being dispatched: the remaining subscribers of
//!   that pass are skipped.
//!
//! Subscriber errors never cut a pass short. They are collected and returned
//! when the pass is over: a single error unchanged, several as
//! [`DispatchError::Aggregate`].
//!
//! ## Usage
//!
//! ```rust
//! use message_router::{Message, MessageRouter};
//!
//! #[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
//! enum Topic {
//!     PlayerJoined,
//!     PlayerLeft,
//! }
//!
//! let router: MessageRouter<Topic> = MessageRouter::new();
//!
//! router.subscribe(Topic::PlayerJoined, |message, unsubscribe| {
//!     if let Some(name) = message.downcast_ref::<String>() {
//!         println!("{name} joined");
//!     }
//!     unsubscribe.unsubscribe();
//!     Ok(())
//! });
//! router.subscribe_all_fn(|message| {
//!     println!("saw {message:?}");
//!     Ok(())
//! });
//!
//! router.publish(Topic::PlayerJoined, &Message::new("Alice".to_string()))?;
//! router.publish_void(Topic::PlayerLeft)?;
//! # Ok::<(), message_router::DispatchError>(())
//! ```
//!
//! The router is single-threaded (`!Send`): reentrancy means nested calls on
//! one call stack, never concurrent threads.

pub mod config;
pub mod error;
pub mod key;
pub mod message;
pub mod router;
pub mod stats;
pub mod subscriber;

mod group;

pub use config::RouterConfig;
pub use error::{AggregateError, ConfigError, DispatchError};
pub use key::{GroupKey, MessageKey};
pub use message::{DispatchToken, Message, Void};
pub use router::{MessageRouter, WeakMessageRouter};
pub use stats::RouterStats;
pub use subscriber::{SubscriptionId, Unsubscribe};

/// Version information
pub const MESSAGE_ROUTER_VERSION: &str = env!("CARGO_PKG_VERSION");
