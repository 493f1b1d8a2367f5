//! Request correlation and identifier allocation for callback-driven broker
//! sessions.
//!
//! The remote API answers every call asynchronously on a single reader
//! thread, tagged only with an integer correlation id. This crate turns that
//! into:
//!
//! - [`IdAllocator`]: unique, increasing correlation ids.
//! - [`EntityRegistry`]: deduplicated, cached, blocking or fire-and-forget
//!   lookups.
//! - [`OrderIdCoordinator`]: FIFO order-id tickets matched against
//!   asynchronously delivered values.
//! - [`RateLimiter`]: sliding-window admission for every outbound call.
//! - [`Session`]: all of the above wired around one collaborator.
//!
//! ## Features
//! - `tracing`: structured events and spans through the `tracing` crate.
//! - `serde`: `Serialize`/`Deserialize` for configuration types.
//! - `cache-padded`: pads [`AtomicCounter`] to a cache line.

extern crate alloc;

mod allocator;
mod config;
mod counter;
mod error;
mod id;
mod mutex;
mod order_id;
mod rate_limit;
mod registry;
mod session;
mod slot;
mod status;

/// Baseline used when none is configured: the first id handed out is `2`.
pub const DEFAULT_ID_BASELINE: i64 = 1;

pub use crate::allocator::*;
pub use crate::config::*;
pub use crate::counter::*;
pub use crate::error::*;
pub use crate::id::*;
pub use crate::order_id::*;
pub use crate::rate_limit::*;
pub use crate::registry::*;
pub use crate::session::*;
pub use crate::status::*;
