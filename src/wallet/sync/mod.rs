//! Connection State Synchronization Module
//!
//! This module provides the logic for mirroring a wallet provider's connection state into
//! observable stores. It is composed of several submodules, each responsible for one aspect of
//! the synchronization:
//!
//! - `orchestrator`: The main entry point. Builds the provider, wires event handlers and runs re-syncs.
//! - `events`: Routes provider lifecycle events to registered handlers.
//! - `store`: Observable value containers and the read-only projections derived from them.
//! - `sequencer`: Orders concurrent re-syncs so stale results are never published.
//! - `retry`: Bounded retry policy for re-syncs hitting provider errors.
//!
//! The orchestrator reacts to every lifecycle event by re-querying the provider and publishing a
//! whole new snapshot, so consumers always see one internally consistent view.

/// Provider event routing
pub mod events;
/// Main coordinator for connection state synchronization
pub mod orchestrator;
/// Retry policy configuration
pub mod retry;
/// Ordering of concurrent re-syncs
pub mod sequencer;
/// Observable stores and projections
pub mod store;

pub use orchestrator::*;
pub use retry::RetryConfig;
pub use sequencer::SequenceStats;
pub use store::{Projection, Store};
