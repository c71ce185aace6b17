//! Wallet provider integration
//!
//! This module defines the contract the synchronizer expects from a wallet-connector aggregator,
//! the event and error types exchanged with it, and an in-memory implementation.

/// Provider trait and builder
mod client;
/// In-memory provider with scriptable behaviour
pub mod simulated;
/// Events, connector descriptors, wallet handles and errors
mod types;

pub use client::{ProviderBuilder, WalletProvider, connector_list};
pub use simulated::SimulatedProvider;
pub use types::*;
