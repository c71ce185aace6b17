//! Reactive mirror of a wallet provider's connection state.
//!
//! A [`ConnectionStateSynchronizer`] builds a wallet-connector aggregator, listens to its
//! lifecycle events and keeps a [`ConnectionSnapshot`] in an observable store that UI code can
//! read or await. `connect`/`disconnect` delegate to the provider.

pub mod config;
pub mod provider;
pub mod utils;
pub mod wallet;

pub use config::SyncOptions;
pub use provider::{
	ConnectorDescriptor, DEFAULT_CONNECTOR, ProviderBuilder, ProviderError, ProviderEvent,
	SimulatedProvider, WalletAccount, WalletHandle, WalletProvider,
};
pub use wallet::sync::{Projection, RetryConfig, SequenceStats, Store};
pub use wallet::{ConnectionSnapshot, ConnectionStateSynchronizer, SyncStatus, WalletSyncError};
