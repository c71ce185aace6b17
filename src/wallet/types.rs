use crate::provider::{ProviderError, WalletHandle, WalletProvider};

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Local mirror of the provider's connection state.
///
/// Published as a whole on every accepted re-sync; fields are never patched in place.
#[derive(Clone, Default)]
pub struct ConnectionSnapshot {
	/// Whether an account is currently authorized
	pub connected: bool,
	/// Active account, present only while connected
	pub current_account: Option<String>,
	/// Whether at least one usable connector is installed
	pub has_connector: bool,
	/// Wallet handle for the active account, present only while connected
	pub wallet: Option<WalletHandle>,
	/// Provider the snapshot was derived from, present once initialized
	pub provider: Option<Arc<dyn WalletProvider>>,
	/// When the re-sync that produced this snapshot published it
	pub synced_at: Option<DateTime<Utc>>,
	/// Sequence number of the re-sync that produced this snapshot
	pub sequence: u64,
}

impl ConnectionSnapshot {
	/// Snapshot for a provider with no authorized account.
	pub fn disconnected(has_connector: bool, provider: Arc<dyn WalletProvider>) -> Self {
		Self {
			has_connector,
			provider: Some(provider),
			..Default::default()
		}
	}

	/// Snapshot for an authorized account.
	pub fn connected(
		account: String,
		wallet: WalletHandle,
		provider: Arc<dyn WalletProvider>,
	) -> Self {
		Self {
			connected: true,
			current_account: Some(account),
			has_connector: true,
			wallet: Some(wallet),
			provider: Some(provider),
			..Default::default()
		}
	}

	/// Copy of this snapshot reporting that no connector is installed.
	///
	/// Connection fields are carried over unchanged.
	pub fn without_connector(&self) -> Self {
		Self {
			has_connector: false,
			..self.clone()
		}
	}

	/// Account and wallet are present exactly when connected.
	pub fn is_consistent(&self) -> bool {
		if self.connected {
			self.current_account.is_some() && self.wallet.is_some()
		} else {
			self.current_account.is_none() && self.wallet.is_none()
		}
	}
}

impl fmt::Debug for ConnectionSnapshot {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ConnectionSnapshot")
			.field("connected", &self.connected)
			.field("current_account", &self.current_account)
			.field("has_connector", &self.has_connector)
			.field("wallet", &self.wallet)
			.field("provider", &self.provider.as_ref().map(|_| "<provider>"))
			.field("synced_at", &self.synced_at)
			.field("sequence", &self.sequence)
			.finish()
	}
}

/// Outcome of the most recent accepted re-sync
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncStatus {
	/// No re-sync has completed yet
	#[default]
	Loading,
	/// The snapshot reflects the provider
	Ready,
	/// No usable connector is installed
	NoConnector,
	/// The provider kept failing and retries were exhausted
	Failed { error: String },
}

/// Errors surfaced by the synchronizer
#[derive(Debug, thiserror::Error)]
pub enum WalletSyncError {
	#[error("Provider error: {0}")]
	Provider(#[from] ProviderError),

	#[error("Synchronizer is not initialized")]
	NotInitialized,

	#[error("Connector not found: {0}")]
	ConnectorNotFound(String),

	#[error("Connect failed: {0}")]
	Connect(#[source] ProviderError),

	#[error("Disconnect failed: {0}")]
	Disconnect(#[source] ProviderError),

	#[error("Re-sync failed after {attempts} attempts: {last_error}")]
	RetriesExhausted {
		attempts: u32,
		last_error: ProviderError,
	},

	#[error("Configuration error: {0}")]
	Config(String),

	#[error("JSON parse error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::provider::SimulatedProvider;

	#[test]
	fn test_default_snapshot_is_disconnected() {
		let snapshot = ConnectionSnapshot::default();
		assert!(!snapshot.connected);
		assert!(!snapshot.has_connector);
		assert!(snapshot.provider.is_none());
		assert_eq!(snapshot.sequence, 0);
		assert!(snapshot.is_consistent());
	}

	#[test]
	fn test_without_connector_keeps_connection_fields() {
		let provider: Arc<dyn WalletProvider> = Arc::new(SimulatedProvider::new(4));
		let mut snapshot = ConnectionSnapshot::disconnected(true, provider);
		snapshot.connected = true;
		snapshot.current_account = Some("0xabc".to_string());

		let stripped = snapshot.without_connector();
		assert!(!stripped.has_connector);
		assert!(stripped.connected);
		assert_eq!(stripped.current_account.as_deref(), Some("0xabc"));
		assert!(stripped.provider.is_some());
	}
}
