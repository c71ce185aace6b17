//!
//! Contract between the synchronizer and a wallet-connector aggregator.
//!
//! A provider coordinates one or more wallet connectors (browser extensions, hardware bridges,
//! ...). Everything that touches keys, accounts or networks happens behind this trait; the
//! synchronizer only asks questions and reacts to the lifecycle events the provider broadcasts.

use super::types::*;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Wallet-connector aggregator
#[async_trait::async_trait]
pub trait WalletProvider: Send + Sync {
	/// Whether at least one usable connector is installed.
	async fn has_connector(&self) -> Result<bool, ProviderError>;

	/// Whether an account is currently authorized on the selected connector.
	async fn is_connected(&self) -> Result<bool, ProviderError>;

	/// Identifier of the active account.
	async fn current_account(&self) -> Result<String, ProviderError>;

	/// Obtain a wallet handle for `account`.
	async fn get_wallet(&self, account: &str) -> Result<WalletHandle, ProviderError>;

	/// Select the active connector by name.
	///
	/// # Returns
	/// `false` if no connector with that name is known to the provider.
	async fn select_connector(&self, name: &str) -> Result<bool, ProviderError>;

	/// Ask the selected connector to authorize an account.
	async fn connect(&self) -> Result<(), ProviderError>;

	/// Revoke the authorization on the selected connector.
	async fn disconnect(&self) -> Result<(), ProviderError>;

	/// Connectors this provider was built with, in registration order.
	fn connectors(&self) -> Vec<ConnectorDescriptor>;

	/// Subscribe to lifecycle events.
	///
	/// Every call returns an independent receiver; events sent before the call are not replayed.
	fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;
}

/// Constructs a provider for a list of connectors.
pub trait ProviderBuilder: Send + Sync {
	fn build(
		&self,
		connectors: &[ConnectorDescriptor],
	) -> Result<Arc<dyn WalletProvider>, ProviderError>;
}

impl<F> ProviderBuilder for F
where
	F: Fn(&[ConnectorDescriptor]) -> Result<Arc<dyn WalletProvider>, ProviderError> + Send + Sync,
{
	fn build(
		&self,
		connectors: &[ConnectorDescriptor],
	) -> Result<Arc<dyn WalletProvider>, ProviderError> {
		self(connectors)
	}
}

/// Connector list for a new provider: the default connector followed by `additional`.
///
/// Entries named like the default connector are dropped so it is never registered twice.
pub fn connector_list(additional: &[ConnectorDescriptor]) -> Vec<ConnectorDescriptor> {
	let mut connectors = vec![ConnectorDescriptor::default_connector()];
	connectors.extend(
		additional
			.iter()
			.filter(|c| c.name != DEFAULT_CONNECTOR)
			.cloned(),
	);
	connectors
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_connector_list_puts_default_first() {
		let list = connector_list(&[
			ConnectorDescriptor::new("Burner Wallet"),
			ConnectorDescriptor::new(DEFAULT_CONNECTOR),
			ConnectorDescriptor::new("Ledger").not_installed(),
		]);
		let names: Vec<&str> = list.iter().map(|c| c.name.as_str()).collect();
		assert_eq!(names, vec![DEFAULT_CONNECTOR, "Burner Wallet", "Ledger"]);
		assert!(!list[2].installed);
	}

	#[test]
	fn test_connector_list_empty() {
		assert_eq!(
			connector_list(&[]),
			vec![ConnectorDescriptor::default_connector()]
		);
	}
}
