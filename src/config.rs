//! Synchronizer options.
//!
//! Options are plain data with serde defaults, so an empty JSON object (or `SyncOptions::default()`)
//! yields a working configuration: only the built-in connector, 5 retry attempts.

use crate::provider::{ConnectorDescriptor, DEFAULT_CONNECTOR};
use crate::wallet::WalletSyncError;
use crate::wallet::sync::RetryConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Options accepted by `ConnectionStateSynchronizer::initialize`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncOptions {
	/// Connectors registered after the built-in one, in order
	pub additional_connectors: Vec<ConnectorDescriptor>,
	/// Connector used by `connect`/`disconnect` when no name is given
	pub default_connector: String,
	/// Retry policy for re-syncs hitting provider errors
	pub retry: RetryConfig,
	/// Capacity of the provider event channel
	pub event_buffer: usize,
}

impl Default for SyncOptions {
	fn default() -> Self {
		Self {
			additional_connectors: Vec::new(),
			default_connector: DEFAULT_CONNECTOR.to_string(),
			retry: RetryConfig::default(),
			event_buffer: 64,
		}
	}
}

impl SyncOptions {
	pub fn with_connector(mut self, connector: ConnectorDescriptor) -> Self {
		self.additional_connectors.push(connector);
		self
	}

	pub fn with_retry(mut self, retry: RetryConfig) -> Self {
		self.retry = retry;
		self
	}

	/// Parse options from a JSON document.
	pub fn from_json_str(json: &str) -> Result<Self, WalletSyncError> {
		let options: Self = serde_json::from_str(json)?;
		options.validate()?;
		Ok(options)
	}

	/// Read options from a JSON file.
	pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, WalletSyncError> {
		let json = std::fs::read_to_string(path)?;
		Self::from_json_str(&json)
	}

	pub fn validate(&self) -> Result<(), WalletSyncError> {
		if self.default_connector.trim().is_empty() {
			return Err(WalletSyncError::Config(
				"defaultConnector must not be empty".to_string(),
			));
		}
		if let Some(unnamed) = self
			.additional_connectors
			.iter()
			.position(|c| c.name.trim().is_empty())
		{
			return Err(WalletSyncError::Config(format!(
				"additionalConnectors[{}] has an empty name",
				unnamed
			)));
		}
		if self.event_buffer == 0 {
			return Err(WalletSyncError::Config(
				"eventBuffer must be at least 1".to_string(),
			));
		}
		self.retry.validate()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_empty_json_uses_defaults() {
		let options = SyncOptions::from_json_str("{}").unwrap();
		assert_eq!(options, SyncOptions::default());
		assert_eq!(options.default_connector, DEFAULT_CONNECTOR);
	}

	#[test]
	fn test_parse_connectors_and_retry() {
		let options = SyncOptions::from_json_str(
			r#"{
				"additionalConnectors": [
					{ "name": "Burner Wallet" },
					{ "name": "Ledger", "installed": false }
				],
				"retry": { "max_attempts": 2, "initial_interval_ms": 50 }
			}"#,
		)
		.unwrap();

		assert_eq!(options.additional_connectors.len(), 2);
		assert!(options.additional_connectors[0].installed);
		assert!(!options.additional_connectors[1].installed);
		assert_eq!(options.retry.max_attempts, 2);
		assert_eq!(options.retry.initial_interval_ms, 50);
		assert_eq!(options.retry.max_interval_ms, RetryConfig::default().max_interval_ms);
	}

	#[test]
	fn test_rejects_unnamed_connector() {
		let result = SyncOptions::from_json_str(r#"{ "additionalConnectors": [{ "name": " " }] }"#);
		assert!(matches!(result, Err(WalletSyncError::Config(_))));
	}

	#[test]
	fn test_rejects_malformed_json() {
		assert!(matches!(
			SyncOptions::from_json_str("{ not json"),
			Err(WalletSyncError::Json(_))
		));
	}
}
