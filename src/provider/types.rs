//! Types shared between the synchronizer and wallet provider implementations

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Name of the connector every provider is built with.
pub const DEFAULT_CONNECTOR: &str = "Fuel Wallet";

/// Lifecycle events emitted by a wallet provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProviderEvent {
    /// Authorization state of the selected connector changed
    Connection,
    /// The set of authorized accounts changed
    Accounts,
    /// The active account changed
    CurrentAccount,
    /// The active network changed
    CurrentNetwork,
    /// The set of known networks changed
    Networks,
    /// The selected connector changed
    CurrentConnector,
    /// The list of installed connectors changed
    Connectors,
}

impl ProviderEvent {
    /// Events after which the connection state has to be re-derived.
    pub const RESYNC_TRIGGERS: [ProviderEvent; 5] = [
        ProviderEvent::Connection,
        ProviderEvent::Accounts,
        ProviderEvent::CurrentAccount,
        ProviderEvent::CurrentNetwork,
        ProviderEvent::Networks,
    ];

    /// Check if this event should trigger a re-sync
    pub fn triggers_resync(&self) -> bool {
        Self::RESYNC_TRIGGERS.contains(self)
    }
}

/// Description of a wallet connector a provider should be able to use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorDescriptor {
    /// Display name, also used to select the connector.
    pub name: String,
    /// Whether the connector is installed in the host environment.
    #[serde(default = "default_installed")]
    pub installed: bool,
}

fn default_installed() -> bool {
    true
}

impl ConnectorDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            installed: true,
        }
    }

    /// The connector the provider is always built with.
    pub fn default_connector() -> Self {
        Self::new(DEFAULT_CONNECTOR)
    }

    pub fn not_installed(mut self) -> Self {
        self.installed = false;
        self
    }
}

/// Account capability returned by a provider for signing and querying.
///
/// The synchronizer never looks inside it beyond the address; it only hands it to consumers.
pub trait WalletAccount: fmt::Debug + Send + Sync {
    /// Address of the account this handle acts for.
    fn address(&self) -> &str;

    /// Name of the connector the handle was obtained through.
    fn connector(&self) -> &str;
}

/// Shared, opaque wallet handle.
pub type WalletHandle = Arc<dyn WalletAccount>;

/// Errors reported by a wallet provider
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Account query failed: {0}")]
    AccountQuery(String),

    #[error("Wallet query failed for {account}: {reason}")]
    WalletQuery { account: String, reason: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Connector not installed: {0}")]
    ConnectorNotInstalled(String),

    #[error("Provider error: {0}")]
    Other(String),
}
