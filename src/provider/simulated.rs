//!
//! In-memory wallet provider.
//!
//! `SimulatedProvider` implements [`WalletProvider`] without any wallet behind it: accounts are
//! random addresses, authorization is a flag, and every state change broadcasts the same
//! lifecycle events a real connector aggregator would. Failures and latency can be scripted,
//! which is what the synchronizer tests and the demo binary rely on.

use super::client::{ProviderBuilder, WalletProvider};
use super::types::*;

use rand::Rng;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

/// Number of calls made to each provider operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub has_connector: u32,
    pub is_connected: u32,
    pub current_account: u32,
    pub get_wallet: u32,
    pub select_connector: u32,
    pub connect: u32,
    pub disconnect: u32,
}

/// Wallet handle handed out by the simulated provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedAccount {
    address: String,
    connector: String,
}

impl WalletAccount for SimulatedAccount {
    fn address(&self) -> &str {
        &self.address
    }

    fn connector(&self) -> &str {
        &self.connector
    }
}

#[derive(Debug, Default)]
struct SimulatedState {
    connectors: Vec<ConnectorDescriptor>,
    selected: Option<String>,
    connected: bool,
    accounts: Vec<String>,
    current: usize,
    network: String,
    /// Upcoming `has_connector` calls that fail
    connector_failures: u32,
    /// Upcoming `current_account` calls that fail
    account_failures: u32,
    /// Upcoming `get_wallet` calls that fail
    wallet_failures: u32,
    connect_error: Option<ProviderError>,
    disconnect_error: Option<ProviderError>,
    /// Latency applied to upcoming `get_wallet` calls, one entry per call
    wallet_delays: VecDeque<Duration>,
    calls: CallCounts,
}

/// In-memory provider with scriptable behaviour
pub struct SimulatedProvider {
    state: Mutex<SimulatedState>,
    events: broadcast::Sender<ProviderEvent>,
}

impl SimulatedProvider {
    /// Create a provider with no connectors, one random account and no authorization.
    ///
    /// # Arguments
    /// * `event_buffer` - Capacity of the lifecycle event channel.
    pub fn new(event_buffer: usize) -> Self {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        let state = SimulatedState {
            accounts: vec![Self::random_address()],
            network: "testnet".to_string(),
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
            events,
        }
    }

    /// A random 32-byte address in `0x`-prefixed hex.
    pub fn random_address() -> String {
        let mut bytes = [0u8; 32];
        rand::rng().fill(&mut bytes);
        format!("0x{}", hex::encode(bytes))
    }

    /// Builder that registers the requested connectors on this shared instance.
    pub fn builder(self: &Arc<Self>) -> Box<dyn ProviderBuilder> {
        let provider = self.clone();
        Box::new(
            move |connectors: &[ConnectorDescriptor]| -> Result<Arc<dyn WalletProvider>, ProviderError> {
                provider.register_connectors(connectors);
                Ok(provider.clone() as Arc<dyn WalletProvider>)
            },
        )
    }

    fn state(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Broadcast a lifecycle event.
    pub fn emit(&self, event: ProviderEvent) {
        // No subscribers is not an error for a provider
        let _ = self.events.send(event);
    }

    /// Replace the registered connectors.
    pub fn register_connectors(&self, connectors: &[ConnectorDescriptor]) {
        self.state().connectors = connectors.to_vec();
        self.emit(ProviderEvent::Connectors);
    }

    /// Mark a registered connector as installed or removed.
    pub fn set_connector_installed(&self, name: &str, installed: bool) {
        {
            let mut state = self.state();
            for connector in state.connectors.iter_mut().filter(|c| c.name == name) {
                connector.installed = installed;
            }
        }
        self.emit(ProviderEvent::Connectors);
    }

    /// Authorize or revoke without going through `connect`, as a user would in the wallet UI.
    pub fn set_connected(&self, connected: bool) {
        self.state().connected = connected;
        self.emit(ProviderEvent::Connection);
    }

    /// Add an account and make it the current one.
    pub fn switch_account(&self, address: impl Into<String>) {
        {
            let mut state = self.state();
            state.accounts.push(address.into());
            state.current = state.accounts.len() - 1;
        }
        self.emit(ProviderEvent::Accounts);
        self.emit(ProviderEvent::CurrentAccount);
    }

    /// Switch network; a real provider re-authorizes accounts per network.
    pub fn switch_network(&self, network: impl Into<String>) {
        self.state().network = network.into();
        self.emit(ProviderEvent::CurrentNetwork);
    }

    pub fn network(&self) -> String {
        self.state().network.clone()
    }

    /// Address of the current account, whether or not it is authorized.
    pub fn active_address(&self) -> String {
        let state = self.state();
        state.accounts[state.current].clone()
    }

    pub fn fail_connector_queries(&self, times: u32) {
        self.state().connector_failures = times;
    }

    pub fn fail_account_queries(&self, times: u32) {
        self.state().account_failures = times;
    }

    pub fn fail_wallet_queries(&self, times: u32) {
        self.state().wallet_failures = times;
    }

    pub fn fail_connect_with(&self, error: Option<ProviderError>) {
        self.state().connect_error = error;
    }

    pub fn fail_disconnect_with(&self, error: Option<ProviderError>) {
        self.state().disconnect_error = error;
    }

    /// Delay the next `get_wallet` call by `delay`.
    pub fn delay_next_wallet_query(&self, delay: Duration) {
        self.state().wallet_delays.push_back(delay);
    }

    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }

    pub fn selected_connector(&self) -> Option<String> {
        self.state().selected.clone()
    }
}

#[async_trait::async_trait]
impl WalletProvider for SimulatedProvider {
    async fn has_connector(&self) -> Result<bool, ProviderError> {
        let mut state = self.state();
        state.calls.has_connector += 1;
        if state.connector_failures > 0 {
            state.connector_failures -= 1;
            return Err(ProviderError::Unavailable(
                "connector list unreachable".to_string(),
            ));
        }
        Ok(state.connectors.iter().any(|c| c.installed))
    }

    async fn is_connected(&self) -> Result<bool, ProviderError> {
        let mut state = self.state();
        state.calls.is_connected += 1;
        Ok(state.connected)
    }

    async fn current_account(&self) -> Result<String, ProviderError> {
        let mut state = self.state();
        state.calls.current_account += 1;
        if state.account_failures > 0 {
            state.account_failures -= 1;
            return Err(ProviderError::AccountQuery(
                "wallet did not return an account".to_string(),
            ));
        }
        if !state.connected {
            return Err(ProviderError::AccountQuery("not connected".to_string()));
        }
        Ok(state.accounts[state.current].clone())
    }

    async fn get_wallet(&self, account: &str) -> Result<WalletHandle, ProviderError> {
        let (delay, result) = {
            let mut state = self.state();
            state.calls.get_wallet += 1;
            let delay = state.wallet_delays.pop_front();
            let result = if state.wallet_failures > 0 {
                state.wallet_failures -= 1;
                Err(ProviderError::WalletQuery {
                    account: account.to_string(),
                    reason: "account locked".to_string(),
                })
            } else if !state.accounts.iter().any(|a| a == account) {
                Err(ProviderError::WalletQuery {
                    account: account.to_string(),
                    reason: "unknown account".to_string(),
                })
            } else {
                let connector = state
                    .selected
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CONNECTOR.to_string());
                Ok(Arc::new(SimulatedAccount {
                    address: account.to_string(),
                    connector,
                }) as WalletHandle)
            };
            (delay, result)
        };

        if let Some(delay) = delay {
            debug!("Delaying wallet query for {:?}", delay);
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn select_connector(&self, name: &str) -> Result<bool, ProviderError> {
        let changed = {
            let mut state = self.state();
            state.calls.select_connector += 1;
            if !state.connectors.iter().any(|c| c.name == name) {
                return Ok(false);
            }
            let changed = state.selected.as_deref() != Some(name);
            state.selected = Some(name.to_string());
            changed
        };
        if changed {
            self.emit(ProviderEvent::CurrentConnector);
        }
        Ok(true)
    }

    async fn connect(&self) -> Result<(), ProviderError> {
        {
            let mut state = self.state();
            state.calls.connect += 1;
            if let Some(error) = state.connect_error.clone() {
                return Err(error);
            }
            let selected = state
                .selected
                .clone()
                .unwrap_or_else(|| DEFAULT_CONNECTOR.to_string());
            let installed = state
                .connectors
                .iter()
                .any(|c| c.name == selected && c.installed);
            if !installed {
                return Err(ProviderError::ConnectorNotInstalled(selected));
            }
            state.connected = true;
        }
        self.emit(ProviderEvent::Connection);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        {
            let mut state = self.state();
            state.calls.disconnect += 1;
            if let Some(error) = state.disconnect_error.clone() {
                return Err(error);
            }
            state.connected = false;
        }
        self.emit(ProviderEvent::Connection);
        Ok(())
    }

    fn connectors(&self) -> Vec<ConnectorDescriptor> {
        self.state().connectors.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_address_format() {
        let address = SimulatedProvider::random_address();
        assert!(address.starts_with("0x"));
        assert_eq!(address.len(), 66);
        assert!(hex::decode(&address[2..]).is_ok());
    }

    #[tokio::test]
    async fn test_connect_requires_installed_connector() {
        let provider = SimulatedProvider::new(8);
        provider.register_connectors(&[ConnectorDescriptor::default_connector().not_installed()]);

        assert!(!provider.has_connector().await.unwrap());
        assert_eq!(
            provider.connect().await,
            Err(ProviderError::ConnectorNotInstalled(
                DEFAULT_CONNECTOR.to_string()
            ))
        );
        assert!(!provider.is_connected().await.unwrap());
    }

    #[tokio::test]
    async fn test_connect_emits_connection_event() {
        let provider = SimulatedProvider::new(8);
        provider.register_connectors(&[ConnectorDescriptor::default_connector()]);
        let mut events = provider.subscribe();

        assert!(provider.select_connector(DEFAULT_CONNECTOR).await.unwrap());
        provider.connect().await.unwrap();

        assert_eq!(events.recv().await.unwrap(), ProviderEvent::CurrentConnector);
        assert_eq!(events.recv().await.unwrap(), ProviderEvent::Connection);
        assert_eq!(
            provider.current_account().await.unwrap(),
            provider.active_address()
        );
    }

    #[tokio::test]
    async fn test_scripted_wallet_failures() {
        let provider = SimulatedProvider::new(8);
        provider.set_connected(true);
        provider.fail_wallet_queries(1);
        let account = provider.current_account().await.unwrap();

        assert!(matches!(
            provider.get_wallet(&account).await,
            Err(ProviderError::WalletQuery { .. })
        ));
        let wallet = provider.get_wallet(&account).await.unwrap();
        assert_eq!(wallet.address(), account);
        assert_eq!(provider.calls().get_wallet, 2);
    }

    #[tokio::test]
    async fn test_scripted_connector_failures() {
        let provider = SimulatedProvider::new(8);
        provider.register_connectors(&[ConnectorDescriptor::default_connector()]);
        provider.fail_connector_queries(2);

        for _ in 0..2 {
            assert!(matches!(
                provider.has_connector().await,
                Err(ProviderError::Unavailable(_))
            ));
        }
        assert!(provider.has_connector().await.unwrap());
        assert_eq!(provider.calls().has_connector, 3);
    }

    #[tokio::test]
    async fn test_unknown_connector_is_not_selected() {
        let provider = SimulatedProvider::new(8);
        provider.register_connectors(&[ConnectorDescriptor::default_connector()]);
        assert!(!provider.select_connector("Nope").await.unwrap());
        assert_eq!(provider.selected_connector(), None);
    }
}
