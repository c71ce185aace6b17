//! Connection state synchronizer.
//!
//! This module defines the `ConnectionStateSynchronizer`, which keeps a local snapshot of a wallet
//! provider's connection state and publishes it to observable stores. It builds the provider,
//! routes the provider's lifecycle events to re-syncs, and exposes `connect`/`disconnect`
//! commands that delegate to the provider.
//!
//! The synchronizer is responsible for:
//! - Building the provider with the built-in connector plus any configured connectors
//! - Registering one re-sync handler per lifecycle event kind, exactly once
//! - Re-deriving the snapshot from the provider on every trigger
//! - Retrying failed re-syncs under a bounded backoff policy and reporting terminal failure
//! - Rejecting results of re-syncs that were overtaken by newer ones
//!
//! Every re-sync runs in its own task, so re-syncs triggered by a burst of events overlap. The
//! sequencer makes the overlap harmless: a result is published only if no newer re-sync has
//! published before it.

use crate::config::SyncOptions;
use crate::provider::{
    ProviderBuilder, ProviderError, ProviderEvent, WalletHandle, WalletProvider, connector_list,
};
use crate::utils::{format_account_id, format_optional_account};
use crate::wallet::sync::{
    events::{self, EventDispatcher, ResyncTrigger, TriggerHandler},
    retry::RetryConfig,
    sequencer::{ResyncSequencer, SequenceStats},
    store::{Projection, Store},
};
use crate::wallet::{ConnectionSnapshot, SyncStatus, WalletSyncError};

use chrono::Utc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::{OnceCell, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Provider state observed by one re-sync attempt
enum ProviderState {
    NoConnector,
    Disconnected,
    Connected {
        account: String,
        wallet: WalletHandle,
    },
}

/// Outcome of a whole re-sync, after retries
enum ResyncOutcome {
    Observed(ProviderState),
    Failed {
        attempts: u32,
        error: ProviderError,
    },
}

/// Everything fixed by `initialize`
struct SyncContext {
    provider: Arc<dyn WalletProvider>,
    default_connector: String,
    retry: RetryConfig,
}

/// Keeps a [`ConnectionSnapshot`] consistent with a wallet provider.
///
/// Cloning is cheap and every clone drives the same state. Create one per application (or per
/// test) and hand clones to whatever needs to read or change the connection.
#[derive(Clone)]
pub struct ConnectionStateSynchronizer {
    inner: Arc<SyncInner>,
}

struct SyncInner {
    builder: Box<dyn ProviderBuilder>,
    context: OnceCell<SyncContext>,
    ready: OnceCell<()>,
    /// Failed attempts since the last successful observation, across all re-syncs
    consecutive_failures: AtomicU32,
    snapshot: Store<ConnectionSnapshot>,
    loading: Store<bool>,
    status: Store<SyncStatus>,
    sequencer: ResyncSequencer,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionStateSynchronizer {
    /// Create an uninitialized synchronizer.
    ///
    /// The snapshot starts disconnected and `loading` starts `true`. Nothing talks to a provider
    /// until [`initialize`](Self::initialize) is called.
    pub fn new(builder: Box<dyn ProviderBuilder>) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                builder,
                context: OnceCell::new(),
                ready: OnceCell::new(),
                consecutive_failures: AtomicU32::new(0),
                snapshot: Store::default(),
                loading: Store::new(true),
                status: Store::default(),
                sequencer: ResyncSequencer::new(),
                listener: Mutex::new(None),
            }),
        }
    }

    /// Build the provider, subscribe to its lifecycle events and run the first re-sync.
    ///
    /// Returns once the first re-sync has finished. A call made while another one is still
    /// running waits for it, so no caller sees `Ok` before the state is loaded. The provider and
    /// the event handlers are set up once and the options of later calls are ignored. A builder
    /// failure leaves the synchronizer uninitialized, so a waiting or later call builds again.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn initialize(&self, options: SyncOptions) -> Result<(), WalletSyncError> {
        options.validate()?;

        if self.inner.ready.initialized() {
            warn!("Synchronizer already initialized, ignoring repeated initialize");
            return Ok(());
        }

        let inner = &self.inner;
        let context = inner
            .context
            .get_or_try_init(|| async move { inner.build_context(options) })
            .await?;
        inner
            .ready
            .get_or_init(|| async move {
                inner.start_listener(context);
                info!("Registered re-sync handlers, running initial re-sync");
                inner.resync(ResyncTrigger::Initialize).await;
            })
            .await;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.ready.initialized()
    }

    /// Run one re-sync now and wait for it.
    pub async fn refresh(&self) -> Result<(), WalletSyncError> {
        self.inner.context()?;
        self.inner.resync(ResyncTrigger::Manual).await;
        Ok(())
    }

    /// Select `connector` (or the configured default) and ask it to authorize an account.
    ///
    /// The snapshot is not touched here; the provider's resulting lifecycle events drive the
    /// re-sync. Provider failures are logged and returned unchanged inside
    /// [`WalletSyncError::Connect`].
    pub async fn connect(&self, connector: Option<&str>) -> Result<(), WalletSyncError> {
        let context = self.inner.context()?;
        let name = connector.unwrap_or(context.default_connector.as_str());

        select_connector(context.provider.as_ref(), name)
            .await
            .map_err(|e| e.into_command_error(WalletSyncError::Connect))?;

        info!("Connecting through {}", name);
        context.provider.connect().await.map_err(|e| {
            error!("Failed to connect through {}: {}", name, e);
            WalletSyncError::Connect(e)
        })
    }

    /// Select `connector` (or the configured default) and revoke its authorization.
    ///
    /// Provider failures are logged and returned inside [`WalletSyncError::Disconnect`].
    pub async fn disconnect(&self, connector: Option<&str>) -> Result<(), WalletSyncError> {
        let context = self.inner.context()?;
        let name = connector.unwrap_or(context.default_connector.as_str());

        select_connector(context.provider.as_ref(), name)
            .await
            .map_err(|e| e.into_command_error(WalletSyncError::Disconnect))?;

        info!("Disconnecting from {}", name);
        context.provider.disconnect().await.map_err(|e| {
            error!("Failed to disconnect from {}: {}", name, e);
            WalletSyncError::Disconnect(e)
        })
    }

    /// Stop reacting to provider events. The last snapshot stays readable.
    pub fn shutdown(&self) {
        if let Some(listener) = self.inner.listener().take() {
            listener.abort();
            info!("Stopped provider event listener");
        }
    }

    /// Latest published snapshot.
    pub fn current(&self) -> ConnectionSnapshot {
        self.inner.snapshot.get()
    }

    /// Receiver notified on every published snapshot.
    pub fn snapshot(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.inner.snapshot.subscribe()
    }

    pub fn connected(&self) -> Projection<ConnectionSnapshot, bool> {
        self.inner.snapshot.project(|s| s.connected)
    }

    pub fn account(&self) -> Projection<ConnectionSnapshot, Option<String>> {
        self.inner.snapshot.project(|s| s.current_account.clone())
    }

    pub fn wallet(&self) -> Projection<ConnectionSnapshot, Option<WalletHandle>> {
        self.inner.snapshot.project(|s| s.wallet.clone())
    }

    pub fn provider(&self) -> Projection<ConnectionSnapshot, Option<Arc<dyn WalletProvider>>> {
        self.inner.snapshot.project(|s| s.provider.clone())
    }

    /// `true` until the first re-sync has finished.
    pub fn loading(&self) -> watch::Receiver<bool> {
        self.inner.loading.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.loading.get()
    }

    /// Outcome of the most recently published re-sync.
    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    pub fn sequence_stats(&self) -> SequenceStats {
        self.inner.sequencer.stats()
    }
}

impl SyncInner {
    fn build_context(&self, options: SyncOptions) -> Result<SyncContext, WalletSyncError> {
        let connectors = connector_list(&options.additional_connectors);
        let provider = self.builder.build(&connectors).inspect_err(|e| {
            error!("Failed to build wallet provider: {}", e);
        })?;
        info!(
            "Created wallet provider with connectors: {}",
            connectors
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(SyncContext {
            provider,
            default_connector: options.default_connector,
            retry: options.retry,
        })
    }

    /// Route the re-sync trigger events to spawned re-syncs.
    ///
    /// Runs before the first re-sync so no event between the two is missed.
    fn start_listener(self: &Arc<Self>, context: &SyncContext) {
        let provider_events = context.provider.subscribe();
        let handler: Arc<dyn TriggerHandler> = Arc::new(ResyncSpawner {
            inner: Arc::downgrade(self),
        });
        let mut dispatcher = EventDispatcher::new();
        for event in ProviderEvent::RESYNC_TRIGGERS {
            dispatcher.on(event, handler.clone());
        }
        let listener = tokio::spawn(events::listen(provider_events, dispatcher));
        if let Some(previous) = self.listener().replace(listener) {
            previous.abort();
        }
    }

    fn context(&self) -> Result<&SyncContext, WalletSyncError> {
        self.context.get().ok_or(WalletSyncError::NotInitialized)
    }

    fn listener(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Re-derive the snapshot from the provider and publish it unless it was overtaken.
    async fn resync(&self, trigger: ResyncTrigger) {
        let Ok(context) = self.context() else {
            warn!("Ignoring re-sync ({}) before initialization", trigger);
            return;
        };
        if matches!(trigger, ResyncTrigger::Manual) {
            // An explicit refresh gets a fresh retry budget
            self.consecutive_failures.store(0, Ordering::SeqCst);
        }
        let ticket = self.sequencer.next_ticket();
        debug!("Starting re-sync #{} ({})", ticket, trigger);

        let outcome = observe_with_retry(context, &self.consecutive_failures, ticket).await;
        self.publish(ticket, context, outcome);
    }

    fn publish(&self, ticket: u64, context: &SyncContext, outcome: ResyncOutcome) {
        let published = self.snapshot.set_if(|current| {
            if !self.sequencer.try_accept(ticket) {
                return false;
            }

            let (mut next, status) = match outcome {
                ResyncOutcome::Observed(ProviderState::NoConnector) => {
                    (current.without_connector(), SyncStatus::NoConnector)
                }
                ResyncOutcome::Observed(ProviderState::Disconnected) => (
                    ConnectionSnapshot::disconnected(true, context.provider.clone()),
                    SyncStatus::Ready,
                ),
                ResyncOutcome::Observed(ProviderState::Connected { account, wallet }) => (
                    ConnectionSnapshot::connected(account, wallet, context.provider.clone()),
                    SyncStatus::Ready,
                ),
                ResyncOutcome::Failed { attempts, error } => {
                    let error = WalletSyncError::RetriesExhausted {
                        attempts,
                        last_error: error,
                    };
                    error!("Re-sync #{} gave up: {}", ticket, error);
                    (
                        ConnectionSnapshot::disconnected(
                            current.has_connector,
                            context.provider.clone(),
                        ),
                        SyncStatus::Failed {
                            error: error.to_string(),
                        },
                    )
                }
            };
            next.provider = Some(context.provider.clone());
            next.synced_at = Some(Utc::now());
            next.sequence = ticket;
            *current = next;

            // Updated under the snapshot lock so status and snapshot never disagree
            self.status.set(status);
            self.loading.set_if_changed(false);
            true
        });

        if published {
            let snapshot = self.snapshot.get();
            info!(
                "Published re-sync #{}: connected={}, account={}, has_connector={}",
                ticket,
                snapshot.connected,
                format_optional_account(snapshot.current_account.as_deref()),
                snapshot.has_connector
            );
        }
    }
}

impl Drop for SyncInner {
    fn drop(&mut self) {
        if let Some(listener) = self.listener().take() {
            listener.abort();
        }
    }
}

/// Spawns a re-sync for every trigger it receives.
///
/// Holds the synchronizer weakly: the listener task must not keep it alive.
struct ResyncSpawner {
    inner: Weak<SyncInner>,
}

impl TriggerHandler for ResyncSpawner {
    fn handle(&self, trigger: ResyncTrigger) {
        let Some(inner) = self.inner.upgrade() else {
            debug!("Synchronizer dropped, ignoring {}", trigger);
            return;
        };
        tokio::spawn(async move {
            inner.resync(trigger).await;
        });
    }

    fn name(&self) -> &'static str {
        "ResyncSpawner"
    }
}

/// Query the provider until an attempt succeeds or the retry policy gives up.
///
/// Every failed attempt asks the provider to disconnect before the next one, so a wallet stuck
/// in a half-authorized state is reset rather than queried again as is.
///
/// `failures` counts failed attempts across all re-syncs and is reset by the first successful
/// observation. The disconnect of a failed attempt makes the provider emit a Connection event,
/// which starts another re-sync; once `max_attempts` consecutive failures are reached no attempt
/// disconnects or retries any more, so those events cannot keep re-syncs alive.
async fn observe_with_retry(
    context: &SyncContext,
    failures: &AtomicU32,
    ticket: u64,
) -> ResyncOutcome {
    let provider = &context.provider;
    let max_attempts = context.retry.max_attempts;
    let attempts = AtomicU32::new(0);

    let result = backoff::future::retry_notify(
        context.retry.backoff(),
        || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let provider = provider.clone();
            async move {
                match observe(provider.as_ref()).await {
                    Ok(state) => {
                        failures.store(0, Ordering::SeqCst);
                        Ok(state)
                    }
                    Err(e) => {
                        let failed = record_failure(failures);
                        error!(
                            "Re-sync #{} attempt {}/{} failed ({} consecutive): {}",
                            ticket, attempt, max_attempts, failed, e
                        );
                        if attempt >= max_attempts || failed >= max_attempts {
                            return Err(backoff::Error::permanent(e));
                        }
                        if let Err(disconnect_error) = provider.disconnect().await {
                            error!(
                                "Disconnect after failed re-sync #{} failed: {}",
                                ticket, disconnect_error
                            );
                        }
                        Err(backoff::Error::transient(e))
                    }
                }
            }
        },
        |e: ProviderError, delay| {
            let next = ResyncTrigger::Retry {
                attempt: attempts.load(Ordering::SeqCst) + 1,
            };
            warn!("Re-sync #{} {} in {:?} after: {}", ticket, next, delay, e);
        },
    )
    .await;

    match result {
        Ok(state) => ResyncOutcome::Observed(state),
        Err(error) => ResyncOutcome::Failed {
            attempts: attempts.load(Ordering::SeqCst),
            error,
        },
    }
}

/// Count one more failed attempt, returning the new count.
fn record_failure(failures: &AtomicU32) -> u32 {
    let previous = failures
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            Some(n.saturating_add(1))
        })
        .unwrap_or_else(|n| n);
    previous.saturating_add(1)
}

/// One pass over the provider: connector availability, authorization, account, wallet.
async fn observe(provider: &dyn WalletProvider) -> Result<ProviderState, ProviderError> {
    if !provider.has_connector().await? {
        warn!("No wallet connector installed, keeping previous connection state");
        return Ok(ProviderState::NoConnector);
    }

    if !provider.is_connected().await? {
        return Ok(ProviderState::Disconnected);
    }

    let account = provider.current_account().await?;
    let wallet = provider.get_wallet(&account).await?;
    debug!("Obtained wallet for {}", format_account_id(&account));
    Ok(ProviderState::Connected { account, wallet })
}

/// Failure of the connector selection step of a command
enum SelectError {
    NotFound(String),
    Provider(ProviderError),
}

impl SelectError {
    fn into_command_error(self, wrap: fn(ProviderError) -> WalletSyncError) -> WalletSyncError {
        match self {
            SelectError::NotFound(name) => WalletSyncError::ConnectorNotFound(name),
            SelectError::Provider(e) => wrap(e),
        }
    }
}

async fn select_connector(provider: &dyn WalletProvider, name: &str) -> Result<(), SelectError> {
    match provider.select_connector(name).await {
        Ok(true) => Ok(()),
        Ok(false) => {
            error!("Connector {} is not registered with the provider", name);
            Err(SelectError::NotFound(name.to_string()))
        }
        Err(e) => {
            error!("Failed to select connector {}: {}", name, e);
            Err(SelectError::Provider(e))
        }
    }
}
