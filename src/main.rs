use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use wallet_connection_sync::utils::format_optional_account;
use wallet_connection_sync::{
	ConnectionStateSynchronizer, SimulatedProvider, SyncOptions, WalletSyncError,
};

#[tokio::main(flavor = "current_thread")]
async fn main() {
	// Initialize tracing subscriber with debug logging for the synchronizer
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive("wallet_connection_sync=debug".parse().unwrap())
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	let options = match std::env::args().nth(1) {
		Some(path) => match SyncOptions::from_json_file(&path) {
			Ok(options) => {
				info!("Loaded options from {}", path);
				options
			}
			Err(e) => {
				error!("Failed to load options from {}: {}", path, e);
				return;
			}
		},
		None => SyncOptions::default(),
	};

	info!("Starting wallet connection sync demo");

	let simulated = Arc::new(SimulatedProvider::new(options.event_buffer));
	let synchronizer = ConnectionStateSynchronizer::new(simulated.builder());

	// Mirror every published snapshot to the log, as a UI binding would re-render
	let mut snapshots = synchronizer.snapshot();
	let watcher = tokio::spawn(async move {
		while snapshots.changed().await.is_ok() {
			let snapshot = snapshots.borrow_and_update().clone();
			info!(
				"UI sees: connected={}, account={}, has_connector={}",
				snapshot.connected,
				format_optional_account(snapshot.current_account.as_deref()),
				snapshot.has_connector
			);
		}
	});

	if let Err(e) = run_demo(&synchronizer, &simulated, options).await {
		error!("Demo failed: {}", e);
	}

	info!("Sync stats: {}", synchronizer.sequence_stats().summary());
	synchronizer.shutdown();
	watcher.abort();
}

async fn run_demo(
	synchronizer: &ConnectionStateSynchronizer,
	simulated: &SimulatedProvider,
	options: SyncOptions,
) -> Result<(), WalletSyncError> {
	synchronizer.initialize(options).await?;
	info!("Initial state loaded, loading={}", synchronizer.is_loading());

	synchronizer.connect(None).await?;
	settle().await;

	info!("Switching to a second account");
	simulated.switch_account(SimulatedProvider::random_address());
	settle().await;

	info!("Switching network");
	simulated.switch_network("mainnet");
	settle().await;

	info!("Simulating a locked wallet on the next query");
	simulated.fail_wallet_queries(1);
	synchronizer.refresh().await?;
	settle().await;
	info!("Status after recovery: {:?}", *synchronizer.status().borrow());

	info!("Reconnecting");
	synchronizer.connect(None).await?;
	settle().await;

	synchronizer.disconnect(None).await?;
	settle().await;
	Ok(())
}

/// Let spawned re-syncs publish before the next step.
async fn settle() {
	tokio::time::sleep(Duration::from_millis(50)).await;
}
