use crate::wallet::WalletSyncError;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for re-syncs that hit provider errors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
	/// Attempts per re-sync, including the first one. 1 disables retries.
	pub max_attempts: u32,
	/// Delay before the first retry
	pub initial_interval_ms: u64,
	/// Upper bound for the delay between retries
	pub max_interval_ms: u64,
	/// Growth factor applied to the delay after every retry
	pub multiplier: f64,
	/// Give up once this much time has passed since the first attempt
	pub max_elapsed_ms: u64,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 5,
			initial_interval_ms: 200,
			max_interval_ms: 5_000,
			multiplier: 2.0,
			max_elapsed_ms: 30_000,
		}
	}
}

impl RetryConfig {
	/// Policy that retries immediately, for tests and local providers.
	pub fn immediate(max_attempts: u32) -> Self {
		Self {
			max_attempts,
			initial_interval_ms: 1,
			max_interval_ms: 1,
			multiplier: 1.0,
			max_elapsed_ms: 10_000,
		}
	}

	pub fn validate(&self) -> Result<(), WalletSyncError> {
		if self.max_attempts == 0 {
			return Err(WalletSyncError::Config(
				"retry.max_attempts must be at least 1".to_string(),
			));
		}
		if self.multiplier.is_nan() || self.multiplier < 1.0 {
			return Err(WalletSyncError::Config(format!(
				"retry.multiplier must be >= 1.0, got {}",
				self.multiplier
			)));
		}
		if self.initial_interval_ms > self.max_interval_ms {
			return Err(WalletSyncError::Config(format!(
				"retry.initial_interval_ms ({}) exceeds retry.max_interval_ms ({})",
				self.initial_interval_ms, self.max_interval_ms
			)));
		}
		Ok(())
	}

	/// Backoff schedule for one re-sync.
	pub fn backoff(&self) -> ExponentialBackoff {
		ExponentialBackoffBuilder::new()
			.with_initial_interval(Duration::from_millis(self.initial_interval_ms))
			.with_max_interval(Duration::from_millis(self.max_interval_ms))
			.with_multiplier(self.multiplier)
			.with_max_elapsed_time(Some(Duration::from_millis(self.max_elapsed_ms)))
			.build()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use backoff::backoff::Backoff;

	#[test]
	fn test_default_is_valid() {
		assert!(RetryConfig::default().validate().is_ok());
		assert!(RetryConfig::immediate(3).validate().is_ok());
	}

	#[test]
	fn test_rejects_zero_attempts() {
		let config = RetryConfig {
			max_attempts: 0,
			..Default::default()
		};
		assert!(matches!(
			config.validate(),
			Err(WalletSyncError::Config(_))
		));
	}

	#[test]
	fn test_rejects_shrinking_multiplier() {
		let config = RetryConfig {
			multiplier: 0.5,
			..Default::default()
		};
		assert!(config.validate().is_err());
	}

	#[test]
	fn test_backoff_respects_max_interval() {
		let config = RetryConfig {
			initial_interval_ms: 10,
			max_interval_ms: 20,
			multiplier: 4.0,
			..Default::default()
		};
		let mut backoff = config.backoff();
		for _ in 0..5 {
			let delay = backoff.next_backoff().expect("within max elapsed time");
			// randomization may add up to 50% on top of the capped interval
			assert!(delay <= Duration::from_millis(31));
		}
	}
}
