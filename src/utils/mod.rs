//!
//! Utility module for the wallet connection synchronizer.
//!
//! Re-exports formatting helpers used in log output throughout the codebase.
/// Utility functions for formatting and display
pub mod index;

pub use index::{format_account_id, format_optional_account};
