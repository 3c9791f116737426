//! Family Budget - household budget tracker with cloud backup
//!
//! This library provides the cloud backup subsystem of the Family Budget
//! application: snapshotting the local datastore, packaging it into a
//! versioned archive, transferring it to remote object storage under
//! authentication and entitlement gates, and deriving the status shown to the
//! user from those signals.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Configuration and path management
//! - `error`: Custom error types
//! - `storage`: Atomic file writes and replacement
//! - `audit`: Journal of cloud operations
//! - `backup`: Archive codec, transfer service, scheduler and sync state
//! - `adapters`: Local implementations of the backup collaborators
//! - `cli`: Command handlers for the `family-budget` binary
//!
//! # Example
//!
//! ```rust,ignore
//! use family_budget::adapters::LocalBackend;
//! use family_budget::config::BudgetPaths;
//!
//! let paths = BudgetPaths::new()?;
//! let backend = LocalBackend::open(&paths)?;
//! let state = backend.monitor().refresh().await;
//! println!("{}", state);
//! ```

pub mod adapters;
pub mod audit;
pub mod backup;
pub mod cli;
pub mod config;
pub mod error;
pub mod storage;

#[cfg(test)]
mod testutil;

pub use error::{BudgetError, BudgetResult};
