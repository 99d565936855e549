//! Contact churn library.
//!
//! Keeps a table of synthetic contacts changing on a jittered cadence, audits
//! every phone change inside a bounded retention window and reports the result
//! before shutting everything down.

pub mod background_jobs;
pub mod config;
pub mod contact_store;
pub mod coordinator;
pub mod generator;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use contact_store::{ContactStore, SqliteContactStore};
pub use coordinator::{Coordinator, ShutdownHandle, ShutdownTrigger};
