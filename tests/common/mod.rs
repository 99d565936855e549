//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestDatabase, SEEDED_CONTACTS};
//!
//! #[tokio::test]
//! async fn test_seeded() {
//!     let db = TestDatabase::prepared();
//!     assert_eq!(db.store.count().unwrap(), SEEDED_CONTACTS as i64);
//! }
//! ```

mod constants;
mod fixtures;

pub use constants::*;
pub use fixtures::{test_config, TestDatabase};
