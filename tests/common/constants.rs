//! Values shared by the end-to-end tests.

use std::time::Duration;

/// Contacts generated by [`super::TestDatabase::prepared`].
pub const SEEDED_CONTACTS: usize = 50;

/// Dump period used by the lifecycle tests.
pub const SHORT_DUMP_PERIOD: Duration = Duration::from_millis(800);

pub const RETENTION_WINDOW_SECS: u32 = 20;

/// Upper bound for a whole run before a test gives up.
pub const RUN_TIMEOUT: Duration = Duration::from_secs(10);
