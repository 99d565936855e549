//! Specific background job implementations.

pub mod contacts_dump;
pub mod phone_updater;

pub use contacts_dump::ContactsDumpJob;
pub use phone_updater::PhoneUpdaterJob;
