//! Bulk email actions
//!
//! Executes [`EmailAction`](crate::models::EmailAction) values against the
//! provider and mirrors the result into local storage.

mod executor;

pub use executor::{ActionExecutor, ActionOutcome, labels};
