//! Domain operations on top of `CapacityStore`.
//!
//! Coordinators validate input before touching storage and never hold an
//! in-process lock across a storage round trip; capacity is enforced by the
//! store's row lock.

pub mod chat;
pub mod join;

pub use chat::ChatCoordinator;
pub use join::JoinCoordinator;

use crate::error::CoreError;

/// Trim a required field, failing with `InvalidInput` naming it when empty.
pub(crate) fn required<'a>(value: &'a str, field: &str) -> Result<&'a str, CoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CoreError::invalid(format!("{field} is required")));
    }
    Ok(trimmed)
}
