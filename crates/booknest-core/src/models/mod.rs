//! Documents as they are stored and as the clients receive them.
//!
//! Field names on the wire follow the existing web client: `_id`,
//! `createdAt`/`updatedAt`, and snake_case everywhere else.

pub mod catalog;
pub mod inbox;
pub mod novel;
pub mod settings;
pub mod social;
pub mod user;

pub use catalog::*;
pub use inbox::*;
pub use novel::*;
pub use settings::*;
pub use social::*;
pub use user::*;

/// Length check on characters rather than bytes.
pub(crate) fn check_len(field: &str, value: &str, max: usize) -> crate::Result<()> {
    if value.chars().count() > max {
        return Err(crate::BookNestError::validation(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(())
}

pub(crate) fn check_required(field: &str, value: &str) -> crate::Result<()> {
    if value.trim().is_empty() {
        return Err(crate::BookNestError::validation(format!("{} is required", field)));
    }
    Ok(())
}
