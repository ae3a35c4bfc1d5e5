//! Units of work behind the mutation endpoints.
//!
//! Each workflow carries everything one mutation needs, including ids
//! generated before the first attempt, so a retried attempt writes to the
//! same places as the one it replaces.

pub mod categories;
pub mod media;
pub mod posts;
pub mod users;

pub use categories::{CreateCategory, DeleteCategory, UpdateCategory};
pub use posts::{CreatePost, DeletePost, UpdatePost};
pub use users::{ChangePassword, CreateUser, DeleteUser, UpdatePrivateProfile, UpdateUser};

/// Resolve an optional text update: absent keeps `current`, blank clears it.
pub(crate) fn merge_optional(update: Option<&str>, current: Option<String>) -> Option<String> {
    match update {
        Some(value) => crate::validation::non_empty(Some(value)),
        None => current,
    }
}
