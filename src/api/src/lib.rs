//! Wire types of the Pressroom HTTP API.

pub mod types;

pub use types::categories::*;
pub use types::error::ApiError;
pub use types::posts::*;
pub use types::users::*;
pub use types::ListQuery;
