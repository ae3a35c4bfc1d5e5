use axum::{Router, routing::get};

use crate::RouterState;

pub mod categories;
pub mod posts;
pub mod users;

/// Routes served under `/api/v1`
pub fn router<S: RouterState>() -> Router<S> {
    Router::new()
        .route("/health", get(crate::health_check))
        .merge(posts::router::<S>())
        .merge(categories::router::<S>())
        .merge(users::router::<S>())
}
