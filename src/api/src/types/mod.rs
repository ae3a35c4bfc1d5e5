use serde::{Deserialize, Serialize};

pub mod categories;
pub mod error;
pub mod posts;
pub mod users;

/// Query parameters of list endpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// Only posts of this category
    pub category_id: Option<String>,
}
