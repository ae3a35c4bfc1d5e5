//! Row-level access to the relational store.
//!
//! Writes take the open transaction; reads outside a mutation go through the
//! pool. Statements use `$n` placeholders, which both backends accept.

pub mod categories;
pub mod posts;
pub mod users;

/// Paging window for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Page {
    pub const MAX_LIMIT: i64 = 200;

    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        let defaults = Self::default();
        Self {
            limit: limit.unwrap_or(defaults.limit).clamp(1, Self::MAX_LIMIT),
            offset: offset.unwrap_or(defaults.offset).max(0),
        }
    }
}
