pub mod cli;
pub mod config;
pub mod database;
pub mod documents;
pub mod identity;
pub mod model;
pub mod repository;
pub mod search;
pub mod storage;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use database::{Database, DbTx, StoreError};
