//! Test utilities for Pressroom.
//!
//! Only available during tests or with the `testing` feature enabled:
//!
//! ```toml
//! [dev-dependencies]
//! common = { path = "../common", features = ["testing"] }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use common::testing::TestConfigBuilder;
//!
//! let config = TestConfigBuilder::new()
//!     .in_memory()
//!     .with_max_retries(1)
//!     .build();
//! ```

mod config_builder;

pub use config_builder::{TEST_BUCKET, TestConfigBuilder};
