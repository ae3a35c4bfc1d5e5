//! Test configuration builder for creating test setups quickly.

use std::time::Duration;

use crate::config::{Configuration, DatabaseConfig, SearchBackend, StorageConfig};

/// Bucket name used by in-memory test configurations.
pub const TEST_BUCKET: &str = "pressroom-test";

/// Builder for configurations suitable for testing.
///
/// ```rust,ignore
/// use common::testing::TestConfigBuilder;
///
/// let config = TestConfigBuilder::new()
///     .in_memory()
///     .with_default_tenant("acme")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct TestConfigBuilder {
    config: Configuration,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Configuration::default(),
        }
    }

    /// Configure for fully in-memory operation (fastest for tests).
    ///
    /// This sets:
    /// - Storage DSN to `memory://` with public URLs under `https://storage.test/pressroom-test`
    /// - Database DSN to `sqlite::memory:`
    /// - The in-memory search backend
    /// - A short attempt deadline
    pub fn in_memory(mut self) -> Self {
        self.config.storage = StorageConfig {
            dsn: "memory://".to_string(),
            bucket: TEST_BUCKET.to_string(),
            public_url: format!("https://storage.test/{TEST_BUCKET}"),
        };
        self.config.database = DatabaseConfig::in_memory();
        self.config.search.backend = SearchBackend::Memory;
        self.config.mutation.attempt_timeout = Duration::from_secs(2);
        self
    }

    pub fn with_storage_dsn(mut self, dsn: &str) -> Self {
        self.config.storage.dsn = dsn.to_string();
        self
    }

    pub fn with_database_dsn(mut self, dsn: &str) -> Self {
        self.config.database.dsn = dsn.to_string();
        self
    }

    pub fn with_public_url(mut self, public_url: &str) -> Self {
        self.config.storage.public_url = public_url.to_string();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.config.mutation.max_retries = max_retries;
        self
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.config.mutation.attempt_timeout = attempt_timeout;
        self
    }

    pub fn with_default_tenant(mut self, tenant: &str) -> Self {
        self.config.tenants.default_tenant = tenant.to_string();
        self
    }

    /// Configure a file-backed SQLite database and object store in `dir`.
    ///
    /// In-memory SQLite lives on a single connection; use this when a test
    /// needs more than one concurrent transaction.
    pub fn with_data_dir(mut self, dir: &str) -> Self {
        self.config.database.dsn = format!("sqlite://{dir}/pressroom.db");
        self.config.storage.dsn = format!("file://{dir}/objects");
        self
    }

    pub fn build(self) -> Configuration {
        self.config
    }
}
