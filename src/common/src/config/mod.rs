use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Data source name (PostgreSQL or SQLite DSN)
    pub dsn: String,
    /// Upper bound of pooled connections
    pub max_connections: u32,
    /// Maximum time to wait for a pooled connection before a transaction can begin
    #[serde(with = "humantime_serde")]
    pub max_wait: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("sqlite://.data/pressroom.db"),
            max_connections: 10,
            max_wait: Duration::from_secs(4),
        }
    }
}

impl DatabaseConfig {
    /// Create an in-memory database configuration for monolithic mode
    pub fn in_memory() -> Self {
        Self {
            dsn: String::from("sqlite::memory:"),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Object store DSN (`memory://`, `file:///path`, `s3://host/bucket`)
    pub dsn: String,
    /// Bucket identifier used to recognise URLs served from our own storage
    pub bucket: String,
    /// Base URL objects are publicly served from
    pub public_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("file:///.data/objects"),
            bucket: String::from("pressroom-media"),
            public_url: String::from("https://storage.example.com/pressroom-media"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackend {
    Memory,
    Meilisearch,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    pub backend: SearchBackend,
    /// Base URL of the search service (ignored by the memory backend)
    pub url: String,
    pub api_key: String,
    pub posts_index: String,
    pub categories_index: String,
    pub users_index: String,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend: SearchBackend::Memory,
            url: String::from("http://localhost:7700"),
            api_key: String::new(),
            posts_index: String::from("posts"),
            categories_index: String::from("categories"),
            users_index: String::from("users"),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Retry and deadline policy for orchestrated mutations
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MutationConfig {
    /// Number of attempts before a transient failure is surfaced
    pub max_retries: u32,
    /// Deadline for a single attempt, side effects included
    #[serde(with = "humantime_serde")]
    pub attempt_timeout: Duration,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: String::from("0.0.0.0"),
            port: 3000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TenantsConfig {
    /// Tenant used when a request carries no `x-tenant-id` header
    pub default_tenant: String,
}

impl Default for TenantsConfig {
    fn default() -> Self {
        Self {
            default_tenant: String::from("default"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Configuration {
    /// Relational database configuration
    pub database: DatabaseConfig,
    /// Object storage configuration
    pub storage: StorageConfig,
    /// Search index configuration
    pub search: SearchConfig,
    /// Mutation retry policy
    pub mutation: MutationConfig,
    /// HTTP listener
    pub http: HttpConfig,
    /// Tenant resolution
    pub tenants: TenantsConfig,
}

impl Configuration {
    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Configuration::default()))
    }

    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config = Self::figment()
            .merge(Toml::file("pressroom.toml"))
            .merge(Env::prefixed("PRESSROOM__").split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        let config = Self::figment()
            .merge(Toml::file(path))
            .merge(Env::prefixed("PRESSROOM__").split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }
}
