use std::sync::Arc;

use anyhow::Context;
use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use common::Database;
use common::config::{Configuration, SearchConfig};
use common::documents::{DocumentStore, ObjectStoreDocuments};
use common::identity::{IdentityProvider, InMemoryIdentityProvider};
use common::search::{SearchIndex, create_search_index};
use common::storage::{PublicUrls, create_object_store};
use mutation::{CompensationJournal, DocumentSync, ObjectMover, Orchestrator, RetryPolicy, SearchSync};
use object_store::ObjectStore;
use tower_http::trace::TraceLayer;

pub mod endpoints;
pub mod extract;
pub mod tenant;
pub mod validation;
pub mod workflows;

/// Names of the search indexes entities are mirrored into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexNames {
    pub posts: String,
    pub categories: String,
    pub users: String,
}

impl From<&SearchConfig> for IndexNames {
    fn from(config: &SearchConfig) -> Self {
        Self {
            posts: config.posts_index.clone(),
            categories: config.categories_index.clone(),
            users: config.users_index.clone(),
        }
    }
}

/// Clients of the systems a mutation writes to besides the relational store.
#[derive(Debug, Clone)]
pub struct Services {
    pub mover: ObjectMover,
    pub search: SearchSync,
    pub documents: DocumentSync,
    pub identity: Arc<dyn IdentityProvider>,
    pub urls: PublicUrls,
    pub indexes: IndexNames,
}

impl Services {
    pub fn new(
        config: &Configuration,
        objects: Arc<dyn ObjectStore>,
        search: Arc<dyn SearchIndex>,
        documents: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            mover: ObjectMover::new(objects),
            search: SearchSync::new(search),
            documents: DocumentSync::new(documents),
            identity,
            urls: PublicUrls::from_config(&config.storage),
            indexes: IndexNames::from(&config.search),
        }
    }
}

pub trait RouterState: std::fmt::Debug + Clone + Send + Sync + 'static {
    fn config(&self) -> &Configuration;
    fn database(&self) -> &Database;
    fn orchestrator(&self) -> &Orchestrator<Database>;
    fn services(&self) -> &Services;
}

/// Shared state of the route handlers
#[derive(Debug, Clone)]
pub struct AppState {
    config: Arc<Configuration>,
    database: Database,
    orchestrator: Orchestrator<Database>,
    services: Services,
}

impl AppState {
    pub fn new(config: Configuration, database: Database, services: Services) -> Self {
        let orchestrator =
            Orchestrator::new(database.clone(), RetryPolicy::from(&config.mutation));
        Self {
            config: Arc::new(config),
            database,
            orchestrator,
            services,
        }
    }

    /// Connect every client named by the configuration.
    pub async fn from_config(config: Configuration) -> anyhow::Result<Self> {
        let database = Database::connect(&config.database)
            .await
            .context("Failed to connect to the database")?;

        let objects =
            create_object_store(&config.storage).context("Failed to open object storage")?;
        log::info!("Object storage ready at {}", config.storage.dsn);

        let search =
            create_search_index(&config.search).context("Failed to create search index client")?;
        log::info!("Search index backend: {:?}", config.search.backend);

        let documents: Arc<dyn DocumentStore> =
            Arc::new(ObjectStoreDocuments::new(objects.clone()));
        let identity: Arc<dyn IdentityProvider> = Arc::new(InMemoryIdentityProvider::new());

        let services = Services::new(&config, objects, search, documents, identity);
        Ok(Self::new(config, database, services))
    }

    pub fn with_journal(mut self, journal: Arc<dyn CompensationJournal>) -> Self {
        self.orchestrator = self.orchestrator.with_journal(journal);
        self
    }
}

impl RouterState for AppState {
    fn config(&self) -> &Configuration {
        &self.config
    }

    fn database(&self) -> &Database {
        &self.database
    }

    fn orchestrator(&self) -> &Orchestrator<Database> {
        &self.orchestrator
    }

    fn services(&self) -> &Services {
        &self.services
    }
}

/// Create a new router instance with all routes configured
pub fn create_router<S: RouterState>(state: S) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", endpoints::router::<S>())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Basic health check endpoint
pub(crate) async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}
