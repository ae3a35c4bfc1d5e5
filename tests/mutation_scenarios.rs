//! End-to-end mutation scenarios against fully in-memory collaborators.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use api::{CreatePostRequest, CreateUserRequest};
use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode};
use common::testing::TestConfigBuilder;
use common::search::SearchIndex;
use common::{DbTx, StoreError};
use mutation::{
    CompensationJournal, CompensationReport, MutationError, RollbackRegistry, UnitOfWork,
};
use object_store::{ObjectStore, PutPayload, path::Path as ObjectPath};
use router::workflows::{CreatePost, CreateUser};
use router::{AppState, RouterState, create_router};
use serde_json::{Value, json};
use tower::ServiceExt;

const PUBLIC: &str = "https://storage.test/pressroom-test";

/// Journal that remembers every registration and settlement.
#[derive(Debug, Default)]
struct RecordingJournal {
    registered: Mutex<Vec<String>>,
    settled: Mutex<Vec<CompensationReport>>,
}

impl CompensationJournal for RecordingJournal {
    fn registered(&self, step: &str) {
        self.registered.lock().unwrap().push(step.to_string());
    }

    fn settled(&self, report: &CompensationReport) {
        self.settled.lock().unwrap().push(report.clone());
    }
}

struct Harness {
    state: AppState,
    router: Router,
    objects: Arc<dyn ObjectStore>,
    journal: Arc<RecordingJournal>,
}

async fn harness(config: common::config::Configuration) -> Harness {
    let journal = Arc::new(RecordingJournal::default());
    let state = AppState::from_config(config)
        .await
        .unwrap()
        .with_journal(journal.clone());
    let objects = state.services().mover.store().clone();
    Harness {
        router: create_router(state.clone()),
        state,
        objects,
        journal,
    }
}

async fn send(router: &Router, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn stage(objects: &Arc<dyn ObjectStore>, path: &str) {
    objects
        .put(&ObjectPath::from(path), PutPayload::from_static(b"image"))
        .await
        .unwrap();
}

async fn exists(objects: &Arc<dyn ObjectStore>, path: &str) -> bool {
    objects.head(&ObjectPath::from(path)).await.is_ok()
}

async fn create_author(router: &Router) -> String {
    let (status, user) = send(
        router,
        Method::POST,
        "/api/v1/users",
        json!({"username": "ada", "displayName": "Ada"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    user["id"].as_str().unwrap().to_string()
}

fn new_post(uid: &str) -> Value {
    json!({
        "authorId": uid,
        "title": "Launch notes",
        "name": "launch-notes",
        "content": format!("We shipped.\n\n![screenshot]({PUBLIC}/temp/shot-01.png)\n"),
        "coverImage": format!("{PUBLIC}/temp/hero.webp"),
        "published": true
    })
}

#[tokio::test]
async fn test_create_post_places_images_without_compensation() {
    let h = harness(TestConfigBuilder::new().in_memory().build()).await;
    let uid = create_author(&h.router).await;
    stage(&h.objects, "temp/hero.webp").await;
    stage(&h.objects, "temp/shot-01.png").await;

    let (status, post) = send(&h.router, Method::POST, "/api/v1/posts", new_post(&uid)).await;
    assert_eq!(status, StatusCode::CREATED);

    let id = post["id"].as_str().unwrap();
    let cover = format!("users/{uid}/posts/{id}/cover/hero.webp");
    let image = format!("users/{uid}/posts/{id}/images/shot-01.png");
    assert!(exists(&h.objects, &cover).await);
    assert!(exists(&h.objects, &image).await);
    assert!(!exists(&h.objects, "temp/hero.webp").await);
    assert_eq!(post["coverImage"], format!("{PUBLIC}/{cover}"));
    assert_eq!(
        post["content"],
        format!("We shipped.\n\n![screenshot]({PUBLIC}/{image})\n")
    );

    assert!(h.journal.settled.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_post_name_reverses_both_moves_in_one_attempt() {
    let h = harness(TestConfigBuilder::new().in_memory().build()).await;
    let uid = create_author(&h.router).await;
    stage(&h.objects, "temp/hero.webp").await;
    stage(&h.objects, "temp/shot-01.png").await;
    let (status, _) = send(&h.router, Method::POST, "/api/v1/posts", new_post(&uid)).await;
    assert_eq!(status, StatusCode::CREATED);

    stage(&h.objects, "temp/hero.webp").await;
    stage(&h.objects, "temp/shot-01.png").await;
    h.journal.registered.lock().unwrap().clear();

    let (status, body) = send(&h.router, Method::POST, "/api/v1/posts", new_post(&uid)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["statusCode"], 400);
    assert_eq!(body["code"], "duplicate_post_name");
    assert!(exists(&h.objects, "temp/hero.webp").await);
    assert!(exists(&h.objects, "temp/shot-01.png").await);

    let registered = h.journal.registered.lock().unwrap().clone();
    assert_eq!(registered, vec!["promote-cover", "promote-images"]);
    let settled = h.journal.settled.lock().unwrap();
    assert_eq!(settled.len(), 1);
    assert!(settled[0].is_clean());
    assert_eq!(settled[0].succeeded.len(), 2);
}

#[tokio::test]
async fn test_file_backed_user_avatar() {
    let temp = tempfile::TempDir::new().unwrap();
    let config = TestConfigBuilder::new()
        .in_memory()
        .with_data_dir(temp.path().to_str().unwrap())
        .build();
    let h = harness(config).await;
    stage(&h.objects, "temp/me.png").await;

    let (status, user) = send(
        &h.router,
        Method::POST,
        "/api/v1/users",
        json!({
            "username": "grace",
            "displayName": "Grace",
            "avatarUrl": format!("{PUBLIC}/temp/me.png")
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let uid = user["id"].as_str().unwrap();
    let avatar = format!("users/{uid}/avatar/me.png");
    assert_eq!(user["avatarUrl"], format!("{PUBLIC}/{avatar}"));
    assert!(exists(&h.objects, &avatar).await);
    assert!(!exists(&h.objects, "temp/me.png").await);
}

/// Runs the wrapped work, then fails the first `failures` attempts with a
/// write conflict after every side effect has happened.
struct ConflictAfter<W> {
    inner: W,
    failures: u32,
    runs: AtomicU32,
}

#[async_trait]
impl<W: UnitOfWork<DbTx>> UnitOfWork<DbTx> for ConflictAfter<W> {
    type Output = W::Output;

    async fn run(
        &self,
        tx: &mut DbTx,
        rollback: &mut RollbackRegistry,
    ) -> Result<W::Output, MutationError> {
        let output = self.inner.run(tx, rollback).await?;
        if self.runs.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(StoreError::Conflict("could not serialize access".into()).into());
        }
        Ok(output)
    }
}

#[tokio::test]
async fn test_retried_create_post_leaves_one_set_of_side_effects() {
    let h = harness(TestConfigBuilder::new().in_memory().build()).await;
    let orchestrator = h.state.orchestrator();
    let services = h.state.services().clone();

    let author = orchestrator
        .execute(&CreateUser::new(
            services.clone(),
            "default",
            CreateUserRequest {
                username: "ada".into(),
                display_name: "Ada".into(),
                bio: None,
                avatar_url: None,
            },
        ))
        .await
        .unwrap();
    stage(&h.objects, "temp/hero.webp").await;
    stage(&h.objects, "temp/shot-01.png").await;

    let work = ConflictAfter {
        inner: CreatePost::new(
            services.clone(),
            "default",
            CreatePostRequest {
                author_id: author.id.clone(),
                category_id: None,
                title: "Launch notes".into(),
                name: "launch-notes".into(),
                content: format!("![screenshot]({PUBLIC}/temp/shot-01.png)"),
                cover_image: Some(format!("{PUBLIC}/temp/hero.webp")),
                published: false,
            },
        ),
        failures: 2,
        runs: AtomicU32::new(0),
    };
    let post = orchestrator.execute(&work).await.unwrap();

    assert_eq!(work.runs.load(Ordering::SeqCst), 3);
    assert_eq!(h.journal.settled.lock().unwrap().len(), 2);

    let index = services.search.index();
    let records = index
        .fetch_records("posts", &[post.id.clone()])
        .await
        .unwrap();
    assert_eq!(records.len(), 1);

    let cover = format!("users/{}/posts/{}/cover/hero.webp", author.id, post.id);
    assert!(exists(&h.objects, &cover).await);
    assert!(!exists(&h.objects, "temp/hero.webp").await);
    assert!(!exists(&h.objects, "temp/shot-01.png").await);

    let page = common::repository::posts::list(
        h.state.database(),
        "default",
        None,
        common::repository::Page::default(),
    )
    .await
    .unwrap();
    assert_eq!(page.len(), 1);
}
