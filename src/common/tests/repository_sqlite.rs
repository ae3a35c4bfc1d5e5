//! File-backed SQLite tests for transactional repository behaviour.
//!
//! In-memory SQLite shares one connection; these tests use a database file so
//! committed state is observed through a separate pooled connection.

use common::config::DatabaseConfig;
use common::model::{User, now_rfc3339};
use common::repository::users;
use common::{Database, StoreError};

async fn file_database(dir: &tempfile::TempDir) -> Database {
    let config = DatabaseConfig {
        dsn: format!("sqlite://{}/pressroom.db", dir.path().display()),
        ..DatabaseConfig::default()
    };
    Database::connect(&config)
        .await
        .expect("Failed to open file-backed database")
}

fn user(id: &str, username: &str) -> User {
    User {
        id: id.to_string(),
        tenant_id: "t1".to_string(),
        username: username.to_string(),
        display_name: "Ada".to_string(),
        bio: None,
        avatar_url: None,
        password_changed_at: None,
        created_at: now_rfc3339(),
        updated_at: now_rfc3339(),
    }
}

#[tokio::test]
async fn test_rollback_discards_writes() {
    let dir = tempfile::TempDir::new().unwrap();
    let db = file_database(&dir).await;

    let mut tx = db.begin().await.unwrap();
    users::insert(&mut tx, &user("u1", "ada")).await.unwrap();
    tx.rollback().await.unwrap();

    assert!(users::get(&db, "t1", "u1").await.unwrap().is_none());

    let mut tx = db.begin().await.unwrap();
    users::insert(&mut tx, &user("u1", "ada")).await.unwrap();
    tx.commit().await.unwrap();

    assert!(users::get(&db, "t1", "u1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_unique_violation_names_the_table() {
    let dir = tempfile::TempDir::new().unwrap();
    let db = file_database(&dir).await;

    let mut tx = db.begin().await.unwrap();
    users::insert(&mut tx, &user("u1", "ada")).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = db.begin().await.unwrap();
    let err = users::insert(&mut tx, &user("u2", "ada")).await.unwrap_err();
    tx.rollback().await.unwrap();

    match err {
        StoreError::UniqueViolation {
            constraint,
            message,
        } => {
            let hint = constraint.unwrap_or(message).to_lowercase();
            assert!(hint.contains("users"));
            assert!(hint.contains("username"));
        }
        other => panic!("expected a unique violation, got {other:?}"),
    }
}

#[tokio::test]
async fn test_schema_survives_reconnect() {
    let dir = tempfile::TempDir::new().unwrap();
    {
        let db = file_database(&dir).await;
        let mut tx = db.begin().await.unwrap();
        users::insert(&mut tx, &user("u1", "ada")).await.unwrap();
        tx.commit().await.unwrap();
        db.close().await;
    }

    let db = file_database(&dir).await;
    let stored = users::get(&db, "t1", "u1").await.unwrap().unwrap();
    assert_eq!(stored.username, "ada");
}
