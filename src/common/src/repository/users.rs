use sqlx::{query, query_as};

use crate::database::{Database, DbTx, StoreError, on_pool, on_tx};
use crate::model::User;

const SELECT_ONE: &str = r#"
    SELECT id, tenant_id, username, display_name, bio, avatar_url, password_changed_at,
           created_at, updated_at
    FROM users
    WHERE tenant_id = $1 AND id = $2"#;

pub async fn insert(tx: &mut DbTx, user: &User) -> Result<(), StoreError> {
    let stmt = r#"
    INSERT INTO users (id, tenant_id, username, display_name, bio, avatar_url,
                       password_changed_at, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
    "#;
    on_tx!(tx, conn => query(stmt)
        .bind(&user.id)
        .bind(&user.tenant_id)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(&user.bio)
        .bind(&user.avatar_url)
        .bind(&user.password_changed_at)
        .bind(&user.created_at)
        .bind(&user.updated_at)
        .execute(conn)
        .await
        .map(|_| ()))?;
    Ok(())
}

pub async fn find(tx: &mut DbTx, tenant_id: &str, id: &str) -> Result<Option<User>, StoreError> {
    let user = on_tx!(tx, conn => query_as::<_, User>(SELECT_ONE)
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(conn)
        .await)?;
    Ok(user)
}

pub async fn update(tx: &mut DbTx, user: &User) -> Result<(), StoreError> {
    let stmt = r#"
    UPDATE users
    SET username = $3, display_name = $4, bio = $5, avatar_url = $6, updated_at = $7
    WHERE tenant_id = $1 AND id = $2
    "#;
    let affected = on_tx!(tx, conn => query(stmt)
        .bind(&user.tenant_id)
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(&user.bio)
        .bind(&user.avatar_url)
        .bind(&user.updated_at)
        .execute(conn)
        .await
        .map(|r| r.rows_affected()))?;
    if affected == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

/// Bump `updated_at` only.
pub async fn touch(tx: &mut DbTx, tenant_id: &str, id: &str, at: &str) -> Result<(), StoreError> {
    let affected = on_tx!(tx, conn => query("UPDATE users SET updated_at = $3 WHERE tenant_id = $1 AND id = $2")
        .bind(tenant_id)
        .bind(id)
        .bind(at)
        .execute(conn)
        .await
        .map(|r| r.rows_affected()))?;
    if affected == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

pub async fn set_password_changed(
    tx: &mut DbTx,
    tenant_id: &str,
    id: &str,
    at: &str,
) -> Result<(), StoreError> {
    let stmt = r#"
    UPDATE users SET password_changed_at = $3, updated_at = $3
    WHERE tenant_id = $1 AND id = $2
    "#;
    let affected = on_tx!(tx, conn => query(stmt)
        .bind(tenant_id)
        .bind(id)
        .bind(at)
        .execute(conn)
        .await
        .map(|r| r.rows_affected()))?;
    if affected == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

pub async fn delete(tx: &mut DbTx, tenant_id: &str, id: &str) -> Result<(), StoreError> {
    let affected = on_tx!(tx, conn => query("DELETE FROM users WHERE tenant_id = $1 AND id = $2")
        .bind(tenant_id)
        .bind(id)
        .execute(conn)
        .await
        .map(|r| r.rows_affected()))?;
    if affected == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

pub async fn get(db: &Database, tenant_id: &str, id: &str) -> Result<Option<User>, StoreError> {
    let user = on_pool!(db, conn => query_as::<_, User>(SELECT_ONE)
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(conn)
        .await)?;
    Ok(user)
}
