use sqlx::{query, query_as, query_scalar};

use super::Page;
use crate::database::{Database, DbTx, StoreError, on_pool, on_tx};
use crate::model::Post;

const SELECT_ONE: &str = r#"
    SELECT id, tenant_id, author_id, category_id, title, name, content, cover_image,
           published, created_at, updated_at
    FROM posts
    WHERE tenant_id = $1 AND id = $2"#;

const SELECT_PAGE: &str = r#"
    SELECT id, tenant_id, author_id, category_id, title, name, content, cover_image,
           published, created_at, updated_at
    FROM posts
    WHERE tenant_id = $1
    ORDER BY created_at DESC, id
    LIMIT $2 OFFSET $3"#;

const SELECT_PAGE_IN_CATEGORY: &str = r#"
    SELECT id, tenant_id, author_id, category_id, title, name, content, cover_image,
           published, created_at, updated_at
    FROM posts
    WHERE tenant_id = $1 AND category_id = $2
    ORDER BY created_at DESC, id
    LIMIT $3 OFFSET $4"#;

pub async fn insert(tx: &mut DbTx, post: &Post) -> Result<(), StoreError> {
    let stmt = r#"
    INSERT INTO posts (id, tenant_id, author_id, category_id, title, name, content,
                       cover_image, published, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
    "#;
    on_tx!(tx, conn => query(stmt)
        .bind(&post.id)
        .bind(&post.tenant_id)
        .bind(&post.author_id)
        .bind(&post.category_id)
        .bind(&post.title)
        .bind(&post.name)
        .bind(&post.content)
        .bind(&post.cover_image)
        .bind(post.published)
        .bind(&post.created_at)
        .bind(&post.updated_at)
        .execute(conn)
        .await
        .map(|_| ()))?;
    Ok(())
}

/// Load a post inside the transaction so the update sees a consistent row.
pub async fn find(tx: &mut DbTx, tenant_id: &str, id: &str) -> Result<Option<Post>, StoreError> {
    let post = on_tx!(tx, conn => query_as::<_, Post>(SELECT_ONE)
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(conn)
        .await)?;
    Ok(post)
}

pub async fn update(tx: &mut DbTx, post: &Post) -> Result<(), StoreError> {
    let stmt = r#"
    UPDATE posts
    SET category_id = $3, title = $4, name = $5, content = $6, cover_image = $7,
        published = $8, updated_at = $9
    WHERE tenant_id = $1 AND id = $2
    "#;
    let affected = on_tx!(tx, conn => query(stmt)
        .bind(&post.tenant_id)
        .bind(&post.id)
        .bind(&post.category_id)
        .bind(&post.title)
        .bind(&post.name)
        .bind(&post.content)
        .bind(&post.cover_image)
        .bind(post.published)
        .bind(&post.updated_at)
        .execute(conn)
        .await
        .map(|r| r.rows_affected()))?;
    if affected == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

pub async fn delete(tx: &mut DbTx, tenant_id: &str, id: &str) -> Result<(), StoreError> {
    let affected = on_tx!(tx, conn => query("DELETE FROM posts WHERE tenant_id = $1 AND id = $2")
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

/// Clear the category of every post in it; returns the ids of the detached posts.
pub async fn detach_category(
    tx: &mut DbTx,
    tenant_id: &str,
    category_id: &str,
    updated_at: &str,
) -> Result<Vec<String>, StoreError> {
    let ids = on_tx!(tx, conn => query_scalar::<_, String>(
        "SELECT id FROM posts WHERE tenant_id = $1 AND category_id = $2 ORDER BY id",
    )
    .bind(tenant_id)
    .bind(category_id)
    .fetch_all(conn)
    .await)?;

    if !ids.is_empty() {
        on_tx!(tx, conn => query(
            "UPDATE posts SET category_id = NULL, updated_at = $3 WHERE tenant_id = $1 AND category_id = $2",
        )
        .bind(tenant_id)
        .bind(category_id)
        .bind(updated_at)
        .execute(conn)
        .await
        .map(|_| ()))?;
    }
    Ok(ids)
}

pub async fn get(db: &Database, tenant_id: &str, id: &str) -> Result<Option<Post>, StoreError> {
    let post = on_pool!(db, conn => query_as::<_, Post>(SELECT_ONE)
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(conn)
        .await)?;
    Ok(post)
}

pub async fn list(
    db: &Database,
    tenant_id: &str,
    category_id: Option<&str>,
    page: Page,
) -> Result<Vec<Post>, StoreError> {
    let posts = match category_id {
        Some(category_id) => on_pool!(db, conn => query_as::<_, Post>(SELECT_PAGE_IN_CATEGORY)
            .bind(tenant_id)
            .bind(category_id)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(conn)
            .await)?,
        None => on_pool!(db, conn => query_as::<_, Post>(SELECT_PAGE)
            .bind(tenant_id)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(conn)
            .await)?,
    };
    Ok(posts)
}
