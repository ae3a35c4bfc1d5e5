use sqlx::{query, query_as};

use super::Page;
use crate::database::{Database, DbTx, StoreError, on_pool, on_tx};
use crate::model::Category;

const SELECT_ONE: &str = r#"
    SELECT id, tenant_id, owner_id, name, description, cover_image, created_at, updated_at
    FROM categories
    WHERE tenant_id = $1 AND id = $2"#;

const SELECT_PAGE: &str = r#"
    SELECT id, tenant_id, owner_id, name, description, cover_image, created_at, updated_at
    FROM categories
    WHERE tenant_id = $1
    ORDER BY name
    LIMIT $2 OFFSET $3"#;

pub async fn insert(tx: &mut DbTx, category: &Category) -> Result<(), StoreError> {
    let stmt = r#"
    INSERT INTO categories (id, tenant_id, owner_id, name, description, cover_image,
                            created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    "#;
    on_tx!(tx, conn => query(stmt)
        .bind(&category.id)
        .bind(&category.tenant_id)
        .bind(&category.owner_id)
        .bind(&category.name)
        .bind(&category.description)
        .bind(&category.cover_image)
        .bind(&category.created_at)
        .bind(&category.updated_at)
        .execute(conn)
        .await
        .map(|_| ()))?;
    Ok(())
}

pub async fn find(
    tx: &mut DbTx,
    tenant_id: &str,
    id: &str,
) -> Result<Option<Category>, StoreError> {
    let category = on_tx!(tx, conn => query_as::<_, Category>(SELECT_ONE)
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(conn)
        .await)?;
    Ok(category)
}

pub async fn update(tx: &mut DbTx, category: &Category) -> Result<(), StoreError> {
    let stmt = r#"
    UPDATE categories
    SET name = $3, description = $4, cover_image = $5, updated_at = $6
    WHERE tenant_id = $1 AND id = $2
    "#;
    let affected = on_tx!(tx, conn => query(stmt)
        .bind(&category.tenant_id)
        .bind(&category.id)
        .bind(&category.name)
        .bind(&category.description)
        .bind(&category.cover_image)
        .bind(&category.updated_at)
        .execute(conn)
        .await
        .map(|r| r.rows_affected()))?;
    if affected == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

pub async fn delete(tx: &mut DbTx, tenant_id: &str, id: &str) -> Result<(), StoreError> {
    let affected = on_tx!(tx, conn => query("DELETE FROM categories WHERE tenant_id = $1 AND id = $2")
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

pub async fn get(db: &Database, tenant_id: &str, id: &str) -> Result<Option<Category>, StoreError> {
    let category = on_pool!(db, conn => query_as::<_, Category>(SELECT_ONE)
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(conn)
        .await)?;
    Ok(category)
}

pub async fn list(db: &Database, tenant_id: &str, page: Page) -> Result<Vec<Category>, StoreError> {
    let categories = on_pool!(db, conn => query_as::<_, Category>(SELECT_PAGE)
        .bind(tenant_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(conn)
        .await)?;
    Ok(categories)
}
