use api::{CreateCategoryRequest, UpdateCategoryRequest};
use async_trait::async_trait;
use common::DbTx;
use common::model::{Category, new_id, now_rfc3339};
use common::repository::{categories, posts, users};
use common::search::{Fields, PartialUpdate};
use mutation::layout;
use mutation::{MutationError, RollbackRegistry, UnitOfWork};
use serde_json::Value;

use super::media;
use super::merge_optional;
use crate::Services;
use crate::validation;

#[derive(Debug, Clone)]
pub struct CreateCategory {
    services: Services,
    tenant: String,
    id: String,
    request: CreateCategoryRequest,
}

impl CreateCategory {
    pub fn new(services: Services, tenant: impl Into<String>, request: CreateCategoryRequest) -> Self {
        Self {
            services,
            tenant: tenant.into(),
            id: new_id(),
            request,
        }
    }
}

#[async_trait]
impl UnitOfWork<DbTx> for CreateCategory {
    type Output = Category;

    async fn run(
        &self,
        tx: &mut DbTx,
        rollback: &mut RollbackRegistry,
    ) -> Result<Category, MutationError> {
        let request = &self.request;
        validation::required("name", &request.name)?;
        let owner = users::find(tx, &self.tenant, &request.owner_id)
            .await?
            .ok_or_else(|| MutationError::not_found("Owner"))?;

        let services = &self.services;
        let bucket = services.urls.bucket();
        let cover = services
            .mover
            .relocate(
                "promote-cover",
                &media::staged(request.cover_image.as_deref(), bucket),
                &layout::category_cover(&owner.id, &self.id),
                rollback,
            )
            .await?;

        let now = now_rfc3339();
        let category = Category {
            id: self.id.clone(),
            tenant_id: self.tenant.clone(),
            owner_id: owner.id,
            name: request.name.trim().to_string(),
            description: validation::non_empty(request.description.as_deref()),
            cover_image: media::resolve_url(request.cover_image.as_deref(), &cover, &services.urls),
            created_at: now.clone(),
            updated_at: now,
        };
        categories::insert(tx, &category).await?;

        services
            .search
            .create(
                "index-category",
                &services.indexes.categories,
                category.search_record(),
                rollback,
            )
            .await?;
        Ok(category)
    }
}

#[derive(Debug, Clone)]
pub struct UpdateCategory {
    services: Services,
    tenant: String,
    id: String,
    request: UpdateCategoryRequest,
}

impl UpdateCategory {
    pub fn new(
        services: Services,
        tenant: impl Into<String>,
        id: impl Into<String>,
        request: UpdateCategoryRequest,
    ) -> Self {
        Self {
            services,
            tenant: tenant.into(),
            id: id.into(),
            request,
        }
    }
}

#[async_trait]
impl UnitOfWork<DbTx> for UpdateCategory {
    type Output = Category;

    async fn run(
        &self,
        tx: &mut DbTx,
        rollback: &mut RollbackRegistry,
    ) -> Result<Category, MutationError> {
        let request = &self.request;
        let mut category = categories::find(tx, &self.tenant, &self.id)
            .await?
            .ok_or_else(|| MutationError::not_found("Category"))?;

        if let Some(name) = &request.name {
            validation::required("name", name)?;
            category.name = name.trim().to_string();
        }
        category.description =
            merge_optional(request.description.as_deref(), category.description.take());

        let services = &self.services;
        let bucket = services.urls.bucket();
        let prefix = layout::category_cover(&category.owner_id, &category.id);
        let cover = merge_optional(request.cover_image.as_deref(), category.cover_image.clone());
        let stale = match media::placed_under(category.cover_image.as_deref(), bucket, &prefix) {
            Some(path) if media::placed_under(cover.as_deref(), bucket, &prefix).as_ref() != Some(&path) => {
                vec![path]
            }
            _ => Vec::new(),
        };

        let promoted = services
            .mover
            .relocate("promote-cover", &media::staged(cover.as_deref(), bucket), &prefix, rollback)
            .await?;
        services
            .mover
            .relocate(
                "demote-cover",
                &media::not_replaced(stale, &promoted),
                &layout::staging(),
                rollback,
            )
            .await?;

        category.cover_image = media::resolve_url(cover.as_deref(), &promoted, &services.urls);
        category.updated_at = now_rfc3339();
        categories::update(tx, &category).await?;

        services
            .search
            .update(
                "reindex-category",
                &services.indexes.categories,
                vec![PartialUpdate::new(
                    category.id.clone(),
                    category.search_record().fields,
                )],
                rollback,
            )
            .await?;
        Ok(category)
    }
}

/// Deletes a category and detaches its posts.
#[derive(Debug, Clone)]
pub struct DeleteCategory {
    services: Services,
    tenant: String,
    id: String,
}

impl DeleteCategory {
    pub fn new(services: Services, tenant: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            services,
            tenant: tenant.into(),
            id: id.into(),
        }
    }
}

#[async_trait]
impl UnitOfWork<DbTx> for DeleteCategory {
    type Output = ();

    async fn run(&self, tx: &mut DbTx, rollback: &mut RollbackRegistry) -> Result<(), MutationError> {
        let category = categories::find(tx, &self.tenant, &self.id)
            .await?
            .ok_or_else(|| MutationError::not_found("Category"))?;

        let services = &self.services;
        let bucket = services.urls.bucket();
        let prefix = layout::category_cover(&category.owner_id, &category.id);
        services
            .mover
            .relocate(
                "demote-cover",
                &media::placed_under(category.cover_image.as_deref(), bucket, &prefix)
                    .into_iter()
                    .collect::<Vec<_>>(),
                &layout::staging(),
                rollback,
            )
            .await?;

        let now = now_rfc3339();
        let detached = posts::detach_category(tx, &self.tenant, &category.id, &now).await?;
        let updates = detached
            .into_iter()
            .map(|post_id| {
                let mut fields = Fields::new();
                fields.insert("categoryId".to_string(), Value::Null);
                fields.insert("updatedAt".to_string(), Value::String(now.clone()));
                PartialUpdate::new(post_id, fields)
            })
            .collect();
        services
            .search
            .update("detach-posts", &services.indexes.posts, updates, rollback)
            .await?;

        services
            .search
            .delete(
                "unindex-category",
                &services.indexes.categories,
                vec![category.id.clone()],
                rollback,
            )
            .await?;
        categories::delete(tx, &self.tenant, &category.id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RouterState;
    use crate::test_support::test_app;
    use crate::workflows::{CreatePost, CreateUser};
    use api::{CreatePostRequest, CreateUserRequest};
    use mutation::{DuplicateField, ErrorKind};

    #[tokio::test]
    async fn test_delete_detaches_posts() {
        let app = test_app().await;
        let services = app.state.services().clone();
        let orchestrator = app.state.orchestrator();

        let owner = orchestrator
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
        let category = orchestrator
            .execute(&CreateCategory::new(
                services.clone(),
                "default",
                CreateCategoryRequest {
                    owner_id: owner.id.clone(),
                    name: "News".into(),
                    description: Some("Daily news".into()),
                    cover_image: None,
                },
            ))
            .await
            .unwrap();
        let post = orchestrator
            .execute(&CreatePost::new(
                services.clone(),
                "default",
                CreatePostRequest {
                    author_id: owner.id.clone(),
                    category_id: Some(category.id.clone()),
                    title: "Hello".into(),
                    name: "hello".into(),
                    content: String::new(),
                    cover_image: None,
                    published: true,
                },
            ))
            .await
            .unwrap();
        assert_eq!(
            app.search.get("posts", &post.id).await.unwrap().fields["categoryId"],
            Value::String(category.id.clone())
        );

        orchestrator
            .execute(&DeleteCategory::new(services, "default", category.id.clone()))
            .await
            .unwrap();

        let stored = posts::get(app.state.database(), "default", &post.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.category_id, None);
        assert!(app.search.get("posts", &post.id).await.unwrap().fields["categoryId"].is_null());
        assert!(app.search.get("categories", &category.id).await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_is_a_conflict() {
        let app = test_app().await;
        let services = app.state.services().clone();
        let orchestrator = app.state.orchestrator();
        let owner = orchestrator
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

        let request = CreateCategoryRequest {
            owner_id: owner.id,
            name: "News".into(),
            description: None,
            cover_image: None,
        };
        orchestrator
            .execute(&CreateCategory::new(services.clone(), "default", request.clone()))
            .await
            .unwrap();
        let err = orchestrator
            .execute(&CreateCategory::new(services, "default", request))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::DuplicateConflict(DuplicateField::CategoryName));
        assert_eq!(app.search.len("categories").await, 1);
    }
}
