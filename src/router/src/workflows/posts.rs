use api::{CreatePostRequest, UpdatePostRequest};
use async_trait::async_trait;
use common::DbTx;
use common::model::{Post, new_id, now_rfc3339};
use common::repository::{categories, posts, users};
use common::search::PartialUpdate;
use mutation::layout;
use mutation::references::{extract_references, staged_paths};
use mutation::{MutationError, RollbackRegistry, UnitOfWork};

use super::media::{self, Batch};
use super::merge_optional;
use crate::Services;
use crate::validation;

async fn ensure_category(
    tx: &mut DbTx,
    tenant: &str,
    category_id: Option<&str>,
) -> Result<(), MutationError> {
    if let Some(id) = category_id {
        if categories::find(tx, tenant, id).await?.is_none() {
            return Err(MutationError::not_found("Category"));
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct CreatePost {
    services: Services,
    tenant: String,
    id: String,
    request: CreatePostRequest,
}

impl CreatePost {
    pub fn new(services: Services, tenant: impl Into<String>, request: CreatePostRequest) -> Self {
        Self {
            services,
            tenant: tenant.into(),
            id: new_id(),
            request,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl UnitOfWork<DbTx> for CreatePost {
    type Output = Post;

    async fn run(&self, tx: &mut DbTx, rollback: &mut RollbackRegistry) -> Result<Post, MutationError> {
        let request = &self.request;
        validation::required("title", &request.title)?;
        validation::slug("name", &request.name)?;

        let author = users::find(tx, &self.tenant, &request.author_id)
            .await?
            .ok_or_else(|| MutationError::not_found("Author"))?;
        let category_id = validation::non_empty(request.category_id.as_deref());
        ensure_category(tx, &self.tenant, category_id.as_deref()).await?;

        let Services {
            mover,
            search,
            documents,
            urls,
            indexes,
            ..
        } = &self.services;
        let bucket = urls.bucket();

        let references = extract_references(&request.content);
        let cover_prefix = layout::post_cover(&author.id, &self.id);
        let images_prefix = layout::post_images(&author.id, &self.id);
        let [cover, images] = media::move_batches(
            mover,
            [
                Batch::new(
                    "promote-cover",
                    media::staged(request.cover_image.as_deref(), bucket),
                    &cover_prefix,
                ),
                Batch::new("promote-images", staged_paths(&references, bucket), &images_prefix),
            ],
            rollback,
        )
        .await?;

        let now = now_rfc3339();
        let post = Post {
            id: self.id.clone(),
            tenant_id: self.tenant.clone(),
            author_id: author.id,
            category_id,
            title: request.title.trim().to_string(),
            name: request.name.clone(),
            content: media::rewrite_content(&request.content, &references, &images, urls)?,
            cover_image: media::resolve_url(request.cover_image.as_deref(), &cover, urls),
            published: request.published,
            created_at: now.clone(),
            updated_at: now,
        };
        posts::insert(tx, &post).await?;

        search
            .create("index-post", &indexes.posts, post.search_record(), rollback)
            .await?;
        documents
            .write("mirror-post", &post.mirror_path(), &post.mirror_document(), rollback)
            .await?;

        tracing::debug!(post_id = %post.id, images = images.len(), "Post staged for commit");
        Ok(post)
    }
}

#[derive(Debug, Clone)]
pub struct UpdatePost {
    services: Services,
    tenant: String,
    id: String,
    request: UpdatePostRequest,
}

impl UpdatePost {
    pub fn new(
        services: Services,
        tenant: impl Into<String>,
        id: impl Into<String>,
        request: UpdatePostRequest,
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
impl UnitOfWork<DbTx> for UpdatePost {
    type Output = Post;

    async fn run(&self, tx: &mut DbTx, rollback: &mut RollbackRegistry) -> Result<Post, MutationError> {
        let request = &self.request;
        let mut post = posts::find(tx, &self.tenant, &self.id)
            .await?
            .ok_or_else(|| MutationError::not_found("Post"))?;
        let previous = post.clone();

        if let Some(title) = &request.title {
            validation::required("title", title)?;
            post.title = title.trim().to_string();
        }
        if let Some(name) = &request.name {
            validation::slug("name", name)?;
            post.name = name.clone();
        }
        if let Some(published) = request.published {
            post.published = published;
        }
        if request.category_id.is_some() {
            post.category_id = merge_optional(request.category_id.as_deref(), None);
            ensure_category(tx, &self.tenant, post.category_id.as_deref()).await?;
        }
        let content = request.content.clone().unwrap_or(previous.content.clone());
        let cover = merge_optional(request.cover_image.as_deref(), previous.cover_image.clone());

        let Services {
            mover,
            search,
            documents,
            urls,
            indexes,
            ..
        } = &self.services;
        let bucket = urls.bucket();

        let cover_prefix = layout::post_cover(&post.author_id, &post.id);
        let images_prefix = layout::post_images(&post.author_id, &post.id);
        let references = extract_references(&content);

        let stale_cover = match media::placed_under(previous.cover_image.as_deref(), bucket, &cover_prefix) {
            Some(path) if media::placed_under(cover.as_deref(), bucket, &cover_prefix) != Some(path.clone()) => {
                vec![path]
            }
            _ => Vec::new(),
        };
        let stale_images = media::dropped(
            media::placed_paths_under(&extract_references(&previous.content), bucket, &images_prefix),
            &media::placed_paths_under(&references, bucket, &images_prefix),
        );

        let [promoted_cover, promoted_images] = media::move_batches(
            mover,
            [
                Batch::new("promote-cover", media::staged(cover.as_deref(), bucket), &cover_prefix),
                Batch::new("promote-images", staged_paths(&references, bucket), &images_prefix),
            ],
            rollback,
        )
        .await?;
        let promoted = promoted_cover.iter().chain(&promoted_images);
        media::move_batches(
            mover,
            [
                Batch::new("demote-cover", media::not_replaced(stale_cover, promoted.clone()), layout::staging()),
                Batch::new("demote-images", media::not_replaced(stale_images, promoted), layout::staging()),
            ],
            rollback,
        )
        .await?;

        post.content = media::rewrite_content(&content, &references, &promoted_images, urls)?;
        post.cover_image = media::resolve_url(cover.as_deref(), &promoted_cover, urls);
        post.updated_at = now_rfc3339();
        posts::update(tx, &post).await?;

        search
            .update(
                "reindex-post",
                &indexes.posts,
                vec![PartialUpdate::new(post.id.clone(), post.search_record().fields)],
                rollback,
            )
            .await?;
        documents
            .write("mirror-post", &post.mirror_path(), &post.mirror_document(), rollback)
            .await?;
        Ok(post)
    }
}

#[derive(Debug, Clone)]
pub struct DeletePost {
    services: Services,
    tenant: String,
    id: String,
}

impl DeletePost {
    pub fn new(services: Services, tenant: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            services,
            tenant: tenant.into(),
            id: id.into(),
        }
    }
}

#[async_trait]
impl UnitOfWork<DbTx> for DeletePost {
    type Output = ();

    async fn run(&self, tx: &mut DbTx, rollback: &mut RollbackRegistry) -> Result<(), MutationError> {
        let post = posts::find(tx, &self.tenant, &self.id)
            .await?
            .ok_or_else(|| MutationError::not_found("Post"))?;

        let Services {
            mover,
            search,
            documents,
            urls,
            indexes,
            ..
        } = &self.services;
        let bucket = urls.bucket();

        let cover_prefix = layout::post_cover(&post.author_id, &post.id);
        let images_prefix = layout::post_images(&post.author_id, &post.id);
        media::move_batches(
            mover,
            [
                Batch::new(
                    "demote-cover",
                    media::placed_under(post.cover_image.as_deref(), bucket, &cover_prefix)
                        .into_iter()
                        .collect(),
                    layout::staging(),
                ),
                Batch::new(
                    "demote-images",
                    media::placed_paths_under(&extract_references(&post.content), bucket, &images_prefix),
                    layout::staging(),
                ),
            ],
            rollback,
        )
        .await?;

        search
            .delete("unindex-post", &indexes.posts, vec![post.id.clone()], rollback)
            .await?;
        documents
            .remove("remove-mirror", &post.mirror_path(), rollback)
            .await?;
        posts::delete(tx, &self.tenant, &post.id).await?;
        Ok(())
    }
}
