use api::{ApiError, CreatePostRequest, ListPostsResponse, ListQuery, PostResponse, UpdatePostRequest};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use common::repository::{Page, posts};

use crate::RouterState;
use crate::extract::ApiJson;
use crate::tenant::Tenant;
use crate::workflows::{CreatePost, DeletePost, UpdatePost};

pub fn router<S: RouterState>() -> Router<S> {
    Router::new()
        .route("/posts", get(list_posts::<S>).post(create_post::<S>))
        .route(
            "/posts/:id",
            get(get_post::<S>).put(update_post::<S>).delete(delete_post::<S>),
        )
}

/// GET /posts
#[tracing::instrument(skip(state))]
pub async fn list_posts<S: RouterState>(
    State(state): State<S>,
    tenant: Tenant,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListPostsResponse>, ApiError> {
    let page = Page::new(query.limit, query.offset);
    let found = posts::list(
        state.database(),
        tenant.as_str(),
        query.category_id.as_deref(),
        page,
    )
    .await?;
    Ok(Json(ListPostsResponse {
        posts: found.into_iter().map(PostResponse::from).collect(),
    }))
}

/// GET /posts/:id
#[tracing::instrument(skip(state))]
pub async fn get_post<S: RouterState>(
    State(state): State<S>,
    tenant: Tenant,
    Path(id): Path<String>,
) -> Result<Json<PostResponse>, ApiError> {
    let post = posts::get(state.database(), tenant.as_str(), &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Post not found"))?;
    Ok(Json(post.into()))
}

/// POST /posts
///
/// Staged cover and markdown images are moved under the post before the
/// row is committed.
#[tracing::instrument(skip(state, request), fields(name = %request.name))]
pub async fn create_post<S: RouterState>(
    State(state): State<S>,
    tenant: Tenant,
    ApiJson(request): ApiJson<CreatePostRequest>,
) -> Result<(StatusCode, Json<PostResponse>), ApiError> {
    let work = CreatePost::new(state.services().clone(), tenant.into_inner(), request);
    let post = state.orchestrator().execute(&work).await?;
    tracing::info!(post_id = %post.id, "Post created");
    Ok((StatusCode::CREATED, Json(post.into())))
}

/// PUT /posts/:id
#[tracing::instrument(skip(state, request))]
pub async fn update_post<S: RouterState>(
    State(state): State<S>,
    tenant: Tenant,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdatePostRequest>,
) -> Result<Json<PostResponse>, ApiError> {
    let work = UpdatePost::new(state.services().clone(), tenant.into_inner(), id, request);
    let post = state.orchestrator().execute(&work).await?;
    Ok(Json(post.into()))
}

/// DELETE /posts/:id
#[tracing::instrument(skip(state))]
pub async fn delete_post<S: RouterState>(
    State(state): State<S>,
    tenant: Tenant,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let work = DeletePost::new(state.services().clone(), tenant.into_inner(), id);
    state.orchestrator().execute(&work).await?;
    Ok(StatusCode::NO_CONTENT)
}
