use api::{
    ApiError, CategoryResponse, CreateCategoryRequest, ListCategoriesResponse, ListQuery,
    UpdateCategoryRequest,
};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use common::repository::{Page, categories};

use crate::RouterState;
use crate::extract::ApiJson;
use crate::tenant::Tenant;
use crate::workflows::{CreateCategory, DeleteCategory, UpdateCategory};

pub fn router<S: RouterState>() -> Router<S> {
    Router::new()
        .route(
            "/categories",
            get(list_categories::<S>).post(create_category::<S>),
        )
        .route(
            "/categories/:id",
            get(get_category::<S>)
                .put(update_category::<S>)
                .delete(delete_category::<S>),
        )
}

#[tracing::instrument(skip(state))]
pub async fn list_categories<S: RouterState>(
    State(state): State<S>,
    tenant: Tenant,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListCategoriesResponse>, ApiError> {
    let found = categories::list(
        state.database(),
        tenant.as_str(),
        Page::new(query.limit, query.offset),
    )
    .await?;
    Ok(Json(ListCategoriesResponse {
        categories: found.into_iter().map(CategoryResponse::from).collect(),
    }))
}

#[tracing::instrument(skip(state))]
pub async fn get_category<S: RouterState>(
    State(state): State<S>,
    tenant: Tenant,
    Path(id): Path<String>,
) -> Result<Json<CategoryResponse>, ApiError> {
    let category = categories::get(state.database(), tenant.as_str(), &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Category not found"))?;
    Ok(Json(category.into()))
}

#[tracing::instrument(skip(state, request))]
pub async fn create_category<S: RouterState>(
    State(state): State<S>,
    tenant: Tenant,
    ApiJson(request): ApiJson<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<CategoryResponse>), ApiError> {
    let work = CreateCategory::new(state.services().clone(), tenant.into_inner(), request);
    let category = state.orchestrator().execute(&work).await?;
    tracing::info!(category_id = %category.id, "Category created");
    Ok((StatusCode::CREATED, Json(category.into())))
}

#[tracing::instrument(skip(state, request))]
pub async fn update_category<S: RouterState>(
    State(state): State<S>,
    tenant: Tenant,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateCategoryRequest>,
) -> Result<Json<CategoryResponse>, ApiError> {
    let work = UpdateCategory::new(state.services().clone(), tenant.into_inner(), id, request);
    let category = state.orchestrator().execute(&work).await?;
    Ok(Json(category.into()))
}

/// DELETE /categories/:id
///
/// Posts of the category stay and lose their category.
#[tracing::instrument(skip(state))]
pub async fn delete_category<S: RouterState>(
    State(state): State<S>,
    tenant: Tenant,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let work = DeleteCategory::new(state.services().clone(), tenant.into_inner(), id);
    state.orchestrator().execute(&work).await?;
    Ok(StatusCode::NO_CONTENT)
}
