use api::{
    ApiError, ChangePasswordRequest, CreateUserRequest, UpdateUserRequest, UserResponse,
};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use common::model::private_path;
use common::repository::users;
use serde_json::{Value, json};

use crate::RouterState;
use crate::extract::ApiJson;
use crate::tenant::Tenant;
use crate::workflows::{ChangePassword, CreateUser, DeleteUser, UpdatePrivateProfile, UpdateUser};

pub fn router<S: RouterState>() -> Router<S> {
    Router::new()
        .route("/users", post(create_user::<S>))
        .route(
            "/users/:id",
            get(get_user::<S>).put(update_user::<S>).delete(delete_user::<S>),
        )
        .route("/users/:id/password", put(change_password::<S>))
        .route(
            "/users/:id/private",
            get(get_private_profile::<S>).put(update_private_profile::<S>),
        )
}

#[tracing::instrument(skip(state))]
pub async fn get_user<S: RouterState>(
    State(state): State<S>,
    tenant: Tenant,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = users::get(state.database(), tenant.as_str(), &id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(user.into()))
}

#[tracing::instrument(skip(state, request), fields(username = %request.username))]
pub async fn create_user<S: RouterState>(
    State(state): State<S>,
    tenant: Tenant,
    ApiJson(request): ApiJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let work = CreateUser::new(state.services().clone(), tenant.into_inner(), request);
    let user = state.orchestrator().execute(&work).await?;
    tracing::info!(user_id = %user.id, "User created");
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[tracing::instrument(skip(state, request))]
pub async fn update_user<S: RouterState>(
    State(state): State<S>,
    tenant: Tenant,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let work = UpdateUser::new(state.services().clone(), tenant.into_inner(), id, request);
    let user = state.orchestrator().execute(&work).await?;
    Ok(Json(user.into()))
}

#[tracing::instrument(skip(state))]
pub async fn delete_user<S: RouterState>(
    State(state): State<S>,
    tenant: Tenant,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let work = DeleteUser::new(state.services().clone(), tenant.into_inner(), id);
    state.orchestrator().execute(&work).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /users/:id/password
#[tracing::instrument(skip(state, request))]
pub async fn change_password<S: RouterState>(
    State(state): State<S>,
    tenant: Tenant,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    let work = ChangePassword::new(
        state.services().clone(),
        tenant.into_inner(),
        id,
        request.password,
    );
    state.orchestrator().execute(&work).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /users/:id/private
///
/// A user without a private profile yet gets an empty object.
#[tracing::instrument(skip(state))]
pub async fn get_private_profile<S: RouterState>(
    State(state): State<S>,
    tenant: Tenant,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if users::get(state.database(), tenant.as_str(), &id).await?.is_none() {
        return Err(ApiError::not_found("User not found"));
    }
    let profile = state
        .services()
        .documents
        .store()
        .get_snapshot(&private_path(&id))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to read private profile");
            ApiError::internal()
        })?;
    Ok(Json(profile.unwrap_or_else(|| json!({}))))
}

#[tracing::instrument(skip(state, profile))]
pub async fn update_private_profile<S: RouterState>(
    State(state): State<S>,
    tenant: Tenant,
    Path(id): Path<String>,
    ApiJson(profile): ApiJson<Value>,
) -> Result<Json<Value>, ApiError> {
    let work = UpdatePrivateProfile::new(state.services().clone(), tenant.into_inner(), id, profile);
    let profile = state.orchestrator().execute(&work).await?;
    Ok(Json(profile))
}
