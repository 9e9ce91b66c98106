//! User endpoints

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
};
use tracing::debug;

use crate::api::state::AppState;
use crate::api::types::{
    ApiError, CreateUserRequest, CreatedUserResponse, Json, ListUsersQuery, UpdateUserRequest,
    UserResponse,
};
use crate::domain::UserId;

/// POST /users
pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    debug!(nickname = %request.nickname, "Creating user");

    let id = state
        .user_service
        .create(&state.cancellation(), request.into())
        .await
        .map_err(ApiError::from)?;

    let location = format!("/users/{}", id);

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(CreatedUserResponse { id }),
    ))
}

/// GET /users/{id}
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    debug!(id = %id, "Getting user");

    let user = state
        .user_service
        .get(&state.cancellation(), &UserId::new(id))
        .await
        .map_err(ApiError::from)?;

    Ok(Json(UserResponse::from(user)))
}

/// PUT /users/{id}
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<StatusCode, ApiError> {
    debug!(id = %id, "Updating user");

    let changes = state
        .user_service
        .update(&state.cancellation(), &UserId::new(id), request.into())
        .await
        .map_err(ApiError::from)?;

    debug!(changed = changes.len(), "User updated");
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /users/{id}
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    debug!(id = %id, "Deleting user");

    state
        .user_service
        .delete(&state.cancellation(), &UserId::new(id))
        .await
        .map_err(ApiError::from)?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /users?limit=&offset=
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let page = query.page();
    debug!(limit = page.limit(), offset = page.offset(), "Listing users");

    let users = state
        .user_service
        .list(&state.cancellation(), page)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}
