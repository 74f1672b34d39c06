//! User and visit-history endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use super::{bounded, require, success, ApiResult};
use crate::errors::AppError;
use crate::models::{
    CreateHistoryRequest, CreateUserRequest, HistoryEntry, PageParams, Question, User,
};
use crate::store::ActivityStore;
use crate::AppState;

/// Query of `GET /api/users/long-time-lost`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LostUsersQuery {
    #[serde(default)]
    pub days_count: Option<u32>,
    #[serde(default)]
    pub page_number: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

/// GET /api/users
pub async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> ApiResult<Vec<User>> {
    let page = params.page()?;
    success(bounded(&state, "user listing", state.repo.list_users(page)).await?)
}

/// POST /api/users
pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> ApiResult<User> {
    require(&request.id, "id")?;
    let user = bounded(&state, "user create", state.repo.create_user(&request)).await?;
    tracing::info!("Registered user {}", user.id);
    success(user)
}

/// GET /api/users/long-time-lost?daysCount= - Users without a visit for that many days.
pub async fn long_time_lost(
    State(state): State<AppState>,
    Query(query): Query<LostUsersQuery>,
) -> ApiResult<Vec<User>> {
    let page = PageParams {
        page_number: query.page_number,
        page_size: query.page_size,
    }
    .page()?;
    let days = query.days_count.unwrap_or(state.config.inactivity_days);

    success(
        bounded(
            &state,
            "inactive user query",
            state.recorder.find_inactive_users(days, page),
        )
        .await?,
    )
}

/// GET /api/users/{id}/questions
pub async fn list_user_questions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Question>> {
    success(bounded(&state, "question listing", state.repo.list_user_questions(&id)).await?)
}

/// POST /api/users/{id}/history - Record a visit; `null` when it collapsed into the previous one.
pub async fn add_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CreateHistoryRequest>,
) -> ApiResult<Option<HistoryEntry>> {
    success(
        bounded(
            &state,
            "history write",
            state.recorder.record_visit(&id, request.menu_id),
        )
        .await?,
    )
}

/// GET /api/users/{id}/history - Newest first.
pub async fn list_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<PageParams>,
) -> ApiResult<Vec<HistoryEntry>> {
    let page = params.page()?;
    if bounded(&state, "user lookup", state.repo.get_user(&id))
        .await?
        .is_none()
    {
        return Err(AppError::NotFound(format!("User {} not found", id)));
    }
    success(bounded(&state, "history listing", state.repo.list_history(&id, page)).await?)
}

