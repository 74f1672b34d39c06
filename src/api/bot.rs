//! Navigation endpoints driven by the chat-bot front end.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use super::{require, success, ApiResult};
use crate::menu::NavResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    /// Token from a previously rendered action
    pub action: String,
}

#[derive(Debug, Deserialize)]
pub struct QuestionTextRequest {
    pub text: String,
}

/// POST /api/bot/{user_id}/start
pub async fn bot_start(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<NavResponse> {
    require(&user_id, "userId")?;
    success(state.navigator.start(&user_id).await?)
}

/// POST /api/bot/{user_id}/action
pub async fn bot_action(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<ActionRequest>,
) -> ApiResult<NavResponse> {
    success(
        state
            .navigator
            .handle_selection(&user_id, &request.action)
            .await?,
    )
}

/// POST /api/bot/{user_id}/question - Free text typed while a question is being captured.
pub async fn bot_question(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<QuestionTextRequest>,
) -> ApiResult<NavResponse> {
    success(
        state
            .navigator
            .submit_question_text(&user_id, &request.text)
            .await?,
    )
}
