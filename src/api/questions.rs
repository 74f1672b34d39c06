//! Question inbox endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Deserialize;

use super::{bounded, parse_id, require, success, ApiResult};
use crate::errors::{with_timeout, AppError};
use crate::models::{
    format_timestamp, parse_timestamp, AnswerQuestionRequest, AnsweredQuestion,
    CreateQuestionRequest, PageParams, Question, QuestionFilter, QuestionSortField, SortOrder,
};
use crate::store::QuestionChannel;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionListQuery {
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub sort_by: QuestionSortField,
    #[serde(default)]
    pub sort_order: SortOrder,
    #[serde(default)]
    pub page_number: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

/// GET /api/questions - Filter by creation date, sort by created/updated time.
pub async fn list_questions(
    State(state): State<AppState>,
    Query(query): Query<QuestionListQuery>,
) -> ApiResult<Vec<Question>> {
    let page = PageParams {
        page_number: query.page_number,
        page_size: query.page_size,
    }
    .page()?;

    let filter = QuestionFilter {
        start_date: query
            .start_date
            .as_deref()
            .map(|raw| date_bound(raw, false))
            .transpose()?,
        end_date: query
            .end_date
            .as_deref()
            .map(|raw| date_bound(raw, true))
            .transpose()?,
        sort_by: query.sort_by,
        sort_order: query.sort_order,
    };

    success(bounded(&state, "question listing", state.repo.list_questions(&filter, page)).await?)
}

/// POST /api/questions
pub async fn create_question(
    State(state): State<AppState>,
    Json(request): Json<CreateQuestionRequest>,
) -> ApiResult<Question> {
    require(&request.user_id, "userId")?;
    require(&request.text, "text")?;
    success(
        bounded(
            &state,
            "question submission",
            state.repo.submit_question(&request.user_id, request.text.trim()),
        )
        .await?,
    )
}

/// PUT /api/questions/{id}/answer - Store the answer and push it to the asker.
pub async fn answer_question(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AnswerQuestionRequest>,
) -> ApiResult<AnsweredQuestion> {
    let id = parse_id(&id, "question")?;
    require(&request.admin_answer, "adminAnswer")?;

    let question = bounded(
        &state,
        "answer write",
        state.repo.answer_question(id, &request.admin_answer),
    )
    .await?;

    let message = format!(
        "Answer to your question \"{}\":\n{}",
        question.text, request.admin_answer
    );
    let notified = match with_timeout(
        state.config.upstream_timeout,
        "answer delivery",
        state.notifier.send_text(&question.user_id, &message),
    )
    .await
    {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(
                "Answer to question {} stored but not delivered to {}: {}",
                question.id,
                question.user_id,
                e
            );
            false
        }
    };

    success(AnsweredQuestion { question, notified })
}

/// DELETE /api/questions/{id}
pub async fn delete_question(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    let id = parse_id(&id, "question")?;
    bounded(&state, "question delete", state.repo.delete_question(id)).await?;
    success(())
}

/// Normalize a date filter to the stored timestamp format.
///
/// Accepts RFC 3339 or a bare `YYYY-MM-DD`; a bare end date covers the whole day.
fn date_bound(raw: &str, end_of_day: bool) -> Result<String, AppError> {
    if let Some(at) = parse_timestamp(raw) {
        return Ok(format_timestamp(at));
    }

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("Invalid date: {}", raw)))?;
    let time = if end_of_day {
        NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    }
    .ok_or_else(|| AppError::Internal("Invalid time of day".to_string()))?;

    Ok(format_timestamp(Utc.from_utc_datetime(&date.and_time(time))))
}
