//! User, question and history models.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chat user, keyed by the messenger's stable identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for registering a user.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub id: String,
    #[serde(default)]
    pub phone_number: Option<String>,
}

/// A free-text question asked from the bot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: Uuid,
    pub user_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_answer: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for submitting a question.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuestionRequest {
    pub user_id: String,
    pub text: String,
}

/// Request body for answering a question.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerQuestionRequest {
    pub admin_answer: String,
}

/// Result of answering a question.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnsweredQuestion {
    pub question: Question,
    /// Whether the answer reached the user through the notification channel
    pub notified: bool,
}

/// Column used to order the question list.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuestionSortField {
    #[default]
    CreatedAt,
    UpdatedAt,
}

impl QuestionSortField {
    pub fn column(&self) -> &'static str {
        match self {
            QuestionSortField::CreatedAt => "created_at",
            QuestionSortField::UpdatedAt => "updated_at",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Filters for the admin question list.
#[derive(Debug, Clone, Default)]
pub struct QuestionFilter {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub sort_by: QuestionSortField,
    pub sort_order: SortOrder,
}

/// A durable record that a user visited a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    pub user_id: String,
    /// Cleared when the visited node is deleted later on
    pub menu_id: Option<Uuid>,
    pub action_date: String,
}

/// Request body for recording a visit from the admin API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateHistoryRequest {
    pub menu_id: Uuid,
}
