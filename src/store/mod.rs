//! Collaborator seams used by the navigation core.
//!
//! `db::Repository` implements all three store traits against SQLite; tests and
//! alternative deployments can plug their own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{
    Content, ContentRequest, CreateMenuNodeRequest, HistoryEntry, MenuNode, Page, Question,
    Rating, RatingSummary, UpdateMenuNodeRequest, User,
};

/// Persistence for menu nodes and their attached content.
#[async_trait]
pub trait TreeStore: Send + Sync {
    async fn get_node(&self, id: Uuid) -> Result<Option<MenuNode>, AppError>;
    async fn get_node_by_name(&self, name: &str) -> Result<Option<MenuNode>, AppError>;
    async fn get_root(&self) -> Result<Option<MenuNode>, AppError>;
    /// Every node with its content and direct-children names, ordered by name.
    async fn list_all(&self) -> Result<Vec<MenuNode>, AppError>;
    async fn create_node(&self, request: &CreateMenuNodeRequest) -> Result<MenuNode, AppError>;
    async fn update_node(
        &self,
        id: Uuid,
        request: &UpdateMenuNodeRequest,
    ) -> Result<MenuNode, AppError>;
    async fn delete_node(&self, id: Uuid) -> Result<(), AppError>;
    async fn add_content(&self, menu_id: Uuid, request: &ContentRequest)
        -> Result<Content, AppError>;
    async fn update_content(
        &self,
        menu_id: Uuid,
        content_id: Uuid,
        request: &ContentRequest,
    ) -> Result<Content, AppError>;
    async fn delete_content(&self, menu_id: Uuid, content_id: Uuid) -> Result<(), AppError>;
}

/// Persistence for users, ratings and visit history.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError>;
    /// Register the user if unknown; returns the stored record either way.
    async fn ensure_user(&self, user_id: &str) -> Result<User, AppError>;
    async fn upsert_rating(
        &self,
        user_id: &str,
        menu_id: Uuid,
        is_useful: bool,
    ) -> Result<Rating, AppError>;
    async fn get_rating(&self, user_id: &str, menu_id: Uuid) -> Result<Option<Rating>, AppError>;
    async fn summarize_ratings(&self, menu_id: Uuid) -> Result<RatingSummary, AppError>;
    async fn append_history(
        &self,
        user_id: &str,
        menu_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<HistoryEntry, AppError>;
    async fn last_history(&self, user_id: &str) -> Result<Option<HistoryEntry>, AppError>;
    async fn list_history(&self, user_id: &str, page: Page)
        -> Result<Vec<HistoryEntry>, AppError>;
    /// Users whose latest history entry is older than `cutoff`. Users without history are excluded.
    async fn find_inactive(&self, cutoff: DateTime<Utc>, page: Page)
        -> Result<Vec<User>, AppError>;
}

/// Where free-text questions go.
#[async_trait]
pub trait QuestionChannel: Send + Sync {
    async fn submit_question(&self, user_id: &str, text: &str) -> Result<Question, AppError>;
    /// Store the admin answer; a second answer overwrites the first.
    async fn answer_question(&self, question_id: Uuid, answer: &str)
        -> Result<Question, AppError>;
}
