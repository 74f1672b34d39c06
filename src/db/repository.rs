//! Database repository for CRUD operations.
//!
//! Uses prepared statements and transactions for data integrity.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{
    format_timestamp, now_timestamp, Content, ContentRequest, ContentType, CreateMenuNodeRequest,
    CreateUserRequest, HistoryEntry, MenuNode, Page, Question, QuestionFilter, Rating,
    RatingSummary, UpdateMenuNodeRequest, User,
};
use crate::store::{ActivityStore, QuestionChannel, TreeStore};

const NODE_COLUMNS: &str = "id, parent_id, name, text, subscription_type";
const CONTENT_COLUMNS: &str = "id, menu_id, content_type, server_path, created_at, updated_at";
const QUESTION_COLUMNS: &str = "id, user_id, text, admin_answer, created_at, updated_at";

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== MENU OPERATIONS ====================

    async fn load_node(&self, row: &sqlx::sqlite::SqliteRow) -> Result<MenuNode, AppError> {
        let mut node = node_from_row(row);

        let content_rows = sqlx::query(&format!(
            "SELECT {} FROM contents WHERE menu_id = ? ORDER BY created_at, id",
            CONTENT_COLUMNS
        ))
        .bind(node.id.to_string())
        .fetch_all(&self.pool)
        .await?;
        node.content = content_rows.iter().filter_map(content_from_row).collect();

        node.children_names =
            sqlx::query_scalar("SELECT name FROM menu_nodes WHERE parent_id = ? ORDER BY name")
                .bind(node.id.to_string())
                .fetch_all(&self.pool)
                .await?;

        Ok(node)
    }

    async fn node_exists(&self, id: Uuid) -> Result<bool, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM menu_nodes WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn name_taken(&self, name: &str, except: Option<Uuid>) -> Result<bool, AppError> {
        let owner: Option<String> = sqlx::query_scalar("SELECT id FROM menu_nodes WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match (owner, except) {
            (Some(owner), Some(except)) => owner != except.to_string(),
            (Some(_), None) => true,
            (None, _) => false,
        })
    }

    async fn parent_of(&self, id: Uuid) -> Result<Option<Uuid>, AppError> {
        let parent: Option<Option<String>> =
            sqlx::query_scalar("SELECT parent_id FROM menu_nodes WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        Ok(parent.flatten().and_then(|p| Uuid::parse_str(&p).ok()))
    }

    /// Whether `candidate` is `node` itself or one of its descendants.
    async fn is_in_subtree(&self, node: Uuid, candidate: Uuid) -> Result<bool, AppError> {
        let mut current = Some(candidate);
        let mut hops = 0usize;
        while let Some(id) = current {
            if id == node {
                return Ok(true);
            }
            hops += 1;
            if hops > 10_000 {
                return Err(AppError::Internal(format!(
                    "Parent chain of {} does not terminate",
                    candidate
                )));
            }
            current = self.parent_of(id).await?;
        }
        Ok(false)
    }

    async fn get_content(&self, content_id: Uuid) -> Result<Option<Content>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM contents WHERE id = ?",
            CONTENT_COLUMNS
        ))
        .bind(content_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().and_then(content_from_row))
    }

    // ==================== USER OPERATIONS ====================

    /// List users ordered by phone number.
    pub async fn list_users(&self, page: Page) -> Result<Vec<User>, AppError> {
        let rows = sqlx::query(
            "SELECT id, phone_number, created_at, updated_at FROM users ORDER BY phone_number, id LIMIT ? OFFSET ?",
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(user_from_row).collect())
    }

    /// Register a new user.
    pub async fn create_user(&self, request: &CreateUserRequest) -> Result<User, AppError> {
        if self.get_user(&request.id).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "User {} already exists",
                request.id
            )));
        }

        let now = now_timestamp();
        sqlx::query(
            "INSERT INTO users (id, phone_number, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&request.id)
        .bind(&request.phone_number)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(User {
            id: request.id.clone(),
            phone_number: request.phone_number.clone(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    // ==================== QUESTION OPERATIONS ====================

    /// Get a question by ID.
    pub async fn get_question(&self, id: Uuid) -> Result<Option<Question>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM questions WHERE id = ?",
            QUESTION_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(question_from_row))
    }

    /// All questions of one user, newest first.
    pub async fn list_user_questions(&self, user_id: &str) -> Result<Vec<Question>, AppError> {
        if self.get_user(user_id).await?.is_none() {
            return Err(AppError::NotFound(format!("User {} not found", user_id)));
        }

        let rows = sqlx::query(&format!(
            "SELECT {} FROM questions WHERE user_id = ? ORDER BY created_at DESC",
            QUESTION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(question_from_row).collect())
    }

    /// Questions filtered by creation date and sorted by the requested column.
    pub async fn list_questions(
        &self,
        filter: &QuestionFilter,
        page: Page,
    ) -> Result<Vec<Question>, AppError> {
        // Column and direction come from closed enums, never from raw input
        let sql = format!(
            "SELECT {} FROM questions
             WHERE (? IS NULL OR created_at >= ?) AND (? IS NULL OR created_at <= ?)
             ORDER BY {} {}, id LIMIT ? OFFSET ?",
            QUESTION_COLUMNS,
            filter.sort_by.column(),
            filter.sort_order.keyword()
        );

        let rows = sqlx::query(&sql)
            .bind(&filter.start_date)
            .bind(&filter.start_date)
            .bind(&filter.end_date)
            .bind(&filter.end_date)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(question_from_row).collect())
    }

    /// Delete a question.
    pub async fn delete_question(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM questions WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Question {} not found", id)));
        }
        Ok(())
    }

    // ==================== RATING OPERATIONS ====================

    /// Every vote cast for a node, most recent first.
    pub async fn list_ratings(&self, menu_id: Uuid, page: Page) -> Result<Vec<Rating>, AppError> {
        if !self.node_exists(menu_id).await? {
            return Err(AppError::NotFound(format!("Menu node {} not found", menu_id)));
        }

        let rows = sqlx::query(
            "SELECT user_id, menu_id, is_useful, created_at, updated_at FROM ratings WHERE menu_id = ? ORDER BY updated_at DESC, user_id LIMIT ? OFFSET ?",
        )
        .bind(menu_id.to_string())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(rating_from_row).collect())
    }
}

#[async_trait]
impl TreeStore for Repository {
    async fn get_node(&self, id: Uuid) -> Result<Option<MenuNode>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM menu_nodes WHERE id = ?", NODE_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.load_node(&row).await?)),
            None => Ok(None),
        }
    }

    async fn get_node_by_name(&self, name: &str) -> Result<Option<MenuNode>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM menu_nodes WHERE name = ?",
            NODE_COLUMNS
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.load_node(&row).await?)),
            None => Ok(None),
        }
    }

    async fn get_root(&self) -> Result<Option<MenuNode>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM menu_nodes WHERE parent_id IS NULL ORDER BY name",
            NODE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        if rows.len() > 1 {
            tracing::warn!(
                "Menu has {} root nodes; using the first by name",
                rows.len()
            );
        }

        match rows.first() {
            Some(row) => Ok(Some(self.load_node(row).await?)),
            None => Ok(None),
        }
    }

    async fn list_all(&self) -> Result<Vec<MenuNode>, AppError> {
        let node_rows = sqlx::query(&format!(
            "SELECT {} FROM menu_nodes ORDER BY name",
            NODE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        let content_rows = sqlx::query(&format!(
            "SELECT {} FROM contents ORDER BY created_at, id",
            CONTENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut nodes: Vec<MenuNode> = node_rows.iter().map(node_from_row).collect();

        let mut content_by_node: HashMap<Uuid, Vec<Content>> = HashMap::new();
        for content in content_rows.iter().filter_map(content_from_row) {
            content_by_node
                .entry(content.menu_id)
                .or_default()
                .push(content);
        }

        // Nodes are sorted by name, so children names come out sorted too
        let mut children_by_parent: HashMap<Uuid, Vec<String>> = HashMap::new();
        for node in &nodes {
            if let Some(parent_id) = node.parent_id {
                children_by_parent
                    .entry(parent_id)
                    .or_default()
                    .push(node.name.clone());
            }
        }

        for node in &mut nodes {
            node.content = content_by_node.remove(&node.id).unwrap_or_default();
            node.children_names = children_by_parent.remove(&node.id).unwrap_or_default();
        }

        Ok(nodes)
    }

    async fn create_node(&self, request: &CreateMenuNodeRequest) -> Result<MenuNode, AppError> {
        match request.parent_id {
            Some(parent_id) => {
                if !self.node_exists(parent_id).await? {
                    return Err(AppError::Validation(
                        "Parent menu node not found".to_string(),
                    ));
                }
            }
            None => {
                let roots: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM menu_nodes WHERE parent_id IS NULL")
                        .fetch_one(&self.pool)
                        .await?;
                if roots > 0 {
                    return Err(AppError::Conflict(
                        "The menu already has a root node".to_string(),
                    ));
                }
            }
        }

        if self.name_taken(&request.name, None).await? {
            return Err(AppError::Conflict(
                "Node with the same name already exists".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO menu_nodes (id, parent_id, name, text, subscription_type) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(request.parent_id.map(|p| p.to_string()))
        .bind(&request.name)
        .bind(&request.text)
        .bind(&request.subscription_type)
        .execute(&self.pool)
        .await?;

        Ok(MenuNode {
            id,
            parent_id: request.parent_id,
            name: request.name.clone(),
            text: request.text.clone(),
            subscription_type: request.subscription_type.clone(),
            content: Vec::new(),
            children_names: Vec::new(),
        })
    }

    async fn update_node(
        &self,
        id: Uuid,
        request: &UpdateMenuNodeRequest,
    ) -> Result<MenuNode, AppError> {
        let existing = self
            .get_node(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Menu node not found".to_string()))?;

        if let Some(parent_id) = request.parent_id {
            if !self.node_exists(parent_id).await? {
                return Err(AppError::Validation(
                    "Parent menu node not found".to_string(),
                ));
            }
            if self.is_in_subtree(id, parent_id).await? {
                return Err(AppError::Validation(
                    "A menu node cannot be moved under itself".to_string(),
                ));
            }
        }

        if let Some(name) = &request.name {
            if self.name_taken(name, Some(id)).await? {
                return Err(AppError::Conflict(
                    "Node with the same name already exists".to_string(),
                ));
            }
        }

        let parent_id = request.parent_id.or(existing.parent_id);
        let name = request.name.clone().unwrap_or(existing.name);
        let text = request.text.clone().or(existing.text);
        let subscription_type = request
            .subscription_type
            .clone()
            .or(existing.subscription_type);

        sqlx::query(
            "UPDATE menu_nodes SET parent_id = ?, name = ?, text = ?, subscription_type = ? WHERE id = ?",
        )
        .bind(parent_id.map(|p| p.to_string()))
        .bind(&name)
        .bind(&text)
        .bind(&subscription_type)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(MenuNode {
            id,
            parent_id,
            name,
            text,
            subscription_type,
            content: existing.content,
            children_names: existing.children_names,
        })
    }

    /// Leaves only: content and ratings go with the node, history keeps the row.
    async fn delete_node(&self, id: Uuid) -> Result<(), AppError> {
        if !self.node_exists(id).await? {
            return Err(AppError::NotFound("Menu node not found".to_string()));
        }

        let children: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM menu_nodes WHERE parent_id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        if children > 0 {
            return Err(AppError::Conflict(format!(
                "Menu node has {} child node(s); delete or move them first",
                children
            )));
        }

        sqlx::query("DELETE FROM menu_nodes WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn add_content(
        &self,
        menu_id: Uuid,
        request: &ContentRequest,
    ) -> Result<Content, AppError> {
        if !self.node_exists(menu_id).await? {
            return Err(AppError::NotFound("Menu node not found".to_string()));
        }

        let id = Uuid::new_v4();
        let now = now_timestamp();
        sqlx::query(
            "INSERT INTO contents (id, menu_id, content_type, server_path, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(menu_id.to_string())
        .bind(request.content_type.as_str())
        .bind(&request.server_path)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(Content {
            id,
            menu_id,
            content_type: request.content_type,
            server_path: request.server_path.clone(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    async fn update_content(
        &self,
        menu_id: Uuid,
        content_id: Uuid,
        request: &ContentRequest,
    ) -> Result<Content, AppError> {
        let existing = self
            .get_content(content_id)
            .await?
            .filter(|c| c.menu_id == menu_id)
            .ok_or_else(|| AppError::NotFound("Content not found".to_string()))?;

        let now = now_timestamp();
        sqlx::query(
            "UPDATE contents SET content_type = ?, server_path = ?, updated_at = ? WHERE id = ?",
        )
        .bind(request.content_type.as_str())
        .bind(&request.server_path)
        .bind(&now)
        .bind(content_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(Content {
            content_type: request.content_type,
            server_path: request.server_path.clone(),
            updated_at: now,
            ..existing
        })
    }

    async fn delete_content(&self, menu_id: Uuid, content_id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM contents WHERE id = ? AND menu_id = ?")
            .bind(content_id.to_string())
            .bind(menu_id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Content not found".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ActivityStore for Repository {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query(
            "SELECT id, phone_number, created_at, updated_at FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn ensure_user(&self, user_id: &str) -> Result<User, AppError> {
        let now = now_timestamp();
        sqlx::query(
            "INSERT OR IGNORE INTO users (id, phone_number, created_at, updated_at) VALUES (?, NULL, ?, ?)",
        )
        .bind(user_id)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get_user(user_id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("User {} vanished after insert", user_id)))
    }

    async fn upsert_rating(
        &self,
        user_id: &str,
        menu_id: Uuid,
        is_useful: bool,
    ) -> Result<Rating, AppError> {
        if self.get_user(user_id).await?.is_none() {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        if !self.node_exists(menu_id).await? {
            return Err(AppError::NotFound("Menu node not found".to_string()));
        }

        let now = now_timestamp();
        sqlx::query(
            r#"INSERT INTO ratings (user_id, menu_id, is_useful, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT (user_id, menu_id)
               DO UPDATE SET is_useful = excluded.is_useful, updated_at = excluded.updated_at"#,
        )
        .bind(user_id)
        .bind(menu_id.to_string())
        .bind(is_useful as i32)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get_rating(user_id, menu_id)
            .await?
            .ok_or_else(|| AppError::Internal("Rating vanished after upsert".to_string()))
    }

    async fn get_rating(&self, user_id: &str, menu_id: Uuid) -> Result<Option<Rating>, AppError> {
        let row = sqlx::query(
            "SELECT user_id, menu_id, is_useful, created_at, updated_at FROM ratings WHERE user_id = ? AND menu_id = ?",
        )
        .bind(user_id)
        .bind(menu_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(rating_from_row))
    }

    async fn summarize_ratings(&self, menu_id: Uuid) -> Result<RatingSummary, AppError> {
        if !self.node_exists(menu_id).await? {
            return Err(AppError::NotFound("Menu node not found".to_string()));
        }

        let row = sqlx::query(
            r#"SELECT
                 COALESCE(SUM(CASE WHEN is_useful = 1 THEN 1 ELSE 0 END), 0) AS useful,
                 COALESCE(SUM(CASE WHEN is_useful = 0 THEN 1 ELSE 0 END), 0) AS not_useful
               FROM ratings WHERE menu_id = ?"#,
        )
        .bind(menu_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(RatingSummary {
            menu_id,
            useful: row.get("useful"),
            not_useful: row.get("not_useful"),
        })
    }

    async fn append_history(
        &self,
        user_id: &str,
        menu_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<HistoryEntry, AppError> {
        if self.get_user(user_id).await?.is_none() {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        if !self.node_exists(menu_id).await? {
            return Err(AppError::NotFound("Menu not found".to_string()));
        }

        let id = Uuid::new_v4();
        let action_date = format_timestamp(at);
        sqlx::query("INSERT INTO history (id, user_id, menu_id, action_date) VALUES (?, ?, ?, ?)")
            .bind(id.to_string())
            .bind(user_id)
            .bind(menu_id.to_string())
            .bind(&action_date)
            .execute(&self.pool)
            .await?;

        Ok(HistoryEntry {
            id,
            user_id: user_id.to_string(),
            menu_id: Some(menu_id),
            action_date,
        })
    }

    async fn last_history(&self, user_id: &str) -> Result<Option<HistoryEntry>, AppError> {
        let row = sqlx::query(
            "SELECT id, user_id, menu_id, action_date FROM history WHERE user_id = ? ORDER BY action_date DESC, rowid DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(history_from_row))
    }

    async fn list_history(
        &self,
        user_id: &str,
        page: Page,
    ) -> Result<Vec<HistoryEntry>, AppError> {
        let rows = sqlx::query(
            "SELECT id, user_id, menu_id, action_date FROM history WHERE user_id = ? ORDER BY action_date DESC, rowid DESC LIMIT ? OFFSET ?",
        )
        .bind(user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(history_from_row).collect())
    }

    async fn find_inactive(
        &self,
        cutoff: DateTime<Utc>,
        page: Page,
    ) -> Result<Vec<User>, AppError> {
        let rows = sqlx::query(
            r#"SELECT u.id, u.phone_number, u.created_at, u.updated_at
               FROM users u
               JOIN (
                   SELECT user_id, MAX(action_date) AS last_seen
                   FROM history
                   GROUP BY user_id
               ) h ON h.user_id = u.id
               WHERE h.last_seen < ?
               ORDER BY u.phone_number, u.id
               LIMIT ? OFFSET ?"#,
        )
        .bind(format_timestamp(cutoff))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(user_from_row).collect())
    }
}

#[async_trait]
impl QuestionChannel for Repository {
    async fn submit_question(&self, user_id: &str, text: &str) -> Result<Question, AppError> {
        if self.get_user(user_id).await?.is_none() {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        let id = Uuid::new_v4();
        let now = now_timestamp();
        sqlx::query(
            "INSERT INTO questions (id, user_id, text, admin_answer, created_at, updated_at) VALUES (?, ?, ?, NULL, ?, ?)",
        )
        .bind(id.to_string())
        .bind(user_id)
        .bind(text)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(Question {
            id,
            user_id: user_id.to_string(),
            text: text.to_string(),
            admin_answer: None,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    async fn answer_question(&self, question_id: Uuid, answer: &str) -> Result<Question, AppError> {
        let now = now_timestamp();
        let result = sqlx::query("UPDATE questions SET admin_answer = ?, updated_at = ? WHERE id = ?")
            .bind(answer)
            .bind(&now)
            .bind(question_id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Question not found".to_string()));
        }

        self.get_question(question_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Question not found".to_string()))
    }
}

// Helper functions for row conversion

fn parse_uuid(raw: &str) -> Uuid {
    Uuid::parse_str(raw).unwrap_or_else(|e| {
        tracing::warn!("Malformed id {:?} in database: {}", raw, e);
        Uuid::nil()
    })
}

fn node_from_row(row: &sqlx::sqlite::SqliteRow) -> MenuNode {
    let id: String = row.get("id");
    let parent_id: Option<String> = row.get("parent_id");
    MenuNode {
        id: parse_uuid(&id),
        parent_id: parent_id.as_deref().map(parse_uuid),
        name: row.get("name"),
        text: row.get("text"),
        subscription_type: row.get("subscription_type"),
        content: Vec::new(),
        children_names: Vec::new(),
    }
}

fn content_from_row(row: &sqlx::sqlite::SqliteRow) -> Option<Content> {
    let id: String = row.get("id");
    let menu_id: String = row.get("menu_id");
    let content_type: String = row.get("content_type");
    let Some(content_type) = ContentType::from_str(&content_type) else {
        tracing::warn!("Skipping content {} with unknown type {:?}", id, content_type);
        return None;
    };
    Some(Content {
        id: parse_uuid(&id),
        menu_id: parse_uuid(&menu_id),
        content_type,
        server_path: row.get("server_path"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> User {
    User {
        id: row.get("id"),
        phone_number: row.get("phone_number"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn question_from_row(row: &sqlx::sqlite::SqliteRow) -> Question {
    let id: String = row.get("id");
    Question {
        id: parse_uuid(&id),
        user_id: row.get("user_id"),
        text: row.get("text"),
        admin_answer: row.get("admin_answer"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn history_from_row(row: &sqlx::sqlite::SqliteRow) -> HistoryEntry {
    let id: String = row.get("id");
    let menu_id: Option<String> = row.get("menu_id");
    HistoryEntry {
        id: parse_uuid(&id),
        user_id: row.get("user_id"),
        menu_id: menu_id.as_deref().map(parse_uuid),
        action_date: row.get("action_date"),
    }
}

fn rating_from_row(row: &sqlx::sqlite::SqliteRow) -> Rating {
    let menu_id: String = row.get("menu_id");
    let is_useful: i32 = row.get("is_useful");
    Rating {
        user_id: row.get("user_id"),
        menu_id: parse_uuid(&menu_id),
        is_useful: is_useful != 0,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use chrono::Duration;
    use tempfile::TempDir;

    async fn repo() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("test.sqlite"))
            .await
            .unwrap();
        (Repository::new(pool), temp_dir)
    }

    fn node(parent_id: Option<Uuid>, name: &str) -> CreateMenuNodeRequest {
        CreateMenuNodeRequest {
            parent_id,
            name: name.to_string(),
            text: Some(format!("{} text", name)),
            subscription_type: None,
        }
    }

    #[tokio::test]
    async fn test_second_root_is_rejected() {
        let (repo, _dir) = repo().await;
        repo.create_node(&node(None, "Root")).await.unwrap();
        let err = repo.create_node(&node(None, "Other root")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_duplicate_name_is_rejected() {
        let (repo, _dir) = repo().await;
        let root = repo.create_node(&node(None, "Root")).await.unwrap();
        repo.create_node(&node(Some(root.id), "A")).await.unwrap();
        let err = repo.create_node(&node(Some(root.id), "A")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_unknown_parent_is_rejected() {
        let (repo, _dir) = repo().await;
        let err = repo
            .create_node(&node(Some(Uuid::new_v4()), "Orphan"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_keeps_own_name_and_rejects_cycles() {
        let (repo, _dir) = repo().await;
        let root = repo.create_node(&node(None, "Root")).await.unwrap();
        let a = repo.create_node(&node(Some(root.id), "A")).await.unwrap();
        let b = repo.create_node(&node(Some(a.id), "B")).await.unwrap();

        let renamed = repo
            .update_node(
                a.id,
                &UpdateMenuNodeRequest {
                    name: Some("A".into()),
                    text: Some("new text".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.text.as_deref(), Some("new text"));

        let err = repo
            .update_node(
                a.id,
                &UpdateMenuNodeRequest {
                    parent_id: Some(b.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete_rejects_parents_and_cascades_leaves() {
        let (repo, _dir) = repo().await;
        let root = repo.create_node(&node(None, "Root")).await.unwrap();
        let leaf = repo.create_node(&node(Some(root.id), "Leaf")).await.unwrap();
        repo.add_content(
            leaf.id,
            &ContentRequest {
                content_type: ContentType::Image,
                server_path: "uploaded_content/a.png".into(),
            },
        )
        .await
        .unwrap();
        repo.ensure_user("u1").await.unwrap();
        repo.upsert_rating("u1", leaf.id, true).await.unwrap();
        repo.append_history("u1", leaf.id, Utc::now()).await.unwrap();

        let err = repo.delete_node(root.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        repo.delete_node(leaf.id).await.unwrap();
        assert!(repo.get_node(leaf.id).await.unwrap().is_none());
        assert!(repo.get_rating("u1", leaf.id).await.unwrap().is_none());

        let history = repo.list_history("u1", Page::default()).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].menu_id, None);
    }

    #[tokio::test]
    async fn test_list_all_carries_content_and_children() {
        let (repo, _dir) = repo().await;
        let root = repo.create_node(&node(None, "Root")).await.unwrap();
        repo.create_node(&node(Some(root.id), "Beta")).await.unwrap();
        let alpha = repo.create_node(&node(Some(root.id), "Alpha")).await.unwrap();
        repo.add_content(
            alpha.id,
            &ContentRequest {
                content_type: ContentType::Document,
                server_path: "https://example.org/doc.pdf".into(),
            },
        )
        .await
        .unwrap();

        let all = repo.list_all().await.unwrap();
        let names: Vec<&str> = all.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Beta", "Root"]);

        let root = all.iter().find(|n| n.name == "Root").unwrap();
        assert_eq!(root.children_names, vec!["Alpha", "Beta"]);
        let alpha = all.iter().find(|n| n.name == "Alpha").unwrap();
        assert_eq!(alpha.content.len(), 1);
    }

    #[tokio::test]
    async fn test_find_inactive_excludes_users_without_history() {
        let (repo, _dir) = repo().await;
        let root = repo.create_node(&node(None, "Root")).await.unwrap();
        repo.ensure_user("quiet").await.unwrap();
        repo.ensure_user("never").await.unwrap();
        repo.ensure_user("active").await.unwrap();
        repo.append_history("quiet", root.id, Utc::now() - Duration::days(11))
            .await
            .unwrap();
        repo.append_history("active", root.id, Utc::now() - Duration::days(11))
            .await
            .unwrap();
        repo.append_history("active", root.id, Utc::now())
            .await
            .unwrap();

        let cutoff = Utc::now() - Duration::days(10);
        let users = repo.find_inactive(cutoff, Page::default()).await.unwrap();
        let ids: Vec<&str> = users.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["quiet"]);
    }

    #[tokio::test]
    async fn test_answer_overwrites() {
        let (repo, _dir) = repo().await;
        repo.ensure_user("u1").await.unwrap();
        let q = repo.submit_question("u1", "How?").await.unwrap();
        repo.answer_question(q.id, "Like this").await.unwrap();
        let answered = repo.answer_question(q.id, "Actually, like that").await.unwrap();
        assert_eq!(answered.admin_answer.as_deref(), Some("Actually, like that"));

        let err = repo
            .answer_question(Uuid::new_v4(), "nobody asked")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
