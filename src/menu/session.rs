//! Per-user navigation sessions.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{Content, MenuNode};

/// Where the user is in the conversation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NavState {
    #[default]
    Navigating,
    AwaitingQuestionText,
}

/// What was on screen before question capture started.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScreenSnapshot {
    pub node_id: Option<Uuid>,
    pub children: Vec<String>,
    pub contents: Vec<Content>,
}

/// Transient navigation state of one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NavigationSession {
    pub user_id: String,
    pub state: NavState,
    pub current_node_id: Option<Uuid>,
    /// Pushed on forward navigation, popped on back
    pub ancestors: Vec<Uuid>,
    /// Children names as rendered; child selection is index-based against this list
    pub children: Vec<String>,
    /// Content as rendered; content selection is index-based against this list
    pub contents: Vec<Content>,
    pub rating_shown: bool,
    pub rated: HashSet<Uuid>,
    pub last_history_node_id: Option<Uuid>,
    pub previous: Option<ScreenSnapshot>,
}

impl NavigationSession {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            state: NavState::Navigating,
            current_node_id: None,
            ancestors: Vec::new(),
            children: Vec::new(),
            contents: Vec::new(),
            rating_shown: false,
            rated: HashSet::new(),
            last_history_node_id: None,
            previous: None,
        }
    }

    /// Capture `node` as the displayed screen.
    pub fn show(&mut self, node: &MenuNode) {
        self.state = NavState::Navigating;
        self.current_node_id = Some(node.id);
        self.children = node.children_names.clone();
        self.contents = node.content.clone();
        self.rating_shown = false;
    }

    /// Like [`show`](Self::show) for a redisplay of the same visit; the prompt flag survives.
    pub fn show_keeping_prompt(&mut self, node: &MenuNode) {
        let shown = self.rating_shown;
        self.show(node);
        self.rating_shown = shown;
    }

    pub fn snapshot(&self) -> ScreenSnapshot {
        ScreenSnapshot {
            node_id: self.current_node_id,
            children: self.children.clone(),
            contents: self.contents.clone(),
        }
    }

    /// Put back the screen saved by [`snapshot`](Self::snapshot).
    pub fn restore(&mut self, snapshot: ScreenSnapshot) {
        self.current_node_id = snapshot.node_id;
        self.children = snapshot.children;
        self.contents = snapshot.contents;
    }

    pub fn is_rated(&self, node_id: Uuid) -> bool {
        self.rated.contains(&node_id)
    }
}

/// Storage for navigation sessions, keyed by user id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, user_id: &str) -> Result<Option<NavigationSession>, AppError>;
    /// Last writer wins.
    async fn save(&self, session: NavigationSession) -> Result<(), AppError>;
}

/// Process-local session store with idle expiry.
pub struct InMemorySessionStore {
    ttl: Duration,
    sessions: RwLock<HashMap<String, (Instant, NavigationSession)>>,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Drop every session idle for longer than the TTL. Returns how many went.
    pub async fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, (touched, _)| touched.elapsed() < self.ttl);
        before - sessions.len()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, user_id: &str) -> Result<Option<NavigationSession>, AppError> {
        {
            let sessions = self.sessions.read().await;
            match sessions.get(user_id) {
                Some((touched, session)) if touched.elapsed() < self.ttl => {
                    return Ok(Some(session.clone()))
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }

        tracing::debug!("Session of {} expired", user_id);
        self.sessions.write().await.remove(user_id);
        Ok(None)
    }

    async fn save(&self, session: NavigationSession) -> Result<(), AppError> {
        self.sessions
            .write()
            .await
            .insert(session.user_id.clone(), (Instant::now(), session));
        Ok(())
    }
}
