//! Per-user navigation over the menu tree.
//!
//! Every operation loads the user's session, validates the selection against
//! what was last rendered, mutates a local copy and saves it before returning.
//! A rejected selection returns early and leaves the stored session untouched.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use super::render::{deliver, interpret_selection, render, Command, ContentDelivery, MenuView, Selection};
use super::session::{NavState, NavigationSession, SessionStore};
use crate::errors::{with_timeout, AppError};
use crate::models::MenuNode;
use crate::recorder::Recorder;
use crate::store::{ActivityStore, QuestionChannel, TreeStore};

/// Short status message shown alongside (or instead of) a menu screen.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    AlreadyAtRoot,
    ContentNotFound,
    EnterQuestion,
    QuestionSent,
    QuestionFailed,
    QuestionEmpty,
    RatingSaved,
}

impl Notice {
    pub fn text(&self) -> &'static str {
        match self {
            Notice::AlreadyAtRoot => "You are already at the main menu",
            Notice::ContentNotFound => "Content not found",
            Notice::EnterQuestion => "Please type your question",
            Notice::QuestionSent => "Your question has been sent",
            Notice::QuestionFailed => "Could not send your question, please try again later",
            Notice::QuestionEmpty => "Your question was empty and was not sent",
            Notice::RatingSaved => "Thank you for your feedback",
        }
    }
}

/// What the front end should show after an operation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NavResponse {
    pub state: NavState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<MenuView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<ContentDelivery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<Notice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl NavResponse {
    fn new(state: NavState) -> Self {
        Self {
            state,
            view: None,
            delivery: None,
            notice: None,
            message: None,
        }
    }

    fn with_view(mut self, view: MenuView) -> Self {
        self.view = Some(view);
        self
    }

    fn with_notice(mut self, notice: Notice) -> Self {
        self.notice = Some(notice);
        self.message = Some(notice.text().to_string());
        self
    }
}

pub struct Navigator {
    tree: Arc<dyn TreeStore>,
    activity: Arc<dyn ActivityStore>,
    questions: Arc<dyn QuestionChannel>,
    sessions: Arc<dyn SessionStore>,
    recorder: Arc<Recorder>,
    timeout: Duration,
}

impl Navigator {
    pub fn new(
        tree: Arc<dyn TreeStore>,
        activity: Arc<dyn ActivityStore>,
        questions: Arc<dyn QuestionChannel>,
        sessions: Arc<dyn SessionStore>,
        recorder: Arc<Recorder>,
        timeout: Duration,
    ) -> Self {
        Self {
            tree,
            activity,
            questions,
            sessions,
            recorder,
            timeout,
        }
    }

    /// Register the user if needed and show the root menu.
    pub async fn start(&self, user_id: &str) -> Result<NavResponse, AppError> {
        with_timeout(self.timeout, "user registration", self.activity.ensure_user(user_id))
            .await?;

        let mut session = self.session_or_new(user_id).await?;
        let root = self.root().await?;
        session.ancestors.clear();
        session.previous = None;

        let view = self.enter_node(&mut session, &root).await;
        self.save(session).await?;
        Ok(NavResponse::new(NavState::Navigating).with_view(view))
    }

    pub async fn select_child(&self, user_id: &str, index: usize) -> Result<NavResponse, AppError> {
        let mut session = self.navigating_session(user_id).await?;

        let name = session.children.get(index).cloned().ok_or_else(|| {
            AppError::InvalidSelection(format!(
                "Child index {} out of range ({} children)",
                index,
                session.children.len()
            ))
        })?;

        let node = with_timeout(self.timeout, "node lookup", self.tree.get_node_by_name(&name))
            .await?
            .ok_or_else(|| AppError::InvalidSelection(format!("Menu {:?} no longer exists", name)))?;

        if let Some(current) = session.current_node_id {
            session.ancestors.push(current);
        }
        let view = self.enter_node(&mut session, &node).await;
        self.save(session).await?;
        Ok(NavResponse::new(NavState::Navigating).with_view(view))
    }

    pub async fn select_content(
        &self,
        user_id: &str,
        index: usize,
    ) -> Result<NavResponse, AppError> {
        let session = self.navigating_session(user_id).await?;

        let Some(content) = session.contents.get(index) else {
            tracing::debug!(
                "Content index {} out of range ({} items) for {}",
                index,
                session.contents.len(),
                user_id
            );
            return Ok(NavResponse::new(NavState::Navigating).with_notice(Notice::ContentNotFound));
        };

        let response = match deliver(content) {
            Some(delivery) => {
                tracing::debug!("Delivering {} to {}", content.server_path, user_id);
                NavResponse {
                    delivery: Some(delivery),
                    ..NavResponse::new(NavState::Navigating)
                }
            }
            None => {
                tracing::warn!(
                    "Content {} has unusable path {:?}",
                    content.id,
                    content.server_path
                );
                NavResponse::new(NavState::Navigating).with_notice(Notice::ContentNotFound)
            }
        };

        self.save(session).await?;
        Ok(response)
    }

    /// Pop one level. A stale ancestor sends the user to the root with a cleared stack.
    pub async fn go_back(&self, user_id: &str) -> Result<NavResponse, AppError> {
        let mut session = self.navigating_session(user_id).await?;

        let Some(parent_id) = session.ancestors.pop() else {
            self.save(session).await?;
            return Ok(NavResponse::new(NavState::Navigating).with_notice(Notice::AlreadyAtRoot));
        };

        let node = match with_timeout(self.timeout, "node lookup", self.tree.get_node(parent_id))
            .await?
        {
            Some(node) => node,
            None => {
                tracing::warn!(
                    "Ancestor {} of {} is gone; returning to root",
                    parent_id,
                    user_id
                );
                session.ancestors.clear();
                self.root().await?
            }
        };

        let view = self.enter_node(&mut session, &node).await;
        self.save(session).await?;
        Ok(NavResponse::new(NavState::Navigating).with_view(view))
    }

    /// Back to the root from any state, abandoning a pending question.
    pub async fn go_home(&self, user_id: &str) -> Result<NavResponse, AppError> {
        let Some(mut session) = self.sessions.load(user_id).await? else {
            return self.start(user_id).await;
        };
        let root = self.root().await?;
        session.ancestors.clear();
        session.previous = None;

        let view = self.enter_node(&mut session, &root).await;
        self.save(session).await?;
        Ok(NavResponse::new(NavState::Navigating).with_view(view))
    }

    pub async fn ask_question(&self, user_id: &str) -> Result<NavResponse, AppError> {
        let mut session = self.live_session(user_id).await?;

        if session.state == NavState::Navigating {
            session.previous = Some(session.snapshot());
        }
        session.state = NavState::AwaitingQuestionText;
        self.save(session).await?;

        Ok(NavResponse::new(NavState::AwaitingQuestionText).with_notice(Notice::EnterQuestion))
    }

    /// Forward the typed question and put the previous screen back.
    pub async fn submit_question_text(
        &self,
        user_id: &str,
        text: &str,
    ) -> Result<NavResponse, AppError> {
        let mut session = self.live_session(user_id).await?;
        if session.state != NavState::AwaitingQuestionText {
            return Err(AppError::InvalidSelection(
                "Question text outside of question capture".to_string(),
            ));
        }

        let text = text.trim();
        let submitted = if text.is_empty() {
            tracing::debug!("Empty question text from {}", user_id);
            None
        } else {
            Some(
                with_timeout(
                    self.timeout,
                    "question submission",
                    self.questions.submit_question(user_id, text),
                )
                .await,
            )
        };

        let notice = match submitted {
            None => Notice::QuestionEmpty,
            Some(Ok(question)) => {
                tracing::info!("Question {} submitted by {}", question.id, user_id);
                Notice::QuestionSent
            }
            Some(Err(e)) => {
                tracing::error!("Failed to submit question from {}: {}", user_id, e);
                Notice::QuestionFailed
            }
        };

        session.state = NavState::Navigating;
        if let Some(previous) = session.previous.take() {
            session.restore(previous);
        }

        let view = self.redisplay(&mut session).await?;
        self.save(session).await?;
        Ok(NavResponse::new(NavState::Navigating)
            .with_view(view)
            .with_notice(notice))
    }

    /// Store a vote. Works without a live session; the session, if any, stops prompting.
    pub async fn rate(
        &self,
        user_id: &str,
        node_id: Uuid,
        useful: bool,
    ) -> Result<NavResponse, AppError> {
        with_timeout(
            self.timeout,
            "rating write",
            self.recorder.record_rating(user_id, node_id, useful),
        )
        .await?;

        let state = match self.sessions.load(user_id).await? {
            Some(mut session) => {
                session.rated.insert(node_id);
                if session.current_node_id == Some(node_id) {
                    session.rating_shown = true;
                }
                let state = session.state;
                self.save(session).await?;
                state
            }
            None => NavState::Navigating,
        };

        Ok(NavResponse::new(state).with_notice(Notice::RatingSaved))
    }

    /// Decode an action token and dispatch it.
    pub async fn handle_selection(
        &self,
        user_id: &str,
        token: &str,
    ) -> Result<NavResponse, AppError> {
        let command = match interpret_selection(token) {
            Selection::Command(command) => command,
            Selection::Unrecognized(raw) => {
                return Err(AppError::InvalidSelection(format!(
                    "Unrecognized action {:?}",
                    raw
                )))
            }
        };

        match command {
            Command::Child { index } => self.select_child(user_id, index).await,
            Command::Content { index } => self.select_content(user_id, index).await,
            Command::Back => self.go_back(user_id).await,
            Command::Home => self.go_home(user_id).await,
            Command::AskQuestion => self.ask_question(user_id).await,
            Command::Rate { node_id, useful } => self.rate(user_id, node_id, useful).await,
        }
    }

    /// Make `node` the current screen, record the visit and render it.
    async fn enter_node(&self, session: &mut NavigationSession, node: &MenuNode) -> MenuView {
        session.show(node);

        if session.last_history_node_id != Some(node.id) {
            match with_timeout(
                self.timeout,
                "history write",
                self.recorder.record_visit(&session.user_id, node.id),
            )
            .await
            {
                Ok(_) => session.last_history_node_id = Some(node.id),
                Err(e) => tracing::warn!(
                    "Failed to record visit of {} to {}: {}",
                    session.user_id,
                    node.id,
                    e
                ),
            }
        }

        self.render_with_prompt(session, node).await
    }

    /// Re-render the current node without counting a new visit.
    async fn redisplay(&self, session: &mut NavigationSession) -> Result<MenuView, AppError> {
        let current = match session.current_node_id {
            Some(id) => with_timeout(self.timeout, "node lookup", self.tree.get_node(id)).await?,
            None => None,
        };

        match current {
            Some(node) => {
                session.show_keeping_prompt(&node);
                Ok(self.render_with_prompt(session, &node).await)
            }
            None => {
                session.ancestors.clear();
                let root = self.root().await?;
                Ok(self.enter_node(session, &root).await)
            }
        }
    }

    async fn render_with_prompt(&self, session: &mut NavigationSession, node: &MenuNode) -> MenuView {
        if !node.content.is_empty() && !session.rating_shown && !session.is_rated(node.id) {
            match with_timeout(
                self.timeout,
                "rating lookup",
                self.recorder.has_rated(&session.user_id, node.id),
            )
            .await
            {
                Ok(true) => {
                    session.rated.insert(node.id);
                }
                Ok(false) => {}
                Err(e) => tracing::warn!("Rating lookup failed for {}: {}", session.user_id, e),
            }
        }

        let view = render(node, session, node.is_root());
        if view.rating_prompt.is_some() {
            session.rating_shown = true;
        }
        view
    }

    async fn root(&self) -> Result<MenuNode, AppError> {
        with_timeout(self.timeout, "root lookup", self.tree.get_root())
            .await?
            .ok_or_else(|| AppError::NotFound("Menu has no root".to_string()))
    }

    async fn live_session(&self, user_id: &str) -> Result<NavigationSession, AppError> {
        self.sessions.load(user_id).await?.ok_or_else(|| {
            AppError::InvalidSelection(format!("No live session for {}", user_id))
        })
    }

    async fn navigating_session(&self, user_id: &str) -> Result<NavigationSession, AppError> {
        let session = self.live_session(user_id).await?;
        if session.state != NavState::Navigating {
            return Err(AppError::InvalidSelection(
                "Menu selection while awaiting question text".to_string(),
            ));
        }
        Ok(session)
    }

    async fn session_or_new(&self, user_id: &str) -> Result<NavigationSession, AppError> {
        Ok(self
            .sessions
            .load(user_id)
            .await?
            .unwrap_or_else(|| NavigationSession::new(user_id)))
    }

    async fn save(&self, session: NavigationSession) -> Result<(), AppError> {
        self.sessions.save(session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_database, Repository};
    use crate::menu::session::InMemorySessionStore;
    use crate::models::{ContentRequest, ContentType, CreateMenuNodeRequest, Page};
    use tempfile::TempDir;

    struct Fixture {
        nav: Navigator,
        repo: Arc<Repository>,
        sessions: Arc<InMemorySessionStore>,
        root: Uuid,
        a: Uuid,
        leaf: Uuid,
        _dir: TempDir,
    }

    async fn create(repo: &Repository, parent: Option<Uuid>, name: &str) -> Uuid {
        repo.create_node(&CreateMenuNodeRequest {
            parent_id: parent,
            name: name.to_string(),
            text: Some(format!("{} text", name)),
            subscription_type: None,
        })
        .await
        .unwrap()
        .id
    }

    /// Root -> A -> {A1 (with content), A2}, Root -> B
    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("test.sqlite")).await.unwrap();
        let repo = Arc::new(Repository::new(pool));

        let root = create(&repo, None, "Root").await;
        let a = create(&repo, Some(root), "A").await;
        let leaf = create(&repo, Some(a), "A1").await;
        create(&repo, Some(a), "A2").await;
        create(&repo, Some(root), "B").await;
        repo.add_content(
            leaf,
            &ContentRequest {
                content_type: ContentType::Document,
                server_path: "https://example.org/guide.pdf".into(),
            },
        )
        .await
        .unwrap();

        let sessions = Arc::new(InMemorySessionStore::new(Duration::from_secs(3600)));
        let recorder = Arc::new(Recorder::new(repo.clone(), Duration::from_secs(5)));
        let nav = Navigator::new(
            repo.clone(),
            repo.clone(),
            repo.clone(),
            sessions.clone(),
            recorder,
            Duration::from_secs(5),
        );

        Fixture {
            nav,
            repo,
            sessions,
            root,
            a,
            leaf,
            _dir: dir,
        }
    }

    fn view(response: &NavResponse) -> &MenuView {
        response.view.as_ref().expect("response carries a view")
    }

    #[tokio::test]
    async fn test_start_shows_root() {
        let f = fixture().await;
        let response = f.nav.start("u1").await.unwrap();

        let v = view(&response);
        assert_eq!(v.node_id, f.root);
        assert!(v.is_root);
        let labels: Vec<&str> = v.actions.iter().map(|a| a.label.as_str()).collect();
        assert_eq!(labels, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_home_without_session_registers_user() {
        let f = fixture().await;
        let response = f.nav.go_home("fresh").await.unwrap();

        assert_eq!(view(&response).node_id, f.root);
        assert!(f.repo.get_user("fresh").await.unwrap().is_some());
        let last = f.repo.last_history("fresh").await.unwrap().unwrap();
        assert_eq!(last.menu_id, Some(f.root));
    }

    #[tokio::test]
    async fn test_back_twice_returns_to_root() {
        let f = fixture().await;
        f.nav.start("u1").await.unwrap();
        f.nav.select_child("u1", 0).await.unwrap();
        let leaf = f.nav.select_child("u1", 0).await.unwrap();
        assert_eq!(view(&leaf).node_id, f.leaf);

        let back = f.nav.go_back("u1").await.unwrap();
        assert_eq!(view(&back).node_id, f.a);
        let back = f.nav.go_back("u1").await.unwrap();
        assert_eq!(view(&back).node_id, f.root);

        let session = f.sessions.load("u1").await.unwrap().unwrap();
        assert!(session.ancestors.is_empty());
    }

    #[tokio::test]
    async fn test_back_on_empty_stack_is_a_notice() {
        let f = fixture().await;
        f.nav.start("u1").await.unwrap();
        let before = f.sessions.load("u1").await.unwrap().unwrap();

        let response = f.nav.go_back("u1").await.unwrap();
        assert_eq!(response.notice, Some(Notice::AlreadyAtRoot));
        assert!(response.view.is_none());

        let after = f.sessions.load("u1").await.unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_out_of_range_child_leaves_session_unchanged() {
        let f = fixture().await;
        f.nav.start("u1").await.unwrap();
        let before = f.sessions.load("u1").await.unwrap().unwrap();

        let err = f.nav.select_child("u1", 7).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidSelection(_)));

        let after = f.sessions.load("u1").await.unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_rating_prompt_not_shown_after_rating() {
        let f = fixture().await;
        f.nav.start("u1").await.unwrap();
        f.nav.select_child("u1", 0).await.unwrap();

        let first = f.nav.select_child("u1", 0).await.unwrap();
        let prompt = view(&first).rating_prompt.clone().expect("prompt on first visit");
        assert_eq!(prompt.node_id, f.leaf);

        let rated = f
            .nav
            .handle_selection("u1", &prompt.actions[0].token)
            .await
            .unwrap();
        assert_eq!(rated.notice, Some(Notice::RatingSaved));

        f.nav.go_back("u1").await.unwrap();
        let again = f.nav.select_child("u1", 0).await.unwrap();
        assert!(view(&again).rating_prompt.is_none());
    }

    #[tokio::test]
    async fn test_stored_rating_suppresses_prompt_in_new_session() {
        let f = fixture().await;
        f.repo.ensure_user("u1").await.unwrap();
        f.repo.upsert_rating("u1", f.leaf, true).await.unwrap();

        f.nav.start("u1").await.unwrap();
        f.nav.select_child("u1", 0).await.unwrap();
        let leaf = f.nav.select_child("u1", 0).await.unwrap();
        assert!(view(&leaf).rating_prompt.is_none());
    }

    #[tokio::test]
    async fn test_stale_ancestor_falls_back_to_root() {
        let f = fixture().await;
        f.nav.start("u1").await.unwrap();

        let mut session = f.sessions.load("u1").await.unwrap().unwrap();
        session.ancestors = vec![f.root, Uuid::new_v4()];
        f.sessions.save(session).await.unwrap();

        let response = f.nav.go_back("u1").await.unwrap();
        assert_eq!(view(&response).node_id, f.root);
        let session = f.sessions.load("u1").await.unwrap().unwrap();
        assert!(session.ancestors.is_empty());
    }

    #[tokio::test]
    async fn test_history_once_per_entry() {
        let f = fixture().await;
        f.nav.start("u1").await.unwrap();
        f.nav.start("u1").await.unwrap();
        f.nav.select_child("u1", 0).await.unwrap();
        f.nav.go_back("u1").await.unwrap();

        let history = f.repo.list_history("u1", Page::default()).await.unwrap();
        let visited: Vec<Option<Uuid>> = history.iter().rev().map(|h| h.menu_id).collect();
        assert_eq!(visited, vec![Some(f.root), Some(f.a), Some(f.root)]);
    }

    #[tokio::test]
    async fn test_select_content_delivers_link() {
        let f = fixture().await;
        f.nav.start("u1").await.unwrap();
        f.nav.select_child("u1", 0).await.unwrap();
        f.nav.select_child("u1", 0).await.unwrap();

        let response = f.nav.handle_selection("u1", "cnt:0").await.unwrap();
        assert_eq!(
            response.delivery,
            Some(ContentDelivery::Link {
                url: "https://example.org/guide.pdf".into()
            })
        );
    }

    #[tokio::test]
    async fn test_out_of_range_content_is_not_found() {
        let f = fixture().await;
        f.nav.start("u1").await.unwrap();
        let before = f.sessions.load("u1").await.unwrap().unwrap();

        let response = f.nav.select_content("u1", 3).await.unwrap();
        assert_eq!(response.notice, Some(Notice::ContentNotFound));
        assert_eq!(response.message.as_deref(), Some("Content not found"));
        assert!(response.view.is_none());
        assert!(response.delivery.is_none());
        assert_eq!(f.sessions.load("u1").await.unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn test_question_capture_restores_screen() {
        let f = fixture().await;
        f.nav.start("u1").await.unwrap();
        f.nav.select_child("u1", 0).await.unwrap();

        let asked = f.nav.ask_question("u1").await.unwrap();
        assert_eq!(asked.state, NavState::AwaitingQuestionText);

        let err = f.nav.select_child("u1", 0).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidSelection(_)));

        let sent = f
            .nav
            .submit_question_text("u1", "How do I apply?")
            .await
            .unwrap();
        assert_eq!(sent.notice, Some(Notice::QuestionSent));
        assert_eq!(view(&sent).node_id, f.a);

        let questions = f.repo.list_user_questions("u1").await.unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].text, "How do I apply?");
    }

    #[tokio::test]
    async fn test_blank_question_ends_capture_without_submitting() {
        let f = fixture().await;
        f.nav.start("u1").await.unwrap();
        f.nav.select_child("u1", 0).await.unwrap();
        f.nav.ask_question("u1").await.unwrap();

        let response = f.nav.submit_question_text("u1", "   ").await.unwrap();
        assert_eq!(response.state, NavState::Navigating);
        assert_eq!(response.notice, Some(Notice::QuestionEmpty));
        assert_eq!(view(&response).node_id, f.a);

        let session = f.sessions.load("u1").await.unwrap().unwrap();
        assert_eq!(session.state, NavState::Navigating);
        assert!(session.previous.is_none());
        assert!(f.repo.list_user_questions("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_question_text_outside_capture_is_rejected() {
        let f = fixture().await;
        f.nav.start("u1").await.unwrap();
        let err = f.nav.submit_question_text("u1", "hi").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidSelection(_)));
    }

    #[tokio::test]
    async fn test_home_abandons_question_capture() {
        let f = fixture().await;
        f.nav.start("u1").await.unwrap();
        f.nav.select_child("u1", 0).await.unwrap();
        f.nav.ask_question("u1").await.unwrap();

        let home = f.nav.handle_selection("u1", "home").await.unwrap();
        assert_eq!(home.state, NavState::Navigating);
        assert_eq!(view(&home).node_id, f.root);
    }

    #[tokio::test]
    async fn test_no_session_and_garbage_tokens() {
        let f = fixture().await;
        let err = f.nav.select_child("nobody", 0).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidSelection(_)));

        f.nav.start("u1").await.unwrap();
        let err = f.nav.handle_selection("u1", "menu:x").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidSelection(_)));
    }
}
