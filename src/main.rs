//! Menu Bot Backend
//!
//! Hierarchical content menu for a chat bot: navigation sessions, ratings, visit
//! history, user questions and inactivity reminders over SQLite.

mod api;
mod config;
mod db;
mod errors;
mod menu;
mod models;
mod notify;
mod recorder;
mod reminder;
mod search;
mod store;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::Repository;
use menu::{InMemorySessionStore, Navigator, TreeCache};
use notify::{LogNotifier, Notifier, TelegramNotifier};
use recorder::Recorder;
use reminder::ReminderJob;
use search::MenuIndex;
use store::TreeStore;

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(600);

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub search: Arc<MenuIndex>,
    pub notifier: Arc<dyn Notifier>,
    pub sessions: Arc<InMemorySessionStore>,
    pub recorder: Arc<Recorder>,
    pub navigator: Arc<Navigator>,
    pub tree_cache: Arc<TreeCache>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire the navigation core on top of the repository.
    pub fn new(
        repo: Arc<Repository>,
        search: Arc<MenuIndex>,
        notifier: Arc<dyn Notifier>,
        config: Config,
    ) -> Self {
        let sessions = Arc::new(InMemorySessionStore::new(config.session_ttl));
        let recorder = Arc::new(Recorder::new(repo.clone(), config.visit_dedup_window));
        let navigator = Arc::new(Navigator::new(
            repo.clone(),
            repo.clone(),
            repo.clone(),
            sessions.clone(),
            recorder.clone(),
            config.upstream_timeout,
        ));

        Self {
            repo,
            search,
            notifier,
            sessions,
            recorder,
            navigator,
            tree_cache: Arc::new(TreeCache::new(config.tree_cache_ttl)),
            config: Arc::new(config),
        }
    }

    pub fn reminder_job(&self) -> ReminderJob {
        ReminderJob::new(
            self.repo.clone(),
            self.recorder.clone(),
            self.notifier.clone(),
            self.config.inactivity_days,
            self.config.upstream_timeout,
        )
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Menu Bot Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Index path: {:?}", config.index_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    // Initialize search index from the stored menu
    let search = Arc::new(MenuIndex::open(&config.index_path)?);
    let nodes = repo.list_all().await?;
    search.rebuild(&nodes).await?;

    let notifier: Arc<dyn Notifier> = match &config.bot_token {
        Some(token) => Arc::new(TelegramNotifier::new(
            &config.telegram_api_url,
            token,
            config.upstream_timeout,
        )?),
        None => {
            tracing::warn!("No bot token configured (MENU_BOT_TOKEN). Messages are only logged!");
            Arc::new(LogNotifier)
        }
    };

    let state = AppState::new(repo, search, notifier, config.clone());

    // Background jobs
    Arc::new(state.reminder_job()).spawn_scheduler(config.reminder_interval);
    spawn_session_purge(state.sessions.clone());

    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn spawn_session_purge(sessions: Arc<InMemorySessionStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = sessions.purge_expired().await;
            if purged > 0 {
                tracing::debug!("Purged {} idle sessions", purged);
            }
        }
    });
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Menu
        .route("/menu", get(api::get_full_menu).post(api::create_node))
        .route("/menu/root", get(api::get_root))
        .route("/menu/search-by-name", get(api::search_by_name))
        .route("/menu/search", get(api::search_menu))
        .route(
            "/menu/{id}",
            get(api::get_node)
                .put(api::update_node)
                .delete(api::delete_node),
        )
        .route("/menu/{id}/content", post(api::add_content))
        .route(
            "/menu/{id}/content/{content_id}",
            put(api::update_content).delete(api::delete_content),
        )
        .route(
            "/menu/{id}/rate",
            get(api::get_rating_summary).post(api::rate_node),
        )
        .route("/menu/{id}/rates-all", get(api::list_ratings))
        // Users
        .route("/users", get(api::list_users).post(api::create_user))
        .route("/users/long-time-lost", get(api::long_time_lost))
        .route("/users/{id}/questions", get(api::list_user_questions))
        .route(
            "/users/{id}/history",
            get(api::list_history).post(api::add_history),
        )
        // Questions
        .route(
            "/questions",
            get(api::list_questions).post(api::create_question),
        )
        .route("/questions/{id}", delete(api::delete_question))
        .route("/questions/{id}/answer", put(api::answer_question))
        // Bot navigation
        .route("/bot/{user_id}/start", post(api::bot_start))
        .route("/bot/{user_id}/action", post(api::bot_action))
        .route("/bot/{user_id}/question", post(api::bot_question));

    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
