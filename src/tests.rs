//! Integration tests for the menu backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::Mutex;

use crate::api::bounded;
use crate::config::Config;
use crate::db::{init_database, Repository};
use crate::errors::{AppError, NAVIGATION_ERROR_TEXT};
use crate::notify::Notifier;
use crate::search::MenuIndex;
use crate::store::ActivityStore;
use crate::{create_router, AppState};

/// Captures outbound messages instead of sending them.
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_text(&self, user_id: &str, text: &str) -> Result<(), AppError> {
        self.sent
            .lock()
            .await
            .push((user_id.to_string(), text.to_string()));
        Ok(())
    }
}

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    state: AppState,
    notifier: Arc<RecordingNotifier>,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");
        let index_path = temp_dir.path().join("index");

        // Initialize database
        let pool = init_database(&db_path).await.expect("Failed to init DB");
        let repo = Arc::new(Repository::new(pool));

        // Initialize search index
        let search = Arc::new(MenuIndex::open(&index_path).expect("Failed to init search"));

        let config = Config {
            db_path,
            index_path,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
            bot_token: None,
            telegram_api_url: "http://127.0.0.1:1".to_string(),
            upstream_timeout: Duration::from_secs(5),
            reminder_interval: Duration::from_secs(3600),
            inactivity_days: 10,
            session_ttl: Duration::from_secs(3600),
            tree_cache_ttl: Duration::from_secs(3600),
            visit_dedup_window: Duration::from_secs(5),
        };

        let notifier = Arc::new(RecordingNotifier::default());
        let state = AppState::new(repo, search, notifier.clone(), config);
        let app = create_router(state.clone());

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        TestFixture {
            client: Client::new(),
            base_url,
            state,
            notifier,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    async fn put(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .put(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    async fn delete(&self, path: &str) -> (StatusCode, Value) {
        let resp = self.client.delete(self.url(path)).send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    /// Create a node and return its id.
    async fn node(&self, parent: Option<&str>, name: &str) -> String {
        let (status, body) = self
            .post(
                "/api/menu",
                json!({"parentId": parent, "name": name, "text": format!("{} text", name)}),
            )
            .await;
        assert_eq!(status, 200, "creating {}: {}", name, body);
        body["data"]["id"].as_str().unwrap().to_string()
    }

    /// Root -> {Benefits -> {Vacation (with content), Insurance}, Contacts}
    async fn seed_menu(&self) -> (String, String, String) {
        let root = self.node(None, "Main").await;
        let benefits = self.node(Some(&root), "Benefits").await;
        let vacation = self.node(Some(&benefits), "Vacation").await;
        self.node(Some(&benefits), "Insurance").await;
        self.node(Some(&root), "Contacts").await;

        let (status, _) = self
            .post(
                &format!("/api/menu/{}/content", vacation),
                json!({"type": "document", "serverPath": "https://example.org/vacation.pdf"}),
            )
            .await;
        assert_eq!(status, 200);

        (root, benefits, vacation)
    }
}

fn tokens(nav: &Value) -> Vec<String> {
    nav["data"]["view"]["actions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["token"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_empty_menu_is_sentinel() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture.get("/api/menu").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["name"], "Empty Menu");
    assert_eq!(body["data"]["children"].as_array().unwrap().len(), 0);

    let (status, body) = fixture.get("/api/menu/root").await;
    assert_eq!(status, 404);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_menu_crud() {
    let fixture = TestFixture::new().await;
    let (root, benefits, vacation) = fixture.seed_menu().await;

    // Full tree, children alphabetical
    let (status, body) = fixture.get("/api/menu").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["id"], root.as_str());
    let top: Vec<&str> = body["data"]["children"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(top, vec!["Benefits", "Contacts"]);
    assert_eq!(body["data"]["children"][0]["children"][1]["name"], "Vacation");

    // Second root and duplicate name conflict
    let (status, body) = fixture.post("/api/menu", json!({"name": "Other root"})).await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "CONFLICT");
    let (status, _) = fixture
        .post("/api/menu", json!({"parentId": root, "name": "Benefits"}))
        .await;
    assert_eq!(status, 409);

    // Rename shows up in the cached tree
    let (status, body) = fixture
        .put(
            &format!("/api/menu/{}", benefits),
            json!({"name": "Perks"}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["name"], "Perks");
    let (_, body) = fixture.get("/api/menu").await;
    assert_eq!(body["data"]["children"][0]["name"], "Contacts");
    assert_eq!(body["data"]["children"][1]["name"], "Perks");

    // Node with children cannot be deleted, a leaf can
    let (status, _) = fixture.delete(&format!("/api/menu/{}", benefits)).await;
    assert_eq!(status, 409);
    let (status, _) = fixture.delete(&format!("/api/menu/{}", vacation)).await;
    assert_eq!(status, 200);
    let (status, _) = fixture.get(&format!("/api/menu/{}", vacation)).await;
    assert_eq!(status, 404);

    let (status, body) = fixture.get("/api/menu/not-a-uuid").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_content_management() {
    let fixture = TestFixture::new().await;
    let root = fixture.node(None, "Main").await;
    let path = format!("/api/menu/{}/content", root);

    let (status, _) = fixture
        .post(&path, json!({"type": "image", "serverPath": "C:\\pics\\a.png"}))
        .await;
    assert_eq!(status, 400);

    let (status, body) = fixture
        .post(&path, json!({"type": "image", "serverPath": "uploaded_content/a.png"}))
        .await;
    assert_eq!(status, 200);
    let content_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = fixture
        .put(
            &format!("{}/{}", path, content_id),
            json!({"type": "video", "serverPath": "https://example.org/a.mp4"}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["type"], "video");

    let (_, body) = fixture.get(&format!("/api/menu/{}", root)).await;
    assert_eq!(body["data"]["content"].as_array().unwrap().len(), 1);

    let (status, _) = fixture.delete(&format!("{}/{}", path, content_id)).await;
    assert_eq!(status, 200);
    let (status, _) = fixture.delete(&format!("{}/{}", path, content_id)).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_menu_search() {
    let fixture = TestFixture::new().await;
    let (_, _, vacation) = fixture.seed_menu().await;

    let (status, body) = fixture.get("/api/menu/search-by-name?name=Vacation").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["id"], vacation.as_str());
    assert_eq!(body["data"]["content"][0]["type"], "document");

    let (status, _) = fixture.get("/api/menu/search-by-name?name=Nope").await;
    assert_eq!(status, 404);

    let (status, body) = fixture.get("/api/menu/search?q=vacation").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"][0]["nodeId"], vacation.as_str());
}

#[tokio::test]
async fn test_ratings() {
    let fixture = TestFixture::new().await;
    let (_, _, vacation) = fixture.seed_menu().await;
    fixture.post("/api/users", json!({"id": "42"})).await;

    let rate = format!("/api/menu/{}/rate", vacation);
    let (status, _) = fixture
        .post(&rate, json!({"userId": "42", "isUseful": true}))
        .await;
    assert_eq!(status, 200);
    let (status, body) = fixture
        .post(&rate, json!({"userId": "42", "isUseful": false}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["isUseful"], false);

    let (_, body) = fixture.get(&rate).await;
    assert_eq!(body["data"]["useful"], 0);
    assert_eq!(body["data"]["notUseful"], 1);

    let (_, body) = fixture
        .get(&format!("/api/menu/{}/rates-all", vacation))
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = fixture
        .post(&rate, json!({"userId": "ghost", "isUseful": true}))
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_users_and_pagination() {
    let fixture = TestFixture::new().await;

    let (status, _) = fixture
        .post("/api/users", json!({"id": "1", "phoneNumber": "+100"}))
        .await;
    assert_eq!(status, 200);
    let (status, _) = fixture.post("/api/users", json!({"id": "1"})).await;
    assert_eq!(status, 409);
    fixture.post("/api/users", json!({"id": "2"})).await;

    let (_, body) = fixture.get("/api/users?pageNumber=1&pageSize=1").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = fixture.get("/api/users?pageSize=0").await;
    assert_eq!(status, 400);
    let (status, _) = fixture.get("/api/users?pageSize=101").await;
    assert_eq!(status, 400);
    let (status, _) = fixture.get("/api/users?pageNumber=0").await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_history_and_long_time_lost() {
    let fixture = TestFixture::new().await;
    let (root, _, _) = fixture.seed_menu().await;
    fixture.post("/api/users", json!({"id": "fresh"})).await;
    fixture.post("/api/users", json!({"id": "gone"})).await;

    let (status, body) = fixture
        .post("/api/users/fresh/history", json!({"menuId": root}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["menuId"], root.as_str());

    // Immediate repeat collapses
    let (_, body) = fixture
        .post("/api/users/fresh/history", json!({"menuId": root}))
        .await;
    assert!(body["data"].is_null());

    let (_, body) = fixture.get("/api/users/fresh/history").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let root_id = uuid::Uuid::parse_str(&root).unwrap();
    fixture
        .state
        .repo
        .append_history("gone", root_id, Utc::now() - chrono::Duration::days(30))
        .await
        .unwrap();

    let (_, body) = fixture.get("/api/users/long-time-lost?daysCount=10").await;
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["gone"]);

    let (_, body) = fixture.get("/api/users/long-time-lost?daysCount=40").await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, body) = fixture
        .get("/api/users/long-time-lost?daysCount=4000000000")
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["success"], false);

    let (status, _) = fixture.get("/api/users/nobody/history").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_bot_navigation() {
    let fixture = TestFixture::new().await;
    let (root, benefits, vacation) = fixture.seed_menu().await;

    let (status, body) = fixture.post("/api/bot/7/start", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["view"]["nodeId"], root.as_str());
    assert_eq!(tokens(&body), vec!["menu:0", "menu:1"]);

    let (_, body) = fixture
        .post("/api/bot/7/action", json!({"action": "menu:0"}))
        .await;
    assert_eq!(body["data"]["view"]["nodeId"], benefits.as_str());
    assert_eq!(
        tokens(&body),
        vec!["menu:0", "menu:1", "back", "home", "ask_question"]
    );

    // Insurance sorts before Vacation
    let (_, body) = fixture
        .post("/api/bot/7/action", json!({"action": "menu:1"}))
        .await;
    assert_eq!(body["data"]["view"]["nodeId"], vacation.as_str());
    assert_eq!(body["data"]["view"]["ratingPrompt"]["nodeId"], vacation.as_str());

    let (_, body) = fixture
        .post("/api/bot/7/action", json!({"action": "cnt:0"}))
        .await;
    assert_eq!(body["data"]["delivery"]["delivery"], "link");
    assert_eq!(
        body["data"]["delivery"]["url"],
        "https://example.org/vacation.pdf"
    );

    let (status, body) = fixture
        .post("/api/bot/7/action", json!({"action": "cnt:5"}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["notice"], "content_not_found");
    assert_eq!(body["data"]["message"], "Content not found");
    assert!(body["data"]["view"].is_null());

    // Stale index and garbage tokens get the generic message
    let (status, body) = fixture
        .post("/api/bot/7/action", json!({"action": "menu:9"}))
        .await;
    assert_eq!(status, 422);
    assert_eq!(body["error"]["message"], NAVIGATION_ERROR_TEXT);
    let (status, _) = fixture
        .post("/api/bot/7/action", json!({"action": "drop table"}))
        .await;
    assert_eq!(status, 422);

    fixture
        .post("/api/bot/7/action", json!({"action": "back"}))
        .await;
    let (_, body) = fixture
        .post("/api/bot/7/action", json!({"action": "back"}))
        .await;
    assert_eq!(body["data"]["view"]["nodeId"], root.as_str());

    let (_, body) = fixture
        .post("/api/bot/7/action", json!({"action": "back"}))
        .await;
    assert_eq!(body["data"]["notice"], "already_at_root");
    assert!(body["data"]["view"].is_null());

    // Root, Benefits, Vacation, Benefits, Root
    let (_, body) = fixture.get("/api/users/7/history").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_bot_rating_prompt_once() {
    let fixture = TestFixture::new().await;
    let (_, _, vacation) = fixture.seed_menu().await;

    fixture.post("/api/bot/8/start", json!({})).await;
    fixture
        .post("/api/bot/8/action", json!({"action": "menu:0"}))
        .await;
    let (_, body) = fixture
        .post("/api/bot/8/action", json!({"action": "menu:1"}))
        .await;
    let useful = body["data"]["view"]["ratingPrompt"]["actions"][0]["token"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(useful, format!("rate:{}:1", vacation));

    let (status, body) = fixture
        .post("/api/bot/8/action", json!({"action": useful}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["notice"], "rating_saved");

    fixture
        .post("/api/bot/8/action", json!({"action": "back"}))
        .await;
    let (_, body) = fixture
        .post("/api/bot/8/action", json!({"action": "menu:1"}))
        .await;
    assert!(body["data"]["view"]["ratingPrompt"].is_null());

    let (_, body) = fixture.get(&format!("/api/menu/{}/rate", vacation)).await;
    assert_eq!(body["data"]["useful"], 1);
}

#[tokio::test]
async fn test_question_round_trip() {
    let fixture = TestFixture::new().await;
    let (_, benefits, _) = fixture.seed_menu().await;

    fixture.post("/api/bot/9/start", json!({})).await;
    fixture
        .post("/api/bot/9/action", json!({"action": "menu:0"}))
        .await;
    let (_, body) = fixture
        .post("/api/bot/9/action", json!({"action": "ask_question"}))
        .await;
    assert_eq!(body["data"]["state"], "awaiting_question_text");

    let (status, body) = fixture
        .post("/api/bot/9/question", json!({"text": "Is dental covered?"}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["notice"], "question_sent");
    assert_eq!(body["data"]["view"]["nodeId"], benefits.as_str());

    let (_, body) = fixture
        .get("/api/questions?sortBy=created_at&sortOrder=asc")
        .await;
    let questions = body["data"].as_array().unwrap();
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0]["text"], "Is dental covered?");
    let question_id = questions[0]["id"].as_str().unwrap().to_string();

    let (status, body) = fixture
        .put(
            &format!("/api/questions/{}/answer", question_id),
            json!({"adminAnswer": "Yes, up to a limit."}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["notified"], true);
    assert_eq!(body["data"]["question"]["adminAnswer"], "Yes, up to a limit.");

    let sent = fixture.notifier.sent.lock().await.clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "9");
    assert!(sent[0].1.contains("Yes, up to a limit."));

    let (_, body) = fixture.get("/api/users/9/questions").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    // Date filter excluding everything
    let (_, body) = fixture.get("/api/questions?endDate=2000-01-01").await;
    assert!(body["data"].as_array().unwrap().is_empty());
    let (status, _) = fixture.get("/api/questions?startDate=yesterday").await;
    assert_eq!(status, 400);

    let (status, _) = fixture
        .delete(&format!("/api/questions/{}", question_id))
        .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_question_text_without_capture_is_rejected() {
    let fixture = TestFixture::new().await;
    fixture.seed_menu().await;
    fixture.post("/api/bot/10/start", json!({})).await;

    let (status, _) = fixture
        .post("/api/bot/10/question", json!({"text": "hello"}))
        .await;
    assert_eq!(status, 422);
}

#[tokio::test]
async fn test_reminder_pass_over_http_state() {
    let fixture = TestFixture::new().await;
    let (root, _, _) = fixture.seed_menu().await;
    fixture.post("/api/users", json!({"id": "sleepy"})).await;

    let root_id = uuid::Uuid::parse_str(&root).unwrap();
    fixture
        .state
        .repo
        .append_history("sleepy", root_id, Utc::now() - chrono::Duration::days(11))
        .await
        .unwrap();

    let report = fixture.state.reminder_job().run_once().await.unwrap();
    assert_eq!(report.notified, 1);
    assert_eq!(fixture.notifier.sent.lock().await[0].0, "sleepy");

    let (_, body) = fixture.get("/api/users/long-time-lost").await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_admin_store_calls_are_bounded() {
    let fixture = TestFixture::new().await;
    let mut state = fixture.state.clone();
    state.config = Arc::new(Config {
        upstream_timeout: Duration::from_millis(20),
        ..(*fixture.state.config).clone()
    });

    let stalled = bounded(
        &state,
        "stalled store call",
        std::future::pending::<Result<(), AppError>>(),
    )
    .await;
    assert!(matches!(stalled, Err(AppError::UpstreamUnavailable(_))));

    let users = bounded(
        &state,
        "user listing",
        state.repo.list_users(Default::default()),
    )
    .await;
    assert!(users.is_ok());
}
