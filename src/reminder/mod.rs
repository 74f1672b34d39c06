//! Periodic re-engagement of inactive users.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::errors::{with_timeout, AppError};
use crate::models::{Page, User, MAX_PAGE_SIZE};
use crate::notify::Notifier;
use crate::recorder::Recorder;
use crate::store::TreeStore;

pub const REMINDER_TEXT: &str =
    "We have not seen you for a while. Open the menu to see what is new.";

/// Outcome of one reminder pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReminderReport {
    pub notified: usize,
    pub failed: usize,
    /// Set when the pass did nothing because the menu has no root
    pub skipped: bool,
}

pub struct ReminderJob {
    tree: Arc<dyn TreeStore>,
    recorder: Arc<Recorder>,
    notifier: Arc<dyn Notifier>,
    inactivity_days: u32,
    timeout: Duration,
}

impl ReminderJob {
    pub fn new(
        tree: Arc<dyn TreeStore>,
        recorder: Arc<Recorder>,
        notifier: Arc<dyn Notifier>,
        inactivity_days: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            tree,
            recorder,
            notifier,
            inactivity_days,
            timeout,
        }
    }

    /// Remind every inactive user once and count them as back at the root.
    pub async fn run_once(&self) -> Result<ReminderReport, AppError> {
        let Some(root) = with_timeout(self.timeout, "root lookup", self.tree.get_root()).await?
        else {
            tracing::warn!("Skipping reminders: menu has no root");
            return Ok(ReminderReport {
                skipped: true,
                ..ReminderReport::default()
            });
        };

        // Collect first; recording visits while paging would shift the pages
        let users = self.collect_inactive().await?;
        tracing::info!("Reminding {} inactive users", users.len());

        let mut report = ReminderReport::default();
        for user in users {
            match self.remind(&user, root.id).await {
                Ok(()) => report.notified += 1,
                Err(e) => {
                    tracing::error!("Reminder for {} failed: {}", user.id, e);
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            "Reminder pass done: {} notified, {} failed",
            report.notified,
            report.failed
        );
        Ok(report)
    }

    async fn collect_inactive(&self) -> Result<Vec<User>, AppError> {
        let mut users = Vec::new();
        let mut page = Page::first(MAX_PAGE_SIZE)?;
        loop {
            let batch = with_timeout(
                self.timeout,
                "inactive user scan",
                self.recorder.find_inactive_users(self.inactivity_days, page),
            )
            .await?;
            let done = (batch.len() as i64) < page.limit();
            users.extend(batch);
            if done {
                return Ok(users);
            }
            page = page.next();
        }
    }

    async fn remind(&self, user: &User, root_id: uuid::Uuid) -> Result<(), AppError> {
        with_timeout(
            self.timeout,
            "reminder send",
            self.notifier.send_text(&user.id, REMINDER_TEXT),
        )
        .await?;
        with_timeout(
            self.timeout,
            "history write",
            self.recorder.record_visit(&user.id, root_id),
        )
        .await?;
        Ok(())
    }

    /// Run a pass every `every`, starting now.
    pub fn spawn_scheduler(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tracing::info!("Starting reminder scheduler every {:?}", every);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;

                if let Err(e) = self.run_once().await {
                    tracing::error!("Reminder pass failed: {}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_database, Repository};
    use crate::models::CreateMenuNodeRequest;
    use crate::store::ActivityStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use tempfile::TempDir;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct FakeNotifier {
        sent: Mutex<Vec<String>>,
        failing: Vec<String>,
    }

    #[async_trait]
    impl Notifier for FakeNotifier {
        async fn send_text(&self, user_id: &str, _text: &str) -> Result<(), AppError> {
            if self.failing.iter().any(|u| u == user_id) {
                return Err(AppError::UpstreamUnavailable("blocked".to_string()));
            }
            self.sent.lock().await.push(user_id.to_string());
            Ok(())
        }
    }

    async fn setup(with_root: bool) -> (Arc<Repository>, TempDir) {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("test.sqlite")).await.unwrap();
        let repo = Arc::new(Repository::new(pool));
        if with_root {
            repo.create_node(&CreateMenuNodeRequest {
                parent_id: None,
                name: "Root".into(),
                text: None,
                subscription_type: None,
            })
            .await
            .unwrap();
        }
        (repo, dir)
    }

    fn job(repo: &Arc<Repository>, notifier: Arc<FakeNotifier>) -> ReminderJob {
        let recorder = Arc::new(Recorder::new(repo.clone(), Duration::from_secs(5)));
        ReminderJob::new(repo.clone(), recorder, notifier, 10, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_reminds_inactive_and_continues_past_failures() {
        let (repo, _dir) = setup(true).await;
        let root = repo.get_root().await.unwrap().unwrap();
        let old = Utc::now() - chrono::Duration::days(12);
        for user in ["stale", "blocked", "fresh"] {
            repo.ensure_user(user).await.unwrap();
        }
        repo.append_history("stale", root.id, old).await.unwrap();
        repo.append_history("blocked", root.id, old).await.unwrap();
        repo.append_history("fresh", root.id, Utc::now()).await.unwrap();

        let notifier = Arc::new(FakeNotifier {
            failing: vec!["blocked".to_string()],
            ..FakeNotifier::default()
        });
        let report = job(&repo, notifier.clone()).run_once().await.unwrap();

        assert_eq!(report.notified, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(*notifier.sent.lock().await, vec!["stale".to_string()]);

        // The reminded user now counts as active; the failed one is retried next pass
        let still_inactive = repo
            .find_inactive(Utc::now() - chrono::Duration::days(10), Page::default())
            .await
            .unwrap();
        let ids: Vec<&str> = still_inactive.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["blocked"]);
    }

    #[tokio::test]
    async fn test_skips_without_root() {
        let (repo, _dir) = setup(false).await;
        let notifier = Arc::new(FakeNotifier::default());
        let report = job(&repo, notifier.clone()).run_once().await.unwrap();

        assert!(report.skipped);
        assert!(notifier.sent.lock().await.is_empty());
    }
}
