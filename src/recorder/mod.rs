//! Durable ratings and visit history.
//!
//! Navigation and the reminder job go through here rather than the store so
//! that duplicate visits collapse in one place.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{parse_timestamp, HistoryEntry, Page, Rating, RatingSummary, User};
use crate::store::ActivityStore;

pub struct Recorder {
    store: Arc<dyn ActivityStore>,
    dedup_window: Duration,
}

impl Recorder {
    /// `dedup_window` bounds how close two visits to the same node must be to count as one.
    pub fn new(store: Arc<dyn ActivityStore>, dedup_window: Duration) -> Self {
        Self {
            store,
            dedup_window,
        }
    }

    /// Append a history row for `user_id` entering `node_id`.
    ///
    /// Returns `None` when the user's latest row is the same node and still inside
    /// the dedup window, so a redelivered action does not double count.
    pub async fn record_visit(
        &self,
        user_id: &str,
        node_id: Uuid,
    ) -> Result<Option<HistoryEntry>, AppError> {
        let now = Utc::now();

        if let Some(last) = self.store.last_history(user_id).await? {
            let recent = parse_timestamp(&last.action_date)
                .and_then(|at| (now - at).to_std().ok())
                .is_some_and(|age| age < self.dedup_window);
            if last.menu_id == Some(node_id) && recent {
                tracing::debug!("Suppressed duplicate visit of {} to {}", user_id, node_id);
                return Ok(None);
            }
        }

        let entry = self.store.append_history(user_id, node_id, now).await?;
        Ok(Some(entry))
    }

    /// Create or overwrite the user's vote on `node_id`.
    pub async fn record_rating(
        &self,
        user_id: &str,
        node_id: Uuid,
        useful: bool,
    ) -> Result<Rating, AppError> {
        let rating = self.store.upsert_rating(user_id, node_id, useful).await?;
        tracing::info!(
            "User {} rated {} as {}",
            user_id,
            node_id,
            if useful { "useful" } else { "not useful" }
        );
        Ok(rating)
    }

    pub async fn has_rated(&self, user_id: &str, node_id: Uuid) -> Result<bool, AppError> {
        Ok(self.store.get_rating(user_id, node_id).await?.is_some())
    }

    pub async fn summarize_ratings(&self, node_id: Uuid) -> Result<RatingSummary, AppError> {
        self.store.summarize_ratings(node_id).await
    }

    /// Users whose last visit is more than `cutoff_days` old.
    pub async fn find_inactive_users(
        &self,
        cutoff_days: u32,
        page: Page,
    ) -> Result<Vec<User>, AppError> {
        let cutoff = chrono::Duration::try_days(i64::from(cutoff_days))
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .ok_or_else(|| {
                AppError::Validation(format!("daysCount {} out of range", cutoff_days))
            })?;
        self.store.find_inactive(cutoff, page).await
    }
}
