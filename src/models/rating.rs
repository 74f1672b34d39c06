//! Usefulness votes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's live vote for a node. At most one per (user, node).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub user_id: String,
    pub menu_id: Uuid,
    pub is_useful: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for voting on a node.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateRequest {
    pub user_id: String,
    pub is_useful: bool,
}

/// Vote counts for a node.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    pub menu_id: Uuid,
    pub useful: i64,
    pub not_useful: i64,
}
